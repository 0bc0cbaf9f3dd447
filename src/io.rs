//! Buffer URI resolution.
//!
//! A glTF buffer URI is either an embedded payload
//! (`data:application/octet-stream;base64,AAAA...`) or a reference to a file
//! relative to the asset. [`classify`] tells them apart, [`BufferLoader`]
//! turns them into bytes through a pluggable [`BufferSource`].
//!
//! No caching happens here; see [`ResourceCache`](crate::ResourceCache).

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::errors::LoadError;
use crate::settings::ResourceConfiguration;

const DATA_SCHEME: &str = "data:";
const BASE64_MARKER: &[u8] = b";base64";

/// Standard alphabet; exporters disagree about trailing `=`, accept both.
const BASE64_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// How a buffer URI is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriKind {
    /// Base64 payload embedded in a `data:` URI.
    Embedded,
    /// File path, relative to the base path unless absolute.
    External,
    /// Any other scheme (`http://`, `file://`, ...).
    Unsupported,
}

/// Classifies a buffer URI.
///
/// `Embedded` requires the `data:` prefix and `;base64` immediately before the
/// first comma. Anything without a `://` separator is treated as a file path.
#[must_use]
pub fn classify(uri: &str) -> UriKind {
    if base64_payload(uri).is_some() {
        UriKind::Embedded
    } else if !uri.contains("://") {
        UriKind::External
    } else {
        UriKind::Unsupported
    }
}

/// Returns the text after the first comma of a base64 data URI.
fn base64_payload(uri: &str) -> Option<&str> {
    if !uri.starts_with(DATA_SCHEME) {
        return None;
    }
    let comma = uri.find(',')?;
    let header = &uri.as_bytes()[..comma];
    if header.ends_with(BASE64_MARKER) {
        Some(&uri[comma + 1..])
    } else {
        None
    }
}

// ============================================================================
// Loader Capability
// ============================================================================

/// The primitives used to turn URIs into bytes.
///
/// Implementations must not cache; the resolver deduplicates requests.
pub trait BufferSource: Send + Sync {
    /// Decodes a base64 payload (the text after the data URI comma).
    fn decode_base64(&self, payload: &str, expected_size: usize) -> Result<Vec<u8>, LoadError>;

    /// Reads the file named by `uri`, relative to `base_path`.
    fn read_file(&self, uri: &str, base_path: &Path, expected_size: usize) -> Result<Vec<u8>, LoadError>;
}

/// [`BufferSource`] backed by the `base64` crate and the local file system.
#[derive(Debug, Clone, Copy)]
pub struct DefaultBufferSource {
    percent_decode: bool,
}

impl Default for DefaultBufferSource {
    fn default() -> Self {
        Self { percent_decode: true }
    }
}

impl DefaultBufferSource {
    #[must_use]
    pub fn new(percent_decode: bool) -> Self {
        Self { percent_decode }
    }

    /// Maps a relative URI to a path under `base_path`.
    #[must_use]
    pub fn resolve_path(&self, uri: &str, base_path: &Path) -> PathBuf {
        let relative: Cow<'_, str> = if self.percent_decode {
            // Malformed escapes are kept verbatim.
            urlencoding::decode(uri).unwrap_or(Cow::Borrowed(uri))
        } else {
            Cow::Borrowed(uri)
        };
        base_path.join(relative.as_ref())
    }
}

fn check_size(data: Vec<u8>, expected: usize) -> Result<Vec<u8>, LoadError> {
    if data.len() == expected {
        Ok(data)
    } else {
        Err(LoadError::SizeMismatch {
            expected,
            actual: data.len(),
        })
    }
}

impl BufferSource for DefaultBufferSource {
    fn decode_base64(&self, payload: &str, expected_size: usize) -> Result<Vec<u8>, LoadError> {
        let data = BASE64_ENGINE.decode(payload)?;
        check_size(data, expected_size)
    }

    fn read_file(&self, uri: &str, base_path: &Path, expected_size: usize) -> Result<Vec<u8>, LoadError> {
        let path = self.resolve_path(uri, base_path);
        let data = std::fs::read(&path).map_err(|source| LoadError::Io { path, source })?;
        check_size(data, expected_size)
    }
}

// ============================================================================
// BufferLoader
// ============================================================================

/// Resolves buffer URIs to bytes.
pub struct BufferLoader {
    source: Box<dyn BufferSource>,
    base_path: PathBuf,
}

impl BufferLoader {
    /// Loader using [`DefaultBufferSource`] configured from `config`.
    #[must_use]
    pub fn new(config: &ResourceConfiguration) -> Self {
        Self::with_source(config, DefaultBufferSource::new(config.percent_decode_uris))
    }

    #[must_use]
    pub fn with_source(config: &ResourceConfiguration, source: impl BufferSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            base_path: config.base_path.clone(),
        }
    }

    #[inline]
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Decodes an embedded base64 buffer.
    pub fn load_embedded(&self, uri: &str, expected_size: usize) -> Result<Vec<u8>, LoadError> {
        let payload = base64_payload(uri).ok_or(LoadError::NotEmbedded)?;
        self.source.decode_base64(payload, expected_size)
    }

    /// Reads an external buffer relative to the base path.
    pub fn load_external(&self, uri: &str, expected_size: usize) -> Result<Vec<u8>, LoadError> {
        self.source.read_file(uri, &self.base_path, expected_size)
    }

    /// Classifies `uri` and loads it accordingly.
    pub fn load(&self, uri: &str, expected_size: usize) -> Result<Vec<u8>, LoadError> {
        match classify(uri) {
            UriKind::Embedded => self.load_embedded(uri, expected_size),
            UriKind::External => self.load_external(uri, expected_size),
            UriKind::Unsupported => Err(LoadError::UnsupportedUri),
        }
    }
}

impl std::fmt::Debug for BufferLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferLoader")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader_in(dir: &Path) -> BufferLoader {
        BufferLoader::new(&ResourceConfiguration::new(dir))
    }

    // ========================================================================
    // Classification
    // ========================================================================

    #[test]
    fn classify_data_uri() {
        assert_eq!(classify("data:application/octet-stream;base64,AAAA"), UriKind::Embedded);
        assert_eq!(classify("data:;base64,AAAA"), UriKind::Embedded);
    }

    #[test]
    fn classify_relative_file() {
        assert_eq!(classify("mesh.bin"), UriKind::External);
        assert_eq!(classify("buffers/mesh%20a.bin"), UriKind::External);
    }

    #[test]
    fn classify_remote_uri() {
        assert_eq!(classify("http://host/mesh.bin"), UriKind::Unsupported);
        assert_eq!(classify("file:///tmp/mesh.bin"), UriKind::Unsupported);
    }

    #[test]
    fn marker_must_precede_first_comma() {
        // Not base64 encoded: falls through to the file path rule.
        assert_eq!(classify("data:text/plain,hello"), UriKind::External);
        // The marker after the first comma does not count.
        assert_eq!(classify("data:text/plain,x;base64,AAAA"), UriKind::External);
        // Missing comma.
        assert_eq!(classify("data:application/octet-stream;base64"), UriKind::External);
        // Wrong scheme prefix.
        assert_eq!(classify("DATA:;base64,AAAA"), UriKind::External);
    }

    // ========================================================================
    // Embedded
    // ========================================================================

    #[test]
    fn load_embedded_decodes_payload() {
        let loader = loader_in(Path::new("."));
        let bytes = loader
            .load_embedded("data:application/octet-stream;base64,AQIDBA==", 4)
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn load_embedded_accepts_missing_padding() {
        let loader = loader_in(Path::new("."));
        let bytes = loader.load("data:application/gltf-buffer;base64,AQID", 3).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn load_embedded_rejects_wrong_size() {
        let loader = loader_in(Path::new("."));
        let err = loader.load_embedded("data:;base64,AQIDBA==", 8).unwrap_err();
        assert!(matches!(err, LoadError::SizeMismatch { expected: 8, actual: 4 }));
    }

    #[test]
    fn load_embedded_rejects_garbage() {
        let loader = loader_in(Path::new("."));
        let err = loader.load_embedded("data:;base64,@@@@", 3).unwrap_err();
        assert!(matches!(err, LoadError::Base64(_)));
    }

    #[test]
    fn load_embedded_requires_prefix() {
        let loader = loader_in(Path::new("."));
        let err = loader.load_embedded("mesh.bin", 3).unwrap_err();
        assert!(matches!(err, LoadError::NotEmbedded));
    }

    // ========================================================================
    // External
    // ========================================================================

    #[test]
    fn load_external_reads_relative_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mesh.bin"), [9u8, 8, 7]).unwrap();

        let loader = loader_in(dir.path());
        assert_eq!(loader.load("mesh.bin", 3).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn load_external_percent_decodes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mesh a.bin"), [1u8, 2]).unwrap();

        let loader = loader_in(dir.path());
        assert_eq!(loader.load_external("mesh%20a.bin", 2).unwrap(), vec![1, 2]);

        let raw = BufferLoader::new(&ResourceConfiguration::new(dir.path()).with_percent_decode_uris(false));
        assert!(matches!(raw.load_external("mesh%20a.bin", 2), Err(LoadError::Io { .. })));
    }

    #[test]
    fn load_external_missing_file() {
        let dir = TempDir::new().unwrap();
        let loader = loader_in(dir.path());
        match loader.load("missing.bin", 4) {
            Err(LoadError::Io { path, .. }) => assert_eq!(path, dir.path().join("missing.bin")),
            other => panic!("expected an IO error, got {other:?}"),
        }
    }

    #[test]
    fn load_external_rejects_size_mismatch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mesh.bin"), [0u8; 10]).unwrap();

        let loader = loader_in(dir.path());
        assert!(matches!(
            loader.load("mesh.bin", 12),
            Err(LoadError::SizeMismatch { expected: 12, actual: 10 })
        ));
        assert!(matches!(
            loader.load("mesh.bin", 8),
            Err(LoadError::SizeMismatch { expected: 8, actual: 10 })
        ));
    }

    #[test]
    fn load_unsupported_scheme() {
        let loader = loader_in(Path::new("."));
        assert!(matches!(loader.load("https://host/mesh.bin", 4), Err(LoadError::UnsupportedUri)));
    }
}
