//! Resource Loader Configuration
//!
//! [`ResourceConfiguration`] controls how external buffer URIs are resolved.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_gltfio::ResourceConfiguration;
//!
//! // Resolve external buffers next to the glTF file
//! let config = ResourceConfiguration::from_gltf_path("assets/helmet/DamagedHelmet.gltf");
//!
//! // Explicit base directory, raw (non percent-decoded) file names
//! let config = ResourceConfiguration::new("assets/helmet")
//!     .with_percent_decode_uris(false);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Settings of a [`BindingResolver`](crate::BindingResolver) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfiguration {
    /// Directory that relative buffer URIs are resolved against.
    pub base_path: PathBuf,

    /// Whether `%XX` escapes in external URIs are decoded before the file is
    /// opened. glTF URIs are RFC 3986 references, so this is on by default.
    pub percent_decode_uris: bool,
}

impl Default for ResourceConfiguration {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            percent_decode_uris: true,
        }
    }
}

impl ResourceConfiguration {
    /// Creates a configuration resolving external URIs against `base_path`.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// Creates a configuration for the asset stored at `gltf_path`.
    ///
    /// When the path names a file, its parent directory becomes the base path.
    #[must_use]
    pub fn from_gltf_path(gltf_path: impl AsRef<Path>) -> Self {
        let path = gltf_path.as_ref();
        let base_path = if path.is_file() || path.extension().is_some() {
            path.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            path.to_path_buf()
        };
        Self::new(base_path)
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn with_percent_decode_uris(mut self, enabled: bool) -> Self {
        self.percent_decode_uris = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
