//! Error Types
//!
//! This module defines the error types used by the resource loader.
//!
//! # Overview
//!
//! Two layers of errors exist:
//! - [`LoadError`]: failures reported by the buffer loader capability while
//!   turning a single URI into bytes (decode errors, I/O errors, size checks).
//! - [`GltfioError`]: failures of a whole resource-loading pass. Loader
//!   failures are wrapped in [`GltfioError::ResourceUnavailable`] together
//!   with the offending URI.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, GltfioError>`.
//!
//! ```rust,ignore
//! use myth_gltfio::errors::{GltfioError, Result};
//!
//! fn load() -> Result<()> {
//!     Ok(())
//! }
//! ```
//!
//! Upload counter underflow is not represented here: redeeming more upload
//! tickets than were issued is a programming error and panics.

use std::path::PathBuf;

use thiserror::Error;

use crate::upload::HostTarget;

/// Failure to resolve a single URI to bytes.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The URI is neither a base64 data URI nor a relative file path.
    #[error("URI is neither an embedded base64 payload nor a file path")]
    UnsupportedUri,

    /// The URI does not carry a `data:...;base64,` prefix.
    #[error("not a base64 data URI")]
    NotEmbedded,

    /// Base64 decoding error.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The resolved payload does not have the byte length declared by the asset.
    #[error("expected {expected} bytes, found {actual}")]
    SizeMismatch {
        /// Byte length declared by the buffer
        expected: usize,
        /// Byte length actually obtained
        actual: usize,
    },

    /// File I/O error.
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        /// Fully resolved path that was read
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The main error type of the resource loader.
#[derive(Error, Debug)]
pub enum GltfioError {
    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// The URI is not cached and could not be loaded.
    #[error("Unable to obtain resource {uri}: {source}")]
    ResourceUnavailable {
        /// The offending URI
        uri: String,
        #[source]
        source: LoadError,
    },

    /// A buffer binding names none of the recognized targets.
    #[error("Malformed binding: {uri}")]
    MalformedBinding {
        /// URI of the binding
        uri: String,
    },

    /// The binding range lies outside of the resolved blob.
    #[error("Binding range {offset}+{size} exceeds {len} bytes of {uri}")]
    RangeOutOfBounds {
        /// URI of the binding
        uri: String,
        /// Byte offset into the blob
        offset: usize,
        /// Byte length of the range
        size: usize,
        /// Byte length of the blob
        len: usize,
    },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// A host memory copy does not fit in its destination buffer.
    #[error("Copy of {size} bytes at {offset} overflows {target:?} buffer of {capacity} bytes")]
    HostRangeOutOfBounds {
        /// Destination buffer
        target: HostTarget,
        /// Byte offset into the destination
        offset: usize,
        /// Byte length of the copy
        size: usize,
        /// Byte length of the destination
        capacity: usize,
    },

    /// The tangent stage reported a failure.
    #[error("Tangent stage error: {0}")]
    TangentStage(String),
}

impl GltfioError {
    /// Returns the URI this error is about, if any.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::ResourceUnavailable { uri, .. }
            | Self::MalformedBinding { uri }
            | Self::RangeOutOfBounds { uri, .. } => Some(uri),
            Self::HostRangeOutOfBounds { .. } | Self::TangentStage(_) => None,
        }
    }
}

/// Alias for `Result<T, GltfioError>`.
pub type Result<T> = std::result::Result<T, GltfioError>;
