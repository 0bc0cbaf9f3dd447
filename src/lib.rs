//! # Myth glTF I/O
//!
//! Loads the buffers referenced by a parsed glTF asset and hands them to the
//! rendering engine as asynchronous buffer uploads.
//!
//! ```rust,ignore
//! use myth_gltfio::{BindingResolver, HostBuffers, QueuedUploadSink, ResourceConfiguration};
//!
//! let config = ResourceConfiguration::from_gltf_path("assets/Box.gltf");
//! let mut resolver = BindingResolver::new(&config);
//! let (mut uploads, requests) = QueuedUploadSink::unbounded();
//! let mut host = HostBuffers::with_sizes(animation_len, orientation_len);
//!
//! if !resolver.load_resources(&asset, &mut uploads, &mut host) {
//!     return Err(anyhow::anyhow!("failed to load buffers"));
//! }
//! // The cache outlives the resolver until the device thread has completed
//! // every request received on `requests`.
//! resolver.release();
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod asset;
pub mod cache;
pub mod errors;
pub mod io;
pub mod resolver;
pub mod settings;
pub mod tangents;
pub mod upload;

pub use asset::{Accessor, Attribute, AttributeSemantic, BindingTarget, BufferBinding, Mesh, Primitive, SceneAsset, SceneNode};
pub use cache::{Blob, CacheMonitor, CacheState, ResourceCache, UploadTicket};
pub use errors::{GltfioError, LoadError, Result};
pub use io::{BufferLoader, BufferSource, DefaultBufferSource, UriKind, classify};
pub use resolver::{BindingResolver, LoadReport};
pub use settings::ResourceConfiguration;
pub use tangents::{AttributeView, PackedQuat, SkipTangents, TangentJob, TangentStage};
pub use upload::{
    BufferDescriptor, HostBuffers, HostSink, HostTarget, IndexBufferId, QueuedUploadSink, UploadRequest, UploadSink,
    UploadTarget, VertexBufferId,
};
