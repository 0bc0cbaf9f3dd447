//! Buffer binding resolution.
//!
//! [`BindingResolver`] walks an asset's buffer bindings in order, resolves
//! each URI through the [`ResourceCache`] (loading on a miss) and delivers the
//! bound byte range to its destination:
//!
//! | Target              | Delivery                                   |
//! |---------------------|--------------------------------------------|
//! | vertex buffer       | async upload, holds an [`UploadTicket`]    |
//! | index buffer        | async upload, holds an [`UploadTicket`]    |
//! | animation buffer    | synchronous host copy                      |
//! | orientation buffer  | synchronous host copy, then tangent stage  |
//!
//! The first error aborts the pass. Uploads dispatched before the error are
//! not rolled back: the engine still completes them and their tickets still
//! govern the cache lifetime.
//!
//! [`UploadTicket`]: crate::UploadTicket

use std::fmt;

use crate::asset::{BindingTarget, BufferBinding, SceneAsset};
use crate::cache::{Blob, CacheMonitor, ResourceCache};
use crate::errors::{GltfioError, Result};
use crate::io::{BufferLoader, BufferSource};
use crate::settings::ResourceConfiguration;
use crate::tangents::{PackedQuat, SkipTangents, TangentJob, TangentStage, prepare_job};
use crate::upload::{BufferDescriptor, HostSink, HostTarget, UploadSink};

/// Counters of one successful loading pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Bindings processed.
    pub bindings: usize,
    /// Bindings served from the cache.
    pub cache_hits: usize,
    /// URIs loaded through the buffer loader.
    pub loaded: usize,
    /// Asynchronous uploads dispatched, tangent uploads included.
    pub uploads: usize,
    /// Synchronous host copies.
    pub host_copies: usize,
    /// Primitives handed to the tangent stage.
    pub tangent_jobs: usize,
}

/// Loads the buffers of parsed assets and hands them to the engine.
///
/// A resolver is a loading session: every asset loaded through it shares one
/// [`ResourceCache`]. Dropping the resolver (or calling
/// [`release`](Self::release)) releases the cache; it is destroyed once the
/// engine has completed every upload.
pub struct BindingResolver {
    loader: BufferLoader,
    cache: ResourceCache,
    tangent_stage: Box<dyn TangentStage>,
}

impl BindingResolver {
    #[must_use]
    pub fn new(config: &ResourceConfiguration) -> Self {
        Self::from_loader(BufferLoader::new(config))
    }

    /// Resolver using a custom loader capability.
    #[must_use]
    pub fn with_source(config: &ResourceConfiguration, source: impl BufferSource + 'static) -> Self {
        Self::from_loader(BufferLoader::with_source(config, source))
    }

    fn from_loader(loader: BufferLoader) -> Self {
        Self {
            loader,
            cache: ResourceCache::new(),
            tangent_stage: Box::new(SkipTangents),
        }
    }

    /// Replaces the tangent stage (default: [`SkipTangents`]).
    #[must_use]
    pub fn with_tangent_stage(mut self, stage: impl TangentStage + 'static) -> Self {
        self.tangent_stage = Box::new(stage);
        self
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Observes the cache past the resolver's lifetime.
    #[must_use]
    pub fn monitor(&self) -> CacheMonitor {
        self.cache.monitor()
    }

    #[inline]
    #[must_use]
    pub fn loader(&self) -> &BufferLoader {
        &self.loader
    }

    /// Loads every binding of `asset`.
    ///
    /// Returns `false` and logs the offending URI on the first failure.
    pub fn load_resources<U, H>(&mut self, asset: &SceneAsset, uploads: &mut U, host: &mut H) -> bool
    where
        U: UploadSink + ?Sized,
        H: HostSink + ?Sized,
    {
        match self.try_load_resources(asset, uploads, host) {
            Ok(report) => {
                log::debug!(
                    "Loaded {} bindings ({} cached, {} loaded, {} uploads, {} copies)",
                    report.bindings,
                    report.cache_hits,
                    report.loaded,
                    report.uploads,
                    report.host_copies
                );
                true
            }
            Err(err) => {
                log::error!("{err}");
                false
            }
        }
    }

    /// Same as [`load_resources`](Self::load_resources), returning the error.
    pub fn try_load_resources<U, H>(&mut self, asset: &SceneAsset, uploads: &mut U, host: &mut H) -> Result<LoadReport>
    where
        U: UploadSink + ?Sized,
        H: HostSink + ?Sized,
    {
        let mut report = LoadReport::default();

        for binding in &asset.bindings {
            let blob = self.resolve(binding, &mut report)?;
            let range = byte_range(binding, &blob)?;

            match binding.target {
                Some(BindingTarget::VertexBuffer { buffer, slot }) => {
                    let data = BufferDescriptor::new(blob, range, self.cache.begin_upload());
                    uploads.set_vertex_buffer_at(buffer, slot, data);
                    report.uploads += 1;
                }
                Some(BindingTarget::IndexBuffer(buffer)) => {
                    let data = BufferDescriptor::new(blob, range, self.cache.begin_upload());
                    uploads.set_index_buffer(buffer, data);
                    report.uploads += 1;
                }
                Some(BindingTarget::AnimationBuffer { offset }) => {
                    host.copy_into(HostTarget::Animation, offset, &blob[range])?;
                    report.host_copies += 1;
                }
                Some(BindingTarget::OrientationBuffer { offset }) => {
                    host.copy_into(HostTarget::Orientation, offset, &blob[range])?;
                    report.host_copies += 1;
                }
                None => {
                    return Err(GltfioError::MalformedBinding {
                        uri: binding.uri.clone(),
                    });
                }
            }
            report.bindings += 1;
        }

        if asset.has_orientation_bindings() {
            self.compute_orientations(asset, uploads, &mut report)?;
        }
        Ok(report)
    }

    /// Relinquishes the session; see [`ResourceCache::release`].
    pub fn release(self) {
        drop(self);
    }

    fn resolve(&self, binding: &BufferBinding, report: &mut LoadReport) -> Result<Blob> {
        if let Some(blob) = self.cache.lookup(&binding.uri) {
            report.cache_hits += 1;
            return Ok(blob);
        }

        let bytes = self
            .loader
            .load(&binding.uri, binding.total_size)
            .map_err(|source| GltfioError::ResourceUnavailable {
                uri: binding.uri.clone(),
                source,
            })?;
        report.loaded += 1;
        Ok(self.cache.insert(binding.uri.as_str(), Blob::from(bytes)))
    }

    fn compute_orientations<U>(&mut self, asset: &SceneAsset, uploads: &mut U, report: &mut LoadReport) -> Result<()>
    where
        U: UploadSink + ?Sized,
    {
        for primitive in asset.node_primitives() {
            let Some(job) = prepare_job(primitive, &self.cache) else {
                continue;
            };
            report.tangent_jobs += 1;

            let Some(quats) = self.tangent_stage.compute(&job)? else {
                continue;
            };
            if quats.len() != job.vertex_count {
                return Err(GltfioError::TangentStage(format!(
                    "produced {} orientations for {} vertices",
                    quats.len(),
                    job.vertex_count
                )));
            }
            if self.upload_orientations(&job, &quats, uploads) {
                report.uploads += 1;
            }
        }
        Ok(())
    }

    fn upload_orientations<U>(&self, job: &TangentJob<'_>, quats: &[PackedQuat], uploads: &mut U) -> bool
    where
        U: UploadSink + ?Sized,
    {
        let Some(buffer) = job.primitive.vertex_buffer else {
            log::warn!("Primitive has no vertex buffer, dropping {} orientations", quats.len());
            return false;
        };
        let blob = Blob::from(bytemuck::cast_slice::<PackedQuat, u8>(quats));
        let len = blob.len();
        let data = BufferDescriptor::new(blob, 0..len, self.cache.begin_upload());
        uploads.set_vertex_buffer_at(buffer, job.normal_slot, data);
        true
    }
}

fn byte_range(binding: &BufferBinding, blob: &Blob) -> Result<std::ops::Range<usize>> {
    binding
        .offset
        .checked_add(binding.size)
        .filter(|&end| end <= blob.len())
        .map(|end| binding.offset..end)
        .ok_or_else(|| GltfioError::RangeOutOfBounds {
            uri: binding.uri.clone(),
            offset: binding.offset,
            size: binding.size,
            len: blob.len(),
        })
}

impl fmt::Debug for BindingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingResolver")
            .field("loader", &self.loader)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
