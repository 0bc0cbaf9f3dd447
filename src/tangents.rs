//! Tangent-space orientation stage.
//!
//! When an asset fills an orientation buffer, every mesh primitive with a
//! resolved NORMAL attribute gets one packed orientation quaternion per
//! vertex. The resolver locates the attribute bytes through the resource
//! cache and hands them to a [`TangentStage`] as a [`TangentJob`]; the stage
//! owns the numeric method. The quaternions it returns are uploaded into the
//! primitive's vertex buffer at the normal attribute's slot.

use glam::{Vec3, Vec4};

use crate::asset::{Accessor, AttributeSemantic, Primitive};
use crate::cache::{Blob, ResourceCache};
use crate::errors::Result;

/// One orientation quaternion, packed as four half floats.
pub type PackedQuat = [half::f16; 4];

/// Strided view of an attribute's elements inside a resolved blob.
#[derive(Debug, Clone)]
pub struct AttributeView {
    blob: Blob,
    start: usize,
    stride: usize,
    element_size: usize,
    count: usize,
}

impl AttributeView {
    /// Returns `None` when the accessor does not fit in `blob`.
    #[must_use]
    pub fn new(blob: Blob, accessor: &Accessor) -> Option<Self> {
        let start = accessor.start()?;
        let end = start.checked_add(accessor.span()?)?;
        if end > blob.len() || (accessor.count > 1 && accessor.byte_stride < accessor.element_size) {
            return None;
        }
        Some(Self {
            blob,
            start,
            stride: accessor.byte_stride,
            element_size: accessor.element_size,
            count: accessor.count,
        })
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Raw bytes of element `index`.
    #[must_use]
    pub fn element(&self, index: usize) -> Option<&[u8]> {
        if index >= self.count {
            return None;
        }
        let offset = self.start + index * self.stride;
        Some(&self.blob[offset..offset + self.element_size])
    }

    /// Reads the elements as float32 vec3, `None` if they are narrower.
    #[must_use]
    pub fn to_vec3(&self) -> Option<Vec<Vec3>> {
        self.read::<3>().map(|v| v.into_iter().map(Vec3::from_array).collect())
    }

    /// Reads the elements as float32 vec4, `None` if they are narrower.
    #[must_use]
    pub fn to_vec4(&self) -> Option<Vec<Vec4>> {
        self.read::<4>().map(|v| v.into_iter().map(Vec4::from_array).collect())
    }

    fn read<const N: usize>(&self) -> Option<Vec<[f32; N]>> {
        let width = N * std::mem::size_of::<f32>();
        if self.element_size < width {
            return None;
        }
        (0..self.count)
            .map(|i| self.element(i).map(|bytes| bytemuck::pod_read_unaligned::<[f32; N]>(&bytes[..width])))
            .collect()
    }
}

/// Input of a [`TangentStage`] for one primitive.
#[derive(Debug, Clone)]
pub struct TangentJob<'a> {
    pub primitive: &'a Primitive,
    pub vertex_count: usize,
    /// Vertex buffer slot of the NORMAL attribute.
    pub normal_slot: u32,
    pub normals: AttributeView,
    pub tangents: Option<AttributeView>,
}

impl TangentJob<'_> {
    /// Float32 normals, if the attribute is stored as float32.
    #[must_use]
    pub fn normals(&self) -> Option<Vec<Vec3>> {
        self.normals.to_vec3()
    }

    /// Float32 tangents with handedness in `w`, if present.
    #[must_use]
    pub fn tangents(&self) -> Option<Vec<Vec4>> {
        self.tangents.as_ref().and_then(AttributeView::to_vec4)
    }
}

/// Builds the job for `primitive`, or `None` when it has nothing to orient.
#[must_use]
pub fn prepare_job<'a>(primitive: &'a Primitive, cache: &ResourceCache) -> Option<TangentJob<'a>> {
    let (normal_slot, normal) = primitive.find_attribute(AttributeSemantic::Normal)?;
    let vertex_count = normal.accessor.count;
    if vertex_count == 0 {
        return None;
    }

    let Some(blob) = cache.lookup(&normal.accessor.buffer_uri) else {
        log::debug!("Normals buffer {} was not loaded, skipping primitive", normal.accessor.buffer_uri);
        return None;
    };
    let Some(normals) = AttributeView::new(blob, &normal.accessor) else {
        log::warn!("Normal accessor exceeds buffer {}", normal.accessor.buffer_uri);
        return None;
    };

    let tangents = primitive
        .find_attribute(AttributeSemantic::Tangent)
        .and_then(|(_, tangent)| {
            if tangent.accessor.count != vertex_count {
                log::warn!(
                    "Ignoring tangent accessor in {}: {} tangents for {} normals",
                    tangent.accessor.buffer_uri,
                    tangent.accessor.count,
                    vertex_count
                );
                return None;
            }
            let view = cache
                .lookup(&tangent.accessor.buffer_uri)
                .and_then(|blob| AttributeView::new(blob, &tangent.accessor));
            if view.is_none() {
                log::warn!("Ignoring unusable tangent accessor in {}", tangent.accessor.buffer_uri);
            }
            view
        });

    Some(TangentJob {
        primitive,
        vertex_count,
        normal_slot,
        normals,
        tangents,
    })
}

/// Derives per-vertex orientations for a primitive.
///
/// Returning `Ok(None)` leaves the primitive untouched. A returned vector
/// must hold exactly `job.vertex_count` quaternions.
pub trait TangentStage {
    fn compute(&mut self, job: &TangentJob<'_>) -> Result<Option<Vec<PackedQuat>>>;
}

impl<F> TangentStage for F
where
    F: FnMut(&TangentJob<'_>) -> Result<Option<Vec<PackedQuat>>>,
{
    fn compute(&mut self, job: &TangentJob<'_>) -> Result<Option<Vec<PackedQuat>>> {
        self(job)
    }
}

/// Stage that leaves every primitive untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipTangents;

impl TangentStage for SkipTangents {
    fn compute(&mut self, job: &TangentJob<'_>) -> Result<Option<Vec<PackedQuat>>> {
        log::debug!("No tangent stage installed, skipping {} vertices", job.vertex_count);
        Ok(None)
    }
}
