//! Destinations of resolved buffer bytes.
//!
//! - [`UploadSink`]: the engine's asynchronous GPU buffer upload API. Every
//!   upload receives a [`BufferDescriptor`] that owns its bytes and an
//!   [`UploadTicket`] on the resource cache; completing (or dropping) the
//!   descriptor is the completion signal.
//! - [`HostSink`]: synchronous copies into host memory (animation and
//!   orientation buffers).

use std::fmt;
use std::ops::Range;

use crate::cache::{Blob, UploadTicket};
use crate::errors::{GltfioError, Result};

/// Engine handle of a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexBufferId(pub u32);

/// Engine handle of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexBufferId(pub u32);

// ============================================================================
// BufferDescriptor
// ============================================================================

/// A byte range handed to the engine for an asynchronous upload.
///
/// The bytes stay valid for as long as the descriptor exists. The engine must
/// call [`complete`](Self::complete) (or drop the descriptor) exactly once,
/// after it has consumed the bytes.
pub struct BufferDescriptor {
    blob: Blob,
    range: Range<usize>,
    ticket: Option<UploadTicket>,
}

impl BufferDescriptor {
    /// Describes `blob[range]`, keeping the cache alive through `ticket`.
    ///
    /// # Panics
    ///
    /// If `range` lies outside of `blob`.
    #[must_use]
    pub fn new(blob: Blob, range: Range<usize>, ticket: UploadTicket) -> Self {
        assert!(
            range.start <= range.end && range.end <= blob.len(),
            "descriptor range {range:?} exceeds blob of {} bytes",
            blob.len()
        );
        Self {
            blob,
            range,
            ticket: Some(ticket),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.blob[self.range.clone()]
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Byte range inside the source blob.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The whole source blob.
    #[must_use]
    pub fn blob(&self) -> &Blob {
        &self.blob
    }

    /// Signals that the engine has finished consuming the bytes.
    pub fn complete(mut self) {
        if let Some(ticket) = self.ticket.take() {
            ticket.redeem();
        }
    }
}

impl fmt::Debug for BufferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferDescriptor")
            .field("range", &self.range)
            .field("blob_len", &self.blob.len())
            .finish()
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// The engine's asynchronous buffer upload API.
///
/// Implementations take ownership of the descriptor and complete it once the
/// upload has finished, possibly on another thread and possibly long after
/// the call returns.
pub trait UploadSink {
    /// Uploads `data` into slot `slot` of a vertex buffer.
    fn set_vertex_buffer_at(&mut self, buffer: VertexBufferId, slot: u32, data: BufferDescriptor);

    /// Uploads `data` into an index buffer.
    fn set_index_buffer(&mut self, buffer: IndexBufferId, data: BufferDescriptor);
}

/// Host memory buffers of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostTarget {
    Animation,
    Orientation,
}

/// Synchronous copies into host memory.
pub trait HostSink {
    fn copy_into(&mut self, target: HostTarget, offset: usize, bytes: &[u8]) -> Result<()>;
}

/// Preallocated animation and orientation buffers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostBuffers {
    pub animation: Vec<u8>,
    pub orientation: Vec<u8>,
}

impl HostBuffers {
    /// Zero-filled buffers of the given sizes.
    #[must_use]
    pub fn with_sizes(animation: usize, orientation: usize) -> Self {
        Self {
            animation: vec![0; animation],
            orientation: vec![0; orientation],
        }
    }

    #[must_use]
    pub fn get(&self, target: HostTarget) -> &[u8] {
        match target {
            HostTarget::Animation => &self.animation,
            HostTarget::Orientation => &self.orientation,
        }
    }
}

impl HostSink for HostBuffers {
    fn copy_into(&mut self, target: HostTarget, offset: usize, bytes: &[u8]) -> Result<()> {
        let dest = match target {
            HostTarget::Animation => &mut self.animation,
            HostTarget::Orientation => &mut self.orientation,
        };
        let capacity = dest.len();
        let end = match offset.checked_add(bytes.len()) {
            Some(end) if end <= capacity => end,
            _ => {
                return Err(GltfioError::HostRangeOutOfBounds {
                    target,
                    offset,
                    size: bytes.len(),
                    capacity,
                });
            }
        };
        dest[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

// ============================================================================
// QueuedUploadSink
// ============================================================================

/// Destination of a queued upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadTarget {
    Vertex { buffer: VertexBufferId, slot: u32 },
    Index(IndexBufferId),
}

/// An upload forwarded by [`QueuedUploadSink`].
#[derive(Debug)]
pub struct UploadRequest {
    pub target: UploadTarget,
    pub data: BufferDescriptor,
}

/// [`UploadSink`] that forwards requests over a channel to the thread that
/// owns the GPU device.
///
/// The receiving side completes each request's descriptor once the bytes have
/// been written to the GPU.
#[derive(Debug, Clone)]
pub struct QueuedUploadSink {
    sender: flume::Sender<UploadRequest>,
}

impl QueuedUploadSink {
    /// Creates a sink and the receiver the device thread drains.
    #[must_use]
    pub fn unbounded() -> (Self, flume::Receiver<UploadRequest>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }

    #[must_use]
    pub fn new(sender: flume::Sender<UploadRequest>) -> Self {
        Self { sender }
    }

    fn submit(&self, target: UploadTarget, data: BufferDescriptor) {
        if let Err(flume::SendError(request)) = self.sender.send(UploadRequest { target, data }) {
            // Nobody will ever consume the bytes; completing here keeps the
            // cache from waiting forever.
            log::warn!("Upload queue disconnected, dropping upload to {:?}", request.target);
            request.data.complete();
        }
    }
}

impl UploadSink for QueuedUploadSink {
    fn set_vertex_buffer_at(&mut self, buffer: VertexBufferId, slot: u32, data: BufferDescriptor) {
        self.submit(UploadTarget::Vertex { buffer, slot }, data);
    }

    fn set_index_buffer(&mut self, buffer: IndexBufferId, data: BufferDescriptor) {
        self.submit(UploadTarget::Index(buffer), data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResourceCache;

    #[test]
    fn descriptor_exposes_range() {
        let cache = ResourceCache::new();
        let blob = cache.insert("mesh.bin", Blob::from(vec![0, 1, 2, 3, 4, 5]));
        let desc = BufferDescriptor::new(blob, 2..5, cache.begin_upload());

        assert_eq!(desc.as_bytes(), &[2, 3, 4]);
        assert_eq!(desc.len(), 3);
        assert_eq!(cache.pending_uploads(), 1);

        desc.complete();
        assert_eq!(cache.pending_uploads(), 0);
    }

    #[test]
    fn dropping_descriptor_completes_upload() {
        let cache = ResourceCache::new();
        let desc = BufferDescriptor::new(Blob::from(vec![7; 4]), 0..4, cache.begin_upload());
        drop(desc);
        assert_eq!(cache.pending_uploads(), 0);
    }

    #[test]
    #[should_panic(expected = "exceeds blob")]
    fn descriptor_rejects_out_of_range() {
        let cache = ResourceCache::new();
        let _ = BufferDescriptor::new(Blob::from(vec![0; 4]), 2..6, cache.begin_upload());
    }

    #[test]
    fn host_copy_within_bounds() {
        let mut host = HostBuffers::with_sizes(8, 4);
        host.copy_into(HostTarget::Animation, 2, &[1, 2, 3]).unwrap();
        host.copy_into(HostTarget::Orientation, 0, &[9, 9, 9, 9]).unwrap();

        assert_eq!(host.get(HostTarget::Animation), &[0, 0, 1, 2, 3, 0, 0, 0]);
        assert_eq!(host.get(HostTarget::Orientation), &[9, 9, 9, 9]);
    }

    #[test]
    fn host_copy_out_of_bounds() {
        let mut host = HostBuffers::with_sizes(4, 0);
        let err = host.copy_into(HostTarget::Animation, 2, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            GltfioError::HostRangeOutOfBounds { capacity: 4, size: 3, offset: 2, .. }
        ));

        let err = host.copy_into(HostTarget::Orientation, usize::MAX, &[1]).unwrap_err();
        assert!(matches!(err, GltfioError::HostRangeOutOfBounds { .. }));
    }

    #[test]
    fn queued_sink_forwards_requests() {
        let cache = ResourceCache::new();
        let (mut sink, receiver) = QueuedUploadSink::unbounded();
        let blob = Blob::from(vec![1, 2, 3, 4]);

        sink.set_index_buffer(IndexBufferId(3), BufferDescriptor::new(blob.clone(), 0..4, cache.begin_upload()));
        sink.set_vertex_buffer_at(VertexBufferId(1), 2, BufferDescriptor::new(blob, 0..2, cache.begin_upload()));
        assert_eq!(cache.pending_uploads(), 2);

        let first = receiver.recv().unwrap();
        assert_eq!(first.target, UploadTarget::Index(IndexBufferId(3)));
        first.data.complete();

        let second = receiver.recv().unwrap();
        assert_eq!(
            second.target,
            UploadTarget::Vertex { buffer: VertexBufferId(1), slot: 2 }
        );
        assert_eq!(second.data.as_bytes(), &[1, 2]);
        drop(second);

        assert_eq!(cache.pending_uploads(), 0);
    }

    #[test]
    fn queued_sink_completes_when_disconnected() {
        let cache = ResourceCache::new();
        let (mut sink, receiver) = QueuedUploadSink::unbounded();
        drop(receiver);

        sink.set_index_buffer(
            IndexBufferId(0),
            BufferDescriptor::new(Blob::from(vec![0; 2]), 0..2, cache.begin_upload()),
        );
        assert_eq!(cache.pending_uploads(), 0);
    }
}
