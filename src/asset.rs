//! Parsed Asset Description
//!
//! Plain data produced by the glTF parser and consumed read-only by the
//! [`BindingResolver`](crate::BindingResolver):
//!
//! - [`BufferBinding`]: a source byte range (URI + offset + size) and the
//!   destination it must be delivered to.
//! - [`Mesh`] / [`Primitive`] / [`Accessor`]: the vertex attribute layout,
//!   needed by the tangent stage to locate normals and tangents.
//! - [`SceneNode`]: the nodes that instantiate meshes.

use crate::upload::{IndexBufferId, VertexBufferId};

// ============================================================================
// Buffer Bindings
// ============================================================================

/// Destination of a [`BufferBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingTarget {
    /// Upload into slot `slot` of an engine vertex buffer.
    VertexBuffer { buffer: VertexBufferId, slot: u32 },
    /// Upload into an engine index buffer.
    IndexBuffer(IndexBufferId),
    /// Copy into the asset's animation buffer at `offset`.
    AnimationBuffer { offset: usize },
    /// Copy into the asset's orientation buffer at `offset`.
    OrientationBuffer { offset: usize },
}

/// Links a byte range of a URI-addressed buffer to a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferBinding {
    /// URI of the whole glTF buffer (data URI or relative path).
    pub uri: String,
    /// Byte offset of the range inside the buffer.
    pub offset: usize,
    /// Byte length of the range.
    pub size: usize,
    /// Byte length of the whole buffer, as declared by the asset.
    pub total_size: usize,
    /// Destination. `None` marks a malformed binding.
    pub target: Option<BindingTarget>,
}

impl BufferBinding {
    #[must_use]
    pub fn new(uri: impl Into<String>, offset: usize, size: usize, total_size: usize, target: BindingTarget) -> Self {
        Self {
            uri: uri.into(),
            offset,
            size,
            total_size,
            target: Some(target),
        }
    }

    /// A binding covering the whole buffer.
    #[must_use]
    pub fn whole(uri: impl Into<String>, total_size: usize, target: BindingTarget) -> Self {
        Self::new(uri, 0, total_size, total_size, target)
    }
}

// ============================================================================
// Meshes
// ============================================================================

/// Vertex attribute semantics, as named by glTF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    Position,
    Normal,
    Tangent,
    TexCoord(u32),
    Color(u32),
    Joints(u32),
    Weights(u32),
}

/// Location of an attribute's elements inside a URI-addressed buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    /// URI of the buffer the accessor's buffer view points into.
    pub buffer_uri: String,
    /// Byte offset of the buffer view inside the buffer.
    pub view_offset: usize,
    /// Byte offset of the accessor inside the buffer view.
    pub offset: usize,
    /// Number of elements.
    pub count: usize,
    /// Distance in bytes between consecutive elements.
    pub byte_stride: usize,
    /// Size in bytes of one element (12 for a float32 vec3).
    pub element_size: usize,
}

impl Accessor {
    /// Tightly packed accessor starting at `view_offset`.
    #[must_use]
    pub fn packed(buffer_uri: impl Into<String>, view_offset: usize, count: usize, element_size: usize) -> Self {
        Self {
            buffer_uri: buffer_uri.into(),
            view_offset,
            offset: 0,
            count,
            byte_stride: element_size,
            element_size,
        }
    }

    /// Offset of the first element from the start of the buffer, `None` on
    /// overflow.
    #[inline]
    #[must_use]
    pub fn start(&self) -> Option<usize> {
        self.view_offset.checked_add(self.offset)
    }

    /// Number of bytes spanned from the first byte of the first element to
    /// the last byte of the last element, `None` on overflow.
    #[must_use]
    pub fn span(&self) -> Option<usize> {
        match self.count {
            0 => Some(0),
            n => (n - 1).checked_mul(self.byte_stride)?.checked_add(self.element_size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub semantic: AttributeSemantic,
    pub accessor: Accessor,
}

/// A drawable piece of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Primitive {
    /// Attributes in vertex buffer slot order.
    pub attributes: Vec<Attribute>,
    /// Engine vertex buffer created for this primitive.
    pub vertex_buffer: Option<VertexBufferId>,
}

impl Primitive {
    /// Returns the slot index and the attribute with the given semantic.
    #[must_use]
    pub fn find_attribute(&self, semantic: AttributeSemantic) -> Option<(u32, &Attribute)> {
        self.attributes
            .iter()
            .enumerate()
            .find(|(_, attr)| attr.semantic == semantic)
            .map(|(slot, attr)| (slot as u32, attr))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

/// A scene node instantiating at most one mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneNode {
    pub name: Option<String>,
    /// Index into [`SceneAsset::meshes`].
    pub mesh: Option<usize>,
}

// ============================================================================
// SceneAsset
// ============================================================================

/// Everything the resolver needs to know about a parsed asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneAsset {
    /// Buffer bindings, in the order they must be processed.
    pub bindings: Vec<BufferBinding>,
    pub meshes: Vec<Mesh>,
    pub nodes: Vec<SceneNode>,
}

impl SceneAsset {
    #[must_use]
    pub fn new(bindings: Vec<BufferBinding>) -> Self {
        Self {
            bindings,
            ..Default::default()
        }
    }

    /// Returns `true` when any binding fills the orientation buffer.
    #[must_use]
    pub fn has_orientation_bindings(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| matches!(b.target, Some(BindingTarget::OrientationBuffer { .. })))
    }

    /// Iterates over the primitives of every node that references a mesh.
    ///
    /// A mesh instantiated by several nodes is visited once per node.
    /// Nodes pointing at a missing mesh are skipped.
    pub fn node_primitives(&self) -> impl Iterator<Item = &Primitive> + '_ {
        self.nodes
            .iter()
            .filter_map(|node| node.mesh.and_then(|index| self.meshes.get(index)))
            .flat_map(|mesh| mesh.primitives.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal_attr() -> Attribute {
        Attribute {
            semantic: AttributeSemantic::Normal,
            accessor: Accessor::packed("mesh.bin", 0, 3, 12),
        }
    }

    #[test]
    fn accessor_span_accounts_for_stride() {
        let mut accessor = Accessor::packed("mesh.bin", 8, 4, 12);
        assert_eq!(accessor.start(), Some(8));
        assert_eq!(accessor.span(), Some(48));

        accessor.byte_stride = 32;
        accessor.offset = 4;
        assert_eq!(accessor.start(), Some(12));
        assert_eq!(accessor.span(), Some(3 * 32 + 12));

        accessor.count = 0;
        assert_eq!(accessor.span(), Some(0));
    }

    #[test]
    fn accessor_overflow_yields_none() {
        let mut accessor = Accessor::packed("mesh.bin", usize::MAX, 3, 12);
        accessor.offset = 1;
        assert_eq!(accessor.start(), None);

        accessor.offset = 0;
        accessor.byte_stride = usize::MAX / 2 + 1;
        assert_eq!(accessor.span(), None);

        accessor.byte_stride = 12;
        accessor.element_size = usize::MAX;
        assert_eq!(accessor.span(), None);
    }

    #[test]
    fn find_attribute_reports_slot() {
        let prim = Primitive {
            attributes: vec![
                Attribute {
                    semantic: AttributeSemantic::Position,
                    accessor: Accessor::packed("mesh.bin", 0, 3, 12),
                },
                normal_attr(),
            ],
            vertex_buffer: None,
        };
        let (slot, attr) = prim.find_attribute(AttributeSemantic::Normal).unwrap();
        assert_eq!(slot, 1);
        assert_eq!(attr.semantic, AttributeSemantic::Normal);
        assert!(prim.find_attribute(AttributeSemantic::Tangent).is_none());
    }

    #[test]
    fn node_primitives_follow_nodes() {
        let mesh = Mesh {
            name: None,
            primitives: vec![Primitive::default(), Primitive::default()],
        };
        let asset = SceneAsset {
            bindings: Vec::new(),
            meshes: vec![mesh],
            nodes: vec![
                SceneNode { name: None, mesh: Some(0) },
                SceneNode { name: None, mesh: None },
                SceneNode { name: None, mesh: Some(0) },
                SceneNode { name: None, mesh: Some(7) },
            ],
        };
        assert_eq!(asset.node_primitives().count(), 4);
    }

    #[test]
    fn orientation_bindings_are_detected() {
        let mut asset = SceneAsset::new(vec![BufferBinding::whole(
            "anim.bin",
            16,
            BindingTarget::AnimationBuffer { offset: 0 },
        )]);
        assert!(!asset.has_orientation_bindings());

        asset.bindings.push(BufferBinding::whole(
            "mesh.bin",
            16,
            BindingTarget::OrientationBuffer { offset: 0 },
        ));
        assert!(asset.has_orientation_bindings());
    }
}
