//! Vertex layouts: named attributes over shared buffers plus an index buffer.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::buffer::{Buffer, BufferUsage};
use super::{DisposeQueue, DisposeRunner, ResourceId};

/// Component layout of one attribute element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// One `f32`.
    Float32,
    /// Two `f32`.
    Float32x2,
    /// Three `f32`.
    Float32x3,
    /// Four `f32`.
    Float32x4,
    /// Four `u8` normalized to `0.0..=1.0`.
    Unorm8x4,
    /// Four `u8` read as integers.
    Uint8x4,
    /// Two `u16` normalized to `0.0..=1.0`.
    Unorm16x2,
    /// Two `i16` read as integers.
    Sint16x2,
    /// One `u32` read as an integer.
    Uint32,
}

impl VertexFormat {
    /// Components per element.
    pub const fn components(self) -> i32 {
        match self {
            Self::Float32 | Self::Uint32 => 1,
            Self::Float32x2 | Self::Unorm16x2 | Self::Sint16x2 => 2,
            Self::Float32x3 => 3,
            Self::Float32x4 | Self::Unorm8x4 | Self::Uint8x4 => 4,
        }
    }

    /// GL component type.
    pub const fn data_type(self) -> u32 {
        match self {
            Self::Float32 | Self::Float32x2 | Self::Float32x3 | Self::Float32x4 => glow::FLOAT,
            Self::Unorm8x4 | Self::Uint8x4 => glow::UNSIGNED_BYTE,
            Self::Unorm16x2 => glow::UNSIGNED_SHORT,
            Self::Sint16x2 => glow::SHORT,
            Self::Uint32 => glow::UNSIGNED_INT,
        }
    }

    /// Bytes per component.
    pub const fn component_size(self) -> u32 {
        match self {
            Self::Float32 | Self::Float32x2 | Self::Float32x3 | Self::Float32x4 | Self::Uint32 => 4,
            Self::Unorm16x2 | Self::Sint16x2 => 2,
            Self::Unorm8x4 | Self::Uint8x4 => 1,
        }
    }

    /// Bytes per element.
    #[expect(clippy::cast_sign_loss)]
    pub const fn byte_size(self) -> u32 {
        self.components() as u32 * self.component_size()
    }

    /// Fixed-point values are normalized.
    pub const fn normalized(self) -> bool {
        matches!(self, Self::Unorm8x4 | Self::Unorm16x2)
    }

    /// Values reach the shader as integers.
    pub const fn integer(self) -> bool {
        matches!(self, Self::Uint8x4 | Self::Sint16x2 | Self::Uint32)
    }
}

/// Primitive assembly mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Points.
    Points,
    /// Independent lines.
    Lines,
    /// A closed line loop.
    LineLoop,
    /// A connected line strip.
    LineStrip,
    /// Independent triangles.
    #[default]
    Triangles,
    /// A triangle strip.
    TriangleStrip,
    /// A triangle fan.
    TriangleFan,
}

impl Topology {
    /// GL draw mode.
    pub const fn gl_mode(self) -> u32 {
        match self {
            Self::Points => glow::POINTS,
            Self::Lines => glow::LINES,
            Self::LineLoop => glow::LINE_LOOP,
            Self::LineStrip => glow::LINE_STRIP,
            Self::Triangles => glow::TRIANGLES,
            Self::TriangleStrip => glow::TRIANGLE_STRIP,
            Self::TriangleFan => glow::TRIANGLE_FAN,
        }
    }
}

/// Width of the elements in an index buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// `u16` indices.
    #[default]
    U16,
    /// `u32` indices; needs `element_index_uint` on WebGL1.
    U32,
}

impl IndexFormat {
    /// Bytes per index.
    pub const fn byte_size(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// GL element type.
    pub const fn gl_type(self) -> u32 {
        match self {
            Self::U16 => glow::UNSIGNED_SHORT,
            Self::U32 => glow::UNSIGNED_INT,
        }
    }
}

/// One vertex attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Source of the data.
    pub buffer: Buffer,
    /// Element layout.
    pub format: VertexFormat,
    /// Bytes between elements. Derived from sibling attributes when `None`.
    pub stride: Option<u32>,
    /// Byte offset of the first element. Derived when `None`.
    pub offset: Option<u32>,
    /// Advance once per instance rather than per vertex.
    pub instance: bool,
}

impl Attribute {
    /// A per-vertex attribute with derived stride and offset.
    pub fn new(buffer: Buffer, format: VertexFormat) -> Self {
        Self {
            buffer,
            format,
            stride: None,
            offset: None,
            instance: false,
        }
    }

    /// Fix the stride.
    #[must_use]
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = Some(stride);
        self
    }

    /// Fix the offset.
    #[must_use]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Advance per instance.
    #[must_use]
    pub fn instanced(mut self) -> Self {
        self.instance = true;
        self
    }
}

/// An attribute with its stride and offset resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AttributeLayout {
    /// Element layout.
    pub format: VertexFormat,
    /// Bytes between elements; zero for a tightly packed single attribute.
    pub stride: u32,
    /// Byte offset of the first element.
    pub offset: u32,
    /// Per-instance attribute.
    pub instance: bool,
}

struct GeometryInner {
    id: ResourceId,
    attributes: Vec<(String, Attribute)>,
    index: Option<(Buffer, IndexFormat)>,
    topology: Topology,
    instance_count: u32,
    dispose: DisposeRunner,
}

impl Drop for GeometryInner {
    fn drop(&mut self) {
        self.dispose.emit(self.id);
    }
}

/// An immutable vertex layout. Buffer contents stay mutable.
#[derive(Clone)]
pub struct Geometry {
    inner: Rc<GeometryInner>,
}

impl fmt::Debug for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geometry")
            .field("id", &self.inner.id)
            .field(
                "attributes",
                &self.inner.attributes.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("indexed", &self.inner.index.is_some())
            .finish()
    }
}

impl Geometry {
    /// Start a new layout.
    pub fn builder() -> GeometryBuilder {
        GeometryBuilder::default()
    }

    /// A builder seeded with this layout, sharing its buffers.
    ///
    /// Replacing an attribute by name on the builder leaves the others
    /// pointing at the same buffers.
    pub fn to_builder(&self) -> GeometryBuilder {
        GeometryBuilder {
            attributes: self.inner.attributes.clone(),
            index: self.inner.index.clone(),
            topology: self.inner.topology,
            instance_count: self.inner.instance_count,
        }
    }

    /// A copy of this layout with every buffer duplicated.
    pub fn deep_clone(&self) -> Self {
        let mut copies: HashMap<ResourceId, Buffer> = HashMap::new();
        let mut copy = |buffer: &Buffer| {
            copies
                .entry(buffer.id())
                .or_insert_with(|| Buffer::new(buffer.data().to_vec(), buffer.usage()))
                .clone()
        };
        let mut builder = self.to_builder();
        for (_, attribute) in &mut builder.attributes {
            attribute.buffer = copy(&attribute.buffer);
        }
        if let Some((buffer, _)) = &mut builder.index {
            *buffer = copy(buffer);
        }
        builder.build()
    }

    /// Identity of this geometry.
    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[(String, Attribute)] {
        &self.inner.attributes
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.inner
            .attributes
            .iter()
            .find_map(|(n, a)| (n == name).then_some(a))
    }

    /// The index buffer and its element width.
    pub fn index(&self) -> Option<(&Buffer, IndexFormat)> {
        self.inner.index.as_ref().map(|(b, f)| (b, *f))
    }

    /// Default draw mode.
    pub fn topology(&self) -> Topology {
        self.inner.topology
    }

    /// Whether any attribute advances per instance.
    pub fn instanced(&self) -> bool {
        self.inner.attributes.iter().any(|(_, a)| a.instance)
    }

    /// Default instance count.
    pub fn instance_count(&self) -> u32 {
        self.inner.instance_count
    }

    /// Distinct buffers in first-use order, index buffer last.
    pub fn buffers(&self) -> Vec<Buffer> {
        let mut buffers: Vec<Buffer> = Vec::new();
        for (_, attribute) in &self.inner.attributes {
            if !buffers.contains(&attribute.buffer) {
                buffers.push(attribute.buffer.clone());
            }
        }
        if let Some((index, _)) = &self.inner.index {
            if !buffers.contains(index) {
                buffers.push(index.clone());
            }
        }
        buffers
    }

    /// Number of indices, if indexed.
    pub fn index_count(&self) -> Option<u32> {
        self.inner.index.as_ref().map(|(buffer, format)| {
            u32::try_from(buffer.len()).unwrap_or(u32::MAX) / format.byte_size()
        })
    }

    /// Vertex count derived from the first attribute.
    pub fn size(&self) -> u32 {
        let layouts = self.layout();
        let Some(((_, attribute), layout)) = self.inner.attributes.iter().zip(&layouts).next()
        else {
            return 0;
        };
        let step = if layout.stride == 0 {
            layout.format.byte_size()
        } else {
            layout.stride
        };
        u32::try_from(attribute.buffer.len()).unwrap_or(u32::MAX) / step.max(1)
    }

    /// Resolve stride and offset of every attribute.
    ///
    /// Attributes sharing a buffer are packed in declaration order. The
    /// derived stride is the sum of their element sizes, collapsing to zero
    /// when a single attribute fills it alone.
    pub fn layout(&self) -> Vec<AttributeLayout> {
        let mut stride: HashMap<ResourceId, u32> = HashMap::new();
        for (_, attribute) in &self.inner.attributes {
            *stride.entry(attribute.buffer.id()).or_default() += attribute.format.byte_size();
        }

        let mut start: HashMap<ResourceId, u32> = HashMap::new();
        self.inner
            .attributes
            .iter()
            .map(|(_, attribute)| {
                let size = attribute.format.byte_size();
                let total = stride.get(&attribute.buffer.id()).copied().unwrap_or(size);
                let stride = attribute
                    .stride
                    .unwrap_or(if total == size { 0 } else { total });
                let offset = attribute.offset.unwrap_or_else(|| {
                    let next = start.entry(attribute.buffer.id()).or_default();
                    let offset = *next;
                    *next += size;
                    offset
                });
                AttributeLayout {
                    format: attribute.format,
                    stride,
                    offset,
                    instance: attribute.instance,
                }
            })
            .collect()
    }

    /// Release vertex arrays in every context, and optionally the buffers.
    pub fn destroy(&self, destroy_buffers: bool) {
        self.inner.dispose.emit(self.inner.id);
        if destroy_buffers {
            for buffer in self.buffers() {
                buffer.destroy();
            }
        }
    }

    pub(crate) fn on_dispose(&self, queue: &DisposeQueue) {
        self.inner.dispose.add(queue);
    }
}

/// Builds a [`Geometry`].
#[derive(Default, Clone)]
pub struct GeometryBuilder {
    attributes: Vec<(String, Attribute)>,
    index: Option<(Buffer, IndexFormat)>,
    topology: Topology,
    instance_count: u32,
}

impl GeometryBuilder {
    /// Add or replace an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        let name = name.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = attribute,
            None => self.attributes.push((name, attribute)),
        }
        self
    }

    /// Add a per-vertex attribute over a new buffer built from `data`.
    #[must_use]
    pub fn attribute_data<T: bytemuck::Pod>(
        self,
        name: impl Into<String>,
        data: &[T],
        format: VertexFormat,
    ) -> Self {
        self.attribute(name, Attribute::new(Buffer::vertex(data), format))
    }

    /// Set the index buffer.
    #[must_use]
    pub fn index(mut self, buffer: Buffer, format: IndexFormat) -> Self {
        self.index = Some((buffer, format));
        self
    }

    /// Set a 16-bit index buffer from values.
    #[must_use]
    pub fn indices_u16(self, indices: &[u16]) -> Self {
        self.index(
            Buffer::from_slice(indices, BufferUsage::INDEX),
            IndexFormat::U16,
        )
    }

    /// Set a 32-bit index buffer from values.
    #[must_use]
    pub fn indices_u32(self, indices: &[u32]) -> Self {
        self.index(
            Buffer::from_slice(indices, BufferUsage::INDEX),
            IndexFormat::U32,
        )
    }

    /// Default draw mode.
    #[must_use]
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Default instance count for instanced draws.
    #[must_use]
    pub fn instance_count(mut self, count: u32) -> Self {
        self.instance_count = count;
        self
    }

    /// Finish.
    pub fn build(self) -> Geometry {
        Geometry {
            inner: Rc::new(GeometryInner {
                id: ResourceId::next(),
                attributes: self.attributes,
                index: self.index,
                topology: self.topology,
                instance_count: self.instance_count.max(1),
                dispose: DisposeRunner::default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interleaved() -> Geometry {
        let buffer = Buffer::vertex(&[0.0f32; 24]);
        Geometry::builder()
            .attribute("aPosition", Attribute::new(buffer.clone(), VertexFormat::Float32x2))
            .attribute("aUv", Attribute::new(buffer.clone(), VertexFormat::Float32x2))
            .attribute("aColor", Attribute::new(buffer, VertexFormat::Unorm8x4))
            .build()
    }

    #[test]
    fn shared_buffer_packs_in_declaration_order() {
        let layout = interleaved().layout();
        assert_eq!(
            layout.iter().map(|l| (l.stride, l.offset)).collect::<Vec<_>>(),
            vec![(20, 0), (20, 8), (20, 16)]
        );
    }

    #[test]
    fn lone_attribute_is_tightly_packed() {
        let geometry = Geometry::builder()
            .attribute_data("aPosition", &[0.0f32; 8], VertexFormat::Float32x2)
            .attribute_data("aUv", &[0.0f32; 8], VertexFormat::Float32x2)
            .build();
        let layout = geometry.layout();
        assert!(layout.iter().all(|l| l.stride == 0 && l.offset == 0));
        assert_eq!(geometry.size(), 4);
    }

    #[test]
    fn explicit_stride_and_offset_win() {
        let buffer = Buffer::vertex(&[0.0f32; 8]);
        let geometry = Geometry::builder()
            .attribute(
                "a",
                Attribute::new(buffer.clone(), VertexFormat::Float32)
                    .with_stride(16)
                    .with_offset(12),
            )
            .attribute("b", Attribute::new(buffer, VertexFormat::Float32x2))
            .build();
        let layout = geometry.layout();
        assert_eq!((layout[0].stride, layout[0].offset), (16, 12));
        assert_eq!((layout[1].stride, layout[1].offset), (12, 0));
    }

    #[test]
    fn size_uses_first_attribute() {
        assert_eq!(interleaved().size(), 96 / 20);
    }

    #[test]
    fn builder_replaces_by_name_and_shares_buffers() {
        let base = interleaved();
        let uv = Buffer::vertex(&[1.0f32; 8]);
        let derived = base
            .to_builder()
            .attribute("aUv", Attribute::new(uv.clone(), VertexFormat::Float32x2))
            .build();

        assert_ne!(base.id(), derived.id());
        assert_eq!(derived.attributes().len(), 3);
        assert_eq!(derived.attribute("aUv").map(|a| &a.buffer), Some(&uv));
        assert_eq!(
            derived.attribute("aPosition").map(|a| a.buffer.id()),
            base.attribute("aPosition").map(|a| a.buffer.id())
        );
    }

    #[test]
    fn deep_clone_duplicates_shared_buffer_once() {
        let base = interleaved();
        let copy = base.deep_clone();
        let buffers = copy.buffers();
        assert_eq!(buffers.len(), 1);
        assert_ne!(buffers[0].id(), base.buffers()[0].id());
        assert_eq!(buffers[0].len(), 96);
    }

    #[test]
    fn index_count_follows_format() {
        let geometry = Geometry::builder()
            .attribute_data("aPosition", &[0.0f32; 8], VertexFormat::Float32x2)
            .indices_u32(&[0, 1, 2, 0, 2, 3])
            .build();
        assert_eq!(geometry.index_count(), Some(6));
        assert_eq!(geometry.buffers().len(), 2);
    }

    #[test]
    fn destroy_can_take_buffers_along() {
        let geometry = interleaved();
        let buffer = geometry.buffers()[0].clone();
        geometry.destroy(false);
        assert_eq!(buffer.len(), 96);
        geometry.destroy(true);
        assert!(buffer.is_empty());
    }
}
