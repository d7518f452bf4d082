//! Byte buffers backing vertex, index and uniform data.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use bytemuck::Pod;

use super::{DisposeQueue, DisposeRunner, ResourceId};

bitflags! {
    /// What a buffer is used for.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex attribute data.
        const VERTEX = 1 << 0;
        /// Element indices.
        const INDEX = 1 << 1;
        /// Uniform block storage.
        const UNIFORM = 1 << 2;
        /// Source of a copy.
        const COPY_SRC = 1 << 3;
        /// Destination of a copy.
        const COPY_DST = 1 << 4;
        /// Written once, drawn many times.
        const STATIC = 1 << 5;
    }
}

impl BufferUsage {
    /// The bind target for this usage.
    pub fn target(self) -> u32 {
        if self.contains(Self::INDEX) {
            glow::ELEMENT_ARRAY_BUFFER
        } else if self.contains(Self::UNIFORM) {
            glow::UNIFORM_BUFFER
        } else {
            glow::ARRAY_BUFFER
        }
    }

    /// The allocation hint for this usage.
    pub fn draw_hint(self) -> u32 {
        if self.contains(Self::STATIC) {
            glow::STATIC_DRAW
        } else {
            glow::DYNAMIC_DRAW
        }
    }
}

struct BufferInner {
    id: ResourceId,
    data: RefCell<Vec<u8>>,
    usage: BufferUsage,
    update_id: Cell<u64>,
    update_size: Cell<Option<usize>>,
    dispose: DisposeRunner,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        self.dispose.emit(self.id);
    }
}

/// A shared, mutable byte payload.
///
/// Every mutation bumps [`update_id`](Self::update_id); the buffer system
/// re-uploads when its copy of the id is stale.
#[derive(Clone)]
pub struct Buffer {
    inner: Rc<BufferInner>,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.inner.id)
            .field("usage", &self.inner.usage)
            .field("len", &self.len())
            .field("update_id", &self.update_id())
            .finish()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Buffer {
    /// Create a buffer from raw bytes.
    pub fn new(data: Vec<u8>, usage: BufferUsage) -> Self {
        Self {
            inner: Rc::new(BufferInner {
                id: ResourceId::next(),
                data: RefCell::new(data),
                usage,
                update_id: Cell::new(0),
                update_size: Cell::new(None),
                dispose: DisposeRunner::default(),
            }),
        }
    }

    /// Create a buffer from a slice of plain-old-data values.
    pub fn from_slice<T: Pod>(data: &[T], usage: BufferUsage) -> Self {
        Self::new(bytemuck::cast_slice(data).to_vec(), usage)
    }

    /// A vertex buffer.
    pub fn vertex<T: Pod>(data: &[T]) -> Self {
        Self::from_slice(data, BufferUsage::VERTEX)
    }

    /// An index buffer.
    pub fn index<T: Pod>(data: &[T]) -> Self {
        Self::from_slice(data, BufferUsage::INDEX)
    }

    /// Identity of this buffer.
    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.inner.usage
    }

    /// Mutation counter.
    pub fn update_id(&self) -> u64 {
        self.inner.update_id.get()
    }

    /// Leading bytes changed by the last partial write, if any.
    pub fn update_size(&self) -> Option<usize> {
        self.inner.update_size.get()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.inner.data.borrow().len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the payload.
    pub fn data(&self) -> Ref<'_, [u8]> {
        Ref::map(self.inner.data.borrow(), Vec::as_slice)
    }

    /// Replace the whole payload.
    pub fn set_data(&self, data: Vec<u8>) {
        *self.inner.data.borrow_mut() = data;
        self.inner.update_size.set(None);
        self.update();
    }

    /// Overwrite the start of the payload, growing it if needed.
    ///
    /// Only the written prefix is uploaded when the device allocation is
    /// already large enough.
    pub fn write<T: Pod>(&self, values: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        {
            let mut data = self.inner.data.borrow_mut();
            if data.len() < bytes.len() {
                data.resize(bytes.len(), 0);
            }
            data[..bytes.len()].copy_from_slice(bytes);
        }
        self.inner.update_size.set(Some(bytes.len()));
        self.update();
    }

    /// Mark the payload changed.
    pub fn update(&self) {
        self.inner.update_id.set(self.inner.update_id.get() + 1);
    }

    /// Drop the payload and release device objects in every context.
    pub fn destroy(&self) {
        self.inner.data.borrow_mut().clear();
        self.inner.dispose.emit(self.inner.id);
    }

    pub(crate) fn on_dispose(&self, queue: &DisposeQueue) {
        self.inner.dispose.add(queue);
    }
}
