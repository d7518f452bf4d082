//! Uniform values, groups of them, and shaders pairing a group with a program.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use glam::{Mat2, Mat3, Mat4, Vec2};

use super::buffer::{Buffer, BufferUsage};
use super::program::Program;
use super::texture::BaseTexture;
use super::ResourceId;

/// Name of the group the renderer injects into every shader.
pub const GLOBALS: &str = "globals";

/// One uniform value.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    /// `float`
    Float(f32),
    /// `vec2` from an array.
    Vec2([f32; 2]),
    /// `vec2` from a point.
    Point(Vec2),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `int`
    Int(i32),
    /// `uint`
    UInt(u32),
    /// `bool`
    Bool(bool),
    /// Any float array, including vector arrays, flattened.
    Floats(Vec<f32>),
    /// Any int array, including sampler unit arrays.
    Ints(Vec<i32>),
    /// `mat2`
    Mat2(Mat2),
    /// `mat3`
    Mat3(Mat3),
    /// `mat4`
    Mat4(Mat4),
    /// A sampler; `None` samples the empty placeholder.
    Texture(Option<BaseTexture>),
    /// A nested group.
    Group(UniformGroup),
}

impl UniformValue {
    /// Short tag describing the value's shape.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Float(_) => "f",
            Self::Vec2(_) => "v2",
            Self::Point(_) => "p",
            Self::Vec3(_) => "v3",
            Self::Vec4(_) => "v4",
            Self::Int(_) => "i",
            Self::UInt(_) => "u",
            Self::Bool(_) => "b",
            Self::Floats(_) => "fa",
            Self::Ints(_) => "ia",
            Self::Mat2(_) => "m2",
            Self::Mat3(_) => "m3",
            Self::Mat4(_) => "m4",
            Self::Texture(_) => "t",
            Self::Group(g) if g.is_uniform_buffer() => "ubo",
            Self::Group(_) => "g",
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        Self::Vec2(value)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        Self::Point(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        Self::Vec4(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<Mat3> for UniformValue {
    fn from(value: Mat3) -> Self {
        Self::Mat3(value)
    }
}

impl From<BaseTexture> for UniformValue {
    fn from(value: BaseTexture) -> Self {
        Self::Texture(Some(value))
    }
}

impl From<UniformGroup> for UniformValue {
    fn from(value: UniformGroup) -> Self {
        Self::Group(value)
    }
}

struct GroupInner {
    id: ResourceId,
    uniforms: RefCell<Vec<(String, UniformValue)>>,
    dirty_id: Cell<u64>,
    signature: RefCell<Option<Rc<str>>>,
    is_static: bool,
    buffer: Option<Buffer>,
}

/// A named, ordered bag of uniform values.
///
/// Static groups are skipped by the shader system until
/// [`dirty_id`](Self::dirty_id) moves. Groups created with
/// [`uniform_buffer`](Self::uniform_buffer) are uploaded as one uniform block.
#[derive(Clone)]
pub struct UniformGroup {
    inner: Rc<GroupInner>,
}

impl fmt::Debug for UniformGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformGroup")
            .field("id", &self.inner.id)
            .field(
                "uniforms",
                &self
                    .inner
                    .uniforms
                    .borrow()
                    .iter()
                    .map(|(n, _)| n.clone())
                    .collect::<Vec<_>>(),
            )
            .field("dirty_id", &self.dirty_id())
            .finish_non_exhaustive()
    }
}

impl PartialEq for UniformGroup {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl UniformGroup {
    fn with(uniforms: Vec<(String, UniformValue)>, is_static: bool, buffer: Option<Buffer>) -> Self {
        Self {
            inner: Rc::new(GroupInner {
                id: ResourceId::next(),
                uniforms: RefCell::new(uniforms),
                dirty_id: Cell::new(0),
                signature: RefCell::new(None),
                is_static,
                buffer,
            }),
        }
    }

    /// A dynamic group, synced on every bind.
    pub fn new<I, K>(uniforms: I) -> Self
    where
        I: IntoIterator<Item = (K, UniformValue)>,
        K: Into<String>,
    {
        Self::with(collect(uniforms), false, None)
    }

    /// A static group, synced only after it changes.
    pub fn new_static<I, K>(uniforms: I) -> Self
    where
        I: IntoIterator<Item = (K, UniformValue)>,
        K: Into<String>,
    {
        Self::with(collect(uniforms), true, None)
    }

    /// A static group backed by a uniform buffer.
    pub fn uniform_buffer<I, K>(uniforms: I) -> Self
    where
        I: IntoIterator<Item = (K, UniformValue)>,
        K: Into<String>,
    {
        Self::with(
            collect(uniforms),
            true,
            Some(Buffer::new(Vec::new(), BufferUsage::UNIFORM)),
        )
    }

    /// Identity of this group.
    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Change counter.
    pub fn dirty_id(&self) -> u64 {
        self.inner.dirty_id.get()
    }

    /// Skipped while unchanged.
    pub fn is_static(&self) -> bool {
        self.inner.is_static
    }

    /// Uploaded as a uniform block.
    pub fn is_uniform_buffer(&self) -> bool {
        self.inner.buffer.is_some()
    }

    /// The backing buffer of a uniform-block group.
    pub fn buffer(&self) -> Option<&Buffer> {
        self.inner.buffer.as_ref()
    }

    /// Borrow the values in insertion order.
    pub fn uniforms(&self) -> Ref<'_, [(String, UniformValue)]> {
        Ref::map(self.inner.uniforms.borrow(), Vec::as_slice)
    }

    /// A copy of one value.
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.inner
            .uniforms
            .borrow()
            .iter()
            .find_map(|(n, v)| (n == name).then(|| v.clone()))
    }

    /// Set a value and mark the group changed.
    pub fn set(&self, name: &str, value: impl Into<UniformValue>) {
        self.set_silent(name, value.into());
        self.update();
    }

    /// Set a value without touching the change counter.
    pub(crate) fn set_silent(&self, name: &str, value: UniformValue) {
        let mut uniforms = self.inner.uniforms.borrow_mut();
        let reshaped = match uniforms.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => {
                let reshaped = slot.kind() != value.kind();
                *slot = value;
                reshaped
            }
            None => {
                uniforms.push((name.to_owned(), value));
                true
            }
        };
        if reshaped {
            self.inner.signature.replace(None);
        }
    }

    /// Mark the group changed.
    pub fn update(&self) {
        self.inner.dirty_id.set(self.inner.dirty_id.get() + 1);
    }

    /// Shape signature: names and value kinds in order. Built once and
    /// kept until a `set` adds a name or changes a value's kind.
    pub(crate) fn signature(&self) -> Rc<str> {
        if let Some(signature) = self.inner.signature.borrow().as_ref() {
            return Rc::clone(signature);
        }
        let uniforms = self.inner.uniforms.borrow();
        let mut signature = String::new();
        for (name, value) in uniforms.iter() {
            signature.push_str(name);
            signature.push(':');
            signature.push_str(value.kind());
            signature.push(';');
        }
        let signature: Rc<str> = signature.into();
        self.inner.signature.replace(Some(Rc::clone(&signature)));
        signature
    }
}

fn collect<I, K>(uniforms: I) -> Vec<(String, UniformValue)>
where
    I: IntoIterator<Item = (K, UniformValue)>,
    K: Into<String>,
{
    uniforms.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// A program plus the values it runs with.
#[derive(Clone, Debug)]
pub struct Shader {
    /// Sources.
    pub program: Program,
    /// Values; the renderer adds the [`GLOBALS`] group on bind.
    pub uniforms: UniformGroup,
}

impl Shader {
    /// Pair a program with its uniforms.
    pub fn new(program: Program, uniforms: UniformGroup) -> Self {
        Self { program, uniforms }
    }

    /// Build from sources, sharing the program with identical sources.
    pub fn from_sources(vertex: &str, fragment: &str, name: &str, uniforms: UniformGroup) -> Self {
        Self::new(Program::from_sources(vertex, fragment, name), uniforms)
    }
}
