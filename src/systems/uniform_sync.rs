//! Uniform synchronization procedures.
//!
//! A procedure is built once per program and group shape and stored on the
//! program. Each step already knows which group entry it reads, which
//! program uniform it writes, how to encode the value and which upload call
//! to make, so running it does no reflection lookups and no shape matching.

use std::rc::Rc;

use log::warn;

use super::shader::GlProgram;
use crate::device::Device;
use crate::resources::uniforms::{UniformGroup, UniformValue};

/// Appends a value's 32-bit words, column-major.
pub(crate) type Encoder = fn(&UniformValue, &mut Vec<u32>);

/// Issues the upload call for one uniform.
pub(crate) type Upload<D> = fn(&D, &<D as Device>::UniformLocation, &[u32]);

/// One step of a procedure.
pub(crate) enum UniformOp<D: Device> {
    /// A plain value, uploaded when its words differ from the cached ones.
    Value {
        entry: usize,
        uniform: usize,
        encode: Encoder,
        upload: Upload<D>,
    },
    /// A texture, bound to the next free unit.
    Sampler { entry: usize, uniform: usize },
    /// A nested group, synced in turn.
    Group { entry: usize },
    /// A uniform-buffer group bound to a block of the program.
    UniformBuffer { entry: usize, block_index: u32 },
}

/// A cached procedure.
pub(crate) type Procedure<D> = Rc<[UniformOp<D>]>;

fn encode_float(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Float(v) = value {
        out.push(v.to_bits());
    }
}

fn encode_vec2(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Vec2(v) = value {
        out.extend(v.iter().map(|f| f.to_bits()));
    }
}

fn encode_point(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Point(p) = value {
        out.extend([p.x.to_bits(), p.y.to_bits()]);
    }
}

fn encode_vec3(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Vec3(v) = value {
        out.extend(v.iter().map(|f| f.to_bits()));
    }
}

fn encode_vec4(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Vec4(v) = value {
        out.extend(v.iter().map(|f| f.to_bits()));
    }
}

fn encode_int(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Int(v) = value {
        out.push(bytemuck::cast(*v));
    }
}

fn encode_uint(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::UInt(v) = value {
        out.push(*v);
    }
}

fn encode_bool(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Bool(v) = value {
        out.push(u32::from(*v));
    }
}

fn encode_floats(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Floats(v) = value {
        out.extend(v.iter().map(|f| f.to_bits()));
    }
}

fn encode_ints(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Ints(v) = value {
        out.extend_from_slice(bytemuck::cast_slice::<i32, u32>(v));
    }
}

fn encode_mat2(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Mat2(m) = value {
        out.extend(m.to_cols_array().iter().map(|f| f.to_bits()));
    }
}

fn encode_mat3(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Mat3(m) = value {
        out.extend(m.to_cols_array().iter().map(|f| f.to_bits()));
    }
}

fn encode_mat4(value: &UniformValue, out: &mut Vec<u32>) {
    if let UniformValue::Mat4(m) = value {
        out.extend(m.to_cols_array().iter().map(|f| f.to_bits()));
    }
}

/// The encoder for values shaped like `value`.
pub(crate) fn encoder_for(value: &UniformValue) -> Option<Encoder> {
    Some(match value {
        UniformValue::Float(_) => encode_float,
        UniformValue::Vec2(_) => encode_vec2,
        UniformValue::Point(_) => encode_point,
        UniformValue::Vec3(_) => encode_vec3,
        UniformValue::Vec4(_) => encode_vec4,
        UniformValue::Int(_) => encode_int,
        UniformValue::UInt(_) => encode_uint,
        UniformValue::Bool(_) => encode_bool,
        UniformValue::Floats(_) => encode_floats,
        UniformValue::Ints(_) => encode_ints,
        UniformValue::Mat2(_) => encode_mat2,
        UniformValue::Mat3(_) => encode_mat3,
        UniformValue::Mat4(_) => encode_mat4,
        UniformValue::Texture(_) | UniformValue::Group(_) => return None,
    })
}

/// The upload call for a uniform of `gl_type`.
pub(crate) fn upload_for<D: Device>(gl_type: u32) -> Option<Upload<D>> {
    let upload: Upload<D> = match gl_type {
        glow::FLOAT => |gl, l, w| gl.uniform_f32(l, 1, bytemuck::cast_slice(w)),
        glow::FLOAT_VEC2 => |gl, l, w| gl.uniform_f32(l, 2, bytemuck::cast_slice(w)),
        glow::FLOAT_VEC3 => |gl, l, w| gl.uniform_f32(l, 3, bytemuck::cast_slice(w)),
        glow::FLOAT_VEC4 => |gl, l, w| gl.uniform_f32(l, 4, bytemuck::cast_slice(w)),
        glow::INT
        | glow::BOOL
        | glow::SAMPLER_2D
        | glow::SAMPLER_CUBE
        | glow::SAMPLER_2D_ARRAY => |gl, l, w| gl.uniform_i32(l, 1, bytemuck::cast_slice(w)),
        glow::INT_VEC2 | glow::BOOL_VEC2 => |gl, l, w| gl.uniform_i32(l, 2, bytemuck::cast_slice(w)),
        glow::INT_VEC3 | glow::BOOL_VEC3 => |gl, l, w| gl.uniform_i32(l, 3, bytemuck::cast_slice(w)),
        glow::INT_VEC4 | glow::BOOL_VEC4 => |gl, l, w| gl.uniform_i32(l, 4, bytemuck::cast_slice(w)),
        glow::UNSIGNED_INT => |gl, l, w| gl.uniform_u32(l, 1, w),
        glow::UNSIGNED_INT_VEC2 => |gl, l, w| gl.uniform_u32(l, 2, w),
        glow::UNSIGNED_INT_VEC3 => |gl, l, w| gl.uniform_u32(l, 3, w),
        glow::UNSIGNED_INT_VEC4 => |gl, l, w| gl.uniform_u32(l, 4, w),
        glow::FLOAT_MAT2 => |gl, l, w| gl.uniform_matrix_f32(l, 2, bytemuck::cast_slice(w)),
        glow::FLOAT_MAT3 => |gl, l, w| gl.uniform_matrix_f32(l, 3, bytemuck::cast_slice(w)),
        glow::FLOAT_MAT4 => |gl, l, w| gl.uniform_matrix_f32(l, 4, bytemuck::cast_slice(w)),
        _ => return None,
    };
    Some(upload)
}

const fn is_sampler(gl_type: u32) -> bool {
    matches!(
        gl_type,
        glow::SAMPLER_2D | glow::SAMPLER_CUBE | glow::SAMPLER_2D_ARRAY
    )
}

/// Build the procedure syncing `group` into `program`.
///
/// Entries the program does not use are left out.
pub(crate) fn generate<D: Device>(gl: &D, program: &GlProgram<D>, group: &UniformGroup) -> Procedure<D> {
    let mut ops = Vec::new();
    for (entry, (name, value)) in group.uniforms().iter().enumerate() {
        match value {
            UniformValue::Group(nested) if nested.is_uniform_buffer() => {
                match gl.uniform_block_index(program.handle, name) {
                    Some(block_index) => ops.push(UniformOp::UniformBuffer { entry, block_index }),
                    None => warn!("program has no uniform block `{name}`"),
                }
            }
            UniformValue::Group(_) => ops.push(UniformOp::Group { entry }),
            UniformValue::Texture(_) => {
                if let Some(uniform) = program.uniform_index(name) {
                    if is_sampler(program.uniforms[uniform].gl_type) {
                        ops.push(UniformOp::Sampler { entry, uniform });
                    } else {
                        warn!("uniform `{name}` is given a texture but is not a sampler");
                    }
                }
            }
            value => {
                let Some(uniform) = program.uniform_index(name) else {
                    continue;
                };
                let gl_type = program.uniforms[uniform].gl_type;
                match (encoder_for(value), upload_for::<D>(gl_type)) {
                    (Some(encode), Some(upload)) => ops.push(UniformOp::Value {
                        entry,
                        uniform,
                        encode,
                        upload,
                    }),
                    _ => warn!("cannot upload {value:?} to uniform `{name}` of type {gl_type:#x}"),
                }
            }
        }
    }
    ops.into()
}
