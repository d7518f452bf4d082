//! std140-style placement of uniform-block members.
//!
//! Values are packed into 16-byte chunks. A value that would straddle a
//! chunk it does not fit in starts the next one; arrays and matrices always
//! start on a 16-byte boundary and array elements are padded to 16 bytes.
//! The block size is rounded up to a multiple of 16.

use super::uniform_sync::encoder_for;
use crate::device::ActiveVariable;
use crate::resources::uniforms::UniformValue;

/// Placement of one block member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UboElement {
    /// Member name without any `[0]` suffix.
    pub name: String,
    /// GL type enum.
    pub gl_type: u32,
    /// Array length, 1 for non-arrays.
    pub array_size: u32,
    /// Byte offset in the block.
    pub offset: u32,
    /// Bytes occupied, including array padding.
    pub size: u32,
}

/// Placement of a whole block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UboLayout {
    /// Members in declaration order.
    pub elements: Vec<UboElement>,
    /// Total bytes, a multiple of 16.
    pub size: u32,
}

/// Bytes one value of `gl_type` occupies, matrices with padded columns.
pub const fn std140_size(gl_type: u32) -> u32 {
    match gl_type {
        glow::FLOAT | glow::INT | glow::UNSIGNED_INT | glow::BOOL => 4,
        glow::FLOAT_VEC2 | glow::INT_VEC2 | glow::UNSIGNED_INT_VEC2 | glow::BOOL_VEC2 => 8,
        glow::FLOAT_VEC3 | glow::INT_VEC3 | glow::UNSIGNED_INT_VEC3 | glow::BOOL_VEC3 => 12,
        glow::FLOAT_MAT2 => 32,
        glow::FLOAT_MAT3 => 48,
        glow::FLOAT_MAT4 => 64,
        _ => 16,
    }
}

/// `(columns, rows)` of a value of `gl_type`.
const fn shape(gl_type: u32) -> (u32, u32) {
    match gl_type {
        glow::FLOAT_MAT2 => (2, 2),
        glow::FLOAT_MAT3 => (3, 3),
        glow::FLOAT_MAT4 => (4, 4),
        _ => (1, std140_size(gl_type) / 4),
    }
}

/// Place `members`, given as `(name, gl_type, array_size)`, in order.
pub fn create_layout<'a>(members: impl IntoIterator<Item = (&'a str, u32, u32)>) -> UboLayout {
    let mut elements = Vec::new();
    let mut chunk = 0u32;
    let mut offset = 0u32;

    for (name, gl_type, array_size) in members {
        let mut size = std140_size(gl_type);
        if array_size > 1 {
            size = size.max(16) * array_size;
        }

        if chunk % size != 0 && chunk < 16 {
            let line_up = (chunk % size) % 16;
            chunk += line_up;
            offset += line_up;
        }

        let start = if chunk + size > 16 {
            offset = offset.next_multiple_of(16);
            chunk = size;
            offset
        } else {
            chunk += size;
            offset
        };
        offset += size;

        elements.push(UboElement {
            name: name.trim_end_matches("[0]").to_owned(),
            gl_type,
            array_size,
            offset: start,
            size,
        });
    }

    UboLayout {
        elements,
        size: offset.next_multiple_of(16),
    }
}

/// Layout for the values of a uniform-buffer group.
///
/// Types come from the program's reflection when it knows the member and
/// from the value otherwise. Samplers and nested groups are skipped.
pub fn layout_for_group(
    uniforms: &[(String, UniformValue)],
    reflection: &[ActiveVariable],
) -> UboLayout {
    let members: Vec<(&str, u32, u32)> = uniforms
        .iter()
        .filter_map(|(name, value)| {
            let reflected = reflection
                .iter()
                .find(|v| v.name.trim_end_matches("[0]") == name.as_str())
                .map(|v| (v.gl_type, u32::try_from(v.size).unwrap_or(1)));
            reflected
                .or_else(|| infer(value))
                .map(|(gl_type, size)| (name.as_str(), gl_type, size))
        })
        .collect();
    create_layout(members)
}

/// GL type and array size implied by a value's shape.
fn infer(value: &UniformValue) -> Option<(u32, u32)> {
    let len = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
    Some(match value {
        UniformValue::Float(_) => (glow::FLOAT, 1),
        UniformValue::Vec2(_) | UniformValue::Point(_) => (glow::FLOAT_VEC2, 1),
        UniformValue::Vec3(_) => (glow::FLOAT_VEC3, 1),
        UniformValue::Vec4(_) => (glow::FLOAT_VEC4, 1),
        UniformValue::Int(_) => (glow::INT, 1),
        UniformValue::UInt(_) => (glow::UNSIGNED_INT, 1),
        UniformValue::Bool(_) => (glow::BOOL, 1),
        UniformValue::Floats(v) => (glow::FLOAT, len(v.len())),
        UniformValue::Ints(v) => (glow::INT, len(v.len())),
        UniformValue::Mat2(_) => (glow::FLOAT_MAT2, 1),
        UniformValue::Mat3(_) => (glow::FLOAT_MAT3, 1),
        UniformValue::Mat4(_) => (glow::FLOAT_MAT4, 1),
        UniformValue::Texture(_) | UniformValue::Group(_) => return None,
    })
}

/// Write `uniforms` into `out` according to `layout`. `out` must be at least
/// `layout.size` bytes; members without a value are left untouched.
pub fn write(layout: &UboLayout, uniforms: &[(String, UniformValue)], out: &mut [u8]) {
    for element in &layout.elements {
        let Some((_, value)) = uniforms.iter().find(|(n, _)| *n == element.name) else {
            continue;
        };
        let Some(encode) = encoder_for(value) else {
            continue;
        };
        let mut source = Vec::new();
        encode(value, &mut source);
        let (columns, rows) = shape(element.gl_type);
        let column_stride = if columns > 1 { 4 } else { rows };
        let element_stride = if element.array_size > 1 {
            std140_size(element.gl_type).max(16) / 4
        } else {
            std140_size(element.gl_type) / 4
        };
        let base = (element.offset / 4) as usize;

        let mut src = source.iter();
        'fill: for index in 0..element.array_size {
            for column in 0..columns {
                for row in 0..rows {
                    let Some(word) = src.next() else {
                        break 'fill;
                    };
                    let dst = base + (index * element_stride + column * column_stride + row) as usize;
                    if let Some(slot) = out.get_mut(dst * 4..dst * 4 + 4) {
                        slot.copy_from_slice(&word.to_ne_bytes());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat3;

    use super::*;

    const TYPES: [u32; 10] = [
        glow::FLOAT,
        glow::FLOAT_VEC2,
        glow::FLOAT_VEC3,
        glow::FLOAT_VEC4,
        glow::INT,
        glow::INT_VEC2,
        glow::BOOL,
        glow::FLOAT_MAT2,
        glow::FLOAT_MAT3,
        glow::FLOAT_MAT4,
    ];

    fn as_floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn offsets(layout: &UboLayout) -> Vec<u32> {
        layout.elements.iter().map(|e| e.offset).collect()
    }

    #[test]
    fn scalars_share_a_chunk() {
        let layout = create_layout([
            ("a", glow::FLOAT, 1),
            ("b", glow::FLOAT, 1),
            ("c", glow::FLOAT_VEC2, 1),
        ]);
        assert_eq!(offsets(&layout), vec![0, 4, 8]);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn vec3_after_float_moves_to_next_chunk() {
        let layout = create_layout([("a", glow::FLOAT, 1), ("b", glow::FLOAT_VEC3, 1)]);
        assert_eq!(offsets(&layout), vec![0, 16]);
        assert_eq!(layout.size, 32);
    }

    #[test]
    fn float_fills_vec3_tail() {
        let layout = create_layout([("a", glow::FLOAT_VEC3, 1), ("b", glow::FLOAT, 1)]);
        assert_eq!(offsets(&layout), vec![0, 12]);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn arrays_pad_elements_and_align() {
        let layout = create_layout([
            ("t", glow::FLOAT, 1),
            ("weights[0]", glow::FLOAT, 3),
            ("m", glow::FLOAT_MAT3, 1),
        ]);
        assert_eq!(layout.elements[1].name, "weights");
        assert_eq!(layout.elements[1].size, 48);
        assert_eq!(offsets(&layout), vec![0, 16, 64]);
        assert_eq!(layout.size, 112);
    }

    #[test]
    fn every_triple_is_aligned_and_never_straddles() {
        for a in TYPES {
            for b in TYPES {
                for c in TYPES {
                    for array in [1, 2] {
                        let layout =
                            create_layout([("a", a, 1), ("b", b, array), ("c", c, 1)]);
                        assert_eq!(layout.size % 16, 0);
                        assert_eq!(layout, create_layout([("a", a, 1), ("b", b, array), ("c", c, 1)]));
                        for e in &layout.elements {
                            assert_eq!(e.offset % 4, 0);
                            if e.size > 16 {
                                assert_eq!(e.offset % 16, 0, "{e:?}");
                            } else {
                                assert!(e.offset % 16 + e.size <= 16, "{e:?} straddles");
                            }
                            assert!(e.offset + e.size <= layout.size);
                        }
                        for pair in layout.elements.windows(2) {
                            assert!(pair[0].offset + pair[0].size <= pair[1].offset);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn mat3_columns_are_padded() {
        let m = Mat3::from_cols_array(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let uniforms = vec![
            ("alpha".to_owned(), UniformValue::Float(0.5)),
            ("m".to_owned(), UniformValue::Mat3(m)),
        ];
        let layout = layout_for_group(&uniforms, &[]);
        assert_eq!(layout.size, 64);

        let mut out = vec![0u8; layout.size as usize];
        write(&layout, &uniforms, &mut out);
        let floats = as_floats(&out);
        assert_eq!(floats[0], 0.5);
        assert_eq!(&floats[4..8], &[1.0, 2.0, 3.0, 0.0]);
        assert_eq!(&floats[8..12], &[4.0, 5.0, 6.0, 0.0]);
        assert_eq!(&floats[12..15], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn reflection_wins_over_value_shape() {
        let uniforms = vec![("offsets".to_owned(), UniformValue::Floats(vec![1.0, 2.0, 3.0, 4.0]))];
        let reflection = [ActiveVariable {
            name: "offsets[0]".to_owned(),
            gl_type: glow::FLOAT_VEC2,
            size: 2,
        }];
        let layout = layout_for_group(&uniforms, &reflection);
        assert_eq!(layout.elements[0].gl_type, glow::FLOAT_VEC2);
        assert_eq!(layout.size, 32);

        let mut out = vec![0u8; 32];
        write(&layout, &uniforms, &mut out);
        let floats = as_floats(&out);
        assert_eq!(floats, vec![1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0]);
    }
}
