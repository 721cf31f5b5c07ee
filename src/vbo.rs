//! Parsed vertex data: raw bytes plus per-attribute layout.
//!
//! Host-side and format-table driven rather than a fixed `Vertex` struct —
//! scripts declare an arbitrary set of attributes, so the binding/attribute
//! descriptions are built from a `Vbo` at pipeline-creation time instead of
//! being compile-time constants.

use ash::vk;

use crate::error::{VrError, VrResult};
use crate::format::Format;

/// One vertex attribute's placement within a [`Vbo`] row.
#[derive(Debug, Clone, Copy)]
pub struct Attrib {
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Parsed vertex-data section of a script: one interleaved array of rows.
///
/// Invariant: `raw_bytes.len() == stride * num_rows`.
#[derive(Debug, Clone)]
pub struct Vbo {
    pub raw_bytes: Vec<u8>,
    pub stride: u32,
    pub num_rows: u32,
    pub attribs: Vec<Attrib>,
}

impl Vbo {
    /// Lay out `attribs` left to right, each aligned to
    /// `max(component_bits)/8` of its own format, and pack interleaved rows
    /// of `rows` (one `Vec<u8>` of raw component bytes per attribute per
    /// row, in `attribs` order) into a single buffer.
    ///
    /// `formats` supplies the per-attribute pixel format used only to derive
    /// alignment; callers must already have encoded `rows` consistently with
    /// those formats.
    pub fn build(locations: &[u32], formats: &[&Format], rows: &[Vec<Vec<u8>>]) -> VrResult<Self> {
        if locations.len() != formats.len() {
            return Err(VrError::InvalidOperation(
                "vbo: locations and formats must have the same length".to_string(),
            ));
        }

        let mut attribs = Vec::with_capacity(locations.len());
        let mut offset = 0u32;
        let mut max_alignment = 1u32;

        for (&location, format) in locations.iter().zip(formats.iter()) {
            let alignment = attribute_alignment(format);
            offset = align_up(offset, alignment);
            attribs.push(Attrib {
                location,
                format: format.vk_format,
                offset,
            });
            offset += format.size_bytes() as u32;
            max_alignment = max_alignment.max(alignment);
        }

        let stride = align_up(offset, max_alignment);
        let num_rows = rows.len() as u32;
        let mut raw_bytes = Vec::with_capacity((stride * num_rows) as usize);

        for row in rows {
            if row.len() != attribs.len() {
                return Err(VrError::InvalidOperation(
                    "vbo: row has the wrong number of attribute values".to_string(),
                ));
            }
            let row_start = raw_bytes.len();
            for (attrib, value) in attribs.iter().zip(row.iter()) {
                raw_bytes.extend_from_slice(value);
                let _ = attrib;
            }
            raw_bytes.resize(row_start + stride as usize, 0);
        }

        Ok(Self {
            raw_bytes,
            stride,
            num_rows,
            attribs,
        })
    }

    /// Binding description for a `VK_VERTEX_INPUT_RATE_VERTEX` binding 0.
    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: self.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for every parsed attribute, all on binding 0.
    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attribs
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                binding: 0,
                location: a.location,
                format: a.format,
                offset: a.offset,
            })
            .collect()
    }
}

/// Alignment for one attribute: `max(component_bits)/8`.
fn attribute_alignment(format: &Format) -> u32 {
    format.parts.iter().map(|p| p.bits).max().unwrap_or(8) / 8
}

fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment == 0 {
        return value;
    }
    (value + alignment - 1) / alignment * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatTable;

    #[test]
    fn build_interleaves_and_pads_to_max_alignment() {
        let table = FormatTable::standard();
        let vec3 = table.lookup_by_vk(vk::Format::R32G32B32_SFLOAT).unwrap();
        let vec2 = table.lookup_by_vk(vk::Format::R32G32_SFLOAT).unwrap();

        let rows = vec![
            vec![1.0f32.to_le_bytes().to_vec().repeat(3).into_iter().take(12).collect(), vec![0u8; 8]],
            vec![vec![0u8; 12], vec![0u8; 8]],
        ];

        let vbo = Vbo::build(&[0, 1], &[vec3, vec2], &rows).unwrap();
        assert_eq!(vbo.attribs[0].offset, 0);
        assert_eq!(vbo.attribs[1].offset, 12);
        assert_eq!(vbo.stride, 20);
        assert_eq!(vbo.num_rows, 2);
        assert_eq!(vbo.raw_bytes.len(), vbo.stride as usize * vbo.num_rows as usize);
    }

    #[test]
    fn mismatched_row_arity_is_rejected() {
        let table = FormatTable::standard();
        let vec3 = table.lookup_by_vk(vk::Format::R32G32B32_SFLOAT).unwrap();
        let rows = vec![vec![vec![0u8; 12], vec![0u8; 12]]];
        assert!(Vbo::build(&[0], &[vec3], &rows).is_err());
    }
}
