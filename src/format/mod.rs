//! Pixel format table: component layout and scalar decode.
//!
//! A plain `&'static [Format]` table, matched by name or `vk::Format`,
//! rather than anything built at runtime.

mod decode;

pub use decode::load_pixel;

use ash::vk;

/// Which channel a format part contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    R,
    G,
    B,
    A,
    D,
    S,
    X,
}

/// How the raw bits of a part are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Unorm,
    Snorm,
    Uscaled,
    Sscaled,
    Uint,
    Sint,
    Ufloat,
    Sfloat,
    Srgb,
}

/// One component's bit layout within a pixel.
#[derive(Debug, Clone, Copy)]
pub struct Part {
    pub bits: u32,
    pub component: Component,
    pub mode: Mode,
}

/// A single Vulkan pixel format's layout.
#[derive(Debug, Clone)]
pub struct Format {
    pub vk_format: vk::Format,
    pub name: &'static str,
    /// Nonzero when all parts share one little-endian word (a "packed"
    /// format, e.g. R5G6B5); zero when parts are byte-aligned in sequence.
    pub packed_size_bits: u32,
    pub parts: &'static [Part],
}

impl Format {
    /// `size_bytes = packed_size/8` or `sum(parts.bits)/8`.
    pub fn size_bytes(&self) -> usize {
        if self.packed_size_bits > 0 {
            (self.packed_size_bits / 8) as usize
        } else {
            let total_bits: u32 = self.parts.iter().map(|p| p.bits).sum();
            (total_bits / 8) as usize
        }
    }
}

/// Static table mapping format names/Vulkan enums to component layouts.
pub struct FormatTable {
    formats: &'static [Format],
}

impl FormatTable {
    /// The built-in format table covering every decode mode and packing style.
    pub fn standard() -> Self {
        Self {
            formats: table::FORMATS,
        }
    }

    /// Case-insensitive lookup by the format's canonical name (e.g.
    /// `"VK_FORMAT_R8G8B8A8_UNORM"` or the bare `"R8G8B8A8_UNORM"` suffix).
    pub fn lookup_by_name(&self, name: &str) -> Option<&Format> {
        self.formats.iter().find(|f| {
            f.name.eq_ignore_ascii_case(name)
                || f.name
                    .strip_prefix("VK_FORMAT_")
                    .map(|suffix| suffix.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
        })
    }

    /// Lookup by the Vulkan format enum.
    pub fn lookup_by_vk(&self, vk_format: vk::Format) -> Option<&Format> {
        self.formats.iter().find(|f| f.vk_format == vk_format)
    }

    /// Find an unpacked format whose first `n_components` parts are, in
    /// order R,G,B,A, all `bits` wide and share `mode`.
    pub fn lookup_by_details(&self, bits: u32, mode: Mode, n_components: usize) -> Option<&Format> {
        const ORDER: [Component; 4] = [Component::R, Component::G, Component::B, Component::A];

        self.formats.iter().find(|f| {
            if f.packed_size_bits != 0 {
                return false;
            }
            if f.parts.len() != n_components {
                return false;
            }
            f.parts
                .iter()
                .zip(ORDER.iter())
                .all(|(part, expected)| part.component == *expected && part.bits == bits && part.mode == mode)
        })
    }

    /// Size in bytes of one pixel of `format`.
    pub fn get_size(&self, format: &Format) -> usize {
        format.size_bytes()
    }

    /// Decode one pixel from `bytes` into `[R, G, B, A]` doubles.
    pub fn load_pixel(&self, format: &Format, bytes: &[u8]) -> [f64; 4] {
        decode::load_pixel(format, bytes)
    }
}

mod table {
    use super::{Component::*, Format, Mode::*, Part};
    use ash::vk;

    macro_rules! parts {
        ($(($bits:expr, $comp:expr, $mode:expr)),* $(,)?) => {
            &[$(Part { bits: $bits, component: $comp, mode: $mode }),*]
        };
    }

    pub static FORMATS: &[Format] = &[
        Format {
            vk_format: vk::Format::R8_UNORM,
            name: "VK_FORMAT_R8_UNORM",
            packed_size_bits: 0,
            parts: parts![(8, R, Unorm)],
        },
        Format {
            vk_format: vk::Format::R8_SNORM,
            name: "VK_FORMAT_R8_SNORM",
            packed_size_bits: 0,
            parts: parts![(8, R, Snorm)],
        },
        Format {
            vk_format: vk::Format::R8_UINT,
            name: "VK_FORMAT_R8_UINT",
            packed_size_bits: 0,
            parts: parts![(8, R, Uint)],
        },
        Format {
            vk_format: vk::Format::R8_SINT,
            name: "VK_FORMAT_R8_SINT",
            packed_size_bits: 0,
            parts: parts![(8, R, Sint)],
        },
        Format {
            vk_format: vk::Format::R8G8_UNORM,
            name: "VK_FORMAT_R8G8_UNORM",
            packed_size_bits: 0,
            parts: parts![(8, R, Unorm), (8, G, Unorm)],
        },
        Format {
            vk_format: vk::Format::R8G8B8_UNORM,
            name: "VK_FORMAT_R8G8B8_UNORM",
            packed_size_bits: 0,
            parts: parts![(8, R, Unorm), (8, G, Unorm), (8, B, Unorm)],
        },
        Format {
            vk_format: vk::Format::R8G8B8A8_UNORM,
            name: "VK_FORMAT_R8G8B8A8_UNORM",
            packed_size_bits: 0,
            parts: parts![(8, R, Unorm), (8, G, Unorm), (8, B, Unorm), (8, A, Unorm)],
        },
        Format {
            vk_format: vk::Format::R8G8B8A8_SNORM,
            name: "VK_FORMAT_R8G8B8A8_SNORM",
            packed_size_bits: 0,
            parts: parts![(8, R, Snorm), (8, G, Snorm), (8, B, Snorm), (8, A, Snorm)],
        },
        Format {
            vk_format: vk::Format::R8G8B8A8_UINT,
            name: "VK_FORMAT_R8G8B8A8_UINT",
            packed_size_bits: 0,
            parts: parts![(8, R, Uint), (8, G, Uint), (8, B, Uint), (8, A, Uint)],
        },
        Format {
            vk_format: vk::Format::R8G8B8A8_SINT,
            name: "VK_FORMAT_R8G8B8A8_SINT",
            packed_size_bits: 0,
            parts: parts![(8, R, Sint), (8, G, Sint), (8, B, Sint), (8, A, Sint)],
        },
        Format {
            vk_format: vk::Format::R8G8B8A8_USCALED,
            name: "VK_FORMAT_R8G8B8A8_USCALED",
            packed_size_bits: 0,
            parts: parts![(8, R, Uscaled), (8, G, Uscaled), (8, B, Uscaled), (8, A, Uscaled)],
        },
        Format {
            vk_format: vk::Format::R8G8B8A8_SSCALED,
            name: "VK_FORMAT_R8G8B8A8_SSCALED",
            packed_size_bits: 0,
            parts: parts![(8, R, Sscaled), (8, G, Sscaled), (8, B, Sscaled), (8, A, Sscaled)],
        },
        Format {
            vk_format: vk::Format::R8G8B8A8_SRGB,
            name: "VK_FORMAT_R8G8B8A8_SRGB",
            packed_size_bits: 0,
            parts: parts![(8, R, Srgb), (8, G, Srgb), (8, B, Srgb), (8, A, Srgb)],
        },
        Format {
            vk_format: vk::Format::B8G8R8A8_UNORM,
            name: "VK_FORMAT_B8G8R8A8_UNORM",
            packed_size_bits: 0,
            parts: parts![(8, B, Unorm), (8, G, Unorm), (8, R, Unorm), (8, A, Unorm)],
        },
        Format {
            vk_format: vk::Format::R16_UNORM,
            name: "VK_FORMAT_R16_UNORM",
            packed_size_bits: 0,
            parts: parts![(16, R, Unorm)],
        },
        Format {
            vk_format: vk::Format::R16_SNORM,
            name: "VK_FORMAT_R16_SNORM",
            packed_size_bits: 0,
            parts: parts![(16, R, Snorm)],
        },
        Format {
            vk_format: vk::Format::R16_UINT,
            name: "VK_FORMAT_R16_UINT",
            packed_size_bits: 0,
            parts: parts![(16, R, Uint)],
        },
        Format {
            vk_format: vk::Format::R16_SINT,
            name: "VK_FORMAT_R16_SINT",
            packed_size_bits: 0,
            parts: parts![(16, R, Sint)],
        },
        Format {
            vk_format: vk::Format::R16_SFLOAT,
            name: "VK_FORMAT_R16_SFLOAT",
            packed_size_bits: 0,
            parts: parts![(16, R, Sfloat)],
        },
        Format {
            vk_format: vk::Format::R16G16B16A16_SFLOAT,
            name: "VK_FORMAT_R16G16B16A16_SFLOAT",
            packed_size_bits: 0,
            parts: parts![(16, R, Sfloat), (16, G, Sfloat), (16, B, Sfloat), (16, A, Sfloat)],
        },
        Format {
            vk_format: vk::Format::R16G16B16A16_UNORM,
            name: "VK_FORMAT_R16G16B16A16_UNORM",
            packed_size_bits: 0,
            parts: parts![(16, R, Unorm), (16, G, Unorm), (16, B, Unorm), (16, A, Unorm)],
        },
        Format {
            vk_format: vk::Format::R32_UINT,
            name: "VK_FORMAT_R32_UINT",
            packed_size_bits: 0,
            parts: parts![(32, R, Uint)],
        },
        Format {
            vk_format: vk::Format::R32_SINT,
            name: "VK_FORMAT_R32_SINT",
            packed_size_bits: 0,
            parts: parts![(32, R, Sint)],
        },
        Format {
            vk_format: vk::Format::R32_SFLOAT,
            name: "VK_FORMAT_R32_SFLOAT",
            packed_size_bits: 0,
            parts: parts![(32, R, Sfloat)],
        },
        Format {
            vk_format: vk::Format::R32G32_SFLOAT,
            name: "VK_FORMAT_R32G32_SFLOAT",
            packed_size_bits: 0,
            parts: parts![(32, R, Sfloat), (32, G, Sfloat)],
        },
        Format {
            vk_format: vk::Format::R32G32B32_SFLOAT,
            name: "VK_FORMAT_R32G32B32_SFLOAT",
            packed_size_bits: 0,
            parts: parts![(32, R, Sfloat), (32, G, Sfloat), (32, B, Sfloat)],
        },
        Format {
            vk_format: vk::Format::R32G32B32A32_SFLOAT,
            name: "VK_FORMAT_R32G32B32A32_SFLOAT",
            packed_size_bits: 0,
            parts: parts![(32, R, Sfloat), (32, G, Sfloat), (32, B, Sfloat), (32, A, Sfloat)],
        },
        Format {
            vk_format: vk::Format::R32G32B32A32_UINT,
            name: "VK_FORMAT_R32G32B32A32_UINT",
            packed_size_bits: 0,
            parts: parts![(32, R, Uint), (32, G, Uint), (32, B, Uint), (32, A, Uint)],
        },
        Format {
            vk_format: vk::Format::R32G32B32A32_SINT,
            name: "VK_FORMAT_R32G32B32A32_SINT",
            packed_size_bits: 0,
            parts: parts![(32, R, Sint), (32, G, Sint), (32, B, Sint), (32, A, Sint)],
        },
        Format {
            vk_format: vk::Format::R64_SFLOAT,
            name: "VK_FORMAT_R64_SFLOAT",
            packed_size_bits: 0,
            parts: parts![(64, R, Sfloat)],
        },
        Format {
            vk_format: vk::Format::D32_SFLOAT,
            name: "VK_FORMAT_D32_SFLOAT",
            packed_size_bits: 0,
            parts: parts![(32, D, Sfloat)],
        },
        Format {
            vk_format: vk::Format::D32_SFLOAT_S8_UINT,
            name: "VK_FORMAT_D32_SFLOAT_S8_UINT",
            packed_size_bits: 0,
            parts: parts![(32, D, Sfloat), (8, S, Uint)],
        },
        Format {
            vk_format: vk::Format::D24_UNORM_S8_UINT,
            name: "VK_FORMAT_D24_UNORM_S8_UINT",
            packed_size_bits: 32,
            parts: parts![(24, D, Unorm), (8, S, Uint)],
        },
        Format {
            vk_format: vk::Format::R5G6B5_UNORM_PACK16,
            name: "VK_FORMAT_R5G6B5_UNORM_PACK16",
            packed_size_bits: 16,
            parts: parts![(5, R, Unorm), (6, G, Unorm), (5, B, Unorm)],
        },
        Format {
            vk_format: vk::Format::A2B10G10R10_UNORM_PACK32,
            name: "VK_FORMAT_A2B10G10R10_UNORM_PACK32",
            packed_size_bits: 32,
            parts: parts![(2, A, Unorm), (10, B, Unorm), (10, G, Unorm), (10, R, Unorm)],
        },
        Format {
            vk_format: vk::Format::B10G11R11_UFLOAT_PACK32,
            name: "VK_FORMAT_B10G11R11_UFLOAT_PACK32",
            packed_size_bits: 32,
            parts: parts![(10, B, Ufloat), (11, G, Ufloat), (11, R, Ufloat)],
        },
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_packed_or_summed_bits() {
        let table = FormatTable::standard();
        for format in table.formats {
            let from_size = table.get_size(format) * 8;
            let expected = if format.packed_size_bits > 0 {
                format.packed_size_bits as usize
            } else {
                format.parts.iter().map(|p| p.bits as usize).sum()
            };
            assert_eq!(from_size, expected, "format {}", format.name);
        }
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        let table = FormatTable::standard();
        assert!(table.lookup_by_name("r8g8b8a8_unorm").is_some());
        assert!(table.lookup_by_name("VK_FORMAT_R8G8B8A8_UNORM").is_some());
        assert!(table.lookup_by_name("nonexistent_format").is_none());
    }

    #[test]
    fn lookup_by_vk_round_trips() {
        let table = FormatTable::standard();
        let format = table.lookup_by_vk(vk::Format::R32G32B32A32_SFLOAT).unwrap();
        assert_eq!(format.name, "VK_FORMAT_R32G32B32A32_SFLOAT");
    }

    #[test]
    fn lookup_by_details_matches_component_order() {
        let table = FormatTable::standard();
        let format = table.lookup_by_details(8, Mode::Unorm, 4).unwrap();
        assert_eq!(format.vk_format, vk::Format::R8G8B8A8_UNORM);
    }
}
