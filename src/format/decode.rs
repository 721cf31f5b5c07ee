//! Scalar and pixel decode for [`super::Format`].

use super::{Component, Format, Mode, Part};

/// Decode one pixel from `bytes` into `[R, G, B, A]` doubles.
///
/// Missing R/G/B channels default to `0.0`; a missing alpha channel
/// defaults to `1.0`.
pub fn load_pixel(format: &Format, bytes: &[u8]) -> [f64; 4] {
    let mut out = [0.0, 0.0, 0.0, 1.0];

    if format.packed_size_bits > 0 {
        let word = load_packed_word(bytes, format.packed_size_bits);
        let mut bit_offset = format.packed_size_bits;
        for part in format.parts {
            bit_offset -= part.bits;
            let raw = (word >> bit_offset) & bit_mask(part.bits);
            write_component(&mut out, part, raw);
        }
    } else {
        let mut byte_offset = 0usize;
        for part in format.parts {
            let part_bytes = (part.bits / 8) as usize;
            let raw = load_unpacked_word(&bytes[byte_offset..byte_offset + part_bytes], part.bits);
            write_component(&mut out, part, raw);
            byte_offset += part_bytes;
        }
    }

    out
}

fn write_component(out: &mut [f64; 4], part: &Part, raw: u64) {
    let index = match part.component {
        Component::R => 0,
        Component::G => 1,
        Component::B => 2,
        Component::A => 3,
        // Depth/stencil/padding parts don't contribute to a color probe.
        Component::D | Component::S | Component::X => return,
    };
    out[index] = decode_part(part, raw);
}

/// Decode one part's raw bit pattern into a normalized/scaled/float double,
/// per each mode's decode rule.
fn decode_part(part: &Part, raw: u64) -> f64 {
    let bits = part.bits;
    match part.mode {
        Mode::Unorm | Mode::Srgb => raw as f64 / max_unorm(bits),
        Mode::Snorm => sign_extend(raw, bits) as f64 / max_snorm(bits),
        Mode::Uint | Mode::Uscaled => raw as f64,
        Mode::Sint | Mode::Sscaled => sign_extend(raw, bits) as f64,
        Mode::Ufloat => decode_small_float(raw, bits, false),
        Mode::Sfloat => decode_float(raw, bits),
    }
}

fn max_unorm(bits: u32) -> f64 {
    ((1u64 << bits) - 1) as f64
}

fn max_snorm(bits: u32) -> f64 {
    ((1u64 << (bits - 1)) - 1) as f64
}

fn bit_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Sign-extend a `bits`-wide raw value into an `i64`.
fn sign_extend(raw: u64, bits: u32) -> i64 {
    if bits >= 64 {
        return raw as i64;
    }
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

/// Load a little-endian word of `bits` bits (rounded up to whole bytes)
/// from a packed format's backing bytes.
fn load_packed_word(bytes: &[u8], bits: u32) -> u64 {
    let byte_count = ((bits + 7) / 8) as usize;
    let mut word = 0u64;
    for (i, &b) in bytes[..byte_count].iter().enumerate() {
        word |= (b as u64) << (8 * i);
    }
    word
}

/// Load a little-endian word from an unpacked (byte-aligned) part.
fn load_unpacked_word(bytes: &[u8], bits: u32) -> u64 {
    load_packed_word(bytes, bits)
}

/// IEEE 754 floating-point decode for 16/32/64-bit SFLOAT parts.
fn decode_float(raw: u64, bits: u32) -> f64 {
    match bits {
        16 => half::f16::from_bits(raw as u16).to_f64(),
        32 => f32::from_bits(raw as u32) as f64,
        64 => f64::from_bits(raw),
        other => crate::error::vr_fatal!("unsupported SFLOAT bit size: {other}"),
    }
}

/// Small-float decode for UFLOAT (and, via `signed`, a half-float fallback)
/// with a 5-bit exponent and `{5,6}`-bit mantissa.
///
/// Returns `+-inf`/`NaN` when the exponent field is all-ones, matching IEEE
/// special-value handling. The sign bit, when present, is applied
/// unconditionally rather than being skipped for NaN results — a NaN value
/// is `!= NaN` under IEEE comparison rules just like any other value, so
/// there's no finite/NaN distinction to make here.
fn decode_small_float(raw: u64, bits: u32, signed: bool) -> f64 {
    let (mantissa_bits, has_sign) = match bits {
        10 => (5u32, signed), // B10G11R11-style UFLOAT components are unsigned by format.
        11 => (6u32, signed),
        _ => crate::error::vr_fatal!("unsupported UFLOAT bit size: {bits}"),
    };

    let exponent_bits = 5u32;
    let sign_bit = if has_sign { 1 } else { 0 };
    let total_bits = sign_bit + exponent_bits + mantissa_bits;
    debug_assert_eq!(total_bits, bits + sign_bit);

    let mantissa_mask = (1u64 << mantissa_bits) - 1;
    let exponent_mask = (1u64 << exponent_bits) - 1;

    let mantissa = raw & mantissa_mask;
    let exponent = (raw >> mantissa_bits) & exponent_mask;
    let sign = if has_sign { (raw >> (mantissa_bits + exponent_bits)) & 1 } else { 0 };

    let bias = (1i64 << (exponent_bits - 1)) - 1;

    let magnitude = if exponent == exponent_mask {
        if mantissa == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else if exponent == 0 {
        // Subnormal.
        (mantissa as f64) * 2f64.powi(-(bias) - (mantissa_bits as i64) as i32 + 1)
    } else {
        let normalized_mantissa = 1.0 + (mantissa as f64) / (1u64 << mantissa_bits) as f64;
        normalized_mantissa * 2f64.powi((exponent as i64 - bias) as i32)
    };

    if sign == 1 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FormatTable, Mode};

    #[test]
    fn unorm_decode_round_trips_corners() {
        let table = FormatTable::standard();
        let format = table.lookup_by_details(8, Mode::Unorm, 4).unwrap();
        let pixel = load_pixel(format, &[0, 0, 0, 0]);
        assert_eq!(pixel, [0.0, 0.0, 0.0, 0.0]);

        let pixel = load_pixel(format, &[255, 255, 255, 255]);
        assert_eq!(pixel, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn unorm_missing_alpha_defaults_to_one() {
        let table = FormatTable::standard();
        let format = table.lookup_by_vk(ash::vk::Format::R8G8B8_UNORM).unwrap();
        let pixel = load_pixel(format, &[0, 0, 0]);
        assert_eq!(pixel, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn snorm_sign_extends() {
        let table = FormatTable::standard();
        let format = table.lookup_by_vk(ash::vk::Format::R8_SNORM).unwrap();
        // -128 (0x80) saturates to -1 after clamping against max_snorm(127); the
        // decode itself yields -128/127.
        let pixel = load_pixel(format, &[0x80]);
        assert!((pixel[0] - (-128.0 / 127.0)).abs() < 1e-9);

        let pixel = load_pixel(format, &[0x7f]);
        assert!((pixel[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sfloat32_decodes_via_bit_cast() {
        let table = FormatTable::standard();
        let format = table.lookup_by_vk(ash::vk::Format::R32_SFLOAT).unwrap();
        let bytes = 1.5f32.to_le_bytes();
        let pixel = load_pixel(format, &bytes);
        assert_eq!(pixel[0], 1.5);
    }

    #[test]
    fn sfloat16_decodes_via_half_crate() {
        let table = FormatTable::standard();
        let format = table.lookup_by_vk(ash::vk::Format::R16_SFLOAT).unwrap();
        let bytes = half::f16::from_f64(2.0).to_bits().to_le_bytes();
        let pixel = load_pixel(format, &bytes);
        assert_eq!(pixel[0], 2.0);
    }

    #[test]
    fn packed_r5g6b5_extracts_msb_first() {
        let table = FormatTable::standard();
        let format = table
            .lookup_by_vk(ash::vk::Format::R5G6B5_UNORM_PACK16)
            .unwrap();
        // All bits set: R=31/31=1.0, G=63/63=1.0, B=31/31=1.0.
        let pixel = load_pixel(format, &0xffffu16.to_le_bytes());
        assert_eq!(pixel, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn uint_and_sint_do_not_normalize() {
        let table = FormatTable::standard();
        let format = table.lookup_by_vk(ash::vk::Format::R32_UINT).unwrap();
        let pixel = load_pixel(format, &42u32.to_le_bytes());
        assert_eq!(pixel[0], 42.0);

        let format = table.lookup_by_vk(ash::vk::Format::R32_SINT).unwrap();
        let pixel = load_pixel(format, &(-7i32).to_le_bytes());
        assert_eq!(pixel[0], -7.0);
    }
}
