//! Probe verification: framebuffer pixels and storage-buffer contents
//! against expected values, built directly on [`crate::format`] (pixel
//! decode) and [`crate::box_type`] (std140/std430 comparison).

use crate::box_type::{self, BoxLayout, BoxType, Comparison, Tolerance};
use crate::error::VrResult;

use super::{EngineState, TestEngine};

/// Force `Idle` (submitting any pending work), then compare every pixel in
/// the probe rect's leading `n_components` against `color` under
/// `tolerance`. The first mismatch fails the command.
#[allow(clippy::too_many_arguments)]
pub(super) fn probe_rect(engine: &mut TestEngine, n_components: u32, x: u32, y: u32, w: u32, h: u32, color: [f64; 4], tolerance: Tolerance) -> VrResult<bool> {
    engine.set_state(EngineState::Idle)?;

    let format = match engine.format_table.lookup_by_vk(engine.window.format.color_format) {
        Some(f) => f,
        None => crate::error::vr_fatal!("window color format missing from the format table"),
    };
    let format_size = engine.format_table.get_size(format);
    let stride = engine.window.linear_stride();
    let data = engine.window.linear_memory_slice();

    for py in y..y + h {
        for px in x..x + w {
            let offset = (py * stride) as usize + (px as usize) * format_size;
            let pixel = &data[offset..offset + format_size];
            let observed = engine.format_table.load_pixel(format, pixel);

            let mismatch = (0..n_components as usize).any(|i| !component_matches(observed[i], color[i], tolerance));
            if mismatch {
                log::warn!("probe rect mismatch at ({px},{py})");
                engine.diagnostics.push(format!(
                    "Probe color at ({px},{py})\n  Expected: {}\n  Observed: {}",
                    format_components(&color, n_components as usize),
                    format_components(&observed, n_components as usize)
                ));
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Force `Idle`, then compare `n_values = value_bytes.len() / type_size`
/// contiguous typed values at `offset + i*array_stride` against the
/// corresponding expected value.
#[allow(clippy::too_many_arguments)]
pub(super) fn probe_ssbo(engine: &mut TestEngine, desc_set: u32, binding: u32, comparison: Comparison, offset: u64, ty: BoxType, layout: BoxLayout, value_bytes: &[u8], tolerance: Tolerance) -> VrResult<bool> {
    engine.set_state(EngineState::Idle)?;

    let Some(buffer) = engine.find_buffer(desc_set, binding) else {
        engine.diagnostics.push(format!("probe ssbo: no buffer bound at (desc_set={desc_set}, binding={binding})"));
        return Ok(false);
    };

    let type_size = box_type::size(ty, layout) as usize;
    if type_size == 0 || value_bytes.len() % type_size != 0 {
        engine.diagnostics.push("probe ssbo: reference value size is not a multiple of the box type's size".to_string());
        return Ok(false);
    }
    let stride = box_type::array_stride(ty, layout) as u64;
    let n_values = value_bytes.len() / type_size;
    let contents = buffer.as_slice();

    let mut ok = true;
    for i in 0..n_values {
        let observed_offset = (offset + i as u64 * stride) as usize;
        let expected_offset = i * type_size;

        if observed_offset + type_size > contents.len() {
            engine.diagnostics.push(format!("probe ssbo: value {i} at offset {observed_offset} is past the end of the buffer"));
            ok = false;
            continue;
        }

        let observed_bytes = &contents[observed_offset..observed_offset + type_size];
        let expected_bytes = &value_bytes[expected_offset..expected_offset + type_size];
        if !box_type::compare(comparison, tolerance, ty, layout, observed_bytes, expected_bytes) {
            log::warn!("probe ssbo mismatch at value {i} (desc_set={desc_set}, binding={binding})");
            engine.diagnostics.push(format!(
                "Reference: {}\n  Observed: {}",
                box_type::format_components(ty, layout, expected_bytes),
                box_type::format_components(ty, layout, observed_bytes)
            ));
            ok = false;
        }
    }
    Ok(ok)
}

fn component_matches(observed: f64, expected: f64, tolerance: Tolerance) -> bool {
    approx::relative_eq!(observed, expected, epsilon = tolerance.absolute, max_relative = tolerance.relative)
}

fn format_components(values: &[f64; 4], n: usize) -> String {
    let parts: Vec<String> = values[..n].iter().map(|v| format!("{v:.4}")).collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_matches_respects_absolute_tolerance() {
        let tolerance = Tolerance { absolute: 0.01, relative: 0.0 };
        assert!(component_matches(0.251, 0.25, tolerance));
        assert!(!component_matches(0.3, 0.25, tolerance));
    }

    #[test]
    fn format_components_truncates_to_n() {
        assert_eq!(format_components(&[1.0, 2.0, 3.0, 4.0], 2), "(1.0000, 2.0000)");
    }
}
