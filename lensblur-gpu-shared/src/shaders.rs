//! Embedded WGSL sources for the three lens blur programs.
//! The workgroup size is left as `{{WG_X}}` / `{{WG_Y}}` placeholders and is
//! filled in when a program is compiled.

pub const LENS_BLUR: &str = include_str!("../shaders/lens_blur.wgsl");
pub const TRANSPOSE_INT: &str = include_str!("../shaders/transpose_int.wgsl");
pub const TRANSPOSE_FLOAT: &str = include_str!("../shaders/transpose_float.wgsl");

/// File names looked up inside a kernel directory.
pub const LENS_BLUR_FILE: &str = "lens_blur.wgsl";
pub const TRANSPOSE_INT_FILE: &str = "transpose_int.wgsl";
pub const TRANSPOSE_FLOAT_FILE: &str = "transpose_float.wgsl";

/// Entry point names. Part of the kernel ABI.
pub const LENS_BLUR_ENTRY: &str = "lensBlur";
pub const TRANSPOSE_INT_ENTRY: &str = "transposeInt";
pub const TRANSPOSE_FLOAT_ENTRY: &str = "transposeFloat";

pub const WORKGROUP_X_PLACEHOLDER: &str = "{{WG_X}}";
pub const WORKGROUP_Y_PLACEHOLDER: &str = "{{WG_Y}}";

/// Substitute the workgroup size placeholders in a kernel template.
pub fn specialize(template: &str, workgroup: [u32; 2]) -> String {
    template
        .replace(WORKGROUP_X_PLACEHOLDER, &workgroup[0].to_string())
        .replace(WORKGROUP_Y_PLACEHOLDER, &workgroup[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{COC_SCALE, MAX_COC_RADIUS};

    #[test]
    fn test_entry_points_present() {
        assert!(LENS_BLUR.contains(&format!("fn {LENS_BLUR_ENTRY}(")));
        assert!(TRANSPOSE_INT.contains(&format!("fn {TRANSPOSE_INT_ENTRY}(")));
        assert!(TRANSPOSE_FLOAT.contains(&format!("fn {TRANSPOSE_FLOAT_ENTRY}(")));
    }

    #[test]
    fn test_specialize_replaces_all_placeholders() {
        for src in [LENS_BLUR, TRANSPOSE_INT, TRANSPOSE_FLOAT] {
            let out = specialize(src, [16, 8]);
            assert!(!out.contains("{{"));
            assert!(out.contains("@workgroup_size(16, 8, 1)"));
        }
    }

    #[test]
    fn test_coc_constants_match_kernel() {
        // The host reference reads these from Rust; the kernel hardcodes them.
        assert!(LENS_BLUR.contains(&format!("const COC_SCALE: f32 = {COC_SCALE:?};")));
        assert!(LENS_BLUR.contains(&format!("const MAX_COC_RADIUS: f32 = {MAX_COC_RADIUS:?};")));
    }

    #[test]
    fn test_relaxed_math_left_to_prelude() {
        assert!(!LENS_BLUR.contains("const RELAXED_MATH"));
        assert!(LENS_BLUR.contains("if RELAXED_MATH"));
    }
}
