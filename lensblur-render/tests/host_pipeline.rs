//! Full invocation plan executed on the host reference kernels.

use lensblur_render::config::BuildOptions;
use lensblur_render::reference::{self, BlurPass};
use lensblur_render::Frame;
use proptest::prelude::*;

fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    u32::from_le_bytes([r, g, b, a])
}

fn channels(p: u32) -> [u8; 4] {
    p.to_le_bytes()
}

fn distinct_colors(n: usize) -> Vec<u32> {
    (0..n)
        .map(|i| rgba((i * 13 % 256) as u8, (i * 29 % 256) as u8, (i * 71 % 256) as u8, 255))
        .collect()
}

#[test]
fn all_in_focus_is_bit_identical() {
    let color = distinct_colors(16);
    let depth = vec![10u32; 16];
    let coc = vec![0.0f32; 16];
    let frame = Frame { color: &color, depth: &depth, coc: &coc, width: 4, height: 4, z_focus: 10 };

    let mut out = vec![0u32; 16];
    reference::lens_blur(&frame, &mut out, BuildOptions::default()).unwrap();
    assert_eq!(out, color);
}

#[test]
fn non_square_frame_keeps_orientation() {
    let (width, height) = (7u32, 3u32);
    let n = (width * height) as usize;
    let color = distinct_colors(n);
    let depth = vec![42u32; n];
    let coc = vec![0.0f32; n];
    let frame = Frame { color: &color, depth: &depth, coc: &coc, width, height, z_focus: 42 };

    let mut out = vec![0u32; n];
    reference::lens_blur(&frame, &mut out, BuildOptions::default()).unwrap();
    assert_eq!(out, color);
}

#[test]
fn degenerate_frame_writes_nothing() {
    let empty: [u32; 0] = [];
    let coc: [f32; 0] = [];
    for (width, height) in [(0, 4), (4, 0), (0, 0)] {
        let frame = Frame { color: &empty, depth: &empty, coc: &coc, width, height, z_focus: 3 };
        let mut out = vec![0xdead_beef_u32; 8];
        reference::lens_blur(&frame, &mut out, BuildOptions::default()).unwrap();
        assert!(out.iter().all(|&p| p == 0xdead_beef), "{width}x{height}");
    }
}

#[test]
fn out_of_focus_point_spreads_in_both_axes() {
    let (width, height) = (9u32, 9u32);
    let n = (width * height) as usize;
    let mut color = vec![rgba(0, 0, 0, 255); n];
    color[4 * 9 + 4] = rgba(255, 255, 255, 255);
    // CoC = |80 - 0| * 0.125 = 10, clamped to 8.
    let depth = vec![80u32; n];
    let coc = vec![0.0f32; n];
    let frame = Frame { color: &color, depth: &depth, coc: &coc, width, height, z_focus: 0 };

    let mut out = vec![0u32; n];
    reference::lens_blur(&frame, &mut out, BuildOptions::default()).unwrap();

    let red = |x: usize, y: usize| channels(out[y * 9 + x])[0];
    assert!(red(4, 4) < 255);
    assert!(red(5, 4) > 0, "horizontal spread");
    assert!(red(4, 5) > 0, "vertical spread");
    assert!(red(0, 0) > 0, "diagonal spread through both passes");
    assert_eq!(channels(out[0])[3], 255);
}

#[test]
fn plan_matches_manual_composition() {
    let (width, height) = (6u32, 4u32);
    let n = (width * height) as usize;
    let color = distinct_colors(n);
    let depth: Vec<u32> = (0..n as u32).map(|i| (i * 7) % 50).collect();
    let coc = vec![0.0f32; n];
    let z_focus = 20;
    let frame = Frame { color: &color, depth: &depth, coc: &coc, width, height, z_focus };

    let mut out = vec![0u32; n];
    reference::lens_blur(&frame, &mut out, BuildOptions::default()).unwrap();

    // Horizontal pass, transpose everything, vertical pass, transpose back.
    let relaxed = BuildOptions::default().fast_relaxed_math;
    let mut blurred = vec![0u32; n];
    let mut coc_native = vec![0.0f32; n];
    BlurPass { width, height, z_focus, relaxed_math: relaxed }.run(&color, &depth, &mut blurred, &mut coc_native);

    let mut color_t = vec![0u32; n];
    let mut depth_t = vec![0u32; n];
    let mut coc_t = vec![0.0f32; n];
    reference::transpose(&blurred, &mut color_t, width, height);
    reference::transpose(&depth, &mut depth_t, width, height);
    reference::transpose(&coc_native, &mut coc_t, width, height);

    let mut blurred_t = vec![0u32; n];
    BlurPass { width: height, height: width, z_focus, relaxed_math: relaxed }
        .run(&color_t, &depth_t, &mut blurred_t, &mut coc_t);

    let mut expected = vec![0u32; n];
    reference::transpose(&blurred_t, &mut expected, height, width);

    assert_eq!(out, expected);
}

#[test]
fn host_arrays_are_not_modified() {
    let color = distinct_colors(12);
    let depth = vec![90u32; 12];
    let coc = vec![0.5f32; 12];
    let frame = Frame { color: &color, depth: &depth, coc: &coc, width: 4, height: 3, z_focus: 0 };

    let mut out = vec![0u32; 12];
    reference::lens_blur(&frame, &mut out, BuildOptions::default()).unwrap();
    assert_eq!(coc, vec![0.5f32; 12]);
    assert_eq!(depth, vec![90u32; 12]);
}

proptest! {
    #[test]
    fn transpose_twice_is_identity(width in 0u32..16, height in 0u32..16, seed in any::<u32>()) {
        let n = (width * height) as usize;
        let src: Vec<u32> = (0..n as u32).map(|i| i.wrapping_mul(2_654_435_761).wrapping_add(seed)).collect();
        let mut once = vec![0u32; n];
        let mut twice = vec![0u32; n];
        reference::transpose(&src, &mut once, width, height);
        reference::transpose(&once, &mut twice, height, width);
        prop_assert_eq!(twice, src);
    }

    #[test]
    fn in_focus_frames_are_unchanged(width in 1u32..12, height in 1u32..12, z in 0u32..1000) {
        let n = (width * height) as usize;
        let color = distinct_colors(n);
        let depth = vec![z; n];
        let coc = vec![0.0f32; n];
        let frame = Frame { color: &color, depth: &depth, coc: &coc, width, height, z_focus: z as i32 };
        let mut out = vec![0u32; n];
        reference::lens_blur(&frame, &mut out, BuildOptions::default()).unwrap();
        prop_assert_eq!(out, color);
    }
}
