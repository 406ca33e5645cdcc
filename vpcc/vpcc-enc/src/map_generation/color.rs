//! RGB444 to YUV420 conversion (BT.709), in two flavors: a fast variant
//! with 2x2 chroma averaging and a reference variant using the filtered
//! chroma downsampling of the common test conditions.

/// Fast conversion in place: `img` holds planar RGB (3 x W*H) on entry
/// and planar YUV420 (1.5 x W*H) on return.
pub(crate) fn rgb444_to_yuv420(img: &mut Vec<u8>, width: usize, height: usize) {
    let image_size = width * height;
    let image_size_uv = image_size >> 2;

    const K_YR: f32 = 0.2126;
    const K_YG: f32 = 0.7152;
    const K_YB: f32 = 0.0722;

    const K_UR: f32 = -0.114572;
    const K_UG: f32 = -0.385428;
    const K_UB: f32 = 0.5;

    const K_VR: f32 = 0.5;
    const K_VG: f32 = -0.454153;
    const K_VB: f32 = -0.045847;

    let mut yuv = vec![0u8; image_size + 2 * image_size_uv];
    let mut index_uv = 0usize;

    for y in (0..height).step_by(2) {
        let row1 = y * width;
        let row2 = row1 + width;
        for x in (0..width).step_by(2) {
            let corners = [row1 + x, row1 + x + 1, row2 + x, row2 + x + 1];

            let mut sum_r = 0.0f32;
            let mut sum_g = 0.0f32;
            let mut sum_b = 0.0f32;
            for &corner in &corners {
                let r = img[corner] as f32;
                let g = img[corner + image_size] as f32;
                let b = img[corner + 2 * image_size] as f32;
                yuv[corner] = (K_YR * r + K_YG * g + K_YB * b) as u8;
                sum_r += r;
                sum_g += g;
                sum_b += b;
            }

            let avg_r = 0.25 * sum_r;
            let avg_g = 0.25 * sum_g;
            let avg_b = 0.25 * sum_b;
            yuv[image_size + index_uv] = (K_UR * avg_r + K_UG * avg_g + K_UB * avg_b + 128.0) as u8;
            yuv[image_size + image_size_uv + index_uv] =
                (K_VR * avg_r + K_VG * avg_g + K_VB * avg_b + 128.0) as u8;
            index_uv += 1;
        }
    }

    *img = yuv;
}

/// Horizontal chroma filter taps (coefficients x512).
const FILTER_HORIZONTAL: [f32; 15] = [
    -0.017_163_528 * 512.0,
    0.0,
    0.040_666_667 * 512.0,
    0.0,
    -0.091_548_103 * 512.0,
    0.0,
    0.315_778_239 * 512.0,
    0.504_533_450 * 512.0,
    0.315_778_239 * 512.0,
    0.0,
    -0.091_548_103 * 512.0,
    0.0,
    0.040_666_667 * 512.0,
    0.0,
    -0.017_163_528 * 512.0,
];

/// Vertical chroma filter taps (coefficients x512).
const FILTER_VERTICAL: [f32; 16] = [
    -0.009_454_062 * 512.0,
    -0.015_395_372 * 512.0,
    0.023_605_330 * 512.0,
    0.035_195_408 * 512.0,
    -0.052_544_566 * 512.0,
    -0.081_893_312 * 512.0,
    0.146_308_264 * 512.0,
    0.454_178_310 * 512.0,
    0.454_178_310 * 512.0,
    0.146_308_264 * 512.0,
    -0.081_893_312 * 512.0,
    -0.052_544_566 * 512.0,
    0.035_195_408 * 512.0,
    0.023_605_330 * 512.0,
    -0.015_395_372 * 512.0,
    -0.009_454_062 * 512.0,
];

const FILTER_SHIFT: usize = 9;

fn clamp_index(value: i64, max: usize) -> usize {
    value.clamp(0, max as i64) as usize
}

fn downsample_horizontal(img: &[f32], width: usize, row: usize, column: usize) -> f32 {
    let scale = 1.0f32 / (1u32 << FILTER_SHIFT) as f32;
    let position = (FILTER_HORIZONTAL.len() - 1) >> 1;
    let mut value = 0.0f64;
    for (tap, &coefficient) in FILTER_HORIZONTAL.iter().enumerate() {
        let x = clamp_index(column as i64 + tap as i64 - position as i64, width - 1);
        value += coefficient as f64 * img[row * width + x] as f64;
    }
    (value * scale as f64) as f32
}

fn downsample_vertical(img: &[f32], width: usize, height: usize, row: usize, column: usize) -> f32 {
    let scale = 1.0f32 / (1u32 << FILTER_SHIFT) as f32;
    let position = (FILTER_VERTICAL.len() - 1) >> 1;
    let mut value = 0.0f64;
    for (tap, &coefficient) in FILTER_VERTICAL.iter().enumerate() {
        let y = clamp_index(row as i64 + tap as i64 - position as i64, height - 1);
        value += coefficient as f64 * img[y * width + column] as f64;
    }
    (value * scale as f64) as f32
}

fn downsample_chroma(chroma_in: &[f32], width_in: usize, height_in: usize) -> Vec<f32> {
    let width_out = width_in / 2;
    let height_out = height_in / 2;
    let mut temp = vec![0.0f32; width_out * height_in];
    let mut out = vec![0.0f32; width_out * height_out];

    for i in 0..height_in {
        for j in 0..width_out {
            temp[i * width_out + j] = downsample_horizontal(chroma_in, width_in, i, j * 2);
        }
    }
    for i in 0..height_out {
        for j in 0..width_out {
            out[i * width_out + j] = downsample_vertical(&temp, width_out, height_in, 2 * i, j);
        }
    }
    out
}

/// Reference conversion: normalized float RGB, full-precision YUV444,
/// filtered chroma downsampling, rounded and clamped back to bytes.
pub(crate) fn rgb444_to_yuv420_reference(img: &mut Vec<u8>, width: usize, height: usize) {
    let image_size = width * height;

    let mut luma = vec![0.0f32; image_size];
    let mut cb = vec![0.0f32; image_size];
    let mut cr = vec![0.0f32; image_size];
    for i in 0..image_size {
        let r = img[i] as f64 / 255.0;
        let g = img[i + image_size] as f64 / 255.0;
        let b = img[i + 2 * image_size] as f64 / 255.0;
        luma[i] = (0.2126 * r + 0.7152 * g + 0.0722 * b).clamp(0.0, 1.0) as f32;
        cb[i] = (-0.114572 * r - 0.385428 * g + 0.5 * b).clamp(-0.5, 0.5) as f32;
        cr[i] = (0.5 * r - 0.454153 * g - 0.045847 * b).clamp(-0.5, 0.5) as f32;
    }

    let cb420 = downsample_chroma(&cb, width, height);
    let cr420 = downsample_chroma(&cr, width, height);

    let mut out = vec![0u8; image_size + (image_size >> 1)];
    for i in 0..image_size {
        out[i] = (255.0 * luma[i]).round().clamp(0.0, 255.0) as u8;
    }
    for i in 0..image_size / 4 {
        out[image_size + i] = (255.0 * cb420[i] + 128.0).round().clamp(0.0, 255.0) as u8;
        out[image_size + image_size / 4 + i] =
            (255.0 * cr420[i] + 128.0).round().clamp(0.0, 255.0) as u8;
    }

    *img = out;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_rgb(width: usize, height: usize, rgb: [u8; 3]) -> Vec<u8> {
        let plane = width * height;
        let mut img = vec![0u8; plane * 3];
        img[..plane].fill(rgb[0]);
        img[plane..2 * plane].fill(rgb[1]);
        img[2 * plane..].fill(rgb[2]);
        img
    }

    #[test]
    fn black_maps_to_zero_luma_and_neutral_chroma() {
        let mut img = uniform_rgb(4, 4, [0, 0, 0]);
        rgb444_to_yuv420(&mut img, 4, 4);
        assert_eq!(img.len(), 16 + 8);
        assert!(img[..16].iter().all(|&y| y == 0));
        assert!(img[16..].iter().all(|&c| c == 128));
    }

    #[test]
    fn mid_gray_is_mid_gray() {
        let mut img = uniform_rgb(4, 4, [128, 128, 128]);
        rgb444_to_yuv420(&mut img, 4, 4);
        assert!(img[..16].iter().all(|&y| y == 128), "luma {:?}", &img[..16]);
        assert!(img[16..].iter().all(|&c| c == 128));
    }

    #[test]
    fn reference_variant_matches_fast_within_one_lsb_on_gray() {
        let mut fast = uniform_rgb(8, 8, [128, 128, 128]);
        let mut reference = fast.clone();
        rgb444_to_yuv420(&mut fast, 8, 8);
        rgb444_to_yuv420_reference(&mut reference, 8, 8);
        assert_eq!(fast.len(), reference.len());
        for (a, b) in fast.iter().zip(reference.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn buffer_shrinks_to_yuv420_size() {
        let mut img = uniform_rgb(8, 4, [200, 10, 60]);
        rgb444_to_yuv420(&mut img, 8, 4);
        assert_eq!(img.len(), 8 * 4 * 3 / 2);
    }
}
