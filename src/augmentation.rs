//! Randomized image perturbations for test-time augmentation.
//!
//! Works on pixel-domain `H x W x 3` arrays (0-255), before any model
//! normalization. Steps run in a fixed order; each operates on the output
//! of the previous one.

use ndarray::{s, Array3, ArrayView3, Axis};
use rand::Rng;

/// Upper bound of the pixel range
const PIXEL_MAX: f32 = 255.0;

/// Randomly drawn parameters for one augmented variant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentParams {
    /// Counter-clockwise quarter turns (0-3)
    pub quarter_turns: u8,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Additive shift as a fraction of the pixel range
    pub brightness_delta: f32,
    pub contrast_factor: f32,
    pub saturation_factor: f32,
}

impl AugmentParams {
    /// Parameters that leave the image unchanged
    pub fn identity() -> Self {
        Self {
            quarter_turns: 0,
            flip_horizontal: false,
            flip_vertical: false,
            brightness_delta: 0.0,
            contrast_factor: 1.0,
            saturation_factor: 1.0,
        }
    }

    /// Draw parameters for an image of the given shape.
    ///
    /// Non-square images only rotate by 0 or 180 degrees so the model input
    /// shape is preserved.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, square: bool) -> Self {
        let quarter_turns = if square {
            rng.gen_range(0..4u8)
        } else {
            rng.gen_range(0..2u8) * 2
        };

        Self {
            quarter_turns,
            flip_horizontal: rng.gen::<f32>() > 0.4,
            flip_vertical: rng.gen::<f32>() > 0.7,
            brightness_delta: rng.gen_range(-0.2..=0.2),
            contrast_factor: rng.gen_range(0.7..=1.4),
            saturation_factor: rng.gen_range(0.5..=1.8),
        }
    }
}

/// Test-time augmentation engine
#[derive(Debug, Clone, Copy, Default)]
pub struct Augmenter;

impl Augmenter {
    pub fn new() -> Self {
        Self
    }

    /// Produce one randomized variant of `image`
    pub fn augment<R: Rng + ?Sized>(&self, image: ArrayView3<f32>, rng: &mut R) -> Array3<f32> {
        let (height, width, _) = image.dim();
        let params = AugmentParams::sample(rng, height == width);
        self.apply(image, &params)
    }

    /// Apply a fixed set of parameters
    pub fn apply(&self, image: ArrayView3<f32>, params: &AugmentParams) -> Array3<f32> {
        let mut out = rotate90(image, params.quarter_turns);

        if params.flip_horizontal {
            out = out.slice(s![.., ..;-1, ..]).to_owned();
        }
        if params.flip_vertical {
            out = out.slice(s![..;-1, .., ..]).to_owned();
        }

        adjust_brightness(&mut out, params.brightness_delta);
        adjust_contrast(&mut out, params.contrast_factor);
        adjust_saturation(&mut out, params.saturation_factor);

        out.mapv_inplace(|v| v.clamp(0.0, PIXEL_MAX));
        out
    }
}

/// Rotate counter-clockwise by `k` quarter turns
pub fn rotate90(image: ArrayView3<f32>, k: u8) -> Array3<f32> {
    match k % 4 {
        0 => image.to_owned(),
        1 => image
            .permuted_axes([1, 0, 2])
            .slice_move(s![..;-1, .., ..])
            .to_owned(),
        2 => image.slice(s![..;-1, ..;-1, ..]).to_owned(),
        _ => image
            .permuted_axes([1, 0, 2])
            .slice_move(s![.., ..;-1, ..])
            .to_owned(),
    }
}

/// Add `delta` (fraction of the pixel range) to every value
pub fn adjust_brightness(image: &mut Array3<f32>, delta: f32) {
    let shift = delta * PIXEL_MAX;
    image.mapv_inplace(|v| v + shift);
}

/// Scale each channel's deviation from its spatial mean
pub fn adjust_contrast(image: &mut Array3<f32>, factor: f32) {
    for mut channel in image.axis_iter_mut(Axis(2)) {
        let mean = channel.mean().unwrap_or(0.0);
        channel.mapv_inplace(|v| (v - mean) * factor + mean);
    }
}

/// Scale HSV saturation by `factor`, keeping hue and value.
///
/// For a fixed hue and value each channel sits at `v - (v - c)`, with the
/// distance to `v` proportional to saturation, so scaling that distance by
/// `s' / s` is an exact HSV round trip.
pub fn adjust_saturation(image: &mut Array3<f32>, factor: f32) {
    for mut pixel in image.lanes_mut(Axis(2)) {
        let max = pixel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min = pixel.iter().copied().fold(f32::INFINITY, f32::min);
        if max <= 0.0 || max == min {
            continue;
        }

        let saturation = (max - min) / max;
        let scaled = (saturation * factor).clamp(0.0, 1.0);
        let ratio = scaled / saturation;
        pixel.mapv_inplace(|c| max - (max - c) * ratio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 2x3 image whose red channel encodes the pixel position
    fn indexed_image(height: usize, width: usize) -> Array3<f32> {
        Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
            if c == 0 {
                (y * width + x) as f32
            } else {
                100.0
            }
        })
    }

    fn red(image: &Array3<f32>) -> Vec<Vec<f32>> {
        image
            .index_axis(Axis(2), 0)
            .outer_iter()
            .map(|row| row.to_vec())
            .collect()
    }

    #[test]
    fn test_rotate90_counter_clockwise() {
        // [[0, 1, 2],
        //  [3, 4, 5]]
        let image = indexed_image(2, 3);

        assert_eq!(red(&rotate90(image.view(), 1)), vec![vec![2.0, 5.0], vec![1.0, 4.0], vec![0.0, 3.0]]);
        assert_eq!(red(&rotate90(image.view(), 2)), vec![vec![5.0, 4.0, 3.0], vec![2.0, 1.0, 0.0]]);
        assert_eq!(red(&rotate90(image.view(), 3)), vec![vec![3.0, 0.0], vec![4.0, 1.0], vec![5.0, 2.0]]);
        assert_eq!(rotate90(image.view(), 4), image);
    }

    #[test]
    fn test_identity_params_leave_image_unchanged() {
        let image = indexed_image(4, 4);
        let out = Augmenter::new().apply(image.view(), &AugmentParams::identity());
        assert_eq!(out, image);
    }

    #[test]
    fn test_flips_follow_rotation() {
        let image = indexed_image(2, 2);
        let params = AugmentParams {
            quarter_turns: 1,
            flip_horizontal: true,
            ..AugmentParams::identity()
        };

        // rot90: [[1, 3], [0, 2]] then mirrored left-right
        let out = Augmenter::new().apply(image.view(), &params);
        assert_eq!(red(&out), vec![vec![3.0, 1.0], vec![2.0, 0.0]]);

        let params = AugmentParams {
            flip_vertical: true,
            ..AugmentParams::identity()
        };
        let out = Augmenter::new().apply(image.view(), &params);
        assert_eq!(red(&out), vec![vec![2.0, 3.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_brightness_scales_to_pixel_range_and_clips() {
        let image = Array3::from_elem((2, 2, 3), 240.0);
        let params = AugmentParams {
            brightness_delta: 0.1,
            ..AugmentParams::identity()
        };
        let out = Augmenter::new().apply(image.view(), &params);
        assert!(out.iter().all(|&v| v == 255.0));

        let mut image = Array3::from_elem((1, 1, 3), 100.0);
        adjust_brightness(&mut image, -0.2);
        assert!((image[[0, 0, 0]] - 49.0).abs() < 1e-4);
    }

    #[test]
    fn test_contrast_preserves_channel_mean() {
        let mut image = Array3::from_shape_vec((1, 2, 3), vec![50.0, 10.0, 0.0, 150.0, 30.0, 0.0]).unwrap();
        adjust_contrast(&mut image, 1.4);

        assert!((image[[0, 0, 0]] - 30.0).abs() < 1e-4);
        assert!((image[[0, 1, 0]] - 170.0).abs() < 1e-4);
        assert!((image[[0, 0, 1]] - 6.0).abs() < 1e-4);
        assert!(image[[0, 0, 2]].abs() < 1e-6);
    }

    #[test]
    fn test_saturation_keeps_value_and_grays() {
        let mut image = Array3::from_shape_vec((1, 2, 3), vec![200.0, 100.0, 150.0, 80.0, 80.0, 80.0]).unwrap();
        adjust_saturation(&mut image, 0.5);

        // s = 0.5 -> 0.25: distance to max halves, max stays
        assert!((image[[0, 0, 0]] - 200.0).abs() < 1e-4);
        assert!((image[[0, 0, 1]] - 150.0).abs() < 1e-4);
        assert!((image[[0, 0, 2]] - 175.0).abs() < 1e-4);
        assert_eq!(image[[0, 1, 0]], 80.0);

        // s = 0.5 -> 0.9: below the clamp
        let mut image = Array3::from_shape_vec((1, 1, 3), vec![200.0, 100.0, 150.0]).unwrap();
        adjust_saturation(&mut image, 1.8);
        assert!((image[[0, 0, 1]] - 20.0).abs() < 1e-3);
        assert!((image[[0, 0, 2]] - 110.0).abs() < 1e-3);

        // s = 0.75 -> 1.35 clamps to 1.0: min channel hits zero
        let mut image = Array3::from_shape_vec((1, 1, 3), vec![200.0, 50.0, 150.0]).unwrap();
        adjust_saturation(&mut image, 1.8);
        assert!((image[[0, 0, 0]] - 200.0).abs() < 1e-4);
        assert!(image[[0, 0, 1]].abs() < 1e-3);
        assert!((image[[0, 0, 2]] - 400.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_sampled_params_within_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let params = AugmentParams::sample(&mut rng, true);
            assert!(params.quarter_turns < 4);
            assert!((-0.2..=0.2).contains(&params.brightness_delta));
            assert!((0.7..=1.4).contains(&params.contrast_factor));
            assert!((0.5..=1.8).contains(&params.saturation_factor));

            let params = AugmentParams::sample(&mut rng, false);
            assert!(params.quarter_turns == 0 || params.quarter_turns == 2);
        }
    }

    #[test]
    fn test_augment_is_reproducible_with_seed_and_in_range() {
        let image = indexed_image(6, 6).mapv(|v| v * 7.0);
        let augmenter = Augmenter::new();

        let a = augmenter.augment(image.view(), &mut StdRng::seed_from_u64(42));
        let b = augmenter.augment(image.view(), &mut StdRng::seed_from_u64(42));

        assert_eq!(a, b);
        assert_eq!(a.dim(), image.dim());
        assert!(a.iter().all(|&v| (0.0..=255.0).contains(&v)));
    }

    #[test]
    fn test_non_square_shape_preserved() {
        let image = indexed_image(4, 6);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            assert_eq!(Augmenter::new().augment(image.view(), &mut rng).dim(), (4, 6, 3));
        }
    }
}
