//! Image transforms - ImageNet-style augmentation and evaluation preprocessing

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// PCA of ImageNet RGB pixels (AlexNet lighting noise)
const PCA_EIGVAL: [f32; 3] = [0.2175, 0.0188, 0.0045];
const PCA_EIGVEC: [[f32; 3]; 3] = [
    [-0.5675, 0.7192, 0.4009],
    [-0.5808, -0.0045, -0.8140],
    [-0.5836, -0.6948, 0.4203],
];

const CROP_RATIO: (f64, f64) = (3.0 / 4.0, 4.0 / 3.0);
const CROP_ATTEMPTS: usize = 10;

/// Per-sample preprocessing, producing a normalized CHW buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// RandomResizedCrop -> Lighting -> RandomHorizontalFlip -> ToTensor -> Normalize
    Train {
        size: u32,
        crop_scale: f64,
        lighting: f32,
    },
    /// Resize(shorter side) -> CenterCrop -> ToTensor -> Normalize
    Eval { resize: u32, crop: u32 },
}

impl Transform {
    pub fn train(size: u32, crop_scale: f64, lighting: f32) -> Self {
        Transform::Train {
            size,
            crop_scale,
            lighting,
        }
    }

    /// Evaluation crop of `size`, resizing the shorter side to `size * 256 / 224` first.
    pub fn eval(size: u32) -> Self {
        Transform::Eval {
            resize: ((size as u64 * 256 + 112) / 224) as u32,
            crop: size,
        }
    }

    /// Rejects parameters the samplers cannot draw from.
    pub fn validate(&self) -> anyhow::Result<()> {
        let size = self.output_size();
        if size == 0 {
            anyhow::bail!("image size must be at least 1");
        }
        if let Transform::Train { crop_scale, .. } = *self {
            if !(crop_scale > 0.0 && crop_scale <= 1.0) {
                anyhow::bail!("crop scale must be in (0, 1], got {crop_scale}");
            }
        }
        Ok(())
    }

    pub fn output_size(&self) -> u32 {
        match *self {
            Transform::Train { size, .. } => size,
            Transform::Eval { crop, .. } => crop,
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: DynamicImage, rng: &mut R) -> Vec<f32> {
        let rgb = img.into_rgb8();
        let out = match *self {
            Transform::Train {
                size,
                crop_scale,
                lighting,
            } => {
                let mut img = random_resized_crop(&rgb, size, (crop_scale, 1.0), CROP_RATIO, rng);
                apply_lighting(&mut img, lighting, rng);
                if rng.gen_bool(0.5) {
                    imageops::flip_horizontal_in_place(&mut img);
                }
                img
            }
            Transform::Eval { resize, crop } => center_crop(&resize_shorter(&rgb, resize), crop),
        };
        to_normalized_chw(&out)
    }
}

/// (top, left, height, width) of a RandomResizedCrop window
pub fn sample_crop_window<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
    rng: &mut R,
) -> (u32, u32, u32, u32) {
    let area = (width as f64) * (height as f64);
    let log_ratio = (ratio.0.ln(), ratio.1.ln());

    for _ in 0..CROP_ATTEMPTS {
        let target_area = area * rng.gen_range(scale.0..=scale.1);
        let aspect = rng.gen_range(log_ratio.0..=log_ratio.1).exp();

        let w = (target_area * aspect).sqrt().round() as u32;
        let h = (target_area / aspect).sqrt().round() as u32;

        if w > 0 && h > 0 && w <= width && h <= height {
            let top = rng.gen_range(0..=height - h);
            let left = rng.gen_range(0..=width - w);
            return (top, left, h, w);
        }
    }

    // Fallback to central crop
    let in_ratio = width as f64 / height as f64;
    let (w, h) = if in_ratio < ratio.0 {
        (width, ((width as f64 / ratio.0).round() as u32).clamp(1, height))
    } else if in_ratio > ratio.1 {
        (((height as f64 * ratio.1).round() as u32).clamp(1, width), height)
    } else {
        (width, height)
    };
    ((height - h) / 2, (width - w) / 2, h, w)
}

pub fn random_resized_crop<R: Rng + ?Sized>(
    img: &RgbImage,
    size: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
    rng: &mut R,
) -> RgbImage {
    let (top, left, h, w) = sample_crop_window(img.width(), img.height(), scale, ratio, rng);
    let cropped = imageops::crop_imm(img, left, top, w, h).to_image();
    imageops::resize(&cropped, size, size, FilterType::Triangle)
}

/// Adds `eigvec · (eigval ⊙ α)` with `α ~ N(0, alphastd²)` to every pixel.
pub fn apply_lighting<R: Rng + ?Sized>(img: &mut RgbImage, alphastd: f32, rng: &mut R) {
    if alphastd == 0.0 {
        return;
    }
    let alpha: [f32; 3] = std::array::from_fn(|_| {
        let z: f32 = StandardNormal.sample(rng);
        z * alphastd
    });
    let inc = lighting_increment(alpha);
    for px in img.pixels_mut() {
        for c in 0..3 {
            px.0[c] = (px.0[c] as f32 + inc[c]).clamp(0.0, 255.0) as u8;
        }
    }
}

pub fn lighting_increment(alpha: [f32; 3]) -> [f32; 3] {
    let v: [f32; 3] = std::array::from_fn(|i| alpha[i] * PCA_EIGVAL[i]);
    std::array::from_fn(|row| (0..3).map(|k| PCA_EIGVEC[row][k] * v[k]).sum())
}

/// Resizes so the shorter side equals `size`, keeping the aspect ratio.
pub fn resize_shorter(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if (w <= h && w == size) || (h <= w && h == size) {
        return img.clone();
    }
    let (nw, nh) = if w < h {
        (size, (size as u64 * h as u64 / w as u64) as u32)
    } else {
        ((size as u64 * w as u64 / h as u64) as u32, size)
    };
    imageops::resize(img, nw.max(1), nh.max(1), FilterType::Triangle)
}

/// Centre crop; images smaller than `size` are padded with black first.
pub fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let img = if w < size || h < size {
        let mut canvas = RgbImage::new(w.max(size), h.max(size));
        let x = (canvas.width() - w) / 2;
        let y = (canvas.height() - h) / 2;
        imageops::replace(&mut canvas, img, x as i64, y as i64);
        canvas
    } else {
        img.clone()
    };
    let (w, h) = img.dimensions();
    let top = ((h - size) as f64 / 2.0).round() as u32;
    let left = ((w - size) as f64 / 2.0).round() as u32;
    imageops::crop_imm(&img, left, top, size, size).to_image()
}

/// HWC u8 -> CHW f32, scaled to [0, 1] then normalized per channel.
pub fn to_normalized_chw(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut out = vec![0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (px.0[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_crop_window_stays_inside_image() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let (top, left, h, w) = sample_crop_window(320, 200, (0.08, 1.0), CROP_RATIO, &mut rng);
            assert!(h > 0 && w > 0);
            assert!(top + h <= 200 && left + w <= 320);
        }
    }

    #[test]
    fn test_crop_window_fallback_for_extreme_ratio() {
        // 1000x10 never satisfies the 3/4..4/3 window at scale 1.0
        let mut rng = StdRng::seed_from_u64(1);
        let (top, left, h, w) = sample_crop_window(1000, 10, (1.0, 1.0), CROP_RATIO, &mut rng);
        assert_eq!((h, w), (10, 13));
        assert_eq!(top, 0);
        assert_eq!(left, (1000 - 13) / 2);
    }

    #[test]
    fn test_validate_rejects_out_of_range_crop_scale() {
        assert!(Transform::train(32, 0.08, 0.1).validate().is_ok());
        assert!(Transform::train(32, 1.0, 0.0).validate().is_ok());
        assert!(Transform::train(32, 1.5, 0.1).validate().is_err());
        assert!(Transform::train(32, 0.0, 0.1).validate().is_err());
        assert!(Transform::train(32, f64::NAN, 0.1).validate().is_err());
        assert!(Transform::eval(0).validate().is_err());
        assert!(Transform::eval(32).validate().is_ok());
    }

    #[test]
    fn test_eval_pipeline_shapes() {
        let t = Transform::eval(224);
        assert_eq!(t, Transform::Eval { resize: 256, crop: 224 });

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 500, Rgb([255, 0, 128])));
        let mut rng = StdRng::seed_from_u64(0);
        let out = t.apply(img, &mut rng);
        assert_eq!(out.len(), 3 * 224 * 224);
        let r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        // one u8 step after resampling is ~0.017 once normalized
        assert!((out[0] - r).abs() < 0.02);
        assert!((out[224 * 224] - g).abs() < 0.02);
    }

    #[test]
    fn test_resize_shorter_keeps_aspect() {
        let img = RgbImage::new(400, 200);
        let out = resize_shorter(&img, 100);
        assert_eq!(out.dimensions(), (200, 100));
    }

    #[test]
    fn test_center_crop_pads_small_images() {
        let img = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let out = center_crop(&img, 8);
        assert_eq!(out.dimensions(), (8, 8));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_lighting_zero_std_is_identity() {
        let mut img = RgbImage::from_pixel(3, 3, Rgb([100, 150, 200]));
        let mut rng = StdRng::seed_from_u64(3);
        apply_lighting(&mut img, 0.0, &mut rng);
        assert_eq!(img.get_pixel(1, 1), &Rgb([100, 150, 200]));
    }

    #[test]
    fn test_lighting_increment_follows_pca() {
        let inc = lighting_increment([1.0, 0.0, 0.0]);
        assert!((inc[0] - (-0.5675 * 0.2175)).abs() < 1e-6);
        assert!((inc[1] - (-0.5808 * 0.2175)).abs() < 1e-6);
        assert!((inc[2] - (-0.5836 * 0.2175)).abs() < 1e-6);
    }

    #[test]
    fn test_train_pipeline_is_seeded() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
            Rgb([(x * 3) as u8, (y * 5) as u8, 77])
        }));
        let t = Transform::train(32, 0.08, 0.1);
        let a = t.apply(img.clone(), &mut StdRng::seed_from_u64(42));
        let b = t.apply(img, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.len(), 3 * 32 * 32);
        assert_eq!(a, b);
    }
}
