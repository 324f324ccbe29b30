//! Batched, parallel image loader

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::Arc;

use super::folder::ImageFolder;
use super::transforms::Transform;

/// One decoded batch, laid out (B, 3, H, W)
pub struct Batch {
    pub images: Vec<f32>,
    pub labels: Vec<u32>,
    pub image_size: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let n = self.len();
        let s = self.image_size;
        let images = Tensor::from_slice(&self.images, (n, 3, s, s), device)?;
        let labels = Tensor::from_slice(&self.labels, n, device)?;
        Ok((images, labels))
    }
}

pub struct DataLoader {
    dataset: Arc<ImageFolder>,
    transform: Transform,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
    pool: rayon::ThreadPool,
}

impl DataLoader {
    /// `workers == 0` lets rayon pick the thread count.
    pub fn new(
        dataset: Arc<ImageFolder>,
        transform: Transform,
        batch_size: usize,
        shuffle: bool,
        workers: usize,
        seed: u64,
    ) -> Result<Self> {
        if batch_size == 0 {
            anyhow::bail!("batch size must be at least 1");
        }
        transform.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("loader-{i}"))
            .build()
            .context("Failed to build data loader thread pool")?;
        Ok(Self {
            dataset,
            transform,
            batch_size,
            shuffle,
            seed,
            pool,
        })
    }

    /// Number of batches per epoch (last batch may be partial)
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Sample order for `epoch`
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            order.shuffle(&mut rng);
        }
        order
    }

    pub fn iter(&self, epoch: usize) -> BatchIter<'_> {
        BatchIter {
            loader: self,
            epoch,
            order: self.order(epoch),
            cursor: 0,
        }
    }

    fn load_batch(&self, epoch: usize, indices: &[usize]) -> Result<Batch> {
        let transform = self.transform;
        let dataset = &self.dataset;
        let seed = self.seed;

        let decoded: Vec<(Vec<f32>, u32)> = self.pool.install(|| {
            indices
                .par_iter()
                .map(|&idx| -> Result<(Vec<f32>, u32)> {
                    let sample = &dataset.samples[idx];
                    let img = image::open(&sample.path)
                        .with_context(|| format!("Failed to decode {:?}", sample.path))?;
                    // Per-sample stream keeps augmentation independent of the worker count.
                    let mut rng = StdRng::seed_from_u64(sample_seed(seed, epoch, idx));
                    Ok((transform.apply(img, &mut rng), sample.label))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let image_size = transform.output_size() as usize;
        let mut images = Vec::with_capacity(decoded.len() * 3 * image_size * image_size);
        let mut labels = Vec::with_capacity(decoded.len());
        for (pixels, label) in decoded {
            images.extend_from_slice(&pixels);
            labels.push(label);
        }
        Ok(Batch {
            images,
            labels,
            image_size,
        })
    }
}

fn sample_seed(seed: u64, epoch: usize, index: usize) -> u64 {
    seed.wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add((epoch as u64) << 32)
        .wrapping_add(index as u64)
}

pub struct BatchIter<'a> {
    loader: &'a DataLoader,
    epoch: usize,
    order: Vec<usize>,
    cursor: usize,
}

impl Iterator for BatchIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;
        Some(self.loader.load_batch(self.epoch, indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_folder(dir: &std::path::Path, per_class: usize) -> Result<()> {
        for (c, name) in ["a", "b"].iter().enumerate() {
            let class_dir = dir.join(name);
            std::fs::create_dir_all(&class_dir)?;
            for i in 0..per_class {
                let img = RgbImage::from_pixel(12, 10, Rgb([(c * 100) as u8, i as u8, 0]));
                img.save(class_dir.join(format!("{i}.png")))?;
            }
        }
        Ok(())
    }

    #[test]
    fn test_batches_cover_dataset_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_folder(dir.path(), 5)?;
        let folder = Arc::new(ImageFolder::open(dir.path())?);
        let loader = DataLoader::new(folder, Transform::eval(8), 4, true, 2, 11)?;
        assert_eq!(loader.len(), 3);

        let mut sizes = Vec::new();
        let mut labels = Vec::new();
        for batch in loader.iter(0) {
            let batch = batch?;
            assert_eq!(batch.images.len(), batch.len() * 3 * 8 * 8);
            sizes.push(batch.len());
            labels.extend(batch.labels);
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        labels.sort();
        assert_eq!(labels, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
        Ok(())
    }

    #[test]
    fn test_shuffle_changes_per_epoch_but_is_reproducible() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_folder(dir.path(), 8)?;
        let folder = Arc::new(ImageFolder::open(dir.path())?);
        let loader = DataLoader::new(folder.clone(), Transform::eval(8), 4, true, 1, 5)?;
        assert_eq!(loader.order(0), loader.order(0));
        assert_ne!(loader.order(0), loader.order(1));

        let ordered = DataLoader::new(folder, Transform::eval(8), 4, false, 1, 5)?;
        assert_eq!(ordered.order(3), (0..16).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_augmented_batches_do_not_depend_on_worker_count() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_folder(dir.path(), 6)?;
        let folder = Arc::new(ImageFolder::open(dir.path())?);
        let transform = Transform::train(8, 0.08, 0.1);
        let single = DataLoader::new(folder.clone(), transform, 5, true, 1, 3)?;
        let pooled = DataLoader::new(folder, transform, 5, true, 4, 3)?;

        for epoch in [0, 2] {
            let a = single.iter(epoch).collect::<Result<Vec<_>>>()?;
            let b = pooled.iter(epoch).collect::<Result<Vec<_>>>()?;
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(&b) {
                assert_eq!(x.labels, y.labels);
                assert_eq!(x.images, y.images);
            }
        }
        Ok(())
    }

    #[test]
    fn test_invalid_crop_scale_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_folder(dir.path(), 1)?;
        let folder = Arc::new(ImageFolder::open(dir.path())?);
        let err = DataLoader::new(folder, Transform::train(8, 1.5, 0.1), 2, true, 1, 0)
            .err()
            .expect("crop scale above 1 must fail");
        assert!(err.to_string().contains("crop scale"));
        Ok(())
    }

    #[test]
    fn test_batch_tensors() -> Result<()> {
        let batch = Batch {
            images: vec![0.0; 2 * 3 * 4 * 4],
            labels: vec![1, 0],
            image_size: 4,
        };
        let (x, y) = batch.to_tensors(&Device::Cpu)?;
        assert_eq!(x.dims(), &[2, 3, 4, 4]);
        assert_eq!(y.to_vec1::<u32>()?, vec![1, 0]);
        Ok(())
    }
}
