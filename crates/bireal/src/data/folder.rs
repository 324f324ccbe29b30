//! ImageFolder - `root/<class>/<image>` dataset index

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

/// One labelled sample on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: u32,
}

/// Dataset indexed from a directory tree where every sub-directory is a class.
/// Classes are sorted by name and numbered from 0.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root: PathBuf,
    pub classes: Vec<String>,
    pub samples: Vec<Sample>,
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
}

impl ImageFolder {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        let mut class_dirs: Vec<(String, PathBuf)> = std::fs::read_dir(&root)
            .with_context(|| format!("Failed to read dataset directory {:?}", root))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| (entry.file_name().to_string_lossy().to_string(), entry.path()))
            .collect();
        class_dirs.sort_by(|a, b| a.0.cmp(&b.0));

        if class_dirs.is_empty() {
            anyhow::bail!("No class directories found in {:?}", root);
        }

        let mut classes = Vec::with_capacity(class_dirs.len());
        let mut samples = Vec::new();
        for (label, (name, dir)) in class_dirs.into_iter().enumerate() {
            let mut files = Vec::new();
            collect_images(&dir, &mut files)?;
            files.sort();
            samples.extend(files.into_iter().map(|path| Sample {
                path,
                label: label as u32,
            }));
            classes.push(name);
        }

        if samples.is_empty() {
            anyhow::bail!("Found 0 images in subfolders of {:?}", root);
        }

        tracing::info!(
            "ImageFolder: {:?} ({} classes, {} images)",
            root,
            classes.len(),
            samples.len()
        );

        Ok(Self {
            root,
            classes,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

// Class folders may nest images in sub-directories.
fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if is_image_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}
