//! Data Module - image classification input pipeline
//!
//! - folder: `root/<class>/<image>` indexing
//! - transforms: augmentation and evaluation preprocessing
//! - loader: batching with a rayon worker pool

pub mod folder;
pub mod loader;
pub mod transforms;

pub use folder::{ImageFolder, Sample};
pub use loader::{Batch, DataLoader};
pub use transforms::Transform;
