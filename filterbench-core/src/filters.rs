//! Image Filter Pipeline
//!
//! The CPU-bound workload being benchmarked. Each source image is decoded
//! once and five independent transforms are written to
//! `<output>/<transform>/<category>_<file name>`, where `category` is the name
//! of the folder the image came from. Prefixing the category keeps images
//! with the same file name in different folders from overwriting each other.

use crate::identity::current_worker_id;
use crate::unit::UnitOfWork;
use filterbench_ipc::{WorkItem, WorkResult};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identifier reported when a failure happens before the output name is known
pub const UNKNOWN_NAME: &str = "unknown";

/// Gaussian blur strength
const BLUR_SIGMA: f32 = 3.0;
/// Sharpness blend factor against a smoothed copy (1.0 = unchanged)
const SHARPEN_FACTOR: f32 = 3.0;
/// Brightness blend factor against black (1.0 = unchanged)
const BRIGHTNESS_FACTOR: f32 = 1.5;

/// 3x3 smoothing kernel, normalized by `filter3x3`
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
/// 3x3 edge kernel (sums to zero)
const EDGE_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];

/// Errors from decoding, transforming or saving an image
#[derive(Debug, Error)]
pub enum FilterError {
    /// Decoding or encoding failed
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Creating an output folder failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source path ends in `..` or a root
    #[error("source path has no file name: {0}")]
    NoFileName(String),
}

/// One of the five independent transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Single-channel luminance
    Grayscale,
    /// Gaussian blur
    Blur,
    /// Edge detection on the grayscale image
    Edge,
    /// Sharpness enhancement
    Sharpen,
    /// Brightness enhancement
    Brightness,
}

impl Transform {
    /// All transforms, in the order they are applied
    pub const ALL: [Transform; 5] = [
        Transform::Grayscale,
        Transform::Blur,
        Transform::Edge,
        Transform::Sharpen,
        Transform::Brightness,
    ];

    /// Output subfolder for this transform
    pub fn folder(self) -> &'static str {
        match self {
            Transform::Grayscale => "grayscale",
            Transform::Blur => "blur",
            Transform::Edge => "edge",
            Transform::Sharpen => "sharpen",
            Transform::Brightness => "brightness",
        }
    }

    fn render(self, original: &DynamicImage, rgb: &RgbImage) -> DynamicImage {
        match self {
            Transform::Grayscale => original.grayscale(),
            Transform::Blur => original.blur(BLUR_SIGMA),
            Transform::Edge => original.grayscale().filter3x3(&EDGE_KERNEL),
            Transform::Sharpen => {
                let smoothed = original.filter3x3(&SMOOTH_KERNEL).to_rgb8();
                DynamicImage::ImageRgb8(enhance(&smoothed, rgb, SHARPEN_FACTOR))
            }
            Transform::Brightness => {
                let black = RgbImage::new(rgb.width(), rgb.height());
                DynamicImage::ImageRgb8(enhance(&black, rgb, BRIGHTNESS_FACTOR))
            }
        }
    }
}

/// Interpolate (or extrapolate) from `degenerate` towards `image`:
/// `degenerate + factor * (image - degenerate)`, clamped per channel.
fn enhance(degenerate: &RgbImage, image: &RgbImage, factor: f32) -> RgbImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let base = degenerate.get_pixel(x, y);
        let px = image.get_pixel(x, y);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let b = base[c] as f32;
            let v = b + factor * (px[c] as f32 - b);
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Output file name for `source`: `<parent folder>_<file name>`, or just the
/// file name when the source has no parent folder.
pub fn unique_name(source: &Path) -> Result<String, FilterError> {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FilterError::NoFileName(source.display().to_string()))?;

    let category = source
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned());

    Ok(match category {
        Some(category) if !category.is_empty() => format!("{}_{}", category, file_name),
        _ => file_name,
    })
}

/// The five-transform image workload
#[derive(Debug, Clone)]
pub struct FilterPipeline {
    transforms: Vec<Transform>,
}

impl FilterPipeline {
    /// Pipeline applying all five transforms
    pub fn new() -> Self {
        Self {
            transforms: Transform::ALL.to_vec(),
        }
    }

    /// Pipeline applying only the given transforms
    pub fn with_transforms(transforms: &[Transform]) -> Self {
        Self {
            transforms: transforms.to_vec(),
        }
    }

    /// Transforms this pipeline applies
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// Where `transform` writes the output for `name`
    pub fn output_path(output_dir: &Path, transform: Transform, name: &str) -> PathBuf {
        output_dir.join(transform.folder()).join(name)
    }

    fn process(&self, item: &WorkItem, name: &str) -> Result<(), FilterError> {
        let original = DynamicImage::ImageRgb8(image::open(&item.source)?.to_rgb8());
        let rgb = original.to_rgb8();
        let output_dir = Path::new(&item.output_dir);

        for &transform in &self.transforms {
            let target = Self::output_path(output_dir, transform, name);
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir)?;
            }
            transform.render(&original, &rgb).save(&target)?;
        }
        Ok(())
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitOfWork for FilterPipeline {
    fn apply(&self, item: &WorkItem) -> WorkResult {
        let worker = current_worker_id();

        let name = match unique_name(Path::new(&item.source)) {
            Ok(name) => name,
            Err(e) => return WorkResult::error(UNKNOWN_NAME, worker, e.to_string()),
        };

        match self.process(item, &name) {
            Ok(()) => WorkResult::success(name, worker),
            Err(e) => {
                tracing::debug!(source = %item.source, error = %e, "filter pipeline failed");
                WorkResult::error(name, worker, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn write_gradient(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 25 % 256) as u8, (y * 40 % 256) as u8, 128])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_unique_name_uses_parent_folder() {
        let name = unique_name(Path::new("input/apple_pie/10293.jpg")).unwrap();
        assert_eq!(name, "apple_pie_10293.jpg");
    }

    #[test]
    fn test_unique_name_without_parent() {
        assert_eq!(unique_name(Path::new("cat.png")).unwrap(), "cat.png");
        assert!(unique_name(Path::new("/")).is_err());
    }

    #[test]
    fn test_enhance_factor_one_is_identity() {
        let img = RgbImage::from_pixel(2, 2, Rgb([10, 100, 250]));
        let black = RgbImage::new(2, 2);
        assert_eq!(enhance(&black, &img, 1.0), img);
    }

    #[test]
    fn test_brightness_clamps() {
        let img = RgbImage::from_pixel(1, 1, Rgb([100, 200, 0]));
        let black = RgbImage::new(1, 1);
        let bright = enhance(&black, &img, BRIGHTNESS_FACTOR);
        assert_eq!(bright.get_pixel(0, 0), &Rgb([150, 255, 0]));
    }

    #[test]
    fn test_edge_of_flat_image_is_black() {
        let flat = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(4, 4, Luma([90u8])));
        let edges = flat.filter3x3(&EDGE_KERNEL).to_luma8();
        assert!(edges.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_pipeline_writes_every_transform() {
        let dir = tempfile::tempdir().unwrap();
        let category = dir.path().join("input").join("waffles");
        std::fs::create_dir_all(&category).unwrap();
        let source = category.join("1.png");
        write_gradient(&source, 12, 8);

        let out = dir.path().join("out");
        let item = WorkItem::new(&source, &out);
        let result = FilterPipeline::new().apply(&item);

        assert!(result.is_success(), "{:?}", result);
        assert_eq!(result.identifier, "waffles_1.png");
        assert_eq!(result.worker, current_worker_id());
        for transform in Transform::ALL {
            let path = FilterPipeline::output_path(&out, transform, "waffles_1.png");
            assert!(path.exists(), "missing {}", path.display());
        }
    }

    #[test]
    fn test_missing_source_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let item = WorkItem::new(dir.path().join("cakes").join("gone.jpg"), dir.path());
        let result = FilterPipeline::new().apply(&item);

        assert!(!result.is_success());
        assert_eq!(result.identifier, "cakes_gone.jpg");
        assert_eq!(result.identifier, item.identifier());
        assert!(result.error_detail().is_some());
    }

    #[test]
    fn test_undecodable_source_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("not_an_image.png");
        std::fs::write(&source, b"definitely not png").unwrap();

        let pipeline = FilterPipeline::with_transforms(&[Transform::Grayscale]);
        let result = pipeline.apply(&WorkItem::new(&source, dir.path().join("out")));
        assert!(!result.is_success());
    }
}
