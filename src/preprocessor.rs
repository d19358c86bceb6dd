//! Image preprocessing for classifier input.
//!
//! Decodes an image file into an `H x W x 3` pixel array (values 0-255) and
//! applies the input normalization the model family was trained with.
//! Tensors are produced with a leading batch dimension of size 1.

use crate::error::{ClassifierError, Result};
use crate::types::ModelFamily;
use image::imageops::FilterType;
use image::ImageReader;
use ndarray::{Array3, Array4, ArrayView3, Axis};
use std::path::Path;

/// ImageNet channel means in BGR order, as used by Keras "caffe" preprocessing
const IMAGENET_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// Input normalization scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Scale to [0, 1]
    UnitRange,
    /// RGB to BGR, subtract ImageNet means, no scaling
    Caffe,
    /// Leave pixel values untouched; the graph rescales internally
    Identity,
    /// Scale to [-1, 1]
    SymmetricRange,
}

impl Normalization {
    /// Normalization expected by a model family
    pub fn for_family(family: ModelFamily) -> Self {
        match family {
            ModelFamily::ResNet => Normalization::Caffe,
            ModelFamily::EfficientNet => Normalization::Identity,
            ModelFamily::MobileNet | ModelFamily::Generic => Normalization::SymmetricRange,
        }
    }

    /// Normalize a pixel-domain image
    pub fn apply(&self, pixels: ArrayView3<f32>) -> Array3<f32> {
        match self {
            Normalization::UnitRange => pixels.mapv(|v| v / 255.0),
            Normalization::Identity => pixels.to_owned(),
            Normalization::SymmetricRange => pixels.mapv(|v| v / 127.5 - 1.0),
            Normalization::Caffe => {
                Array3::from_shape_fn(pixels.dim(), |(y, x, c)| {
                    pixels[[y, x, 2 - c]] - IMAGENET_BGR_MEAN[c]
                })
            }
        }
    }
}

/// Decode an image, force RGB and stretch it to `(width, height)`.
///
/// The format is sniffed from the file contents, not the extension.
pub fn load_rgb(path: &Path, size: (u32, u32), filter: FilterType) -> Result<Array3<f32>> {
    let (width, height) = size;

    let image = ImageReader::open(path)
        .map_err(|e| ClassifierError::decode(path, e))?
        .with_guessed_format()
        .map_err(|e| ClassifierError::decode(path, e))?
        .decode()
        .map_err(|e| ClassifierError::decode(path, e))?;

    if width == 0 || height == 0 {
        return Err(ClassifierError::decode(path, "target size must be non-zero"));
    }

    let rgb = image.resize_exact(width, height, filter).to_rgb8();
    let raw: Vec<f32> = rgb.into_raw().into_iter().map(f32::from).collect();

    Array3::from_shape_vec((height as usize, width as usize, 3), raw)
        .map_err(|e| ClassifierError::decode(path, e))
}

/// Add the leading batch dimension
pub fn to_batch(image: Array3<f32>) -> Array4<f32> {
    image.insert_axis(Axis(0))
}

/// Preprocessor bound to one model's input size and family
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    size: (u32, u32),
    normalization: Normalization,
}

impl ImagePreprocessor {
    pub fn new(size: (u32, u32), family: ModelFamily) -> Self {
        Self {
            size,
            normalization: Normalization::for_family(family),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Pixel-domain image (0-255), before any normalization
    pub fn load_pixels(&self, path: &Path) -> Result<Array3<f32>> {
        load_rgb(path, self.size, FilterType::Triangle)
    }

    /// Family-normalized pixels with the batch dimension added
    pub fn normalize(&self, pixels: ArrayView3<f32>) -> Array4<f32> {
        to_batch(self.normalization.apply(pixels))
    }

    /// Decode and apply the family-specific normalization
    pub fn preprocess(&self, path: &Path) -> Result<Array4<f32>> {
        let pixels = self.load_pixels(path)?;
        Ok(self.normalize(pixels.view()))
    }

    /// Decode and scale to [0, 1]; used by the basic prediction path
    pub fn preprocess_basic(&self, path: &Path) -> Result<Array4<f32>> {
        let pixels = load_rgb(path, self.size, FilterType::CatmullRom)?;
        Ok(to_batch(Normalization::UnitRange.apply(pixels.view())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn write_rgb(dir: &Path, name: &str, color: [u8; 3], size: (u32, u32)) -> std::path::PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(size.0, size.1, Rgb(color)).save(&path).unwrap();
        path
    }

    #[test]
    fn test_family_normalization_selection() {
        assert_eq!(Normalization::for_family(ModelFamily::ResNet), Normalization::Caffe);
        assert_eq!(Normalization::for_family(ModelFamily::EfficientNet), Normalization::Identity);
        assert_eq!(Normalization::for_family(ModelFamily::MobileNet), Normalization::SymmetricRange);
        assert_eq!(Normalization::for_family(ModelFamily::Generic), Normalization::SymmetricRange);
    }

    #[test]
    fn test_unknown_family_rescales_to_symmetric_range() {
        let pixels = Array3::from_shape_vec((1, 2, 3), vec![0.0, 127.5, 255.0, 255.0, 0.0, 51.0]).unwrap();
        let normalized = Normalization::for_family(ModelFamily::from_tag("vgg")).apply(pixels.view());

        assert!((normalized[[0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!(normalized[[0, 0, 1]].abs() < 1e-6);
        assert!((normalized[[0, 0, 2]] - 1.0).abs() < 1e-6);
        assert!((normalized[[0, 1, 2]] + 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_caffe_swaps_channels_and_centers() {
        let pixels = Array3::from_shape_vec((1, 1, 3), vec![200.0, 100.0, 50.0]).unwrap();
        let normalized = Normalization::Caffe.apply(pixels.view());

        assert!((normalized[[0, 0, 0]] - (50.0 - 103.939)).abs() < 1e-4);
        assert!((normalized[[0, 0, 1]] - (100.0 - 116.779)).abs() < 1e-4);
        assert!((normalized[[0, 0, 2]] - (200.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_basic_shape_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rgb(dir.path(), "leaf.png", [255, 0, 51], (40, 30));

        let preprocessor = ImagePreprocessor::new((16, 8), ModelFamily::ResNet);
        let tensor = preprocessor.preprocess_basic(&path).unwrap();

        assert_eq!(tensor.dim(), (1, 8, 16, 3));
        assert!((tensor[[0, 3, 5, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 3, 5, 1]].abs() < 1e-6);
        assert!((tensor[[0, 3, 5, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_grayscale_is_forced_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        GrayImage::from_pixel(10, 10, Luma([128])).save(&path).unwrap();

        let preprocessor = ImagePreprocessor::new((10, 10), ModelFamily::EfficientNet);
        let tensor = preprocessor.preprocess(&path).unwrap();

        assert_eq!(tensor.dim(), (1, 10, 10, 3));
        assert!(tensor.iter().all(|&v| (v - 128.0).abs() < 1e-3));
    }

    #[test]
    fn test_format_sniffed_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let png = write_rgb(dir.path(), "leaf.png", [10, 20, 30], (8, 8));
        let renamed = dir.path().join("leaf.jpg");
        std::fs::rename(&png, &renamed).unwrap();

        let preprocessor = ImagePreprocessor::new((8, 8), ModelFamily::MobileNet);
        assert!(preprocessor.load_pixels(&renamed).is_ok());
    }

    #[test]
    fn test_undecodable_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let preprocessor = ImagePreprocessor::new((8, 8), ModelFamily::ResNet);
        let err = preprocessor.preprocess(&path).unwrap_err();
        assert!(matches!(err, ClassifierError::Decode { .. }));

        let err = preprocessor.preprocess(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, ClassifierError::Decode { .. }));
    }
}
