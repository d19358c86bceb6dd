//! Model family and metadata types

use serde::{Deserialize, Serialize};

/// Architecture lineage of a pretrained backbone.
///
/// Determines the input normalization the network was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    ResNet,
    EfficientNet,
    MobileNet,
    Generic,
}

impl ModelFamily {
    /// Resolve a family from a free-form tag such as `"ResNet50"` or `"MobileNetV2"`.
    ///
    /// Matching is a case-insensitive substring test; anything unrecognized is `Generic`.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.to_lowercase();
        if tag.contains("resnet") {
            ModelFamily::ResNet
        } else if tag.contains("efficientnet") {
            ModelFamily::EfficientNet
        } else if tag.contains("mobilenet") {
            ModelFamily::MobileNet
        } else {
            ModelFamily::Generic
        }
    }
}

/// Memory layout of the model's image input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`, the Keras export default
    #[default]
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

/// Descriptive information about a loaded classifier
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub family: ModelFamily,
    pub input_shape: Vec<i64>,
    pub output_shape: Vec<i64>,
    pub classes: Vec<String>,
    pub num_classes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_tag() {
        assert_eq!(ModelFamily::from_tag("ResNet50"), ModelFamily::ResNet);
        assert_eq!(ModelFamily::from_tag("EfficientNetB0"), ModelFamily::EfficientNet);
        assert_eq!(ModelFamily::from_tag("mobilenet_v2"), ModelFamily::MobileNet);
        assert_eq!(ModelFamily::from_tag("VGG16"), ModelFamily::Generic);
        assert_eq!(ModelFamily::from_tag(""), ModelFamily::Generic);
    }

    #[test]
    fn test_layout_deserialize() {
        let layout: TensorLayout = serde_json::from_str("\"nchw\"").unwrap();
        assert_eq!(layout, TensorLayout::Nchw);
        assert_eq!(TensorLayout::default(), TensorLayout::Nhwc);
    }
}
