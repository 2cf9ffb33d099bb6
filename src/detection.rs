use serde::Deserialize;

use crate::geometry::BoundingBox;

pub const PERSON_CLASS: &str = "person";

/// `bbox` is `None` when the detector sent no usable box; such detections keep
/// their index in the frame but are never tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox: Some(bbox),
        }
    }

    pub fn is_class(&self, class_name: &str) -> bool {
        self.class_name.trim().eq_ignore_ascii_case(class_name.trim())
    }
}

/// Detector output as it arrives on the wire; every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub bbox: Option<Vec<f32>>,
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        let confidence = raw
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        Self {
            class_name: raw.class_name.unwrap_or_default().trim().to_string(),
            confidence,
            bbox: raw.bbox.as_deref().and_then(BoundingBox::from_slice),
        }
    }
}
