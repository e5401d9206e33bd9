use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::shared::rect::Rect;

/// Detections for one image as written across process boundaries:
/// `{ "image_path": ..., "detections": [{"x", "y", "width", "height"}, ...] }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub image_path: String,
    pub detections: Vec<Rect>,
}

impl DetectionReport {
    pub fn new(image_path: &Path, detections: &[Rect]) -> Self {
        Self {
            image_path: image_path.to_string_lossy().into_owned(),
            detections: detections.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_to_boundary_encoding() {
        let report = DetectionReport::new(
            Path::new("photos/a.jpg"),
            &[Rect::new(1, 2, 30, 40)],
        );
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "image_path": "photos/a.jpg",
                "detections": [{"x": 1, "y": 2, "width": 30, "height": 40}]
            })
        );
    }

    #[test]
    fn test_empty_detections_serialize_as_empty_array() {
        let report = DetectionReport::new(Path::new("b.png"), &[]);
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"image_path":"b.png","detections":[]}"#
        );
    }
}
