use std::path::PathBuf;

use serde::Deserialize;

use crate::mask::Mask;

/// All detections produced for one source image.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageDetections {
    /// Source image path; identity of the image record within one export.
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// One detected instance.
#[derive(Debug, Clone, Deserialize)]
pub struct Detection {
    pub label: String,
    pub score: f64,
    #[serde(rename = "box")]
    pub bbox: RawBox,
    #[serde(default)]
    pub mask: Option<Mask>,
}

/// Box as emitted by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawBox {
    /// Two opposite corners, in any order.
    Corners { x1: f64, y1: f64, x2: f64, y2: f64 },
    /// Center point and size.
    CenterSize { cx: f64, cy: f64, w: f64, h: f64 },
}

impl RawBox {
    /// Top-left-origin `[x, y, width, height]`.
    pub fn to_xywh(&self) -> [f64; 4] {
        match *self {
            RawBox::Corners { x1, y1, x2, y2 } => {
                [x1.min(x2), y1.min(y2), (x2 - x1).abs(), (y2 - y1).abs()]
            }
            RawBox::CenterSize { cx, cy, w, h } => {
                let (w, h) = (w.abs(), h.abs());
                [cx - w / 2.0, cy - h / 2.0, w, h]
            }
        }
    }
}

impl From<[f64; 4]> for RawBox {
    /// `[x1, y1, x2, y2]`, the layout of `boxes.xyxy`.
    fn from(xyxy: [f64; 4]) -> Self {
        RawBox::Corners {
            x1: xyxy[0],
            y1: xyxy[1],
            x2: xyxy[2],
            y2: xyxy[3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_normalized() {
        let b = RawBox::from([110.0, 120.0, 10.0, 20.0]);
        assert_eq!(b.to_xywh(), [10.0, 20.0, 100.0, 100.0]);
    }

    #[test]
    fn test_center_size() {
        let b = RawBox::CenterSize {
            cx: 60.0,
            cy: 35.0,
            w: 100.0,
            h: 50.0,
        };
        assert_eq!(b.to_xywh(), [10.0, 10.0, 100.0, 50.0]);
    }

    #[test]
    fn test_deserialize_detection_file() {
        let json = r#"[{
            "path": "/data/img001.jpg", "width": 4, "height": 2,
            "detections": [
                {"label": "cat", "score": 0.9, "box": {"x1": 0, "y1": 0, "x2": 2, "y2": 1}},
                {"label": "dog", "score": 0.4, "box": {"cx": 2, "cy": 1, "w": 2, "h": 2},
                 "mask": {"width": 4, "height": 2, "data": [0,0,1,1,0,0,1,1]}}
            ]
        }]"#;
        let parsed: Vec<ImageDetections> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 1);
        let dets = &parsed[0].detections;
        assert!(matches!(dets[0].bbox, RawBox::Corners { .. }));
        assert!(matches!(dets[1].bbox, RawBox::CenterSize { .. }));
        assert_eq!(dets[1].mask.as_ref().map(Mask::count), Some(4));
    }
}
