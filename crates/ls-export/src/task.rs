//! Label Studio task import schema (pre-annotations).

use serde::{Deserialize, Serialize};

/// One review task per image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub data: TaskData,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    /// Externally reachable image URL.
    pub image: String,
}

/// Machine-generated candidate a reviewer accepts, edits, or rejects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model_version: String,
    pub score: f64,
    pub result: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from_name: String,
    pub to_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_height: Option<u32>,
    #[serde(flatten)]
    pub value: RegionValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Region payload, serialized as `"type": ..., "value": {...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RegionValue {
    #[serde(rename = "rectanglelabels")]
    Rectangle(RectangleValue),
    #[serde(rename = "polygonlabels")]
    Polygon(PolygonValue),
    #[serde(rename = "number")]
    Number(NumberValue),
}

/// Percent-of-image rectangle, top-left origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleValue {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub rectanglelabels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonValue {
    /// `[x, y]` pairs in percent of image width/height.
    pub points: Vec<[f64; 2]>,
    pub polygonlabels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberValue {
    pub number: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_region_wire_layout() {
        let region = Region {
            id: Some("1-0".into()),
            from_name: "mask".into(),
            to_name: "image".into(),
            original_width: Some(800),
            original_height: Some(600),
            value: RegionValue::Polygon(PolygonValue {
                points: vec![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
                polygonlabels: vec!["dog".into()],
            }),
            score: Some(0.4),
        };
        let value = serde_json::to_value(&region).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "1-0",
                "from_name": "mask",
                "to_name": "image",
                "original_width": 800,
                "original_height": 600,
                "type": "polygonlabels",
                "value": {
                    "points": [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
                    "polygonlabels": ["dog"]
                },
                "score": 0.4
            })
        );
        let back: Region = serde_json::from_value(value).unwrap();
        assert_eq!(back, region);
    }
}
