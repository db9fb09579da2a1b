use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Top-level COCO document, fields in canonical order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dataset {
    #[serde(default)]
    pub info: Option<Info>,
    #[serde(default)]
    pub licenses: Vec<License>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Info {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub file_name: String,
    /// Missing dimensions read as 0 so the converter can reject them as a data error.
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// `[x, y, width, height]`, top-left origin, pixel units.
    pub bbox: [f64; 4],
    #[serde(default)]
    pub area: f64,
    #[serde(
        default,
        serialize_with = "serialize_segmentation",
        deserialize_with = "deserialize_segmentation"
    )]
    pub segmentation: Option<Segmentation>,
    #[serde(
        default,
        serialize_with = "serialize_iscrowd",
        deserialize_with = "deserialize_iscrowd"
    )]
    pub iscrowd: bool,
    /// Detection confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

fn serialize_iscrowd<S>(iscrowd: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(u8::from(*iscrowd))
}

fn deserialize_iscrowd<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IsCrowd {
        Bool(bool),
        Int(u8),
    }
    match IsCrowd::deserialize(deserializer)? {
        IsCrowd::Bool(b) => Ok(b),
        IsCrowd::Int(i) => Ok(i != 0),
    }
}

// Box-only annotations carry `"segmentation": []` in COCO files.
fn serialize_segmentation<S>(seg: &Option<Segmentation>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match seg {
        Some(seg) => seg.serialize(serializer),
        None => serializer.collect_seq(std::iter::empty::<Vec<f64>>()),
    }
}

fn deserialize_segmentation<'de, D>(deserializer: D) -> Result<Option<Segmentation>, D::Error>
where
    D: Deserializer<'de>,
{
    let seg = Option::<Segmentation>::deserialize(deserializer)?;
    Ok(seg.filter(|s| !matches!(s, Segmentation::Polygon(polys) if polys.is_empty())))
}

/// Per-instance mask geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// Polygon format: list of polygons, each a flat list of [x, y, x, y, ...] coordinates.
    Polygon(Vec<Vec<f64>>),
    /// Compressed RLE format (COCO string counts).
    CompressedRle { size: [u32; 2], counts: String },
    /// Uncompressed RLE format.
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
}

impl From<Rle> for Segmentation {
    fn from(rle: Rle) -> Self {
        Segmentation::UncompressedRle {
            size: [rle.h, rle.w],
            counts: rle.counts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct License {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Run-length encoding for masks.
#[derive(Debug, Clone, PartialEq)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    /// Run counts: alternating runs of 0s and 1s, starting with 0s.
    pub counts: Vec<u32>,
}
