//! COCO document -> Label Studio pre-annotation tasks.

use std::collections::HashMap;

use tracing::info;

use crate::error::{Error, Result};
use crate::task::{
    NumberValue, PolygonValue, Prediction, RectangleValue, Region, RegionValue, Task, TaskData,
};
use crate::types::{Annotation, Dataset, Image, Segmentation};

/// Labeling-config control names the emitted regions bind to.
pub const IMAGE_NAME: &str = "image";
pub const POLYGON_NAME: &str = "mask";
pub const RECTANGLE_NAME: &str = "label";
pub const SCORE_NAME: &str = "score";

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Emit a rectangle region for every annotation, alongside any polygons.
    pub include_boxes: bool,
    /// Emit polygon regions for polygon geometry. Annotations left without a
    /// region fall back to a rectangle.
    pub include_polygons: bool,
    pub model_version: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            include_boxes: false,
            include_polygons: true,
            model_version: "ls-export".into(),
        }
    }
}

/// Image id -> `{base_url}/{file_name}` for every image in the document.
pub fn image_urls(dataset: &Dataset, base_url: &str) -> HashMap<u64, String> {
    let base = base_url.trim_end_matches('/');
    dataset
        .images
        .iter()
        .map(|img| (img.id, format!("{base}/{}", img.file_name)))
        .collect()
}

/// Convert a finished COCO document into one task per image.
///
/// Tasks follow image order; predictions within a task follow ascending
/// annotation id. The whole document is checked before any task is built, so
/// an inconsistent document yields an error and no tasks.
pub fn convert(
    dataset: &Dataset,
    urls: &HashMap<u64, String>,
    options: &ConvertOptions,
) -> Result<Vec<Task>> {
    let categories: HashMap<u64, &str> = dataset
        .categories
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();
    let images: HashMap<u64, &Image> = dataset.images.iter().map(|img| (img.id, img)).collect();

    for img in &dataset.images {
        if img.width == 0 || img.height == 0 {
            return Err(Error::Data(format!(
                "image {} ({}) has zero size {}x{}",
                img.id, img.file_name, img.width, img.height
            )));
        }
        if !urls.contains_key(&img.id) {
            return Err(Error::Data(format!(
                "no URL for image {} ({})",
                img.id, img.file_name
            )));
        }
    }

    let mut by_image: HashMap<u64, Vec<&Annotation>> = HashMap::new();
    for ann in &dataset.annotations {
        if !images.contains_key(&ann.image_id) {
            return Err(Error::Data(format!(
                "annotation {} references missing image {}",
                ann.id, ann.image_id
            )));
        }
        if !categories.contains_key(&ann.category_id) {
            return Err(Error::Data(format!(
                "annotation {} references missing category {}",
                ann.id, ann.category_id
            )));
        }
        if let Some(Segmentation::Polygon(polys)) = &ann.segmentation {
            check_rings(ann.id, polys)?;
        }
        by_image.entry(ann.image_id).or_default().push(ann);
    }

    let mut tasks = Vec::with_capacity(dataset.images.len());
    let mut regions = 0usize;
    for img in &dataset.images {
        let mut anns = by_image.remove(&img.id).unwrap_or_default();
        anns.sort_by_key(|ann| ann.id);

        let predictions: Vec<Prediction> = anns
            .into_iter()
            .map(|ann| {
                let label = categories[&ann.category_id];
                let result = annotation_regions(ann, img, label, options);
                regions += result.len();
                Prediction {
                    model_version: options.model_version.clone(),
                    score: ann.score.unwrap_or(1.0),
                    result,
                }
            })
            .collect();

        tasks.push(Task {
            data: TaskData {
                image: urls[&img.id].clone(),
            },
            predictions,
        });
    }

    info!(tasks = tasks.len(), regions, "converted COCO document to tasks");
    Ok(tasks)
}

/// Every ring needs at least three `x, y` pairs of finite coordinates.
fn check_rings(ann_id: u64, polys: &[Vec<f64>]) -> Result<()> {
    for (k, ring) in polys.iter().enumerate() {
        if ring.len() < 6 || ring.len() % 2 != 0 || ring.iter().any(|v| !v.is_finite()) {
            return Err(Error::Data(format!(
                "annotation {ann_id} polygon {k} has a malformed ring of {} coordinates",
                ring.len()
            )));
        }
    }
    Ok(())
}

fn percent(value: f64, extent: u32) -> f64 {
    value / extent as f64 * 100.0
}

fn annotation_regions(
    ann: &Annotation,
    img: &Image,
    label: &str,
    options: &ConvertOptions,
) -> Vec<Region> {
    let mut shapes = Vec::new();

    if options.include_polygons {
        match &ann.segmentation {
            Some(Segmentation::Polygon(polys)) => {
                for poly in polys {
                    let points: Vec<[f64; 2]> = poly
                        .chunks_exact(2)
                        .map(|xy| [percent(xy[0], img.width), percent(xy[1], img.height)])
                        .collect();
                    shapes.push(RegionValue::Polygon(PolygonValue {
                        points,
                        polygonlabels: vec![label.to_string()],
                    }));
                }
            }
            // No polygon form; the box below stands in for RLE masks.
            Some(Segmentation::UncompressedRle { .. } | Segmentation::CompressedRle { .. }) | None => {}
        }
    }

    if options.include_boxes || shapes.is_empty() {
        let [x, y, w, h] = ann.bbox;
        shapes.insert(
            0,
            RegionValue::Rectangle(RectangleValue {
                x: percent(x, img.width),
                y: percent(y, img.height),
                width: percent(w, img.width),
                height: percent(h, img.height),
                rotation: 0.0,
                rectanglelabels: vec![label.to_string()],
            }),
        );
    }

    let score = ann.score.unwrap_or(1.0);
    let mut regions = Vec::with_capacity(shapes.len() * 2);
    for (k, value) in shapes.into_iter().enumerate() {
        let id = format!("{}-{k}", ann.id);
        let from_name = match value {
            RegionValue::Rectangle(_) => RECTANGLE_NAME,
            _ => POLYGON_NAME,
        };
        regions.push(Region {
            id: Some(id.clone()),
            from_name: from_name.into(),
            to_name: IMAGE_NAME.into(),
            original_width: Some(img.width),
            original_height: Some(img.height),
            value,
            score: Some(score),
        });
        regions.push(Region {
            id: Some(id),
            from_name: SCORE_NAME.into(),
            to_name: IMAGE_NAME.into(),
            original_width: None,
            original_height: None,
            value: RegionValue::Number(NumberValue {
                number: (score * 1000.0).round() / 1000.0,
            }),
            score: None,
        });
    }
    regions
}
