//! Structural conformance checks for COCO documents.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::mask;
use crate::types::{Annotation, Dataset, Image, Rle, Segmentation};

/// Check that a document is loadable as COCO: unique ids, resolvable
/// references, well-formed boxes and geometry, scores in `[0, 1]`.
///
/// Every problem found is reported, not just the first.
pub fn validate_dataset(dataset: &Dataset) -> Result<()> {
    let mut problems = Vec::new();

    let mut images: HashMap<u64, &Image> = HashMap::new();
    for img in &dataset.images {
        if images.insert(img.id, img).is_some() {
            problems.push(format!("duplicate image id {}", img.id));
        }
        if img.width == 0 || img.height == 0 {
            problems.push(format!(
                "image {} has zero size {}x{}",
                img.id, img.width, img.height
            ));
        }
    }

    let mut categories = HashSet::new();
    for cat in &dataset.categories {
        if !categories.insert(cat.id) {
            problems.push(format!("duplicate category id {}", cat.id));
        }
    }

    let mut ann_ids = HashSet::new();
    for ann in &dataset.annotations {
        if !ann_ids.insert(ann.id) {
            problems.push(format!("duplicate annotation id {}", ann.id));
        }
        if !categories.contains(&ann.category_id) {
            problems.push(format!(
                "annotation {} references missing category {}",
                ann.id, ann.category_id
            ));
        }
        let image = images.get(&ann.image_id).copied();
        if image.is_none() {
            problems.push(format!(
                "annotation {} references missing image {}",
                ann.id, ann.image_id
            ));
        }
        check_annotation(ann, image, &mut problems);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(problems))
    }
}

fn check_annotation(ann: &Annotation, image: Option<&Image>, problems: &mut Vec<String>) {
    let [_, _, w, h] = ann.bbox;
    if ann.bbox.iter().any(|v| !v.is_finite()) || w < 0.0 || h < 0.0 {
        problems.push(format!("annotation {} has malformed bbox {:?}", ann.id, ann.bbox));
    }
    if !ann.area.is_finite() || ann.area < 0.0 {
        problems.push(format!("annotation {} has invalid area {}", ann.id, ann.area));
    }
    if let Some(score) = ann.score {
        if !(0.0..=1.0).contains(&score) {
            problems.push(format!(
                "annotation {} has score {} outside [0, 1]",
                ann.id, score
            ));
        }
    }

    match &ann.segmentation {
        None => {}
        Some(Segmentation::Polygon(polys)) => {
            for poly in polys {
                if poly.len() < 6 || poly.len() % 2 != 0 || poly.iter().any(|v| !v.is_finite()) {
                    problems.push(format!(
                        "annotation {} has a malformed polygon of {} coordinates",
                        ann.id,
                        poly.len()
                    ));
                }
            }
        }
        Some(Segmentation::UncompressedRle { size, counts }) => {
            let rle = Rle {
                h: size[0],
                w: size[1],
                counts: counts.clone(),
            };
            check_rle(ann, &rle, image, problems);
        }
        Some(Segmentation::CompressedRle { size, counts }) => {
            match mask::rle_from_string(counts, size[0], size[1]) {
                Ok(rle) => check_rle(ann, &rle, image, problems),
                Err(e) => problems.push(format!("annotation {}: {e}", ann.id)),
            }
        }
    }
}

fn check_rle(ann: &Annotation, rle: &Rle, image: Option<&Image>, problems: &mut Vec<String>) {
    let total: u64 = rle.counts.iter().map(|&c| c as u64).sum();
    if total != rle.h as u64 * rle.w as u64 {
        problems.push(format!(
            "annotation {} RLE counts sum to {total}, expected {}x{}",
            ann.id, rle.h, rle.w
        ));
    }
    if let Some(img) = image {
        if (rle.h, rle.w) != (img.height, img.width) {
            problems.push(format!(
                "annotation {} RLE size [{}, {}] does not match image {} ({}x{})",
                ann.id, rle.h, rle.w, img.id, img.width, img.height
            ));
        }
    }
    if !ann.iscrowd && mask::area(rle) as f64 != ann.area {
        problems.push(format!(
            "annotation {} area {} differs from its RLE pixel count {}",
            ann.id,
            ann.area,
            mask::area(rle)
        ));
    }
}
