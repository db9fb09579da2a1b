//! Detector output -> COCO document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::detection::{Detection, ImageDetections};
use crate::document::{to_json_bytes, write_atomic};
use crate::error::{Error, Result};
use crate::geometry::GeometryEncoder;
use crate::overlay;
use crate::types::{Annotation, Category, Dataset, Image, Info};
use crate::validate::validate_dataset;

/// Options controlling a single export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Encode mask geometry; when false only boxes are written and masks are never read.
    pub include_masks: bool,
    /// Re-parse and check the serialized document before it is written.
    pub validate: bool,
    /// Render a box/polygon overlay PNG per image next to the destination.
    pub debug: bool,
    /// Pretty-print width; `None` writes compact JSON.
    pub indent: Option<usize>,
    /// Skip detections whose encoded area is zero.
    pub drop_empty: bool,
    /// Contour simplification tolerance in pixels.
    pub polygon_tolerance: f64,
    pub info: Info,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_masks: true,
            validate: false,
            debug: false,
            indent: Some(4),
            drop_empty: false,
            polygon_tolerance: GeometryEncoder::default().polygon_tolerance,
            info: Info {
                description: Some("Detector output exported for review".into()),
                version: Some("1.0".into()),
                ..Default::default()
            },
        }
    }
}

/// Counts reported after a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub images: usize,
    pub categories: usize,
    pub annotations: usize,
}

/// Builds COCO documents from detector output.
///
/// Identifiers restart at 1 on every call, so the same input always yields
/// the same document.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    pub options: ExportOptions,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    /// Pure transform, no file I/O.
    pub fn build(&self, results: &[ImageDetections]) -> Result<Dataset> {
        self.build_with_sources(results).map(|(dataset, _)| dataset)
    }

    /// Export `results` to `destination`.
    ///
    /// Returns `Ok(None)` without touching the destination when `results` is empty.
    pub fn export(
        &self,
        results: &[ImageDetections],
        destination: impl AsRef<Path>,
    ) -> Result<Option<ExportSummary>> {
        let destination = destination.as_ref();
        if results.is_empty() {
            warn!(path = %destination.display(), "empty detection list, nothing exported");
            return Ok(None);
        }

        let (dataset, sources) = self.build_with_sources(results)?;
        let bytes = to_json_bytes(&dataset, self.options.indent)?;

        if self.options.validate {
            let reparsed: Dataset = serde_json::from_slice(&bytes)
                .map_err(|e| Error::Validation(vec![format!("document does not parse: {e}")]))?;
            validate_dataset(&reparsed)?;
            debug!("COCO document passed validation");
        }

        write_atomic(destination, &bytes)?;

        let summary = ExportSummary {
            path: destination.to_path_buf(),
            images: dataset.images.len(),
            categories: dataset.categories.len(),
            annotations: dataset.annotations.len(),
        };
        info!(
            path = %summary.path.display(),
            images = summary.images,
            categories = summary.categories,
            annotations = summary.annotations,
            "exported COCO annotations"
        );

        if self.options.debug {
            let dir = overlay::debug_dir(destination);
            let rendered = overlay::render_all(&dataset, &sources, &dir);
            info!(dir = %dir.display(), rendered, "wrote debug overlays");
        }

        Ok(Some(summary))
    }

    pub(crate) fn build_with_sources(
        &self,
        results: &[ImageDetections],
    ) -> Result<(Dataset, HashMap<u64, PathBuf>)> {
        let encoder = GeometryEncoder {
            include_masks: self.options.include_masks,
            polygon_tolerance: self.options.polygon_tolerance,
        };
        let mut doc = DocumentBuilder::default();

        for result in results {
            let image_id = doc.image(result);
            let mut kept = 0usize;
            for (index, detection) in result.detections.iter().enumerate() {
                check_detection(result, index, detection, self.options.include_masks)?;

                let geometry = encoder.encode(&detection.bbox, detection.mask.as_ref());
                if self.options.drop_empty && geometry.area == 0.0 {
                    debug!(image_id, index, label = %detection.label, "dropping zero-area detection");
                    continue;
                }

                let category_id = doc.category(&detection.label);
                doc.annotation(Annotation {
                    id: 0,
                    image_id,
                    category_id,
                    bbox: geometry.bbox,
                    area: geometry.area,
                    segmentation: geometry.segmentation,
                    iscrowd: false,
                    score: Some(detection.score),
                });
                kept += 1;
            }
            debug!(image_id, path = %result.path.display(), annotations = kept, "encoded image");
        }

        Ok(doc.finish(self.options.info.clone()))
    }
}

fn check_detection(
    result: &ImageDetections,
    index: usize,
    detection: &Detection,
    include_masks: bool,
) -> Result<()> {
    if !(0.0..=1.0).contains(&detection.score) {
        return Err(Error::Config(format!(
            "{} detection {index} ({}): score {} outside [0, 1]",
            result.path.display(),
            detection.label,
            detection.score
        )));
    }
    if let Some(mask) = detection.mask.as_ref().filter(|_| include_masks) {
        if (mask.width(), mask.height()) != (result.width, result.height) {
            return Err(Error::Config(format!(
                "{} detection {index} ({}): mask is {}x{}, image is {}x{}",
                result.path.display(),
                detection.label,
                mask.width(),
                mask.height(),
                result.width,
                result.height
            )));
        }
    }
    Ok(())
}

/// Per-call identifier allocation. Images are keyed by source path, categories
/// by label; both are numbered from 1 in first-seen order, annotations globally.
#[derive(Default)]
struct DocumentBuilder {
    images: Vec<Image>,
    image_ids: HashMap<PathBuf, u64>,
    sources: HashMap<u64, PathBuf>,
    categories: Vec<Category>,
    category_ids: HashMap<String, u64>,
    annotations: Vec<Annotation>,
}

impl DocumentBuilder {
    fn image(&mut self, result: &ImageDetections) -> u64 {
        if let Some(&id) = self.image_ids.get(&result.path) {
            return id;
        }
        let id = self.images.len() as u64 + 1;
        let file_name = result
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| result.path.to_string_lossy().into_owned());
        self.images.push(Image {
            id,
            file_name,
            width: result.width,
            height: result.height,
        });
        self.image_ids.insert(result.path.clone(), id);
        self.sources.insert(id, result.path.clone());
        id
    }

    fn category(&mut self, label: &str) -> u64 {
        if let Some(&id) = self.category_ids.get(label) {
            return id;
        }
        let id = self.categories.len() as u64 + 1;
        self.categories.push(Category {
            id,
            name: label.to_string(),
            supercategory: Some("none".into()),
        });
        self.category_ids.insert(label.to_string(), id);
        id
    }

    fn annotation(&mut self, mut ann: Annotation) {
        ann.id = self.annotations.len() as u64 + 1;
        self.annotations.push(ann);
    }

    fn finish(self, info: Info) -> (Dataset, HashMap<u64, PathBuf>) {
        let dataset = Dataset {
            info: Some(info),
            licenses: vec![],
            images: self.images,
            annotations: self.annotations,
            categories: self.categories,
        };
        (dataset, self.sources)
    }
}
