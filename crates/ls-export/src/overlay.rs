//! Debug overlays: source images with exported boxes and masks drawn on top.
//!
//! Purely a side effect for manual inspection. Failures are logged and the
//! image is skipped; the exported document is never touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_polygon_mut, draw_hollow_rect_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mask;
use crate::types::{Annotation, Dataset, Image, Rle, Segmentation};

const PALETTE: [Rgb<u8>; 10] = [
    Rgb([0, 255, 0]),
    Rgb([30, 144, 255]),
    Rgb([255, 0, 0]),
    Rgb([255, 165, 0]),
    Rgb([160, 32, 240]),
    Rgb([0, 255, 255]),
    Rgb([255, 0, 255]),
    Rgb([255, 255, 0]),
    Rgb([165, 42, 42]),
    Rgb([255, 192, 203]),
];

/// `out/coco.json` -> `out/coco_debug/`
pub fn debug_dir(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".into());
    destination.with_file_name(format!("{stem}_debug"))
}

/// Render one overlay per image whose source path is known. Returns how many were written.
pub fn render_all(dataset: &Dataset, sources: &HashMap<u64, PathBuf>, out_dir: &Path) -> usize {
    let mut by_image: HashMap<u64, Vec<&Annotation>> = HashMap::new();
    for ann in &dataset.annotations {
        by_image.entry(ann.image_id).or_default().push(ann);
    }

    let mut rendered = 0;
    for img in &dataset.images {
        let Some(source) = sources.get(&img.id) else {
            continue;
        };
        let anns = by_image.get(&img.id).map(Vec::as_slice).unwrap_or(&[]);
        match render_image(img, source, anns, out_dir) {
            Ok(path) => {
                debug!(path = %path.display(), "wrote overlay");
                rendered += 1;
            }
            Err(e) => warn!(source = %source.display(), error = %e, "skipping debug overlay"),
        }
    }
    rendered
}

fn render_image(img: &Image, source: &Path, anns: &[&Annotation], out_dir: &Path) -> Result<PathBuf> {
    let mut canvas = image::open(source)?.to_rgb8();
    for ann in anns {
        let color = PALETTE[(ann.category_id.saturating_sub(1) as usize) % PALETTE.len()];
        draw_annotation(&mut canvas, ann, color);
    }

    std::fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
    let stem = Path::new(&img.file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| img.id.to_string());
    let path = out_dir.join(format!("{}_{stem}.png", img.id));
    canvas.save(&path)?;
    Ok(path)
}

fn draw_annotation(canvas: &mut RgbImage, ann: &Annotation, color: Rgb<u8>) {
    let [x, y, w, h] = ann.bbox;
    let rect = Rect::at(x.round() as i32, y.round() as i32)
        .of_size((w.round() as u32).max(1), (h.round() as u32).max(1));
    draw_hollow_rect_mut(canvas, rect, color);

    match &ann.segmentation {
        None => {}
        Some(Segmentation::Polygon(polys)) => {
            for poly in polys {
                let points: Vec<Point<f32>> = poly
                    .chunks_exact(2)
                    .map(|xy| Point::new(xy[0] as f32, xy[1] as f32))
                    .collect();
                if points.len() >= 3 {
                    draw_hollow_polygon_mut(canvas, &points, color);
                }
            }
        }
        Some(Segmentation::UncompressedRle { size, counts }) => {
            let rle = Rle {
                h: size[0],
                w: size[1],
                counts: counts.clone(),
            };
            tint(canvas, &rle, color);
        }
        Some(Segmentation::CompressedRle { size, counts }) => {
            if let Ok(rle) = mask::rle_from_string(counts, size[0], size[1]) {
                tint(canvas, &rle, color);
            }
        }
    }
}

/// Blend `color` into every masked pixel at 50%.
fn tint(canvas: &mut RgbImage, rle: &Rle, color: Rgb<u8>) {
    let col_major = mask::decode(rle);
    let h = rle.h as usize;
    for (i, _) in col_major.iter().enumerate().filter(|(_, v)| **v != 0) {
        let (x, y) = ((i / h) as u32, (i % h) as u32);
        if x < canvas.width() && y < canvas.height() {
            let px = canvas.get_pixel_mut(x, y);
            for c in 0..3 {
                px.0[c] = ((px.0[c] as u16 + color.0[c] as u16) / 2) as u8;
            }
        }
    }
}
