//! Per-detection geometry: boxes, outer contours, and the RLE fallback.

use std::collections::HashSet;

use geo::{Area, Coord, LineString, Polygon, Simplify};
use imageproc::contours::{find_contours, BorderType};
use tracing::debug;

use crate::detection::RawBox;
use crate::mask::Mask;
use crate::types::Segmentation;

/// COCO geometry for one annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedGeometry {
    /// `[x, y, width, height]`, top-left origin.
    pub bbox: [f64; 4],
    /// Occupied-pixel count when a mask was encoded, otherwise box area.
    pub area: f64,
    pub segmentation: Option<Segmentation>,
}

#[derive(Debug, Clone)]
pub struct GeometryEncoder {
    /// When false, masks are ignored entirely and only boxes are encoded.
    pub include_masks: bool,
    /// Douglas-Peucker tolerance in pixels applied to traced contours; `0` keeps every boundary pixel.
    pub polygon_tolerance: f64,
}

impl Default for GeometryEncoder {
    fn default() -> Self {
        Self {
            include_masks: true,
            polygon_tolerance: 0.5,
        }
    }
}

impl GeometryEncoder {
    pub fn encode(&self, raw: &RawBox, mask: Option<&Mask>) -> EncodedGeometry {
        let mask = match mask {
            Some(mask) if self.include_masks => mask,
            _ => {
                let bbox = raw.to_xywh();
                return EncodedGeometry {
                    bbox,
                    area: bbox[2] * bbox[3],
                    segmentation: None,
                };
            }
        };

        let bbox = match mask.extent() {
            Some((x0, y0, x1, y1)) => [
                x0 as f64,
                y0 as f64,
                (x1 - x0 + 1) as f64,
                (y1 - y0 + 1) as f64,
            ],
            None => raw.to_xywh(),
        };

        let polygons = outer_polygons(mask, self.polygon_tolerance);
        let segmentation = if polygons.is_empty() {
            debug!(
                occupied = mask.count(),
                "no usable contour in mask, falling back to RLE"
            );
            Segmentation::from(mask.to_rle())
        } else {
            Segmentation::Polygon(polygons)
        };

        EncodedGeometry {
            bbox,
            area: mask.count() as f64,
            segmentation: Some(segmentation),
        }
    }
}

/// Trace the outer borders of a mask as flat `[x0, y0, x1, y1, ...]` rings.
///
/// Rings with fewer than three distinct vertices or zero enclosed area are dropped.
pub fn outer_polygons(mask: &Mask, tolerance: f64) -> Vec<Vec<f64>> {
    if mask.width() == 0 || mask.height() == 0 {
        return Vec::new();
    }

    find_contours::<i32>(&mask.to_gray_image())
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .filter_map(|contour| {
            let coords: Vec<Coord<f64>> = contour
                .points
                .iter()
                .map(|p| Coord {
                    x: p.x as f64,
                    y: p.y as f64,
                })
                .collect();
            let mut polygon = Polygon::new(LineString::new(coords), vec![]);
            if tolerance > 0.0 {
                polygon = polygon.simplify(&tolerance);
            }
            if polygon.unsigned_area() <= 0.0 {
                return None;
            }

            // The exterior ring is closed; COCO rings are implicitly closed.
            let ring = polygon.exterior();
            let n = ring.0.len().saturating_sub(1);
            let vertices = &ring.0[..n];
            let distinct: HashSet<(u64, u64)> = vertices
                .iter()
                .map(|c| (c.x.to_bits(), c.y.to_bits()))
                .collect();
            if distinct.len() < 3 {
                return None;
            }

            Some(vertices.iter().flat_map(|c| [c.x, c.y]).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask;

    fn raw() -> RawBox {
        RawBox::from([1.0, 2.0, 5.0, 8.0])
    }

    #[test]
    fn test_box_only() {
        let encoded = GeometryEncoder::default().encode(&raw(), None);
        assert_eq!(encoded.bbox, [1.0, 2.0, 4.0, 6.0]);
        assert_eq!(encoded.area, 24.0);
        assert_eq!(encoded.segmentation, None);
    }

    #[test]
    fn test_masks_disabled_ignores_mask() {
        let mask = Mask::from_fn(20, 20, |x, y| x < 10 && y < 10);
        let encoder = GeometryEncoder {
            include_masks: false,
            ..Default::default()
        };
        let encoded = encoder.encode(&raw(), Some(&mask));
        assert_eq!(encoded.bbox, [1.0, 2.0, 4.0, 6.0]);
        assert_eq!(encoded.area, 24.0);
        assert!(encoded.segmentation.is_none());
    }

    #[test]
    fn test_rectangle_mask_traces_corners() {
        let mask = Mask::from_fn(20, 20, |x, y| (5..15).contains(&x) && (3..9).contains(&y));
        let encoded = GeometryEncoder::default().encode(&raw(), Some(&mask));
        assert_eq!(encoded.bbox, [5.0, 3.0, 10.0, 6.0]);
        assert_eq!(encoded.area, 60.0);

        let Some(Segmentation::Polygon(polys)) = encoded.segmentation else {
            panic!("expected polygon geometry");
        };
        assert_eq!(polys.len(), 1);
        let ring = &polys[0];
        assert_eq!(ring.len(), 8, "four corners expected, got {ring:?}");
        let xs: Vec<f64> = ring.iter().step_by(2).copied().collect();
        let ys: Vec<f64> = ring.iter().skip(1).step_by(2).copied().collect();
        assert_eq!(xs.iter().copied().fold(f64::INFINITY, f64::min), 5.0);
        assert_eq!(xs.iter().copied().fold(f64::NEG_INFINITY, f64::max), 14.0);
        assert_eq!(ys.iter().copied().fold(f64::INFINITY, f64::min), 3.0);
        assert_eq!(ys.iter().copied().fold(f64::NEG_INFINITY, f64::max), 8.0);
    }

    #[test]
    fn test_disjoint_regions_give_one_ring_each() {
        let mask = Mask::from_fn(30, 30, |x, y| {
            ((2..8).contains(&x) && (2..8).contains(&y))
                || ((15..25).contains(&x) && (15..20).contains(&y))
        });
        let encoded = GeometryEncoder::default().encode(&raw(), Some(&mask));
        assert_eq!(encoded.bbox, [2.0, 2.0, 23.0, 18.0]);
        assert_eq!(encoded.area, 86.0);
        assert!(matches!(encoded.segmentation, Some(Segmentation::Polygon(ref p)) if p.len() == 2));
    }

    #[test]
    fn test_hole_is_not_a_ring() {
        let mask = Mask::from_fn(20, 20, |x, y| {
            (2..18).contains(&x) && (2..18).contains(&y) && !((8..12).contains(&x) && (8..12).contains(&y))
        });
        let encoded = GeometryEncoder::default().encode(&raw(), Some(&mask));
        assert!(matches!(encoded.segmentation, Some(Segmentation::Polygon(ref p)) if p.len() == 1));
        assert_eq!(encoded.area, (16 * 16 - 4 * 4) as f64);
    }

    #[test]
    fn test_thin_line_falls_back_to_rle() {
        let mask = Mask::from_fn(10, 10, |x, y| y == 4 && (2..7).contains(&x));
        let encoded = GeometryEncoder::default().encode(&raw(), Some(&mask));
        assert_eq!(encoded.bbox, [2.0, 4.0, 5.0, 1.0]);
        assert_eq!(encoded.area, 5.0);
        let Some(Segmentation::UncompressedRle { size, counts }) = encoded.segmentation else {
            panic!("expected RLE fallback");
        };
        assert_eq!(size, [10, 10]);
        let rle = crate::types::Rle {
            h: size[0],
            w: size[1],
            counts,
        };
        assert_eq!(mask::area(&rle), 5);
    }

    #[test]
    fn test_empty_mask_keeps_raw_box() {
        let mask = Mask::from_fn(10, 10, |_, _| false);
        let encoded = GeometryEncoder::default().encode(&raw(), Some(&mask));
        assert_eq!(encoded.bbox, [1.0, 2.0, 4.0, 6.0]);
        assert_eq!(encoded.area, 0.0);
        assert_eq!(
            encoded.segmentation,
            Some(Segmentation::UncompressedRle {
                size: [10, 10],
                counts: vec![100]
            })
        );
    }

    #[test]
    fn test_zero_tolerance_keeps_boundary_pixels() {
        let mask = Mask::from_fn(20, 20, |x, y| (5..15).contains(&x) && (3..9).contains(&y));
        let polys = outer_polygons(&mask, 0.0);
        assert_eq!(polys.len(), 1);
        // 2 * (10 - 1) + 2 * (6 - 1) boundary pixels
        assert_eq!(polys[0].len() / 2, 28);
    }
}
