//! Dense instance masks and COCO run-length encoding.
//!
//! RLE counts are column-major (pixel `(x, y)` at index `y + h * x`) and always
//! start with a run of zeros, matching `maskApi.c` from cocoapi.

use image::{GrayImage, Luma};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::Rle;

/// Encode a column-major binary mask into RLE.
///
/// `mask` is stored in column-major order (Fortran order): pixel (x, y) is at index `y + h * x`.
/// Length must be `h * w`.
pub fn encode(mask: &[u8], h: u32, w: u32) -> Rle {
    let n = (h as usize) * (w as usize);
    debug_assert_eq!(mask.len(), n, "mask length must equal h*w");

    let mut counts = Vec::new();
    let mut p: u8 = 0;
    let mut c: u32 = 0;

    for &v in mask.iter().take(n) {
        let v = u8::from(v != 0);
        if v != p {
            counts.push(c);
            c = 0;
            p = v;
        }
        c += 1;
    }
    counts.push(c);

    Rle { h, w, counts }
}

/// Decode an RLE to a column-major binary mask of size `h * w`.
pub fn decode(rle: &Rle) -> Vec<u8> {
    let n = (rle.h as usize) * (rle.w as usize);
    let mut mask = vec![0u8; n];
    let mut idx = 0usize;
    let mut v = 0u8;
    for &c in &rle.counts {
        let c = c as usize;
        let end = (idx + c).min(n);
        if idx < end {
            mask[idx..end].fill(v);
        }
        idx += c;
        v = 1 - v;
    }
    mask
}

/// Number of foreground pixels (sum of the odd-indexed runs).
pub fn area(rle: &Rle) -> u64 {
    rle.counts
        .iter()
        .skip(1)
        .step_by(2)
        .map(|&c| c as u64)
        .sum()
}

/// Decompress COCO's LEB128-like string counts.
///
/// Counts after the third are stored as deltas against the count two places
/// back, as `rleFrString` in maskApi.c does.
pub fn rle_from_string(s: &str, h: u32, w: u32) -> Result<Rle> {
    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let mut x: i64 = 0;
        let mut shift = 0;
        let mut more = true;
        while more && i < bytes.len() {
            // Seven 5-bit groups hold any u32 count or delta.
            if shift > 30 {
                return Err(Error::Data("compressed RLE count overflows".into()));
            }
            let b = bytes[i];
            if !(48..48 + 64).contains(&b) {
                return Err(Error::Data(format!(
                    "invalid byte {:?} in compressed RLE counts",
                    b as char
                )));
            }
            let c = (b - 48) as i64;
            i += 1;
            x |= (c & 0x1f) << shift;
            more = (c & 0x20) != 0;
            shift += 5;
            if !more && (c & 0x10) != 0 {
                x |= -1i64 << shift;
            }
        }
        if counts.len() > 2 {
            x += counts[counts.len() - 2] as i64;
        }
        let count = u32::try_from(x)
            .map_err(|_| Error::Data(format!("compressed RLE decodes to invalid count {x}")))?;
        counts.push(count);
    }

    Ok(Rle { h, w, counts })
}

/// Dense pixel-occupancy grid for one detected instance, row-major.
///
/// Any non-zero cell is occupied. The grid is in image pixel space.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "MaskRepr")]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Serialized forms accepted for a mask: raw row-major cells or column-major RLE counts.
#[derive(Deserialize)]
#[serde(untagged)]
enum MaskRepr {
    Dense {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    Rle {
        width: u32,
        height: u32,
        counts: Vec<u32>,
    },
}

impl TryFrom<MaskRepr> for Mask {
    type Error = Error;

    fn try_from(repr: MaskRepr) -> Result<Self> {
        match repr {
            MaskRepr::Dense {
                width,
                height,
                data,
            } => Mask::new(width, height, data),
            MaskRepr::Rle {
                width,
                height,
                counts,
            } => {
                let total: u64 = counts.iter().map(|&c| c as u64).sum();
                if total != width as u64 * height as u64 {
                    return Err(Error::Config(format!(
                        "mask RLE counts sum to {total}, expected {width}x{height}"
                    )));
                }
                Ok(Mask::from_rle(&Rle {
                    h: height,
                    w: width,
                    counts,
                }))
            }
        }
    }
}

impl Mask {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(Error::Config(format!(
                "mask has {} cells, expected {width}x{height}",
                data.len()
            )));
        }
        Ok(Mask {
            width,
            height,
            data,
        })
    }

    /// Like [`Mask::new`] for array shapes given as `(rows, cols)` in `usize`.
    pub fn from_shape(height: usize, width: usize, data: Vec<u8>) -> Result<Self> {
        let dim = |name: &str, v: usize| {
            u32::try_from(v).map_err(|_| Error::Config(format!("mask {name} {v} exceeds u32")))
        };
        Mask::new(dim("width", width)?, dim("height", height)?, data)
    }

    /// Build a mask by evaluating `occupied(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, occupied: impl Fn(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(u8::from(occupied(x, y)));
            }
        }
        Mask {
            width,
            height,
            data,
        }
    }

    pub fn from_rle(rle: &Rle) -> Self {
        let col_major = decode(rle);
        let (h, w) = (rle.h as usize, rle.w as usize);
        let mut data = vec![0u8; h * w];
        for x in 0..w {
            for y in 0..h {
                data[y * w + x] = col_major[y + h * x];
            }
        }
        Mask {
            width: rle.w,
            height: rle.h,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width
            && y < self.height
            && self.data[y as usize * self.width as usize + x as usize] != 0
    }

    /// Number of occupied pixels.
    pub fn count(&self) -> u64 {
        self.data.iter().filter(|&&v| v != 0).count() as u64
    }

    /// Inclusive pixel extent `(x_min, y_min, x_max, y_max)` of the occupied cells.
    pub fn extent(&self) -> Option<(u32, u32, u32, u32)> {
        let w = self.width as usize;
        let mut extent: Option<(u32, u32, u32, u32)> = None;
        for (i, &v) in self.data.iter().enumerate() {
            if v == 0 {
                continue;
            }
            let (x, y) = ((i % w) as u32, (i / w) as u32);
            extent = Some(match extent {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        extent
    }

    pub fn to_column_major(&self) -> Vec<u8> {
        let (h, w) = (self.height as usize, self.width as usize);
        let mut out = vec![0u8; h * w];
        for y in 0..h {
            for x in 0..w {
                out[y + h * x] = u8::from(self.data[y * w + x] != 0);
            }
        }
        out
    }

    pub fn to_rle(&self) -> Rle {
        encode(&self.to_column_major(), self.height, self.width)
    }

    /// Binary image with occupied pixels at 255, as expected by `imageproc` contour tracing.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mask = vec![0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0];
        let rle = encode(&mask, 3, 4);
        let decoded = decode(&rle);
        assert_eq!(mask, decoded);
    }

    #[test]
    fn test_encode_all_zeros() {
        let mask = vec![0u8; 12];
        let rle = encode(&mask, 3, 4);
        assert_eq!(rle.counts, vec![12]);
    }

    #[test]
    fn test_encode_all_ones() {
        let mask = vec![1u8; 12];
        let rle = encode(&mask, 3, 4);
        assert_eq!(rle.counts, vec![0, 12]);
    }

    #[test]
    fn test_area() {
        let mask = vec![0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0];
        let rle = encode(&mask, 3, 4);
        assert_eq!(area(&rle), 5);
    }

    #[test]
    fn test_rle_from_string() {
        // "5" -> 5, "3" -> 3, "l2" -> 28 + (2 << 5) = 92
        let rle = rle_from_string("53l2", 10, 10).unwrap();
        assert_eq!(rle.counts, vec![5, 3, 92]);
    }

    #[test]
    fn test_rle_from_string_applies_deltas() {
        // Fourth count is stored relative to the second: 3 + 2 = 5.
        let rle = rle_from_string("5352", 3, 6).unwrap();
        assert_eq!(rle.counts, vec![5, 3, 5, 5]);
    }

    #[test]
    fn test_rle_from_string_rejects_overlong_count() {
        let err = rle_from_string("oooooooooooooooooooo", 2, 2).unwrap_err();
        assert!(matches!(err, Error::Data(ref msg) if msg.contains("overflows")));
        let err = rle_from_string("oooooooo0", 2, 2).unwrap_err();
        assert!(matches!(err, Error::Data(ref msg) if msg.contains("overflows")));
    }

    #[test]
    fn test_rle_from_string_rejects_garbage() {
        let err = rle_from_string("5 3", 2, 2).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }

    #[test]
    fn test_mask_rle_is_column_major() {
        // 2 rows x 3 cols, row-major: [0 1 0]
        //                             [0 1 1]
        let mask = Mask::new(3, 2, vec![0, 1, 0, 0, 1, 1]).unwrap();
        let rle = mask.to_rle();
        // column-major: col0 [0,0], col1 [1,1], col2 [0,1]
        assert_eq!(rle.counts, vec![2, 2, 1, 1]);
        assert_eq!(Mask::from_rle(&rle), mask);
    }

    #[test]
    fn test_mask_extent_and_count() {
        let mask = Mask::from_fn(10, 8, |x, y| (2..5).contains(&x) && (3..7).contains(&y));
        assert_eq!(mask.count(), 12);
        assert_eq!(mask.extent(), Some((2, 3, 4, 6)));
        assert_eq!(Mask::from_fn(4, 4, |_, _| false).extent(), None);
    }

    #[test]
    fn test_mask_rejects_wrong_length() {
        assert!(matches!(Mask::new(2, 2, vec![0; 3]), Err(Error::Config(_))));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_mask_from_shape_checks_dimensions() {
        let mask = Mask::from_shape(2, 3, vec![0, 1, 0, 0, 1, 1]).unwrap();
        assert_eq!((mask.width(), mask.height()), (3, 2));
        let wide = u32::MAX as usize + 1;
        let err = Mask::from_shape(1, wide, vec![]).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("width")));
        let err = Mask::from_shape(wide, 1, vec![]).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("height")));
    }

    #[test]
    fn test_mask_deserializes_both_forms() {
        let dense: Mask =
            serde_json::from_str(r#"{"width":2,"height":2,"data":[0,1,1,0]}"#).unwrap();
        let rle: Mask = serde_json::from_str(r#"{"width":2,"height":2,"counts":[1,2,1]}"#).unwrap();
        assert_eq!(dense, rle);
        assert!(serde_json::from_str::<Mask>(r#"{"width":2,"height":2,"counts":[1,2]}"#).is_err());
    }
}
