//! Image-processing primitives used by the pipeline.
//!
//! Buffers, decoding and resizing come from `image`; blur, morphology, contour
//! tracing, thresholding, the distance transform and polygon filling come from `imageproc`.
//! Shape descriptors (polygon moments, Hu invariants, contour similarity) and
//! skeleton thinning live here because neither crate provides them.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

use crate::frame::{HeightMap, Rect};

const HU_EPSILON: f64 = 1.0e-5;

// ----------------------------------------------------------------------------
// Contours
// ----------------------------------------------------------------------------

/// Closed polygon traced around a connected region (first point is not repeated).
#[derive(Clone, Debug, PartialEq)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
}

impl Contour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    pub fn from_coords(coords: &[(i32, i32)]) -> Self {
        Self {
            points: coords.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    /// Absolute polygon area (shoelace). Degenerate contours have area 0.
    pub fn area(&self) -> f64 {
        self.moments().m00.abs()
    }

    pub fn moments(&self) -> Moments {
        Moments::of_polygon(&self.points)
    }

    /// Smallest rectangle holding every contour point (inclusive pixel bounds).
    pub fn bounding_rect(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::new(0, 0, 0, 0);
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Rect::new(
            min_x,
            min_y,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }

    /// Contour translated by (`dx`, `dy`).
    pub fn shifted(&self, dx: i32, dy: i32) -> Contour {
        Contour {
            points: self
                .points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        }
    }
}

/// Outer borders of every foreground (non-zero) region, holes ignored.
pub fn find_external_contours(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(c.points))
        .collect()
}

// ----------------------------------------------------------------------------
// Moments
// ----------------------------------------------------------------------------

/// Spatial moments up to third order of a polygon, computed with Green's theorem.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m11: f64,
    pub m02: f64,
    pub m30: f64,
    pub m21: f64,
    pub m12: f64,
    pub m03: f64,
}

impl Moments {
    pub fn of_polygon(points: &[Point<i32>]) -> Self {
        if points.len() < 3 {
            return Self::default();
        }
        let (mut a00, mut a10, mut a01, mut a20, mut a11, mut a02) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let (mut a30, mut a21, mut a12, mut a03) = (0.0, 0.0, 0.0, 0.0);

        let last = points[points.len() - 1];
        let (mut xp, mut yp) = (last.x as f64, last.y as f64);
        for p in points {
            let (x, y) = (p.x as f64, p.y as f64);
            let (xp2, yp2, x2, y2) = (xp * xp, yp * yp, x * x, y * y);
            let dxy = xp * y - x * yp;
            let xs = xp + x;
            let ys = yp + y;

            a00 += dxy;
            a10 += dxy * xs;
            a01 += dxy * ys;
            a20 += dxy * (xp * xs + x2);
            a11 += dxy * (xp * (ys + yp) + x * (ys + y));
            a02 += dxy * (yp * ys + y2);
            a30 += dxy * xs * (xp2 + x2);
            a03 += dxy * ys * (yp2 + y2);
            a21 += dxy * (xp2 * (3.0 * yp + y) + 2.0 * x * xp * ys + x2 * (yp + 3.0 * y));
            a12 += dxy * (yp2 * (3.0 * xp + x) + 2.0 * y * yp * xs + y2 * (xp + 3.0 * x));

            xp = x;
            yp = y;
        }

        if a00.abs() <= f64::from(f32::EPSILON) {
            return Self::default();
        }
        // Orientation-independent: flip the sign for clockwise traversal.
        let s = if a00 > 0.0 { 1.0 } else { -1.0 };
        Self {
            m00: s * a00 / 2.0,
            m10: s * a10 / 6.0,
            m01: s * a01 / 6.0,
            m20: s * a20 / 12.0,
            m11: s * a11 / 24.0,
            m02: s * a02 / 12.0,
            m30: s * a30 / 20.0,
            m21: s * a21 / 60.0,
            m12: s * a12 / 60.0,
            m03: s * a03 / 20.0,
        }
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 == 0.0 {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }

    /// The seven Hu invariants (translation, scale and rotation invariant).
    pub fn hu(&self) -> [f64; 7] {
        let Some((cx, cy)) = self.centroid() else {
            return [0.0; 7];
        };
        let mu20 = self.m20 - cx * self.m10;
        let mu11 = self.m11 - cx * self.m01;
        let mu02 = self.m02 - cy * self.m01;
        let mu30 = self.m30 - cx * (3.0 * mu20 + cx * self.m10);
        let mu21 = self.m21 - cx * (2.0 * mu11 + cx * self.m01) - cy * mu20;
        let mu12 = self.m12 - cy * (2.0 * mu11 + cy * self.m10) - cx * mu02;
        let mu03 = self.m03 - cy * (3.0 * mu02 + cy * self.m01);

        let inv2 = 1.0 / (self.m00 * self.m00);
        let inv3 = inv2 / self.m00.sqrt();
        let (n20, n11, n02) = (mu20 * inv2, mu11 * inv2, mu02 * inv2);
        let (n30, n21, n12, n03) = (mu30 * inv3, mu21 * inv3, mu12 * inv3, mu03 * inv3);

        let t0 = n30 + n12;
        let t1 = n21 + n03;
        let q0 = n20 - n02;
        let q1 = n30 - 3.0 * n12;
        let q2 = 3.0 * n21 - n03;
        let (t0s, t1s) = (t0 * t0, t1 * t1);

        [
            n20 + n02,
            q0 * q0 + 4.0 * n11 * n11,
            q1 * q1 + q2 * q2,
            t0s + t1s,
            q1 * t0 * (t0s - 3.0 * t1s) + q2 * t1 * (3.0 * t0s - t1s),
            q0 * (t0s - t1s) + 4.0 * n11 * t0 * t1,
            q2 * t0 * (t0s - 3.0 * t1s) - q1 * t1 * (3.0 * t0s - t1s),
        ]
    }
}

/// Contour dissimilarity from Hu invariants (0 = identical shape).
pub fn match_shapes(a: &Contour, b: &Contour) -> f64 {
    let ha = a.moments().hu();
    let hb = b.moments().hu();
    let mut score = 0.0;
    for i in 0..7 {
        let (ama, amb) = (ha[i].abs(), hb[i].abs());
        if ama > HU_EPSILON && amb > HU_EPSILON {
            let ma = 1.0 / (ha[i].signum() * ama.log10());
            let mb = 1.0 / (hb[i].signum() * amb.log10());
            score += (mb - ma).abs();
        }
    }
    score
}

/// Log-scaled Hu descriptor; near-zero invariants map to 0.
pub fn hu_descriptor(contour: &Contour) -> [f64; 7] {
    let hu = contour.moments().hu();
    let mut out = [0.0; 7];
    for (o, h) in out.iter_mut().zip(hu) {
        if h.abs() > HU_EPSILON {
            *o = -h.signum() * h.abs().log10();
        }
    }
    out
}

pub fn hu_distance(a: &Contour, b: &Contour) -> f64 {
    let (da, db) = (hu_descriptor(a), hu_descriptor(b));
    da.iter()
        .zip(db.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

// ----------------------------------------------------------------------------
// Masks
// ----------------------------------------------------------------------------

/// Morphological opening then closing with a square structuring element of the given radius.
pub fn open_close(mask: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    let opened = imageproc::morphology::open(mask, Norm::LInf, radius);
    imageproc::morphology::close(&opened, Norm::LInf, radius)
}

pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Euclidean distance from every foreground pixel to the nearest background pixel.
/// Background pixels are 0.
pub fn distance_inside(mask: &GrayImage) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let inverted = threshold(mask, 0, ThresholdType::BinaryInverted);
    let squared = euclidean_squared_distance_transform(&inverted);
    ImageBuffer::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([squared.get_pixel(x, y)[0].sqrt() as f32])
    })
}

/// Zhang-Suen thinning: reduces foreground regions to 1-pixel-wide centerlines.
pub fn skeletonize(mask: &GrayImage) -> GrayImage {
    let (w, h) = (mask.width() as i64, mask.height() as i64);
    let mut grid: Vec<bool> = mask.pixels().map(|p| p[0] > 0).collect();
    let at = |grid: &[bool], x: i64, y: i64| -> u8 {
        if x < 0 || y < 0 || x >= w || y >= h {
            0
        } else {
            grid[(y * w + x) as usize] as u8
        }
    };

    let mut to_clear = Vec::new();
    loop {
        let mut changed = false;
        for pass in 0..2 {
            to_clear.clear();
            for y in 0..h {
                for x in 0..w {
                    if !grid[(y * w + x) as usize] {
                        continue;
                    }
                    // p2..p9 clockwise from north.
                    let n = [
                        at(&grid, x, y - 1),
                        at(&grid, x + 1, y - 1),
                        at(&grid, x + 1, y),
                        at(&grid, x + 1, y + 1),
                        at(&grid, x, y + 1),
                        at(&grid, x - 1, y + 1),
                        at(&grid, x - 1, y),
                        at(&grid, x - 1, y - 1),
                    ];
                    let neighbours: u8 = n.iter().sum();
                    if !(2..=6).contains(&neighbours) {
                        continue;
                    }
                    let transitions = (0..8).filter(|&i| n[i] == 0 && n[(i + 1) % 8] == 1).count();
                    if transitions != 1 {
                        continue;
                    }
                    let (p2, p4, p6, p8) = (n[0], n[2], n[4], n[6]);
                    let remove = if pass == 0 {
                        p2 * p4 * p6 == 0 && p4 * p6 * p8 == 0
                    } else {
                        p2 * p4 * p8 == 0 && p2 * p6 * p8 == 0
                    };
                    if remove {
                        to_clear.push((y * w + x) as usize);
                    }
                }
            }
            if !to_clear.is_empty() {
                changed = true;
                for &idx in &to_clear {
                    grid[idx] = false;
                }
            }
        }
        if !changed {
            break;
        }
    }

    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if grid[(y as i64 * w + x as i64) as usize] {
            255
        } else {
            0
        }])
    })
}

/// Filled mask of `contour` inside `rect` (contour coordinates are frame coordinates).
pub fn fill_contour(contour: &Contour, rect: Rect) -> GrayImage {
    let mut mask = GrayImage::new(rect.w, rect.h);
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(contour.points.len());
    for p in &contour.points {
        let q = Point::new(p.x - rect.x, p.y - rect.y);
        if poly.last() != Some(&q) {
            poly.push(q);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() >= 3 {
        draw_polygon_mut(&mut mask, &poly, Luma([255u8]));
    } else {
        for q in poly {
            if q.x >= 0 && q.y >= 0 && (q.x as u32) < rect.w && (q.y as u32) < rect.h {
                mask.put_pixel(q.x as u32, q.y as u32, Luma([255]));
            }
        }
    }
    mask
}

/// Normalized top-edge profile of a mask.
///
/// Samples `samples` evenly spaced columns; each entry is the topmost foreground
/// row divided by the mask height, or 0 when the column is empty.
pub fn height_profile(mask: &GrayImage, samples: usize) -> Vec<f32> {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 || samples == 0 {
        return vec![0.0; samples];
    }
    (0..samples)
        .map(|i| {
            let x = if samples == 1 {
                0
            } else {
                ((i as f64 * (w - 1) as f64) / (samples - 1) as f64) as u32
            };
            (0..h)
                .find(|&y| mask.get_pixel(x, y)[0] > 0)
                .map(|y| y as f32 / h as f32)
                .unwrap_or(0.0)
        })
        .collect()
}

pub fn profile_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Resize a relief patch to `width`×`height`, keeping heights in their own units.
/// `None` for empty targets or sources.
///
/// `imageops::resize` clamps float pixels to `[0, 1]`, so the patch is resampled in
/// that range and mapped back to its original span.
pub fn resize_heights(relief: &HeightMap, width: u32, height: u32) -> Option<HeightMap> {
    if width == 0 || height == 0 || relief.width() == 0 || relief.height() == 0 {
        return None;
    }
    if relief.dimensions() == (width, height) {
        return Some(relief.clone());
    }
    let (lo, hi) = relief
        .pixels()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[0]), hi.max(p[0]))
        });
    let span = hi - lo;
    if !(span > 0.0) {
        return Some(HeightMap::from_pixel(width, height, Luma([lo])));
    }
    let mut unit = relief.clone();
    unit.pixels_mut().for_each(|p| p[0] = (p[0] - lo) / span);
    let mut resized = imageops::resize(&unit, width, height, FilterType::Triangle);
    resized.pixels_mut().for_each(|p| p[0] = lo + p[0] * span);
    Some(resized)
}

/// Saturating absolute conversion of a float plane to 8 bits.
pub fn to_u8_saturating(value: f32) -> u8 {
    value.abs().round().min(255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_mask(w: u32, h: u32, rect: Rect) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let inside = x as i32 >= rect.x
                && (x as i32) < rect.x + rect.w as i32
                && y as i32 >= rect.y
                && (y as i32) < rect.y + rect.h as i32;
            Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn polygon_moments_match_rectangle() {
        let c = Contour::from_coords(&[(0, 0), (10, 0), (10, 4), (0, 4)]);
        let m = c.moments();
        assert!((m.m00 - 40.0).abs() < 1e-9);
        let (cx, cy) = m.centroid().unwrap();
        assert!((cx - 5.0).abs() < 1e-9);
        assert!((cy - 2.0).abs() < 1e-9);

        // Reversed orientation yields the same moments.
        let rev = Contour::from_coords(&[(0, 4), (10, 4), (10, 0), (0, 0)]);
        assert!((rev.moments().m00 - 40.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_contour_has_no_centroid() {
        let c = Contour::from_coords(&[(3, 3), (4, 3)]);
        assert_eq!(c.area(), 0.0);
        assert!(c.moments().centroid().is_none());
    }

    #[test]
    fn match_shapes_is_scale_invariant() {
        let small = Contour::from_coords(&[(0, 0), (10, 0), (10, 4), (0, 4)]);
        let big = Contour::from_coords(&[(0, 0), (30, 0), (30, 12), (0, 12)]);
        let square = Contour::from_coords(&[(0, 0), (10, 0), (10, 10), (0, 10)]);
        assert!(match_shapes(&small, &big) < 1e-6);
        assert!(match_shapes(&small, &square) > match_shapes(&small, &big));
        assert!(hu_distance(&small, &big) < 1e-6);
    }

    #[test]
    fn external_contours_trace_each_blob() {
        let mut mask = rect_mask(40, 30, Rect::new(2, 2, 10, 8));
        for (x, y, p) in rect_mask(40, 30, Rect::new(20, 10, 12, 12)).enumerate_pixels() {
            if p[0] > 0 {
                mask.put_pixel(x, y, *p);
            }
        }
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 2);
        let mut rects: Vec<Rect> = contours.iter().map(|c| c.bounding_rect()).collect();
        rects.sort_by_key(|r| r.x);
        assert_eq!(rects[0], Rect::new(2, 2, 10, 8));
        assert_eq!(rects[1], Rect::new(20, 10, 12, 12));
    }

    #[test]
    fn open_close_removes_speckle() {
        let mut mask = rect_mask(30, 30, Rect::new(5, 5, 12, 12));
        mask.put_pixel(25, 25, Luma([255]));
        let cleaned = open_close(&mask, 1);
        assert_eq!(cleaned.get_pixel(25, 25)[0], 0);
        assert_eq!(cleaned.get_pixel(10, 10)[0], 255);
    }

    #[test]
    fn distance_inside_peaks_at_center() {
        let mask = rect_mask(20, 20, Rect::new(2, 2, 9, 9));
        let dist = distance_inside(&mask);
        assert_eq!(dist.get_pixel(0, 0)[0], 0.0);
        assert!((dist.get_pixel(6, 6)[0] - 5.0).abs() < 1e-4);
        assert!((dist.get_pixel(2, 6)[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn skeleton_of_bar_is_thin_centerline() {
        let mask = rect_mask(40, 20, Rect::new(4, 6, 30, 7));
        let skel = skeletonize(&mask);
        // Every column in the middle of the bar keeps exactly one pixel.
        for x in 12..26 {
            let count = (0..20).filter(|&y| skel.get_pixel(x, y)[0] > 0).count();
            assert_eq!(count, 1, "column {x}");
            assert!(skel.get_pixel(x, 9)[0] > 0);
        }
    }

    #[test]
    fn profile_records_top_edge() {
        // Left half starts at row 5, right half at row 0, height 10.
        let mask = GrayImage::from_fn(10, 10, |x, y| {
            let top = if x < 5 { 5 } else { 0 };
            Luma([if y >= top { 255 } else { 0 }])
        });
        let profile = height_profile(&mask, 4);
        assert_eq!(profile, vec![0.5, 0.5, 0.0, 0.0]);
        let empty = GrayImage::new(4, 4);
        assert_eq!(height_profile(&empty, 3), vec![0.0; 3]);
    }

    #[test]
    fn filled_contour_covers_interior() {
        let c = Contour::from_coords(&[(10, 10), (19, 10), (19, 17), (10, 17)]);
        let rect = c.bounding_rect();
        let mask = fill_contour(&c, rect);
        assert_eq!(mask.dimensions(), (10, 8));
        assert!(mask.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn resize_rejects_empty_target() {
        let relief = HeightMap::from_pixel(4, 4, Luma([3.0]));
        assert!(resize_heights(&relief, 0, 4).is_none());
        let resized = resize_heights(&relief, 8, 2).unwrap();
        assert_eq!(resized.dimensions(), (8, 2));
        assert!((resized.get_pixel(3, 1)[0] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn resize_keeps_millimetre_heights() {
        // Left half 10 mm, right half 40 mm.
        let relief = HeightMap::from_fn(10, 4, |x, _| Luma([if x < 5 { 10.0 } else { 40.0 }]));
        let resized = resize_heights(&relief, 20, 8).unwrap();
        assert!((resized.get_pixel(0, 3)[0] - 10.0).abs() < 1e-3);
        assert!((resized.get_pixel(19, 3)[0] - 40.0).abs() < 1e-3);
        assert!(resized.pixels().all(|p| (10.0 - 1e-3..=40.0 + 1e-3).contains(&p[0])));

        let shrunk = resize_heights(&HeightMap::from_pixel(20, 10, Luma([30.0])), 5, 3).unwrap();
        assert!(shrunk.pixels().all(|p| (p[0] - 30.0).abs() < 1e-3));
    }

    #[test]
    fn thresholds_split_strictly_above() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([[79u8, 80, 81][x as usize]]));
        let binary = threshold(&img, 80, ThresholdType::Binary);
        assert_eq!(binary.as_raw(), &vec![0, 0, 255]);
        let inverted = threshold(&img, 80, ThresholdType::BinaryInverted);
        assert_eq!(inverted.as_raw(), &vec![255, 255, 0]);
    }
}
