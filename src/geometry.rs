//! # Page Geometry
//!
//! Points, rectangles, and the axis-aligned rect-to-rect transform used to
//! replay captured table headers at new positions. Coordinates follow the
//! page convention used throughout the engine: origin at the top-left of the
//! page, y growing downward. The PDF serializer flips y at write time.
//!
//! Also home to the Column/Cell Geometry Calculator: partitioning a usable
//! rectangle into equal-width column cells.

use serde::{Deserialize, Serialize};

/// A point on the page, in points (1/72 inch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Apply an affine transform to this point.
    pub fn transform(&self, m: &Matrix) -> Point {
        Point {
            x: m.a * self.x + m.c * self.y + m.e,
            y: m.b * self.x + m.d * self.y + m.f,
        }
    }
}

/// An axis-aligned rectangle: left, top, right, bottom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// A rectangle is empty when it encloses no area.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x0 && p.x <= self.x1 && p.y >= self.y0 && p.y <= self.y1
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x0 < other.x1
            && other.x0 < self.x1
            && self.y0 < other.y1
            && other.y0 < self.y1
    }

    /// Shrink by per-side margins `(left, top, right, bottom)`.
    pub fn inset(&self, margins: (f64, f64, f64, f64)) -> Rect {
        let (l, t, r, b) = margins;
        Rect {
            x0: self.x0 + l,
            y0: self.y0 + t,
            x1: self.x1 - r,
            y1: self.y1 - b,
        }
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// The matrix mapping this rectangle onto `target` (scale + translate,
    /// no rotation). Used when a captured header row is replayed at a
    /// different position and size.
    pub fn to_rect(&self, target: &Rect) -> Matrix {
        let sx = if self.width() != 0.0 {
            target.width() / self.width()
        } else {
            1.0
        };
        let sy = if self.height() != 0.0 {
            target.height() / self.height()
        } else {
            1.0
        };
        Matrix {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            e: target.x0 - self.x0 * sx,
            f: target.y0 - self.y0 * sy,
        }
    }

    /// Apply an affine transform to both corners.
    pub fn transform(&self, m: &Matrix) -> Rect {
        let tl = Point::new(self.x0, self.y0).transform(m);
        let br = Point::new(self.x1, self.y1).transform(m);
        Rect {
            x0: tl.x.min(br.x),
            y0: tl.y.min(br.y),
            x1: tl.x.max(br.x),
            y1: tl.y.max(br.y),
        }
    }
}

/// A 2D affine transform in the usual six-value form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };
}

/// Standard paper sizes in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum PaperSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PaperSize {
    /// Returns (width, height) in points.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PaperSize::A4 => (595.28, 841.89),
            PaperSize::A3 => (841.89, 1190.55),
            PaperSize::A5 => (419.53, 595.28),
            PaperSize::Letter => (612.0, 792.0),
            PaperSize::Legal => (612.0, 1008.0),
            PaperSize::Tabloid => (792.0, 1224.0),
        }
    }

    /// The page rectangle with the origin at (0, 0).
    pub fn rect(&self) -> Rect {
        let (w, h) = self.dimensions();
        Rect::new(0.0, 0.0, w, h)
    }
}

/// Partition a usable rectangle into `columns` equal-width, equal-height
/// cells (a single row of cells), ordered left to right and together
/// covering the full rectangle.
///
/// Stateless: callable repeatedly with shrunk rectangles when leftover space
/// below a finished block is re-partitioned.
pub fn column_cells(rect: &Rect, columns: usize) -> Vec<Rect> {
    let columns = columns.max(1);
    let col_width = rect.width() / columns as f64;
    (0..columns)
        .map(|i| Rect {
            x0: rect.x0 + i as f64 * col_width,
            y0: rect.y0,
            x1: rect.x0 + (i + 1) as f64 * col_width,
            y1: rect.y1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_count_and_width() {
        let rect = Rect::new(36.0, 36.0, 559.0, 806.0);
        for n in 1..=6 {
            let cells = column_cells(&rect, n);
            assert_eq!(cells.len(), n);
            let expect_w = rect.width() / n as f64;
            for cell in &cells {
                assert!((cell.width() - expect_w).abs() < 1e-9);
                assert_eq!(cell.y0, rect.y0);
                assert_eq!(cell.y1, rect.y1);
            }
        }
    }

    #[test]
    fn test_cells_union_covers_input() {
        let rect = Rect::new(0.0, 0.0, 500.0, 700.0);
        let cells = column_cells(&rect, 3);
        let mut u = cells[0];
        for c in &cells[1..] {
            u = u.union(c);
        }
        assert_eq!(u, rect);
        // Adjacent cells share an edge exactly
        assert!((cells[0].x1 - cells[1].x0).abs() < 1e-9);
        assert!((cells[1].x1 - cells[2].x0).abs() < 1e-9);
    }

    #[test]
    fn test_cells_zero_columns_clamps_to_one() {
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        let cells = column_cells(&rect, 0);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0], rect);
    }

    #[test]
    fn test_to_rect_maps_corners() {
        let src = Rect::new(10.0, 20.0, 110.0, 70.0);
        let dst = Rect::new(0.0, 0.0, 50.0, 25.0);
        let m = src.to_rect(&dst);
        let tl = Point::new(src.x0, src.y0).transform(&m);
        let br = Point::new(src.x1, src.y1).transform(&m);
        assert!((tl.x - dst.x0).abs() < 1e-9 && (tl.y - dst.y0).abs() < 1e-9);
        assert!((br.x - dst.x1).abs() < 1e-9 && (br.y - dst.y1).abs() < 1e-9);
    }

    #[test]
    fn test_to_rect_translation_only() {
        let src = Rect::new(36.0, 100.0, 200.0, 120.0);
        let dst = Rect::new(36.0, 400.0, 200.0, 420.0);
        let m = src.to_rect(&dst);
        let p = Point::new(50.0, 110.0).transform(&m);
        assert!((p.x - 50.0).abs() < 1e-9);
        assert!((p.y - 410.0).abs() < 1e-9);
    }

    #[test]
    fn test_inset() {
        let r = Rect::new(0.0, 0.0, 100.0, 100.0).inset((10.0, 5.0, 20.0, 15.0));
        assert_eq!(r, Rect::new(10.0, 5.0, 80.0, 85.0));
    }

    #[test]
    fn test_intersects() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 15.0, 15.0)));
        assert!(!a.intersects(&Rect::new(10.0, 0.0, 20.0, 10.0)));
        assert!(!a.intersects(&Rect::new(0.0, 0.0, 0.0, 10.0)));
    }
}
