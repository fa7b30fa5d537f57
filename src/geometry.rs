//! Plain geometric value types used by the decoders and the transform engine

use serde::Serialize;

/// A point in drawing units (millimetres for Jw_cad)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Reflect across the vertical line `x = axis`
    pub fn mirror_x(self, axis: f64) -> Self {
        Self::new(2.0 * axis - self.x, self.y)
    }

    /// Reflect across the horizontal line `y = axis`
    pub fn mirror_y(self, axis: f64) -> Self {
        Self::new(self.x, 2.0 * axis - self.y)
    }

    /// Rotate counter-clockwise by `degrees` about `center`
    pub fn rotate(self, degrees: f64, center: Point) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Self::new(center.x + dx * cos - dy * sin, center.y + dx * sin + dy * cos)
    }
}

/// Axis-aligned bounding box, grown one point at a time
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_point(p: Point) -> Self {
        Self {
            min_x: p.x,
            min_y: p.y,
            max_x: p.x,
            max_y: p.y,
        }
    }

    /// Extend the box so it contains `p`
    pub fn include(&mut self, p: Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    /// Build a box from any number of points; `None` when there are none
    pub fn from_points(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let mut bbox = Self::from_point(iter.next()?);
        for p in iter {
            bbox.include(p);
        }
        Some(bbox)
    }

    pub fn center(&self) -> Point {
        Point::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Normalize an angle in degrees into `[0, 360)`
pub fn normalize_degrees(angle: f64) -> f64 {
    // `+ 0.0` folds -0.0 into 0.0 so it never prints as "-0"
    angle.rem_euclid(360.0) + 0.0
}

/// Format a coordinate the way the exchange file expects: shortest
/// round-tripping decimal, no trailing `.0`, never `-0`.
pub fn format_number(value: f64) -> String {
    format!("{}", value + 0.0)
}
