use serde::{Deserialize, Serialize};

/// A 2D point in layout coordinates (database units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        })
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn contains(&self, other: &BBox) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Grow this box in place to cover `other`.
    pub fn merge(&mut self, other: &BBox) {
        *self = self.union(other);
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            min: self.min.translate(dx, dy),
            max: self.max.translate(dx, dy),
        }
    }
}

/// A rectangle defined by lower-left and upper-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            lower_left: Point::new(x1.min(x2), y1.min(y2)),
            upper_right: Point::new(x1.max(x2), y1.max(y2)),
        }
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(self.lower_left, self.upper_right)
    }

    pub fn dx(&self) -> i32 {
        self.upper_right.x - self.lower_left.x
    }

    pub fn dy(&self) -> i32 {
        self.upper_right.y - self.lower_left.y
    }

    pub fn area(&self) -> i64 {
        self.dx() as i64 * self.dy() as i64
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            lower_left: self.lower_left.translate(dx, dy),
            upper_right: self.upper_right.translate(dx, dy),
        }
    }
}

/// An octilinear (45°-bend) shape: a fat segment between two center points
/// with a half-width. Stored as the alternative to a plain rectangle on a
/// geometry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Octagon {
    /// Center of the lower end.
    pub center_low: Point,
    /// Center of the higher end.
    pub center_high: Point,
    /// Distance from a center to the left or right edge (width / 2).
    pub half_width: i32,
}

impl Octagon {
    pub fn new(center_low: Point, center_high: Point, width: i32) -> Self {
        Self {
            center_low,
            center_high,
            half_width: width / 2,
        }
    }

    pub fn x_min(&self) -> i32 {
        self.center_low.x.min(self.center_high.x) - self.half_width
    }

    pub fn y_min(&self) -> i32 {
        self.center_low.y.min(self.center_high.y) - self.half_width
    }

    pub fn x_max(&self) -> i32 {
        self.center_low.x.max(self.center_high.x) + self.half_width
    }

    pub fn y_max(&self) -> i32 {
        self.center_low.y.max(self.center_high.y) + self.half_width
    }

    /// The enclosing axis-aligned rectangle.
    pub fn bbox(&self) -> BBox {
        BBox::new(
            Point::new(self.x_min(), self.y_min()),
            Point::new(self.x_max(), self.y_max()),
        )
    }
}

/// The shape payload of a geometry record: exactly one of the two variants
/// is ever stored, selected on disk by the octilinear flag bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    Rect(Rect),
    Octagon(Octagon),
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Rect(Rect::default())
    }
}

impl Shape {
    pub fn is_octilinear(&self) -> bool {
        matches!(self, Shape::Octagon(_))
    }

    /// Bounding box accessor, total over both variants, so spatial-index
    /// consumers never need to know which payload is active.
    pub fn bbox(&self) -> BBox {
        match self {
            Shape::Rect(r) => r.bbox(),
            Shape::Octagon(o) => o.bbox(),
        }
    }
}
