//! Rectilinear polygon decomposition.
//!
//! Splits a simple rectilinear polygon into non-overlapping rectangles by
//! horizontal bands: for each band between adjacent vertex y-coordinates,
//! the vertical edges spanning the band are paired left-to-right into
//! covered x-intervals. The store owns the linking contract for the result
//! (see `LayoutStore::create_polygon_*`); this module only owns the tiling.

use crate::cell::MIN_POLYGON_POINTS;
use crate::geometry::{Point, Rect};

/// Decompose `points` into rectangles. Sequences shorter than the polygon
/// minimum yield an empty set. A polygon with non-rectilinear edges falls
/// back to its bounding box.
pub fn decompose_rectilinear(points: &[Point]) -> Vec<Rect> {
    if points.len() < MIN_POLYGON_POINTS {
        return Vec::new();
    }

    let n = points.len();
    let mut vertical_edges: Vec<(i32, i32, i32)> = Vec::new(); // (x, y_low, y_high)
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        if a.x == b.x {
            if a.y != b.y {
                vertical_edges.push((a.x, a.y.min(b.y), a.y.max(b.y)));
            }
        } else if a.y != b.y {
            // Diagonal edge: not rectilinear.
            log::warn!(
                "non-rectilinear polygon edge ({},{})-({},{}); decomposing to bounding box",
                a.x,
                a.y,
                b.x,
                b.y
            );
            return match crate::geometry::BBox::from_points(points) {
                Some(bb) => vec![Rect::new(bb.min.x, bb.min.y, bb.max.x, bb.max.y)],
                None => Vec::new(),
            };
        }
    }

    let mut ys: Vec<i32> = points.iter().map(|p| p.y).collect();
    ys.sort_unstable();
    ys.dedup();

    let mut rects = Vec::new();
    for band in ys.windows(2) {
        let (y_low, y_high) = (band[0], band[1]);
        let mut xs: Vec<i32> = vertical_edges
            .iter()
            .filter(|&&(_, e_low, e_high)| e_low <= y_low && e_high >= y_high)
            .map(|&(x, _, _)| x)
            .collect();
        xs.sort_unstable();
        // Even-odd pairing of crossing edges gives the covered intervals.
        for pair in xs.chunks_exact(2) {
            rects.push(Rect::new(pair[0], y_low, pair[1], y_high));
        }
    }
    rects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    #[test]
    fn test_too_few_points_yields_empty() {
        let points = vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10)];
        assert!(decompose_rectilinear(&points).is_empty());
        assert!(decompose_rectilinear(&[]).is_empty());
    }

    #[test]
    fn test_rectangle_decomposes_to_itself() {
        let points = vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 50),
            Point::new(0, 50),
        ];
        let rects = decompose_rectilinear(&points);
        assert_eq!(rects, vec![Rect::new(0, 0, 100, 50)]);
    }

    #[test]
    fn test_l_shape_decomposes_into_two_bands() {
        // ┌──┐
        // │  └───┐
        // └──────┘
        let points = vec![
            Point::new(0, 0),
            Point::new(40, 0),
            Point::new(40, 10),
            Point::new(20, 10),
            Point::new(20, 30),
            Point::new(0, 30),
        ];
        let rects = decompose_rectilinear(&points);
        assert_eq!(rects, vec![Rect::new(0, 0, 40, 10), Rect::new(0, 10, 20, 30)]);
    }

    #[test]
    fn test_u_shape_has_split_band() {
        let points = vec![
            Point::new(0, 0),
            Point::new(60, 0),
            Point::new(60, 30),
            Point::new(40, 30),
            Point::new(40, 10),
            Point::new(20, 10),
            Point::new(20, 30),
            Point::new(0, 30),
        ];
        let rects = decompose_rectilinear(&points);
        assert_eq!(
            rects,
            vec![
                Rect::new(0, 0, 60, 10),
                Rect::new(0, 10, 20, 30),
                Rect::new(40, 10, 60, 30),
            ]
        );
    }

    #[test]
    fn test_union_contained_in_polygon_bbox() {
        let points = vec![
            Point::new(0, 0),
            Point::new(40, 0),
            Point::new(40, 10),
            Point::new(20, 10),
            Point::new(20, 30),
            Point::new(0, 30),
        ];
        let poly_bb = BBox::from_points(&points).unwrap();
        for rect in decompose_rectilinear(&points) {
            assert!(poly_bb.contains(&rect.bbox()));
        }
    }
}
