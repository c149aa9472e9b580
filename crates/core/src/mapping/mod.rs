//! Projection of sample buffers into surface pixel coordinates.

use crate::{MappingMode, Point, SampleBuffer, SurfaceSize};

/// Maps `buffer` onto a surface of `size` according to `mode`.
///
/// Returns `None` when the buffer shape does not match the mode. Point order
/// always follows buffer order.
pub fn project(
    buffer: &SampleBuffer,
    mode: MappingMode,
    size: SurfaceSize,
    anti_aliasing: bool,
) -> Option<Vec<Point>> {
    match (buffer, mode) {
        (SampleBuffer::Pairs(pairs), MappingMode::Pairs) => {
            Some(map_pairs(pairs, size, anti_aliasing))
        }
        (SampleBuffer::Scalars(values), MappingMode::LogScalars { scale }) => {
            let scale = scale.unwrap_or(size.height as f32);
            Some(map_log_scalars(values, size, scale, anti_aliasing))
        }
        // An empty buffer carries no shape worth rejecting.
        (buffer, _) if buffer.is_empty() => Some(Vec::new()),
        _ => None,
    }
}

/// Linear projection of normalised pairs. `y = 1` lands on the top edge.
pub fn map_pairs(pairs: &[(f32, f32)], size: SurfaceSize, anti_aliasing: bool) -> Vec<Point> {
    let width = size.width as f32;
    let height = size.height as f32;
    pairs
        .iter()
        .map(|&(x, y)| snap(Point::new(x * width, (1.0 - y) * height), anti_aliasing))
        .collect()
}

/// Spreads bin indices logarithmically across the width and scales
/// magnitudes linearly up from the bottom edge.
pub fn map_log_scalars(
    values: &[f32],
    size: SurfaceSize,
    scale: f32,
    anti_aliasing: bool,
) -> Vec<Point> {
    let width = size.width as f32;
    let height = size.height as f32;
    let denominator = (values.len() as f32).ln();

    values
        .iter()
        .enumerate()
        .map(|(index, magnitude)| {
            let x = if denominator > 0.0 {
                ((index + 1) as f32).ln() / denominator * width
            } else {
                0.0
            };
            snap(Point::new(x, height - magnitude * scale), anti_aliasing)
        })
        .collect()
}

/// Closes `curve` down to the bottom-right and bottom-left corners.
pub fn fill_outline(curve: &[Point], size: SurfaceSize) -> Vec<Point> {
    let width = size.width as f32;
    let height = size.height as f32;
    let mut outline = Vec::with_capacity(curve.len() + 2);
    outline.extend_from_slice(curve);
    outline.push(Point::new(width, height));
    outline.push(Point::new(0.0, height));
    outline
}

fn snap(point: Point, anti_aliasing: bool) -> Point {
    if anti_aliasing {
        point
    } else {
        Point::new(point.x.floor(), point.y.floor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: SurfaceSize = SurfaceSize::new(100, 100);

    #[test]
    fn maps_the_reference_triangle() {
        let points = map_pairs(&[(0.0, 0.0), (0.5, 1.0), (1.0, 0.0)], SQUARE, false);
        assert_eq!(
            points,
            vec![
                Point::new(0.0, 100.0),
                Point::new(50.0, 0.0),
                Point::new(100.0, 100.0)
            ]
        );
    }

    #[test]
    fn inverts_the_y_axis() {
        let size = SurfaceSize::new(64, 48);
        let points = map_pairs(&[(0.3, 1.0), (0.3, 0.0)], size, true);
        assert_eq!(points[0].y, 0.0);
        assert_eq!(points[1].y, 48.0);
    }

    #[test]
    fn normalised_pairs_stay_inside_the_surface() {
        let size = SurfaceSize::new(333, 77);
        let pairs: Vec<(f32, f32)> = (0..=20)
            .flat_map(|i| (0..=20).map(move |j| (i as f32 / 20.0, j as f32 / 20.0)))
            .collect();

        for aa in [true, false] {
            for point in map_pairs(&pairs, size, aa) {
                assert!((0.0..=333.0).contains(&point.x), "{point:?}");
                assert!((0.0..=77.0).contains(&point.y), "{point:?}");
            }
        }
    }

    #[test]
    fn anti_aliasing_controls_rounding() {
        let size = SurfaceSize::new(7, 3);
        let pairs = [(0.33, 0.41), (0.9, 0.15)];

        let crisp = map_pairs(&pairs, size, false);
        assert!(crisp.iter().all(|p| p.x.fract() == 0.0 && p.y.fract() == 0.0));

        let smooth = map_pairs(&pairs, size, true);
        assert_eq!(smooth[0], Point::new(0.33 * 7.0, (1.0 - 0.41) * 3.0));
        assert_eq!(smooth[1], Point::new(0.9 * 7.0, (1.0 - 0.15) * 3.0));
    }

    #[test]
    fn log_mapping_spans_the_width() {
        let values = vec![0.5; 10];
        let points = map_log_scalars(&values, SurfaceSize::new(200, 100), 100.0, true);

        assert_eq!(points[0].x, 0.0);
        assert!((points[9].x - 200.0).abs() < 1e-4);
        assert!(points.windows(2).all(|w| w[0].x < w[1].x));
        assert!(points.iter().all(|p| (p.y - 50.0).abs() < 1e-4));
    }

    #[test]
    fn log_mapping_of_a_single_bin_sits_at_the_left_edge() {
        let points = map_log_scalars(&[1.0], SQUARE, 10.0, false);
        assert_eq!(points, vec![Point::new(0.0, 90.0)]);
    }

    #[test]
    fn project_defaults_log_scale_to_surface_height() {
        let buffer = SampleBuffer::Scalars(vec![0.0, 1.0]);
        let points = project(&buffer, MappingMode::LogScalars { scale: None }, SQUARE, true)
            .expect("shape matches");
        assert_eq!(points[0], Point::new(0.0, 100.0));
        assert_eq!(points[1], Point::new(100.0, 0.0));
    }

    #[test]
    fn project_rejects_mismatched_shapes() {
        let scalars = SampleBuffer::Scalars(vec![0.1, 0.2]);
        assert!(project(&scalars, MappingMode::Pairs, SQUARE, true).is_none());

        let empty = SampleBuffer::Scalars(Vec::new());
        assert_eq!(project(&empty, MappingMode::Pairs, SQUARE, true), Some(Vec::new()));
    }

    #[test]
    fn preserves_buffer_order_and_duplicates() {
        let pairs = [(0.9, 0.5), (0.1, 0.5), (0.1, 0.5)];
        let points = map_pairs(&pairs, SQUARE, true);
        assert_eq!(points.len(), 3);
        assert!(points[0].x > points[1].x);
        assert_eq!(points[1], points[2]);
    }

    #[test]
    fn outline_appends_bottom_corners() {
        let outline = fill_outline(&[Point::new(5.0, 5.0)], SurfaceSize::new(10, 20));
        assert_eq!(
            outline,
            vec![
                Point::new(5.0, 5.0),
                Point::new(10.0, 20.0),
                Point::new(0.0, 20.0)
            ]
        );
    }
}
