use crate::Color;

/// A position in surface pixel space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A 2D drawing target, the equivalent of a canvas element and its context.
pub trait Surface {
    /// Size of the layout box the surface currently occupies.
    fn layout_size(&self) -> SurfaceSize;

    /// Size of the pixel backing store.
    fn size(&self) -> SurfaceSize;

    fn resize(&mut self, size: SurfaceSize);

    fn clear(&mut self);

    /// Fills the polygon outlined by `points`.
    fn fill_path(&mut self, points: &[Point], color: Color);

    /// Strokes an open polyline through `points`.
    fn stroke_path(&mut self, points: &[Point], color: Color, line_width: f32);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Resize(SurfaceSize),
    Clear,
    Fill {
        points: Vec<Point>,
        color: Color,
    },
    Stroke {
        points: Vec<Point>,
        color: Color,
        line_width: f32,
    },
}

/// Surface that records every call. Used by tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    layout: SurfaceSize,
    size: SurfaceSize,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    /// Creates a surface laid out at `layout` with an unsized backing store.
    pub fn new(layout: SurfaceSize) -> Self {
        Self {
            layout,
            size: SurfaceSize::default(),
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of frames drawn so far, counted by clears.
    pub fn frames(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, DrawOp::Clear)).count()
    }

    /// Operations issued since the most recent clear, inclusive.
    pub fn last_frame(&self) -> &[DrawOp] {
        let start = self
            .ops
            .iter()
            .rposition(|op| matches!(op, DrawOp::Clear))
            .unwrap_or(0);
        &self.ops[start..]
    }
}

impl Surface for RecordingSurface {
    fn layout_size(&self) -> SurfaceSize {
        self.layout
    }

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
        self.ops.push(DrawOp::Resize(size));
    }

    fn clear(&mut self) {
        self.ops.push(DrawOp::Clear);
    }

    fn fill_path(&mut self, points: &[Point], color: Color) {
        self.ops.push(DrawOp::Fill {
            points: points.to_vec(),
            color,
        });
    }

    fn stroke_path(&mut self, points: &[Point], color: Color, line_width: f32) {
        self.ops.push(DrawOp::Stroke {
            points: points.to_vec(),
            color,
            line_width,
        });
    }
}
