use spectrum_view_core::{Color, Point, Surface, SurfaceSize};

const BLANK: char = ' ';
const FILL: char = '.';
const STROKE: char = '#';

/// A character grid where every cell is one surface pixel.
#[derive(Debug, Clone)]
pub struct AsciiSurface {
    layout: SurfaceSize,
    size: SurfaceSize,
    cells: Vec<char>,
}

impl AsciiSurface {
    pub fn new(layout: SurfaceSize) -> Self {
        Self {
            layout,
            size: SurfaceSize::default(),
            cells: Vec::new(),
        }
    }

    /// The grid as text, one line per row, trailing blanks trimmed.
    pub fn render(&self) -> String {
        let width = self.size.width as usize;
        if width == 0 {
            return String::new();
        }
        self.cells
            .chunks(width)
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cell_mut(&mut self, x: i64, y: i64) -> Option<&mut char> {
        let (width, height) = (i64::from(self.size.width), i64::from(self.size.height));
        if x < 0 || y < 0 || x >= width || y >= height {
            return None;
        }
        self.cells.get_mut((y * width + x) as usize)
    }

    /// Pixel coordinates of the cell holding `point`. The far edges fold
    /// into the last row and column.
    fn cell_of(&self, point: Point) -> (i64, i64) {
        let max_x = i64::from(self.size.width) - 1;
        let max_y = i64::from(self.size.height) - 1;
        (
            (point.x.floor() as i64).clamp(0, max_x.max(0)),
            (point.y.floor() as i64).clamp(0, max_y.max(0)),
        )
    }

    fn plot_line(&mut self, from: (i64, i64), to: (i64, i64)) {
        // Bresenham
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            if let Some(cell) = self.cell_mut(x, y) {
                *cell = STROKE;
            }
            if (x, y) == to {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

impl Surface for AsciiSurface {
    fn layout_size(&self) -> SurfaceSize {
        self.layout
    }

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
        self.cells = vec![BLANK; size.width as usize * size.height as usize];
    }

    fn clear(&mut self) {
        self.cells.fill(BLANK);
    }

    fn fill_path(&mut self, points: &[Point], _color: Color) {
        if points.len() < 3 {
            return;
        }
        for y in 0..i64::from(self.size.height) {
            for x in 0..i64::from(self.size.width) {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if contains(points, center) {
                    if let Some(cell) = self.cell_mut(x, y) {
                        if *cell == BLANK {
                            *cell = FILL;
                        }
                    }
                }
            }
        }
    }

    fn stroke_path(&mut self, points: &[Point], _color: Color, _line_width: f32) {
        match points {
            [] => {}
            [only] => {
                let (x, y) = self.cell_of(*only);
                if let Some(cell) = self.cell_mut(x, y) {
                    *cell = STROKE;
                }
            }
            _ => {
                for pair in points.windows(2) {
                    let from = self.cell_of(pair[0]);
                    let to = self.cell_of(pair[1]);
                    self.plot_line(from, to);
                }
            }
        }
    }
}

/// Even-odd point-in-polygon test.
fn contains(polygon: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}
