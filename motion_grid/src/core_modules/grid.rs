// THEORY:
// The `Grid` is the fixed geometry of the aggregation layer. It divides the
// canvas into a single row of full-height cells, left to right, and never
// changes after it is built.
//
// Key architectural principles:
// 1.  **Exact Tiling**: every cell is `canvas_width / cell_count` pixels wide and
//     the last cell absorbs the remainder, so the cells cover the canvas with
//     no gaps and no overlaps.
// 2.  **Column Lookup**: because the cells are vertical strips, the cell a pixel
//     belongs to depends on its column only. The grid precomputes that
//     column -> cell table so the aggregator can classify a whole mask in one
//     raster pass.
// 3.  **Position, not Pixels**: a cell's reported location is the midpoint of
//     its rectangle, normalized to the canvas.

use crate::error::{MotionError, MotionResult};

pub const DEFAULT_CELL_COUNT: u32 = 20;
pub const DEFAULT_CANVAS_WIDTH: u32 = 640;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 480;

/// An axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Midpoint of the rectangle in canvas pixels.
    pub fn midpoint(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
}

/// One region of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Position of the cell in left-to-right order.
    pub index: usize,
    /// The cell's bounds on the canvas.
    pub rect: Rect,
}

/// The immutable partition of the canvas into cells.
#[derive(Debug, Clone)]
pub struct Grid {
    canvas_width: u32,
    canvas_height: u32,
    cells: Vec<Cell>,
    /// `column_to_cell[x]` is the index of the cell owning pixel column `x`.
    column_to_cell: Vec<usize>,
}

impl Grid {
    /// Divides the canvas into `cell_count` equal-width, full-height cells.
    pub fn configure(canvas_width: u32, canvas_height: u32, cell_count: u32) -> MotionResult<Self> {
        if canvas_width == 0 || canvas_height == 0 {
            return Err(MotionError::config(format!(
                "canvas must be non-empty, got {}x{}",
                canvas_width, canvas_height
            )));
        }
        if cell_count == 0 {
            return Err(MotionError::config("cell_count must be greater than zero"));
        }
        if cell_count > canvas_width {
            return Err(MotionError::config(format!(
                "cell_count {} exceeds canvas width {}",
                cell_count, canvas_width
            )));
        }

        let base_width = canvas_width / cell_count;
        let mut cells = Vec::with_capacity(cell_count as usize);
        let mut column_to_cell = Vec::with_capacity(canvas_width as usize);

        for index in 0..cell_count {
            let x = index * base_width;
            let width = if index == cell_count - 1 {
                canvas_width - x
            } else {
                base_width
            };
            cells.push(Cell {
                index: index as usize,
                rect: Rect {
                    x,
                    y: 0,
                    width,
                    height: canvas_height,
                },
            });
            column_to_cell.extend(std::iter::repeat_n(index as usize, width as usize));
        }

        Ok(Self {
            canvas_width,
            canvas_height,
            cells,
            column_to_cell,
        })
    }

    pub fn canvas_width(&self) -> u32 {
        self.canvas_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.canvas_height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Index of the cell owning pixel column `x`.
    pub fn cell_at_column(&self, x: u32) -> Option<usize> {
        self.column_to_cell.get(x as usize).copied()
    }

    pub(crate) fn column_table(&self) -> &[usize] {
        &self.column_to_cell
    }

    /// Midpoint of a cell normalized to the canvas, both axes in [0, 1].
    pub fn centroid(&self, index: usize) -> Option<(f32, f32)> {
        self.cells.get(index).map(|cell| {
            let (mx, my) = cell.rect.midpoint();
            (
                mx / self.canvas_width as f32,
                my / self.canvas_height as f32,
            )
        })
    }
}
