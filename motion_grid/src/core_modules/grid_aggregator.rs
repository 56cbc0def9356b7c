// THEORY:
// The `GridAggregator` is the central nervous system of the aggregation layer.
// It owns the `Grid` and turns a binary `ChangeMask` into a per-cell picture of
// where the motion is, then reduces that picture to the single dominant cell.
//
// Key architectural principles:
// 1.  **Orchestration**: It holds the grid geometry and the per-cell counters,
//     and is the only thing that writes to them.
// 2.  **One Pass**: Cells are non-overlapping vertical strips, so every mask row
//     is walked once and each changed sample is credited to its column's cell.
// 3.  **No Memory**: Counters are zeroed at the start of every `count_pixels`
//     call. The result always describes the most recent mask only.
// 4.  **Stable Winner**: The winner is the cell with the strictly greatest
//     count; on a tie the lowest index (leftmost cell) keeps the title, so
//     symmetric motion produces the same answer frame after frame.
// 5.  **Read-only View**: Renderers get `cells()`, an iterator of
//     `(cell, count)` pairs, and cannot touch the aggregator's state.

use crate::core_modules::frame_differ::{CHANGED, ChangeMask};
use crate::core_modules::grid::{Cell, Grid};
use crate::core_modules::motion_signal::MotionSignal;
use crate::error::{MotionError, MotionResult};
use tracing::trace;

/// The changed-pixel count of one cell for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMotion {
    pub cell: Cell,
    pub count: u64,
}

/// Manages the grid and the per-cycle motion counts.
#[derive(Debug, Clone)]
pub struct GridAggregator {
    /// The fixed partition of the canvas.
    grid: Grid,
    /// Changed-pixel count per cell, indexed like `grid.cells()`.
    counts: Vec<u64>,
    /// Index of the cell with the greatest count.
    winner: usize,
}

impl GridAggregator {
    /// Builds the grid for the given canvas and cell count.
    pub fn configure(canvas_width: u32, canvas_height: u32, cell_count: u32) -> MotionResult<Self> {
        let grid = Grid::configure(canvas_width, canvas_height, cell_count)?;
        Ok(Self::with_grid(grid))
    }

    pub fn with_grid(grid: Grid) -> Self {
        let counts = vec![0; grid.len()];
        Self {
            grid,
            counts,
            winner: 0,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Counts the changed samples of `mask` per cell and selects the winner.
    ///
    /// An empty mask leaves the previous result untouched. A mask whose size
    /// differs from the canvas is rejected.
    pub fn count_pixels(&mut self, mask: &ChangeMask) -> MotionResult<()> {
        if mask.is_empty() {
            return Ok(());
        }
        let canvas = (self.grid.canvas_width(), self.grid.canvas_height());
        if mask.dimensions() != canvas {
            return Err(MotionError::dimension_mismatch(canvas, mask.dimensions()));
        }

        self.counts.iter_mut().for_each(|c| *c = 0);

        let columns = self.grid.column_table();
        let width = canvas.0 as usize;
        for row in mask.image().as_raw().chunks_exact(width) {
            for (sample, &cell) in row.iter().zip(columns) {
                if *sample == CHANGED {
                    self.counts[cell] += 1;
                }
            }
        }

        self.winner = select_winner(&self.counts);
        trace!(
            winner = self.winner,
            count = self.counts[self.winner],
            "aggregated change mask"
        );
        Ok(())
    }

    /// Changed-pixel count of the winning cell.
    pub fn motion_value(&self) -> u64 {
        self.counts[self.winner]
    }

    /// Normalized x of the winning cell's midpoint.
    pub fn max_x(&self) -> f32 {
        self.winner_centroid().0
    }

    /// Normalized y of the winning cell's midpoint.
    pub fn max_y(&self) -> f32 {
        self.winner_centroid().1
    }

    pub fn winner(&self) -> &Cell {
        &self.grid.cells()[self.winner]
    }

    pub fn winner_index(&self) -> usize {
        self.winner
    }

    pub fn signal(&self) -> MotionSignal {
        MotionSignal::from_cell(self.motion_value(), self.winner_centroid())
    }

    pub fn count(&self, index: usize) -> Option<u64> {
        self.counts.get(index).copied()
    }

    /// Read-only view of every cell with its current count, in index order.
    pub fn cells(&self) -> impl ExactSizeIterator<Item = CellMotion> + '_ {
        self.grid
            .cells()
            .iter()
            .zip(&self.counts)
            .map(|(cell, &count)| CellMotion { cell: *cell, count })
    }

    fn winner_centroid(&self) -> (f32, f32) {
        self.grid.centroid(self.winner).unwrap_or((0.0, 0.0))
    }
}

/// Index of the strictly greatest count, earliest index on ties.
fn select_winner(counts: &[u64]) -> usize {
    let mut best = 0;
    for (index, &count) in counts.iter().enumerate().skip(1) {
        if count > counts[best] {
            best = index;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn mask_with_columns(width: u32, height: u32, columns: std::ops::Range<u32>) -> ChangeMask {
        let image = GrayImage::from_fn(width, height, |x, _| {
            Luma([if columns.contains(&x) { CHANGED } else { 0 }])
        });
        ChangeMask::from_image(image)
    }

    #[test]
    fn fresh_aggregator_reports_cell_zero_with_no_motion() {
        let agg = GridAggregator::configure(640, 480, 20).unwrap();
        assert_eq!(agg.winner_index(), 0);
        assert_eq!(agg.motion_value(), 0);
        assert!((agg.max_x() - 16.0 / 640.0).abs() < 1e-6);
        assert!((agg.max_y() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn blank_mask_yields_zero_counts_and_leftmost_winner() {
        let mut agg = GridAggregator::configure(64, 8, 4).unwrap();
        agg.count_pixels(&ChangeMask::from_image(GrayImage::new(64, 8))).unwrap();
        assert!(agg.cells().all(|c| c.count == 0));
        assert_eq!(agg.winner_index(), 0);
        assert_eq!(agg.motion_value(), 0);
    }

    #[test]
    fn fully_changed_cell_wins_with_its_area() {
        let mut agg = GridAggregator::configure(64, 8, 4).unwrap();
        agg.count_pixels(&mask_with_columns(64, 8, 32..48)).unwrap();
        assert_eq!(agg.winner_index(), 2);
        assert_eq!(agg.motion_value(), 16 * 8);
        assert_eq!(agg.count(0), Some(0));
        assert_eq!(agg.count(3), Some(0));
    }

    #[test]
    fn ties_go_to_the_lowest_index() {
        let mut agg = GridAggregator::configure(40, 10, 4).unwrap();
        // Cells 1 and 3 get five changed columns each.
        let image = GrayImage::from_fn(40, 10, |x, _| {
            Luma([if (10..15).contains(&x) || (30..35).contains(&x) { CHANGED } else { 0 }])
        });
        let mask = ChangeMask::from_image(image);
        for _ in 0..3 {
            agg.count_pixels(&mask).unwrap();
            assert_eq!(agg.winner_index(), 1);
            assert_eq!(agg.motion_value(), 50);
        }
    }

    #[test]
    fn counts_do_not_carry_over_between_cycles() {
        let mut agg = GridAggregator::configure(40, 10, 4).unwrap();
        agg.count_pixels(&mask_with_columns(40, 10, 30..40)).unwrap();
        assert_eq!(agg.winner_index(), 3);
        agg.count_pixels(&mask_with_columns(40, 10, 0..2)).unwrap();
        assert_eq!(agg.winner_index(), 0);
        assert_eq!(agg.motion_value(), 20);
        assert_eq!(agg.count(3), Some(0));
    }

    #[test]
    fn empty_mask_keeps_previous_result() {
        let mut agg = GridAggregator::configure(40, 10, 4).unwrap();
        agg.count_pixels(&mask_with_columns(40, 10, 20..30)).unwrap();
        agg.count_pixels(&ChangeMask::empty()).unwrap();
        assert_eq!(agg.winner_index(), 2);
        assert_eq!(agg.motion_value(), 100);
    }

    #[test]
    fn wrong_sized_mask_is_rejected() {
        let mut agg = GridAggregator::configure(40, 10, 4).unwrap();
        let err = agg
            .count_pixels(&ChangeMask::from_image(GrayImage::new(41, 10)))
            .unwrap_err();
        assert!(matches!(err, MotionError::DimensionMismatch { .. }));
    }

    #[test]
    fn partial_values_are_not_counted() {
        let mut agg = GridAggregator::configure(4, 1, 2).unwrap();
        let image = GrayImage::from_raw(4, 1, vec![254, 255, 1, 0]).unwrap();
        agg.count_pixels(&ChangeMask::from_image(image)).unwrap();
        assert_eq!(agg.count(0), Some(1));
        assert_eq!(agg.count(1), Some(0));
    }

    #[test]
    fn remainder_columns_count_toward_the_last_cell() {
        let mut agg = GridAggregator::configure(10, 1, 3).unwrap();
        agg.count_pixels(&mask_with_columns(10, 1, 9..10)).unwrap();
        assert_eq!(agg.winner_index(), 2);
        assert_eq!(agg.winner().rect.width, 4);
    }

    #[test]
    fn cells_view_is_in_index_order() {
        let agg = GridAggregator::configure(640, 480, 20).unwrap();
        let view: Vec<CellMotion> = agg.cells().collect();
        assert_eq!(view.len(), 20);
        for (i, cm) in view.iter().enumerate() {
            assert_eq!(cm.cell.index, i);
        }
    }

    #[test]
    fn select_winner_prefers_first_maximum() {
        assert_eq!(select_winner(&[0, 0, 0]), 0);
        assert_eq!(select_winner(&[1, 5, 5, 2]), 1);
        assert_eq!(select_winner(&[1, 2, 3]), 2);
    }
}
