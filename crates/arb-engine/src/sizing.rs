//! Precomputed sizing grid lookup.
//!
//! The grid is built offline and treated as an opaque oracle: `g[i][j]` is
//! the dimensionless fraction of the smaller pool's base reserve to borrow
//! when spread = `s_grid[i]` and reserve ratio = `r_grid[j]`. Lookups
//! bilinearly interpolate with end-clamping on both axes.

use std::path::Path;

use eyre::{ensure, Context, Result};
use serde::Deserialize;

/// Immutable 2-D sizing grid over (spread, reserve ratio).
#[derive(Clone, Debug, Deserialize)]
pub struct SizingGrid {
    s_grid: Vec<f64>,
    r_grid: Vec<f64>,
    g: Vec<Vec<f64>>,
}

impl SizingGrid {
    /// Loads and validates a grid from a JSON document
    /// (`{"s_grid": [...], "r_grid": [...], "g": [[...]]}`).
    ///
    /// # Errors
    /// Returns error when the file is unreadable or the grid is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read sizing grid {}", path.display()))?;
        let grid: SizingGrid = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse sizing grid {}", path.display()))?;
        grid.validate()
            .wrap_err_with(|| format!("invalid sizing grid {}", path.display()))?;
        Ok(grid)
    }

    /// Builds a grid from parts, validating shape.
    pub fn new(s_grid: Vec<f64>, r_grid: Vec<f64>, g: Vec<Vec<f64>>) -> Result<Self> {
        let grid = Self { s_grid, r_grid, g };
        grid.validate()?;
        Ok(grid)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.s_grid.is_empty(), "s_grid is empty");
        ensure!(!self.r_grid.is_empty(), "r_grid is empty");
        ensure!(
            self.s_grid.windows(2).all(|w| w[0] < w[1]),
            "s_grid is not strictly increasing"
        );
        ensure!(
            self.r_grid.windows(2).all(|w| w[0] < w[1]),
            "r_grid is not strictly increasing"
        );
        ensure!(
            self.g.len() == self.s_grid.len(),
            "g has {} rows, expected {}",
            self.g.len(),
            self.s_grid.len()
        );
        for (index, row) in self.g.iter().enumerate() {
            ensure!(
                row.len() == self.r_grid.len(),
                "g row {index} has {} columns, expected {}",
                row.len(),
                self.r_grid.len()
            );
        }
        Ok(())
    }

    /// Spread-axis knots.
    pub fn spread_axis(&self) -> &[f64] {
        &self.s_grid
    }

    /// Ratio-axis knots.
    pub fn ratio_axis(&self) -> &[f64] {
        &self.r_grid
    }

    /// Interpolated borrow fraction at `(spread, ratio)`, clamped to the
    /// grid edges on both axes.
    pub fn fraction(&self, spread: f64, ratio: f64) -> f64 {
        let (i0, i1, ts) = bracket(&self.s_grid, spread);
        let g0 = interp1(&self.r_grid, &self.g[i0], ratio);
        let g1 = interp1(&self.r_grid, &self.g[i1], ratio);
        g0 + ts * (g1 - g0)
    }

    /// Optimal borrow size in base-token units:
    /// `min(base_buy, base_sell) * max(0, g(spread, base_sell / base_buy))`.
    pub fn size(&self, spread: f64, base_buy: f64, base_sell: f64) -> f64 {
        let loanable = base_buy.min(base_sell);
        if loanable <= 0.0 {
            return 0.0;
        }
        let ratio = if base_buy > 0.0 {
            base_sell / base_buy
        } else {
            0.0
        };
        loanable * self.fraction(spread, ratio).max(0.0)
    }
}

/// Bracketing indices and interpolation weight for `x` over a strictly
/// increasing grid; collapses to an edge row outside the range.
fn bracket(grid: &[f64], x: f64) -> (usize, usize, f64) {
    let last = grid.len() - 1;
    if x <= grid[0] {
        return (0, 0, 0.0);
    }
    if x >= grid[last] {
        return (last, last, 0.0);
    }
    let k = grid.partition_point(|v| *v <= x) - 1;
    let (x0, x1) = (grid[k], grid[k + 1]);
    let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
    (k, k + 1, t)
}

fn interp1(grid: &[f64], values: &[f64], x: f64) -> f64 {
    let (i0, i1, t) = bracket(grid, x);
    values[i0] + t * (values[i1] - values[i0])
}
