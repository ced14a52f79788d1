//! Ordinary least-squares straightness measure.
//!
//! # Algorithm
//!
//! ```text
//! a = Σ (x - x̄)(y - x̄) / Σ (x - x̄)²
//! b = ȳ - a·x̄
//! r = y - a·x - b
//! ```
//!
//! The numerator centres `y` on `x̄`, not `ȳ`. Because `Σ (x - x̄) = 0` the
//! slope is the textbook one up to rounding; the alignment thresholds are
//! tuned against this exact arithmetic.
//!
//! # Vertical alignment
//!
//! When every point shares the same `x` the denominator is zero. The fit is
//! then redone with the axes exchanged (`x` regressed on `y`). If that
//! denominator is zero too, every point coincides and all residuals are zero.
//!
//! The result depends only on the input order; summation is plain `f64`.

/// Regression requested on zero points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot fit a line through zero points")]
pub struct EmptyInput;

/// Which variable the fit treats as dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitAxis {
    /// `y = a·x + b`.
    YOnX,
    /// `x = a·y + b`, used when all points share one `x`.
    XOnY,
}

/// Outcome of a least-squares fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    /// Sum of squared residuals.
    pub sum_squared_residual: f64,
    /// Largest single squared residual.
    pub max_squared_residual: f64,
    pub mean_x: f64,
    pub mean_y: f64,
    pub slope: f64,
    pub intercept: f64,
    pub axis: FitAxis,
}

/// Fit a line through `points` and measure how far they stray from it.
///
/// # Errors
///
/// Returns [`EmptyInput`] when `points` is empty.
#[allow(clippy::cast_precision_loss)]
pub fn fit(points: &[(f64, f64)]) -> Result<Fit, EmptyInput> {
    if points.is_empty() {
        return Err(EmptyInput);
    }

    let n = points.len() as f64;
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    let mean_x = sum_x / n;
    let mean_y = sum_y / n;

    if let Some((slope, intercept)) = slope_and_intercept(points.iter().copied(), mean_x, mean_y)
    {
        let (sum, max) = residuals(points.iter().copied(), slope, intercept);
        return Ok(Fit {
            sum_squared_residual: sum,
            max_squared_residual: max,
            mean_x,
            mean_y,
            slope,
            intercept,
            axis: FitAxis::YOnX,
        });
    }

    let swapped = points.iter().map(|&(x, y)| (y, x));
    let (slope, intercept) =
        slope_and_intercept(swapped.clone(), mean_y, mean_x).unwrap_or((0.0, mean_x));
    let (sum, max) = residuals(swapped, slope, intercept);

    Ok(Fit {
        sum_squared_residual: sum,
        max_squared_residual: max,
        mean_x,
        mean_y,
        slope,
        intercept,
        axis: FitAxis::XOnY,
    })
}

/// Slope and intercept of `v = a·u + b`, or `None` when every `u` is equal.
fn slope_and_intercept(
    pairs: impl Iterator<Item = (f64, f64)>,
    mean_u: f64,
    mean_v: f64,
) -> Option<(f64, f64)> {
    let (num, den) = pairs.fold((0.0, 0.0), |(num, den), (u, v)| {
        let du = u - mean_u;
        (du.mul_add(v - mean_u, num), du.mul_add(du, den))
    });

    if den == 0.0 {
        return None;
    }

    let slope = num / den;
    Some((slope, slope.mul_add(-mean_u, mean_v)))
}

fn residuals(pairs: impl Iterator<Item = (f64, f64)>, slope: f64, intercept: f64) -> (f64, f64) {
    pairs.fold((0.0, 0.0), |(sum, max): (f64, f64), (u, v)| {
        let diff = slope.mul_add(-u, v) - intercept;
        let square = diff * diff;
        (sum + square, max.max(square))
    })
}
