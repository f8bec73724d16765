//! Peak area above a background curve.

use super::extremum::argmin;

/// Index of the sample whose x is closest to `target` (first on ties).
pub(crate) fn nearest_index(x: &[f64], target: f64) -> Option<usize> {
    let distances: Vec<f64> = x.iter().map(|&xi| (xi - target).abs()).collect();
    argmin(&distances)
}

/// Snap both bounds to samples and return them as an ordered index pair.
pub(crate) fn snapped_range(x: &[f64], bounds: (f64, f64)) -> Option<(usize, usize)> {
    let a = nearest_index(x, bounds.0)?;
    let b = nearest_index(x, bounds.1)?;
    Some((a.min(b), a.max(b)))
}

/// Lowest and highest value on the axis, `None` when empty.
pub(crate) fn energy_domain(x: &[f64]) -> Option<(f64, f64)> {
    if x.is_empty() {
        return None;
    }
    let lo = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    Some((lo, hi))
}

/// Signed trapezoidal integral of `y` over `x`.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// Area of `y` above `background` between `bounds`, negative excursions
/// counted as zero.
///
/// Both bounds are snapped to the nearest sample and may be given in either
/// order. The result does not depend on the sort direction of `x`.
pub fn integrate_area(x: &[f64], y: &[f64], background: &[f64], bounds: (f64, f64)) -> f64 {
    if x.len() != y.len() || y.len() != background.len() {
        log::warn!(
            "integrate_area: length mismatch (x={}, y={}, background={})",
            x.len(),
            y.len(),
            background.len()
        );
        return 0.0;
    }
    let Some((start, end)) = snapped_range(x, bounds) else {
        return 0.0;
    };

    let above: Vec<f64> = y[start..=end]
        .iter()
        .zip(&background[start..=end])
        .map(|(&yi, &bi)| (yi - bi).max(0.0))
        .collect();

    trapezoid(&x[start..=end], &above).abs()
}
