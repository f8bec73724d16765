//! Noise-robust local minimum search.

/// Index of the smallest value, first one on ties. `None` for empty input.
pub(crate) fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Index of the largest value, first one on ties. `None` for empty input.
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Return the x of the most trustworthy minimum of `y`.
///
/// A 3-point moving average picks the flattest low window; inside it the
/// sample closest to the window mean wins, so a single spike below an
/// otherwise level stretch is not chosen. With fewer than three samples the
/// plain minimum is used.
pub fn find_stable_min(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n == 0 {
        return None;
    }
    let y = &y[..n];

    if n < 3 {
        return argmin(y).map(|i| x[i]);
    }

    let averages: Vec<f64> = y.windows(3).map(|w| (w[0] + w[1] + w[2]) / 3.0).collect();
    let start = argmin(&averages)?;
    let mean = averages[start];

    let deviations: Vec<f64> = y[start..start + 3]
        .iter()
        .map(|&v| (v - mean).abs())
        .collect();
    let offset = argmin(&deviations)?;

    Some(x[start + offset])
}
