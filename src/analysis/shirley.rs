//! Iterative Shirley background.
//!
//! The background at each point of the region is proportional to the peak
//! intensity integrated from the low-intensity end of the region up to that
//! point. Starting from a straight line, the curve is recomputed until it
//! stops moving. The two endpoints are never changed.

use serde::{Deserialize, Serialize};

use super::baseline::Baseline;
use super::extremum::{argmax, find_stable_min};
use super::integrate::snapped_range;

/// Integrated signal below this fraction of the region's total intensity is
/// rounding noise: the background is already flat against the data.
const NEGLIGIBLE_SIGNAL: f64 = 1e-12;

/// Tuning for [`shirley_background`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShirleySettings {
    /// Search distance from the peak toward higher binding energy.
    pub search_width_high: f64,
    /// Search distance from the peak toward lower binding energy.
    pub search_width_low: f64,
    /// Used for a side whose search window has no samples.
    pub fallback_half_width: f64,
    pub max_iterations: usize,
    /// Largest per-point change that still counts as converged.
    pub tolerance: f64,
}

impl Default for ShirleySettings {
    fn default() -> Self {
        Self {
            search_width_high: 10.0,
            search_width_low: 10.0,
            fallback_half_width: 5.0,
            max_iterations: 50,
            tolerance: 1e-5,
        }
    }
}

/// Pick the region boundaries from the quietest points on both sides of the
/// main peak.
pub fn auto_region(x: &[f64], y: &[f64], settings: &ShirleySettings) -> Option<(f64, f64)> {
    let peak_x = x[argmax(y)?];

    let side = |keep: &dyn Fn(f64) -> bool| -> (Vec<f64>, Vec<f64>) {
        x.iter()
            .zip(y)
            .filter(|&(&xi, _)| keep(xi))
            .map(|(&xi, &yi)| (xi, yi))
            .unzip()
    };

    let (hx, hy) = side(&|xi| xi > peak_x && xi <= peak_x + settings.search_width_high);
    let high = find_stable_min(&hx, &hy).unwrap_or(peak_x + settings.fallback_half_width);

    let (lx, ly) = side(&|xi| xi < peak_x && xi >= peak_x - settings.search_width_low);
    let low = find_stable_min(&lx, &ly).unwrap_or(peak_x - settings.fallback_half_width);

    Some((high.min(low), high.max(low)))
}

/// Shirley background over `bounds`, or over [`auto_region`] when `None`.
///
/// The result always has one value per sample; outside the region it is
/// held at the nearest boundary value.
pub fn shirley_background(
    x: &[f64],
    y: &[f64],
    bounds: Option<(f64, f64)>,
    settings: &ShirleySettings,
) -> Baseline {
    let n = x.len().min(y.len());
    let (x, y) = (&x[..n], &y[..n]);

    let region = bounds.or_else(|| auto_region(x, y, settings));
    let (Some((x_min, x_max)), Some((start, end))) =
        (region, region.and_then(|r| snapped_range(x, r)))
    else {
        return Baseline {
            values: Vec::new(),
            x_min: 0.0,
            x_max: 0.0,
        };
    };

    let roi = &y[start..=end];
    if roi.len() < 3 {
        return Baseline {
            values: linspace(y[start], y[end], n),
            x_min,
            x_max,
        };
    }

    let bg = iterate(roi, settings);

    let mut values = Vec::with_capacity(n);
    values.extend(std::iter::repeat(bg[0]).take(start));
    values.extend_from_slice(&bg);
    values.extend(std::iter::repeat(bg[bg.len() - 1]).take(n - end - 1));

    Baseline {
        values,
        x_min,
        x_max,
    }
}

/// Fixed-point iteration over one region. `roi` has at least three samples.
fn iterate(roi: &[f64], settings: &ShirleySettings) -> Vec<f64> {
    let first = roi[0];
    let last = roi[roi.len() - 1];
    let mut bg = linspace(first, last, roi.len());

    // Accumulate from the low end toward the high end.
    let high_at_start = first > last;
    let (high, low) = if high_at_start { (first, last) } else { (last, first) };
    let floor = NEGLIGIBLE_SIGNAL * roi.iter().map(|v| v.abs()).sum::<f64>();

    for iteration in 0..settings.max_iterations {
        let above: Vec<f64> = roi
            .iter()
            .zip(&bg)
            .map(|(&yi, &bi)| (yi - bi).max(0.0))
            .collect();

        let cumulative = cumulative_sum(&above, high_at_start);
        let total = if high_at_start {
            cumulative[0]
        } else {
            cumulative[cumulative.len() - 1]
        };
        if total <= floor {
            break;
        }

        let next: Vec<f64> = cumulative
            .iter()
            .map(|&c| low + (high - low) * (c / total))
            .collect();

        let change = next
            .iter()
            .zip(&bg)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        bg = next;

        if change < settings.tolerance {
            log::debug!("shirley converged after {} iterations", iteration + 1);
            break;
        }
    }

    bg
}

/// Running sum, accumulated back to front when `reverse` is set.
fn cumulative_sum(values: &[f64], reverse: bool) -> Vec<f64> {
    let mut out = vec![0.0; values.len()];
    let mut acc = 0.0;
    if reverse {
        for (slot, &v) in out.iter_mut().zip(values).rev() {
            acc += v;
            *slot = acc;
        }
    } else {
        for (slot, &v) in out.iter_mut().zip(values) {
            acc += v;
            *slot = acc;
        }
    }
    out
}

fn linspace(from: f64, to: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![from],
        _ => {
            let step = (to - from) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { to } else { from + step * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// A descending BE axis with a peak on a Shirley-like step.
    fn synthetic_c1s() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..=300).map(|i| 300.0 - i as f64 * 0.1).collect();
        let y = x
            .iter()
            .map(|&xi| {
                let peak = 1000.0 * (-(xi - 285.0).powi(2) / (2.0 * 0.7_f64.powi(2))).exp();
                let step = 200.0 / (1.0 + ((285.0 - xi) / 0.7).exp());
                100.0 + step + peak
            })
            .collect();
        (x, y)
    }

    #[test]
    fn linear_region_is_a_fixed_point() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 10.0 + 3.0 * xi).collect();

        let bl = shirley_background(&x, &y, Some((x[0], x[49])), &ShirleySettings::default());
        for (bi, yi) in bl.values.iter().zip(&y) {
            assert_abs_diff_eq!(*bi, *yi, epsilon = 1e-9);
        }
    }

    #[test]
    fn endpoints_are_preserved_and_outside_is_flat() {
        let (x, y) = synthetic_c1s();
        let bl = shirley_background(&x, &y, Some((280.0, 292.0)), &ShirleySettings::default());
        assert_eq!(bl.values.len(), x.len());

        let (start, end) = snapped_range(&x, (280.0, 292.0)).unwrap();
        assert_abs_diff_eq!(bl.values[start], y[start], epsilon = 1e-9);
        assert_abs_diff_eq!(bl.values[end], y[end], epsilon = 1e-9);
        assert!(bl.values[..start].iter().all(|&v| v == bl.values[start]));
        assert!(bl.values[end..].iter().all(|&v| v == bl.values[end]));
        assert!(bl.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn background_is_monotonic_between_unequal_endpoints() {
        let (x, y) = synthetic_c1s();
        let bl = shirley_background(&x, &y, Some((280.0, 292.0)), &ShirleySettings::default());
        let (start, end) = snapped_range(&x, (280.0, 292.0)).unwrap();
        // high BE side (start) carries the step
        assert!(bl.values[start] > bl.values[end]);
        for w in bl.values[start..=end].windows(2) {
            assert!(w[0] >= w[1] - 1e-9);
        }
    }

    #[test]
    fn auto_region_brackets_the_peak() {
        let (x, y) = synthetic_c1s();
        let (lo, hi) = auto_region(&x, &y, &ShirleySettings::default()).unwrap();
        assert!(lo < 285.0 && hi > 285.0);
        assert!(lo > 274.9 && hi < 295.1);
    }

    #[test]
    fn empty_side_falls_back_to_fixed_width() {
        // peak at the highest energy: nothing on the high side
        let x: Vec<f64> = (0..=40).map(|i| 290.0 - i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|&xi| xi - 270.0).collect();
        let (_, hi) = auto_region(&x, &y, &ShirleySettings::default()).unwrap();
        assert_eq!(hi, 295.0);
    }

    #[test]
    fn tiny_region_interpolates_linearly() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [4.0, 9.0, 8.0, 1.0];
        let bl = shirley_background(&x, &y, Some((1.0, 2.0)), &ShirleySettings::default());
        assert_eq!(bl.values.len(), 4);
        assert_abs_diff_eq!(bl.values[0], 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bl.values[3], 8.0, epsilon = 1e-12);
    }

    #[test]
    fn flat_signal_stops_immediately() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y = vec![5.0; 10];
        let bl = shirley_background(&x, &y, None, &ShirleySettings::default());
        assert!(bl.values.iter().all(|&v| v == 5.0));
    }
}
