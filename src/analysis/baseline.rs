//! Background curves and the straight-line baseline.

use super::extremum::argmax;
use super::integrate::nearest_index;

/// Half width of the automatic region around the main peak.
pub const AUTO_HALF_WIDTH: f64 = 5.0;

/// A background curve aligned with its spectrum, plus the region it was
/// resolved over.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    /// One value per sample of the source spectrum.
    pub values: Vec<f64>,
    pub x_min: f64,
    pub x_max: f64,
}

impl Baseline {
    pub fn region(&self) -> (f64, f64) {
        (self.x_min, self.x_max)
    }

    /// `y - background` clamped at zero, the signal that peaks are fitted to.
    pub fn subtract_from(&self, y: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(&self.values)
            .map(|(&yi, &bi)| (yi - bi).max(0.0))
            .collect()
    }
}

/// Straight line through the samples nearest to the two bounds.
///
/// `None` selects the main peak ± [`AUTO_HALF_WIDTH`]. The returned line
/// covers the whole axis.
pub fn linear_baseline(x: &[f64], y: &[f64], bounds: Option<(f64, f64)>) -> Baseline {
    let (x_min, x_max) = match bounds {
        Some(b) => b,
        None => match argmax(y) {
            Some(i) => (x[i] - AUTO_HALF_WIDTH, x[i] + AUTO_HALF_WIDTH),
            None => (0.0, 0.0),
        },
    };

    let (Some(i1), Some(i2)) = (nearest_index(x, x_min), nearest_index(x, x_max)) else {
        return Baseline {
            values: Vec::new(),
            x_min,
            x_max,
        };
    };

    let (x1, y1) = (x[i1], y[i1]);
    let (x2, y2) = (x[i2], y[i2]);
    let (slope, intercept) = if x2 == x1 {
        (0.0, y1)
    } else {
        let slope = (y2 - y1) / (x2 - x1);
        (slope, y1 - slope * x1)
    };

    Baseline {
        values: x.iter().map(|&xi| slope * xi + intercept).collect(),
        x_min,
        x_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn line_through_snapped_points() {
        let x: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 2.0 * xi + 1.0 + if xi == 5.0 { 10.0 } else { 0.0 }).collect();

        let line = linear_baseline(&x, &y, Some((1.2, 8.9)));
        assert_eq!(line.region(), (1.2, 8.9));
        for (xi, bi) in x.iter().zip(&line.values) {
            assert_relative_eq!(*bi, 2.0 * xi + 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn coincident_bounds_give_flat_line() {
        let x = [0.0, 1.0, 2.0];
        let y = [3.0, 7.0, 4.0];
        let line = linear_baseline(&x, &y, Some((1.1, 0.9)));
        assert_eq!(line.values, vec![7.0; 3]);
    }

    #[test]
    fn auto_bounds_surround_the_peak() {
        let x: Vec<f64> = (0..=40).map(|i| 280.0 + i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 100.0 - (xi - 290.0).abs()).collect();
        let line = linear_baseline(&x, &y, None);
        assert_eq!(line.region(), (285.0, 295.0));
        assert_relative_eq!(line.values[0], 95.0, epsilon = 1e-12);
    }

    #[test]
    fn subtraction_clamps_at_zero() {
        let bl = Baseline { values: vec![1.0, 5.0], x_min: 0.0, x_max: 1.0 };
        assert_eq!(bl.subtract_from(&[3.0, 2.0]), vec![2.0, 0.0]);
    }
}
