//! Decomposition of a background-free region into pseudo-Voigt components.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::extremum::argmax;
use super::integrate::{energy_domain, nearest_index, trapezoid};
use super::lineshape::{decode_params, multi_peak, PseudoVoigt, PARAMS_PER_PEAK};
use super::solver::{minimize, Bounds, SolverError, SolverSettings};

/// Center freedom used when a peak has no explicit error, in eV.
pub const FIXED_CENTER_TOLERANCE: f64 = 0.5;
/// FWHM may shrink or grow by this fraction when no explicit error is given.
pub const FIXED_FWHM_FRACTION: f64 = 0.5;
/// Starting Gaussian/Lorentzian mix.
pub const INITIAL_MIX: f64 = 0.3;
/// Lower limit for any FWHM bound.
const MIN_FWHM: f64 = 1e-6;

/// How far a component may move away from its configured shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    /// ±[`FIXED_CENTER_TOLERANCE`] eV and ±[`FIXED_FWHM_FRACTION`] of the width.
    Fixed,
    Explicit { center_error: f64, fwhm_error: f64 },
}

/// Configuration of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSpec {
    pub name: String,
    pub center: f64,
    pub fwhm: f64,
    pub tolerance: Tolerance,
}

impl PeakSpec {
    pub fn new(name: impl Into<String>, center: f64, fwhm: f64, tolerance: Tolerance) -> Self {
        PeakSpec {
            name: name.into(),
            center,
            fwhm,
            tolerance,
        }
    }

    pub fn center_bounds(&self) -> (f64, f64) {
        let err = match self.tolerance {
            Tolerance::Fixed => FIXED_CENTER_TOLERANCE,
            Tolerance::Explicit { center_error, .. } => center_error,
        };
        (self.center - err, self.center + err)
    }

    pub fn fwhm_bounds(&self) -> (f64, f64) {
        let err = match self.tolerance {
            Tolerance::Fixed => self.fwhm * FIXED_FWHM_FRACTION,
            Tolerance::Explicit { fwhm_error, .. } => fwhm_error,
        };
        ((self.fwhm - err).max(MIN_FWHM), self.fwhm + err)
    }

    fn check(&self, domain: (f64, f64)) -> Result<(), FitError> {
        let invalid = |reason: String| FitError::InvalidPeak {
            name: self.name.clone(),
            reason,
        };
        let (lo, hi) = domain;
        if !(lo..=hi).contains(&self.center) {
            return Err(invalid(format!(
                "center {} outside {lo}..{hi} eV",
                self.center
            )));
        }
        if !(self.fwhm > 0.0 && self.fwhm <= hi - lo) {
            return Err(invalid(format!("FWHM {} outside 0..{}", self.fwhm, hi - lo)));
        }
        if let Tolerance::Explicit {
            center_error,
            fwhm_error,
        } = self.tolerance
        {
            if !(center_error >= 0.0 && fwhm_error >= 0.0) {
                return Err(invalid("negative error bound".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    /// Regions with fewer samples are not fitted.
    pub min_points: usize,
    #[serde(flatten)]
    pub solver: SolverSettings,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            min_points: 5,
            solver: SolverSettings::default(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("x has {x} values but y has {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("{points} samples, at least {required} needed")]
    InsufficientData { points: usize, required: usize },
    #[error("no peaks to fit")]
    NoPeaks,
    #[error("peak {name}: {reason}")]
    InvalidPeak { name: String, reason: String },
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// One fitted component.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPeak {
    pub name: String,
    pub amplitude: f64,
    pub center: f64,
    pub fwhm: f64,
    /// 0 = Gaussian, 1 = Lorentzian.
    pub mix: f64,
    /// The component alone, sampled on the fitted axis.
    pub curve: Vec<f64>,
    pub area: f64,
    /// Share of the summed component areas, in percent.
    pub ratio: f64,
}

impl FittedPeak {
    pub fn shape(&self) -> PseudoVoigt {
        PseudoVoigt {
            amplitude: self.amplitude,
            center: self.center,
            fwhm: self.fwhm,
            mix: self.mix,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Energy axis the fit was made on.
    pub x: Vec<f64>,
    pub peaks: Vec<FittedPeak>,
    /// Sum of all components.
    pub total: Vec<f64>,
    /// Half the sum of squared residuals at the solution.
    pub cost: f64,
    pub evaluations: usize,
}

impl FitResult {
    /// Sum of all components on another axis.
    pub fn total_on(&self, x: &[f64]) -> Vec<f64> {
        let shapes: Vec<PseudoVoigt> = self.peaks.iter().map(FittedPeak::shape).collect();
        multi_peak(x, &shapes)
    }
}

/// What happened when a region was offered for decomposition.
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    /// No components are configured for this spectrum.
    NotAttempted,
    Failed(FitError),
    Fitted(FitResult),
}

impl FitOutcome {
    pub fn fitted(&self) -> Option<&FitResult> {
        match self {
            FitOutcome::Fitted(result) => Some(result),
            _ => None,
        }
    }
}

/// Fit `specs` to the background-free curve `(x, y)`.
pub fn fit_peaks(
    x: &[f64],
    y: &[f64],
    specs: &[PeakSpec],
    settings: &FitSettings,
) -> Result<FitResult, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < settings.min_points {
        return Err(FitError::InsufficientData {
            points: x.len(),
            required: settings.min_points,
        });
    }
    if specs.is_empty() {
        return Err(FitError::NoPeaks);
    }

    let Some(domain) = energy_domain(x) else {
        return Err(FitError::InsufficientData {
            points: 0,
            required: settings.min_points.max(1),
        });
    };
    for spec in specs {
        spec.check(domain)?;
    }

    let (initial, bounds) = initial_guess(x, y, specs);

    let model = |p: &DVector<f64>| {
        let shapes = decode_params(p.as_slice());
        DVector::from_iterator(
            x.len(),
            x.iter()
                .zip(y)
                .map(|(&xi, &yi)| shapes.iter().map(|s| s.eval(xi)).sum::<f64>() - yi),
        )
    };

    let solution = minimize(&model, &initial, &bounds, &settings.solver)?;
    log::debug!(
        "fitted {} components: cost={:.4e}, {} evaluations",
        specs.len(),
        solution.cost,
        solution.evaluations
    );

    let shapes = decode_params(&solution.params);
    let mut peaks: Vec<FittedPeak> = specs
        .iter()
        .zip(&shapes)
        .map(|(spec, shape)| {
            let curve = shape.curve(x);
            let area = trapezoid(x, &curve).abs();
            FittedPeak {
                name: spec.name.clone(),
                amplitude: shape.amplitude,
                center: shape.center,
                fwhm: shape.fwhm,
                mix: shape.mix,
                curve,
                area,
                ratio: 0.0,
            }
        })
        .collect();

    let total_area: f64 = peaks.iter().map(|p| p.area).sum();
    if total_area > 0.0 {
        for peak in &mut peaks {
            peak.ratio = peak.area / total_area * 100.0;
        }
    }

    Ok(FitResult {
        x: x.to_vec(),
        total: multi_peak(x, &shapes),
        peaks,
        cost: solution.cost,
        evaluations: solution.evaluations,
    })
}

/// Like [`fit_peaks`], but failures become a [`FitOutcome`] instead of an
/// error so a batch can carry on.
pub fn fit_outcome(x: &[f64], y: &[f64], specs: &[PeakSpec], settings: &FitSettings) -> FitOutcome {
    if specs.is_empty() {
        return FitOutcome::NotAttempted;
    }
    match fit_peaks(x, y, specs, settings) {
        Ok(result) => FitOutcome::Fitted(result),
        Err(e) => {
            log::warn!("peak fit failed: {e}");
            FitOutcome::Failed(e)
        }
    }
}

/// Seeds and box constraints in `[amp, center, fwhm, mix]` order.
fn initial_guess(x: &[f64], y: &[f64], specs: &[PeakSpec]) -> (Vec<f64>, Bounds) {
    let half_max = argmax(y).map(|i| y[i] * 0.5).unwrap_or(0.0).max(0.0);

    let mut initial = Vec::with_capacity(specs.len() * PARAMS_PER_PEAK);
    let mut lower = Vec::with_capacity(specs.len() * PARAMS_PER_PEAK);
    let mut upper = Vec::with_capacity(specs.len() * PARAMS_PER_PEAK);

    for spec in specs {
        let observed = nearest_index(x, spec.center).map(|i| y[i]).unwrap_or(0.0);
        let amplitude = if observed > 0.0 { observed } else { half_max };
        let (c_lo, c_hi) = spec.center_bounds();
        let (w_lo, w_hi) = spec.fwhm_bounds();

        initial.extend([amplitude, spec.center, spec.fwhm, INITIAL_MIX]);
        lower.extend([0.0, c_lo, w_lo, 0.0]);
        upper.extend([f64::INFINITY, c_hi, w_hi, 1.0]);
    }

    (initial, Bounds { lower, upper })
}
