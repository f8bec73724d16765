//! Charge correction of the binding-energy axis.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::extremum::argmax;
use crate::data::model::SpectralDataset;

/// The line whose peak position defines the shift.
pub const REFERENCE_TAG: &str = "C1s";

/// Window and reference energy used to find the shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeShiftSettings {
    /// Literature position of the reference peak in eV.
    pub standard: f64,
    pub x_min: f64,
    pub x_max: f64,
}

impl Default for ChargeShiftSettings {
    fn default() -> Self {
        Self {
            standard: 284.4,
            x_min: 280.0,
            x_max: 290.0,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChargeShiftError {
    #[error("reference tag {0} not found")]
    MissingReferenceTag(String),
    #[error("no {tag} samples between {x_min} and {x_max} eV")]
    EmptySearchWindow { tag: String, x_min: f64, x_max: f64 },
}

/// Result of [`correct_charge`]. On failure `shift` is 0 and `dataset` is an
/// unshifted copy.
#[derive(Debug, Clone)]
pub struct ChargeCorrection {
    pub dataset: SpectralDataset,
    pub shift: f64,
    pub error: Option<ChargeShiftError>,
}

/// `standard - position of the strongest reference sample in the window`.
pub fn find_charge_shift(
    dataset: &SpectralDataset,
    settings: &ChargeShiftSettings,
) -> Result<f64, ChargeShiftError> {
    let reference = dataset
        .get(REFERENCE_TAG)
        .ok_or_else(|| ChargeShiftError::MissingReferenceTag(REFERENCE_TAG.to_string()))?;

    let (wx, wy): (Vec<f64>, Vec<f64>) = reference
        .x
        .iter()
        .zip(&reference.y)
        .filter(|&(&xi, _)| xi >= settings.x_min && xi <= settings.x_max)
        .map(|(&xi, &yi)| (xi, yi))
        .unzip();

    let peak = argmax(&wy).ok_or_else(|| ChargeShiftError::EmptySearchWindow {
        tag: REFERENCE_TAG.to_string(),
        x_min: settings.x_min,
        x_max: settings.x_max,
    })?;

    Ok(settings.standard - wx[peak])
}

/// Shift every spectrum, the reference included, by the charge shift.
pub fn correct_charge(dataset: &SpectralDataset, settings: &ChargeShiftSettings) -> ChargeCorrection {
    match find_charge_shift(dataset, settings) {
        Ok(shift) => {
            log::info!("charge shift {shift:+.3} eV from {REFERENCE_TAG}");
            let spectra = dataset.spectra.iter().map(|sp| sp.shifted(shift)).collect();
            ChargeCorrection {
                dataset: SpectralDataset::from_spectra(spectra),
                shift,
                error: None,
            }
        }
        Err(e) => {
            log::warn!("charge correction skipped: {e}");
            ChargeCorrection {
                dataset: dataset.clone(),
                shift: 0.0,
                error: Some(e),
            }
        }
    }
}
