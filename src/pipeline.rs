//! Full analysis of one dataset.

use crate::analysis::baseline::Baseline;
use crate::analysis::charge::{correct_charge, ChargeShiftError};
use crate::analysis::composition::{atomic_composition, CompositionResult};
use crate::analysis::fitting::{fit_outcome, FitOutcome};
use crate::analysis::integrate::snapped_range;
use crate::analysis::shirley::shirley_background;
use crate::config::AnalysisSettings;
use crate::data::model::{SpectralDataset, Spectrum};

/// Per-spectrum part of the report.
#[derive(Debug, Clone)]
pub struct TagAnalysis {
    /// The charge-corrected spectrum.
    pub spectrum: Spectrum,
    /// Automatic Shirley background, full length.
    pub background: Baseline,
    pub fit: FitOutcome,
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Applied to every energy axis; 0 when correction was skipped.
    pub charge_shift: f64,
    pub charge_error: Option<ChargeShiftError>,
    pub composition: CompositionResult,
    /// In dataset order.
    pub spectra: Vec<TagAnalysis>,
}

/// Charge correction, composition, then background and peak fit for each
/// spectrum. A failure in one spectrum never stops the others.
pub fn analyze(dataset: &SpectralDataset, settings: &AnalysisSettings) -> AnalysisReport {
    let corrected = correct_charge(dataset, &settings.charge_shift);
    analyze_corrected(
        &corrected.dataset,
        corrected.shift,
        corrected.error,
        settings,
    )
}

/// Same as [`analyze`] without touching the energy axis.
pub fn analyze_uncorrected(dataset: &SpectralDataset, settings: &AnalysisSettings) -> AnalysisReport {
    analyze_corrected(dataset, 0.0, None, settings)
}

fn analyze_corrected(
    dataset: &SpectralDataset,
    charge_shift: f64,
    charge_error: Option<ChargeShiftError>,
    settings: &AnalysisSettings,
) -> AnalysisReport {
    let composition = atomic_composition(dataset, &settings.sensitivity_table(), &settings.shirley);

    let spectra = dataset
        .spectra
        .iter()
        .map(|sp| analyze_spectrum(sp, settings))
        .collect();

    AnalysisReport {
        charge_shift,
        charge_error,
        composition,
        spectra,
    }
}

fn analyze_spectrum(spectrum: &Spectrum, settings: &AnalysisSettings) -> TagAnalysis {
    let background = shirley_background(&spectrum.x, &spectrum.y, None, &settings.shirley);
    let specs = settings.peaks_for(&spectrum.tag);

    let fit = if specs.is_empty() {
        FitOutcome::NotAttempted
    } else {
        match snapped_range(&spectrum.x, background.region()) {
            Some((start, end)) if background.values.len() == spectrum.len() => {
                let signal = background.subtract_from(&spectrum.y);
                log::debug!(
                    "{}: fitting {} components over {:.2}..{:.2} eV",
                    spectrum.tag,
                    specs.len(),
                    background.x_min,
                    background.x_max
                );
                fit_outcome(
                    &spectrum.x[start..=end],
                    &signal[start..=end],
                    &specs,
                    &settings.fit,
                )
            }
            _ => {
                log::warn!("{}: no background region to fit", spectrum.tag);
                fit_outcome(&[], &[], &specs, &settings.fit)
            }
        }
    };

    TagAnalysis {
        spectrum: spectrum.clone(),
        background,
        fit,
    }
}
