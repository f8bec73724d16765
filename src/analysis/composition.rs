//! Atomic composition from Shirley-corrected peak areas.

use super::integrate::integrate_area;
use super::shirley::{shirley_background, ShirleySettings};
use crate::data::model::{SensitivityTable, SpectralDataset};

/// Composition entry for one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementShare {
    pub tag: String,
    /// `None` when the tag has no usable sensitivity factor.
    pub rsf: Option<f64>,
    /// Area above the Shirley background. 0 for excluded tags.
    pub raw_area: f64,
    /// `raw_area / rsf`.
    pub normalized_area: f64,
    pub atomic_percent: f64,
}

impl ElementShare {
    /// Whether this spectrum takes part in the normalisation.
    pub fn qualifies(&self) -> bool {
        self.rsf.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionResult {
    /// One entry per spectrum, in dataset order.
    pub shares: Vec<ElementShare>,
}

impl CompositionResult {
    /// First entry with the given tag.
    pub fn get(&self, tag: &str) -> Option<&ElementShare> {
        self.shares.iter().find(|s| s.tag == tag)
    }

    pub fn percent(&self, tag: &str) -> Option<f64> {
        self.get(tag).map(|s| s.atomic_percent)
    }

    pub fn total_normalized(&self) -> f64 {
        self.shares.iter().map(|s| s.normalized_area).sum()
    }
}

/// Atomic percentages of every spectrum that has a sensitivity factor.
///
/// Each qualifying spectrum is integrated above its automatic Shirley
/// background and divided by its RSF. The others are reported with 0 %.
pub fn atomic_composition(
    dataset: &SpectralDataset,
    table: &SensitivityTable,
    shirley: &ShirleySettings,
) -> CompositionResult {
    let mut shares: Vec<ElementShare> = dataset
        .spectra
        .iter()
        .map(|sp| {
            let rsf = table.rsf(&sp.tag);
            let raw_area = match rsf {
                Some(_) => {
                    let bg = shirley_background(&sp.x, &sp.y, None, shirley);
                    integrate_area(&sp.x, &sp.y, &bg.values, bg.region())
                }
                None => 0.0,
            };
            ElementShare {
                tag: sp.tag.clone(),
                rsf,
                raw_area,
                normalized_area: rsf.map(|f| raw_area / f).unwrap_or(0.0),
                atomic_percent: 0.0,
            }
        })
        .collect();

    let total: f64 = shares
        .iter()
        .filter(|s| s.qualifies())
        .map(|s| s.normalized_area)
        .sum();

    if total > 0.0 {
        for share in shares.iter_mut().filter(|s| s.qualifies()) {
            share.atomic_percent = share.normalized_area / total * 100.0;
        }
    } else {
        log::warn!("no positive RSF-weighted area, composition is all zero");
    }

    CompositionResult { shares }
}
