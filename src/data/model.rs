use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Spectrum – one labelled energy/intensity curve
// ---------------------------------------------------------------------------

/// A single XPS region (one block of the instrument export).
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Element / orbital label, e.g. `"C1s"`.
    pub tag: String,
    /// Binding energy axis (x) in eV. Either sort direction is allowed.
    pub x: Vec<f64>,
    /// Intensity axis (y) – same length as `x`.
    pub y: Vec<f64>,
}

impl Spectrum {
    pub fn new(tag: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Spectrum {
            tag: tag.into(),
            x,
            y,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// A copy with `shift` added to every energy; intensities untouched.
    pub fn shifted(&self, shift: f64) -> Spectrum {
        Spectrum {
            tag: self.tag.clone(),
            x: self.x.iter().map(|&xi| xi + shift).collect(),
            y: self.y.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpectralDataset – every region of one measurement
// ---------------------------------------------------------------------------

/// The full parsed dataset with a pre-computed tag index.
#[derive(Debug, Clone, Default)]
pub struct SpectralDataset {
    /// All spectra in file order.
    pub spectra: Vec<Spectrum>,
    /// tag → position of the first spectrum carrying it.
    tag_index: BTreeMap<String, usize>,
}

impl SpectralDataset {
    /// Build the tag index from the loaded spectra.
    pub fn from_spectra(spectra: Vec<Spectrum>) -> Self {
        let mut tag_index = BTreeMap::new();
        for (i, sp) in spectra.iter().enumerate() {
            tag_index.entry(sp.tag.clone()).or_insert(i);
        }
        SpectralDataset { spectra, tag_index }
    }

    /// Number of spectra.
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// First spectrum with the given tag.
    pub fn get(&self, tag: &str) -> Option<&Spectrum> {
        self.tag_index.get(tag).map(|&i| &self.spectra[i])
    }

    /// Tags in file order (duplicates kept).
    pub fn tags(&self) -> Vec<&str> {
        self.spectra.iter().map(|sp| sp.tag.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// SensitivityTable – relative sensitivity factors per tag
// ---------------------------------------------------------------------------

/// One row of the RSF settings file: `{ "level": "C1s", "rsf": 0.314 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsfEntry {
    pub level: String,
    pub rsf: f64,
}

/// tag → RSF. Tags with a missing or non-positive factor are excluded from
/// composition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensitivityTable {
    factors: BTreeMap<String, f64>,
}

impl SensitivityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later entries override earlier ones with the same level.
    pub fn from_entries(entries: &[RsfEntry]) -> Self {
        let factors = entries
            .iter()
            .map(|e| (e.level.clone(), e.rsf))
            .collect();
        SensitivityTable { factors }
    }

    pub fn insert(&mut self, tag: impl Into<String>, rsf: f64) {
        self.factors.insert(tag.into(), rsf);
    }

    /// The factor for `tag`, only when it qualifies (finite and > 0).
    pub fn rsf(&self, tag: &str) -> Option<f64> {
        self.factors
            .get(tag)
            .copied()
            .filter(|&r| r.is_finite() && r > 0.0)
    }
}
