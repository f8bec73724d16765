//! Analysis settings file.
//!
//! Everything is optional in JSON; missing sections fall back to
//! [`AnalysisSettings::default`].

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::analysis::charge::ChargeShiftSettings;
use crate::analysis::fitting::{FitSettings, PeakSpec, Tolerance};
use crate::analysis::shirley::ShirleySettings;
use crate::data::model::{RsfEntry, SensitivityTable};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("peak {id} ({level} {name}): {field} must be positive, got {value}")]
    NonPositive {
        id: String,
        level: String,
        name: String,
        field: &'static str,
        value: f64,
    },
    #[error("peak {id} ({level} {name}): {field} must not be negative, got {value}")]
    NegativeError {
        id: String,
        level: String,
        name: String,
        field: &'static str,
        value: f64,
    },
}

/// One configured fit component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDefinition {
    /// Free-form row label; numbers in JSON are read as their text.
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    /// Spectrum tag this component belongs to.
    pub level: String,
    pub name: String,
    pub center: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_error: Option<f64>,
    #[serde(rename = "FWHM")]
    pub fwhm: f64,
    #[serde(rename = "FWHM_error", default, skip_serializing_if = "Option::is_none")]
    pub fwhm_error: Option<f64>,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "id must be a string or a number, got {other}"
        ))),
    }
}

impl PeakDefinition {
    fn new(
        id: &str,
        level: &str,
        name: &str,
        center: f64,
        center_error: f64,
        fwhm: f64,
        fwhm_error: f64,
    ) -> Self {
        PeakDefinition {
            id: id.to_string(),
            level: level.to_string(),
            name: name.to_string(),
            center,
            center_error: Some(center_error),
            fwhm,
            fwhm_error: Some(fwhm_error),
        }
    }

    /// Explicit bounds only when both errors are given.
    pub fn to_spec(&self) -> PeakSpec {
        let tolerance = match (self.center_error, self.fwhm_error) {
            (Some(center_error), Some(fwhm_error)) => Tolerance::Explicit {
                center_error,
                fwhm_error,
            },
            _ => Tolerance::Fixed,
        };
        PeakSpec::new(self.name.clone(), self.center, self.fwhm, tolerance)
    }

    /// Rows with neither a level nor a name are unused editor lines.
    fn is_blank(&self) -> bool {
        self.level.trim().is_empty() && self.name.trim().is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.is_blank() {
            return Ok(());
        }
        let non_positive = |field, value| ConfigError::NonPositive {
            id: self.id.clone(),
            level: self.level.clone(),
            name: self.name.clone(),
            field,
            value,
        };
        let negative = |field, value| ConfigError::NegativeError {
            id: self.id.clone(),
            level: self.level.clone(),
            name: self.name.clone(),
            field,
            value,
        };

        if !(self.center > 0.0) {
            return Err(non_positive("center", self.center));
        }
        if !(self.fwhm > 0.0) {
            return Err(non_positive("FWHM", self.fwhm));
        }
        if let Some(e) = self.center_error.filter(|e| !(*e >= 0.0)) {
            return Err(negative("center_error", e));
        }
        if let Some(e) = self.fwhm_error.filter(|e| !(*e >= 0.0)) {
            return Err(negative("FWHM_error", e));
        }
        Ok(())
    }
}

/// Complete analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub charge_shift: ChargeShiftSettings,
    pub shirley: ShirleySettings,
    pub fit: FitSettings,
    pub rsf: Vec<RsfEntry>,
    pub peaks: Vec<PeakDefinition>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            charge_shift: ChargeShiftSettings::default(),
            shirley: ShirleySettings::default(),
            fit: FitSettings::default(),
            rsf: default_rsf(),
            peaks: default_peaks(),
        }
    }
}

fn default_rsf() -> Vec<RsfEntry> {
    [("C1s", 0.314), ("O1s", 0.733), ("Cu2p3", 2.626)]
        .into_iter()
        .map(|(level, rsf)| RsfEntry {
            level: level.to_string(),
            rsf,
        })
        .collect()
}

fn default_peaks() -> Vec<PeakDefinition> {
    vec![
        PeakDefinition::new("1", "C1s", "C-C", 284.8, 0.5, 1.0, 0.3),
        PeakDefinition::new("2", "C1s", "C-O", 286.3, 0.8, 1.2, 0.4),
        PeakDefinition::new("3", "C1s", "C=O", 288.0, 0.8, 1.2, 0.4),
        PeakDefinition::new("4", "O1s", "Cu-O", 529.8, 0.6, 1.1, 0.3),
        PeakDefinition::new("5", "O1s", "O-H", 531.5, 0.8, 1.3, 0.4),
        PeakDefinition::new("6", "O1s", "C-O", 533.0, 0.8, 1.3, 0.4),
        PeakDefinition::new("7", "Cu2p3", "Cu2O", 932.6, 0.4, 1.1, 0.3),
        PeakDefinition::new("8", "Cu2p3", "Cu", 932.7, 0.4, 1.1, 0.3),
        PeakDefinition::new("9", "Cu2p3", "CuO", 933.8, 0.8, 1.8, 0.6),
        PeakDefinition::new("10", "Cu2p3", "Cu(OH)2", 935.0, 0.8, 1.8, 0.6),
    ]
}

impl AnalysisSettings {
    /// Read and validate a JSON settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        let settings: AnalysisSettings = serde_json::from_str(&text)
            .with_context(|| format!("parsing settings {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        log::info!(
            "Loaded settings from {}: {} peak definitions, {} RSF entries",
            path.display(),
            settings.peaks.len(),
            settings.rsf.len()
        );
        Ok(settings)
    }

    /// Write the settings as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serialising settings")?;
        std::fs::write(path, text).with_context(|| format!("writing settings {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.peaks.iter().try_for_each(PeakDefinition::validate)
    }

    pub fn sensitivity_table(&self) -> SensitivityTable {
        SensitivityTable::from_entries(&self.rsf)
    }

    /// Fit components configured for `tag`, in file order.
    pub fn peaks_for(&self, tag: &str) -> Vec<PeakSpec> {
        self.peaks
            .iter()
            .filter(|p| p.level == tag)
            .map(PeakDefinition::to_spec)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_standard_peak_table() {
        let settings = AnalysisSettings::default();
        assert!(settings.validate().is_ok());
        let rsf = settings.sensitivity_table();
        assert_eq!(rsf.rsf("C1s"), Some(0.314));
        assert_eq!(rsf.rsf("O1s"), Some(0.733));
        assert_eq!(rsf.rsf("Cu2p3"), Some(2.626));
        assert_eq!(settings.rsf.len(), 3);

        let c1s = settings.peaks_for("C1s");
        let names: Vec<&str> = c1s.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["C-C", "C-O", "C=O"]);
        assert_eq!(
            c1s[0].tolerance,
            Tolerance::Explicit { center_error: 0.5, fwhm_error: 0.3 }
        );
        assert_eq!(settings.peaks_for("Cu2p3").len(), 4);
        assert!(settings.peaks_for("N1s").is_empty());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{
            "charge_shift": { "standard": 285.0 },
            "rsf": [ { "level": "C1s", "rsf": 1.0 }, { "level": "O1s", "rsf": 2.93 } ],
            "peaks": [ { "level": "C1s", "name": "C-C", "center": 284.8, "FWHM": 1.1 } ]
        }"#;
        let settings: AnalysisSettings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.charge_shift.standard, 285.0);
        assert_eq!(settings.charge_shift.x_min, 280.0);
        assert_eq!(settings.shirley, ShirleySettings::default());
        assert_eq!(settings.fit.min_points, 5);
        assert_eq!(settings.sensitivity_table().rsf("O1s"), Some(2.93));

        let specs = settings.peaks_for("C1s");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].fwhm, 1.1);
        assert_eq!(specs[0].tolerance, Tolerance::Fixed);
    }

    #[test]
    fn solver_limits_are_flat_in_the_fit_section() {
        let json = r#"{ "fit": { "max_evaluations": 200, "min_points": 8 } }"#;
        let settings: AnalysisSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.fit.solver.max_evaluations, 200);
        assert_eq!(settings.fit.min_points, 8);
        assert_eq!(settings.fit.solver.ftol, 1e-12);
    }

    #[test]
    fn validate_rejects_bad_definitions() {
        let mut settings = AnalysisSettings::default();
        settings.peaks[0].fwhm = 0.0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::NonPositive { field: "FWHM", .. })
        ));

        let mut settings = AnalysisSettings::default();
        settings.peaks[2].center_error = Some(-0.1);
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::NegativeError { field: "center_error", .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = AnalysisSettings::default();
        settings.rsf.push(RsfEntry { level: "N1s".into(), rsf: 0.477 });
        settings.shirley.max_iterations = 80;
        settings.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"FWHM_error\""));

        let loaded = AnalysisSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn load_reports_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"peaks\": [ { \"level\": \"C1s\" } ] }").unwrap();
        assert!(AnalysisSettings::load(&path).is_err());
        assert!(AnalysisSettings::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn ids_may_be_strings_or_numbers() {
        let json = r#"{ "peaks": [
            { "id": "7", "level": "Cu2p3", "name": "Cu2O", "center": 932.6, "FWHM": 1.1 },
            { "id": 8, "level": "Cu2p3", "name": "Cu", "center": 932.7, "FWHM": 1.1 },
            { "level": "Cu2p3", "name": "CuO", "center": 933.8, "FWHM": 1.8 }
        ] }"#;
        let settings: AnalysisSettings = serde_json::from_str(json).unwrap();
        let ids: Vec<&str> = settings.peaks.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["7", "8", ""]);
        assert_eq!(AnalysisSettings::default().peaks[0].id, "1");

        let nested = r#"{ "peaks": [ { "id": [1], "level": "C1s", "name": "C-C", "center": 284.8, "FWHM": 1.0 } ] }"#;
        assert!(serde_json::from_str::<AnalysisSettings>(nested).is_err());
    }

    #[test]
    fn blank_rows_are_not_validated() {
        let json = r#"{ "peaks": [
            { "id": "1", "level": "C1s", "name": "C-C", "center": 284.8, "FWHM": 1.0 },
            { "id": "2", "level": " ", "name": "", "center": 0.0, "FWHM": 0.0 }
        ] }"#;
        let mut settings: AnalysisSettings = serde_json::from_str(json).unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.peaks_for("C1s").len(), 1);

        settings.peaks[1].name = "C-O".into();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::NonPositive { ref id, field: "center", .. }) if id == "2"
        ));
    }
}
