//! CSV output of an [`AnalysisReport`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::analysis::fitting::FitOutcome;
use crate::pipeline::{AnalysisReport, TagAnalysis};

pub const SUMMARY_FILE: &str = "summary.csv";

const COMPOSITION_HEADER: [&str; 5] = ["Spectrum", "RSF", "Raw Area", "Normalized Area", "Atomic %"];
const FIT_HEADER: [&str; 6] = [
    "Spectrum",
    "Component Name",
    "Area Ratio (%)",
    "Position (eV)",
    "FWHM (eV)",
    "Area",
];

/// Write one table per spectrum plus [`SUMMARY_FILE`] into `dir`, creating
/// it if needed. Returns the written paths.
pub fn write_report(dir: &Path, report: &AnalysisReport) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = Vec::with_capacity(report.spectra.len() + 1);
    for (i, analysis) in report.spectra.iter().enumerate() {
        let path = dir.join(format!("{}_{}.csv", i + 1, file_safe(&analysis.spectrum.tag)));
        write_spectrum_table(&path, analysis)
            .with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }

    let summary = dir.join(SUMMARY_FILE);
    write_summary(&summary, report).with_context(|| format!("writing {}", summary.display()))?;
    written.push(summary);

    log::info!("Wrote {} report files to {}", written.len(), dir.display());
    Ok(written)
}

fn file_safe(tag: &str) -> String {
    tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() || "-_().".contains(c) { c } else { '_' })
        .collect()
}

/// Energy, raw data and background, then the fit on top of the background
/// when there is one.
fn write_spectrum_table(path: &Path, analysis: &TagAnalysis) -> Result<()> {
    let sp = &analysis.spectrum;
    let bg = &analysis.background.values;
    let fit = analysis.fit.fitted();

    let mut header = vec![
        "Binding Energy (eV)".to_string(),
        "Raw Intensity".to_string(),
        "Background".to_string(),
    ];
    let mut columns: Vec<Vec<f64>> = Vec::new();
    if let Some(fit) = fit {
        header.push("Total Fit".to_string());
        columns.push(
            fit.total_on(&sp.x)
                .iter()
                .zip(bg)
                .map(|(t, b)| t + b)
                .collect(),
        );
        for peak in &fit.peaks {
            header.push(format!("Comp: {}", peak.name));
            let shape = peak.shape();
            columns.push(sp.x.iter().zip(bg).map(|(&x, b)| shape.eval(x) + b).collect());
        }
    }

    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&header)?;
    for i in 0..sp.len() {
        let mut row = vec![
            format!("{:.4}", sp.x[i]),
            format!("{:.6}", sp.y[i]),
            bg.get(i).map(|b| format!("{b:.6}")).unwrap_or_default(),
        ];
        row.extend(columns.iter().map(|c| c.get(i).map(|v| format!("{v:.6}")).unwrap_or_default()));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_summary(path: &Path, report: &AnalysisReport) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_path(path)?;

    wtr.write_record(COMPOSITION_HEADER)?;
    for share in &report.composition.shares {
        wtr.write_record(&[
            share.tag.clone(),
            share.rsf.map(|r| format!("{r}")).unwrap_or_default(),
            format!("{:.6}", share.raw_area),
            format!("{:.6}", share.normalized_area),
            format!("{:.4}", share.atomic_percent),
        ])?;
    }

    wtr.write_record([""; FIT_HEADER.len()])?;

    wtr.write_record(FIT_HEADER)?;
    for analysis in &report.spectra {
        if let FitOutcome::Fitted(fit) = &analysis.fit {
            for peak in &fit.peaks {
                wtr.write_record(&[
                    analysis.spectrum.tag.clone(),
                    peak.name.clone(),
                    format!("{:.4}", peak.ratio),
                    format!("{:.4}", peak.center),
                    format!("{:.4}", peak.fwhm),
                    format!("{:.6}", peak.area),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
