use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use rusty_xps::analysis::fitting::FitOutcome;
use rusty_xps::config::AnalysisSettings;
use rusty_xps::data::loader::load_file;
use rusty_xps::pipeline::{analyze, analyze_uncorrected};
use rusty_xps::report::write_report;

#[derive(Parser, Debug)]
#[command(author, version, about = "XPS quantification and peak fitting")]
struct Args {
    /// Instrument export (.csv/.txt/.asc), JSON or Parquet dataset
    #[arg(required_unless_present = "write_default_settings")]
    input: Option<PathBuf>,

    /// Analysis settings JSON; built-in defaults when omitted
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Directory for the CSV report
    #[arg(short, long, default_value = "xps_report")]
    output: PathBuf,

    /// Skip charge correction
    #[arg(long)]
    no_shift: bool,

    /// Write the default settings to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_default_settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(path) = &args.write_default_settings {
        AnalysisSettings::default().save(path)?;
        log::info!("Default settings written to {}", path.display());
        if args.input.is_none() {
            return Ok(());
        }
    }

    let settings = match &args.settings {
        Some(path) => AnalysisSettings::load(path)?,
        None => AnalysisSettings::default(),
    };

    let input = args.input.context("no input file given")?;
    let dataset = load_file(&input)?;

    let report = if args.no_shift {
        analyze_uncorrected(&dataset, &settings)
    } else {
        analyze(&dataset, &settings)
    };

    if report.charge_error.is_none() && !args.no_shift {
        log::info!("Charge shift: {:+.3} eV", report.charge_shift);
    }
    for share in &report.composition.shares {
        log::info!("{:>8}: {:6.2} at.%", share.tag, share.atomic_percent);
    }
    for analysis in &report.spectra {
        if let FitOutcome::Fitted(fit) = &analysis.fit {
            for peak in &fit.peaks {
                log::info!(
                    "{:>8} {:<10} {:8.3} eV  FWHM {:5.3}  {:6.2} %",
                    analysis.spectrum.tag,
                    peak.name,
                    peak.center,
                    peak.fwhm,
                    peak.ratio
                );
            }
        }
    }

    write_report(&args.output, &report)?;
    Ok(())
}
