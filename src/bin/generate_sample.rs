use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use rusty_xps::analysis::lineshape::{multi_peak, PseudoVoigt};
use rusty_xps::data::model::Spectrum;

/// Apparent charging added to every binding energy.
const CHARGE_OFFSET: f64 = 5.6;

struct Region {
    tag: &'static str,
    /// Highest and lowest binding energy before charging.
    range: (f64, f64),
    step: f64,
    baseline: f64,
    /// Background rise on the high-BE side of the peaks, per unit peak height.
    step_fraction: f64,
    /// (amplitude, center, fwhm, mix)
    peaks: &'static [(f64, f64, f64, f64)],
}

const REGIONS: &[Region] = &[
    Region {
        tag: "C1s",
        range: (296.0, 278.0),
        step: 0.1,
        baseline: 120.0,
        step_fraction: 0.08,
        peaks: &[
            (2400.0, 284.8, 1.1, 0.3),
            (650.0, 286.3, 1.3, 0.35),
            (300.0, 288.0, 1.3, 0.4),
        ],
    },
    Region {
        tag: "O1s",
        range: (540.0, 524.0),
        step: 0.1,
        baseline: 300.0,
        step_fraction: 0.1,
        peaks: &[
            (3100.0, 529.8, 1.1, 0.3),
            (1800.0, 531.5, 1.3, 0.4),
            (500.0, 533.0, 1.3, 0.4),
        ],
    },
    Region {
        tag: "Cu2p3",
        range: (945.0, 925.0),
        step: 0.1,
        baseline: 900.0,
        step_fraction: 0.15,
        peaks: &[
            (5200.0, 932.6, 1.1, 0.3),
            (1400.0, 933.8, 1.8, 0.5),
            (700.0, 935.0, 1.8, 0.6),
        ],
    },
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Peaks on a flat baseline plus a smooth step under each peak, with
/// counting noise, on a descending charged axis.
fn synthesize(region: &Region, rng: &mut SimpleRng) -> Spectrum {
    let (high, low) = region.range;
    let n = ((high - low) / region.step).round() as usize + 1;
    let x: Vec<f64> = (0..n).map(|i| high - i as f64 * region.step).collect();

    let shapes: Vec<PseudoVoigt> = region
        .peaks
        .iter()
        .map(|&(amplitude, center, fwhm, mix)| PseudoVoigt {
            amplitude,
            center,
            fwhm,
            mix,
        })
        .collect();
    let signal = multi_peak(&x, &shapes);

    let y = x
        .iter()
        .zip(&signal)
        .map(|(&xi, &s)| {
            let step: f64 = shapes
                .iter()
                .map(|p| {
                    region.step_fraction * p.amplitude / (1.0 + ((p.center - xi) / (0.5 * p.fwhm)).exp())
                })
                .sum();
            let clean = region.baseline + step + s;
            (clean + rng.gauss(0.0, clean.sqrt())).max(0.0)
        })
        .collect();

    Spectrum::new(region.tag, x, y).shifted(CHARGE_OFFSET)
}

fn write_export(path: &str, spectra: &[Spectrum]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("creating {path}"))?;
    for sp in spectra {
        wtr.write_record([sp.tag.as_str()])?;
        for (x, y) in sp.x.iter().zip(&sp.y) {
            wtr.write_record(&[format!("{x:.2}"), format!("{y:.1}")])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn list_array(rows: impl Iterator<Item = Vec<f64>>) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(&row);
        builder.append(true);
    }
    builder.finish()
}

fn write_parquet(path: &str, spectra: &[Spectrum]) -> Result<()> {
    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("tag", DataType::Utf8, false),
        Field::new("x", DataType::List(item.clone()), false),
        Field::new("y", DataType::List(item), false),
    ]));

    let tags = StringArray::from(spectra.iter().map(|s| s.tag.as_str()).collect::<Vec<_>>());
    let x = list_array(spectra.iter().map(|s| s.x.clone()));
    let y = list_array(spectra.iter().map(|s| s.y.clone()));

    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(tags), Arc::new(x), Arc::new(y)])
        .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let spectra: Vec<Spectrum> = REGIONS.iter().map(|r| synthesize(r, &mut rng)).collect();

    let export_path = "sample_export.csv";
    write_export(export_path, &spectra)?;
    let parquet_path = "sample_spectra.parquet";
    write_parquet(parquet_path, &spectra)?;

    for sp in &spectra {
        log::info!("{}: {} points", sp.tag, sp.len());
    }
    println!(
        "Wrote {} regions (charged by +{CHARGE_OFFSET} eV) to {export_path} and {parquet_path}",
        spectra.len()
    );
    Ok(())
}
