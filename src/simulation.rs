//! Monte Carlo bands around a projected year-effect path
//!
//! Each projected value is treated as the mean of a normal distribution
//! truncated to `[lower, upper]`. Draws are taken by rejection from a seeded
//! generator so repeated runs give the same bands.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Quantiles reported for every year
pub const BAND_QUANTILES: [f64; 7] = [0.005, 0.025, 0.05, 0.5, 0.95, 0.975, 0.995];

const BAND_LABELS: [&str; 7] = ["p0.5", "p2.5", "p5", "p50", "p95", "p97.5", "p99.5"];

/// Rejections tolerated per accepted draw before the interval is deemed empty
const MAX_REJECTIONS_PER_DRAW: usize = 10_000;

/// Truncated-normal simulator for year effects
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearEffectSimulator {
    pub draws: usize,
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
    pub seed: u64,
}

/// Simulated percentiles for one year, in [`BAND_QUANTILES`] order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileBand {
    pub year: i32,
    pub mean: f64,
    pub percentiles: [f64; 7],
}

impl PercentileBand {
    pub fn median(&self) -> f64 {
        self.percentiles[3]
    }
}

impl YearEffectSimulator {
    pub fn new(draws: usize, std_dev: f64, lower: f64, upper: f64) -> Result<Self> {
        if draws == 0 {
            return Err(ForecastError::InvalidParameter {
                name: "draws",
                value: 0.0,
                reason: "at least one draw is required",
            });
        }
        if !(std_dev > 0.0 && std_dev.is_finite()) {
            return Err(ForecastError::InvalidParameter {
                name: "std_dev",
                value: std_dev,
                reason: "standard deviation must be positive and finite",
            });
        }
        if !(upper > lower) {
            return Err(ForecastError::InvalidParameter {
                name: "upper",
                value: upper,
                reason: "upper bound must exceed lower bound",
            });
        }
        Ok(Self {
            draws,
            std_dev,
            lower,
            upper,
            seed: 42,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Percentile bands for each (year, mean) pair of the path
    pub fn simulate(&self, years: &[i32], path: &[f64]) -> Result<Vec<PercentileBand>> {
        if years.len() != path.len() {
            return Err(ForecastError::shape(format!(
                "{} years but {} path values",
                years.len(),
                path.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        years
            .iter()
            .zip(path)
            .map(|(&year, &mean)| {
                let mut samples = self.draw(&mut rng, mean)?;
                samples.sort_by(f64::total_cmp);
                let mut percentiles = [0.0; 7];
                for (slot, &q) in percentiles.iter_mut().zip(BAND_QUANTILES.iter()) {
                    *slot = quantile(&samples, q);
                }
                log::debug!("year {}: median {:.4} around {:.4}", year, percentiles[3], mean);
                Ok(PercentileBand { year, mean, percentiles })
            })
            .collect()
    }

    fn draw(&self, rng: &mut StdRng, mean: f64) -> Result<Vec<f64>> {
        let normal = Normal::new(mean, self.std_dev).map_err(|_| ForecastError::InvalidParameter {
            name: "mean",
            value: mean,
            reason: "not a valid normal location",
        })?;

        let budget = self.draws.saturating_mul(MAX_REJECTIONS_PER_DRAW);
        let mut samples = Vec::with_capacity(self.draws);
        let mut attempts = 0usize;
        while samples.len() < self.draws {
            if attempts >= budget {
                return Err(ForecastError::InvalidParameter {
                    name: "mean",
                    value: mean,
                    reason: "truncation interval carries almost no probability mass",
                });
            }
            attempts += 1;
            let x = normal.sample(rng);
            if x >= self.lower && x <= self.upper {
                samples.push(x);
            }
        }
        Ok(samples)
    }
}

/// Linearly interpolated quantile of sorted data
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let below = position.floor() as usize;
            let above = (below + 1).min(n - 1);
            let fraction = position - below as f64;
            sorted[below] + fraction * (sorted[above] - sorted[below])
        }
    }
}

/// Load a `year,<value>...` CSV; `column` picks a value column by name,
/// otherwise the first one after `year` is used
pub fn load_path(path: &Path, column: Option<&str>) -> Result<(Vec<i32>, Vec<f64>)> {
    let file = File::open(path)?;
    read_path(file, column)
}

pub fn read_path<R: Read>(source: R, column: Option<&str>) -> Result<(Vec<i32>, Vec<f64>)> {
    let mut reader = csv::Reader::from_reader(source);
    let headers = reader.headers()?.clone();
    let index = match column {
        Some(name) => headers.iter().position(|h| h.trim() == name).ok_or_else(|| ForecastError::Parse {
            line: 1,
            message: format!("no column named '{}'", name),
        })?,
        None if headers.len() >= 2 => 1,
        None => {
            return Err(ForecastError::Parse {
                line: 1,
                message: "expected a year column and a value column".into(),
            })
        }
    };

    let mut years = Vec::new();
    let mut values = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let line = row + 2;
        let year = record[0].trim().parse::<i32>().map_err(|_| ForecastError::Parse {
            line,
            message: format!("invalid year '{}'", &record[0]),
        })?;
        let field = record.get(index).unwrap_or("");
        let value = field.trim().parse::<f64>().map_err(|_| ForecastError::Parse {
            line,
            message: format!("invalid value '{}'", field),
        })?;
        years.push(year);
        values.push(value);
    }
    Ok((years, values))
}

/// Write bands with one row per year and one column per quantile
pub fn write_bands(path: &Path, bands: &[PercentileBand]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = vec!["year".to_string(), "mean".to_string()];
    header.extend(BAND_LABELS.iter().map(|l| l.to_string()));
    writer.write_record(&header)?;

    for band in bands {
        let mut record = vec![band.year.to_string(), band.mean.to_string()];
        record.extend(band.percentiles.iter().map(|p| p.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(quantile(&sorted, 0.0), 1.0);
        assert_relative_eq!(quantile(&sorted, 0.25), 2.0);
        assert_relative_eq!(quantile(&sorted, 0.5), 3.0);
        assert_relative_eq!(quantile(&sorted, 0.995), 4.98, epsilon = 1e-12);
        assert_relative_eq!(quantile(&sorted, 1.0), 5.0);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_draws_respect_bounds() {
        let sim = YearEffectSimulator::new(5_000, 0.3, -0.32, 0.8).unwrap();
        let bands = sim.simulate(&[2025, 2026], &[0.1, 0.7]).unwrap();
        for band in &bands {
            assert!(band.percentiles[0] >= -0.32);
            assert!(band.percentiles[6] <= 0.8);
            assert!(band.percentiles.windows(2).all(|w| w[0] <= w[1]));
        }
        // truncation at 0.8 pulls the median of the second year below its mean
        assert!(bands[1].median() < 0.7);
    }

    #[test]
    fn test_wide_bounds_match_normal_quantiles() {
        let sim = YearEffectSimulator::new(20_000, 1.0, -10.0, 10.0).unwrap();
        let band = &sim.simulate(&[2030], &[0.0]).unwrap()[0];
        assert_relative_eq!(band.median(), 0.0, epsilon = 0.05);
        assert_relative_eq!(band.percentiles[1], -1.96, epsilon = 0.1);
        assert_relative_eq!(band.percentiles[5], 1.96, epsilon = 0.1);
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let sim = YearEffectSimulator::new(1_000, 0.2, -1.0, 1.0).unwrap().with_seed(7);
        let a = sim.simulate(&[1, 2, 3], &[0.0, 0.1, 0.2]).unwrap();
        let b = sim.simulate(&[1, 2, 3], &[0.0, 0.1, 0.2]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unreachable_interval_fails() {
        let sim = YearEffectSimulator::new(10, 0.1, 0.0, 1.0).unwrap();
        let err = sim.simulate(&[2030], &[100.0]).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidParameter { name: "mean", .. }));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(YearEffectSimulator::new(0, 0.1, 0.0, 1.0).is_err());
        assert!(YearEffectSimulator::new(10, 0.0, 0.0, 1.0).is_err());
        assert!(YearEffectSimulator::new(10, 0.1, 1.0, 1.0).is_err());
        let sim = YearEffectSimulator::new(10, 0.1, 0.0, 1.0).unwrap();
        assert!(sim.simulate(&[1, 2], &[0.5]).is_err());
    }

    #[test]
    fn test_read_path_by_column() {
        let data = "year,kt_m,kt_f\n2024,0.10,0.20\n2025,0.12,0.25\n";
        let (years, values) = read_path(data.as_bytes(), Some("kt_f")).unwrap();
        assert_eq!(years, vec![2024, 2025]);
        assert_eq!(values, vec![0.20, 0.25]);
        let (_, first) = read_path(data.as_bytes(), None).unwrap();
        assert_eq!(first, vec![0.10, 0.12]);
        assert!(read_path(data.as_bytes(), Some("kt_x")).is_err());
    }

    #[test]
    fn test_write_bands_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        let sim = YearEffectSimulator::new(200, 0.2, -1.0, 1.0).unwrap();
        let bands = sim.simulate(&[2040, 2041], &[0.0, 0.05]).unwrap();
        write_bands(&path, &bands).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next().unwrap(), "year,mean,p0.5,p2.5,p5,p50,p95,p97.5,p99.5");
        assert_eq!(text.lines().count(), 3);
    }
}
