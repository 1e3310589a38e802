//! Recombine age effects, singular values and year effects into rates

use nalgebra::DMatrix;
use serde::Serialize;

use super::decomposition::Decomposition;
use crate::error::Result;
use crate::rates::{RateMatrix, RateTransform};

/// Physically invalid cell in a reconstructed rate matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RateWarning {
    /// Inverse transform produced a rate below zero
    Negative { age_group: usize, year: i32, value: f64 },
    /// Inverse transform is undefined for the reconstructed value
    NonFinite { age_group: usize, year: i32 },
}

/// Reconstructed rates over historical and projected years
#[derive(Debug, Clone)]
pub struct Forecast {
    /// Rate space
    pub rates: RateMatrix,
    /// Transformed space, before the inverse transform
    pub transformed: RateMatrix,
    /// Cells that came back negative or undefined; never clipped
    pub warnings: Vec<RateWarning>,
}

impl Forecast {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Rebuilds rate matrices from a decomposition and (projected) year effects
#[derive(Debug, Clone, Copy)]
pub struct Reconstructor {
    transform: RateTransform,
}

impl Reconstructor {
    pub fn new(transform: RateTransform) -> Self {
        Self { transform }
    }

    /// `year_effects` has one row per output year, starting at `template`'s
    /// first year; age groups are taken from `template`
    pub fn reconstruct(
        &self,
        decomposition: &Decomposition,
        year_effects: &DMatrix<f64>,
        template: &RateMatrix,
    ) -> Result<Forecast> {
        let values = decomposition.combine(year_effects);
        let transformed = template.relabel(values, template.first_year())?;
        let rates = self.transform.invert(&transformed);
        let warnings = scan(&rates);

        if !warnings.is_empty() {
            log::warn!(
                "{} reconstructed cells are negative or undefined after the inverse transform",
                warnings.len()
            );
        }

        Ok(Forecast { rates, transformed, warnings })
    }
}

fn scan(rates: &RateMatrix) -> Vec<RateWarning> {
    let values = rates.values();
    let mut warnings = Vec::new();
    for j in 0..values.ncols() {
        let year = rates.first_year() + j as i32;
        for i in 0..values.nrows() {
            let value = values[(i, j)];
            if !value.is_finite() {
                warnings.push(RateWarning::NonFinite { age_group: i, year });
            } else if value < 0.0 {
                warnings.push(RateWarning::Negative { age_group: i, year, value });
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BilinearDecomposer;
    use approx::assert_relative_eq;

    fn matrix() -> RateMatrix {
        RateMatrix::from_rows(
            &[
                vec![-3.0, -3.1, -3.25, -3.3],
                vec![-2.0, -2.05, -2.2, -2.22],
                vec![-1.0, -0.9, -1.1, -1.05],
            ],
            2010,
        )
        .unwrap()
    }

    #[test]
    fn test_log_reconstruction_exponentiates() {
        let m = matrix();
        let d = BilinearDecomposer::new(3).decompose(&m).unwrap();
        let forecast = Reconstructor::new(RateTransform::Log)
            .reconstruct(&d, d.year_effects(), &m)
            .unwrap();
        assert!(forecast.is_clean());
        for age in 0..3 {
            for year in 2010..=2013 {
                assert_relative_eq!(
                    forecast.rates.get(age, year).unwrap(),
                    m.get(age, year).unwrap().exp(),
                    max_relative = 1e-10
                );
            }
        }
    }

    #[test]
    fn test_negative_and_undefined_rates_reported() {
        let m = matrix();
        let d = BilinearDecomposer::new(2).decompose(&m).unwrap();

        // lambda = 1 inverts to y + 1, negative below y = -1
        let forecast = Reconstructor::new(RateTransform::BoxCox { lambda: 1.0 })
            .reconstruct(&d, d.year_effects(), &m)
            .unwrap();
        assert!(forecast
            .warnings
            .iter()
            .any(|w| matches!(w, RateWarning::Negative { age_group: 0, .. })));

        // lambda = 0.3 has no real inverse below y = -1 / 0.3
        let deep = m.map(|y| y * 2.0);
        let d = BilinearDecomposer::new(2).decompose(&deep).unwrap();
        let forecast = Reconstructor::new(RateTransform::BoxCox { lambda: 0.3 })
            .reconstruct(&d, d.year_effects(), &deep)
            .unwrap();
        assert!(forecast
            .warnings
            .iter()
            .any(|w| matches!(w, RateWarning::NonFinite { age_group: 0, .. })));
    }

    #[test]
    fn test_projected_years_extend_past_history() {
        let m = matrix();
        let d = BilinearDecomposer::new(1).decompose(&m).unwrap();
        let extended = DMatrix::from_fn(7, 1, |t, _| t as f64 * 0.1);
        let forecast = Reconstructor::new(RateTransform::Log)
            .reconstruct(&d, &extended, &m)
            .unwrap();
        assert_eq!(forecast.rates.first_year(), 2010);
        assert_eq!(forecast.rates.last_year(), 2016);
        assert_eq!(forecast.rates.age_groups(), m.age_groups());
    }
}
