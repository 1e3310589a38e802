//! One rate model for both fertility and mortality
//!
//! The two cases differ only in the stabilizing transform (Box-Cox vs log)
//! and whether LOWESS smoothing runs before the decomposition, so both are
//! described by a [`ModelSpec`].

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::decomposition::{BilinearDecomposer, Decomposition};
use super::reconstruct::{Forecast, Reconstructor};
use super::trend::TrendProjector;
use crate::error::Result;
use crate::rates::{RateBuilder, RateData, RateMatrix, RateTransform};
use crate::smoothing::Smoother;

/// Transform, optional smoothing step and number of latent components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub transform: RateTransform,
    pub smoother: Option<Smoother>,
    pub n_components: usize,
}

impl ModelSpec {
    /// Log rates smoothed along the year axis
    pub fn mortality(n_components: usize) -> Self {
        Self {
            transform: RateTransform::Log,
            smoother: Some(Smoother::default()),
            n_components,
        }
    }

    /// Box-Cox rates without smoothing
    pub fn fertility(lambda: f64, n_components: usize) -> Self {
        Self {
            transform: RateTransform::BoxCox { lambda },
            smoother: None,
            n_components,
        }
    }

    pub fn with_smoother(mut self, smoother: Option<Smoother>) -> Self {
        self.smoother = smoother;
        self
    }

    pub fn with_transform(mut self, transform: RateTransform) -> Self {
        self.transform = transform;
        self
    }
}

/// Fitted bilinear model over a fixed historical window
///
/// The decomposition is computed once at construction; the model is never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct BilinearRateModel {
    spec: ModelSpec,
    /// Transformed (and smoothed, if configured) input
    rates: RateMatrix,
    decomposition: Decomposition,
}

impl BilinearRateModel {
    /// Build rates from counts and exposures, then fit
    pub fn fit(data: &RateData, spec: ModelSpec) -> Result<Self> {
        let transformed = RateBuilder::new(spec.transform).build_from(data)?;
        Self::from_transformed(transformed, spec)
    }

    /// Fit on an already transformed matrix; smoothing still applies
    pub fn from_transformed(transformed: RateMatrix, spec: ModelSpec) -> Result<Self> {
        let rates = match &spec.smoother {
            Some(smoother) => smoother.smooth(&transformed)?,
            None => transformed,
        };
        let decomposition = BilinearDecomposer::new(spec.n_components).decompose(&rates)?;

        log::debug!(
            "fitted {:?} model on {} age groups x {} years ({}-{}), {} components",
            spec.transform,
            rates.n_ages(),
            rates.n_years(),
            rates.first_year(),
            rates.last_year(),
            spec.n_components
        );

        Ok(Self { spec, rates, decomposition })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Transformed input the decomposition was computed from
    pub fn rates(&self) -> &RateMatrix {
        &self.rates
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    pub fn averages(&self) -> &DVector<f64> {
        self.decomposition.averages()
    }

    pub fn age_effects(&self) -> &DMatrix<f64> {
        self.decomposition.age_effects()
    }

    pub fn year_effects(&self) -> &DMatrix<f64> {
        self.decomposition.year_effects()
    }

    pub fn singular_values(&self) -> &DVector<f64> {
        self.decomposition.singular_values()
    }

    /// Year effects extended `n_years` past the last observed year
    pub fn project(&self, n_years: usize, phi: f64) -> Result<DMatrix<f64>> {
        TrendProjector::new(phi)?.project(self.year_effects(), n_years)
    }

    /// Rates for the given year effects, starting at the first observed year
    pub fn reconstruct(&self, year_effects: &DMatrix<f64>) -> Result<Forecast> {
        Reconstructor::new(self.spec.transform).reconstruct(
            &self.decomposition,
            year_effects,
            &self.rates,
        )
    }

    /// In-sample fit over the historical years only
    pub fn fitted(&self) -> Result<Forecast> {
        self.reconstruct(self.year_effects())
    }

    /// Historical fit followed by `n_years` of damped-trend projection
    pub fn forecast(&self, n_years: usize, phi: f64) -> Result<Forecast> {
        let projected = self.project(n_years, phi)?;
        self.reconstruct(&projected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const N_AGES: usize = 10;
    const N_YEARS: usize = 20;
    const EXPOSURE: f64 = 1000.0;

    /// Rates following a straight line per age group; slopes alternate sign
    fn linear_rates(age: usize, t: usize) -> f64 {
        let base = 0.02 + 0.01 * age as f64;
        let direction = if age % 3 == 0 { 0.0004 } else { -0.0003 };
        let slope = direction * (1.0 + 0.1 * age as f64);
        base + slope * t as f64
    }

    fn slope_sign(age: usize) -> f64 {
        if age % 3 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn synthetic(rate: impl Fn(usize, usize) -> f64) -> RateData {
        let counts: Vec<Vec<f64>> = (0..N_AGES)
            .map(|a| (0..N_YEARS).map(|t| rate(a, t) * EXPOSURE).collect())
            .collect();
        let exposures = vec![vec![EXPOSURE; N_YEARS]; N_AGES];
        RateData::new(
            RateMatrix::from_rows(&counts, 1990).unwrap(),
            RateMatrix::from_rows(&exposures, 1990).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_end_to_end_linear_trend_recovered() {
        let data = synthetic(linear_rates);
        let observed = data.crude_rates().unwrap();

        // lambda = 1 keeps the linear structure exact in transformed space
        let model = BilinearRateModel::fit(&data, ModelSpec::fertility(1.0, 2)).unwrap();
        let fitted = model.fitted().unwrap();
        let mae = fitted.rates.mean_absolute_error(&observed).unwrap();
        assert!(mae < 1e-6, "in-sample MAE {}", mae);

        let forecast = model.forecast(5, 0.95).unwrap();
        assert_eq!(forecast.rates.last_year(), 1990 + N_YEARS as i32 - 1 + 5);

        let last_observed = observed.last_year();
        let matching = (0..N_AGES)
            .filter(|&age| {
                let change = forecast.rates.get(age, last_observed + 5).unwrap()
                    - forecast.rates.get(age, last_observed).unwrap();
                change.signum() == slope_sign(age)
            })
            .count();
        assert!(matching * 10 >= N_AGES * 9, "only {} of {} ages kept their trend", matching, N_AGES);
    }

    #[test]
    fn test_log_model_recovers_exponential_trend() {
        let data = synthetic(|a, t| 0.001 * (1.0 + a as f64) * (-0.02 * t as f64).exp());
        let spec = ModelSpec::mortality(2).with_smoother(None);
        let model = BilinearRateModel::fit(&data, spec).unwrap();
        let fitted = model.fitted().unwrap();
        let observed = data.crude_rates().unwrap();
        for age in 0..N_AGES {
            for year in observed.years() {
                assert_relative_eq!(
                    fitted.rates.get(age, year).unwrap(),
                    observed.get(age, year).unwrap(),
                    max_relative = 1e-8
                );
            }
        }
    }

    #[test]
    fn test_all_components_round_trip() {
        let data = synthetic(|a, t| 0.01 + 0.001 * a as f64 + 0.0002 * ((a * t) as f64).sin().abs());
        let model = BilinearRateModel::fit(&data, ModelSpec::fertility(0.4, N_AGES)).unwrap();
        let fitted = model.fitted().unwrap();
        for (a, b) in fitted.transformed.values().iter().zip(model.rates().values().iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_projection_keeps_history() {
        let data = synthetic(linear_rates);
        let model = BilinearRateModel::fit(&data, ModelSpec::fertility(0.5, 3)).unwrap();
        for phi in [0.8, 0.9, 1.0] {
            let projected = model.project(7, phi).unwrap();
            assert_eq!(projected.nrows(), N_YEARS + 7);
            assert_eq!(projected.rows(0, N_YEARS).into_owned(), *model.year_effects());
        }
    }

    #[test]
    fn test_decomposition_is_reproducible() {
        let data = synthetic(linear_rates);
        let a = BilinearRateModel::fit(&data, ModelSpec::mortality(2)).unwrap();
        let b = BilinearRateModel::fit(&data, ModelSpec::mortality(2)).unwrap();
        assert_eq!(a.singular_values(), b.singular_values());
        assert_eq!(a.age_effects(), b.age_effects());
        assert_eq!(a.year_effects(), b.year_effects());
    }
}
