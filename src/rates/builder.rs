//! Counts over exposures into (transformed) rate matrices

use nalgebra::DMatrix;

use super::matrix::RateMatrix;
use super::transform::RateTransform;
use crate::error::{ForecastError, Result};

/// Numerator counts (births, deaths) paired with denominator exposures
/// (female population, person-years) over the same age groups and years
#[derive(Debug, Clone)]
pub struct RateData {
    counts: RateMatrix,
    exposures: RateMatrix,
}

impl RateData {
    pub fn new(counts: RateMatrix, exposures: RateMatrix) -> Result<Self> {
        counts.ensure_aligned(&exposures, "counts vs exposures")?;
        Ok(Self { counts, exposures })
    }

    pub fn counts(&self) -> &RateMatrix {
        &self.counts
    }

    pub fn exposures(&self) -> &RateMatrix {
        &self.exposures
    }

    /// Untransformed rates, counts / exposures
    pub fn crude_rates(&self) -> Result<RateMatrix> {
        crude_rates(&self.counts, &self.exposures)
    }

    /// Both matrices cut down to `first_year..=last_year`
    pub fn window(&self, first_year: i32, last_year: i32) -> Result<Self> {
        Ok(Self {
            counts: self.counts.window(first_year, last_year)?,
            exposures: self.exposures.window(first_year, last_year)?,
        })
    }
}

/// Elementwise counts / exposures
///
/// A zero, negative or non-finite exposure leaves the cell without a defined
/// rate. That is reported as a `ShapeMismatch` naming the cell, since the
/// matrix would otherwise have a structurally missing entry.
pub fn crude_rates(counts: &RateMatrix, exposures: &RateMatrix) -> Result<RateMatrix> {
    counts.ensure_aligned(exposures, "counts vs exposures")?;

    let num = counts.values();
    let den = exposures.values();
    for j in 0..den.ncols() {
        for i in 0..den.nrows() {
            let e = den[(i, j)];
            if !(e.is_finite() && e > 0.0) {
                return Err(ForecastError::shape(format!(
                    "exposure {} at age group {} ({}), year {} leaves the rate undefined",
                    e,
                    i,
                    exposures.age_groups()[i],
                    exposures.first_year() + j as i32
                )));
            }
        }
    }

    let values = DMatrix::from_fn(num.nrows(), num.ncols(), |i, j| num[(i, j)] / den[(i, j)]);
    counts.with_values(values)
}

/// Builds stabilized rate matrices from raw counts and exposures
#[derive(Debug, Clone, Copy)]
pub struct RateBuilder {
    transform: RateTransform,
}

impl RateBuilder {
    pub fn new(transform: RateTransform) -> Self {
        Self { transform }
    }

    /// Natural-log builder used for mortality
    pub fn log() -> Self {
        Self::new(RateTransform::Log)
    }

    /// Box-Cox builder used for fertility
    pub fn box_cox(lambda: f64) -> Self {
        Self::new(RateTransform::BoxCox { lambda })
    }

    pub fn transform(&self) -> RateTransform {
        self.transform
    }

    /// Rate = counts / exposures, then the stabilizing transform
    pub fn build(&self, counts: &RateMatrix, exposures: &RateMatrix) -> Result<RateMatrix> {
        let rates = crude_rates(counts, exposures)?;
        self.transform.apply(&rates)
    }

    pub fn build_from(&self, data: &RateData) -> Result<RateMatrix> {
        self.build(data.counts(), data.exposures())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn matrix(rows: &[Vec<f64>]) -> RateMatrix {
        RateMatrix::from_rows(rows, 2000).unwrap()
    }

    #[test]
    fn test_crude_rates_divide_elementwise() {
        let counts = matrix(&[vec![10.0, 20.0], vec![3.0, 4.0]]);
        let exposures = matrix(&[vec![1000.0, 1000.0], vec![100.0, 200.0]]);
        let rates = crude_rates(&counts, &exposures).unwrap();
        assert_relative_eq!(rates.get(0, 2001).unwrap(), 0.02);
        assert_relative_eq!(rates.get(1, 2001).unwrap(), 0.02);
    }

    #[test]
    fn test_shape_mismatch() {
        let counts = matrix(&[vec![10.0, 20.0]]);
        let exposures = matrix(&[vec![1000.0, 1000.0, 1000.0]]);
        let err = RateBuilder::log().build(&counts, &exposures).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_zero_exposure_year_is_shape_mismatch() {
        let counts = matrix(&[vec![10.0, 0.0, 12.0], vec![5.0, 0.0, 6.0]]);
        let exposures = matrix(&[vec![1000.0, 0.0, 1000.0], vec![500.0, 0.0, 500.0]]);
        match RateBuilder::box_cox(0.2).build(&counts, &exposures) {
            Err(ForecastError::ShapeMismatch { context }) => {
                assert!(context.contains("year 2001"), "{}", context);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_box_cox_build() {
        let counts = matrix(&[vec![50.0, 60.0]]);
        let exposures = matrix(&[vec![1000.0, 1000.0]]);
        let built = RateBuilder::box_cox(0.5).build(&counts, &exposures).unwrap();
        let expected = (0.05f64.sqrt() - 1.0) / 0.5;
        assert_relative_eq!(built.get(0, 2000).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_rate_data_window() {
        let counts = matrix(&[vec![1.0, 2.0, 3.0]]);
        let exposures = matrix(&[vec![10.0, 10.0, 10.0]]);
        let data = RateData::new(counts, exposures).unwrap();
        let w = data.window(2001, 2002).unwrap();
        assert_eq!(w.crude_rates().unwrap().series(0), vec![0.2, 0.3]);
    }
}
