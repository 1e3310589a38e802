//! Bilinear age/year factorization of a transformed rate matrix
//!
//! The matrix is centred per age group and factored by SVD:
//!
//! ```text
//! y[x, t] = a[x] + sum_k s[k] * b[x, k] * k[t, k]
//! ```
//!
//! where `a` are the age-group averages, `b` the age effects (left singular
//! vectors), `k` the year effects (right singular vectors) and `s` the
//! singular values. The factorization is computed once and kept.

use nalgebra::{DMatrix, DVector, SVD};

use crate::error::{ForecastError, Result};
use crate::rates::RateMatrix;

const SVD_EPS: f64 = 1e-14;
const SVD_MAX_ITERATIONS: usize = 10_000;

/// Retained components of the centred matrix's SVD
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// Per-age-group mean across years (transformed space)
    averages: DVector<f64>,
    /// n_ages x n_components
    age_effects: DMatrix<f64>,
    /// n_years x n_components
    year_effects: DMatrix<f64>,
    /// Descending, non-negative
    singular_values: DVector<f64>,
    /// Sum of all squared singular values, retained or not
    total_variance: f64,
}

impl Decomposition {
    pub fn averages(&self) -> &DVector<f64> {
        &self.averages
    }

    pub fn age_effects(&self) -> &DMatrix<f64> {
        &self.age_effects
    }

    pub fn year_effects(&self) -> &DMatrix<f64> {
        &self.year_effects
    }

    pub fn singular_values(&self) -> &DVector<f64> {
        &self.singular_values
    }

    pub fn n_components(&self) -> usize {
        self.singular_values.len()
    }

    /// Share of total squared singular mass carried by each retained component
    pub fn explained_variance_ratio(&self) -> Vec<f64> {
        if self.total_variance <= 0.0 {
            return vec![0.0; self.n_components()];
        }
        self.singular_values
            .iter()
            .map(|s| s * s / self.total_variance)
            .collect()
    }

    /// Transformed-space matrix for the given year effects (ages x years)
    pub fn combine(&self, year_effects: &DMatrix<f64>) -> DMatrix<f64> {
        let scaled = &self.age_effects * DMatrix::from_diagonal(&self.singular_values);
        let mut out = scaled * year_effects.transpose();
        for (i, mut row) in out.row_iter_mut().enumerate() {
            row.add_scalar_mut(self.averages[i]);
        }
        out
    }
}

/// Factors centred rate matrices into age and year effects
#[derive(Debug, Clone, Copy)]
pub struct BilinearDecomposer {
    n_components: usize,
}

impl BilinearDecomposer {
    pub fn new(n_components: usize) -> Self {
        Self { n_components }
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Centre by age-group means and keep the leading `n_components` of the SVD
    pub fn decompose(&self, matrix: &RateMatrix) -> Result<Decomposition> {
        let values = matrix.values();
        let (n_ages, n_years) = values.shape();
        let max = n_ages.min(n_years);
        if self.n_components == 0 || self.n_components > max {
            return Err(ForecastError::InvalidComponentCount {
                requested: self.n_components,
                max,
            });
        }

        let averages = DVector::from_iterator(n_ages, values.row_iter().map(|row| row.mean()));
        let mut centred = values.clone();
        for (i, mut row) in centred.row_iter_mut().enumerate() {
            row.add_scalar_mut(-averages[i]);
        }

        // try_new returns singular values sorted in descending order
        let svd = SVD::try_new(centred, true, true, SVD_EPS, SVD_MAX_ITERATIONS)
            .ok_or(ForecastError::DecompositionFailed)?;
        let u = svd.u.as_ref().ok_or(ForecastError::DecompositionFailed)?;
        let v_t = svd.v_t.as_ref().ok_or(ForecastError::DecompositionFailed)?;

        let k = self.n_components;
        let total_variance = svd.singular_values.iter().map(|s| s * s).sum();

        log::debug!(
            "decomposed {}x{} matrix, leading singular value {:.6}",
            n_ages,
            n_years,
            svd.singular_values[0]
        );

        Ok(Decomposition {
            averages,
            age_effects: u.columns(0, k).into_owned(),
            year_effects: v_t.rows(0, k).transpose(),
            singular_values: svd.singular_values.rows(0, k).into_owned(),
            total_variance,
        })
    }
}
