//! Dense age-by-year table of demographic values
//!
//! Rows are age groups, columns are consecutive calendar years starting at
//! `first_year`. Every transformation returns a new matrix; nothing here
//! mutates in place after construction.

use nalgebra::DMatrix;

use crate::error::{ForecastError, Result};

/// Age group x calendar year matrix with labelled rows
#[derive(Debug, Clone, PartialEq)]
pub struct RateMatrix {
    values: DMatrix<f64>,
    age_groups: Vec<String>,
    first_year: i32,
}

impl RateMatrix {
    /// Create a matrix from values with explicit age labels
    pub fn new(values: DMatrix<f64>, age_groups: Vec<String>, first_year: i32) -> Result<Self> {
        if age_groups.len() != values.nrows() {
            return Err(ForecastError::shape(format!(
                "{} age group labels for a matrix with {} rows",
                age_groups.len(),
                values.nrows()
            )));
        }
        if values.nrows() == 0 || values.ncols() == 0 {
            return Err(ForecastError::shape(format!(
                "matrix must be non-empty, got {}x{}",
                values.nrows(),
                values.ncols()
            )));
        }
        Ok(Self { values, age_groups, first_year })
    }

    /// Create from one `Vec` per age group, labelling rows by index
    pub fn from_rows(rows: &[Vec<f64>], first_year: i32) -> Result<Self> {
        let n_years = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((age, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_years) {
            return Err(ForecastError::shape(format!(
                "age group {} has {} years, expected {}",
                age,
                row.len(),
                n_years
            )));
        }
        let values = DMatrix::from_fn(rows.len(), n_years, |i, j| rows[i][j]);
        let labels = (0..rows.len()).map(|i| i.to_string()).collect();
        Self::new(values, labels, first_year)
    }

    /// New matrix with the same indexing but different values
    pub fn with_values(&self, values: DMatrix<f64>) -> Result<Self> {
        if values.shape() != self.values.shape() {
            return Err(ForecastError::shape(format!(
                "replacement values are {}x{}, matrix is {}x{}",
                values.nrows(),
                values.ncols(),
                self.values.nrows(),
                self.values.ncols()
            )));
        }
        Ok(Self {
            values,
            age_groups: self.age_groups.clone(),
            first_year: self.first_year,
        })
    }

    /// Same age groups, different year span
    pub(crate) fn relabel(&self, values: DMatrix<f64>, first_year: i32) -> Result<Self> {
        Self::new(values, self.age_groups.clone(), first_year)
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn age_groups(&self) -> &[String] {
        &self.age_groups
    }

    pub fn n_ages(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_years(&self) -> usize {
        self.values.ncols()
    }

    pub fn first_year(&self) -> i32 {
        self.first_year
    }

    pub fn last_year(&self) -> i32 {
        self.first_year + self.n_years() as i32 - 1
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.first_year..=self.last_year()
    }

    /// Column index of a calendar year, if covered
    pub fn year_index(&self, year: i32) -> Option<usize> {
        if year < self.first_year || year > self.last_year() {
            None
        } else {
            Some((year - self.first_year) as usize)
        }
    }

    /// Value for an age group in a calendar year
    pub fn get(&self, age: usize, year: i32) -> Option<f64> {
        let j = self.year_index(year)?;
        (age < self.n_ages()).then(|| self.values[(age, j)])
    }

    /// One age group's year series
    pub fn series(&self, age: usize) -> Vec<f64> {
        self.values.row(age).iter().copied().collect()
    }

    /// Check that another matrix has identical age groups and year span
    pub fn ensure_aligned(&self, other: &RateMatrix, what: &str) -> Result<()> {
        if self.values.shape() != other.values.shape() || self.first_year != other.first_year {
            return Err(ForecastError::shape(format!(
                "{}: {}x{} from {} vs {}x{} from {}",
                what,
                self.n_ages(),
                self.n_years(),
                self.first_year,
                other.n_ages(),
                other.n_years(),
                other.first_year
            )));
        }
        Ok(())
    }

    /// Sub-matrix covering `first_year..=last_year`
    pub fn window(&self, first_year: i32, last_year: i32) -> Result<Self> {
        let (start, end) = match (self.year_index(first_year), self.year_index(last_year)) {
            (Some(s), Some(e)) if s <= e => (s, e),
            _ => {
                return Err(ForecastError::shape(format!(
                    "window {}-{} is outside {}-{}",
                    first_year,
                    last_year,
                    self.first_year,
                    self.last_year()
                )))
            }
        };
        let values = self.values.columns(start, end - start + 1).into_owned();
        self.relabel(values, first_year)
    }

    /// Elementwise map into a new matrix
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            values: self.values.map(f),
            age_groups: self.age_groups.clone(),
            first_year: self.first_year,
        }
    }

    /// Paired cells over the calendar years both matrices cover
    ///
    /// Age groups are matched by row position; row counts must agree.
    pub fn overlapping_cells(&self, other: &RateMatrix) -> Result<Vec<(f64, f64)>> {
        if self.n_ages() != other.n_ages() {
            return Err(ForecastError::shape(format!(
                "{} age groups compared against {}",
                self.n_ages(),
                other.n_ages()
            )));
        }
        let start = self.first_year.max(other.first_year);
        let end = self.last_year().min(other.last_year());
        let mut cells = Vec::new();
        for year in start..=end {
            let (Some(i), Some(j)) = (self.year_index(year), other.year_index(year)) else {
                continue;
            };
            for age in 0..self.n_ages() {
                cells.push((self.values[(age, i)], other.values[(age, j)]));
            }
        }
        Ok(cells)
    }

    /// Mean absolute difference over overlapping cells
    pub fn mean_absolute_error(&self, other: &RateMatrix) -> Result<f64> {
        let cells = self.overlapping_cells(other)?;
        if cells.is_empty() {
            return Ok(f64::NAN);
        }
        Ok(cells.iter().map(|(a, b)| (a - b).abs()).sum::<f64>() / cells.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RateMatrix {
        RateMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], 2000).unwrap()
    }

    #[test]
    fn test_indexing_by_calendar_year() {
        let m = sample();
        assert_eq!(m.n_ages(), 2);
        assert_eq!(m.n_years(), 3);
        assert_eq!(m.last_year(), 2002);
        assert_eq!(m.get(1, 2001), Some(5.0));
        assert_eq!(m.get(1, 2003), None);
        assert_eq!(m.years().collect::<Vec<_>>(), vec![2000, 2001, 2002]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = RateMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]], 2000).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_window_keeps_labels() {
        let m = sample();
        let w = m.window(2001, 2002).unwrap();
        assert_eq!(w.first_year(), 2001);
        assert_eq!(w.series(0), vec![2.0, 3.0]);
        assert_eq!(w.age_groups(), m.age_groups());
        assert!(m.window(1999, 2001).is_err());
    }

    #[test]
    fn test_overlap_aligns_years() {
        let m = sample();
        let shifted = RateMatrix::from_rows(&[vec![2.0, 3.0], vec![5.0, 7.0]], 2001).unwrap();
        let cells = m.overlapping_cells(&shifted).unwrap();
        assert_eq!(cells.len(), 4);
        let mae = m.mean_absolute_error(&shifted).unwrap();
        assert!((mae - 0.25).abs() < 1e-12);
    }
}
