//! CSV reader/writer for year-by-age tables
//!
//! Files have a `year` column followed by one column per age group, one row
//! per calendar year (the layout of births.csv, deaths_male.csv, ...). In
//! memory the table is transposed to age groups x years.

use std::fs::File;
use std::path::Path;

use nalgebra::DMatrix;

use super::matrix::RateMatrix;
use crate::error::{ForecastError, Result};

/// Load an age x year matrix from a year-per-row CSV file
pub fn load_matrix(path: &Path) -> Result<RateMatrix> {
    let file = File::open(path)?;
    read_matrix(file)
}

/// Parse an age x year matrix from any CSV reader
pub fn read_matrix<R: std::io::Read>(source: R) -> Result<RateMatrix> {
    let mut reader = csv::Reader::from_reader(source);

    let headers = reader.headers()?.clone();
    let age_groups: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();
    if age_groups.is_empty() {
        return Err(ForecastError::Parse {
            line: 1,
            message: "expected a year column followed by at least one age group".into(),
        });
    }

    let mut years: Vec<i32> = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let line = row + 2;
        let year: i32 = record[0].trim().parse().map_err(|_| ForecastError::Parse {
            line,
            message: format!("invalid year '{}'", &record[0]),
        })?;

        if let Some(&prev) = years.last() {
            if year != prev + 1 {
                return Err(ForecastError::shape(format!(
                    "years must be consecutive: {} follows {} at line {}",
                    year, prev, line
                )));
            }
        }

        let values = record
            .iter()
            .skip(1)
            .map(|field| {
                field.trim().parse::<f64>().map_err(|_| ForecastError::Parse {
                    line,
                    message: format!("invalid value '{}'", field),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        years.push(year);
        columns.push(values);
    }

    let Some(&first_year) = years.first() else {
        return Err(ForecastError::Parse {
            line: 2,
            message: "no data rows".into(),
        });
    };

    let values = DMatrix::from_fn(age_groups.len(), columns.len(), |i, j| columns[j][i]);
    RateMatrix::new(values, age_groups, first_year)
}

/// Write an age x year matrix back out as a year-per-row CSV file
pub fn write_matrix(path: &Path, matrix: &RateMatrix) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = vec!["year".to_string()];
    header.extend(matrix.age_groups().iter().cloned());
    writer.write_record(&header)?;

    for (j, year) in matrix.years().enumerate() {
        let mut record = vec![year.to_string()];
        record.extend((0..matrix.n_ages()).map(|i| format!("{}", matrix.values()[(i, j)])));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
