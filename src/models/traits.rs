use ndarray::Array2;
use polars::prelude::*;

use crate::config::ModelParams;
use crate::error::{ForecastError, Result};

/// A supervised model fitted on one table of features and one of targets.
pub trait Regressor {
    fn fit(&mut self, features: &DataFrame, targets: &DataFrame) -> Result<()>;

    /// Predictions, one column per fitted target, named after it.
    fn predict(&self, features: &DataFrame) -> Result<DataFrame>;
}

pub trait ModelFactory {
    type ModelType: Regressor;

    fn create(params: &ModelParams) -> Result<Self::ModelType>;
}

pub trait IntoFeatureMatrix {
    /// Row-major `f64` matrix of every column. Nulls are rejected.
    fn to_feature_matrix(&self) -> Result<Array2<f64>>;
}

impl IntoFeatureMatrix for DataFrame {
    fn to_feature_matrix(&self) -> Result<Array2<f64>> {
        let n_rows = self.height();
        let n_cols = self.width();
        let mut matrix = Array2::<f64>::zeros((n_rows, n_cols));

        for (col_idx, column) in self.get_columns().iter().enumerate() {
            let values = column_as_f64(column)?;
            for (row_idx, value) in values.into_iter().enumerate() {
                matrix[[row_idx, col_idx]] = value;
            }
        }

        Ok(matrix)
    }
}

/// Casts `column` to `f64` values, failing on the first null.
pub fn column_as_f64(column: &Column) -> Result<Vec<f64>> {
    let cast = column.cast(&DataType::Float64)?;
    cast.f64()?
        .into_iter()
        .map(|value| {
            value.ok_or_else(|| {
                ForecastError::InvalidInput(format!(
                    "column '{}' contains missing values",
                    column.name()
                ))
            })
        })
        .collect()
}

pub fn column_names(data: &DataFrame) -> Vec<String> {
    data.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Builds a frame from a `rows x names.len()` matrix.
pub fn matrix_to_frame(matrix: &Array2<f64>, names: &[String]) -> Result<DataFrame> {
    if matrix.ncols() != names.len() {
        return Err(ForecastError::InvalidInput(format!(
            "expected {} columns, got {}",
            names.len(),
            matrix.ncols()
        )));
    }

    let columns = names
        .iter()
        .zip(matrix.columns())
        .map(|(name, values)| Column::new(name.as_str().into(), values.to_vec()))
        .collect();
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_matrix_casts_integers() {
        let frame = df!["a" => [1i64, 2, 3], "b" => [0.5, 1.5, 2.5]].unwrap();
        let matrix = frame.to_feature_matrix().unwrap();
        assert_eq!(matrix.shape(), &[3, 2]);
        assert_eq!(matrix[[2, 0]], 3.0);
        assert_eq!(matrix[[1, 1]], 1.5);
    }

    #[test]
    fn test_feature_matrix_rejects_nulls() {
        let frame = df!["a" => [Some(1.0), None]].unwrap();
        assert!(matches!(
            frame.to_feature_matrix(),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_matrix_to_frame_round_names() {
        let matrix = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let frame = matrix_to_frame(&matrix, &["x".to_string(), "y".to_string()]).unwrap();
        assert_eq!(frame.column("y").unwrap().f64().unwrap().get(1), Some(4.0));
        assert!(matrix_to_frame(&matrix, &["x".to_string()]).is_err());
    }
}
