//! Ordinary least squares with one or more target columns.
//!
//! Solves the normal equations `(X'X) B = X'Y` on the centred design with a
//! Cholesky factorisation. A tiny ridge on the diagonal keeps degenerate
//! bases (an explicit constant column next to the fitted intercept) solvable;
//! such columns receive a zero coefficient.

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use tracing::debug;

use super::traits::{column_names, matrix_to_frame, IntoFeatureMatrix, ModelFactory, Regressor};
use crate::config::ModelParams;
use crate::error::{ForecastError, Result};

const RIDGE: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct LinearRegression {
    fit_intercept: bool,
    /// `n_features x n_targets`
    coefficients: Option<Array2<f64>>,
    intercepts: Option<Array1<f64>>,
    feature_names: Vec<String>,
    target_names: Vec<String>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LinearRegression {
    pub fn new(fit_intercept: bool) -> Self {
        Self {
            fit_intercept,
            coefficients: None,
            intercepts: None,
            feature_names: Vec::new(),
            target_names: Vec::new(),
        }
    }

    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercepts(&self) -> Option<&Array1<f64>> {
        self.intercepts.as_ref()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Fits on raw matrices; `y` holds one column per target.
    pub fn fit_matrix(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        if x.nrows() != y.nrows() {
            return Err(ForecastError::InvalidInput(format!(
                "features have {} rows but targets have {}",
                x.nrows(),
                y.nrows()
            )));
        }
        if x.nrows() == 0 {
            return Err(ForecastError::InvalidInput(
                "cannot fit a linear model on zero rows".to_string(),
            ));
        }

        let (x_mean, y_mean) = if self.fit_intercept {
            (mean_rows(x)?, mean_rows(y)?)
        } else {
            (Array1::zeros(x.ncols()), Array1::zeros(y.ncols()))
        };
        let x_centred = x - &x_mean;
        let y_centred = y - &y_mean;

        let mut xtx = x_centred.t().dot(&x_centred);
        for i in 0..xtx.nrows() {
            xtx[[i, i]] += RIDGE;
        }
        let xty = x_centred.t().dot(&y_centred);

        let lower = cholesky(&xtx)?;
        let mut coefficients = Array2::<f64>::zeros((x.ncols(), y.ncols()));
        for (target, rhs) in xty.columns().into_iter().enumerate() {
            let beta = cholesky_solve(&lower, &rhs.to_owned());
            coefficients.column_mut(target).assign(&beta);
        }

        let intercepts = &y_mean - &x_mean.dot(&coefficients);
        debug!(?intercepts, "Linear model fitted");

        self.coefficients = Some(coefficients);
        self.intercepts = Some(intercepts);
        Ok(())
    }

    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(ForecastError::NotFitted)?;
        let intercepts = self.intercepts.as_ref().ok_or(ForecastError::NotFitted)?;

        if x.ncols() != coefficients.nrows() {
            return Err(ForecastError::InvalidInput(format!(
                "expected {} feature columns, got {}",
                coefficients.nrows(),
                x.ncols()
            )));
        }

        Ok(x.dot(coefficients) + intercepts)
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, features: &DataFrame, targets: &DataFrame) -> Result<()> {
        let x = features.to_feature_matrix()?;
        let y = targets.to_feature_matrix()?;
        self.fit_matrix(&x, &y)?;

        self.feature_names = column_names(features);
        self.target_names = column_names(targets);
        Ok(())
    }

    fn predict(&self, features: &DataFrame) -> Result<DataFrame> {
        let predictions = self.predict_matrix(&features.to_feature_matrix()?)?;
        matrix_to_frame(&predictions, &self.target_names)
    }
}

impl ModelFactory for LinearRegression {
    type ModelType = Self;

    fn create(params: &ModelParams) -> Result<Self> {
        Ok(Self::new(params.linear.fit_intercept))
    }
}

fn mean_rows(matrix: &Array2<f64>) -> Result<Array1<f64>> {
    matrix
        .mean_axis(Axis(0))
        .ok_or_else(|| ForecastError::InvalidInput("cannot average an empty matrix".to_string()))
}

/// Lower-triangular `L` with `A = L L'`.
fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return Err(ForecastError::Model(
                        "normal equations are not positive definite".to_string(),
                    ));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    Ok(l)
}

fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L' x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_preparation::trend_features;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_recovers_exact_relation() {
        let features = df![
            "x1" => [1.0, 2.0, 3.0, 4.0, 5.0],
            "x2" => [2.0, 1.0, 4.0, 3.0, 6.0],
        ]
        .unwrap();
        // y = 3 + 2 * x1 - x2
        let targets = df!["y" => [3.0, 6.0, 5.0, 8.0, 7.0]].unwrap();

        let mut model = LinearRegression::new(true);
        model.fit(&features, &targets).unwrap();

        let coefficients = model.coefficients().unwrap();
        assert_close(coefficients[[0, 0]], 2.0);
        assert_close(coefficients[[1, 0]], -1.0);
        assert_close(model.intercepts().unwrap()[0], 3.0);

        let predictions = model.predict(&features).unwrap();
        let y = predictions.column("y").unwrap().f64().unwrap();
        assert_close(y.get(4).unwrap(), 7.0);
    }

    #[test]
    fn test_multiple_targets_with_constant_column() {
        let trend = trend_features(6, 1, true).unwrap();
        let targets = df![
            "up" => [12.0, 14.0, 16.0, 18.0, 20.0, 22.0],
            "down" => [5.0, 4.0, 3.0, 2.0, 1.0, 0.0],
        ]
        .unwrap();

        let mut model = LinearRegression::default();
        model.fit(&trend, &targets).unwrap();

        let coefficients = model.coefficients().unwrap();
        assert_close(coefficients[[0, 0]], 0.0);
        assert_close(coefficients[[1, 0]], 2.0);
        assert_close(coefficients[[1, 1]], -1.0);

        let predictions = model.predict(&trend).unwrap();
        assert_eq!(column_names(&predictions), ["up", "down"]);
        assert_close(predictions.column("up").unwrap().f64().unwrap().get(0).unwrap(), 12.0);
        assert_close(predictions.column("down").unwrap().f64().unwrap().get(5).unwrap(), 0.0);
    }

    #[test]
    fn test_without_intercept() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        let y = Array2::from_shape_vec((3, 1), vec![2.0, 4.0, 6.0]).unwrap();

        let mut model = LinearRegression::new(false);
        model.fit_matrix(&x, &y).unwrap();
        assert_close(model.coefficients().unwrap()[[0, 0]], 2.0);
        assert_close(model.intercepts().unwrap()[0], 0.0);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::default();
        let features = df!["x" => [1.0]].unwrap();
        assert!(matches!(model.predict(&features), Err(ForecastError::NotFitted)));
    }

    #[test]
    fn test_row_mismatch() {
        let x = Array2::<f64>::zeros((3, 1));
        let y = Array2::<f64>::zeros((2, 1));
        let mut model = LinearRegression::default();
        assert!(matches!(model.fit_matrix(&x, &y), Err(ForecastError::InvalidInput(_))));
    }
}
