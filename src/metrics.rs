use polars::prelude::*;

use crate::error::{ForecastError, Result};
use crate::models::traits::column_as_f64;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r_squared: f64,
}

impl ModelMetrics {
    pub fn compute(predictions: &Column, actuals: &Column) -> Result<Self> {
        let predictions = column_as_f64(predictions)?;
        let actuals = column_as_f64(actuals)?;

        if predictions.len() != actuals.len() || actuals.is_empty() {
            return Err(ForecastError::InvalidInput(format!(
                "metrics need equally sized, non-empty inputs, got {} predictions and {} actuals",
                predictions.len(),
                actuals.len()
            )));
        }

        let n = actuals.len() as f64;
        let mean = actuals.iter().sum::<f64>() / n;

        let (abs_error, sq_error, sq_total) = predictions.iter().zip(&actuals).fold(
            (0.0, 0.0, 0.0),
            |(abs_error, sq_error, sq_total), (p, a)| {
                (
                    abs_error + (a - p).abs(),
                    sq_error + (a - p).powi(2),
                    sq_total + (a - mean).powi(2),
                )
            },
        );

        // a constant series is explained perfectly or not at all
        let r_squared = if sq_total == 0.0 {
            if sq_error == 0.0 { 1.0 } else { 0.0 }
        } else {
            1.0 - sq_error / sq_total
        };

        Ok(Self {
            mae: abs_error / n,
            rmse: (sq_error / n).sqrt(),
            r_squared,
        })
    }
}
