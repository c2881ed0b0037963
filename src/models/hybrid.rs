//! Boosted hybrid forecaster.
//!
//! A linear model learns the trend from deterministic time features; a
//! non-linear model then learns the seasonal and serial structure left in
//! the linear model's residuals.

use polars::prelude::*;
use tracing::{info, instrument};

use super::gbdt::GradientBoostingRegressor;
use super::linear::LinearRegression;
use super::traits::{column_names, IntoFeatureMatrix, ModelFactory, Regressor};
use crate::config::ModelParams;
use crate::error::{ForecastError, Result};

pub const RESIDUALS_COLUMN: &str = "residuals";

pub struct BoostedHybridModel<L = LinearRegression, N = GradientBoostingRegressor> {
    linear_model: L,
    non_linear_model: N,
    linear_model_predictions: Option<DataFrame>,
    residuals: Option<Series>,
    y_column_names: Option<Vec<String>>,
}

impl BoostedHybridModel {
    /// Linear regression paired with gradient boosting, both from `params`.
    pub fn from_params(params: &ModelParams) -> Result<Self> {
        Ok(Self::new(
            LinearRegression::create(params)?,
            GradientBoostingRegressor::create(params)?,
        ))
    }
}

impl<L: Regressor, N: Regressor> BoostedHybridModel<L, N> {
    pub fn new(linear_model: L, non_linear_model: N) -> Self {
        info!("BoostedHybridModel::new - Initialise object attributes");
        Self {
            linear_model,
            non_linear_model,
            linear_model_predictions: None,
            residuals: None,
            y_column_names: None,
        }
    }

    /// Fits the trend model on `trend_features` and the residual model on
    /// `serial_features`.
    ///
    /// Residuals of every target column are stacked row by row into a single
    /// series, so `serial_features` must hold one row per (time, target)
    /// pair in that order.
    #[instrument(skip_all, fields(rows = y.height(), targets = y.width()))]
    pub fn fit(
        &mut self,
        trend_features: &DataFrame,
        serial_features: &DataFrame,
        y: &DataFrame,
    ) -> Result<()> {
        info!("fit - Start");

        let expected_rows = y.height() * y.width();
        if serial_features.height() != expected_rows {
            return Err(ForecastError::InvalidInput(format!(
                "serial features need {} rows ({} time steps x {} targets), got {}",
                expected_rows,
                y.height(),
                y.width(),
                serial_features.height()
            )));
        }

        info!("fit - Fit linear model");
        self.linear_model.fit(trend_features, y)?;

        info!("fit - Compute predictions");
        let predictions = self.linear_model.predict(trend_features)?;

        info!("fit - Calculate residuals");
        let residuals = y.to_feature_matrix()? - predictions.to_feature_matrix()?;
        // standard layout iterates row-major, matching the serial feature order
        let stacked: Vec<f64> = residuals.iter().copied().collect();
        let residuals = Series::new(RESIDUALS_COLUMN.into(), stacked);

        info!("fit - Fit non-linear model on serial features with residuals as target");
        let residual_frame = DataFrame::new(vec![Column::from(residuals.clone())])?;
        self.non_linear_model.fit(serial_features, &residual_frame)?;

        self.linear_model_predictions = Some(predictions);
        self.residuals = Some(residuals);
        self.y_column_names = Some(column_names(y));

        info!("fit - End");
        Ok(())
    }

    pub fn linear_model(&self) -> &L {
        &self.linear_model
    }

    pub fn non_linear_model(&self) -> &N {
        &self.non_linear_model
    }

    pub fn linear_model_predictions(&self) -> Option<&DataFrame> {
        self.linear_model_predictions.as_ref()
    }

    pub fn residuals(&self) -> Option<&Series> {
        self.residuals.as_ref()
    }

    pub fn y_column_names(&self) -> Option<&[String]> {
        self.y_column_names.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{read_configuration, BoostingParams, DataConfig};
    use crate::data_loader::read_data_from_config;
    use crate::data_preparation::{stack_columns, trend_features};
    use serde::Deserialize;

    const INDUSTRIES: [&str; 2] = ["BuildingMaterials", "FoodAndBeverage"];

    #[derive(Deserialize)]
    struct TestConfig {
        test_boosted_hybrid_model_data_config: DataConfig,
    }

    struct Inputs {
        trend: DataFrame,
        serial: DataFrame,
        y: DataFrame,
    }

    fn inputs() -> Inputs {
        let config: TestConfig = read_configuration("test_config.yaml").unwrap();
        let data = read_data_from_config(&config.test_boosted_hybrid_model_data_config).unwrap();

        let y = data.select(INDUSTRIES).unwrap();
        let trend = trend_features(data.height(), 2, true).unwrap();
        let serial = stack_columns(&data, "Month", &INDUSTRIES, "Industries", "Sales")
            .unwrap()
            .lazy()
            .select([
                col("Month").dt().month().alias("month"),
                col("Industries"),
            ])
            .collect()
            .unwrap();

        Inputs { trend, serial, y }
    }

    fn model() -> BoostedHybridModel {
        let params = ModelParams {
            boosting: BoostingParams {
                iterations: 80,
                max_depth: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        BoostedHybridModel::from_params(&params).unwrap()
    }

    #[test]
    fn test_new_model_is_empty() {
        let model = model();
        assert!(model.linear_model_predictions().is_none());
        assert!(model.residuals().is_none());
        assert!(model.y_column_names().is_none());
        assert!(!model.non_linear_model().is_fitted());
    }

    #[test]
    fn test_boosted_hybrid_model_fit() {
        let Inputs { trend, serial, y } = inputs();
        let mut model = model();
        model.fit(&trend, &serial, &y).unwrap();

        assert_eq!(model.y_column_names().unwrap(), INDUSTRIES);

        let predictions = model.linear_model_predictions().unwrap();
        assert_eq!(predictions.shape(), (48, 2));
        assert_eq!(column_names(predictions), INDUSTRIES);

        let residuals = model.residuals().unwrap();
        assert_eq!(residuals.len(), 96);
        assert_eq!(residuals.name().as_str(), RESIDUALS_COLUMN);

        // row-major stacking: element 1 is row 0 of the second target
        let y_fb = y.column("FoodAndBeverage").unwrap().f64().unwrap().get(0).unwrap();
        let pred_fb = predictions.column("FoodAndBeverage").unwrap().f64().unwrap().get(0).unwrap();
        let stacked = residuals.f64().unwrap().get(1).unwrap();
        assert!((stacked - (y_fb - pred_fb)).abs() < 1e-9);

        // OLS with an intercept leaves zero-mean residuals per target
        let residual_values: Vec<f64> = residuals.f64().unwrap().into_no_null_iter().collect();
        let bm_mean: f64 = residual_values.iter().step_by(2).sum::<f64>() / 48.0;
        assert!(bm_mean.abs() < 1e-6, "mean {bm_mean}");
    }

    #[test]
    fn test_non_linear_stage_explains_residuals() {
        let Inputs { trend, serial, y } = inputs();
        let mut model = model();
        model.fit(&trend, &serial, &y).unwrap();

        let residuals: Vec<f64> = model
            .residuals()
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let corrections = model.non_linear_model().predict(&serial).unwrap();
        let corrections = corrections.column(RESIDUALS_COLUMN).unwrap().f64().unwrap();

        let before: f64 = residuals.iter().map(|r| r * r).sum();
        let after: f64 = residuals
            .iter()
            .zip(corrections.into_no_null_iter())
            .map(|(r, c)| (r - c).powi(2))
            .sum();
        assert!(after < before / 2.0, "before {before}, after {after}");
    }

    #[test]
    fn test_fit_rejects_misaligned_serial_features() {
        let Inputs { trend, serial, y } = inputs();
        let mut model = model();
        let truncated = serial.head(Some(48));
        assert!(matches!(
            model.fit(&trend, &truncated, &y),
            Err(ForecastError::InvalidInput(_))
        ));
        assert!(model.residuals().is_none());
    }

    #[test]
    fn test_fit_rejects_missing_targets() {
        let Inputs { trend, serial, y } = inputs();
        let mut values: Vec<Option<f64>> = y
            .column("FoodAndBeverage")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        values[10] = None;
        let mut y = y;
        y.with_column(Column::new("FoodAndBeverage".into(), values))
            .unwrap();

        let mut model = model();
        match model.fit(&trend, &serial, &y) {
            Err(ForecastError::InvalidInput(message)) => {
                assert!(message.contains("FoodAndBeverage"), "{message}")
            }
            other => panic!("expected invalid input, got {other:?}"),
        }
        assert!(model.linear_model_predictions().is_none());
        assert!(model.residuals().is_none());
    }

    #[test]
    fn test_single_target_degenerates_to_reshape() {
        let Inputs { trend, serial, y } = inputs();
        let single = y.select(["BuildingMaterials"]).unwrap();
        let serial = serial
            .lazy()
            .filter(col("Industries").eq(lit("BuildingMaterials")))
            .collect()
            .unwrap();

        let mut model = model();
        model.fit(&trend, &serial, &single).unwrap();
        assert_eq!(model.residuals().unwrap().len(), 48);
        assert_eq!(model.y_column_names().unwrap(), ["BuildingMaterials"]);
    }
}
