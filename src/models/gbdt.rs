use gbdt::config::Config as GBDTConfig;
use gbdt::decision_tree::{Data, DataVec, ValueType};
use gbdt::gradient_boost::GBDT;
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

use super::traits::{column_as_f64, column_names, ModelFactory, Regressor};
use crate::config::{BoostingParams, ModelParams};
use crate::error::{ForecastError, Result};

/// Gradient-boosted regression trees with squared-error loss.
///
/// String feature columns are ordinal-encoded with the categories seen
/// during `fit`.
pub struct GradientBoostingRegressor {
    params: BoostingParams,
    model: Option<GBDT>,
    encoders: Vec<Option<BTreeMap<String, ValueType>>>,
    feature_names: Vec<String>,
    target_name: String,
}

impl GradientBoostingRegressor {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            model: None,
            encoders: Vec::new(),
            feature_names: Vec::new(),
            target_name: String::new(),
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Feature columns seen by the last `fit`, in training order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn config(&self, feature_size: usize) -> GBDTConfig {
        let mut config = GBDTConfig::new();
        config.set_feature_size(feature_size);
        config.set_max_depth(self.params.max_depth);
        config.set_iterations(self.params.iterations);
        config.set_shrinkage(self.params.learning_rate);
        config.set_min_leaf_size(self.params.min_leaf_size);
        config.set_loss("SquaredError");
        config.set_debug(false);
        config.set_data_sample_ratio(self.params.data_sample_ratio);
        config.set_feature_sample_ratio(self.params.feature_sample_ratio);
        config.set_training_optimization_level(2);
        config
    }

    /// Row-major feature vectors, encoding string columns with `self.encoders`.
    fn feature_rows(&self, features: &DataFrame) -> Result<Vec<Vec<ValueType>>> {
        if features.width() != self.encoders.len() {
            return Err(ForecastError::InvalidInput(format!(
                "expected {} feature columns, got {}",
                self.encoders.len(),
                features.width()
            )));
        }

        let mut rows = vec![Vec::with_capacity(features.width()); features.height()];
        for (column, encoder) in features.get_columns().iter().zip(&self.encoders) {
            let values = match encoder {
                Some(categories) => encode_column(column, categories)?,
                None => column_as_f64(column)?
                    .into_iter()
                    .map(|value| value as ValueType)
                    .collect(),
            };
            for (row, value) in rows.iter_mut().zip(values) {
                row.push(value);
            }
        }

        Ok(rows)
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, features: &DataFrame, targets: &DataFrame) -> Result<()> {
        if targets.width() != 1 {
            return Err(ForecastError::InvalidInput(format!(
                "gradient boosting fits a single target column, got {}",
                targets.width()
            )));
        }
        if features.height() != targets.height() {
            return Err(ForecastError::InvalidInput(format!(
                "features have {} rows but targets have {}",
                features.height(),
                targets.height()
            )));
        }

        self.encoders = features
            .get_columns()
            .iter()
            .map(learn_encoder)
            .collect::<Result<_>>()?;

        let labels = column_as_f64(&targets.get_columns()[0])?;
        let mut train_data: DataVec = self
            .feature_rows(features)?
            .into_iter()
            .zip(labels)
            .map(|(row, label)| Data::new_training_data(row, 1.0, label as ValueType, None))
            .collect();

        debug!(
            rows = train_data.len(),
            features = features.width(),
            iterations = self.params.iterations,
            "Training gradient boosting model"
        );
        let mut gbdt = GBDT::new(&self.config(features.width()));
        gbdt.fit(&mut train_data);

        self.model = Some(gbdt);
        self.feature_names = column_names(features);
        self.target_name = targets.get_columns()[0].name().to_string();
        Ok(())
    }

    fn predict(&self, features: &DataFrame) -> Result<DataFrame> {
        let model = self.model.as_ref().ok_or(ForecastError::NotFitted)?;

        let test_data: DataVec = self
            .feature_rows(features)?
            .into_iter()
            .map(|row| Data::new_test_data(row, None))
            .collect();
        let predictions: Vec<f64> = model
            .predict(&test_data)
            .into_iter()
            .map(f64::from)
            .collect();

        Ok(DataFrame::new(vec![Column::new(
            self.target_name.as_str().into(),
            predictions,
        )])?)
    }
}

impl ModelFactory for GradientBoostingRegressor {
    type ModelType = Self;

    fn create(params: &ModelParams) -> Result<Self> {
        Ok(Self::new(params.boosting.clone()))
    }
}

fn learn_encoder(column: &Column) -> Result<Option<BTreeMap<String, ValueType>>> {
    if column.dtype() != &DataType::String {
        return Ok(None);
    }

    let mut categories = BTreeMap::new();
    for value in column.str()?.into_iter() {
        let value = value.ok_or_else(|| missing_values(column))?;
        categories.entry(value.to_string()).or_insert(0.0);
    }
    for (code, slot) in categories.values_mut().enumerate() {
        *slot = code as ValueType;
    }

    Ok(Some(categories))
}

fn encode_column(
    column: &Column,
    categories: &BTreeMap<String, ValueType>,
) -> Result<Vec<ValueType>> {
    column
        .str()?
        .into_iter()
        .map(|value| {
            let value = value.ok_or_else(|| missing_values(column))?;
            categories.get(value).copied().ok_or_else(|| {
                ForecastError::InvalidInput(format!(
                    "unseen category '{value}' in column '{}'",
                    column.name()
                ))
            })
        })
        .collect()
}

fn missing_values(column: &Column) -> ForecastError {
    ForecastError::InvalidInput(format!("column '{}' contains missing values", column.name()))
}
