pub mod config;
pub mod data_loader;
pub mod data_preparation;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod plotting;

pub use config::{read_configuration, AppConfig, DataConfig};
pub use data_loader::read_data_from_config;
pub use error::{ForecastError, Result};
pub use metrics::ModelMetrics;
pub use models::{BoostedHybridModel, GradientBoostingRegressor, LinearRegression};
