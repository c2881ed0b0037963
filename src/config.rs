use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ForecastError, Result};
use crate::logging::LoggingConfig;
use crate::plotting::PlotCharacteristics;

/// Directory, relative to the project root, holding configuration files.
pub const CONFIGURATION_DIR: &str = "configuration";

/// Application configuration consumed by the driver binary.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub transactions_data: DataConfig,
    pub sales_data: DataConfig,
    pub model_params: ModelParams,
    pub feature_params: FeatureParams,
    pub plot_characteristics: PlotCharacteristics,
    pub output_dir: Vec<String>,
}

/// Location and layout of a delimited data file.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Path segments relative to the project root.
    pub data_path: Vec<String>,
    #[serde(default)]
    pub date_columns: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    ",".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelParams {
    #[serde(default)]
    pub linear: LinearParams,
    #[serde(default)]
    pub boosting: BoostingParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinearParams {
    pub fit_intercept: bool,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self { fit_intercept: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub iterations: usize,
    pub max_depth: u32,
    pub learning_rate: f32,
    pub min_leaf_size: usize,
    pub data_sample_ratio: f64,
    pub feature_sample_ratio: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            max_depth: 4,
            learning_rate: 0.1,
            min_leaf_size: 1,
            data_sample_ratio: 1.0,
            feature_sample_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureParams {
    pub group_frequency: String,
    pub decimals: u32,
    pub moving_average_window: usize,
    pub lags: Vec<i64>,
    pub trend_order: usize,
    pub periodogram_max_period: u32,
}

/// Root of the project; configuration and data paths resolve against it.
pub fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Reads `configuration/<file_name>` and deserializes it.
///
/// `.toml` files are parsed as TOML, everything else as YAML. An absolute
/// `file_name` is used as is.
pub fn read_configuration<T, P>(file_name: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    info!("read_configuration - Start");

    let file_name = file_name.as_ref();
    let path = project_root().join(CONFIGURATION_DIR).join(file_name);
    info!("read_configuration - Reading {}", path.display());

    let contents = fs::read_to_string(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ForecastError::FileNotFound(format!(
            "read_configuration - File {} not found",
            file_name.display()
        )),
        _ => ForecastError::Io(e),
    })?;

    let configuration = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&contents)?,
        _ => serde_yaml::from_str(&contents)?,
    };

    info!(
        "read_configuration - Configuration file {} read successfully",
        file_name.display()
    );
    Ok(configuration)
}

/// Joins `path_list` onto the project root.
pub fn build_path_from_list<S: AsRef<Path>>(path_list: &[S]) -> PathBuf {
    path_list
        .iter()
        .fold(project_root(), |path, segment| path.join(segment))
}
