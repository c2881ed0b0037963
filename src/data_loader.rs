use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{build_path_from_list, DataConfig};
use crate::error::{ForecastError, Result};

/// Reads the delimited file described by `data_config`.
///
/// The path is resolved against the project root and every column listed in
/// `date_columns` is parsed to `Date`.
pub fn read_data_from_config(data_config: &DataConfig) -> Result<DataFrame> {
    info!("read_data_from_config - Start");

    let data_path = build_path_from_list(&data_config.data_path);
    if !data_path.exists() {
        return Err(ForecastError::FileNotFound(format!(
            "read_data_from_config - {} not found",
            data_path.display()
        )));
    }
    info!("read_data_from_config - Retrieved data path {}", data_path.display());

    let data = read_csv(&data_path, &data_config.delimiter, &data_config.date_columns)?;

    info!(
        "read_data_from_config - Successfully read data with {} rows and {} columns",
        data.height(),
        data.width()
    );
    Ok(data)
}

/// Loads a CSV file with a header row, parsing `date_columns` to `Date`.
pub fn read_csv<P: AsRef<Path>>(
    path: P,
    delimiter: &str,
    date_columns: &[String],
) -> Result<DataFrame> {
    let path = path.as_ref();
    let separator = match delimiter.as_bytes() {
        [byte] => *byte,
        _ => {
            return Err(ForecastError::InvalidArgument(format!(
                "delimiter must be a single byte, got '{delimiter}'"
            )))
        }
    };
    debug!(path = %path.display(), separator = %(separator as char), "Reading CSV");

    let parse_options = CsvParseOptions::default().with_separator(separator);
    let data = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    if date_columns.is_empty() {
        return Ok(data);
    }

    let date_exprs: Vec<Expr> = date_columns
        .iter()
        .map(|name| parse_date_column(&data, name))
        .collect::<Result<_>>()?;
    debug!(?date_columns, "Parsing date columns");

    Ok(data.lazy().with_columns(date_exprs).collect()?)
}

fn parse_date_column(data: &DataFrame, name: &str) -> Result<Expr> {
    let dtype = data.column(name)?.dtype().clone();
    let expr = match dtype {
        DataType::String => col(name).str().to_date(StrptimeOptions::default()),
        DataType::Date => col(name),
        DataType::Datetime(_, _) => col(name).cast(DataType::Date),
        other => {
            return Err(ForecastError::InvalidInput(format!(
                "column '{name}' of type {other} cannot be parsed as a date"
            )))
        }
    };
    Ok(expr)
}
