use anyhow::Context;
use polars::prelude::*;
use sales_forecasting::config::{build_path_from_list, read_configuration, AppConfig};
use sales_forecasting::data_loader::read_data_from_config;
use sales_forecasting::data_preparation::{
    add_dummy_time_step, add_lag_feature, add_seasonality, group_avg_column_by_frequency,
    stack_columns, trend_features,
};
use sales_forecasting::logging::init_logging;
use sales_forecasting::models::traits::column_as_f64;
use sales_forecasting::plotting::{
    plot_lags, plot_moving_average, plot_periodogram, plot_predictions_vs_time_series,
    plot_regression, plot_seasonality, plot_time_series, set_plot_characteristics, ChartLabels,
    Theme,
};
use sales_forecasting::{BoostedHybridModel, ModelMetrics};
use std::path::Path;
use tracing::{debug, info, instrument};

const DATE_COLUMN: &str = "date";
const TRANSACTIONS_COLUMN: &str = "transactions";
const MONTH_COLUMN: &str = "Month";
const INDUSTRY_COLUMN: &str = "Industries";

fn main() -> anyhow::Result<()> {
    let config_file = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let config: AppConfig = read_configuration(&config_file)
        .with_context(|| format!("failed to load configuration '{config_file}'"))?;
    init_logging(&config.logging)?;

    info!("Starting sales forecasting");
    debug!(?config, "Configuration loaded");

    let theme = set_plot_characteristics(&config.plot_characteristics)?;
    let out_dir = build_path_from_list(&config.output_dir);

    explore_transactions(&config, &theme, &out_dir).context("transactions analysis failed")?;
    forecast_sales(&config, &theme, &out_dir).context("sales forecast failed")?;

    info!(output = %out_dir.display(), "Done");
    Ok(())
}

/// Weekly averages, lags and seasonal profile of store transactions.
#[instrument(skip_all)]
fn explore_transactions(config: &AppConfig, theme: &Theme, out_dir: &Path) -> anyhow::Result<()> {
    let params = &config.feature_params;
    let transactions = read_data_from_config(&config.transactions_data)?;
    debug!(shape = ?transactions.shape(), "Transactions loaded");

    let weekly = group_avg_column_by_frequency(
        &transactions,
        DATE_COLUMN,
        TRANSACTIONS_COLUMN,
        &params.group_frequency,
        params.decimals,
    )?;
    let mut weekly = add_dummy_time_step(&weekly)?;
    for &lag in &params.lags {
        weekly = add_lag_feature(&weekly, TRANSACTIONS_COLUMN, lag)?;
    }
    debug!(shape = ?weekly.shape(), "Weekly features built");

    plot_time_series(
        theme,
        &weekly,
        DATE_COLUMN,
        TRANSACTIONS_COLUMN,
        &ChartLabels::new("Average transactions", "Date", "Transactions"),
        &out_dir.join("transactions_time_series.svg"),
    )?;
    plot_regression(
        theme,
        &weekly,
        "time_step",
        TRANSACTIONS_COLUMN,
        &ChartLabels::new("Time step plot", "Time step", "Transactions"),
        &out_dir.join("transactions_time_step.svg"),
    )?;
    plot_moving_average(
        theme,
        &transactions,
        DATE_COLUMN,
        TRANSACTIONS_COLUMN,
        params.moving_average_window,
        &ChartLabels::new("Moving average", "Date", "Transactions"),
        &out_dir.join("transactions_moving_average.svg"),
    )?;

    let lags: Vec<usize> = params
        .lags
        .iter()
        .filter_map(|&lag| usize::try_from(lag).ok())
        .filter(|&lag| lag > 0 && lag < transactions.height())
        .collect();
    if !lags.is_empty() {
        plot_lags(
            theme,
            &transactions,
            TRANSACTIONS_COLUMN,
            &lags,
            2,
            "Lag plots",
            &out_dir.join("transactions_lags.svg"),
        )?;
    }

    let seasonal = add_seasonality(&transactions, DATE_COLUMN, &["day_of_week", "week"])?;
    plot_seasonality(
        theme,
        &seasonal,
        "week",
        "day_of_week",
        TRANSACTIONS_COLUMN,
        &ChartLabels::new("Weekly seasonality", "Day of week", "Transactions"),
        &out_dir.join("transactions_seasonality.svg"),
    )?;

    Ok(())
}

/// Fits the boosted hybrid model on monthly sales by industry.
#[instrument(skip_all)]
fn forecast_sales(config: &AppConfig, theme: &Theme, out_dir: &Path) -> anyhow::Result<()> {
    let params = &config.feature_params;
    let sales = read_data_from_config(&config.sales_data)?;
    let industries: Vec<String> = sales
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != MONTH_COLUMN)
        .map(|name| name.to_string())
        .collect();
    let industry_refs: Vec<&str> = industries.iter().map(String::as_str).collect();
    info!(industries = ?industries, rows = sales.height(), "Sales loaded");

    let y = sales.select(industry_refs.iter().copied())?;
    let trend = trend_features(sales.height(), params.trend_order, true)?;
    let serial = stack_columns(&sales, MONTH_COLUMN, &industry_refs, INDUSTRY_COLUMN, "Sales")?
        .lazy()
        .select([col(MONTH_COLUMN).dt().month().alias("month"), col(INDUSTRY_COLUMN)])
        .collect()?;

    let mut model = BoostedHybridModel::from_params(&config.model_params)?;
    model.fit(&trend, &serial, &y)?;

    let predictions = model
        .linear_model_predictions()
        .context("model has no linear predictions after fit")?;
    for industry in &industries {
        let metrics = ModelMetrics::compute(predictions.column(industry)?, y.column(industry)?)?;
        info!(
            industry = %industry,
            mae = metrics.mae,
            rmse = metrics.rmse,
            r_squared = metrics.r_squared,
            "Trend model fit"
        );

        plot_predictions_vs_time_series(
            theme,
            &sales,
            &column_as_f64(predictions.column(industry)?)?,
            MONTH_COLUMN,
            industry,
            &ChartLabels::new(format!("{industry} trend"), "Month", "Sales"),
            &out_dir.join(format!("{industry}_trend.svg")),
        )?;
        plot_periodogram(
            theme,
            &sales,
            industry,
            params.periodogram_max_period,
            &ChartLabels::new(format!("{industry} periodogram"), "Period", "Power"),
            &out_dir.join(format!("{industry}_periodogram.svg")),
        )?;
    }

    Ok(())
}
