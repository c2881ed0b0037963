//! Stateless transforms preparing a sales table for analysis and training.
//!
//! Every function borrows its input and returns a new `DataFrame`.

use chrono::{Datelike, NaiveDate, TimeDelta};
use polars::prelude::*;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{ForecastError, Result};

/// Calendar granularity used to bucket a date column.
///
/// Parsed from pandas-style codes. Buckets are labelled by their last day,
/// except [`Frequency::MonthStart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Day,
    /// Weeks running Monday to Sunday.
    Week,
    MonthEnd,
    MonthStart,
    QuarterEnd,
    YearEnd,
}

impl FromStr for Frequency {
    type Err = ForecastError;

    fn from_str(code: &str) -> Result<Self> {
        match code {
            "D" => Ok(Self::Day),
            "W" | "W-SUN" => Ok(Self::Week),
            "M" | "ME" => Ok(Self::MonthEnd),
            "MS" => Ok(Self::MonthStart),
            "Q" | "QE" => Ok(Self::QuarterEnd),
            "Y" | "YE" | "A" => Ok(Self::YearEnd),
            other => Err(ForecastError::InvalidArgument(format!(
                "unsupported frequency '{other}'"
            ))),
        }
    }
}

impl Frequency {
    /// Label of the bucket containing `date`.
    pub fn period_label(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => {
                let to_sunday = 6 - i64::from(date.weekday().num_days_from_monday());
                date + TimeDelta::days(to_sunday)
            }
            Self::MonthEnd => month_end(date.year(), date.month()).unwrap_or(date),
            Self::MonthStart => date.with_day(1).unwrap_or(date),
            Self::QuarterEnd => {
                let quarter_last_month = ((date.month() - 1) / 3 + 1) * 3;
                month_end(date.year(), quarter_last_month).unwrap_or(date)
            }
            Self::YearEnd => NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date),
        }
    }

    /// Every bucket label from the bucket of `first` through `last`.
    pub fn labels_between(self, first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
        let mut labels = Vec::new();
        let mut label = self.period_label(first);
        while label <= last {
            labels.push(label);
            match self.next_label(label) {
                Some(next) if next > label => label = next,
                _ => break,
            }
        }
        labels
    }

    fn next_label(self, label: NaiveDate) -> Option<NaiveDate> {
        let bucket_end = match self {
            Self::MonthStart => month_end(label.year(), label.month())?,
            _ => label,
        };
        Some(self.period_label(bucket_end.succ_opt()?))
    }
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Days between the Unix epoch and `date`, the physical value of a polars `Date`.
pub fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - NaiveDate::default()).num_days() as i32
}

/// Calendar features derivable from a date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seasonality {
    /// Weekday name, e.g. `Wednesday`.
    DayOfWeek,
    /// ISO 8601 week number.
    Week,
}

impl FromStr for Seasonality {
    type Err = ForecastError;

    fn from_str(kind: &str) -> Result<Self> {
        match kind {
            "day_of_week" => Ok(Self::DayOfWeek),
            "week" => Ok(Self::Week),
            other => Err(ForecastError::InvalidArgument(format!(
                "add_seasonality - Seasonality '{other}' not supported"
            ))),
        }
    }
}

impl Seasonality {
    pub fn column_name(self) -> &'static str {
        match self {
            Self::DayOfWeek => "day_of_week",
            Self::Week => "week",
        }
    }

    fn expr(self, date_column: &str) -> Expr {
        let expr = match self {
            Self::DayOfWeek => col(date_column).dt().to_string("%A"),
            Self::Week => col(date_column).dt().week(),
        };
        expr.alias(self.column_name())
    }
}

/// Averages `column` over the calendar buckets of `key`.
///
/// Returns `[key, column]` with one row per bucket from the first populated
/// bucket to the last, sorted by bucket label. Averages are rounded to
/// `decimals`; buckets without rows hold a null average. Rows with a null
/// `key` are dropped.
pub fn group_avg_column_by_frequency(
    data: &DataFrame,
    key: &str,
    column: &str,
    frequency: &str,
    decimals: u32,
) -> Result<DataFrame> {
    info!("group_avg_column_by_frequency - Start");
    info!(
        "group_avg_column_by_frequency - key: {} | frequency: {} | column: {}",
        key, frequency, column
    );

    let frequency: Frequency = frequency.parse()?;

    let dates = data
        .column(key)?
        .as_materialized_series()
        .cast(&DataType::Date)?;
    let labels: Vec<Option<NaiveDate>> = dates
        .date()?
        .as_date_iter()
        .map(|date| date.map(|d| frequency.period_label(d)))
        .collect();
    let buckets = match (labels.iter().flatten().min(), labels.iter().flatten().max()) {
        (Some(&first), Some(&last)) => frequency.labels_between(first, last),
        _ => Vec::new(),
    };

    let averages = DataFrame::new(vec![
        date_column(key, labels.into_iter())?,
        data.column(column)?.clone(),
    ])?
    .lazy()
    .group_by([col(key)])
    .agg([col(column).mean().round(decimals)]);

    let grouped = DataFrame::new(vec![date_column(key, buckets.into_iter().map(Some))?])?
        .lazy()
        .join(averages, [col(key)], [col(key)], JoinArgs::new(JoinType::Left))
        .sort_by_exprs([col(key)], SortMultipleOptions::default())
        .collect()?;

    debug!(groups = grouped.height(), "Grouped data");
    info!("group_avg_column_by_frequency - End");
    Ok(grouped)
}

fn date_column(name: &str, dates: impl Iterator<Item = Option<NaiveDate>>) -> Result<Column> {
    let days: Int32Chunked = dates.map(|date| date.map(days_since_epoch)).collect();
    let dates = days.with_name(name.into()).into_series().cast(&DataType::Date)?;
    Ok(Column::from(dates))
}

/// Appends `time_step`, the zero-based row number.
pub fn add_dummy_time_step(data: &DataFrame) -> Result<DataFrame> {
    let time_step: Vec<i64> = (0..data.height() as i64).collect();

    let mut output = data.clone();
    output.with_column(Column::new("time_step".into(), time_step))?;
    Ok(output)
}

/// Appends `{column}_lag_{lag}`, `column` shifted down by `lag` rows.
///
/// The first `lag` rows become null. A negative lag produces a lead.
pub fn add_lag_feature(data: &DataFrame, column: &str, lag: i64) -> Result<DataFrame> {
    debug!(column, lag, "Adding lag feature");

    Ok(data
        .clone()
        .lazy()
        .with_column(col(column).shift(lit(lag)).alias(format!("{column}_lag_{lag}")))
        .collect()?)
}

/// Appends one calendar column per requested seasonality kind.
///
/// All kinds are validated before the table is touched.
pub fn add_seasonality(data: &DataFrame, date_column: &str, kinds: &[&str]) -> Result<DataFrame> {
    let kinds: Vec<Seasonality> = kinds.iter().map(|kind| kind.parse()).collect::<Result<_>>()?;
    debug!(?kinds, date_column, "Adding seasonality");

    let exprs: Vec<Expr> = kinds.iter().map(|kind| kind.expr(date_column)).collect();
    Ok(data.clone().lazy().with_columns(exprs).collect()?)
}

/// Appends `{column}_moving_average_{window}`, a rolling mean over `window` rows.
pub fn add_moving_average(
    data: &DataFrame,
    column: &str,
    window: usize,
    min_periods: usize,
    center: bool,
) -> Result<DataFrame> {
    if window == 0 || min_periods == 0 || min_periods > window {
        return Err(ForecastError::InvalidArgument(format!(
            "moving average needs 0 < min_periods <= window, \
             got window {window} and min_periods {min_periods}"
        )));
    }

    Ok(data
        .clone()
        .lazy()
        .with_column(
            col(column)
                .cast(DataType::Float64)
                .rolling_mean(RollingOptionsFixedWindow {
                    window_size: window,
                    min_periods,
                    weights: None,
                    center,
                    fn_params: None,
                })
                .alias(format!("{column}_moving_average_{window}")),
        )
        .collect()?)
}

/// Deterministic polynomial time basis for `n_rows` observations.
///
/// Columns are `const` (when requested), `trend` counting from 1, then
/// `trend_squared`, `trend_cubed` and `trend**k` up to `order`.
pub fn trend_features(n_rows: usize, order: usize, constant: bool) -> Result<DataFrame> {
    if order == 0 && !constant {
        return Err(ForecastError::InvalidArgument(
            "trend features need a constant or an order of at least 1".to_string(),
        ));
    }

    let mut columns = Vec::with_capacity(order + 1);
    if constant {
        columns.push(Column::new("const".into(), vec![1.0_f64; n_rows]));
    }
    for power in 1..=order {
        let name = match power {
            1 => "trend".to_string(),
            2 => "trend_squared".to_string(),
            3 => "trend_cubed".to_string(),
            k => format!("trend**{k}"),
        };
        let values: Vec<f64> = (1..=n_rows).map(|t| (t as f64).powi(power as i32)).collect();
        columns.push(Column::new(name.into(), values));
    }

    Ok(DataFrame::new(columns)?)
}

/// Reshapes `columns` from wide to long form.
///
/// Output rows run over `index` first and `columns` second, so row
/// `i * columns.len() + j` holds row `i` of column `j`. The result has the
/// index column, a string `variable_name` column and a `Float64`
/// `value_name` column.
pub fn stack_columns(
    data: &DataFrame,
    index: &str,
    columns: &[&str],
    variable_name: &str,
    value_name: &str,
) -> Result<DataFrame> {
    if columns.is_empty() {
        return Err(ForecastError::InvalidArgument(
            "stack_columns needs at least one column".to_string(),
        ));
    }

    let height = data.height();
    let width = columns.len();

    let positions: Vec<IdxSize> = (0..height as IdxSize)
        .flat_map(|row| std::iter::repeat(row).take(width))
        .collect();
    let index_values = data
        .column(index)?
        .as_materialized_series()
        .take(&IdxCa::from_vec(index.into(), positions))?;

    let variables: Vec<&str> = (0..height).flat_map(|_| columns.iter().copied()).collect();

    let wide: Vec<Series> = columns
        .iter()
        .map(|name| {
            Ok(data
                .column(name)?
                .as_materialized_series()
                .cast(&DataType::Float64)?)
        })
        .collect::<Result<_>>()?;
    let wide: Vec<&Float64Chunked> = wide.iter().map(|s| s.f64()).collect::<PolarsResult<_>>()?;
    let values: Float64Chunked = (0..height)
        .flat_map(|row| wide.iter().map(move |values| values.get(row)))
        .collect();

    Ok(DataFrame::new(vec![
        Column::from(index_values),
        Column::new(variable_name.into(), variables),
        Column::from(values.with_name(value_name.into()).into_series()),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{read_configuration, DataConfig};
    use crate::data_loader::read_data_from_config;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TestConfig {
        test_data_config: DataConfig,
    }

    fn dataset() -> DataFrame {
        let config: TestConfig = read_configuration("test_config.yaml").unwrap();
        read_data_from_config(&config.test_data_config).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_group_avg_column_by_frequency() {
        let grouped =
            group_avg_column_by_frequency(&dataset(), "date", "transactions", "W", 2).unwrap();

        assert_eq!(grouped.height(), 3);
        let averages = grouped.column("transactions").unwrap().f64().unwrap();
        assert_eq!(averages.get(0), Some(1827.6));
        assert_eq!(averages.get(1), Some(1641.09));

        let labels = grouped.column("date").unwrap().cast(&DataType::Int32).unwrap();
        let labels = labels.i32().unwrap();
        assert_eq!(labels.get(0), Some(days_since_epoch(date(2013, 1, 6))));
        assert_eq!(labels.get(1), Some(days_since_epoch(date(2013, 1, 13))));
    }

    #[test]
    fn test_group_avg_column_by_frequency_fills_empty_weeks() {
        let data = df![
            "date" => [date(2013, 1, 1), date(2013, 1, 15)],
            "transactions" => [100.0, 300.0],
        ]
        .unwrap();
        let grouped = group_avg_column_by_frequency(&data, "date", "transactions", "W", 2).unwrap();

        assert_eq!(grouped.height(), 3);
        let labels = grouped.column("date").unwrap().cast(&DataType::Int32).unwrap();
        let labels: Vec<Option<i32>> = labels.i32().unwrap().into_iter().collect();
        assert_eq!(
            labels,
            [date(2013, 1, 6), date(2013, 1, 13), date(2013, 1, 20)]
                .map(|d| Some(days_since_epoch(d)))
        );

        let averages = grouped.column("transactions").unwrap().f64().unwrap();
        assert_eq!(averages.get(0), Some(100.0));
        assert_eq!(averages.get(1), None);
        assert_eq!(averages.get(2), Some(300.0));

        // the week after the gap lags onto the empty week
        let lagged = add_lag_feature(&grouped, "transactions", 1).unwrap();
        let lagged = lagged.column("transactions_lag_1").unwrap().f64().unwrap();
        assert_eq!(lagged.get(2), None);
    }

    #[test]
    fn test_frequency_labels_between() {
        assert_eq!(
            Frequency::MonthStart.labels_between(date(2016, 1, 20), date(2016, 3, 1)),
            [date(2016, 1, 1), date(2016, 2, 1), date(2016, 3, 1)]
        );
        assert_eq!(
            Frequency::MonthEnd.labels_between(date(2016, 1, 20), date(2016, 3, 31)),
            [date(2016, 1, 31), date(2016, 2, 29), date(2016, 3, 31)]
        );
        assert_eq!(
            Frequency::Week.labels_between(date(2013, 1, 2), date(2013, 1, 13)),
            [date(2013, 1, 6), date(2013, 1, 13)]
        );
        assert!(Frequency::Day
            .labels_between(date(2013, 1, 2), date(2013, 1, 1))
            .is_empty());
    }

    #[test]
    fn test_group_avg_column_by_unknown_frequency() {
        let result =
            group_avg_column_by_frequency(&dataset(), "date", "transactions", "fortnight", 2);
        assert!(matches!(result, Err(ForecastError::InvalidArgument(_))));
    }

    #[test]
    fn test_frequency_period_labels() {
        let wednesday = date(2013, 1, 2);
        assert_eq!(Frequency::Day.period_label(wednesday), wednesday);
        assert_eq!(Frequency::Week.period_label(wednesday), date(2013, 1, 6));
        assert_eq!(Frequency::Week.period_label(date(2013, 1, 6)), date(2013, 1, 6));
        assert_eq!(Frequency::MonthEnd.period_label(date(2016, 2, 10)), date(2016, 2, 29));
        assert_eq!(Frequency::MonthEnd.period_label(date(2016, 12, 10)), date(2016, 12, 31));
        assert_eq!(Frequency::MonthStart.period_label(date(2016, 2, 10)), date(2016, 2, 1));
        assert_eq!(Frequency::QuarterEnd.period_label(date(2016, 5, 1)), date(2016, 6, 30));
        assert_eq!(Frequency::YearEnd.period_label(date(2016, 5, 1)), date(2016, 12, 31));
    }

    #[test]
    fn test_add_dummy_time_step() {
        let data = add_dummy_time_step(&dataset()).unwrap();
        let time_step = data.column("time_step").unwrap().i64().unwrap();
        assert_eq!(time_step.get(0), Some(0));
        assert_eq!(time_step.get(3), Some(3));
        assert_eq!(time_step.len(), data.height());
    }

    #[test]
    fn test_add_lag_feature() {
        let data = add_lag_feature(&dataset(), "transactions", 2).unwrap();
        let lagged = data.column("transactions_lag_2").unwrap().i64().unwrap();
        assert_eq!(lagged.get(0), None);
        assert_eq!(lagged.get(1), None);
        assert_eq!(lagged.get(3), Some(2111));
    }

    #[test]
    fn test_add_seasonality_day_of_week() {
        let data = add_seasonality(&dataset(), "date", &["day_of_week"]).unwrap();
        let day_of_week = data.column("day_of_week").unwrap().str().unwrap();
        assert_eq!(day_of_week.get(0), Some("Tuesday"));
        assert_eq!(day_of_week.get(3), Some("Wednesday"));
    }

    #[test]
    fn test_add_seasonality_week() {
        let data = add_seasonality(&dataset(), "date", &["week"]).unwrap();
        let week = data.column("week").unwrap().cast(&DataType::Int64).unwrap();
        assert_eq!(week.i64().unwrap().get(5), Some(1));
        assert_eq!(week.i64().unwrap().get(23), Some(3));
    }

    #[test]
    fn test_add_seasonality_wrong_kind() {
        let result = add_seasonality(&dataset(), "date", &["week", "wrong_seasonality"]);
        assert!(matches!(result, Err(ForecastError::InvalidArgument(_))));
    }

    #[test]
    fn test_add_moving_average() {
        let data = add_moving_average(&dataset(), "transactions", 2, 2, false).unwrap();
        let average = data.column("transactions_moving_average_2").unwrap().f64().unwrap();
        assert_eq!(average.get(0), None);
        assert_eq!(average.get(1), Some((770.0 + 2111.0) / 2.0));
    }

    #[test]
    fn test_add_moving_average_rejects_bad_window() {
        let result = add_moving_average(&dataset(), "transactions", 3, 4, true);
        assert!(matches!(result, Err(ForecastError::InvalidArgument(_))));
    }

    #[test]
    fn test_trend_features() {
        let trend = trend_features(4, 3, true).unwrap();
        let names: Vec<String> = trend.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["const", "trend", "trend_squared", "trend_cubed"]);

        assert_eq!(trend.column("const").unwrap().f64().unwrap().get(3), Some(1.0));
        assert_eq!(trend.column("trend").unwrap().f64().unwrap().get(0), Some(1.0));
        assert_eq!(trend.column("trend_squared").unwrap().f64().unwrap().get(2), Some(9.0));
        assert_eq!(trend.column("trend_cubed").unwrap().f64().unwrap().get(1), Some(8.0));
    }

    #[test]
    fn test_stack_columns() {
        let wide = df![
            "Month" => [1i32, 2, 3],
            "A" => [10.0, 20.0, 30.0],
            "B" => [1.0, 2.0, 3.0],
        ]
        .unwrap();

        let long = stack_columns(&wide, "Month", &["A", "B"], "industry", "sales").unwrap();
        assert_eq!(long.height(), 6);

        let months = long.column("Month").unwrap().i32().unwrap();
        let industries = long.column("industry").unwrap().str().unwrap();
        let sales = long.column("sales").unwrap().f64().unwrap();
        assert_eq!(months.get(2), Some(2));
        assert_eq!(industries.get(2), Some("A"));
        assert_eq!(industries.get(3), Some("B"));
        assert_eq!(sales.get(3), Some(2.0));
        assert_eq!(sales.get(4), Some(30.0));
    }
}
