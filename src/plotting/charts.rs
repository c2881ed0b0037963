//! Exploratory charts rendered to SVG.
//!
//! Every renderer takes the resolved [`Theme`], reads its columns from a
//! `DataFrame` and writes one SVG file. Date columns are plotted as days
//! since the Unix epoch and labelled as ISO dates.

use augurs::seasons::PeriodogramDetector;
use chrono::{NaiveDate, TimeDelta};
use ndarray::Array2;
use plotters::coord::Shift;
use plotters::prelude::*;
use polars::prelude::*;
use std::fmt::Display;
use std::fs;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, instrument};

use super::theme::Theme;
use crate::data_preparation::add_moving_average;
use crate::error::{ForecastError, Result};
use crate::models::traits::column_as_f64;
use crate::models::LinearRegression;

/// Title and axis labels of a chart.
#[derive(Debug, Clone, Default)]
pub struct ChartLabels {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
}

impl ChartLabels {
    pub fn new(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerKind {
    Line,
    Scatter,
}

struct Layer {
    label: String,
    kind: LayerKind,
    points: Vec<(f64, f64)>,
}

impl Layer {
    fn line(label: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        Self {
            label: label.into(),
            kind: LayerKind::Line,
            points,
        }
    }

    fn scatter(label: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        Self {
            label: label.into(),
            kind: LayerKind::Scatter,
            points,
        }
    }
}

/// How x tick values are printed.
enum XFormat {
    Number,
    Date,
    Categories(Vec<String>),
}

impl XFormat {
    fn format(&self, x: f64) -> String {
        match self {
            Self::Number => format!("{x:.1}"),
            Self::Date => NaiveDate::default()
                .checked_add_signed(TimeDelta::days(x.round() as i64))
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            Self::Categories(names) => {
                let index = x.round();
                if index >= 0.0 && (index - x).abs() < 1e-6 {
                    names.get(index as usize).cloned().unwrap_or_default()
                } else {
                    String::new()
                }
            }
        }
    }
}

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

fn plot_error<E: Display>(error: E) -> ForecastError {
    ForecastError::Plot(error.to_string())
}

/// Values of `column` as `f64`; dates become days since the epoch.
fn axis_values(data: &DataFrame, column: &str) -> Result<(Vec<Option<f64>>, XFormat)> {
    let values = data.column(column)?;
    let (values, format) = match values.dtype() {
        DataType::Date => (values.cast(&DataType::Int32)?, XFormat::Date),
        DataType::Datetime(_, _) => (
            values.cast(&DataType::Date)?.cast(&DataType::Int32)?,
            XFormat::Date,
        ),
        _ => (values.clone(), XFormat::Number),
    };
    let values = values.cast(&DataType::Float64)?;
    Ok((values.f64()?.into_iter().collect(), format))
}

fn pair_points(x: &[Option<f64>], y: &[Option<f64>]) -> Vec<(f64, f64)> {
    x.iter()
        .zip(y)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect()
}

fn padded_range(values: impl Iterator<Item = f64>) -> Result<Range<f64>> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return Err(ForecastError::InvalidInput("nothing to plot".to_string()));
    }
    if min == max {
        return Ok(min - 1.0..max + 1.0);
    }
    let padding = (max - min) * 0.05;
    Ok(min - padding..max + padding)
}

/// Least-squares line through `points`, evaluated at the extreme x values.
fn fit_line(points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>> {
    let x = Array2::from_shape_vec((points.len(), 1), points.iter().map(|p| p.0).collect())?;
    let y = Array2::from_shape_vec((points.len(), 1), points.iter().map(|p| p.1).collect())?;

    let mut model = LinearRegression::new(true);
    model.fit_matrix(&x, &y)?;

    let x_range = padded_range(points.iter().map(|p| p.0))?;
    let ends = Array2::from_shape_vec((2, 1), vec![x_range.start, x_range.end])?;
    let fitted = model.predict_matrix(&ends)?;
    Ok(vec![
        (x_range.start, fitted[[0, 0]]),
        (x_range.end, fitted[[1, 0]]),
    ])
}

fn svg_root<'a>(theme: &Theme, out: &'a Path) -> Result<Area<'a>> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let root = SVGBackend::new(out, theme.size).into_drawing_area();
    root.fill(&theme.figure_facecolor).map_err(plot_error)?;
    Ok(root)
}

/// Draws `layers` on one cartesian chart filling `area`.
fn draw_layers(
    area: &Area<'_>,
    theme: &Theme,
    labels: &ChartLabels,
    x_format: &XFormat,
    layers: &[Layer],
) -> Result<()> {
    let x_range = padded_range(layers.iter().flat_map(|l| l.points.iter().map(|p| p.0)))?;
    let y_range = padded_range(layers.iter().flat_map(|l| l.points.iter().map(|p| p.1)))?;

    let mut chart = ChartBuilder::on(area)
        .caption(&labels.title, theme.title_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range.clone(), y_range.clone())
        .map_err(plot_error)?;
    chart
        .plotting_area()
        .fill(&theme.axes_facecolor)
        .map_err(plot_error)?;

    let x_formatter = |x: &f64| x_format.format(*x);
    let mut mesh = chart.configure_mesh();
    mesh.x_desc(labels.x_label.as_str())
        .y_desc(labels.y_label.as_str())
        .axis_desc_style(theme.label_font())
        .x_label_formatter(&x_formatter);
    if theme.style.has_grid() {
        mesh.bold_line_style(theme.grid_color().mix(theme.grid_alpha).stroke_width(1))
            .light_line_style(theme.grid_color().mix(theme.grid_alpha / 2.0).stroke_width(1));
    } else {
        mesh.disable_mesh();
    }
    mesh.draw().map_err(plot_error)?;

    if theme.spines_top {
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x_range.start, y_range.end), (x_range.end, y_range.end)],
                BLACK.stroke_width(1),
            )))
            .map_err(plot_error)?;
    }
    if theme.spines_right {
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x_range.end, y_range.start), (x_range.end, y_range.end)],
                BLACK.stroke_width(1),
            )))
            .map_err(plot_error)?;
    }

    for (index, layer) in layers.iter().enumerate() {
        let color = theme.color(index);
        match layer.kind {
            LayerKind::Line => {
                chart
                    .draw_series(LineSeries::new(
                        layer.points.iter().copied(),
                        color.stroke_width(2),
                    ))
                    .map_err(plot_error)?
                    .label(layer.label.as_str())
                    .legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
            }
            LayerKind::Scatter => {
                chart
                    .draw_series(
                        layer
                            .points
                            .iter()
                            .map(|&point| Circle::new(point, 3, color.mix(0.6).filled())),
                    )
                    .map_err(plot_error)?
                    .label(layer.label.as_str())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
            }
        }
    }

    if layers.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8).filled())
            .border_style(BLACK.stroke_width(1))
            .label_font(theme.label_font())
            .draw()
            .map_err(plot_error)?;
    }

    Ok(())
}

fn render(
    theme: &Theme,
    labels: &ChartLabels,
    x_format: &XFormat,
    layers: &[Layer],
    out: &Path,
) -> Result<()> {
    let root = svg_root(theme, out)?;
    draw_layers(&root, theme, labels, x_format, layers)?;
    root.present().map_err(plot_error)?;
    debug!(path = %out.display(), "Chart written");
    Ok(())
}

/// Line chart of `y_column` against `x_column`.
pub fn plot_time_series(
    theme: &Theme,
    time_series: &DataFrame,
    x_column: &str,
    y_column: &str,
    labels: &ChartLabels,
    out: &Path,
) -> Result<()> {
    info!("plot_time_series - Start");
    let (x, x_format) = axis_values(time_series, x_column)?;
    let (y, _) = axis_values(time_series, y_column)?;

    let layers = [Layer::line(y_column, pair_points(&x, &y))];
    render(theme, labels, &x_format, &layers, out)?;
    info!("plot_time_series - End");
    Ok(())
}

/// The observed series with `predictions` overlaid.
pub fn plot_predictions_vs_time_series(
    theme: &Theme,
    time_series: &DataFrame,
    predictions: &[f64],
    x_column: &str,
    y_column: &str,
    labels: &ChartLabels,
    out: &Path,
) -> Result<()> {
    info!("plot_predictions_vs_time_series - Start");
    if predictions.len() != time_series.height() {
        return Err(ForecastError::InvalidInput(format!(
            "got {} predictions for {} rows",
            predictions.len(),
            time_series.height()
        )));
    }

    let (x, x_format) = axis_values(time_series, x_column)?;
    let (y, _) = axis_values(time_series, y_column)?;
    let predicted: Vec<Option<f64>> = predictions.iter().copied().map(Some).collect();

    let layers = [
        Layer::line(y_column, pair_points(&x, &y)),
        Layer::line("predictions", pair_points(&x, &predicted)),
    ];
    render(theme, labels, &x_format, &layers, out)?;
    info!("plot_predictions_vs_time_series - End");
    Ok(())
}

/// Scatter of `y_column` against `x_column` with its least-squares line.
pub fn plot_regression(
    theme: &Theme,
    data: &DataFrame,
    x_column: &str,
    y_column: &str,
    labels: &ChartLabels,
    out: &Path,
) -> Result<()> {
    info!("plot_regression - Start");
    let (x, x_format) = axis_values(data, x_column)?;
    let (y, _) = axis_values(data, y_column)?;
    let points = pair_points(&x, &y);
    let fitted = fit_line(&points)?;

    let layers = [Layer::scatter(y_column, points), Layer::line("fit", fitted)];
    render(theme, labels, &x_format, &layers, out)?;
    info!("plot_regression - End");
    Ok(())
}

/// The series as points with its centred moving average over `window` rows.
pub fn plot_moving_average(
    theme: &Theme,
    data: &DataFrame,
    x_column: &str,
    y_column: &str,
    window: usize,
    labels: &ChartLabels,
    out: &Path,
) -> Result<()> {
    info!("plot_moving_average - Start");
    let min_periods = window.div_ceil(2).max(1);
    let averaged = add_moving_average(data, y_column, window, min_periods, true)?;
    let average_column = format!("{y_column}_moving_average_{window}");

    let (x, x_format) = axis_values(&averaged, x_column)?;
    let (y, _) = axis_values(&averaged, y_column)?;
    let (average, _) = axis_values(&averaged, &average_column)?;

    let layers = [
        Layer::scatter(y_column, pair_points(&x, &y)),
        Layer::line(average_column.as_str(), pair_points(&x, &average)),
    ];
    render(theme, labels, &x_format, &layers, out)?;
    info!("plot_moving_average - End");
    Ok(())
}

/// Grid of lag plots: `column` at time t against t - k for each k in `lags`.
#[instrument(skip(theme, data, out))]
pub fn plot_lags(
    theme: &Theme,
    data: &DataFrame,
    column: &str,
    lags: &[usize],
    n_cols: usize,
    title: &str,
    out: &Path,
) -> Result<()> {
    info!("plot_lags - Start");
    if lags.is_empty() || n_cols == 0 {
        return Err(ForecastError::InvalidArgument(
            "plot_lags needs at least one lag and one column".to_string(),
        ));
    }

    let (values, _) = axis_values(data, column)?;
    let n_rows = lags.len().div_ceil(n_cols);

    let root = svg_root(theme, out)?;
    let body = root.titled(title, theme.title_font()).map_err(plot_error)?;
    let panels = body.split_evenly((n_rows, n_cols));

    for (panel, &lag) in panels.iter().zip(lags) {
        if lag == 0 || lag >= values.len() {
            return Err(ForecastError::InvalidArgument(format!(
                "lag {lag} is out of range for {} rows",
                values.len()
            )));
        }
        let points = pair_points(&values[..values.len() - lag], &values[lag..]);
        let fitted = fit_line(&points)?;
        let labels = ChartLabels::new(format!("Lag {lag}"), format!("{column}_lag_{lag}"), column);
        let layers = [Layer::scatter(column, points), Layer::line("fit", fitted)];
        draw_layers(panel, theme, &labels, &XFormat::Number, &layers)?;
    }

    root.present().map_err(plot_error)?;
    info!("plot_lags - End");
    Ok(())
}

/// One line per distinct `period` value, tracing `y_column` across the
/// categories of `freq`.
///
/// For example `period = "week"` and `freq = "day_of_week"` overlays the
/// weekly profile of every week.
pub fn plot_seasonality(
    theme: &Theme,
    data: &DataFrame,
    period: &str,
    freq: &str,
    y_column: &str,
    labels: &ChartLabels,
    out: &Path,
) -> Result<()> {
    info!("plot_seasonality - Start");
    let periods = string_values(data, period)?;
    let freqs = string_values(data, freq)?;
    let (y, _) = axis_values(data, y_column)?;

    let mut categories: Vec<String> = Vec::new();
    let mut lines: Vec<(String, Vec<(f64, f64)>)> = Vec::new();
    for ((period_value, freq_value), y_value) in periods.into_iter().zip(freqs).zip(y) {
        let (Some(period_value), Some(freq_value), Some(y_value)) =
            (period_value, freq_value, y_value)
        else {
            continue;
        };
        let position = match categories.iter().position(|c| *c == freq_value) {
            Some(position) => position,
            None => {
                categories.push(freq_value);
                categories.len() - 1
            }
        };
        let x = position as f64;
        match lines.iter_mut().find(|(name, _)| *name == period_value) {
            Some((_, points)) => points.push((x, y_value)),
            None => lines.push((period_value, vec![(x, y_value)])),
        }
    }

    let layers: Vec<Layer> = lines
        .into_iter()
        .map(|(name, points)| Layer::line(format!("{period} {name}"), points))
        .collect();
    render(theme, labels, &XFormat::Categories(categories), &layers, out)?;
    info!("plot_seasonality - End");
    Ok(())
}

fn string_values(data: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let values = data.column(column)?.cast(&DataType::String)?;
    Ok(values
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

const MIN_PERIOD: u32 = 2;

/// Shortest series whose Welch segments hold two samples.
const MIN_PERIODOGRAM_LEN: usize = 4;

/// Periodogram power of `column` for periods 2..=`max_period`, on a log axis.
///
/// `column` must be free of nulls and hold at least four values.
pub fn plot_periodogram(
    theme: &Theme,
    data: &DataFrame,
    column: &str,
    max_period: u32,
    labels: &ChartLabels,
    out: &Path,
) -> Result<()> {
    info!("plot_periodogram - Start");
    if max_period < MIN_PERIOD {
        return Err(ForecastError::InvalidArgument(format!(
            "periodogram max period must be at least {MIN_PERIOD}, got {max_period}"
        )));
    }
    let values = column_as_f64(data.column(column)?)?;
    if values.len() < MIN_PERIODOGRAM_LEN {
        return Err(ForecastError::InvalidInput(format!(
            "periodogram of '{column}' needs at least {MIN_PERIODOGRAM_LEN} values, got {}",
            values.len()
        )));
    }

    let detector = PeriodogramDetector::builder()
        .min_period(MIN_PERIOD)
        .max_period(max_period)
        .build();
    let periodogram = detector.periodogram(&values);
    let points: Vec<(f64, f64)> = periodogram
        .periods
        .iter()
        .zip(&periodogram.powers)
        .map(|(&period, &power)| (f64::from(period), power))
        .filter(|(_, power)| power.is_finite())
        .collect();
    debug!(points = points.len(), "Periodogram computed");

    let x_range = padded_range(points.iter().map(|p| p.0))?;
    let y_range = padded_range(points.iter().map(|p| p.1))?;
    let x_range = x_range.start.max(1.0)..x_range.end;

    let root = svg_root(theme, out)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(&labels.title, theme.title_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range.log_scale(), 0.0_f64.min(y_range.start)..y_range.end)
        .map_err(plot_error)?;
    chart
        .plotting_area()
        .fill(&theme.axes_facecolor)
        .map_err(plot_error)?;

    let mut mesh = chart.configure_mesh();
    mesh.x_desc(labels.x_label.as_str())
        .y_desc(labels.y_label.as_str())
        .axis_desc_style(theme.label_font());
    if !theme.style.has_grid() {
        mesh.disable_mesh();
    }
    mesh.draw().map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(points, theme.color(0).stroke_width(2)))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    info!("plot_periodogram - End");
    Ok(())
}
