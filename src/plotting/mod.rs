//! Chart theming and rendering.

mod charts;
mod theme;

pub use charts::{
    plot_lags, plot_moving_average, plot_periodogram, plot_predictions_vs_time_series,
    plot_regression, plot_seasonality, plot_time_series, ChartLabels,
};
pub use theme::{
    parse_color, set_plot_characteristics, PlotCharacteristics, Style, Theme, ThemeParameters,
};
