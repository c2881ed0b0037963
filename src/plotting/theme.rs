use plotters::style::{FontDesc, FontStyle, IntoFont, RGBColor};
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;

use crate::error::{ForecastError, Result};

/// Pixels per inch of figure size.
const DPI: f64 = 100.0;

/// Declarative chart settings, as found under `plot_characteristics` in a
/// configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotCharacteristics {
    pub style: String,
    pub color_palette: String,
    pub theme_parameters: ThemeParameters,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeParameters {
    pub axes_spines_right: bool,
    pub axes_spines_top: bool,
    pub grid_alpha: f64,
    /// Width and height in inches.
    pub figure_figsize: [f64; 2],
    pub font_family: String,
    pub axes_titlesize: u32,
    pub figure_facecolor: String,
    pub axes_facecolor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    WhiteGrid,
    DarkGrid,
    White,
    Dark,
    Ticks,
}

impl FromStr for Style {
    type Err = ForecastError;

    fn from_str(style: &str) -> Result<Self> {
        match style {
            "whitegrid" => Ok(Self::WhiteGrid),
            "darkgrid" => Ok(Self::DarkGrid),
            "white" => Ok(Self::White),
            "dark" => Ok(Self::Dark),
            "ticks" => Ok(Self::Ticks),
            other => Err(ForecastError::InvalidArgument(format!("unknown plot style '{other}'"))),
        }
    }
}

impl Style {
    pub fn has_grid(self) -> bool {
        matches!(self, Self::WhiteGrid | Self::DarkGrid)
    }

    fn grid_color(self) -> RGBColor {
        match self {
            Self::DarkGrid | Self::Dark => RGBColor(255, 255, 255),
            _ => RGBColor(0xCC, 0xCC, 0xCC),
        }
    }
}

/// Resolved chart theme passed to every renderer.
#[derive(Debug, Clone)]
pub struct Theme {
    pub style: Style,
    pub palette: Vec<RGBColor>,
    pub spines_right: bool,
    pub spines_top: bool,
    pub grid_alpha: f64,
    /// Width and height in pixels.
    pub size: (u32, u32),
    pub font_family: String,
    pub title_size: u32,
    pub figure_facecolor: RGBColor,
    pub axes_facecolor: RGBColor,
}

impl Theme {
    /// Palette colour for the `index`-th series, cycling.
    pub fn color(&self, index: usize) -> RGBColor {
        self.palette[index % self.palette.len()]
    }

    pub fn grid_color(&self) -> RGBColor {
        self.style.grid_color()
    }

    pub fn title_font(&self) -> FontDesc<'_> {
        (self.font_family.as_str(), f64::from(self.title_size))
            .into_font()
            .style(FontStyle::Bold)
    }

    pub fn label_font(&self) -> FontDesc<'_> {
        (self.font_family.as_str(), 14.0).into_font()
    }
}

/// Validates `plot_characteristics` and resolves it into a [`Theme`].
pub fn set_plot_characteristics(plot_characteristics: &PlotCharacteristics) -> Result<Theme> {
    info!("set_plot_characteristics - Start");

    let parameters = &plot_characteristics.theme_parameters;
    let [width, height] = parameters.figure_figsize;
    if width <= 0.0 || height <= 0.0 {
        return Err(ForecastError::InvalidArgument(format!(
            "figure size must be positive, got {width}x{height}"
        )));
    }
    if !(0.0..=1.0).contains(&parameters.grid_alpha) {
        return Err(ForecastError::InvalidArgument(format!(
            "grid alpha must lie in [0, 1], got {}",
            parameters.grid_alpha
        )));
    }

    let theme = Theme {
        style: plot_characteristics.style.parse()?,
        palette: palette(&plot_characteristics.color_palette)?,
        spines_right: parameters.axes_spines_right,
        spines_top: parameters.axes_spines_top,
        grid_alpha: parameters.grid_alpha,
        size: ((width * DPI).round() as u32, (height * DPI).round() as u32),
        font_family: parameters.font_family.clone(),
        title_size: parameters.axes_titlesize,
        figure_facecolor: parse_color(&parameters.figure_facecolor)?,
        axes_facecolor: parse_color(&parameters.axes_facecolor)?,
    };

    info!("set_plot_characteristics - End");
    Ok(theme)
}

fn palette(name: &str) -> Result<Vec<RGBColor>> {
    let hex: &[&str] = match name {
        "deep" => &[
            "#4C72B0", "#DD8452", "#55A868", "#C44E52", "#8172B3", "#937860", "#DA8BC3", "#8C8C8C",
            "#CCB974", "#64B5CD",
        ],
        "muted" => &[
            "#4878D0", "#EE854A", "#6ACC64", "#D65F5F", "#956CB4", "#8C613C", "#DC7EC0", "#797979",
            "#D5BB67", "#82C6E2",
        ],
        "pastel" => &[
            "#A1C9F4", "#FFB482", "#8DE5A1", "#FF9F9B", "#D0BBFF", "#DEBB9B", "#FAB0E4", "#CFCFCF",
            "#FFFEA3", "#B9F2F0",
        ],
        "bright" => &[
            "#023EFF", "#FF7C00", "#1AC938", "#E8000B", "#8B2BE2", "#9F4800", "#F14CC1", "#A3A3A3",
            "#FFC400", "#00D7FF",
        ],
        "dark" => &[
            "#001C7F", "#B1400D", "#12711C", "#8C0800", "#591E71", "#592F0D", "#A23582", "#3C3C3C",
            "#B8850A", "#006374",
        ],
        "colorblind" => &[
            "#0173B2", "#DE8F05", "#029E73", "#D55E00", "#CC78BC", "#CA9161", "#FBAFE4", "#949494",
            "#ECE133", "#56B4E9",
        ],
        "tab10" => &[
            "#1F77B4", "#FF7F0E", "#2CA02C", "#D62728", "#9467BD", "#8C564B", "#E377C2", "#7F7F7F",
            "#BCBD22", "#17BECF",
        ],
        other => {
            return Err(ForecastError::InvalidArgument(format!(
                "unknown color palette '{other}'"
            )))
        }
    };
    hex.iter().map(|code| parse_color(code)).collect()
}

/// Parses `#RRGGBB` or a handful of named colours.
pub fn parse_color(color: &str) -> Result<RGBColor> {
    let invalid = || ForecastError::InvalidArgument(format!("invalid color '{color}'"));

    let hex = match color.to_ascii_lowercase().as_str() {
        "white" => "FFFFFF".to_string(),
        "black" => "000000".to_string(),
        "whitesmoke" => "F5F5F5".to_string(),
        "lightgray" | "lightgrey" => "D3D3D3".to_string(),
        "gray" | "grey" => "808080".to_string(),
        other => other.strip_prefix('#').ok_or_else(invalid)?.to_string(),
    };
    if hex.len() != 6 {
        return Err(invalid());
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
    };
    Ok(RGBColor(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
