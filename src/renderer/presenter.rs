//! Turning numeric fields into text

use crate::config::ConsoleConfig;
use crate::provider::BarSize;

/// Draws bar, gauge, graph and percentage fields. Values are in `0.0..=100.0`.
pub trait Presenter {
    fn bar(&self, value: f64, size: BarSize) -> String;

    fn gauge(&self, value: f64, size: BarSize) -> String;

    fn graph(&self, value: f64, size: BarSize) -> String;

    fn percentage(&self, value: u8) -> String {
        value.to_string()
    }
}

/// Glyphs for a five-step gauge, empty to full
const GAUGE: [&str; 5] = ["_. ", "\\. ", " | ", " ./", " ._"];

/// Plain-text presenter for terminal output
#[derive(Debug, Clone)]
pub struct ConsolePresenter {
    config: ConsoleConfig,
}

impl ConsolePresenter {
    pub fn new(config: ConsoleConfig) -> Self {
        Self { config }
    }
}

impl Default for ConsolePresenter {
    fn default() -> Self {
        Self::new(ConsoleConfig::default())
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

impl Presenter for ConsolePresenter {
    fn bar(&self, value: f64, size: BarSize) -> String {
        let width = size
            .width
            .map_or(self.config.bar_width, |w| w as usize);
        let filled = ((clamp_percent(value) * width as f64 / 100.0).round() as usize).min(width);

        let mut out = String::with_capacity(width);
        out.extend(std::iter::repeat(self.config.bar_fill).take(filled));
        out.extend(std::iter::repeat(self.config.bar_unfill).take(width - filled));
        out
    }

    fn gauge(&self, value: f64, _size: BarSize) -> String {
        let step = (clamp_percent(value) * 4.0 / 100.0).round() as usize;
        GAUGE[step.min(GAUGE.len() - 1)].to_string()
    }

    fn graph(&self, value: f64, _size: BarSize) -> String {
        format!("{}", clamp_percent(value).round() as u8)
    }
}
