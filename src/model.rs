/// Ambient conditions and their derived metrics for one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Climate {
    pub celsius: f64,
    pub fahrenheit: f64,
    pub humidity: f64,
    /// Vapor pressure deficit at the leaf, in kPa.
    pub vpd: f64,
}

/// Everything sampled in one cycle.
///
/// Only moisture is mandatory; the remaining soil metrics and the climate are
/// absent when their sensor failed.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub timestamp: chrono::NaiveDateTime,
    pub temperature: Option<f64>,
    pub ph: Option<f64>,
    pub conductivity: Option<f64>,
    pub moisture: f64,
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    pub potassium: Option<f64>,
    pub climate: Option<Climate>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub reading: Reading,
    pub irrigation_count: u64,
}
