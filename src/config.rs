use std::collections;
use std::path;
use std::time;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_sensor_address")]
    pub sensor_address: u8,
    #[serde(default = "default_serial_device")]
    pub serial_device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_serial_timeout_ms")]
    pub serial_timeout_ms: u64,
    #[serde(default = "default_moisture_threshold")]
    pub moisture_threshold: f64,
    #[serde(default, deserialize_with = "deserialize_grow_start_date")]
    pub grow_start_date: Option<chrono::NaiveDate>,
    #[serde(default = "default_water_duration_seconds")]
    pub water_duration_seconds: f64,
    #[serde(default = "default_lag_window_cycles")]
    pub lag_window_cycles: usize,
    #[serde(default = "default_cycle_interval_seconds")]
    pub cycle_interval_seconds: f64,
    #[serde(default = "default_report_every_cycles")]
    pub report_every_cycles: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: path::PathBuf,
    #[serde(default)]
    pub soil_temperature_unit: TemperatureUnit,
    #[serde(default)]
    pub conductivity_unit: ConductivityUnit,
    #[serde(default = "default_climate_device")]
    pub climate_device: path::PathBuf,
    #[serde(default)]
    pub outlet: Outlet,
    #[serde(default)]
    pub active_low: bool,
    #[serde(default)]
    pub pins: PinMap,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl Default for TemperatureUnit {
    fn default() -> Self {
        TemperatureUnit::Fahrenheit
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConductivityUnit {
    /// Device units, µS/cm.
    Raw,
    Ppm,
}

impl Default for ConductivityUnit {
    fn default() -> Self {
        ConductivityUnit::Ppm
    }
}

/// The switched outputs wired to the relay board.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
pub enum Outlet {
    #[serde(rename = "nutrient_pump_1")]
    NutrientPump1,
    #[serde(rename = "nutrient_pump_2")]
    NutrientPump2,
    #[serde(rename = "main_water_pump")]
    MainWaterPump,
    #[serde(rename = "irrigation")]
    Irrigation,
}

impl Default for Outlet {
    fn default() -> Self {
        Outlet::Irrigation
    }
}

/// BCM pin numbers of every line the controller knows about.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PinMap {
    pub nutrient_pump_1: u64,
    pub nutrient_pump_2: u64,
    pub main_water_pump: u64,
    pub irrigation: u64,
    pub climate: u64,
}

impl Default for PinMap {
    fn default() -> Self {
        PinMap {
            nutrient_pump_1: 5,
            nutrient_pump_2: 13,
            main_water_pump: 20,
            irrigation: 26,
            climate: 24,
        }
    }
}

impl PinMap {
    pub fn pin(&self, outlet: Outlet) -> u64 {
        match outlet {
            Outlet::NutrientPump1 => self.nutrient_pump_1,
            Outlet::NutrientPump2 => self.nutrient_pump_2,
            Outlet::MainWaterPump => self.main_water_pump,
            Outlet::Irrigation => self.irrigation,
        }
    }

    fn validate(&self) -> Result<(), failure::Error> {
        let lines = [
            ("nutrient_pump_1", self.nutrient_pump_1),
            ("nutrient_pump_2", self.nutrient_pump_2),
            ("main_water_pump", self.main_water_pump),
            ("irrigation", self.irrigation),
            ("climate", self.climate),
        ];
        let mut seen = collections::HashMap::new();

        for &(name, pin) in &lines {
            if let Some(other) = seen.insert(pin, name) {
                failure::bail!("pins {} and {} are both mapped to GPIO {}", other, name, pin);
            }
        }

        Ok(())
    }
}

impl Config {
    /// Reads `path` (any format the `config` crate knows, optional) overlaid
    /// with `PRECIP_*` environment variables.
    pub fn load(path: &path::Path) -> Result<Self, failure::Error> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix("PRECIP").try_parsing(true))
            .build()?;

        Config::from_settings(settings)
    }

    pub fn from_settings(settings: ::config::Config) -> Result<Self, failure::Error> {
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), failure::Error> {
        failure::ensure!(
            (1..=247).contains(&self.sensor_address),
            "sensor_address {} is not a valid Modbus slave address",
            self.sensor_address
        );
        failure::ensure!(
            self.moisture_threshold.is_finite()
                && (0.0..=100.0).contains(&self.moisture_threshold),
            "moisture_threshold {} is not a percentage",
            self.moisture_threshold
        );
        failure::ensure!(
            self.water_duration_seconds.is_finite() && self.water_duration_seconds > 0.0,
            "water_duration_seconds must be positive"
        );
        failure::ensure!(
            self.cycle_interval_seconds.is_finite() && self.cycle_interval_seconds > 0.0,
            "cycle_interval_seconds must be positive"
        );
        failure::ensure!(self.lag_window_cycles >= 1, "lag_window_cycles must be at least 1");
        failure::ensure!(
            self.report_every_cycles >= 1,
            "report_every_cycles must be at least 1"
        );
        self.pins.validate()
    }

    pub fn water_duration(&self) -> time::Duration {
        time::Duration::from_secs_f64(self.water_duration_seconds)
    }

    pub fn cycle_interval(&self) -> time::Duration {
        time::Duration::from_secs_f64(self.cycle_interval_seconds)
    }

    pub fn serial_timeout(&self) -> time::Duration {
        time::Duration::from_millis(self.serial_timeout_ms)
    }

    pub fn grow_start(&self) -> Option<chrono::NaiveDateTime> {
        self.grow_start_date
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }

    pub fn log_path(&self) -> path::PathBuf {
        self.data_dir
            .join(format!("sensor_data_{}.csv", self.sensor_address))
    }

    pub fn outlet_pin(&self) -> u64 {
        self.pins.pin(self.outlet)
    }
}

fn default_sensor_address() -> u8 {
    1
}

fn default_serial_device() -> String {
    "/dev/ttyS0".to_owned()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_serial_timeout_ms() -> u64 {
    1000
}

fn default_moisture_threshold() -> f64 {
    20.0
}

fn default_water_duration_seconds() -> f64 {
    15.0
}

fn default_lag_window_cycles() -> usize {
    2
}

fn default_cycle_interval_seconds() -> f64 {
    900.0
}

fn default_report_every_cycles() -> u64 {
    200
}

fn default_data_dir() -> path::PathBuf {
    path::PathBuf::from(".")
}

fn default_climate_device() -> path::PathBuf {
    path::PathBuf::from("/sys/bus/iio/devices/iio:device0")
}

fn deserialize_grow_start_date<'de, D>(
    deserializer: D,
) -> Result<Option<chrono::NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = <String as serde::Deserialize>::deserialize(deserializer)?;

    chrono::NaiveDate::parse_from_str(raw.trim(), "%m-%d-%Y")
        .map(Some)
        .map_err(|e| {
            serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(&raw),
                &format!("a month-day-year date like \"3-21-2020\": {}", e).as_str(),
            )
        })
}
