//! Combines the soil probe and the ambient sensor into one [`Reading`].

use crate::config;
use crate::error;
use crate::model;
use crate::sensors;
use crate::sensors::climate;
use crate::util;

/// Canopy is assumed this much cooler than the surrounding air, in °C.
const LEAF_OFFSET: f64 = 2.5;

/// Saturation vapor pressure in kPa at the given temperature (Tetens).
pub fn saturation_vapor_pressure(celsius: f64) -> f64 {
    (610.78 * (celsius / (celsius + 238.3) * 17.2694).exp()) / 1000.0
}

/// Leaf vapor pressure deficit in kPa, rounded to 3 decimals.
pub fn vapor_pressure_deficit(air_celsius: f64, humidity: f64) -> f64 {
    let svp = saturation_vapor_pressure(air_celsius - LEAF_OFFSET);
    util::round_to(svp * (1.0 - humidity / 100.0), 3)
}

impl From<climate::AirSample> for model::Climate {
    fn from(sample: climate::AirSample) -> Self {
        model::Climate {
            celsius: sample.celsius,
            fahrenheit: util::round_to(sample.celsius * 9.0 / 5.0 + 32.0, 2),
            humidity: sample.humidity,
            vpd: vapor_pressure_deficit(sample.celsius, sample.humidity),
        }
    }
}

pub struct Aggregator<S, C> {
    log: slog::Logger,
    port: S,
    probe: sensors::EnvironmentProbe<C>,
    temperature_unit: config::TemperatureUnit,
    conductivity_unit: config::ConductivityUnit,
}

impl<S, C> Aggregator<S, C>
where
    S: sensors::SensorPort,
    C: climate::ClimateSensor,
{
    pub fn new(
        log: slog::Logger,
        port: S,
        probe: sensors::EnvironmentProbe<C>,
        temperature_unit: config::TemperatureUnit,
        conductivity_unit: config::ConductivityUnit,
    ) -> Self {
        Aggregator {
            log,
            port,
            probe,
            temperature_unit,
            conductivity_unit,
        }
    }

    /// Produces the reading for this cycle.
    ///
    /// Moisture is read first and its failure aborts the sample; every other
    /// metric and the ambient probe degrade to an absent value.
    pub async fn sample(
        &mut self,
        timestamp: chrono::NaiveDateTime,
    ) -> Result<model::Reading, error::SensorReadError> {
        let moisture = self.port.read(sensors::Metric::Moisture)?;

        let nitrogen = self.optional(sensors::Metric::Nitrogen);
        let phosphorus = self.optional(sensors::Metric::Phosphorus);
        let potassium = self.optional(sensors::Metric::Potassium);
        let ph = self.optional(sensors::Metric::Ph);

        let temperature_unit = self.temperature_unit;
        let temperature = self
            .optional(sensors::Metric::Temperature)
            .map(|celsius| match temperature_unit {
                config::TemperatureUnit::Celsius => celsius,
                config::TemperatureUnit::Fahrenheit => sensors::celsius_to_fahrenheit(celsius),
            });

        let conductivity_unit = self.conductivity_unit;
        let conductivity = self
            .optional(sensors::Metric::Conductivity)
            .map(|raw| match conductivity_unit {
                config::ConductivityUnit::Raw => raw,
                config::ConductivityUnit::Ppm => sensors::conductivity_to_ppm(raw),
            });

        let climate = match self.probe.read().await {
            Ok(sample) => Some(model::Climate::from(sample)),
            Err(e) => {
                warn!(self.log, "continuing without ambient readings"; "error" => %e);
                None
            }
        };

        Ok(model::Reading {
            timestamp,
            temperature,
            ph,
            conductivity,
            moisture,
            nitrogen,
            phosphorus,
            potassium,
            climate,
        })
    }

    fn optional(&mut self, metric: sensors::Metric) -> Option<f64> {
        match self.port.read(metric) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(self.log, "soil metric unavailable this cycle";
                      "metric" => metric.name(), "error" => %e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections;
    use std::io;

    use super::*;
    use crate::error::{BusError, SensorReadError};

    struct Soil(collections::HashMap<sensors::Metric, f64>);

    impl sensors::SensorPort for Soil {
        fn read(&mut self, metric: sensors::Metric) -> Result<f64, SensorReadError> {
            self.0.get(&metric).cloned().ok_or_else(|| SensorReadError {
                metric,
                cause: BusError::Exception(0x02),
            })
        }
    }

    struct Air(Option<climate::AirSample>);

    impl climate::ClimateSensor for Air {
        fn sample(&mut self) -> io::Result<climate::AirSample> {
            self.0
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no response"))
        }
    }

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, o!())
    }

    fn full_soil() -> Soil {
        let mut values = collections::HashMap::new();
        values.insert(sensors::Metric::Ph, 6.5);
        values.insert(sensors::Metric::Moisture, 31.2);
        values.insert(sensors::Metric::Temperature, 20.0);
        values.insert(sensors::Metric::Conductivity, 316.0);
        values.insert(sensors::Metric::Nitrogen, 40.0);
        values.insert(sensors::Metric::Phosphorus, 12.0);
        values.insert(sensors::Metric::Potassium, 88.0);
        Soil(values)
    }

    fn aggregator(soil: Soil, air: Air) -> Aggregator<Soil, Air> {
        Aggregator::new(
            logger(),
            soil,
            sensors::EnvironmentProbe::new(logger(), air),
            config::TemperatureUnit::Fahrenheit,
            config::ConductivityUnit::Ppm,
        )
    }

    fn timestamp() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2020, 3, 21)
            .and_then(|d| d.and_hms_opt(8, 15, 0))
            .unwrap()
    }

    #[test]
    fn vpd_uses_leaf_temperature() {
        let svp = saturation_vapor_pressure(25.0 - LEAF_OFFSET);
        let vpd = vapor_pressure_deficit(25.0, 60.0);

        assert!((svp - 2.71).abs() < 0.01, "svp was {}", svp);
        assert!((vpd - 1.089).abs() <= 0.01, "vpd was {}", vpd);
        assert_eq!(vpd, 1.084);
    }

    #[test]
    fn saturated_air_has_no_deficit() {
        assert_eq!(vapor_pressure_deficit(30.0, 100.0), 0.0);
    }

    #[test]
    fn climate_carries_display_fahrenheit() {
        let climate = model::Climate::from(climate::AirSample {
            humidity: 60.0,
            celsius: 25.0,
        });

        assert_eq!(climate.fahrenheit, 77.0);
        assert_eq!(climate.vpd, 1.084);
    }

    #[tokio::test(start_paused = true)]
    async fn converts_units_of_a_full_sample() {
        let air = Air(Some(climate::AirSample {
            humidity: 60.0,
            celsius: 25.0,
        }));
        let reading = aggregator(full_soil(), air).sample(timestamp()).await.unwrap();

        assert_eq!(reading.timestamp, timestamp());
        assert_eq!(reading.moisture, 31.2);
        assert_eq!(reading.temperature, Some(68.0));
        assert_eq!(reading.conductivity, Some(200.0));
        assert_eq!(reading.ph, Some(6.5));
        assert_eq!(reading.potassium, Some(88.0));
        assert_eq!(reading.climate.map(|c| c.humidity), Some(60.0));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_probe_leaves_climate_empty() {
        let reading = aggregator(full_soil(), Air(None))
            .sample(timestamp())
            .await
            .unwrap();

        assert_eq!(reading.climate, None);
        assert_eq!(reading.moisture, 31.2);
        assert_eq!(reading.nitrogen, Some(40.0));
        assert_eq!(reading.ph, Some(6.5));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_moisture_aborts_the_sample() {
        let mut soil = full_soil();
        soil.0.remove(&sensors::Metric::Moisture);

        let err = aggregator(soil, Air(None))
            .sample(timestamp())
            .await
            .unwrap_err();

        assert_eq!(err.metric, sensors::Metric::Moisture);
    }

    #[tokio::test(start_paused = true)]
    async fn other_metrics_fail_independently() {
        let mut soil = full_soil();
        soil.0.remove(&sensors::Metric::Ph);
        soil.0.remove(&sensors::Metric::Phosphorus);

        let reading = aggregator(soil, Air(None))
            .sample(timestamp())
            .await
            .unwrap();

        assert_eq!(reading.ph, None);
        assert_eq!(reading.phosphorus, None);
        assert_eq!(reading.nitrogen, Some(40.0));
        assert_eq!(reading.moisture, 31.2);
    }
}
