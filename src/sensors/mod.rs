use std::fmt;

use crate::error;
use crate::util;

pub mod climate;
pub mod modbus;

pub use self::climate::EnvironmentProbe;
pub use self::modbus::ModbusPort;

/// Soil metrics exposed by the probe's holding registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    Ph,
    Moisture,
    Temperature,
    Conductivity,
    Nitrogen,
    Phosphorus,
    Potassium,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Ph,
        Metric::Moisture,
        Metric::Temperature,
        Metric::Conductivity,
        Metric::Nitrogen,
        Metric::Phosphorus,
        Metric::Potassium,
    ];

    pub fn register(self) -> u16 {
        match self {
            Metric::Ph => 0x06,
            Metric::Moisture => 0x12,
            Metric::Temperature => 0x13,
            Metric::Conductivity => 0x15,
            Metric::Nitrogen => 0x1e,
            Metric::Phosphorus => 0x1f,
            Metric::Potassium => 0x20,
        }
    }

    /// Implied decimal places of the raw register value.
    pub fn decimals(self) -> u8 {
        match self {
            Metric::Ph => 2,
            Metric::Moisture | Metric::Temperature => 1,
            Metric::Conductivity | Metric::Nitrogen | Metric::Phosphorus | Metric::Potassium => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::Ph => "pH",
            Metric::Moisture => "moisture",
            Metric::Temperature => "temperature",
            Metric::Conductivity => "electrical conductivity",
            Metric::Nitrogen => "nitrogen",
            Metric::Phosphorus => "phosphorus",
            Metric::Potassium => "potassium",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Register-level access to one addressed soil probe.
///
/// Implementations do not retry; each metric succeeds or fails on its own.
pub trait SensorPort {
    fn read(&mut self, metric: Metric) -> Result<f64, error::SensorReadError>;
}

impl<'a, S> SensorPort for &'a mut S
where
    S: SensorPort + ?Sized,
{
    fn read(&mut self, metric: Metric) -> Result<f64, error::SensorReadError> {
        (**self).read(metric)
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    util::round_to(celsius * 1.8 + 32.0, 2)
}

/// Converts raw conductivity (µS/cm) to parts per million.
pub fn conductivity_to_ppm(raw: f64) -> f64 {
    util::round_to(raw / 1.58, 2)
}

#[cfg(test)]
mod tests {
    use std::collections;

    use super::*;

    #[test]
    fn register_table_is_unique() {
        let registers = Metric::ALL
            .iter()
            .map(|m| m.register())
            .collect::<collections::HashSet<_>>();
        assert_eq!(registers.len(), Metric::ALL.len());
    }

    #[test]
    fn converts_soil_temperature() {
        assert_eq!(celsius_to_fahrenheit(37.0), 98.6);
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(21.3), 70.34);
    }

    #[test]
    fn converts_conductivity() {
        assert_eq!(conductivity_to_ppm(158.0), 100.0);
        assert_eq!(conductivity_to_ppm(1000.0), 632.91);
        assert_eq!(conductivity_to_ppm(0.0), 0.0);
    }
}
