use std::io;
use std::path;

use failure::Fail;

use crate::sensors::Metric;

/// Failure on the serial bus while talking to the soil probe.
#[derive(Debug, Fail)]
pub enum BusError {
    #[fail(display = "serial I/O failed: {}", _0)]
    Io(#[cause] io::Error),
    #[fail(display = "device answered with Modbus exception {:#04x}", _0)]
    Exception(u8),
    #[fail(display = "malformed response: {}", _0)]
    Malformed(String),
    #[fail(display = "bad frame: {:?}", _0)]
    Frame(rmodbus::ErrorKind),
}

impl From<io::Error> for BusError {
    fn from(err: io::Error) -> Self {
        BusError::Io(err)
    }
}

/// A single soil metric could not be read.
#[derive(Debug, Fail)]
#[fail(display = "could not read {}: {}", metric, cause)]
pub struct SensorReadError {
    pub metric: Metric,
    #[cause]
    pub cause: BusError,
}

/// The ambient sensor did not produce a plausible sample in any attempt.
#[derive(Debug, Fail)]
#[fail(display = "ambient sensor unavailable after {} attempts", attempts)]
pub struct ProbeUnavailable {
    pub attempts: u32,
}

/// A digital output line could not be driven.
#[derive(Debug, Fail)]
#[fail(display = "could not drive GPIO {}: {}", pin, cause)]
pub struct GpioError {
    pub pin: u64,
    #[cause]
    pub cause: sysfs_gpio::Error,
}

#[derive(Debug, Fail)]
pub enum LogError {
    #[fail(display = "log {:?} is corrupt at line {}: {}", path, line, reason)]
    Corruption {
        path: path::PathBuf,
        line: u64,
        reason: String,
    },
    #[fail(display = "log I/O failed: {}", _0)]
    Io(#[cause] io::Error),
}

impl From<io::Error> for LogError {
    fn from(err: io::Error) -> Self {
        LogError::Io(err)
    }
}
