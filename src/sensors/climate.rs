//! Ambient temperature and humidity from a DHT11 single-wire sensor.
//!
//! The kernel's `dht11` IIO driver does the bit banging; reads fail often
//! (checksum errors, missed edges), so the probe retries on its own.

use std::fs;
use std::io;
use std::path;
use std::time;

use crate::error::ProbeUnavailable;

const ATTEMPTS: u32 = 15;
const BACKOFF: time::Duration = time::Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AirSample {
    pub humidity: f64,
    pub celsius: f64,
}

/// One raw, unretried read of the ambient sensor.
pub trait ClimateSensor {
    fn sample(&mut self) -> io::Result<AirSample>;
}

/// DHT11 exposed through `/sys/bus/iio/devices/iio:deviceN`.
pub struct IioDht {
    device: path::PathBuf,
}

impl IioDht {
    pub fn new<P>(device: P) -> Self
    where
        P: Into<path::PathBuf>,
    {
        IioDht {
            device: device.into(),
        }
    }

    fn read_milli(&self, channel: &str) -> io::Result<f64> {
        let raw = fs::read_to_string(self.device.join(channel))?;
        let milli = raw.trim().parse::<i64>().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not an integer: {}", channel, e),
            )
        })?;
        Ok(milli as f64 / 1000.0)
    }
}

impl ClimateSensor for IioDht {
    fn sample(&mut self) -> io::Result<AirSample> {
        let humidity = self.read_milli("in_humidityrelative_input")?;
        let celsius = self.read_milli("in_temp_input")?;
        Ok(AirSample { humidity, celsius })
    }
}

pub struct EnvironmentProbe<C> {
    log: slog::Logger,
    sensor: C,
}

impl<C> EnvironmentProbe<C>
where
    C: ClimateSensor,
{
    pub fn new(log: slog::Logger, sensor: C) -> Self {
        EnvironmentProbe { log, sensor }
    }

    /// Samples until a plausible value arrives or the attempts run out.
    pub async fn read(&mut self) -> Result<AirSample, ProbeUnavailable> {
        for attempt in 1..=ATTEMPTS {
            match self.sensor.sample() {
                Ok(sample) if plausible(&sample) => return Ok(sample),
                Ok(sample) => {
                    debug!(self.log, "discarding implausible ambient sample";
                           "attempt" => attempt,
                           "humidity" => sample.humidity,
                           "celsius" => sample.celsius);
                }
                Err(e) => {
                    debug!(self.log, "ambient sensor read failed";
                           "attempt" => attempt, "error" => %e);
                }
            }

            if attempt < ATTEMPTS {
                tokio::time::sleep(BACKOFF).await;
            }
        }

        Err(ProbeUnavailable { attempts: ATTEMPTS })
    }
}

fn plausible(sample: &AirSample) -> bool {
    (0.0..=100.0).contains(&sample.humidity) && (-40.0..=80.0).contains(&sample.celsius)
}

#[cfg(test)]
mod tests {
    use std::collections;

    use super::*;

    struct Scripted(collections::VecDeque<io::Result<AirSample>>);

    impl ClimateSensor for Scripted {
        fn sample(&mut self) -> io::Result<AirSample> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "checksum")))
        }
    }

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, o!())
    }

    fn ok(humidity: f64, celsius: f64) -> io::Result<AirSample> {
        Ok(AirSample { humidity, celsius })
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_a_plausible_sample() {
        let script = vec![
            Err(io::Error::new(io::ErrorKind::Other, "checksum")),
            ok(250.0, 21.0),
            ok(60.0, 25.0),
        ];
        let mut probe = EnvironmentProbe::new(logger(), Scripted(script.into_iter().collect()));

        let started = tokio::time::Instant::now();
        let sample = probe.read().await.unwrap();

        assert_eq!(sample, AirSample { humidity: 60.0, celsius: 25.0 });
        assert!(started.elapsed() >= BACKOFF * 2);
        assert!(started.elapsed() < BACKOFF * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_attempts() {
        let mut probe = EnvironmentProbe::new(logger(), Scripted(collections::VecDeque::new()));

        let started = tokio::time::Instant::now();
        let err = probe.read().await.unwrap_err();

        assert_eq!(err.attempts, ATTEMPTS);
        assert!(started.elapsed() >= BACKOFF * (ATTEMPTS - 1));
        assert!(started.elapsed() < BACKOFF * ATTEMPTS);
    }

    #[test]
    fn reads_iio_channels() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("in_humidityrelative_input"), "61000\n").unwrap();
        fs::write(dir.path().join("in_temp_input"), "24500\n").unwrap();

        let sample = IioDht::new(dir.path()).sample().unwrap();

        assert_eq!(sample, AirSample { humidity: 61.0, celsius: 24.5 });
    }

    #[test]
    fn missing_iio_device_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(IioDht::new(dir.path().join("iio:device9")).sample().is_err());
    }
}
