//! The irrigation valve/pump output.
//!
//! A watering run is a scoped acquisition of the output line: the line goes
//! active when the run starts and is forced inactive when the run ends for
//! any reason, including the run's future being dropped on shutdown.

use std::time;

use crate::error::GpioError;

/// A single digital output.
pub trait OutputLine {
    fn pin(&self) -> u64;

    fn set_active(&mut self, active: bool) -> Result<(), GpioError>;
}

/// A sysfs GPIO line, exported for the lifetime of the value.
pub struct SysfsLine {
    pin: sysfs_gpio::Pin,
}

impl SysfsLine {
    /// Exports the pin and drives it inactive immediately.
    ///
    /// With `active_low` the kernel inverts values, so "inactive" is always
    /// the logical off state regardless of relay polarity.
    pub fn new(pin: u64, active_low: bool) -> Result<Self, GpioError> {
        let line = sysfs_gpio::Pin::new(pin);
        let wrap = |cause| GpioError { pin, cause };

        line.export().map_err(wrap)?;
        line.set_active_low(active_low).map_err(wrap)?;
        line.set_direction(idle_direction(active_low)).map_err(wrap)?;

        Ok(SysfsLine { pin: line })
    }
}

/// The output direction that leaves a relay off.
///
/// `direction` takes a raw level and ignores `active_low`, so an inverted
/// line has to start high.
fn idle_direction(active_low: bool) -> sysfs_gpio::Direction {
    if active_low {
        sysfs_gpio::Direction::High
    } else {
        sysfs_gpio::Direction::Low
    }
}

impl OutputLine for SysfsLine {
    fn pin(&self) -> u64 {
        self.pin.get_pin()
    }

    fn set_active(&mut self, active: bool) -> Result<(), GpioError> {
        self.pin
            .set_value(if active { 1 } else { 0 })
            .map_err(|cause| GpioError {
                pin: self.pin.get_pin(),
                cause,
            })
    }
}

impl Drop for SysfsLine {
    fn drop(&mut self) {
        if let Err(e) = self.pin.set_value(0) {
            error!(slog_scope::logger(), "could not release pin";
                   "pin" => self.pin.get_pin(), "error" => %e);
        }
        if let Err(e) = self.pin.unexport() {
            error!(slog_scope::logger(), "could not unexport pin";
                   "pin" => self.pin.get_pin(), "error" => %e);
        }
    }
}

pub struct Pump<L> {
    log: slog::Logger,
    line: L,
}

impl<L> Pump<L>
where
    L: OutputLine,
{
    /// Takes ownership of the line and makes sure it starts out off.
    pub fn new(log: slog::Logger, mut line: L) -> Result<Self, GpioError> {
        line.set_active(false)?;
        let log = log.new(o!("pin" => line.pin()));
        Ok(Pump { log, line })
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    /// Runs the pump for `duration`.
    ///
    /// The line is inactive again when this returns, errs, panics or is
    /// cancelled. If switching on fails, the line is still forced off before
    /// the error is returned.
    pub async fn activate(&mut self, duration: time::Duration) -> Result<(), GpioError> {
        let running = Running::start(&mut self.line, &self.log)?;
        info!(self.log, "pump on"; "seconds" => duration.as_secs_f64());

        tokio::time::sleep(duration).await;

        running.stop()?;
        info!(self.log, "pump off");
        Ok(())
    }
}

/// Guard for an active line; inactive again once dropped.
struct Running<'a, L>
where
    L: OutputLine,
{
    line: &'a mut L,
    log: &'a slog::Logger,
    released: bool,
}

impl<'a, L> Running<'a, L>
where
    L: OutputLine,
{
    fn start(line: &'a mut L, log: &'a slog::Logger) -> Result<Self, GpioError> {
        let mut running = Running {
            line,
            log,
            released: false,
        };
        running.line.set_active(true)?;
        Ok(running)
    }

    fn stop(mut self) -> Result<(), GpioError> {
        self.line.set_active(false)?;
        self.released = true;
        Ok(())
    }
}

impl<'a, L> Drop for Running<'a, L>
where
    L: OutputLine,
{
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.line.set_active(false) {
            Ok(()) => warn!(self.log, "pump run interrupted, line released"),
            Err(e) => crit!(self.log, "could not release line, valve may be stuck open";
                            "error" => %e),
        }
    }
}
