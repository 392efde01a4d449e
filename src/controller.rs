//! The irrigation control loop.
//!
//! Each cycle samples, evaluates the lagged moisture against the threshold,
//! waters or skips, and appends the outcome to the log:
//!
//! ```text
//! Idle → Sampling → Evaluating → Actuating | Skipping → Logging → Idle
//! ```

use std::collections;
use std::time;

use crate::collect;
use crate::config;
use crate::db;
use crate::error::LogError;
use crate::model::LogRecord;
use crate::pumps;
use crate::sensors;
use crate::util;

/// Everything the loop carries from one cycle to the next.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerState {
    pub sensor_id: u8,
    pub moisture_threshold: f64,
    /// Number of cycles between the reading acted on and the current one.
    pub lag_window: usize,
    pub cycle_interval: time::Duration,
    pub water_duration: time::Duration,
    pub irrigation_count: u64,
    /// Cycles run by this process.
    pub cycles: u64,
}

impl ControllerState {
    /// Builds the initial state, taking the irrigation count from the log.
    pub fn recover(config: &config::Config, db: &db::Log) -> Result<Self, LogError> {
        Ok(ControllerState {
            sensor_id: config.sensor_address,
            moisture_threshold: config.moisture_threshold,
            lag_window: config.lag_window_cycles,
            cycle_interval: config.cycle_interval(),
            water_duration: config.water_duration(),
            irrigation_count: db.recover_last_count()?,
            cycles: 0,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision {
    Water { reference: f64 },
    /// `reference` is `None` until the log holds a full window.
    Skip { reference: Option<f64> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Watered,
    Skipped,
    /// Watering was due but the output could not be driven.
    ActuatorFailed,
    /// Moisture could not be read; nothing was logged.
    Aborted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: Outcome,
    pub decision: Option<Decision>,
    pub irrigation_count: u64,
}

/// The moisture reading `lag_window` cycles before `current`.
///
/// `history` is the logged moisture in time order, not including `current`.
pub fn reference_moisture(history: &[f64], current: f64, lag_window: usize) -> Option<f64> {
    if lag_window == 0 {
        return Some(current);
    }
    if history.len() < lag_window {
        return None;
    }
    Some(history[history.len() - lag_window])
}

pub fn decide(reference: Option<f64>, threshold: f64) -> Decision {
    match reference {
        Some(reference) if reference < threshold => Decision::Water { reference },
        reference => Decision::Skip { reference },
    }
}

/// Hook for the periodic summary, run every `report_every_cycles` cycles.
pub trait Reporter {
    fn report(&mut self, db: &db::Log, state: &ControllerState) -> Result<(), failure::Error>;
}

/// Announces that a summary is due; the summary itself is produced elsewhere
/// from the log file.
pub struct SummaryDue {
    log: slog::Logger,
}

impl SummaryDue {
    pub fn new(log: slog::Logger) -> Self {
        SummaryDue { log }
    }
}

impl Reporter for SummaryDue {
    fn report(&mut self, db: &db::Log, state: &ControllerState) -> Result<(), failure::Error> {
        info!(self.log, "weekly summary due";
              "log" => db.path().display().to_string(),
              "summary" => format!("sensor_data_{}_WeekAvg.csv", state.sensor_id),
              "cycles" => state.cycles);
        Ok(())
    }
}

pub struct Controller<S, C, L, R> {
    log: slog::Logger,
    aggregator: collect::Aggregator<S, C>,
    pump: pumps::Pump<L>,
    db: db::Log,
    reporter: R,
    grow_start: Option<chrono::NaiveDateTime>,
    report_every: u64,
    /// Moisture of the most recent logged records since the grow start,
    /// read from the log on the first cycle and kept current afterwards.
    history: Option<collections::VecDeque<f64>>,
}

impl<S, C, L, R> Controller<S, C, L, R>
where
    S: sensors::SensorPort,
    C: sensors::climate::ClimateSensor,
    L: pumps::OutputLine,
    R: Reporter,
{
    pub fn new(
        log: slog::Logger,
        aggregator: collect::Aggregator<S, C>,
        pump: pumps::Pump<L>,
        db: db::Log,
        reporter: R,
        grow_start: Option<chrono::NaiveDateTime>,
        report_every: u64,
    ) -> Self {
        Controller {
            log,
            aggregator,
            pump,
            db,
            reporter,
            grow_start,
            report_every: report_every.max(1),
            history: None,
        }
    }

    pub fn db(&self) -> &db::Log {
        &self.db
    }

    pub fn pump(&self) -> &pumps::Pump<L> {
        &self.pump
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Runs cycles until an unrecoverable log error, sleeping
    /// `cycle_interval` after each.
    pub async fn run(&mut self, state: &mut ControllerState) -> Result<(), LogError> {
        loop {
            self.cycle(state).await?;
            tokio::time::sleep(state.cycle_interval).await;
        }
    }

    /// One full cycle. Only log I/O failures are returned as errors; sensor
    /// and actuator failures are part of the report.
    pub async fn cycle(&mut self, state: &mut ControllerState) -> Result<CycleReport, LogError> {
        state.cycles += 1;
        let log = self.log.new(o!("cycle" => state.cycles));

        let report = self.step(&log, state).await?;
        info!(log, "cycle complete";
              "outcome" => ?report.outcome,
              "irrigation_count" => report.irrigation_count);

        if state.cycles % self.report_every == 0 {
            if let Err(e) = self.reporter.report(&self.db, state) {
                warn!(log, "summary hook failed"; "error" => %e);
            }
        }

        Ok(report)
    }

    async fn step(
        &mut self,
        log: &slog::Logger,
        state: &mut ControllerState,
    ) -> Result<CycleReport, LogError> {
        let reading = match self.aggregator.sample(util::now()).await {
            Ok(reading) => reading,
            Err(e) => {
                error!(log, "cycle aborted, no moisture reading"; "error" => %e);
                return Ok(CycleReport {
                    cycle: state.cycles,
                    outcome: Outcome::Aborted,
                    decision: None,
                    irrigation_count: state.irrigation_count,
                });
            }
        };
        info!(log, "sampled";
              "moisture" => reading.moisture,
              "temperature" => reading.temperature,
              "ph" => reading.ph,
              "ec" => reading.conductivity,
              "nitrogen" => reading.nitrogen,
              "phosphorus" => reading.phosphorus,
              "potassium" => reading.potassium,
              "humidity" => reading.climate.map(|c| c.humidity),
              "vpd" => reading.climate.map(|c| c.vpd));

        let reference = {
            let history = self.history(state.lag_window)?;
            reference_moisture(history.make_contiguous(), reading.moisture, state.lag_window)
        };
        let decision = decide(reference, state.moisture_threshold);

        let outcome = match decision {
            Decision::Water { reference } => {
                info!(log, "watering";
                      "reference_moisture" => reference,
                      "threshold" => state.moisture_threshold);
                match self.pump.activate(state.water_duration).await {
                    Ok(()) => {
                        state.irrigation_count += 1;
                        Outcome::Watered
                    }
                    Err(e) => {
                        error!(log, "watering failed, line forced off"; "error" => %e);
                        Outcome::ActuatorFailed
                    }
                }
            }
            Decision::Skip { reference } => {
                info!(log, "not watering";
                      "reference_moisture" => reference,
                      "threshold" => state.moisture_threshold);
                Outcome::Skipped
            }
        };

        let timestamp = reading.timestamp;
        let moisture = reading.moisture;
        self.db.append(&LogRecord {
            reading,
            irrigation_count: state.irrigation_count,
        })?;
        if self.grow_start.map_or(true, |start| timestamp >= start) {
            let history = self.history(state.lag_window)?;
            history.push_back(moisture);
            while history.len() > state.lag_window {
                history.pop_front();
            }
        }

        Ok(CycleReport {
            cycle: state.cycles,
            outcome,
            decision: Some(decision),
            irrigation_count: state.irrigation_count,
        })
    }

    fn history(
        &mut self,
        lag_window: usize,
    ) -> Result<&mut collections::VecDeque<f64>, LogError> {
        if self.history.is_none() {
            let recent = self
                .db
                .tail_since(self.grow_start, lag_window)?
                .into_iter()
                .map(|record| record.reading.moisture)
                .collect();
            self.history = Some(recent);
        }
        Ok(self.history.get_or_insert_with(collections::VecDeque::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reacts_to_the_lagged_reading() {
        // Log holds 30, 28, 15, 40; the fifth cycle reads 38.
        let reference = reference_moisture(&[30.0, 28.0, 15.0, 40.0], 38.0, 2);

        assert_eq!(reference, Some(15.0));
        assert_eq!(decide(reference, 20.0), Decision::Water { reference: 15.0 });
        assert_eq!(
            decide(Some(38.0), 20.0),
            Decision::Skip {
                reference: Some(38.0)
            }
        );
    }

    #[test]
    fn waits_for_a_full_window() {
        assert_eq!(reference_moisture(&[], 5.0, 2), None);
        assert_eq!(reference_moisture(&[5.0], 5.0, 2), None);
        assert_eq!(reference_moisture(&[5.0, 6.0], 7.0, 2), Some(5.0));
        assert_eq!(decide(None, 20.0), Decision::Skip { reference: None });
    }

    #[test]
    fn zero_lag_uses_the_current_reading() {
        assert_eq!(reference_moisture(&[], 12.0, 0), Some(12.0));
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(
            decide(Some(20.0), 20.0),
            Decision::Skip {
                reference: Some(20.0)
            }
        );
    }
}
