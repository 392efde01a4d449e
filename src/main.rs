#[macro_use]
extern crate slog;

use std::path;

use slog::Drain;
use structopt::StructOpt;

use precip_soil::collect;
use precip_soil::config;
use precip_soil::controller;
use precip_soil::db;
use precip_soil::pumps;
use precip_soil::sensors;

#[derive(Debug, StructOpt)]
#[structopt(name = "precip-soil", about = "Soil moisture driven irrigation controller")]
struct Options {
    /// Configuration file; `PRECIP_*` environment variables override it.
    #[structopt(short, long, default_value = "precip.toml", parse(from_os_str))]
    config: path::PathBuf,

    /// Run a single cycle and exit.
    #[structopt(long)]
    once: bool,
}

fn main() {
    let options = Options::from_args();

    let code = {
        let log = logger();
        let _scope = slog_scope::set_global_logger(log.clone());
        if let Err(e) = slog_stdlog::init() {
            warn!(log, "could not route log crate records"; "error" => %e);
        }

        match run(&log, &options) {
            Ok(()) => 0,
            Err(e) => {
                crit!(log, "exiting"; "error" => %e, "cause" => %e.find_root_cause());
                1
            }
        }
    };

    std::process::exit(code);
}

#[cfg(not(feature = "journald"))]
fn logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain);
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

#[cfg(feature = "journald")]
fn logger() -> slog::Logger {
    let drain = slog_journald::JournaldDrain.ignore_res();
    let drain = slog_envlogger::new(drain);
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

fn run(log: &slog::Logger, options: &Options) -> Result<(), failure::Error> {
    let config = config::Config::load(&options.config)?;
    let log = log.new(o!("sensor" => config.sensor_address));
    info!(log, "starting";
          "config" => options.config.display().to_string(),
          "threshold" => config.moisture_threshold,
          "lag_window" => config.lag_window_cycles,
          "outlet" => ?config.outlet);

    std::fs::create_dir_all(&config.data_dir)?;
    let db = db::Log::open(log.new(o!("component" => "log")), config.log_path())?;
    let mut state = controller::ControllerState::recover(&config, &db)?;
    info!(log, "recovered state"; "irrigation_count" => state.irrigation_count);

    let port = sensors::ModbusPort::open(
        &config.serial_device,
        config.baud_rate,
        config.serial_timeout(),
        config.sensor_address,
    )?;
    let probe = sensors::EnvironmentProbe::new(
        log.new(o!("component" => "climate")),
        sensors::climate::IioDht::new(config.climate_device.clone()),
    );
    let aggregator = collect::Aggregator::new(
        log.new(o!("component" => "sensors")),
        port,
        probe,
        config.soil_temperature_unit,
        config.conductivity_unit,
    );

    let line = pumps::SysfsLine::new(config.outlet_pin(), config.active_low)?;
    let pump = pumps::Pump::new(log.new(o!("component" => "pump")), line)?;

    let mut controller = controller::Controller::new(
        log.new(o!("component" => "controller")),
        aggregator,
        pump,
        db,
        controller::SummaryDue::new(log.new(o!("component" => "report"))),
        config.grow_start(),
        config.report_every_cycles,
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    if options.once {
        let report = runtime.block_on(controller.cycle(&mut state))?;
        info!(log, "single cycle done";
              "outcome" => ?report.outcome,
              "irrigation_count" => report.irrigation_count);
        return Ok(());
    }

    // Dropping the loop on shutdown releases the output line mid-run.
    let signal = runtime.block_on(async {
        tokio::select! {
            result = controller.run(&mut state) => match result {
                Ok(()) => Err(failure::err_msg("control loop stopped")),
                Err(e) => Err(e.into()),
            },
            signal = shutdown() => signal,
        }
    })?;
    info!(log, "shutting down";
          "signal" => signal,
          "irrigation_count" => state.irrigation_count);

    Ok(())
}

async fn shutdown() -> Result<&'static str, failure::Error> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}
