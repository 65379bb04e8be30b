use anyhow::Result;
use zero_export_controller::{config, controller, telemetry};
use config::Config;
use controller::ExportLimiter;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load()?;
    cfg.validate()?;

    if cfg.dtu.password == "openDTU42" {
        warn!("using the factory default DTU password - change it on the device and in the config");
    }

    info!(
        serial = %cfg.inverter.serial,
        min_w = cfg.inverter.min_power_w,
        max_w = cfg.inverter.max_power_w,
        meter = ?cfg.meter.variant,
        "starting zero-export controller"
    );

    let limiter = ExportLimiter::new(cfg)?;

    tokio::select! {
        result = limiter.run() => result?,
        _ = telemetry::shutdown_signal() => {}
    }

    warn!("shutdown complete");
    Ok(())
}
