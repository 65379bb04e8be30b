pub mod setpoint;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::hardware::dtu::DtuClient;
use crate::hardware::meter::{self, GridMeter};

pub use setpoint::{decide, Decision, Saturation};

/// The zero feed-in loop: one meter, one inverter controller, one
/// iteration per poll interval.
pub struct ExportLimiter {
    cfg: Config,
    meter: Box<dyn GridMeter>,
    dtu: DtuClient,
}

impl ExportLimiter {
    pub fn new(cfg: Config) -> Result<Self> {
        let meter = meter::from_config(&cfg.meter, cfg.control.request_timeout())?;
        let dtu = DtuClient::from_config(&cfg)?;
        Ok(Self { cfg, meter, dtu })
    }

    /// Run iterations until the surrounding task is dropped. Every failure
    /// is local to its iteration: fetch errors wait one timeout and retry,
    /// command errors are logged and re-evaluated next time around.
    pub async fn run(&self) -> Result<()> {
        let poll_interval = self.cfg.control.poll_interval();
        let retry_delay = self.cfg.control.request_timeout();

        loop {
            let snapshot = match self.dtu.read_status().await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    warn!(%error, "inverter status read failed");
                    sleep(retry_delay).await;
                    continue;
                }
            };

            let grid = match self.meter.read_grid_power().await {
                Ok(grid) => grid,
                Err(error) => {
                    warn!(%error, "grid power read failed");
                    sleep(retry_delay).await;
                    continue;
                }
            };

            info!(
                grid_w = grid.watts,
                production_w = snapshot.ac_power_w,
                consumption_w = grid.watts + snapshot.ac_power_w,
                dc_w = ?snapshot.dc_power_w,
                producing = snapshot.producing,
                "telemetry sample"
            );

            let decision = decide(
                grid,
                &snapshot,
                self.cfg.inverter.min_power_w,
                self.cfg.inverter.max_power_w,
            );

            match decision.saturation {
                Saturation::Max => info!(target_w = decision.target_w, "setpoint saturated at maximum"),
                Saturation::Min => info!(target_w = decision.target_w, "setpoint saturated at minimum"),
                Saturation::None => {}
            }

            if decision.send {
                info!(
                    from_w = snapshot.limit_absolute_w,
                    to_w = decision.target_w,
                    "setting inverter limit"
                );
                match self.dtu.send_limit(decision.target_w).await {
                    Ok(ack) => info!(kind = %ack.kind, message = %ack.message, "limit command accepted"),
                    Err(error) => warn!(%error, "limit command failed"),
                }
            } else if !snapshot.limit_set_status.is_settled() {
                info!(
                    status = ?snapshot.limit_set_status,
                    "previous limit not applied yet, holding"
                );
            }

            sleep(poll_interval).await;
        }
    }
}
