//! Energy meter clients.
//!
//! Two Shelly protocol generations are in the field: the first-generation
//! 3EM exposes one HTTP endpoint per phase, the Pro 3EM answers a single
//! RPC call with the aggregate active power. Both are hidden behind the
//! [`GridMeter`] trait; the variant is chosen once from configuration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{MeterConfig, MeterVariant};
use crate::domain::GridPower;

/// Any transport, timeout, or schema problem while reading the meter.
/// The reading is all-or-nothing; no partial or stale data is surfaced.
#[derive(Debug, Error)]
#[error("energy meter read failed: {0}")]
pub struct MeterError(#[from] reqwest::Error);

#[async_trait]
pub trait GridMeter: Send + Sync {
    /// Net household grid exchange power; positive = import.
    async fn read_grid_power(&self) -> Result<GridPower, MeterError>;
}

/// Build the meter client selected by the configuration.
pub fn from_config(cfg: &MeterConfig, timeout: Duration) -> Result<Box<dyn GridMeter>, MeterError> {
    let base_url = format!("http://{}", cfg.host);
    Ok(match cfg.variant {
        MeterVariant::ThreePhase => Box::new(ShellyThreePhaseMeter::new(base_url, timeout)?),
        MeterVariant::Aggregate => Box::new(ShellyProMeter::new(base_url, timeout)?),
    })
}

/// First-generation Shelly 3EM: `GET /emeter/{0,1,2}`, summed here.
pub struct ShellyThreePhaseMeter {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct EmeterReading {
    power: f64,
}

impl ShellyThreePhaseMeter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MeterError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    async fn read_phase(&self, phase: u8) -> Result<f64, MeterError> {
        let url = format!("{}/emeter/{phase}", self.base_url);
        let reading: EmeterReading = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reading.power)
    }
}

#[async_trait]
impl GridMeter for ShellyThreePhaseMeter {
    async fn read_grid_power(&self) -> Result<GridPower, MeterError> {
        // The meter's embedded web server handles one request at a time;
        // any failed phase fails the whole reading.
        let mut watts = 0.0;
        for phase in 0..3 {
            watts += self.read_phase(phase).await?;
        }
        Ok(GridPower::new(watts))
    }
}

/// Shelly Pro 3EM: `POST /rpc` with an `EM.GetStatus` call returning the
/// total active power across all phases.
pub struct ShellyProMeter {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: EmStatus,
}

#[derive(Debug, Deserialize)]
struct EmStatus {
    total_act_power: f64,
}

impl ShellyProMeter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MeterError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl GridMeter for ShellyProMeter {
    async fn read_grid_power(&self) -> Result<GridPower, MeterError> {
        let url = format!("{}/rpc", self.base_url);
        let request = serde_json::json!({
            "id": 1,
            "method": "EM.GetStatus",
            "params": { "id": 0 },
        });
        let envelope: RpcEnvelope = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(GridPower::new(envelope.result.total_act_power))
    }
}
