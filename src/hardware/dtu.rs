//! OpenDTU-compatible inverter controller client.
//!
//! Reading a snapshot takes two calls that must both succeed (live data
//! and system status, the latter for the firmware-dependent schema), plus
//! a best-effort limit-status call that degrades to `Unknown` on older
//! firmware. Limit commands go out as an authenticated url-encoded form.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::domain::{FirmwareTagError, FirmwareVersion, InverterSnapshot, LimitSetStatus};

#[derive(Debug, Error)]
pub enum DtuError {
    #[error("inverter controller request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Firmware(#[from] FirmwareTagError),
    #[error("live data contains no inverter entry")]
    NoInverter,
    #[error("live data is missing the phase 0 AC section")]
    MissingPhase,
    #[error("live data is missing the total power section")]
    MissingTotal,
}

/// Acknowledgement returned by the controller for a limit command.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitAck {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

pub struct DtuClient {
    base_url: String,
    serial: String,
    username: String,
    password: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct LiveDataStatus {
    inverters: Vec<LiveInverter>,
    total: Option<TotalSection>,
}

#[derive(Debug, Deserialize)]
struct LiveInverter {
    reachable: bool,
    /// The controller reports this as the strings "0" / "1".
    producing: String,
    limit_absolute: u32,
    #[serde(rename = "AC")]
    ac: HashMap<String, AcPhase>,
}

#[derive(Debug, Deserialize)]
struct AcPhase {
    #[serde(rename = "Power")]
    power: Measurement,
    #[serde(rename = "Power DC")]
    power_dc: Option<Measurement>,
}

#[derive(Debug, Deserialize)]
struct Measurement {
    v: f64,
}

#[derive(Debug, Deserialize)]
struct TotalSection {
    #[serde(rename = "Power")]
    power: Measurement,
}

#[derive(Debug, Deserialize)]
struct SystemStatus {
    git_hash: String,
}

#[derive(Debug, Deserialize)]
struct LimitStatusEntry {
    limit_set_status: String,
}

impl DtuClient {
    pub fn new(
        base_url: impl Into<String>,
        serial: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DtuError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            serial: serial.into(),
            username: username.into(),
            password: password.into(),
            client,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, DtuError> {
        Self::new(
            format!("http://{}", cfg.dtu.host),
            cfg.inverter.serial.clone(),
            cfg.dtu.username.clone(),
            cfg.dtu.password.clone(),
            cfg.control.request_timeout(),
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DtuError> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Fetch a fresh snapshot of the first inverter's state.
    pub async fn read_status(&self) -> Result<InverterSnapshot, DtuError> {
        let live: LiveDataStatus = self.get_json("/api/livedata/status").await?;
        let system: SystemStatus = self.get_json("/api/system/status").await?;
        let firmware: FirmwareVersion = system.git_hash.parse()?;

        let inverter = live.inverters.first().ok_or(DtuError::NoInverter)?;
        let phase0 = inverter.ac.get("0").ok_or(DtuError::MissingPhase)?;

        let ac_power_w = if firmware.has_total_power() {
            live.total
                .as_ref()
                .map(|t| t.power.v)
                .ok_or(DtuError::MissingTotal)?
        } else {
            phase0.power.v
        };

        let limit_set_status = self.read_limit_status().await;

        Ok(InverterSnapshot {
            reachable: inverter.reachable,
            producing: inverter.producing.trim() != "0",
            limit_absolute_w: inverter.limit_absolute,
            ac_power_w,
            dc_power_w: phase0.power_dc.as_ref().map(|m| m.v),
            limit_set_status,
            firmware,
        })
    }

    /// Best effort: firmware without the status endpoint, or a serial not
    /// yet listed, both map to `Unknown` rather than failing the snapshot.
    async fn read_limit_status(&self) -> LimitSetStatus {
        let report: HashMap<String, LimitStatusEntry> =
            match self.get_json("/api/limit/status").await {
                Ok(report) => report,
                Err(error) => {
                    debug!(%error, "limit status unavailable");
                    return LimitSetStatus::Unknown;
                }
            };
        match report.get(&self.serial) {
            Some(entry) => LimitSetStatus::from_report(&entry.limit_set_status),
            None => LimitSetStatus::Unknown,
        }
    }

    /// Command a new absolute output limit in watts.
    pub async fn send_limit(&self, watts: u32) -> Result<LimitAck, DtuError> {
        let payload = serde_json::json!({
            "serial": self.serial,
            "limit_type": 0,
            "limit_value": watts,
        });
        let url = format!("{}/api/limit/config", self.base_url);
        let ack = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .form(&[("data", payload.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ack)
    }
}
