use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub inverter: InverterConfig,
    pub dtu: DtuConfig,
    pub meter: MeterConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InverterConfig {
    /// Serial number of the inverter the limit commands address.
    pub serial: String,
    /// Upper saturation bound for the commanded limit, in watts.
    pub max_power_w: u32,
    /// Lower saturation bound for the commanded limit, in watts.
    pub min_power_w: u32,
}

/// The OpenDTU-compatible inverter controller endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DtuConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    pub host: String,
    pub variant: MeterVariant,
}

/// Which protocol the energy meter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterVariant {
    /// First-generation Shelly 3EM: one endpoint per phase, summed here.
    ThreePhase,
    /// Shelly Pro 3EM: a single RPC call returning the aggregate active power.
    Aggregate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    pub poll_interval_seconds: u64,
    /// Uniform timeout for every HTTP call; doubles as the retry delay
    /// after a failed fetch.
    pub request_timeout_seconds: u64,
}

impl ControlConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("ZEC__").split("__"));
        Ok(figment.extract()?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inverter.serial.trim().is_empty() {
            anyhow::bail!("inverter.serial must be non-empty");
        }
        if self.inverter.max_power_w < self.inverter.min_power_w {
            anyhow::bail!(
                "inverter.max_power_w ({}) must be >= inverter.min_power_w ({})",
                self.inverter.max_power_w,
                self.inverter.min_power_w
            );
        }
        if self.dtu.host.trim().is_empty() {
            anyhow::bail!("dtu.host must be non-empty");
        }
        if self.meter.host.trim().is_empty() {
            anyhow::bail!("meter.host must be non-empty");
        }
        if self.control.poll_interval_seconds == 0 {
            anyhow::bail!("control.poll_interval_seconds must be >= 1");
        }
        if self.control.request_timeout_seconds == 0 {
            anyhow::bail!("control.request_timeout_seconds must be >= 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            inverter: InverterConfig {
                serial: "112100000000".to_string(),
                max_power_w: 300,
                min_power_w: 100,
            },
            dtu: DtuConfig {
                host: "192.168.10.20".to_string(),
                username: "admin".to_string(),
                password: "openDTU42".to_string(),
            },
            meter: MeterConfig {
                host: "192.168.10.30".to_string(),
                variant: MeterVariant::Aggregate,
            },
            control: ControlConfig {
                poll_interval_seconds: 5,
                request_timeout_seconds: 5,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_inverted_power_window_rejected() {
        let mut cfg = valid_config();
        cfg.inverter.max_power_w = 50;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_equal_bounds_allowed() {
        let mut cfg = valid_config();
        cfg.inverter.max_power_w = 100;
        cfg.inverter.min_power_w = 100;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_serial_rejected() {
        let mut cfg = valid_config();
        cfg.inverter.serial = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut cfg = valid_config();
        cfg.control.poll_interval_seconds = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.control.request_timeout_seconds = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_meter_variant_names() {
        let variant: MeterVariant = serde_json::from_str("\"three_phase\"").unwrap();
        assert_eq!(variant, MeterVariant::ThreePhase);
        let variant: MeterVariant = serde_json::from_str("\"aggregate\"").unwrap();
        assert_eq!(variant, MeterVariant::Aggregate);
    }
}
