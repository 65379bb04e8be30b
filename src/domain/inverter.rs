use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Inverter controller firmware version, parsed from the git tag the
/// controller reports (`v<major>.<minor>.<patch>[-suffix]`).
///
/// Only used to select the live-data response schema; field order gives
/// the precedence ordering, so e.g. v25.0.0 ranks above v24.2.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Firmware releases from this version on report the summed AC power of
/// all inverters in a dedicated top-level field; older releases only
/// expose per-inverter phase readings.
const TOTAL_POWER_SINCE: FirmwareVersion = FirmwareVersion {
    major: 24,
    minor: 2,
    patch: 12,
};

impl FirmwareVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether the live-data response carries the system-wide total AC
    /// power field.
    pub fn has_total_power(&self) -> bool {
        *self >= TOTAL_POWER_SINCE
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed firmware tag: {0:?}")]
pub struct FirmwareTagError(pub String);

impl FromStr for FirmwareVersion {
    type Err = FirmwareTagError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let err = || FirmwareTagError(tag.to_string());

        let body = tag.strip_prefix('v').ok_or_else(err)?;
        let mut parts = body.splitn(3, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(err)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(err)?;
        // The patch component may carry a trailing suffix (e.g. "12-abcdef").
        let patch_part = parts.next().ok_or_else(err)?;
        let digits_end = patch_part
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(patch_part.len());
        if digits_end == 0 {
            return Err(err());
        }
        let patch = patch_part[..digits_end].parse().map_err(|_| err())?;

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

/// Device-reported confirmation state of the last limit command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitSetStatus {
    /// The last commanded limit has taken effect.
    Ok,
    /// The controller reported some other status; the device is still
    /// converging on the previous command.
    Pending(String),
    /// No status available - older firmware without the status endpoint,
    /// or the serial is not listed yet.
    Unknown,
}

impl LimitSetStatus {
    pub fn from_report(status: &str) -> Self {
        if status == "Ok" {
            Self::Ok
        } else {
            Self::Pending(status.to_string())
        }
    }

    /// False only while the device is known to be busy applying a prior
    /// command; `Unknown` does not block new commands.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending(_))
    }
}

/// One iteration's view of the inverter, read fresh from the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct InverterSnapshot {
    /// Whether the controller currently reaches the inverter over the air.
    pub reachable: bool,
    /// Whether the inverter is outputting power right now.
    pub producing: bool,
    /// The last-commanded absolute output limit in watts.
    pub limit_absolute_w: u32,
    /// Current AC output power in watts.
    pub ac_power_w: f64,
    /// Panel-side DC power in watts, when the controller reports it.
    pub dc_power_w: Option<f64>,
    pub limit_set_status: LimitSetStatus,
    pub firmware: FirmwareVersion,
}
