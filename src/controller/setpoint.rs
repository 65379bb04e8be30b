//! Setpoint computation - pure decision logic, no I/O.

use crate::domain::{GridPower, InverterSnapshot};

/// Bias toward slight grid import so measurement lag and rounding never
/// tip the site into export.
const IMPORT_BIAS_W: f64 = 5.0;

/// The commanded limit is not realized exactly by the device; changes
/// within this window are not worth a command.
const DEADBAND_W: i64 = 2;

/// Which saturation bound, if any, the raw target ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saturation {
    None,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// New absolute limit in watts, clamped into the configured window.
    pub target_w: u32,
    /// Whether the limit should actually be transmitted this iteration.
    pub send: bool,
    pub saturation: Saturation,
}

impl Decision {
    fn hold(target_w: u32) -> Self {
        Self {
            target_w,
            send: false,
            saturation: Saturation::None,
        }
    }
}

/// Compute the next limit from the grid exchange and the inverter state.
///
/// Level-triggered: everything is re-derived from this iteration's inputs,
/// except the limit-applied gate, which holds off while the device is
/// still converging on the previous command.
pub fn decide(grid: GridPower, inverter: &InverterSnapshot, min_w: u32, max_w: u32) -> Decision {
    // Held decisions are never transmitted, but their target stays inside
    // the configured window all the same.
    let held_target_w = inverter.limit_absolute_w.clamp(min_w, max_w);
    if !inverter.reachable {
        return Decision::hold(held_target_w);
    }
    if !inverter.limit_set_status.is_settled() {
        return Decision::hold(held_target_w);
    }

    let raw = grid.watts + f64::from(inverter.limit_absolute_w) - IMPORT_BIAS_W;
    let (target_w, saturation) = if raw > f64::from(max_w) {
        (max_w, Saturation::Max)
    } else if raw < f64::from(min_w) {
        (min_w, Saturation::Min)
    } else {
        (raw.round() as u32, Saturation::None)
    };

    let delta = i64::from(target_w) - i64::from(inverter.limit_absolute_w);
    Decision {
        target_w,
        send: delta.abs() > DEADBAND_W,
        saturation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FirmwareVersion, LimitSetStatus};
    use proptest::prelude::*;
    use rstest::rstest;

    fn snapshot(limit_absolute_w: u32) -> InverterSnapshot {
        InverterSnapshot {
            reachable: true,
            producing: true,
            limit_absolute_w,
            ac_power_w: f64::from(limit_absolute_w),
            dc_power_w: Some(f64::from(limit_absolute_w) + 20.0),
            limit_set_status: LimitSetStatus::Ok,
            firmware: FirmwareVersion::new(24, 2, 12),
        }
    }

    #[rstest]
    // Import headroom: raise the limit by grid - 5.
    #[case(150.0, 100, 100, 300, 245, true, Saturation::None)]
    // Heavy export: clamp to the minimum, already there, nothing to send.
    #[case(-400.0, 100, 100, 300, 100, false, Saturation::Min)]
    // Small import still outside the deadband.
    #[case(10.0, 150, 100, 300, 155, true, Saturation::None)]
    // Large import: clamp to the maximum.
    #[case(500.0, 200, 100, 300, 300, true, Saturation::Max)]
    // Inside the deadband in both directions.
    #[case(6.0, 150, 100, 300, 151, false, Saturation::None)]
    #[case(4.0, 150, 100, 300, 149, false, Saturation::None)]
    // Exactly on the deadband edge: |delta| == 2 is not sent.
    #[case(7.0, 150, 100, 300, 152, false, Saturation::None)]
    #[case(3.0, 150, 100, 300, 148, false, Saturation::None)]
    // One past the edge is sent.
    #[case(8.0, 150, 100, 300, 153, true, Saturation::None)]
    fn test_decision_table(
        #[case] grid_w: f64,
        #[case] current_limit_w: u32,
        #[case] min_w: u32,
        #[case] max_w: u32,
        #[case] expected_target_w: u32,
        #[case] expected_send: bool,
        #[case] expected_saturation: Saturation,
    ) {
        let decision = decide(GridPower::new(grid_w), &snapshot(current_limit_w), min_w, max_w);
        assert_eq!(decision.target_w, expected_target_w);
        assert_eq!(decision.send, expected_send);
        assert_eq!(decision.saturation, expected_saturation);
    }

    #[test]
    fn test_unreachable_inverter_holds() {
        let mut inv = snapshot(100);
        inv.reachable = false;
        let decision = decide(GridPower::new(1000.0), &inv, 100, 300);
        assert!(!decision.send);
    }

    #[test]
    fn test_pending_limit_holds_regardless_of_grid() {
        for grid_w in [-500.0, 0.0, 500.0] {
            let mut inv = snapshot(100);
            inv.limit_set_status = LimitSetStatus::Pending("Pending".to_string());
            let decision = decide(GridPower::new(grid_w), &inv, 100, 300);
            assert!(!decision.send, "grid {grid_w} W must not override the gate");
        }
    }

    #[test]
    fn test_unknown_limit_status_does_not_gate() {
        let mut inv = snapshot(100);
        inv.limit_set_status = LimitSetStatus::Unknown;
        let decision = decide(GridPower::new(150.0), &inv, 100, 300);
        assert!(decision.send);
        assert_eq!(decision.target_w, 245);
    }

    #[test]
    fn test_zero_grid_reading_is_a_normal_input() {
        // Balanced household: target drops by just the import bias, which
        // is outside the deadband, so the limit is nudged down.
        let decision = decide(GridPower::new(0.0), &snapshot(200), 100, 300);
        assert_eq!(decision.target_w, 195);
        assert!(decision.send);
    }

    #[test]
    fn test_decide_is_pure() {
        let grid = GridPower::new(37.5);
        let inv = snapshot(180);
        assert_eq!(decide(grid, &inv, 100, 300), decide(grid, &inv, 100, 300));
    }

    proptest! {
        #[test]
        fn prop_target_always_within_window(
            grid_w in -10_000.0f64..10_000.0,
            current_limit_w in 0u32..5_000,
            min_w in 0u32..2_000,
            span in 0u32..3_000,
        ) {
            let max_w = min_w + span;
            let decision = decide(GridPower::new(grid_w), &snapshot(current_limit_w), min_w, max_w);
            prop_assert!(decision.target_w >= min_w);
            prop_assert!(decision.target_w <= max_w);
        }

        #[test]
        fn prop_deadband_holds_both_directions(
            grid_w in -10_000.0f64..10_000.0,
            current_limit_w in 0u32..5_000,
        ) {
            let decision = decide(GridPower::new(grid_w), &snapshot(current_limit_w), 100, 300);
            let delta = i64::from(decision.target_w) - i64::from(current_limit_w);
            if delta.abs() <= 2 {
                prop_assert!(!decision.send);
            } else {
                prop_assert!(decision.send);
            }
        }
    }
}
