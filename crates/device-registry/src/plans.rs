//! DG645 burst plan stubs.
//!
//! A plan is the ordered list of messages the session would execute; it is
//! built from a registry-held handle and never touches the hardware here.

use crate::devices::Dg645;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Pause the IOC needs between consecutive burst record writes.
pub const BURST_SETTLE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlanValue {
    Int(i64),
    Float(f64),
}

impl fmt::Display for PlanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanMsg {
    Set { channel: String, value: PlanValue },
    Sleep { seconds: f64 },
}

impl PlanMsg {
    fn set(channel: String, value: PlanValue) -> Self {
        Self::Set { channel, value }
    }

    fn settle() -> Self {
        Self::Sleep {
            seconds: BURST_SETTLE.as_secs_f64(),
        }
    }
}

impl fmt::Display for PlanMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { channel, value } => write!(f, "set {channel} = {value}"),
            Self::Sleep { seconds } => write!(f, "sleep {seconds}s"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("burst cycles must be at least 1")]
    NoCycles,
    #[error("burst period must be a positive number of seconds, got {0}")]
    BadPeriod(f64),
    #[error("burst delay must be a non-negative number of seconds, got {0}")]
    BadDelay(f64),
}

/// Enable burst mode, fire T0 on the first pulse only, zero the burst delay.
pub fn burst_init(dg: &Dg645) -> Vec<PlanMsg> {
    let ch = dg.burst_channels();
    vec![
        PlanMsg::set(ch.mode, PlanValue::Int(1)),
        PlanMsg::settle(),
        PlanMsg::set(ch.t0, PlanValue::Int(1)),
        PlanMsg::settle(),
        PlanMsg::set(ch.delay, PlanValue::Float(0.0)),
        PlanMsg::settle(),
    ]
}

/// Burst of `cycles` pulses, `period` seconds apart, after `delay` seconds.
pub fn burst_set(dg: &Dg645, cycles: u32, period: f64, delay: f64) -> Result<Vec<PlanMsg>, PlanError> {
    if cycles == 0 {
        return Err(PlanError::NoCycles);
    }
    if !period.is_finite() || period <= 0.0 {
        return Err(PlanError::BadPeriod(period));
    }
    if !delay.is_finite() || delay < 0.0 {
        return Err(PlanError::BadDelay(delay));
    }
    let ch = dg.burst_channels();
    Ok(vec![
        PlanMsg::set(ch.count, PlanValue::Int(i64::from(cycles))),
        PlanMsg::settle(),
        PlanMsg::set(ch.period, PlanValue::Float(period)),
        PlanMsg::settle(),
        PlanMsg::set(ch.delay, PlanValue::Float(delay)),
        PlanMsg::settle(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceMeta, Dg645Variant};

    fn dg(variant: Dg645Variant) -> Dg645 {
        Dg645::new(
            DeviceMeta::new("dg645_idc", "12idc:DG1:", vec![], "id12_common.devices.DG645Delay"),
            variant,
        )
    }

    #[test]
    fn test_burst_init_sequence() {
        let plan = burst_init(&dg(Dg645Variant::Id12));
        assert_eq!(plan.len(), 6);
        assert_eq!(
            plan[0],
            PlanMsg::Set {
                channel: "12idc:DG1:BurstModeBO".into(),
                value: PlanValue::Int(1)
            }
        );
        assert_eq!(plan[1], PlanMsg::Sleep { seconds: 0.01 });
        assert_eq!(plan[2].to_string(), "set 12idc:DG1:BurstConfigBO = 1");
        assert_eq!(plan[4].to_string(), "set 12idc:DG1:BurstDelayAO = 0");
    }

    #[test]
    fn test_burst_set_sequence() {
        let plan = burst_set(&dg(Dg645Variant::Aps), 5, 1e-3, 0.5).unwrap();
        let sets: Vec<String> = plan
            .iter()
            .filter(|m| matches!(m, PlanMsg::Set { .. }))
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            sets,
            vec![
                "set 12idc:DG1:BurstCountLO = 5",
                "set 12idc:DG1:BurstPeriodAO = 0.001",
                "set 12idc:DG1:BurstDelayAO = 0.5",
            ]
        );
        assert!(matches!(plan.last(), Some(PlanMsg::Sleep { .. })));
    }

    #[test]
    fn test_burst_set_validation() {
        let d = dg(Dg645Variant::Id12);
        assert_eq!(burst_set(&d, 0, 1.0, 0.0), Err(PlanError::NoCycles));
        assert_eq!(burst_set(&d, 1, 0.0, 0.0), Err(PlanError::BadPeriod(0.0)));
        assert_eq!(burst_set(&d, 1, 1.0, -1.0), Err(PlanError::BadDelay(-1.0)));
    }

    #[test]
    fn test_plan_serializes_with_op_tag() {
        let plan = burst_init(&dg(Dg645Variant::Id12));
        let text = serde_yaml::to_string(&plan[0]).unwrap();
        assert!(text.contains("op: set"));
        assert!(text.contains("BurstModeBO"));
        assert!(text.contains("value: 1"));
    }
}
