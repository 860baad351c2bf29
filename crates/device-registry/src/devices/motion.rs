use super::{table_channels, Access, Capability, Channel, Device, DeviceMeta};
use std::any::Any;

const MOTOR_FIELDS: &[(&str, &str, Access)] = &[
    ("user_readback", ".RBV", Access::Read),
    ("user_setpoint", ".VAL", Access::ReadWrite),
    ("user_offset", ".OFF", Access::ReadWrite),
    ("user_offset_dir", ".DIR", Access::ReadWrite),
    ("offset_freeze_switch", ".FOFF", Access::ReadWrite),
    ("set_use_switch", ".SET", Access::ReadWrite),
    ("velocity", ".VELO", Access::ReadWrite),
    ("acceleration", ".ACCL", Access::ReadWrite),
    ("motor_egu", ".EGU", Access::ReadWrite),
    ("motor_is_moving", ".MOVN", Access::Read),
    ("motor_done_move", ".DMOV", Access::Read),
    ("high_limit_switch", ".HLS", Access::Read),
    ("low_limit_switch", ".LLS", Access::Read),
    ("high_limit_travel", ".HLM", Access::ReadWrite),
    ("low_limit_travel", ".LLM", Access::ReadWrite),
    ("direction_of_travel", ".TDIR", Access::Read),
    ("motor_stop", ".STOP", Access::Write),
    ("home_forward", ".HOMF", Access::Write),
    ("home_reverse", ".HOMR", Access::Write),
];

/// A motor record.
#[derive(Debug, Clone)]
pub struct EpicsMotor {
    meta: DeviceMeta,
}

impl EpicsMotor {
    pub fn new(meta: DeviceMeta) -> Self {
        Self { meta }
    }
}

impl Device for EpicsMotor {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::SingleDevice
    }

    fn channels(&self) -> Vec<Channel> {
        table_channels(&self.meta, MOTOR_FIELDS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Motors grouped under one device, each at `prefix + suffix`.
#[derive(Debug, Clone)]
pub struct MotorBundle {
    meta: DeviceMeta,
    type_name: String,
    motors: Vec<(String, EpicsMotor)>,
}

impl MotorBundle {
    pub fn new(meta: DeviceMeta, type_name: String, motors: &[(&str, &str)]) -> Self {
        let motors = motors
            .iter()
            .map(|(attr, suffix)| {
                let motor_meta = DeviceMeta::new(
                    format!("{}_{attr}", meta.name),
                    meta.pv(suffix),
                    Vec::new(),
                    "ophyd.EpicsMotor",
                );
                (attr.to_string(), EpicsMotor::new(motor_meta))
            })
            .collect();
        Self {
            meta,
            type_name,
            motors,
        }
    }

    /// Name of the generated bundle type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn motor(&self, attr: &str) -> Option<&EpicsMotor> {
        self.motors.iter().find(|(a, _)| a == attr).map(|(_, m)| m)
    }

    pub fn motor_attrs(&self) -> impl Iterator<Item = &str> {
        self.motors.iter().map(|(a, _)| a.as_str())
    }
}

impl Device for MotorBundle {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::DeviceGroup
    }

    fn channels(&self) -> Vec<Channel> {
        self.motors
            .iter()
            .flat_map(|(attr, m)| m.channels().into_iter().map(move |c| c.nested(attr)))
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub const PTC10_DEFAULT_TOLERANCE: f64 = 1.0;

/// PTC10 temperature controller used as a positioner: thermocouple 2A is
/// the readback, AIO card 5A drives the heater.
#[derive(Debug, Clone)]
pub struct Ptc10 {
    meta: DeviceMeta,
    tolerance: f64,
    report_dmov_changes: bool,
}

impl Ptc10 {
    pub fn new(meta: DeviceMeta, tolerance: f64, report_dmov_changes: bool) -> Self {
        Self {
            meta,
            tolerance,
            report_dmov_changes,
        }
    }

    /// Done when |readback - setpoint| <= tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn report_dmov_changes(&self) -> bool {
        self.report_dmov_changes
    }

    pub fn in_position(&self, readback: f64, setpoint: f64) -> bool {
        (readback - setpoint).abs() <= self.tolerance
    }
}

impl Device for Ptc10 {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::SingleDevice
    }

    fn channels(&self) -> Vec<Channel> {
        let p = &self.meta.prefix;
        let mut out = vec![
            Channel::new("readback", self.meta.pv("2A:temperature"), Access::Read),
            Channel::with_rbv("setpoint", p, "5A:setPoint"),
            Channel::with_rbv("enable", p, "outputEnable"),
            Channel::new("pid.output", self.meta.pv("5A:output_RBV"), Access::Read),
            Channel::with_rbv("pid.ramprate", p, "5A:rampRate"),
            Channel::with_rbv("pid.pidmode", p, "5A:pid:mode"),
            Channel::with_rbv("pid.P", p, "5A:pid:P"),
            Channel::with_rbv("pid.I", p, "5A:pid:I"),
            Channel::with_rbv("pid.D", p, "5A:pid:D"),
        ];
        // same ramp term as the Linkam controllers
        out.push(Channel {
            attr: "ramp".into(),
            ..Channel::with_rbv("pid.ramprate", p, "5A:rampRate")
        });
        out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor_channels() {
        let m = EpicsMotor::new(DeviceMeta::new(
            "idc_m1",
            "12idc:m1",
            vec!["motor".into()],
            "ophyd.EpicsMotor",
        ));
        assert_eq!(
            m.channel("user_readback").unwrap().address,
            "12idc:m1.RBV"
        );
        assert_eq!(m.channel("motor_stop").unwrap().access, Access::Write);
        assert_eq!(m.channels().len(), MOTOR_FIELDS.len());
    }

    #[test]
    fn test_bundle_nests_motor_channels() {
        let b = MotorBundle::new(
            DeviceMeta::new("sample", "12idc:", vec![], "apstools.devices.motor_factory.mb_creator"),
            "SampleStage".into(),
            &[("x", "m1"), ("y", "m2")],
        );
        assert_eq!(b.motor_attrs().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(b.motor("y").unwrap().name(), "sample_y");
        assert_eq!(
            b.channel("x.user_setpoint").unwrap().address,
            "12idc:m1.VAL"
        );
        assert_eq!(b.channels().len(), 2 * MOTOR_FIELDS.len());
        assert_eq!(b.capability(), Capability::DeviceGroup);
    }

    #[test]
    fn test_ptc10_layout_and_tolerance() {
        let t = Ptc10::new(
            DeviceMeta::new("ptc10", "12idc:tc1:", vec![], "id12_common.devices.PTC10_12ID"),
            0.5,
            false,
        );
        assert_eq!(
            t.channel("readback").unwrap().address,
            "12idc:tc1:2A:temperature"
        );
        assert_eq!(
            t.channel("ramp").unwrap().address,
            t.channel("pid.ramprate").unwrap().address
        );
        assert!(t.in_position(75.4, 75.0));
        assert!(!t.in_position(76.0, 75.0));
    }
}
