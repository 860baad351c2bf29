//! Device handles produced by the factories.
//!
//! A handle does not talk to the control system. It records which
//! implementation was selected and the full channel address of every
//! component, which is what a control-system client needs to connect.

use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

mod detectors;
mod motion;
mod timing;

pub use detectors::{AdPlugin, AreaDetector, PluginKind, ScalerCh, Struck3820, SCALER_CHANNELS};
pub use motion::{EpicsMotor, MotorBundle, Ptc10, PTC10_DEFAULT_TOLERANCE};
pub use timing::{
    BncOutput, BurstChannels, Dg645, Dg645Variant, PssShutter, SocketDg645, DG645_CHANNELS,
    DG645_TRIGGER_SOURCES, PSS_SHUTTER_DEFAULT_DELAY_S, SOCKET_DG645_BURST_MAXTIME_LIMIT,
    SOCKET_DG645_DEFAULT_ADDRESS,
};

/// What kind of construction a factory performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SingleDevice,
    DeviceGroup,
    CompoundInstrument,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SingleDevice => "single device",
            Self::DeviceGroup => "device group",
            Self::CompoundInstrument => "compound instrument",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

/// One component channel of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Dotted attribute path, e.g. `x.user_readback`.
    pub attr: String,
    pub address: String,
    /// Separate readback address, when the component reads a different PV.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readback: Option<String>,
    pub access: Access,
}

impl Channel {
    pub fn new(attr: impl Into<String>, address: impl Into<String>, access: Access) -> Self {
        Self {
            attr: attr.into(),
            address: address.into(),
            readback: None,
            access,
        }
    }

    /// `<suffix>` written, `<suffix>_RBV` read back.
    pub fn with_rbv(attr: impl Into<String>, prefix: &str, suffix: &str) -> Self {
        Self {
            attr: attr.into(),
            address: format!("{prefix}{suffix}"),
            readback: Some(format!("{prefix}{suffix}_RBV")),
            access: Access::ReadWrite,
        }
    }

    /// `<base>O` written, `<base>I` read back.
    pub fn with_io(attr: impl Into<String>, prefix: &str, base: &str) -> Self {
        Self {
            attr: attr.into(),
            address: format!("{prefix}{base}O"),
            readback: Some(format!("{prefix}{base}I")),
            access: Access::ReadWrite,
        }
    }

    pub(crate) fn nested(mut self, parent: &str) -> Self {
        self.attr = format!("{parent}.{}", self.attr);
        self
    }
}

/// Identity shared by every handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceMeta {
    pub name: String,
    pub prefix: String,
    pub labels: Vec<String>,
    /// Implementation class selected for this device.
    pub class: String,
}

impl DeviceMeta {
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        labels: Vec<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            labels,
            class: class.into(),
        }
    }

    pub(crate) fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }
}

/// The opaque result of a factory invocation.
pub trait Device: fmt::Debug + Send + Sync + 'static {
    fn meta(&self) -> &DeviceMeta;

    fn capability(&self) -> Capability;

    /// Every component channel, in component declaration order.
    fn channels(&self) -> Vec<Channel>;

    fn as_any(&self) -> &dyn Any;

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn labels(&self) -> &[String] {
        &self.meta().labels
    }

    fn class(&self) -> &str {
        &self.meta().class
    }

    fn channel(&self, attr: &str) -> Option<Channel> {
        self.channels().into_iter().find(|c| c.attr == attr)
    }
}

pub type DeviceHandle = Arc<dyn Device>;

/// Serializable summary of a handle, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    #[serde(flatten)]
    pub meta: DeviceMeta,
    pub capability: Capability,
    pub channel_count: usize,
}

impl DeviceInfo {
    pub fn of(device: &dyn Device) -> Self {
        Self {
            meta: device.meta().clone(),
            capability: device.capability(),
            channel_count: device.channels().len(),
        }
    }
}

/// A bare scalar channel (`ophyd.EpicsSignal` / `ophyd.EpicsSignalRO`).
#[derive(Debug, Clone)]
pub struct EpicsSignal {
    meta: DeviceMeta,
    read_only: bool,
}

impl EpicsSignal {
    pub fn new(meta: DeviceMeta, read_only: bool) -> Self {
        Self { meta, read_only }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl Device for EpicsSignal {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::SingleDevice
    }

    fn channels(&self) -> Vec<Channel> {
        let access = if self.read_only {
            Access::Read
        } else {
            Access::ReadWrite
        };
        vec![Channel::new("value", self.meta.prefix.clone(), access)]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Build channels from a `(attr, suffix, access)` table.
pub(crate) fn table_channels(meta: &DeviceMeta, table: &[(&str, &str, Access)]) -> Vec<Channel> {
    table
        .iter()
        .map(|(attr, suffix, access)| Channel::new(*attr, meta.pv(suffix), *access))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_suffix_conventions() {
        let rbv = Channel::with_rbv("setpoint", "12idc:tc1:", "5A:setPoint");
        assert_eq!(rbv.address, "12idc:tc1:5A:setPoint");
        assert_eq!(rbv.readback.as_deref(), Some("12idc:tc1:5A:setPoint_RBV"));

        let io = Channel::with_io("burst_mode", "12idc:DG1:", "BurstModeB");
        assert_eq!(io.address, "12idc:DG1:BurstModeBO");
        assert_eq!(io.readback.as_deref(), Some("12idc:DG1:BurstModeBI"));
    }

    #[test]
    fn test_signal_access() {
        let meta = DeviceMeta::new("ring_current", "S:SRcurrentAI", vec![], "ophyd.EpicsSignalRO");
        let sig = EpicsSignal::new(meta, true);
        let chans = sig.channels();
        assert_eq!(chans.len(), 1);
        assert_eq!(chans[0].address, "S:SRcurrentAI");
        assert_eq!(chans[0].access, Access::Read);
        assert!(sig.channel("value").is_some());
        assert!(sig.channel("nope").is_none());
    }
}
