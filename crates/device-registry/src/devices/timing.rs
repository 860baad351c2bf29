use super::{Access, Capability, Channel, Device, DeviceMeta};
use std::any::Any;
use std::time::Duration;

pub const PSS_SHUTTER_DEFAULT_DELAY_S: f64 = 1.2;

/// APS personnel-safety-system shutter, driven by pulsing Open/Close.
#[derive(Debug, Clone)]
pub struct PssShutter {
    meta: DeviceMeta,
    delay_s: f64,
}

impl PssShutter {
    pub fn new(meta: DeviceMeta, delay_s: f64) -> Self {
        Self { meta, delay_s }
    }

    /// Settling time after an open/close request.
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_s)
    }
}

impl Device for PssShutter {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::SingleDevice
    }

    fn channels(&self) -> Vec<Channel> {
        vec![
            Channel::new("open_signal", self.meta.pv("Open"), Access::Write),
            Channel::new("close_signal", self.meta.pv("Close"), Access::Write),
            Channel::new("pss_state", self.meta.pv("BeamBlockingM.VAL"), Access::Read),
        ]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Which DG645 PV layout the IOC uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dg645Variant {
    /// Stock layout.
    Aps,
    /// 12-ID layout: `BurstModeB`/`BurstConfigB` records plus a trigger-delay button.
    Id12,
}

/// Write addresses of the burst records, as used by the burst plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstChannels {
    pub mode: String,
    pub t0: String,
    pub count: String,
    pub period: String,
    pub delay: String,
}

pub const DG645_CHANNELS: [&str; 10] = ["T0", "T1", "A", "B", "C", "D", "E", "F", "G", "H"];

pub const DG645_TRIGGER_SOURCES: [&str; 7] = [
    "Internal",
    "External rising edges",
    "External falling edges",
    "Single shot external rising edges",
    "Single shot external falling edges",
    "Single shot",
    "Line",
];

const DG645_OUTPUTS: [&str; 5] = ["T0", "AB", "CD", "EF", "GH"];

/// SRS DG645 digital delay generator behind an EPICS IOC.
#[derive(Debug, Clone)]
pub struct Dg645 {
    meta: DeviceMeta,
    variant: Dg645Variant,
}

impl Dg645 {
    pub fn new(meta: DeviceMeta, variant: Dg645Variant) -> Self {
        Self { meta, variant }
    }

    pub fn variant(&self) -> Dg645Variant {
        self.variant
    }

    fn burst_bases(&self) -> (&'static str, &'static str) {
        match self.variant {
            Dg645Variant::Aps => ("BurstMode", "BurstConfig"),
            Dg645Variant::Id12 => ("BurstModeB", "BurstConfigB"),
        }
    }

    pub fn burst_channels(&self) -> BurstChannels {
        let (mode, t0) = self.burst_bases();
        BurstChannels {
            mode: self.meta.pv(&format!("{mode}O")),
            t0: self.meta.pv(&format!("{t0}O")),
            count: self.meta.pv("BurstCountLO"),
            period: self.meta.pv("BurstPeriodAO"),
            delay: self.meta.pv("BurstDelayAO"),
        }
    }
}

impl Device for Dg645 {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::SingleDevice
    }

    fn channels(&self) -> Vec<Channel> {
        let p = &self.meta.prefix;
        let mut out = Vec::new();
        for ch in &DG645_CHANNELS[2..] {
            out.push(Channel::with_io(
                format!("channel_{ch}.delay"),
                p,
                &format!("{ch}DelayA"),
            ));
            out.push(Channel::with_io(
                format!("channel_{ch}.reference"),
                p,
                &format!("{ch}ReferenceM"),
            ));
        }
        for o in DG645_OUTPUTS {
            out.push(Channel::with_io(
                format!("output_{o}.amplitude"),
                p,
                &format!("{o}OutputAmpA"),
            ));
            out.push(Channel::with_io(
                format!("output_{o}.offset"),
                p,
                &format!("{o}OutputOffsetA"),
            ));
            out.push(Channel::with_io(
                format!("output_{o}.polarity"),
                p,
                &format!("{o}OutputPolarityB"),
            ));
        }
        out.push(Channel::with_io("trigger_source", p, "TriggerSourceM"));
        out.push(Channel::with_io("trigger_level", p, "TriggerLevelA"));
        out.push(Channel::with_io("trigger_rate", p, "TriggerRateA"));
        out.push(Channel::with_io("trigger_holdoff", p, "TriggerHoldoffA"));

        let (mode, t0) = self.burst_bases();
        out.push(Channel::with_io("burst_mode", p, mode));
        out.push(Channel::with_io("burst_T0", p, t0));
        out.push(Channel::with_io("burst_count", p, "BurstCountL"));
        out.push(Channel::with_io("burst_period", p, "BurstPeriodA"));
        out.push(Channel::with_io("burst_delay", p, "BurstDelayA"));
        if self.variant == Dg645Variant::Id12 {
            out.push(Channel::new(
                "trigger_delay",
                self.meta.pv("TriggerDelayBO"),
                Access::Write,
            ));
        }
        out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub const SOCKET_DG645_DEFAULT_ADDRESS: &str = "0.0.0.0:5025";

/// Longest burst (seconds) the socket driver will schedule.
pub const SOCKET_DG645_BURST_MAXTIME_LIMIT: u32 = 41;

/// Amplitude and output pair for one BNC connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BncOutput {
    pub amplitude: f64,
    pub output: &'static str,
}

const BNC_MAP: [(&str, BncOutput); 5] = [
    ("Base", BncOutput { amplitude: 2.5, output: "T0" }),
    ("Shutter", BncOutput { amplitude: 4.0, output: "AB" }),
    ("Detector", BncOutput { amplitude: 3.0, output: "CD" }),
    ("Struck_ADV", BncOutput { amplitude: 2.5, output: "EF" }),
    ("Struck_INH", BncOutput { amplitude: 4.5, output: "GH" }),
];

/// DG645 reached directly over its TCP command port instead of an IOC.
///
/// No connection is made here; the handle only carries the endpoint.
#[derive(Debug, Clone)]
pub struct SocketDg645 {
    meta: DeviceMeta,
    host: String,
    port: u16,
    burst_maxtime_limit: u32,
}

impl SocketDg645 {
    /// `address` is `host:port`.
    pub fn new(meta: DeviceMeta, address: &str) -> Result<Self, String> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| format!("address `{address}` is not host:port"))?;
        if host.is_empty() {
            return Err(format!("address `{address}` has an empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("address `{address}`: bad port: {e}"))?;
        Ok(Self {
            meta,
            host: host.to_string(),
            port,
            burst_maxtime_limit: SOCKET_DG645_BURST_MAXTIME_LIMIT,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Longest burst, in seconds, this unit will schedule.
    pub fn burst_maxtime_limit(&self) -> u32 {
        self.burst_maxtime_limit
    }

    /// Trigger source names, indexed by the `TSRC` code.
    pub fn trigger_sources() -> &'static [&'static str] {
        &DG645_TRIGGER_SOURCES
    }

    pub fn trigger_source(code: usize) -> Option<&'static str> {
        DG645_TRIGGER_SOURCES.get(code).copied()
    }

    /// Instrument role → BNC output wiring.
    pub fn bnc_output(role: &str) -> Option<BncOutput> {
        BNC_MAP.iter().find(|(r, _)| *r == role).map(|(_, o)| *o)
    }

    /// `LAMP` commands setting each output amplitude from the BNC map.
    pub fn amplitude_commands() -> Vec<String> {
        BNC_MAP
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, (_, o))| format!("LAMP {i}, {:.2}\n", o.amplitude))
            .collect()
    }

    /// Queries reported as the instrument status, with their labels.
    pub fn status_queries() -> [(&'static str, &'static str); 3] {
        [
            ("Serial Poll STATUS", "*STB?\n"),
            ("Standard Event STATUS", "*ESR?\n"),
            ("Instrument STATUS", "INSR?\n"),
        ]
    }
}

impl Device for SocketDg645 {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::SingleDevice
    }

    fn channels(&self) -> Vec<Channel> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(class: &str) -> DeviceMeta {
        DeviceMeta::new("dg645_idc", "12idc:DG1:", vec!["delay".into()], class)
    }

    #[test]
    fn test_id12_burst_records() {
        let d = Dg645::new(meta("id12_common.devices.DG645Delay"), Dg645Variant::Id12);
        let b = d.burst_channels();
        assert_eq!(b.mode, "12idc:DG1:BurstModeBO");
        assert_eq!(b.t0, "12idc:DG1:BurstConfigBO");
        assert_eq!(
            d.channel("trigger_delay").unwrap().address,
            "12idc:DG1:TriggerDelayBO"
        );
    }

    #[test]
    fn test_aps_burst_records() {
        let d = Dg645::new(meta("apstools.devices.DG645Delay"), Dg645Variant::Aps);
        assert_eq!(d.burst_channels().mode, "12idc:DG1:BurstModeO");
        assert!(d.channel("trigger_delay").is_none());
        assert_eq!(
            d.channel("channel_A.delay").unwrap().readback.as_deref(),
            Some("12idc:DG1:ADelayAI")
        );
    }

    #[test]
    fn test_socket_address_parsing() {
        let s = SocketDg645::new(meta("x"), "10.54.122.104:5025").unwrap();
        assert_eq!(s.host(), "10.54.122.104");
        assert_eq!(s.port(), 5025);
        assert!(SocketDg645::new(meta("x"), "10.54.122.104").is_err());
        assert!(SocketDg645::new(meta("x"), ":5025").is_err());
        assert!(SocketDg645::new(meta("x"), "host:99999").is_err());
    }

    #[test]
    fn test_socket_instrument_constants() {
        let s = SocketDg645::new(meta("x"), SOCKET_DG645_DEFAULT_ADDRESS).unwrap();
        assert_eq!(s.burst_maxtime_limit(), 41);
        assert_eq!(SocketDg645::trigger_sources().len(), 7);
        assert_eq!(SocketDg645::trigger_source(0), Some("Internal"));
        assert_eq!(SocketDg645::trigger_source(6), Some("Line"));
        assert_eq!(SocketDg645::trigger_source(7), None);
        let queries = SocketDg645::status_queries();
        assert_eq!(queries[0], ("Serial Poll STATUS", "*STB?\n"));
        assert!(queries.iter().all(|(_, q)| q.ends_with("?\n")));
    }

    #[test]
    fn test_bnc_map() {
        let o = SocketDg645::bnc_output("Detector").unwrap();
        assert_eq!(o.output, "CD");
        assert_eq!(o.amplitude, 3.0);
        assert!(SocketDg645::bnc_output("Laser").is_none());
        let cmds = SocketDg645::amplitude_commands();
        assert_eq!(cmds[0], "LAMP 1, 4.00\n");
        assert_eq!(cmds.len(), 4);
    }

    #[test]
    fn test_shutter_delay() {
        let s = PssShutter::new(meta("apstools.devices.ApsPssShutter"), PSS_SHUTTER_DEFAULT_DELAY_S);
        assert!((s.delay().as_secs_f64() - 1.2).abs() < 1e-6);
        assert_eq!(s.channel("open_signal").unwrap().address, "12idc:DG1:Open");
    }
}
