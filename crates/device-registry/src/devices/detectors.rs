use super::{table_channels, Access, Capability, Channel, Device, DeviceMeta};
use std::any::Any;
use std::num::ParseIntError;

pub const SCALER_CHANNELS: usize = 32;

const SCALER_FIELDS: &[(&str, &str, Access)] = &[
    ("count", ".CNT", Access::ReadWrite),
    ("count_mode", ".CONT", Access::ReadWrite),
    ("delay", ".DLY", Access::ReadWrite),
    ("auto_count_delay", ".DLY1", Access::ReadWrite),
    ("elapsed_time", ".T", Access::Read),
    ("preset_time", ".TP", Access::ReadWrite),
    ("freq", ".FREQ", Access::ReadWrite),
];

/// Scaler record with named channels.
#[derive(Debug, Clone)]
pub struct ScalerCh {
    meta: DeviceMeta,
}

impl ScalerCh {
    pub fn new(meta: DeviceMeta) -> Self {
        Self { meta }
    }
}

impl Device for ScalerCh {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::SingleDevice
    }

    fn channels(&self) -> Vec<Channel> {
        let mut out = table_channels(&self.meta, SCALER_FIELDS);
        for n in 1..=SCALER_CHANNELS {
            let attr = format!("channels.chan{n:02}");
            out.push(Channel::new(
                format!("{attr}.s"),
                self.meta.pv(&format!(".S{n}")),
                Access::Read,
            ));
            out.push(Channel::new(
                format!("{attr}.chname"),
                self.meta.pv(&format!(".NM{n}")),
                Access::ReadWrite,
            ));
        }
        out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

const STRUCK3820_FIELDS: &[(&str, &str, Access)] = &[
    ("start_all", "StartAll", Access::Write),
    ("stop_all", "StopAll", Access::Write),
    ("erase_all", "EraseAll", Access::Write),
    ("erase_start", "EraseStart", Access::Write),
    ("acquiring", "Acquiring", Access::Read),
    ("elapsed_real", "ElapsedReal", Access::Read),
    ("preset_real", "PresetReal", Access::ReadWrite),
    ("dwell", "Dwell", Access::ReadWrite),
    ("channel_advance", "ChannelAdvance", Access::ReadWrite),
    ("count_on_start", "CountOnStart", Access::ReadWrite),
    ("software_channel_advance", "SoftwareChannelAdvance", Access::Write),
    ("channel1_source", "Channel1Source", Access::ReadWrite),
    ("user_led", "UserLED", Access::ReadWrite),
    ("mux_output", "MUXOutput", Access::ReadWrite),
    ("input_mode", "InputMode", Access::ReadWrite),
    ("output_mode", "OutputMode", Access::ReadWrite),
    ("output_polarity", "OutputPolarity", Access::ReadWrite),
    ("model", "Model", Access::Read),
    ("firmware", "Firmware", Access::Read),
    ("max_channels", "MaxChannels", Access::Read),
];

/// SIS3820 multichannel scaler. The 12-ID unit has no clock-frequency record.
#[derive(Debug, Clone)]
pub struct Struck3820 {
    meta: DeviceMeta,
    clock_frequency: bool,
}

impl Struck3820 {
    pub fn new(meta: DeviceMeta, clock_frequency: bool) -> Self {
        Self {
            meta,
            clock_frequency,
        }
    }

    pub fn has_clock_frequency(&self) -> bool {
        self.clock_frequency
    }
}

impl Device for Struck3820 {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::SingleDevice
    }

    fn channels(&self) -> Vec<Channel> {
        let mut out = table_channels(&self.meta, STRUCK3820_FIELDS);
        if self.clock_frequency {
            out.push(Channel::new(
                "clock_frequency",
                self.meta.pv("ClockFrequency"),
                Access::ReadWrite,
            ));
        }
        out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Area-detector plugin families, keyed by the plugin attribute name
/// without its trailing number (`roi2` → `roi`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Cam,
    Image,
    Pva,
    Hdf5,
    Tiff,
    Roi,
    Stats,
    Process,
    Transform,
    Overlay,
    Codec,
}

impl PluginKind {
    pub const ALL: [PluginKind; 11] = [
        Self::Cam,
        Self::Image,
        Self::Pva,
        Self::Hdf5,
        Self::Tiff,
        Self::Roi,
        Self::Stats,
        Self::Process,
        Self::Transform,
        Self::Overlay,
        Self::Codec,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Cam => "cam",
            Self::Image => "image",
            Self::Pva => "pva",
            Self::Hdf5 => "hdf",
            Self::Tiff => "tiff",
            Self::Roi => "roi",
            Self::Stats => "stats",
            Self::Process => "proc",
            Self::Transform => "trans",
            Self::Overlay => "over",
            Self::Codec => "codec",
        }
    }

    /// Record-name stem used by the IOC (`HDF1:`, `Stats3:`).
    fn stem(self) -> &'static str {
        match self {
            Self::Cam => "cam",
            Self::Image => "image",
            Self::Pva => "Pva",
            Self::Hdf5 => "HDF",
            Self::Tiff => "TIFF",
            Self::Roi => "ROI",
            Self::Stats => "Stats",
            Self::Process => "Proc",
            Self::Transform => "Trans",
            Self::Overlay => "Over",
            Self::Codec => "Codec",
        }
    }

    pub fn default_class(self) -> &'static str {
        match self {
            Self::Cam => "ophyd.areadetector.cam.AreaDetectorCam",
            Self::Image => "ophyd.areadetector.plugins.ImagePlugin_V34",
            Self::Pva => "ophyd.areadetector.plugins.PvaPlugin_V34",
            Self::Hdf5 => "apstools.devices.AD_EpicsFileNameHDF5Plugin",
            Self::Tiff => "apstools.devices.AD_EpicsFileNameTIFFPlugin",
            Self::Roi => "ophyd.areadetector.plugins.ROIPlugin_V34",
            Self::Stats => "ophyd.areadetector.plugins.StatsPlugin_V34",
            Self::Process => "ophyd.areadetector.plugins.ProcessPlugin_V34",
            Self::Transform => "ophyd.areadetector.plugins.TransformPlugin_V34",
            Self::Overlay => "ophyd.areadetector.plugins.OverlayPlugin_V34",
            Self::Codec => "ophyd.areadetector.plugins.CodecPlugin_V34",
        }
    }

    /// Split a plugin attribute into its kind and instance number.
    ///
    /// `Ok(None)` for an attribute outside the known families. An instance
    /// number that does not fit a `u32` is an error.
    pub fn parse(attr: &str) -> Result<Option<(PluginKind, Option<u32>)>, ParseIntError> {
        let stem = attr.trim_end_matches(|c: char| c.is_ascii_digit());
        let Some(kind) = Self::ALL.into_iter().find(|k| k.key() == stem) else {
            return Ok(None);
        };
        let digits = &attr[stem.len()..];
        let number = if digits.is_empty() {
            None
        } else {
            Some(digits.parse()?)
        };
        Ok(Some((kind, number)))
    }

    /// Default record suffix for a plugin attribute: `cam` → `cam1:`,
    /// `hdf1` → `HDF1:`, `stats3` → `Stats3:`.
    pub fn default_suffix(self, number: Option<u32>) -> String {
        format!("{}{}:", self.stem(), number.unwrap_or(1))
    }

    fn is_file_writer(self) -> bool {
        matches!(self, Self::Hdf5 | Self::Tiff)
    }
}

/// One plugin of an area detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdPlugin {
    pub attr: String,
    /// `None` for a site plugin outside the known families.
    pub kind: Option<PluginKind>,
    pub class: String,
    /// Full record prefix, detector prefix included.
    pub prefix: String,
    pub read_path: Option<String>,
    pub write_path: Option<String>,
}

impl AdPlugin {
    fn channels(&self) -> Vec<Channel> {
        let p = &self.prefix;
        let mut out = Vec::new();
        match self.kind {
            Some(PluginKind::Cam) => {
                out.push(Channel::with_rbv("acquire", p, "Acquire"));
                out.push(Channel::with_rbv("acquire_time", p, "AcquireTime"));
                out.push(Channel::with_rbv("acquire_period", p, "AcquirePeriod"));
                out.push(Channel::with_rbv("image_mode", p, "ImageMode"));
                out.push(Channel::with_rbv("num_images", p, "NumImages"));
                out.push(Channel::with_rbv("trigger_mode", p, "TriggerMode"));
                out.push(Channel::new(
                    "detector_state",
                    format!("{p}DetectorState_RBV"),
                    Access::Read,
                ));
                // dropped from the cam record as of AD 3.4
                if !self.class.ends_with("_V34") {
                    out.push(Channel::new(
                        "pool_max_buffers",
                        format!("{p}PoolMaxBuffers"),
                        Access::Read,
                    ));
                }
            }
            _ => {
                out.push(Channel::with_rbv("enable", p, "EnableCallbacks"));
                out.push(Channel::with_rbv("nd_array_port", p, "NDArrayPort"));
            }
        }
        out.push(Channel::with_rbv("array_counter", p, "ArrayCounter"));
        if self.kind.is_some_and(PluginKind::is_file_writer) {
            out.push(Channel::with_rbv("file_path", p, "FilePath"));
            out.push(Channel::with_rbv("file_name", p, "FileName"));
            out.push(Channel::with_rbv("file_template", p, "FileTemplate"));
            out.push(Channel::with_rbv("capture", p, "Capture"));
        }
        out.into_iter().map(|c| c.nested(&self.attr)).collect()
    }
}

/// An area detector assembled from a cam and its plugin chain.
#[derive(Debug, Clone)]
pub struct AreaDetector {
    meta: DeviceMeta,
    type_name: String,
    plugins: Vec<AdPlugin>,
}

impl AreaDetector {
    pub fn new(meta: DeviceMeta, type_name: String, plugins: Vec<AdPlugin>) -> Self {
        Self {
            meta,
            type_name,
            plugins,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn plugins(&self) -> &[AdPlugin] {
        &self.plugins
    }

    pub fn plugin(&self, attr: &str) -> Option<&AdPlugin> {
        self.plugins.iter().find(|p| p.attr == attr)
    }

    pub fn cam(&self) -> Option<&AdPlugin> {
        self.plugins
            .iter()
            .find(|p| p.kind == Some(PluginKind::Cam))
    }
}

impl Device for AreaDetector {
    fn meta(&self) -> &DeviceMeta {
        &self.meta
    }

    fn capability(&self) -> Capability {
        Capability::CompoundInstrument
    }

    fn channels(&self) -> Vec<Channel> {
        self.plugins.iter().flat_map(AdPlugin::channels).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_kind_parse() {
        assert_eq!(PluginKind::parse("cam"), Ok(Some((PluginKind::Cam, None))));
        assert_eq!(PluginKind::parse("hdf1"), Ok(Some((PluginKind::Hdf5, Some(1)))));
        assert_eq!(PluginKind::parse("stats12"), Ok(Some((PluginKind::Stats, Some(12)))));
        assert_eq!(PluginKind::parse("magic1"), Ok(None));
    }

    #[test]
    fn test_plugin_number_overflow_is_an_error() {
        assert!(PluginKind::parse("roi99999999999").is_err());
        assert_eq!(
            PluginKind::parse("roi4294967295"),
            Ok(Some((PluginKind::Roi, Some(u32::MAX))))
        );
        assert_eq!(PluginKind::Cam.default_suffix(None), "cam1:");
        assert_eq!(PluginKind::Hdf5.default_suffix(Some(2)), "HDF2:");
        assert_eq!(PluginKind::Pva.default_suffix(None), "Pva1:");
    }

    #[test]
    fn test_scaler_channel_count() {
        let s = ScalerCh::new(DeviceMeta::new("scaler1", "12idc:scaler1", vec![], "ophyd.scaler.ScalerCH"));
        assert_eq!(s.channels().len(), SCALER_FIELDS.len() + 2 * SCALER_CHANNELS);
        assert_eq!(
            s.channel("channels.chan02.s").unwrap().address,
            "12idc:scaler1.S2"
        );
    }

    #[test]
    fn test_struck_without_clock_frequency() {
        let meta = DeviceMeta::new("struck", "12idc:3820:", vec![], "x");
        assert!(Struck3820::new(meta.clone(), true).channel("clock_frequency").is_some());
        assert!(Struck3820::new(meta, false).channel("clock_frequency").is_none());
    }

    fn plugin(attr: &str, kind: PluginKind, class: &str) -> AdPlugin {
        AdPlugin {
            attr: attr.into(),
            kind: Some(kind),
            class: class.into(),
            prefix: format!("12idcPIL:{}", kind.default_suffix(None)),
            read_path: None,
            write_path: None,
        }
    }

    #[test]
    fn test_v34_cam_has_no_pool_max_buffers() {
        let det = AreaDetector::new(
            DeviceMeta::new("pilatus", "12idcPIL:", vec![], "apstools.devices.ad_creator"),
            "Pilatus".into(),
            vec![
                plugin("cam", PluginKind::Cam, "id12_common.devices.ID12_PilatusCam_V34"),
                plugin("hdf1", PluginKind::Hdf5, PluginKind::Hdf5.default_class()),
            ],
        );
        assert!(det.channel("cam.pool_max_buffers").is_none());
        assert_eq!(
            det.channel("cam.acquire").unwrap().address,
            "12idcPIL:cam1:Acquire"
        );
        assert!(det.channel("hdf1.file_path").is_some());
        assert_eq!(det.cam().unwrap().attr, "cam");
        assert_eq!(det.capability(), Capability::CompoundInstrument);
    }

    #[test]
    fn test_legacy_cam_keeps_pool_max_buffers() {
        let p = plugin("cam", PluginKind::Cam, "ophyd.areadetector.cam.AreaDetectorCam");
        assert!(p.channels().iter().any(|c| c.attr == "cam.pool_max_buffers"));
    }
}
