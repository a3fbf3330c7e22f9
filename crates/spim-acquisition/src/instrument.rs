//! Instrument: the capability bag of devices the engine drives.

use spim_core::{Camera, ChannelDevice, Stage, TriggerDevice};
use std::collections::HashMap;
use std::sync::Arc;

/// All devices of one microscope, grouped by role.
///
/// Built once at startup from driver factories or mocks; the engine only
/// ever sees the capability trait objects. Channel identifiers map to the
/// channel devices (lasers, filters) enabled for a tile, and every device
/// carries a kind tag used when building per-device filenames.
pub struct Instrument {
    cameras: HashMap<String, Arc<dyn Camera>>,
    tiling_stages: HashMap<String, Arc<dyn Stage>>,
    scanning_stages: HashMap<String, Arc<dyn Stage>>,
    daqs: HashMap<String, Arc<dyn TriggerDevice>>,
    channel_devices: HashMap<String, Arc<dyn ChannelDevice>>,
    channels: HashMap<String, Vec<String>>,
    device_kinds: HashMap<String, String>,
}

impl Instrument {
    pub fn builder() -> InstrumentBuilder {
        InstrumentBuilder::default()
    }

    pub fn cameras(&self) -> &HashMap<String, Arc<dyn Camera>> {
        &self.cameras
    }

    pub fn tiling_stages(&self) -> &HashMap<String, Arc<dyn Stage>> {
        &self.tiling_stages
    }

    pub fn scanning_stages(&self) -> &HashMap<String, Arc<dyn Stage>> {
        &self.scanning_stages
    }

    pub fn daqs(&self) -> &HashMap<String, Arc<dyn TriggerDevice>> {
        &self.daqs
    }

    pub fn channel_devices(&self) -> &HashMap<String, Arc<dyn ChannelDevice>> {
        &self.channel_devices
    }

    /// Channel id -> names of the devices enabled for that channel.
    pub fn channels(&self) -> &HashMap<String, Vec<String>> {
        &self.channels
    }

    /// Device name -> kind tag ("camera", "stage", "daq", "laser", ...).
    pub fn device_kinds(&self) -> &HashMap<String, String> {
        &self.device_kinds
    }
}

/// Builder assembling an [`Instrument`] from capability objects.
#[derive(Default)]
pub struct InstrumentBuilder {
    cameras: HashMap<String, Arc<dyn Camera>>,
    tiling_stages: HashMap<String, Arc<dyn Stage>>,
    scanning_stages: HashMap<String, Arc<dyn Stage>>,
    daqs: HashMap<String, Arc<dyn TriggerDevice>>,
    channel_devices: HashMap<String, Arc<dyn ChannelDevice>>,
    channels: HashMap<String, Vec<String>>,
    device_kinds: HashMap<String, String>,
}

impl InstrumentBuilder {
    pub fn camera(mut self, id: &str, camera: Arc<dyn Camera>) -> Self {
        self.device_kinds.insert(id.to_string(), "camera".into());
        self.cameras.insert(id.to_string(), camera);
        self
    }

    pub fn tiling_stage(mut self, id: &str, stage: Arc<dyn Stage>) -> Self {
        self.device_kinds.insert(id.to_string(), "stage".into());
        self.tiling_stages.insert(id.to_string(), stage);
        self
    }

    pub fn scanning_stage(mut self, id: &str, stage: Arc<dyn Stage>) -> Self {
        self.device_kinds.insert(id.to_string(), "stage".into());
        self.scanning_stages.insert(id.to_string(), stage);
        self
    }

    pub fn daq(mut self, id: &str, daq: Arc<dyn TriggerDevice>) -> Self {
        self.device_kinds.insert(id.to_string(), "daq".into());
        self.daqs.insert(id.to_string(), daq);
        self
    }

    /// Register a channel device (laser, filter) with its kind tag.
    pub fn channel_device(
        mut self,
        id: &str,
        kind: &str,
        device: Arc<dyn ChannelDevice>,
    ) -> Self {
        self.device_kinds.insert(id.to_string(), kind.to_string());
        self.channel_devices.insert(id.to_string(), device);
        self
    }

    /// Define a channel as the set of device names enabled for it.
    pub fn channel(mut self, id: &str, device_ids: Vec<String>) -> Self {
        self.channels.insert(id.to_string(), device_ids);
        self
    }

    pub fn build(self) -> Instrument {
        Instrument {
            cameras: self.cameras,
            tiling_stages: self.tiling_stages,
            scanning_stages: self.scanning_stages,
            daqs: self.daqs,
            channel_devices: self.channel_devices,
            channels: self.channels,
            device_kinds: self.device_kinds,
        }
    }
}
