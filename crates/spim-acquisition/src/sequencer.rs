//! Trigger sequencer: programs pulse bursts across the DAQ device group.

use anyhow::Result;
use spim_core::TriggerDevice;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Drives the trigger device group for one acquisition session.
///
/// The counter (pulse-train) output is the acquisition master clock: every
/// camera exposure and scanning-stage step is slaved to it. The sequencer
/// owns the resulting ordering protocol:
///
/// - waveform tasks are generated, written and started before the pulse
///   train starts in each burst,
/// - `stop` runs before any buffer toggle, so no trigger fires while a
///   buffer transition is in progress.
pub struct TriggerSequencer {
    devices: Vec<(String, Arc<dyn TriggerDevice>)>,
}

impl TriggerSequencer {
    /// Snapshot the device group in deterministic (name) order.
    pub fn new(daqs: &HashMap<String, Arc<dyn TriggerDevice>>) -> Self {
        let mut devices: Vec<_> = daqs
            .iter()
            .map(|(name, device)| (name.clone(), device.clone()))
            .collect();
        devices.sort_by(|a, b| a.0.cmp(&b.0));
        Self { devices }
    }

    /// Generate and write the per-channel waveforms. Called once per tile,
    /// before the first burst.
    pub async fn write_waveforms(&self, channel: &str) -> Result<()> {
        for (name, device) in &self.devices {
            if device.has_waveform_output() || device.has_digital_output() {
                debug!(daq = %name, channel, "generating waveforms");
                device.generate_waveforms(channel).await?;
            }
            if device.has_waveform_output() {
                device.write_ao_waveforms().await?;
            }
            if device.has_digital_output() {
                device.write_do_waveforms().await?;
            }
        }
        Ok(())
    }

    /// Arm and start a finite burst of `pulse_count` trigger pulses.
    ///
    /// Two passes over the group: the first sizes the pulse trains and
    /// starts the slaved waveform tasks, the second starts the pulse trains.
    /// The master clock always starts last.
    pub async fn begin_burst(&self, pulse_count: u32) -> Result<()> {
        for (_, device) in &self.devices {
            if device.has_pulse_output() {
                device.configure_pulses(pulse_count).await?;
            }
            if device.has_waveform_output() || device.has_digital_output() {
                device.start_waveforms().await?;
            }
        }
        for (name, device) in &self.devices {
            if device.has_pulse_output() {
                debug!(daq = %name, pulse_count, "starting pulse train");
                device.start_pulses().await?;
            }
        }
        Ok(())
    }

    /// Stop every device in the group.
    pub async fn stop(&self) -> Result<()> {
        for (name, device) in &self.devices {
            debug!(daq = %name, "stopping trigger device");
            device.stop().await?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
