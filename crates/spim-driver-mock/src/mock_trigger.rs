//! Mock trigger/waveform device recording the trigger protocol.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use spim_core::TriggerDevice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One step of the trigger protocol, recorded in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    WaveformsGenerated(String),
    AoWritten,
    DoWritten,
    PulsesConfigured(u32),
    WaveformsStarted,
    PulsesStarted,
    Stopped,
}

/// Simulated DAQ device with configurable analog, digital and counter
/// outputs.
///
/// Every protocol call is appended to an event log so tests can assert the
/// sequencer's ordering guarantees: waveforms armed before the pulse train
/// starts, and the device stopped before each buffer toggle.
pub struct MockTriggerDevice {
    has_ao: bool,
    has_do: bool,
    has_co: bool,
    events: Arc<Mutex<Vec<TriggerEvent>>>,
    running: AtomicBool,
}

impl MockTriggerDevice {
    /// Device with analog, digital and counter outputs.
    pub fn new() -> Self {
        Self::with_outputs(true, true, true)
    }

    pub fn with_outputs(has_ao: bool, has_do: bool, has_co: bool) -> Self {
        Self {
            has_ao,
            has_do,
            has_co,
            events: Arc::new(Mutex::new(Vec::new())),
            running: AtomicBool::new(false),
        }
    }

    /// Snapshot of the recorded protocol events.
    pub fn events(&self) -> Vec<TriggerEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: TriggerEvent) {
        self.events.lock().push(event);
    }
}

impl Default for MockTriggerDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerDevice for MockTriggerDevice {
    fn has_waveform_output(&self) -> bool {
        self.has_ao
    }

    fn has_digital_output(&self) -> bool {
        self.has_do
    }

    fn has_pulse_output(&self) -> bool {
        self.has_co
    }

    async fn generate_waveforms(&self, channel: &str) -> Result<()> {
        self.record(TriggerEvent::WaveformsGenerated(channel.to_string()));
        Ok(())
    }

    async fn write_ao_waveforms(&self) -> Result<()> {
        if !self.has_ao {
            anyhow::bail!("MockTriggerDevice: no analog output task");
        }
        self.record(TriggerEvent::AoWritten);
        Ok(())
    }

    async fn write_do_waveforms(&self) -> Result<()> {
        if !self.has_do {
            anyhow::bail!("MockTriggerDevice: no digital output task");
        }
        self.record(TriggerEvent::DoWritten);
        Ok(())
    }

    async fn configure_pulses(&self, pulse_count: u32) -> Result<()> {
        if !self.has_co {
            anyhow::bail!("MockTriggerDevice: no counter output task");
        }
        self.record(TriggerEvent::PulsesConfigured(pulse_count));
        Ok(())
    }

    async fn start_waveforms(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.record(TriggerEvent::WaveformsStarted);
        Ok(())
    }

    async fn start_pulses(&self) -> Result<()> {
        if !self.has_co {
            anyhow::bail!("MockTriggerDevice: no counter output task");
        }
        self.running.store(true, Ordering::SeqCst);
        self.record(TriggerEvent::PulsesStarted);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // Stopping an idle device is a no-op, as on real hardware.
        if self.running.swap(false, Ordering::SeqCst) {
            self.record(TriggerEvent::Stopped);
        }
        Ok(())
    }
}
