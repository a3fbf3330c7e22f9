//! Mock channel device (laser / filter wheel).

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use spim_core::ChannelDevice;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Simulated laser or filter recording enable calls and applied settings.
pub struct MockChannelDevice {
    enabled: AtomicBool,
    enable_count: AtomicU32,
    settings: Mutex<HashMap<String, toml::Value>>,
}

impl MockChannelDevice {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            enable_count: AtomicU32::new(0),
            settings: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enable_count(&self) -> u32 {
        self.enable_count.load(Ordering::SeqCst)
    }

    pub fn applied_settings(&self) -> HashMap<String, toml::Value> {
        self.settings.lock().clone()
    }
}

impl Default for MockChannelDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelDevice for MockChannelDevice {
    async fn enable(&self) -> Result<()> {
        self.enabled.store(true, Ordering::SeqCst);
        self.enable_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn apply_setting(&self, name: &str, value: &toml::Value) -> Result<()> {
        tracing::debug!(setting = name, %value, "MockChannelDevice: setting applied");
        self.settings.lock().insert(name.to_string(), value.clone());
        Ok(())
    }
}
