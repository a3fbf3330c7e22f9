//! Mock camera producing test-pattern frames on demand.

use crate::pattern::generate_test_pattern;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use spim_core::{Camera, Frame};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::time::{sleep, Duration};

/// Configuration for the mock camera.
#[derive(Debug, Clone, Deserialize)]
pub struct MockCameraConfig {
    /// Frame width in pixels (default: 512)
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels (default: 512)
    #[serde(default = "default_height")]
    pub height: u32,

    /// Simulated exposure per frame in milliseconds (default: 1)
    #[serde(default = "default_exposure_ms")]
    pub exposure_ms: u64,
}

fn default_width() -> u32 {
    512
}
fn default_height() -> u32 {
    512
}
fn default_exposure_ms() -> u64 {
    1
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            exposure_ms: 1,
        }
    }
}

/// Simulated camera.
///
/// `grab_frame` sleeps for the configured exposure and returns a shifting
/// test pattern. Grabbing before `prepare`/`start` is an error, matching the
/// lifecycle real drivers enforce.
pub struct MockCamera {
    width: u32,
    height: u32,
    exposure: Duration,
    prepared: AtomicBool,
    started: AtomicBool,
    frame_count: AtomicU64,
}

impl MockCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_config(MockCameraConfig {
            width,
            height,
            ..Default::default()
        })
    }

    pub fn with_config(config: MockCameraConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            exposure: Duration::from_millis(config.exposure_ms),
            prepared: AtomicBool::new(false),
            started: AtomicBool::new(false),
            frame_count: AtomicU64::new(0),
        }
    }

    pub fn with_exposure(mut self, exposure: Duration) -> Self {
        self.exposure = exposure;
        self
    }

    /// Total frames grabbed since construction.
    pub fn frames_grabbed(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for MockCamera {
    fn width_px(&self) -> u32 {
        self.width
    }

    fn height_px(&self) -> u32 {
        self.height
    }

    fn bit_depth(&self) -> u32 {
        16
    }

    async fn prepare(&self) -> Result<()> {
        self.prepared.store(true, Ordering::SeqCst);
        tracing::debug!("MockCamera: prepared");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if !self.prepared.load(Ordering::SeqCst) {
            anyhow::bail!("MockCamera: cannot start - not prepared");
        }
        self.started.store(true, Ordering::SeqCst);
        tracing::debug!("MockCamera: started");
        Ok(())
    }

    async fn grab_frame(&self) -> Result<Frame> {
        if !self.started.load(Ordering::SeqCst) {
            anyhow::bail!("MockCamera: cannot grab frame - not started");
        }
        if !self.exposure.is_zero() {
            sleep(self.exposure).await;
        }
        let frame_num = self.frame_count.fetch_add(1, Ordering::SeqCst) + 1;
        let pixels = generate_test_pattern(self.width, self.height, frame_num);
        Ok(Frame::from_u16(self.width, self.height, &pixels))
    }

    async fn signal_acquisition_state(&self) -> Result<()> {
        tracing::debug!(
            frames = self.frame_count.load(Ordering::SeqCst),
            "MockCamera: acquisition state"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        self.prepared.store(false, Ordering::SeqCst);
        tracing::debug!("MockCamera: stopped");
        Ok(())
    }
}
