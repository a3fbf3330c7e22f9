//! Mock motion stage.

use anyhow::Result;
use async_trait::async_trait;
use spim_core::Stage;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};

#[derive(Debug)]
struct StageState {
    position_mm: f64,
    moving: bool,
}

/// Simulated linear stage bound to one instrument axis.
///
/// The default is instant motion; [`with_speed`](Self::with_speed) builds a
/// stage whose non-waited moves run in a background task so `is_moving`
/// polling sees realistic settle behavior.
pub struct MockStage {
    axis: String,
    state: Arc<RwLock<StageState>>,
    speed_mm_per_sec: Option<f64>,
    move_count: AtomicU32,
}

impl MockStage {
    /// Instant-motion stage on the given axis.
    pub fn new(axis: &str) -> Self {
        Self {
            axis: axis.to_string(),
            state: Arc::new(RwLock::new(StageState {
                position_mm: 0.0,
                moving: false,
            })),
            speed_mm_per_sec: None,
            move_count: AtomicU32::new(0),
        }
    }

    /// Stage with a finite motion speed in mm/s.
    pub fn with_speed(axis: &str, speed_mm_per_sec: f64) -> Self {
        Self {
            speed_mm_per_sec: Some(speed_mm_per_sec.max(f64::EPSILON)),
            ..Self::new(axis)
        }
    }

    /// Number of motion commands issued. Used by tests to prove validation
    /// failures happen before any stage motion.
    pub fn move_count(&self) -> u32 {
        self.move_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for MockStage {
    fn instrument_axis(&self) -> &str {
        &self.axis
    }

    async fn move_absolute_mm(&self, position_mm: f64, wait: bool) -> Result<()> {
        self.move_count.fetch_add(1, Ordering::SeqCst);

        let Some(speed) = self.speed_mm_per_sec else {
            let mut state = self.state.write().await;
            state.position_mm = position_mm;
            tracing::debug!(axis = %self.axis, position_mm, "MockStage: moved (instant)");
            return Ok(());
        };

        let travel = {
            let mut state = self.state.write().await;
            let travel =
                Duration::from_secs_f64((position_mm - state.position_mm).abs() / speed);
            state.moving = true;
            travel
        };

        if wait {
            sleep(travel).await;
            let mut state = self.state.write().await;
            state.position_mm = position_mm;
            state.moving = false;
        } else {
            let state = self.state.clone();
            let axis = self.axis.clone();
            tokio::spawn(async move {
                sleep(travel).await;
                let mut state = state.write().await;
                state.position_mm = position_mm;
                state.moving = false;
                tracing::debug!(axis = %axis, position_mm, "MockStage: settled");
            });
        }
        Ok(())
    }

    async fn is_moving(&self) -> Result<bool> {
        Ok(self.state.read().await.moving)
    }

    async fn position_mm(&self) -> Result<f64> {
        Ok(self.state.read().await.position_mm)
    }
}
