//! Tile orchestrator: drives the full scan.

use crate::cancel::CancelToken;
use crate::capture::CaptureTask;
use crate::instrument::Instrument;
use crate::registry::OperationRegistry;
use crate::sequencer::TriggerSequencer;
use anyhow::{anyhow, Result};
use spim_core::{EngineError, EngineResult, ScanPlan, Tile, Transfer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Interval for polling tiling-stage motion.
const STAGE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How an acquisition run ended.
///
/// Cancellation is a cooperative shutdown path, not an error; `Err` is
/// reserved for configuration and hardware failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every tile was acquired and every transfer finished.
    Completed,
    /// The stop token was set; capture tasks were joined, transfers were
    /// left untouched and resources may not have been released.
    Cancelled,
}

/// The acquisition engine for one session.
///
/// Holds the instrument, the operation registry and the scan plan, and owns
/// the session state: per-camera capture tasks (spawned and joined once per
/// tile) and per-device background transfers (persisted across tile
/// boundaries).
///
/// Construction validates everything that must be fatal before hardware is
/// armed: uniform writer chunk size, per-tile frame counts, channel
/// references and writer coverage per camera.
pub struct AcquisitionEngine {
    instrument: Arc<Instrument>,
    operations: OperationRegistry,
    plan: ScanPlan,
    chunk_count_px: u32,
    cancel: CancelToken,
    capture_tasks: Mutex<HashMap<String, JoinHandle<Result<()>>>>,
    active_transfers: Mutex<HashMap<String, Vec<(String, Arc<dyn Transfer>)>>>,
}

impl AcquisitionEngine {
    pub fn new(
        instrument: Arc<Instrument>,
        operations: OperationRegistry,
        plan: ScanPlan,
    ) -> EngineResult<Self> {
        // Chunk sizes must agree across all writers for the whole session.
        let chunk_count_px = operations.session_chunk_size()?;

        for camera_id in instrument.cameras().keys() {
            let has_writer = operations
                .writers_for(camera_id)
                .is_some_and(|writers| !writers.is_empty());
            if !has_writer {
                return Err(EngineError::MissingWriter {
                    camera: camera_id.clone(),
                });
            }
        }

        plan.validate(chunk_count_px)?;
        for tile in &plan.tiles {
            if !instrument.channels().contains_key(&tile.channel) {
                return Err(EngineError::UnknownChannel {
                    tile: tile.tile_number,
                    channel: tile.channel.clone(),
                });
            }
        }

        // Writer destinations must exist before the first chunk lands.
        for (_, writer) in operations.all_writers() {
            if let Some(path) = writer.output_path() {
                std::fs::create_dir_all(path)?;
            }
        }

        info!(
            chunk_count_px,
            tiles = plan.tiles.len(),
            cameras = instrument.cameras().len(),
            "acquisition session validated"
        );

        Ok(Self {
            instrument,
            operations,
            plan,
            chunk_count_px,
            cancel: CancelToken::new(),
            capture_tasks: Mutex::new(HashMap::new()),
            active_transfers: Mutex::new(HashMap::new()),
        })
    }

    /// Session chunk size derived from the writers.
    pub fn chunk_count_px(&self) -> u32 {
        self.chunk_count_px
    }

    /// Token observed by every capture loop.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Acquire every tile in the plan.
    pub async fn run(&self) -> Result<RunOutcome> {
        let sequencer = Arc::new(TriggerSequencer::new(self.instrument.daqs()));

        for tile in &self.plan.tiles {
            if self.cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            info!(tile = tile.tile_number, channel = %tile.channel, "starting tile");
            let filenames = self.tile_filenames(tile);

            self.position_tiling_stages(tile).await?;
            self.position_scanning_stages(tile).await?;
            self.setup_channel(tile).await?;
            sequencer.write_waveforms(&tile.channel).await?;
            self.run_routines(&filenames).await?;

            self.spawn_captures(tile, &sequencer, &filenames).await;
            let capture_errors = self.join_captures().await;

            // Stop the trigger group before anything else touches hardware.
            sequencer.stop().await?;

            if let Some(first) = capture_errors.into_iter().next() {
                return Err(first);
            }
            if self.cancel.is_cancelled() {
                // Transfers are deliberately left alone on cancellation.
                return Ok(RunOutcome::Cancelled);
            }

            self.reconcile_transfers(&filenames).await?;
        }

        self.wait_for_outstanding_transfers().await?;
        info!("acquisition complete");
        Ok(RunOutcome::Completed)
    }

    /// Request cancellation and join every capture task before returning.
    pub async fn stop(&self) -> Result<()> {
        info!("stop requested");
        self.cancel.cancel();
        loop {
            let next = {
                let mut tasks = self.capture_tasks.lock().await;
                let key = tasks.keys().next().cloned();
                key.and_then(|k| tasks.remove(&k).map(|handle| (k, handle)))
            };
            let Some((camera_id, handle)) = next else {
                break;
            };
            match handle.await {
                Ok(Ok(())) => debug!(camera = %camera_id, "capture task joined"),
                Ok(Err(e)) => warn!(camera = %camera_id, error = %e, "capture task ended with error"),
                Err(join_err) => {
                    warn!(camera = %camera_id, error = %join_err, "capture task aborted")
                }
            }
        }
        Ok(())
    }

    /// Filenames for every instrument device:
    /// `{prefix}_{tile}_ch_{channel}_{kind}_{device}`.
    fn tile_filenames(&self, tile: &Tile) -> HashMap<String, String> {
        self.instrument
            .device_kinds()
            .iter()
            .map(|(device, kind)| {
                let filename = format!(
                    "{}_{}_ch_{}_{}_{}",
                    tile.prefix, tile.tile_number, tile.channel, kind, device
                );
                (device.clone(), filename)
            })
            .collect()
    }

    /// Move all tiling stages, then wait on them simultaneously, logging
    /// intermediate positions while they settle.
    async fn position_tiling_stages(&self, tile: &Tile) -> Result<()> {
        for (stage_id, stage) in self.instrument.tiling_stages() {
            let axis = stage.instrument_axis();
            let target = tile.position_on(axis);
            info!(stage = %stage_id, axis, target_mm = target, "moving tiling stage");
            stage.move_absolute_mm(target, false).await?;
        }

        for (stage_id, stage) in self.instrument.tiling_stages() {
            while stage.is_moving().await? {
                let axis = stage.instrument_axis();
                let position_mm = stage.position_mm().await?;
                info!(
                    stage = %stage_id,
                    axis,
                    position_mm,
                    target_mm = tile.position_on(axis),
                    "waiting for tiling stage"
                );
                sleep(STAGE_POLL_INTERVAL).await;
            }
        }
        Ok(())
    }

    /// Command scanning stages into their step-and-shoot start position.
    /// Their motion is paced by triggers, so it is not awaited here.
    async fn position_scanning_stages(&self, tile: &Tile) -> Result<()> {
        for (stage_id, stage) in self.instrument.scanning_stages() {
            let axis = stage.instrument_axis();
            let target = tile.position_on(axis);
            info!(stage = %stage_id, axis, target_mm = target, "setting up scanning stage");
            stage.move_absolute_mm(target, false).await?;
        }
        Ok(())
    }

    /// Enable the channel's devices and apply the tile's per-device settings.
    async fn setup_channel(&self, tile: &Tile) -> Result<()> {
        info!(channel = %tile.channel, "setting up channel");
        let device_ids = self
            .instrument
            .channels()
            .get(&tile.channel)
            .ok_or_else(|| anyhow!("channel '{}' disappeared after validation", tile.channel))?;

        for device_id in device_ids {
            let Some(device) = self.instrument.channel_devices().get(device_id) else {
                continue;
            };
            device.enable().await?;
            if let Some(settings) = tile.device_settings.get(device_id) {
                for (name, value) in settings {
                    info!(device = %device_id, setting = %name, %value, "applying tile setting");
                    device.apply_setting(name, value).await?;
                }
            }
        }
        Ok(())
    }

    /// Run pre-capture routines with their per-device filenames.
    async fn run_routines(&self, filenames: &HashMap<String, String>) -> Result<()> {
        for (device_id, routines) in self.operations.routines() {
            for (routine_name, routine) in routines {
                let base = filenames
                    .get(device_id)
                    .cloned()
                    .unwrap_or_else(|| device_id.clone());
                info!(device = %device_id, routine = %routine_name, "running routine");
                routine
                    .set_filename(&format!("{base}_{routine_name}"))
                    .await?;
                routine.start().await?;
            }
        }
        Ok(())
    }

    /// Spawn one capture task per camera.
    async fn spawn_captures(
        &self,
        tile: &Tile,
        sequencer: &Arc<TriggerSequencer>,
        filenames: &HashMap<String, String>,
    ) {
        let mut tasks = self.capture_tasks.lock().await;
        for (camera_id, camera) in self.instrument.cameras() {
            let writers = self
                .operations
                .writers_for(camera_id)
                .map(|writers| {
                    writers
                        .iter()
                        .map(|(name, writer)| (name.clone(), writer.clone()))
                        .collect()
                })
                .unwrap_or_default();
            let processes = self
                .operations
                .processes_for(camera_id)
                .map(|processes| {
                    processes
                        .iter()
                        .map(|(name, process)| (name.clone(), process.clone()))
                        .collect()
                })
                .unwrap_or_default();

            let task = CaptureTask {
                camera_id: camera_id.clone(),
                camera: camera.clone(),
                writers,
                processes,
                sequencer: sequencer.clone(),
                chunk_count_px: self.chunk_count_px,
                tile: tile.clone(),
                filename: filenames
                    .get(camera_id)
                    .cloned()
                    .unwrap_or_else(|| camera_id.clone()),
                cancel: self.cancel.clone(),
            };

            info!(camera = %camera_id, tile = tile.tile_number, "starting capture task");
            tasks.insert(camera_id.clone(), tokio::spawn(task.run()));
        }
    }

    /// Join every capture task, surfacing failures instead of swallowing
    /// them.
    async fn join_captures(&self) -> Vec<anyhow::Error> {
        let mut errors = Vec::new();
        loop {
            let next = {
                let mut tasks = self.capture_tasks.lock().await;
                let key = tasks.keys().next().cloned();
                key.and_then(|k| tasks.remove(&k).map(|handle| (k, handle)))
            };
            let Some((camera_id, handle)) = next else {
                break;
            };
            debug!(camera = %camera_id, "waiting for capture task");
            match handle.await {
                Ok(Ok(())) => info!(camera = %camera_id, "capture task finished"),
                Ok(Err(e)) => {
                    error!(camera = %camera_id, error = %e, "capture task failed");
                    errors.push(e.context(format!("camera '{camera_id}'")));
                }
                Err(join_err) => {
                    error!(camera = %camera_id, error = %join_err, "capture task aborted");
                    errors.push(anyhow!(
                        "capture task for camera '{camera_id}' aborted: {join_err}"
                    ));
                }
            }
        }
        errors
    }

    /// Block on transfers left over from the previous tile, then start this
    /// tile's transfers. A device's filename is never reused while its
    /// previous transfer is still in flight.
    async fn reconcile_transfers(&self, filenames: &HashMap<String, String>) -> Result<()> {
        let mut active = self.active_transfers.lock().await;

        for (device_id, transfers) in active.drain() {
            for (transfer_name, transfer) in transfers {
                if transfer.is_alive() {
                    info!(device = %device_id, transfer = %transfer_name, "waiting on file transfer");
                    transfer.wait_until_finished().await?;
                }
            }
        }

        for (device_id, transfers) in self.operations.transfers() {
            let mut started = Vec::with_capacity(transfers.len());
            for (transfer_name, transfer) in transfers {
                let filename = filenames
                    .get(device_id)
                    .cloned()
                    .unwrap_or_else(|| device_id.clone());
                transfer.set_filename(&filename).await?;
                info!(device = %device_id, transfer = %transfer_name, %filename, "starting file transfer");
                transfer.start().await?;
                started.push((transfer_name.clone(), transfer.clone()));
            }
            active.insert(device_id.clone(), started);
        }
        Ok(())
    }

    /// Wait for the final tile's transfers.
    async fn wait_for_outstanding_transfers(&self) -> Result<()> {
        let mut active = self.active_transfers.lock().await;
        for (device_id, transfers) in active.drain() {
            for (transfer_name, transfer) in transfers {
                if transfer.is_alive() {
                    info!(device = %device_id, transfer = %transfer_name, "waiting on final file transfer");
                }
                transfer.wait_until_finished().await?;
            }
        }
        Ok(())
    }
}
