//! Feature gate in front of the image description capability.
//!
//! The description capability may need an on-demand download before it can
//! serve requests. Every submitted frame is routed according to the current
//! feature status, and the frame's underlying resource is released exactly
//! once on every path.

use anyhow::Result;
use futures_util::future::BoxFuture;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::managers::ingredients::IngredientAccumulator;
use crate::nouns::NounExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Unavailable,
    Downloadable,
    Downloading,
    Available,
}

pub type ProgressSink = Arc<dyn Fn(u64) + Send + Sync>;
pub type TextSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Remote (or downloadable on-device) image description capability.
/// `describe` reports text through `on_text`; every callback carries a
/// complete usable string, there is no explicit completion signal beyond the
/// future resolving.
pub trait DescriptionProvider: Send + Sync {
    fn feature_status(&self) -> BoxFuture<'static, Result<FeatureStatus>>;
    fn download_feature(&self, progress: ProgressSink) -> BoxFuture<'static, Result<()>>;
    fn describe(&self, image_png: Vec<u8>, on_text: TextSink) -> BoxFuture<'static, Result<()>>;
}

/// An in-memory camera frame plus an opaque release hook for whatever backing
/// resource (e.g. a capture buffer) the frame borrows. The hook runs at most
/// once: explicitly via `release`, or from `Drop` as a safety net.
pub struct CameraFrame {
    png: Vec<u8>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CameraFrame {
    pub fn new(png: Vec<u8>) -> Self {
        Self { png, release: None }
    }

    pub fn with_release(png: Vec<u8>, release: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            png,
            release: Some(release),
        }
    }

    pub fn release(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }

    fn take_png(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.png)
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        self.release();
    }
}

/// Gate worker state machine: frames in, ingredient names out.
pub struct DescriptionGate {
    frame_tx: UnboundedSender<CameraFrame>,
}

impl DescriptionGate {
    pub fn new(
        rt: &tokio::runtime::Handle,
        provider: Arc<dyn DescriptionProvider>,
        extractor: Arc<NounExtractor>,
        accumulator: Arc<IngredientAccumulator>,
        frame_skip: u32,
    ) -> Self {
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<CameraFrame>();
        let skip = frame_skip.max(1) as u64;

        rt.spawn(async move {
            let mut counter: u64 = 0;
            let mut download_requested = false;
            while let Some(mut frame) = frame_rx.recv().await {
                let index = counter;
                counter += 1;
                // Camera previews produce far more frames than the provider
                // can absorb; only every skip-th frame is analyzed.
                if index % skip != 0 {
                    frame.release();
                    continue;
                }
                route_frame(
                    &provider,
                    &extractor,
                    &accumulator,
                    &mut download_requested,
                    frame,
                )
                .await;
            }
            debug!("description gate worker stopped");
        });

        Self { frame_tx }
    }

    /// Submit a frame for analysis. Non-blocking; if the gate has shut down
    /// the frame is dropped (and thereby released).
    pub fn submit(&self, frame: CameraFrame) {
        if self.frame_tx.send(frame).is_err() {
            debug!("description gate closed; dropping frame");
        }
    }
}

async fn route_frame(
    provider: &Arc<dyn DescriptionProvider>,
    extractor: &Arc<NounExtractor>,
    accumulator: &Arc<IngredientAccumulator>,
    download_requested: &mut bool,
    mut frame: CameraFrame,
) {
    let status = match provider.feature_status().await {
        Ok(status) => status,
        Err(e) => {
            warn!("feature status check failed: {e:#}");
            frame.release();
            return;
        }
    };

    match status {
        FeatureStatus::Unavailable => {
            frame.release();
        }
        FeatureStatus::Downloadable => {
            if *download_requested {
                // The one-time download request was already issued (and
                // evidently failed, or the status would have moved on).
                frame.release();
                return;
            }
            *download_requested = true;
            let progress: ProgressSink =
                Arc::new(|bytes| debug!("description feature download: {bytes} bytes"));
            match provider.download_feature(progress).await {
                Ok(()) => process_frame(provider, extractor, accumulator, frame).await,
                Err(e) => {
                    warn!("description feature download failed: {e:#}");
                    frame.release();
                }
            }
        }
        FeatureStatus::Downloading | FeatureStatus::Available => {
            process_frame(provider, extractor, accumulator, frame).await;
        }
    }
}

async fn process_frame(
    provider: &Arc<dyn DescriptionProvider>,
    extractor: &Arc<NounExtractor>,
    accumulator: &Arc<IngredientAccumulator>,
    mut frame: CameraFrame,
) {
    let png = frame.take_png();
    let extractor = Arc::clone(extractor);
    let accumulator = Arc::clone(accumulator);
    let on_text: TextSink = Arc::new(move |text: &str| {
        let nouns = extractor.extract(text);
        if !nouns.is_empty() {
            accumulator.add_all(nouns);
        }
    });

    if let Err(e) = provider.describe(png, on_text).await {
        warn!("image description failed: {e:#}");
    }
    frame.release();
}
