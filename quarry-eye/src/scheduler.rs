//! Frame loop: drives preprocessing, inference, suppression, smoothing and
//! rendering once per tick.
//!
//! ```text
//!            source live             settle event
//!   Idle ─────────────────▶ Detecting ───────────▶ Settling
//!    ▲                        │  ▲                    │
//!    └──── source not live ───┘  └── listener done ───┘
//! ```

use crate::config::DetectionConfig;
use crate::error::VisionError;
use crate::frame::FrameSource;
use crate::models::engine::{InferenceBackend, InferenceEngine};
use crate::preprocess::FramePreprocessor;
use crate::processing::geometry;
use crate::processing::smoother::{DetectionSmoother, SettleEvent};
use crate::processing::suppression::Suppressor;
use crate::processing::Detection;
use crate::render::overlay::OverlayRenderer;
use crate::render::surface::Surface;
use crate::scope::{ScopeStats, TickArena, TickScope};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Receives the loop's notifications
#[async_trait]
pub trait FrameListener: Send + Sync {
    /// A class settled; the loop waits for this to finish before the next tick
    async fn on_settle(&self, event: &SettleEvent);

    /// Names of the classes kept in a frame, called only when there are any
    fn on_frame_observations(&self, _class_names: &[String]) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Detecting,
    Settling,
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Source not live or not ready; surface cleared, no inference
    Idle,
    /// Detections drawn onto the surface
    Rendered { detections: Vec<Detection> },
    /// A class settled; surface cleared, counters reset
    Settled(SettleEvent),
    /// Per-frame failure; surface left as last rendered
    Aborted,
}

/// Tallies of a finished [`FrameLoop::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub idle: u64,
    pub rendered: u64,
    pub settled: u64,
    pub aborted: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::Idle => self.idle += 1,
            TickOutcome::Rendered { .. } => self.rendered += 1,
            TickOutcome::Settled(_) => self.settled += 1,
            TickOutcome::Aborted => self.aborted += 1,
        }
    }
}

/// Start/stop switch for [`FrameLoop::run`], cloneable across tasks
#[derive(Debug, Clone, Default)]
pub struct LoopHandle {
    running: Arc<RwLock<bool>>,
}

impl LoopHandle {
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    fn start(&self) {
        *self.running.write() = true;
    }
}

/// Components that turn one frame into kept detections
struct Pipeline<B: InferenceBackend> {
    preprocessor: FramePreprocessor,
    engine: InferenceEngine<B>,
    suppressor: Suppressor,
    num_classes: usize,
}

impl<B: InferenceBackend> Pipeline<B> {
    /// Fill `arena` with this frame's buffers; returns the scale ratios
    async fn detect<F: FrameSource + ?Sized>(
        &mut self,
        source: &mut F,
        arena: &mut TickArena,
    ) -> Result<(f32, f32), VisionError> {
        let frame = source.grab().ok_or(VisionError::NotReady)?;
        let prepared = self.preprocessor.prepare(frame)?;
        let ratios = (prepared.ratio_x(), prepared.ratio_y());

        let output = self.engine.run(&prepared)?;
        geometry::decode_into(output.view(), self.num_classes, &mut arena.raw)?;
        arena.prepared = Some(prepared);
        arena.output = Some(output);

        let raw = std::mem::take(&mut arena.raw);
        let (raw, kept) = self.suppressor.suppress_async(raw).await?;
        arena.raw = raw;
        arena.kept = kept;

        Ok(ratios)
    }
}

/// The per-frame detection state machine
pub struct FrameLoop<B: InferenceBackend> {
    config: Arc<DetectionConfig>,
    pipeline: Pipeline<B>,
    smoother: DetectionSmoother,
    renderer: OverlayRenderer,
    listener: Arc<dyn FrameListener>,
    arena: TickArena,
    stats: ScopeStats,
    handle: LoopHandle,
    state: LoopState,
    ticks: u64,
}

impl<B: InferenceBackend> FrameLoop<B> {
    /// Build a loop around a warmed-up engine.
    ///
    /// Fails with [`VisionError::Config`] if `config` does not validate.
    pub fn new(
        config: Arc<DetectionConfig>,
        engine: InferenceEngine<B>,
        listener: Arc<dyn FrameListener>,
    ) -> Result<Self, VisionError> {
        config.validate().map_err(VisionError::Config)?;

        let pipeline = Pipeline {
            preprocessor: FramePreprocessor::new(&config),
            engine,
            suppressor: Suppressor::new(&config),
            num_classes: config.num_classes(),
        };

        Ok(Self {
            smoother: DetectionSmoother::new(&config),
            renderer: OverlayRenderer::new(&config),
            config,
            pipeline,
            listener,
            arena: TickArena::default(),
            stats: ScopeStats::default(),
            handle: LoopHandle::default(),
            state: LoopState::Idle,
            ticks: 0,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn scope_stats(&self) -> ScopeStats {
        self.stats.clone()
    }

    pub fn smoother(&self) -> &DetectionSmoother {
        &self.smoother
    }

    pub fn engine(&self) -> &InferenceEngine<B> {
        &self.pipeline.engine
    }

    /// Run exactly one tick
    pub async fn tick<F, S>(&mut self, source: &mut F, surface: &mut S) -> Result<TickOutcome, VisionError>
    where
        F: FrameSource + ?Sized,
        S: Surface + ?Sized,
    {
        let (width, height) = source.dimensions();
        if !source.is_live() || width == 0 || height == 0 {
            return Ok(self.go_idle(surface));
        }

        if self.state == LoopState::Idle {
            info!("Frame source live at {}x{}, detecting", width, height);
            self.state = LoopState::Detecting;
        }

        self.ticks += 1;
        let tick = self.ticks;
        let mut scope = TickScope::open(&mut self.arena, &self.stats, tick);

        let (ratio_x, ratio_y) = match self.pipeline.detect(source, &mut scope).await {
            Ok(ratios) => ratios,
            Err(VisionError::NotReady) => {
                drop(scope);
                return Ok(self.go_idle(surface));
            }
            Err(e) if e.is_recoverable() => {
                warn!("Tick {} aborted: {}", tick, e);
                return Ok(TickOutcome::Aborted);
            }
            Err(e) => return Err(e),
        };

        debug!("Tick {}: {} detections kept", tick, scope.kept.len());

        if !scope.kept.is_empty() {
            let names: Vec<String> = scope
                .kept
                .iter()
                .map(|d| {
                    self.config
                        .label(d.class_id)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("class {}", d.class_id))
                })
                .collect();
            self.listener.on_frame_observations(&names);
        }

        if let Some(event) = self.smoother.observe(&scope.kept) {
            drop(scope);
            surface.clear();
            self.state = LoopState::Settling;
            info!("Settled on '{}', notifying listener", event.class_name);
            self.listener.on_settle(&event).await;
            self.state = LoopState::Detecting;
            return Ok(TickOutcome::Settled(event));
        }

        if let Err(e) = self
            .renderer
            .render_with_ratios(surface, &scope.kept, ratio_x, ratio_y)
        {
            warn!("Tick {} aborted while rendering: {}", tick, e);
            return Ok(TickOutcome::Aborted);
        }

        Ok(TickOutcome::Rendered {
            detections: scope.kept.clone(),
        })
    }

    fn go_idle<S: Surface + ?Sized>(&mut self, surface: &mut S) -> TickOutcome {
        if self.state != LoopState::Idle {
            info!("Frame source no longer live, idling");
            self.state = LoopState::Idle;
        }
        surface.clear();
        TickOutcome::Idle
    }

    /// Drive ticks at the configured frame rate until stopped or the source closes
    pub async fn run<F, S>(&mut self, source: &mut F, surface: &mut S) -> Result<RunSummary, VisionError>
    where
        F: FrameSource + ?Sized,
        S: Surface + ?Sized,
    {
        self.run_with(source, surface, |_, _| Ok(())).await
    }

    /// Like [`FrameLoop::run`], calling `after_tick` with every outcome and
    /// the surface as it was left by that tick
    pub async fn run_with<F, S, H>(
        &mut self,
        source: &mut F,
        surface: &mut S,
        mut after_tick: H,
    ) -> Result<RunSummary, VisionError>
    where
        F: FrameSource + ?Sized,
        S: Surface + ?Sized,
        H: FnMut(&TickOutcome, &S) -> Result<(), VisionError>,
    {
        let mut interval = tokio::time::interval(self.config.frame_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.handle.start();
        info!("Frame loop started at {} fps", self.config.frame_rate);

        let mut summary = RunSummary::default();
        while self.handle.is_running() && !source.is_closed() {
            interval.tick().await;
            let outcome = self.tick(source, surface).await?;
            summary.record(&outcome);
            after_tick(&outcome, surface)?;
        }

        self.handle.stop();
        info!(
            "Frame loop finished: {} ticks, {} rendered, {} settled, {} aborted",
            summary.ticks, summary.rendered, summary.settled, summary.aborted
        );
        Ok(summary)
    }
}
