//! Per-tick buffer ownership

use crate::preprocess::PreparedInput;
use crate::processing::geometry::RawDetections;
use crate::processing::Detection;
use ndarray::ArrayD;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Buffers produced while processing one frame.
///
/// Only ever accessed through a [`TickScope`], which empties it on drop.
#[derive(Debug, Default)]
pub struct TickArena {
    pub prepared: Option<PreparedInput>,
    pub output: Option<ArrayD<f32>>,
    pub raw: RawDetections,
    pub kept: Vec<Detection>,
}

impl TickArena {
    /// Whether every buffer has been released
    pub fn is_empty(&self) -> bool {
        self.prepared.is_none() && self.output.is_none() && self.raw.is_empty() && self.kept.is_empty()
    }

    fn release(&mut self) {
        self.prepared = None;
        self.output = None;
        self.raw.clear();
        self.kept.clear();
    }
}

/// Shared opened/closed scope counters
#[derive(Debug, Clone, Default)]
pub struct ScopeStats {
    opened: Arc<AtomicU64>,
    closed: Arc<AtomicU64>,
}

impl ScopeStats {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    /// Scopes opened but not yet dropped
    pub fn outstanding(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }
}

/// Guard over the arena for the duration of one tick
pub struct TickScope<'a> {
    arena: &'a mut TickArena,
    stats: &'a ScopeStats,
    tick: u64,
}

impl<'a> TickScope<'a> {
    pub fn open(arena: &'a mut TickArena, stats: &'a ScopeStats, tick: u64) -> Self {
        stats.opened.fetch_add(1, Ordering::SeqCst);
        Self { arena, stats, tick }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}

impl Deref for TickScope<'_> {
    type Target = TickArena;

    fn deref(&self) -> &TickArena {
        self.arena
    }
}

impl DerefMut for TickScope<'_> {
    fn deref_mut(&mut self) -> &mut TickArena {
        self.arena
    }
}

impl Drop for TickScope<'_> {
    fn drop(&mut self) {
        self.arena.release();
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        trace!("Released buffers of tick {}", self.tick);
    }
}
