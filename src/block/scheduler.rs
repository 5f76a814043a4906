//! Dataflow scheduling: run every leaf once per pass, in dependency order.

use std::mem;

use tracing::{debug, trace};

use super::types::BlockId;
use super::Model;
use crate::error::{FlowError, Result};

/// How the scheduler finds an evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingMode {
    /// Re-scan all unprocessed leaves until a sweep makes no progress
    #[default]
    FixedPoint,
    /// Replay the order admitted by the previous pass, falling back to
    /// re-scanning whenever the replay leaves a block behind
    ReuseOrder,
}

/// Counters accumulated over the scheduler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Completed passes
    pub passes: u64,
    /// Sweeps over candidate blocks, summed over all passes
    pub sweeps: u64,
    /// Passes where a replayed order was not valid for the pass
    pub order_misses: u64,
}

/// Evaluates a [`Model`] until every leaf has run.
///
/// There is no precomputed topological order. Each sweep tries every
/// unprocessed leaf, running those whose dependencies are assigned, and
/// the pass ends at the first sweep that runs nothing. Leaves still
/// unprocessed at that point form a deadlock.
#[derive(Debug, Default)]
pub struct Scheduler {
    mode: SchedulingMode,
    stats: SchedulerStats,
    /// Model generation the cached leaf list and order belong to
    generation: Option<u64>,
    leaves: Vec<BlockId>,
    /// Admission order of the previous pass
    order: Vec<BlockId>,
    /// Admission order being recorded by the current pass
    next_order: Vec<BlockId>,
}

impl Scheduler {
    pub fn new(mode: SchedulingMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> SchedulingMode {
        self.mode
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Run one scheduling pass over `model` at time `t`.
    ///
    /// Signals are not cleared here; the caller primes inputs and state
    /// variables first.
    pub fn process(&mut self, model: &mut Model, t: f64) -> Result<()> {
        if self.generation != Some(model.generation()) {
            self.leaves.clear();
            self.leaves.extend_from_slice(model.leaves());
            self.order.clear();
            self.generation = Some(model.generation());
        }

        model.mark_unprocessed();
        self.next_order.clear();

        let sweeps = match self.mode {
            SchedulingMode::FixedPoint => {
                fixed_point(model, &self.leaves, t, &mut self.next_order)?
            }
            SchedulingMode::ReuseOrder if self.order.len() == self.leaves.len() => {
                sweep(model, &self.order, t, &mut self.next_order)?;
                if model.all_processed() {
                    1
                } else {
                    self.stats.order_misses += 1;
                    debug!(
                        t,
                        admitted = self.next_order.len(),
                        total = self.leaves.len(),
                        "cached evaluation order stale, re-scanning"
                    );
                    1 + fixed_point(model, &self.leaves, t, &mut self.next_order)?
                }
            }
            SchedulingMode::ReuseOrder => fixed_point(model, &self.leaves, t, &mut self.next_order)?,
        };

        self.stats.passes += 1;
        self.stats.sweeps += sweeps;
        trace!(t, sweeps, blocks = self.leaves.len(), "scheduling pass");

        if !model.all_processed() {
            return Err(FlowError::Deadlock(model.unprocessed_report(t)));
        }
        if self.mode == SchedulingMode::ReuseOrder {
            mem::swap(&mut self.order, &mut self.next_order);
        }
        Ok(())
    }
}

/// Sweep `candidates` until a sweep runs nothing. Returns the sweep count.
fn fixed_point(model: &mut Model, candidates: &[BlockId], t: f64, admitted: &mut Vec<BlockId>) -> Result<u64> {
    let mut sweeps = 0;
    loop {
        sweeps += 1;
        if !sweep(model, candidates, t, admitted)? {
            return Ok(sweeps);
        }
    }
}

/// Try every candidate once; returns whether any block ran.
fn sweep(model: &mut Model, candidates: &[BlockId], t: f64, admitted: &mut Vec<BlockId>) -> Result<bool> {
    let mut progress = false;
    for id in candidates {
        if model.try_process(*id, t)? {
            admitted.push(*id);
            progress = true;
        }
    }
    Ok(progress)
}
