//! Channel: one engine, one ring, one in-flight FIFO.
//!
//! All ring mutation and every state transition happens inside the channel's
//! critical section. Pinning and unpinning never do.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

#[cfg(feature = "log")]
use log::{debug, trace, warn};

use super::config::{ChannelConfig, ChannelState, Direction};
use super::error::{TransferError, TransferResult};
use super::transfer::{Completion, TransferId};
use crate::hal::Hardware;
use crate::internal::dma::descriptor::Descriptor;
use crate::internal::dma::{DescriptorRing, Segment, SlotRange, TransferEngine};
use crate::internal::register::engine::{EngineRegs, status};
use crate::sync::{CriticalSectionCell, WaiterList};

/// Per-channel counters maintained by deferred work and the cancel path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStats {
    /// Transfers completed successfully
    pub transfers: u64,
    /// Bytes moved by successful transfers
    pub bytes: u64,
    /// Transfers failed by the engine
    pub engine_errors: u32,
    /// Transfers cancelled or timed out
    pub timeouts: u32,
    /// Interrupts that retired nothing
    pub spurious_interrupts: u32,
}

/// One accepted transfer waiting for the hardware
pub(crate) struct InFlight {
    pub(crate) id: TransferId,
    pub(crate) range: SlotRange,
    pub(crate) bytes: usize,
    pub(crate) completion: Arc<Completion>,
}

/// How an in-flight transfer is located for abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AbortTarget {
    /// By the caller-visible identifier
    Id(TransferId),
    /// By the generation tag of its ring slots
    Generation(u32),
}

impl AbortTarget {
    fn matches(self, transfer: &InFlight) -> bool {
        match self {
            AbortTarget::Id(id) => transfer.id == id,
            AbortTarget::Generation(generation) => transfer.range.generation == generation,
        }
    }
}

/// Result of an abort request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AbortOutcome {
    /// Transfer removed and resolved with the requested error
    Aborted,
    /// Transfer was already resolved; nothing changed
    NotFound,
    /// Engine would not stop; the channel was failed instead
    EngineStuck,
}

/// State guarded by the submission lock
pub(crate) struct ChannelInner {
    pub(crate) state: ChannelState,
    pub(crate) ring: Option<DescriptorRing>,
    pub(crate) pending: VecDeque<InFlight>,
    /// Accepted transfers whose pinned region has not been released
    pub(crate) regions: usize,
    /// Engine kept fetching after a stop request
    pub(crate) stuck: bool,
    /// Descriptors of a stuck engine, kept alive after the channel stopped
    pub(crate) abandoned: Option<&'static [Descriptor]>,
}

/// Completions collected by one retirement pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Retired {
    pub(crate) slots: u32,
    pub(crate) transfers: u32,
    pub(crate) bytes: u64,
}

pub(crate) struct Channel {
    index: usize,
    config: ChannelConfig,
    pub(crate) inner: CriticalSectionCell<ChannelInner>,
    pub(crate) room: WaiterList,
    pub(crate) stats: CriticalSectionCell<ChannelStats>,
}

impl Channel {
    pub(crate) fn new(index: usize, config: ChannelConfig, ring: DescriptorRing) -> Self {
        Self {
            index,
            config,
            inner: CriticalSectionCell::new(ChannelInner {
                state: ChannelState::Idle,
                ring: Some(ring),
                pending: VecDeque::new(),
                regions: 0,
                stuck: false,
                abandoned: None,
            }),
            room: WaiterList::new(),
            stats: CriticalSectionCell::new(ChannelStats::default()),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub(crate) fn direction(&self) -> Direction {
        self.config.direction
    }

    pub(crate) fn regs<'h, H: Hardware + ?Sized>(&self, hw: &'h H) -> EngineRegs<'h, H> {
        EngineRegs::new(hw, self.config.register_base)
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.inner.with_ref(|inner| inner.state)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.inner.with_ref(|inner| inner.pending.len())
    }

    pub(crate) fn stats(&self) -> ChannelStats {
        self.stats.with_ref(|stats| *stats)
    }

    /// Usable ring slots, zero once stopped
    pub(crate) fn ring_capacity(&self) -> usize {
        self.inner
            .with_ref(|inner| inner.ring.as_ref().map_or(0, DescriptorRing::capacity))
    }

    /// Check whether a submission of `needed` descriptors would be accepted now
    pub(crate) fn has_room(&self, needed: usize, max_outstanding: usize) -> TransferResult<bool> {
        self.inner.with_ref(|inner| {
            if !inner.state.accepts_submissions() {
                return Err(TransferError::Fatal);
            }
            let free = inner.ring.as_ref().map_or(0, DescriptorRing::free);
            Ok(inner.pending.len() < max_outstanding && needed <= free)
        })
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Reserve, fill and ring a planned transfer
    ///
    /// Non-blocking: returns `Busy` when the ring or the outstanding limit is
    /// exhausted and `Fatal` once teardown has started.
    pub(crate) fn submit<H: Hardware + ?Sized>(
        &self,
        hw: &H,
        engine: &TransferEngine,
        max_outstanding: usize,
        segments: &[Segment],
        id: TransferId,
    ) -> TransferResult<Arc<Completion>> {
        let bytes = segments.iter().map(|s| s.len as usize).sum();
        let completion = Arc::new(Completion::new());
        let regs = self.regs(hw);

        self.inner.with(|inner| {
            if !inner.state.accepts_submissions() {
                return Err(TransferError::Fatal);
            }
            if inner.pending.len() >= max_outstanding {
                return Err(TransferError::Busy);
            }
            let Some(ring) = inner.ring.as_mut() else {
                return Err(TransferError::Fatal);
            };

            let range = engine.submit(ring, &regs, segments)?;
            inner.pending.push_back(InFlight {
                id,
                range,
                bytes,
                completion: completion.clone(),
            });
            inner.regions += 1;
            if inner.state == ChannelState::Idle {
                transition(self.index, inner, ChannelState::Active);
            }
            Ok(())
        })?;

        Ok(completion)
    }

    // =========================================================================
    // Retirement
    // =========================================================================

    /// Retire up to the hardware count and resolve every fully retired transfer
    ///
    /// Caller holds the submission lock.
    pub(crate) fn retire_completed(&self, inner: &mut ChannelInner, hw_count: u32) -> Retired {
        let mut retired = Retired::default();
        let Some(ring) = inner.ring.as_mut() else {
            return retired;
        };

        match ring.retire(hw_count) {
            Some(slots) => retired.slots = slots,
            None => {
                #[cfg(feature = "log")]
                warn!(
                    "channel {}: completed count {} outside window {}..{}",
                    self.index,
                    hw_count,
                    ring.consumer(),
                    ring.producer()
                );
                return retired;
            }
        }

        while let Some(front) = inner.pending.front() {
            if !ring.is_retired(&front.range) {
                break;
            }
            if let Some(done) = inner.pending.pop_front() {
                #[cfg(feature = "log")]
                trace!("channel {}: transfer {} retired", self.index, done.id);
                done.completion.complete(Ok(done.bytes));
                retired.transfers += 1;
                retired.bytes += done.bytes as u64;
            }
        }

        if inner.pending.is_empty() && inner.state == ChannelState::Active {
            transition(self.index, inner, ChannelState::Idle);
        }
        retired
    }

    // =========================================================================
    // Abort / Drain
    // =========================================================================

    /// Stop the engine, pull one transfer out of the ring and resolve it with `error`
    ///
    /// Completions that land before the engine stops are honoured, so a
    /// transfer that finished in the meantime keeps its real result.
    pub(crate) fn abort<H: Hardware + ?Sized>(
        &self,
        hw: &H,
        target: AbortTarget,
        error: TransferError,
        flush_attempts: u32,
        interrupts: bool,
    ) -> AbortOutcome {
        let regs = self.regs(hw);

        let outcome = self.inner.with(|inner| {
            if !inner.pending.iter().any(|t| target.matches(t)) {
                return AbortOutcome::NotFound;
            }

            regs.stop();
            if !wait_idle(&regs, flush_attempts) {
                #[cfg(feature = "log")]
                warn!("channel {}: engine did not stop, failing channel", self.index);
                inner.stuck = true;
                self.fail_locked(inner, Some(&regs));
                return AbortOutcome::EngineStuck;
            }

            let count = regs.completed_count();
            self.retire_completed(inner, count);

            let outcome = match inner.pending.iter().position(|t| target.matches(t)) {
                Some(pos) => {
                    if let Some(victim) = inner.pending.remove(pos) {
                        if let Some(ring) = inner.ring.as_mut() {
                            ring.neuter(&victim.range);
                        }
                        #[cfg(feature = "log")]
                        debug!(
                            "channel {}: transfer {} aborted ({})",
                            self.index, victim.id, error
                        );
                        victim.completion.complete(Err(error));
                    }
                    if inner.pending.is_empty() && inner.state == ChannelState::Active {
                        transition(self.index, inner, ChannelState::Idle);
                    }
                    AbortOutcome::Aborted
                }
                None => AbortOutcome::NotFound,
            };

            regs.ack_status(status::W1C_MASK);
            if inner.state != ChannelState::Stopped {
                regs.start(interrupts);
            }
            outcome
        });

        if outcome != AbortOutcome::NotFound {
            self.room.wake_all();
        }
        outcome
    }

    /// Clear latched status and restart a halted engine
    pub(crate) fn resume<H: Hardware + ?Sized>(&self, hw: &H, interrupts: bool) {
        let regs = self.regs(hw);
        self.inner.with(|inner| {
            if inner.state == ChannelState::Stopped || inner.ring.is_none() {
                return;
            }
            regs.ack_status(status::W1C_MASK);
            regs.start(interrupts);
        });
    }

    /// Enter `Draining` without touching in-flight transfers
    pub(crate) fn begin_drain(&self) -> ChannelState {
        self.inner.with(|inner| {
            if inner.state != ChannelState::Stopped {
                transition(self.index, inner, ChannelState::Draining);
            }
            inner.state
        })
    }

    /// Resolve every in-flight transfer with `Fatal` and drain the channel
    ///
    /// `regs` is `None` when the device is gone and registers must not be touched.
    pub(crate) fn fail<H: Hardware + ?Sized>(
        &self,
        regs: Option<&EngineRegs<'_, H>>,
        flush_attempts: u32,
    ) {
        self.inner.with(|inner| {
            if inner.state == ChannelState::Stopped {
                return;
            }
            if let Some(regs) = regs {
                regs.stop();
                if !wait_idle(regs, flush_attempts) {
                    inner.stuck = true;
                }
            }
            self.fail_locked(inner, regs);
        });
        self.room.wake_all();
    }

    fn fail_locked<H: Hardware + ?Sized>(
        &self,
        inner: &mut ChannelInner,
        regs: Option<&EngineRegs<'_, H>>,
    ) {
        if inner.state != ChannelState::Draining {
            transition(self.index, inner, ChannelState::Draining);
        }

        let resolved = inner.pending.len();
        while let Some(victim) = inner.pending.pop_front() {
            if let Some(ring) = inner.ring.as_mut() {
                ring.neuter(&victim.range);
            }
            victim.completion.complete(Err(TransferError::Fatal));
        }
        if resolved > 0 {
            #[cfg(feature = "log")]
            warn!("channel {}: {} transfers failed by forced drain", self.index, resolved);
        }
        self.try_stop_locked(inner, regs);
    }

    /// Give back one accepted transfer's region
    pub(crate) fn release_region<H: Hardware + ?Sized>(&self, regs: Option<&EngineRegs<'_, H>>) {
        self.inner.with(|inner| {
            inner.regions = inner.regions.saturating_sub(1);
            self.try_stop_locked(inner, regs);
        });
    }

    /// `Draining -> Stopped` once nothing is in flight and every region is back
    pub(crate) fn try_stop_locked<H: Hardware + ?Sized>(
        &self,
        inner: &mut ChannelInner,
        regs: Option<&EngineRegs<'_, H>>,
    ) {
        if inner.state != ChannelState::Draining || !inner.pending.is_empty() || inner.regions != 0 {
            return;
        }
        if let Some(regs) = regs {
            regs.set_control(0);
        }
        if let Some(ring) = inner.ring.take()
            && inner.stuck
        {
            #[cfg(feature = "log")]
            warn!("channel {}: engine still busy, leaking its descriptor ring", self.index);
            inner.abandoned = Some(ring.abandon());
        }
        transition(self.index, inner, ChannelState::Stopped);
    }

    pub(crate) fn record<F: FnOnce(&mut ChannelStats)>(&self, f: F) {
        self.stats.with(f);
    }
}

/// Poll the busy bit until it clears or the budget runs out
fn wait_idle<H: Hardware + ?Sized>(regs: &EngineRegs<'_, H>, attempts: u32) -> bool {
    for _ in 0..=attempts {
        if !regs.is_busy() {
            return true;
        }
    }
    false
}

fn transition(index: usize, inner: &mut ChannelInner, next: ChannelState) {
    if !inner.state.can_transition_to(next) {
        #[cfg(feature = "log")]
        warn!(
            "channel {}: ignoring transition {} -> {}",
            index,
            inner.state.as_str(),
            next.as_str()
        );
        return;
    }
    if inner.state != next {
        #[cfg(feature = "log")]
        debug!("channel {}: {} -> {}", index, inner.state.as_str(), next.as_str());
    }
    inner.state = next;
    #[cfg(not(feature = "log"))]
    let _ = index;
}
