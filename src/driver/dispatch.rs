//! Completion Dispatcher.
//!
//! The fast path runs from interrupt context: it reads the channel's status
//! and completed count, retires ring slots, resolves finished transfers and
//! wakes room waiters. Everything that needs more register reads or touches
//! statistics is queued as [`DeferredWork`] and handled by
//! [`Dispatcher::run_deferred`] from a normal execution context.

use alloc::collections::VecDeque;

#[cfg(feature = "log")]
use log::{trace, warn};

use super::channel::{AbortOutcome, AbortTarget, Channel};
use super::config::EngineConfig;
use super::error::TransferError;
use super::interrupt::EngineStatus;
use crate::hal::Hardware;
use crate::internal::constants::DEFERRED_QUEUE_DEPTH;
use crate::sync::CriticalSectionCell;

// =============================================================================
// Deferred Work
// =============================================================================

/// Work handed from interrupt context to the deferred context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredWork {
    /// Transfers resolved successfully by the fast path
    Retired {
        channel: usize,
        transfers: u32,
        bytes: u64,
    },
    /// Interrupts that retired nothing
    Spurious { channel: usize, count: u32 },
    /// Engine halted on the descriptor tagged `generation`
    EngineFault {
        channel: usize,
        generation: u32,
        status: u32,
    },
}

impl DeferredWork {
    /// Statistics-only work may be folded or dropped; faults may not
    const fn is_stats(&self) -> bool {
        !matches!(self, DeferredWork::EngineFault { .. })
    }

    /// Fold `other` into `self` if both count the same thing on one channel
    fn absorb(&mut self, other: &DeferredWork) -> bool {
        match (self, other) {
            (
                DeferredWork::Retired {
                    channel,
                    transfers,
                    bytes,
                },
                DeferredWork::Retired {
                    channel: other_channel,
                    transfers: more,
                    bytes: more_bytes,
                },
            ) if *channel == *other_channel => {
                *transfers = transfers.saturating_add(*more);
                *bytes = bytes.saturating_add(*more_bytes);
                true
            }
            (
                DeferredWork::Spurious { channel, count },
                DeferredWork::Spurious {
                    channel: other_channel,
                    count: more,
                },
            ) if *channel == *other_channel => {
                *count = count.saturating_add(*more);
                true
            }
            _ => false,
        }
    }
}

struct PendingWork {
    items: VecDeque<DeferredWork>,
    dropped: u32,
}

/// Bounded FIFO of deferred work, shared by every channel of a device
///
/// Pushing never allocates while the queue holds fewer than
/// [`DEFERRED_QUEUE_DEPTH`] items. Statistics are folded into one item per
/// channel and kind; when the queue is full, new statistics are dropped and
/// a fault evicts the oldest statistics item. Faults are never dropped.
pub(crate) struct DeferredQueue {
    queue: CriticalSectionCell<PendingWork>,
}

impl DeferredQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: CriticalSectionCell::new(PendingWork {
                items: VecDeque::with_capacity(DEFERRED_QUEUE_DEPTH),
                dropped: 0,
            }),
        }
    }

    pub(crate) fn push(&self, work: DeferredWork) {
        self.queue.with(|pending| {
            if work.is_stats() && pending.items.iter_mut().any(|item| item.absorb(&work)) {
                return;
            }
            if pending.items.len() >= DEFERRED_QUEUE_DEPTH {
                if work.is_stats() {
                    pending.dropped = pending.dropped.saturating_add(1);
                    return;
                }
                let victim = pending.items.iter().position(DeferredWork::is_stats);
                if victim.and_then(|i| pending.items.remove(i)).is_some() {
                    pending.dropped = pending.dropped.saturating_add(1);
                }
            }
            pending.items.push_back(work);
        });
    }

    /// Take the oldest item
    pub(crate) fn pop(&self) -> Option<DeferredWork> {
        self.queue.with(|pending| pending.items.pop_front())
    }

    /// Number of statistics items lost to a full queue since the last call
    pub(crate) fn take_dropped(&self) -> u32 {
        self.queue.with(|pending| core::mem::take(&mut pending.dropped))
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.with_ref(|pending| pending.items.len())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Fast-path interrupt servicing plus the deferred work queue
pub(crate) struct Dispatcher {
    deferred: DeferredQueue,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            deferred: DeferredQueue::new(),
        }
    }

    pub(crate) fn pending_work(&self) -> usize {
        self.deferred.len()
    }

    /// Service one channel from interrupt context
    ///
    /// Never blocks and never pins or unpins. `from_irq` is cleared when a
    /// polling waiter drives the fast path, so empty polls are not counted as
    /// spurious interrupts. Returns true when the channel had something to report.
    pub(crate) fn service<H: Hardware + ?Sized>(
        &self,
        channel: &Channel,
        hw: &H,
        from_irq: bool,
    ) -> bool {
        let regs = channel.regs(hw);

        let serviced = channel.inner.with(|inner| {
            inner.ring.as_ref()?;

            let raw = regs.status();
            let status = EngineStatus::from_raw(raw);
            if status.any() {
                regs.ack_status(raw);
            }

            let count = regs.completed_count();
            let retired = channel.retire_completed(inner, count);

            let fault = if status.has_error() {
                inner
                    .ring
                    .as_ref()
                    .map(|ring| ring.generation_at(ring.consumer()))
            } else {
                None
            };
            Some((status, retired, fault))
        });

        let Some((status, retired, fault)) = serviced else {
            return false;
        };
        let index = channel.index();

        if retired.slots > 0 {
            channel.room.wake_all();
        }
        if retired.transfers > 0 {
            #[cfg(feature = "log")]
            trace!(
                "channel {}: retired {} slots, {} transfers",
                index, retired.slots, retired.transfers
            );
            self.deferred.push(DeferredWork::Retired {
                channel: index,
                transfers: retired.transfers,
                bytes: retired.bytes,
            });
        }
        if let Some(generation) = fault {
            self.deferred.push(DeferredWork::EngineFault {
                channel: index,
                generation,
                status: status.to_raw(),
            });
        } else if retired.slots == 0 && from_irq {
            self.deferred.push(DeferredWork::Spurious {
                channel: index,
                count: 1,
            });
        }

        status.any() || retired.slots > 0
    }

    /// Drain the deferred queue
    ///
    /// Engine faults are decoded from the error registers and the failing
    /// transfer is aborted with `EngineError`; the engine is restarted for the
    /// transfers behind it. A fault whose generation no longer matches an
    /// in-flight transfer is stale and only restarts the engine.
    pub(crate) fn run_deferred<H: Hardware + ?Sized>(
        &self,
        hw: &H,
        channels: &[Channel],
        config: &EngineConfig,
        registers_live: bool,
    ) -> usize {
        let interrupts = config.completion_mode == super::config::CompletionMode::Interrupt;

        #[cfg(feature = "log")]
        {
            let dropped = self.deferred.take_dropped();
            if dropped > 0 {
                warn!("deferred queue full: {} statistics updates lost", dropped);
            }
        }
        #[cfg(not(feature = "log"))]
        let _ = self.deferred.take_dropped();

        // Work queued while this runs waits for the next call.
        let budget = self.deferred.len();
        let mut handled = 0;
        while handled < budget {
            let Some(item) = self.deferred.pop() else {
                break;
            };
            handled += 1;
            match item {
                DeferredWork::Retired {
                    channel,
                    transfers,
                    bytes,
                } => {
                    if let Some(channel) = channels.get(channel) {
                        channel.record(|stats| {
                            stats.transfers += u64::from(transfers);
                            stats.bytes += bytes;
                        });
                    }
                }
                DeferredWork::Spurious { channel, count } => {
                    if let Some(channel) = channels.get(channel) {
                        channel.record(|stats| {
                            stats.spurious_interrupts =
                                stats.spurious_interrupts.saturating_add(count);
                        });
                    }
                }
                DeferredWork::EngineFault {
                    channel,
                    generation,
                    status,
                } => {
                    let Some(channel) = channels.get(channel) else {
                        continue;
                    };
                    if !registers_live {
                        continue;
                    }
                    let regs = channel.regs(hw);
                    let kind = EngineStatus::from_raw(status).decode_error(regs.error_detail());

                    #[cfg(feature = "log")]
                    warn!(
                        "channel {}: engine error {} at descriptor {:#x}",
                        channel.index(),
                        kind,
                        regs.error_address()
                    );

                    match channel.abort(
                        hw,
                        AbortTarget::Generation(generation),
                        TransferError::EngineError(kind),
                        config.flush_poll_attempts,
                        interrupts,
                    ) {
                        AbortOutcome::Aborted => channel.record(|stats| stats.engine_errors += 1),
                        AbortOutcome::NotFound => channel.resume(hw, interrupts),
                        AbortOutcome::EngineStuck => {}
                    }
                }
            }
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(channel: usize) -> DeferredWork {
        DeferredWork::EngineFault {
            channel,
            generation: 4,
            status: 0,
        }
    }

    fn drain(queue: &DeferredQueue) -> alloc::vec::Vec<DeferredWork> {
        core::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn statistics_fold_per_channel() {
        let queue = DeferredQueue::new();
        queue.push(DeferredWork::Retired { channel: 0, transfers: 1, bytes: 10 });
        queue.push(DeferredWork::Retired { channel: 0, transfers: 2, bytes: 5 });
        assert_eq!(queue.len(), 1);

        queue.push(DeferredWork::Retired { channel: 1, transfers: 1, bytes: 1 });
        queue.push(DeferredWork::Spurious { channel: 0, count: 1 });
        queue.push(DeferredWork::Retired { channel: 0, transfers: 1, bytes: 1 });
        queue.push(DeferredWork::Spurious { channel: 0, count: 1 });
        assert_eq!(queue.len(), 3);

        let work = drain(&queue);
        assert_eq!(work[0], DeferredWork::Retired { channel: 0, transfers: 4, bytes: 16 });
        assert_eq!(work[2], DeferredWork::Spurious { channel: 0, count: 2 });
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn faults_never_merge() {
        let queue = DeferredQueue::new();
        queue.push(fault(0));
        queue.push(fault(0));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn full_queue_drops_statistics_but_keeps_faults() {
        let queue = DeferredQueue::new();
        for channel in 0..DEFERRED_QUEUE_DEPTH {
            queue.push(fault(channel));
        }
        queue.push(DeferredWork::Retired { channel: 500, transfers: 1, bytes: 8 });
        assert_eq!(queue.len(), DEFERRED_QUEUE_DEPTH);
        assert_eq!(queue.take_dropped(), 1);
        assert_eq!(queue.take_dropped(), 0);

        queue.push(fault(500));
        assert_eq!(queue.len(), DEFERRED_QUEUE_DEPTH + 1);
        assert!(drain(&queue).iter().all(|item| !item.is_stats()));
    }

    #[test]
    fn fault_evicts_oldest_statistics_when_full() {
        let queue = DeferredQueue::new();
        queue.push(DeferredWork::Spurious { channel: 900, count: 3 });
        for channel in 1..DEFERRED_QUEUE_DEPTH {
            queue.push(fault(channel));
        }
        assert_eq!(queue.len(), DEFERRED_QUEUE_DEPTH);

        queue.push(fault(0));
        assert_eq!(queue.len(), DEFERRED_QUEUE_DEPTH);
        assert_eq!(queue.take_dropped(), 1);

        let work = drain(&queue);
        assert!(work.iter().all(|item| !item.is_stats()));
        assert_eq!(work.last(), Some(&fault(0)));
    }
}
