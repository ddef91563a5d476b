//! Transfer handles and completion signalling.
//!
//! A [`TransferHandle`] is returned for every accepted submission. It owns the
//! transfer's [`PinnedRegion`] so the pages are released exactly once: when
//! the caller collects the result, cancels, or drops the handle.

use core::sync::atomic::{AtomicBool, Ordering};
use core::task::Waker;

use embedded_hal::delay::DelayNs;

#[cfg(feature = "log")]
use log::warn;

use super::device::DmaDevice;
use super::error::{TransferError, TransferResult};
use super::mapper::PinnedRegion;
use crate::hal::{Hardware, UserMemory};
use crate::sync::{AtomicWaker, CriticalSectionCell};

/// Device-unique transfer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferId(pub u32);

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Completion Signal
// =============================================================================

/// One-shot completion record shared by a handle and the dispatcher
pub(crate) struct Completion {
    result: CriticalSectionCell<Option<TransferResult<usize>>>,
    done: AtomicBool,
    waker: AtomicWaker,
}

impl Completion {
    pub(crate) const fn new() -> Self {
        Self {
            result: CriticalSectionCell::new(None),
            done: AtomicBool::new(false),
            waker: AtomicWaker::new(),
        }
    }

    /// Record the result and wake the waiter
    ///
    /// Returns false if a result was already recorded; the first one wins.
    pub(crate) fn complete(&self, result: TransferResult<usize>) -> bool {
        let recorded = self.result.with(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            self.done.store(true, Ordering::Release);
            true
        });
        if recorded {
            self.waker.wake();
        }
        recorded
    }

    #[inline]
    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub(crate) fn result(&self) -> Option<TransferResult<usize>> {
        self.result.with_ref(|slot| *slot)
    }

    pub(crate) fn register(&self, waker: &Waker) {
        self.waker.register(waker);
    }
}

impl core::fmt::Debug for Completion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Transfer Handle
// =============================================================================

/// Pollable handle to one in-flight transfer
///
/// Dropping a handle whose transfer has not completed cancels it.
pub struct TransferHandle<'d, H: Hardware, M: UserMemory> {
    device: &'d DmaDevice<H, M>,
    channel: usize,
    id: TransferId,
    completion: alloc::sync::Arc<Completion>,
    region: Option<PinnedRegion>,
}

impl<'d, H: Hardware, M: UserMemory> TransferHandle<'d, H, M> {
    pub(crate) fn new(
        device: &'d DmaDevice<H, M>,
        channel: usize,
        id: TransferId,
        completion: alloc::sync::Arc<Completion>,
        region: PinnedRegion,
    ) -> Self {
        Self {
            device,
            channel,
            id,
            completion,
            region: Some(region),
        }
    }

    /// Transfer identifier
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Channel the transfer was submitted on
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Bytes requested
    pub fn len(&self) -> usize {
        self.region.as_ref().map_or(0, PinnedRegion::len)
    }

    /// Check whether the region has already been handed back
    pub fn is_empty(&self) -> bool {
        self.region.is_none()
    }

    /// Check whether a result has been recorded
    pub fn is_complete(&self) -> bool {
        self.completion.is_done()
    }

    /// Non-blocking check for the result
    ///
    /// Returns `None` while the transfer is in flight. Once a result is
    /// available the pinned pages are released before it is returned.
    pub fn poll_result(&mut self) -> Option<TransferResult<usize>> {
        self.device.pump(self.channel);
        if self.completion.is_done() {
            Some(self.finish())
        } else {
            None
        }
    }

    /// Block until the transfer resolves or the configured timeout expires
    ///
    /// On timeout the transfer is cancelled and `Timeout` is returned, unless
    /// the hardware finished it while the cancellation was in progress.
    pub fn wait<D: DelayNs>(mut self, delay: &mut D) -> TransferResult<usize> {
        let config = self.device.engine_config();
        let max_polls = config.timeout_polls();
        let mut polls = 0u64;

        loop {
            self.device.pump(self.channel);
            if self.completion.is_done() {
                return self.finish();
            }
            if polls >= max_polls {
                #[cfg(feature = "log")]
                warn!("transfer {} on channel {} timed out", self.id, self.channel);
                self.device.abort_transfer(self.channel, self.id, TransferError::Timeout);
                return self.finish();
            }
            delay.delay_us(config.poll_interval_us);
            polls += 1;
        }
    }

    /// Abandon the transfer
    ///
    /// Returns `Timeout` if the transfer was still in flight, otherwise the
    /// result the hardware already produced.
    pub fn cancel(mut self) -> TransferResult<usize> {
        self.device.abort_transfer(self.channel, self.id, TransferError::Timeout);
        self.finish()
    }

    /// Release the region (once) and return the recorded result
    fn finish(&mut self) -> TransferResult<usize> {
        if let Some(mut region) = self.region.take() {
            self.device.release_region(self.channel, &mut region);
        }
        self.completion.result().unwrap_or(Err(TransferError::Fatal))
    }
}

impl<H: Hardware, M: UserMemory> Drop for TransferHandle<'_, H, M> {
    fn drop(&mut self) {
        if self.region.is_none() {
            return;
        }
        if !self.completion.is_done() {
            self.device.abort_transfer(self.channel, self.id, TransferError::Timeout);
        }
        let _ = self.finish();
    }
}

impl<H: Hardware, M: UserMemory> core::fmt::Debug for TransferHandle<'_, H, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransferHandle")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("complete", &self.completion.is_done())
            .finish()
    }
}

#[cfg(feature = "async")]
impl<H: Hardware, M: UserMemory> core::future::Future for TransferHandle<'_, H, M> {
    type Output = TransferResult<usize>;

    fn poll(
        self: core::pin::Pin<&mut Self>,
        cx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<Self::Output> {
        let this = self.get_mut();
        this.device.pump(this.channel);
        this.completion.register(cx.waker());
        if this.completion.is_done() {
            core::task::Poll::Ready(this.finish())
        } else {
            core::task::Poll::Pending
        }
    }
}
