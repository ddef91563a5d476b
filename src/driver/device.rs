//! The DMA device context.
//!
//! [`DmaDevice`] is the single explicitly constructed object that owns the
//! channel table of one attached engine. Create it with [`DmaDevice::attach`]
//! when the PCIe function comes up and drop it (or call
//! [`DmaDevice::detach`]) when it goes away. Every other operation takes
//! `&self`, so the device can be shared between submitter threads, the
//! interrupt handler and the deferred-work context.
//!
//! # Example
//!
//! ```ignore
//! use pcie_dma_engine::{
//!     ChannelConfig, DeviceConfig, Direction, DmaDevice, EngineConfig, UserBuffer,
//! };
//!
//! let config = DeviceConfig::new(EngineConfig::new())
//!     .with_channel(ChannelConfig::new(Direction::H2C, 0x0000, 0))
//!     .with_channel(ChannelConfig::new(Direction::C2H, 0x1000, 1));
//! let device = DmaDevice::attach(bar, address_space, config)?;
//!
//! // Interrupt handler
//! device.handle_irq(vector);
//! // Deferred-work context
//! device.run_deferred();
//!
//! let written = device.submit_and_wait(0, Direction::H2C, buffer, 0, &mut delay)?;
//! ```

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;

#[cfg(feature = "log")]
use log::{debug, warn};

use super::channel::{AbortOutcome, AbortTarget, Channel, ChannelStats};
use super::config::{ChannelState, CompletionMode, DeviceConfig, Direction, EngineConfig};
use super::dispatch::Dispatcher;
use super::error::{
    ConfigError, ConfigResult, Error, FaultKind, Result, TransferError, TransferResult,
};
use super::mapper::{BufferMapper, PinnedRegion, UserBuffer};
use super::transfer::{TransferHandle, TransferId};
use crate::hal::{Hardware, UserMemory};
use crate::internal::constants::ENGINE_IDENTIFIER;
use crate::internal::dma::{DescriptorRing, Segment, TransferEngine};
use crate::internal::register::engine::{EngineRegs, status};

/// Attached DMA engine with its channels
pub struct DmaDevice<H: Hardware, M: UserMemory> {
    hw: H,
    mapper: BufferMapper<M>,
    config: EngineConfig,
    engine: TransferEngine,
    channels: Vec<Channel>,
    pub(crate) dispatcher: Dispatcher,
    vectors: Vec<u32>,
    next_id: AtomicU32,
    removed: AtomicBool,
    attached: bool,
}

impl<H: Hardware, M: UserMemory> DmaDevice<H, M> {
    // =========================================================================
    // Attach / Detach
    // =========================================================================

    /// Verify the engines, allocate and program every ring, and start the channels
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` / `AlreadyAttached` from configuration validation
    /// - `IdentifierMismatch` if a register block is not a DMA engine
    /// - `DirectionMismatch` if an engine's direction differs from its config
    /// - `IrqRegistration` if an interrupt vector cannot be registered
    pub fn attach(hw: H, memory: M, config: DeviceConfig) -> ConfigResult<Self> {
        config.validate()?;
        let engine_config = config.engine;

        for channel in &config.channels {
            let regs = EngineRegs::new(&hw, channel.register_base);
            if regs.subsystem_id() != ENGINE_IDENTIFIER {
                #[cfg(feature = "log")]
                warn!(
                    "no engine at {:#x} (identifier {:#010x})",
                    channel.register_base,
                    regs.identifier()
                );
                return Err(ConfigError::IdentifierMismatch);
            }
            if regs.is_c2h() != (channel.direction == Direction::C2H) {
                return Err(ConfigError::DirectionMismatch);
            }
        }

        let mut channels = Vec::with_capacity(config.channels.len());
        for (index, channel_config) in config.channels.iter().enumerate() {
            let depth = channel_config.effective_ring_depth(&engine_config);
            let ring = DescriptorRing::new(depth).ok_or(ConfigError::InvalidConfig)?;
            let bus = hw.dma_address(ring.as_ptr().cast::<u8>());
            ring.link(bus);

            let regs = EngineRegs::new(&hw, channel_config.register_base);
            regs.program_ring(bus, depth as u32, engine_config.irq_coalesce);
            regs.ack_status(status::W1C_MASK);

            #[cfg(feature = "log")]
            debug!(
                "channel {}: {} engine at {:#x}, ring {} slots at {:#x}",
                index,
                channel_config.direction.as_str(),
                channel_config.register_base,
                depth,
                bus
            );
            channels.push(Channel::new(index, *channel_config, ring));
        }

        let interrupts = engine_config.completion_mode == CompletionMode::Interrupt;
        let mut vectors: Vec<u32> = Vec::new();
        if interrupts {
            for channel in &config.channels {
                if vectors.contains(&channel.irq_vector) {
                    continue;
                }
                if let Err(err) = hw.register_irq(channel.irq_vector) {
                    #[cfg(feature = "log")]
                    warn!("irq vector {} registration failed", channel.irq_vector);
                    for vector in &vectors {
                        hw.unregister_irq(*vector);
                    }
                    return Err(err);
                }
                vectors.push(channel.irq_vector);
            }
        }

        for channel in &channels {
            channel.regs(&hw).start(interrupts);
        }

        #[cfg(feature = "log")]
        debug!(
            "attached {} channels ({} vectors, {:?} completion)",
            channels.len(),
            vectors.len(),
            engine_config.completion_mode
        );

        Ok(Self {
            mapper: BufferMapper::new(memory),
            engine: TransferEngine::new(&engine_config),
            config: engine_config,
            channels,
            dispatcher: Dispatcher::new(),
            vectors,
            next_id: AtomicU32::new(1),
            removed: AtomicBool::new(false),
            hw,
            attached: true,
        })
    }

    /// Stop every engine, fail what is still in flight and release the vectors
    ///
    /// Idempotent; also run on drop.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        let live = !self.is_removed();

        for channel in &self.channels {
            if live {
                let regs = channel.regs(&self.hw);
                channel.fail(Some(&regs), self.config.flush_poll_attempts);
                regs.set_control(0);
            } else {
                channel.fail::<H>(None, 0);
            }
        }
        for vector in self.vectors.drain(..) {
            self.hw.unregister_irq(vector);
        }

        #[cfg(feature = "log")]
        debug!("detached {} channels", self.channels.len());
    }

    /// Report surprise removal of the device
    ///
    /// Every in-flight transfer resolves with `Fatal` and every channel drains
    /// to `Stopped` without touching the registers again.
    pub fn device_removed(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        #[cfg(feature = "log")]
        warn!("device removed, failing {} channels", self.channels.len());
        for channel in &self.channels {
            channel.fail::<H>(None, 0);
        }
    }

    /// Drain one channel gracefully and stop it
    ///
    /// New submissions are refused immediately. In-flight transfers get until
    /// the configured timeout to finish, after which they are failed with `Fatal`.
    pub fn shutdown_channel<D: DelayNs>(&self, channel: usize, delay: &mut D) -> ConfigResult<()> {
        let ch = self.channel(channel)?;
        if ch.begin_drain() == ChannelState::Stopped {
            return Ok(());
        }

        let max_polls = self.config.timeout_polls();
        let mut polls = 0;
        while ch.pending_count() > 0 && polls < max_polls && !self.is_removed() {
            self.pump(channel);
            if ch.pending_count() == 0 {
                break;
            }
            delay.delay_us(self.config.poll_interval_us);
            polls += 1;
        }

        if self.is_removed() {
            ch.fail::<H>(None, 0);
        } else {
            let regs = ch.regs(&self.hw);
            ch.fail(Some(&regs), self.config.flush_poll_attempts);
        }
        Ok(())
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Pin `buffer` and queue it on `channel` without blocking
    ///
    /// `device_offset` is the card-side address the transfer starts at.
    ///
    /// # Errors
    ///
    /// - `Config(InvalidChannel | DirectionMismatch)` for a bad channel/direction
    /// - `Transfer(Fault)` / `Transfer(TooLarge)` before any hardware access
    /// - `Transfer(Busy)` when the ring or outstanding limit is exhausted
    /// - `Transfer(Fatal)` once the channel is draining or stopped
    pub fn submit(
        &self,
        channel: usize,
        direction: Direction,
        buffer: UserBuffer,
        device_offset: u64,
    ) -> Result<TransferHandle<'_, H, M>> {
        let ch = self.checked_channel(channel, direction)?;
        let (region, segments) = self.prepare(ch, buffer, device_offset)?;
        match self.enqueue(ch, region, &segments) {
            Ok(handle) => Ok(handle),
            Err((mut region, err)) => {
                self.mapper.unpin(&mut region, false);
                Err(err.into())
            }
        }
    }

    /// Submit and block until the transfer resolves
    ///
    /// A full ring is waited out (re-checked on every retirement) rather than
    /// reported; each phase is bounded by the configured timeout. A buffer
    /// that needs more descriptors than one submission may carry is moved as
    /// a series of sub-transfers at advancing device offsets. Returns the
    /// number of bytes moved.
    ///
    /// # Errors
    ///
    /// As for [`submit`](Self::submit), except `Busy` is waited out and
    /// `TooLarge` only remains when a single page run cannot fit a submission.
    /// When a later sub-transfer fails, earlier ones have already completed.
    pub fn submit_and_wait<D: DelayNs>(
        &self,
        channel: usize,
        direction: Direction,
        buffer: UserBuffer,
        device_offset: u64,
        delay: &mut D,
    ) -> Result<usize> {
        let ch = self.checked_channel(channel, direction)?;
        match self.prepare(ch, buffer, device_offset) {
            Ok((region, segments)) => self.run_blocking(ch, region, &segments, delay),
            Err(TransferError::TooLarge) => self.run_chunked(ch, buffer, device_offset, delay),
            Err(err) => Err(err.into()),
        }
    }

    /// Move `buffer` in page-aligned pieces that each fit one descriptor chain
    fn run_chunked<D: DelayNs>(
        &self,
        ch: &Channel,
        buffer: UserBuffer,
        device_offset: u64,
        delay: &mut D,
    ) -> Result<usize> {
        let page_size = self.mapper.memory().page_size();
        if !page_size.is_power_of_two() {
            return Err(TransferError::Fault(FaultKind::Misaligned).into());
        }
        let pages = self.engine.pages_per_chunk(page_size, ch.ring_capacity());
        if pages == 0 {
            return Err(TransferError::TooLarge.into());
        }
        let span = (pages * page_size) as u64;
        let page_mask = page_size as u64 - 1;

        #[cfg(feature = "log")]
        debug!(
            "channel {}: splitting {} bytes into {}-page sub-transfers",
            ch.index(),
            buffer.len,
            pages
        );

        let mut done = 0;
        let mut moved = 0;
        while done < buffer.len {
            let addr = buffer.addr + done as u64;
            let chunk_end = (addr & !page_mask) + span;
            let len = ((chunk_end - addr) as usize).min(buffer.len - done);
            let (region, segments) =
                self.prepare(ch, buffer.slice(done, len), device_offset + done as u64)?;
            moved += self.run_blocking(ch, region, &segments, delay)?;
            done += len;
        }
        Ok(moved)
    }

    /// Queue one prepared transfer, waiting for room, then wait for its result
    fn run_blocking<D: DelayNs>(
        &self,
        ch: &Channel,
        mut region: PinnedRegion,
        segments: &[Segment],
        delay: &mut D,
    ) -> Result<usize> {
        let max_polls = self.config.timeout_polls();
        let mut polls = 0u64;
        let handle = loop {
            let epoch = ch.room.epoch();
            match self.enqueue(ch, region, segments) {
                Ok(handle) => break handle,
                Err((returned, TransferError::Busy)) => region = returned,
                Err((mut returned, err)) => {
                    self.mapper.unpin(&mut returned, false);
                    return Err(err.into());
                }
            }

            if polls >= max_polls {
                #[cfg(feature = "log")]
                warn!("channel {}: no ring space before timeout", ch.index());
                self.mapper.unpin(&mut region, false);
                return Err(TransferError::Timeout.into());
            }
            self.pump(ch.index());
            if ch.room.epoch() == epoch {
                delay.delay_us(self.config.poll_interval_us);
            }
            polls += 1;
        };

        handle.wait(delay).map_err(Error::from)
    }

    /// Wait until `channel` can take a submission of `descriptors` descriptors
    #[cfg(feature = "async")]
    pub fn wait_for_room(&self, channel: usize, descriptors: usize) -> RoomFuture<'_, H, M> {
        RoomFuture {
            device: self,
            channel,
            descriptors,
        }
    }

    fn checked_channel(&self, channel: usize, direction: Direction) -> Result<&Channel> {
        let ch = self.channel(channel)?;
        if ch.direction() != direction {
            return Err(ConfigError::DirectionMismatch.into());
        }
        if self.is_removed() || !ch.state().accepts_submissions() {
            return Err(TransferError::Fatal.into());
        }
        Ok(ch)
    }

    /// Pin and plan; on failure nothing stays pinned
    fn prepare(
        &self,
        ch: &Channel,
        buffer: UserBuffer,
        device_offset: u64,
    ) -> TransferResult<(PinnedRegion, Vec<Segment>)> {
        let mut region = self.mapper.pin(buffer, ch.direction())?;
        let planned = self
            .engine
            .check_fits(region.sg_list(), ch.ring_capacity())
            .and_then(|_| self.engine.plan(region.sg_list(), device_offset, ch.direction()));

        match planned {
            Ok(segments) => Ok((region, segments)),
            Err(err) => {
                self.mapper.unpin(&mut region, false);
                Err(err)
            }
        }
    }

    /// Hand a pinned, planned transfer to the channel
    ///
    /// On rejection the region is handed back still pinned.
    fn enqueue(
        &self,
        ch: &Channel,
        region: PinnedRegion,
        segments: &[Segment],
    ) -> core::result::Result<TransferHandle<'_, H, M>, (PinnedRegion, TransferError)> {
        if self.is_removed() {
            return Err((region, TransferError::Fatal));
        }
        let id = TransferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match ch.submit(&self.hw, &self.engine, self.config.max_outstanding, segments, id) {
            Ok(completion) => Ok(TransferHandle::new(self, ch.index(), id, completion, region)),
            Err(err) => Err((region, err)),
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Interrupt handler entry point
    ///
    /// Services every channel routed to `vector`. Returns false when nothing
    /// on the vector had work (or the device is gone).
    pub fn handle_irq(&self, vector: u32) -> bool {
        if self.is_removed() {
            return false;
        }
        let mut handled = false;
        for channel in self
            .channels
            .iter()
            .filter(|ch| ch.config().irq_vector == vector)
        {
            handled |= self.dispatcher.service(channel, &self.hw, true);
        }
        handled
    }

    /// Deferred-work entry point; returns the number of items processed
    pub fn run_deferred(&self) -> usize {
        self.dispatcher
            .run_deferred(&self.hw, &self.channels, &self.config, !self.is_removed())
    }

    /// Run the dispatcher for one channel from the calling context
    ///
    /// This is how completions are observed in [`CompletionMode::Polled`].
    pub fn poll_completions(&self, channel: usize) -> ConfigResult<bool> {
        let ch = self.channel(channel)?;
        let serviced = !self.is_removed() && self.dispatcher.service(ch, &self.hw, false);
        self.run_deferred();
        Ok(serviced)
    }

    /// Progress hook used by every waiter
    pub(crate) fn pump(&self, channel: usize) {
        if self.config.completion_mode == CompletionMode::Polled
            && !self.is_removed()
            && let Some(ch) = self.channels.get(channel)
        {
            self.dispatcher.service(ch, &self.hw, false);
        }
        if self.dispatcher.pending_work() > 0 {
            self.run_deferred();
        }
    }

    pub(crate) fn abort_transfer(&self, channel: usize, id: TransferId, error: TransferError) {
        let Some(ch) = self.channels.get(channel) else {
            return;
        };
        if self.is_removed() {
            return;
        }
        let interrupts = self.config.completion_mode == CompletionMode::Interrupt;
        let outcome = ch.abort(
            &self.hw,
            AbortTarget::Id(id),
            error,
            self.config.flush_poll_attempts,
            interrupts,
        );
        if outcome == AbortOutcome::Aborted && error == TransferError::Timeout {
            ch.record(|stats| stats.timeouts += 1);
        }
    }

    /// Unpin a resolved transfer's pages; card-to-host pages are always dirtied
    pub(crate) fn release_region(&self, channel: usize, region: &mut PinnedRegion) {
        let dirty = region.direction().writes_host();
        if !self.mapper.unpin(region, dirty) {
            return;
        }
        if let Some(ch) = self.channels.get(channel) {
            if self.is_removed() {
                ch.release_region::<H>(None);
            } else {
                let regs = ch.regs(&self.hw);
                ch.release_region(Some(&regs));
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    fn channel(&self, channel: usize) -> ConfigResult<&Channel> {
        self.channels.get(channel).ok_or(ConfigError::InvalidChannel)
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Current state of a channel
    pub fn channel_state(&self, channel: usize) -> ConfigResult<ChannelState> {
        Ok(self.channel(channel)?.state())
    }

    /// Counters of a channel
    pub fn stats(&self, channel: usize) -> ConfigResult<ChannelStats> {
        Ok(self.channel(channel)?.stats())
    }

    /// Transfers accepted on a channel and not yet resolved
    pub fn in_flight(&self, channel: usize) -> ConfigResult<usize> {
        Ok(self.channel(channel)?.pending_count())
    }

    /// Device-wide limits
    pub fn engine_config(&self) -> EngineConfig {
        self.config
    }

    /// Register capability
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// User address space capability
    pub fn memory(&self) -> &M {
        self.mapper.memory()
    }
}

impl<H: Hardware, M: UserMemory> Drop for DmaDevice<H, M> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<H: Hardware, M: UserMemory> core::fmt::Debug for DmaDevice<H, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaDevice")
            .field("channels", &self.channels.len())
            .field("config", &self.config)
            .field("removed", &self.is_removed())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Async room waiting
// =============================================================================

/// Future returned by [`DmaDevice::wait_for_room`]
#[cfg(feature = "async")]
pub struct RoomFuture<'d, H: Hardware, M: UserMemory> {
    device: &'d DmaDevice<H, M>,
    channel: usize,
    descriptors: usize,
}

#[cfg(feature = "async")]
impl<H: Hardware, M: UserMemory> core::future::Future for RoomFuture<'_, H, M> {
    type Output = Result<()>;

    fn poll(
        self: core::pin::Pin<&mut Self>,
        cx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<Self::Output> {
        use core::task::Poll;

        let device = self.device;
        let ch = match device.channel(self.channel) {
            Ok(ch) => ch,
            Err(err) => return Poll::Ready(Err(Error::Config(err))),
        };

        device.pump(self.channel);
        ch.room.register(cx.waker());
        match ch.has_room(self.descriptors, device.config.max_outstanding) {
            Ok(true) => Poll::Ready(Ok(())),
            Ok(false) => {
                // Nothing raises interrupts in polled mode; keep the task scheduled.
                if device.config.completion_mode == CompletionMode::Polled {
                    cx.waker().wake_by_ref();
                }
                Poll::Pending
            }
            Err(err) => Poll::Ready(Err(Error::Transfer(err))),
        }
    }
}
