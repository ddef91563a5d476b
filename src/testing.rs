//! Testing utilities and mock implementations
//!
//! This module provides a simulated DMA engine and a simulated user address
//! space so the transfer pipeline can be exercised on the host.
//!
//! Only available when running `cargo test`.

// Note: The #[cfg(test)] attribute is applied in lib.rs where this module is declared
#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

extern crate std;

use core::cell::RefCell;
use core::task::{RawWaker, RawWakerVTable, Waker};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::vec;
use std::vec::Vec;

use crate::buffer::AlignedBuffer;
use crate::driver::config::Direction;
use crate::driver::error::{ConfigError, ConfigResult, FaultKind};
use crate::driver::mapper::UserBuffer;
use crate::hal::{Hardware, PageFrame, UserMemory};
use crate::internal::constants::{ENGINE_IDENTIFIER, ENGINE_IDENTIFIER_SHIFT};
use crate::internal::dma::Descriptor;
use crate::internal::register::engine::*;

/// Page size of the simulated address space
pub const PAGE: usize = 4096;

// =============================================================================
// Mock Hardware
// =============================================================================

/// One simulated engine register block
#[derive(Debug, Default)]
struct MockEngine {
    base: usize,
    vector: u32,
    identifier: u32,
    control: u32,
    status: u32,
    completed: u32,
    doorbell: u32,
    desc_base: u64,
    fetch: u64,
    ring_size: u32,
    coalesce: u32,
    since_irq: u32,
    error_detail: u32,
    error_addr: u64,
    halted: bool,
    stuck_busy: bool,
    inject: Option<Injection>,
    descriptors_seen: u64,
}

#[derive(Debug, Clone, Copy)]
struct Injection {
    at: u32,
    status: u32,
    detail: u32,
}

impl MockEngine {
    fn running(&self) -> bool {
        self.control & control::RUN != 0 && !self.halted
    }

    fn has_work(&self) -> bool {
        self.running() && self.completed != self.doorbell
    }
}

#[derive(Debug, Default)]
struct MockState {
    engines: Vec<MockEngine>,
    device_memory: Vec<u8>,
    pending_irqs: Vec<u32>,
    registered_irqs: Vec<u32>,
    failing_vector: Option<u32>,
    manual: bool,
    removed: bool,
}

/// Simulated multi-channel DMA engine
///
/// Engines follow the descriptor chain through host memory and copy between
/// host buffers and a flat device memory. By default an engine runs to
/// completion synchronously whenever its doorbell or control register is
/// written; with [`MockHardware::set_auto_run`] disabled it only advances on
/// [`MockHardware::step`]. Interrupts are queued and delivered by the test.
///
/// # Example
///
/// ```ignore
/// let hw = MockHardware::new(64 * 1024);
/// hw.add_engine(0x0000, Direction::H2C, 0);
/// let device = DmaDevice::attach(&hw, &mem, config)?;
/// for vector in hw.take_irqs() {
///     device.handle_irq(vector);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockHardware {
    state: Mutex<MockState>,
}

impl MockHardware {
    /// Create a device with `device_memory` bytes of card memory
    pub fn new(device_memory: usize) -> Self {
        Self {
            state: Mutex::new(MockState {
                device_memory: vec![0; device_memory],
                ..MockState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Place an engine register block at `base`
    pub fn add_engine(&self, base: usize, direction: Direction, vector: u32) {
        let mut id = (ENGINE_IDENTIFIER << ENGINE_IDENTIFIER_SHIFT) | 0x06;
        if direction == Direction::C2H {
            id |= identifier::C2H;
        }
        self.lock().engines.push(MockEngine {
            base,
            vector,
            identifier: id,
            coalesce: 1,
            ..MockEngine::default()
        });
    }

    /// Override an engine's identifier register
    pub fn set_identifier(&self, base: usize, value: u32) {
        if let Some(engine) = self.lock().engines.iter_mut().find(|e| e.base == base) {
            engine.identifier = value;
        }
    }

    /// Run engines on every doorbell (default) or only on [`MockHardware::step`]
    pub fn set_auto_run(&self, auto_run: bool) {
        self.lock().manual = !auto_run;
    }

    /// Keep an engine's BUSY bit set even while stopped
    pub fn set_stuck_busy(&self, base: usize, stuck: bool) {
        if let Some(engine) = self.lock().engines.iter_mut().find(|e| e.base == base) {
            engine.stuck_busy = stuck;
        }
    }

    /// Fail the descriptor processed when the engine's completed count equals `at`
    pub fn inject_error(&self, base: usize, at: u32, status_bit: u32, detail: u32) {
        if let Some(engine) = self.lock().engines.iter_mut().find(|e| e.base == base) {
            engine.inject = Some(Injection {
                at,
                status: status_bit,
                detail,
            });
        }
    }

    /// Make `register_irq` fail for `vector`
    pub fn fail_irq_registration(&self, vector: u32) {
        self.lock().failing_vector = Some(vector);
    }

    /// Queue an interrupt on `vector` that no engine raised
    pub fn inject_irq(&self, vector: u32) {
        self.lock().pending_irqs.push(vector);
    }

    /// Take every queued interrupt
    pub fn take_irqs(&self) -> Vec<u32> {
        core::mem::take(&mut self.lock().pending_irqs)
    }

    /// Currently registered interrupt vectors
    pub fn registered_irqs(&self) -> Vec<u32> {
        self.lock().registered_irqs.clone()
    }

    /// Simulate surprise removal: reads float high, writes are dropped
    pub fn remove(&self) {
        self.lock().removed = true;
    }

    /// Raw stored register value at an absolute offset
    pub fn register(&self, offset: usize) -> u32 {
        let state = self.lock();
        state
            .engines
            .iter()
            .find(|e| (e.base..e.base + ENGINE_BLOCK_SIZE).contains(&offset))
            .map_or(0, |e| read_engine(e, offset - e.base))
    }

    /// Descriptors an engine has processed, skips included
    pub fn descriptors_seen(&self, base: usize) -> u64 {
        self.lock()
            .engines
            .iter()
            .find(|e| e.base == base)
            .map_or(0, |e| e.descriptors_seen)
    }

    /// Process up to `limit` descriptors on one engine regardless of auto-run
    pub fn step(&self, base: usize, limit: usize) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.engines.iter_mut().find(|e| e.base == base) {
            Some(engine) => run_engine(
                engine,
                &mut state.device_memory,
                &mut state.pending_irqs,
                limit,
            ),
            None => 0,
        }
    }

    /// Copy bytes out of card memory
    pub fn device_memory(&self, offset: usize, len: usize) -> Vec<u8> {
        self.lock().device_memory[offset..offset + len].to_vec()
    }

    /// Fill card memory
    pub fn fill_device_memory(&self, offset: usize, data: &[u8]) {
        self.lock().device_memory[offset..offset + data.len()].copy_from_slice(data);
    }
}

fn read_engine(engine: &MockEngine, reg: usize) -> u32 {
    match reg {
        IDENTIFIER_OFFSET => engine.identifier,
        CONTROL_OFFSET => engine.control,
        STATUS_OFFSET => {
            let busy = engine.stuck_busy || engine.has_work();
            engine.status | if busy { status::BUSY } else { 0 }
        }
        COMPLETED_COUNT_OFFSET => engine.completed,
        ERROR_DETAIL_OFFSET => engine.error_detail,
        ERROR_ADDR_LO_OFFSET => engine.error_addr as u32,
        ERROR_ADDR_HI_OFFSET => (engine.error_addr >> 32) as u32,
        DESC_BASE_LO_OFFSET => engine.desc_base as u32,
        DESC_BASE_HI_OFFSET => (engine.desc_base >> 32) as u32,
        RING_SIZE_OFFSET => engine.ring_size,
        DOORBELL_OFFSET => engine.doorbell,
        IRQ_COALESCE_OFFSET => engine.coalesce,
        _ => 0,
    }
}

/// Walk the chain until the engine catches up with the doorbell, halts, or `limit` runs out
fn run_engine(
    engine: &mut MockEngine,
    memory: &mut [u8],
    irqs: &mut Vec<u32>,
    limit: usize,
) -> usize {
    let mut processed = 0;
    while processed < limit && engine.has_work() {
        if let Some(fault) = engine.inject.filter(|f| f.at == engine.completed) {
            engine.inject = None;
            halt(engine, irqs, fault.status, fault.detail);
            break;
        }
        if engine.fetch == 0 {
            halt(engine, irqs, status::DESC_ERROR, error_detail::DESCRIPTOR_FETCH);
            break;
        }

        // SAFETY: the ring lives in host memory at its identity-mapped bus
        // address for as long as the channel owns it.
        let desc = unsafe { &*(engine.fetch as usize as *const Descriptor) };
        if !desc.has_magic() {
            halt(engine, irqs, status::MAGIC_STOPPED, error_detail::MAGIC);
            break;
        }

        let len = desc.len() as usize;
        if len > 0 {
            let copied = if engine.identifier & identifier::C2H != 0 {
                copy_to_host(memory, desc.src(), desc.dst(), len)
            } else {
                copy_to_card(memory, desc.src(), desc.dst(), len)
            };
            if let Err((bit, detail)) = copied {
                halt(engine, irqs, bit, detail);
                break;
            }
        }

        engine.completed = engine.completed.wrapping_add(1);
        engine.descriptors_seen += 1;
        processed += 1;

        if desc.is_last() {
            engine.status |= status::DESC_STOPPED;
        }
        if desc.signals_completion() {
            engine.status |= status::DESC_COMPLETED;
            engine.since_irq += 1;
            if engine.since_irq >= engine.coalesce.max(1) {
                raise(engine, irqs, control::IE_DESC_COMPLETED);
            }
        }
        engine.fetch = desc.next();
    }

    if !engine.has_work() && engine.since_irq > 0 && !engine.halted {
        raise(engine, irqs, control::IE_DESC_COMPLETED);
    }
    processed
}

fn raise(engine: &mut MockEngine, irqs: &mut Vec<u32>, enable: u32) {
    engine.since_irq = 0;
    // Message-signalled: a vector already pending is not queued twice.
    if engine.control & enable != 0 && !irqs.contains(&engine.vector) {
        irqs.push(engine.vector);
    }
}

fn halt(engine: &mut MockEngine, irqs: &mut Vec<u32>, bit: u32, detail: u32) {
    engine.status |= bit;
    engine.error_detail = detail;
    engine.error_addr = engine.fetch;
    engine.halted = true;
    raise(engine, irqs, control::IE_ERRORS);
}

fn copy_to_card(memory: &mut [u8], host: u64, card: u64, len: usize) -> Result<(), (u32, u32)> {
    let start = card as usize;
    let dst = memory
        .get_mut(start..start + len)
        .ok_or((status::WRITE_ERROR, error_detail::WRITE_BUS))?;
    // SAFETY: host points into a buffer pinned for this transfer.
    let src = unsafe { std::slice::from_raw_parts(host as usize as *const u8, len) };
    dst.copy_from_slice(src);
    Ok(())
}

fn copy_to_host(memory: &[u8], card: u64, host: u64, len: usize) -> Result<(), (u32, u32)> {
    let start = card as usize;
    let src = memory
        .get(start..start + len)
        .ok_or((status::READ_ERROR, error_detail::READ_BUS))?;
    // SAFETY: host points into a buffer pinned writable for this transfer.
    let dst = unsafe { std::slice::from_raw_parts_mut(host as usize as *mut u8, len) };
    dst.copy_from_slice(src);
    Ok(())
}

impl Hardware for MockHardware {
    fn read_reg(&self, offset: usize) -> u32 {
        let state = self.lock();
        if state.removed {
            return 0xFFFF_FFFF;
        }
        state
            .engines
            .iter()
            .find(|e| (e.base..e.base + ENGINE_BLOCK_SIZE).contains(&offset))
            .map_or(0, |e| read_engine(e, offset - e.base))
    }

    fn write_reg(&self, offset: usize, value: u32) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.removed {
            return;
        }
        let Some(engine) = state
            .engines
            .iter_mut()
            .find(|e| (e.base..e.base + ENGINE_BLOCK_SIZE).contains(&offset))
        else {
            return;
        };

        match offset - engine.base {
            CONTROL_OFFSET => {
                engine.control = value;
                if value & control::RUN != 0 {
                    engine.halted = false;
                }
            }
            STATUS_OFFSET => engine.status &= !(value & status::W1C_MASK),
            DESC_BASE_LO_OFFSET => {
                engine.desc_base = (engine.desc_base & !0xFFFF_FFFF) | u64::from(value);
                engine.fetch = engine.desc_base;
                engine.completed = 0;
                engine.doorbell = 0;
                engine.since_irq = 0;
            }
            DESC_BASE_HI_OFFSET => {
                engine.desc_base = (engine.desc_base & 0xFFFF_FFFF) | (u64::from(value) << 32);
                engine.fetch = engine.desc_base;
            }
            RING_SIZE_OFFSET => engine.ring_size = value,
            DOORBELL_OFFSET => engine.doorbell = value,
            IRQ_COALESCE_OFFSET => engine.coalesce = value,
            _ => return,
        }

        if !state.manual {
            run_engine(
                engine,
                &mut state.device_memory,
                &mut state.pending_irqs,
                usize::MAX,
            );
        }
    }

    fn register_irq(&self, vector: u32) -> ConfigResult<()> {
        let mut state = self.lock();
        if state.failing_vector == Some(vector) {
            return Err(ConfigError::IrqRegistration);
        }
        state.registered_irqs.push(vector);
        Ok(())
    }

    fn unregister_irq(&self, vector: u32) {
        self.lock().registered_irqs.retain(|v| *v != vector);
    }
}

// =============================================================================
// Mock User Memory
// =============================================================================

#[derive(Debug)]
struct MockPage {
    host: u64,
    mapped: bool,
    pins: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    pages: BTreeMap<u64, MockPage>,
    backing: Vec<AlignedBuffer>,
    next_va: u64,
    pin_limit: Option<usize>,
    pinned: usize,
    dirty: usize,
    writable: usize,
    double_unpins: usize,
}

/// Simulated user address space backed by page-aligned host allocations
///
/// Virtual addresses are fake; each mapped page translates to a real host
/// page whose address doubles as its bus address. Pins are reference counted
/// per page so tests can check every page is released exactly once.
#[derive(Debug)]
pub struct MockUserMemory {
    state: Mutex<MemoryState>,
}

/// First virtual address handed out
const USER_BASE: u64 = 0x0010_0000;

/// One past the highest user address
const ADDRESS_LIMIT: u64 = 1 << 47;

impl Default for MockUserMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUserMemory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_va: USER_BASE,
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Map a buffer whose pages are physically contiguous
    pub fn alloc(&self, len: usize) -> UserBuffer {
        let pages = len.div_ceil(PAGE).max(1);
        self.map(len, pages, |i| i)
    }

    /// Map a buffer whose pages are discontiguous and in reverse physical order
    pub fn alloc_scattered(&self, len: usize) -> UserBuffer {
        let pages = len.div_ceil(PAGE).max(1);
        self.map(len, 2 * pages, |i| 2 * (pages - 1 - i))
    }

    fn map(&self, len: usize, backing_pages: usize, slot: impl Fn(usize) -> usize) -> UserBuffer {
        let pages = len.div_ceil(PAGE).max(1);
        let backing = AlignedBuffer::page_aligned(backing_pages * PAGE).unwrap();
        let host = backing.addr();

        let mut state = self.lock();
        let va = state.next_va;
        for i in 0..pages {
            state.pages.insert(
                va + (i * PAGE) as u64,
                MockPage {
                    host: host + (slot(i) * PAGE) as u64,
                    mapped: true,
                    pins: 0,
                },
            );
        }
        state.backing.push(backing);
        // Leave an unmapped guard page between allocations.
        state.next_va = va + ((pages + 1) * PAGE) as u64;
        UserBuffer::new(va, len)
    }

    /// Remove the mapping of the page containing `addr`
    pub fn unmap_page(&self, addr: u64) {
        let page = addr & !(PAGE as u64 - 1);
        if let Some(p) = self.lock().pages.get_mut(&page) {
            p.mapped = false;
        }
    }

    /// Cap the number of simultaneously pinned pages
    pub fn set_pin_limit(&self, limit: Option<usize>) {
        self.lock().pin_limit = limit;
    }

    /// Pages currently pinned
    pub fn pinned_pages(&self) -> usize {
        self.lock().pinned
    }

    /// Page releases that carried the dirty flag
    pub fn dirty_pages(&self) -> usize {
        self.lock().dirty
    }

    /// Pages ever pinned writable
    pub fn writable_pins(&self) -> usize {
        self.lock().writable
    }

    /// Releases of pages that were not pinned
    pub fn double_unpins(&self) -> usize {
        self.lock().double_unpins
    }

    /// Copy `data` into the buffer through its virtual mapping
    pub fn write(&self, buffer: UserBuffer, data: &[u8]) {
        assert!(data.len() <= buffer.len);
        let state = self.lock();
        for (i, byte) in data.iter().enumerate() {
            let host = translate(&state, buffer.addr + i as u64);
            // SAFETY: host is inside a live backing allocation owned by state.
            unsafe { *(host as usize as *mut u8) = *byte };
        }
    }

    /// Read the buffer through its virtual mapping
    pub fn read(&self, buffer: UserBuffer) -> Vec<u8> {
        let state = self.lock();
        (0..buffer.len)
            .map(|i| {
                let host = translate(&state, buffer.addr + i as u64);
                // SAFETY: as in write.
                unsafe { *(host as usize as *const u8) }
            })
            .collect()
    }
}

fn translate(state: &MemoryState, addr: u64) -> u64 {
    let page = addr & !(PAGE as u64 - 1);
    state.pages[&page].host + (addr - page)
}

impl UserMemory for MockUserMemory {
    fn page_size(&self) -> usize {
        PAGE
    }

    fn address_limit(&self) -> u64 {
        ADDRESS_LIMIT
    }

    fn pin_page(&self, page_addr: u64, writable: bool) -> Result<PageFrame, FaultKind> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.pin_limit.is_some_and(|limit| state.pinned >= limit) {
            return Err(FaultKind::PinLimit);
        }
        let page = match state.pages.get_mut(&page_addr) {
            Some(page) if page.mapped => page,
            _ => return Err(FaultKind::Unmapped),
        };
        page.pins += 1;
        let frame = PageFrame { bus_addr: page.host };
        state.pinned += 1;
        if writable {
            state.writable += 1;
        }
        Ok(frame)
    }

    fn unpin_page(&self, frame: PageFrame, dirty: bool) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state
            .pages
            .values_mut()
            .find(|p| p.host == frame.bus_addr && p.pins > 0)
        {
            Some(page) => {
                page.pins -= 1;
                state.pinned -= 1;
                if dirty {
                    state.dirty += 1;
                }
            }
            None => state.double_unpins += 1,
        }
    }
}

// =============================================================================
// Mock Delay
// =============================================================================

/// Mock delay for testing without actual timing
///
/// Records delays for verification without actually waiting.
#[derive(Debug, Default)]
pub struct MockDelay {
    /// Total nanoseconds delayed
    total_ns: RefCell<u64>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_ns(&self) -> u64 {
        *self.total_ns.borrow()
    }

    pub fn total_us(&self) -> u64 {
        self.total_ns() / 1_000
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        *self.total_ns.borrow_mut() += u64::from(ns);
    }
}

/// Delay that runs a closure instead of waiting
///
/// Stands in for the interrupt and deferred-work contexts while a blocking
/// call is waiting.
pub struct PumpDelay<F: FnMut()> {
    pump: F,
    calls: usize,
}

impl<F: FnMut()> PumpDelay<F> {
    pub fn new(pump: F) -> Self {
        Self { pump, calls: 0 }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl<F: FnMut()> embedded_hal::delay::DelayNs for PumpDelay<F> {
    fn delay_ns(&mut self, _ns: u32) {
        self.calls += 1;
        (self.pump)();
    }
}

// =============================================================================
// Randomness
// =============================================================================

/// Small deterministic generator for randomized interleavings
#[derive(Debug, Clone)]
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 32) as u32
    }

    /// Value in `0..bound`
    pub fn below(&mut self, bound: u32) -> u32 {
        self.next_u32() % bound.max(1)
    }
}

// =============================================================================
// Test Waker
// =============================================================================

/// Counter for tracking waker calls
pub struct WakeCounter {
    count: AtomicUsize,
}

impl WakeCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            count: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Create a test waker that increments a counter when woken
pub fn test_waker(counter: Arc<WakeCounter>) -> Waker {
    fn clone_fn(ptr: *const ()) -> RawWaker {
        // SAFETY: ptr came from Arc::into_raw below.
        let arc = unsafe { Arc::from_raw(ptr.cast::<WakeCounter>()) };
        let cloned = arc.clone();
        core::mem::forget(arc);
        RawWaker::new(Arc::into_raw(cloned).cast::<()>(), &VTABLE)
    }

    fn wake_fn(ptr: *const ()) {
        // SAFETY: consumes the reference owned by this waker.
        let arc = unsafe { Arc::from_raw(ptr.cast::<WakeCounter>()) };
        arc.count.fetch_add(1, Ordering::SeqCst);
    }

    fn wake_by_ref_fn(ptr: *const ()) {
        // SAFETY: borrowed; the reference is forgotten again.
        let arc = unsafe { Arc::from_raw(ptr.cast::<WakeCounter>()) };
        arc.count.fetch_add(1, Ordering::SeqCst);
        core::mem::forget(arc);
    }

    fn drop_fn(ptr: *const ()) {
        // SAFETY: releases the reference owned by this waker.
        drop(unsafe { Arc::from_raw(ptr.cast::<WakeCounter>()) });
    }

    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_fn, wake_fn, wake_by_ref_fn, drop_fn);

    let raw = RawWaker::new(Arc::into_raw(counter).cast::<()>(), &VTABLE);
    // SAFETY: the vtable upholds the RawWaker contract.
    unsafe { Waker::from_raw(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::register::engine::EngineRegs;

    #[test]
    fn removed_device_reads_all_ones() {
        let hw = MockHardware::new(PAGE);
        hw.add_engine(0, Direction::H2C, 0);
        hw.remove();
        assert_eq!(EngineRegs::new(&hw, 0).status(), 0xFFFF_FFFF);
        assert_eq!(hw.read_reg(0x4000), 0xFFFF_FFFF);
    }

    #[test]
    fn status_is_write_one_to_clear() {
        let hw = MockHardware::new(PAGE);
        hw.add_engine(0, Direction::H2C, 0);
        hw.lock().engines[0].status = status::DESC_COMPLETED | status::DESC_STOPPED;

        hw.write_reg(STATUS_OFFSET, status::DESC_COMPLETED);
        assert_eq!(hw.read_reg(STATUS_OFFSET), status::DESC_STOPPED);
    }

    #[test]
    fn irq_registration_can_fail() {
        let hw = MockHardware::new(PAGE);
        hw.fail_irq_registration(3);
        assert_eq!(hw.register_irq(2), Ok(()));
        assert_eq!(hw.register_irq(3), Err(ConfigError::IrqRegistration));
        hw.unregister_irq(2);
        assert!(hw.registered_irqs().is_empty());
    }

    #[test]
    fn user_memory_round_trips_through_mapping() {
        let mem = MockUserMemory::new();
        let buf = mem.alloc_scattered(2 * PAGE + 5);
        let data: Vec<u8> = (0..buf.len).map(|i| i as u8).collect();

        mem.write(buf, &data);
        assert_eq!(mem.read(buf), data);
    }

    #[test]
    fn allocations_are_separated_by_guard_pages() {
        let mem = MockUserMemory::new();
        let a = mem.alloc(PAGE);
        let b = mem.alloc(PAGE);
        assert_eq!(b.addr - a.addr, 2 * PAGE as u64);
        assert_eq!(mem.pin_page(a.addr + PAGE as u64, false), Err(FaultKind::Unmapped));
    }

    #[test]
    fn unpin_of_unpinned_page_is_counted() {
        let mem = MockUserMemory::new();
        let buf = mem.alloc(PAGE);
        let frame = mem.pin_page(buf.addr, false).unwrap();
        mem.unpin_page(frame, false);
        mem.unpin_page(frame, false);
        assert_eq!(mem.double_unpins(), 1);
        assert_eq!(mem.pinned_pages(), 0);
    }

    #[test]
    fn xorshift_is_deterministic() {
        let mut a = XorShift::new(42);
        let mut b = XorShift::new(42);
        for _ in 0..16 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
        assert!(XorShift::new(7).below(5) < 5);
    }
}
