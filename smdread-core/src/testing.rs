//! Simulated clock, drive, capture unit and LED for host tests

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal_1::digital::{ErrorType, OutputPin};

use crate::capture::CaptureChannel;
use crate::clock::Clock;
use crate::lines::{DriveLines, DriveStatus, Tag, Tag3Control};

/// Clock that only moves when something delays on it
#[derive(Clone, Default)]
pub struct FakeClock(Arc<AtomicU64>);

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, us: u64) {
        self.0.fetch_add(us, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_us(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    async fn delay_us(&self, us: u32) {
        self.advance(u64::from(us));
        embassy_futures::yield_now().await;
    }
}

/// Output change seen by the simulated drive
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LineEvent {
    Tag {
        at_us: u64,
        tag: Tag,
        asserted: bool,
        /// Bus value at the time of the change
        bus: u16,
    },
    Bus {
        at_us: u64,
        value: u16,
    },
}

#[derive(Default)]
struct DriveState {
    base: DriveStatus,
    /// (time, status) replacing `base` from that time on, ascending
    scheduled: Vec<(u64, DriveStatus)>,
    select_answer_us: Option<u64>,
    unit_select_at: Option<u64>,
    seek_answer_us: Option<u64>,
    seek_started_at: Option<u64>,
    /// (period, width)
    index: Option<(u64, u64)>,
    tags: [bool; 4],
    bus: u16,
    history: Vec<LineEvent>,
}

/// Drive that answers tags the way a real one would, in simulated time
#[derive(Clone)]
pub struct FakeDrive {
    clock: FakeClock,
    state: Arc<Mutex<DriveState>>,
}

impl FakeDrive {
    pub fn new(clock: FakeClock, base: DriveStatus) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(DriveState {
                base,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, DriveState> {
        self.state.lock().unwrap()
    }

    /// Replace the base status from `at_us` on
    pub fn set_status_at(&self, at_us: u64, status: DriveStatus) {
        let mut state = self.state();
        state.scheduled.push((at_us, status));
        state.scheduled.sort_by_key(|&(at, _)| at);
    }

    /// Assert UNIT SELECTED `delay_us` after unit select goes high
    pub fn answer_unit_select_after(&self, delay_us: u64) {
        self.state().select_answer_us = Some(delay_us);
    }

    /// Assert ON CYLINDER and SEEK END `delay_us` after every seek or RTZ strobe
    pub fn complete_seeks_after(&self, delay_us: u64) {
        self.state().seek_answer_us = Some(delay_us);
    }

    /// Index high for `width_us` at the start of every `period_us`
    pub fn index_pulse(&self, period_us: u64, width_us: u64) {
        self.state().index = Some((period_us, width_us));
    }

    pub fn tag(&self, tag: Tag) -> bool {
        self.state().tags[u8::from(tag) as usize]
    }

    pub fn bus(&self) -> u16 {
        self.state().bus
    }

    pub fn history(&self) -> Vec<LineEvent> {
        self.state().history.clone()
    }

    /// True when no tag other than unit select is asserted and the bus is zero
    pub fn outputs_cleared(&self) -> bool {
        let state = self.state();
        state.tags[1..].iter().all(|&t| !t) && state.bus == 0
    }
}

impl DriveLines for FakeDrive {
    fn status(&self) -> DriveStatus {
        let now = self.clock.now_us();
        let state = self.state();
        let mut status = state
            .scheduled
            .iter()
            .rev()
            .find(|&&(at, _)| at <= now)
            .map_or(state.base, |&(_, status)| status);
        if let (Some(delay), Some(at)) = (state.select_answer_us, state.unit_select_at) {
            if now >= at + delay {
                status |= DriveStatus::UNIT_SELECTED;
            }
        }
        if let Some(delay) = state.seek_answer_us {
            if state.seek_started_at.map_or(true, |at| now >= at + delay) {
                status |= DriveStatus::SEEK_DONE_MASK;
            }
        }
        if let Some((period, width)) = state.index {
            if now % period < width {
                status |= DriveStatus::INDEX;
            }
        }
        status
    }

    fn set_tag(&mut self, tag: Tag, asserted: bool) {
        let now = self.clock.now_us();
        let mut state = self.state();
        let index = u8::from(tag) as usize;
        if asserted && !state.tags[index] {
            match tag {
                Tag::UnitSelect => state.unit_select_at = Some(now),
                Tag::Tag1 => state.seek_started_at = Some(now),
                Tag::Tag3 if state.bus & Tag3Control::RETURN_TO_ZERO.bits() != 0 => {
                    state.seek_started_at = Some(now)
                }
                _ => {}
            }
        }
        if !asserted && tag == Tag::UnitSelect {
            state.unit_select_at = None;
        }
        state.tags[index] = asserted;
        let bus = state.bus;
        state.history.push(LineEvent::Tag {
            at_us: now,
            tag,
            asserted,
            bus,
        });
    }

    fn set_bus(&mut self, value: u16) {
        let now = self.clock.now_us();
        let mut state = self.state();
        state.bus = value;
        state.history.push(LineEvent::Bus { at_us: now, value });
    }
}

#[derive(Default)]
struct CaptureState {
    busy_until: Option<u64>,
    // capture unit started, stays so until the next reset or abort
    running: bool,
    resets: usize,
    aborts: usize,
    transfers: Vec<usize>,
}

/// Capture unit that fills the destination at once and stays busy for a fixed time
#[derive(Clone)]
pub struct FakeCapture {
    clock: FakeClock,
    duration_us: u64,
    state: Arc<Mutex<CaptureState>>,
}

impl FakeCapture {
    pub const PATTERN: u8 = 0xa5;

    pub fn new(clock: FakeClock, duration_us: u64) -> Self {
        Self {
            clock,
            duration_us,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap()
    }

    pub fn resets(&self) -> usize {
        self.state().resets
    }

    pub fn aborts(&self) -> usize {
        self.state().aborts
    }

    /// Word count of every transfer started so far
    pub fn transfers(&self) -> Vec<usize> {
        self.state().transfers.clone()
    }
}

impl CaptureChannel for FakeCapture {
    fn reset(&mut self) {
        let mut state = self.state();
        state.running = false;
        state.resets += 1;
    }

    unsafe fn start_transfer(&mut self, dest: *mut u32, word_count: usize) {
        // SAFETY: the caller guarantees `dest` is valid for `word_count` words
        unsafe { core::ptr::write_bytes(dest.cast::<u8>(), Self::PATTERN, word_count * 4) };
        let mut state = self.state.lock().unwrap();
        assert!(!state.running, "transfer armed while capture unit running");
        state.running = true;
        state.busy_until = Some(self.clock.now_us() + self.duration_us);
        state.transfers.push(word_count);
    }

    fn is_busy(&self) -> bool {
        let now = self.clock.now_us();
        self.state().busy_until.map_or(false, |until| now < until)
    }

    fn abort(&mut self) {
        let mut state = self.state();
        state.busy_until = None;
        state.running = false;
        state.aborts += 1;
    }
}

/// LED that counts how often it was switched on
#[derive(Clone, Default)]
pub struct FakeLed {
    on: Arc<AtomicUsize>,
}

impl FakeLed {
    pub fn on_count(&self) -> usize {
        self.on.load(Ordering::SeqCst)
    }
}

impl ErrorType for FakeLed {
    type Error = Infallible;
}

impl OutputPin for FakeLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.on.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
