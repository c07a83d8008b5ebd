use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use portable_atomic::AtomicBool;

use smdread_core::buffer::SharedBufferPool;
use smdread_core::engine::JobControl;

use crate::drive::pins::StatusPins;
use crate::shared::constant::*;
use crate::shared::datatype::Reply;

/// Capture buffers shared by both cores
pub static POOL: SharedBufferPool<CAPTURE_BUFFER_COUNT, CAPTURE_BUFFER_SIZE> =
    SharedBufferPool::new();

/// Core0 (control) <-> Core1 (drive execution) job handoff
pub static CONTROL: JobControl = JobControl::new();

/// Status inputs, sampled by the job runner and the status monitor
pub static STATUS_PINS: Mutex<CriticalSectionRawMutex, RefCell<Option<StatusPins<'static>>>> =
    Mutex::new(RefCell::new(None));

/// Command handler -> USB writer
pub static CHANNEL_REPLY: Channel<CriticalSectionRawMutex, Reply, CHANNEL_REPLY_N> =
    Channel::new();

/// Host asked for status change reports
pub static STATUS_SUBSCRIBED: AtomicBool = AtomicBool::new(false);

/// A job was launched and its completion has not been reported yet
pub static JOB_POLLING: AtomicBool = AtomicBool::new(false);
