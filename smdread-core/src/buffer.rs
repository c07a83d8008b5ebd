use core::cell::RefCell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::String;

use crate::config::BUFFER_FILENAME_MAX_LENGTH;

/// Buffer filename label
pub type BufferFilename = String<BUFFER_FILENAME_MAX_LENGTH>;

/// Buffer handle (index into the pool)
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferId {
    id: usize,
}

impl BufferId {
    pub const fn new(id: usize) -> Self {
        Self { id }
    }

    pub fn index(&self) -> usize {
        self.id
    }
}

/// Buffer lifecycle
///
/// Free -> Busy -> Written -> Transferred -> Free
///
/// The status names the only side allowed to touch the buffer next:
/// - Free: nobody (pool)
/// - Busy: drive side, capture in progress
/// - Written: control side, waiting to be drained
/// - Transferred: control side, draining
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferStatus {
    Free,
    Busy,
    Written,
    Transferred,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferError {
    /// No free buffer left
    Exhausted,
}

/// Buffer storage, word aligned so captured 32-bit words can land in it directly
#[repr(C, align(4))]
struct BufferData<const SIZE: usize>([u8; SIZE]);

struct Buffer<const SIZE: usize> {
    data: BufferData<SIZE>,
    /// Occupied size in bytes
    size: usize,
    status: BufferStatus,
    filename: BufferFilename,
}

impl<const SIZE: usize> Buffer<SIZE> {
    const fn new() -> Self {
        Self {
            data: BufferData([0; SIZE]),
            size: 0,
            status: BufferStatus::Free,
            filename: String::new(),
        }
    }
}

/// Fixed-count, fixed-size buffer pool
pub struct BufferPool<const BUFFER_N: usize, const BUFFER_SIZE: usize> {
    buffers: [Buffer<BUFFER_SIZE>; BUFFER_N],
}

impl<const BUFFER_N: usize, const BUFFER_SIZE: usize> Default
    for BufferPool<BUFFER_N, BUFFER_SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const BUFFER_N: usize, const BUFFER_SIZE: usize> BufferPool<BUFFER_N, BUFFER_SIZE> {
    const WORD_ALIGNED_SIZE: () = assert!(
        BUFFER_SIZE % 4 == 0,
        "buffer size must be a multiple of 4 bytes"
    );

    /// Create a new pool with every buffer free
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::WORD_ALIGNED_SIZE;
        Self {
            buffers: [const { Buffer::new() }; BUFFER_N],
        }
    }

    /// Capacity of a single buffer in bytes
    pub const fn capacity(&self) -> usize {
        BUFFER_SIZE
    }

    /// Number of buffers
    pub const fn len(&self) -> usize {
        BUFFER_N
    }

    pub const fn is_empty(&self) -> bool {
        BUFFER_N == 0
    }

    fn buffer(&self, id: BufferId) -> &Buffer<BUFFER_SIZE> {
        assert!(id.id < BUFFER_N, "buffer index {} out of range", id.id);
        &self.buffers[id.id]
    }

    fn buffer_mut(&mut self, id: BufferId) -> &mut Buffer<BUFFER_SIZE> {
        assert!(id.id < BUFFER_N, "buffer index {} out of range", id.id);
        &mut self.buffers[id.id]
    }

    fn find(&self, status: BufferStatus) -> Option<BufferId> {
        self.buffers
            .iter()
            .position(|buf| buf.status == status)
            .map(BufferId::new)
    }

    fn transition(&mut self, id: BufferId, from: BufferStatus, to: BufferStatus) {
        let buf = self.buffer_mut(id);
        assert!(
            buf.status == from,
            "buffer {} is {:?}, expected {:?}",
            id.id,
            buf.status,
            from
        );
        buf.status = to;
        trace!("buffer {}: {:?} -> {:?}", id.id, from, to);
    }

    /// Check if a free buffer exists
    pub fn can_allocate(&self) -> bool {
        self.find(BufferStatus::Free).is_some()
    }

    /// Allocate the lowest-index free buffer (Free -> Busy)
    ///
    /// `requested_size` is clamped to the buffer capacity.
    /// Panics if nothing is free, check `can_allocate` first.
    pub fn allocate(&mut self, requested_size: usize) -> BufferId {
        match self.try_allocate(requested_size) {
            Ok(id) => id,
            Err(_) => panic!("no free buffer"),
        }
    }

    /// Allocate the lowest-index free buffer, reporting exhaustion instead of panicking
    pub fn try_allocate(&mut self, requested_size: usize) -> Result<BufferId, BufferError> {
        let id = self
            .find(BufferStatus::Free)
            .ok_or(BufferError::Exhausted)?;
        self.transition(id, BufferStatus::Free, BufferStatus::Busy);
        let buf = self.buffer_mut(id);
        buf.size = requested_size.min(BUFFER_SIZE);
        buf.filename.clear();
        Ok(id)
    }

    /// Busy -> Written
    pub fn mark_written(&mut self, id: BufferId) {
        self.transition(id, BufferStatus::Busy, BufferStatus::Written);
    }

    /// Lowest-index buffer waiting to be drained
    pub fn find_written(&self) -> Option<BufferId> {
        self.find(BufferStatus::Written)
    }

    /// Written -> Transferred
    pub fn mark_transferred(&mut self, id: BufferId) {
        self.transition(id, BufferStatus::Written, BufferStatus::Transferred);
    }

    /// Transferred -> Free
    pub fn release(&mut self, id: BufferId) {
        self.transition(id, BufferStatus::Transferred, BufferStatus::Free);
    }

    /// Force every buffer back to Free. Startup only
    pub fn reset_all(&mut self) {
        for buf in self.buffers.iter_mut() {
            buf.status = BufferStatus::Free;
            buf.size = 0;
            buf.filename.clear();
        }
    }

    /// Get buffer status
    pub fn status(&self, id: BufferId) -> BufferStatus {
        self.buffer(id).status
    }

    /// Get occupied size in bytes
    pub fn size(&self, id: BufferId) -> usize {
        self.buffer(id).size
    }

    /// Get the occupied part of the buffer
    pub fn data(&self, id: BufferId) -> &[u8] {
        let buf = self.buffer(id);
        &buf.data.0[..buf.size]
    }

    /// Get the whole buffer (mutable)
    pub fn data_mut(&mut self, id: BufferId) -> &mut [u8] {
        &mut self.buffer_mut(id).data.0
    }

    /// Get the filename label
    pub fn filename(&self, id: BufferId) -> &str {
        self.buffer(id).filename.as_str()
    }

    /// Get the filename label (mutable)
    pub fn filename_mut(&mut self, id: BufferId) -> &mut BufferFilename {
        &mut self.buffer_mut(id).filename
    }

    /// Replace the filename label. Truncated at `BUFFER_FILENAME_MAX_LENGTH`
    pub fn set_filename(&mut self, id: BufferId, args: core::fmt::Arguments) {
        let filename = self.filename_mut(id);
        filename.clear();
        if filename.write_fmt(args).is_err() {
            warn!("buffer {}: filename truncated", id.id);
        }
    }

    /// Start of the buffer storage as a word pointer, for the capture transfer
    pub(crate) fn word_ptr(&mut self, id: BufferId) -> *mut u32 {
        self.buffer_mut(id).data.0.as_mut_ptr().cast::<u32>()
    }
}

/// Buffer pool shared between the control and the drive context
pub struct SharedBufferPool<const BUFFER_N: usize, const BUFFER_SIZE: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<BufferPool<BUFFER_N, BUFFER_SIZE>>>,
}

impl<const BUFFER_N: usize, const BUFFER_SIZE: usize> Default
    for SharedBufferPool<BUFFER_N, BUFFER_SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const BUFFER_N: usize, const BUFFER_SIZE: usize> SharedBufferPool<BUFFER_N, BUFFER_SIZE> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(BufferPool::new())),
        }
    }

    /// Run `f` with exclusive access to the pool. Never call back into `lock` from `f`
    pub fn lock<R>(&self, f: impl FnOnce(&mut BufferPool<BUFFER_N, BUFFER_SIZE>) -> R) -> R {
        self.inner.lock(|pool| f(&mut pool.borrow_mut()))
    }

    /// Check if a free buffer exists
    pub fn can_allocate(&self) -> bool {
        self.lock(|pool| pool.can_allocate())
    }

    /// Allocate a buffer, reporting exhaustion
    pub fn try_allocate(&self, requested_size: usize) -> Result<BufferId, BufferError> {
        self.lock(|pool| pool.try_allocate(requested_size))
    }

    /// Get buffer status
    pub fn status(&self, id: BufferId) -> BufferStatus {
        self.lock(|pool| pool.status(id))
    }
}
