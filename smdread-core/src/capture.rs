use crate::buffer::{BufferId, BufferStatus, SharedBufferPool};

/// Bit-clocked capture unit paired with the transfer channel draining it
///
/// The capture unit shifts in one data bit per clock edge and commits a
/// 32-bit word at a time. The transfer channel moves committed words into
/// memory without CPU involvement.
pub trait CaptureChannel {
    /// Stop the capture unit and flush its queue
    fn reset(&mut self);

    /// Arm a transfer of `word_count` words into `dest`, then start the
    /// capture unit, and return immediately
    ///
    /// The capture unit must be stopped by `reset` or `abort` beforehand.
    ///
    /// # Safety
    ///
    /// `dest` must be valid for writes of `word_count` aligned `u32`s until
    /// `is_busy` returns false or `abort` has been called.
    unsafe fn start_transfer(&mut self, dest: *mut u32, word_count: usize);

    /// Check if a transfer is still moving words
    fn is_busy(&self) -> bool;

    /// Stop the capture unit and cancel any transfer in flight
    fn abort(&mut self);
}

/// Acquisition pipeline: captures clocked serial data into pool buffers
pub struct ClockedReader<C: CaptureChannel> {
    channel: C,
}

impl<C: CaptureChannel> ClockedReader<C> {
    pub fn new(mut channel: C) -> Self {
        channel.abort();
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Start capturing `byte_count` bytes into a BUSY buffer
    ///
    /// The byte count is clamped to the buffer capacity and rounded up to
    /// whole words. Returns the number of words armed.
    pub fn start_capture<const N: usize, const SIZE: usize>(
        &mut self,
        pool: &SharedBufferPool<N, SIZE>,
        id: BufferId,
        byte_count: usize,
    ) -> usize {
        assert!(!self.channel.is_busy(), "capture already active");

        let word_count = byte_count.min(SIZE).div_ceil(4);
        let dest = pool.lock(|pool| {
            let status = pool.status(id);
            assert!(
                status == BufferStatus::Busy,
                "capture into buffer {} in state {:?}",
                id.index(),
                status
            );
            pool.word_ptr(id)
        });

        self.channel.reset();
        debug!("capture: buffer {} <- {} words", id.index(), word_count);
        // SAFETY: the buffer is BUSY so nothing else touches its bytes until
        // the drive side marks it written, and `word_count * 4 <= SIZE`.
        // Teardown calls `reset` before the buffer can change hands.
        unsafe { self.channel.start_transfer(dest, word_count) };
        word_count
    }

    /// Check if the last capture is still running
    pub fn is_active(&self) -> bool {
        self.channel.is_busy()
    }

    /// Stop the capture unit and cancel any transfer
    pub fn reset(&mut self) {
        self.channel.abort();
    }
}
