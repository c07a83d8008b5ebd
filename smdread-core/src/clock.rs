/// Time source for every bounded wait.
///
/// Jobs never sleep through anything but this trait, so tests can run them
/// against simulated time.
#[trait_variant::make(Send)]
pub trait Clock {
    /// Monotonic time in microseconds
    fn now_us(&self) -> u64;
    /// Wait at least `us` microseconds
    async fn delay_us(&self, us: u32);

    /// Microseconds elapsed since `since_us`
    fn elapsed_us(&self, since_us: u64) -> u64 {
        self.now_us().saturating_sub(since_us)
    }
}
