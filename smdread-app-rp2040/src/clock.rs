use embassy_time::{Instant, Timer};

use smdread_core::clock::Clock;

/// `Clock` on the embassy time driver (1MHz tick)
#[derive(Copy, Clone, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }

    async fn delay_us(&self, us: u32) {
        Timer::after_micros(u64::from(us)).await;
    }
}
