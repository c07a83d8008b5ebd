use embassy_rp::gpio::Output;
use embassy_rp::peripherals::DMA_CH0;

use smdread_core::engine::JobRunner;

use crate::capture::pio::PioCapture;
use crate::clock::EmbassyClock;
use crate::drive::pins::ControlPins;
use crate::shared::constant::*;
use crate::shared::resource::{CONTROL, POOL};

/// Drive execution context: sole owner of the control lines and the capture unit
#[embassy_executor::task]
pub async fn main_task(
    control_pins: ControlPins<'static>,
    capture: PioCapture<'static, DMA_CH0>,
    led: Output<'static>,
) {
    crate::info!("Start job runner");
    let mut runner: JobRunner<
        'static,
        ControlPins<'static>,
        PioCapture<'static, DMA_CH0>,
        EmbassyClock,
        Output<'static>,
        CAPTURE_BUFFER_COUNT,
        CAPTURE_BUFFER_SIZE,
    > = JobRunner::new(
        &CONTROL,
        &POOL,
        control_pins,
        capture,
        EmbassyClock,
        led,
    );
    runner.run().await;
}
