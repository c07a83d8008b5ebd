#![no_std]
#![no_main]

mod capture {
    pub mod pio;
}
mod clock;
mod cpu {
    pub mod cpu0;
    pub mod cpu1;
}
mod drive {
    pub mod pins;
}
mod shared {
    pub mod constant;
    pub mod datatype;
    pub mod resource;
}
mod task {
    pub mod control_task;
    pub mod usb_task;
}

use defmt::*;
use embassy_executor::{Executor, Spawner};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::multicore::{spawn_core1, Stack};
use embassy_rp::peripherals::{PIO0, USB};
use embassy_rp::pio::{InterruptHandler as PioInterruptHandler, Pio};
use embassy_rp::usb::{Driver, InterruptHandler as UsbInterruptHandler};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::capture::pio::PioCapture;
use crate::drive::pins::{ControlPins, StatusPins};
use crate::shared::constant::*;
use crate::shared::resource::{POOL, STATUS_PINS};

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => UsbInterruptHandler<USB>;
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});

static mut CORE1_STACK: Stack<CORE1_STACK_SIZE> = Stack::new();
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("smdread start");
    let p = embassy_rp::init(Default::default());

    // pulled down: an unplugged drive reads as all lines inactive
    let status_pins = StatusPins::new(
        Input::new(p.PIN_14, Pull::Down),
        Input::new(p.PIN_15, Pull::Down),
        Input::new(p.PIN_16, Pull::Down),
        Input::new(p.PIN_17, Pull::Down),
        Input::new(p.PIN_18, Pull::Down),
        Input::new(p.PIN_19, Pull::Down),
        Input::new(p.PIN_20, Pull::Down),
    );
    STATUS_PINS.lock(|pins| *pins.borrow_mut() = Some(status_pins));

    let control_pins = ControlPins::new(
        [
            Output::new(p.PIN_0, Level::Low),
            Output::new(p.PIN_1, Level::Low),
            Output::new(p.PIN_2, Level::Low),
            Output::new(p.PIN_3, Level::Low),
            Output::new(p.PIN_4, Level::Low),
            Output::new(p.PIN_5, Level::Low),
            Output::new(p.PIN_6, Level::Low),
            Output::new(p.PIN_7, Level::Low),
            Output::new(p.PIN_8, Level::Low),
            Output::new(p.PIN_9, Level::Low),
        ],
        Output::new(p.PIN_10, Level::Low),
        Output::new(p.PIN_11, Level::Low),
        Output::new(p.PIN_12, Level::Low),
        Output::new(p.PIN_13, Level::Low),
    );
    let led = Output::new(p.PIN_25, Level::Low);

    let Pio { common, sm0, .. } = Pio::new(p.PIO0, Irqs);
    let capture = PioCapture::new(common, sm0, p.PIN_21, p.PIN_22, p.DMA_CH0);

    POOL.lock(|pool| pool.reset_all());

    spawn_core1(
        p.CORE1,
        unsafe { &mut *core::ptr::addr_of_mut!(CORE1_STACK) },
        move || {
            let executor1 = EXECUTOR1.init(Executor::new());
            executor1.run(|spawner| {
                unwrap!(spawner.spawn(cpu::cpu1::main_task(control_pins, capture, led)))
            });
        },
    );

    let driver = Driver::new(p.USB, Irqs);
    unwrap!(spawner.spawn(cpu::cpu0::main_task(driver)));
}
