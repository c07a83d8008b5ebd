use core::sync::atomic::{compiler_fence, Ordering};

use embassy_rp::dma::Channel;
use embassy_rp::pac;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{
    Common, Config, Direction, FifoJoin, PioPin, ShiftConfig, ShiftDirection, StateMachine,
};
use embassy_rp::{into_ref, Peripheral, PeripheralRef};

use smdread_core::capture::CaptureChannel;

use crate::shared::constant::{CAPTURE_DREQ_PIO0_RX0, CAPTURE_PIO_SM};

/// Clocked read on PIO0, drained by one DMA channel
///
/// The state machine samples the data pin on every rising edge of the read
/// clock pin (data pin + 1) and autopushes full 32-bit words into the joined
/// RX FIFO. The DMA channel is paced by the RX FIFO DREQ.
pub struct PioCapture<'d, D: Channel> {
    _common: Common<'d, PIO0>,
    sm: StateMachine<'d, PIO0, CAPTURE_PIO_SM>,
    dma: PeripheralRef<'d, D>,
}

impl<'d, D: Channel> PioCapture<'d, D> {
    pub fn new(
        mut common: Common<'d, PIO0>,
        mut sm: StateMachine<'d, PIO0, CAPTURE_PIO_SM>,
        data_pin: impl Peripheral<P = impl PioPin> + 'd,
        clock_pin: impl Peripheral<P = impl PioPin> + 'd,
        dma: impl Peripheral<P = D> + 'd,
    ) -> Self {
        into_ref!(dma);

        let program = pio_proc::pio_asm!(
            ".wrap_target",
            "    wait 0 pin 1",
            "    wait 1 pin 1",
            "    in pins, 1",
            ".wrap",
        );

        let data = common.make_pio_pin(data_pin);
        let clock = common.make_pio_pin(clock_pin);
        sm.set_pin_dirs(Direction::In, &[&data, &clock]);

        let mut config = Config::default();
        config.use_program(&common.load_program(&program.program), &[]);
        config.set_in_pins(&[&data, &clock]);
        config.shift_in = ShiftConfig {
            auto_fill: true,
            threshold: 32,
            direction: ShiftDirection::Right,
        };
        config.fifo_join = FifoJoin::RxOnly;
        sm.set_config(&config);

        crate::info!("capture: PIO0 SM{} + DMA CH{}", CAPTURE_PIO_SM, dma.number());
        Self {
            _common: common,
            sm,
            dma,
        }
    }

    fn rx_fifo_addr() -> *const u32 {
        pac::PIO0.rxf(CAPTURE_PIO_SM).as_ptr() as *const u32
    }
}

impl<'d, D: Channel> CaptureChannel for PioCapture<'d, D> {
    fn reset(&mut self) {
        self.sm.set_enable(false);
        self.sm.clear_fifos();
        self.sm.restart();
    }

    unsafe fn start_transfer(&mut self, dest: *mut u32, word_count: usize) {
        let regs = self.dma.regs();
        regs.read_addr().write_value(Self::rx_fifo_addr() as u32);
        regs.write_addr().write_value(dest as u32);
        regs.trans_count().write_value(word_count as u32);
        compiler_fence(Ordering::SeqCst);
        regs.ctrl_trig().write(|w| {
            w.set_treq_sel(pac::dma::vals::TreqSel::from(
                CAPTURE_DREQ_PIO0_RX0 + CAPTURE_PIO_SM as u8,
            ));
            w.set_data_size(pac::dma::vals::DataSize::SIZE_WORD);
            w.set_incr_read(false);
            w.set_incr_write(true);
            w.set_chain_to(self.dma.number());
            w.set_en(true);
        });
        compiler_fence(Ordering::SeqCst);
        // sampling starts only once the channel drains the FIFO
        self.sm.set_enable(true);
    }

    fn is_busy(&self) -> bool {
        self.dma.regs().ctrl_trig().read().busy()
    }

    fn abort(&mut self) {
        self.sm.set_enable(false);
        pac::DMA
            .chan_abort()
            .modify(|m| m.set_chan_abort(1 << self.dma.number()));
        while self.dma.regs().ctrl_trig().read().busy() {}
        compiler_fence(Ordering::SeqCst);
    }
}
