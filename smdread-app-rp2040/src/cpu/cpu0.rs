use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;

use crate::task::usb_task::handle_host_link;

/// Control context: host link, status monitor, buffer drain
#[embassy_executor::task]
pub async fn main_task(driver: Driver<'static, USB>) {
    handle_host_link(driver).await;
}
