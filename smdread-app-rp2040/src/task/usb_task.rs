use embassy_futures::join::join3;
use embassy_futures::select::{select, Either};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_time::Timer;
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::driver::{Driver as UsbDriver, EndpointError};
use embassy_usb::{Builder, Config};
use heapless::Vec;

use smdread_core::buffer::BufferId;

use crate::shared::constant::*;
use crate::shared::datatype::{HostCommand, Reply};
use crate::shared::resource::{CHANNEL_REPLY, POOL};
use crate::task::control_task::{dispatch, Housekeeping};

/// Create USB Config
fn create_usb_config<'a>() -> Config<'a> {
    let mut config = Config::new(USB_VID, USB_PID);
    config.manufacturer = Some(USB_MANUFACTURER);
    config.product = Some(USB_PRODUCT);
    config.serial_number = Some(USB_SERIAL_NUMBER);
    config.max_power = USB_MAX_POWER;
    config.max_packet_size_0 = USB_MAX_PACKET_SIZE as u8;

    // CDC-ACM with IAD, for windows
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;
    config
}

/// Write `bytes` as full packets, closing with a short (or zero length) one
async fn write_bytes<'d, D: UsbDriver<'d>>(
    sender: &mut Sender<'d, D>,
    bytes: &[u8],
) -> Result<(), EndpointError> {
    for packet in bytes.chunks(USB_MAX_PACKET_SIZE) {
        sender.write_packet(packet).await?;
    }
    if bytes.len() % USB_MAX_PACKET_SIZE == 0 {
        sender.write_packet(&[]).await?;
    }
    Ok(())
}

async fn write_reply<'d, D: UsbDriver<'d>>(
    sender: &mut Sender<'d, D>,
    reply: &Reply,
) -> Result<(), EndpointError> {
    let mut line = [0u8; HOST_REPLY_MAX_LENGTH];
    match reply.encode(&mut line) {
        Some(len) => write_bytes(sender, &line[..len]).await,
        None => {
            crate::error!("reply does not fit {} bytes", HOST_REPLY_MAX_LENGTH);
            Ok(())
        }
    }
}

/// Stream a TRANSFERRED buffer to the host, then release it
///
/// Each packet is copied out under the pool lock, the lock is never held
/// across a USB write.
async fn write_buffer<'d, D: UsbDriver<'d>>(
    sender: &mut Sender<'d, D>,
    id: BufferId,
) -> Result<(), EndpointError> {
    let size = POOL.lock(|pool| pool.size(id));
    let mut packet = [0u8; USB_MAX_PACKET_SIZE];
    let mut offset = 0;
    let mut result = Ok(());
    while offset < size {
        let len = (size - offset).min(USB_MAX_PACKET_SIZE);
        POOL.lock(|pool| packet[..len].copy_from_slice(&pool.data(id)[offset..offset + len]));
        result = sender.write_packet(&packet[..len]).await;
        if result.is_err() {
            break;
        }
        offset += len;
    }
    if result.is_ok() && size % USB_MAX_PACKET_SIZE == 0 {
        result = sender.write_packet(&[]).await;
    }

    // a broken transfer is not retried, the host asks for a new read
    POOL.lock(|pool| pool.release(id));
    result
}

/// One housekeeping tick: status report, job completion, one buffer drain
async fn housekeeping<'d, D: UsbDriver<'d>>(
    sender: &mut Sender<'d, D>,
    state: &mut Housekeeping,
) -> Result<(), EndpointError> {
    if let Some(reply) = state.status_event() {
        write_reply(sender, &reply).await?;
    }
    if let Some(reply) = state.job_finished() {
        write_reply(sender, &reply).await?;
    }
    if let Some((id, header)) = state.next_written() {
        if let Err(err) = write_reply(sender, &header).await {
            POOL.lock(|pool| pool.release(id));
            return Err(err);
        }
        write_buffer(sender, id).await?;
    }
    Ok(())
}

/// Host -> device: split packets into lines and dispatch each one
async fn command_loop<'d, D: UsbDriver<'d>>(receiver: &mut Receiver<'d, D>) -> ! {
    let mut packet = [0u8; USB_MAX_PACKET_SIZE];
    let mut line: Vec<u8, HOST_LINE_MAX_LENGTH> = Vec::new();
    let mut overflow = false;
    loop {
        receiver.wait_connection().await;
        crate::info!("host connected");
        loop {
            let n = match receiver.read_packet(&mut packet).await {
                Ok(n) => n,
                Err(EndpointError::BufferOverflow) => continue,
                Err(EndpointError::Disabled) => break,
            };
            for &byte in &packet[..n] {
                if byte != b'\n' && byte != b'\r' {
                    overflow |= line.push(byte).is_err();
                    continue;
                }
                if overflow {
                    crate::warn!("command line longer than {} bytes", HOST_LINE_MAX_LENGTH);
                    CHANNEL_REPLY
                        .send(Reply::Nak {
                            reason: "line too long",
                        })
                        .await;
                } else if !line.is_empty() {
                    let reply = match HostCommand::parse(&line) {
                        Ok(command) => dispatch(command),
                        Err(err) => err.into(),
                    };
                    CHANNEL_REPLY.send(reply).await;
                }
                line.clear();
                overflow = false;
            }
        }
        crate::info!("host disconnected");
        line.clear();
        overflow = false;
    }
}

/// Device -> host: replies as they come, housekeeping in between
async fn reply_loop<'d, D: UsbDriver<'d>>(sender: &mut Sender<'d, D>) -> ! {
    let mut state = Housekeeping::new();
    loop {
        sender.wait_connection().await;
        loop {
            let result = match select(
                CHANNEL_REPLY.receive(),
                Timer::after_micros(HOUSEKEEPING_INTERVAL_US),
            )
            .await
            {
                Either::First(reply) => write_reply(sender, &reply).await,
                Either::Second(()) => housekeeping(sender, &mut state).await,
            };
            if result.is_err() {
                break;
            }
        }
    }
}

/// USB CDC-ACM host link
pub async fn handle_host_link(driver: Driver<'static, USB>) {
    crate::info!("Setup USB CDC-ACM host link");
    let config = create_usb_config();

    let mut config_descriptor = [0; 256];
    let mut bos_descriptor = [0; 256];
    let mut msos_descriptor = [0; 256];
    let mut control_buf = [0; 64];
    let mut state = State::new();

    let mut builder = Builder::new(
        driver,
        config,
        &mut config_descriptor,
        &mut bos_descriptor,
        &mut msos_descriptor,
        &mut control_buf,
    );
    let class = CdcAcmClass::new(&mut builder, &mut state, USB_MAX_PACKET_SIZE as u16);
    let (mut sender, mut receiver) = class.split();

    let mut usb = builder.build();
    join3(
        usb.run(),
        command_loop(&mut receiver),
        reply_loop(&mut sender),
    )
    .await;
}
