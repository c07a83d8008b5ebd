/* System Setup */

/// Core1 (drive execution context) stack size
pub const CORE1_STACK_SIZE: usize = 16 * 1024;

/// Control loop -> USB writer reply channel size
pub const CHANNEL_REPLY_N: usize = 8;

/// Control loop housekeeping interval (status monitor, buffer drain, job polling)
pub const HOUSEKEEPING_INTERVAL_US: u64 = 100;

/* Buffer Pool */

/// Number of capture buffers
pub const CAPTURE_BUFFER_COUNT: usize = 4;
/// Capture buffer size in bytes (one track plus margin)
pub const CAPTURE_BUFFER_SIZE: usize = 40 * 1024;

/* USB Setup */

/// USB device vendor ID
pub const USB_VID: u16 = 0xc0de;
/// USB device product ID
pub const USB_PID: u16 = 0xcafe;
/// USB device manufacturer string
pub const USB_MANUFACTURER: &str = "smdread";
/// USB device product string
pub const USB_PRODUCT: &str = "smd drive reader";
/// USB device serial number string
pub const USB_SERIAL_NUMBER: &str = "smdread0001";
/// USB device maximum power consumption in mA
pub const USB_MAX_POWER: u16 = 100;
/// USB device maximum packet size
pub const USB_MAX_PACKET_SIZE: usize = 64;

/* Host Link */

/// Longest command line accepted from the host
pub const HOST_LINE_MAX_LENGTH: usize = 256;
/// Longest reply line sent to the host
pub const HOST_REPLY_MAX_LENGTH: usize = 256;
/// Maximum number of numeric arguments in a command
pub const HOST_ARGS_MAX: usize = 6;

/* Pin Assign */

// | GPIO  | Dir | Function                        |
// | ----- | --- | ------------------------------- |
// | 0..9  | out | value bus bit 0..9              |
// | 10    | out | unit select tag                 |
// | 11    | out | tag 1 (cylinder)                |
// | 12    | out | tag 2 (head)                    |
// | 13    | out | tag 3 (control)                 |
// | 14    | in  | fault                           |
// | 15    | in  | seek error                      |
// | 16    | in  | unit ready                      |
// | 17    | in  | unit selected                   |
// | 18    | in  | on cylinder                     |
// | 19    | in  | seek end                        |
// | 20    | in  | index                           |
// | 21    | in  | read data (PIO in base)         |
// | 22    | in  | read clock (PIO in base + 1)    |
// | 25    | out | LED                             |

/// Status line names in `DriveStatus` bit order
pub const STATUS_LINE_NAMES: [&str; 7] = [
    "FAULT",
    "SEEK_ERROR",
    "UNIT_READY",
    "UNIT_SELECTED",
    "ON_CYLINDER",
    "SEEK_END",
    "INDEX",
];

/* Capture */

/// PIO0 state machine used by the clocked read program
pub const CAPTURE_PIO_SM: usize = 0;
/// DREQ number of PIO0 RX FIFO 0 (PIO0 TX0..3 are 0..3, RX0..3 are 4..7)
pub const CAPTURE_DREQ_PIO0_RX0: u8 = 4;
