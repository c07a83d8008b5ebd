/* Drive geometry (CDC 9762 SMD) */

/// Number of data heads
pub const DRIVE_HEAD_COUNT: u8 = 5;
/// Spindle speed (3600 rpm)
pub const DRIVE_REVOLUTIONS_PER_SECOND: u64 = 60;
/// One revolution in microseconds (~16.7ms)
pub const DRIVE_REVOLUTION_US: u64 = 1_000_000 / DRIVE_REVOLUTIONS_PER_SECOND;
/// Width of the parallel value bus
pub const VALUE_BUS_BITS: u32 = 10;
/// Largest value the bus can carry (cylinder, head, tag3 control word)
pub const VALUE_BUS_MAX: u16 = (1 << VALUE_BUS_BITS) - 1;

/* Tag/strobe timing */

/// Hold time for a pulsed tag
pub const TAG_STROBE_US: u32 = 10;
/// Delay after tag1 before ON CYLINDER / SEEK END are trusted to have dropped
pub const SEEK_SETTLE_US: u32 = 1_000;
/// Granularity of every bounded line wait
pub const LINE_POLL_INTERVAL_US: u32 = 1;

/* Timeouts */

/// Unit select -> UNIT SELECTED
pub const UNIT_SELECT_TIMEOUT_US: u64 = 100_000;
/// Seek -> ON CYLINDER and SEEK END
pub const SEEK_TIMEOUT_US: u64 = 500_000;
/// Index has to fall within 1/10 revolution
pub const INDEX_FALL_TIMEOUT_US: u64 = DRIVE_REVOLUTION_US / 10;
/// Index has to rise within 3 revolutions
pub const INDEX_RISE_TIMEOUT_US: u64 = DRIVE_REVOLUTION_US * 3;
/// Retry interval while a batch read waits for a free buffer
pub const BUFFER_WAIT_RETRY_US: u32 = 5;
/// Give up waiting for a free buffer after 10s
pub const BUFFER_WAIT_TIMEOUT_US: u64 = 10_000_000;
/// Capture that has not finished after this long is abandoned
pub const CAPTURE_TIMEOUT_US: u64 = 1_000_000;

/* Jobs */

/// Blink test: number of on/off cycles
pub const BLINK_TEST_COUNT: usize = 15;
/// Blink test: half period (on time == off time)
pub const BLINK_TEST_HALF_PERIOD_US: u32 = 50_000;
/// First serial number handed out to single reads (`custom0001.nrz`)
pub const READ_DATA_FIRST_SERIAL: u32 = 1;

/* Buffers */

/// Maximum length of a buffer filename label
pub const BUFFER_FILENAME_MAX_LENGTH: usize = 64;

/* Status monitor */

/// Status heartbeat interval while subscribed (60Hz)
pub const STATUS_HEARTBEAT_US: u64 = 1_000_000 / 60;
