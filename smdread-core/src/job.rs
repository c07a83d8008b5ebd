use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::batch::BatchRead;
use crate::buffer::BufferId;
use crate::config::{DRIVE_HEAD_COUNT, VALUE_BUS_MAX};
use crate::drive::DriveError;
use crate::lines::Tag;

/// One unit of drive work, with its arguments
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Job {
    /// Blink the LED, then finish DONE or, with `fail`, ERROR(TestFailure)
    BlinkTest { fail: bool },
    SelectUnit0,
    SelectCylinder { cylinder: u16 },
    SelectHead { head: u8 },
    /// Pulse tag 3 with an arbitrary control word
    Tag3Strobe { ctrl: u16 },
    /// Assert the read gate and leave it asserted
    ReadEnable { servo_offset: i8, data_strobe_delay: i8 },
    /// Capture one track into an already allocated buffer
    ReadData {
        buffer: BufferId,
        word_count: usize,
        index_sync: bool,
        skip_checks: bool,
    },
    ReadBatch(BatchRead),
    /// Pulse any tag with an arbitrary bus value
    RawTag { tag: Tag, value: u16 },
    ReturnToZero,
}

/// Argument rejected at launch
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobArgError {
    /// Value does not fit the 10-bit bus
    BusValue,
    /// Head number beyond the drive head count
    Head,
    /// Empty or reversed cylinder range
    CylinderRange,
    /// No head selected
    HeadSet,
}

impl Job {
    /// Short name for logs and host replies
    pub fn name(&self) -> &'static str {
        match self {
            Job::BlinkTest { .. } => "blink_test",
            Job::SelectUnit0 => "select_unit0",
            Job::SelectCylinder { .. } => "select_cylinder",
            Job::SelectHead { .. } => "select_head",
            Job::Tag3Strobe { .. } => "tag3_strobe",
            Job::ReadEnable { .. } => "read_enable",
            Job::ReadData { .. } => "read_data",
            Job::ReadBatch(_) => "read_batch",
            Job::RawTag { .. } => "raw_tag",
            Job::ReturnToZero => "return_to_zero",
        }
    }

    /// Check the arguments before the job is handed to the drive context
    pub fn validate(&self) -> Result<(), JobArgError> {
        match *self {
            Job::SelectCylinder { cylinder } if cylinder > VALUE_BUS_MAX => {
                Err(JobArgError::BusValue)
            }
            Job::Tag3Strobe { ctrl } if ctrl > VALUE_BUS_MAX => Err(JobArgError::BusValue),
            Job::RawTag { value, .. } if value > VALUE_BUS_MAX => Err(JobArgError::BusValue),
            Job::SelectHead { head } if head >= DRIVE_HEAD_COUNT => Err(JobArgError::Head),
            Job::ReadBatch(batch) => batch.validate(),
            _ => Ok(()),
        }
    }

    /// Whether the drive outputs left by a previous job that halted by
    /// itself stay asserted when this job starts. A job that is torn down
    /// always has its outputs cleared
    ///
    /// Reads rely on a read gate asserted by a previous `ReadEnable`, and
    /// the blink test never touches the drive.
    pub fn keeps_outputs(&self) -> bool {
        matches!(self, Job::ReadData { .. } | Job::BlinkTest { .. })
    }
}

/// Reason a job ended in ERROR
#[derive(Copy, Clone, Eq, PartialEq, Debug, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum JobErrorCode {
    /// FAULT or SEEK ERROR
    DriveError = 16,
    DriveNotReady = 17,
    Timeout = 18,
    /// Blink test asked to fail
    TestFailure = 19,
    /// Torn down by `terminate`
    Terminated = 20,
}

impl From<DriveError> for JobErrorCode {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::Fault => JobErrorCode::DriveError,
            DriveError::NotReady => JobErrorCode::DriveNotReady,
            DriveError::Timeout => JobErrorCode::Timeout,
        }
    }
}

/// Job lifecycle: Idle -> Running -> Done | Error
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobStatus {
    Idle,
    Running,
    Done,
    Error(JobErrorCode),
}

impl JobStatus {
    const IDLE: u8 = 0;
    const RUNNING: u8 = 1;
    const DONE: u8 = 2;

    /// Numeric status code reported to the host
    pub fn code(&self) -> u8 {
        match self {
            JobStatus::Idle => Self::IDLE,
            JobStatus::Running => Self::RUNNING,
            JobStatus::Done => Self::DONE,
            JobStatus::Error(code) => (*code).into(),
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            Self::IDLE => Some(JobStatus::Idle),
            Self::RUNNING => Some(JobStatus::Running),
            Self::DONE => Some(JobStatus::Done),
            _ => JobErrorCode::try_from(code).ok().map(JobStatus::Error),
        }
    }

    /// Done or Error
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error(_))
    }
}

impl From<Result<(), JobErrorCode>> for JobStatus {
    fn from(result: Result<(), JobErrorCode>) -> Self {
        match result {
            Ok(()) => JobStatus::Done,
            Err(code) => JobStatus::Error(code),
        }
    }
}
