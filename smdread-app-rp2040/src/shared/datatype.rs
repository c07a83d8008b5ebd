use heapless::Vec;
use serde::{Deserialize, Serialize};

use smdread_core::batch::{BatchRead, OffsetSpec};
use smdread_core::buffer::BufferFilename;
use smdread_core::engine::{JobReport, LaunchError};
use smdread_core::job::Job;
use smdread_core::lines::Tag;
use smdread_core::monitor::StatusEvent;

use crate::shared::constant::*;

/// One line from the host: `{"cmd":"select_cylinder","args":[10]}`
#[derive(Deserialize, Debug)]
pub struct HostRequest<'a> {
    pub cmd: &'a str,
    #[serde(default)]
    pub args: Vec<i32, HOST_ARGS_MAX>,
}

/// Command line rejected before anything was launched
#[derive(Copy, Clone, Eq, PartialEq, Debug, defmt::Format)]
pub enum HostError {
    /// Not a JSON request object
    Syntax,
    UnknownCommand,
    MissingArgument,
    /// Argument does not fit its field
    ArgumentRange,
    /// Rejected by the job validation
    InvalidJob,
    /// Every capture buffer is in use
    NoBuffer,
}

impl HostError {
    pub fn reason(&self) -> &'static str {
        match self {
            HostError::Syntax => "syntax",
            HostError::UnknownCommand => "unknown command",
            HostError::MissingArgument => "missing argument",
            HostError::ArgumentRange => "argument out of range",
            HostError::InvalidJob => "invalid job arguments",
            HostError::NoBuffer => "no buffer available",
        }
    }
}

impl From<LaunchError> for HostError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Argument(_) => HostError::InvalidJob,
            LaunchError::NoBuffer => HostError::NoBuffer,
        }
    }
}

/// Decoded host command
#[derive(Copy, Clone, Eq, PartialEq, Debug, defmt::Format)]
pub enum HostCommand {
    /// Hand a job to the drive context
    Launch(Job),
    /// Allocate a buffer, then launch a single read into it
    ReadData {
        word_count: usize,
        index_sync: bool,
        skip_checks: bool,
    },
    Terminate,
    Poll,
    SubscribeStatus(bool),
    StatusNames,
}

impl HostCommand {
    /// Decode one command line (without the line terminator)
    pub fn parse(line: &[u8]) -> Result<Self, HostError> {
        let (request, _) = serde_json_core::from_slice::<HostRequest>(line)
            .map_err(|_| HostError::Syntax)?;
        request.command()
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostCommand::Launch(job) => job.name(),
            HostCommand::ReadData { .. } => "read_data",
            HostCommand::Terminate => "terminate",
            HostCommand::Poll => "poll",
            HostCommand::SubscribeStatus(_) => "subscribe_status",
            HostCommand::StatusNames => "status_names",
        }
    }
}

impl<'a> HostRequest<'a> {
    fn arg(&self, index: usize) -> Result<i32, HostError> {
        self.args
            .get(index)
            .copied()
            .ok_or(HostError::MissingArgument)
    }

    fn arg_as<T: TryFrom<i32>>(&self, index: usize) -> Result<T, HostError> {
        T::try_from(self.arg(index)?).map_err(|_| HostError::ArgumentRange)
    }

    fn flag(&self, index: usize) -> Result<bool, HostError> {
        Ok(self.arg(index)? != 0)
    }

    pub fn command(&self) -> Result<HostCommand, HostError> {
        let command = match self.cmd {
            "blink_test" => HostCommand::Launch(Job::BlinkTest {
                fail: self.flag(0)?,
            }),
            "raw_tag" => {
                let tag = Tag::try_from(self.arg_as::<u8>(0)?)
                    .map_err(|_| HostError::ArgumentRange)?;
                HostCommand::Launch(Job::RawTag {
                    tag,
                    value: self.arg_as(1)?,
                })
            }
            "rtz" => HostCommand::Launch(Job::ReturnToZero),
            "select_unit0" => HostCommand::Launch(Job::SelectUnit0),
            "select_cylinder" => HostCommand::Launch(Job::SelectCylinder {
                cylinder: self.arg_as(0)?,
            }),
            "select_head" => HostCommand::Launch(Job::SelectHead {
                head: self.arg_as(0)?,
            }),
            "tag3_strobe" => HostCommand::Launch(Job::Tag3Strobe {
                ctrl: self.arg_as(0)?,
            }),
            "read_enable" => HostCommand::Launch(Job::ReadEnable {
                servo_offset: self.arg(0)?.signum() as i8,
                data_strobe_delay: self.arg(1)?.signum() as i8,
            }),
            "read_data" => HostCommand::ReadData {
                word_count: self.arg_as(0)?,
                index_sync: self.flag(1)?,
                skip_checks: self.flag(2)?,
            },
            "read_batch" => HostCommand::Launch(Job::ReadBatch(BatchRead {
                cylinder_first: self.arg_as(0)?,
                cylinder_last: self.arg_as(1)?,
                head_set: self.arg_as(2)?,
                words_per_track: self.arg_as(3)?,
                servo_offset: OffsetSpec::from_raw(self.arg(4)?),
                data_strobe_delay: OffsetSpec::from_raw(self.arg(5)?),
            })),
            "terminate" => HostCommand::Terminate,
            "poll" => HostCommand::Poll,
            "subscribe_status" => HostCommand::SubscribeStatus(self.flag(0)?),
            "status_names" => HostCommand::StatusNames,
            _ => return Err(HostError::UnknownCommand),
        };
        Ok(command)
    }
}

/// One reply line to the host, tagged by `type`
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Command accepted
    Ack { cmd: &'static str },
    /// Command rejected
    Nak { reason: &'static str },
    /// Job report, sent on `poll` and when a polled job finishes
    Job {
        generation: u32,
        status: u8,
        duration_us: Option<u64>,
    },
    /// Status lines changed
    Status { at_us: u64, lines: u16 },
    Heartbeat { at_us: u64 },
    StatusNames { names: &'static [&'static str] },
    /// A drained buffer; `size` raw bytes follow the line
    Buffer {
        filename: BufferFilename,
        size: usize,
    },
}

impl Reply {
    /// Serialize as one `\n` terminated JSON line, returns the line length
    pub fn encode(&self, line: &mut [u8; HOST_REPLY_MAX_LENGTH]) -> Option<usize> {
        let len = serde_json_core::to_slice(self, &mut line[..HOST_REPLY_MAX_LENGTH - 1]).ok()?;
        line[len] = b'\n';
        Some(len + 1)
    }
}

impl From<HostError> for Reply {
    fn from(err: HostError) -> Self {
        Reply::Nak {
            reason: err.reason(),
        }
    }
}

impl From<JobReport> for Reply {
    fn from(report: JobReport) -> Self {
        Reply::Job {
            generation: report.generation,
            status: report.status.code(),
            duration_us: report.duration_us,
        }
    }
}

impl From<StatusEvent> for Reply {
    fn from(event: StatusEvent) -> Self {
        match event {
            StatusEvent::Changed { at_us, status } => Reply::Status {
                at_us,
                lines: status.bits(),
            },
            StatusEvent::Heartbeat { at_us } => Reply::Heartbeat { at_us },
        }
    }
}
