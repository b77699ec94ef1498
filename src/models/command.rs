// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, time::Duration};

use bytes::BytesMut;

use crate::models::sense_data::SenseData;

/// Direction of the data phase for one command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    None,
    /// Device-to-host (read-like commands).
    FromDevice,
    /// Host-to-device.
    ToDevice,
}

/// SAM task status byte returned by the device for one command.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Good,
    CheckCondition,
    ConditionMet,
    Busy,
    ReservationConflict,
    TaskSetFull,
    AcaActive,
    TaskAborted,
    Other(u8),
}

impl TaskStatus {
    #[inline]
    pub fn is_good(self) -> bool {
        matches!(self, TaskStatus::Good)
    }

    pub fn raw(self) -> u8 {
        match self {
            TaskStatus::Good => 0x00,
            TaskStatus::CheckCondition => 0x02,
            TaskStatus::ConditionMet => 0x04,
            TaskStatus::Busy => 0x08,
            TaskStatus::ReservationConflict => 0x18,
            TaskStatus::TaskSetFull => 0x28,
            TaskStatus::AcaActive => 0x30,
            TaskStatus::TaskAborted => 0x40,
            TaskStatus::Other(v) => v,
        }
    }
}

impl From<u8> for TaskStatus {
    fn from(v: u8) -> Self {
        match v {
            0x00 => TaskStatus::Good,
            0x02 => TaskStatus::CheckCondition,
            0x04 => TaskStatus::ConditionMet,
            0x08 => TaskStatus::Busy,
            0x18 => TaskStatus::ReservationConflict,
            0x28 => TaskStatus::TaskSetFull,
            0x30 => TaskStatus::AcaActive,
            0x40 => TaskStatus::TaskAborted,
            other => TaskStatus::Other(other),
        }
    }
}

impl fmt::Debug for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TaskStatus::Good => write!(f, "Good"),
            TaskStatus::CheckCondition => write!(f, "CheckCondition"),
            TaskStatus::ConditionMet => write!(f, "ConditionMet"),
            TaskStatus::Busy => write!(f, "Busy"),
            TaskStatus::ReservationConflict => write!(f, "ReservationConflict"),
            TaskStatus::TaskSetFull => write!(f, "TaskSetFull"),
            TaskStatus::AcaActive => write!(f, "AcaActive"),
            TaskStatus::TaskAborted => write!(f, "TaskAborted"),
            TaskStatus::Other(v) => write!(f, "Other({v:#04x})"),
        }
    }
}

/// The unit of work both transports accept: a CDB, a data phase, a buffer,
/// and a deadline. It has no identity beyond one exchange.
#[derive(Debug)]
pub struct CommandRequest {
    pub cdb: [u8; 16],
    pub cdb_len: usize,
    pub direction: DataDirection,
    pub buffer: BytesMut,
    pub timeout: Duration,
}

impl CommandRequest {
    /// A command with no data phase.
    pub fn non_data(cdb: [u8; 16], cdb_len: usize, timeout: Duration) -> Self {
        Self {
            cdb,
            cdb_len,
            direction: DataDirection::None,
            buffer: BytesMut::new(),
            timeout,
        }
    }

    /// A device-to-host command with a zeroed buffer of `allocation` bytes.
    pub fn read(
        cdb: [u8; 16],
        cdb_len: usize,
        allocation: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            cdb,
            cdb_len,
            direction: DataDirection::FromDevice,
            buffer: BytesMut::zeroed(allocation),
            timeout,
        }
    }

    #[inline]
    pub fn cdb_bytes(&self) -> &[u8] {
        &self.cdb[..self.cdb_len]
    }
}

/// What the device executed on behalf of the request: status, optional
/// sense, and the diagnostic transferred-byte count. The transport hands
/// the data buffer back to the caller through this.
#[derive(Debug)]
pub struct CommandReply {
    pub status: TaskStatus,
    pub sense: Option<SenseData>,
    pub transferred: u64,
    pub buffer: BytesMut,
}

impl CommandReply {
    /// Maps a non-good task status to [`ChangerError::HardwareRejected`].
    pub fn into_good(self) -> Result<Self, crate::errors::ChangerError> {
        if self.status.is_good() {
            Ok(self)
        } else {
            Err(crate::errors::ChangerError::HardwareRejected {
                status: self.status,
                sense: self.sense,
            })
        }
    }
}

/// Outcome of one blocking device execution, before the transport attaches
/// the data buffer.
#[derive(Debug)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub sense: Option<SenseData>,
    pub transferred: u64,
}
