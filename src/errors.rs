// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use thiserror::Error;

use crate::models::{command::TaskStatus, sense_data::SenseData};

/// Every fallible operation in this crate resolves to one of these.
///
/// Hardware-facing failures are local: nothing is retried automatically
/// except the documented kind-scoped READ ELEMENT STATUS fallback in the
/// topology module. Partial multi-step move sequences leave the device in
/// whatever physical state the last successful move produced.
#[derive(Debug, Error)]
pub enum ChangerError {
    /// A caller-supplied argument was structurally invalid (zero index,
    /// empty CDB, oversized allocation).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A 1-based element index exceeded the freshly fetched topology.
    #[error("{kind} index {index} out of range (topology has {count})")]
    OutOfRange {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    /// A required device or element does not exist.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// The topology contains no transport element to move media with.
    #[error("no transport element reported by the device")]
    NoTransport,

    /// READ ELEMENT STATUS produced an empty report for every element kind.
    #[error("device reported no elements")]
    NoElementsReported,

    /// The completion callback never fired before the deadline.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The device completed the command with a non-good task status (or a
    /// non-normal SBP-2 completion), with decoded sense when available.
    #[error("device rejected command: {status:?}{}", format_sense(.sense))]
    HardwareRejected {
        status: TaskStatus,
        sense: Option<SenseData>,
    },

    /// A response buffer violated the structure the command mandates.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The source slot holds no medium and the drive's occupant did not
    /// originate there.
    #[error("source slot is empty")]
    EmptySource,

    /// The drive holds a medium but reports no valid source address, so the
    /// swap destination cannot be determined.
    #[error("drive holds a medium with no recorded source slot")]
    UnknownSource,

    /// Session establishment on the chosen transport failed.
    #[error("failed to open device session: {0}")]
    OpenFailed(String),

    /// A runtime worker failed outside the protocol itself.
    #[error("transport worker failed: {0}")]
    Internal(String),
}

fn format_sense(sense: &Option<SenseData>) -> String {
    match sense {
        Some(s) => format!(
            ", sense key {:#x} asc/ascq {:#04x}/{:#04x} ({})",
            s.sense_key,
            s.asc,
            s.ascq,
            s.description()
        ),
        None => String::new(),
    }
}

pub type Result<T, E = ChangerError> = std::result::Result<T, E>;
