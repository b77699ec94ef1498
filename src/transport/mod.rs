//! This module abstracts command execution over the two physical-bus
//! variants: a synchronous block-command executor and an asynchronous
//! SBP-2 packet executor.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// The asynchronous, callback-driven SBP-2 packet transport.
pub mod sbp2;
/// The synchronous blocking block-command transport.
pub mod sync;

use core::fmt;

pub use sbp2::{OrbCompletion, PacketCommandPort, PacketStatus, SbpTransport};
pub use sync::{BlockCommandDevice, SyncTransport};

use crate::{
    errors::Result,
    models::command::{CommandReply, CommandRequest},
};

/// The two command-execution paths a changer session can ride on.
///
/// Exactly two variants exist and each has materially different
/// resource-release steps, so this is a closed union rather than a trait
/// object. Release happens exactly once, on drop of the variant.
pub enum Transport {
    Sync(SyncTransport),
    Sbp2(SbpTransport),
}

impl Transport {
    /// Execute one command and fully await its result (or timeout). The
    /// engine never pipelines: callers issue the next request only after
    /// this resolves.
    pub async fn execute(&self, req: CommandRequest) -> Result<CommandReply> {
        match self {
            Transport::Sync(t) => t.execute(req).await,
            Transport::Sbp2(t) => t.execute(req).await,
        }
    }

    /// Execute and require a good task status.
    pub async fn execute_good(&self, req: CommandRequest) -> Result<CommandReply> {
        self.execute(req).await?.into_good()
    }

    /// Whether the session holds exclusive device access. Shared access is
    /// a degraded mode, not a failure.
    pub fn has_exclusive_access(&self) -> bool {
        match self {
            Transport::Sync(t) => t.has_exclusive_access(),
            // SBP-2 logins are requested with the exclusive flag.
            Transport::Sbp2(_) => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transport::Sync(_) => "block-command",
            Transport::Sbp2(_) => "sbp2",
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transport").field(&self.name()).finish()
    }
}

impl From<SyncTransport> for Transport {
    fn from(t: SyncTransport) -> Self {
        Transport::Sync(t)
    }
}

impl From<SbpTransport> for Transport {
    fn from(t: SbpTransport) -> Self {
        Transport::Sbp2(t)
    }
}
