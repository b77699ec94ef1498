// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, Mutex};

use tokio::task;
use tracing::{debug, warn};

use crate::{
    errors::{ChangerError, Result},
    models::command::{CommandReply, CommandRequest, DataDirection, TaskOutcome},
};

/// Contract of the host's synchronous block-command facility.
///
/// Implementations block the calling thread until the hardware signals
/// completion or the per-command timeout expires, and must honor the
/// timeout: exceeding it yields an error, never an indefinite block.
pub trait BlockCommandDevice: Send {
    /// Execute one CDB with an optional data phase into `buffer`.
    fn execute(
        &mut self,
        cdb: &[u8],
        direction: DataDirection,
        buffer: &mut [u8],
        timeout: std::time::Duration,
    ) -> Result<TaskOutcome>;

    /// Whether exclusive device access was obtained when the device was
    /// opened. Shared access degrades but does not fail the session.
    fn has_exclusive_access(&self) -> bool {
        true
    }

    /// Release exclusive access and close the facility. Idempotent; the
    /// transport calls it exactly once when it is dropped.
    fn release(&mut self) {}
}

/// The synchronous transport variant: submit, block, inspect task status.
///
/// The blocking call runs on the runtime's blocking pool so the protocol
/// engine keeps its async surface.
pub struct SyncTransport {
    device: Arc<Mutex<Box<dyn BlockCommandDevice>>>,
}

impl SyncTransport {
    pub fn new(device: Box<dyn BlockCommandDevice>) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }

    pub fn has_exclusive_access(&self) -> bool {
        self.device
            .lock()
            .map(|d| d.has_exclusive_access())
            .unwrap_or(false)
    }

    pub async fn execute(&self, req: CommandRequest) -> Result<CommandReply> {
        let device = Arc::clone(&self.device);

        let CommandRequest {
            cdb,
            cdb_len,
            direction,
            mut buffer,
            timeout,
        } = req;

        let reply = task::spawn_blocking(move || -> Result<CommandReply> {
            let mut guard = device
                .lock()
                .map_err(|_| ChangerError::Internal("device mutex poisoned".into()))?;
            let outcome =
                guard.execute(&cdb[..cdb_len], direction, &mut buffer, timeout)?;
            Ok(CommandReply {
                status: outcome.status,
                sense: outcome.sense,
                transferred: outcome.transferred,
                buffer,
            })
        })
        .await
        .map_err(|e| ChangerError::Internal(format!("blocking task failed: {e}")))??;

        if reply.status.is_good() {
            if reply.transferred > 0 {
                debug!(transferred = reply.transferred, "command data phase done");
            }
        } else {
            warn!(
                status = ?reply.status,
                sense = ?reply.sense,
                "device returned non-good task status"
            );
        }

        Ok(reply)
    }
}

impl Drop for SyncTransport {
    fn drop(&mut self) {
        if let Ok(mut device) = self.device.lock() {
            device.release();
        }
    }
}
