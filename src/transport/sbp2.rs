// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The asynchronous transport variant. An SBP-2 command is an ORB
//! (operation request block) submitted to the login facility; the host
//! rings a doorbell register and the completion arrives later through a
//! status callback. This module reframes that as a blocking call: submit,
//! ring, then pump the host's single-threaded event dispatcher in bounded
//! slices until the callback fires or the deadline elapses.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::BytesMut;
use tokio::{sync::oneshot, task};
use tracing::{debug, warn};

use crate::{
    errors::{ChangerError, Result},
    models::command::{CommandReply, CommandRequest, DataDirection, TaskStatus},
};

/// Upper bound of one event-pump slice. The overall deadline is honored to
/// within one slice.
pub const POLL_SLICE: Duration = Duration::from_millis(100);

/// How one ORB completed at the SBP-2 layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    /// `kFWSBP2NormalCommandStatus` — the command ran to completion.
    Normal,
    /// Any other notification event, with the status block's sbpStatus and
    /// details bytes when the message carried one.
    Failed { sbp_status: u8, details: u8 },
}

/// Delivered through the completion sink when the host's status callback
/// fires. Returns buffer ownership to the transport.
#[derive(Debug)]
pub struct OrbCompletion {
    pub status: PacketStatus,
    pub buffer: BytesMut,
}

/// Contract of the host's SBP-2 login facility.
///
/// One request is in flight at a time; `submit` hands the data buffer and
/// a completion sink to the facility, `ring_doorbell` triggers
/// transmission, and `pump_events` runs the host dispatcher for at most
/// one bounded slice so queued callbacks (including the completion) can
/// fire. `release_request` frees the in-flight ORB and its mapped buffers;
/// the transport calls it after every exchange, fired or timed out.
pub trait PacketCommandPort: Send + Sync {
    fn submit(
        &self,
        cdb: &[u8],
        direction: DataDirection,
        buffer: BytesMut,
        completion: oneshot::Sender<OrbCompletion>,
    ) -> Result<()>;

    fn ring_doorbell(&self) -> Result<()>;

    fn pump_events(&self, slice: Duration);

    fn release_request(&self);

    /// Submit the SBP-2 logout. Called exactly once when the transport is
    /// dropped.
    fn logout(&self);
}

/// The asynchronous transport variant.
pub struct SbpTransport {
    port: Arc<dyn PacketCommandPort>,
}

impl SbpTransport {
    pub fn new(port: Arc<dyn PacketCommandPort>) -> Self {
        Self { port }
    }

    pub async fn execute(&self, req: CommandRequest) -> Result<CommandReply> {
        let (tx, mut rx) = oneshot::channel();

        let CommandRequest {
            cdb,
            cdb_len,
            direction,
            buffer,
            timeout,
        } = req;
        let data_len = buffer.len() as u64;

        self.port.submit(&cdb[..cdb_len], direction, buffer, tx)?;
        self.port.ring_doorbell()?;

        let deadline = Instant::now() + timeout;
        let completion = loop {
            match rx.try_recv() {
                Ok(completion) => break completion,
                Err(oneshot::error::TryRecvError::Empty) => {},
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.port.release_request();
                    return Err(ChangerError::Internal(
                        "completion sink dropped without firing".into(),
                    ));
                },
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // The callback never fired; still free the ORB resources.
                self.port.release_request();
                return Err(ChangerError::Timeout(timeout));
            }

            let slice = remaining.min(POLL_SLICE);
            let port = Arc::clone(&self.port);
            task::spawn_blocking(move || port.pump_events(slice))
                .await
                .map_err(|e| {
                    ChangerError::Internal(format!("event pump task failed: {e}"))
                })?;
        };

        self.port.release_request();

        match completion.status {
            PacketStatus::Normal => {
                let transferred = match direction {
                    DataDirection::None => 0,
                    _ => data_len,
                };
                if transferred > 0 {
                    debug!(transferred, "sbp2 data phase done");
                }
                Ok(CommandReply {
                    status: TaskStatus::Good,
                    sense: None,
                    transferred,
                    buffer: completion.buffer,
                })
            },
            PacketStatus::Failed {
                sbp_status,
                details,
            } => {
                warn!(sbp_status, details, "sbp2 command completed abnormally");
                Err(ChangerError::HardwareRejected {
                    status: TaskStatus::Other(sbp_status),
                    sense: None,
                })
            },
        }
    }
}

impl Drop for SbpTransport {
    fn drop(&mut self) {
        self.port.logout();
    }
}
