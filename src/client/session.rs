// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{info, warn};

use crate::{
    cfg::config::Config,
    client::discovery::{ChangerInfo, DeviceProvider},
    control_block::test_unit_ready::fill_test_unit_ready,
    errors::{ChangerError, Result},
    models::command::{CommandReply, CommandRequest},
    transport::Transport,
};

/// One open changer session: the active transport plus the configuration
/// that governs every exchange on it.
///
/// Single logical session, single outstanding command: callers serialize
/// access and the engine fully awaits each result before issuing the next
/// request. The transport is released exactly once when the session drops.
pub struct ChangerSession {
    transport: Transport,
    config: Config,
}

impl ChangerSession {
    /// Wrap an already-established transport.
    pub fn from_transport(transport: Transport, config: Config) -> Self {
        if !transport.has_exclusive_access() {
            // Shared access still works; concurrent host I/O may interleave.
            warn!(
                transport = transport.name(),
                "could not obtain exclusive device access, proceeding shared"
            );
        }
        Self { transport, config }
    }

    /// Enumerate, pick, and open a changer through the platform provider.
    ///
    /// Device identity pinned in the config must match unless `force` is
    /// set; after open the device is probed with TEST UNIT READY unless
    /// `skip_ready_probe` or `force` disables the gate.
    pub async fn open(provider: &dyn DeviceProvider, config: Config) -> Result<Self> {
        let devices = provider.enumerate()?;
        let info = pick_device(&devices, &config)?;

        let transport = provider.open(info)?;
        info!(
            vendor = %info.vendor,
            product = %info.product,
            transport = transport.name(),
            "attached to changer"
        );

        let session = Self::from_transport(transport, config);
        if !session.config.device.skip_ready_probe && !session.config.device.force {
            session.test_unit_ready().await?;
        }
        Ok(session)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one request, surfacing the reply whatever its task status.
    pub async fn execute(&self, req: CommandRequest) -> Result<CommandReply> {
        self.transport.execute(req).await
    }

    /// Execute one request and require a good task status.
    pub async fn run(&self, req: CommandRequest) -> Result<CommandReply> {
        self.transport.execute_good(req).await
    }

    /// TEST UNIT READY probe.
    pub async fn test_unit_ready(&self) -> Result<()> {
        let mut cdb = [0u8; 16];
        let len = fill_test_unit_ready(&mut cdb);
        self.run(CommandRequest::non_data(cdb, len, self.config.timeouts.command))
            .await?;
        Ok(())
    }

    /// Release the session. Dropping has the same effect; this form makes
    /// the single release explicit at call sites.
    pub fn close(self) {}
}

fn pick_device<'a>(
    devices: &'a [ChangerInfo],
    config: &Config,
) -> Result<&'a ChangerInfo> {
    if devices.is_empty() {
        return Err(ChangerError::NotFound("no changer devices"));
    }
    if config.device.force {
        return Ok(&devices[0]);
    }

    let matches = |info: &ChangerInfo| {
        config
            .device
            .vendor
            .as_deref()
            .is_none_or(|v| v == info.vendor)
            && config
                .device
                .product
                .as_deref()
                .is_none_or(|p| p == info.product)
    };

    devices
        .iter()
        .find(|info| matches(info))
        .ok_or(ChangerError::NotFound(
            "no changer matching the configured identity",
        ))
}
