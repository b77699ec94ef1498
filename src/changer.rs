// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The move orchestrator: load, unload, eject, insert, and retrieve state
//! logic over the single MOVE MEDIUM primitive.
//!
//! Index parameters are 1-based positions in a freshly fetched topology,
//! validated on every call. Multi-step sequences execute their moves
//! strictly in order and abort on the first failure without rolling back:
//! a physical move cannot be undone without re-deriving topology, so the
//! caller re-queries state before retrying.

use std::sync::Arc;

use tokio::task;
use tracing::{debug, info};

use crate::{
    cfg::config::Config,
    client::{
        discovery::{MountObserver, MountedMedia},
        session::ChangerSession,
    },
    control_block::{
        inquiry::{
            InquiryInfo, STANDARD_ALLOC, fill_inquiry_standard, fill_inquiry_vpd,
            parse_inquiry_standard, parse_vpd_payload,
        },
        log_sense::{LOG_SENSE_ALLOC, LogPage, fill_log_sense, parse_log_page},
        move_medium::{fill_initialize_element_status, fill_move_medium},
        read_element_status::ElementStatusReport,
        report_luns::{REPORT_LUNS_ALLOC, fill_report_luns, parse_lun_list},
    },
    errors::{ChangerError, Result},
    models::{
        command::CommandRequest,
        element::{
            ElementAddressAssignment, ElementKind, ElementStatus, ElementTopology,
        },
    },
    topology,
};

/// High-level control surface of one changer.
pub struct MediaChanger {
    session: ChangerSession,
    observer: Option<Arc<dyn MountObserver>>,
    transport_override: Option<u16>,
}

impl MediaChanger {
    pub fn new(session: ChangerSession) -> Self {
        Self {
            session,
            observer: None,
            transport_override: None,
        }
    }

    /// Attach a host mount observer used for pre-move release and
    /// load feedback.
    pub fn with_mount_observer(mut self, observer: Arc<dyn MountObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Pin the transport element address instead of using the first
    /// discovered one.
    pub fn with_transport_override(mut self, address: u16) -> Self {
        self.transport_override = Some(address);
        self
    }

    pub fn session(&self) -> &ChangerSession {
        &self.session
    }

    fn config(&self) -> &Config {
        self.session.config()
    }

    // ── Topology & status ────────────────────────────────────────────────

    /// Freshly discovered element topology.
    pub async fn list_topology(&self) -> Result<ElementTopology> {
        topology::fetch_topology(&self.session).await
    }

    /// Live status of one storage slot (1-based).
    pub async fn slot_status(&self, slot: usize) -> Result<ElementStatus> {
        let topo = topology::fetch_topology(&self.session).await?;
        let slot_addr = resolve_index("slot", &topo.slots, slot)?;
        let drive_addr = topo.drives.first().copied().unwrap_or(0);
        let (_, slot_st) =
            topology::resolve_status_for(&self.session, drive_addr, slot_addr).await?;
        Ok(slot_st)
    }

    /// Live status of one drive (1-based).
    pub async fn drive_status(&self, drive: usize) -> Result<ElementStatus> {
        let topo = topology::fetch_topology(&self.session).await?;
        let drive_addr = resolve_index("drive", &topo.drives, drive)?;
        let (drive_st, _) =
            topology::resolve_status_for(&self.session, drive_addr, 0).await?;
        Ok(drive_st)
    }

    /// The Element Address Assignment mode page.
    pub async fn mode_sense_assignment(&self) -> Result<ElementAddressAssignment> {
        topology::fetch_assignment(&self.session).await
    }

    /// One raw READ ELEMENT STATUS exchange (with the documented
    /// all-kinds fallback for rejected scoped queries).
    pub async fn read_element_status(
        &self,
        kind: Option<ElementKind>,
        start: u16,
        count: u16,
        allocation: u32,
    ) -> Result<ElementStatusReport> {
        if allocation < 8 || allocation > 0x00FF_FFFF {
            return Err(ChangerError::InvalidArgument(
                "allocation must cover the report header and fit 24 bits",
            ));
        }
        topology::read_element_status(&self.session, kind, start, count, allocation)
            .await
    }

    // ── Media movement ───────────────────────────────────────────────────

    /// Load the medium from `slot` into `drive`.
    ///
    /// Loading the slot whose medium is already resident in the drive is a
    /// deliberate no-op, not an eject/reseat cycle. A drive holding a
    /// *different* medium is first unloaded to its recorded source slot.
    pub async fn load(&self, slot: usize, drive: usize) -> Result<()> {
        self.load_inner(slot, drive).await.map(|_| ())
    }

    /// Like [`load`](Self::load), additionally waiting for the host to
    /// mount the freshly loaded medium when an observer is attached.
    pub async fn load_verbose(
        &self,
        slot: usize,
        drive: usize,
    ) -> Result<Option<MountedMedia>> {
        let moved = self.load_inner(slot, drive).await?;
        if !moved {
            return Ok(None);
        }
        let Some(observer) = self.observer.clone() else {
            return Ok(None);
        };

        let wait = self.config().timeouts.mount_wait;
        let mounted = task::spawn_blocking(move || observer.wait_for_media(wait))
            .await
            .map_err(|e| ChangerError::Internal(format!("mount wait failed: {e}")))?;
        if let Some(media) = &mounted {
            info!(name = %media.name, size = %media.size, "medium mounted");
        }
        Ok(mounted)
    }

    async fn load_inner(&self, slot: usize, drive: usize) -> Result<bool> {
        let topo = topology::fetch_topology(&self.session).await?;
        let slot_addr = resolve_index("slot", &topo.slots, slot)?;
        let drive_addr = resolve_index("drive", &topo.drives, drive)?;
        let transport = self.pick_transport(&topo)?;

        let (drive_st, slot_st) =
            topology::resolve_status_for(&self.session, drive_addr, slot_addr).await?;

        if !slot_st.full {
            if drive_st.full
                && drive_st.valid_source
                && drive_st.source_address == slot_addr
            {
                debug!(slot, drive, "medium already resident in drive");
                return Ok(false);
            }
            return Err(ChangerError::EmptySource);
        }

        if drive_st.full {
            if !drive_st.valid_source {
                return Err(ChangerError::UnknownSource);
            }
            info!(
                return_addr = %format_args!("{:#06x}", drive_st.source_address),
                "drive occupied, returning current medium first"
            );
            self.host_release_media().await;
            self.move_raw(transport, drive_addr, drive_st.source_address)
                .await?;
        }

        self.move_raw(transport, slot_addr, drive_addr).await?;
        Ok(true)
    }

    /// Move the drive's medium back to `slot`, unconditionally. The caller
    /// chooses a slot it expects to be empty; the hardware refuses the
    /// rest.
    pub async fn unload(&self, slot: usize, drive: usize) -> Result<()> {
        let topo = topology::fetch_topology(&self.session).await?;
        let slot_addr = resolve_index("slot", &topo.slots, slot)?;
        let drive_addr = resolve_index("drive", &topo.drives, drive)?;
        let transport = self.pick_transport(&topo)?;

        self.host_release_media().await;
        self.move_raw(transport, drive_addr, slot_addr).await
    }

    /// Eject the medium belonging to `slot` out through the import/export
    /// port, unloading it from the drive first when necessary.
    pub async fn eject(&self, slot: usize, drive: usize) -> Result<()> {
        let topo = topology::fetch_topology(&self.session).await?;
        let slot_addr = resolve_index("slot", &topo.slots, slot)?;
        let drive_addr = resolve_index("drive", &topo.drives, drive)?;
        let port_addr = topo
            .import_export
            .first()
            .copied()
            .ok_or(ChangerError::NotFound("no import/export element"))?;
        let transport = self.pick_transport(&topo)?;

        let (drive_st, slot_st) =
            topology::resolve_status_for(&self.session, drive_addr, slot_addr).await?;

        // A drive-resident medium belongs to this slot when its recorded
        // source says so, or when the drive reports no source at all and
        // the slot sits empty.
        let in_drive = !slot_st.full
            && drive_st.full
            && (!drive_st.valid_source || drive_st.source_address == slot_addr);

        if !slot_st.full && !in_drive {
            return Err(ChangerError::EmptySource);
        }

        if in_drive {
            info!(slot, drive, "medium is in the drive, unloading first");
            self.host_release_media().await;
            self.move_raw(transport, drive_addr, slot_addr).await?;
        }

        self.move_raw(transport, slot_addr, port_addr).await?;
        info!(slot, "medium ejected to the import/export port");
        Ok(())
    }

    /// Move a medium from the import/export port into `slot`.
    pub async fn insert(&self, slot: usize) -> Result<()> {
        let topo = topology::fetch_topology(&self.session).await?;
        let slot_addr = resolve_index("slot", &topo.slots, slot)?;
        let port_addr = topo
            .import_export
            .first()
            .copied()
            .ok_or(ChangerError::NotFound("no import/export element"))?;
        let transport = self.pick_transport(&topo)?;

        self.move_raw(transport, port_addr, slot_addr).await
    }

    /// Move the medium in `slot` to the import/export port.
    pub async fn retrieve(&self, slot: usize) -> Result<()> {
        let topo = topology::fetch_topology(&self.session).await?;
        let slot_addr = resolve_index("slot", &topo.slots, slot)?;
        let port_addr = topo
            .import_export
            .first()
            .copied()
            .ok_or(ChangerError::NotFound("no import/export element"))?;
        let transport = self.pick_transport(&topo)?;

        self.move_raw(transport, slot_addr, port_addr).await
    }

    /// Low-level MOVE MEDIUM between arbitrary element addresses.
    pub async fn move_medium(
        &self,
        transport: u16,
        source: u16,
        dest: u16,
    ) -> Result<()> {
        self.move_raw(transport, source, dest).await
    }

    // ── Device info ──────────────────────────────────────────────────────

    /// Standard INQUIRY: vendor, product, revision.
    pub async fn inquiry(&self) -> Result<InquiryInfo> {
        let mut cdb = [0u8; 16];
        let len = fill_inquiry_standard(&mut cdb, STANDARD_ALLOC);
        let reply = self
            .session
            .run(CommandRequest::read(
                cdb,
                len,
                STANDARD_ALLOC as usize,
                self.config().timeouts.command,
            ))
            .await?;
        parse_inquiry_standard(&reply.buffer)
    }

    /// VPD INQUIRY; returns the echoed page code and its payload.
    pub async fn inquiry_vpd(&self, page: u8) -> Result<(u8, Vec<u8>)> {
        let mut cdb = [0u8; 16];
        let len = fill_inquiry_vpd(&mut cdb, page, 0xFF);
        let reply = self
            .session
            .run(CommandRequest::read(
                cdb,
                len,
                0xFF,
                self.config().timeouts.command,
            ))
            .await?;
        let (code, payload) = parse_vpd_payload(&reply.buffer)
            .map_err(|e| ChangerError::MalformedResponse(e.to_string()))?;
        Ok((code, payload.to_vec()))
    }

    pub async fn test_unit_ready(&self) -> Result<()> {
        self.session.test_unit_ready().await
    }

    /// Ask the device to rescan its element inventory.
    pub async fn initialize_element_status(&self) -> Result<()> {
        let mut cdb = [0u8; 16];
        let len = fill_initialize_element_status(&mut cdb);
        self.session
            .run(CommandRequest::non_data(
                cdb,
                len,
                self.config().timeouts.motion,
            ))
            .await?;
        Ok(())
    }

    pub async fn log_sense(&self, page: u8) -> Result<LogPage> {
        let mut cdb = [0u8; 16];
        let len = fill_log_sense(&mut cdb, page, LOG_SENSE_ALLOC);
        let reply = self
            .session
            .run(CommandRequest::read(
                cdb,
                len,
                LOG_SENSE_ALLOC as usize,
                self.config().timeouts.command,
            ))
            .await?;
        parse_log_page(&reply.buffer)
    }

    pub async fn report_luns(&self) -> Result<Vec<u64>> {
        let mut cdb = [0u8; 16];
        let len = fill_report_luns(&mut cdb, REPORT_LUNS_ALLOC);
        let reply = self
            .session
            .run(CommandRequest::read(
                cdb,
                len,
                REPORT_LUNS_ALLOC as usize,
                self.config().timeouts.command,
            ))
            .await?;
        parse_lun_list(&reply.buffer)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn pick_transport(&self, topo: &ElementTopology) -> Result<u16> {
        if let Some(addr) = self.transport_override {
            return Ok(addr);
        }
        topo.transports
            .first()
            .copied()
            .ok_or(ChangerError::NoTransport)
    }

    async fn move_raw(&self, transport: u16, source: u16, dest: u16) -> Result<()> {
        info!(
            transport = %format_args!("{transport:#06x}"),
            source = %format_args!("{source:#06x}"),
            dest = %format_args!("{dest:#06x}"),
            "move medium"
        );
        let mut cdb = [0u8; 16];
        let len = fill_move_medium(&mut cdb, transport, source, dest);
        self.session
            .run(CommandRequest::non_data(
                cdb,
                len,
                self.config().timeouts.motion,
            ))
            .await?;
        Ok(())
    }

    /// Best-effort host-side eject before a physical move out of the
    /// drive. Failures never affect the move.
    async fn host_release_media(&self) {
        let Some(observer) = self.observer.clone() else {
            return;
        };
        let _ = task::spawn_blocking(move || observer.release_media()).await;
    }
}

fn resolve_index(kind: &'static str, addrs: &[u16], index: usize) -> Result<u16> {
    if index == 0 {
        return Err(ChangerError::InvalidArgument("element indices are 1-based"));
    }
    addrs
        .get(index - 1)
        .copied()
        .ok_or(ChangerError::OutOfRange {
            kind,
            index,
            count: addrs.len(),
        })
}
