// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Element topology discovery.
//!
//! The builder learns the device's address-assignment ranges through MODE
//! SENSE and materializes concrete element lists through one or more READ
//! ELEMENT STATUS exchanges. Nothing is cached: every query re-reads the
//! hardware, because addresses carry no identity across enumerations.

use tracing::{debug, info, warn};

use crate::{
    cfg::config::Config,
    client::session::ChangerSession,
    control_block::{
        mode_sense::{fill_mode_sense_element_page, parse_element_assignment_page},
        read_element_status::{
            ElementStatusReport, decode_element_status_pages, fill_read_element_status,
        },
    },
    errors::{ChangerError, Result},
    models::{
        command::CommandRequest,
        element::{
            ElementAddressAssignment, ElementKind, ElementStatus, ElementTopology,
            FullBitConvention,
        },
    },
    utils::hex_dump,
};

/// Fetch the Element Address Assignment mode page.
pub async fn fetch_assignment(
    session: &ChangerSession,
) -> Result<ElementAddressAssignment> {
    let cfg = session.config();
    let mut cdb = [0u8; 16];
    let len = fill_mode_sense_element_page(&mut cdb);
    let reply = session
        .run(CommandRequest::read(
            cdb,
            len,
            crate::control_block::mode_sense::ELEMENT_ADDRESS_ALLOC as usize,
            cfg.timeouts.command,
        ))
        .await?;

    match parse_element_assignment_page(&reply.buffer) {
        Ok(assign) => Ok(assign),
        Err(e) => {
            if cfg.protocol.dump_raw {
                debug!("mode sense raw bytes:\n{}", hex_dump(&reply.buffer));
            }
            Err(e)
        },
    }
}

/// Issue one READ ELEMENT STATUS exchange and decode its pages.
///
/// A rejected kind-scoped query is retried once as all-kinds/max-count
/// before giving up, since some devices refuse scoped queries outright.
/// This is the engine's only automatic retry.
pub async fn read_element_status(
    session: &ChangerSession,
    kind: Option<ElementKind>,
    start: u16,
    count: u16,
    allocation: u32,
) -> Result<ElementStatusReport> {
    match read_element_status_raw(session, kind, start, count, allocation).await {
        Ok(report) => Ok(report),
        Err(e @ ChangerError::HardwareRejected { .. }) if kind.is_some() => {
            warn!(
                kind = %kind.map_or("all", ElementKind::name),
                error = %e,
                "scoped element status rejected, retrying with all kinds"
            );
            read_element_status_raw(session, None, 0, u16::MAX, allocation).await
        },
        Err(e) => Err(e),
    }
}

async fn read_element_status_raw(
    session: &ChangerSession,
    kind: Option<ElementKind>,
    start: u16,
    count: u16,
    allocation: u32,
) -> Result<ElementStatusReport> {
    let cfg = session.config();
    let timeout = match kind {
        None => cfg.timeouts.topology,
        Some(_) => cfg.timeouts.status,
    };

    let mut cdb = [0u8; 16];
    let len = fill_read_element_status(&mut cdb, kind, start, count, allocation);
    let reply = session
        .run(CommandRequest::read(cdb, len, allocation as usize, timeout))
        .await?;

    match decode_element_status_pages(&reply.buffer) {
        Ok(report) => Ok(report),
        Err(e) => {
            if cfg.protocol.dump_raw {
                debug!("element status raw bytes:\n{}", hex_dump(&reply.buffer));
            }
            Err(e)
        },
    }
}

/// Discover a best-effort, complete element topology.
///
/// One all-kinds sweep seeds every list; the storage list is then rebuilt
/// through assignment-scoped paginated queries, and a known firmware
/// defect (devices under-reporting populated slots) is repaired by
/// synthesizing the missing trailing addresses.
pub async fn fetch_topology(session: &ChangerSession) -> Result<ElementTopology> {
    let cfg = session.config();

    let report = read_element_status_raw(
        session,
        None,
        0,
        u16::MAX,
        cfg.protocol.topology_alloc,
    )
    .await?;

    let mut topology = ElementTopology::default();
    collect_into(&report, &mut topology);

    if topology.is_empty() {
        return Err(ChangerError::NoElementsReported);
    }

    // Some devices return truncated storage lists on the all-kinds form
    // but full ones when queried for storage specifically, ~40 elements
    // per exchange. The assignment says how many to expect.
    if let Ok(assign) = fetch_assignment(session).await
        && assign.storage.count > 0
    {
        topology.slots.clear();
        paginate_storage(session, cfg, &assign, &mut topology.slots).await;

        let discovered = topology.slots.len();
        let promised = assign.storage.count as usize;
        if discovered < promised {
            if discovered < promised / 2 {
                warn!(
                    promised,
                    discovered,
                    "well under half the device's slot capacity is \
                     responding; check that all magazines are installed"
                );
            } else {
                info!(promised, discovered, "device reports fewer slots than \
                     its address assignment promises");
            }
            repair_trailing_slots(&assign, &mut topology.slots);
        }
    }

    if topology.is_empty() {
        return Err(ChangerError::NoElementsReported);
    }

    debug!(
        transports = topology.transports.len(),
        slots = topology.slots.len(),
        drives = topology.drives.len(),
        import_export = topology.import_export.len(),
        "topology discovered"
    );

    Ok(topology)
}

fn collect_into(report: &ElementStatusReport, topology: &mut ElementTopology) {
    for page in &report.pages {
        let Some(kind) = page.kind() else { continue };
        let list = match kind {
            ElementKind::Transport => &mut topology.transports,
            ElementKind::Storage => &mut topology.slots,
            ElementKind::ImportExport => &mut topology.import_export,
            ElementKind::Drive => &mut topology.drives,
        };
        for d in &page.descriptors {
            if !list.contains(&d.address) {
                list.push(d.address);
            }
        }
    }
}

async fn paginate_storage(
    session: &ChangerSession,
    cfg: &Config,
    assign: &ElementAddressAssignment,
    slots: &mut Vec<u16>,
) {
    let step = cfg.protocol.storage_page_step;
    let promised = assign.storage.count as usize;
    let mut start = assign.storage.first;

    while slots.len() < promised {
        let remaining = (promised - slots.len()) as u16;
        let count = remaining.min(step);

        let report = match read_element_status_raw(
            session,
            Some(ElementKind::Storage),
            start,
            count,
            cfg.protocol.topology_alloc,
        )
        .await
        {
            Ok(report) => report,
            // Partial discovery is repaired from the assignment afterwards.
            Err(e) => {
                warn!(start, count, error = %e, "scoped storage query failed");
                break;
            },
        };

        let before = slots.len();
        for page in &report.pages {
            if page.kind() != Some(ElementKind::Storage) {
                continue;
            }
            for d in &page.descriptors {
                if !slots.contains(&d.address) {
                    slots.push(d.address);
                }
            }
        }

        let added = slots.len() - before;
        // A device that re-returns the same page forever must not spin us.
        if added == 0 {
            break;
        }
        start = start.wrapping_add(added as u16);
    }
}

/// Optimistic repair of under-reported storage inventories: extend the
/// discovered list with a contiguous trailing run up to the assignment's
/// end address. Interior gaps are never invented.
fn repair_trailing_slots(assign: &ElementAddressAssignment, slots: &mut Vec<u16>) {
    let expected_end = assign.storage.end();
    let mut next = match slots.last() {
        Some(&last) => u32::from(last) + 1,
        None => u32::from(assign.storage.first),
    };
    let promised = assign.storage.count as usize;

    while slots.len() < promised && next < expected_end {
        slots.push(next as u16);
        next += 1;
    }
}

/// Live status of exactly two elements, in one all-kinds exchange.
///
/// Used by the orchestrator instead of materializing the whole topology
/// when only a drive's and a slot's state matters.
pub async fn resolve_status_for(
    session: &ChangerSession,
    drive_addr: u16,
    slot_addr: u16,
) -> Result<(ElementStatus, ElementStatus)> {
    let cfg = session.config();
    let report = read_element_status_raw(
        session,
        None,
        0,
        u16::MAX,
        cfg.protocol.status_alloc,
    )
    .await?;

    let convention = resolve_full_convention(session, &report);

    let drive = report
        .find(drive_addr)
        .map_or(ElementStatus::absent(drive_addr), |d| d.status(convention));
    let slot = report
        .find(slot_addr)
        .map_or(ElementStatus::absent(slot_addr), |d| d.status(convention));

    Ok((drive, slot))
}

/// The full-bit dialect for this device: the configured pin, or a probe of
/// the report when the config says `Auto`.
pub fn resolve_full_convention(
    session: &ChangerSession,
    report: &ElementStatusReport,
) -> FullBitConvention {
    session
        .config()
        .protocol
        .full_bit
        .fixed()
        .unwrap_or_else(|| report.probe_full_convention())
}
