// Scripted in-memory changer used by the topology and orchestrator tests.
//
// It answers the same command subset a real autoloader does (INQUIRY, TUR,
// MODE SENSE 0x1D, READ ELEMENT STATUS, MOVE MEDIUM, LOG SENSE, REPORT
// LUNS) from a small mutable inventory, and records every CDB it executes
// so tests can count hardware moves.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use smc_changer_rs::{
    cfg::config::Config,
    changer::MediaChanger,
    client::session::ChangerSession,
    errors::{ChangerError, Result},
    models::{
        command::{DataDirection, TaskOutcome, TaskStatus},
        sense_data::SenseData,
    },
    transport::{BlockCommandDevice, SyncTransport, Transport},
};

pub const TRANSPORT_ADDR: u16 = 0x0001;
pub const SLOT_BASE: u16 = 0x0010;
pub const IE_ADDR: u16 = 0x00A0;
pub const DRIVE_ADDR: u16 = 0x00B0;

#[derive(Debug)]
pub struct FakeState {
    /// Slot count the MODE SENSE assignment promises.
    pub promised_slots: u16,
    /// Slot count READ ELEMENT STATUS actually reports (quirk knob).
    pub visible_slots: u16,
    /// Max storage descriptors returned per scoped query.
    pub page_limit: u16,
    /// Which flag bit this fake uses for "full" (0x01 or 0x20).
    pub full_bit: u8,
    pub full_slots: BTreeSet<u16>,
    pub drive_full: bool,
    pub drive_source: Option<u16>,
    pub ie_full: bool,
    pub fail_mode_sense: bool,
    /// Refuse kind-scoped READ ELEMENT STATUS outright.
    pub reject_scoped: bool,
    /// Report no transport arm / no import-export port.
    pub no_transport: bool,
    pub no_ie: bool,
    pub empty_report: bool,
    pub inject_filler: bool,
    pub cdb_log: Vec<Vec<u8>>,
}

impl FakeState {
    /// A changer with `slots` storage slots, all populated, drive and
    /// import/export port empty.
    pub fn new(slots: u16) -> Self {
        Self {
            promised_slots: slots,
            visible_slots: slots,
            page_limit: 40,
            full_bit: 0x01,
            full_slots: (0..slots).map(|i| SLOT_BASE + i).collect(),
            drive_full: false,
            drive_source: None,
            ie_full: false,
            fail_mode_sense: false,
            reject_scoped: false,
            no_transport: false,
            no_ie: false,
            empty_report: false,
            inject_filler: false,
            cdb_log: Vec::new(),
        }
    }

    pub fn slot_addr(index: usize) -> u16 {
        SLOT_BASE + (index as u16) - 1
    }

    pub fn move_cdbs(&self) -> Vec<&Vec<u8>> {
        self.cdb_log.iter().filter(|c| c[0] == 0xA5).collect()
    }

    pub fn scoped_storage_queries(&self) -> usize {
        self.cdb_log
            .iter()
            .filter(|c| c[0] == 0xB8 && c[1] & 0x0F == 0x02)
            .count()
    }

    fn storage_flags(&self, addr: u16) -> u8 {
        if self.full_slots.contains(&addr) {
            self.full_bit
        } else {
            0x00
        }
    }

    fn build_report(&self, kind: u8, start: u16, count: u16) -> Vec<u8> {
        let mut pages: Vec<(u8, Vec<[u8; 12]>)> = Vec::new();

        if (kind == 0x00 || kind == 0x01) && !self.no_transport {
            pages.push((0x01, vec![descriptor(TRANSPORT_ADDR, 0, None)]));
        }
        if kind == 0x00 || kind == 0x02 {
            let limit = if kind == 0x02 {
                count.min(self.page_limit)
            } else {
                self.page_limit
            };
            let mut descs = Vec::new();
            if self.inject_filler {
                descs.push([0u8; 12]);
            }
            let mut addr = start.max(SLOT_BASE);
            while addr < SLOT_BASE + self.visible_slots
                && (descs.len() as u16) < limit
            {
                descs.push(descriptor(addr, self.storage_flags(addr), None));
                addr += 1;
            }
            pages.push((0x02, descs));
        }
        if (kind == 0x00 || kind == 0x03) && !self.no_ie {
            let flags = if self.ie_full { self.full_bit } else { 0 };
            pages.push((0x03, vec![descriptor(IE_ADDR, flags, None)]));
        }
        if kind == 0x00 || kind == 0x04 {
            let flags = if self.drive_full { self.full_bit } else { 0 };
            pages.push((0x04, vec![descriptor(DRIVE_ADDR, flags, self.drive_source)]));
        }

        let total: usize = pages.iter().map(|(_, d)| d.len()).sum();
        let body_len: usize = pages
            .iter()
            .filter(|(_, d)| !d.is_empty())
            .map(|(_, d)| 8 + d.len() * 12)
            .sum();

        let mut out = Vec::with_capacity(8 + body_len);
        out.extend_from_slice(&start.to_be_bytes());
        out.extend_from_slice(&(total as u16).to_be_bytes());
        out.push(0);
        if self.empty_report {
            out.extend_from_slice(&[0, 0, 0]);
            return out;
        }
        out.extend_from_slice(&(body_len as u32).to_be_bytes()[1..]);

        for (type_code, descs) in pages {
            if descs.is_empty() {
                continue;
            }
            out.push(type_code);
            out.push(0x00);
            out.extend_from_slice(&12u16.to_be_bytes());
            out.push(0);
            let bytes = (descs.len() * 12) as u32;
            out.extend_from_slice(&bytes.to_be_bytes()[1..]);
            for d in descs {
                out.extend_from_slice(&d);
            }
        }
        out
    }

    fn apply_move(&mut self, transport: u16, source: u16, dest: u16) -> Result<()> {
        if transport != TRANSPORT_ADDR {
            return Err(reject_err(0x05, 0x21, 0x01));
        }

        // pick the medium up
        if source == DRIVE_ADDR {
            if !self.drive_full {
                return Err(reject_err(0x05, 0x3B, 0x0E));
            }
            self.drive_full = false;
            self.drive_source = None;
        } else if source == IE_ADDR {
            if !self.ie_full {
                return Err(reject_err(0x05, 0x3B, 0x0E));
            }
            self.ie_full = false;
        } else if !self.full_slots.remove(&source) {
            return Err(reject_err(0x05, 0x3B, 0x0E));
        }

        // put it down
        if dest == DRIVE_ADDR {
            if self.drive_full {
                return Err(reject_err(0x05, 0x3B, 0x0D));
            }
            self.drive_full = true;
            self.drive_source = Some(source);
        } else if dest == IE_ADDR {
            if self.ie_full {
                return Err(reject_err(0x05, 0x3B, 0x0D));
            }
            self.ie_full = true;
        } else {
            if self.full_slots.contains(&dest) {
                return Err(reject_err(0x05, 0x3B, 0x0D));
            }
            self.full_slots.insert(dest);
        }
        Ok(())
    }
}

fn descriptor(addr: u16, flags: u8, source: Option<u16>) -> [u8; 12] {
    let mut d = [0u8; 12];
    d[0..2].copy_from_slice(&addr.to_be_bytes());
    d[2] = flags;
    if let Some(src) = source {
        d[9] = 0x80;
        d[10..12].copy_from_slice(&src.to_be_bytes());
    }
    d
}

fn good(transferred: u64) -> TaskOutcome {
    TaskOutcome {
        status: TaskStatus::Good,
        sense: None,
        transferred,
    }
}

fn reject_err(key: u8, asc: u8, ascq: u8) -> ChangerError {
    ChangerError::HardwareRejected {
        status: TaskStatus::CheckCondition,
        sense: Some(SenseData {
            valid: true,
            response_code: 0x70,
            sense_key: key,
            asc,
            ascq,
            ..SenseData::default()
        }),
    }
}

fn write_clamped(buffer: &mut [u8], data: &[u8]) -> u64 {
    let n = buffer.len().min(data.len());
    buffer[..n].copy_from_slice(&data[..n]);
    n as u64
}

pub struct FakeDevice {
    pub state: Arc<Mutex<FakeState>>,
}

impl BlockCommandDevice for FakeDevice {
    fn execute(
        &mut self,
        cdb: &[u8],
        _direction: DataDirection,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> Result<TaskOutcome> {
        let mut st = self.state.lock().expect("fake state lock");
        st.cdb_log.push(cdb.to_vec());

        match cdb[0] {
            // TEST UNIT READY / INITIALIZE ELEMENT STATUS
            0x00 | 0x07 => Ok(good(0)),
            // INQUIRY
            0x12 => {
                let mut data = vec![0u8; 96];
                data[0] = 0x08; // medium changer
                data[1] = 0x80;
                data[8..16].copy_from_slice(b"Sony    ");
                data[16..32].copy_from_slice(b"VAIOChanger1    ");
                data[32..36].copy_from_slice(b"1.0 ");
                Ok(good(write_clamped(buffer, &data)))
            },
            // MODE SENSE(10), element address assignment page
            0x5A => {
                if st.fail_mode_sense {
                    return Err(reject_err(0x05, 0x24, 0x00));
                }
                let mut data = vec![0u8; 8];
                data.extend_from_slice(&[0x1D, 18]);
                for (first, count) in [
                    (TRANSPORT_ADDR, 1u16),
                    (SLOT_BASE, st.promised_slots),
                    (IE_ADDR, 1),
                    (DRIVE_ADDR, 1),
                ] {
                    data.extend_from_slice(&first.to_be_bytes());
                    data.extend_from_slice(&count.to_be_bytes());
                }
                data.extend_from_slice(&[0, 0]);
                Ok(good(write_clamped(buffer, &data)))
            },
            // READ ELEMENT STATUS
            0xB8 => {
                let kind = cdb[1] & 0x0F;
                if kind != 0x00 && st.reject_scoped {
                    return Err(reject_err(0x05, 0x24, 0x00));
                }
                let start = u16::from_be_bytes([cdb[2], cdb[3]]);
                let count = u16::from_be_bytes([cdb[4], cdb[5]]);
                let data = st.build_report(kind, start, count);
                Ok(good(write_clamped(buffer, &data)))
            },
            // MOVE MEDIUM
            0xA5 => {
                let transport = u16::from_be_bytes([cdb[2], cdb[3]]);
                let source = u16::from_be_bytes([cdb[4], cdb[5]]);
                let dest = u16::from_be_bytes([cdb[6], cdb[7]]);
                st.apply_move(transport, source, dest)?;
                Ok(good(0))
            },
            // LOG SENSE
            0x4D => {
                let mut data = vec![cdb[2] & 0x3F, 0x00];
                data.extend_from_slice(&4u16.to_be_bytes());
                data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
                Ok(good(write_clamped(buffer, &data)))
            },
            // REPORT LUNS
            0xA0 => {
                let mut data = Vec::new();
                data.extend_from_slice(&8u32.to_be_bytes());
                data.extend_from_slice(&[0u8; 4]);
                data.extend_from_slice(&0u64.to_be_bytes());
                Ok(good(write_clamped(buffer, &data)))
            },
            _ => Err(reject_err(0x05, 0x20, 0x00)),
        }
    }
}

/// A changer wired to the fake device plus a handle into its state.
pub fn fake_changer(state: FakeState) -> (MediaChanger, Arc<Mutex<FakeState>>) {
    fake_changer_with_config(state, Config::default())
}

pub fn fake_changer_with_config(
    state: FakeState,
    config: Config,
) -> (MediaChanger, Arc<Mutex<FakeState>>) {
    let shared = Arc::new(Mutex::new(state));
    let device = FakeDevice {
        state: Arc::clone(&shared),
    };
    let transport = Transport::Sync(SyncTransport::new(Box::new(device)));
    let session = ChangerSession::from_transport(transport, config);
    (MediaChanger::new(session), shared)
}
