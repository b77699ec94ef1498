// SPDX-License-Identifier: AGPL-3.0-or-later GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! INQUIRY (6) — CDB fillers that write into a provided 16-byte buffer.
//! Returns the CDB length actually used (always 6 bytes).
//!
//! CDB layout (SPC):
//!   [0] = 0x12 (INQUIRY)
//!   [1] = EVPD (bit 0); other bits reserved
//!   [2] = Page Code (only when EVPD=1; else 0)
//!   [3] = reserved
//!   [4] = Allocation Length (u8)
//!   [5] = Control

use anyhow::{Result, bail};

use crate::errors::ChangerError;

pub const INQUIRY_OPCODE: u8 = 0x12;

/// Allocation length used for the standard INQUIRY of a changer.
pub const STANDARD_ALLOC: u8 = 96;

/// Fill a **Standard INQUIRY (EVPD=0)** CDB.
#[inline]
pub fn fill_inquiry_standard(cdb: &mut [u8; 16], allocation_len: u8) -> usize {
    cdb.fill(0);
    cdb[0] = INQUIRY_OPCODE;
    cdb[1] = 0x00; // EVPD=0
    cdb[4] = allocation_len;
    6
}

/// Fill a **VPD INQUIRY (EVPD=1)** CDB for an arbitrary page code.
#[inline]
pub fn fill_inquiry_vpd(cdb: &mut [u8; 16], page: u8, allocation_len: u8) -> usize {
    cdb.fill(0);
    cdb[0] = INQUIRY_OPCODE;
    cdb[1] = 0x01; // EVPD=1
    cdb[2] = page;
    cdb[4] = allocation_len;
    6
}

/// Identity triple from the fixed part of a standard INQUIRY response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryInfo {
    pub peripheral_qualifier: u8, // bits 7..5 of byte0
    pub device_type: u8,          // bits 4..0 of byte0
    pub rmb: bool,                // byte1 bit7
    pub vendor: String,           // bytes 8..16
    pub product: String,          // bytes 16..32
    pub revision: String,         // bytes 32..36
}

/// SPC peripheral device type of a medium changer.
pub const DEVICE_TYPE_CHANGER: u8 = 0x08;

impl InquiryInfo {
    pub fn is_changer(&self) -> bool {
        self.device_type == DEVICE_TYPE_CHANGER
    }
}

/// Parse a Standard INQUIRY (EVPD=0) response (minimum 36 bytes).
pub fn parse_inquiry_standard(buf: &[u8]) -> Result<InquiryInfo, ChangerError> {
    if buf.len() < 36 {
        return Err(ChangerError::MalformedResponse(format!(
            "INQUIRY buffer too short: {}",
            buf.len()
        )));
    }
    let b0 = buf[0];

    Ok(InquiryInfo {
        peripheral_qualifier: (b0 >> 5) & 0x07,
        device_type: b0 & 0x1F,
        rmb: (buf[1] & 0x80) != 0,
        vendor: trim_ascii(&buf[8..16]),
        product: trim_ascii(&buf[16..32]),
        revision: trim_ascii(&buf[32..36]),
    })
}

/// Generic VPD header view: returns (page_code, payload).
pub fn parse_vpd_payload(buf: &[u8]) -> Result<(u8, &[u8])> {
    if buf.len() < 4 {
        bail!("VPD buffer too short: {}", buf.len());
    }
    // byte0: PQ/DT (ignored here), byte1: page code, byte2..3: page length (BE)
    let page_code = buf[1];
    let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let end = (4 + len).min(buf.len());
    Ok((page_code, &buf[4..end]))
}

pub(crate) fn trim_ascii(bytes: &[u8]) -> String {
    let s: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    s.trim().to_string()
}
