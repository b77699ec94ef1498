// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! READ ELEMENT STATUS (12) — CDB filler and the report/page/descriptor
//! decoder.
//!
//! CDB layout (SMC):
//!   [0]    = 0xB8 (READ ELEMENT STATUS)
//!   [1]    = VolTag (bit 4, off) | Element Type Code (bits 3..0, 0 = all)
//!   [2..4] = Starting Element Address (big-endian)
//!   [4..6] = Number of Elements (big-endian)
//!   [6..9] = Allocation Length (24-bit big-endian)
//!   [9..11] = reserved
//!   [11]   = Control
//!
//! Response layout:
//!   8-byte report header, then per element kind an 8-byte page header
//!   followed by fixed-width descriptors. A page with zero descriptor
//!   length or zero byte count means no more pages follow.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16},
};

use crate::{
    errors::ChangerError,
    models::element::{
        ElementDescriptor, ElementFlags, ElementKind, FullBitConvention,
    },
};

pub const READ_ELEMENT_STATUS: u8 = 0xB8;

/// Fill a READ ELEMENT STATUS CDB into `cdb[0..12]`.
///
/// `kind = None` queries all element types at once; some devices only
/// report transports, drives and I/E ports through the all-types form.
#[inline]
pub fn fill_read_element_status(
    cdb: &mut [u8; 16],
    kind: Option<ElementKind>,
    start: u16,
    count: u16,
    allocation: u32,
) -> usize {
    cdb.fill(0);
    cdb[0] = READ_ELEMENT_STATUS;
    cdb[1] = kind.map_or(0x00, ElementKind::code) & 0x0F;
    cdb[2..4].copy_from_slice(&start.to_be_bytes());
    cdb[4..6].copy_from_slice(&count.to_be_bytes());
    let [_, b6, b7, b8] = allocation.to_be_bytes();
    cdb[6] = b6;
    cdb[7] = b7;
    cdb[8] = b8;
    12
}

/// Raw 8-byte report header at the start of the response.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct StatusReportHeader {
    pub first_address: U16<BigEndian>,
    pub available: U16<BigEndian>,
    _reserved: u8,
    report_len: [u8; 3],
}

impl StatusReportHeader {
    /// Byte count of the report following this header.
    #[inline]
    pub fn report_bytes(&self) -> u32 {
        u32::from_be_bytes([
            0,
            self.report_len[0],
            self.report_len[1],
            self.report_len[2],
        ])
    }
}

/// Raw 8-byte element status page header.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct StatusPageHeader {
    pub type_code: u8,
    pub tag_flags: u8,
    pub descriptor_len: U16<BigEndian>,
    _reserved: u8,
    page_len: [u8; 3],
}

impl StatusPageHeader {
    #[inline]
    pub fn page_bytes(&self) -> u32 {
        u32::from_be_bytes([0, self.page_len[0], self.page_len[1], self.page_len[2]])
    }

    #[inline]
    pub fn pvol_tag(&self) -> bool {
        self.tag_flags & 0x80 != 0
    }

    #[inline]
    pub fn avol_tag(&self) -> bool {
        self.tag_flags & 0x40 != 0
    }
}

/// One decoded element status page: a kind plus its descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementStatusPage {
    pub type_code: u8,
    pub pvol_tag: bool,
    pub avol_tag: bool,
    pub descriptor_len: usize,
    pub descriptors: Vec<ElementDescriptor>,
}

impl ElementStatusPage {
    /// The page's element kind, when the type code is one we know.
    pub fn kind(&self) -> Option<ElementKind> {
        ElementKind::try_from(self.type_code).ok()
    }
}

/// A fully decoded READ ELEMENT STATUS response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementStatusReport {
    pub first_address: u16,
    pub available: u16,
    pub pages: Vec<ElementStatusPage>,
}

impl ElementStatusReport {
    pub fn descriptors(&self) -> impl Iterator<Item = &ElementDescriptor> {
        self.pages.iter().flat_map(|p| p.descriptors.iter())
    }

    /// Find one element's descriptor by address, any kind.
    pub fn find(&self, address: u16) -> Option<&ElementDescriptor> {
        self.descriptors().find(|d| d.address == address)
    }

    /// Decide which flag bit this device uses for "full".
    ///
    /// Bit 0 wins whenever any descriptor sets it; a report where nothing
    /// has bit 0 but bit 5 shows resident media is the other dialect. An
    /// all-empty report carries no signal and keeps the bit 0 default.
    pub fn probe_full_convention(&self) -> FullBitConvention {
        if self
            .descriptors()
            .any(|d| d.flags.contains(ElementFlags::FULL))
        {
            return FullBitConvention::Bit0;
        }
        if self
            .descriptors()
            .any(|d| d.flags.contains(ElementFlags::FULL_ALT))
        {
            return FullBitConvention::Bit5;
        }
        FullBitConvention::Bit0
    }
}

/// Decode a READ ELEMENT STATUS response into its pages.
///
/// A report byte count of zero yields an empty report, not an error. A
/// storage descriptor whose address is zero and whose bytes are all zero
/// is a non-element filler and is discarded.
pub fn decode_element_status_pages(
    buf: &[u8],
) -> Result<ElementStatusReport, ChangerError> {
    let (header, _) = StatusReportHeader::ref_from_prefix(buf).map_err(|_| {
        ChangerError::MalformedResponse(format!(
            "element status buffer too short: {}",
            buf.len()
        ))
    })?;

    let mut report = ElementStatusReport {
        first_address: header.first_address.get(),
        available: header.available.get(),
        pages: Vec::new(),
    };

    // The device may return less than it announced; never walk past either.
    let len = buf
        .len()
        .min(8usize.saturating_add(header.report_bytes() as usize));
    let mut offset = 8usize;

    while offset + 8 <= len {
        let Ok((page_header, _)) = StatusPageHeader::ref_from_prefix(&buf[offset..])
        else {
            break;
        };
        let desc_len = page_header.descriptor_len.get() as usize;
        let page_bytes = page_header.page_bytes() as usize;
        let type_code = page_header.type_code & 0x0F;
        let pvol_tag = page_header.pvol_tag();
        let avol_tag = page_header.avol_tag();
        offset += 8;

        // No more pages follow an empty one.
        if desc_len == 0 || page_bytes == 0 {
            break;
        }

        let page_end = (offset + page_bytes).min(len);
        let mut descriptors = Vec::new();

        while offset + desc_len <= page_end {
            if desc_len < 3 {
                offset = page_end;
                break;
            }
            let d = &buf[offset..offset + desc_len];
            offset += desc_len;

            let address = u16::from_be_bytes([d[0], d[1]]);
            if type_code == ElementKind::Storage.code()
                && address == 0
                && d.iter().all(|&b| b == 0)
            {
                continue;
            }

            let (valid_source, source_address) = if desc_len >= 12 {
                (
                    d[9] & 0x80 != 0,
                    u16::from_be_bytes([d[10], d[11]]),
                )
            } else {
                (false, 0)
            };

            descriptors.push(ElementDescriptor {
                address,
                flags: ElementFlags::from_bits_retain(d[2]),
                valid_source,
                source_address,
            });
        }

        if offset < page_end {
            offset = page_end;
        }

        report.pages.push(ElementStatusPage {
            type_code,
            pvol_tag,
            avol_tag,
            descriptor_len: desc_len,
            descriptors,
        });
    }

    Ok(report)
}
