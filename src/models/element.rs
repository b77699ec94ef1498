// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use anyhow::bail;

/// The four element kinds a media changer addresses, carried in the low
/// 4 bits of an element status page's type byte.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ElementKind {
    Transport = 0x01,
    Storage = 0x02,
    ImportExport = 0x03,
    Drive = 0x04,
}

impl ElementKind {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            ElementKind::Transport => "transport",
            ElementKind::Storage => "storage",
            ElementKind::ImportExport => "import/export",
            ElementKind::Drive => "drive",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for ElementKind {
    type Error = anyhow::Error;

    #[inline]
    fn try_from(v: u8) -> anyhow::Result<Self> {
        Ok(match v & 0x0F {
            0x01 => ElementKind::Transport,
            0x02 => ElementKind::Storage,
            0x03 => ElementKind::ImportExport,
            0x04 => ElementKind::Drive,
            other => bail!("unknown element type code: {other:#04x}"),
        })
    }
}

bitflags::bitflags! {
    /// Raw status-flag byte of an element descriptor.
    ///
    /// Two device dialects exist for "full": one reports it in bit 0, the
    /// other in bit 5. Both bits are modeled; [`FullBitConvention`] decides
    /// which one is authoritative for a given device.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ElementFlags: u8 {
        const EXCEPT   = 0x80;
        const ACCESS   = 0x08;
        const FULL_ALT = 0x20;
        const FULL     = 0x01;
    }
}

/// Which bit of the descriptor flag byte encodes "element holds media".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullBitConvention {
    Bit0,
    Bit5,
}

impl FullBitConvention {
    #[inline]
    pub fn is_full(self, flags: ElementFlags) -> bool {
        match self {
            FullBitConvention::Bit0 => flags.contains(ElementFlags::FULL),
            FullBitConvention::Bit5 => flags.contains(ElementFlags::FULL_ALT),
        }
    }
}

/// One decoded element status descriptor, before a full-bit convention is
/// applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementDescriptor {
    pub address: u16,
    pub flags: ElementFlags,
    /// Source address is only meaningful when the descriptor's SVALID bit
    /// was set.
    pub valid_source: bool,
    pub source_address: u16,
}

impl ElementDescriptor {
    #[inline]
    pub fn is_except(&self) -> bool {
        self.flags.contains(ElementFlags::EXCEPT)
    }

    /// Snapshot with the device's full-bit dialect applied.
    pub fn status(&self, convention: FullBitConvention) -> ElementStatus {
        ElementStatus {
            address: self.address,
            full: convention.is_full(self.flags),
            except: self.is_except(),
            valid_source: self.valid_source,
            source_address: self.source_address,
        }
    }
}

/// Per-address status snapshot. Always a query result, never mutated
/// locally; it goes stale at the next device-mutating command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementStatus {
    pub address: u16,
    pub full: bool,
    pub except: bool,
    pub valid_source: bool,
    pub source_address: u16,
}

impl ElementStatus {
    /// An empty placeholder for an address the report did not cover.
    pub fn absent(address: u16) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }
}

/// A (first address, element count) pair for one element kind, as reported
/// by the Element Address Assignment mode page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressRange {
    pub first: u16,
    pub count: u16,
}

impl AddressRange {
    /// One past the last address the assignment covers.
    #[inline]
    pub fn end(&self) -> u32 {
        u32::from(self.first) + u32::from(self.count)
    }
}

/// The four address-assignment ranges from MODE SENSE page 0x1D.
///
/// Authoritative capacity used to validate or repair the discovered
/// topology, not a substitute for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementAddressAssignment {
    pub transport: AddressRange,
    pub storage: AddressRange,
    pub import_export: AddressRange,
    pub drive: AddressRange,
}

/// The freshly discovered element lists, one per kind, in discovery order.
///
/// Addresses carry no persistent identity across queries: a slot's address
/// may shift if the device's enumeration order changes, so every public
/// operation re-fetches this before resolving 1-based indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementTopology {
    pub transports: Vec<u16>,
    pub slots: Vec<u16>,
    pub drives: Vec<u16>,
    pub import_export: Vec<u16>,
}

impl ElementTopology {
    /// True when every kind came back empty.
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
            && self.slots.is_empty()
            && self.drives.is_empty()
            && self.import_export.is_empty()
    }

    pub fn total_elements(&self) -> usize {
        self.transports.len()
            + self.slots.len()
            + self.drives.len()
            + self.import_export.len()
    }
}
