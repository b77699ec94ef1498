// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::models::element::FullBitConvention;

/// Which descriptor flag bit to treat as "full".
///
/// The two observed device families disagree: one reports media presence
/// in bit 0, the other in bit 5. `Auto` defers the decision to a probe of
/// the first decoded status report.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullBitMode {
    #[default]
    #[serde(rename = "Auto", alias = "auto", alias = "AUTO")]
    Auto,
    #[serde(rename = "Bit0", alias = "bit0", alias = "low")]
    Bit0,
    #[serde(rename = "Bit5", alias = "bit5", alias = "high")]
    Bit5,
}

impl FullBitMode {
    /// The pinned convention, or `None` when probing decides.
    pub fn fixed(self) -> Option<FullBitConvention> {
        match self {
            FullBitMode::Auto => None,
            FullBitMode::Bit0 => Some(FullBitConvention::Bit0),
            FullBitMode::Bit5 => Some(FullBitConvention::Bit5),
        }
    }
}

impl fmt::Display for FullBitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FullBitMode::Auto => "Auto",
            FullBitMode::Bit0 => "Bit0",
            FullBitMode::Bit5 => "Bit5",
        })
    }
}
