// SPDX-License-Identifier: AGPL-3.0-or-later GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Build a standard TEST UNIT READY CDB.
#[inline]
pub fn fill_test_unit_ready(cdb: &mut [u8; 16]) -> usize {
    cdb.fill(0);
    cdb[0] = 0x00; // TEST UNIT READY(6)
    6
}
