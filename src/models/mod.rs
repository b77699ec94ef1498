//! This module defines the data structures for changer elements, command
//! execution, and sense data.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines the command execution request/reply pair shared by both
/// transports.
pub mod command;
/// Defines element kinds, addresses, statuses, and the topology.
pub mod element;
/// Defines fixed-format sense data parsing.
pub mod sense_data;
