//! This module manages the changer session and the contracts of the
//! external collaborators (device enumeration, session establishment,
//! host mount arbitration).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// External collaborator contracts: device discovery and mount observation.
pub mod discovery;
/// The open changer session owning the active transport.
pub mod session;
