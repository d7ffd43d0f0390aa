//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Architecture support
//
// One module per supported machine, each exporting a descriptor type
// that implements hooks::TargetHooks. The engine never names a
// concrete architecture.
//

pub mod arm;
