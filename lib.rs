//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// pass2 - machine-dependent backend for a retargetable C compiler
//
// The front end hands this crate one expression tree at a time, together
// with a target descriptor. The engine matches each tree against the
// target's ordered instruction-pattern table, legalizes addressing modes,
// allocates registers under the target's class/overlap model, and appends
// assembly text to an output writer.
//
// Engine modules are target-independent; everything machine-specific
// lives behind the TargetHooks trait, instantiated per architecture
// under arch/.
//

pub mod arch;
pub mod callconv;
pub mod diag;
pub mod emit;
pub mod hooks;
pub mod legalize;
pub mod regmodel;
pub mod select;
pub mod table;
pub mod target;
pub mod tree;
