//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Calling-convention builder
//
// Given a function signature, assigns every argument and the return
// value to a register, a register pair, or a stack slot. Built once
// per signature; the resulting descriptor is read-only afterwards.
//
// Argument placement is left to right. Each argument consumes budget
// proportional to its size in 32-bit register units; pairs align to an
// even unit. The first argument that does not fit sends itself and
// every later argument to the stack, each slot aligned to the
// argument's own requirement, at strictly increasing offsets.
//

use crate::regmodel::RegId;
use crate::tree::Ty;
use log::debug;

// ============================================================================
// Per-Target Rules
// ============================================================================

/// Static description of a target's argument and return conventions
#[derive(Debug)]
pub struct CallRules {
    /// Argument registers in assignment order; unit N is arg_regs[N]
    pub arg_regs: &'static [RegId],
    /// Pair register covering units 2i and 2i+1
    pub arg_pairs: &'static [RegId],
    /// Total register units available for arguments
    pub max_units: u32,
    /// Fixed integral/pointer return register
    pub ret_reg: RegId,
    /// Fixed wide-integer return pair
    pub ret_pair: RegId,
    /// Fixed float-class return register
    pub ret_float: RegId,
    /// Floating returns use ret_float; otherwise they come back like
    /// integers of the same width
    pub float_ret_in_float_reg: bool,
    /// Outgoing argument area alignment in bytes
    pub stack_align: u32,
    /// Callee removes the argument area on return
    pub callee_pops: bool,
}

// ============================================================================
// Signatures
// ============================================================================

/// One parameter or return slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param {
    pub ty: Ty,
    /// Byte size; meaningful for aggregates, ignored for scalars
    pub size: u32,
}

impl Param {
    pub fn scalar(ty: Ty) -> Self {
        Self { ty, size: 0 }
    }

    pub fn aggregate(size: u32) -> Self {
        Self {
            ty: Ty::Aggregate,
            size,
        }
    }

    /// Register units consumed when passed in registers
    fn units(&self) -> u32 {
        match self.ty {
            Ty::Aggregate => self.size.div_ceil(4),
            t => t.arg_units(),
        }
    }

    /// Stack footprint and alignment in bytes
    fn stack_layout(&self) -> (u32, u32) {
        match self.ty {
            Ty::Aggregate => (self.size.next_multiple_of(4), 4),
            t if t.arg_units() == 2 => (8, 8),
            _ => (4, 4),
        }
    }
}

/// Function signature as the front end reports it
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<Param>,
    pub ret: Param,
}

// ============================================================================
// Descriptors
// ============================================================================

/// Where one argument lives at the call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLoc {
    Reg(RegId),
    RegPair(RegId),
    /// Byte offset into the outgoing argument area
    Stack { offset: u32 },
}

/// Where the return value comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetLoc {
    None,
    Reg(RegId),
    RegPair(RegId),
    FloatReg(RegId),
    /// Caller passes a result pointer in the given slot
    Hidden(ArgLoc),
}

/// Calling-convention descriptor for one signature.
///
/// Deterministic: identical signatures always produce identical
/// descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConv {
    pub args: Vec<ArgLoc>,
    pub ret: RetLoc,
    /// Outgoing argument area size, rounded to the stack alignment.
    /// Retained for prologue/epilogue generation and, on callee-pops
    /// targets, for the stack-pointer delta.
    pub stack_bytes: u32,
    pub callee_pops: bool,
}

impl CallConv {
    /// Registers live across the call because they carry arguments or
    /// the hidden result pointer
    pub fn live_regs(&self) -> Vec<RegId> {
        let mut out = Vec::new();
        if let RetLoc::Hidden(ArgLoc::Reg(r)) = self.ret {
            out.push(r);
        }
        for loc in &self.args {
            match loc {
                ArgLoc::Reg(r) | ArgLoc::RegPair(r) => out.push(*r),
                ArgLoc::Stack { .. } => {}
            }
        }
        out
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assign the return location. Small aggregates come back in the
/// integer register or pair when they fit; larger ones go through a
/// hidden pointer that consumes the first argument slot.
fn ret_loc(sig: &Signature, rules: &CallRules) -> RetLoc {
    let r = &sig.ret;
    match r.ty {
        Ty::Void => RetLoc::None,
        Ty::F32 | Ty::F64 if rules.float_ret_in_float_reg => RetLoc::FloatReg(rules.ret_float),
        Ty::F64 => RetLoc::RegPair(rules.ret_pair),
        Ty::F32 => RetLoc::Reg(rules.ret_reg),
        Ty::I64 | Ty::U64 => RetLoc::RegPair(rules.ret_pair),
        Ty::Aggregate => match r.units() {
            0 | 1 => RetLoc::Reg(rules.ret_reg),
            2 => RetLoc::RegPair(rules.ret_pair),
            _ => {
                // Hidden pointer; the budget is untouched at this
                // point, so it lands in the first register unless
                // there are no argument registers at all.
                if rules.max_units > 0 {
                    RetLoc::Hidden(ArgLoc::Reg(rules.arg_regs[0]))
                } else {
                    RetLoc::Hidden(ArgLoc::Stack { offset: 0 })
                }
            }
        },
        _ => RetLoc::Reg(rules.ret_reg),
    }
}

/// Build the descriptor for one signature
pub fn build(sig: &Signature, rules: &CallRules) -> CallConv {
    let ret = ret_loc(sig, rules);
    let mut next_unit: u32 = match ret {
        RetLoc::Hidden(ArgLoc::Reg(_)) => 1,
        RetLoc::Hidden(ArgLoc::Stack { .. }) => 0,
        _ => 0,
    };
    let mut stack_off: u32 = match ret {
        RetLoc::Hidden(ArgLoc::Stack { .. }) => 4,
        _ => 0,
    };
    let mut stack_only = false;
    let mut args = Vec::with_capacity(sig.params.len());

    for p in &sig.params {
        let units = p.units();
        let unit = if units == 2 {
            // Pairs start at an even unit
            next_unit.next_multiple_of(2)
        } else {
            next_unit
        };
        if !stack_only && units > 0 && unit + units <= rules.max_units && units <= 2 {
            if units == 2 {
                args.push(ArgLoc::RegPair(rules.arg_pairs[(unit / 2) as usize]));
            } else {
                args.push(ArgLoc::Reg(rules.arg_regs[unit as usize]));
            }
            next_unit = unit + units;
        } else {
            // Out of budget (or too large for registers): this and
            // every later argument go to the stack.
            stack_only = true;
            let (bytes, align) = p.stack_layout();
            stack_off = stack_off.next_multiple_of(align);
            args.push(ArgLoc::Stack { offset: stack_off });
            stack_off += bytes;
        }
    }

    let stack_bytes = stack_off.next_multiple_of(rules.stack_align);
    debug!(
        "callconv: {} args, {} register units used, {} stack bytes",
        args.len(),
        next_unit,
        stack_bytes
    );
    CallConv {
        args,
        ret,
        stack_bytes,
        callee_pops: rules.callee_pops,
    }
}

// ============================================================================
// Tests
// ============================================================================
