//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Target hook layer
//
// The narrow interface every architecture implements to parameterize
// the shared selector, legalizer, and allocator. The engine takes a
// `&dyn TargetHooks` everywhere; there is no ambient target state, so
// several targets (and test doubles) can coexist in one process.
//

use crate::callconv::{self, CallConv, CallRules, Signature};
use crate::diag::CodegenError;
use crate::regmodel::{RegClass, RegFile, RegId};
use crate::table::Pattern;
use crate::target::Target;
use crate::tree::{Node, Op, SymRef, Ty};

// ============================================================================
// Hook Result Types
// ============================================================================

/// Outcome of a rewrite hook. A rewrite is attempted at most once per
/// node; a second match failure after `Rewritten` is fatal.
#[derive(Debug)]
pub enum Rewrite {
    /// Replacement tree; the selector splices it in and retries
    Rewritten(Box<Node>),
    /// The target has no alternative form for this node
    NoMatch,
}

/// Answer to "can this dereference become an indexed operand?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeQuery {
    /// Already a legal operand as it stands
    Direct,
    /// Fold into an indexed memory operand
    ConvertToOreg,
    /// Compute the address into a register first
    ForceRegister,
}

/// Fixed physical registers a matched pattern demands.
///
/// `never` lists registers that must not be live across the
/// instruction even though they carry neither operand nor result
/// (a runtime-call idiom clobbering the scratch register, say).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRegs {
    pub left: Option<RegId>,
    pub right: Option<RegId>,
    pub result: Option<RegId>,
    pub never: &'static [RegId],
}

impl FixedRegs {
    pub const FREE: FixedRegs = FixedRegs {
        left: None,
        right: None,
        result: None,
        never: &[],
    };

    pub fn is_free(&self) -> bool {
        self.left.is_none() && self.right.is_none() && self.result.is_none() && self.never.is_empty()
    }
}

// ============================================================================
// The Hook Trait
// ============================================================================

/// Per-architecture callbacks required by the shared engine.
///
/// Everything here is immutable target description; per-function
/// mutable state lives in the engine's own context.
pub trait TargetHooks {
    fn target(&self) -> &Target;

    /// Register definitions, allocation order, colorability bound
    fn regfile(&self) -> &RegFile;

    /// Ordered instruction-pattern table; first match wins
    fn table(&self) -> &'static [Pattern];

    /// Argument and return conventions
    fn call_rules(&self) -> &CallRules;

    /// Register addressing stack-frame locals (never allocatable)
    fn frame_pointer(&self) -> RegId;

    /// Register class holding values of this type
    fn class_for_type(&self, ty: Ty) -> RegClass;

    /// Is `offset` encodable in a load/store of this operand type?
    /// Ranges are type-sensitive (word vs halfword vs byte vs float).
    fn legal_offset(&self, ty: Ty, offset: i64) -> bool;

    /// May an indexed operand of this type use `index << scale`?
    fn legal_scale(&self, ty: Ty, scale: u8) -> bool;

    /// Is this table entry usable under the enabled feature set?
    /// Default: the entry's required features must all be enabled.
    fn accepts(&self, p: &Pattern) -> bool {
        self.target().features.contains(p.features)
    }

    /// Alternative form for a binary operator the table rejected
    fn rewrite_binary(&self, n: &Node) -> Rewrite;

    /// Alternative form for an assignment the table rejected
    fn rewrite_assign(&self, n: &Node) -> Rewrite;

    /// Alternative form for an indirection the legalizer rejected
    fn rewrite_deref(&self, n: &Node) -> Rewrite;

    /// Alternative form for a named-storage reference. Load/store
    /// machines rewrite non-frame names into an indirection through
    /// the symbol's address constant.
    fn rewrite_name(&self, n: &Node) -> Rewrite {
        let _ = n;
        Rewrite::NoMatch
    }

    /// Exact register bindings a matched pattern demands; FREE when
    /// any register of the class will do
    fn fixed_registers(&self, p: &Pattern) -> FixedRegs {
        let _ = p;
        FixedRegs::FREE
    }

    /// Build the calling-convention descriptor for a signature
    fn build_call_conv(&self, sig: &Signature) -> CallConv {
        callconv::build(sig, self.call_rules())
    }

    /// Registers live across a call with this descriptor, saturating
    /// at the argument-register budget
    fn call_live_registers(&self, conv: &CallConv) -> Vec<RegId> {
        conv.live_regs()
    }

    /// Conditional branch mnemonic for a comparison operator. The
    /// default covers the usual signed/unsigned condition suffixes.
    fn branch_mnemonic(&self, op: Op) -> &'static str {
        match op {
            Op::Eq => "beq",
            Op::Ne => "bne",
            Op::Lt => "blt",
            Op::Le => "ble",
            Op::Gt => "bgt",
            Op::Ge => "bge",
            Op::ULt => "blo",
            Op::ULe => "bls",
            Op::UGt => "bhi",
            Op::UGe => "bhs",
            _ => "b",
        }
    }

    /// Unconditional branch mnemonic
    fn jump_mnemonic(&self) -> &'static str {
        "b"
    }

    /// Can `val` be encoded as an instruction immediate? Out-of-range
    /// constants are materialized through `load_imm` instead.
    fn legal_immediate(&self, val: i64) -> bool {
        (0..=255).contains(&val)
    }

    /// Materialize a symbol's address in a register
    fn load_addr(&self, dst: RegId, sym: &SymRef) -> String {
        let file = self.regfile();
        if sym.is_frame() {
            let fp = file.name(self.frame_pointer());
            if sym.offset < 0 {
                format!("sub\t{},{},#{}", file.name(dst), fp, -sym.offset)
            } else {
                format!("add\t{},{},#{}", file.name(dst), fp, sym.offset)
            }
        } else {
            format!("ldr\t{},={}", file.name(dst), sym.name)
        }
    }

    /// Load a floating constant from its literal-pool label
    fn load_float(&self, dst: RegId, label: &str) -> String {
        format!("vldr\t{},{}", self.regfile().name(dst), label)
    }

    /// Register-to-register move
    fn mov_reg(&self, dst: RegId, src: RegId) -> String {
        format!("mov\t{},{}", self.regfile().name(dst), self.regfile().name(src))
    }

    /// Load an immediate into a register
    fn load_imm(&self, dst: RegId, val: i64) -> String {
        format!("ldr\t{},={}", self.regfile().name(dst), val)
    }

    /// Grow (negative) or shrink (positive) the outgoing argument area
    fn stack_adjust(&self, bytes: i32) -> String {
        if bytes < 0 {
            format!("sub\tsp,sp,#{}", -bytes)
        } else {
            format!("add\tsp,sp,#{}", bytes)
        }
    }

    /// Store one outgoing stack argument. Pairs store both halves.
    fn stack_arg_store(&self, ty: Ty, src: RegId, offset: u32) -> String {
        let file = self.regfile();
        if let Some((lo, hi)) = file.pair_halves(src) {
            return format!(
                "str\t{},[sp, #{}]\nstr\t{},[sp, #{}]",
                file.name(lo),
                offset,
                file.name(hi),
                offset + 4
            );
        }
        let mnem = if ty.is_float() { "vstr" } else { "str" };
        format!("{}\t{},[sp, #{}]", mnem, file.name(src), offset)
    }

    fn call_direct(&self, name: &str) -> String {
        format!("bl\t{}", name)
    }

    fn call_indirect(&self, r: RegId) -> String {
        format!("blx\t{}", self.regfile().name(r))
    }

    /// Fixed registers of the block-copy runtime primitive: destination
    /// address, source address, byte count
    fn block_copy_regs(&self) -> (RegId, RegId, RegId);

    /// Runtime function performing the block copy
    fn block_copy_func(&self) -> &'static str {
        "memcpy"
    }

    /// Expand a compiler builtin (frame address, return address, ...).
    /// Unimplemented builtins are a per-target capability gap, reported
    /// as a user-level diagnostic, never a silent success.
    fn expand_builtin(&self, name: &str, n: &Node) -> Result<Rewrite, CodegenError> {
        let _ = n;
        Err(CodegenError::Unsupported {
            what: format!("builtin {}", name),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
