//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Expression tree intermediate representation
//
// The front end hands pass2 one tree per statement-level expression.
// Nodes own their children exclusively: a node is consumed exactly once,
// either by a rewrite (which replaces it or splices in fresh nodes) or
// by emission, after which it is marked Free. There is no sharing and
// no parent pointer; rewrites never duplicate ownership.
//

use crate::regmodel::RegId;

// ============================================================================
// Operators
// ============================================================================

/// Tree operator tags.
///
/// Leaf operators carry their payload in the node's constant/symbol/
/// address fields; unary operators use `left`; binary operators use
/// both children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Leaves
    /// Integer constant (value in `val`, optional symbol-relative)
    Icon,
    /// Floating constant (value in `fval`)
    Fcon,
    /// Named storage reference (symbol in `sym`)
    Name,
    /// Physical register (register in `reg`)
    Reg,
    /// Front-end temporary (number in `val`); bound to a register on
    /// first use
    Temp,
    /// Legalized indexed memory operand (address in `addr`)
    Oreg,

    // Unary
    /// Pointer indirection
    Deref,
    /// Address-of
    Addr,
    /// Scalar conversion (result type is the node type, source type is
    /// the child type)
    Conv,
    /// Arithmetic negation
    Neg,
    /// Bitwise complement
    Comp,

    // Binary arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Lsh,
    Rsh,

    // Comparisons (value-producing: 0 or 1)
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ULt,
    ULe,
    UGt,
    UGe,

    // Assignment
    Assign,
    /// Struct/union block copy (left = destination lvalue, right =
    /// source lvalue; byte count in `val`)
    StAsg,

    // Calls
    /// Function call (left = callee, right = argument chain)
    Call,
    /// Argument chain link (left = earlier arguments, right = this one)
    ArgPair,

    // Control
    /// Unconditional branch to label `val`
    Goto,
    /// Conditional branch to label `val`; left child is a comparison
    CBranch,
    /// Label definition for label `val`
    Label,

    /// Retired node: consumed by emission, no longer live
    Free,
}

impl Op {
    /// Binary operators that take two value operands
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Op::Plus
                | Op::Minus
                | Op::Mul
                | Op::Div
                | Op::Mod
                | Op::And
                | Op::Or
                | Op::Xor
                | Op::Lsh
                | Op::Rsh
        ) || self.is_cmp()
    }

    pub fn is_cmp(&self) -> bool {
        matches!(
            self,
            Op::Eq
                | Op::Ne
                | Op::Lt
                | Op::Le
                | Op::Gt
                | Op::Ge
                | Op::ULt
                | Op::ULe
                | Op::UGt
                | Op::UGe
        )
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Op::Icon | Op::Fcon | Op::Name | Op::Reg | Op::Temp | Op::Oreg
        )
    }

    pub fn is_unary(&self) -> bool {
        matches!(self, Op::Deref | Op::Addr | Op::Conv | Op::Neg | Op::Comp)
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type tag carried by every node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Data pointer (32-bit on the supported targets)
    Ptr,
    /// Struct or union; size travels in the node's `val` field where it
    /// matters (StAsg, calls)
    Aggregate,
    Void,
}

impl Ty {
    /// Size in bits (aggregates and void report 0; their sizes travel
    /// separately)
    pub fn size_bits(&self) -> u32 {
        match self {
            Ty::I8 | Ty::U8 => 8,
            Ty::I16 | Ty::U16 => 16,
            Ty::I32 | Ty::U32 | Ty::F32 | Ty::Ptr => 32,
            Ty::I64 | Ty::U64 | Ty::F64 => 64,
            Ty::Aggregate | Ty::Void => 0,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Ty::I8 | Ty::U8 | Ty::I16 | Ty::U16 | Ty::I32 | Ty::U32 | Ty::I64 | Ty::U64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Ty::U8 | Ty::U16 | Ty::U32 | Ty::U64)
    }

    /// 64-bit integer on a 32-bit machine: needs a register pair
    pub fn is_wide(&self) -> bool {
        matches!(self, Ty::I64 | Ty::U64)
    }

    /// Register units consumed when passed in 32-bit argument registers
    pub fn arg_units(&self) -> u32 {
        match self {
            Ty::I64 | Ty::U64 | Ty::F64 => 2,
            Ty::Void => 0,
            _ => 1,
        }
    }
}

// ============================================================================
// Symbols
// ============================================================================

/// Storage class of a named symbol, as reported by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Stack-allocated local (frame offset valid)
    Auto,
    /// File-scope static
    Static,
    /// External linkage
    External,
    /// Register-allocated local
    Register,
    /// Incoming parameter (frame offset valid)
    Param,
}

/// Reference to named storage
#[derive(Debug, Clone, PartialEq)]
pub struct SymRef {
    /// Linkage name
    pub name: String,
    pub storage: Storage,
    /// Frame offset for Auto/Param storage
    pub offset: i32,
}

impl SymRef {
    pub fn external(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: Storage::External,
            offset: 0,
        }
    }

    pub fn stat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: Storage::Static,
            offset: 0,
        }
    }

    pub fn auto(name: impl Into<String>, offset: i32) -> Self {
        Self {
            name: name.into(),
            storage: Storage::Auto,
            offset,
        }
    }

    pub fn param(name: impl Into<String>, offset: i32) -> Self {
        Self {
            name: name.into(),
            storage: Storage::Param,
            offset,
        }
    }

    /// Does this symbol live in the stack frame?
    pub fn is_frame(&self) -> bool {
        matches!(self.storage, Storage::Auto | Storage::Param)
    }
}

// ============================================================================
// Addressing Operand
// ============================================================================

/// Indexed memory operand: base register, optional scaled index
/// register, byte offset, optional symbol-relative component.
///
/// Invariant: a symbol-relative operand must not carry an index
/// register; the legalizer rejects that combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Addr {
    pub base: RegId,
    pub index: Option<RegId>,
    /// Left shift applied to the index register
    pub scale: u8,
    pub offset: i64,
    pub sym: Option<SymRef>,
}

impl Addr {
    pub fn base_offset(base: RegId, offset: i64) -> Self {
        Self {
            base,
            index: None,
            scale: 0,
            offset,
            sym: None,
        }
    }

    pub fn indexed(base: RegId, index: RegId, scale: u8) -> Self {
        Self {
            base,
            index: Some(index),
            scale,
            offset: 0,
            sym: None,
        }
    }
}

// ============================================================================
// Tree Node
// ============================================================================

/// One expression-tree node. Children are owned exclusively.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub op: Op,
    pub ty: Ty,
    pub left: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
    /// Integer constant (Icon), temporary number (Temp), label (Goto/
    /// CBranch/Label), or byte count (StAsg)
    pub val: i64,
    /// Floating constant (Fcon)
    pub fval: f64,
    /// Symbol reference (Name, symbol-relative Icon, Call target)
    pub sym: Option<SymRef>,
    /// Register slot, bound by the allocator
    pub reg: Option<RegId>,
    /// Legalized address (Oreg)
    pub addr: Option<Addr>,
}

impl Node {
    fn empty(op: Op, ty: Ty) -> Self {
        Self {
            op,
            ty,
            left: None,
            right: None,
            val: 0,
            fval: 0.0,
            sym: None,
            reg: None,
            addr: None,
        }
    }

    // ------------------------------------------------------------------
    // Leaf constructors
    // ------------------------------------------------------------------

    pub fn icon(ty: Ty, value: i64) -> Box<Node> {
        let mut n = Self::empty(Op::Icon, ty);
        n.val = value;
        Box::new(n)
    }

    pub fn fcon(ty: Ty, value: f64) -> Box<Node> {
        let mut n = Self::empty(Op::Fcon, ty);
        n.fval = value;
        Box::new(n)
    }

    pub fn name(ty: Ty, sym: SymRef) -> Box<Node> {
        let mut n = Self::empty(Op::Name, ty);
        n.sym = Some(sym);
        Box::new(n)
    }

    pub fn reg(ty: Ty, reg: RegId) -> Box<Node> {
        let mut n = Self::empty(Op::Reg, ty);
        n.reg = Some(reg);
        Box::new(n)
    }

    pub fn temp(ty: Ty, number: i64) -> Box<Node> {
        let mut n = Self::empty(Op::Temp, ty);
        n.val = number;
        Box::new(n)
    }

    pub fn oreg(ty: Ty, addr: Addr) -> Box<Node> {
        let mut n = Self::empty(Op::Oreg, ty);
        n.addr = Some(addr);
        Box::new(n)
    }

    // ------------------------------------------------------------------
    // Interior constructors
    // ------------------------------------------------------------------

    pub fn unary(op: Op, ty: Ty, child: Box<Node>) -> Box<Node> {
        debug_assert!(op.is_unary());
        let mut n = Self::empty(op, ty);
        n.left = Some(child);
        Box::new(n)
    }

    pub fn binary(op: Op, ty: Ty, left: Box<Node>, right: Box<Node>) -> Box<Node> {
        debug_assert!(op.is_binary() || matches!(op, Op::Assign | Op::StAsg | Op::ArgPair));
        let mut n = Self::empty(op, ty);
        n.left = Some(left);
        n.right = Some(right);
        Box::new(n)
    }

    pub fn deref(ty: Ty, ptr: Box<Node>) -> Box<Node> {
        Self::unary(Op::Deref, ty, ptr)
    }

    pub fn addr_of(inner: Box<Node>) -> Box<Node> {
        Self::unary(Op::Addr, Ty::Ptr, inner)
    }

    pub fn assign(left: Box<Node>, right: Box<Node>) -> Box<Node> {
        let ty = left.ty;
        Self::binary(Op::Assign, ty, left, right)
    }

    /// Build a call node. Arguments become a left-leaning ArgPair
    /// chain (a single argument hangs directly off the call).
    pub fn call(ty: Ty, callee: Box<Node>, args: Vec<Box<Node>>) -> Box<Node> {
        let mut n = Self::empty(Op::Call, ty);
        let mut chain: Option<Box<Node>> = None;
        for arg in args {
            chain = Some(match chain {
                None => arg,
                Some(prev) => Self::binary(Op::ArgPair, Ty::Void, prev, arg),
            });
        }
        n.left = Some(callee);
        n.right = chain;
        Box::new(n)
    }

    pub fn goto(label: i64) -> Box<Node> {
        let mut n = Self::empty(Op::Goto, Ty::Void);
        n.val = label;
        Box::new(n)
    }

    pub fn cbranch(cond: Box<Node>, label: i64) -> Box<Node> {
        debug_assert!(cond.op.is_cmp());
        let mut n = Self::empty(Op::CBranch, Ty::Void);
        n.left = Some(cond);
        n.val = label;
        Box::new(n)
    }

    pub fn label(label: i64) -> Box<Node> {
        let mut n = Self::empty(Op::Label, Ty::Void);
        n.val = label;
        Box::new(n)
    }

    // ------------------------------------------------------------------
    // Rewriting
    // ------------------------------------------------------------------

    /// Replace this node in place with another tree, dropping the old
    /// contents
    pub fn replace(&mut self, new: Box<Node>) {
        *self = *new;
    }

    /// Mark this node consumed. Children are dropped.
    pub fn retire(&mut self) {
        self.op = Op::Free;
        self.left = None;
        self.right = None;
        self.sym = None;
        self.addr = None;
    }

    /// Detach the left child (panics if absent: caller matched the shape)
    pub fn take_left(&mut self) -> Box<Node> {
        self.left.take().expect("node has no left child")
    }

    /// Detach the right child
    pub fn take_right(&mut self) -> Box<Node> {
        self.right.take().expect("node has no right child")
    }

    /// Detach call arguments in source order, consuming the ArgPair
    /// chain
    pub fn take_args(&mut self) -> Vec<Box<Node>> {
        fn walk(n: Box<Node>, out: &mut Vec<Box<Node>>) {
            if n.op == Op::ArgPair {
                let mut n = n;
                let l = n.take_left();
                let r = n.take_right();
                walk(l, out);
                walk(r, out);
            } else {
                out.push(n);
            }
        }
        let mut out = Vec::new();
        if let Some(chain) = self.right.take() {
            walk(chain, &mut out);
        }
        out
    }

    /// Collect call arguments in source order from the ArgPair chain
    pub fn collect_args(&self) -> Vec<&Node> {
        fn walk<'a>(n: &'a Node, out: &mut Vec<&'a Node>) {
            if n.op == Op::ArgPair {
                if let Some(l) = &n.left {
                    walk(l, out);
                }
                if let Some(r) = &n.right {
                    walk(r, out);
                }
            } else {
                out.push(n);
            }
        }
        let mut out = Vec::new();
        if let Some(r) = &self.right {
            walk(r, &mut out);
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================
