//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// 32-bit ARM target
//
// AAPCS base standard: arguments in r0-r3 with 64-bit values in even
// register pairs, results in r0 (r0/r1 for pairs), eight-byte stack
// alignment at call sites. Floating values cross call boundaries in
// core registers; with hardware float enabled they live in the d
// registers between calls and the engine bridges the two with vmov
// moves.
//
// Operations the instruction set lacks (division on pre-v7 cores,
// 64-bit and soft-float arithmetic) lower to the EABI runtime
// library, either through fixed-register table entries or by
// rewriting the tree into an ordinary call.
//

pub mod table;

use crate::callconv::CallRules;
use crate::hooks::{FixedRegs, Rewrite, TargetHooks};
use crate::regmodel::{ColorMap, RegClass, RegDef, RegFile, RegId};
use crate::table::Pattern;
use crate::target::{Features, Target};
use crate::tree::{Node, Op, SymRef, Ty};
use std::cell::Cell;

// ============================================================================
// Register File
// ============================================================================

pub const R0: RegId = 0;
pub const R1: RegId = 1;
pub const R2: RegId = 2;
pub const R3: RegId = 3;
pub const R4: RegId = 4;
pub const R5: RegId = 5;
pub const R6: RegId = 6;
pub const R7: RegId = 7;
pub const R8: RegId = 8;
pub const R9: RegId = 9;
pub const R10: RegId = 10;
pub const FP: RegId = 11;
pub const IP: RegId = 12;
pub const SP: RegId = 13;
pub const LR: RegId = 14;
pub const R0R1: RegId = 15;
pub const R2R3: RegId = 16;
pub const R4R5: RegId = 17;
pub const R6R7: RegId = 18;
pub const R8R9: RegId = 19;
pub const D0: RegId = 20;
pub const D1: RegId = 21;
pub const D2: RegId = 22;
pub const D3: RegId = 23;
pub const D4: RegId = 24;
pub const D5: RegId = 25;
pub const D6: RegId = 26;
pub const D7: RegId = 27;
pub const D8: RegId = 28;
pub const D9: RegId = 29;
pub const D10: RegId = 30;
pub const D11: RegId = 31;
pub const D12: RegId = 32;
pub const D13: RegId = 33;
pub const D14: RegId = 34;
pub const D15: RegId = 35;

static REGS: [RegDef; 36] = [
    RegDef { name: "r0", class: RegClass::A, temporary: true, overlaps: &[R0R1] },
    RegDef { name: "r1", class: RegClass::A, temporary: true, overlaps: &[R0R1] },
    RegDef { name: "r2", class: RegClass::A, temporary: true, overlaps: &[R2R3] },
    RegDef { name: "r3", class: RegClass::A, temporary: true, overlaps: &[R2R3] },
    RegDef { name: "r4", class: RegClass::A, temporary: false, overlaps: &[R4R5] },
    RegDef { name: "r5", class: RegClass::A, temporary: false, overlaps: &[R4R5] },
    RegDef { name: "r6", class: RegClass::A, temporary: false, overlaps: &[R6R7] },
    RegDef { name: "r7", class: RegClass::A, temporary: false, overlaps: &[R6R7] },
    RegDef { name: "r8", class: RegClass::A, temporary: false, overlaps: &[R8R9] },
    RegDef { name: "r9", class: RegClass::A, temporary: false, overlaps: &[R8R9] },
    RegDef { name: "r10", class: RegClass::A, temporary: false, overlaps: &[] },
    RegDef { name: "fp", class: RegClass::A, temporary: false, overlaps: &[] },
    RegDef { name: "ip", class: RegClass::A, temporary: true, overlaps: &[] },
    RegDef { name: "sp", class: RegClass::A, temporary: false, overlaps: &[] },
    RegDef { name: "lr", class: RegClass::A, temporary: true, overlaps: &[] },
    RegDef { name: "r0", class: RegClass::B, temporary: true, overlaps: &[R0, R1] },
    RegDef { name: "r2", class: RegClass::B, temporary: true, overlaps: &[R2, R3] },
    RegDef { name: "r4", class: RegClass::B, temporary: false, overlaps: &[R4, R5] },
    RegDef { name: "r6", class: RegClass::B, temporary: false, overlaps: &[R6, R7] },
    RegDef { name: "r8", class: RegClass::B, temporary: false, overlaps: &[R8, R9] },
    RegDef { name: "d0", class: RegClass::C, temporary: true, overlaps: &[] },
    RegDef { name: "d1", class: RegClass::C, temporary: true, overlaps: &[] },
    RegDef { name: "d2", class: RegClass::C, temporary: true, overlaps: &[] },
    RegDef { name: "d3", class: RegClass::C, temporary: true, overlaps: &[] },
    RegDef { name: "d4", class: RegClass::C, temporary: true, overlaps: &[] },
    RegDef { name: "d5", class: RegClass::C, temporary: true, overlaps: &[] },
    RegDef { name: "d6", class: RegClass::C, temporary: true, overlaps: &[] },
    // d7 holds s14/s15, the conversion scratch; never allocated
    RegDef { name: "d7", class: RegClass::C, temporary: true, overlaps: &[] },
    RegDef { name: "d8", class: RegClass::C, temporary: false, overlaps: &[] },
    RegDef { name: "d9", class: RegClass::C, temporary: false, overlaps: &[] },
    RegDef { name: "d10", class: RegClass::C, temporary: false, overlaps: &[] },
    RegDef { name: "d11", class: RegClass::C, temporary: false, overlaps: &[] },
    RegDef { name: "d12", class: RegClass::C, temporary: false, overlaps: &[] },
    RegDef { name: "d13", class: RegClass::C, temporary: false, overlaps: &[] },
    RegDef { name: "d14", class: RegClass::C, temporary: false, overlaps: &[] },
    RegDef { name: "d15", class: RegClass::C, temporary: false, overlaps: &[] },
];

// fp, sp, lr and the d7 scratch stay out of the allocation order
static REGFILE: RegFile = RegFile {
    allocatable: &[
        R0, R1, R2, R3, IP, R4, R5, R6, R7, R8, R9, R10,
        R0R1, R2R3, R4R5, R6R7, R8R9,
        D0, D1, D2, D3, D4, D5, D6,
        D8, D9, D10, D11, D12, D13, D14, D15,
    ],
    regs: &REGS,
    colormap: ColorMap {
        capacity: [12, 5, 15],
        weight: [
            // a live single may shadow one pair
            [1, 1, 0],
            // a live pair holds two singles
            [2, 1, 0],
            [0, 0, 1],
        ],
    },
};

static RULES: CallRules = CallRules {
    arg_regs: &[R0, R1, R2, R3],
    arg_pairs: &[R0R1, R2R3],
    max_units: 4,
    ret_reg: R0,
    ret_pair: R0R1,
    ret_float: D0,
    // AAPCS base standard: floats return in core registers
    float_ret_in_float_reg: false,
    stack_align: 8,
    callee_pops: false,
};

/// Registers an EABI runtime helper may clobber beyond its
/// argument/result registers
static AEABI_CLOBBERS: [RegId; 4] = [R2, R3, IP, LR];

// ============================================================================
// Target Descriptor
// ============================================================================

pub struct ArmTarget {
    target: Target,
    // Counts down; front-end temporaries use non-negative numbers
    scratch_temps: Cell<i64>,
}

impl ArmTarget {
    pub fn new(target: Target) -> Self {
        debug_assert!(REGFILE.validate().is_ok());
        Self {
            target,
            scratch_temps: Cell::new(0),
        }
    }

    fn hardware_float(&self) -> bool {
        self.target.features.contains(Features::HARDWARE_FLOAT)
    }

    /// Fresh temporary number for a rewrite that must name an operand
    /// value more than once
    fn scratch_temp(&self) -> i64 {
        let n = self.scratch_temps.get() - 1;
        self.scratch_temps.set(n);
        n
    }

    /// Rewrite a binary node into a call to an EABI runtime helper
    /// with the same operands
    fn runtime_call(&self, n: &Node, func: &str) -> Rewrite {
        let (l, r) = match (&n.left, &n.right) {
            (Some(l), Some(r)) => (l.clone(), r.clone()),
            _ => return Rewrite::NoMatch,
        };
        Rewrite::Rewritten(Node::call(
            n.ty,
            Node::name(Ty::Ptr, SymRef::external(func)),
            vec![l, r],
        ))
    }

    /// Rewrite a comparison into `helper(l, r) <op> 0`
    fn compare_through(&self, n: &Node, func: &str, op: Op) -> Rewrite {
        let (l, r) = match (&n.left, &n.right) {
            (Some(l), Some(r)) => (l.clone(), r.clone()),
            _ => return Rewrite::NoMatch,
        };
        let call = Node::call(
            Ty::I32,
            Node::name(Ty::Ptr, SymRef::external(func)),
            vec![l, r],
        );
        Rewrite::Rewritten(Node::binary(op, n.ty, call, Node::icon(Ty::I32, 0)))
    }

    /// Relational 64-bit comparisons go through the three-way compare
    /// helpers; its signed -1/0/1 result is compared against zero.
    /// Equality stays in the table (two cmp instructions).
    fn wide_compare(&self, n: &Node) -> Rewrite {
        let op = match n.op {
            Op::Lt | Op::ULt => Op::Lt,
            Op::Le | Op::ULe => Op::Le,
            Op::Gt | Op::UGt => Op::Gt,
            Op::Ge | Op::UGe => Op::Ge,
            _ => return Rewrite::NoMatch,
        };
        let func = if matches!(n.op, Op::ULt | Op::ULe | Op::UGt | Op::UGe) {
            "__aeabi_ulcmp"
        } else {
            "__aeabi_lcmp"
        };
        self.compare_through(n, func, op)
    }

    /// Soft-float comparison helpers return 1 when the named relation
    /// holds (0 for __aeabi_?cmpeq on inequality)
    fn soft_float_compare(&self, n: &Node, ty: Ty) -> Rewrite {
        let prefix = if ty == Ty::F64 {
            "__aeabi_dcmp"
        } else {
            "__aeabi_fcmp"
        };
        let (suffix, op) = match n.op {
            Op::Eq => ("eq", Op::Ne),
            Op::Ne => ("eq", Op::Eq),
            Op::Lt => ("lt", Op::Ne),
            Op::Le => ("le", Op::Ne),
            Op::Gt => ("gt", Op::Ne),
            Op::Ge => ("ge", Op::Ne),
            _ => return Rewrite::NoMatch,
        };
        self.compare_through(n, &format!("{}{}", prefix, suffix), op)
    }

    /// Single-precision arithmetic widens to double: VFP computes in
    /// f64 and the result converts back down
    fn promote_f32(&self, n: &Node) -> Rewrite {
        let (l, r) = match (&n.left, &n.right) {
            (Some(l), Some(r)) => (l.clone(), r.clone()),
            _ => return Rewrite::NoMatch,
        };
        let wide = Node::binary(
            n.op,
            Ty::F64,
            Node::unary(Op::Conv, Ty::F64, l),
            Node::unary(Op::Conv, Ty::F64, r),
        );
        Rewrite::Rewritten(Node::unary(Op::Conv, Ty::F32, wide))
    }

    fn promote_f32_cmp(&self, n: &Node) -> Rewrite {
        let (l, r) = match (&n.left, &n.right) {
            (Some(l), Some(r)) => (l.clone(), r.clone()),
            _ => return Rewrite::NoMatch,
        };
        Rewrite::Rewritten(Node::binary(
            n.op,
            n.ty,
            Node::unary(Op::Conv, Ty::F64, l),
            Node::unary(Op::Conv, Ty::F64, r),
        ))
    }
}

impl TargetHooks for ArmTarget {
    fn target(&self) -> &Target {
        &self.target
    }

    fn regfile(&self) -> &RegFile {
        &REGFILE
    }

    fn table(&self) -> &'static [Pattern] {
        &table::PATTERNS
    }

    fn call_rules(&self) -> &CallRules {
        &RULES
    }

    fn frame_pointer(&self) -> RegId {
        FP
    }

    fn class_for_type(&self, ty: Ty) -> RegClass {
        match ty {
            Ty::F64 if self.hardware_float() => RegClass::C,
            Ty::F64 => RegClass::B,
            t if t.is_wide() => RegClass::B,
            // f32 travels as raw bits in a core register; VFP touches
            // it only inside conversion sequences
            _ => RegClass::A,
        }
    }

    fn legal_offset(&self, ty: Ty, offset: i64) -> bool {
        match ty {
            // ldrh/ldrsh/ldrsb take the short addressing mode
            Ty::I8 | Ty::I16 | Ty::U16 => (-255..=255).contains(&offset),
            // split into two word accesses at offset and offset+4
            Ty::I64 | Ty::U64 => (-4095..=4091).contains(&offset),
            Ty::F64 if self.hardware_float() => {
                offset % 4 == 0 && (-1020..=1020).contains(&offset)
            }
            Ty::F64 => (-4095..=4091).contains(&offset),
            _ => (-4095..=4095).contains(&offset),
        }
    }

    fn legal_scale(&self, ty: Ty, scale: u8) -> bool {
        match ty {
            Ty::I32 | Ty::U32 | Ty::Ptr | Ty::F32 | Ty::U8 => scale <= 3,
            // register-offset form without a shift
            Ty::I8 | Ty::I16 | Ty::U16 => scale == 0,
            _ => false,
        }
    }

    /// Eight significant bits, rotated right by an even amount
    fn legal_immediate(&self, val: i64) -> bool {
        if !(0..=0xffff_ffff).contains(&val) {
            return false;
        }
        let v = val as u32;
        (0u32..16).any(|r| v.rotate_left(r * 2) <= 0xff)
    }

    fn rewrite_binary(&self, n: &Node) -> Rewrite {
        let hw = self.hardware_float();
        let operand_ty = match n.left.as_deref() {
            Some(l) => l.ty,
            None => return Rewrite::NoMatch,
        };
        match n.op {
            Op::Mul if n.ty.is_wide() => self.runtime_call(n, "__aeabi_lmul"),
            Op::Div if n.ty.is_wide() && n.ty.is_unsigned() => {
                self.runtime_call(n, "__aeabi_uldivmod")
            }
            Op::Div if n.ty.is_wide() => self.runtime_call(n, "__aeabi_ldivmod"),
            Op::Mod if n.ty.is_wide() => {
                // t1 - (t1 / t2) * t2 with each operand evaluated into
                // a temporary exactly once
                let (l, r) = match (&n.left, &n.right) {
                    (Some(l), Some(r)) => (l.clone(), r.clone()),
                    _ => return Rewrite::NoMatch,
                };
                let (t1, t2) = (self.scratch_temp(), self.scratch_temp());
                let quot = Node::binary(
                    Op::Div,
                    n.ty,
                    Node::assign(Node::temp(n.ty, t1), l),
                    Node::assign(Node::temp(n.ty, t2), r),
                );
                let prod = Node::binary(Op::Mul, n.ty, quot, Node::temp(n.ty, t2));
                Rewrite::Rewritten(Node::binary(Op::Minus, n.ty, Node::temp(n.ty, t1), prod))
            }
            Op::Lsh if n.ty.is_wide() => self.runtime_call(n, "__aeabi_llsl"),
            Op::Rsh if n.ty.is_wide() && n.ty.is_unsigned() => {
                self.runtime_call(n, "__aeabi_llsr")
            }
            Op::Rsh if n.ty.is_wide() => self.runtime_call(n, "__aeabi_lasr"),
            Op::Plus | Op::Minus | Op::Mul | Op::Div if n.ty == Ty::F32 && hw => {
                self.promote_f32(n)
            }
            Op::Plus if n.ty == Ty::F64 => self.runtime_call(n, "__aeabi_dadd"),
            Op::Minus if n.ty == Ty::F64 => self.runtime_call(n, "__aeabi_dsub"),
            Op::Mul if n.ty == Ty::F64 => self.runtime_call(n, "__aeabi_dmul"),
            Op::Div if n.ty == Ty::F64 => self.runtime_call(n, "__aeabi_ddiv"),
            Op::Plus if n.ty == Ty::F32 => self.runtime_call(n, "__aeabi_fadd"),
            Op::Minus if n.ty == Ty::F32 => self.runtime_call(n, "__aeabi_fsub"),
            Op::Mul if n.ty == Ty::F32 => self.runtime_call(n, "__aeabi_fmul"),
            Op::Div if n.ty == Ty::F32 => self.runtime_call(n, "__aeabi_fdiv"),
            // no hardware multiply: libgcc integer multiply
            Op::Mul => self.runtime_call(n, "__mulsi3"),
            op if op.is_cmp() && operand_ty.is_wide() => self.wide_compare(n),
            op if op.is_cmp() && operand_ty == Ty::F32 && hw => self.promote_f32_cmp(n),
            op if op.is_cmp() && operand_ty.is_float() => {
                self.soft_float_compare(n, operand_ty)
            }
            _ => Rewrite::NoMatch,
        }
    }

    /// Stores to static/external storage go through the symbol's
    /// address constant; there is no absolute-address store form
    fn rewrite_assign(&self, n: &Node) -> Rewrite {
        let l = match n.left.as_deref() {
            Some(l) => l,
            None => return Rewrite::NoMatch,
        };
        if l.op != Op::Name || l.sym.as_ref().map(|s| s.is_frame()).unwrap_or(true) {
            return Rewrite::NoMatch;
        }
        let r = match &n.right {
            Some(r) => r.clone(),
            None => return Rewrite::NoMatch,
        };
        let mut addr = Node::icon(Ty::Ptr, 0);
        addr.sym = l.sym.clone();
        Rewrite::Rewritten(Node::assign(Node::deref(l.ty, addr), r))
    }

    fn rewrite_deref(&self, _n: &Node) -> Rewrite {
        Rewrite::NoMatch
    }

    /// Loads from static/external storage likewise indirect through
    /// the address constant
    fn rewrite_name(&self, n: &Node) -> Rewrite {
        match &n.sym {
            Some(s) if !s.is_frame() => {
                let mut addr = Node::icon(Ty::Ptr, 0);
                addr.sym = n.sym.clone();
                Rewrite::Rewritten(Node::deref(n.ty, addr))
            }
            _ => Rewrite::NoMatch,
        }
    }

    fn fixed_registers(&self, p: &Pattern) -> FixedRegs {
        let callee = match p.template.strip_prefix("bl\t") {
            Some(c) => c,
            None => return FixedRegs::FREE,
        };
        fn unary(left: RegId, result: RegId) -> FixedRegs {
            FixedRegs {
                left: Some(left),
                right: None,
                result: Some(result),
                never: &AEABI_CLOBBERS,
            }
        }
        match callee {
            "__aeabi_idiv" | "__aeabi_uidiv" => FixedRegs {
                left: Some(R0),
                right: Some(R1),
                result: Some(R0),
                never: &AEABI_CLOBBERS,
            },
            // quotient in r0, remainder in r1
            "__aeabi_idivmod" | "__aeabi_uidivmod" => FixedRegs {
                left: Some(R0),
                right: Some(R1),
                result: Some(R1),
                never: &AEABI_CLOBBERS,
            },
            "__aeabi_i2d" | "__aeabi_ui2d" | "__aeabi_f2d" => unary(R0, R0R1),
            "__aeabi_d2iz" | "__aeabi_d2uiz" | "__aeabi_d2f" => unary(R0R1, R0),
            "__aeabi_i2f" | "__aeabi_ui2f" | "__aeabi_f2iz" | "__aeabi_f2uiz" => unary(R0, R0),
            "__aeabi_l2d" | "__aeabi_ul2d" | "__aeabi_d2lz" | "__aeabi_d2ulz" => {
                unary(R0R1, R0R1)
            }
            "__aeabi_l2f" | "__aeabi_ul2f" => unary(R0R1, R0),
            "__aeabi_f2lz" | "__aeabi_f2ulz" => unary(R0, R0R1),
            _ => FixedRegs::FREE,
        }
    }

    /// vmov bridges the core and VFP banks; everything else is mov
    fn mov_reg(&self, dst: RegId, src: RegId) -> String {
        let file = self.regfile();
        match (file.def(dst).class, file.def(src).class) {
            (RegClass::C, RegClass::C) => {
                format!("vmov.f64\t{},{}", file.name(dst), file.name(src))
            }
            (RegClass::C, RegClass::B) => match file.pair_halves(src) {
                Some((lo, hi)) => format!(
                    "vmov\t{},{},{}",
                    file.name(dst),
                    file.name(lo),
                    file.name(hi)
                ),
                None => format!("vmov\t{},{}", file.name(dst), file.name(src)),
            },
            (RegClass::B, RegClass::C) => match file.pair_halves(dst) {
                Some((lo, hi)) => format!(
                    "vmov\t{},{},{}",
                    file.name(lo),
                    file.name(hi),
                    file.name(src)
                ),
                None => format!("vmov\t{},{}", file.name(dst), file.name(src)),
            },
            _ => format!("mov\t{},{}", file.name(dst), file.name(src)),
        }
    }

    fn load_float(&self, dst: RegId, label: &str) -> String {
        let file = self.regfile();
        if file.def(dst).class == RegClass::C {
            format!("vldr\t{},{}", file.name(dst), label)
        } else {
            format!("ldr\t{},{}", file.name(dst), label)
        }
    }

    fn block_copy_regs(&self) -> (RegId, RegId, RegId) {
        (R0, R1, R2)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Arch, Os};

    fn arm() -> ArmTarget {
        ArmTarget::new(Target::new(Arch::Arm, Os::Linux))
    }

    fn arm_soft() -> ArmTarget {
        ArmTarget::new(
            Target::new(Arch::Arm, Os::Linux).with_features(Features::MULTIPLY),
        )
    }

    #[test]
    fn test_regfile_valid() {
        assert!(REGFILE.validate().is_ok());
    }

    #[test]
    fn test_pair_halves() {
        assert_eq!(REGFILE.pair_halves(R0R1), Some((R0, R1)));
        assert_eq!(REGFILE.pair_halves(R8R9), Some((R8, R9)));
        assert_eq!(REGFILE.pair_halves(R0), None);
        assert_eq!(REGFILE.pair_halves(D0), None);
    }

    #[test]
    fn test_scratch_never_allocatable() {
        for r in [FP, SP, LR, D7] {
            assert!(!REGFILE.allocatable.contains(&r));
        }
    }

    #[test]
    fn test_rotated_immediates() {
        let t = arm();
        assert!(t.legal_immediate(0));
        assert!(t.legal_immediate(255));
        // 1 rotated into bit 8
        assert!(t.legal_immediate(256));
        assert!(t.legal_immediate(0x104));
        assert!(t.legal_immediate(0xff000000));
        assert!(!t.legal_immediate(0x101));
        assert!(!t.legal_immediate(0x102030));
        assert!(!t.legal_immediate(-1));
        assert!(!t.legal_immediate(1i64 << 33));
    }

    #[test]
    fn test_offset_ranges() {
        let t = arm();
        assert!(t.legal_offset(Ty::I32, 4095));
        assert!(t.legal_offset(Ty::I32, -4095));
        assert!(!t.legal_offset(Ty::I32, 4096));
        assert!(t.legal_offset(Ty::I16, 255));
        assert!(!t.legal_offset(Ty::I16, 256));
        assert!(!t.legal_offset(Ty::U16, 4096));
        // both words of a pair must stay encodable
        assert!(t.legal_offset(Ty::I64, 4091));
        assert!(!t.legal_offset(Ty::I64, 4092));
        // vldr: word-aligned, ten bits
        assert!(t.legal_offset(Ty::F64, 1020));
        assert!(!t.legal_offset(Ty::F64, 1022));
        assert!(!t.legal_offset(Ty::F64, 1024));
    }

    #[test]
    fn test_soft_float_offsets_widen() {
        let t = arm_soft();
        assert!(t.legal_offset(Ty::F64, 2048));
        assert!(!t.legal_offset(Ty::F64, 4092));
    }

    #[test]
    fn test_class_for_type() {
        let hw = arm();
        assert_eq!(hw.class_for_type(Ty::F64), RegClass::C);
        assert_eq!(hw.class_for_type(Ty::F32), RegClass::A);
        assert_eq!(hw.class_for_type(Ty::I64), RegClass::B);
        assert_eq!(hw.class_for_type(Ty::I32), RegClass::A);

        let soft = arm_soft();
        assert_eq!(soft.class_for_type(Ty::F64), RegClass::B);
        assert_eq!(soft.class_for_type(Ty::F32), RegClass::A);
    }

    #[test]
    fn test_scale_rules() {
        let t = arm();
        assert!(t.legal_scale(Ty::I32, 2));
        assert!(t.legal_scale(Ty::U8, 0));
        assert!(!t.legal_scale(Ty::I32, 4));
        assert!(t.legal_scale(Ty::I16, 0));
        assert!(!t.legal_scale(Ty::I16, 1));
        assert!(!t.legal_scale(Ty::I64, 0));
        assert!(!t.legal_scale(Ty::F64, 0));
    }

    #[test]
    fn test_division_uses_fixed_registers() {
        let t = arm();
        let p = table::PATTERNS
            .iter()
            .find(|p| p.template == "bl\t__aeabi_idiv")
            .unwrap();
        let fixed = t.fixed_registers(p);
        assert_eq!(fixed.left, Some(R0));
        assert_eq!(fixed.right, Some(R1));
        assert_eq!(fixed.result, Some(R0));
        assert!(fixed.never.contains(&R2));
        assert!(fixed.never.contains(&LR));
    }

    #[test]
    fn test_remainder_comes_back_in_r1() {
        let t = arm();
        let p = table::PATTERNS
            .iter()
            .find(|p| p.template == "bl\t__aeabi_idivmod")
            .unwrap();
        assert_eq!(t.fixed_registers(p).result, Some(R1));
    }

    #[test]
    fn test_mov_reg_bridges_banks() {
        let t = arm();
        assert_eq!(t.mov_reg(R1, R0), "mov\tr1,r0");
        assert_eq!(t.mov_reg(D1, D0), "vmov.f64\td1,d0");
        assert_eq!(t.mov_reg(D0, R0R1), "vmov\td0,r0,r1");
        assert_eq!(t.mov_reg(R2R3, D5), "vmov\tr2,r3,d5");
    }

    #[test]
    fn test_wide_mod_expands_to_div_mul_sub() {
        let t = arm();
        let n = Node::binary(
            Op::Mod,
            Ty::I64,
            Node::reg(Ty::I64, R0R1),
            Node::reg(Ty::I64, R2R3),
        );
        match t.rewrite_binary(&n) {
            Rewrite::Rewritten(new) => {
                assert_eq!(new.op, Op::Minus);
                let t1 = new.left.as_ref().unwrap();
                assert_eq!(t1.op, Op::Temp);
                let prod = new.right.as_ref().unwrap();
                assert_eq!(prod.op, Op::Mul);
                let quot = prod.left.as_ref().unwrap();
                assert_eq!(quot.op, Op::Div);
                // Each original operand appears exactly once, under an
                // assignment into a temporary; every other reference
                // reuses the temporary.
                let lv = quot.left.as_ref().unwrap();
                let rv = quot.right.as_ref().unwrap();
                assert_eq!(lv.op, Op::Assign);
                assert_eq!(rv.op, Op::Assign);
                assert_eq!(lv.right.as_ref().unwrap().reg, Some(R0R1));
                assert_eq!(rv.right.as_ref().unwrap().reg, Some(R2R3));
                assert_eq!(lv.left.as_ref().unwrap().val, t1.val);
                let t2 = prod.right.as_ref().unwrap();
                assert_eq!(t2.op, Op::Temp);
                assert_eq!(rv.left.as_ref().unwrap().val, t2.val);
                assert_ne!(t1.val, t2.val);
            }
            Rewrite::NoMatch => panic!("expected rewrite"),
        }
    }

    #[test]
    fn test_soft_double_add_calls_runtime() {
        let t = arm_soft();
        let n = Node::binary(
            Op::Plus,
            Ty::F64,
            Node::reg(Ty::F64, R0R1),
            Node::reg(Ty::F64, R2R3),
        );
        match t.rewrite_binary(&n) {
            Rewrite::Rewritten(new) => {
                assert_eq!(new.op, Op::Call);
                assert_eq!(new.left.as_ref().unwrap().sym.as_ref().unwrap().name, "__aeabi_dadd");
            }
            Rewrite::NoMatch => panic!("expected rewrite"),
        }
    }

    #[test]
    fn test_f32_arithmetic_promotes_under_vfp() {
        let t = arm();
        let n = Node::binary(
            Op::Mul,
            Ty::F32,
            Node::reg(Ty::F32, R0),
            Node::reg(Ty::F32, R1),
        );
        match t.rewrite_binary(&n) {
            Rewrite::Rewritten(new) => {
                assert_eq!(new.op, Op::Conv);
                assert_eq!(new.ty, Ty::F32);
                let inner = new.left.as_ref().unwrap();
                assert_eq!(inner.op, Op::Mul);
                assert_eq!(inner.ty, Ty::F64);
            }
            Rewrite::NoMatch => panic!("expected rewrite"),
        }
    }

    #[test]
    fn test_wide_relational_goes_through_lcmp() {
        let t = arm();
        let n = Node::binary(
            Op::ULt,
            Ty::I32,
            Node::reg(Ty::U64, R0R1),
            Node::reg(Ty::U64, R2R3),
        );
        match t.rewrite_binary(&n) {
            Rewrite::Rewritten(new) => {
                assert_eq!(new.op, Op::Lt);
                let call = new.left.as_ref().unwrap();
                assert_eq!(call.op, Op::Call);
                assert_eq!(call.left.as_ref().unwrap().sym.as_ref().unwrap().name, "__aeabi_ulcmp");
            }
            Rewrite::NoMatch => panic!("expected rewrite"),
        }
    }

    #[test]
    fn test_wide_equality_stays_in_table() {
        let t = arm();
        let n = Node::binary(
            Op::Eq,
            Ty::I32,
            Node::reg(Ty::I64, R0R1),
            Node::reg(Ty::I64, R2R3),
        );
        assert!(matches!(t.rewrite_binary(&n), Rewrite::NoMatch));
    }

    #[test]
    fn test_global_store_rewrites_to_indirection() {
        let t = arm();
        let n = Node::assign(
            Node::name(Ty::I32, SymRef::external("counter")),
            Node::reg(Ty::I32, R0),
        );
        match t.rewrite_assign(&n) {
            Rewrite::Rewritten(new) => {
                assert_eq!(new.op, Op::Assign);
                let dest = new.left.as_ref().unwrap();
                assert_eq!(dest.op, Op::Deref);
                let addr = dest.left.as_ref().unwrap();
                assert_eq!(addr.op, Op::Icon);
                assert_eq!(addr.sym.as_ref().unwrap().name, "counter");
            }
            Rewrite::NoMatch => panic!("expected rewrite"),
        }
    }

    #[test]
    fn test_frame_store_not_rewritten() {
        let t = arm();
        let n = Node::assign(
            Node::name(Ty::I32, SymRef::auto("x", -8)),
            Node::reg(Ty::I32, R0),
        );
        assert!(matches!(t.rewrite_assign(&n), Rewrite::NoMatch));
    }

    #[test]
    fn test_global_load_rewrites_to_indirection() {
        let t = arm();
        let n = Node::name(Ty::I32, SymRef::stat("tbl"));
        match t.rewrite_name(&n) {
            Rewrite::Rewritten(new) => {
                assert_eq!(new.op, Op::Deref);
                assert_eq!(new.ty, Ty::I32);
            }
            Rewrite::NoMatch => panic!("expected rewrite"),
        }
        let frame = Node::name(Ty::I32, SymRef::param("a", 8));
        assert!(matches!(t.rewrite_name(&frame), Rewrite::NoMatch));
    }
}
