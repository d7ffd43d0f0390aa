//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// ARM instruction-pattern table
//
// Scanned top to bottom, first match wins. Feature-gated fast forms
// (sdiv, umull, VFP arithmetic) sit above their runtime-call
// fallbacks; entries whose template is a `bl` to an EABI helper get
// their operand registers pinned by fixed_registers in the parent
// module. Conversion entries carry the result-type constraint in the
// otherwise unused right position.
//

use crate::regmodel::RegClass;
use crate::table::{
    Binding, Goal, Needs, OperandSpec, Pattern, Shape, S_MEM, S_RC, T_BYTE, T_HALF, T_WIDE,
    T_WORD, TypeSet,
};
use crate::target::Features;
use crate::tree::Op;

const fn e(
    op: Op,
    goal: Goal,
    left: OperandSpec,
    right: OperandSpec,
    needs: Needs,
    result: Binding,
    features: Features,
    template: &'static str,
) -> Pattern {
    Pattern {
        op,
        goal,
        left,
        right,
        needs,
        result,
        features,
        template,
    }
}

const fn opnd(shape: Shape, types: TypeSet) -> OperandSpec {
    OperandSpec::new(shape, types)
}

/// Result-type constraint for a conversion entry
const fn res(types: TypeSet) -> OperandSpec {
    OperandSpec::new(Shape::NONE, types)
}

const NONE: OperandSpec = OperandSpec::NONE;

// word-or-narrower integral types
const T_NARROW: TypeSet = T_WORD.union(T_HALF).union(T_BYTE);
const T_SWORD: TypeSet = TypeSet::I32.union(TypeSet::I16).union(TypeSet::I8);
const T_UWORD: TypeSet = TypeSet::U32
    .union(TypeSet::U16)
    .union(TypeSet::U8)
    .union(TypeSet::PTR);
// f32 loads and stores with the plain word instructions
const T_LDRW: TypeSet = T_WORD.union(TypeSet::F32);

const GA: Goal = Goal::CLASS_A;
const GB: Goal = Goal::CLASS_B;
const GC: Goal = Goal::CLASS_C;
const GBC: Goal = Goal::CLASS_B.union(Goal::CLASS_C);
const EA: Goal = Goal::EFFECT.union(Goal::CLASS_A);
const EB: Goal = Goal::EFFECT.union(Goal::CLASS_B);
const EC: Goal = Goal::EFFECT.union(Goal::CLASS_C);
const EFF: Goal = Goal::EFFECT;

const NA: Needs = Needs::reg(RegClass::A);
const NB: Needs = Needs::reg(RegClass::B);
const NC: Needs = Needs::reg(RegClass::C);
const N0: Needs = Needs::NONE;

const NOF: Features = Features::empty();
const HF: Features = Features::HARDWARE_FLOAT;
const MUL: Features = Features::MULTIPLY;
const DIV: Features = Features::DIVIDE;
const DIVMUL: Features = Features::DIVIDE.union(Features::MULTIPLY);

pub static PATTERNS: [Pattern; 147] = [
    // ====================================================================
    // Loads: indexed operands
    // ====================================================================
    e(Op::Oreg, GA, opnd(Shape::OREG, T_LDRW), NONE, NA, Binding::Temp1, NOF, "ldr\tA1,AL"),
    e(Op::Oreg, GA, opnd(Shape::OREG, TypeSet::U8), NONE, NA, Binding::Temp1, NOF, "ldrb\tA1,AL"),
    e(Op::Oreg, GA, opnd(Shape::OREG, TypeSet::I8), NONE, NA, Binding::Temp1, NOF, "ldrsb\tA1,AL"),
    e(Op::Oreg, GA, opnd(Shape::OREG, TypeSet::U16), NONE, NA, Binding::Temp1, NOF, "ldrh\tA1,AL"),
    e(Op::Oreg, GA, opnd(Shape::OREG, TypeSet::I16), NONE, NA, Binding::Temp1, NOF, "ldrsh\tA1,AL"),
    e(Op::Oreg, GB, opnd(Shape::OREG, T_WIDE), NONE, NB, Binding::Temp1, NOF, "ldr\tA1,AL\nldr\tU1,UL"),
    e(Op::Oreg, GC, opnd(Shape::OREG, TypeSet::F64), NONE, NC, Binding::Temp1, HF, "vldr\tA1,AL"),
    e(Op::Oreg, GB, opnd(Shape::OREG, TypeSet::F64), NONE, NB, Binding::Temp1, NOF, "ldr\tA1,AL\nldr\tU1,UL"),

    // ====================================================================
    // Loads: frame locals
    // ====================================================================
    e(Op::Name, GA, opnd(Shape::NAME, T_LDRW), NONE, NA, Binding::Temp1, NOF, "ldr\tA1,AL"),
    e(Op::Name, GA, opnd(Shape::NAME, TypeSet::U8), NONE, NA, Binding::Temp1, NOF, "ldrb\tA1,AL"),
    e(Op::Name, GA, opnd(Shape::NAME, TypeSet::I8), NONE, NA, Binding::Temp1, NOF, "ldrsb\tA1,AL"),
    e(Op::Name, GA, opnd(Shape::NAME, TypeSet::U16), NONE, NA, Binding::Temp1, NOF, "ldrh\tA1,AL"),
    e(Op::Name, GA, opnd(Shape::NAME, TypeSet::I16), NONE, NA, Binding::Temp1, NOF, "ldrsh\tA1,AL"),
    e(Op::Name, GB, opnd(Shape::NAME, T_WIDE), NONE, NB, Binding::Temp1, NOF, "ldr\tA1,AL\nldr\tU1,UL"),
    e(Op::Name, GC, opnd(Shape::NAME, TypeSet::F64), NONE, NC, Binding::Temp1, HF, "vldr\tA1,AL"),
    e(Op::Name, GB, opnd(Shape::NAME, TypeSet::F64), NONE, NB, Binding::Temp1, NOF, "ldr\tA1,AL\nldr\tU1,UL"),

    // ====================================================================
    // Constants (the selector has already filtered unencodable ones)
    // ====================================================================
    e(Op::Icon, GA, opnd(Shape::CON, T_NARROW), NONE, NA, Binding::Temp1, NOF, "mov\tA1,AL"),
    e(Op::Icon, GB, opnd(Shape::CON, T_WIDE), NONE, NB, Binding::Temp1, NOF, "mov\tA1,AL\nmov\tU1,UL"),

    // ====================================================================
    // Stores
    // ====================================================================
    e(Op::Assign, EA, opnd(S_MEM, T_LDRW), opnd(Shape::REG, T_LDRW), N0, Binding::Right, NOF, "str\tAR,AL"),
    e(Op::Assign, EA, opnd(S_MEM, T_BYTE), opnd(Shape::REG, T_NARROW), N0, Binding::Right, NOF, "strb\tAR,AL"),
    e(Op::Assign, EA, opnd(S_MEM, T_HALF), opnd(Shape::REG, T_NARROW), N0, Binding::Right, NOF, "strh\tAR,AL"),
    e(Op::Assign, EB, opnd(S_MEM, T_WIDE), opnd(Shape::REG, T_WIDE), N0, Binding::Right, NOF, "str\tAR,AL\nstr\tUR,UL"),
    e(Op::Assign, EC, opnd(S_MEM, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::Right, HF, "vstr\tAR,AL"),
    e(Op::Assign, EB, opnd(S_MEM, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::Right, NOF, "str\tAR,AL\nstr\tUR,UL"),

    // register destinations (bound temporaries)
    e(Op::Assign, EA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::Left, NOF, "mov\tAL,AR"),
    e(Op::Assign, EA, opnd(Shape::REG, TypeSet::F32), opnd(Shape::REG, TypeSet::F32), N0, Binding::Left, NOF, "mov\tAL,AR"),
    e(Op::Assign, EB, opnd(Shape::REG, T_WIDE), opnd(Shape::REG, T_WIDE), N0, Binding::Left, NOF, "mov\tAL,AR\nmov\tUL,UR"),
    e(Op::Assign, EC, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::Left, HF, "vmov.f64\tAL,AR"),
    e(Op::Assign, EB, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::Left, NOF, "mov\tAL,AR\nmov\tUL,UR"),

    // ====================================================================
    // Word arithmetic
    // ====================================================================
    e(Op::Plus, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "add\tA1,AL,AR"),
    e(Op::Minus, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "sub\tA1,AL,AR"),
    e(Op::And, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "and\tA1,AL,AR"),
    e(Op::Or, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "orr\tA1,AL,AR"),
    e(Op::Xor, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "eor\tA1,AL,AR"),
    e(Op::Lsh, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "lsl\tA1,AL,AR"),
    e(Op::Rsh, GA, opnd(Shape::REG, T_SWORD), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "asr\tA1,AL,AR"),
    e(Op::Rsh, GA, opnd(Shape::REG, T_UWORD), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "lsr\tA1,AL,AR"),
    e(Op::Mul, GA, opnd(Shape::REG, T_NARROW), opnd(Shape::REG, T_NARROW), NA, Binding::Temp1, MUL, "mul\tA1,AL,AR"),

    // ====================================================================
    // Division: hardware form first, EABI helper fallback
    // ====================================================================
    e(Op::Div, GA, opnd(Shape::REG, T_SWORD), opnd(Shape::REG, T_SWORD), NA, Binding::Temp1, DIV, "sdiv\tA1,AL,AR"),
    e(Op::Div, GA, opnd(Shape::REG, T_UWORD), opnd(Shape::REG, T_UWORD), NA, Binding::Temp1, DIV, "udiv\tA1,AL,AR"),
    e(Op::Mod, GA, opnd(Shape::REG, T_SWORD), opnd(Shape::REG, T_SWORD), NA, Binding::Temp1, DIVMUL, "sdiv\tA1,AL,AR\nmls\tA1,A1,AR,AL"),
    e(Op::Mod, GA, opnd(Shape::REG, T_UWORD), opnd(Shape::REG, T_UWORD), NA, Binding::Temp1, DIVMUL, "udiv\tA1,AL,AR\nmls\tA1,A1,AR,AL"),
    e(Op::Div, GA, opnd(Shape::REG, T_SWORD), opnd(Shape::REG, T_SWORD), N0, Binding::None, NOF, "bl\t__aeabi_idiv"),
    e(Op::Div, GA, opnd(Shape::REG, T_UWORD), opnd(Shape::REG, T_UWORD), N0, Binding::None, NOF, "bl\t__aeabi_uidiv"),
    e(Op::Mod, GA, opnd(Shape::REG, T_SWORD), opnd(Shape::REG, T_SWORD), N0, Binding::None, NOF, "bl\t__aeabi_idivmod"),
    e(Op::Mod, GA, opnd(Shape::REG, T_UWORD), opnd(Shape::REG, T_UWORD), N0, Binding::None, NOF, "bl\t__aeabi_uidivmod"),

    // ====================================================================
    // Pair arithmetic
    // ====================================================================
    e(Op::Plus, GB, opnd(Shape::REG, T_WIDE), opnd(S_RC, T_WIDE), NB, Binding::Temp1, NOF, "adds\tA1,AL,AR\nadc\tU1,UL,UR"),
    e(Op::Minus, GB, opnd(Shape::REG, T_WIDE), opnd(S_RC, T_WIDE), NB, Binding::Temp1, NOF, "subs\tA1,AL,AR\nsbc\tU1,UL,UR"),
    e(Op::And, GB, opnd(Shape::REG, T_WIDE), opnd(S_RC, T_WIDE), NB, Binding::Temp1, NOF, "and\tA1,AL,AR\nand\tU1,UL,UR"),
    e(Op::Or, GB, opnd(Shape::REG, T_WIDE), opnd(S_RC, T_WIDE), NB, Binding::Temp1, NOF, "orr\tA1,AL,AR\norr\tU1,UL,UR"),
    e(Op::Xor, GB, opnd(Shape::REG, T_WIDE), opnd(S_RC, T_WIDE), NB, Binding::Temp1, NOF, "eor\tA1,AL,AR\neor\tU1,UL,UR"),
    e(Op::Mul, GB, opnd(Shape::REG, T_WIDE), opnd(Shape::REG, T_WIDE), NB, Binding::Temp1, MUL, "umull\tA1,U1,AL,AR\nmla\tU1,AL,UR,U1\nmla\tU1,UL,AR,U1"),

    // ====================================================================
    // VFP arithmetic
    // ====================================================================
    e(Op::Plus, GC, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NC, Binding::Temp1, HF, "vadd.f64\tA1,AL,AR"),
    e(Op::Minus, GC, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NC, Binding::Temp1, HF, "vsub.f64\tA1,AL,AR"),
    e(Op::Mul, GC, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NC, Binding::Temp1, HF, "vmul.f64\tA1,AL,AR"),
    e(Op::Div, GC, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NC, Binding::Temp1, HF, "vdiv.f64\tA1,AL,AR"),

    // ====================================================================
    // Unary
    // ====================================================================
    e(Op::Neg, GA, opnd(Shape::REG, T_NARROW), NONE, NA, Binding::Temp1, NOF, "rsb\tA1,AL,#0"),
    e(Op::Comp, GA, opnd(Shape::REG, T_NARROW), NONE, NA, Binding::Temp1, NOF, "mvn\tA1,AL"),
    e(Op::Neg, GB, opnd(Shape::REG, T_WIDE), NONE, NB, Binding::Temp1, NOF, "rsbs\tA1,AL,#0\nrsc\tU1,UL,#0"),
    e(Op::Comp, GB, opnd(Shape::REG, T_WIDE), NONE, NB, Binding::Temp1, NOF, "mvn\tA1,AL\nmvn\tU1,UL"),
    e(Op::Neg, GC, opnd(Shape::REG, TypeSet::F64), NONE, NC, Binding::Temp1, HF, "vneg.f64\tA1,AL"),
    // soft negation flips the sign bit
    e(Op::Neg, GB, opnd(Shape::REG, TypeSet::F64), NONE, NB, Binding::Temp1, NOF, "mov\tA1,AL\neor\tU1,UL,#-2147483648"),
    e(Op::Neg, GA, opnd(Shape::REG, TypeSet::F32), NONE, NA, Binding::Temp1, NOF, "eor\tA1,AL,#-2147483648"),

    // ====================================================================
    // Comparisons: condition-code producers for branches
    // ====================================================================
    e(Op::Eq, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::Ne, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::Lt, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::Le, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::Gt, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::Ge, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::ULt, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::ULe, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::UGt, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),
    e(Op::UGe, EFF, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), N0, Binding::None, NOF, "cmp\tAL,AR"),

    // value-producing forms
    e(Op::Eq, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmoveq\tA1,#1"),
    e(Op::Ne, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovne\tA1,#1"),
    e(Op::Lt, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovlt\tA1,#1"),
    e(Op::Le, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovle\tA1,#1"),
    e(Op::Gt, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovgt\tA1,#1"),
    e(Op::Ge, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovge\tA1,#1"),
    e(Op::ULt, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovlo\tA1,#1"),
    e(Op::ULe, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovls\tA1,#1"),
    e(Op::UGt, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovhi\tA1,#1"),
    e(Op::UGe, GA, opnd(Shape::REG, T_NARROW), opnd(S_RC, T_NARROW), NA, Binding::Temp1, NOF, "cmp\tAL,AR\nmov\tA1,#0\nmovhs\tA1,#1"),

    // pair equality: the second compare only runs on a low-word match
    e(Op::Eq, EFF, opnd(Shape::REG, T_WIDE), opnd(Shape::REG, T_WIDE), N0, Binding::None, NOF, "cmp\tAL,AR\ncmpeq\tUL,UR"),
    e(Op::Ne, EFF, opnd(Shape::REG, T_WIDE), opnd(Shape::REG, T_WIDE), N0, Binding::None, NOF, "cmp\tAL,AR\ncmpeq\tUL,UR"),
    e(Op::Eq, GA, opnd(Shape::REG, T_WIDE), opnd(Shape::REG, T_WIDE), NA, Binding::Temp1, NOF, "cmp\tAL,AR\ncmpeq\tUL,UR\nmov\tA1,#0\nmoveq\tA1,#1"),
    e(Op::Ne, GA, opnd(Shape::REG, T_WIDE), opnd(Shape::REG, T_WIDE), NA, Binding::Temp1, NOF, "cmp\tAL,AR\ncmpeq\tUL,UR\nmov\tA1,#0\nmovne\tA1,#1"),

    // VFP comparison transfers the flags to the core status register
    e(Op::Eq, EFF, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::None, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr"),
    e(Op::Ne, EFF, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::None, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr"),
    e(Op::Lt, EFF, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::None, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr"),
    e(Op::Le, EFF, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::None, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr"),
    e(Op::Gt, EFF, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::None, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr"),
    e(Op::Ge, EFF, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), N0, Binding::None, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr"),
    e(Op::Eq, GA, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NA, Binding::Temp1, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr\nmov\tA1,#0\nmoveq\tA1,#1"),
    e(Op::Ne, GA, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NA, Binding::Temp1, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr\nmov\tA1,#0\nmovne\tA1,#1"),
    e(Op::Lt, GA, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NA, Binding::Temp1, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr\nmov\tA1,#0\nmovlt\tA1,#1"),
    e(Op::Le, GA, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NA, Binding::Temp1, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr\nmov\tA1,#0\nmovle\tA1,#1"),
    e(Op::Gt, GA, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NA, Binding::Temp1, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr\nmov\tA1,#0\nmovgt\tA1,#1"),
    e(Op::Ge, GA, opnd(Shape::REG, TypeSet::F64), opnd(Shape::REG, TypeSet::F64), NA, Binding::Temp1, HF, "vcmp.f64\tAL,AR\nvmrs\tAPSR_nzcv,fpscr\nmov\tA1,#0\nmovge\tA1,#1"),

    // ====================================================================
    // Conversions
    // ====================================================================
    // widening loads straight from memory
    e(Op::Conv, GA, opnd(S_MEM, TypeSet::I8), res(T_WORD), NA, Binding::Temp1, NOF, "ldrsb\tA1,AL"),
    e(Op::Conv, GA, opnd(S_MEM, TypeSet::U8), res(T_WORD), NA, Binding::Temp1, NOF, "ldrb\tA1,AL"),
    e(Op::Conv, GA, opnd(S_MEM, TypeSet::I16), res(T_WORD), NA, Binding::Temp1, NOF, "ldrsh\tA1,AL"),
    e(Op::Conv, GA, opnd(S_MEM, TypeSet::U16), res(T_WORD), NA, Binding::Temp1, NOF, "ldrh\tA1,AL"),
    // register widening
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::I8), res(T_WORD), NA, Binding::Temp1, NOF, "sxtb\tA1,AL"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::U8), res(T_WORD), NA, Binding::Temp1, NOF, "uxtb\tA1,AL"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::I16), res(T_WORD), NA, Binding::Temp1, NOF, "sxth\tA1,AL"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::U16), res(T_WORD), NA, Binding::Temp1, NOF, "uxth\tA1,AL"),
    // narrowing (pairs contribute their low word)
    e(Op::Conv, GA, opnd(Shape::REG, T_NARROW.union(T_WIDE)), res(TypeSet::I8), NA, Binding::Temp1, NOF, "sxtb\tA1,AL"),
    e(Op::Conv, GA, opnd(Shape::REG, T_NARROW.union(T_WIDE)), res(TypeSet::U8), NA, Binding::Temp1, NOF, "uxtb\tA1,AL"),
    e(Op::Conv, GA, opnd(Shape::REG, T_NARROW.union(T_WIDE)), res(TypeSet::I16), NA, Binding::Temp1, NOF, "sxth\tA1,AL"),
    e(Op::Conv, GA, opnd(Shape::REG, T_NARROW.union(T_WIDE)), res(TypeSet::U16), NA, Binding::Temp1, NOF, "uxth\tA1,AL"),
    // same representation, no code
    e(Op::Conv, GA, opnd(Shape::REG, T_WORD), res(T_WORD), N0, Binding::Left, NOF, ""),
    e(Op::Conv, GB, opnd(Shape::REG, T_WIDE), res(T_WIDE), N0, Binding::Left, NOF, ""),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F32), res(TypeSet::F32), N0, Binding::Left, NOF, ""),
    e(Op::Conv, GC, opnd(Shape::REG, TypeSet::F64), res(TypeSet::F64), N0, Binding::Left, HF, ""),
    e(Op::Conv, GB, opnd(Shape::REG, TypeSet::F64), res(TypeSet::F64), N0, Binding::Left, NOF, ""),
    // pair widening and truncation
    e(Op::Conv, GA, opnd(Shape::REG, T_WIDE), res(T_WORD), NA, Binding::Temp1, NOF, "mov\tA1,AL"),
    e(Op::Conv, GB, opnd(Shape::REG, T_SWORD), res(T_WIDE), NB, Binding::Temp1, NOF, "mov\tA1,AL\nasr\tU1,AL,#31"),
    e(Op::Conv, GB, opnd(Shape::REG, T_UWORD), res(T_WIDE), NB, Binding::Temp1, NOF, "mov\tA1,AL\nmov\tU1,#0"),
    // VFP conversions through the s14/s15 scratch
    e(Op::Conv, GC, opnd(Shape::REG, TypeSet::F32), res(TypeSet::F64), NC, Binding::Temp1, HF, "vmov\ts15,AL\nvcvt.f64.f32\tA1,s15"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F64), res(TypeSet::F32), NA, Binding::Temp1, HF, "vcvt.f32.f64\ts15,AL\nvmov\tA1,s15"),
    e(Op::Conv, GC, opnd(Shape::REG, T_SWORD), res(TypeSet::F64), NC, Binding::Temp1, HF, "vmov\ts14,AL\nvcvt.f64.s32\tA1,s14"),
    e(Op::Conv, GC, opnd(Shape::REG, T_UWORD), res(TypeSet::F64), NC, Binding::Temp1, HF, "vmov\ts14,AL\nvcvt.f64.u32\tA1,s14"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F64), res(T_SWORD), NA, Binding::Temp1, HF, "vcvt.s32.f64\ts14,AL\nvmov\tA1,s14"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F64), res(T_UWORD), NA, Binding::Temp1, HF, "vcvt.u32.f64\ts14,AL\nvmov\tA1,s14"),
    e(Op::Conv, GA, opnd(Shape::REG, T_SWORD), res(TypeSet::F32), NA, Binding::Temp1, HF, "vmov\ts14,AL\nvcvt.f32.s32\ts14,s14\nvmov\tA1,s14"),
    e(Op::Conv, GA, opnd(Shape::REG, T_UWORD), res(TypeSet::F32), NA, Binding::Temp1, HF, "vmov\ts14,AL\nvcvt.f32.u32\ts14,s14\nvmov\tA1,s14"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F32), res(T_SWORD), NA, Binding::Temp1, HF, "vmov\ts15,AL\nvcvt.s32.f32\ts15,s15\nvmov\tA1,s15"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F32), res(T_UWORD), NA, Binding::Temp1, HF, "vmov\ts15,AL\nvcvt.u32.f32\ts15,s15\nvmov\tA1,s15"),
    // runtime conversions; 64-bit integer forms serve both float modes
    e(Op::Conv, GB, opnd(Shape::REG, T_SWORD), res(TypeSet::F64), N0, Binding::None, NOF, "bl\t__aeabi_i2d"),
    e(Op::Conv, GB, opnd(Shape::REG, T_UWORD), res(TypeSet::F64), N0, Binding::None, NOF, "bl\t__aeabi_ui2d"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F64), res(T_SWORD), N0, Binding::None, NOF, "bl\t__aeabi_d2iz"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F64), res(T_UWORD), N0, Binding::None, NOF, "bl\t__aeabi_d2uiz"),
    e(Op::Conv, GB, opnd(Shape::REG, TypeSet::F32), res(TypeSet::F64), N0, Binding::None, NOF, "bl\t__aeabi_f2d"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F64), res(TypeSet::F32), N0, Binding::None, NOF, "bl\t__aeabi_d2f"),
    e(Op::Conv, GA, opnd(Shape::REG, T_SWORD), res(TypeSet::F32), N0, Binding::None, NOF, "bl\t__aeabi_i2f"),
    e(Op::Conv, GA, opnd(Shape::REG, T_UWORD), res(TypeSet::F32), N0, Binding::None, NOF, "bl\t__aeabi_ui2f"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F32), res(T_SWORD), N0, Binding::None, NOF, "bl\t__aeabi_f2iz"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::F32), res(T_UWORD), N0, Binding::None, NOF, "bl\t__aeabi_f2uiz"),
    e(Op::Conv, GBC, opnd(Shape::REG, TypeSet::I64), res(TypeSet::F64), N0, Binding::None, NOF, "bl\t__aeabi_l2d"),
    e(Op::Conv, GBC, opnd(Shape::REG, TypeSet::U64), res(TypeSet::F64), N0, Binding::None, NOF, "bl\t__aeabi_ul2d"),
    e(Op::Conv, GB, opnd(Shape::REG, TypeSet::F64), res(TypeSet::I64), N0, Binding::None, NOF, "bl\t__aeabi_d2lz"),
    e(Op::Conv, GB, opnd(Shape::REG, TypeSet::F64), res(TypeSet::U64), N0, Binding::None, NOF, "bl\t__aeabi_d2ulz"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::I64), res(TypeSet::F32), N0, Binding::None, NOF, "bl\t__aeabi_l2f"),
    e(Op::Conv, GA, opnd(Shape::REG, TypeSet::U64), res(TypeSet::F32), N0, Binding::None, NOF, "bl\t__aeabi_ul2f"),
    e(Op::Conv, GB, opnd(Shape::REG, TypeSet::F32), res(TypeSet::I64), N0, Binding::None, NOF, "bl\t__aeabi_f2lz"),
    e(Op::Conv, GB, opnd(Shape::REG, TypeSet::F32), res(TypeSet::U64), N0, Binding::None, NOF, "bl\t__aeabi_f2ulz"),
];

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_forms_precede_fallbacks() {
        let sdiv = PATTERNS.iter().position(|p| p.template.starts_with("sdiv")).unwrap();
        let idiv = PATTERNS.iter().position(|p| p.template == "bl\t__aeabi_idiv").unwrap();
        assert!(sdiv < idiv);

        let vldr = PATTERNS
            .iter()
            .position(|p| p.op == Op::Oreg && p.template.starts_with("vldr"))
            .unwrap();
        let soft = PATTERNS
            .iter()
            .position(|p| {
                p.op == Op::Oreg
                    && p.left.types == TypeSet::F64
                    && p.features == Features::empty()
            })
            .unwrap();
        assert!(vldr < soft);
    }

    #[test]
    fn test_gated_entries_declare_features() {
        for p in &PATTERNS {
            if p.template.starts_with("sdiv") || p.template.starts_with("udiv") {
                assert!(p.features.contains(Features::DIVIDE), "{}", p.template);
            }
            if p.template.starts_with('v') {
                assert!(
                    p.features.contains(Features::HARDWARE_FLOAT),
                    "{}",
                    p.template
                );
            }
        }
    }

    #[test]
    fn test_effect_entries_produce_nothing() {
        for p in &PATTERNS {
            if p.goal == Goal::EFFECT {
                assert_eq!(p.result, Binding::None, "{}", p.template);
            }
        }
    }

    #[test]
    fn test_runtime_helpers_bind_no_temporaries() {
        for p in &PATTERNS {
            if p.template.starts_with("bl\t") {
                assert_eq!(p.needs.count, 0, "{}", p.template);
                assert_eq!(p.result, Binding::None, "{}", p.template);
            }
        }
    }

    #[test]
    fn test_conversions_constrain_result_type() {
        for p in &PATTERNS {
            if p.op == Op::Conv {
                assert!(p.right.shape.contains(Shape::NONE), "{}", p.template);
                assert!(!p.right.types.is_empty(), "{}", p.template);
            }
        }
    }
}
