//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Instruction-pattern table types
//
// Each target supplies a 'static ordered table of Pattern entries. The
// selector scans the table top to bottom; the first entry whose
// operator, goal, feature mask, and operand shape/type constraints all
// hold is used. Entry order is significant and entries are otherwise
// unordered with respect to each other.
//

use crate::regmodel::RegClass;
use crate::target::Features;
use crate::tree::{Node, Op, Ty};

// ============================================================================
// Shapes
// ============================================================================

bitflags::bitflags! {
    /// Where an operand currently lives (or can live). Drives table
    /// matching: a pattern accepts an operand if the operand's shape
    /// bit is in the pattern's shape set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Shape: u8 {
        /// In a register
        const REG = 1 << 0;
        /// Indexed memory operand
        const OREG = 1 << 1;
        /// Named storage
        const NAME = 1 << 2;
        /// Immediate constant
        const CON = 1 << 3;
        /// No operand at this position
        const NONE = 1 << 4;
    }
}

/// Shapes a load-class pattern may take from memory
pub const S_MEM: Shape = Shape::OREG.union(Shape::NAME);
/// Register or immediate
pub const S_RC: Shape = Shape::REG.union(Shape::CON);

/// Classify a reduced node
pub fn shape_of(n: &Node) -> Shape {
    match n.op {
        Op::Reg | Op::Temp => Shape::REG,
        Op::Oreg => Shape::OREG,
        Op::Name => Shape::NAME,
        Op::Icon | Op::Fcon => Shape::CON,
        _ => Shape::empty(),
    }
}

// ============================================================================
// Type Sets
// ============================================================================

bitflags::bitflags! {
    /// Result-type constraint set for one operand position
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeSet: u16 {
        const I8 = 1 << 0;
        const U8 = 1 << 1;
        const I16 = 1 << 2;
        const U16 = 1 << 3;
        const I32 = 1 << 4;
        const U32 = 1 << 5;
        const I64 = 1 << 6;
        const U64 = 1 << 7;
        const F32 = 1 << 8;
        const F64 = 1 << 9;
        const PTR = 1 << 10;
        const AGGREGATE = 1 << 11;
        const VOID = 1 << 12;
    }
}

/// Word-sized integral/pointer types
pub const T_WORD: TypeSet = TypeSet::I32.union(TypeSet::U32).union(TypeSet::PTR);
/// Halfword types
pub const T_HALF: TypeSet = TypeSet::I16.union(TypeSet::U16);
/// Byte types
pub const T_BYTE: TypeSet = TypeSet::I8.union(TypeSet::U8);
/// Doubleword integers (register pairs)
pub const T_WIDE: TypeSet = TypeSet::I64.union(TypeSet::U64);
/// Floating types
pub const T_FLOAT: TypeSet = TypeSet::F32.union(TypeSet::F64);
/// Every integral type plus pointers
pub const T_ANYFIXED: TypeSet = T_WORD.union(T_HALF).union(T_BYTE).union(T_WIDE);

impl TypeSet {
    /// The singleton set for a type tag
    pub fn of(ty: Ty) -> TypeSet {
        match ty {
            Ty::I8 => TypeSet::I8,
            Ty::U8 => TypeSet::U8,
            Ty::I16 => TypeSet::I16,
            Ty::U16 => TypeSet::U16,
            Ty::I32 => TypeSet::I32,
            Ty::U32 => TypeSet::U32,
            Ty::I64 => TypeSet::I64,
            Ty::U64 => TypeSet::U64,
            Ty::F32 => TypeSet::F32,
            Ty::F64 => TypeSet::F64,
            Ty::Ptr => TypeSet::PTR,
            Ty::Aggregate => TypeSet::AGGREGATE,
            Ty::Void => TypeSet::VOID,
        }
    }
}

// ============================================================================
// Goals
// ============================================================================

bitflags::bitflags! {
    /// Desired (or provided) result location. Patterns declare the
    /// goals they can satisfy; callers request one or more.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Goal: u8 {
        /// Result in a class A register
        const CLASS_A = 1 << 0;
        /// Result in a class B register
        const CLASS_B = 1 << 1;
        /// Result in a class C register
        const CLASS_C = 1 << 2;
        /// Evaluate for side effect only
        const EFFECT = 1 << 3;
    }
}

/// Any register class
pub const G_ANYREG: Goal = Goal::CLASS_A.union(Goal::CLASS_B).union(Goal::CLASS_C);

impl Goal {
    pub fn for_class(class: RegClass) -> Goal {
        match class {
            RegClass::A => Goal::CLASS_A,
            RegClass::B => Goal::CLASS_B,
            RegClass::C => Goal::CLASS_C,
        }
    }

    /// The single class this goal names, if it names exactly one
    pub fn single_class(&self) -> Option<RegClass> {
        match *self {
            Goal::CLASS_A => Some(RegClass::A),
            Goal::CLASS_B => Some(RegClass::B),
            Goal::CLASS_C => Some(RegClass::C),
            _ => None,
        }
    }
}

// ============================================================================
// Pattern Entries
// ============================================================================

/// Shape and type constraint for one operand position
#[derive(Debug, Clone, Copy)]
pub struct OperandSpec {
    pub shape: Shape,
    pub types: TypeSet,
}

impl OperandSpec {
    pub const NONE: OperandSpec = OperandSpec {
        shape: Shape::NONE,
        types: TypeSet::empty(),
    };

    pub const fn new(shape: Shape, types: TypeSet) -> Self {
        Self { shape, types }
    }

    /// Does a reduced operand satisfy this position?
    pub fn matches(&self, n: Option<&Node>) -> bool {
        match n {
            None => self.shape.contains(Shape::NONE),
            Some(n) => {
                self.shape.intersects(shape_of(n)) && self.types.intersects(TypeSet::of(n.ty))
            }
        }
    }
}

/// Temporary registers a pattern needs beyond its operands
#[derive(Debug, Clone, Copy)]
pub struct Needs {
    pub count: u8,
    pub class: RegClass,
}

impl Needs {
    pub const NONE: Needs = Needs {
        count: 0,
        class: RegClass::A,
    };

    pub const fn reg(class: RegClass) -> Needs {
        Needs { count: 1, class }
    }

    pub const fn regs(count: u8, class: RegClass) -> Needs {
        Needs { count, class }
    }
}

/// Where the result of a matched pattern lives after emission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// First allocated temporary
    Temp1,
    /// Reuses the left operand's register
    Left,
    /// Reuses the right operand's register
    Right,
    /// No value produced (side effect only)
    None,
}

/// One instruction-pattern table entry
#[derive(Debug)]
pub struct Pattern {
    pub op: Op,
    pub goal: Goal,
    pub left: OperandSpec,
    pub right: OperandSpec,
    pub needs: Needs,
    pub result: Binding,
    /// Hardware features this entry requires; a superset of the
    /// enabled set makes the entry ineligible (skipped, not failed)
    pub features: Features,
    /// Emission template; see emit::expand_template for placeholders
    pub template: &'static str,
}

// ============================================================================
// Tests
// ============================================================================
