//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// End-to-end selection tests against the ARM target descriptor
//

use pass2::arch::arm::ArmTarget;
use pass2::diag::{CodegenError, Diagnostics};
use pass2::hooks::TargetHooks;
use pass2::regmodel::RegClass;
use pass2::select::{Codegen, generate};
use pass2::table::Goal;
use pass2::target::{Arch, Features, Os, Target};
use pass2::tree::{Node, Op, SymRef, Ty};

fn arm() -> ArmTarget {
    let _ = env_logger::builder().is_test(true).try_init();
    ArmTarget::new(Target::new(Arch::Arm, Os::Linux))
}

fn arm_soft() -> ArmTarget {
    ArmTarget::new(Target::new(Arch::Arm, Os::Linux).with_features(Features::MULTIPLY))
}

// ----------------------------------------------------------------------------
// Addressing
// ----------------------------------------------------------------------------

#[test]
fn test_pointer_offset_folds_into_load() {
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::deref(
        Ty::I32,
        Node::binary(
            Op::Plus,
            Ty::Ptr,
            Node::reg(Ty::Ptr, 4),
            Node::icon(Ty::I32, 4),
        ),
    );
    cg.select(&mut n, Goal::CLASS_A).unwrap();
    assert_eq!(n.op, Op::Reg);
    assert_eq!(cg.finish(), "\tldr\tr0,[r4, #4]\n");
}

#[test]
fn test_halfword_offset_out_of_range_builds_address() {
    // ldrsh reaches +-255; 4096 has to go through an add first
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::deref(
        Ty::I16,
        Node::binary(
            Op::Plus,
            Ty::Ptr,
            Node::reg(Ty::Ptr, 4),
            Node::icon(Ty::I32, 4096),
        ),
    );
    cg.select(&mut n, Goal::CLASS_A).unwrap();
    assert_eq!(cg.finish(), "\tadd\tr0,r4,#4096\n\tldrsh\tr1,[r0]\n");
    assert_eq!(n.reg, Some(1));
}

#[test]
fn test_global_load_goes_through_address_register() {
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::assign(
        Node::name(Ty::I32, SymRef::auto("x", -4)),
        Node::name(Ty::I32, SymRef::external("g")),
    );
    cg.gen_stmt(&mut n).unwrap();
    assert_eq!(
        cg.finish(),
        "\tldr\tr0,=g\n\tldr\tr1,[r0]\n\tstr\tr1,[fp, #-4]\n"
    );
}

// ----------------------------------------------------------------------------
// Register pairs
// ----------------------------------------------------------------------------

#[test]
fn test_wide_add_keeps_halves_apart() {
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::assign(
        Node::name(Ty::I64, SymRef::auto("x", -8)),
        Node::binary(
            Op::Plus,
            Ty::I64,
            Node::name(Ty::I64, SymRef::auto("a", -16)),
            Node::name(Ty::I64, SymRef::auto("b", -24)),
        ),
    );
    cg.gen_stmt(&mut n).unwrap();
    assert_eq!(
        cg.finish(),
        "\tldr\tr0,[fp, #-24]\n\
         \tldr\tr1,[fp, #-20]\n\
         \tldr\tr2,[fp, #-16]\n\
         \tldr\tr3,[fp, #-12]\n\
         \tadds\tr4,r2,r0\n\
         \tadc\tr5,r3,r1\n\
         \tstr\tr4,[fp, #-8]\n\
         \tstr\tr5,[fp, #-4]\n"
    );
}

#[test]
fn test_pair_exhaustion_reports_class_b_pressure() {
    // Five pairs exist; the fifth pinned temporary leaves nothing for
    // the right-hand side of the next assignment.
    let h = arm();
    let mut cg = Codegen::new(&h);
    for i in 0..4 {
        let mut n = *Node::assign(Node::temp(Ty::I64, i), Node::icon(Ty::I64, i));
        cg.gen_stmt(&mut n).unwrap();
    }
    let mut n = *Node::assign(Node::temp(Ty::I64, 4), Node::icon(Ty::I64, 4));
    let err = cg.gen_stmt(&mut n).unwrap_err();
    assert!(matches!(err, CodegenError::RegisterPressure { class: "B" }));
}

// ----------------------------------------------------------------------------
// Fixed-register idioms
// ----------------------------------------------------------------------------

#[test]
fn test_division_shuffles_into_eabi_registers() {
    // Operands land in r0/r1 in evaluation order, which is exactly
    // backwards for the helper; the swap must not clobber either one.
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::assign(
        Node::name(Ty::I32, SymRef::auto("q", -8)),
        Node::binary(
            Op::Div,
            Ty::I32,
            Node::name(Ty::I32, SymRef::auto("a", -12)),
            Node::name(Ty::I32, SymRef::auto("b", -16)),
        ),
    );
    cg.gen_stmt(&mut n).unwrap();
    assert_eq!(
        cg.finish(),
        "\tldr\tr0,[fp, #-16]\n\
         \tldr\tr1,[fp, #-12]\n\
         \tmov\tr2,r0\n\
         \tmov\tr0,r1\n\
         \tmov\tr1,r2\n\
         \tbl\t__aeabi_idiv\n\
         \tstr\tr0,[fp, #-8]\n"
    );
}

#[test]
fn test_pinned_temporary_survives_division() {
    // t0 lands in r0, exactly where the divide helper wants its
    // dividend and leaves its quotient; the temporary has to move to
    // a preserved register and stay readable afterwards.
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut t = *Node::assign(Node::temp(Ty::I32, 0), Node::icon(Ty::I32, 7));
    cg.gen_stmt(&mut t).unwrap();
    let mut q = *Node::assign(
        Node::name(Ty::I32, SymRef::auto("q", -8)),
        Node::binary(
            Op::Div,
            Ty::I32,
            Node::temp(Ty::I32, 0),
            Node::icon(Ty::I32, 3),
        ),
    );
    cg.gen_stmt(&mut q).unwrap();
    let mut y = *Node::assign(
        Node::name(Ty::I32, SymRef::auto("y", -4)),
        Node::temp(Ty::I32, 0),
    );
    cg.gen_stmt(&mut y).unwrap();
    assert_eq!(
        cg.finish(),
        "\tmov\tr0,#7\n\
         \tmov\tr1,#3\n\
         \tmov\tr4,r0\n\
         \tmov\tr0,r4\n\
         \tbl\t__aeabi_idiv\n\
         \tstr\tr0,[fp, #-8]\n\
         \tstr\tr4,[fp, #-4]\n"
    );
}

#[test]
fn test_soft_double_add_returns_in_core_pair() {
    let h = arm_soft();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::binary(
        Op::Plus,
        Ty::F64,
        Node::reg(Ty::F64, 15),
        Node::reg(Ty::F64, 16),
    );
    cg.select(&mut n, Goal::CLASS_B).unwrap();
    let out = cg.finish();
    assert!(out.contains("bl\t__aeabi_dadd"), "{}", out);
    assert_eq!(n.reg, Some(15));
}

// ----------------------------------------------------------------------------
// Literal pool
// ----------------------------------------------------------------------------

#[test]
fn test_soft_float_literal_loads_through_core_pair() {
    let h = arm_soft();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::fcon(Ty::F64, 1.5);
    cg.select(&mut n, Goal::CLASS_B).unwrap();
    let out = cg.finish();
    assert!(out.contains(".LC0:"), "{}", out);
    assert!(out.contains("\tldr\tr0,.LC0\n"), "{}", out);
    assert!(out.contains("\tldr\tr1,.LC0+4\n"), "{}", out);
    assert_eq!(n.reg, Some(15));
}

#[test]
fn test_double_literal_uses_vldr_under_vfp() {
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::fcon(Ty::F64, 1.5);
    cg.select(&mut n, Goal::CLASS_C).unwrap();
    let out = cg.finish();
    assert!(out.contains("\tvldr\td0,.LC0\n"), "{}", out);
    assert_eq!(n.reg, Some(20));
}

// ----------------------------------------------------------------------------
// Calls
// ----------------------------------------------------------------------------

#[test]
fn test_call_spills_excess_arguments_to_stack() {
    // (i32, i64, i64): r0, r2:r3 after even alignment, then the third
    // argument and the eight-byte area it needs on the stack
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::call(
        Ty::Void,
        Node::name(Ty::Ptr, SymRef::external("f")),
        vec![
            Node::icon(Ty::I32, 5),
            Node::icon(Ty::I64, 9),
            Node::icon(Ty::I64, 7),
        ],
    );
    cg.gen_stmt(&mut n).unwrap();
    assert_eq!(
        cg.finish(),
        "\tsub\tsp,sp,#8\n\
         \tmov\tr0,#7\n\
         \tmov\tr1,#0\n\
         \tstr\tr0,[sp, #0]\n\
         \tstr\tr1,[sp, #4]\n\
         \tmov\tr0,#5\n\
         \tmov\tr2,#9\n\
         \tmov\tr3,#0\n\
         \tbl\tf\n\
         \tadd\tsp,sp,#8\n"
    );
}

#[test]
fn test_nested_call_argument_parks_in_preserved_register() {
    // g(2) returns in r0 while r0 is also f's first argument slot;
    // the inner result parks in r4 so no argument register is pinned
    // during the inner call.
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::call(
        Ty::Void,
        Node::name(Ty::Ptr, SymRef::external("f")),
        vec![
            Node::icon(Ty::I32, 1),
            Node::call(
                Ty::I32,
                Node::name(Ty::Ptr, SymRef::external("g")),
                vec![Node::icon(Ty::I32, 2)],
            ),
        ],
    );
    cg.gen_stmt(&mut n).unwrap();
    assert_eq!(
        cg.finish(),
        "\tmov\tr0,#2\n\
         \tbl\tg\n\
         \tmov\tr4,r0\n\
         \tmov\tr0,#1\n\
         \tmov\tr1,r4\n\
         \tbl\tf\n"
    );
}

#[test]
fn test_pinned_temporary_survives_call() {
    // The call destroys every caller-saved register; a temporary
    // living in one moves to a preserved register first.
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut t = *Node::assign(Node::temp(Ty::I32, 0), Node::icon(Ty::I32, 5));
    cg.gen_stmt(&mut t).unwrap();
    let mut c = *Node::call(Ty::Void, Node::name(Ty::Ptr, SymRef::external("f")), vec![]);
    cg.gen_stmt(&mut c).unwrap();
    let mut y = *Node::assign(
        Node::name(Ty::I32, SymRef::auto("y", -4)),
        Node::temp(Ty::I32, 0),
    );
    cg.gen_stmt(&mut y).unwrap();
    assert_eq!(
        cg.finish(),
        "\tmov\tr0,#5\n\tmov\tr4,r0\n\tbl\tf\n\tstr\tr4,[fp, #-4]\n"
    );
}

#[test]
fn test_aggregate_return_is_a_user_error() {
    let h = arm();
    let mut diags = Diagnostics::new();
    let mut call = Node::call(
        Ty::Aggregate,
        Node::name(Ty::Ptr, SymRef::external("mkpoint")),
        vec![],
    );
    call.val = 16;
    let mut stmts = vec![call];
    let out = generate(&h, &mut stmts, &mut diags);
    assert!(out.is_some());
    assert_eq!(diags.error_count(), 1);
    assert!(diags.suppress_output());
}

// ----------------------------------------------------------------------------
// Block copy
// ----------------------------------------------------------------------------

#[test]
fn test_struct_assignment_calls_memcpy() {
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::binary(
        Op::StAsg,
        Ty::Aggregate,
        Node::deref(Ty::Aggregate, Node::reg(Ty::Ptr, 4)),
        Node::deref(Ty::Aggregate, Node::reg(Ty::Ptr, 5)),
    );
    n.val = 12;
    cg.gen_stmt(&mut n).unwrap();
    assert_eq!(
        cg.finish(),
        "\tmov\tr0,r4\n\tmov\tr1,r5\n\tldr\tr2,=12\n\tbl\tmemcpy\n"
    );
}

// ----------------------------------------------------------------------------
// Control flow
// ----------------------------------------------------------------------------

#[test]
fn test_compare_and_branch() {
    let h = arm();
    let mut cg = Codegen::new(&h);
    let mut n = *Node::cbranch(
        Node::binary(
            Op::Lt,
            Ty::I32,
            Node::name(Ty::I32, SymRef::auto("i", -4)),
            Node::icon(Ty::I32, 10),
        ),
        3,
    );
    cg.gen_stmt(&mut n).unwrap();
    assert_eq!(cg.finish(), "\tldr\tr0,[fp, #-4]\n\tcmp\tr0,#10\n\tblt\t.L3\n");
}

#[test]
fn test_goto_and_label_round_trip() {
    let h = arm();
    let mut cg = Codegen::new(&h);
    cg.gen_stmt(&mut Node::label(7)).unwrap();
    cg.gen_stmt(&mut Node::goto(7)).unwrap();
    assert_eq!(cg.finish(), ".L7:\n\tb\t.L7\n");
}

// ----------------------------------------------------------------------------
// Operator coverage
// ----------------------------------------------------------------------------

fn operand(h: &ArmTarget, ty: Ty, i: usize) -> Box<Node> {
    // Scratch operands well clear of the fixed-register idioms
    let r = match h.class_for_type(ty) {
        RegClass::A => [4, 5][i],
        RegClass::B => [17, 18][i],
        RegClass::C => [25, 26][i],
    };
    Node::reg(ty, r)
}

#[test]
fn test_every_operator_selects_under_each_feature_set() {
    let configs = [
        Features::MULTIPLY | Features::HARDWARE_FLOAT,
        Features::MULTIPLY | Features::DIVIDE,
        Features::MULTIPLY,
        Features::empty(),
    ];
    let int_ops = [
        Op::Plus,
        Op::Minus,
        Op::Mul,
        Op::Div,
        Op::Mod,
        Op::And,
        Op::Or,
        Op::Xor,
        Op::Lsh,
        Op::Rsh,
    ];
    let float_ops = [Op::Plus, Op::Minus, Op::Mul, Op::Div];
    let cmp_ops = [
        Op::Eq,
        Op::Ne,
        Op::Lt,
        Op::Le,
        Op::Gt,
        Op::Ge,
        Op::ULt,
        Op::ULe,
        Op::UGt,
        Op::UGe,
    ];
    for feats in configs {
        let h = ArmTarget::new(Target::new(Arch::Arm, Os::Linux).with_features(feats));
        for ty in [Ty::I32, Ty::U32, Ty::I64, Ty::U64] {
            for op in int_ops {
                let mut cg = Codegen::new(&h);
                let mut n = *Node::binary(op, ty, operand(&h, ty, 0), operand(&h, ty, 1));
                cg.select(&mut n, Goal::for_class(h.class_for_type(ty)))
                    .unwrap_or_else(|e| panic!("{:?} {:?} under {:?}: {:?}", op, ty, feats, e));
            }
        }
        for ty in [Ty::F32, Ty::F64] {
            for op in float_ops {
                let mut cg = Codegen::new(&h);
                let mut n = *Node::binary(op, ty, operand(&h, ty, 0), operand(&h, ty, 1));
                cg.select(&mut n, Goal::for_class(h.class_for_type(ty)))
                    .unwrap_or_else(|e| panic!("{:?} {:?} under {:?}: {:?}", op, ty, feats, e));
            }
        }
        for ty in [Ty::I32, Ty::U32, Ty::I64, Ty::U64, Ty::F32, Ty::F64] {
            let ops: &[Op] = if ty.is_float() { &cmp_ops[..6] } else { &cmp_ops };
            for &op in ops {
                let mut cg = Codegen::new(&h);
                let mut n = *Node::cbranch(
                    Node::binary(op, Ty::I32, operand(&h, ty, 0), operand(&h, ty, 1)),
                    1,
                );
                cg.gen_stmt(&mut n)
                    .unwrap_or_else(|e| panic!("{:?} {:?} under {:?}: {:?}", op, ty, feats, e));
            }
        }
        for ty in [Ty::I32, Ty::U32, Ty::I64, Ty::U64, Ty::F32, Ty::F64] {
            let mut cg = Codegen::new(&h);
            let mut n = *Node::unary(Op::Neg, ty, operand(&h, ty, 0));
            cg.select(&mut n, Goal::for_class(h.class_for_type(ty)))
                .unwrap_or_else(|e| panic!("Neg {:?} under {:?}: {:?}", ty, feats, e));
        }
        for ty in [Ty::I32, Ty::U32, Ty::I64, Ty::U64] {
            let mut cg = Codegen::new(&h);
            let mut n = *Node::unary(Op::Comp, ty, operand(&h, ty, 0));
            cg.select(&mut n, Goal::for_class(h.class_for_type(ty)))
                .unwrap_or_else(|e| panic!("Comp {:?} under {:?}: {:?}", ty, feats, e));
        }
    }
}
