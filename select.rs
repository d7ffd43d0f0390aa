//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Table-driven instruction selector
//
// One Codegen instance covers one function: it owns the allocation
// state, the assembly writer, and the front-end temporary bindings.
// `gen_stmt` consumes one statement-level tree; `select` reduces a
// subtree to the requested goal, scanning the target's ordered pattern
// table (first match wins) and forcing operands into registers one at
// a time when no entry accepts the current shapes. When the table is
// exhausted, the target's rewrite hook runs exactly once for the node;
// failure after the rewrite is fatal.
//

use crate::callconv::{ArgLoc, Param, RetLoc, Signature};
use crate::diag::{CodegenError, Diagnostics};
use crate::emit::{expand_template, AsmWriter, Directive, Segment, TemplateOps};
use crate::hooks::{Rewrite, ShapeQuery, TargetHooks};
use crate::legalize;
use crate::regmodel::{AllocState, RegFile, RegId};
use crate::table::{Binding, Goal, Pattern, TypeSet, G_ANYREG};
use crate::tree::{Node, Op, Ty};
use log::{debug, trace};
use std::collections::HashMap;

// ============================================================================
// Per-Function Context
// ============================================================================

/// Code generation context for one function
pub struct Codegen<'a> {
    hooks: &'a dyn TargetHooks,
    state: AllocState,
    asm: AsmWriter,
    /// Front-end temporary number to bound register
    temps: HashMap<i64, RegId>,
}

impl<'a> Codegen<'a> {
    pub fn new(hooks: &'a dyn TargetHooks) -> Self {
        Self {
            hooks,
            state: AllocState::new(hooks.regfile()),
            asm: AsmWriter::new(),
            temps: HashMap::new(),
        }
    }

    pub fn asm(&self) -> &AsmWriter {
        &self.asm
    }

    pub fn finish(self) -> String {
        self.asm.finish()
    }

    // ------------------------------------------------------------------
    // Statement entry point
    // ------------------------------------------------------------------

    /// Consume one statement-level tree
    pub fn gen_stmt(&mut self, n: &mut Node) -> Result<(), CodegenError> {
        trace!("stmt {:?}", n.op);
        match n.op {
            Op::Free => Ok(()),
            Op::Label => {
                self.asm.label(&format!(".L{}", n.val));
                n.retire();
                Ok(())
            }
            Op::Goto => {
                let hooks = self.hooks;
                self.asm
                    .insn(&format!("{}\t.L{}", hooks.jump_mnemonic(), n.val));
                n.retire();
                Ok(())
            }
            Op::CBranch => self.select_cbranch(n),
            Op::Assign | Op::StAsg | Op::Call => self.select(n, Goal::EFFECT),
            _ => {
                // Expression statement: evaluate, then discard
                let hooks = self.hooks;
                let class = hooks.class_for_type(n.ty);
                self.select(n, Goal::for_class(class))?;
                if let Some(r) = n.reg {
                    self.state.release_owned(hooks.regfile(), r);
                }
                n.retire();
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Core dispatch
    // ------------------------------------------------------------------

    /// Reduce a subtree until it satisfies `goal`. For register goals
    /// the node ends as Op::Reg with a bound register; for EFFECT it
    /// ends retired.
    pub fn select(&mut self, n: &mut Node, goal: Goal) -> Result<(), CodegenError> {
        match n.op {
            Op::Free | Op::Reg => Ok(()),
            Op::Temp => self.bind_temp(n),
            Op::Assign => self.select_assign(n, goal, false),
            Op::StAsg => self.select_stasg(n),
            Op::Call => self.select_call(n, goal),
            Op::Deref => self.select_deref(n, goal, false),
            Op::Addr => self.select_addr(n, goal),
            Op::Conv | Op::Neg | Op::Comp => self.select_unary(n, goal),
            Op::Icon | Op::Fcon | Op::Name | Op::Oreg => self.select_leaf(n, goal),
            op if op.is_binary() => self.select_binary(n, goal, false),
            op => Err(CodegenError::NoPattern {
                op,
                goal: goal.bits(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Temporaries
    // ------------------------------------------------------------------

    /// Bind a front-end temporary to a register on first sight. The
    /// binding is pinned: operand consumption must not free it, since
    /// the temporary lives past the current expression.
    fn bind_temp(&mut self, n: &mut Node) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let file = hooks.regfile();
        let r = match self.temps.get(&n.val) {
            Some(&r) => r,
            None => {
                let class = hooks.class_for_type(n.ty);
                let r = self.state.allocate(file, class, &[])?;
                self.state.pin(r);
                self.temps.insert(n.val, r);
                r
            }
        };
        Self::make_reg(n, r);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Leaves
    // ------------------------------------------------------------------

    fn select_leaf(&mut self, n: &mut Node, goal: Goal) -> Result<(), CodegenError> {
        if goal == Goal::EFFECT {
            self.consume(n, None);
            return Ok(());
        }
        let hooks = self.hooks;
        let file = hooks.regfile();

        match n.op {
            // Address constants and immediates the encoder cannot hold
            // bypass the table
            Op::Icon if n.sym.is_some() => {
                let sym = n.sym.clone().ok_or_else(|| {
                    CodegenError::IllegalAddress("constant lost its symbol".into())
                })?;
                let r = self.state.allocate(file, hooks.class_for_type(Ty::Ptr), &[])?;
                self.asm.insn(&hooks.load_addr(r, &sym));
                Self::make_reg(n, r);
                return Ok(());
            }
            Op::Icon if !self.icon_encodable(n) => {
                let class = hooks.class_for_type(n.ty);
                let r = self.state.allocate(file, class, &[])?;
                if let Some((lo, hi)) = file.pair_halves(r) {
                    self.asm.insn(&hooks.load_imm(lo, n.val as u32 as i64));
                    self.asm.insn(&hooks.load_imm(hi, (n.val >> 32) as i32 as i64));
                } else {
                    self.asm.insn(&hooks.load_imm(r, n.val));
                }
                Self::make_reg(n, r);
                return Ok(());
            }
            Op::Fcon => return self.select_fcon(n),
            Op::Name => {
                if let Rewrite::Rewritten(new) = hooks.rewrite_name(n) {
                    n.replace(new);
                    return self.select(n, goal);
                }
            }
            _ => {}
        }

        match self.match_entry(n, goal, true) {
            Some(p) => self.emit_entry(n, p, true, goal),
            None => Err(CodegenError::NoPattern {
                op: n.op,
                goal: goal.bits(),
            }),
        }
    }

    fn icon_encodable(&self, n: &Node) -> bool {
        let hooks = self.hooks;
        if n.ty.is_wide() {
            hooks.legal_immediate(n.val as u32 as i64)
                && hooks.legal_immediate((n.val >> 32) as i32 as i64)
        } else {
            hooks.legal_immediate(n.val)
        }
    }

    /// Floating constants live in a read-only literal pool and load
    /// from a `.LC<n>` label
    fn select_fcon(&mut self, n: &mut Node) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let file = hooks.regfile();
        let target = hooks.target();
        let label = format!(".LC{}", self.asm.new_label());
        self.asm.directive(target, &Directive::Segment(Segment::Rodata));
        match n.ty {
            Ty::F32 => {
                self.asm.directive(target, &Directive::Align(2));
                self.asm.label(&label);
                self.asm
                    .directive(target, &Directive::Word((n.fval as f32).to_bits() as i64));
            }
            _ => {
                let bits = n.fval.to_bits();
                self.asm.directive(target, &Directive::Align(3));
                self.asm.label(&label);
                self.asm
                    .directive(target, &Directive::Word(bits as u32 as i64));
                self.asm
                    .directive(target, &Directive::Word((bits >> 32) as i64));
            }
        }
        self.asm.directive(target, &Directive::Segment(Segment::Text));
        let r = self.state.allocate(file, hooks.class_for_type(n.ty), &[])?;
        match file.pair_halves(r) {
            // Without hardware float a double-width literal loads its
            // halves into a core register pair
            Some((lo, hi)) => {
                self.asm.insn(&hooks.load_float(lo, &label));
                self.asm.insn(&hooks.load_float(hi, &format!("{}+4", label)));
            }
            None => self.asm.insn(&hooks.load_float(r, &label)),
        }
        Self::make_reg(n, r);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Indirection
    // ------------------------------------------------------------------

    fn select_deref(
        &mut self,
        n: &mut Node,
        goal: Goal,
        rewritten: bool,
    ) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        match self.try_deref(n, goal) {
            Err(e @ CodegenError::NoPattern { .. }) if !rewritten => {
                match hooks.rewrite_deref(n) {
                    Rewrite::Rewritten(new) => {
                        n.replace(new);
                        self.select(n, goal)
                    }
                    Rewrite::NoMatch => Err(e),
                }
            }
            other => other,
        }
    }

    fn try_deref(&mut self, n: &mut Node, goal: Goal) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        loop {
            match legalize::deref_shape(hooks, n, n.ty) {
                ShapeQuery::ConvertToOreg => {
                    legalize::reduce_addr_parts(n, &mut |c| self.force_reg(c))?;
                    legalize::finalize_oreg(hooks, n)?;
                    return self.select_leaf(n, goal);
                }
                ShapeQuery::Direct => {
                    return self.select_leaf(n, goal);
                }
                ShapeQuery::ForceRegister => {
                    // Materialize the full address, then fold at
                    // offset zero on the next iteration
                    let child = n.left.as_deref_mut().ok_or_else(|| {
                        CodegenError::IllegalAddress("empty dereference".into())
                    })?;
                    self.force_reg(child)?;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Address-of
    // ------------------------------------------------------------------

    fn select_addr(&mut self, n: &mut Node, goal: Goal) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let file = hooks.regfile();
        let child_op = n.left.as_deref().map(|c| c.op);
        match child_op {
            Some(Op::Name) => {
                let sym = n
                    .left
                    .as_deref()
                    .and_then(|c| c.sym.clone())
                    .ok_or_else(|| {
                        CodegenError::IllegalAddress("name without symbol".into())
                    })?;
                let r = self.state.allocate(file, hooks.class_for_type(Ty::Ptr), &[])?;
                self.asm.insn(&hooks.load_addr(r, &sym));
                Self::make_reg(n, r);
                Ok(())
            }
            // &*p is p
            Some(Op::Deref) => {
                let mut d = n.take_left();
                let inner = d.take_left();
                n.replace(inner);
                self.select(n, goal)
            }
            _ => Err(CodegenError::IllegalAddress(
                "address-of target is not addressable".into(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Unary operators
    // ------------------------------------------------------------------

    fn select_unary(&mut self, n: &mut Node, goal: Goal) -> Result<(), CodegenError> {
        if let Some(c) = n.left.as_deref_mut() {
            self.reduce_to_leaf(c)?;
        }
        let mut forced = false;
        loop {
            if let Some(p) = self.match_entry(n, goal, false) {
                return self.emit_entry(n, p, false, goal);
            }
            if !forced && n.left.as_deref().map(|c| c.op != Op::Reg).unwrap_or(false) {
                if let Some(c) = n.left.as_deref_mut() {
                    self.force_value(c)?;
                }
                forced = true;
                continue;
            }
            return Err(CodegenError::NoPattern {
                op: n.op,
                goal: goal.bits(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Binary operators
    // ------------------------------------------------------------------

    fn select_binary(
        &mut self,
        n: &mut Node,
        goal: Goal,
        rewritten: bool,
    ) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        match self.settle_binary(n, goal)? {
            Some(p) => self.emit_entry(n, p, false, goal),
            None if !rewritten => match hooks.rewrite_binary(n) {
                Rewrite::Rewritten(new) => {
                    debug!("rewrite {:?}", n.op);
                    n.replace(new);
                    if n.op.is_binary() {
                        self.select_binary(n, goal, true)
                    } else {
                        self.select(n, goal)
                    }
                }
                Rewrite::NoMatch => Err(CodegenError::NoPattern {
                    op: n.op,
                    goal: goal.bits(),
                }),
            },
            None => Err(CodegenError::NoPattern {
                op: n.op,
                goal: goal.bits(),
            }),
        }
    }

    /// Reduce both operands to leaf shapes, then search the table,
    /// forcing the right and then the left operand into a register
    /// when nothing accepts the current shapes. Ok(None) means the
    /// table is exhausted with both operands in registers.
    fn settle_binary(
        &mut self,
        n: &mut Node,
        goal: Goal,
    ) -> Result<Option<&'static Pattern>, CodegenError> {
        if let Some(l) = n.left.as_deref_mut() {
            self.reduce_to_leaf(l)?;
        }
        if let Some(r) = n.right.as_deref_mut() {
            self.reduce_to_leaf(r)?;
        }
        let mut forced_right = false;
        let mut forced_left = false;
        let mut normalized = false;
        loop {
            if let Some(p) = self.match_entry(n, goal, false) {
                return Ok(Some(p));
            }
            if !forced_right && n.right.as_deref().map(|c| c.op != Op::Reg).unwrap_or(false) {
                if let Some(c) = n.right.as_deref_mut() {
                    self.force_value(c)?;
                }
                forced_right = true;
                continue;
            }
            if !forced_left && n.left.as_deref().map(|c| c.op != Op::Reg).unwrap_or(false) {
                if let Some(c) = n.left.as_deref_mut() {
                    self.force_value(c)?;
                }
                forced_left = true;
                continue;
            }
            if !normalized && self.normalize_children(n)? {
                normalized = true;
                continue;
            }
            return Ok(None);
        }
    }

    /// Move register operands that ended up in the wrong class (a
    /// float call result in the integer return pair, say) into their
    /// natural class
    fn normalize_children(&mut self, n: &mut Node) -> Result<bool, CodegenError> {
        let mut changed = false;
        if let Some(l) = n.left.as_deref_mut() {
            changed |= self.normalize_class(l)?;
        }
        if let Some(r) = n.right.as_deref_mut() {
            changed |= self.normalize_class(r)?;
        }
        Ok(changed)
    }

    fn normalize_class(&mut self, c: &mut Node) -> Result<bool, CodegenError> {
        if c.op != Op::Reg {
            return Ok(false);
        }
        let hooks = self.hooks;
        let file = hooks.regfile();
        let r = match c.reg {
            Some(r) => r,
            None => return Ok(false),
        };
        let want = hooks.class_for_type(c.ty);
        if file.def(r).class == want {
            return Ok(false);
        }
        let t = self.state.allocate(file, want, &[])?;
        self.emit_move(t, r);
        self.state.release_owned(file, r);
        c.reg = Some(t);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn select_assign(
        &mut self,
        n: &mut Node,
        goal: Goal,
        rewritten: bool,
    ) -> Result<(), CodegenError> {
        let hooks = self.hooks;

        // Stores to static/external names are not directly encodable
        // on load/store machines; give the target its shot first.
        if !rewritten {
            let global_store = n
                .left
                .as_deref()
                .map(|l| {
                    l.op == Op::Name && l.sym.as_ref().map(|s| !s.is_frame()).unwrap_or(false)
                })
                .unwrap_or(false);
            if global_store {
                if let Rewrite::Rewritten(new) = hooks.rewrite_assign(n) {
                    n.replace(new);
                    return if n.op == Op::Assign {
                        self.select_assign(n, goal, true)
                    } else {
                        self.select(n, goal)
                    };
                }
            }
        }

        if let Some(l) = n.left.as_deref_mut() {
            match l.op {
                Op::Deref => self.legalize_store_target(l)?,
                Op::Temp => self.bind_temp(l)?,
                Op::Name | Op::Reg | Op::Oreg => {}
                op => {
                    return Err(CodegenError::IllegalAddress(format!(
                        "assignment to {:?}",
                        op
                    )))
                }
            }
        }
        if let Some(r) = n.right.as_deref_mut() {
            self.reduce_to_leaf(r)?;
        }

        let mut forced = false;
        let mut normalized = false;
        loop {
            if let Some(p) = self.match_entry(n, goal, false) {
                return self.emit_entry(n, p, false, goal);
            }
            if !forced && n.right.as_deref().map(|c| c.op != Op::Reg).unwrap_or(false) {
                if let Some(r) = n.right.as_deref_mut() {
                    self.force_value(r)?;
                }
                forced = true;
                continue;
            }
            if !normalized {
                let changed = match n.right.as_deref_mut() {
                    Some(r) => self.normalize_class(r)?,
                    None => false,
                };
                normalized = true;
                if changed {
                    continue;
                }
            }
            if !rewritten {
                if let Rewrite::Rewritten(new) = hooks.rewrite_assign(n) {
                    n.replace(new);
                    return if n.op == Op::Assign {
                        self.select_assign(n, goal, true)
                    } else {
                        self.select(n, goal)
                    };
                }
            }
            return Err(CodegenError::NoPattern {
                op: Op::Assign,
                goal: goal.bits(),
            });
        }
    }

    /// Legalize the destination of a store into an Oreg
    fn legalize_store_target(&mut self, l: &mut Node) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        loop {
            match legalize::deref_shape(hooks, l, l.ty) {
                ShapeQuery::ConvertToOreg => {
                    legalize::reduce_addr_parts(l, &mut |c| self.force_reg(c))?;
                    return legalize::finalize_oreg(hooks, l);
                }
                _ => {
                    let child = l.left.as_deref_mut().ok_or_else(|| {
                        CodegenError::IllegalAddress("empty store destination".into())
                    })?;
                    self.force_reg(child)?;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Conditional branches
    // ------------------------------------------------------------------

    fn select_cbranch(&mut self, n: &mut Node) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let label = n.val;
        let mut cond = n.take_left();
        if !cond.op.is_cmp() {
            return Err(CodegenError::NoPattern {
                op: cond.op,
                goal: Goal::EFFECT.bits(),
            });
        }
        let mut rewritten = false;
        loop {
            let branch = hooks.branch_mnemonic(cond.op);
            match self.settle_binary(&mut cond, Goal::EFFECT)? {
                Some(p) => {
                    self.emit_entry(&mut cond, p, false, Goal::EFFECT)?;
                    self.asm.insn(&format!("{}\t.L{}", branch, label));
                    n.retire();
                    return Ok(());
                }
                None if !rewritten => match hooks.rewrite_binary(&cond) {
                    Rewrite::Rewritten(new) => {
                        cond.replace(new);
                        rewritten = true;
                        if !cond.op.is_cmp() {
                            // Rewrote to a value; compare it against zero
                            let ty = cond.ty;
                            let zero = Node::icon(ty, 0);
                            let old = std::mem::replace(&mut cond, Node::icon(ty, 0));
                            cond = Node::binary(Op::Ne, ty, old, zero);
                        }
                    }
                    Rewrite::NoMatch => {
                        return Err(CodegenError::NoPattern {
                            op: cond.op,
                            goal: Goal::EFFECT.bits(),
                        })
                    }
                },
                None => {
                    return Err(CodegenError::NoPattern {
                        op: cond.op,
                        goal: Goal::EFFECT.bits(),
                    })
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn select_call(&mut self, n: &mut Node, goal: Goal) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let file = hooks.regfile();
        let mut args = n.take_args();

        let params = args
            .iter()
            .map(|a| match a.ty {
                Ty::Aggregate => Param::aggregate(a.val as u32),
                t => Param::scalar(t),
            })
            .collect();
        let ret = match n.ty {
            Ty::Aggregate => Param::aggregate(n.val as u32),
            t => Param::scalar(t),
        };
        let conv = hooks.build_call_conv(&Signature { params, ret });
        if matches!(conv.ret, RetLoc::Hidden(_)) {
            return Err(CodegenError::Unsupported {
                what: "aggregate return through a hidden pointer".into(),
            });
        }
        debug!(
            "call: {} args, {} stack bytes",
            conv.args.len(),
            conv.stack_bytes
        );

        // The call tramples every caller-saved register; anything
        // live there, owned or pinned, moves to a preserved one first
        let scratch = Self::caller_saved(file);
        for &x in &scratch {
            if self.state.is_live(x) {
                let t = self.relocate_live(x, &scratch)?;
                for a in args.iter_mut() {
                    Self::repoint_reg(a, x, t);
                }
                if let Some(c) = n.left.as_deref_mut() {
                    Self::repoint_reg(c, x, t);
                }
            }
        }

        // An argument whose evaluation reaches for fixed registers or
        // makes a call of its own goes first, parked in a preserved
        // register until the simple arguments settle
        for (arg, loc) in args.iter_mut().zip(conv.args.iter()) {
            if !matches!(*loc, ArgLoc::Reg(_) | ArgLoc::RegPair(_)) {
                continue;
            }
            if arg.ty == Ty::Aggregate || !Self::disturbs_call_regs(arg) {
                continue;
            }
            self.force_reg(arg)?;
            let r = arg
                .reg
                .ok_or_else(|| CodegenError::IllegalAddress("argument not reduced".into()))?;
            if file.def(r).temporary {
                let t = self.relocate_live(r, &scratch)?;
                arg.reg = Some(t);
            }
        }

        if conv.stack_bytes > 0 {
            let t = hooks.stack_adjust(-(conv.stack_bytes as i32));
            self.asm.insn(&t);
        }

        // Stack arguments first, so their evaluation cannot disturb
        // the pinned argument registers
        for (arg, loc) in args.iter_mut().zip(conv.args.iter()) {
            if let ArgLoc::Stack { offset } = *loc {
                if arg.ty == Ty::Aggregate {
                    return Err(CodegenError::Unsupported {
                        what: "aggregate argument passing".into(),
                    });
                }
                self.force_reg(arg)?;
                let src = arg.reg.ok_or_else(|| {
                    CodegenError::IllegalAddress("argument not reduced".into())
                })?;
                let t = hooks.stack_arg_store(arg.ty, src, offset);
                self.asm.insn(&t);
                self.consume(arg, None);
            }
        }
        for (arg, loc) in args.iter_mut().zip(conv.args.iter()) {
            match *loc {
                ArgLoc::Reg(r) | ArgLoc::RegPair(r) => {
                    if arg.ty == Ty::Aggregate {
                        return Err(CodegenError::Unsupported {
                            what: "aggregate argument passing".into(),
                        });
                    }
                    self.place_in_fixed(arg, r)?;
                }
                ArgLoc::Stack { .. } => {}
            }
        }

        let live = hooks.call_live_registers(&conv);
        for &r in &live {
            self.state.mark_live(file, r);
        }

        let mut callee = n.take_left();
        let direct = if matches!(callee.op, Op::Name | Op::Icon) {
            callee.sym.as_ref().map(|s| s.name.clone())
        } else {
            None
        };
        match direct {
            Some(name) => {
                let t = hooks.call_direct(&name);
                self.asm.insn(&t);
            }
            None => {
                self.force_reg(&mut callee)?;
                let cr = callee.reg.ok_or_else(|| {
                    CodegenError::IllegalAddress("call target not reduced".into())
                })?;
                let t = hooks.call_indirect(cr);
                self.asm.insn(&t);
                self.state.release_owned(file, cr);
            }
        }
        callee.retire();

        // Argument registers die at the call
        for &r in &live {
            self.state.release(file, r);
        }
        if conv.stack_bytes > 0 && !conv.callee_pops {
            let t = hooks.stack_adjust(conv.stack_bytes as i32);
            self.asm.insn(&t);
        }

        match conv.ret {
            RetLoc::None => {
                n.retire();
                Ok(())
            }
            RetLoc::Reg(r) | RetLoc::RegPair(r) | RetLoc::FloatReg(r) => {
                if goal.intersects(G_ANYREG) {
                    self.state.allocate_fixed(file, r)?;
                    Self::make_reg(n, r);
                } else {
                    n.retire();
                }
                Ok(())
            }
            RetLoc::Hidden(_) => unreachable!(),
        }
    }

    // ------------------------------------------------------------------
    // Struct copy
    // ------------------------------------------------------------------

    /// Aggregate assignment lowers to the block-copy runtime primitive
    /// with its fixed destination/source/length registers
    fn select_stasg(&mut self, n: &mut Node) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let file = hooks.regfile();
        let (dst, src, len) = hooks.block_copy_regs();
        let bytes = n.val;

        // The copy primitive is a call underneath and destroys the
        // caller-saved registers like one
        let scratch = Self::caller_saved(file);
        for &x in &scratch {
            if self.state.is_live(x) {
                let t = self.relocate_live(x, &scratch)?;
                Self::repoint_reg(n, x, t);
            }
        }

        let mut dest_addr = Self::lvalue_address(n.take_left());
        let mut src_addr = Self::lvalue_address(n.take_right());
        self.place_in_fixed(&mut dest_addr, dst)?;
        self.place_in_fixed(&mut src_addr, src)?;
        self.state.allocate_fixed(file, len)?;
        let t = hooks.load_imm(len, bytes);
        self.asm.insn(&t);
        let t = hooks.call_direct(hooks.block_copy_func());
        self.asm.insn(&t);
        for r in [dst, src, len] {
            self.state.release(file, r);
        }
        n.retire();
        Ok(())
    }

    /// The address of an lvalue tree: strip one indirection, or wrap
    /// the name in address-of
    fn lvalue_address(mut lv: Box<Node>) -> Box<Node> {
        if lv.op == Op::Deref {
            lv.take_left()
        } else {
            Node::addr_of(lv)
        }
    }

    // ------------------------------------------------------------------
    // Operand plumbing
    // ------------------------------------------------------------------

    /// Reduce a child to a table-matchable leaf shape without forcing
    /// memory operands into registers
    fn reduce_to_leaf(&mut self, c: &mut Node) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        match c.op {
            // Constants the encoder cannot hold in an instruction
            // immediate must not reach an immediate-accepting entry
            Op::Icon if c.sym.is_some() || !self.icon_encodable(c) => self.force_value(c),
            Op::Icon | Op::Fcon | Op::Name | Op::Oreg | Op::Reg => Ok(()),
            Op::Temp => self.bind_temp(c),
            Op::Deref => {
                if legalize::deref_shape(hooks, c, c.ty) == ShapeQuery::ConvertToOreg {
                    legalize::reduce_addr_parts(c, &mut |x| self.force_reg(x))?;
                    legalize::finalize_oreg(hooks, c)
                } else {
                    self.force_value(c)
                }
            }
            _ => self.force_value(c),
        }
    }

    /// Evaluate a subtree into a register of its natural class
    fn force_value(&mut self, c: &mut Node) -> Result<(), CodegenError> {
        let class = self.hooks.class_for_type(c.ty);
        self.select(c, Goal::for_class(class))
    }

    /// Ensure a subtree denotes a bound register
    fn force_reg(&mut self, c: &mut Node) -> Result<(), CodegenError> {
        match c.op {
            Op::Reg => Ok(()),
            Op::Temp => self.bind_temp(c),
            _ => self.force_value(c),
        }
    }

    /// Move the value in a live register to a fresh one outside
    /// `avoid`, preserving pin state and re-pointing any temporary
    /// binding that named it
    fn relocate_live(&mut self, x: RegId, avoid: &[RegId]) -> Result<RegId, CodegenError> {
        let file = self.hooks.regfile();
        let owned = self.state.is_owned(x);
        let class = file.def(x).class;
        let t = self.state.allocate(file, class, avoid)?;
        self.emit_move(t, x);
        self.state.release(file, x);
        if !owned {
            self.state.pin(t);
        }
        for r in self.temps.values_mut() {
            if *r == x {
                *r = t;
            }
        }
        Ok(t)
    }

    /// Rebind every reference to `from` in an already-reduced subtree
    fn repoint_reg(n: &mut Node, from: RegId, to: RegId) {
        if n.op == Op::Reg && n.reg == Some(from) {
            n.reg = Some(to);
        }
        if let Some(a) = n.addr.as_mut() {
            if a.base == from {
                a.base = to;
            }
            if a.index == Some(from) {
                a.index = Some(to);
            }
        }
        if let Some(l) = n.left.as_deref_mut() {
            Self::repoint_reg(l, from, to);
        }
        if let Some(r) = n.right.as_deref_mut() {
            Self::repoint_reg(r, from, to);
        }
    }

    fn caller_saved(file: &RegFile) -> Vec<RegId> {
        file.allocatable
            .iter()
            .copied()
            .filter(|&r| file.def(r).temporary)
            .collect()
    }

    /// Does evaluating this subtree reach for fixed registers or make
    /// a call of its own?
    fn disturbs_call_regs(n: &Node) -> bool {
        if matches!(n.op, Op::Call | Op::Div | Op::Mod | Op::Mul | Op::StAsg) {
            return true;
        }
        // Wide and floating-point operators may lower to runtime
        // helper calls
        if !matches!(n.op, Op::Icon | Op::Fcon | Op::Name | Op::Reg | Op::Temp | Op::Oreg) {
            let wideish = |c: &Node| c.ty.is_float() || c.ty.is_wide();
            if wideish(n)
                || n.left.as_deref().map_or(false, wideish)
                || n.right.as_deref().map_or(false, wideish)
            {
                return true;
            }
        }
        n.left.as_deref().map_or(false, Self::disturbs_call_regs)
            || n.right.as_deref().map_or(false, Self::disturbs_call_regs)
    }

    /// Evaluate into any register, then move into the demanded one
    fn place_in_fixed(&mut self, arg: &mut Node, target: RegId) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let file = hooks.regfile();
        self.force_reg(arg)?;
        let src = arg
            .reg
            .ok_or_else(|| CodegenError::IllegalAddress("operand not reduced".into()))?;
        if src != target {
            self.state.allocate_fixed(file, target)?;
            self.emit_move(target, src);
            self.state.release_owned(file, src);
        }
        arg.retire();
        Ok(())
    }

    /// Register-to-register move, splitting pairs into their halves
    fn emit_move(&mut self, dst: RegId, src: RegId) {
        let hooks = self.hooks;
        let file = hooks.regfile();
        match (file.pair_halves(dst), file.pair_halves(src)) {
            (Some((dl, dh)), Some((sl, sh))) => {
                self.asm.insn(&hooks.mov_reg(dl, sl));
                self.asm.insn(&hooks.mov_reg(dh, sh));
            }
            _ => self.asm.insn(&hooks.mov_reg(dst, src)),
        }
    }

    /// Release the register(s) a consumed operand held, then retire it.
    /// `keep` names a register being reused as the result.
    fn consume(&mut self, n: &mut Node, keep: Option<RegId>) {
        let file = self.hooks.regfile();
        match n.op {
            Op::Reg => {
                if let Some(r) = n.reg {
                    if keep != Some(r) {
                        self.state.release_owned(file, r);
                    }
                }
            }
            Op::Oreg => {
                if let Some(a) = n.addr.clone() {
                    self.state.release_owned(file, a.base);
                    if let Some(ix) = a.index {
                        self.state.release_owned(file, ix);
                    }
                }
            }
            _ => {}
        }
        n.retire();
    }

    fn make_reg(n: &mut Node, r: RegId) {
        n.left = None;
        n.right = None;
        n.sym = None;
        n.addr = None;
        n.op = Op::Reg;
        n.reg = Some(r);
    }

    // ------------------------------------------------------------------
    // Table matching and emission
    // ------------------------------------------------------------------

    /// First table entry accepting this node's operator, goal, feature
    /// requirements, and operand shapes. `leaf` nodes match with
    /// themselves as the left operand.
    fn match_entry(&self, n: &Node, goal: Goal, leaf: bool) -> Option<&'static Pattern> {
        let hooks = self.hooks;
        let (l, r) = if leaf {
            (Some(n), None)
        } else {
            (n.left.as_deref(), n.right.as_deref())
        };
        for p in hooks.table() {
            if p.op != n.op || !p.goal.intersects(goal) || !hooks.accepts(p) {
                continue;
            }
            if !p.left.matches(l) || !p.right.matches(r) {
                continue;
            }
            // Conversion entries carry the result-type constraint in
            // the otherwise unused right position
            if p.op == Op::Conv
                && !p.right.types.is_empty()
                && !p.right.types.intersects(TypeSet::of(n.ty))
            {
                continue;
            }
            return Some(p);
        }
        None
    }

    /// Emit a matched entry: allocate its temporaries, expand the
    /// template, release consumed operands, and bind the result
    fn emit_entry(
        &mut self,
        n: &mut Node,
        p: &'static Pattern,
        leaf: bool,
        goal: Goal,
    ) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let file = hooks.regfile();

        let fixed = hooks.fixed_registers(p);
        if !fixed.is_free() {
            return self.emit_fixed_entry(n, p, goal);
        }

        // A destructive two-address form must not clobber a register
        // it does not own
        if p.result == Binding::Left && p.op.is_binary() {
            if let Some(l) = n.left.as_deref_mut() {
                if let (Op::Reg, Some(lr)) = (l.op, l.reg) {
                    if !self.state.is_owned(lr) {
                        let class = file.def(lr).class;
                        let t = self.state.allocate(file, class, &[])?;
                        self.emit_move(t, lr);
                        l.reg = Some(t);
                    }
                }
            }
        }

        let mut temps: Vec<RegId> = Vec::with_capacity(p.needs.count as usize);
        for _ in 0..p.needs.count {
            temps.push(self.state.allocate(file, p.needs.class, &[])?);
        }

        let text = {
            let (l, r) = if leaf {
                (Some(&*n), None)
            } else {
                (n.left.as_deref(), n.right.as_deref())
            };
            let ops = TemplateOps::new(l, r, &temps);
            expand_template(p.template, &ops, file)?
        };
        self.asm.insn(&text);

        let result = match p.result {
            Binding::Temp1 => Some(*temps.first().ok_or_else(|| {
                CodegenError::BadTemplate("result bound to a missing temporary".into())
            })?),
            Binding::Left => n.left.as_deref().and_then(|x| x.reg),
            Binding::Right => n.right.as_deref().and_then(|x| x.reg),
            Binding::None => None,
        };
        for (i, &t) in temps.iter().enumerate() {
            if !(p.result == Binding::Temp1 && i == 0) {
                self.state.release(file, t);
            }
        }
        if leaf {
            if n.op == Op::Oreg {
                if let Some(a) = n.addr.clone() {
                    self.state.release_owned(file, a.base);
                    if let Some(ix) = a.index {
                        self.state.release_owned(file, ix);
                    }
                }
            }
        } else {
            if let Some(mut l) = n.left.take() {
                self.consume(&mut l, result);
            }
            if let Some(mut r) = n.right.take() {
                self.consume(&mut r, result);
            }
        }

        match result {
            Some(r) if goal.intersects(G_ANYREG) => Self::make_reg(n, r),
            // Pinned temporaries survive the statement; release_owned
            // leaves them alone
            Some(r) => {
                self.state.release_owned(file, r);
                n.retire();
            }
            None => n.retire(),
        }
        Ok(())
    }

    /// Emission for fixed-register idioms: operands move into the
    /// exact registers the template demands, and the `never` set must
    /// be free across the instruction.
    fn emit_fixed_entry(
        &mut self,
        n: &mut Node,
        p: &'static Pattern,
        goal: Goal,
    ) -> Result<(), CodegenError> {
        let hooks = self.hooks;
        let file = hooks.regfile();
        let fixed = hooks.fixed_registers(p);

        // A pinned temporary living in a register the idiom demands or
        // destroys moves out of the way, and its binding follows it
        let mut blocked: Vec<RegId> = Vec::new();
        for r in [fixed.left, fixed.right, fixed.result]
            .into_iter()
            .flatten()
            .chain(fixed.never.iter().copied())
        {
            if !blocked.contains(&r) {
                blocked.push(r);
            }
            for &o in file.def(r).overlaps {
                if !blocked.contains(&o) {
                    blocked.push(o);
                }
            }
        }
        for i in 0..blocked.len() {
            let x = blocked[i];
            if self.state.is_live(x) && !self.state.is_owned(x) {
                let t = self.relocate_live(x, &blocked)?;
                for c in [n.left.as_deref_mut(), n.right.as_deref_mut()]
                    .into_iter()
                    .flatten()
                {
                    Self::repoint_reg(c, x, t);
                }
            }
        }

        for &r in fixed.never {
            if !self.state.is_free(file, r) {
                return Err(CodegenError::RegisterPressure {
                    class: file.def(r).class.name(),
                });
            }
        }
        // The right operand may already occupy the register the left
        // placement demands; relocate it out of the way first
        if let (Some(fl), Some(r)) = (fixed.left, n.right.as_deref_mut()) {
            if r.op == Op::Reg {
                if let Some(rr) = r.reg {
                    if rr == fl || file.def(rr).overlaps.contains(&fl) {
                        let class = file.def(rr).class;
                        let t = self.state.allocate(file, class, &[])?;
                        self.emit_move(t, rr);
                        self.state.release_owned(file, rr);
                        r.reg = Some(t);
                    }
                }
            }
        }
        if let (Some(fl), Some(l)) = (fixed.left, n.left.as_deref_mut()) {
            self.place_in_fixed(l, fl)?;
            Self::make_reg(l, fl);
        }
        if let (Some(fr), Some(r)) = (fixed.right, n.right.as_deref_mut()) {
            self.place_in_fixed(r, fr)?;
            Self::make_reg(r, fr);
        }

        let text = {
            let ops = TemplateOps::new(n.left.as_deref(), n.right.as_deref(), &[]);
            expand_template(p.template, &ops, file)?
        };
        self.asm.insn(&text);

        // Operand registers die with the instruction; the result
        // register survives it
        for fr in [fixed.left, fixed.right].into_iter().flatten() {
            if Some(fr) != fixed.result {
                self.state.release(file, fr);
            }
        }
        if let Some(mut l) = n.left.take() {
            l.retire();
        }
        if let Some(mut r) = n.right.take() {
            r.retire();
        }
        match fixed.result {
            Some(r) if goal.intersects(G_ANYREG) => {
                if !self.state.is_live(r) {
                    self.state.allocate_fixed(file, r)?;
                }
                Self::make_reg(n, r);
            }
            Some(r) => {
                self.state.release(file, r);
                n.retire();
            }
            None => n.retire(),
        }
        Ok(())
    }
}

// ============================================================================
// Unit Driver
// ============================================================================

/// Generate code for one function's statement stream. User-level
/// errors accumulate in `diags` and scanning continues; an internal
/// error aborts the unit and returns None.
pub fn generate(
    hooks: &dyn TargetHooks,
    stmts: &mut [Box<Node>],
    diags: &mut Diagnostics,
) -> Option<String> {
    let mut cg = Codegen::new(hooks);
    for s in stmts.iter_mut() {
        if let Err(e) = cg.gen_stmt(s) {
            if diags.report(e).is_some() {
                return None;
            }
        }
    }
    Some(cg.finish())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callconv::CallRules;
    use crate::regmodel::{ColorMap, RegClass, RegDef, RegFile};
    use crate::table::{Needs, OperandSpec, Shape, S_MEM, S_RC, T_WORD};
    use crate::target::{Arch, Features, Os, Target};
    use crate::tree::{Addr, SymRef};

    struct MiniHooks {
        target: Target,
        file: RegFile,
    }

    static REGS: [RegDef; 4] = [
        RegDef { name: "r0", class: RegClass::A, temporary: true, overlaps: &[] },
        RegDef { name: "r1", class: RegClass::A, temporary: true, overlaps: &[] },
        RegDef { name: "r2", class: RegClass::A, temporary: true, overlaps: &[] },
        RegDef { name: "fp", class: RegClass::A, temporary: false, overlaps: &[] },
    ];

    static RULES: CallRules = CallRules {
        arg_regs: &[0, 1],
        arg_pairs: &[],
        max_units: 2,
        ret_reg: 0,
        ret_pair: 0,
        ret_float: 0,
        float_ret_in_float_reg: false,
        stack_align: 8,
        callee_pops: false,
    };

    static TABLE: [Pattern; 5] = [
        Pattern {
            op: Op::Icon,
            goal: Goal::CLASS_A,
            left: OperandSpec::new(Shape::CON, T_WORD),
            right: OperandSpec::NONE,
            needs: Needs::reg(RegClass::A),
            result: Binding::Temp1,
            features: Features::empty(),
            template: "mov\tA1,AL",
        },
        Pattern {
            op: Op::Oreg,
            goal: Goal::CLASS_A,
            left: OperandSpec::new(Shape::OREG, T_WORD),
            right: OperandSpec::NONE,
            needs: Needs::reg(RegClass::A),
            result: Binding::Temp1,
            features: Features::empty(),
            template: "ldr\tA1,AL",
        },
        Pattern {
            op: Op::Name,
            goal: Goal::CLASS_A,
            left: OperandSpec::new(Shape::NAME, T_WORD),
            right: OperandSpec::NONE,
            needs: Needs::reg(RegClass::A),
            result: Binding::Temp1,
            features: Features::empty(),
            template: "ldr\tA1,AL",
        },
        Pattern {
            op: Op::Plus,
            goal: Goal::CLASS_A,
            left: OperandSpec::new(Shape::REG, T_WORD),
            right: OperandSpec::new(S_RC, T_WORD),
            needs: Needs::reg(RegClass::A),
            result: Binding::Temp1,
            features: Features::empty(),
            template: "add\tA1,AL,AR",
        },
        Pattern {
            op: Op::Assign,
            goal: Goal::EFFECT.union(Goal::CLASS_A),
            left: OperandSpec::new(S_MEM, T_WORD),
            right: OperandSpec::new(Shape::REG, T_WORD),
            needs: Needs::NONE,
            result: Binding::Right,
            features: Features::empty(),
            template: "str\tAR,AL",
        },
    ];

    impl MiniHooks {
        fn new() -> Self {
            Self {
                target: Target::new(Arch::Arm, Os::Linux),
                file: RegFile {
                    regs: &REGS,
                    allocatable: &[0, 1, 2],
                    colormap: ColorMap {
                        capacity: [3, 0, 0],
                        weight: [[1, 0, 0], [0, 0, 0], [0, 0, 0]],
                    },
                },
            }
        }
    }

    impl TargetHooks for MiniHooks {
        fn target(&self) -> &Target {
            &self.target
        }
        fn regfile(&self) -> &RegFile {
            &self.file
        }
        fn table(&self) -> &'static [Pattern] {
            &TABLE
        }
        fn call_rules(&self) -> &CallRules {
            &RULES
        }
        fn frame_pointer(&self) -> RegId {
            3
        }
        fn block_copy_regs(&self) -> (RegId, RegId, RegId) {
            (0, 1, 2)
        }
        fn class_for_type(&self, _ty: Ty) -> RegClass {
            RegClass::A
        }
        fn legal_offset(&self, _ty: Ty, offset: i64) -> bool {
            offset.abs() <= 4095
        }
        fn legal_scale(&self, _ty: Ty, _scale: u8) -> bool {
            true
        }
        fn rewrite_binary(&self, _n: &Node) -> Rewrite {
            Rewrite::NoMatch
        }
        fn rewrite_assign(&self, _n: &Node) -> Rewrite {
            Rewrite::NoMatch
        }
        fn rewrite_deref(&self, _n: &Node) -> Rewrite {
            Rewrite::NoMatch
        }
    }

    #[test]
    fn test_load_from_offset() {
        let h = MiniHooks::new();
        let mut cg = Codegen::new(&h);
        let mut n = *Node::deref(
            Ty::I32,
            Node::binary(
                Op::Plus,
                Ty::Ptr,
                Node::reg(Ty::Ptr, 1),
                Node::icon(Ty::I32, 4),
            ),
        );
        cg.select(&mut n, Goal::CLASS_A).unwrap();
        assert_eq!(n.op, Op::Reg);
        assert_eq!(cg.finish(), "\tldr\tr0,[r1, #4]\n");
    }

    #[test]
    fn test_add_with_immediate() {
        let h = MiniHooks::new();
        let mut cg = Codegen::new(&h);
        let mut n = *Node::binary(
            Op::Plus,
            Ty::I32,
            Node::reg(Ty::I32, 1),
            Node::icon(Ty::I32, 7),
        );
        cg.select(&mut n, Goal::CLASS_A).unwrap();
        assert_eq!(n.reg, Some(0));
        assert_eq!(cg.finish(), "\tadd\tr0,r1,#7\n");
    }

    #[test]
    fn test_store_to_frame_local() {
        let h = MiniHooks::new();
        let mut cg = Codegen::new(&h);
        let mut n = *Node::assign(
            Node::name(Ty::I32, SymRef::auto("x", -8)),
            Node::icon(Ty::I32, 3),
        );
        cg.gen_stmt(&mut n).unwrap();
        assert_eq!(cg.finish(), "\tmov\tr0,#3\n\tstr\tr0,[fp, #-8]\n");
    }

    #[test]
    fn test_scratch_registers_released() {
        let h = MiniHooks::new();
        let mut cg = Codegen::new(&h);
        for _ in 0..4 {
            let mut n = *Node::assign(
                Node::name(Ty::I32, SymRef::auto("x", -8)),
                Node::binary(
                    Op::Plus,
                    Ty::I32,
                    Node::oreg(Ty::I32, Addr::base_offset(3, -4)),
                    Node::icon(Ty::I32, 1),
                ),
            );
            cg.gen_stmt(&mut n).unwrap();
        }
        // If consumption leaked registers, the three-register file
        // would run out before the fourth statement.
        assert_eq!(cg.state.pressure().counts, [0, 0, 0]);
    }

    #[test]
    fn test_missing_pattern_is_fatal() {
        let h = MiniHooks::new();
        let mut cg = Codegen::new(&h);
        let mut n = *Node::binary(
            Op::Xor,
            Ty::I32,
            Node::reg(Ty::I32, 0),
            Node::reg(Ty::I32, 1),
        );
        let err = cg.select(&mut n, Goal::CLASS_A).unwrap_err();
        assert!(matches!(err, CodegenError::NoPattern { op: Op::Xor, .. }));
    }

    #[test]
    fn test_large_immediate_bypasses_table() {
        let h = MiniHooks::new();
        let mut cg = Codegen::new(&h);
        let mut n = *Node::icon(Ty::I32, 123456);
        cg.select(&mut n, Goal::CLASS_A).unwrap();
        assert_eq!(cg.finish(), "\tldr\tr0,=123456\n");
    }
}
