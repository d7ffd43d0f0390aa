//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Addressing-mode legalizer
//
// Rewrites dereference subtrees into indexed memory operands (Oreg)
// when the target's offset and scale rules allow, and tells the
// selector to materialize the address in a register otherwise.
//
// The split is two-phase: `deref_shape` classifies a dereference
// structurally (before any child is reduced), the selector forces the
// non-constant pieces into registers, then `finalize_oreg` folds the
// arithmetic into the operand and discards the consumed nodes. Both
// phases apply the same offset predicate, so they cannot disagree.
//

use crate::diag::CodegenError;
use crate::hooks::{ShapeQuery, TargetHooks};
use crate::tree::{Addr, Node, Op, Ty};
use log::trace;

// ============================================================================
// Structural Classification
// ============================================================================

/// Will this subtree sit in a register once the selector reduces it?
/// Anything value-producing qualifies; the classifier only has to rule
/// out the pieces that fold away (constants, frame references).
fn reducible(n: &Node) -> bool {
    !matches!(n.op, Op::Icon | Op::Fcon | Op::Free)
}

/// A frame-local address leaf: Addr(Name) where the symbol lives in
/// the stack frame
fn frame_addr(n: &Node) -> Option<i64> {
    if n.op != Op::Addr {
        return None;
    }
    let inner = n.left.as_deref()?;
    if inner.op == Op::Name {
        if let Some(sym) = &inner.sym {
            if sym.is_frame() {
                return Some(sym.offset as i64);
            }
        }
    }
    None
}

/// A shift-by-constant usable as a scaled index: Lsh(x, Icon)
fn scaled_index(n: &Node) -> Option<(&Node, u8)> {
    if n.op != Op::Lsh {
        return None;
    }
    let amount = n.right.as_deref()?;
    if amount.op == Op::Icon && amount.sym.is_none() && (0..=31).contains(&amount.val) {
        Some((n.left.as_deref()?, amount.val as u8))
    } else {
        None
    }
}

/// Classify a dereference before reduction.
///
/// `ty` is the type of the value being loaded or stored; offset
/// legality is type-sensitive.
pub fn deref_shape(hooks: &dyn TargetHooks, n: &Node, ty: Ty) -> ShapeQuery {
    debug_assert_eq!(n.op, Op::Deref);
    let child = match n.left.as_deref() {
        Some(c) => c,
        None => return ShapeQuery::ForceRegister,
    };
    match child.op {
        // Already a register (or becomes one trivially): [r]
        Op::Reg | Op::Temp => ShapeQuery::ConvertToOreg,
        // &local folds to the frame slot itself
        Op::Addr => match frame_addr(child) {
            Some(off) if hooks.legal_offset(ty, off) => ShapeQuery::ConvertToOreg,
            _ => ShapeQuery::ForceRegister,
        },
        Op::Plus | Op::Minus => {
            let (l, r) = match (child.left.as_deref(), child.right.as_deref()) {
                (Some(l), Some(r)) => (l, r),
                _ => return ShapeQuery::ForceRegister,
            };
            // base +/- constant
            if r.op == Op::Icon && r.sym.is_none() {
                let off = if child.op == Op::Minus { -r.val } else { r.val };
                let off = match frame_addr(l) {
                    Some(base) => base + off,
                    None if reducible(l) => off,
                    None => return ShapeQuery::ForceRegister,
                };
                return if hooks.legal_offset(ty, off) {
                    ShapeQuery::ConvertToOreg
                } else {
                    ShapeQuery::ForceRegister
                };
            }
            if child.op == Op::Minus {
                return ShapeQuery::ForceRegister;
            }
            // base + (index << scale)
            if let Some((ix, scale)) = scaled_index(r) {
                if reducible(l) && reducible(ix) && hooks.legal_scale(ty, scale) {
                    return ShapeQuery::ConvertToOreg;
                }
                return ShapeQuery::ForceRegister;
            }
            // base + index
            if reducible(l) && reducible(r) && hooks.legal_scale(ty, 0) {
                ShapeQuery::ConvertToOreg
            } else {
                ShapeQuery::ForceRegister
            }
        }
        _ => ShapeQuery::ForceRegister,
    }
}

/// Force the subtrees of a classified dereference that do not fold
/// away into registers, via the caller-supplied reducer.
///
/// Precondition: `deref_shape` said ConvertToOreg. After this,
/// `finalize_oreg` succeeds unless the target description is
/// inconsistent.
pub fn reduce_addr_parts(
    n: &mut Node,
    force: &mut dyn FnMut(&mut Node) -> Result<(), CodegenError>,
) -> Result<(), CodegenError> {
    debug_assert_eq!(n.op, Op::Deref);
    let child = match n.left.as_deref_mut() {
        Some(c) => c,
        None => return Ok(()),
    };
    match child.op {
        Op::Reg | Op::Addr => Ok(()),
        Op::Temp => force(child),
        Op::Plus | Op::Minus => {
            let folds_left = child
                .left
                .as_deref()
                .map(|l| frame_addr(l).is_some())
                .unwrap_or(false);
            let right_is_con = child
                .right
                .as_deref()
                .map(|r| r.op == Op::Icon && r.sym.is_none())
                .unwrap_or(false);
            if !folds_left {
                if let Some(l) = child.left.as_deref_mut() {
                    force(l)?;
                }
            }
            if let Some(r) = child.right.as_deref_mut() {
                if right_is_con {
                    // folds into the offset
                } else if let Some((_, _)) = scaled_index(r) {
                    if let Some(ix) = r.left.as_deref_mut() {
                        force(ix)?;
                    }
                } else {
                    force(r)?;
                }
            }
            Ok(())
        }
        _ => force(child),
    }
}

// ============================================================================
// Folding
// ============================================================================

/// Fold a classified dereference into an Oreg in place.
///
/// Precondition: `deref_shape` said ConvertToOreg and the selector has
/// reduced every non-folding subtree to a register. Idempotent on
/// nodes that are already Oreg. Fails, rather than mis-encoding, if a
/// precondition does not hold.
pub fn finalize_oreg(hooks: &dyn TargetHooks, n: &mut Node) -> Result<(), CodegenError> {
    if n.op == Op::Oreg {
        return Ok(());
    }
    if n.op != Op::Deref {
        return Err(CodegenError::IllegalAddress(format!(
            "cannot form memory operand from {:?}",
            n.op
        )));
    }
    let ty = n.ty;
    let mut child = n.take_left();

    let addr = match child.op {
        Op::Reg => Addr::base_offset(reg_of(&child)?, 0),
        Op::Addr => match frame_addr(&child) {
            Some(off) => Addr::base_offset(hooks.frame_pointer(), off),
            None => {
                return Err(CodegenError::IllegalAddress(
                    "address-of operand is not a frame local".into(),
                ))
            }
        },
        Op::Plus | Op::Minus => {
            let op = child.op;
            let l = child.take_left();
            let r = child.take_right();
            if r.op == Op::Icon && r.sym.is_none() {
                let off = if op == Op::Minus { -r.val } else { r.val };
                match frame_addr(&l) {
                    Some(base) => Addr::base_offset(hooks.frame_pointer(), base + off),
                    None => Addr::base_offset(reg_of(&l)?, off),
                }
            } else if op == Op::Minus {
                // Index registers always add; a subtracted register
                // cannot become a memory operand
                return Err(CodegenError::IllegalAddress(
                    "subtracted address component is not a constant".into(),
                ));
            } else if let Some((_, scale)) = scaled_index(&r) {
                let mut r = r;
                let ix = r.take_left();
                Addr::indexed(reg_of(&l)?, reg_of(&ix)?, scale)
            } else {
                Addr::indexed(reg_of(&l)?, reg_of(&r)?, 0)
            }
        }
        _ => {
            return Err(CodegenError::IllegalAddress(format!(
                "cannot form memory operand from {:?} child",
                child.op
            )))
        }
    };

    validate_addr(&addr)?;
    if !hooks.legal_offset(ty, addr.offset) {
        return Err(CodegenError::IllegalAddress(format!(
            "offset {} out of range for {:?}",
            addr.offset, ty
        )));
    }
    child.retire();
    trace!("legalized {:?} operand at offset {}", ty, addr.offset);
    n.op = Op::Oreg;
    n.addr = Some(addr);
    n.left = None;
    n.right = None;
    Ok(())
}

fn reg_of(n: &Node) -> Result<crate::regmodel::RegId, CodegenError> {
    match n.reg {
        Some(r) if n.op == Op::Reg => Ok(r),
        _ => Err(CodegenError::IllegalAddress(format!(
            "address component {:?} not reduced to a register",
            n.op
        ))),
    }
}

/// Structural invariants every memory operand must satisfy
pub fn validate_addr(addr: &Addr) -> Result<(), CodegenError> {
    if addr.sym.is_some() && addr.index.is_some() {
        return Err(CodegenError::IllegalAddress(
            "named operand with index register".into(),
        ));
    }
    if addr.index.is_some() && addr.offset != 0 {
        return Err(CodegenError::IllegalAddress(
            "indexed operand with nonzero offset".into(),
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
