//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Diagnostics and error taxonomy for pass2
//
// Three kinds of failure flow through the backend:
//   - fatal/internal: the target description is incomplete or
//     inconsistent (no table entry after rewrite, illegal address
//     operand, colorability bound violated). These abort codegen for
//     the enclosing function.
//   - user/source: the construct cannot be expressed on this target
//     (unsupported builtin, bad inline-asm constraint). Accumulated;
//     compilation continues scanning but produces no output.
//   - recoverable local: shape-mismatch retries and rewrite-on-failure
//     are normal control flow, not errors.
//

use crate::tree::Op;
use thiserror::Error;

// ============================================================================
// Error Type
// ============================================================================

/// Backend failure modes.
///
/// Every variant except `Unsupported` indicates an inconsistent or
/// incomplete target description rather than a user error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// The instruction table has no entry matching a (possibly
    /// rewritten) subtree. Fatal: the catalogue is incomplete.
    #[error("no instruction pattern for operator {op:?} (goal mask {goal:#x})")]
    NoPattern { op: Op, goal: u8 },

    /// An addressing operand violates an invariant, e.g. a named
    /// operand carrying an index register.
    #[error("illegal address operand: {0}")]
    IllegalAddress(String),

    /// The conservative colorability bound says no register of the
    /// requested class can be guaranteed.
    #[error("register pressure exceeded in class {class}")]
    RegisterPressure { class: &'static str },

    /// The construct is not representable on this target. User-level;
    /// reported and compilation continues without output.
    #[error("not supported on this target: {what}")]
    Unsupported { what: String },

    /// An emission template referenced an operand the matched pattern
    /// does not have.
    #[error("malformed emission template: {0}")]
    BadTemplate(String),
}

impl CodegenError {
    /// User errors allow continued diagnostic scanning; everything else
    /// halts codegen for the translation unit.
    pub fn is_user_error(&self) -> bool {
        matches!(self, CodegenError::Unsupported { .. })
    }
}

// ============================================================================
// Diagnostics Accumulator
// ============================================================================

/// Per-translation-unit diagnostic sink.
///
/// User errors are accumulated so a single run can report every
/// unsupported construct; any fatal error is sticky and suppresses
/// object output.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<String>,
    warnings: Vec<String>,
    fatal: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user-level error
    pub fn error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        eprintln!("error: {}", msg);
        self.errors.push(msg);
    }

    /// Record a warning
    pub fn warning(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        eprintln!("warning: {}", msg);
        self.warnings.push(msg);
    }

    /// Record an error result: user errors accumulate, internal errors
    /// mark the unit fatal. Returns the error back for propagation when
    /// it is fatal.
    pub fn report(&mut self, err: CodegenError) -> Option<CodegenError> {
        if err.is_user_error() {
            self.error(err.to_string());
            None
        } else {
            eprintln!("error: internal: {}", err);
            self.fatal = true;
            Some(err)
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// True when no valid output may be produced
    pub fn suppress_output(&self) -> bool {
        self.fatal || !self.errors.is_empty()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_vs_internal() {
        assert!(CodegenError::Unsupported {
            what: "frame address".into()
        }
        .is_user_error());
        assert!(!CodegenError::RegisterPressure { class: "B" }.is_user_error());
        assert!(!CodegenError::NoPattern {
            op: Op::Plus,
            goal: 1
        }
        .is_user_error());
    }

    #[test]
    fn test_accumulation() {
        let mut diags = Diagnostics::new();
        assert!(!diags.suppress_output());

        let back = diags.report(CodegenError::Unsupported {
            what: "builtin".into(),
        });
        assert!(back.is_none());
        assert_eq!(diags.error_count(), 1);
        assert!(diags.suppress_output());
        assert!(!diags.is_fatal());
    }

    #[test]
    fn test_fatal_propagates() {
        let mut diags = Diagnostics::new();
        let back = diags.report(CodegenError::RegisterPressure { class: "A" });
        assert!(back.is_some());
        assert!(diags.is_fatal());
        assert!(diags.suppress_output());
    }
}
