//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Assembly output: segments, directives, labels, template expansion
//
// Instruction templates use two-letter uppercase placeholders in the
// pcc tradition:
//   AL / AR - left / right operand
//   A1 / A2 - first / second allocated temporary
//   UL / UR / U1 - upper word of a pair-valued operand or temporary
// Everything else in a template is copied through verbatim. Lines are
// separated by '\n'; the writer indents each line with a tab.
//

use crate::diag::CodegenError;
use crate::regmodel::{RegClass, RegFile, RegId};
use crate::target::Target;
use crate::tree::{Node, Op, Storage};
use std::fmt::Write;

// ============================================================================
// Segments
// ============================================================================

/// Output segments the backend can switch between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Text,
    Data,
    Rodata,
    /// Thread-local initialized data
    Tdata,
    /// Constructor pointer list
    Ctors,
    /// Destructor pointer list
    Dtors,
}

impl Segment {
    fn directive(&self) -> &'static str {
        match self {
            Segment::Text => ".text",
            Segment::Data => ".data",
            Segment::Rodata => ".section .rodata",
            Segment::Tdata => ".section .tdata,\"awT\",%progbits",
            Segment::Ctors => ".section .init_array,\"aw\"",
            Segment::Dtors => ".section .fini_array,\"aw\"",
        }
    }
}

// ============================================================================
// Directives
// ============================================================================

/// Assembler directives emitted around the instruction stream
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Segment(Segment),
    /// .globl symbol
    Global(String),
    /// .local symbol
    Local(String),
    /// .type symbol, %function
    TypeFunc(String),
    /// .type symbol, %object
    TypeObject(String),
    /// .size symbol, size
    Size { sym: String, size: u32 },
    /// .comm symbol, size, align
    Comm { sym: String, size: u32, align: u32 },
    /// symbol:
    Label(String),
    /// .align (power of two)
    Align(u32),
    /// .word value
    Word(i64),
    /// .byte value
    Byte(i64),
    /// .asciz "string"
    Asciz(String),
    /// Comment line
    Comment(String),
    Blank,
}

// ============================================================================
// Assembly Writer
// ============================================================================

/// Accumulates the textual output for one translation unit.
///
/// Local labels are numbered `.L<n>` with a stable per-writer counter.
#[derive(Debug, Default)]
pub struct AsmWriter {
    out: String,
    seg: Option<Segment>,
    next_label: u32,
}

impl AsmWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh local label number
    pub fn new_label(&mut self) -> u32 {
        let n = self.next_label;
        self.next_label += 1;
        n
    }

    pub fn label_name(n: u32) -> String {
        format!(".L{}", n)
    }

    /// Define a numbered local label at the current position
    pub fn define_label(&mut self, n: u32) {
        let _ = writeln!(self.out, "{}:", Self::label_name(n));
    }

    /// Define an arbitrary label at the current position
    pub fn label(&mut self, name: &str) {
        let _ = writeln!(self.out, "{}:", name);
    }

    /// Switch segments (no-op if already there)
    pub fn segment(&mut self, seg: Segment) {
        if self.seg != Some(seg) {
            let _ = writeln!(self.out, "{}", seg.directive());
            self.seg = Some(seg);
        }
    }

    pub fn directive(&mut self, _target: &Target, d: &Directive) {
        match d {
            Directive::Segment(seg) => self.segment(*seg),
            Directive::Global(sym) => {
                let _ = writeln!(self.out, ".globl {}", sym);
            }
            Directive::Local(sym) => {
                let _ = writeln!(self.out, ".local {}", sym);
            }
            Directive::TypeFunc(sym) => {
                let _ = writeln!(self.out, ".type {}, %function", sym);
            }
            Directive::TypeObject(sym) => {
                let _ = writeln!(self.out, ".type {}, %object", sym);
            }
            Directive::Size { sym, size } => {
                let _ = writeln!(self.out, ".size {}, {}", sym, size);
            }
            Directive::Comm { sym, size, align } => {
                let _ = writeln!(self.out, ".comm {},{},{}", sym, size, align);
            }
            Directive::Label(sym) => {
                let _ = writeln!(self.out, "{}:", sym);
            }
            Directive::Align(power) => {
                let _ = writeln!(self.out, ".align {}", power);
            }
            Directive::Word(v) => {
                let _ = writeln!(self.out, "\t.word {}", v);
            }
            Directive::Byte(v) => {
                let _ = writeln!(self.out, "\t.byte {}", v);
            }
            Directive::Asciz(s) => {
                let _ = writeln!(self.out, "\t.asciz \"{}\"", s);
            }
            Directive::Comment(text) => {
                let _ = writeln!(self.out, "@ {}", text);
            }
            Directive::Blank => {
                let _ = writeln!(self.out);
            }
        }
    }

    /// Append expanded instruction text, one tab-indented line per
    /// template line
    pub fn insn(&mut self, text: &str) {
        for line in text.split('\n') {
            if !line.is_empty() {
                let _ = writeln!(self.out, "\t{}", line);
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn finish(self) -> String {
        self.out
    }
}

// ============================================================================
// Template Expansion
// ============================================================================

/// Resolved operands for one matched pattern
pub struct TemplateOps<'a> {
    pub left: Option<&'a Node>,
    pub right: Option<&'a Node>,
    pub temps: &'a [RegId],
}

impl<'a> TemplateOps<'a> {
    pub fn new(left: Option<&'a Node>, right: Option<&'a Node>, temps: &'a [RegId]) -> Self {
        Self { left, right, temps }
    }
}

/// Expand an emission template against resolved operands
pub fn expand_template(
    template: &str,
    ops: &TemplateOps,
    file: &RegFile,
) -> Result<String, CodegenError> {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len() + 16);
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();
        match (c, next) {
            (b'A', Some(b'L')) => {
                out.push_str(&operand_text(require(ops.left, "AL")?, file, false)?);
                i += 2;
            }
            (b'A', Some(b'R')) => {
                out.push_str(&operand_text(require(ops.right, "AR")?, file, false)?);
                i += 2;
            }
            (b'A', Some(b'1')) => {
                out.push_str(temp_name(ops, file, 0, false)?);
                i += 2;
            }
            (b'A', Some(b'2')) => {
                out.push_str(temp_name(ops, file, 1, false)?);
                i += 2;
            }
            (b'U', Some(b'L')) => {
                out.push_str(&operand_text(require(ops.left, "UL")?, file, true)?);
                i += 2;
            }
            (b'U', Some(b'R')) => {
                out.push_str(&operand_text(require(ops.right, "UR")?, file, true)?);
                i += 2;
            }
            (b'U', Some(b'1')) => {
                out.push_str(temp_name(ops, file, 0, true)?);
                i += 2;
            }
            _ => {
                out.push(c as char);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn require<'a>(n: Option<&'a Node>, what: &str) -> Result<&'a Node, CodegenError> {
    n.ok_or_else(|| CodegenError::BadTemplate(format!("{} referenced but operand absent", what)))
}

fn temp_name<'a>(
    ops: &TemplateOps<'a>,
    file: &'a RegFile,
    idx: usize,
    upper: bool,
) -> Result<&'a str, CodegenError> {
    let &r = ops
        .temps
        .get(idx)
        .ok_or_else(|| CodegenError::BadTemplate(format!("temporary {} not allocated", idx + 1)))?;
    reg_half_name(r, file, upper)
}

/// Register name, or the name of a pair's upper half
fn reg_half_name(r: RegId, file: &RegFile, upper: bool) -> Result<&'static str, CodegenError> {
    let def = file.def(r);
    if !upper {
        return Ok(if def.class == RegClass::B {
            file.name(file.pair_halves(r).map(|(lo, _)| lo).unwrap_or(r))
        } else {
            def.name
        });
    }
    match file.pair_halves(r) {
        Some((_, hi)) => Ok(file.name(hi)),
        None => Err(CodegenError::BadTemplate(format!(
            "upper half requested of non-pair register {}",
            def.name
        ))),
    }
}

/// Render one reduced operand as assembly text
pub fn operand_text(n: &Node, file: &RegFile, upper: bool) -> Result<String, CodegenError> {
    match n.op {
        Op::Reg => {
            let r = n
                .reg
                .ok_or_else(|| CodegenError::BadTemplate("register operand unbound".into()))?;
            Ok(reg_half_name(r, file, upper)?.to_string())
        }
        Op::Icon => {
            if let Some(sym) = &n.sym {
                // Address constant: let the assembler materialize it
                if upper {
                    return Err(CodegenError::BadTemplate(format!(
                        "upper half of address constant {}",
                        sym.name
                    )));
                }
                if n.val != 0 {
                    Ok(format!("={}+{}", sym.name, n.val))
                } else {
                    Ok(format!("={}", sym.name))
                }
            } else if upper {
                Ok(format!("#{}", (n.val >> 32) as i32))
            } else if n.ty.is_wide() {
                Ok(format!("#{}", n.val as u32))
            } else {
                Ok(format!("#{}", n.val))
            }
        }
        Op::Fcon => Ok(format!("#{}", n.fval)),
        Op::Name => {
            let sym = n
                .sym
                .as_ref()
                .ok_or_else(|| CodegenError::BadTemplate("name operand without symbol".into()))?;
            match sym.storage {
                Storage::Auto | Storage::Param => {
                    let off = sym.offset + if upper { 4 } else { 0 };
                    Ok(format!("[fp, #{}]", off))
                }
                _ => {
                    if upper {
                        Ok(format!("{}+4", sym.name))
                    } else {
                        Ok(sym.name.clone())
                    }
                }
            }
        }
        Op::Oreg => {
            let addr = n
                .addr
                .as_ref()
                .ok_or_else(|| CodegenError::BadTemplate("oreg operand without address".into()))?;
            let base = file.name(addr.base);
            let off = addr.offset + if upper { 4 } else { 0 };
            match addr.index {
                Some(ix) if addr.scale > 0 => Ok(format!(
                    "[{}, {}, lsl #{}]",
                    base,
                    file.name(ix),
                    addr.scale
                )),
                Some(ix) => Ok(format!("[{}, {}]", base, file.name(ix))),
                None if off != 0 => Ok(format!("[{}, #{}]", base, off)),
                None => Ok(format!("[{}]", base)),
            }
        }
        _ => Err(CodegenError::BadTemplate(format!(
            "operand not reduced: {:?}",
            n.op
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regmodel::{ColorMap, RegDef};
    use crate::target::{Arch, Os};
    use crate::tree::{Addr, SymRef, Ty};

    static REGS: [RegDef; 5] = [
        RegDef { name: "r0", class: RegClass::A, temporary: true, overlaps: &[4] },
        RegDef { name: "r1", class: RegClass::A, temporary: true, overlaps: &[4] },
        RegDef { name: "r2", class: RegClass::A, temporary: true, overlaps: &[] },
        RegDef { name: "fp", class: RegClass::A, temporary: false, overlaps: &[] },
        RegDef { name: "r0", class: RegClass::B, temporary: true, overlaps: &[0, 1] },
    ];

    fn file() -> RegFile {
        RegFile {
            regs: &REGS,
            allocatable: &[0, 1, 2],
            colormap: ColorMap {
                capacity: [3, 1, 0],
                weight: [[1, 1, 0], [2, 1, 0], [0, 0, 0]],
            },
        }
    }

    #[test]
    fn test_segments_switch_once() {
        let mut w = AsmWriter::new();
        w.segment(Segment::Text);
        w.segment(Segment::Text);
        w.segment(Segment::Rodata);
        assert_eq!(w.as_str(), ".text\n.section .rodata\n");
    }

    #[test]
    fn test_label_numbering_stable() {
        let mut w = AsmWriter::new();
        let a = w.new_label();
        let b = w.new_label();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        w.define_label(b);
        assert_eq!(w.as_str(), ".L1:\n");
    }

    #[test]
    fn test_directives() {
        let t = Target::new(Arch::Arm, Os::Linux);
        let mut w = AsmWriter::new();
        w.directive(&t, &Directive::Global("main".into()));
        w.directive(&t, &Directive::TypeFunc("main".into()));
        w.directive(&t, &Directive::Label("main".into()));
        w.directive(&t, &Directive::Comm { sym: "buf".into(), size: 64, align: 4 });
        assert_eq!(
            w.as_str(),
            ".globl main\n.type main, %function\nmain:\n.comm buf,64,4\n"
        );
    }

    #[test]
    fn test_expand_reg_operands() {
        let f = file();
        let l = *Node::reg(Ty::I32, 0);
        let r = *Node::icon(Ty::I32, 42);
        let ops = TemplateOps::new(Some(&l), Some(&r), &[2]);
        let s = expand_template("add\tA1,AL,AR", &ops, &f).unwrap();
        assert_eq!(s, "add\tr2,r0,#42");
    }

    #[test]
    fn test_expand_pair_halves() {
        let f = file();
        let l = *Node::reg(Ty::I64, 4);
        let r = *Node::icon(Ty::I64, 0x1_0000_0001);
        let ops = TemplateOps::new(Some(&l), Some(&r), &[]);
        let s = expand_template("adds\tAL,AL,AR\nadc\tUL,UL,UR", &ops, &f).unwrap();
        assert_eq!(s, "adds\tr0,r0,#1\nadc\tr1,r1,#1");
    }

    #[test]
    fn test_expand_oreg() {
        let f = file();
        let l = *Node::oreg(Ty::I32, Addr::base_offset(2, 4));
        let ops = TemplateOps::new(Some(&l), None, &[0]);
        let s = expand_template("ldr\tA1,AL", &ops, &f).unwrap();
        assert_eq!(s, "ldr\tr0,[r2, #4]");
    }

    #[test]
    fn test_expand_frame_name() {
        let f = file();
        let l = *Node::name(Ty::I32, SymRef::auto("x", -8));
        let ops = TemplateOps::new(Some(&l), None, &[1]);
        let s = expand_template("ldr\tA1,AL", &ops, &f).unwrap();
        assert_eq!(s, "ldr\tr1,[fp, #-8]");
    }

    #[test]
    fn test_missing_operand_is_error() {
        let f = file();
        let ops = TemplateOps::new(None, None, &[]);
        assert!(matches!(
            expand_template("mov\tA1,AL", &ops, &f),
            Err(CodegenError::BadTemplate(_))
        ));
    }

    #[test]
    fn test_upper_of_single_is_error() {
        let f = file();
        let l = *Node::reg(Ty::I32, 2);
        let ops = TemplateOps::new(Some(&l), None, &[]);
        assert!(expand_template("mov\tUL,UL", &ops, &f).is_err());
    }

    #[test]
    fn test_insn_indents_lines() {
        let mut w = AsmWriter::new();
        w.insn("adds\tr0,r0,r2\nadc\tr1,r1,r3");
        assert_eq!(w.as_str(), "\tadds\tr0,r0,r2\n\tadc\tr1,r1,r3\n");
    }
}
