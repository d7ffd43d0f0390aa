//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Register model: classes, overlap, colorability, allocation
//
// ============================================================================
// REGISTER ALLOCATION POLICY
// ============================================================================
//
// Physical registers are partitioned into at most three classes:
//   A - general purpose single-width
//   B - wide values (register pairs on 32-bit machines)
//   C - floating point / special
//
// Classes may overlap: a B-class pair aliases two A-class singles, so
// allocating the pair consumes capacity in class A and vice versa.
// Overlap tables are symmetric and explicitly present; an empty slice
// means no overlap.
//
// Allocation is guarded by a conservative worst-case colorability
// bound (ColorMap). If the bound says a class cannot be guaranteed,
// allocation fails with a diagnostic; handing out a colliding register
// is a correctness bug, never an option.
// ============================================================================

use crate::diag::CodegenError;
use log::trace;

/// Index into a target's register file
pub type RegId = u8;

// ============================================================================
// Register Classes
// ============================================================================

/// Register class identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// General purpose
    A,
    /// Wide (pair) registers
    B,
    /// Floating point / special
    C,
}

impl RegClass {
    pub const COUNT: usize = 3;

    pub fn idx(self) -> usize {
        match self {
            RegClass::A => 0,
            RegClass::B => 1,
            RegClass::C => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RegClass::A => "A",
            RegClass::B => "B",
            RegClass::C => "C",
        }
    }
}

// ============================================================================
// Register Definitions
// ============================================================================

/// One physical register in a target's register file
#[derive(Debug)]
pub struct RegDef {
    /// Assembly name (for pairs, the low half's name; the emitter asks
    /// the overlap table for the halves)
    pub name: &'static str,
    pub class: RegClass,
    /// Caller-saved ("temporary") vs callee-saved-like ("permanent")
    pub temporary: bool,
    /// Registers sharing storage with this one. Symmetric: if S is in
    /// overlaps(R) then R is in overlaps(S). Empty when disjoint.
    pub overlaps: &'static [RegId],
}

/// Worst-case colorability bound.
///
/// `weight[held][wanted]` is how many allocation units of class
/// `wanted` one live register of class `held` consumes (e.g. a live
/// pair consumes 2 units of class A). A register of class X is
/// guaranteed available while the consumed units stay below
/// `capacity[X]`.
#[derive(Debug)]
pub struct ColorMap {
    pub capacity: [u16; RegClass::COUNT],
    pub weight: [[u16; RegClass::COUNT]; RegClass::COUNT],
}

impl ColorMap {
    /// Can a register of `class` always be found under `pressure`?
    /// Monotonic: adding pressure never turns false into true.
    pub fn colorable(&self, class: RegClass, pressure: &Pressure) -> bool {
        let x = class.idx();
        let mut used: u32 = 0;
        for y in 0..RegClass::COUNT {
            used += pressure.counts[y] as u32 * self.weight[y][x] as u32;
        }
        used < self.capacity[x] as u32
    }
}

/// Per-target register file: definitions, allocation order, colorability
#[derive(Debug)]
pub struct RegFile {
    pub regs: &'static [RegDef],
    /// Allocation order; excludes reserved registers (frame pointer,
    /// stack pointer, scratch)
    pub allocatable: &'static [RegId],
    pub colormap: ColorMap,
}

impl RegFile {
    pub fn def(&self, r: RegId) -> &RegDef {
        &self.regs[r as usize]
    }

    pub fn name(&self, r: RegId) -> &'static str {
        self.def(r).name
    }

    /// The two A-class halves of a B-class pair, low then high
    pub fn pair_halves(&self, r: RegId) -> Option<(RegId, RegId)> {
        let def = self.def(r);
        if def.class != RegClass::B || def.overlaps.len() < 2 {
            return None;
        }
        Some((def.overlaps[0], def.overlaps[1]))
    }

    /// Check structural invariants: overlap indices in range and
    /// symmetric. Target constructors and tests run this.
    pub fn validate(&self) -> Result<(), String> {
        for (i, def) in self.regs.iter().enumerate() {
            for &o in def.overlaps {
                let other = self
                    .regs
                    .get(o as usize)
                    .ok_or_else(|| format!("{}: overlap index {} out of range", def.name, o))?;
                if !other.overlaps.contains(&(i as RegId)) {
                    return Err(format!(
                        "overlap not symmetric: {} lists {} but not vice versa",
                        def.name, other.name
                    ));
                }
            }
        }
        for &r in self.allocatable {
            if r as usize >= self.regs.len() {
                return Err(format!("allocatable index {} out of range", r));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Allocation Pressure
// ============================================================================

/// Live-register counts per class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pressure {
    pub counts: [u16; RegClass::COUNT],
}

impl Pressure {
    pub fn new() -> Self {
        Self::default()
    }

    fn incr(&mut self, class: RegClass) {
        self.counts[class.idx()] += 1;
    }

    fn decr(&mut self, class: RegClass) {
        let c = &mut self.counts[class.idx()];
        debug_assert!(*c > 0);
        *c = c.saturating_sub(1);
    }
}

// ============================================================================
// Per-Function Allocation State
// ============================================================================

/// Register allocation state for one function. Freshly created per
/// function; never shared.
#[derive(Debug)]
pub struct AllocState {
    live: Vec<bool>,
    /// True for registers this allocator handed out (as opposed to
    /// externally pinned ones like call argument registers)
    owned: Vec<bool>,
    pressure: Pressure,
}

impl AllocState {
    pub fn new(file: &RegFile) -> Self {
        Self {
            live: vec![false; file.regs.len()],
            owned: vec![false; file.regs.len()],
            pressure: Pressure::new(),
        }
    }

    pub fn pressure(&self) -> &Pressure {
        &self.pressure
    }

    pub fn is_live(&self, r: RegId) -> bool {
        self.live[r as usize]
    }

    /// Free means neither the register nor anything overlapping it is
    /// live
    pub fn is_free(&self, file: &RegFile, r: RegId) -> bool {
        if self.live[r as usize] {
            return false;
        }
        file.def(r).overlaps.iter().all(|&o| !self.live[o as usize])
    }

    /// Allocate any free register of `class`, avoiding `avoid`.
    ///
    /// The colorability bound is consulted first; if it fails, or no
    /// register of the class has its full overlap set free, allocation
    /// reports pressure rather than returning a colliding register.
    pub fn allocate(
        &mut self,
        file: &RegFile,
        class: RegClass,
        avoid: &[RegId],
    ) -> Result<RegId, CodegenError> {
        if !file.colormap.colorable(class, &self.pressure) {
            return Err(CodegenError::RegisterPressure { class: class.name() });
        }
        for &r in file.allocatable {
            if file.def(r).class != class || avoid.contains(&r) {
                continue;
            }
            if self.is_free(file, r) {
                self.live[r as usize] = true;
                self.owned[r as usize] = true;
                self.pressure.incr(class);
                trace!("alloc {} (class {})", file.name(r), class.name());
                return Ok(r);
            }
        }
        Err(CodegenError::RegisterPressure { class: class.name() })
    }

    /// Claim a specific register for a fixed-register idiom
    pub fn allocate_fixed(&mut self, file: &RegFile, r: RegId) -> Result<(), CodegenError> {
        if !self.is_free(file, r) {
            return Err(CodegenError::RegisterPressure {
                class: file.def(r).class.name(),
            });
        }
        self.live[r as usize] = true;
        self.owned[r as usize] = true;
        self.pressure.incr(file.def(r).class);
        trace!("alloc fixed {}", file.name(r));
        Ok(())
    }

    /// Convert an owned allocation into a pinned one. Front-end
    /// temporaries live past expression boundaries, so operand
    /// consumption must not free them.
    pub fn pin(&mut self, r: RegId) {
        self.owned[r as usize] = false;
    }

    pub fn is_owned(&self, r: RegId) -> bool {
        self.owned[r as usize]
    }

    /// Pin a register live without owning it (call argument registers
    /// live across a call site). No-op if already live.
    pub fn mark_live(&mut self, file: &RegFile, r: RegId) {
        if !self.live[r as usize] {
            self.live[r as usize] = true;
            self.pressure.incr(file.def(r).class);
        }
    }

    /// Release a register previously allocated or pinned
    pub fn release(&mut self, file: &RegFile, r: RegId) {
        if self.live[r as usize] {
            self.live[r as usize] = false;
            self.owned[r as usize] = false;
            self.pressure.decr(file.def(r).class);
            trace!("free {}", file.name(r));
        }
    }

    /// Release only if this allocator owns the register: results bound
    /// to incoming argument registers stay pinned
    pub fn release_owned(&mut self, file: &RegFile, r: RegId) {
        if self.owned[r as usize] {
            self.release(file, r);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal fixture: four singles, two pairs overlapping them, one
    // float register.
    static REGS: [RegDef; 7] = [
        RegDef { name: "r0", class: RegClass::A, temporary: true, overlaps: &[4] },
        RegDef { name: "r1", class: RegClass::A, temporary: true, overlaps: &[4] },
        RegDef { name: "r2", class: RegClass::A, temporary: true, overlaps: &[5] },
        RegDef { name: "r3", class: RegClass::A, temporary: true, overlaps: &[5] },
        RegDef { name: "r0", class: RegClass::B, temporary: true, overlaps: &[0, 1] },
        RegDef { name: "r2", class: RegClass::B, temporary: true, overlaps: &[2, 3] },
        RegDef { name: "f0", class: RegClass::C, temporary: true, overlaps: &[] },
    ];

    fn file() -> RegFile {
        RegFile {
            regs: &REGS,
            allocatable: &[0, 1, 2, 3, 4, 5, 6],
            colormap: ColorMap {
                capacity: [4, 2, 1],
                weight: [
                    // held A consumes: 1 A unit, 1 B unit, 0 C
                    [1, 1, 0],
                    // held B consumes: 2 A units, 1 B unit, 0 C
                    [2, 1, 0],
                    // held C consumes: 0, 0, 1
                    [0, 0, 1],
                ],
            },
        }
    }

    #[test]
    fn test_validate_symmetry() {
        assert!(file().validate().is_ok());
    }

    #[test]
    fn test_asymmetric_overlap_rejected() {
        static BAD: [RegDef; 2] = [
            RegDef { name: "x", class: RegClass::A, temporary: true, overlaps: &[1] },
            RegDef { name: "y", class: RegClass::A, temporary: true, overlaps: &[] },
        ];
        let f = RegFile {
            regs: &BAD,
            allocatable: &[0, 1],
            colormap: ColorMap { capacity: [2, 0, 0], weight: [[1, 0, 0], [0, 0, 0], [0, 0, 0]] },
        };
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_pair_blocks_singles() {
        let f = file();
        let mut st = AllocState::new(&f);
        // Take the r0r1 pair; r0 and r1 must no longer be free.
        st.allocate_fixed(&f, 4).unwrap();
        assert!(!st.is_free(&f, 0));
        assert!(!st.is_free(&f, 1));
        assert!(st.is_free(&f, 2));

        let got = st.allocate(&f, RegClass::A, &[]).unwrap();
        assert!(got == 2 || got == 3);
    }

    #[test]
    fn test_single_blocks_its_pair() {
        let f = file();
        let mut st = AllocState::new(&f);
        st.allocate_fixed(&f, 0).unwrap();
        // Half of r0r1 live: that pair is unavailable, r2r3 is granted.
        assert!(!st.is_free(&f, 4));
        assert_eq!(st.allocate(&f, RegClass::B, &[]).unwrap(), 5);
    }

    #[test]
    fn test_both_halves_live_reports_pressure() {
        let f = file();
        let mut st = AllocState::new(&f);
        st.allocate_fixed(&f, 0).unwrap();
        st.allocate_fixed(&f, 1).unwrap();
        // Worst-case bound: two live singles may shadow two distinct
        // pairs, so no pair is guaranteed. Must report pressure, never
        // a colliding register.
        let err = st.allocate(&f, RegClass::B, &[]).unwrap_err();
        assert!(matches!(err, CodegenError::RegisterPressure { class: "B" }));
    }

    #[test]
    fn test_pressure_failure_not_collision() {
        let f = file();
        let mut st = AllocState::new(&f);
        st.allocate_fixed(&f, 4).unwrap();
        st.allocate_fixed(&f, 5).unwrap();
        // Every A single is shadowed by a live pair.
        let err = st.allocate(&f, RegClass::A, &[]).unwrap_err();
        assert!(matches!(err, CodegenError::RegisterPressure { class: "A" }));
    }

    #[test]
    fn test_colorable_monotonic() {
        let f = file();
        let mut p = Pressure::new();
        let mut last = f.colormap.colorable(RegClass::A, &p);
        assert!(last);
        for _ in 0..6 {
            p.counts[RegClass::B.idx()] += 1;
            let now = f.colormap.colorable(RegClass::A, &p);
            // More pressure never increases availability
            assert!(!(now && !last));
            last = now;
        }
        assert!(!last);
    }

    #[test]
    fn test_release_and_reuse() {
        let f = file();
        let mut st = AllocState::new(&f);
        let r = st.allocate(&f, RegClass::A, &[]).unwrap();
        st.release(&f, r);
        assert!(st.is_free(&f, r));
        assert_eq!(st.pressure().counts, [0, 0, 0]);
    }

    #[test]
    fn test_mark_live_not_owned() {
        let f = file();
        let mut st = AllocState::new(&f);
        st.mark_live(&f, 0);
        st.release_owned(&f, 0);
        // Pinned, not owned: release_owned leaves it live.
        assert!(st.is_live(0));
        st.release(&f, 0);
        assert!(!st.is_live(0));
    }

    #[test]
    fn test_avoid_list() {
        let f = file();
        let mut st = AllocState::new(&f);
        let r = st.allocate(&f, RegClass::A, &[0, 1]).unwrap();
        assert!(r == 2 || r == 3);
    }
}
