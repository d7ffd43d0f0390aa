//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Target configuration for pass2
//
// The Target value is passed explicitly into every selector, legalizer
// and allocator call; there is no process-wide target singleton.
//

use std::fmt;

/// Target CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// 32-bit ARM (the representative register-pair machine)
    Arm,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::Arm => write!(f, "arm"),
        }
    }
}

/// Target operating system flavor (drives assembler directive syntax)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    FreeBSD,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Linux => write!(f, "linux"),
            Os::FreeBSD => write!(f, "freebsd"),
        }
    }
}

bitflags::bitflags! {
    /// Optional hardware features that gate instruction-table entries.
    ///
    /// A pattern is eligible only if its required feature mask is a
    /// subset of the features enabled for the compilation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Features: u32 {
        /// Hardware multiply unit
        const MULTIPLY = 1 << 0;
        /// Hardware divide unit
        const DIVIDE = 1 << 1;
        /// Hardware floating point
        const HARDWARE_FLOAT = 1 << 2;
        /// Position-independent addressing
        const PIC = 1 << 3;
    }
}

/// Target configuration
#[derive(Debug, Clone)]
pub struct Target {
    /// CPU architecture
    pub arch: Arch,
    /// Operating system flavor
    pub os: Os,
    /// Pointer size in bits
    pub pointer_width: u32,
    /// Enabled hardware features
    pub features: Features,
}

impl Target {
    /// Create a target for a specific arch/os combination with default features
    pub fn new(arch: Arch, os: Os) -> Self {
        let features = match arch {
            // ARMv5-class baseline: multiplier and VFP present, no
            // hardware divider
            Arch::Arm => Features::MULTIPLY | Features::HARDWARE_FLOAT,
        };
        Self {
            arch,
            os,
            pointer_width: 32,
            features,
        }
    }

    /// Override the enabled feature set
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Parse a target triple (e.g., "arm-unknown-linux-gnueabi")
    pub fn from_triple(triple: &str) -> Option<Self> {
        let parts: Vec<&str> = triple.split('-').collect();
        if parts.is_empty() {
            return None;
        }

        let arch = match parts[0] {
            "arm" | "armv5" | "armv6" | "armv7" => Arch::Arm,
            _ => return None,
        };

        let os = if triple.contains("freebsd") {
            Os::FreeBSD
        } else {
            Os::Linux
        };

        Some(Self::new(arch, os))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_linux() {
        let target = Target::new(Arch::Arm, Os::Linux);
        assert_eq!(target.arch, Arch::Arm);
        assert_eq!(target.os, Os::Linux);
        assert_eq!(target.pointer_width, 32);
        assert!(target.features.contains(Features::MULTIPLY));
        assert!(!target.features.contains(Features::DIVIDE));
    }

    #[test]
    fn test_from_triple() {
        let target = Target::from_triple("armv7-unknown-linux-gnueabi").unwrap();
        assert_eq!(target.arch, Arch::Arm);
        assert_eq!(target.os, Os::Linux);

        let target = Target::from_triple("arm-unknown-freebsd").unwrap();
        assert_eq!(target.os, Os::FreeBSD);

        assert!(Target::from_triple("m68k-unknown-linux").is_none());
    }

    #[test]
    fn test_feature_override() {
        let target = Target::new(Arch::Arm, Os::Linux).with_features(Features::empty());
        assert!(target.features.is_empty());
    }
}
