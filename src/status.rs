// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The M68000 status register.
//!
//! Kept as the architectural 16-bit word rather than decomposed into a struct of
//! named `bool`/`u8` fields, because every write must pass through one sink that
//! masks to the legal bits and swaps the stack pointers on a supervisor-bit flip
//! — far easier to enforce as a single `set_status` entry point on a raw integer
//! than to keep a decomposed struct's fields and the swap side effect consistent
//! across every field setter.

use crate::utils::bits;

/// Extend flag bit value.
pub const X: u16 = 0x10;
/// Negative flag bit value.
pub const N: u16 = 0x08;
/// Zero flag bit value.
pub const Z: u16 = 0x04;
/// Overflow flag bit value.
pub const V: u16 = 0x02;
/// Carry flag bit value.
pub const C: u16 = 0x01;

/// Supervisor bit (bit 13).
pub const SUPERVISOR: u16 = 0x2000;
/// Trace bit (bit 15). Present in the writable mask but trace-exception generation
/// is not implemented by this core (no debugger single-step support).
pub const TRACE: u16 = 0x8000;

/// Mask of the bits a write to the status register is allowed to change.
///
/// `0b1111'0111'0001'1111`: trace, supervisor, the three interrupt mask bits, and
/// the five condition codes. Bit 14 and bits 5-7 are unimplemented/reserved and
/// always read back as zero.
pub const WRITABLE_MASK: u16 = 0b1111_0111_0001_1111;

/// Returns the 3-bit interrupt priority mask (bits 8-10) of `sr`.
#[inline(always)]
pub const fn interrupt_mask(sr: u16) -> u8 {
    bits(sr, 8, 10) as u8
}

/// Returns `true` if the supervisor bit is set.
#[inline(always)]
pub const fn is_supervisor(sr: u16) -> bool {
    sr & SUPERVISOR != 0
}

/// Evaluates one of the sixteen M68k branch/set/test conditions against `sr`'s CCR.
///
/// A single predicate table shared by Bcc, DBcc and Scc.
pub fn condition(sr: u16, cc: u8) -> bool {
    let c = sr & C != 0;
    let z = sr & Z != 0;
    let n = sr & N != 0;
    let v = sr & V != 0;
    match cc {
        0 => true,                              // T
        1 => false,                              // F
        2 => !c && !z,                           // HI
        3 => c || z,                             // LS
        4 => !c,                                 // CC
        5 => c,                                  // CS
        6 => !z,                                 // NE
        7 => z,                                  // EQ
        8 => !v,                                 // VC
        9 => v,                                  // VS
        10 => !n,                                // PL
        11 => n,                                 // MI
        12 => (n && v) || (!n && !v),             // GE
        13 => (n && !v) || (!n && v),             // LT
        14 => (n && v && !z) || (!n && !v && !z), // GT
        15 => z || (n && !v) || (!n && v),        // LE
        _ => unreachable!("condition code is 4 bits, all 16 values handled above"),
    }
}

pub(crate) fn disassemble_condition(cc: u8) -> &'static str {
    const NAMES: [&str; 16] = [
        "T", "F", "HI", "LS", "CC", "CS", "NE", "EQ",
        "VC", "VS", "PL", "MI", "GE", "LT", "GT", "LE",
    ];
    NAMES[cc as usize & 0xF]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_condition_matches_zero_flag() {
        assert!(condition(Z, 7));
        assert!(!condition(0, 7));
    }

    #[test]
    fn writable_mask_excludes_reserved_bits() {
        assert_eq!(WRITABLE_MASK & 0x4000, 0);
        assert_eq!(WRITABLE_MASK & 0x00E0, 0);
    }
}
