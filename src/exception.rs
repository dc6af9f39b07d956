// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Exception vectors.
//!
//! Trimmed to the vectors this core actually raises. Bus error and address error
//! use the same short stack frame as everything else here, so there is no
//! dedicated `AccessError`/`AddressError` vector: alignment failures are
//! [`CoreError`](crate::error::CoreError) freezes instead of dispatched
//! exceptions.

/// Exception vector numbers, named per the M68000 Programmer's Reference Manual.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Vector {
    /// Reset: initial SSP and PC, vector 0/1. Only used by [`crate::cpu::M68000::reset`],
    /// which special-cases it rather than going through [`crate::cpu::M68000::raise_exception`].
    Reset = 0,
    IllegalInstruction = 4,
    ZeroDivide = 5,
    ChkInstruction = 6,
    TrapvInstruction = 7,
    PrivilegeViolation = 8,
    Trap0 = 32,
    SpuriousInterrupt = 24,
}

impl Vector {
    /// The TRAP #n vector, `32 + n` for `n` in `0..=15`.
    #[inline(always)]
    pub const fn trap(n: u8) -> u8 {
        32 + (n & 0xF)
    }

    /// The autovectored interrupt vector for priority level `level` in `1..=7`.
    #[inline(always)]
    pub const fn autovector(level: u8) -> u8 {
        24 + (level & 7)
    }
}
