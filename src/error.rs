// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The core's error type.
//!
//! This is deliberately small: the only failure mode the interpreter cannot express
//! as an architectural exception (see [`crate::exception`]) is an access that would
//! require an odd address for a word or long operand. The [`Bus`](crate::bus::Bus)
//! trait itself is infallible (the host's 24-bit address space is assumed always
//! mapped), so this is the single error variant propagated internally; it never
//! crosses the public API, which instead surfaces it as a frozen [`Stopped`] state.
//!
//! [`Stopped`]: crate::cpu::ExecuteState::Stopped

/// Failure resolving or accessing an effective address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A word or long operand, or a jump/branch target, landed on an odd address.
    #[error("unaligned access at {0:#010x}")]
    Unaligned(u32),
}

/// Convenience alias used throughout decode and execution.
pub type CoreResult<T> = Result<T, CoreError>;

/// Checks that `addr` is word-aligned, per the `IsEven` contract M68k code relies on.
#[inline(always)]
pub const fn require_even(addr: u32) -> CoreResult<u32> {
    if addr & 1 == 0 {
        Ok(addr)
    } else {
        Err(CoreError::Unaligned(addr))
    }
}
