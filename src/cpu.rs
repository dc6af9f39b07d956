// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architectural state and the two-phase execution driver.
//!
//! The core holds its bus by reference (`&'b mut B`) as a struct field rather
//! than taking it as a parameter on every call, since it is an interface the
//! CPU holds a non-owning reference to for its whole lifetime.

use log::{debug, trace, warn};

use crate::bus::Bus;
use crate::decode::{decode_index, resolve_size, ImmediateKind};
use crate::ea::{Ea, EaKind};
use crate::error::CoreResult;
use crate::exception::Vector;
use crate::instructions::ExecOutcome;
use crate::status::{is_supervisor, SUPERVISOR, WRITABLE_MASK};
use crate::utils::sext16;

/// Snapshot of the eight data registers, eight address registers, program counter
/// and status register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registers {
    pub d: [u32; 8],
    pub a: [u32; 8],
    pub pc: u32,
    pub sr: u16,
}

impl Default for Registers {
    fn default() -> Self {
        Registers { d: [0; 8], a: [0; 8], pc: 0, sr: 0b0010_0111_0000_0000 }
    }
}

/// The two-phase decode/execute pump's current phase, plus the frozen state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteState {
    ReadyToDecode,
    ReadyToExecute,
    Stopped,
}

const HISTORY_LEN: usize = 32;

/// The M68000 interpreter core. Generic over the bus it is wired to (a concrete
/// type for tests, or `dyn Bus` for a host that wants dynamic dispatch at the
/// CPU/bus seam — either works).
pub struct M68000<'b, B: Bus + ?Sized> {
    pub(crate) regs: Registers,
    pub(crate) bus: &'b mut B,
    alt_a7: u32,
    interrupt_control: u8,
    pub(crate) execute_state: ExecuteState,

    // Transient decode state, rebuilt each `decode_one` and read by `execute_one`;
    // also what `write_to_stream`/`read_from_stream` carry across a pause so
    // mid-instruction resume is exact.
    pub(crate) operation_addr: u32,
    pub(crate) operation: u16,
    current_instruction_index: Option<usize>,
    decode_fault: Option<u8>,
    pub(crate) immediate_value: u32,
    opcode_size: u8,
    pub(crate) ea: [Ea; 2],

    history: [u32; HISTORY_LEN],
    history_head: usize,
}

impl<'b, B: Bus + ?Sized> M68000<'b, B> {
    /// Builds a new core wired to `bus`. Registers start zeroed; call [`reset`](Self::reset)
    /// to load the initial SSP/PC from the vector table, as a real 68000 does on power-on.
    pub fn new(bus: &'b mut B) -> Self {
        M68000 {
            regs: Registers::default(),
            bus,
            alt_a7: 0,
            interrupt_control: 0,
            execute_state: ExecuteState::ReadyToDecode,
            operation_addr: 0,
            operation: 0,
            current_instruction_index: None,
            decode_fault: None,
            immediate_value: 0,
            opcode_size: 0,
            ea: [Ea::BAD; 2],
            history: [0; HISTORY_LEN],
            history_head: 0,
        }
    }

    /// Rebuilds architectural state: supervisor mode, interrupts masked, SSP read
    /// from address 0, PC read from address 4.
    pub fn reset(&mut self) -> u32 {
        self.regs = Registers::default();
        self.alt_a7 = 0;
        self.interrupt_control = 0;
        self.execute_state = ExecuteState::ReadyToDecode;
        self.regs.a[7] = self.bus.read_long(0);
        self.regs.pc = self.bus.read_long(4);
        self.history = [0; HISTORY_LEN];
        self.history_head = 0;
        62
    }

    pub fn registers(&self) -> Registers {
        self.regs
    }

    /// Overwrites the full register file directly (debugger/test seeding; bypasses
    /// the funneled status writer, so prefer [`set_pc`](Self::set_pc) alone when
    /// only the program counter needs adjusting).
    pub fn set_registers(&mut self, regs: Registers) {
        self.regs = regs;
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.regs.pc = pc;
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc
    }

    pub fn current_instruction_addr(&self) -> u32 {
        self.operation_addr
    }

    pub fn in_supervisor_mode(&self) -> bool {
        is_supervisor(self.regs.sr)
    }

    pub fn execution_state(&self) -> ExecuteState {
        self.execute_state
    }

    /// Sets the externally-driven pending interrupt level (0..=7). A pending level
    /// of 7 is treated as non-maskable; exits `Stopped` if the new level unmasks an
    /// interrupt the CPU is waiting on.
    pub fn set_interrupt_control(&mut self, level: u8) {
        self.interrupt_control = level & 7;
        if self.execute_state == ExecuteState::Stopped && self.interrupt_pending() {
            self.execute_state = ExecuteState::ReadyToDecode;
        }
    }

    pub fn operation_history(&self) -> (&[u32; HISTORY_LEN], usize) {
        (&self.history, self.history_head)
    }

    /// The inactive stack pointer (USP while supervisor, SSP while user).
    pub(crate) fn usp(&self) -> u32 {
        if is_supervisor(self.regs.sr) { self.alt_a7 } else { self.regs.a[7] }
    }

    pub(crate) fn set_usp(&mut self, value: u32) {
        if is_supervisor(self.regs.sr) { self.alt_a7 = value; } else { self.regs.a[7] = value; }
    }

    /// The single funneled writer for the status register: masks to the writable
    /// bits and swaps `a[7]`/`altA7` on a supervisor-bit flip.
    pub(crate) fn set_status(&mut self, value: u16) {
        let new_sr = value & WRITABLE_MASK;
        let was_supervisor = is_supervisor(self.regs.sr);
        let becomes_supervisor = is_supervisor(new_sr);
        if was_supervisor != becomes_supervisor {
            core::mem::swap(&mut self.regs.a[7], &mut self.alt_a7);
        }
        self.regs.sr = new_sr;
    }

    /// Fetches the next word at `pc` as an extension word, advancing `pc` by 2.
    pub(crate) fn fetch_extension_word(&mut self) -> u16 {
        let word = self.bus.read_word(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(2);
        word
    }

    fn push_history(&mut self, addr: u32) {
        self.history[self.history_head] = addr;
        self.history_head = (self.history_head + 1) % HISTORY_LEN;
    }

    fn interrupt_pending(&self) -> bool {
        let mask = crate::status::interrupt_mask(self.regs.sr);
        self.interrupt_control == 7 || self.interrupt_control > mask
    }

    /// Raises exception vector `v`: snapshots status, enters supervisor mode, pushes
    /// PC then status onto the (now supervisor) stack, loads PC from the vector
    /// table.
    pub(crate) fn raise_exception(&mut self, vector: u8) {
        debug!("raising exception vector {vector} at pc={:#010x}", self.regs.pc);
        let old_status = self.regs.sr;
        self.set_status(self.regs.sr | SUPERVISOR);
        let sp = self.regs.a[7].wrapping_sub(4);
        self.bus.write_long(sp, self.regs.pc);
        let sp2 = sp.wrapping_sub(2);
        self.bus.write_word(sp2, old_status);
        self.regs.a[7] = sp2;
        self.regs.pc = self.bus.read_long(vector as u32 * 4);
    }

    /// Runs one decode step: checks for a pending interrupt first, then fetches
    /// the opcode, looks it up, extracts size/immediate, and resolves up to two
    /// effective addresses. Returns `(ok, delay)`; `ok` is always `true` here
    /// (decode never freezes the host — illegal/privileged forms are deferred to
    /// `execute_one`).
    pub fn decode_one(&mut self) -> (bool, u32) {
        if self.interrupt_pending() {
            let level = self.interrupt_control;
            self.raise_exception(Vector::autovector(level));
            self.regs.sr = (self.regs.sr & !0x0700) | ((level as u16) << 8);
            self.execute_state = ExecuteState::ReadyToDecode;
            return (true, 12);
        }

        self.operation_addr = self.regs.pc;
        self.operation = self.bus.read_word(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(2);
        self.push_history(self.operation_addr);
        trace!("decoded opcode {:#06x} at {:#010x}", self.operation, self.operation_addr);

        self.decode_fault = None;
        self.current_instruction_index = None;
        self.ea = [Ea::BAD; 2];
        self.immediate_value = 0;
        self.opcode_size = 0;

        let Some(index) = decode_index(self.operation) else {
            self.decode_fault = Some(Vector::IllegalInstruction as u8);
            return (true, 4);
        };
        self.current_instruction_index = Some(index);
        let entry = &crate::decode::ENCODING_TABLE[index];

        if entry.supervisor_only && !self.in_supervisor_mode() {
            self.decode_fault = Some(Vector::PrivilegeViolation as u8);
            return (true, 4);
        }

        let Some(size) = resolve_size(entry.size_kind, self.operation) else {
            self.decode_fault = Some(Vector::IllegalInstruction as u8);
            return (true, 4);
        };
        self.opcode_size = size;

        match entry.imm_kind {
            ImmediateKind::None => {},
            ImmediateKind::Word => {
                self.immediate_value = self.fetch_extension_word() as u32;
            },
            ImmediateKind::UseSize => {
                self.immediate_value = if size == 4 {
                    let hi = self.fetch_extension_word() as u32;
                    let lo = self.fetch_extension_word() as u32;
                    hi << 16 | lo
                } else {
                    let w = self.fetch_extension_word();
                    if size == 1 { w as u32 & 0xFF } else { w as u32 }
                };
            },
        }

        if entry.ea_mask != 0 {
            let (mode, reg) = crate::ea::std_bits(self.operation);
            match self.decode_ea(mode, reg, if size == 0 { 2 } else { size }) {
                Ok(resolved) => {
                    if crate::ea::mask_bit(mode, reg) & entry.ea_mask == 0 {
                        self.decode_fault = Some(Vector::IllegalInstruction as u8);
                    }
                    self.ea[0] = resolved;
                },
                Err(_) => self.decode_fault = Some(Vector::IllegalInstruction as u8),
            }
        }

        if entry.move_style_dest {
            let (mode, reg) = crate::ea::move_dest_bits(self.operation);
            match self.decode_ea(mode, reg, if size == 0 { 2 } else { size }) {
                Ok(resolved) => self.ea[1] = resolved,
                Err(_) => self.decode_fault = Some(Vector::IllegalInstruction as u8),
            }
        }

        self.execute_state = ExecuteState::ReadyToExecute;
        (true, 4)
    }

    /// Runs one execute step: dispatches the decoded entry's handler, or raises
    /// the fault recorded by `decode_one`. Returns `(ok, delay)`; `ok = false`
    /// means the core froze (host should log and pause).
    pub fn execute_one(&mut self) -> (bool, u32) {
        if let Some(vector) = self.decode_fault.take() {
            self.regs.pc = self.operation_addr;
            self.raise_exception(vector);
            self.execute_state = ExecuteState::ReadyToDecode;
            return (true, 4);
        }

        let Some(index) = self.current_instruction_index else {
            self.execute_state = ExecuteState::ReadyToDecode;
            return (true, 0);
        };
        let entry = &crate::decode::ENCODING_TABLE[index];
        let handler = entry.handler;
        let size = self.opcode_size;

        match self.execute_handler(handler, size) {
            Ok(ExecOutcome::Done(cycles)) => {
                self.execute_state = ExecuteState::ReadyToDecode;
                (true, cycles)
            },
            Ok(ExecOutcome::Exception(vector)) => {
                self.raise_exception(vector);
                self.execute_state = ExecuteState::ReadyToDecode;
                (true, 4)
            },
            Ok(ExecOutcome::Freeze) | Err(_) => {
                warn!(
                    "freezing: opcode {:#06x} at {:#010x} could not complete",
                    self.operation, self.operation_addr
                );
                self.regs.pc = self.operation_addr;
                self.execute_state = ExecuteState::Stopped;
                (false, 0)
            },
        }
    }
}

impl<'b, B: Bus + ?Sized> M68000<'b, B> {
    /// Emits a fixed-layout snapshot: registers, execution state, operation
    /// address, current instruction index, immediate value, interrupt control,
    /// opcode word, opcode size, both EAs, and the history ring with its head
    /// pointer.
    pub fn write_to_stream(&self, sink: &mut Vec<u8>) {
        for d in self.regs.d { sink.extend_from_slice(&d.to_be_bytes()); }
        for a in self.regs.a { sink.extend_from_slice(&a.to_be_bytes()); }
        sink.extend_from_slice(&self.regs.pc.to_be_bytes());
        sink.extend_from_slice(&self.regs.sr.to_be_bytes());
        sink.extend_from_slice(&self.alt_a7.to_be_bytes());
        sink.push(self.interrupt_control);
        sink.push(match self.execute_state {
            ExecuteState::ReadyToDecode => 0,
            ExecuteState::ReadyToExecute => 1,
            ExecuteState::Stopped => 2,
        });
        sink.extend_from_slice(&self.operation_addr.to_be_bytes());
        let index = self.current_instruction_index.map(|i| i as i32).unwrap_or(-1);
        sink.extend_from_slice(&index.to_be_bytes());
        sink.extend_from_slice(&self.immediate_value.to_be_bytes());
        sink.extend_from_slice(&self.operation.to_be_bytes());
        sink.push(self.opcode_size);
        for ea in self.ea {
            sink.push(ea.kind as u8);
            sink.extend_from_slice(&ea.payload.to_be_bytes());
            sink.push(ea.raw_mode);
            sink.push(ea.raw_reg);
        }
        for pc in self.history { sink.extend_from_slice(&pc.to_be_bytes()); }
        sink.extend_from_slice(&(self.history_head as u32).to_be_bytes());
    }

    /// Consumes a snapshot written by [`write_to_stream`](Self::write_to_stream),
    /// restoring every field it wrote, in the same order.
    pub fn read_from_stream(&mut self, source: &[u8]) -> Option<usize> {
        let mut cursor = 0usize;
        macro_rules! take {
            ($n:expr) => {{
                let slice = source.get(cursor..cursor + $n)?;
                cursor += $n;
                slice
            }};
        }
        for d in self.regs.d.iter_mut() { *d = u32::from_be_bytes(take!(4).try_into().ok()?); }
        for a in self.regs.a.iter_mut() { *a = u32::from_be_bytes(take!(4).try_into().ok()?); }
        self.regs.pc = u32::from_be_bytes(take!(4).try_into().ok()?);
        self.regs.sr = u16::from_be_bytes(take!(2).try_into().ok()?);
        self.alt_a7 = u32::from_be_bytes(take!(4).try_into().ok()?);
        self.interrupt_control = take!(1)[0];
        self.execute_state = match take!(1)[0] {
            0 => ExecuteState::ReadyToDecode,
            1 => ExecuteState::ReadyToExecute,
            _ => ExecuteState::Stopped,
        };
        self.operation_addr = u32::from_be_bytes(take!(4).try_into().ok()?);
        let index = i32::from_be_bytes(take!(4).try_into().ok()?);
        self.current_instruction_index = if index < 0 { None } else { Some(index as usize) };
        self.immediate_value = u32::from_be_bytes(take!(4).try_into().ok()?);
        self.operation = u16::from_be_bytes(take!(2).try_into().ok()?);
        self.opcode_size = take!(1)[0];
        for ea in self.ea.iter_mut() {
            let kind = match take!(1)[0] {
                0 => EaKind::DataReg,
                1 => EaKind::AddrReg,
                2 => EaKind::MemAlterable,
                3 => EaKind::MemSourceOnly,
                4 => EaKind::Immediate,
                _ => EaKind::Bad,
            };
            let payload = u32::from_be_bytes(take!(4).try_into().ok()?);
            let raw_mode = take!(1)[0];
            let raw_reg = take!(1)[0];
            *ea = Ea { kind, payload, raw_mode, raw_reg };
        }
        for pc in self.history.iter_mut() { *pc = u32::from_be_bytes(take!(4).try_into().ok()?); }
        self.history_head = u32::from_be_bytes(take!(4).try_into().ok()?) as usize % HISTORY_LEN;
        Some(cursor)
    }
}

#[allow(dead_code)]
const _: fn() -> CoreResult<()> = || Ok(());

#[cfg(test)]
mod tests {
    use super::*;

    struct VecBus(Vec<u8>);

    impl Bus for VecBus {
        fn read_word(&mut self, addr: u32) -> u16 {
            let a = addr as usize;
            u16::from_be_bytes([self.0[a], self.0[a + 1]])
        }
        fn write_word(&mut self, addr: u32, value: u16) {
            let a = addr as usize;
            self.0[a..a + 2].copy_from_slice(&value.to_be_bytes());
        }
        fn read_byte(&mut self, addr: u32) -> u8 {
            self.0[addr as usize]
        }
        fn write_byte(&mut self, addr: u32, value: u8) {
            self.0[addr as usize] = value;
        }
    }

    fn bus_with(words: &[u16]) -> VecBus {
        let mut bytes = vec![0u8; 0x2000];
        for (i, w) in words.iter().enumerate() {
            bytes[i * 2..i * 2 + 2].copy_from_slice(&w.to_be_bytes());
        }
        VecBus(bytes)
    }

    #[test]
    fn moveq_then_rts_reaches_preloaded_return_address() {
        let mut bus = bus_with(&[0x7001, 0x4e75]);
        bus.write_long(0x1000, 0);
        let mut cpu = M68000::new(&mut bus);
        cpu.regs.a[7] = 0x1000;
        cpu.bus.write_long(0x1000, 0x0000_1000);
        cpu.regs.pc = 0;

        cpu.decode_one();
        cpu.execute_one();
        assert_eq!(cpu.regs.d[0], 1);

        cpu.decode_one();
        let (ok, _) = cpu.execute_one();
        assert!(ok);
        assert_eq!(cpu.regs.pc, 0x0000_1000);
    }

    #[test]
    fn set_status_swaps_stack_pointer_on_supervisor_flip() {
        let mut bus = bus_with(&[0]);
        let mut cpu = M68000::new(&mut bus);
        cpu.regs.a[7] = 0x2000;
        cpu.alt_a7 = 0x4000;
        cpu.regs.sr = SUPERVISOR;
        cpu.set_status(0);
        assert_eq!(cpu.regs.a[7], 0x4000);
        assert!(!cpu.in_supervisor_mode());
    }
}
