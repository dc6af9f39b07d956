// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instruction handlers.
//!
//! One method per mnemonic family, taking `&mut self` plus the already-decoded
//! operands and returning cycles or the vector to raise. Dispatch runs behind a
//! single tagged [`Handler`] enum and one `execute` match rather than a
//! fn-pointer-per-row decode table: a `match` on a field-less enum compiles to
//! the same jump table a fn-pointer array would, without needing `M68000` to name
//! a concrete `B: Bus` at table-construction time.

use crate::alu::{alu_add, alu_sub, sticky_zero, ALL_FLAGS, NO_X};
use crate::bus::Bus;
use crate::cpu::M68000;
use crate::error::{require_even, CoreResult};
use crate::exception::Vector;
use crate::status::{condition, C, N, V, X, Z};
use crate::utils::{bits, sext16, sext8};

/// One recognized instruction family. Several mnemonics share a handler when their
/// runtime behavior differs only by bits already present in the raw opcode word
/// (e.g. `add`/`sub`'s direction bit, or the four shift/rotate kinds' opmode field).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    Move,
    Moveq,
    Add, Adda, Addi, Addq, Addx,
    Sub, Suba, Subi, Subq, Subx,
    Cmp, Cmpa, Cmpi, Cmpm,
    Neg, Clr, Not, Tst,
    And, Or, Eor, Andi, Ori, Eori,
    AndiToCcr, AndiToSr, OriToCcr, OriToSr, EoriToCcr, EoriToSr,
    MoveToCcr, MoveToSr, MoveFromSr, MoveUsp,
    Btst, Bchg, Bclr, Bset,
    Shift,
    Mulu, Muls, Divu, Divs,
    Abcd, Sbcd,
    Branch, Dbcc, Scc,
    Jmp, Jsr, Lea, Pea,
    Link, Unlk,
    Rts, Rtr, Rte, Trap, Trapv, Chk,
    Exg, Swap, Ext, Movem,
    Stop, Nop,
    Unimplemented,
}

/// Outcome of dispatching one [`Handler`]: success with its cycle cost, an
/// architectural exception to raise, or a host freeze.
pub enum ExecOutcome {
    Done(u32),
    Exception(u8),
    Freeze,
}

/// Register field at bits 11-9 (the "Rx"/"Dn"/"An" slot most non-EA forms share).
fn reg_field(opcode: u16) -> usize {
    bits(opcode, 9, 11) as usize
}

impl<'b, B: Bus + ?Sized> M68000<'b, B> {
    pub(crate) fn execute_handler(&mut self, handler: Handler, size: u8) -> CoreResult<ExecOutcome> {
        use Handler::*;
        let outcome = match handler {
            Move => self.do_move(size)?,
            Moveq => self.do_moveq(),
            Add => self.do_add_sub(size, false)?,
            Sub => self.do_add_sub(size, true)?,
            Adda => self.do_adda_suba(size, false)?,
            Suba => self.do_adda_suba(size, true)?,
            Addi => self.do_addi_subi(size, false)?,
            Subi => self.do_addi_subi(size, true)?,
            Addq => self.do_addq_subq(size, false)?,
            Subq => self.do_addq_subq(size, true)?,
            Addx => self.do_addx_subx(size, false)?,
            Subx => self.do_addx_subx(size, true)?,
            Cmp => self.do_cmp(size)?,
            Cmpa => self.do_cmpa(size)?,
            Cmpi => self.do_cmpi(size)?,
            Cmpm => self.do_cmpm(size)?,
            Neg => self.do_neg(size)?,
            Clr => self.do_clr(size)?,
            Not => self.do_not(size)?,
            Tst => self.do_tst(size)?,
            And => self.do_logic(size, LogicOp::And)?,
            Or => self.do_logic(size, LogicOp::Or)?,
            Eor => self.do_logic(size, LogicOp::Eor)?,
            Andi => self.do_logic_immediate(size, LogicOp::And)?,
            Ori => self.do_logic_immediate(size, LogicOp::Or)?,
            Eori => self.do_logic_immediate(size, LogicOp::Eor)?,
            AndiToCcr => self.do_logic_to_ccr(LogicOp::And),
            OriToCcr => self.do_logic_to_ccr(LogicOp::Or),
            EoriToCcr => self.do_logic_to_ccr(LogicOp::Eor),
            AndiToSr => self.do_logic_to_sr(LogicOp::And),
            OriToSr => self.do_logic_to_sr(LogicOp::Or),
            EoriToSr => self.do_logic_to_sr(LogicOp::Eor),
            MoveToCcr => self.do_move_to_ccr()?,
            MoveToSr => self.do_move_to_sr()?,
            MoveFromSr => self.do_move_from_sr()?,
            MoveUsp => self.do_move_usp(),
            Btst => self.do_bit_op(BitOp::Test)?,
            Bchg => self.do_bit_op(BitOp::Change)?,
            Bclr => self.do_bit_op(BitOp::Clear)?,
            Bset => self.do_bit_op(BitOp::Set)?,
            Shift => self.do_shift(size)?,
            Mulu => self.do_mulu(),
            Muls => self.do_muls(),
            Divu => self.do_divu()?,
            Divs => self.do_divs()?,
            Abcd => self.do_abcd_sbcd(false)?,
            Sbcd => self.do_abcd_sbcd(true)?,
            Branch => self.do_branch()?,
            Dbcc => self.do_dbcc()?,
            Scc => self.do_scc()?,
            Jmp => self.do_jmp()?,
            Jsr => self.do_jsr()?,
            Lea => self.do_lea(),
            Pea => self.do_pea()?,
            Link => self.do_link()?,
            Unlk => self.do_unlk()?,
            Rts => self.do_rts()?,
            Rtr => self.do_rtr()?,
            Rte => self.do_rte()?,
            Trap => ExecOutcome::Exception(Vector::trap(bits(self.operation, 0, 3) as u8)),
            Trapv => self.do_trapv(),
            Chk => self.do_chk()?,
            Exg => self.do_exg(),
            Swap => self.do_swap(),
            Ext => self.do_ext(size),
            Movem => self.do_movem(size)?,
            Stop => self.do_stop(),
            Nop => ExecOutcome::Done(4),
            Unimplemented => ExecOutcome::Freeze,
        };
        Ok(outcome)
    }

    fn do_move(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let src = self.ea[0];
        let dst = self.ea[1];
        let value = match size {
            1 => self.read_ea_byte(&src)? as u32,
            2 => self.read_ea_word(&src)? as u32,
            _ => self.read_ea_long(&src)?,
        };
        match size {
            1 => self.write_ea_byte(&dst, value as u8)?,
            2 => self.write_ea_word(&dst, value as u16)?,
            _ => self.write_ea_long(&dst, value)?,
        }
        if dst.kind != crate::ea::EaKind::AddrReg {
            let sign_bit = match size { 1 => 0x80, 2 => 0x8000, _ => 0x8000_0000 };
            self.set_ccr_nz(value & sign_bit != 0, value == 0);
            self.clear_vc();
        }
        Ok(ExecOutcome::Done(4))
    }

    fn do_moveq(&mut self) -> ExecOutcome {
        let value = sext8(bits(self.operation, 0, 7) as u8);
        self.regs.d[reg_field(self.operation)] = value;
        self.set_ccr_nz(value & 0x8000_0000 != 0, value == 0);
        self.clear_vc();
        ExecOutcome::Done(4)
    }

    fn alu_operand(&mut self, size: u8) -> CoreResult<(u32, u32, bool)> {
        let is_to_ea = bits(self.operation, 8, 8) != 0;
        let dn = reg_field(self.operation);
        let ea = self.ea[0];
        let ea_value = match size {
            1 => self.read_ea_byte(&ea)? as u32,
            2 => self.read_ea_word(&ea)? as u32,
            _ => self.read_ea_long(&ea)?,
        };
        let dn_value = self.regs.d[dn];
        Ok((ea_value, dn_value, is_to_ea))
    }

    fn do_add_sub(&mut self, size: u8, is_sub: bool) -> CoreResult<ExecOutcome> {
        let (ea_value, dn_value, is_to_ea) = self.alu_operand(size)?;
        let result = if is_sub {
            if is_to_ea { alu_sub(ea_value, dn_value, false, size, ALL_FLAGS) } else { alu_sub(dn_value, ea_value, false, size, ALL_FLAGS) }
        } else {
            alu_add(dn_value, ea_value, false, size, ALL_FLAGS)
        };
        self.regs.sr = result.apply(self.regs.sr);
        let dn = reg_field(self.operation);
        if is_to_ea {
            let ea = self.ea[0];
            self.write_sized(&ea, size, result.value)?;
        } else {
            self.write_sized_reg(dn, size, result.value);
        }
        Ok(ExecOutcome::Done(if is_to_ea { 8 } else { 4 }))
    }

    fn do_adda_suba(&mut self, size: u8, is_sub: bool) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let raw = match size {
            2 => sext16(self.read_ea_word(&ea)?),
            _ => self.read_ea_long(&ea)?,
        };
        let an = reg_field(self.operation);
        self.regs.a[an] = if is_sub { self.regs.a[an].wrapping_sub(raw) } else { self.regs.a[an].wrapping_add(raw) };
        Ok(ExecOutcome::Done(8))
    }

    fn do_addi_subi(&mut self, size: u8, is_sub: bool) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let imm = self.immediate_value;
        let value = self.read_sized(&ea, size)?;
        let result = if is_sub { alu_sub(value, imm, false, size, ALL_FLAGS) } else { alu_add(value, imm, false, size, ALL_FLAGS) };
        self.regs.sr = result.apply(self.regs.sr);
        self.write_sized(&ea, size, result.value)?;
        Ok(ExecOutcome::Done(8))
    }

    fn do_addq_subq(&mut self, size: u8, is_sub: bool) -> CoreResult<ExecOutcome> {
        let quick = bits(self.operation, 9, 11);
        let amount = if quick == 0 { 8 } else { quick as u32 };
        let ea = self.ea[0];
        if ea.kind == crate::ea::EaKind::AddrReg {
            let an = ea.payload as usize;
            self.regs.a[an] = if is_sub { self.regs.a[an].wrapping_sub(amount) } else { self.regs.a[an].wrapping_add(amount) };
            return Ok(ExecOutcome::Done(8));
        }
        let value = self.read_sized(&ea, size)?;
        let result = if is_sub { alu_sub(value, amount, false, size, ALL_FLAGS) } else { alu_add(value, amount, false, size, ALL_FLAGS) };
        self.regs.sr = result.apply(self.regs.sr);
        self.write_sized(&ea, size, result.value)?;
        Ok(ExecOutcome::Done(if ea.kind == crate::ea::EaKind::DataReg { 4 } else { 8 }))
    }

    fn do_addx_subx(&mut self, size: u8, is_sub: bool) -> CoreResult<ExecOutcome> {
        let rx = reg_field(self.operation);
        let ry = bits(self.operation, 0, 2) as usize;
        let memory_mode = bits(self.operation, 3, 3) != 0;
        let x_in = self.regs.sr & X != 0;
        let (src, dst) = if memory_mode {
            let src_ea = self.decode_ea(4, ry as u8, size)?;
            let dst_ea = self.decode_ea(4, rx as u8, size)?;
            (self.read_sized(&src_ea, size)?, self.read_sized(&dst_ea, size)?)
        } else {
            (self.regs.d[ry], self.regs.d[rx])
        };
        let result = if is_sub { alu_sub(dst, src, x_in, size, ALL_FLAGS) } else { alu_add(dst, src, x_in, size, ALL_FLAGS) };
        let sticky = sticky_zero(self.regs.sr & Z != 0, result.value == 0);
        self.regs.sr = result.apply(self.regs.sr);
        self.regs.sr = (self.regs.sr & !Z) | if sticky { Z } else { 0 };
        if memory_mode {
            let dst_ea = self.decode_ea(4, rx as u8, size)?;
            self.write_sized(&dst_ea, size, result.value)?;
        } else {
            self.write_sized_reg(rx, size, result.value);
        }
        Ok(ExecOutcome::Done(if memory_mode { 18 } else { 4 }))
    }

    fn do_cmp(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let dn = reg_field(self.operation);
        let ea_value = self.read_sized(&ea, size)?;
        let result = alu_sub(self.regs.d[dn], ea_value, false, size, NO_X);
        self.regs.sr = result.apply(self.regs.sr);
        Ok(ExecOutcome::Done(4))
    }

    fn do_cmpa(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let raw = match size { 2 => sext16(self.read_ea_word(&ea)?), _ => self.read_ea_long(&ea)? };
        let an = reg_field(self.operation);
        let result = alu_sub(self.regs.a[an], raw, false, 4, NO_X);
        self.regs.sr = result.apply(self.regs.sr);
        Ok(ExecOutcome::Done(6))
    }

    fn do_cmpi(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let value = self.read_sized(&ea, size)?;
        let result = alu_sub(value, self.immediate_value, false, size, NO_X);
        self.regs.sr = result.apply(self.regs.sr);
        Ok(ExecOutcome::Done(8))
    }

    fn do_cmpm(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let ax = bits(self.operation, 0, 2) as u8;
        let ay = reg_field(self.operation) as u8;
        let src_ea = self.decode_ea(3, ax, size)?;
        let dst_ea = self.decode_ea(3, ay, size)?;
        let src = self.read_sized(&src_ea, size)?;
        let dst = self.read_sized(&dst_ea, size)?;
        let result = alu_sub(dst, src, false, size, NO_X);
        self.regs.sr = result.apply(self.regs.sr);
        Ok(ExecOutcome::Done(12))
    }

    fn do_neg(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let value = self.read_sized(&ea, size)?;
        let result = alu_sub(0, value, false, size, ALL_FLAGS);
        self.regs.sr = result.apply(self.regs.sr);
        self.write_sized(&ea, size, result.value)?;
        Ok(ExecOutcome::Done(4))
    }

    fn do_clr(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        self.write_sized(&ea, size, 0)?;
        self.regs.sr = (self.regs.sr & !(N | V | C)) | Z;
        Ok(ExecOutcome::Done(4))
    }

    fn do_not(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let value = !self.read_sized(&ea, size)?;
        self.write_sized(&ea, size, value)?;
        let sign_bit = match size { 1 => 0x80, 2 => 0x8000, _ => 0x8000_0000 };
        self.set_ccr_nz(value & sign_bit != 0, self.masked(value, size) == 0);
        self.clear_vc();
        Ok(ExecOutcome::Done(4))
    }

    fn do_tst(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let value = self.read_sized(&ea, size)?;
        let sign_bit = match size { 1 => 0x80, 2 => 0x8000, _ => 0x8000_0000 };
        self.set_ccr_nz(value & sign_bit != 0, value == 0);
        self.clear_vc();
        Ok(ExecOutcome::Done(4))
    }

    fn do_logic(&mut self, size: u8, op: LogicOp) -> CoreResult<ExecOutcome> {
        let (ea_value, dn_value, is_to_ea) = self.alu_operand(size)?;
        let result = op.apply(ea_value, dn_value);
        let sign_bit = match size { 1 => 0x80, 2 => 0x8000, _ => 0x8000_0000 };
        self.set_ccr_nz(result & sign_bit != 0, self.masked(result, size) == 0);
        self.clear_vc();
        let dn = reg_field(self.operation);
        if is_to_ea {
            let ea = self.ea[0];
            self.write_sized(&ea, size, result)?;
        } else {
            self.write_sized_reg(dn, size, result);
        }
        Ok(ExecOutcome::Done(4))
    }

    fn do_logic_immediate(&mut self, size: u8, op: LogicOp) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let value = self.read_sized(&ea, size)?;
        let result = op.apply(value, self.immediate_value);
        let sign_bit = match size { 1 => 0x80, 2 => 0x8000, _ => 0x8000_0000 };
        self.set_ccr_nz(result & sign_bit != 0, self.masked(result, size) == 0);
        self.clear_vc();
        self.write_sized(&ea, size, result)?;
        Ok(ExecOutcome::Done(8))
    }

    fn do_logic_to_ccr(&mut self, op: LogicOp) -> ExecOutcome {
        let ccr = self.regs.sr & 0xFF;
        let result = op.apply(ccr, self.immediate_value & 0xFF) & 0xFF;
        self.regs.sr = (self.regs.sr & 0xFF00) | result as u16;
        ExecOutcome::Done(20)
    }

    fn do_logic_to_sr(&mut self, op: LogicOp) -> ExecOutcome {
        let result = op.apply(self.regs.sr as u32, self.immediate_value) as u16;
        self.set_status(result);
        ExecOutcome::Done(20)
    }

    fn do_move_to_ccr(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let value = self.read_ea_word(&ea)?;
        self.regs.sr = (self.regs.sr & 0xFF00) | (value & 0x1F);
        Ok(ExecOutcome::Done(12))
    }

    fn do_move_to_sr(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let value = self.read_ea_word(&ea)?;
        self.set_status(value);
        Ok(ExecOutcome::Done(12))
    }

    fn do_move_from_sr(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        self.write_ea_word(&ea, self.regs.sr)?;
        Ok(ExecOutcome::Done(6))
    }

    fn do_move_usp(&mut self) -> ExecOutcome {
        let an = bits(self.operation, 0, 2) as usize;
        if bits(self.operation, 3, 3) == 0 {
            self.regs.a[an] = self.usp();
        } else {
            self.set_usp(self.regs.a[an]);
        }
        ExecOutcome::Done(4)
    }

    fn do_bit_op(&mut self, op: BitOp) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let dynamic_reg = if self.opcode_size_is_static() { None } else { Some(reg_field(self.operation)) };
        let bit_number = match dynamic_reg {
            Some(r) => self.regs.d[r],
            None => self.immediate_value,
        };
        let is_long = ea.kind == crate::ea::EaKind::DataReg;
        let modulo = if is_long { 32 } else { 8 };
        let bit = bit_number % modulo;
        let size = if is_long { 4 } else { 1 };
        let value = self.read_sized(&ea, size)?;
        let was_set = value & (1 << bit) != 0;
        self.set_ccr_z(!was_set);
        let new_value = match op {
            BitOp::Test => value,
            BitOp::Change => value ^ (1 << bit),
            BitOp::Clear => value & !(1 << bit),
            BitOp::Set => value | (1 << bit),
        };
        if op != BitOp::Test {
            self.write_sized(&ea, size, new_value)?;
        }
        Ok(ExecOutcome::Done(if is_long { 6 } else { 4 }))
    }

    fn opcode_size_is_static(&self) -> bool {
        bits(self.operation, 8, 8) == 0
    }

    fn do_shift(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let memory_form = bits(self.operation, 6, 7) == 0b11;
        let kind = if memory_form { bits(self.operation, 9, 10) } else { bits(self.operation, 3, 4) };
        let direction_left = bits(self.operation, 8, 8) != 0;
        let (ea, size, count) = if memory_form {
            (self.ea[0], 2u8, 1u32)
        } else {
            let count_field = bits(self.operation, 9, 11);
            let count = if bits(self.operation, 5, 5) != 0 {
                self.regs.d[count_field as usize] % 64
            } else if count_field == 0 { 8 } else { count_field as u32 };
            let dn = reg_field(self.operation) as u8;
            (self.decode_ea(0, dn, size)?, size, count)
        };
        let mut value = self.read_sized(&ea, size)?;
        let mask = match size { 1 => 0xFFu32, 2 => 0xFFFF, _ => 0xFFFF_FFFF };
        let sign = match size { 1 => 0x80, 2 => 0x8000, _ => 0x8000_0000 };
        let width = size as u32 * 8;
        let mut last_out = self.regs.sr & C != 0;
        let mut overflow = false;
        let mut x = self.regs.sr & X != 0;
        for _ in 0..count {
            let sign_before = value & sign != 0;
            match kind {
                0b00 => { // arithmetic shift
                    if direction_left {
                        last_out = value & sign != 0;
                        let new_value = (value << 1) & mask;
                        if (new_value & sign != 0) != sign_before { overflow = true; }
                        value = new_value;
                    } else {
                        last_out = value & 1 != 0;
                        value = ((value & mask) >> 1) | if sign_before { sign } else { 0 };
                    }
                    x = last_out;
                },
                0b01 => { // logical shift
                    if direction_left {
                        last_out = value & sign != 0;
                        value = (value << 1) & mask;
                    } else {
                        last_out = value & 1 != 0;
                        value = (value & mask) >> 1;
                    }
                    x = last_out;
                },
                0b10 => { // rotate through extend
                    if direction_left {
                        last_out = value & sign != 0;
                        value = ((value << 1) | (x as u32)) & mask;
                    } else {
                        last_out = value & 1 != 0;
                        value = ((value >> 1) | ((x as u32) << (width - 1))) & mask;
                    }
                    x = last_out;
                },
                _ => { // rotate, no extend involvement
                    if direction_left {
                        last_out = value & sign != 0;
                        value = ((value << 1) | last_out as u32) & mask;
                    } else {
                        last_out = value & 1 != 0;
                        value = ((value >> 1) | ((last_out as u32) << (width - 1))) & mask;
                    }
                },
            }
        }
        self.write_sized(&ea, size, value)?;
        let mut set = 0u16;
        let mut clear = 0u16;
        if count > 0 {
            if last_out { set |= C } else { clear |= C }
            if kind != 0b11 {
                if x { set |= X } else { clear |= X }
            }
        } else {
            clear |= C;
        }
        if kind == 0b00 && direction_left {
            if overflow { set |= V } else { clear |= V }
        } else {
            clear |= V;
        }
        if value & sign != 0 { set |= N } else { clear |= N }
        if self.masked(value, size) == 0 { set |= Z } else { clear |= Z }
        self.regs.sr = (self.regs.sr & !(set | clear)) | set;
        Ok(ExecOutcome::Done(if memory_form { 8 } else { 6 + 2 * count }))
    }

    fn do_mulu(&mut self) -> ExecOutcome {
        let ea = self.ea[0];
        let src = self.read_ea_word(&ea).unwrap_or(0) as u32;
        let dn = reg_field(self.operation);
        let result = (self.regs.d[dn] & 0xFFFF).wrapping_mul(src);
        self.regs.d[dn] = result;
        self.set_ccr_nz(result & 0x8000_0000 != 0, result == 0);
        self.clear_vc();
        ExecOutcome::Done(38 + 2 * src.count_ones())
    }

    fn do_muls(&mut self) -> ExecOutcome {
        let ea = self.ea[0];
        let src = sext16(self.read_ea_word(&ea).unwrap_or(0)) as i32;
        let dn = reg_field(self.operation);
        let result = ((self.regs.d[dn] as i16) as i32).wrapping_mul(src) as u32;
        self.regs.d[dn] = result;
        self.set_ccr_nz(result & 0x8000_0000 != 0, result == 0);
        self.clear_vc();
        let widened = (src as u32 & 0xFFFF) << 1;
        let transitions = (widened ^ (widened >> 1)).count_ones();
        ExecOutcome::Done(38 + 2 * transitions)
    }

    fn do_divu(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let divisor = self.read_ea_word(&ea)? as u32;
        let dn = reg_field(self.operation);
        if divisor == 0 {
            return Ok(ExecOutcome::Exception(Vector::ZeroDivide as u8));
        }
        let dividend = self.regs.d[dn];
        let quotient = dividend / divisor;
        let remainder = dividend % divisor;
        if quotient > 0xFFFF {
            self.regs.sr |= V;
        } else {
            self.regs.sr &= !(V | C);
            self.regs.d[dn] = (remainder << 16) | (quotient & 0xFFFF);
            self.set_ccr_nz(quotient & 0x8000 != 0, quotient == 0);
        }
        Ok(ExecOutcome::Done(140))
    }

    fn do_divs(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let divisor = sext16(self.read_ea_word(&ea)?) as i32;
        let dn = reg_field(self.operation);
        if divisor == 0 {
            return Ok(ExecOutcome::Exception(Vector::ZeroDivide as u8));
        }
        let dividend = self.regs.d[dn] as i32;
        let quotient = dividend / divisor;
        let remainder = dividend % divisor;
        if quotient > i16::MAX as i32 || quotient < i16::MIN as i32 {
            self.regs.sr |= V;
        } else {
            self.regs.sr &= !(V | C);
            self.regs.d[dn] = ((remainder as u32) << 16) | (quotient as u32 & 0xFFFF);
            self.set_ccr_nz(quotient < 0, quotient == 0);
        }
        Ok(ExecOutcome::Done(158))
    }

    fn do_abcd_sbcd(&mut self, is_sub: bool) -> CoreResult<ExecOutcome> {
        let rx = reg_field(self.operation) as u8;
        let ry = bits(self.operation, 0, 2) as u8;
        let memory_mode = bits(self.operation, 3, 3) != 0;
        let x_in = self.regs.sr & X != 0;
        let (src, dst, dst_ea) = if memory_mode {
            let src_ea = self.decode_ea(4, ry, 1)?;
            let dst_ea = self.decode_ea(4, rx, 1)?;
            (self.read_ea_byte(&src_ea)?, self.read_ea_byte(&dst_ea)?, Some(dst_ea))
        } else {
            (self.regs.d[ry as usize] as u8, self.regs.d[rx as usize] as u8, None)
        };
        let (result, carry) = bcd_op(dst, src, x_in, is_sub);
        if result != 0 {
            self.regs.sr &= !Z;
        }
        if carry { self.regs.sr |= X | C; } else { self.regs.sr &= !(X | C); }
        match dst_ea {
            Some(ea) => self.write_ea_byte(&ea, result)?,
            None => { let r = rx as usize; self.regs.d[r] = (self.regs.d[r] & 0xFFFF_FF00) | result as u32; },
        }
        Ok(ExecOutcome::Done(if memory_mode { 18 } else { 6 }))
    }

    fn do_branch(&mut self) -> CoreResult<ExecOutcome> {
        let cc = bits(self.operation, 8, 11) as u8;
        let is_bsr = cc == 1;
        let taken = is_bsr || condition(self.regs.sr, cc);
        let disp8 = bits(self.operation, 0, 7) as u8;
        let base = self.operation_addr.wrapping_add(2);
        let target = if disp8 != 0 {
            base.wrapping_add(sext8(disp8))
        } else {
            base.wrapping_add(sext16(self.fetch_extension_word()))
        };
        let return_pc = self.regs.pc;
        if !taken {
            return Ok(ExecOutcome::Done(8));
        }
        require_even(target)?;
        if is_bsr {
            let sp = self.regs.a[7].wrapping_sub(4);
            self.regs.a[7] = sp;
            self.bus.write_long(sp, return_pc);
        }
        self.regs.pc = target;
        Ok(ExecOutcome::Done(10))
    }

    fn do_dbcc(&mut self) -> CoreResult<ExecOutcome> {
        let cc = bits(self.operation, 8, 11) as u8;
        let dn = bits(self.operation, 0, 2) as usize;
        let base = self.operation_addr.wrapping_add(2);
        let disp = sext16(self.fetch_extension_word());
        if condition(self.regs.sr, cc) {
            return Ok(ExecOutcome::Done(12));
        }
        let counter = (self.regs.d[dn] as u16).wrapping_sub(1);
        self.regs.d[dn] = (self.regs.d[dn] & 0xFFFF_0000) | counter as u32;
        if counter != 0xFFFF {
            let target = base.wrapping_add(disp);
            require_even(target)?;
            self.regs.pc = target;
            return Ok(ExecOutcome::Done(10));
        }
        Ok(ExecOutcome::Done(14))
    }

    fn do_scc(&mut self) -> CoreResult<ExecOutcome> {
        let cc = bits(self.operation, 8, 11) as u8;
        let ea = self.ea[0];
        let value = if condition(self.regs.sr, cc) { 0xFF } else { 0x00 };
        self.write_ea_byte(&ea, value)?;
        Ok(ExecOutcome::Done(4))
    }

    fn do_jmp(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let target = self.ea_address(&ea);
        require_even(target)?;
        self.regs.pc = target;
        Ok(ExecOutcome::Done(8))
    }

    fn do_jsr(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let target = self.ea_address(&ea);
        require_even(target)?;
        let return_pc = self.regs.pc;
        let sp = self.regs.a[7].wrapping_sub(4);
        self.regs.a[7] = sp;
        self.bus.write_long(sp, return_pc);
        self.regs.pc = target;
        Ok(ExecOutcome::Done(16))
    }

    fn do_lea(&mut self) -> ExecOutcome {
        let ea = self.ea[0];
        let an = reg_field(self.operation);
        self.regs.a[an] = self.ea_address(&ea);
        ExecOutcome::Done(4)
    }

    fn do_pea(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let addr = self.ea_address(&ea);
        let sp = self.regs.a[7].wrapping_sub(4);
        self.regs.a[7] = sp;
        self.bus.write_long(sp, addr);
        Ok(ExecOutcome::Done(12))
    }

    fn do_link(&mut self) -> CoreResult<ExecOutcome> {
        let an = bits(self.operation, 0, 2) as usize;
        let disp = sext16(self.fetch_extension_word());
        let sp = self.regs.a[7].wrapping_sub(4);
        self.bus.write_long(sp, self.regs.a[an]);
        self.regs.a[7] = sp;
        self.regs.a[an] = sp;
        self.regs.a[7] = sp.wrapping_add(disp);
        Ok(ExecOutcome::Done(16))
    }

    fn do_unlk(&mut self) -> CoreResult<ExecOutcome> {
        let an = bits(self.operation, 0, 2) as usize;
        let addr = self.regs.a[an];
        self.regs.a[an] = self.bus.read_long(addr);
        self.regs.a[7] = addr.wrapping_add(4);
        Ok(ExecOutcome::Done(12))
    }

    fn do_rts(&mut self) -> CoreResult<ExecOutcome> {
        let sp = self.regs.a[7];
        let target = self.bus.read_long(sp);
        require_even(target)?;
        self.regs.a[7] = sp.wrapping_add(4);
        self.regs.pc = target;
        Ok(ExecOutcome::Done(16))
    }

    fn do_rtr(&mut self) -> CoreResult<ExecOutcome> {
        let sp = self.regs.a[7];
        let ccr = self.bus.read_word(sp);
        let target = self.bus.read_long(sp.wrapping_add(2));
        require_even(target)?;
        self.regs.a[7] = sp.wrapping_add(6);
        self.regs.sr = (self.regs.sr & 0xFF00) | (ccr & 0x1F);
        self.regs.pc = target;
        Ok(ExecOutcome::Done(20))
    }

    fn do_rte(&mut self) -> CoreResult<ExecOutcome> {
        let sp = self.regs.a[7];
        let status = self.bus.read_word(sp);
        let target = self.bus.read_long(sp.wrapping_add(2));
        require_even(target)?;
        self.regs.a[7] = sp.wrapping_add(6);
        self.set_status(status);
        self.regs.pc = target;
        Ok(ExecOutcome::Done(20))
    }

    fn do_trapv(&mut self) -> ExecOutcome {
        if self.regs.sr & V != 0 {
            ExecOutcome::Exception(Vector::TrapvInstruction as u8)
        } else {
            ExecOutcome::Done(4)
        }
    }

    fn do_chk(&mut self) -> CoreResult<ExecOutcome> {
        let ea = self.ea[0];
        let bound = sext16(self.read_ea_word(&ea)?) as i32;
        let dn = reg_field(self.operation);
        let value = self.regs.d[dn] as i16 as i32;
        if value < 0 || value > bound {
            self.regs.sr = (self.regs.sr & !N) | if value < 0 { N } else { 0 };
            return Ok(ExecOutcome::Exception(Vector::ChkInstruction as u8));
        }
        Ok(ExecOutcome::Done(10))
    }

    fn do_exg(&mut self) -> ExecOutcome {
        let rx = reg_field(self.operation);
        let ry = bits(self.operation, 0, 2) as usize;
        let opmode = bits(self.operation, 3, 7);
        match opmode {
            0b01000 => self.regs.d.swap(rx, ry),
            0b01001 => self.regs.a.swap(rx, ry),
            _ => {
                let d = self.regs.d[rx];
                self.regs.d[rx] = self.regs.a[ry];
                self.regs.a[ry] = d;
            },
        }
        ExecOutcome::Done(6)
    }

    fn do_swap(&mut self) -> ExecOutcome {
        let dn = bits(self.operation, 0, 2) as usize;
        let v = self.regs.d[dn];
        let swapped = (v << 16) | (v >> 16);
        self.regs.d[dn] = swapped;
        self.set_ccr_nz(swapped & 0x8000_0000 != 0, swapped == 0);
        self.clear_vc();
        ExecOutcome::Done(4)
    }

    fn do_ext(&mut self, size: u8) -> ExecOutcome {
        let dn = bits(self.operation, 0, 2) as usize;
        let value = if size == 2 {
            sext8(self.regs.d[dn] as u8) & 0xFFFF
        } else {
            sext16(self.regs.d[dn] as u16)
        };
        if size == 2 {
            self.regs.d[dn] = (self.regs.d[dn] & 0xFFFF_0000) | value;
        } else {
            self.regs.d[dn] = value;
        }
        let sign_bit = if size == 2 { 0x8000 } else { 0x8000_0000 };
        self.set_ccr_nz(value & sign_bit != 0, self.masked(value, size) == 0);
        self.clear_vc();
        ExecOutcome::Done(4)
    }

    fn do_movem(&mut self, size: u8) -> CoreResult<ExecOutcome> {
        let list = self.immediate_value as u16;
        let ea = self.ea[0];
        let load = bits(self.operation, 10, 10) != 0;
        let predecrement = ea.kind == crate::ea::EaKind::MemAlterable && ea.raw_mode == 4;
        let postincrement = ea.kind == crate::ea::EaKind::MemAlterable && ea.raw_mode == 3;
        let mut count = 0u32;
        if predecrement {
            // decode_ea already applied one decrement to reach `ea.payload`; undo it to
            // recover An so the loop can decrement once per selected register itself.
            // List bit 0 is A7, bit 15 is D0; process A7..A0 then D7..D0, decrementing
            // before each store so D0 (the highest bit) ends up nearest An.
            let mut addr = self.ea_address(&ea).wrapping_add(size as u32);
            for i in 0..16u32 {
                if list & (1 << i) != 0 {
                    addr = addr.wrapping_sub(size as u32);
                    let reg_value = if i < 8 { self.regs.a[7 - i as usize] } else { self.regs.d[7 - (i - 8) as usize] };
                    if size == 2 {
                        self.bus.write_word(addr, reg_value as u16);
                    } else {
                        self.bus.write_long(addr, reg_value);
                    }
                    count += 1;
                }
            }
            self.regs.a[ea.raw_reg as usize] = addr;
        } else {
            let mut addr = self.ea_address(&ea);
            for i in 0..16u32 {
                if list & (1 << i) != 0 {
                    if load {
                        let value = if size == 2 { sext16(self.bus.read_word(addr)) } else { self.bus.read_long(addr) };
                        if i < 8 { self.regs.d[i as usize] = value; } else { self.regs.a[(i - 8) as usize] = value; }
                    } else {
                        let reg_value = if i < 8 { self.regs.d[i as usize] } else { self.regs.a[(i - 8) as usize] };
                        if size == 2 {
                            self.bus.write_word(addr, reg_value as u16);
                        } else {
                            self.bus.write_long(addr, reg_value);
                        }
                    }
                    addr = addr.wrapping_add(size as u32);
                    count += 1;
                }
            }
            if postincrement {
                self.regs.a[ea.raw_reg as usize] = addr;
            }
        }
        Ok(ExecOutcome::Done(8 + 4 * count))
    }

    fn do_stop(&mut self) -> ExecOutcome {
        self.set_status(self.immediate_value as u16);
        self.execute_state = crate::cpu::ExecuteState::Stopped;
        ExecOutcome::Done(4)
    }

    // --- shared helpers ---

    fn read_sized(&mut self, ea: &crate::ea::Ea, size: u8) -> CoreResult<u32> {
        Ok(match size {
            1 => self.read_ea_byte(ea)? as u32,
            2 => self.read_ea_word(ea)? as u32,
            _ => self.read_ea_long(ea)?,
        })
    }

    fn write_sized(&mut self, ea: &crate::ea::Ea, size: u8, value: u32) -> CoreResult<()> {
        match size {
            1 => self.write_ea_byte(ea, value as u8),
            2 => self.write_ea_word(ea, value as u16),
            _ => self.write_ea_long(ea, value),
        }
    }

    fn write_sized_reg(&mut self, reg: usize, size: u8, value: u32) {
        match size {
            1 => self.regs.d[reg] = (self.regs.d[reg] & 0xFFFF_FF00) | (value & 0xFF),
            2 => self.regs.d[reg] = (self.regs.d[reg] & 0xFFFF_0000) | (value & 0xFFFF),
            _ => self.regs.d[reg] = value,
        }
    }

    fn masked(&self, value: u32, size: u8) -> u32 {
        match size { 1 => value & 0xFF, 2 => value & 0xFFFF, _ => value }
    }

    fn set_ccr_nz(&mut self, n: bool, z: bool) {
        self.regs.sr = (self.regs.sr & !(N | Z)) | if n { N } else { 0 } | if z { Z } else { 0 };
    }

    fn set_ccr_z(&mut self, z: bool) {
        self.regs.sr = (self.regs.sr & !Z) | if z { Z } else { 0 };
    }

    fn clear_vc(&mut self) {
        self.regs.sr &= !(V | C);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogicOp { And, Or, Eor }

impl LogicOp {
    fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            LogicOp::And => a & b,
            LogicOp::Or => a | b,
            LogicOp::Eor => a ^ b,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BitOp { Test, Change, Clear, Set }

/// Packed-BCD add/subtract of one byte, shared by `abcd` and `sbcd`.
fn bcd_op(dst: u8, src: u8, x_in: bool, is_sub: bool) -> (u8, bool) {
    let (dst_lo, dst_hi) = (dst & 0xF, dst >> 4);
    let (src_lo, src_hi) = (src & 0xF, src >> 4);
    let carry_in = x_in as i16;
    if is_sub {
        let mut lo = dst_lo as i16 - src_lo as i16 - carry_in;
        let mut borrow = 0i16;
        if lo < 0 { lo += 10; borrow = 1; }
        let mut hi = dst_hi as i16 - src_hi as i16 - borrow;
        let mut carry = 0i16;
        if hi < 0 { hi += 10; carry = 1; }
        (((hi as u8) << 4) | lo as u8, carry != 0)
    } else {
        let mut lo = dst_lo as i16 + src_lo as i16 + carry_in;
        let mut carry_mid = 0i16;
        if lo > 9 { lo -= 10; carry_mid = 1; }
        let mut hi = dst_hi as i16 + src_hi as i16 + carry_mid;
        let mut carry = 0i16;
        if hi > 9 { hi -= 10; carry = 1; }
        (((hi as u8) << 4) | lo as u8, carry != 0)
    }
}
