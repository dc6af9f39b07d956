// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A disassembler sharing the interpreter's decoding grammar.
//!
//! Reads from the same [`ENCODING_TABLE`](crate::decode::ENCODING_TABLE) the
//! interpreter decodes from, rather than keeping a second, near-parallel table
//! that could drift out of sync with it.

use crate::decode::{decode, resolve_size, ImmediateKind};
use crate::ea::{move_dest_bits, std_bits};
use crate::status::disassemble_condition;
use crate::utils::{bits, sext16, sext8};

/// A read-only, word-addressable view of memory for the disassembler to read
/// opcode and extension words from. Never the [`Bus`](crate::bus::Bus) — the
/// disassembler must not perform side-effecting accesses.
pub trait DisassemblyView {
    fn get_word(&self, addr: u32) -> u16;
    fn get_byte(&self, addr: u32) -> u8;
}

/// Disassembles one instruction at a time from a [`DisassemblyView`], advancing
/// `pc` past the opcode and any extension words it consumed.
pub struct Disassembler<'v, V: DisassemblyView + ?Sized> {
    view: &'v V,
    pub pc: u32,
}

impl<'v, V: DisassemblyView + ?Sized> Disassembler<'v, V> {
    pub fn new(view: &'v V, pc: u32) -> Self {
        Disassembler { view, pc }
    }

    fn fetch_word(&mut self) -> u16 {
        let word = self.view.get_word(self.pc);
        self.pc = self.pc.wrapping_add(2);
        word
    }

    fn fetch_long(&mut self) -> u32 {
        let hi = self.fetch_word() as u32;
        let lo = self.fetch_word() as u32;
        hi << 16 | lo
    }

    fn size_suffix(size: u8) -> &'static str {
        match size {
            1 => ".b",
            2 => ".w",
            4 => ".l",
            _ => "",
        }
    }

    /// Formats the operand at `(mode, reg)` without consuming the opcode word
    /// itself (already fetched by the caller); consumes any extension words the
    /// addressing mode needs.
    fn format_ea(&mut self, mode: u8, reg: u8, size: u8) -> String {
        match mode {
            0 => format!("d{reg}"),
            1 => format!("a{reg}"),
            2 => format!("(a{reg})"),
            3 => format!("(a{reg})+"),
            4 => format!("-(a{reg})"),
            5 => {
                let disp = sext16(self.fetch_word()) as i32;
                format!("({disp}, a{reg})")
            },
            6 => {
                let ext = self.fetch_word();
                format!("({}, a{reg}, {})", Self::brief_disp(ext), Self::brief_index(ext))
            },
            7 => match reg {
                0 => {
                    let addr = sext16(self.fetch_word()) as i32;
                    format!("({addr:#x}).w")
                },
                1 => {
                    let addr = self.fetch_long();
                    format!("({addr:#x}).l")
                },
                2 => {
                    let base = self.pc;
                    let disp = sext16(self.fetch_word());
                    format!("({:#x}, pc)", base.wrapping_add(disp))
                },
                3 => {
                    let base = self.pc;
                    let ext = self.fetch_word();
                    format!("({}, pc, {})", Self::brief_disp(ext), Self::brief_index(ext))
                },
                4 => {
                    let imm = if size == 4 { self.fetch_long() } else { self.fetch_word() as u32 };
                    format!("#{imm:#x}")
                },
                _ => "?".to_string(),
            },
            _ => unreachable!("mode is 3 bits"),
        }
    }

    fn brief_disp(ext: u16) -> i32 {
        sext8(ext as u8) as i32
    }

    fn brief_index(ext: u16) -> String {
        let is_addr_reg = bits(ext, 15, 15) != 0;
        let xn = bits(ext, 12, 14);
        let long_index = bits(ext, 11, 11) != 0;
        let reg = if is_addr_reg { format!("a{xn}") } else { format!("d{xn}") };
        format!("{reg}{}", if long_index { ".l" } else { ".w" })
    }

    /// Disassembles the instruction at the current `pc`, returning its text and
    /// advancing `pc` past it. Returns `"dc.w $xxxx"` for an opcode that does not
    /// decode.
    pub fn disassemble(&mut self) -> String {
        let start = self.pc;
        let opcode = self.fetch_word();
        let Some(entry) = decode(opcode) else {
            return format!("dc.w {opcode:#06x}");
        };
        let Some(size) = resolve_size(entry.size_kind, opcode) else {
            return format!("dc.w {opcode:#06x}");
        };

        let imm = match entry.imm_kind {
            ImmediateKind::None => None,
            ImmediateKind::Word => Some(self.fetch_word() as u32),
            ImmediateKind::UseSize => Some(if size == 4 { self.fetch_long() } else { self.fetch_word() as u32 }),
        };

        let suffix = if matches!(entry.size_kind, crate::decode::SizeKind::Unspecified) { "" } else { Self::size_suffix(size) };

        // Branch/DBcc/Scc encode a condition nibble and need their displacement
        // word fetched in program order, same as the interpreter's handler.
        if entry.mnemonic == "bcc" || entry.mnemonic == "bra" || entry.mnemonic == "bsr" {
            let cc = bits(opcode, 8, 11) as u8;
            let disp8 = bits(opcode, 0, 7) as u8;
            let target = if disp8 != 0 {
                start.wrapping_add(2).wrapping_add(sext8(disp8))
            } else {
                start.wrapping_add(2).wrapping_add(sext16(self.fetch_word()))
            };
            let name = if entry.mnemonic == "bcc" { format!("b{}", disassemble_condition(cc).to_lowercase()) } else { entry.mnemonic.to_string() };
            return format!("{name} {target:#x}");
        }
        if entry.mnemonic == "dbcc" {
            let cc = bits(opcode, 8, 11) as u8;
            let dn = bits(opcode, 0, 2);
            let disp = sext16(self.fetch_word());
            let target = start.wrapping_add(2).wrapping_add(disp);
            return format!("db{} d{dn}, {target:#x}", disassemble_condition(cc).to_lowercase());
        }
        if entry.mnemonic == "scc" {
            let cc = bits(opcode, 8, 11) as u8;
            let (mode, reg) = std_bits(opcode);
            let ea = self.format_ea(mode, reg, 1);
            return format!("s{} {ea}", disassemble_condition(cc).to_lowercase());
        }

        // Register-only forms read their operands straight out of the opcode
        // word rather than through the standard EA field.
        use crate::instructions::Handler;
        match entry.handler {
            Handler::Moveq => {
                let value = sext8(bits(opcode, 0, 7) as u8) as i32;
                return format!("moveq #{value}, d{}", bits(opcode, 9, 11));
            },
            Handler::Swap => return format!("swap d{}", bits(opcode, 0, 2)),
            Handler::Ext => return format!("ext{suffix} d{}", bits(opcode, 0, 2)),
            Handler::Exg => {
                let rx = bits(opcode, 9, 11);
                let ry = bits(opcode, 0, 2);
                let opmode = bits(opcode, 3, 7);
                return match opmode {
                    0b01000 => format!("exg d{rx}, d{ry}"),
                    0b01001 => format!("exg a{rx}, a{ry}"),
                    _ => format!("exg d{rx}, a{ry}"),
                };
            },
            Handler::Trap => return format!("trap #{}", bits(opcode, 0, 3)),
            Handler::Link => {
                let an = bits(opcode, 0, 2);
                let disp = sext16(self.fetch_word()) as i32;
                return format!("link a{an}, #{disp}");
            },
            Handler::Unlk => return format!("unlk a{}", bits(opcode, 0, 2)),
            Handler::MoveUsp => {
                let an = bits(opcode, 0, 2);
                return if bits(opcode, 3, 3) == 0 { format!("move usp, a{an}") } else { format!("move a{an}, usp") };
            },
            _ => {},
        }

        let mut operands = Vec::new();
        let ea_text = if entry.ea_mask != 0 {
            let (mode, reg) = std_bits(opcode);
            Some(self.format_ea(mode, reg, if size == 0 { 2 } else { size }))
        } else {
            None
        };

        let reg_field = bits(opcode, 9, 11);
        match entry.handler {
            // Direction bit 8 selects whether the EA or the data register is
            // the destination.
            Handler::Add | Handler::Sub | Handler::And | Handler::Or => {
                let to_ea = bits(opcode, 8, 8) != 0;
                let ea = ea_text.clone().unwrap_or_default();
                if to_ea {
                    operands.push(format!("d{reg_field}"));
                    operands.push(ea);
                } else {
                    operands.push(ea);
                    operands.push(format!("d{reg_field}"));
                }
            },
            Handler::Eor => {
                // eor only ever writes to the EA.
                operands.push(format!("d{reg_field}"));
                operands.push(ea_text.clone().unwrap_or_default());
            },
            Handler::Adda | Handler::Suba | Handler::Cmpa => {
                operands.push(ea_text.clone().unwrap_or_default());
                operands.push(format!("a{reg_field}"));
            },
            Handler::Cmp | Handler::Divu | Handler::Divs | Handler::Mulu | Handler::Muls | Handler::Chk => {
                operands.push(ea_text.clone().unwrap_or_default());
                operands.push(format!("d{reg_field}"));
            },
            Handler::Lea => {
                operands.push(ea_text.clone().unwrap_or_default());
                operands.push(format!("a{reg_field}"));
            },
            Handler::Btst | Handler::Bchg | Handler::Bclr | Handler::Bset if imm.is_none() => {
                operands.push(format!("d{reg_field}"));
                operands.push(ea_text.clone().unwrap_or_default());
            },
            _ => {
                if let Some(value) = imm {
                    operands.push(format!("#{value:#x}"));
                }
                if let Some(ea) = &ea_text {
                    operands.push(ea.clone());
                }
            },
        }

        if entry.move_style_dest {
            let (mode, reg) = move_dest_bits(opcode);
            let dest = self.format_ea(mode, reg, if size == 0 { 2 } else { size });
            operands.push(dest);
        }

        if operands.is_empty() {
            format!("{}{}", entry.mnemonic, suffix)
        } else {
            format!("{}{} {}", entry.mnemonic, suffix, operands.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SliceView(Vec<u8>);

    impl DisassemblyView for SliceView {
        fn get_word(&self, addr: u32) -> u16 {
            let a = addr as usize;
            u16::from_be_bytes([self.0[a], self.0[a + 1]])
        }
        fn get_byte(&self, addr: u32) -> u8 {
            self.0[addr as usize]
        }
    }

    fn view(words: &[u16]) -> SliceView {
        let mut bytes = Vec::new();
        for w in words { bytes.extend_from_slice(&w.to_be_bytes()); }
        SliceView(bytes)
    }

    #[test]
    fn disassembles_moveq() {
        let view = view(&[0x7001]);
        let mut dis = Disassembler::new(&view, 0);
        assert_eq!(dis.disassemble(), "moveq #1, d0");
        assert_eq!(dis.pc, 2);
    }

    #[test]
    fn disassembles_rts() {
        let view = view(&[0x4e75]);
        let mut dis = Disassembler::new(&view, 0);
        assert_eq!(dis.disassemble(), "rts");
    }

    #[test]
    fn unknown_opcode_prints_as_data_word() {
        let view = view(&[0xFFFF]);
        let mut dis = Disassembler::new(&view, 0);
        assert_eq!(dis.disassemble(), "dc.w 0xffff");
    }
}
