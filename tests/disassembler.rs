// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spot checks that the disassembler's mnemonic output matches what the
//! interpreter itself decoded for the same bytes.

use m68k_core::disassembler::{Disassembler, DisassemblyView};

struct SliceView(Vec<u8>);

impl SliceView {
    fn from_words(words: &[u16]) -> Self {
        let mut bytes = Vec::new();
        for w in words {
            bytes.extend_from_slice(&w.to_be_bytes());
        }
        SliceView(bytes)
    }
}

impl DisassemblyView for SliceView {
    fn get_word(&self, addr: u32) -> u16 {
        let a = addr as usize;
        u16::from_be_bytes([self.0[a], self.0[a + 1]])
    }
    fn get_byte(&self, addr: u32) -> u8 {
        self.0[addr as usize]
    }
}

#[test]
fn moveq_disassembles_with_sign_extended_immediate() {
    let view = SliceView::from_words(&[0x70ff]); // moveq #-1, d0
    let mut dis = Disassembler::new(&view, 0);
    assert_eq!(dis.disassemble(), "moveq #-1, d0");
}

#[test]
fn add_word_register_direct_form() {
    let view = SliceView::from_words(&[0xd041]); // add.w d1, d0
    let mut dis = Disassembler::new(&view, 0);
    assert_eq!(dis.disassemble(), "add.w d1, d0");
}

#[test]
fn bne_resolves_branch_target() {
    let view = SliceView::from_words(&[0x6632]);
    let mut dis = Disassembler::new(&view, 0x000c);
    assert_eq!(dis.disassemble(), "bne 0x40");
}

#[test]
fn pc_advances_past_extension_words() {
    let view = SliceView::from_words(&[0x0cb8, 0x4845, 0x4c50, 0x0000]);
    let mut dis = Disassembler::new(&view, 0);
    dis.disassemble();
    assert_eq!(dis.pc, 8);
}
