// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Input files for the image tests, built in memory.

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

const PT_LOAD: u32 = 1;

/// Little-endian ELF32 executable with one PT_LOAD per `(paddr, data)`.
pub fn elf32(entry: u32, segs: &[(u32, &[u8])]) -> Vec<u8> {
    const EHSIZE: u32 = 52;
    const PHENTSIZE: u32 = 32;

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&40u16.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&entry.to_le_bytes());
    out.extend_from_slice(&EHSIZE.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(EHSIZE as u16).to_le_bytes());
    out.extend_from_slice(&(PHENTSIZE as u16).to_le_bytes());
    out.extend_from_slice(&(segs.len() as u16).to_le_bytes());
    out.extend_from_slice(&40u16.to_le_bytes());
    out.extend_from_slice(&[0; 4]);

    let mut offset = EHSIZE + PHENTSIZE * segs.len() as u32;
    for (paddr, data) in segs {
        let len = data.len() as u32;
        for w in [PT_LOAD, offset, *paddr, *paddr, len, len, 5, 4] {
            out.extend_from_slice(&w.to_le_bytes());
        }
        offset += len;
    }
    for (_, data) in segs {
        out.extend_from_slice(data);
    }
    out
}

/// A `.bit` file whose configuration section holds `data`.
pub fn bitfile(data: &[u8]) -> Vec<u8> {
    let mut out = vec![
        0x00, 0x09, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x0f, 0xf0, 0x00, 0x00,
        0x01,
    ];
    for (tag, text) in [
        (b'a', &b"system_wrapper;UserID=0XFFFFFFFF\0"[..]),
        (b'b', &b"7z010clg400\0"[..]),
        (b'c', &b"2024/01/01\0"[..]),
        (b'd', &b"12:00:00\0"[..]),
    ] {
        out.push(tag);
        out.extend_from_slice(&(text.len() as u16).to_be_bytes());
        out.extend_from_slice(text);
    }
    out.push(b'e');
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// A legacy U-Boot kernel image loading at `load` and entering at `ep`.
pub fn uimage(load: u32, ep: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for w in [0x2705_1956u32, 0, 0, data.len() as u32, load, ep, 0] {
        out.extend_from_slice(&w.to_be_bytes());
    }
    out.extend_from_slice(&[5, 2, bootimage::uimage::TYPE_KERNEL, 0]);
    out.extend_from_slice(&[0; 32]);
    let crc = bootimage::uimage::header_crc(&out);
    out[4..8].copy_from_slice(&crc.to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// A scratch directory that input files are written into.
pub struct Inputs {
    pub dir: TempDir,
}

impl Inputs {
    pub fn new() -> Self {
        Inputs {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}
