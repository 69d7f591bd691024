// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Xilinx `.bit` files.
//!
//! A `.bit` file is a short fixed preamble followed by a handful of tagged
//! sections. Sections `a` through `d` carry the design name, part, date and
//! time, each with a 16-bit big-endian length. Section `e` is the
//! configuration data itself, with a 32-bit big-endian length, and runs to
//! the end of the file.

use std::path::Path;

use scroll::{Pread, BE};

use crate::error::{BootImageError, Result};

/// The first two words of the preamble, read little-endian.
pub const BIT_MAGIC: [u32; 2] = [0xf00f_0900, 0xf00f_f00f];

/// Offset of the first section tag.
const SECTION_START: usize = 13;
const DATA_SECTION: u8 = b'e';

/// Returns the configuration data, as words ready for the configuration
/// port. The file stores big-endian words, so every word is byte-reversed
/// on the way out.
pub fn extract(path: &Path, file_image: &[u8]) -> Result<Vec<u8>> {
    let bad = |reason: String| BootImageError::BitstreamFormat {
        path: path.to_owned(),
        reason,
    };

    let mut pos = SECTION_START;
    let offset = &mut pos;
    let data_start = loop {
        let tag: u8 = file_image.gread(offset).map_err(|_| {
            bad("no configuration data section".to_string())
        })?;

        if tag == DATA_SECTION {
            let len: u32 = file_image.gread_with(offset, BE).map_err(|_| {
                bad("truncated configuration data length".to_string())
            })?;
            let remaining = file_image.len() - *offset;
            if len as usize > remaining {
                return Err(bad(format!(
                    "configuration data claims {:#x} bytes, \
                     only {:#x} present",
                    len, remaining
                )));
            }
            break *offset;
        }

        if !(b'a'..=b'd').contains(&tag) {
            return Err(bad(format!(
                "unexpected section tag {:#04x} at {:#x}",
                tag,
                *offset - 1
            )));
        }

        let len: u16 = file_image.gread_with(offset, BE).map_err(|_| {
            bad(format!("truncated length for section '{}'", tag as char))
        })?;
        *offset += len as usize;
        if *offset > file_image.len() {
            return Err(bad(format!(
                "section '{}' runs past the end of the file",
                tag as char
            )));
        }
    };

    log::debug!(
        "{}: configuration data at {:#x}, {:#x} bytes",
        path.display(),
        data_start,
        file_image.len() - data_start
    );

    let mut data = file_image[data_start..].to_vec();
    crate::payload::pad_to_word(&mut data);
    for word in data.chunks_exact_mut(4) {
        word.reverse();
    }
    Ok(data)
}
