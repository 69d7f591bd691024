// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Works out what an input file is and which of its bytes go into the
//! image.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::bitstream::{self, BIT_MAGIC};
use crate::elf::{self, ELF_MAGIC};
use crate::error::{BootImageError, Result};
use crate::uimage::{self, UIMAGE_MAGIC};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Elf,
    Bitstream,
    /// U-Boot legacy image, carrying the header's image type.
    LinuxImage { image_type: u8 },
    Raw,
}

#[derive(Debug)]
pub struct ExtractedPayload {
    pub kind: PayloadKind,
    /// Always a whole number of words.
    pub data: Vec<u8>,
    /// Load address carried by the input format, if any.
    pub load: Option<u32>,
    /// Entry point carried by the input format, if any.
    pub entry: Option<u32>,
}

impl ExtractedPayload {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sniffs the leading words of `file_image`.
pub fn classify(file_image: &[u8]) -> PayloadKind {
    let word = |i: usize| {
        file_image
            .get(i * 4..i * 4 + 4)
            .map(LittleEndian::read_u32)
    };

    match (word(0), word(1)) {
        (Some(ELF_MAGIC), _) => PayloadKind::Elf,
        (Some(w0), Some(w1)) if [w0, w1] == BIT_MAGIC => PayloadKind::Bitstream,
        (Some(UIMAGE_MAGIC), _) => PayloadKind::LinuxImage {
            image_type: file_image.get(30).copied().unwrap_or(0),
        },
        _ => PayloadKind::Raw,
    }
}

/// Reads `path` and extracts its payload. The file is closed again before
/// this returns.
pub fn load(path: &Path) -> Result<ExtractedPayload> {
    let file_image =
        std::fs::read(path).map_err(|source| BootImageError::NoFile {
            path: path.to_owned(),
            source,
        })?;
    extract(path, &file_image)
}

/// Extracts the payload from an in-memory file image. `path` is only used
/// for diagnostics.
pub fn extract(path: &Path, file_image: &[u8]) -> Result<ExtractedPayload> {
    let kind = classify(file_image);
    log::debug!("{}: classified as {:?}", path.display(), kind);

    let mut payload = match kind {
        PayloadKind::Elf => {
            let elf = elf::extract(path, file_image)?;
            ExtractedPayload {
                kind,
                data: elf.data,
                load: elf.load,
                entry: Some(elf.entry),
            }
        }
        PayloadKind::Bitstream => ExtractedPayload {
            kind,
            data: bitstream::extract(path, file_image)?,
            load: None,
            entry: None,
        },
        PayloadKind::LinuxImage { .. } => {
            let img = uimage::extract(path, file_image)?;
            ExtractedPayload {
                kind,
                data: img.data,
                load: Some(img.header.load),
                entry: Some(img.header.ep),
            }
        }
        PayloadKind::Raw => ExtractedPayload {
            kind,
            data: file_image.to_vec(),
            load: None,
            entry: None,
        },
    };

    pad_to_word(&mut payload.data);
    Ok(payload)
}

/// Appends zero bytes until `data` is a whole number of words.
pub fn pad_to_word(data: &mut Vec<u8>) {
    let rem = data.len() % 4;
    if rem != 0 {
        data.resize(data.len() + 4 - rem, 0);
    }
}
