// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use goblin::elf::program_header::PT_LOAD;

use crate::error::{BootImageError, Result};

pub const ELF_MAGIC: u32 = 0x464c_457f;

#[derive(Debug)]
pub struct ElfPayload {
    pub data: Vec<u8>,
    /// Physical address of the first loadable segment, if there is one.
    pub load: Option<u32>,
    pub entry: u32,
}

/// Concatenates the file contents of every `PT_LOAD` segment, in program
/// header order. Only `p_filesz` bytes are taken from each segment; the
/// zero-filled tail up to `p_memsz` is the loader's job.
pub fn extract(path: &Path, file_image: &[u8]) -> Result<ElfPayload> {
    let bad = |reason: String| BootImageError::ElfFormat {
        path: path.to_owned(),
        reason,
    };

    let elf = goblin::elf::Elf::parse(file_image)
        .map_err(|e| bad(e.to_string()))?;

    let mut data = Vec::new();
    let mut load = None;

    for (i, phdr) in elf.program_headers.iter().enumerate() {
        if phdr.p_type != PT_LOAD {
            continue;
        }
        let offset = phdr.p_offset as usize;
        let size = phdr.p_filesz as usize;
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= file_image.len())
            .ok_or_else(|| {
                bad(format!(
                    "segment {} ({:#x} bytes at {:#x}) runs past the end \
                     of the file ({:#x} bytes)",
                    i,
                    size,
                    offset,
                    file_image.len()
                ))
            })?;

        // Note that we are using Physical, i.e. LOADADDR, rather than virtual.
        if load.is_none() {
            load = Some(narrow(phdr.p_paddr, "load address")?);
        }

        log::debug!(
            "{}: segment {} at {:#x}, {:#x} bytes",
            path.display(),
            i,
            phdr.p_paddr,
            size
        );
        data.extend_from_slice(&file_image[offset..end]);
    }

    Ok(ElfPayload {
        data,
        load,
        entry: narrow(elf.header.e_entry, "entry point")?,
    })
}

/// The partition header only has room for 32-bit addresses.
fn narrow(addr: u64, what: &str) -> Result<u32> {
    u32::try_from(addr).map_err(|_| {
        BootImageError::Unsupported(format!(
            "{} {:#x} does not fit in 32 bits",
            what, addr
        ))
    })
}
