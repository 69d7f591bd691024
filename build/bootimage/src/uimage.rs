// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! U-Boot legacy images (`uImage`), as produced by `mkimage`.

use std::path::Path;

use scroll::{Pread, BE};

use crate::error::{BootImageError, Result};

/// `IH_MAGIC` as it appears when the first word is read little-endian.
pub const UIMAGE_MAGIC: u32 = 0x5619_0527;

pub const HEADER_LEN: usize = 64;
const NAME_LEN: usize = 32;
const HCRC_OFFSET: usize = 4;

pub const TYPE_KERNEL: u8 = 2;
pub const TYPE_RAMDISK: u8 = 3;

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// The legacy image header. All multi-byte fields are big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UImageHeader {
    pub magic: u32,
    pub hcrc: u32,
    pub time: u32,
    pub size: u32,
    pub load: u32,
    pub ep: u32,
    pub dcrc: u32,
    pub os: u8,
    pub arch: u8,
    pub image_type: u8,
    pub comp: u8,
    pub name: [u8; NAME_LEN],
}

impl scroll::ctx::TryFromCtx<'_, scroll::Endian> for UImageHeader {
    type Error = scroll::Error;

    fn try_from_ctx(
        src: &[u8],
        endian: scroll::Endian,
    ) -> std::result::Result<(Self, usize), Self::Error> {
        let offset = &mut 0;
        let magic = src.gread_with(offset, endian)?;
        let hcrc = src.gread_with(offset, endian)?;
        let time = src.gread_with(offset, endian)?;
        let size = src.gread_with(offset, endian)?;
        let load = src.gread_with(offset, endian)?;
        let ep = src.gread_with(offset, endian)?;
        let dcrc = src.gread_with(offset, endian)?;
        let os = src.gread(offset)?;
        let arch = src.gread(offset)?;
        let image_type = src.gread(offset)?;
        let comp = src.gread(offset)?;
        let raw_name: &[u8] = src.gread_with(offset, NAME_LEN)?;
        let mut name = [0; NAME_LEN];
        name.copy_from_slice(raw_name);

        Ok((
            Self {
                magic,
                hcrc,
                time,
                size,
                load,
                ep,
                dcrc,
                os,
                arch,
                image_type,
                comp,
                name,
            },
            *offset,
        ))
    }
}

impl UImageHeader {
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// CRC of a raw header, computed with the header CRC field zeroed.
pub fn header_crc(raw: &[u8]) -> u32 {
    let mut copy = [0u8; HEADER_LEN];
    copy.copy_from_slice(&raw[..HEADER_LEN]);
    copy[HCRC_OFFSET..HCRC_OFFSET + 4].fill(0);
    CRC32.checksum(&copy)
}

#[derive(Debug)]
pub struct UImagePayload {
    pub header: UImageHeader,
    pub data: Vec<u8>,
}

/// Validates the header and returns everything after it.
///
/// The header's declared data size has to account for the rest of the file
/// exactly; a short or over-long file is rejected rather than truncated or
/// padded.
pub fn extract(path: &Path, file_image: &[u8]) -> Result<UImagePayload> {
    let bad = |reason: String| {
        BootImageError::Unsupported(format!(
            "{}: malformed Linux image: {}",
            path.display(),
            reason
        ))
    };

    let header: UImageHeader = file_image
        .pread_with(0, BE)
        .map_err(|_| bad("truncated header".to_string()))?;

    let crc = header_crc(file_image);
    if crc != header.hcrc {
        return Err(bad(format!(
            "header CRC is {:#010x}, expected {:#010x}",
            header.hcrc, crc
        )));
    }

    let data_len = file_image.len() - HEADER_LEN;
    if header.size as usize != data_len {
        return Err(bad(format!(
            "header declares {:#x} bytes of data, file holds {:#x}",
            header.size, data_len
        )));
    }

    log::debug!(
        "{}: uImage '{}' type {} load {:#x} entry {:#x}",
        path.display(),
        header.name(),
        header.image_type,
        header.load,
        header.ep
    );

    Ok(UImagePayload {
        data: file_image[HEADER_LEN..].to_vec(),
        header,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uimage(data: &[u8], declared: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for w in [0x2705_1956u32, 0, 0, declared, 0x8000, 0x8040, 0] {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out.extend_from_slice(&[5, 2, TYPE_KERNEL, 0]);
        let mut name = [0u8; NAME_LEN];
        name[..5].copy_from_slice(b"Linux");
        out.extend_from_slice(&name);
        let crc = header_crc(&out);
        out[4..8].copy_from_slice(&crc.to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn magic_is_byte_swapped_ih_magic() {
        assert_eq!(UIMAGE_MAGIC, 0x2705_1956u32.swap_bytes());
    }

    #[test]
    fn strips_header() {
        let image = uimage(&[1, 2, 3, 4, 5], 5);
        let p = extract(Path::new("uImage"), &image).unwrap();
        assert_eq!(p.data, vec![1, 2, 3, 4, 5]);
        assert_eq!(p.header.load, 0x8000);
        assert_eq!(p.header.ep, 0x8040);
        assert_eq!(p.header.image_type, TYPE_KERNEL);
        assert_eq!(p.header.name(), "Linux");
    }

    #[test]
    fn rejects_bad_crc() {
        let mut image = uimage(&[0; 4], 4);
        image[8] ^= 0xff;
        let err = extract(Path::new("uImage"), &image).unwrap_err();
        assert!(err.to_string().contains("CRC"), "{err}");
        assert_eq!(err.code(), 5);
    }

    #[test]
    fn rejects_size_mismatch() {
        let image = uimage(&[0; 8], 4);
        assert!(extract(Path::new("uImage"), &image).is_err());
        let image = uimage(&[0; 4], 8);
        assert!(extract(Path::new("uImage"), &image).is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        let image = uimage(&[], 0);
        assert!(extract(Path::new("uImage"), &image[..40]).is_err());
    }
}
