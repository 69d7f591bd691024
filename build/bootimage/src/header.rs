// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The binary records the boot ROM parses, serialized field by field as
//! little-endian words.
//!
//! Records whose shape differs between platforms are enums with one
//! variant per platform rather than a single struct with overlapping
//! fields.

use bitfield::bitfield;
use byteorder::{ByteOrder, LittleEndian};

use crate::config::PartitionAttributes;
use crate::profile::IMAGE_NAME_LEN;

pub const INTERRUPT_TABLE_DEFAULT: u32 = 0xeaff_fffe;
pub const WIDTH_DETECT: u32 = 0xaa99_5566;
/// "XNLX", as stored.
pub const IMAGE_ID: u32 = u32::from_le_bytes(*b"XNLX");
pub const ENCRYPTION_NONE: u32 = 0;
pub const ZYNQ_USER_DEFINED_0: u32 = 0x0101_0000;
/// Documented as reserved and zero, but `bootgen` writes 1.
pub const ZYNQ_RESERVED_1: u32 = 0x0000_0001;
pub const ZYNQMP_FSBL_EXEC_ADDR: u32 = 0xfffc_0000;
pub const IMAGE_VERSION: u32 = 0x0102_0000;

/// Register init pairs are (address, value); this address ends the table.
const REG_INIT_END: u32 = 0xffff_ffff;
const REG_INIT_WORDS: usize = 512;

pub const BOOT_HEADER_CHECKSUM: usize = 0x48;
const BOOT_HEADER_CHECKED: std::ops::Range<usize> = 0x20..0x48;
const IMAGE_HEADER_TABLE_OFFSET_WORD: usize = 0x98;
const PARTITION_HEADER_TABLE_OFFSET_WORD: usize = 0x9c;
const ZYNQ_REG_INIT: usize = 0xa0;
const ZYNQMP_REG_INIT: usize = 0xb8;

pub const IMAGE_HEADER_TABLE_WORDS: usize = 16;
pub const PARTITION_HEADER_WORDS: usize = 16;
/// Fields of an image header; the slot it lives in is padded out further.
pub const IMAGE_HEADER_LEN: usize = 16 + IMAGE_NAME_LEN;

/// The ROM's checksum: complement of the wrapping sum of the covered words.
pub fn checksum(words: impl IntoIterator<Item = u32>) -> u32 {
    !words.into_iter().fold(0u32, |acc, w| acc.wrapping_add(w))
}

fn put(out: &mut [u8], byte_offset: usize, value: u32) {
    LittleEndian::write_u32(&mut out[byte_offset..byte_offset + 4], value);
}

fn words(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes.chunks_exact(4).map(LittleEndian::read_u32)
}

/// Boot header fields common to both platforms. Offsets are in bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BootHeaderFields {
    /// Where the ROM finds the first-stage loader.
    pub src_offset: u32,
    /// Length of the first-stage loader.
    pub fsbl_len: u32,
    pub total_img_len: u32,
    pub image_header_table_offset: u32,
    pub partition_header_table_offset: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BootHeader {
    Zynq(BootHeaderFields),
    ZynqMp {
        fields: BootHeaderFields,
        fsbl_exec_addr: u32,
        fsbl_cpu: u32,
    },
}

impl BootHeader {
    pub fn fields(&self) -> &BootHeaderFields {
        match self {
            BootHeader::Zynq(f) => f,
            BootHeader::ZynqMp { fields, .. } => fields,
        }
    }

    /// Writes the header into `out`, which must be the whole boot header
    /// region.
    pub fn write_to(&self, out: &mut [u8]) {
        out.fill(0);

        for i in 0..8 {
            put(out, i * 4, INTERRUPT_TABLE_DEFAULT);
        }
        put(out, 0x20, WIDTH_DETECT);
        put(out, 0x24, IMAGE_ID);
        put(out, 0x28, ENCRYPTION_NONE);

        let f = self.fields();
        put(out, 0x30, f.src_offset);
        put(out, 0x34, 0);
        put(out, 0x38, 0);
        put(out, 0x40, f.total_img_len);
        put(out, IMAGE_HEADER_TABLE_OFFSET_WORD, f.image_header_table_offset);
        put(
            out,
            PARTITION_HEADER_TABLE_OFFSET_WORD,
            f.partition_header_table_offset,
        );

        let reg_init = match *self {
            BootHeader::Zynq(f) => {
                put(out, 0x2c, ZYNQ_USER_DEFINED_0);
                put(out, 0x34, f.fsbl_len);
                put(out, 0x3c, 0);
                put(out, 0x44, ZYNQ_RESERVED_1);
                ZYNQ_REG_INIT
            }
            BootHeader::ZynqMp {
                fields,
                fsbl_exec_addr,
                fsbl_cpu,
            } => {
                // 0x34 and 0x38 describe a PMU firmware image, which we
                // never include.
                put(out, 0x2c, fsbl_exec_addr);
                put(out, 0x3c, fields.fsbl_len);
                put(out, 0x44, fsbl_cpu);
                ZYNQMP_REG_INIT
            }
        };

        // An empty register init table: every address is the end marker.
        for pair in 0..REG_INIT_WORDS / 2 {
            put(out, reg_init + pair * 8, REG_INIT_END);
            put(out, reg_init + pair * 8 + 4, 0);
        }

        let sum = checksum(words(&out[BOOT_HEADER_CHECKED]));
        put(out, BOOT_HEADER_CHECKSUM, sum);
    }
}

/// Verifies a serialized boot header's checksum.
pub fn boot_header_checksum_ok(bytes: &[u8]) -> bool {
    checksum(words(&bytes[BOOT_HEADER_CHECKED]))
        == LittleEndian::read_u32(&bytes[BOOT_HEADER_CHECKSUM..])
}

/// Image header table fields. Offsets are word offsets from the start of
/// the image.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TableFields {
    pub count: u32,
    pub partition_header_word_offset: u32,
    /// Zero when there are no image headers.
    pub image_header_word_offset: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageHeaderTable {
    Zynq(TableFields),
    /// ZynqMP adds a boot device word and a checksum over the whole table.
    ZynqMp { fields: TableFields, boot_device: u32 },
}

impl ImageHeaderTable {
    pub fn fields(&self) -> &TableFields {
        match self {
            ImageHeaderTable::Zynq(f) => f,
            ImageHeaderTable::ZynqMp { fields, .. } => fields,
        }
    }

    pub fn words(&self) -> [u32; IMAGE_HEADER_TABLE_WORDS] {
        let f = self.fields();
        let mut w = [0; IMAGE_HEADER_TABLE_WORDS];
        w[0] = IMAGE_VERSION;
        w[1] = f.count;
        w[2] = f.partition_header_word_offset;
        w[3] = f.image_header_word_offset;
        // w[4] is the authentication header offset
        if let ImageHeaderTable::ZynqMp { boot_device, .. } = *self {
            w[5] = boot_device;
            w[15] = checksum(w[..15].iter().copied());
        }
        w
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u32_into(&self.words(), &mut out[..64]);
    }
}

bitfield! {
    /// The partition header's attribute word.
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct AttributeWord(u32);
    impl Debug;
    pub dest_device, set_dest_device: 6, 4;
    pub rsa_used, set_rsa_used: 15;
    pub owner, set_owner: 17, 16;
}

impl From<PartitionAttributes> for AttributeWord {
    fn from(attrs: PartitionAttributes) -> Self {
        let mut w = AttributeWord(0);
        w.set_owner(attrs.owner.bits());
        w.set_rsa_used(attrs.rsa_used);
        w.set_dest_device(attrs.destination.bits());
        w
    }
}

/// Offsets and lengths are in words.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionHeader {
    /// Length as stored in the image, which is also the unencrypted length
    /// since encryption is not supported.
    pub data_word_len: u32,
    pub total_word_len: u32,
    pub load_addr: u32,
    pub exec_addr: u32,
    pub data_word_offset: u32,
    pub attributes: AttributeWord,
    pub section_count: u32,
    pub image_header_word_offset: u32,
}

impl PartitionHeader {
    /// The all-zero record that ends the partition header table.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn words(&self) -> [u32; PARTITION_HEADER_WORDS] {
        let mut w = [0; PARTITION_HEADER_WORDS];
        w[0] = self.data_word_len;
        w[1] = self.data_word_len;
        w[2] = self.total_word_len;
        w[3] = self.load_addr;
        w[4] = self.exec_addr;
        w[5] = self.data_word_offset;
        w[6] = self.attributes.0;
        w[7] = self.section_count;
        // w[8] checksum offset, w[9] image header, w[10] certificate,
        // w[11..15] reserved
        w[9] = self.image_header_word_offset;
        w[15] = checksum(w[..15].iter().copied());
        w
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u32_into(&self.words(), &mut out[..64]);
    }
}

/// Offsets are in words.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageHeader {
    /// Zero on the last image header.
    pub next_word_offset: u32,
    pub partition_header_word_offset: u32,
    pub name: [u8; IMAGE_NAME_LEN],
}

impl ImageHeader {
    /// `bootgen` always writes a partition count of zero here.
    pub const PARTITION_COUNT: u32 = 0;
    /// Documented as the partition count; `bootgen` always writes 1.
    pub const NAME_LEN_FIELD: u32 = 1;

    /// Copies as much of `name` as fits, padding with NULs. Returns the
    /// header and whether the name was truncated.
    pub fn new(
        next_word_offset: u32,
        partition_header_word_offset: u32,
        name: &str,
    ) -> (Self, bool) {
        let mut buf = [0; IMAGE_NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(IMAGE_NAME_LEN);
        buf[..n].copy_from_slice(&bytes[..n]);
        (
            ImageHeader {
                next_word_offset,
                partition_header_word_offset,
                name: buf,
            },
            bytes.len() > IMAGE_NAME_LEN,
        )
    }

    pub fn write_to(&self, out: &mut [u8]) {
        LittleEndian::write_u32_into(
            &[
                self.next_word_offset,
                self.partition_header_word_offset,
                Self::PARTITION_COUNT,
                Self::NAME_LEN_FIELD,
            ],
            &mut out[..16],
        );
        out[16..IMAGE_HEADER_LEN].copy_from_slice(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DestinationDevice, Owner};

    #[test]
    fn checksum_is_complemented_sum() {
        assert_eq!(checksum([]), 0xffff_ffff);
        assert_eq!(checksum([1, 2, 3]), !6);
        assert_eq!(checksum([0xffff_ffff, 2]), !1);
    }

    #[test]
    fn attribute_bits() {
        let w = AttributeWord::from(PartitionAttributes {
            owner: Owner::Bootloader,
            destination: DestinationDevice::Pl,
            rsa_used: true,
        });
        assert_eq!(w.0, (1 << 16) | (1 << 15) | (2 << 4));

        let w = AttributeWord::from(PartitionAttributes {
            owner: Owner::Fsbl,
            destination: DestinationDevice::Interconnect,
            rsa_used: false,
        });
        assert_eq!(w.0, 3 << 4);
    }

    #[test]
    fn null_partition_header() {
        let w = PartitionHeader::null().words();
        assert!(w[..15].iter().all(|&w| w == 0));
        assert_eq!(w[15], 0xffff_ffff);
    }

    #[test]
    fn partition_header_closes() {
        let h = PartitionHeader {
            data_word_len: 0x40,
            total_word_len: 0x40,
            load_addr: 0x10_0000,
            exec_addr: 0x10_0000,
            data_word_offset: 0x1700 / 4,
            attributes: AttributeWord(0x10),
            section_count: 1,
            image_header_word_offset: 0x900 / 4,
        };
        let w = h.words();
        assert_eq!(w[1], w[0]);
        assert_eq!(w[9], 0x240);
        let sum = w.iter().fold(0u32, |a, &w| a.wrapping_add(w));
        assert_eq!(sum, 0xffff_ffff);
    }

    #[test]
    fn zynq_table_has_no_checksum() {
        let t = ImageHeaderTable::Zynq(TableFields {
            count: 2,
            partition_header_word_offset: 0xc80 / 4,
            image_header_word_offset: 0x900 / 4,
        });
        let w = t.words();
        assert_eq!(&w[..5], &[IMAGE_VERSION, 2, 0x320, 0x240, 0]);
        assert!(w[5..].iter().all(|&w| w == 0));
    }

    #[test]
    fn zynqmp_table_checksum() {
        let t = ImageHeaderTable::ZynqMp {
            fields: TableFields {
                count: 1,
                partition_header_word_offset: 0xa00 / 4,
                image_header_word_offset: 0x900 / 4,
            },
            boot_device: 3,
        };
        let w = t.words();
        assert_eq!(w[5], 3);
        assert_eq!(w[15], checksum(w[..15].iter().copied()));
    }

    #[test]
    fn boot_header_words() {
        let mut out = vec![0xa5; 0x8c0];
        BootHeader::Zynq(BootHeaderFields {
            src_offset: 0xd40,
            fsbl_len: 0x100,
            total_img_len: 0xe80,
            image_header_table_offset: 0x8c0,
            partition_header_table_offset: 0xc80,
        })
        .write_to(&mut out);

        let word = |o: usize| LittleEndian::read_u32(&out[o..]);
        assert_eq!(word(0x00), INTERRUPT_TABLE_DEFAULT);
        assert_eq!(word(0x1c), INTERRUPT_TABLE_DEFAULT);
        assert_eq!(word(0x20), WIDTH_DETECT);
        assert_eq!(&out[0x24..0x28], b"XNLX");
        assert_eq!(word(0x2c), ZYNQ_USER_DEFINED_0);
        assert_eq!(word(0x30), 0xd40);
        assert_eq!(word(0x34), 0x100);
        assert_eq!(word(0x40), 0xe80);
        assert_eq!(word(0x44), ZYNQ_RESERVED_1);
        assert_eq!(word(0x98), 0x8c0);
        assert_eq!(word(0x9c), 0xc80);
        assert_eq!(word(0xa0), REG_INIT_END);
        assert_eq!(word(0xa4), 0);
        assert_eq!(word(0x89c), 0);
        assert_eq!(word(0x898), REG_INIT_END);
        assert!(out[0x8a0..].iter().all(|&b| b == 0));
        assert!(boot_header_checksum_ok(&out));

        out[0x30] ^= 1;
        assert!(!boot_header_checksum_ok(&out));
    }

    #[test]
    fn zynqmp_boot_header_words() {
        let mut out = vec![0; 0x8c0];
        BootHeader::ZynqMp {
            fields: BootHeaderFields {
                src_offset: 0xac0,
                fsbl_len: 0x200,
                total_img_len: 0xd00,
                image_header_table_offset: 0x8c0,
                partition_header_table_offset: 0xa00,
            },
            fsbl_exec_addr: ZYNQMP_FSBL_EXEC_ADDR,
            fsbl_cpu: 0x800,
        }
        .write_to(&mut out);

        let word = |o: usize| LittleEndian::read_u32(&out[o..]);
        assert_eq!(word(0x2c), ZYNQMP_FSBL_EXEC_ADDR);
        assert_eq!(word(0x34), 0);
        assert_eq!(word(0x3c), 0x200);
        assert_eq!(word(0x44), 0x800);
        assert_eq!(word(0xa0), 0);
        assert_eq!(word(0xb8), REG_INIT_END);
        assert_eq!(word(0x8b0), REG_INIT_END);
        assert_eq!(word(0x8b4), 0);
        assert_eq!(word(0x8b8), 0);
        assert!(boot_header_checksum_ok(&out));
    }

    #[test]
    fn image_header_name() {
        let (h, truncated) = ImageHeader::new(0, 0x320, "fsbl.elf");
        assert!(!truncated);
        let mut out = [0xff; 64];
        h.write_to(&mut out);
        assert_eq!(LittleEndian::read_u32(&out[4..]), 0x320);
        assert_eq!(LittleEndian::read_u32(&out[8..]), 0);
        assert_eq!(LittleEndian::read_u32(&out[12..]), 1);
        assert_eq!(&out[16..24], b"fsbl.elf");
        assert!(out[24..48].iter().all(|&b| b == 0));

        let long = "a".repeat(40);
        let (h, truncated) = ImageHeader::new(0, 0, &long);
        assert!(truncated);
        assert_eq!(h.name, [b'a'; IMAGE_NAME_LEN]);
    }
}
