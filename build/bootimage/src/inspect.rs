// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reads a boot image back into its header records, checking every
//! checksum and pointer along the way.

use std::ops::Range;

use anyhow::{anyhow, bail, ensure, Context, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::header::{
    boot_header_checksum_ok, checksum, AttributeWord, BootHeader,
    BootHeaderFields, ImageHeader, ImageHeaderTable, PartitionHeader,
    TableFields, IMAGE_HEADER_LEN, IMAGE_HEADER_TABLE_WORDS, IMAGE_ID,
    IMAGE_VERSION, INTERRUPT_TABLE_DEFAULT, PARTITION_HEADER_WORDS,
    WIDTH_DETECT,
};
use crate::profile::{Platform, PlatformProfile, IMAGE_NAME_LEN};

#[derive(Debug, Clone)]
pub struct ParsedPartition {
    pub header: PartitionHeader,
    pub image_header: ImageHeader,
    /// Byte range of the payload within the image.
    pub data: Range<u32>,
}

impl ParsedPartition {
    pub fn name(&self) -> String {
        let end = self
            .image_header
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(IMAGE_NAME_LEN);
        String::from_utf8_lossy(&self.image_header.name[..end]).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct ParsedImage {
    pub boot_header: BootHeader,
    pub table: ImageHeaderTable,
    pub partitions: Vec<ParsedPartition>,
}

fn word(image: &[u8], offset: usize) -> Result<u32> {
    image
        .get(offset..offset + 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| {
            anyhow!("offset {:#x} is past the end of the image", offset)
        })
}

fn record<const N: usize>(image: &[u8], offset: usize) -> Result<[u32; N]> {
    let bytes = image.get(offset..offset + N * 4).ok_or_else(|| {
        anyhow!("record at {:#x} runs past the end of the image", offset)
    })?;
    let mut w = [0; N];
    LittleEndian::read_u32_into(bytes, &mut w);
    Ok(w)
}

pub fn parse_image(image: &[u8], platform: Platform) -> Result<ParsedImage> {
    let profile = PlatformProfile::for_platform(platform);
    ensure!(
        image.len() >= profile.boot_header_size as usize,
        "image is only {:#x} bytes",
        image.len()
    );

    for i in 0..8 {
        ensure!(
            word(image, i * 4)? == INTERRUPT_TABLE_DEFAULT,
            "unexpected interrupt table entry {}",
            i
        );
    }
    ensure!(word(image, 0x20)? == WIDTH_DETECT, "bad width detection word");
    ensure!(word(image, 0x24)? == IMAGE_ID, "bad image identification");
    ensure!(boot_header_checksum_ok(image), "bad boot header checksum");

    let fields = BootHeaderFields {
        src_offset: word(image, 0x30)?,
        fsbl_len: match platform {
            Platform::Zynq => word(image, 0x34)?,
            Platform::ZynqMp => word(image, 0x3c)?,
        },
        total_img_len: word(image, 0x40)?,
        image_header_table_offset: word(image, 0x98)?,
        partition_header_table_offset: word(image, 0x9c)?,
    };
    ensure!(
        fields.total_img_len as usize <= image.len(),
        "boot header claims {:#x} bytes, image holds {:#x}",
        fields.total_img_len,
        image.len()
    );
    let boot_header = match platform {
        Platform::Zynq => BootHeader::Zynq(fields),
        Platform::ZynqMp => BootHeader::ZynqMp {
            fields,
            fsbl_exec_addr: word(image, 0x2c)?,
            fsbl_cpu: word(image, 0x44)?,
        },
    };

    let table_offset = fields.image_header_table_offset as usize;
    let t: [u32; IMAGE_HEADER_TABLE_WORDS] = record(image, table_offset)
        .context("reading image header table")?;
    ensure!(t[0] == IMAGE_VERSION, "unknown table version {:#x}", t[0]);
    let table_fields = TableFields {
        count: t[1],
        partition_header_word_offset: t[2],
        image_header_word_offset: t[3],
    };
    let table = match platform {
        Platform::Zynq => ImageHeaderTable::Zynq(table_fields),
        Platform::ZynqMp => {
            ensure!(
                t[15] == checksum(t[..15].iter().copied()),
                "bad image header table checksum"
            );
            ImageHeaderTable::ZynqMp {
                fields: table_fields,
                boot_device: t[5],
            }
        }
    };
    ensure!(
        u64::from(table_fields.partition_header_word_offset) * 4
            == u64::from(fields.partition_header_table_offset),
        "boot header and image header table disagree on the partition \
         header table"
    );

    // Every partition needs its own image header slot, which bounds the
    // count well below anything that could overflow the offsets below.
    ensure!(
        table_fields.count <= profile.image_header_capacity(),
        "table claims {} partitions",
        table_fields.count
    );

    let mut partitions = Vec::with_capacity(table_fields.count as usize);
    let mut next_image_header = table_fields.image_header_word_offset;
    let part_words = profile.partition_header_size / 4;
    for i in 0..table_fields.count {
        let part_word =
            table_fields.partition_header_word_offset + i * part_words;
        let header = parse_partition_header(image, part_word)
            .with_context(|| format!("partition {}", i))?;

        ensure!(
            header.image_header_word_offset == next_image_header,
            "partition {}: image header chain is broken",
            i
        );
        let image_header = parse_image_header(image, next_image_header)
            .with_context(|| format!("partition {}", i))?;
        ensure!(
            image_header.partition_header_word_offset == part_word,
            "partition {}: image header points at the wrong partition header",
            i
        );
        next_image_header = image_header.next_word_offset;

        let start = u64::from(header.data_word_offset) * 4;
        let end = start + u64::from(header.data_word_len) * 4;
        ensure!(
            end <= image.len() as u64,
            "partition {}: data {:#x}..{:#x} is past the end of the image",
            i,
            start,
            end
        );

        partitions.push(ParsedPartition {
            header,
            image_header,
            data: start as u32..end as u32,
        });
    }
    ensure!(next_image_header == 0, "image header chain is not terminated");

    let terminator = table_fields.partition_header_word_offset
        + table_fields.count * part_words;
    let null = parse_partition_header(image, terminator)
        .context("partition header table terminator")?;
    if null != PartitionHeader::null() {
        bail!("partition header table is not terminated");
    }

    Ok(ParsedImage {
        boot_header,
        table,
        partitions,
    })
}

fn parse_partition_header(
    image: &[u8],
    word_offset: u32,
) -> Result<PartitionHeader> {
    let w: [u32; PARTITION_HEADER_WORDS] =
        record(image, word_offset as usize * 4)?;
    ensure!(
        w[15] == checksum(w[..15].iter().copied()),
        "bad partition header checksum at {:#x}",
        word_offset * 4
    );
    ensure!(
        w[0] == w[1],
        "encrypted partition at {:#x} is not supported",
        word_offset * 4
    );
    Ok(PartitionHeader {
        data_word_len: w[0],
        total_word_len: w[2],
        load_addr: w[3],
        exec_addr: w[4],
        data_word_offset: w[5],
        attributes: AttributeWord(w[6]),
        section_count: w[7],
        image_header_word_offset: w[9],
    })
}

fn parse_image_header(image: &[u8], word_offset: u32) -> Result<ImageHeader> {
    let offset = word_offset as usize * 4;
    let bytes =
        image.get(offset..offset + IMAGE_HEADER_LEN).ok_or_else(|| {
            anyhow!("image header at {:#x} is past the end", offset)
        })?;
    let mut name = [0; IMAGE_NAME_LEN];
    name.copy_from_slice(&bytes[16..IMAGE_HEADER_LEN]);
    Ok(ImageHeader {
        next_word_offset: LittleEndian::read_u32(&bytes[0..]),
        partition_header_word_offset: LittleEndian::read_u32(&bytes[4..]),
        name,
    })
}
