// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builds first-stage boot images (`BOOT.bin`) for the Zynq-7000 and Zynq
//! UltraScale+ boot ROMs.
//!
//! The two entry points, [`estimate_boot_image_size`] and
//! [`create_boot_image`], run the same pipeline: every input file is read
//! and reduced to its payload, the [`layout`] planner places all headers
//! and payloads, and only then are the [`header`] records serialized, since
//! they point at each other and at payloads placed after them.

pub mod bitstream;
pub mod config;
pub mod elf;
mod error;
pub mod header;
pub mod inspect;
pub mod layout;
pub mod payload;
pub mod profile;
pub mod uimage;

pub use config::{BifConfig, PartitionSpec};
pub use error::{BootImageError, Result};
pub use profile::Platform;

use config::Owner;
use header::{
    BootHeader, BootHeaderFields, ImageHeader, ImageHeaderTable,
    PartitionHeader, TableFields, ZYNQMP_FSBL_EXEC_ADDR,
};
use layout::{LayoutPlan, PartitionRequest};
use payload::ExtractedPayload;
use profile::{PlatformProfile, WORD};

/// A finished image.
#[derive(Debug, Clone)]
pub struct BootImage {
    pub bytes: Vec<u8>,
    pub plan: LayoutPlan,
}

impl BootImage {
    pub fn len(&self) -> u32 {
        self.plan.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Computes the length of the image [`create_boot_image`] would produce
/// for `config`, without assembling it. Input files are still read, since
/// payload sizes depend on their contents.
pub fn estimate_boot_image_size(config: &BifConfig) -> Result<u32> {
    Ok(prepare(config)?.plan.total_len)
}

pub fn create_boot_image(config: &BifConfig) -> Result<BootImage> {
    let Prepared {
        profile,
        payloads,
        plan,
    } = prepare(config)?;

    let mut out = vec![0u8; plan.total_len as usize];
    let n = config.partitions.len();

    for (i, (spec, payload)) in
        config.partitions.iter().zip(&payloads).enumerate()
    {
        let next = if i + 1 < n {
            plan.image_header(i + 1) / WORD
        } else {
            0
        };
        let (image_header, truncated) = ImageHeader::new(
            next,
            plan.partition_header(i) / WORD,
            &spec.name(),
        );
        if truncated {
            log::warn!(
                "{}: name truncated to {} bytes in image header",
                spec.name(),
                profile::IMAGE_NAME_LEN
            );
        }
        image_header.write_to(region(
            &mut out,
            plan.image_header(i),
            profile.image_header_size,
        ));

        let range = &plan.payloads[i];
        let words = payload.len() as u32 / WORD;
        PartitionHeader {
            data_word_len: words,
            total_word_len: words,
            load_addr: spec.load.or(payload.load).unwrap_or(0),
            exec_addr: spec.exec.or(payload.entry).unwrap_or(0),
            data_word_offset: range.start / WORD,
            attributes: spec.attributes.into(),
            section_count: 1,
            image_header_word_offset: plan.image_header(i) / WORD,
        }
        .write_to(region(
            &mut out,
            plan.partition_header(i),
            profile.partition_header_size,
        ));

        out[range.start as usize..range.end as usize]
            .copy_from_slice(&payload.data);
    }

    PartitionHeader::null().write_to(region(
        &mut out,
        plan.partition_header(n),
        profile.partition_header_size,
    ));

    let table_fields = TableFields {
        count: n as u32,
        partition_header_word_offset: profile.partition_header_offset / WORD,
        image_header_word_offset: if n == 0 {
            0
        } else {
            profile.image_header_offset / WORD
        },
    };
    let table = if profile.table_has_boot_device {
        ImageHeaderTable::ZynqMp {
            fields: table_fields,
            boot_device: config.boot_device.value(),
        }
    } else {
        ImageHeaderTable::Zynq(table_fields)
    };
    table.write_to(region(
        &mut out,
        profile.image_header_table_offset,
        profile.image_header_table_size,
    ));

    boot_header(config, profile, &payloads, &plan).write_to(region(
        &mut out,
        0,
        profile.boot_header_size,
    ));

    log::info!(
        "{} image: {} partition(s), {:#x} bytes",
        config.platform,
        n,
        plan.total_len
    );

    Ok(BootImage { bytes: out, plan })
}

struct Prepared {
    profile: &'static PlatformProfile,
    payloads: Vec<ExtractedPayload>,
    plan: LayoutPlan,
}

/// Reads every input and plans the layout. Nothing is serialized yet.
fn prepare(config: &BifConfig) -> Result<Prepared> {
    let profile = PlatformProfile::for_platform(config.platform);

    if let Some(p) = config.partitions.iter().find(|p| p.encrypt) {
        return Err(BootImageError::Unsupported(format!(
            "{}: encrypted partitions",
            p.name()
        )));
    }

    let mut payloads = Vec::with_capacity(config.partitions.len());
    let mut requests = Vec::with_capacity(config.partitions.len());
    for (i, spec) in config.partitions.iter().enumerate() {
        let payload = payload::load(&spec.file)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            BootImageError::Unsupported(format!(
                "{}: payload does not fit in a 32-bit image",
                spec.name()
            ))
        })?;

        if spec.attributes.owner == Owner::Fsbl {
            if i != 0 {
                log::warn!(
                    "{}: first-stage loader is partition {}; the boot ROM \
                     expects it first",
                    spec.name(),
                    i
                );
            }
            if len > profile.fsbl_max_len {
                log::warn!(
                    "{}: first-stage loader is {:#x} bytes, larger than the \
                     {:#x} the boot ROM can load",
                    spec.name(),
                    len,
                    profile.fsbl_max_len
                );
            }
        }

        requests.push(PartitionRequest {
            name: spec.name(),
            len,
            pinned: spec.offset,
        });
        payloads.push(payload);
    }

    let plan = layout::plan(profile, &requests)?;
    Ok(Prepared {
        profile,
        payloads,
        plan,
    })
}

fn boot_header(
    config: &BifConfig,
    profile: &PlatformProfile,
    payloads: &[ExtractedPayload],
    plan: &LayoutPlan,
) -> BootHeader {
    // The ROM only ever loads the first partition, and only if it belongs
    // to the first-stage loader.
    let fsbl = config
        .partitions
        .first()
        .zip(payloads.first())
        .filter(|(spec, _)| spec.attributes.owner == Owner::Fsbl);

    let fields = BootHeaderFields {
        src_offset: plan
            .payloads
            .first()
            .map(|r| r.start)
            .unwrap_or_else(|| plan.payload_base()),
        fsbl_len: fsbl.map(|(_, p)| p.len() as u32).unwrap_or(0),
        total_img_len: plan.total_len,
        image_header_table_offset: profile.image_header_table_offset,
        partition_header_table_offset: profile.partition_header_offset,
    };

    match config.platform {
        Platform::Zynq => BootHeader::Zynq(fields),
        Platform::ZynqMp => BootHeader::ZynqMp {
            fields,
            fsbl_exec_addr: fsbl
                .and_then(|(spec, p)| spec.exec.or(p.entry))
                .unwrap_or(ZYNQMP_FSBL_EXEC_ADDR),
            fsbl_cpu: config.fsbl_target_cpu.value(),
        },
    }
}

fn region(out: &mut [u8], offset: u32, size: u32) -> &mut [u8] {
    &mut out[offset as usize..(offset + size) as usize]
}
