// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assigns every header and payload a byte range in the output image.
//!
//! The fixed header regions come straight from the [`PlatformProfile`]:
//!
//! ```text
//! 0x000                      boot header
//! image_header_table_offset  image header table
//! image_header_offset        N image headers
//! partition_header_offset    N partition headers + 1 null terminator
//! ```
//!
//! Payloads are then appended in configuration order, each starting on a
//! word boundary, unless a partition pins its payload at a fixed offset.
//! Pinned payloads are checked against everything else after the fact, as
//! are the fixed regions themselves (too many partitions will run the image
//! header array into the partition header table).

use std::ops::Range;

use crate::error::{BootImageError, Result};
use crate::profile::{align_up, PlatformProfile, WORD};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionKind {
    BootHeader,
    ImageHeaderTable,
    ImageHeaders,
    PartitionHeaders,
    /// Payload of the partition at this index in the configuration.
    Payload(usize),
    Padding,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub name: String,
    pub range: Range<u32>,
}

/// What the planner needs to know about one partition.
#[derive(Clone, Debug)]
pub struct PartitionRequest {
    pub name: String,
    /// Payload length in bytes; must already be word aligned.
    pub len: u32,
    pub pinned: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct LayoutPlan {
    /// Every region of the image, padding included, ordered by offset. The
    /// ranges tile `0..total_len` exactly (empty payloads aside).
    pub regions: Vec<Region>,
    /// Payload ranges in configuration order.
    pub payloads: Vec<Range<u32>>,
    pub image_header_offset: u32,
    pub image_header_size: u32,
    pub partition_header_offset: u32,
    pub partition_header_size: u32,
    pub total_len: u32,
}

impl LayoutPlan {
    pub fn image_header(&self, i: usize) -> u32 {
        self.image_header_offset + i as u32 * self.image_header_size
    }

    pub fn partition_header(&self, i: usize) -> u32 {
        self.partition_header_offset + i as u32 * self.partition_header_size
    }

    /// Offset at which the first appended payload would land.
    pub fn payload_base(&self) -> u32 {
        self.regions
            .iter()
            .find(|r| r.kind == RegionKind::PartitionHeaders)
            .map(|r| r.range.end)
            .unwrap_or(self.partition_header_offset)
    }
}

fn too_big() -> BootImageError {
    BootImageError::Unsupported("image exceeds the 32-bit address space".into())
}

fn array(base: u32, count: u32, size: u32) -> Result<Range<u32>> {
    let len = count.checked_mul(size).ok_or_else(too_big)?;
    let end = base.checked_add(len).ok_or_else(too_big)?;
    Ok(base..end)
}

pub fn plan(
    profile: &PlatformProfile,
    parts: &[PartitionRequest],
) -> Result<LayoutPlan> {
    let n = u32::try_from(parts.len()).map_err(|_| too_big())?;

    let mut regions = vec![
        Region {
            kind: RegionKind::BootHeader,
            name: "boot header".into(),
            range: 0..profile.boot_header_size,
        },
        Region {
            kind: RegionKind::ImageHeaderTable,
            name: "image header table".into(),
            range: profile.image_header_table_offset
                ..profile.image_header_table_offset
                    + profile.image_header_table_size,
        },
        Region {
            kind: RegionKind::ImageHeaders,
            name: "image headers".into(),
            range: array(
                profile.image_header_offset,
                n,
                profile.image_header_size,
            )?,
        },
        Region {
            kind: RegionKind::PartitionHeaders,
            name: "partition headers".into(),
            range: array(
                profile.partition_header_offset,
                n.checked_add(1).ok_or_else(too_big)?,
                profile.partition_header_size,
            )?,
        },
    ];

    let mut cursor = regions[3].range.end.max(profile.min_payload_offset);
    let mut payloads = Vec::with_capacity(parts.len());

    for (i, part) in parts.iter().enumerate() {
        debug_assert_eq!(part.len % WORD, 0);

        let start = match part.pinned {
            Some(offset) => {
                if offset % WORD != 0 {
                    return Err(BootImageError::Unsupported(format!(
                        "{}: offset {:#x} is not word aligned",
                        part.name, offset
                    )));
                }
                if offset < profile.min_payload_offset {
                    return Err(BootImageError::SectionOverlap {
                        first: part.name.clone(),
                        second: "boot header".into(),
                    });
                }
                if part.len == 0 {
                    // Nothing to put there; an empty payload must not
                    // stretch the image out to its pinned offset.
                    log::debug!(
                        "{}: empty, ignoring offset {:#x}",
                        part.name,
                        offset
                    );
                    align_up(cursor, WORD).ok_or_else(too_big)?
                } else {
                    offset
                }
            }
            None => align_up(cursor, WORD).ok_or_else(too_big)?,
        };
        let end = start.checked_add(part.len).ok_or_else(too_big)?;

        log::debug!("{}: {:#x}..{:#x}", part.name, start, end);

        cursor = end;
        payloads.push(start..end);
        regions.push(Region {
            kind: RegionKind::Payload(i),
            name: part.name.clone(),
            range: start..end,
        });
    }

    regions.sort_by_key(|r| (r.range.start, r.range.end));
    check_overlaps(&regions)?;

    let end = regions
        .iter()
        .filter(|r| !r.range.is_empty())
        .map(|r| r.range.end)
        .max()
        .unwrap_or(0);
    let total_len = align_up(end, profile.image_padding).ok_or_else(too_big)?;

    Ok(LayoutPlan {
        regions: fill_gaps(regions, total_len),
        payloads,
        image_header_offset: profile.image_header_offset,
        image_header_size: profile.image_header_size,
        partition_header_offset: profile.partition_header_offset,
        partition_header_size: profile.partition_header_size,
        total_len,
    })
}

/// `regions` must be sorted by start offset. Empty regions cannot collide
/// with anything.
fn check_overlaps(regions: &[Region]) -> Result<()> {
    let mut prev: Option<&Region> = None;
    for r in regions.iter().filter(|r| !r.range.is_empty()) {
        if let Some(p) = prev {
            if r.range.start < p.range.end {
                return Err(BootImageError::SectionOverlap {
                    first: p.name.clone(),
                    second: r.name.clone(),
                });
            }
        }
        prev = Some(r);
    }
    Ok(())
}

fn fill_gaps(regions: Vec<Region>, total_len: u32) -> Vec<Region> {
    let mut out = Vec::with_capacity(regions.len() * 2);
    let mut pos = 0;
    for r in regions {
        if r.range.start > pos && !r.range.is_empty() {
            out.push(padding(pos..r.range.start));
        }
        pos = pos.max(r.range.end);
        out.push(r);
    }
    if total_len > pos {
        out.push(padding(pos..total_len));
    }
    out
}

fn padding(range: Range<u32>) -> Region {
    Region {
        kind: RegionKind::Padding,
        name: "padding".into(),
        range,
    }
}
