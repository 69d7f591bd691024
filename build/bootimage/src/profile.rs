// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-platform constants for the boot ROM image format.
//!
//! Both supported families share one layout algorithm; everything that
//! differs between them is a field of [`PlatformProfile`]. The values come
//! from UG585 (Zynq-7000) and UG1085 (Zynq UltraScale+), cross-checked
//! against images produced by Xilinx `bootgen`.

use serde::Deserialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// Zynq-7000
    Zynq,
    /// Zynq UltraScale+ MPSoC
    #[serde(rename = "zynqmp", alias = "zynq-mp")]
    ZynqMp,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Zynq => write!(f, "zynq"),
            Platform::ZynqMp => write!(f, "zynqmp"),
        }
    }
}

/// Fixed offsets and record sizes for one platform. All values are in
/// bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlatformProfile {
    pub platform: Platform,
    /// Size of the boot header, including the register init table and any
    /// trailing user-defined words.
    pub boot_header_size: u32,
    pub image_header_table_offset: u32,
    pub image_header_table_size: u32,
    /// Whether the image header table carries the boot device word and a
    /// trailing checksum.
    pub table_has_boot_device: bool,
    /// First image header record; the array grows upwards from here.
    pub image_header_offset: u32,
    /// Size of one image header slot (fields plus padding).
    pub image_header_size: u32,
    pub partition_header_offset: u32,
    pub partition_header_size: u32,
    /// No partition payload may start below this offset.
    pub min_payload_offset: u32,
    /// The final image length is rounded up to a multiple of this.
    pub image_padding: u32,
    /// Largest first-stage loader the ROM will copy into on-chip memory.
    pub fsbl_max_len: u32,
}

pub const WORD: u32 = 4;

pub const IMAGE_NAME_LEN: usize = 32;

const ZYNQ: PlatformProfile = PlatformProfile {
    platform: Platform::Zynq,
    boot_header_size: 0x8c0,
    image_header_table_offset: 0x8c0,
    image_header_table_size: 0x40,
    table_has_boot_device: false,
    image_header_offset: 0x900,
    image_header_size: 0x40,
    partition_header_offset: 0xc80,
    partition_header_size: 0x40,
    min_payload_offset: 0x8c0,
    image_padding: 0x40,
    fsbl_max_len: 192 * 1024,
};

const ZYNQMP: PlatformProfile = PlatformProfile {
    platform: Platform::ZynqMp,
    boot_header_size: 0x8c0,
    image_header_table_offset: 0x8c0,
    image_header_table_size: 0x40,
    table_has_boot_device: true,
    image_header_offset: 0x900,
    image_header_size: 0x40,
    partition_header_offset: 0xa00,
    partition_header_size: 0x40,
    min_payload_offset: 0x8c0,
    image_padding: 0x40,
    fsbl_max_len: 256 * 1024,
};

impl PlatformProfile {
    pub fn for_platform(platform: Platform) -> &'static PlatformProfile {
        match platform {
            Platform::Zynq => &ZYNQ,
            Platform::ZynqMp => &ZYNQMP,
        }
    }

    /// Number of image header slots that fit between the start of the image
    /// header array and the partition header table.
    pub fn image_header_capacity(&self) -> u32 {
        (self.partition_header_offset - self.image_header_offset)
            / self.image_header_size
    }
}

/// Rounds `v` up to the next multiple of `align`, which must be a power of
/// two. Returns `None` on overflow.
pub fn align_up(v: u32, align: u32) -> Option<u32> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    v.checked_add(mask).map(|v| v & !mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_regions_are_ordered() {
        for p in [Platform::Zynq, Platform::ZynqMp] {
            let prof = PlatformProfile::for_platform(p);
            assert!(prof.image_header_table_offset >= prof.boot_header_size);
            assert_eq!(
                prof.image_header_offset,
                prof.image_header_table_offset + prof.image_header_table_size
            );
            assert!(prof.partition_header_offset > prof.image_header_offset);
            assert!(prof.min_payload_offset >= prof.boot_header_size);
            assert_eq!(prof.partition_header_offset % WORD, 0);
        }
    }

    #[test]
    fn capacity() {
        assert_eq!(
            PlatformProfile::for_platform(Platform::Zynq)
                .image_header_capacity(),
            14
        );
        assert_eq!(
            PlatformProfile::for_platform(Platform::ZynqMp)
                .image_header_capacity(),
            4
        );
    }

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 4), Some(0));
        assert_eq!(align_up(1, 4), Some(4));
        assert_eq!(align_up(0xcc1, 0x40), Some(0xd00));
        assert_eq!(align_up(u32::MAX, 4), None);
    }
}
