// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::profile::Platform;

/// Who consumes a partition once the ROM has handed off.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Owner {
    Fsbl,
    #[default]
    #[serde(alias = "uboot")]
    Bootloader,
}

impl Owner {
    pub fn bits(self) -> u32 {
        match self {
            Owner::Fsbl => 0,
            Owner::Bootloader => 1,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationDevice {
    None,
    #[default]
    Ps,
    Pl,
    Interconnect,
}

impl DestinationDevice {
    pub fn bits(self) -> u32 {
        match self {
            DestinationDevice::None => 0,
            DestinationDevice::Ps => 1,
            DestinationDevice::Pl => 2,
            DestinationDevice::Interconnect => 3,
        }
    }
}

/// Value written to the image header table's boot device word on ZynqMP.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootDevice {
    /// Boot the rest of the image from wherever the ROM found this one.
    #[default]
    Same,
    Qspi,
    Nand,
    Sd,
    Mmc,
    Usb,
    Ethernet,
    Pcie,
    Sata,
}

impl BootDevice {
    pub fn value(self) -> u32 {
        match self {
            BootDevice::Same => 0x0,
            BootDevice::Qspi => 0x1,
            BootDevice::Nand => 0x2,
            BootDevice::Sd => 0x3,
            BootDevice::Mmc => 0x4,
            BootDevice::Usb => 0x5,
            BootDevice::Ethernet => 0x6,
            BootDevice::Pcie => 0x7,
            BootDevice::Sata => 0x8,
        }
    }
}

/// CPU the ZynqMP ROM hands the first-stage loader to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FsblCpu {
    R5,
    #[default]
    #[serde(rename = "a53-64")]
    A53_64,
}

impl FsblCpu {
    pub fn value(self) -> u32 {
        match self {
            FsblCpu::R5 => 0x001,
            FsblCpu::A53_64 => 0x800,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionAttributes {
    pub owner: Owner,
    pub destination: DestinationDevice,
    pub rsa_used: bool,
}

/// One input binary. Order within [`BifConfig::partitions`] is the order
/// of the payloads in the output image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionSpec {
    pub file: PathBuf,
    /// Load address; when unset it is taken from the input file if the
    /// format carries one.
    pub load: Option<u32>,
    pub exec: Option<u32>,
    /// Pins the payload at this byte offset instead of appending it.
    pub offset: Option<u32>,
    pub attributes: PartitionAttributes,
    pub encrypt: bool,
}

impl PartitionSpec {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        PartitionSpec {
            file: file.into(),
            load: None,
            exec: None,
            offset: None,
            attributes: PartitionAttributes::default(),
            encrypt: false,
        }
    }

    /// Name used in diagnostics and in the image header name field.
    pub fn name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string())
    }
}

/// A fully resolved image description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BifConfig {
    pub platform: Platform,
    pub boot_device: BootDevice,
    pub fsbl_target_cpu: FsblCpu,
    pub partitions: Vec<PartitionSpec>,
}

impl BifConfig {
    pub fn new(platform: Platform) -> Self {
        BifConfig {
            platform,
            boot_device: BootDevice::default(),
            fsbl_target_cpu: FsblCpu::default(),
            partitions: Vec::new(),
        }
    }

    pub fn from_file(cfg: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(cfg)
            .with_context(|| format!("reading {}", cfg.display()))?;
        let base = cfg.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml(&text, base)
            .with_context(|| format!("parsing {}", cfg.display()))
    }

    /// Parses a TOML image description. Relative partition paths are
    /// resolved against `base`.
    pub fn from_toml(text: &str, base: &Path) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)?;

        if raw.platform == Platform::Zynq {
            if raw.boot_device.is_some() {
                bail!("boot-device is only meaningful for zynqmp");
            }
            if raw.fsbl_target_cpu.is_some() {
                bail!("fsbl-target-cpu is only meaningful for zynqmp");
            }
        }

        let partitions = raw
            .partition
            .into_iter()
            .map(|p| PartitionSpec {
                file: base.join(p.file),
                load: p.load,
                exec: p.exec,
                offset: p.offset,
                attributes: PartitionAttributes {
                    owner: p.owner,
                    destination: p.destination_device,
                    rsa_used: p.rsa,
                },
                encrypt: p.encrypt,
            })
            .collect();

        Ok(BifConfig {
            platform: raw.platform,
            boot_device: raw.boot_device.unwrap_or_default(),
            fsbl_target_cpu: raw.fsbl_target_cpu.unwrap_or_default(),
            partitions,
        })
    }
}

/// A `RawConfig` is the TOML file as written; [`BifConfig`] is what the
/// builder consumes.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    platform: Platform,
    boot_device: Option<BootDevice>,
    fsbl_target_cpu: Option<FsblCpu>,
    #[serde(default)]
    partition: Vec<RawPartition>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawPartition {
    file: PathBuf,
    #[serde(default)]
    owner: Owner,
    #[serde(default)]
    destination_device: DestinationDevice,
    load: Option<u32>,
    exec: Option<u32>,
    offset: Option<u32>,
    #[serde(default)]
    rsa: bool,
    #[serde(default)]
    encrypt: bool,
}
