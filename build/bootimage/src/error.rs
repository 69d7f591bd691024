// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

/// Everything that can go wrong while building an image.
#[derive(Debug, thiserror::Error)]
pub enum BootImageError {
    #[error("{}: cannot read input file", path.display())]
    NoFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: malformed bitstream: {reason}", path.display())]
    BitstreamFormat { path: PathBuf, reason: String },

    #[error("{}: malformed ELF file: {reason}", path.display())]
    ElfFormat { path: PathBuf, reason: String },

    #[error("{first} overlaps {second}")]
    SectionOverlap { first: String, second: String },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl BootImageError {
    /// Process exit status for this error. Zero is success and is never
    /// returned here.
    pub fn code(&self) -> i32 {
        match self {
            BootImageError::NoFile { .. } => 1,
            BootImageError::BitstreamFormat { .. } => 2,
            BootImageError::ElfFormat { .. } => 3,
            BootImageError::SectionOverlap { .. } => 4,
            BootImageError::Unsupported(_) => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, BootImageError>;
