// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use bootimage::inspect::{parse_image, ParsedImage};
use bootimage::{BifConfig, BootImageError, Platform};

#[derive(Debug, Parser)]
#[clap(
    max_term_width = 80,
    about = "builds Zynq and Zynq UltraScale+ boot images"
)]
struct Args {
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Builds a boot image from an image description
    Build {
        /// Path to the image description, in TOML.
        cfg: PathBuf,
        /// Where to write the image.
        out: PathBuf,
    },
    /// Prints the size the image would have, without writing it
    Estimate {
        /// Path to the image description, in TOML.
        cfg: PathBuf,
    },
    /// Checks an existing boot image and lists its partitions
    Inspect {
        /// Parse the image with the Zynq UltraScale+ layout.
        #[clap(long)]
        zynqmp: bool,
        image: PathBuf,
    },
}

fn build(cfg: &Path, out: &Path) -> Result<()> {
    let config = BifConfig::from_file(cfg)?;
    let image = bootimage::create_boot_image(&config)?;
    std::fs::write(out, &image.bytes)
        .with_context(|| format!("writing {}", out.display()))?;

    for r in &image.plan.regions {
        log::debug!(
            "{:#07x}..{:#07x} {}",
            r.range.start,
            r.range.end,
            r.name
        );
    }
    log::info!("wrote {} ({:#x} bytes)", out.display(), image.len());
    Ok(())
}

fn print_image(parsed: &ParsedImage) {
    let f = parsed.boot_header.fields();
    println!("fsbl offset     {:#x}", f.src_offset);
    println!("fsbl length     {:#x}", f.fsbl_len);
    println!("image length    {:#x}", f.total_img_len);
    println!("partitions      {}", parsed.table.fields().count);
    println!();
    println!(
        "{:<3} {:<32} {:>10} {:>10} {:>10} {:>10}",
        "#", "NAME", "OFFSET", "LENGTH", "LOAD", "EXEC"
    );
    for (i, p) in parsed.partitions.iter().enumerate() {
        println!(
            "{:<3} {:<32} {:>#10x} {:>#10x} {:>#10x} {:>#10x}",
            i,
            p.name(),
            p.data.start,
            p.data.len(),
            p.header.load_addr,
            p.header.exec_addr
        );
    }
}

fn run(args: Args) -> Result<()> {
    match args.cmd {
        Cmd::Build { cfg, out } => build(&cfg, &out)?,
        Cmd::Estimate { cfg } => {
            let config = BifConfig::from_file(&cfg)?;
            let size = bootimage::estimate_boot_image_size(&config)?;
            println!("{size:#x}");
        }
        Cmd::Inspect { zynqmp, image } => {
            let platform = if zynqmp {
                Platform::ZynqMp
            } else {
                Platform::Zynq
            };
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let parsed = parse_image(&bytes, platform)
                .with_context(|| format!("parsing {}", image.display()))?;
            print_image(&parsed);
        }
    }
    Ok(())
}

/// Exit status for a failed run: the code of the innermost core error in
/// the chain, whatever context was added around it, or 1 if there is none.
/// A core error can itself wrap an I/O error, so the very root cause is not
/// necessarily the core error.
fn exit_code(e: &anyhow::Error) -> i32 {
    e.chain()
        .filter_map(|c| c.downcast_ref::<BootImageError>())
        .last()
        .map(BootImageError::code)
        .unwrap_or(1)
}

fn main() {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    if let Err(e) = run(Args::parse()) {
        log::error!("{e:?}");
        std::process::exit(exit_code(&e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn exit_code_comes_from_root_cause() {
        let e = anyhow::Error::new(BootImageError::SectionOverlap {
            first: "a".into(),
            second: "b".into(),
        })
        .context("building boot.bin")
        .context("running build");
        assert_eq!(exit_code(&e), 4);

        let e = anyhow::Error::new(BootImageError::Unsupported("x".into()));
        assert_eq!(exit_code(&e), 5);

        let e = anyhow::Error::new(BootImageError::BitstreamFormat {
            path: "system.bit".into(),
            reason: "truncated".into(),
        })
        .context("building boot.bin");
        assert_eq!(exit_code(&e), 2);

        assert_eq!(exit_code(&anyhow!("bad config")), 1);
    }
}
