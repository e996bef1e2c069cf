//! Subcommand modules for the `bamcpg` binary.

pub mod add_cpg_counts;
pub mod regions;

use clap::*;

// Arguments shared by subcommands that resolve regions
pub fn region_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("bams")
            .required(true)
            .num_args(1..)
            .index(1)
            .help("Input alignment files (.bam/.cram), indexed"),
    )
    .arg(
        Arg::new("genome")
            .long("genome")
            .short('g')
            .required(true)
            .num_args(1)
            .help("Reference directory holding chrome.size and CpG.bed.gz"),
    )
    .arg(
        Arg::new("region")
            .long("region")
            .short('r')
            .num_args(1)
            .help("Restrict to one region, `chr` or `chr:start-end`"),
    )
    .arg(
        Arg::new("samtools")
            .long("samtools")
            .num_args(1)
            .default_value("samtools")
            .help("samtools executable"),
    )
}
