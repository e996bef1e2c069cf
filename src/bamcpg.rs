extern crate clap;
use clap::*;

mod cmd_bamcpg;

fn main() -> anyhow::Result<()> {
    let app = Command::new("bamcpg")
        .version(crate_version!())
        .author(crate_authors!())
        .about("`bamcpg` - CpG-count annotation of alignment files")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Verbosity: -v for progress, -vv for every external command"),
        )
        .subcommand(cmd_bamcpg::add_cpg_counts::make_subcommand())
        .subcommand(cmd_bamcpg::regions::make_subcommand())
        .after_help(
            r###"Subcommands:

* add-cpg-counts - Tag each read with its CpG methylation counts, region by region
* regions        - List the regions add-cpg-counts would process

External tools:
    samtools, match_maker (paired-end input only) and add_cpg_counts must be
    reachable; each can be replaced with --samtools/--match-maker/--add-cpg-count

Logging:
    Warnings only by default. RUST_LOG overrides -v.

"###,
        );

    let matches = app.get_matches();

    env_logger::Builder::new()
        .filter_level(match matches.get_count("verbose") {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    // Check which subcomamnd the user ran...
    match matches.subcommand() {
        Some(("add-cpg-counts", sub_matches)) => cmd_bamcpg::add_cpg_counts::execute(sub_matches),
        Some(("regions", sub_matches)) => cmd_bamcpg::regions::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
