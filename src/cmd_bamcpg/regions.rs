use bamcpg::libs::genome::GenomeRef;
use bamcpg::libs::job::validate_input;
use bamcpg::libs::region::{resolve_regions, Region};
use bamcpg::libs::tools::Toolbox;
use clap::*;
use std::io::Write;
use std::path::Path;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    let cmd = Command::new("regions")
        .about("List the regions add-cpg-counts would process")
        .after_help(
            r###"
Prints the processing units of each input, in the order they are merged:
the contigs present in both the bam index and the reference, ordered as in
the reference's chrome.size. With --region, that region alone.

With a single input, one region per line. With several inputs, lines are
<input><TAB><region>.

Fails like add-cpg-counts would when no contig is shared with the reference.

Examples:
1. Check a bam against a reference:
   bamcpg regions sample.bam -g ref/hg38

"###,
        );

    super::region_args(cmd).arg(
        Arg::new("outfile")
            .long("outfile")
            .short('o')
            .num_args(1)
            .default_value("stdout")
            .help("Output filename. [stdout] for screen"),
    )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let toolbox = Toolbox {
        samtools: args.get_one::<String>("samtools").unwrap().to_string(),
        ..Default::default()
    };
    let genome = GenomeRef::from_dir(args.get_one::<String>("genome").unwrap())?;
    let request = match args.get_one::<String>("region") {
        Some(s) => s.parse::<Region>()?,
        None => Region::Whole,
    };
    let infiles: Vec<&String> = args.get_many::<String>("bams").unwrap().collect();
    let mut writer = intspan::writer(args.get_one::<String>("outfile").unwrap());

    for infile in &infiles {
        let input = Path::new(infile.as_str());
        validate_input(input)?;

        for region in resolve_regions(&request, input, &toolbox, &genome)? {
            if infiles.len() > 1 {
                writer.write_fmt(format_args!("{}\t{}\n", infile, region))?;
            } else {
                writer.write_fmt(format_args!("{}\n", region))?;
            }
        }
    }

    Ok(())
}
