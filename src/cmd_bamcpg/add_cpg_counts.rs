use bamcpg::libs::coordinator;
use bamcpg::libs::error::AnnotateError;
use bamcpg::libs::genome::GenomeRef;
use bamcpg::libs::job::{validate_input, Filters, RunContext};
use bamcpg::libs::region::{resolve_regions, Region};
use bamcpg::libs::tools::Toolbox;
use clap::*;
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    let cmd = Command::new("add-cpg-counts")
        .about("Add CpG methylation counts to each read, region by region")
        .after_help(
            r###"
Adds a YI:Z:{nr_meth},{nr_unmeth} tag to every read, counting cytosine retention
at CpG context. With --add-pat the methylation pattern of the read (pair) is
attached too.

Process:
1. Resolve regions: the contigs found in both the bam index and the reference,
   in reference order; or the single --region
2. Extract the bam header once
3. For each region, in parallel:
   samtools view | [match_maker] | add_cpg_counts | reheader | samtools sort
4. samtools merge the sorted parts under the shared header, then samtools index

Output:
* <outdir>/<name>.<suffix>.bam and its index
* With --region: <outdir>/<name>.<region>.<suffix>.bam, e.g. sample.chr1_100_200.counts.bam
* Paths of the written files are printed to stdout

Notes:
* Inputs must be indexed, and their file names (without extension) must differ
* Paired-end input is detected from the first read; unless --include-flags is
  given, only proper pairs (-f 3) are kept
* Intermediate files are removed whether the run succeeds or not
* If any region fails, nothing is merged; remaining inputs are still processed
  and the exit code is non-zero

Examples:
1. Whole genome, 16 workers:
   bamcpg add-cpg-counts sample.bam -g ref/hg38 -@ 16 -o out

2. One region, with patterns:
   bamcpg add-cpg-counts sample.bam -g ref/hg38 -r chr1:10,000-20,000 --add-pat

3. Restrict to a BED file and a custom suffix:
   bamcpg add-cpg-counts a.bam b.bam -g ref/hg38 -L blocks.bed --suffix blocks

"###,
        );

    super::region_args(cmd)
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .short('o')
                .num_args(1)
                .default_value(".")
                .help("Output directory, must exist"),
        )
        .arg(
            Arg::new("tmpdir")
                .long("tmpdir")
                .short('T')
                .num_args(1)
                .help("Directory for sort temp files [default: outdir]"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .short('@')
                .num_args(1)
                .value_parser(value_parser!(usize))
                .help("Number of regions processed at once [default: number of CPUs]"),
        )
        .arg(
            Arg::new("mapq")
                .long("mapq")
                .short('q')
                .num_args(1)
                .default_value("10")
                .value_parser(value_parser!(u32))
                .help("Minimal mapping quality"),
        )
        .arg(
            Arg::new("exclude_flags")
                .long("exclude-flags")
                .short('F')
                .num_args(1)
                .default_value("1796")
                .value_parser(value_parser!(u32))
                .help("Skip reads with any of these SAM flags"),
        )
        .arg(
            Arg::new("include_flags")
                .long("include-flags")
                .short('f')
                .num_args(1)
                .value_parser(value_parser!(u32))
                .help("Keep only reads with all of these SAM flags [default: 3 for paired-end]"),
        )
        .arg(
            Arg::new("regions_file")
                .long("regions-file")
                .short('L')
                .num_args(1)
                .help("BED file; only reads overlapping its regions are kept"),
        )
        .arg(
            Arg::new("min_cpg")
                .long("min-cpg")
                .num_args(1)
                .value_parser(value_parser!(u32))
                .help("Passed to the annotation tool as --min_cpg"),
        )
        .arg(
            Arg::new("clip")
                .long("clip")
                .num_args(1)
                .default_value("0")
                .value_parser(value_parser!(u32))
                .help("Bases clipped from both ends of each read"),
        )
        .arg(
            Arg::new("max_read_len")
                .long("max-read-len")
                .num_args(1)
                .default_value("1000")
                .value_parser(value_parser!(u64))
                .help("Window extension around --region for the annotation tool"),
        )
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .num_args(1)
                .default_value("counts")
                .help("Output file suffix, [name].[suffix].bam"),
        )
        .arg(
            Arg::new("add_pat")
                .long("add-pat")
                .action(ArgAction::SetTrue)
                .help("Add the methylation pattern of the read (pair)"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Only process the first 200 reads of each region"),
        )
        .arg(
            Arg::new("match_maker")
                .long("match-maker")
                .num_args(1)
                .default_value("match_maker")
                .help("Pair reorder executable"),
        )
        .arg(
            Arg::new("add_cpg_count")
                .long("add-cpg-count")
                .num_args(1)
                .default_value("add_cpg_counts")
                .help("CpG annotation executable"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let toolbox = Toolbox {
        samtools: args.get_one::<String>("samtools").unwrap().to_string(),
        match_maker: args.get_one::<String>("match_maker").unwrap().to_string(),
        add_cpg_count: args.get_one::<String>("add_cpg_count").unwrap().to_string(),
    };
    toolbox.check()?;

    let outdir = PathBuf::from(args.get_one::<String>("outdir").unwrap());
    if !outdir.is_dir() {
        return Err(AnnotateError::InvalidOutputDir(outdir).into());
    }
    let tmpdir = args.get_one::<String>("tmpdir").map(PathBuf::from);
    if let Some(dir) = &tmpdir {
        if !dir.is_dir() {
            return Err(AnnotateError::InvalidOutputDir(dir.clone()).into());
        }
    }

    let genome = GenomeRef::from_dir(args.get_one::<String>("genome").unwrap())?;
    let request = match args.get_one::<String>("region") {
        Some(s) => s.parse::<Region>()?,
        None => Region::Whole,
    };
    request.validate(&genome)?;

    let regions_file = args.get_one::<String>("regions_file").map(PathBuf::from);
    if let Some(bed) = &regions_file {
        if !bed.is_file() {
            anyhow::bail!("Regions file not found: {}", bed.display());
        }
    }

    let filters = Filters {
        mapq: *args.get_one::<u32>("mapq").unwrap(),
        exclude_flags: *args.get_one::<u32>("exclude_flags").unwrap(),
        include_flags: args.get_one::<u32>("include_flags").copied(),
        regions_file,
        min_cpg: args.get_one::<u32>("min_cpg").copied(),
        clip: *args.get_one::<u32>("clip").unwrap(),
        add_pat: args.get_flag("add_pat"),
        debug: args.get_flag("debug"),
        max_read_len: *args.get_one::<u64>("max_read_len").unwrap(),
    };
    let suffix = args.get_one::<String>("suffix").unwrap();
    let parallel = args
        .get_one::<usize>("parallel")
        .copied()
        .unwrap_or_else(num_cpus::get)
        .max(1);

    // Outputs are named after the input stem, so stems must be unique
    let infiles: Vec<&String> = args.get_many::<String>("bams").unwrap().collect();
    let mut seen: HashMap<String, &String> = HashMap::new();
    for infile in &infiles {
        let stem = Path::new(infile.as_str())
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(other) = seen.insert(stem.clone(), *infile) {
            return Err(AnnotateError::InvalidInput {
                path: PathBuf::from(infile.as_str()),
                reason: format!(
                    "same name as {}, both would write {}.{}.bam",
                    other, stem, suffix
                ),
            }
            .into());
        }
    }

    //----------------------------
    // Operating
    //----------------------------
    let mut failed: Vec<&str> = vec![];

    for infile in &infiles {
        let input = Path::new(infile.as_str());
        if let Err(e) = validate_input(input) {
            warn!("Skipping {}: {}", infile, e);
            failed.push(infile.as_str());
            continue;
        }

        let run = Run {
            toolbox: &toolbox,
            genome: &genome,
            request: &request,
            filters: &filters,
            outdir: &outdir,
            tmpdir: tmpdir.as_deref(),
            suffix,
            parallel,
        };
        match run.annotate(input) {
            Ok(path) => {
                info!("{} => {}", infile, path.display());
                println!("{}", path.display());
            }
            Err(e) => {
                error!("{}: {:#}", infile, e);
                failed.push(infile.as_str());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} input(s) failed: {}",
            failed.len(),
            infiles.len(),
            failed.join(", ")
        );
    }

    Ok(())
}

struct Run<'a> {
    toolbox: &'a Toolbox,
    genome: &'a GenomeRef,
    request: &'a Region,
    filters: &'a Filters,
    outdir: &'a Path,
    tmpdir: Option<&'a Path>,
    suffix: &'a str,
    parallel: usize,
}

impl Run<'_> {
    fn annotate(&self, input: &Path) -> anyhow::Result<PathBuf> {
        let mut ctx = RunContext::new(
            input,
            self.request,
            false,
            self.genome,
            self.outdir,
            self.tmpdir,
            self.suffix,
        )?;
        // Whatever happens next, an output from an earlier run must not outlive this one
        ctx.remove_final();

        ctx.paired_end = self.toolbox.is_paired_end(input)?;
        if ctx.paired_end {
            self.toolbox.check_match_maker()?;
        }
        info!(
            "{} is {}",
            input.display(),
            if ctx.paired_end { "paired-end" } else { "single-end" }
        );

        let regions = resolve_regions(self.request, input, self.toolbox, self.genome)?;
        coordinator::annotate(&ctx, &regions, self.filters, self.toolbox, self.parallel)
    }
}
