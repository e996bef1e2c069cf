//! Per-region jobs.
//!
//! A run over one input owns a [`RunContext`]; every artifact path of the run is derived from it.
//! Each region becomes a [`Job`], which streams
//!
//! ```text
//! samtools view <in> <region> -q .. -F .. [-f ..] [-M -L <bed>]
//!     [| head -n 200]
//!     [| match_maker]
//!     | add_cpg_counts <dict> <extended region> --clip .. [--min_cpg ..] [--pat]
//!     | cat <header> -
//!     | samtools view -b - > <prefix>_unsorted.output.bam
//! samtools sort -o <prefix>.output.bam -T <scratch>/sort <prefix>_unsorted.output.bam
//! ```

use crate::libs::error::AnnotateError;
use crate::libs::genome::GenomeRef;
use crate::libs::pipeline::{Pipeline, Stage};
use crate::libs::region::Region;
use crate::libs::tools::Toolbox;
use anyhow::Context;
use log::warn;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Records kept per region in debug mode
pub const DEBUG_RECORDS: usize = 200;

/// Include-flags required of paired-end input when none are given: paired, proper pair
pub const PAIRED_INCLUDE_FLAGS: u32 = 3;

/// Read filters and annotation options, shared read-only by all jobs of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub mapq: u32,
    pub exclude_flags: u32,
    pub include_flags: Option<u32>,
    pub regions_file: Option<PathBuf>,
    pub min_cpg: Option<u32>,
    pub clip: u32,
    pub add_pat: bool,
    pub debug: bool,
    /// Window extension applied to explicit regions for the annotation stage
    pub max_read_len: u64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            mapq: 10,
            exclude_flags: 1796,
            include_flags: None,
            regions_file: None,
            min_cpg: None,
            clip: 0,
            add_pat: false,
            debug: false,
            max_read_len: 1000,
        }
    }
}

/// Checks that an input looks like an indexed alignment file
pub fn validate_input(input: &Path) -> Result<(), AnnotateError> {
    let invalid = |reason: &str| AnnotateError::InvalidInput {
        path: input.to_path_buf(),
        reason: reason.to_string(),
    };

    if !input.is_file() {
        return Err(invalid("no such file"));
    }
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext != "bam" && ext != "cram" {
        return Err(invalid("expected a .bam or .cram file"));
    }

    let mut candidates = vec![
        with_suffix(input, ".bai"),
        with_suffix(input, ".csi"),
        with_suffix(input, ".crai"),
    ];
    candidates.push(input.with_extension("bai"));
    if !candidates.iter().any(|p| p.is_file()) {
        return Err(invalid("index not found, run `samtools index` first"));
    }

    Ok(())
}

/// Appends to a path without touching its extension
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Everything scoped to one input file
#[derive(Debug, Clone)]
pub struct RunContext {
    pub input: PathBuf,
    pub request: Region,
    pub paired_end: bool,
    pub dict: PathBuf,
    pub out_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub stem: String,
    /// Extracted once, read by every job and by the merge
    pub header: PathBuf,
    pub final_path: PathBuf,
}

impl RunContext {
    pub fn new(
        input: &Path,
        request: &Region,
        paired_end: bool,
        genome: &GenomeRef,
        out_dir: &Path,
        tmp_dir: Option<&Path>,
        suffix: &str,
    ) -> anyhow::Result<Self> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .with_context(|| format!("Can't take the base name of {}", input.display()))?;

        let final_name = if request.is_whole() {
            format!("{}.{}.bam", stem, suffix)
        } else {
            format!("{}.{}.{}.bam", stem, request.name_token(), suffix)
        };

        Ok(Self {
            input: input.to_path_buf(),
            request: request.clone(),
            paired_end,
            dict: genome.dict_path(),
            out_dir: out_dir.to_path_buf(),
            tmp_dir: tmp_dir.unwrap_or(out_dir).to_path_buf(),
            header: out_dir.join(format!("{}.header", stem)),
            final_path: out_dir.join(final_name),
            stem,
        })
    }

    pub fn job_paths(&self, region: &Region) -> JobPaths {
        let name = if self.request.is_whole() {
            format!("{}_{}", self.stem, region.contig().unwrap_or("all"))
        } else {
            format!("{}_1", self.stem)
        };
        JobPaths::new(self.out_dir.join(name))
    }

    pub fn jobs<'a>(&'a self, regions: &[Region], filters: &'a Filters) -> Vec<Job<'a>> {
        regions
            .iter()
            .enumerate()
            .map(|(index, region)| Job {
                index,
                region: region.clone(),
                paths: self.job_paths(region),
                ctx: self,
                filters,
            })
            .collect()
    }

    /// Removes the final output and its index, if any
    pub fn remove_final(&self) {
        for path in [
            self.final_path.clone(),
            with_suffix(&self.final_path, ".bai"),
            with_suffix(&self.final_path, ".csi"),
        ] {
            remove_artifact(&path);
        }
    }

    /// Removes the header and every per-region artifact the given regions could have produced.
    /// The final output is left alone.
    pub fn cleanup(&self, regions: &[Region]) {
        let mut paths = vec![self.header.clone()];
        for region in regions {
            let job = self.job_paths(region);
            paths.push(job.unsorted);
            paths.push(job.sorted);
        }
        for path in paths {
            remove_artifact(&path);
        }
    }
}

pub fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub prefix: PathBuf,
    pub unsorted: PathBuf,
    pub sorted: PathBuf,
}

impl JobPaths {
    pub fn new(prefix: PathBuf) -> Self {
        Self {
            unsorted: with_suffix(&prefix, "_unsorted.output.bam"),
            sorted: with_suffix(&prefix, ".output.bam"),
            prefix,
        }
    }
}

/// Extracts the input's header to the run's header path
pub fn extract_header(ctx: &RunContext, toolbox: &Toolbox) -> anyhow::Result<PathBuf> {
    toolbox
        .header_pipeline(&ctx.input, &ctx.header)
        .run()
        .with_context(|| format!("Failed to extract the header of {}", ctx.input.display()))?;
    Ok(ctx.header.clone())
}

/// One region's unit of work
#[derive(Debug, Clone)]
pub struct Job<'a> {
    /// Position in resolver order
    pub index: usize,
    pub region: Region,
    pub paths: JobPaths,
    pub ctx: &'a RunContext,
    pub filters: &'a Filters,
}

impl<'a> Job<'a> {
    /// filter | [head] | [reorder] | annotate | reheader > unsorted
    pub fn annotate_pipeline(&self, toolbox: &Toolbox) -> Pipeline {
        let ctx = self.ctx;
        let filters = self.filters;

        let mut filter = toolbox
            .samtools()
            .arg("view")
            .arg(&ctx.input)
            .arg(self.region.to_string())
            .arg("-q")
            .arg(filters.mapq.to_string())
            .arg("-F")
            .arg(filters.exclude_flags.to_string());
        let include_flags = match filters.include_flags {
            Some(flags) => Some(flags),
            None if ctx.paired_end => Some(PAIRED_INCLUDE_FLAGS),
            None => None,
        };
        if let Some(flags) = include_flags {
            filter = filter.arg("-f").arg(flags.to_string());
        }
        if let Some(bed) = &filters.regions_file {
            filter = filter.arg("-M").arg("-L").arg(bed);
        }

        let mut pipeline = Pipeline::new().stage(filter);
        if filters.debug {
            pipeline.push(Stage::new("head").arg("-n").arg(DEBUG_RECORDS.to_string()));
        }
        if ctx.paired_end {
            pipeline.push(Stage::new(&toolbox.match_maker));
        }

        let mut annotate = Stage::new(&toolbox.add_cpg_count)
            .arg(&ctx.dict)
            .arg(self.region.extend(filters.max_read_len).to_string())
            .arg("--clip")
            .arg(filters.clip.to_string());
        if let Some(min_cpg) = filters.min_cpg {
            annotate = annotate.arg("--min_cpg").arg(min_cpg.to_string());
        }
        if filters.add_pat {
            annotate = annotate.arg("--pat");
        }
        pipeline.push(annotate);

        pipeline.push(Stage::new("cat").arg(&ctx.header).arg("-"));
        pipeline.push(toolbox.samtools().args(["view", "-b", "-"]));

        pipeline.stdout_file(&self.paths.unsorted)
    }

    pub fn sort_pipeline(&self, toolbox: &Toolbox, tmp_prefix: &Path) -> Pipeline {
        Pipeline::new().stage(
            toolbox
                .samtools()
                .arg("sort")
                .arg("-o")
                .arg(&self.paths.sorted)
                .arg("-T")
                .arg(tmp_prefix)
                .arg(&self.paths.unsorted),
        )
    }

    /// Runs the region through the annotation pipeline and sorts it.
    ///
    /// Returns the sorted per-region artifact. The unsorted intermediate is gone afterwards,
    /// whatever the outcome.
    pub fn run(&self, toolbox: &Toolbox) -> anyhow::Result<PathBuf> {
        let result = self.run_stages(toolbox);
        remove_artifact(&self.paths.unsorted);
        if result.is_err() {
            remove_artifact(&self.paths.sorted);
        }
        result
    }

    fn run_stages(&self, toolbox: &Toolbox) -> anyhow::Result<PathBuf> {
        self.annotate_pipeline(toolbox)
            .run()
            .with_context(|| format!("Annotation of {} failed", self.region))?;

        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}.", self.ctx.stem))
            .tempdir_in(&self.ctx.tmp_dir)
            .with_context(|| {
                format!("Can't create a temp dir in {}", self.ctx.tmp_dir.display())
            })?;
        self.sort_pipeline(toolbox, &scratch.path().join("sort"))
            .run()
            .with_context(|| format!("Sorting {} failed", self.region))?;

        Ok(self.paths.sorted.clone())
    }
}
