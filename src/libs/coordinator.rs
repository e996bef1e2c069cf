use crate::libs::error::AnnotateError;
use crate::libs::job::{extract_header, Filters, Job, RunContext};
use crate::libs::merge;
use crate::libs::region::Region;
use crate::libs::tools::Toolbox;
use log::{error, info};
use rayon::prelude::*;
use std::path::PathBuf;

/// Terminal state of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub index: usize,
    pub region: Region,
    /// The sorted per-region artifact, or why the job failed
    pub artifact: Result<PathBuf, String>,
}

/// Outcomes of every dispatched job, in resolver order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    outcomes: Vec<JobOutcome>,
}

impl RunResult {
    /// Completion order is arbitrary, so outcomes are put back in resolver order here
    pub fn from_outcomes(mut outcomes: Vec<JobOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.index);
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[JobOutcome] {
        &self.outcomes
    }

    pub fn failed(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.artifact.is_err())
            .map(|o| o.region.to_string())
            .collect()
    }

    /// All artifacts in resolver order, or `JobsFailed` if any job didn't complete
    pub fn artifacts(&self) -> Result<Vec<PathBuf>, AnnotateError> {
        let failed = self.failed();
        if !failed.is_empty() {
            return Err(AnnotateError::JobsFailed { failed });
        }
        Ok(self
            .outcomes
            .iter()
            .filter_map(|o| o.artifact.as_ref().ok().cloned())
            .collect())
    }
}

fn run_job(job: &Job, toolbox: &Toolbox) -> JobOutcome {
    let artifact = match job.run(toolbox) {
        Ok(path) => {
            info!("Finished region {}", job.region);
            Ok(path)
        }
        Err(e) => {
            error!("Region {} failed: {:#}", job.region, e);
            Err(format!("{:#}", e))
        }
    };
    JobOutcome {
        index: job.index,
        region: job.region.clone(),
        artifact,
    }
}

/// Runs every job and waits for all of them.
///
/// A single explicit region runs inline. Otherwise jobs go to a pool of `threads` workers; a
/// failing job doesn't stop its siblings, since their external processes can't be cancelled
/// safely anyway.
pub fn dispatch(jobs: &[Job], toolbox: &Toolbox, threads: usize) -> anyhow::Result<RunResult> {
    let inline = jobs.len() == 1 && jobs.iter().all(|j| !j.ctx.request.is_whole());
    if inline {
        let outcomes = jobs.iter().map(|job| run_job(job, toolbox)).collect();
        return Ok(RunResult::from_outcomes(outcomes));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()?;
    let outcomes: Vec<JobOutcome> =
        pool.install(|| jobs.par_iter().map(|job| run_job(job, toolbox)).collect());

    Ok(RunResult::from_outcomes(outcomes))
}

/// Annotates one input: header, region jobs, merge, index.
///
/// Intermediate artifacts are removed on every path out of here. A final output left by an
/// earlier run is removed before any job starts, so on failure nothing with the final name
/// remains. On success only the final indexed output remains.
pub fn annotate(
    ctx: &RunContext,
    regions: &[Region],
    filters: &Filters,
    toolbox: &Toolbox,
    threads: usize,
) -> anyhow::Result<PathBuf> {
    if regions.is_empty() {
        return Err(AnnotateError::EmptyInput(ctx.input.clone()).into());
    }

    ctx.remove_final();
    let result = run_and_merge(ctx, regions, filters, toolbox, threads);
    info!("Removing intermediate files of {}", ctx.input.display());
    ctx.cleanup(regions);
    result
}

fn run_and_merge(
    ctx: &RunContext,
    regions: &[Region],
    filters: &Filters,
    toolbox: &Toolbox,
    threads: usize,
) -> anyhow::Result<PathBuf> {
    extract_header(ctx, toolbox)?;

    info!(
        "Processing {} region(s) of {} with {} worker(s)",
        regions.len(),
        ctx.input.display(),
        threads
    );
    let jobs = ctx.jobs(regions, filters);
    let run = dispatch(&jobs, toolbox, threads)?;
    let artifacts = run.artifacts()?;
    info!("Finished processing each region of {}", ctx.input.display());

    merge::finalize(ctx, &artifacts, toolbox)
}
