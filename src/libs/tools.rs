use crate::libs::error::AnnotateError;
use crate::libs::pipeline::{Pipeline, Stage};
use anyhow::{anyhow, Context};
use std::path::Path;

/// The external executables a run depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolbox {
    pub samtools: String,
    /// Pair-coalescing reorderer
    pub match_maker: String,
    /// CpG-annotation tool
    pub add_cpg_count: String,
}

impl Default for Toolbox {
    fn default() -> Self {
        Self {
            samtools: "samtools".to_string(),
            match_maker: "match_maker".to_string(),
            add_cpg_count: "add_cpg_counts".to_string(),
        }
    }
}

impl Toolbox {
    /// Tools every run needs. The reorderer is checked once paired-end input shows up.
    pub fn check(&self) -> Result<(), AnnotateError> {
        require("samtools", &self.samtools)?;
        require("CpG annotation tool", &self.add_cpg_count)?;
        Ok(())
    }

    pub fn check_match_maker(&self) -> Result<(), AnnotateError> {
        require("pair reorder tool", &self.match_maker)
    }

    pub fn samtools(&self) -> Stage {
        Stage::new(&self.samtools)
    }

    /// Contig names from the alignment index, `samtools idxstats` first column
    pub fn list_contigs(&self, input: &Path) -> anyhow::Result<Vec<String>> {
        let out = Pipeline::new()
            .stage(self.samtools().arg("idxstats").arg(input))
            .output()
            .with_context(|| format!("Failed to list contigs of {}", input.display()))?;

        let contigs = String::from_utf8_lossy(&out)
            .lines()
            .filter_map(|line| line.split('\t').next())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Ok(contigs)
    }

    pub fn header_pipeline(&self, input: &Path, out: &Path) -> Pipeline {
        Pipeline::new()
            .stage(self.samtools().arg("view").arg("-H").arg(input))
            .stdout_file(out)
    }

    /// Bit 0x1 of the first record's FLAG. An input with no record is single-end.
    pub fn is_paired_end(&self, input: &Path) -> anyhow::Result<bool> {
        let line = Pipeline::new()
            .stage(self.samtools().arg("view").arg(input))
            .first_line()
            .with_context(|| format!("Failed to read the first record of {}", input.display()))?;

        match line {
            None => Ok(false),
            Some(line) => {
                let flag = line
                    .split('\t')
                    .nth(1)
                    .and_then(|f| f.parse::<u16>().ok())
                    .ok_or_else(|| {
                        anyhow!("Malformed record in {}: {}", input.display(), line)
                    })?;
                Ok(flag & 0x1 == 0x1)
            }
        }
    }
}

fn require(tool: &str, program: &str) -> Result<(), AnnotateError> {
    which::which(program)
        .map(|_| ())
        .map_err(|_| AnnotateError::ToolNotFound {
            tool: tool.to_string(),
            program: program.to_string(),
        })
}
