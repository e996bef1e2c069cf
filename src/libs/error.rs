use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotateError {
    /// The output directory does not exist or is not a directory
    InvalidOutputDir(PathBuf),
    /// An input alignment file can't be used
    InvalidInput {
        path: PathBuf,
        reason: String,
    },
    /// A required executable is missing from the environment
    ToolNotFound {
        /// Role of the tool, e.g. "samtools"
        tool: String,
        /// The program name or path that was looked up
        program: String,
    },
    /// Malformed region string, unknown contig or empty interval
    InvalidRegion(String),
    /// No contig is shared by the alignment file and the reference genome
    NoChromosomesFound { input: PathBuf },
    /// Zero regions were resolved for an input
    EmptyInput(PathBuf),
    /// A pipeline stage exited with a non-zero status
    StageFailed { program: String, status: String },
    /// At least one region job failed, the merge was not run
    JobsFailed { failed: Vec<String> },
    /// Merging or indexing the final output failed
    MergeFailed(String),
}

impl fmt::Display for AnnotateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotateError::InvalidOutputDir(path) => {
                write!(f, "Invalid output dir: {}", path.display())
            }
            AnnotateError::InvalidInput { path, reason } => {
                write!(f, "Invalid input {}: {}", path.display(), reason)
            }
            AnnotateError::ToolNotFound { tool, program } => {
                write!(
                    f,
                    "{} not found: `{}` is not an executable in PATH",
                    tool, program
                )
            }
            AnnotateError::InvalidRegion(msg) => write!(f, "Invalid region: {}", msg),
            AnnotateError::NoChromosomesFound { input } => {
                write!(
                    f,
                    "Failed retrieving valid chromosome names for {}.\n\
                     Perhaps you are using a wrong genome reference.\n\
                     Check the --genome directory, and make sure the chromosomes \
                     in the bam header exist in its chrome.size",
                    input.display()
                )
            }
            AnnotateError::EmptyInput(path) => {
                write!(f, "Empty bam file, no region to process: {}", path.display())
            }
            AnnotateError::StageFailed { program, status } => {
                write!(f, "`{}` failed with {}", program, status)
            }
            AnnotateError::JobsFailed { failed } => {
                write!(f, "{} region job(s) failed: {}", failed.len(), failed.join(", "))
            }
            AnnotateError::MergeFailed(msg) => write!(f, "Merge failed: {}", msg),
        }
    }
}

impl std::error::Error for AnnotateError {}
