//! Typed process pipelines.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Each stage's stdout is connected to the next
//! stage's stdin through an OS pipe; the first stage may read a file and the last one may write a
//! file or be captured. Nothing goes through a shell, so arguments never need escaping.
//!
//! ```
//! use bamcpg::libs::pipeline::{Pipeline, Stage};
//!
//! let pipeline = Pipeline::new()
//!     .stage(Stage::new("samtools").args(["view", "in.bam", "chr1"]))
//!     .stage(Stage::new("cat").arg("in.header").arg("-"))
//!     .stdout_file("out.sam");
//! assert_eq!(
//!     pipeline.to_string(),
//!     "samtools view in.bam chr1 | cat in.header - > out.sam"
//! );
//! ```

use crate::libs::error::AnnotateError;
use anyhow::anyhow;
use log::debug;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

/// Exit code reported by a shell for a process killed by SIGPIPE
pub const BROKEN_PIPE_EXIT: i32 = 141;

const SIGPIPE: i32 = 13;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    program: String,
    args: Vec<OsString>,
}

impl Stage {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_os_string());
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(&arg.to_string_lossy()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
    stdin: Option<PathBuf>,
    stdout: Option<PathBuf>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Feeds a file to the first stage
    pub fn stdin_file(mut self, path: impl AsRef<Path>) -> Self {
        self.stdin = Some(path.as_ref().to_path_buf());
        self
    }

    /// Writes the last stage's stdout to a file
    pub fn stdout_file(mut self, path: impl AsRef<Path>) -> Self {
        self.stdout = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs all stages to completion.
    ///
    /// Every child is reaped before the first failure, if any, is returned.
    pub fn run(&self) -> anyhow::Result<()> {
        debug!("{}", self);
        let children = self.spawn(false)?;
        self.wait_all(children)
    }

    /// Runs all stages and returns what the last one printed
    pub fn output(&self) -> anyhow::Result<Vec<u8>> {
        debug!("{}", self);
        let mut children = self.spawn(true)?;

        let mut buf = vec![];
        let read = match children.last_mut().and_then(|c| c.stdout.take()) {
            Some(mut out) => out.read_to_end(&mut buf).map(|_| ()),
            None => Ok(()),
        };
        self.wait_all(children)?;
        read?;

        Ok(buf)
    }

    /// Reads the first line of output, then stops the pipeline.
    ///
    /// Once a line is in hand the children are killed and their exit statuses are not checked.
    /// With no output at all, every stage ran to the end and must have succeeded.
    pub fn first_line(&self) -> anyhow::Result<Option<String>> {
        debug!("{} (first line)", self);
        let mut children = self.spawn(true)?;

        let mut line = String::new();
        let read = match children.last_mut().and_then(|c| c.stdout.take()) {
            Some(out) => BufReader::new(out).read_line(&mut line),
            None => Ok(0),
        };

        match read {
            Ok(0) => {
                self.wait_all(children)?;
                Ok(None)
            }
            Ok(_) => {
                reap(&mut children);
                let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
                Ok(Some(line.to_string()))
            }
            Err(e) => {
                reap(&mut children);
                Err(anyhow!("Failed to read from `{}`: {}", self, e))
            }
        }
    }

    fn spawn(&self, capture: bool) -> anyhow::Result<Vec<Child>> {
        if self.stages.is_empty() {
            return Err(anyhow!("Empty pipeline"));
        }

        let n = self.stages.len();
        let mut children: Vec<Child> = Vec::with_capacity(n);
        let mut upstream: Option<ChildStdout> = None;

        for (i, stage) in self.stages.iter().enumerate() {
            let is_last = i + 1 == n;

            let stdin = match upstream.take() {
                Some(out) => Stdio::from(out),
                None => match &self.stdin {
                    Some(path) => match File::open(path) {
                        Ok(file) => Stdio::from(file),
                        Err(e) => {
                            reap(&mut children);
                            return Err(anyhow!("Can't open {}: {}", path.display(), e));
                        }
                    },
                    None => Stdio::null(),
                },
            };

            let stdout = if !is_last || capture {
                Stdio::piped()
            } else {
                match &self.stdout {
                    Some(path) => match File::create(path) {
                        Ok(file) => Stdio::from(file),
                        Err(e) => {
                            reap(&mut children);
                            return Err(anyhow!("Can't create {}: {}", path.display(), e));
                        }
                    },
                    None => Stdio::inherit(),
                }
            };

            let spawned = Command::new(&stage.program)
                .args(&stage.args)
                .stdin(stdin)
                .stdout(stdout)
                .spawn();
            let mut child = match spawned {
                Ok(child) => child,
                Err(e) => {
                    reap(&mut children);
                    return Err(anyhow!("Failed to execute `{}`: {}", stage.program, e));
                }
            };

            if !is_last {
                upstream = child.stdout.take();
            }
            children.push(child);
        }

        Ok(children)
    }

    fn wait_all(&self, children: Vec<Child>) -> anyhow::Result<()> {
        let n = children.len();
        let mut first_err: Option<anyhow::Error> = None;

        for (i, (stage, mut child)) in self.stages.iter().zip(children).enumerate() {
            let checked = match child.wait() {
                Ok(status) => {
                    check_status(&stage.program, status, i + 1 < n).map_err(anyhow::Error::from)
                }
                Err(e) => Err(anyhow!("Failed to wait on `{}`: {}", stage.program, e)),
            };
            if let Err(e) = checked {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", stage)?;
            if i == 0 {
                if let Some(path) = &self.stdin {
                    write!(f, " < {}", shell_quote(&path.to_string_lossy()))?;
                }
            }
        }
        if let Some(path) = &self.stdout {
            write!(f, " > {}", shell_quote(&path.to_string_lossy()))?;
        }
        Ok(())
    }
}

fn reap(children: &mut Vec<Child>) {
    for mut child in children.drain(..) {
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// A stage that feeds a downstream stage may die of SIGPIPE when the downstream one exits early,
/// e.g. behind `head`. That is not a failure.
pub fn check_status(
    program: &str,
    status: ExitStatus,
    has_downstream: bool,
) -> Result<(), AnnotateError> {
    if status.success() || (has_downstream && is_broken_pipe(&status)) {
        return Ok(());
    }
    Err(AnnotateError::StageFailed {
        program: program.to_string(),
        status: status.to_string(),
    })
}

fn is_broken_pipe(status: &ExitStatus) -> bool {
    if status.code() == Some(BROKEN_PIPE_EXIT) {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(SIGPIPE) {
            return true;
        }
    }
    false
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:,=+@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
