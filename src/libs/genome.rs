//! Reference genome descriptor.
//!
//! A reference directory looks like:
//!
//! ```text
//! hg38/
//!     chrome.size     # contig <TAB> length, canonical order
//!     CpG.bed.gz      # per-base CpG dictionary, handed to the annotation tool
//! ```

use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

pub const CHROM_SIZES_FILE: &str = "chrome.size";
pub const DICT_FILE: &str = "CpG.bed.gz";

#[derive(Debug, Clone)]
pub struct GenomeRef {
    root: PathBuf,
    contigs: Vec<(String, u64)>,
    rank_of: HashMap<String, usize>,
}

impl GenomeRef {
    /// ```
    /// let dir = tempfile::tempdir().unwrap();
    /// std::fs::write(dir.path().join("chrome.size"), "chr2\t100\nchr1\t200\n").unwrap();
    /// std::fs::write(dir.path().join("CpG.bed.gz"), "").unwrap();
    ///
    /// let genome = bamcpg::libs::genome::GenomeRef::from_dir(dir.path()).unwrap();
    /// assert_eq!(genome.contigs(), vec!["chr2", "chr1"]);
    /// assert_eq!(genome.contig_len("chr1"), Some(200));
    /// assert_eq!(genome.rank("chr1"), Some(1));
    /// ```
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(anyhow!("Invalid genome dir: {}", root.display()));
        }

        let sizes = root.join(CHROM_SIZES_FILE);
        let dict = root.join(DICT_FILE);
        for path in [&sizes, &dict] {
            if !path.is_file() {
                return Err(anyhow!(
                    "Genome reference is missing {}",
                    path.display()
                ));
            }
        }

        let reader = intspan::reader(&sizes.to_string_lossy());
        let contigs = parse_sizes(reader)
            .with_context(|| format!("Failed to read {}", sizes.display()))?;
        if contigs.is_empty() {
            return Err(anyhow!("No contig listed in {}", sizes.display()));
        }

        Ok(Self::from_contigs(root, contigs))
    }

    pub fn from_contigs(root: PathBuf, contigs: Vec<(String, u64)>) -> Self {
        let rank_of = contigs
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Self {
            root,
            contigs,
            rank_of,
        }
    }

    pub fn dict_path(&self) -> PathBuf {
        self.root.join(DICT_FILE)
    }

    pub fn chrom_sizes_path(&self) -> PathBuf {
        self.root.join(CHROM_SIZES_FILE)
    }

    /// Contig names in canonical order
    pub fn contigs(&self) -> Vec<&str> {
        self.contigs.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn contig_len(&self, name: &str) -> Option<u64> {
        self.rank_of.get(name).map(|&i| self.contigs[i].1)
    }

    pub fn rank(&self, name: &str) -> Option<usize> {
        self.rank_of.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rank_of.contains_key(name)
    }
}

fn parse_sizes<R: BufRead>(reader: R) -> anyhow::Result<Vec<(String, u64)>> {
    let mut contigs = vec![];
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 2 {
            return Err(anyhow!("Line {}: expected `contig<TAB>length`", i + 1));
        }
        let len = fields[1]
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow!("Line {}: invalid length `{}`", i + 1, fields[1]))?;
        contigs.push((fields[0].to_string(), len));
    }

    Ok(contigs)
}
