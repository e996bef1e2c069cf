#![allow(dead_code)]

//! Stand-ins for samtools and the annotation tools.
//!
//! Alignment "bam" files here are headerless SAM text. The fake samtools understands just the
//! subcommands a run issues, and every fake appends its argv to `$FAKE_LOG` when it is set.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const SAMTOOLS: &str = r#"#!/bin/sh
[ -n "$FAKE_LOG" ] && echo "samtools $*" >> "$FAKE_LOG"
cmd="$1"
shift
case "$cmd" in
  idxstats)
    cut -f 3 "$1" | sort -u | awk '{ print $1 "\t1000\t1\t0" }'
    ;;
  view)
    if [ "$1" = "-H" ]; then
      printf '@HD\tVN:1.6\tSO:coordinate\n'
    elif [ "$1" = "-b" ]; then
      awk '!/^@/'
    else
      case "$2" in
        ""|-*) cat "$1" ;;
        *:*-*)
          range="${2#*:}"
          awk -F '\t' -v c="${2%%:*}" -v s="${range%-*}" -v e="${range#*-}" \
            '$3 == c && $4 + 0 >= s + 0 && $4 + 0 <= e + 0' "$1"
          ;;
        *) awk -F '\t' -v c="$2" '$3 == c' "$1" ;;
      esac
    fi
    ;;
  sort)
    # -o <out> -T <prefix> <in>
    sort -t "$(printf '\t')" -k4,4n "$5" > "$2"
    ;;
  merge)
    # -c -p -f -h <header> <out> <parts>...
    shift 5
    out="$1"
    shift
    cat "$@" > "$out"
    ;;
  index)
    : > "$1.bai"
    ;;
  *)
    exit 1
    ;;
esac
"#;

const MATCH_MAKER: &str = r#"#!/bin/sh
[ -n "$FAKE_LOG" ] && echo "match_maker $*" >> "$FAKE_LOG"
cat
"#;

const ADD_CPG_COUNTS: &str = r#"#!/bin/sh
[ -n "$FAKE_LOG" ] && echo "add_cpg_counts $*" >> "$FAKE_LOG"
if [ -n "$FAKE_FAIL_ON" ] && [ "$2" = "$FAKE_FAIL_ON" ]; then
  echo "annotation failed on $2" >&2
  exit 1
fi
awk 'BEGIN { OFS = "\t" } { print $0, "YI:Z:1,0" }'
"#;

pub struct Tools {
    pub samtools: String,
    pub match_maker: String,
    pub add_cpg_count: String,
}

fn install(dir: &Path, name: &str, script: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

pub fn install_tools(dir: &Path) -> Tools {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    Tools {
        samtools: install(&bin, "samtools", SAMTOOLS),
        match_maker: install(&bin, "match_maker", MATCH_MAKER),
        add_cpg_count: install(&bin, "add_cpg_counts", ADD_CPG_COUNTS),
    }
}

/// A reference with chr1, chr2 and chr10, in that order
pub fn write_genome(dir: &Path) -> PathBuf {
    let genome = dir.join("genome");
    std::fs::create_dir_all(&genome).unwrap();
    std::fs::write(
        genome.join("chrome.size"),
        "chr1\t1000\nchr2\t1000\nchr10\t1000\n",
    )
    .unwrap();
    std::fs::write(genome.join("CpG.bed.gz"), "").unwrap();
    genome
}

pub fn record(name: &str, flag: u16, chrom: &str, pos: u64) -> String {
    format!(
        "{}\t{}\t{}\t{}\t60\t4M\t*\t0\t0\tACGT\tIIII\n",
        name, flag, chrom, pos
    )
}

/// Writes an indexed input holding the given records
pub fn write_bam(dir: &Path, name: &str, records: &[String]) -> PathBuf {
    let bam = dir.join(name);
    std::fs::write(&bam, records.concat()).unwrap();
    let mut bai = bam.clone().into_os_string();
    bai.push(".bai");
    std::fs::write(bai, "").unwrap();
    bam
}

/// Single-end reads scattered over all three contigs, out of order
pub fn single_end_records() -> Vec<String> {
    vec![
        record("r5", 0, "chr10", 50),
        record("r3", 16, "chr2", 30),
        record("r2", 0, "chr1", 20),
        record("r1", 0, "chr1", 10),
        record("r4", 0, "chr2", 5),
    ]
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
