use crate::libs::error::AnnotateError;
use crate::libs::genome::GenomeRef;
use crate::libs::tools::Toolbox;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

lazy_static! {
    static ref RE_REGION: Regex =
        Regex::new(r"^(?P<chr>[^\s:]+)(?::(?P<start>[\d,]+)-(?P<end>[\d,]+))?$").unwrap();
}

/// A processing unit, or the restriction requested by the user.
///
/// Coordinates of `Explicit` are 1-based and inclusive, as samtools reads them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Region {
    Whole,
    NamedContig(String),
    Explicit { chrom: String, start: u64, end: u64 },
}

impl FromStr for Region {
    type Err = AnnotateError;

    /// ```
    /// use bamcpg::libs::region::Region;
    ///
    /// let region: Region = "chr1:1,000-2,000".parse().unwrap();
    /// assert_eq!(region.to_string(), "chr1:1000-2000");
    ///
    /// let region: Region = "chrM".parse().unwrap();
    /// assert_eq!(region, Region::NamedContig("chrM".to_string()));
    ///
    /// assert!("chr1:200-100".parse::<Region>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let caps = RE_REGION
            .captures(s)
            .ok_or_else(|| AnnotateError::InvalidRegion(format!("can't parse `{}`", s)))?;
        let chrom = caps["chr"].to_string();

        match (caps.name("start"), caps.name("end")) {
            (Some(start), Some(end)) => {
                let start = parse_coord(start.as_str())?;
                let end = parse_coord(end.as_str())?;
                if start == 0 {
                    return Err(AnnotateError::InvalidRegion(format!(
                        "`{}`: start is 1-based",
                        s
                    )));
                }
                if end < start {
                    return Err(AnnotateError::InvalidRegion(format!(
                        "`{}`: end before start",
                        s
                    )));
                }
                Ok(Region::Explicit { chrom, start, end })
            }
            _ => Ok(Region::NamedContig(chrom)),
        }
    }
}

fn parse_coord(s: &str) -> Result<u64, AnnotateError> {
    s.replace(',', "")
        .parse::<u64>()
        .map_err(|_| AnnotateError::InvalidRegion(format!("bad coordinate `{}`", s)))
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Whole => write!(f, "all"),
            Region::NamedContig(chrom) => write!(f, "{}", chrom),
            Region::Explicit { chrom, start, end } => write!(f, "{}:{}-{}", chrom, start, end),
        }
    }
}

impl Region {
    pub fn is_whole(&self) -> bool {
        matches!(self, Region::Whole)
    }

    pub fn contig(&self) -> Option<&str> {
        match self {
            Region::Whole => None,
            Region::NamedContig(chrom) | Region::Explicit { chrom, .. } => Some(chrom.as_str()),
        }
    }

    /// Widens an interval by `by` bases on both sides, so that reads starting before the first
    /// in-region CpG are still fetched with their mate. Contigs are already complete.
    pub fn extend(&self, by: u64) -> Region {
        match self {
            Region::Explicit { chrom, start, end } => Region::Explicit {
                chrom: chrom.clone(),
                start: start.saturating_sub(by).max(1),
                end: end.saturating_add(by),
            },
            other => other.clone(),
        }
    }

    /// File-name-safe form, `chr1:100-200` => `chr1_100_200`
    pub fn name_token(&self) -> String {
        self.to_string().replace(|c: char| c == ':' || c == '-', "_")
    }

    /// Checks a user-supplied region against the reference
    pub fn validate(&self, genome: &GenomeRef) -> Result<(), AnnotateError> {
        let chrom = match self.contig() {
            Some(chrom) => chrom,
            None => return Ok(()),
        };
        let len = genome.contig_len(chrom).ok_or_else(|| {
            AnnotateError::InvalidRegion(format!("`{}` is not in the reference genome", chrom))
        })?;
        if let Region::Explicit { end, .. } = self {
            if *end > len {
                return Err(AnnotateError::InvalidRegion(format!(
                    "`{}` ends beyond {} ({} bp)",
                    self, chrom, len
                )));
            }
        }
        Ok(())
    }
}

/// Computes the ordered processing units for one input.
///
/// An explicit request yields itself and no contig listing runs. Otherwise the contigs of the
/// alignment index are intersected with the reference, in the reference's canonical order.
pub fn resolve_regions(
    request: &Region,
    input: &Path,
    toolbox: &Toolbox,
    genome: &GenomeRef,
) -> anyhow::Result<Vec<Region>> {
    if !request.is_whole() {
        request.validate(genome)?;
        return Ok(vec![request.clone()]);
    }

    let bam_contigs = toolbox.list_contigs(input)?;
    let regions = intersect_contigs(input, &bam_contigs, genome)?;
    Ok(regions)
}

pub fn intersect_contigs(
    input: &Path,
    bam_contigs: &[String],
    genome: &GenomeRef,
) -> Result<Vec<Region>, AnnotateError> {
    let in_bam: HashSet<&str> = bam_contigs.iter().map(|s| s.as_str()).collect();

    let regions: Vec<Region> = genome
        .contigs()
        .into_iter()
        .filter(|c| in_bam.contains(c))
        .map(|c| Region::NamedContig(c.to_string()))
        .collect();

    if regions.is_empty() {
        return Err(AnnotateError::NoChromosomesFound {
            input: input.to_path_buf(),
        });
    }
    Ok(regions)
}
