use crate::libs::error::AnnotateError;
use crate::libs::job::RunContext;
use crate::libs::tools::Toolbox;
use cmd_lib::run_cmd;
use log::info;
use std::path::PathBuf;

/// Merges the per-region artifacts into the run's final output and indexes it.
///
/// Parts are in reference contig order and each is coordinate-sorted, so `samtools merge` under
/// the shared header gives a sorted file as a whole. On failure, neither the final output nor its
/// index is left behind.
pub fn finalize(
    ctx: &RunContext,
    parts: &[PathBuf],
    toolbox: &Toolbox,
) -> anyhow::Result<PathBuf> {
    let final_path = &ctx.final_path;

    info!(
        "Merging {} file(s) into {}",
        parts.len(),
        final_path.display()
    );
    if let Err(e) = merge_and_index(ctx, parts, toolbox) {
        ctx.remove_final();
        return Err(AnnotateError::MergeFailed(e.to_string()).into());
    }

    info!("Finished {}", final_path.display());
    Ok(final_path.clone())
}

fn merge_and_index(
    ctx: &RunContext,
    parts: &[PathBuf],
    toolbox: &Toolbox,
) -> std::io::Result<()> {
    let samtools = &toolbox.samtools;
    let header = ctx.header.display().to_string();
    let outfile = ctx.final_path.display().to_string();
    let infiles: Vec<String> = parts.iter().map(|p| p.display().to_string()).collect();

    run_cmd!(${samtools} merge -c -p -f -h ${header} ${outfile} $[infiles])?;

    info!("Indexing {}", outfile);
    run_cmd!(${samtools} index ${outfile})?;

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::libs::genome::GenomeRef;
    use crate::libs::job::with_suffix;
    use crate::libs::region::Region;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::tempdir;

    // merge concatenates the parts, index fails when asked to
    fn fake_samtools(dir: &Path, index_ok: bool) -> String {
        let path = dir.join("samtools");
        let index = if index_ok { ": > \"$1.bai\"" } else { "exit 1" };
        let script = format!(
            "#!/bin/sh\ncmd=\"$1\"\nshift\ncase \"$cmd\" in\n  \
             merge) shift 5; out=\"$1\"; shift; cat \"$@\" > \"$out\" ;;\n  \
             index) {} ;;\nesac\n",
            index
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn context(out: &Path) -> RunContext {
        let genome = GenomeRef::from_contigs(
            PathBuf::from("ref"),
            vec![("chr1".to_string(), 100), ("chr2".to_string(), 100)],
        );
        RunContext::new(
            Path::new("s.bam"),
            &Region::Whole,
            false,
            &genome,
            out,
            None,
            "counts",
        )
        .unwrap()
    }

    fn parts(out: &Path) -> Vec<PathBuf> {
        let parts = vec![out.join("s_chr1.output.bam"), out.join("s_chr2.output.bam")];
        std::fs::write(&parts[0], "a\n").unwrap();
        std::fs::write(&parts[1], "b\n").unwrap();
        parts
    }

    #[test]
    fn test_finalize_keeps_part_order() {
        let dir = tempdir().unwrap();
        let toolbox = Toolbox {
            samtools: fake_samtools(dir.path(), true),
            ..Default::default()
        };
        let ctx = context(dir.path());
        std::fs::write(&ctx.header, "@HD\n").unwrap();

        let path = finalize(&ctx, &parts(dir.path()), &toolbox).unwrap();
        assert_eq!(path, dir.path().join("s.counts.bam"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
        assert!(with_suffix(&path, ".bai").is_file());
    }

    #[test]
    fn test_failed_index_removes_final() {
        let dir = tempdir().unwrap();
        let toolbox = Toolbox {
            samtools: fake_samtools(dir.path(), false),
            ..Default::default()
        };
        let ctx = context(dir.path());
        std::fs::write(&ctx.header, "@HD\n").unwrap();

        let err = finalize(&ctx, &parts(dir.path()), &toolbox).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnnotateError>(),
            Some(AnnotateError::MergeFailed(_))
        ));
        assert!(!ctx.final_path.exists());
        assert!(!with_suffix(&ctx.final_path, ".bai").exists());
    }
}
