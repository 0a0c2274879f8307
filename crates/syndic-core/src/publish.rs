//! Atomic publication of a rendered file set.
//!
//! The full output tree is written into a staging directory next to
//! the live root, then swapped in with two renames. Readers of the
//! live tree never observe a half-written state: they see the old tree
//! or the new one. Staging lives in the live root's parent so the
//! final rename stays on one filesystem.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::render::TargetOutput;

/// Publication failures. Any of these leaves the live tree as it was.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Filesystem operation failed.
    #[error("publish I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A rendered file path would escape the live root.
    #[error("output path escapes the publish root: {path}")]
    InvalidPath {
        /// The offending relative path.
        path: PathBuf,
    },

    /// The live root exists but is not a directory.
    #[error("publish root is not a directory: {path}")]
    NotADirectory {
        /// The configured live root.
        path: PathBuf,
    },
}

/// What one publish did to the live tree.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Files written into the new tree.
    pub written: usize,
    /// Hand-maintained files carried over from the previous tree.
    pub preserved: Vec<PathBuf>,
    /// Files present in the old tree but absent from the new one.
    pub removed: Vec<PathBuf>,
}

/// Replace the live tree under `root` with the rendered output.
///
/// Files listed in `preserve` are carried over from the previous tree
/// when the output does not redefine them. Everything else not in the
/// output set is dropped; the removals are reported, not silently
/// swallowed.
///
/// # Errors
///
/// Fails without touching the live tree if any output path is
/// non-relative, if staging cannot be created, or if the final swap
/// fails (a failed swap restores the previous tree).
pub fn publish(
    output: &TargetOutput,
    root: &Path,
    preserve: &[String],
) -> Result<PublishReport, PublishError> {
    for path in output.files.keys() {
        validate_relative(path)?;
    }
    if root.exists() && !root.is_dir() {
        return Err(PublishError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let parent = root.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".syndic-stage-")
        .tempdir_in(parent)?;

    let mut report = PublishReport::default();
    for (path, content) in &output.files {
        let dest = staging.path().join(path);
        if let Some(dir) = dest.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&dest, content)?;
        report.written += 1;
    }

    // Carry hand-maintained assets across the swap.
    for name in preserve {
        let rel = PathBuf::from(name);
        if validate_relative(&rel).is_err() {
            warn!(file = %name, "ignoring non-relative preserve entry");
            continue;
        }
        if output.files.contains_key(&rel) {
            continue;
        }
        let source = root.join(&rel);
        if source.is_file() {
            let dest = staging.path().join(&rel);
            if let Some(dir) = dest.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::copy(&source, &dest)?;
            report.preserved.push(rel);
        }
    }

    report.removed = removed_files(root, output, preserve);

    swap(staging, root)?;
    info!(
        target = %output.target,
        root = %root.display(),
        written = report.written,
        removed = report.removed.len(),
        "published"
    );
    Ok(report)
}

/// Rename the staging tree into place, keeping the old tree as a
/// backup until the new one is live.
fn swap(staging: tempfile::TempDir, root: &Path) -> Result<(), PublishError> {
    if !root.exists() {
        let staged = staging.keep();
        if let Err(err) = std::fs::rename(&staged, root) {
            let _ = std::fs::remove_dir_all(&staged);
            return Err(err.into());
        }
        return Ok(());
    }

    // Failures up to the first rename leave the live tree untouched;
    // `staging` is still owned here and cleans itself up on drop.
    let backup = root.with_extension("syndic-old");
    if backup.exists() {
        std::fs::remove_dir_all(&backup)?;
    }
    std::fs::rename(root, &backup)?;
    let staged = staging.keep();
    if let Err(err) = std::fs::rename(&staged, root) {
        // Put the previous tree back before surfacing the error.
        warn!(root = %root.display(), "swap failed, restoring previous tree");
        let _ = std::fs::rename(&backup, root);
        let _ = std::fs::remove_dir_all(&staged);
        return Err(err.into());
    }
    std::fs::remove_dir_all(&backup)?;
    Ok(())
}

/// Relative paths only, with no `..` or root components.
fn validate_relative(path: &Path) -> Result<(), PublishError> {
    let ok = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if ok && path.components().next().is_some() {
        Ok(())
    } else {
        Err(PublishError::InvalidPath {
            path: path.to_path_buf(),
        })
    }
}

/// Files in the old tree that the new output set no longer contains.
fn removed_files(root: &Path, output: &TargetOutput, preserve: &[String]) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    let preserved: BTreeSet<PathBuf> = preserve.iter().map(PathBuf::from).collect();
    let mut removed = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_path_buf();
        if !output.files.contains_key(&rel) && !preserved.contains(&rel) {
            debug!(file = %rel.display(), "pruning file absent from new output");
            removed.push(rel);
        }
    }
    removed.sort();
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Target;
    use tempfile::TempDir;

    fn output_with(files: &[(&str, &str)]) -> TargetOutput {
        let mut output = TargetOutput::new(Target::Altstore);
        for (path, content) in files {
            output.add(*path, content.as_bytes().to_vec());
        }
        output
    }

    #[test]
    fn publishes_into_fresh_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo");
        let output = output_with(&[("apps.json", "{}"), ("sub/index.json", "{}")]);

        let report = publish(&output, &root, &[]).unwrap();
        assert_eq!(report.written, 2);
        assert!(root.join("apps.json").is_file());
        assert!(root.join("sub/index.json").is_file());
    }

    #[test]
    fn replaces_content_and_reports_removals() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo");

        publish(&output_with(&[("a.json", "old"), ("b.json", "old")]), &root, &[]).unwrap();
        let report = publish(&output_with(&[("a.json", "new")]), &root, &[]).unwrap();

        assert_eq!(std::fs::read_to_string(root.join("a.json")).unwrap(), "new");
        assert!(!root.join("b.json").exists());
        assert_eq!(report.removed, vec![PathBuf::from("b.json")]);
    }

    #[test]
    fn preserves_hand_maintained_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("README.md"), "hand-written").unwrap();

        let report = publish(
            &output_with(&[("apps.json", "{}")]),
            &root,
            &["README.md".to_string()],
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(root.join("README.md")).unwrap(),
            "hand-written"
        );
        assert_eq!(report.preserved, vec![PathBuf::from("README.md")]);
        assert!(report.removed.is_empty());
    }

    #[test]
    fn output_wins_over_preserve_list() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("README.md"), "old").unwrap();

        publish(
            &output_with(&[("README.md", "generated")]),
            &root,
            &["README.md".to_string()],
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(root.join("README.md")).unwrap(),
            "generated"
        );
    }

    #[test]
    fn rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("keep.json"), "{}").unwrap();

        let mut output = TargetOutput::new(Target::Altstore);
        output.add("../escape.json", b"{}".to_vec());
        let err = publish(&output, &root, &[]).unwrap_err();

        assert!(matches!(err, PublishError::InvalidPath { .. }));
        // Live tree untouched.
        assert!(root.join("keep.json").is_file());
        assert!(!dir.path().join("escape.json").exists());
    }

    #[test]
    fn failed_swap_leaves_live_tree_untouched() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo");
        publish(&output_with(&[("apps.json", "v1")]), &root, &[]).unwrap();

        // Occupy the backup path with a plain file so the swap fails
        // after staging is fully written.
        std::fs::write(dir.path().join("repo.syndic-old"), "in the way").unwrap();
        let err = publish(&output_with(&[("apps.json", "v2")]), &root, &[]).unwrap_err();
        assert!(matches!(err, PublishError::Io(_)));

        // The previously published tree is byte-identical.
        assert_eq!(
            std::fs::read_to_string(root.join("apps.json")).unwrap(),
            "v1"
        );
        // And the aborted staging directory was cleaned up.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".syndic-stage-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn no_stale_staging_left_behind() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo");
        publish(&output_with(&[("apps.json", "{}")]), &root, &[]).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".syndic-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
