//! Directory walking for the watch root and its delivery units.
//!
//! The watch root is only ever listed one level deep: each direct child
//! directory is a delivery unit. Inside a delivery unit the walk is
//! recursive and every file is classified with a [`PathMatcher`].

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::path_matcher::{FileClass, PathMatcher};

/// Classified contents of one delivery unit, in lexical path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderScan {
    /// Files carrying the marker pattern.
    pub eligible: Vec<PathBuf>,
    /// Media files without the marker pattern.
    pub near_misses: Vec<PathBuf>,
    /// Media files that are the output of an eligible sibling.
    pub outputs: Vec<PathBuf>,
    /// Number of non-media files skipped.
    pub ignored: usize,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// True if `path` can be a delivery unit: a non-hidden directory.
///
/// Symlinks are followed, so a link to a directory counts.
pub fn is_delivery_unit(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(is_hidden)
        .unwrap_or(false);
    !hidden && path.is_dir()
}

/// Lists the direct child directories of `root`, sorted by name.
///
/// Files directly in the root and hidden directories are not delivery units.
pub fn list_delivery_units(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut units = Vec::new();

    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if is_delivery_unit(&path) {
            units.push(path);
        }
    }

    units.sort();
    Ok(units)
}

/// Recursively walks `folder` and classifies every file.
///
/// Hidden directories below the folder are skipped. Unreadable entries are
/// skipped as well; they cannot be encoded anyway.
pub fn walk_folder(folder: &Path, matcher: &PathMatcher) -> FolderScan {
    let walker = WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() && entry.depth() > 0 {
                if let Some(name) = entry.file_name().to_str() {
                    return !is_hidden(name);
                }
            }
            true
        });

    let mut files = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    classify_files(files, matcher)
}

/// Splits a list of files into eligible, near-miss, pipeline-output and ignored.
fn classify_files(files: Vec<PathBuf>, matcher: &PathMatcher) -> FolderScan {
    let mut scan = FolderScan::default();
    let mut candidates = Vec::new();

    for path in files {
        let class = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|name| matcher.classify(name))
            .unwrap_or(FileClass::Ignored);

        match class {
            FileClass::Eligible => scan.eligible.push(path),
            FileClass::NearMiss => candidates.push(path),
            FileClass::Ignored => scan.ignored += 1,
        }
    }

    let derived: HashSet<PathBuf> = scan
        .eligible
        .iter()
        .filter_map(|input| matcher.output_path(input))
        .collect();

    for path in candidates {
        if derived.contains(&path) {
            scan.outputs.push(path);
        } else {
            scan.near_misses.push(path);
        }
    }

    scan
}
