//! Filesystem exploration for the analysis agent.
//!
//! Provides the file enumeration and reading primitives the agent's tools
//! are built on: a pruned, ignore-aware directory walk, a whole-file reader
//! that refuses binary content, and a bounded partial reader for large
//! files. All failure modes are typed values so a failed tool call can be
//! surfaced to the model as an observation instead of aborting the run.

use crate::ignore::IgnoreRuleSet;
use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Bytes inspected for NUL when sniffing binary content.
const BINARY_SAMPLE_BYTES: usize = 8192;

/// Failure modes of the explorer, reported as values rather than panics.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("not a file: {0}")]
    NotAFile(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("cannot read binary file: {0}")]
    BinaryContent(PathBuf),

    #[error("path escapes the base directory: {0}")]
    OutsideRoot(PathBuf),

    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ExplorerError {
    fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Kind of a discovered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    #[allow(dead_code)] // Directories are pruned in place, never yielded
    Directory,
}

/// A file discovered during enumeration. Recomputed on every walk; nothing
/// here is cached across calls.
#[derive(Debug, Clone)]
pub struct FileSystemEntry {
    /// Absolute path on disk.
    #[allow(dead_code)] // Metadata for tools that need the on-disk path
    pub absolute: PathBuf,
    /// Path relative to the exploration root.
    pub relative: PathBuf,
    /// File or directory.
    #[allow(dead_code)] // Enumeration yields files; kept for completeness
    pub kind: EntryKind,
    /// Whether any path segment starts with `.`.
    pub hidden: bool,
    /// Size in bytes (files only).
    pub size: Option<u64>,
}

/// Options for a `find_files` walk.
#[derive(Debug, Clone)]
pub struct FindOptions {
    /// Glob the file must match. Patterns containing `/` are tested against
    /// the root-relative path, others against the file name alone.
    pub pattern: String,
    /// Consult the ignore rules and prune matching subtrees.
    pub respect_ignore: bool,
    /// Yield hidden files and descend into hidden directories.
    pub include_hidden: bool,
    /// Descend into subdirectories at all.
    pub recursive: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            respect_ignore: true,
            include_hidden: false,
            recursive: true,
        }
    }
}

/// Read-only view over one codebase directory.
pub struct Explorer {
    root: PathBuf,
    ignore: IgnoreRuleSet,
}

impl Explorer {
    /// Open an explorer rooted at `root`. The root is canonicalized so the
    /// containment check in [`resolve`](Self::resolve) sees through
    /// symlinks, and the ignore rules are compiled once up front.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ExplorerError> {
        let raw: PathBuf = root.into();
        let root = raw
            .canonicalize()
            .map_err(|e| ExplorerError::from_io(&raw, e))?;
        if !root.is_dir() {
            return Err(ExplorerError::NotADirectory(root));
        }
        let ignore = IgnoreRuleSet::build(&root);
        debug!(
            "Explorer rooted at {} with {} ignore rules",
            root.display(),
            ignore.len()
        );
        Ok(Self { root, ignore })
    }

    /// The canonical exploration root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path against the root, rejecting anything
    /// that escapes it after canonicalization.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ExplorerError> {
        let joined = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        };

        let canonical = joined
            .canonicalize()
            .map_err(|e| ExplorerError::from_io(&joined, e))?;
        if !canonical.starts_with(&self.root) {
            return Err(ExplorerError::OutsideRoot(joined));
        }
        Ok(canonical)
    }

    /// Enumerate files under the root.
    ///
    /// Ignored and hidden directories are pruned before descent, so nothing
    /// beneath them is ever visited. Results are sorted by path for
    /// deterministic output.
    pub fn find_files(&self, options: &FindOptions) -> Result<Vec<FileSystemEntry>, ExplorerError> {
        self.find_files_in(&self.root, options)
    }

    /// Enumerate files under a directory inside the root. Relative paths in
    /// the returned entries are always relative to the root, not to `dir`,
    /// so ignore rules and the model's view of the tree stay consistent.
    pub fn find_files_in(
        &self,
        dir: &Path,
        options: &FindOptions,
    ) -> Result<Vec<FileSystemEntry>, ExplorerError> {
        let meta = fs::metadata(dir).map_err(|e| ExplorerError::from_io(dir, e))?;
        if !meta.is_dir() {
            return Err(ExplorerError::NotADirectory(dir.to_path_buf()));
        }

        let pattern = FindPattern::compile(&options.pattern)?;
        let max_depth = if options.recursive { usize::MAX } else { 1 };

        let walker = WalkDir::new(dir)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let rel = match entry.path().strip_prefix(&self.root) {
                    Ok(rel) => rel,
                    Err(_) => return true,
                };
                if !options.include_hidden && is_hidden(rel) {
                    return false;
                }
                if options.respect_ignore {
                    let is_dir = entry.file_type().is_dir();
                    if self.ignore.matches(&to_posix(rel), is_dir) {
                        return false;
                    }
                }
                true
            });

        let mut entries = Vec::new();
        for item in walker {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if entry.depth() == 0 || !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();
            if !pattern.matches(&rel) {
                continue;
            }
            let size = entry.metadata().ok().map(|m| m.len());
            entries.push(FileSystemEntry {
                absolute: entry.path().to_path_buf(),
                relative: rel.clone(),
                kind: EntryKind::File,
                hidden: is_hidden(&rel),
                size,
            });
        }

        Ok(entries)
    }

    /// Read an entire file as UTF-8 text. Files that carry a NUL byte in
    /// their leading sample, or that are not valid UTF-8, are reported as
    /// binary and refused.
    pub fn read_file(&self, path: &Path) -> Result<String, ExplorerError> {
        let meta = fs::metadata(path).map_err(|e| ExplorerError::from_io(path, e))?;
        if !meta.is_file() {
            return Err(ExplorerError::NotAFile(path.to_path_buf()));
        }

        let bytes = fs::read(path).map_err(|e| ExplorerError::from_io(path, e))?;
        if looks_binary(&bytes) {
            return Err(ExplorerError::BinaryContent(path.to_path_buf()));
        }
        String::from_utf8(bytes).map_err(|_| ExplorerError::BinaryContent(path.to_path_buf()))
    }

    /// Read up to `line_count` lines starting after `line_offset` skipped
    /// lines. Bounds the size of reads on large files.
    pub fn read_partial(
        &self,
        path: &Path,
        line_offset: usize,
        line_count: usize,
    ) -> Result<Vec<String>, ExplorerError> {
        let content = self.read_file(path)?;
        Ok(content
            .lines()
            .skip(line_offset)
            .take(line_count)
            .map(str::to_string)
            .collect())
    }
}

/// A compiled find pattern. Patterns containing a separator are matched
/// against the whole relative path, bare patterns against the file name.
struct FindPattern {
    matcher: GlobMatcher,
    on_full_path: bool,
}

impl FindPattern {
    fn compile(pattern: &str) -> Result<Self, ExplorerError> {
        let on_full_path = pattern.contains('/');
        let glob = GlobBuilder::new(pattern)
            .literal_separator(on_full_path)
            .build()
            .map_err(|e| ExplorerError::InvalidPattern {
                pattern: pattern.to_string(),
                source: e,
            })?;
        Ok(Self {
            matcher: glob.compile_matcher(),
            on_full_path,
        })
    }

    fn matches(&self, relative: &Path) -> bool {
        if self.on_full_path {
            self.matcher.is_match(to_posix(relative))
        } else {
            match relative.file_name() {
                Some(name) => self.matcher.is_match(name),
                None => false,
            }
        }
    }
}

/// True when any path segment starts with `.`.
fn is_hidden(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Render a relative path with forward slashes, the form ignore rules use.
fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// NUL in the leading sample marks the content as binary.
fn looks_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_SAMPLE_BYTES)];
    sample.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_find_respects_gitignore() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.py", "print('a')");
        write(temp_dir.path(), "b.log", "noise");
        write(temp_dir.path(), ".gitignore", "*.log\n");

        let explorer = Explorer::new(temp_dir.path()).unwrap();
        let entries = explorer.find_files(&FindOptions::default()).unwrap();

        let names: Vec<_> = entries
            .iter()
            .map(|e| e.relative.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.py"]);
    }

    #[test]
    fn test_pruned_directory_excludes_everything_beneath_it() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "src/main.rs", "fn main() {}");
        write(temp_dir.path(), "node_modules/pkg/index.js", "x");

        let explorer = Explorer::new(temp_dir.path()).unwrap();
        let entries = explorer.find_files(&FindOptions::default()).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative, PathBuf::from("src/main.rs"));
    }

    #[test]
    fn test_hidden_files_need_opt_in() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "visible.rs", "");
        write(temp_dir.path(), ".secret/config.rs", "");

        let explorer = Explorer::new(temp_dir.path()).unwrap();

        let default = explorer.find_files(&FindOptions::default()).unwrap();
        assert_eq!(default.len(), 1);

        let with_hidden = explorer
            .find_files(&FindOptions {
                include_hidden: true,
                ..FindOptions::default()
            })
            .unwrap();
        assert_eq!(with_hidden.len(), 2);
        assert!(with_hidden.iter().any(|e| e.hidden));
    }

    #[test]
    fn test_non_recursive_walk_stays_at_top_level() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "top.rs", "");
        write(temp_dir.path(), "sub/deep.rs", "");

        let explorer = Explorer::new(temp_dir.path()).unwrap();
        let entries = explorer
            .find_files(&FindOptions {
                recursive: false,
                ..FindOptions::default()
            })
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative, PathBuf::from("top.rs"));
    }

    #[test]
    fn test_pattern_filters_by_file_name() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "main.rs", "");
        write(temp_dir.path(), "notes.md", "");
        write(temp_dir.path(), "sub/lib.rs", "");

        let explorer = Explorer::new(temp_dir.path()).unwrap();
        let entries = explorer
            .find_files(&FindOptions {
                pattern: "*.rs".to_string(),
                ..FindOptions::default()
            })
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| e.relative.extension().and_then(|x| x.to_str()) == Some("rs")));
    }

    #[test]
    fn test_results_are_sorted_and_repeatable() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "zeta.rs", "");
        write(temp_dir.path(), "alpha.rs", "");
        write(temp_dir.path(), "mid.rs", "");

        let explorer = Explorer::new(temp_dir.path()).unwrap();
        let first = explorer.find_files(&FindOptions::default()).unwrap();
        let second = explorer.find_files(&FindOptions::default()).unwrap();

        let names: Vec<_> = first.iter().map(|e| e.relative.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("alpha.rs"),
                PathBuf::from("mid.rs"),
                PathBuf::from("zeta.rs")
            ]
        );
        assert_eq!(
            names,
            second.iter().map(|e| e.relative.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_read_file_refuses_binary_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob.bin");
        fs::write(&path, b"ELF\x00\x01\x02").unwrap();

        let explorer = Explorer::new(temp_dir.path()).unwrap();
        assert!(matches!(
            explorer.read_file(&path),
            Err(ExplorerError::BinaryContent(_))
        ));
    }

    #[test]
    fn test_read_file_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let explorer = Explorer::new(temp_dir.path()).unwrap();
        assert!(matches!(
            explorer.read_file(&temp_dir.path().join("nope.txt")),
            Err(ExplorerError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_file_on_directory_is_kind_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();

        let explorer = Explorer::new(temp_dir.path()).unwrap();
        assert!(matches!(
            explorer.read_file(&temp_dir.path().join("sub")),
            Err(ExplorerError::NotAFile(_))
        ));
    }

    #[test]
    fn test_read_partial_window() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "lines.txt", "one\ntwo\nthree\nfour\nfive\n");

        let explorer = Explorer::new(temp_dir.path()).unwrap();
        let path = temp_dir.path().join("lines.txt");

        let lines = explorer.read_partial(&path, 1, 2).unwrap();
        assert_eq!(lines, vec!["two", "three"]);

        let beyond = explorer.read_partial(&path, 10, 5).unwrap();
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let base = TempDir::new().unwrap();
        let root = base.path().join("repo");
        fs::create_dir(&root).unwrap();
        fs::write(base.path().join("secret.txt"), "keys").unwrap();

        let explorer = Explorer::new(&root).unwrap();
        assert!(matches!(
            explorer.resolve("../secret.txt"),
            Err(ExplorerError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_resolve_missing_path_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let explorer = Explorer::new(temp_dir.path()).unwrap();
        assert!(matches!(
            explorer.resolve("ghost.rs"),
            Err(ExplorerError::NotFound(_))
        ));
    }
}
