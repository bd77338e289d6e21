//! Gitignore-style exclusion rules.
//!
//! Compiles a fixed set of default exclusions plus the patterns found in a
//! repository's `.gitignore` into a single rule set. A path is excluded when
//! it, or any of its ancestor directories, matches a rule.

use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;
use tracing::{debug, warn};

/// Exclusions applied to every exploration, whether or not the repository
/// carries a `.gitignore`. Version control metadata, dependency and build
/// directories, and compiled artifacts.
pub const DEFAULT_PATTERNS: &[&str] = &[
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "__pycache__/",
    "target/",
    "dist/",
    "build/",
    "vendor/",
    ".venv/",
    "venv/",
    ".idea/",
    ".vscode/",
    "*.egg-info/",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    "*.class",
    "*.o",
    "*.so",
    "*.dylib",
    "*.dll",
    ".DS_Store",
];

/// One compiled rule. `dir_only` marks patterns written with a trailing
/// slash, which match directories but not files of the same name.
struct IgnoreRule {
    matcher: GlobMatcher,
    dir_only: bool,
}

/// An ordered set of compiled ignore rules. All rules are OR-combined
/// exclusions, so order never affects the membership test. Built once per
/// exploration root and immutable afterwards.
pub struct IgnoreRuleSet {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRuleSet {
    /// Build the rule set for a root directory: the defaults plus every
    /// non-blank, non-comment line of `<root>/.gitignore` if one exists.
    ///
    /// A missing ignore file is not an error, and a read failure on an
    /// existing one degrades to the defaults with a warning.
    pub fn build(root: &Path) -> Self {
        let mut patterns: Vec<String> = DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect();

        let gitignore = root.join(".gitignore");
        if gitignore.exists() {
            match std::fs::read_to_string(&gitignore) {
                Ok(content) => {
                    let before = patterns.len();
                    for line in content.lines() {
                        let line = line.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }
                        patterns.push(line.to_string());
                    }
                    debug!(
                        "Added {} patterns from {}",
                        patterns.len() - before,
                        gitignore.display()
                    );
                }
                Err(e) => {
                    warn!("Failed to read {}: {}", gitignore.display(), e);
                }
            }
        }

        Self::from_patterns(patterns.iter().map(String::as_str))
    }

    /// Compile an explicit list of gitignore-style patterns. Unparsable
    /// patterns are skipped with a warning rather than failing the set.
    pub fn from_patterns<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Self {
        let rules = patterns.into_iter().filter_map(compile_rule).collect();
        Self { rules }
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are loaded.
    #[allow(dead_code)] // Counterpart of len
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Test a root-relative path in POSIX (forward-slash) form.
    ///
    /// Returns true when the path itself or any ancestor directory matches a
    /// rule. `is_dir` describes the final component; every ancestor is a
    /// directory by construction.
    pub fn matches(&self, relative: &str, is_dir: bool) -> bool {
        let path = relative.trim_matches('/');
        if path.is_empty() {
            return false;
        }

        let components: Vec<&str> = path.split('/').collect();
        for end in 1..=components.len() {
            let candidate = components[..end].join("/");
            let candidate_is_dir = end < components.len() || is_dir;
            for rule in &self.rules {
                if rule.dir_only && !candidate_is_dir {
                    continue;
                }
                if rule.matcher.is_match(&candidate) {
                    return true;
                }
            }
        }

        false
    }
}

/// Compile one gitignore-style pattern. Follows the ignore-file convention:
/// a trailing `/` restricts the rule to directories, a pattern without a
/// slash matches at any depth, and a pattern with a slash is anchored to the
/// root.
fn compile_rule(raw: &str) -> Option<IgnoreRule> {
    let mut pattern = raw.trim();
    if pattern.is_empty() || pattern.starts_with('#') {
        return None;
    }

    let dir_only = pattern.ends_with('/');
    if dir_only {
        pattern = pattern.trim_end_matches('/');
    }
    let anchored = pattern.starts_with('/');
    let pattern = pattern.trim_start_matches('/');
    if pattern.is_empty() {
        return None;
    }

    let glob = if !anchored && !pattern.contains('/') {
        format!("**/{}", pattern)
    } else {
        pattern.to_string()
    };

    match GlobBuilder::new(&glob).literal_separator(true).build() {
        Ok(compiled) => Some(IgnoreRule {
            matcher: compiled.compile_matcher(),
            dir_only,
        }),
        Err(e) => {
            warn!("Skipping unparsable ignore pattern '{}': {}", raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_exclude_common_directories() {
        let rules = IgnoreRuleSet::from_patterns(DEFAULT_PATTERNS.iter().copied());
        assert!(rules.matches("node_modules", true));
        assert!(rules.matches(".git", true));
        assert!(rules.matches("target", true));
        assert!(!rules.matches("src", true));
        assert!(!rules.matches("main.rs", false));
    }

    #[test]
    fn test_ancestor_match_excludes_descendants() {
        let rules = IgnoreRuleSet::from_patterns(["node_modules/"]);
        assert!(rules.matches("node_modules/react/index.js", false));
        assert!(rules.matches("packages/app/node_modules/left-pad/index.js", false));
        assert!(!rules.matches("src/modules/graph.rs", false));
    }

    #[test]
    fn test_dir_only_rule_ignores_files_of_same_name() {
        let rules = IgnoreRuleSet::from_patterns(["build/"]);
        assert!(rules.matches("build", true));
        assert!(!rules.matches("build", false));
        assert!(rules.matches("build/out.bin", false));
    }

    #[test]
    fn test_extension_pattern_matches_at_any_depth() {
        let rules = IgnoreRuleSet::from_patterns(["*.log"]);
        assert!(rules.matches("debug.log", false));
        assert!(rules.matches("logs/2024/debug.log", false));
        assert!(!rules.matches("debug.log.txt", false));
    }

    #[test]
    fn test_anchored_pattern_stays_at_root() {
        let rules = IgnoreRuleSet::from_patterns(["docs/*.md"]);
        assert!(rules.matches("docs/readme.md", false));
        assert!(!rules.matches("src/docs/readme.md", false));
        assert!(!rules.matches("docs/api/readme.md", false));
    }

    #[test]
    fn test_build_reads_gitignore_and_skips_comments() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(".gitignore"),
            "# build output\n\n*.log\nscratch/\n",
        )
        .unwrap();

        let rules = IgnoreRuleSet::build(temp_dir.path());
        assert!(rules.matches("a.log", false));
        assert!(rules.matches("scratch", true));
        assert!(rules.matches("node_modules", true)); // defaults still apply
        assert!(!rules.matches("a.rs", false));
    }

    #[test]
    fn test_build_without_gitignore_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRuleSet::build(temp_dir.path());
        assert_eq!(rules.len(), DEFAULT_PATTERNS.len());
        assert!(rules.matches("__pycache__", true));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let rules = IgnoreRuleSet::from_patterns(["[", "*.tmp"]);
        assert_eq!(rules.len(), 1);
        assert!(rules.matches("a.tmp", false));
    }
}
