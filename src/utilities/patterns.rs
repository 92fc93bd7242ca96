// Pattern Matching Utilities
// Glob pattern matching and the change filter deciding which paths get synced

use std::path::{Component, Path};

use crate::constants::{
    TRANSIENT_FILE_NAMES, TRANSIENT_FILE_PREFIXES, TRANSIENT_FILE_SUFFIXES, VCS_METADATA_DIR,
};

/// Check if `text` matches a glob `pattern` as a whole.
///
/// `*` matches any run of characters (including `/`), `?` matches exactly one
/// character, everything else is literal.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    match_chars(&pattern, text)
}

fn match_chars(pattern: &[char], text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p).copied() {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                // Let the last star swallow one more character
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Check if a vault-relative path matches a pattern.
///
/// The pattern is anchored against the whole path with `/` separators, so
/// `note.md` matches only the top-level file while `*.tmp` matches at any
/// depth.
pub fn matches_pattern(path: &Path, pattern: &str) -> bool {
    glob_match(pattern, &to_slash(path))
}

/// Check if a path is version-control metadata or an OS/editor transient file
pub fn is_system_path(path: &Path) -> bool {
    let in_metadata_dir = path.components().any(|c| match c {
        Component::Normal(name) => name == VCS_METADATA_DIR,
        _ => false,
    });
    if in_metadata_dir {
        return true;
    }

    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };

    TRANSIENT_FILE_NAMES.iter().any(|n| name == *n)
        || TRANSIENT_FILE_PREFIXES.iter().any(|p| name.starts_with(p))
        || TRANSIENT_FILE_SUFFIXES.iter().any(|s| name.ends_with(s))
        // Emacs autosave files: #name#
        || (name.len() > 2 && name.starts_with('#') && name.ends_with('#'))
}

/// Decide whether a change to `path` should be synced
pub fn should_sync(path: &Path, exclude_patterns: &[String]) -> bool {
    !is_system_path(path) && !exclude_patterns.iter().any(|p| matches_pattern(path, p))
}

/// Exclusion patterns compiled once and reused for every event
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    patterns: Vec<String>,
    compiled: Vec<Vec<char>>,
}

impl PatternMatcher {
    pub fn new(patterns: Vec<String>) -> Self {
        let compiled = patterns.iter().map(|p| p.chars().collect()).collect();
        Self { patterns, compiled }
    }

    /// Check if a path matches any configured pattern
    pub fn should_exclude(&self, path: &Path) -> bool {
        if self.compiled.is_empty() {
            return false;
        }
        let path = to_slash(path);
        self.compiled.iter().any(|p| match_chars(p, &path))
    }

    /// Same decision as [`should_sync`] with this matcher's patterns
    pub fn should_sync(&self, path: &Path) -> bool {
        !is_system_path(path) && !self.should_exclude(path)
    }

    pub fn add_pattern(&mut self, pattern: String) {
        self.compiled.push(pattern.chars().collect());
        self.patterns.push(pattern);
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether the matcher was built from exactly these patterns
    pub fn is_for(&self, patterns: &[String]) -> bool {
        self.patterns == patterns
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_glob_star_and_question() {
        assert!(glob_match("*.md", "note.md"));
        assert!(glob_match("*.md", "dir/note.md"));
        assert!(glob_match("note?.md", "note1.md"));
        assert!(!glob_match("note?.md", "note.md"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn test_dot_is_literal_and_match_is_anchored() {
        assert!(!glob_match("*.md", "notemd"));
        assert!(!glob_match("note.md", "my-note.md"));
        assert!(!glob_match("note", "note.md"));
    }

    #[test]
    fn test_pattern_is_anchored_to_the_full_path() {
        assert!(matches_pattern(Path::new("drafts/scratch.draft"), "*.draft"));
        assert!(matches_pattern(Path::new("note.md"), "note.md"));
        assert!(!matches_pattern(Path::new("notes/note.md"), "note.md"));
        assert!(should_sync(Path::new("notes/note.md"), &patterns(&["note.md"])));
        assert!(!matches_pattern(Path::new("drafts/scratch.md"), "drafts/*.tmp"));
        assert!(matches_pattern(Path::new("drafts/a/b.md"), "drafts/*"));
    }

    #[test]
    fn test_pattern_matcher_agrees_with_should_sync() {
        let list = patterns(&["*.draft", "archive/*", "note.md"]);
        let mut matcher = PatternMatcher::new(list.clone());

        for path in ["a.draft", "x/y.draft", "archive/old.md", "note.md", "notes/note.md", "todo.md", ".git/HEAD"] {
            let path = Path::new(path);
            assert_eq!(matcher.should_sync(path), should_sync(path, &list), "{}", path.display());
        }
        assert!(matcher.is_for(&list));

        matcher.add_pattern("todo.md".to_string());
        assert!(matcher.should_exclude(Path::new("todo.md")));
        assert_eq!(matcher.patterns().len(), 4);
        assert!(!matcher.is_for(&list));

        assert!(!PatternMatcher::default().should_exclude(Path::new("anything.md")));
    }

    #[test]
    fn test_system_paths_always_rejected() {
        let none: Vec<String> = Vec::new();
        assert!(!should_sync(Path::new(".git/index"), &none));
        assert!(!should_sync(Path::new("sub/.git/HEAD"), &none));
        assert!(!should_sync(Path::new(".DS_Store"), &none));
        assert!(!should_sync(Path::new("notes/.note.md.swp"), &none));
        assert!(!should_sync(Path::new("notes/note.md~"), &none));
        assert!(!should_sync(Path::new("#note.md#"), &none));
        assert!(!should_sync(Path::new(".~lock.sheet.ods#"), &none));
        assert!(should_sync(Path::new("notes/note.md"), &none));
        assert!(should_sync(Path::new(".gitignore"), &none));
    }

    #[test]
    fn test_excluded_paths_rejected() {
        let excludes = patterns(&["*.log", ".obsidian/workspace*"]);
        assert!(!should_sync(Path::new("debug.log"), &excludes));
        assert!(!should_sync(Path::new(".obsidian/workspace.json"), &excludes));
        assert!(should_sync(Path::new(".obsidian/app.json"), &excludes));
        assert!(should_sync(Path::new("journal/2024-01-01.md"), &excludes));
    }
}
