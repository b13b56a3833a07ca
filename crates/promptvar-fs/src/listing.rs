//! Directory listing filters and text rendering.

use globset::{Glob, GlobSet, GlobSetBuilder};

use promptvar_core::{DirectoryEntry, FsError, FsResult, HandleKind, ListOptions};

/// Compiled form of [`ListOptions`].
#[derive(Debug, Clone)]
pub struct ListFilter {
    include_hidden: bool,
    max_depth: usize,
    exclude: Option<GlobSet>,
}

impl ListFilter {
    /// Compile listing options.
    pub fn new(options: &ListOptions) -> FsResult<Self> {
        let max_depth = if options.recursive {
            options.max_depth.unwrap_or(usize::MAX)
        } else {
            1
        };

        let exclude = if options.exclude.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &options.exclude {
                let glob = Glob::new(pattern).map_err(|e| FsError::InvalidOptions {
                    message: format!("bad exclude pattern '{pattern}': {e}"),
                })?;
                builder.add(glob);
            }
            Some(builder.build().map_err(|e| FsError::InvalidOptions {
                message: e.to_string(),
            })?)
        };

        Ok(Self {
            include_hidden: options.include_hidden,
            max_depth,
            exclude,
        })
    }

    /// Deepest level that should be listed (1 = direct children).
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether an entry at `path` (relative, `/`-separated) is kept.
    ///
    /// A rejected directory should not be descended into.
    pub fn accepts(&self, path: &str, depth: usize) -> bool {
        if depth == 0 || depth > self.max_depth {
            return false;
        }
        if !self.include_hidden && path.split('/').any(|part| part.starts_with('.')) {
            return false;
        }
        !self.exclude.as_ref().is_some_and(|set| set.is_match(path))
    }
}

/// Render a listing as text: one relative path per line, directories
/// suffixed with `/`, sorted by path.
pub fn format_listing(entries: &[DirectoryEntry]) -> String {
    let mut lines: Vec<String> = entries
        .iter()
        .map(|entry| match entry.kind {
            HandleKind::Directory => format!("{}/", entry.path),
            HandleKind::File => entry.path.clone(),
        })
        .collect();
    lines.sort();
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_hidden_and_depth() {
        let filter = ListFilter::new(&ListOptions {
            max_depth: Some(2),
            ..ListOptions::default()
        })
        .unwrap();

        assert!(filter.accepts("src", 1));
        assert!(filter.accepts("src/lib.rs", 2));
        assert!(!filter.accepts("src/a/b.rs", 3));
        assert!(!filter.accepts(".git", 1));
        assert!(!filter.accepts("src/.hidden", 2));
    }

    #[test]
    fn test_filter_non_recursive() {
        let filter = ListFilter::new(&ListOptions {
            recursive: false,
            include_hidden: true,
            ..ListOptions::default()
        })
        .unwrap();
        assert!(filter.accepts(".env", 1));
        assert!(!filter.accepts("src/lib.rs", 2));
    }

    #[test]
    fn test_filter_exclude_patterns() {
        let filter = ListFilter::new(&ListOptions {
            exclude: vec!["target".to_string(), "**/*.log".to_string()],
            ..ListOptions::default()
        })
        .unwrap();
        assert!(!filter.accepts("target", 1));
        assert!(!filter.accepts("logs/run.log", 2));
        assert!(filter.accepts("src/main.rs", 2));
    }

    #[test]
    fn test_bad_pattern_is_invalid_options() {
        let err = ListFilter::new(&ListOptions {
            exclude: vec!["[".to_string()],
            ..ListOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, FsError::InvalidOptions { .. }));
    }

    #[test]
    fn test_format_listing() {
        let entries = vec![
            DirectoryEntry::new("src/lib.rs", HandleKind::File, 2),
            DirectoryEntry::new("src", HandleKind::Directory, 1),
            DirectoryEntry::new("Cargo.toml", HandleKind::File, 1),
        ];
        assert_eq!(format_listing(&entries), "Cargo.toml\nsrc/\nsrc/lib.rs");
        assert_eq!(format_listing(&[]), "");
    }
}
