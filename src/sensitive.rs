//! Sensitive word detection for post submissions
//!
//! The word list is loaded once at startup from a file, or from every file in
//! a directory, and falls back to the configured list when nothing is found.
//! Matching is case-insensitive substring containment.

use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct SensitiveWords {
    /// Lower-cased, sorted, deduplicated.
    words: Vec<String>,
}

impl SensitiveWords {
    /// Build from raw entries. Blank entries and `#` comments are skipped.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words: Vec<String> = entries
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty() && !w.starts_with('#'))
            .collect();
        words.sort();
        words.dedup();
        Self { words }
    }

    /// Load from `path` (file or directory), or use `fallback` if it yields nothing.
    pub fn load(path: &Path, fallback: &[String]) -> Self {
        let mut lines: Vec<String> = Vec::new();

        if path.is_dir() {
            match std::fs::read_dir(path) {
                Ok(entries) => {
                    let mut files: Vec<_> = entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| p.is_file())
                        .collect();
                    files.sort();
                    for file in files {
                        read_lines(&file, &mut lines);
                    }
                }
                Err(e) => log::warn!("Unable to read word list directory {:?}: {}", path, e),
            }
        } else if path.is_file() {
            read_lines(path, &mut lines);
        }

        let loaded = Self::new(lines);
        if !loaded.is_empty() {
            log::info!("Loaded {} sensitive words from {:?}", loaded.len(), path);
            return loaded;
        }

        let fallback = Self::new(fallback);
        log::info!(
            "No sensitive words found at {:?}; using {} configured words",
            path,
            fallback.len()
        );
        fallback
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Every listed word contained in any of `texts`, sorted and deduplicated.
    ///
    /// Fields are joined with a newline, so a word never matches across two fields.
    pub fn scan(&self, texts: &[Option<&str>]) -> Vec<String> {
        let haystack = texts
            .iter()
            .flatten()
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        if haystack.is_empty() {
            return Vec::new();
        }

        // The list is already sorted and unique, so the hits are too.
        self.words
            .iter()
            .filter(|w| haystack.contains(w.as_str()))
            .cloned()
            .collect()
    }
}

fn read_lines(path: &Path, out: &mut Vec<String>) {
    match std::fs::read_to_string(path) {
        Ok(text) => out.extend(text.lines().map(str::to_owned)),
        Err(e) => log::warn!("Unable to read word list {:?}: {}", path, e),
    }
}
