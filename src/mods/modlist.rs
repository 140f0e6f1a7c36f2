// Mod list parsing: one `contentId,displayName` pair per line

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModEntry {
    pub content_id: String,
    pub display_name: String,
}

/// Insertion-ordered content id -> display name mapping.
/// Re-inserting an id replaces its name but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModSet {
    entries: Vec<ModEntry>,
}

impl ModSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, content_id: impl Into<String>, display_name: impl Into<String>) {
        let content_id = content_id.into();
        let display_name = display_name.into();

        match self.entries.iter_mut().find(|e| e.content_id == content_id) {
            Some(existing) => existing.display_name = display_name,
            None => self.entries.push(ModEntry {
                content_id,
                display_name,
            }),
        }
    }

    pub fn get(&self, content_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.content_id == content_id)
            .map(|e| e.display_name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModEntry> {
        self.entries.iter()
    }

    pub fn content_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.content_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ModSet {
    type Item = &'a ModEntry;
    type IntoIter = std::slice::Iter<'a, ModEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    pub line_number: usize,
    pub content: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct ModListParse {
    pub mods: ModSet,
    /// Lines that did not produce an entry
    pub skipped: Vec<SkippedLine>,
}

pub fn parse_mod_list(text: &str) -> ModListParse {
    let mut result = ModListParse::default();

    for (index, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split(',').collect();

        let reason = match fields.as_slice() {
            [id, name] => {
                let (id, name) = (id.trim(), name.trim());
                if id.is_empty() {
                    "missing content id"
                } else if name.is_empty() {
                    "missing display name"
                } else {
                    result.mods.insert(id, name);
                    continue;
                }
            }
            _ => "expected exactly two comma-separated fields",
        };

        // Blank lines are common in hand-written lists and not worth a warning
        if !line.trim().is_empty() {
            tracing::warn!("Skipping mod list line {}: {} ({:?})", index + 1, reason, line);
        }
        result.skipped.push(SkippedLine {
            line_number: index + 1,
            content: line.to_string(),
            reason,
        });
    }

    result
}

/// Read and parse a mod list file. A missing file means no mods.
pub fn read_mod_list(path: &Path) -> SyncResult<ModListParse> {
    if !path.exists() {
        tracing::debug!("No mod list at {:?}", path);
        return Ok(ModListParse::default());
    }

    let text = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    let parsed = parse_mod_list(&text);
    tracing::info!(
        "Loaded {} mods from {:?} ({} lines skipped)",
        parsed.mods.len(),
        path,
        parsed.skipped.len()
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_entry_per_line() {
        let parsed = parse_mod_list("1559212036,@CF\n1564026768,@Community-Online-Tools\n");
        assert_eq!(parsed.mods.len(), 2);
        assert_eq!(parsed.mods.get("1559212036"), Some("@CF"));
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_duplicate_id_last_wins_in_place() {
        let parsed = parse_mod_list("1,First\n2,Second\n1,Replaced");
        let names: Vec<_> = parsed.mods.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["Replaced", "Second"]);
    }

    #[test]
    fn test_malformed_lines_excluded() {
        let text = "no-comma\n1,two,commas\n,NoId\n2,\n3,Good\n";
        let parsed = parse_mod_list(text);

        assert_eq!(parsed.mods.content_ids(), vec!["3"]);
        assert_eq!(parsed.skipped.len(), 4);
        assert_eq!(parsed.skipped[1].line_number, 2);
        assert_eq!(parsed.skipped[2].reason, "missing content id");
        assert!(parsed.mods.len() <= text.lines().count());
    }

    #[test]
    fn test_empty_input() {
        let parsed = parse_mod_list("");
        assert!(parsed.mods.is_empty());
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_crlf_and_whitespace_trimmed() {
        let parsed = parse_mod_list("110 , TestMod \r\n220,Other\r\n");
        assert_eq!(parsed.mods.get("110"), Some("TestMod"));
        assert_eq!(parsed.mods.get("220"), Some("Other"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let parsed = read_mod_list(&dir.path().join("Modlist.txt")).unwrap();
        assert!(parsed.mods.is_empty());
    }
}
