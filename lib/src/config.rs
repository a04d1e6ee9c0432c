//! Hand-rolled INI reader/writer for `<repo>/config` and deployment
//! `.origin` files (SPEC_FULL.md §10.3). Both formats are the same simple
//! `[section]` / `key = value` shape ostree itself uses on disk; there is
//! no general-purpose need for a full TOML/YAML stack here.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::IoResultExt as _;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::file_util;

/// An ordered INI document: sections in insertion order, each holding its
/// keys in insertion order. Comments (`#`/`;`) and blank lines are dropped
/// on parse and not reproduced on write; this mirrors how the repository
/// and origin files are always machine-rewritten wholesale, never
/// hand-edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ini {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl Ini {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> OstreeResult<Self> {
        let mut ini = Self::new();
        let mut current: Option<String> = None;

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(stripped) = line.strip_prefix('[') {
                let name = stripped.strip_suffix(']').ok_or_else(|| {
                    OstreeError::Config(format!("line {}: unterminated section header", lineno + 1))
                })?;
                ini.sections.push((name.to_string(), Vec::new()));
                current = Some(name.to_string());
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                OstreeError::Config(format!("line {}: expected 'key = value'", lineno + 1))
            })?;
            let section = current.as_ref().ok_or_else(|| {
                OstreeError::Config(format!("line {}: key outside any section", lineno + 1))
            })?;
            ini.set(section, key.trim(), value.trim());
        }
        Ok(ini)
    }

    fn section_mut(&mut self, section: &str) -> &mut Vec<(String, String)> {
        if let Some(pos) = self.sections.iter().position(|(name, _)| name == section) {
            &mut self.sections[pos].1
        } else {
            self.sections.push((section.to_string(), Vec::new()));
            &mut self.sections.last_mut().unwrap().1
        }
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let entries = self.section_mut(section);
        if let Some(pos) = entries.iter().position(|(k, _)| k == key) {
            entries[pos].1 = value;
        } else {
            entries.push((key.to_string(), value));
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .and_then(|(_, entries)| entries.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get(section, key)? {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }

    /// All `(key, value)` pairs in a section, in file order.
    pub fn section(&self, section: &str) -> &[(String, String)] {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    pub fn remove_section(&mut self, section: &str) {
        self.sections.retain(|(name, _)| name != section);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (section, entries) in &self.sections {
            out.push('[');
            out.push_str(section);
            out.push_str("]\n");
            for (key, value) in entries {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }

    pub fn load(path: &Path) -> OstreeResult<Self> {
        let text = fs::read_to_string(path).path_context(path)?;
        Self::parse(&text)
    }

    pub fn save(&self, path: &Path) -> OstreeResult<()> {
        let tmp_dir = path.parent().expect("config path has a parent directory");
        let mut temp_file = tempfile::NamedTempFile::new_in(tmp_dir).path_context(tmp_dir)?;
        use std::io::Write as _;
        temp_file.write_all(self.render().as_bytes()).path_context(path)?;
        // Config changes are rare and small; always fsync regardless of the
        // repository's own `core.fsync` (which this file is what declares).
        file_util::persist_temp_file(temp_file, path, crate::transaction::FsyncPolicy::Always).path_context(path)?;
        Ok(())
    }
}

/// Repository configuration (`<repo>/config`'s `[core]` section: `mode`,
/// `repo_version`, `fsync`; `[remote "<name>"]` sections: `url`,
/// `gpg-verify`, `collection-id`).
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub ini: Ini,
}

impl RepoConfig {
    pub fn new(mode: crate::object_store::RepoMode) -> Self {
        let mut ini = Ini::new();
        ini.set("core", "repo_version", "1");
        ini.set("core", "mode", mode.as_str());
        Self { ini }
    }

    pub fn mode(&self) -> OstreeResult<crate::object_store::RepoMode> {
        self.ini
            .get("core", "mode")
            .ok_or_else(|| OstreeError::Config("missing core.mode".into()))?
            .parse()
    }

    pub fn remotes(&self) -> Vec<String> {
        self.ini
            .sections()
            .filter_map(|s| s.strip_prefix("remote \"").and_then(|s| s.strip_suffix('"')))
            .map(str::to_string)
            .collect()
    }

    pub fn remote(&self, name: &str) -> BTreeMap<String, String> {
        self.ini.section(&format!("remote \"{name}\"")).iter().cloned().collect()
    }

    pub fn set_remote(&mut self, name: &str, key: &str, value: impl Into<String>) {
        self.ini.set(&format!("remote \"{name}\""), key, value);
    }

    pub fn remove_remote(&mut self, name: &str) {
        self.ini.remove_section(&format!("remote \"{name}\""));
    }

    pub fn load(path: &Path) -> OstreeResult<Self> {
        Ok(Self { ini: Ini::load(path)? })
    }

    pub fn save(&self, path: &Path) -> OstreeResult<()> {
        self.ini.save(path)
    }
}
