//! Reference store (spec §4.3): `refs/heads`, `refs/remotes/<remote>`, and
//! `refs/mirrors/<collection>`, each mapping a ref path to a checksum.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::checksum::Checksum;
use crate::error::IoResultExt as _;
use crate::error::OstreeError;
use crate::error::OstreeResult;
use crate::file_util;
use crate::transaction::FsyncPolicy;

/// Which namespace under `refs/` a ref lives in (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefCategory {
    Heads,
    Remote(String),
    Mirror(String),
}

impl RefCategory {
    fn subdir(&self) -> PathBuf {
        match self {
            Self::Heads => PathBuf::from("heads"),
            Self::Remote(remote) => PathBuf::from("remotes").join(remote),
            Self::Mirror(collection) => PathBuf::from("mirrors").join(collection),
        }
    }
}

/// Validates a ref path is non-empty, slash-separated, UTF-8, and free of
/// `.`, `..`, and empty components (spec §4.3).
pub fn validate_ref_name(name: &str) -> OstreeResult<()> {
    if name.is_empty() {
        return Err(OstreeError::InvalidRefName("empty ref name".into()));
    }
    for component in name.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(OstreeError::InvalidRefName(format!(
                "invalid component {component:?} in ref {name:?}"
            )));
        }
    }
    Ok(())
}

/// The `refs/` tree rooted at `<repo>/refs`.
pub struct RefStore {
    root: PathBuf,
    fsync: FsyncPolicy,
}

impl RefStore {
    /// Syncs every ref write per [`FsyncPolicy::default`].
    /// [`crate::repo::Repository`] uses [`Self::new_with_fsync`] instead,
    /// once it knows the repository's configured policy.
    pub fn new(repo_root: &Path) -> Self {
        Self::new_with_fsync(repo_root, FsyncPolicy::default())
    }

    pub fn new_with_fsync(repo_root: &Path, fsync: FsyncPolicy) -> Self {
        Self { root: repo_root.join("refs"), fsync }
    }

    fn ref_path(&self, category: &RefCategory, name: &str) -> PathBuf {
        self.root.join(category.subdir()).join(name)
    }

    pub fn resolve(&self, category: &RefCategory, name: &str) -> OstreeResult<Checksum> {
        validate_ref_name(name)?;
        let path = self.ref_path(category, name);
        let contents = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OstreeError::RefNotFound(name.to_string())
            } else {
                OstreeError::io(&path, e)
            }
        })?;
        Checksum::from_hex(contents.trim_end_matches('\n'))
    }

    /// Writes `checksum` to the ref, atomically via rename (spec §4.3). The
    /// file contains exactly the hex checksum and a trailing newline (spec
    /// §3 invariant).
    pub fn set(&self, category: &RefCategory, name: &str, checksum: Checksum) -> OstreeResult<()> {
        validate_ref_name(name)?;
        let path = self.ref_path(category, name);
        let parent = path.parent().expect("ref path always has a refs/ prefix");
        file_util::create_dir_all_reuse(parent).path_context(parent)?;

        let mut temp_file = NamedTempFile::new_in(parent).path_context(parent)?;
        use std::io::Write as _;
        writeln!(temp_file, "{}", checksum.hex()).path_context(&path)?;
        file_util::persist_temp_file(temp_file, &path, self.fsync).path_context(&path)?;
        debug!(ref_name = name, checksum = %checksum, "set ref");
        Ok(())
    }

    pub fn delete(&self, category: &RefCategory, name: &str) -> OstreeResult<()> {
        validate_ref_name(name)?;
        let path = self.ref_path(category, name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OstreeError::RefNotFound(name.to_string()))
            }
            Err(e) => Err(OstreeError::io(&path, e)),
        }
    }

    /// Lists every ref under `category` whose name starts with `prefix`
    /// (empty prefix lists all of them), returning `(name, checksum)` pairs
    /// sorted by name.
    pub fn list(&self, category: &RefCategory, prefix: &str) -> OstreeResult<Vec<(String, Checksum)>> {
        let base = self.root.join(category.subdir());
        let mut out = Vec::new();
        if !base.is_dir() {
            return Ok(out);
        }
        walk_refs(&base, &base, &mut out)?;
        out.retain(|(name, _)| name.starts_with(prefix));
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

fn walk_refs(base: &Path, dir: &Path, out: &mut Vec<(String, Checksum)>) -> OstreeResult<()> {
    for entry in fs::read_dir(dir).path_context(dir)? {
        let entry = entry.path_context(dir)?;
        let path = entry.path();
        if path.is_dir() {
            walk_refs(base, &path, out)?;
        } else {
            let name = path
                .strip_prefix(base)
                .expect("walked path is under base")
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let contents = fs::read_to_string(&path).path_context(&path)?;
            let checksum = Checksum::from_hex(contents.trim_end_matches('\n'))?;
            out.push((name, checksum));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_resolve_round_trips() {
        let dir = crate::tests::new_temp_dir();
        let refs = RefStore::new(dir.path());
        let checksum = Checksum::of(b"commit");
        refs.set(&RefCategory::Heads, "main", checksum).unwrap();
        assert_eq!(refs.resolve(&RefCategory::Heads, "main").unwrap(), checksum);
    }

    #[test]
    fn resolve_missing_ref_fails() {
        let dir = crate::tests::new_temp_dir();
        let refs = RefStore::new(dir.path());
        assert!(matches!(
            refs.resolve(&RefCategory::Heads, "nope"),
            Err(OstreeError::RefNotFound(_))
        ));
    }

    #[test]
    fn rejects_dotdot_and_empty_components() {
        assert!(validate_ref_name("").is_err());
        assert!(validate_ref_name("a/../b").is_err());
        assert!(validate_ref_name("a//b").is_err());
        assert!(validate_ref_name("a/./b").is_err());
        assert!(validate_ref_name("valid/ref-name").is_ok());
    }

    #[test]
    fn list_is_sorted_and_prefix_filtered() {
        let dir = crate::tests::new_temp_dir();
        let refs = RefStore::new(dir.path());
        refs.set(&RefCategory::Heads, "b/two", Checksum::of(b"2")).unwrap();
        refs.set(&RefCategory::Heads, "a/one", Checksum::of(b"1")).unwrap();
        let all = refs.list(&RefCategory::Heads, "").unwrap();
        assert_eq!(all.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(), vec!["a/one", "b/two"]);
        let filtered = refs.list(&RefCategory::Heads, "b/").unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn delete_removes_ref() {
        let dir = crate::tests::new_temp_dir();
        let refs = RefStore::new(dir.path());
        refs.set(&RefCategory::Heads, "main", Checksum::of(b"x")).unwrap();
        refs.delete(&RefCategory::Heads, "main").unwrap();
        assert!(refs.resolve(&RefCategory::Heads, "main").is_err());
    }

    #[test]
    fn remote_and_mirror_categories_are_namespaced() {
        let dir = crate::tests::new_temp_dir();
        let refs = RefStore::new(dir.path());
        refs.set(&RefCategory::Remote("origin".into()), "main", Checksum::of(b"r")).unwrap();
        refs.set(&RefCategory::Mirror("org.example.Os".into()), "main", Checksum::of(b"m")).unwrap();
        assert!(refs.resolve(&RefCategory::Heads, "main").is_err());
        assert_eq!(refs.resolve(&RefCategory::Remote("origin".into()), "main").unwrap(), Checksum::of(b"r"));
    }
}
