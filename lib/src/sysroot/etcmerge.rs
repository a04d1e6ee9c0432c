//! Three-way merge of `/etc` across a deploy (spec §4.8): an unmerged path
//! takes the new commit's pristine default, a path the user alone changed
//! keeps their edit, and a path both sides changed is a conflict resolved in
//! the user's favor and reported back.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::error::IoResultExt as _;
use crate::error::OstreeResult;
use crate::file_util;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    File(Vec<u8>),
    Symlink(PathBuf),
}

/// What happened to each path during a [`merge_etc`] call.
#[derive(Debug, Clone, Default)]
pub struct EtcMergeReport {
    pub taken_new: Vec<PathBuf>,
    pub kept_user: Vec<PathBuf>,
    /// Paths modified on both sides; the user's version was kept.
    pub conflicts: Vec<PathBuf>,
}

fn scan(root: &Path) -> OstreeResult<BTreeMap<PathBuf, Entry>> {
    let mut out = BTreeMap::new();
    if root.is_dir() {
        scan_into(root, root, &mut out)?;
    }
    Ok(out)
}

fn scan_into(base: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Entry>) -> OstreeResult<()> {
    for entry in fs::read_dir(dir).path_context(dir)? {
        let entry = entry.path_context(dir)?;
        let path = entry.path();
        let file_type = entry.file_type().path_context(&path)?;
        let rel = path.strip_prefix(base).expect("walked path is under base").to_path_buf();
        if file_type.is_dir() {
            scan_into(base, &path, out)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(&path).path_context(&path)?;
            out.insert(rel, Entry::Symlink(target));
        } else if file_type.is_file() {
            let content = fs::read(&path).path_context(&path)?;
            out.insert(rel, Entry::File(content));
        }
    }
    Ok(())
}

fn write_entry(dest_root: &Path, rel: &Path, entry: &Entry) -> OstreeResult<()> {
    let dest_path = dest_root.join(rel);
    if let Some(parent) = dest_path.parent() {
        file_util::create_dir_all_reuse(parent).path_context(parent)?;
    }
    match entry {
        Entry::File(content) => fs::write(&dest_path, content).path_context(&dest_path),
        Entry::Symlink(target) => {
            let _ = fs::remove_file(&dest_path);
            #[cfg(unix)]
            {
                std::os::unix::fs::symlink(target, &dest_path).path_context(&dest_path)
            }
            #[cfg(not(unix))]
            {
                let _ = target;
                Ok(())
            }
        }
    }
}

/// Merges `/etc` for a deploy (spec §4.8): `old_pristine` is the parent
/// deployment's `/usr/etc` as it was at deploy time, `new_pristine` is the
/// incoming commit's `/usr/etc`, and `user_modified` is the parent
/// deployment's live `/etc`. The result is written into `dest`.
pub fn merge_etc(
    old_pristine: &Path,
    new_pristine: &Path,
    user_modified: &Path,
    dest: &Path,
) -> OstreeResult<EtcMergeReport> {
    let old = scan(old_pristine)?;
    let new = scan(new_pristine)?;
    let user = scan(user_modified)?;

    let mut report = EtcMergeReport::default();
    let all_paths: BTreeSet<PathBuf> =
        old.keys().chain(new.keys()).chain(user.keys()).cloned().collect();

    for path in all_paths {
        let old_entry = old.get(&path);
        let new_entry = new.get(&path);
        let user_entry = user.get(&path);

        let new_changed = new_entry != old_entry;
        let user_changed = user_entry != old_entry;

        let chosen = match (new_changed, user_changed) {
            (false, false) => old_entry,
            (false, true) => user_entry,
            (true, false) => new_entry,
            (true, true) => {
                if new_entry != user_entry {
                    report.conflicts.push(path.clone());
                }
                user_entry
            }
        };

        if let Some(entry) = chosen {
            write_entry(dest, &path, entry)?;
            if new_changed && !user_changed {
                report.taken_new.push(path);
            } else if user_changed {
                report.kept_user.push(path);
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn unmodified_path_takes_new_pristine() {
        let dir = crate::tests::new_temp_dir();
        let (old, new, user, dest) = (
            dir.path().join("old"),
            dir.path().join("new"),
            dir.path().join("user"),
            dir.path().join("dest"),
        );
        write_file(&old, "hostname", "old-value");
        write_file(&new, "hostname", "new-value");
        write_file(&user, "hostname", "old-value");

        let report = merge_etc(&old, &new, &user, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("hostname")).unwrap(), "new-value");
        assert_eq!(report.taken_new, vec![PathBuf::from("hostname")]);
    }

    #[test]
    fn user_modification_is_kept_when_new_is_unchanged() {
        let dir = crate::tests::new_temp_dir();
        let (old, new, user, dest) = (
            dir.path().join("old"),
            dir.path().join("new"),
            dir.path().join("user"),
            dir.path().join("dest"),
        );
        write_file(&old, "passwd", "base");
        write_file(&new, "passwd", "base");
        write_file(&user, "passwd", "user-edited");

        let report = merge_etc(&old, &new, &user, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("passwd")).unwrap(), "user-edited");
        assert_eq!(report.kept_user, vec![PathBuf::from("passwd")]);
    }

    #[test]
    fn conflicting_double_modification_prefers_user_and_is_reported() {
        let dir = crate::tests::new_temp_dir();
        let (old, new, user, dest) = (
            dir.path().join("old"),
            dir.path().join("new"),
            dir.path().join("user"),
            dir.path().join("dest"),
        );
        write_file(&old, "fstab", "base");
        write_file(&new, "fstab", "new-default");
        write_file(&user, "fstab", "user-custom");

        let report = merge_etc(&old, &new, &user, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("fstab")).unwrap(), "user-custom");
        assert_eq!(report.conflicts, vec![PathBuf::from("fstab")]);
    }
}
