//! Lock records parsed from `git-lfs locks`.
//!
//! Each line has the shape `<path> <owner> ID:<id>`. Malformed lines are
//! skipped with a warning; a single bad line never fails the whole cycle.

use crate::error::LockError;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

const LOCK_ID_PREFIX: &str = "ID:";

/// Owner filter value that matches every lock owner.
pub const ALL_OWNERS: &str = "All";

/// One lock as reported by Git LFS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Opaque lock token (numeric in practice).
    pub lock_id: String,
    pub owner: String,
    /// Forward-slash separated path relative to the repository root.
    pub relative_path: String,
    /// The file exists in the local working tree.
    pub is_local_file: bool,
    /// The file exists locally but is no longer tracked by LFS.
    pub is_orphaned: bool,
}

impl LockRecord {
    pub fn new(
        lock_id: impl Into<String>,
        owner: impl Into<String>,
        relative_path: impl Into<String>,
        is_local_file: bool,
        is_tracked: bool,
    ) -> Self {
        Self {
            lock_id: lock_id.into(),
            owner: owner.into(),
            relative_path: relative_path.into(),
            is_local_file,
            is_orphaned: is_local_file && !is_tracked,
        }
    }
}

/// The fields of a single `git-lfs locks` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLine<'a> {
    pub path: &'a str,
    pub owner: &'a str,
    pub lock_id: &'a str,
}

/// Split one output line into path, owner and lock id.
pub fn parse_lock_line(line: &str) -> Result<LockLine<'_>, LockError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [path, owner, id_token] = tokens[..] else {
        return Err(LockError::parse(format!(
            "expected 3 fields, found {}: {line:?}",
            tokens.len()
        )));
    };
    let lock_id = id_token
        .strip_prefix(LOCK_ID_PREFIX)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| LockError::parse(format!("missing lock id in {line:?}")))?;
    Ok(LockLine {
        path,
        owner,
        lock_id,
    })
}

/// An immutable snapshot of every lock known after one parse cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LockTable {
    records: Vec<LockRecord>,
    owners: BTreeSet<String>,
    #[serde(skip)]
    by_path: HashMap<String, usize>,
}

impl LockTable {
    /// Build a table from records. A repeated path replaces the earlier record.
    pub fn from_records(records: impl IntoIterator<Item = LockRecord>) -> Self {
        let mut table = Self::default();
        for record in records {
            if let Some(&index) = table.by_path.get(&record.relative_path) {
                log::warn!(
                    "[locks] Duplicate lock for {}, keeping the last one",
                    record.relative_path
                );
                table.records[index] = record;
            } else {
                table
                    .by_path
                    .insert(record.relative_path.clone(), table.records.len());
                table.records.push(record);
            }
        }
        table.owners = distinct_owners(&table.records);
        table
    }

    /// Parse raw `git-lfs locks` output lines.
    ///
    /// `repo_root` is used to check local existence and `tracked_files`
    /// is the `git-lfs ls-files --name-only` listing.
    pub fn parse<S: AsRef<str>>(
        lines: &[S],
        repo_root: &Path,
        tracked_files: &HashSet<String>,
    ) -> Self {
        let mut skipped = 0usize;
        let records: Vec<LockRecord> = lines
            .iter()
            .map(AsRef::as_ref)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match parse_lock_line(line) {
                Ok(parsed) => {
                    let is_local_file = repo_root.join(parsed.path).is_file();
                    let is_tracked = tracked_files.contains(parsed.path);
                    Some(LockRecord::new(
                        parsed.lock_id,
                        parsed.owner,
                        parsed.path,
                        is_local_file,
                        is_tracked,
                    ))
                }
                Err(e) => {
                    skipped += 1;
                    log::warn!("[locks] Skipping line: {e}");
                    None
                }
            })
            .collect();

        let table = Self::from_records(records);
        log::info!(
            "[locks] Parsed {} locks from {} owners ({skipped} lines skipped)",
            table.records.len(),
            table.owners.len()
        );
        table
    }

    pub fn records(&self) -> &[LockRecord] {
        &self.records
    }

    pub fn owners(&self) -> &BTreeSet<String> {
        &self.owners
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up the lock on a path. Surrounding quotes are ignored.
    pub fn lookup_by_path(&self, path: &str) -> Option<&LockRecord> {
        let unquoted = path.replace('"', "");
        self.by_path
            .get(unquoted.as_str())
            .map(|&index| &self.records[index])
    }

    /// Owner of the lock on `path`, or an empty string if it is not locked.
    pub fn owner_of(&self, path: &str) -> &str {
        self.lookup_by_path(path)
            .map_or("", |record| record.owner.as_str())
    }

    pub fn is_locked(&self, path: &str) -> bool {
        self.lookup_by_path(path).is_some()
    }

    /// Records matching an owner filter (`"All"` matches everyone).
    pub fn records_for_owner<'a>(
        &'a self,
        owner_filter: &'a str,
    ) -> impl Iterator<Item = &'a LockRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| owner_matches(owner_filter, &record.owner))
    }
}

/// Whether `owner` passes the owner filter.
pub fn owner_matches(owner_filter: &str, owner: &str) -> bool {
    owner_filter == ALL_OWNERS || owner_filter == owner
}

/// The unique owners across a set of records.
pub fn distinct_owners(records: &[LockRecord]) -> BTreeSet<String> {
    records.iter().map(|record| record.owner.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tracked(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| (*p).to_owned()).collect()
    }

    #[test]
    fn test_parse_lock_line() {
        let parsed = parse_lock_line("Content/Maps/level.umap\talice\tID:1234").unwrap();
        assert_eq!(parsed.path, "Content/Maps/level.umap");
        assert_eq!(parsed.owner, "alice");
        assert_eq!(parsed.lock_id, "1234");
    }

    #[test]
    fn test_parse_lock_line_keeps_opaque_id() {
        let parsed = parse_lock_line("a.bin bob ID:abc-77").unwrap();
        assert_eq!(parsed.lock_id, "abc-77");
    }

    #[test]
    fn test_parse_lock_line_rejects_malformed() {
        assert!(parse_lock_line("a.bin bob").is_err());
        assert!(parse_lock_line("a.bin bob 1234").is_err());
        assert!(parse_lock_line("a.bin bob ID:").is_err());
        assert!(parse_lock_line("a b c ID:1").is_err());
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let lines = [
            "a.bin alice ID:1",
            "garbage",
            "",
            "b.bin bob ID:2",
        ];
        let table = LockTable::parse(&lines, dir.path(), &HashSet::new());
        assert_eq!(table.len(), 2);
        assert_eq!(table.owner_of("a.bin"), "alice");
        assert_eq!(table.owner_of("b.bin"), "bob");
    }

    #[test]
    fn test_parse_local_and_orphan_flags() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("art")).unwrap();
        fs::write(dir.path().join("art/tracked.psd"), b"x").unwrap();
        fs::write(dir.path().join("art/untracked.psd"), b"x").unwrap();

        let lines = [
            "art/tracked.psd alice ID:1",
            "art/untracked.psd alice ID:2",
            "art/remote-only.psd bob ID:3",
        ];
        let table = LockTable::parse(&lines, dir.path(), &tracked(&["art/tracked.psd"]));

        let tracked_record = table.lookup_by_path("art/tracked.psd").unwrap();
        assert!(tracked_record.is_local_file);
        assert!(!tracked_record.is_orphaned);

        let orphan = table.lookup_by_path("art/untracked.psd").unwrap();
        assert!(orphan.is_local_file);
        assert!(orphan.is_orphaned);

        let remote = table.lookup_by_path("art/remote-only.psd").unwrap();
        assert!(!remote.is_local_file);
        assert!(!remote.is_orphaned);

        for record in table.records() {
            assert!(!record.is_orphaned || record.is_local_file);
        }
    }

    #[test]
    fn test_duplicate_path_last_wins() {
        let table = LockTable::from_records([
            LockRecord::new("1", "alice", "a.bin", false, true),
            LockRecord::new("2", "bob", "a.bin", false, true),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup_by_path("a.bin").unwrap().lock_id, "2");
        assert_eq!(table.owners().len(), 1);
    }

    #[test]
    fn test_lookup_ignores_quotes() {
        let table = LockTable::from_records([LockRecord::new("1", "alice", "a.bin", false, true)]);
        assert_eq!(table.owner_of("\"a.bin\""), "alice");
        assert_eq!(table.owner_of("missing.bin"), "");
        assert!(table.lookup_by_path("missing.bin").is_none());
    }

    #[test]
    fn test_distinct_owners() {
        let records = vec![
            LockRecord::new("1", "alice", "a", false, true),
            LockRecord::new("2", "bob", "b", false, true),
            LockRecord::new("3", "alice", "c", false, true),
        ];
        let owners = distinct_owners(&records);
        assert_eq!(owners, tracked(&["alice", "bob"]).into_iter().collect());
        assert!(distinct_owners(&[]).is_empty());
    }

    #[test]
    fn test_records_for_owner() {
        let table = LockTable::from_records([
            LockRecord::new("1", "alice", "a", false, true),
            LockRecord::new("2", "bob", "b", false, true),
        ]);
        assert_eq!(table.records_for_owner(ALL_OWNERS).count(), 2);
        let bobs: Vec<_> = table.records_for_owner("bob").collect();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].relative_path, "b");
        assert_eq!(table.records_for_owner("carol").count(), 0);
    }
}
