pub mod list;
pub mod lock;
pub mod owners;
pub mod tree;
pub mod whoami;

use crate::locks::record::LockRecord;
use colored::Colorize;

/// Serialize a value as pretty-printed JSON and print it to stdout.
fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("failed to serialize JSON output")
    );
}

/// Normalize a user-typed path to the repository-relative form Git LFS reports.
fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").to_owned()
}

/// Owner and id, plus markers for orphaned or missing files.
fn lock_suffix(lock: &LockRecord) -> String {
    let mut parts = vec![
        lock.owner.cyan().to_string(),
        format!("ID:{}", lock.lock_id).dimmed().to_string(),
    ];
    if !lock.is_local_file {
        parts.push("(missing locally)".yellow().to_string());
    } else if lock.is_orphaned {
        parts.push("(not tracked by LFS)".yellow().to_string());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./Content\\Maps\\a.umap"), "Content/Maps/a.umap");
        assert_eq!(normalize_path("docs/readme.md"), "docs/readme.md");
    }
}
