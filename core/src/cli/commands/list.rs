use super::{lock_suffix, print_json};
use crate::cli::OutputFormat;
use crate::locks::record::LockRecord;
use crate::manager::LockManager;
use colored::Colorize;

pub fn run(
    manager: &LockManager,
    owner: &str,
    filter: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let table = manager.table();
    let needle = filter.map(str::to_lowercase);
    let records: Vec<&LockRecord> = table
        .records_for_owner(owner)
        .filter(|record| {
            needle
                .as_deref()
                .is_none_or(|needle| record.relative_path.to_lowercase().contains(needle))
        })
        .collect();

    if format == OutputFormat::Json {
        print_json(&records);
        return Ok(());
    }

    if records.is_empty() {
        println!("No locks");
        return Ok(());
    }

    for record in &records {
        println!("{}  {}", record.relative_path.bold(), lock_suffix(record));
    }
    println!();
    println!("Total: {} lock(s)", records.len());

    Ok(())
}
