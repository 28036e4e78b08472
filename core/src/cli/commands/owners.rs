use super::print_json;
use crate::cli::OutputFormat;
use crate::manager::LockManager;

pub fn run(manager: &LockManager, format: OutputFormat) -> Result<(), String> {
    let table = manager.table();
    let owners = table.owners();

    if format == OutputFormat::Json {
        print_json(owners);
        return Ok(());
    }

    if owners.is_empty() {
        println!("No locks");
        return Ok(());
    }
    for owner in owners {
        let count = table.records_for_owner(owner).count();
        println!("{owner} ({count})");
    }

    Ok(())
}
