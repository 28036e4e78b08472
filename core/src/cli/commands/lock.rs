use super::{normalize_path, print_json};
use crate::cli::OutputFormat;
use crate::manager::LockManager;
use crate::planner::LockOperation;
use colored::Colorize;
use tokio::runtime::Runtime;

pub fn run(
    runtime: &Runtime,
    manager: &LockManager,
    paths: Vec<String>,
    operation: LockOperation,
    dry_run: bool,
    format: OutputFormat,
) -> Result<(), String> {
    let files: Vec<String> = paths.iter().map(|path| normalize_path(path)).collect();

    if dry_run {
        let plan = manager.plan(&files, operation)?;
        if format == OutputFormat::Json {
            print_json(&plan);
        } else {
            for invocation in &plan {
                println!("{}", manager.render_command_line(invocation));
            }
        }
        return Ok(());
    }

    runtime
        .block_on(manager.exec_locking_operation(files.clone(), operation))
        .map_err(|e| format!("{} task failed: {e}", operation.subcommand()))??;

    if format == OutputFormat::Json {
        print_json(&serde_json::json!({
            "operation": operation,
            "files": files,
        }));
        return Ok(());
    }

    let verb = match operation {
        LockOperation::Lock => "Locked",
        LockOperation::Unlock => "Unlocked",
    };
    println!("{} {} file(s)", verb.green(), files.len());

    Ok(())
}
