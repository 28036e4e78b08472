use super::print_json;
use crate::cli::OutputFormat;
use crate::manager::LockManager;
use colored::Colorize;

pub fn run(manager: &LockManager, format: OutputFormat) -> Result<(), String> {
    let user = manager.current_user()?;
    let is_admin = manager.settings().is_admin(&user);
    let branch = manager.git_lfs().current_branch().unwrap_or_default();

    if format == OutputFormat::Json {
        print_json(&serde_json::json!({
            "user": user,
            "isAdmin": is_admin,
            "branch": branch,
            "gitLfs": manager.git_lfs().display_executable(),
        }));
        return Ok(());
    }

    let role = if is_admin { "admin".yellow() } else { "user".normal() };
    println!("{} ({role})", user.bold());
    if !branch.is_empty() {
        let tracking = &manager.settings().tracking_branch;
        if &branch == tracking {
            println!("On branch {branch}");
        } else {
            println!("On branch {branch} (tracking {tracking})");
        }
    }

    Ok(())
}
