pub mod commands;

use crate::manager::LockManager;
use crate::planner::LockOperation;
use crate::settings::Settings;
use crate::tree::TreeMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "lfs-locks")]
#[command(author, version, about = "Browse, lock and unlock Git LFS files", long_about = None)]
pub struct Cli {
    /// Settings file (default: $LFS_LOCKS_SETTINGS, ./settings.json, then the user config dir)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Repository root (overrides projectRootDirectory)
    #[arg(short, long, global = true)]
    pub repo: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Log more (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    Lock,
    Unlock,
}

impl From<ModeArg> for TreeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Lock => TreeMode::Lock,
            ModeArg::Unlock => TreeMode::Unlock,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List current locks
    List {
        /// Only show locks held by this user ("All" for everyone)
        #[arg(short, long, default_value = "All")]
        owner: String,

        /// Case-insensitive path substring
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// List users currently holding locks
    Owners,

    /// Show files available to lock, or existing locks, as a tree
    Tree {
        /// View to build (defaults to defaultMode from settings)
        #[arg(short, long)]
        mode: Option<ModeArg>,

        /// Owner filter for the unlock view
        #[arg(short, long, default_value = "All")]
        owner: String,

        /// Case-insensitive path substring
        #[arg(short, long)]
        filter: Option<String>,

        /// Expand directories shallower than this depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Lock files
    Lock {
        /// Paths relative to the repository root
        #[arg(required = true)]
        paths: Vec<String>,

        /// Print the commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Unlock files (admins force-unlock files owned by others)
    Unlock {
        /// Paths relative to the repository root
        #[arg(required = true)]
        paths: Vec<String>,

        /// Print the commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the current Git user and whether they are an admin
    Whoami,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<(), String> {
    let mut settings = Settings::load(cli.settings.as_deref()).map_err(|e| e.to_string())?;
    if let Some(repo) = cli.repo {
        settings.project_root_directory = repo;
    }
    let default_mode = TreeMode::from(settings.default_mode);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {e}"))?;
    let base = std::env::current_dir().map_err(|e| e.to_string())?;
    let manager = LockManager::new(settings, &base, runtime.handle().clone())?;

    if !matches!(cli.command, Commands::Whoami) {
        runtime.block_on(manager.refresh_async().wait())?;
    }

    match cli.command {
        Commands::List { owner, filter } => {
            commands::list::run(&manager, &owner, filter.as_deref(), cli.format)
        }
        Commands::Owners => commands::owners::run(&manager, cli.format),
        Commands::Tree {
            mode,
            owner,
            filter,
            depth,
        } => commands::tree::run(
            &manager,
            mode.map_or(default_mode, TreeMode::from),
            &owner,
            filter.as_deref().unwrap_or_default(),
            depth,
            cli.format,
        ),
        Commands::Lock { paths, dry_run } => commands::lock::run(
            &runtime,
            &manager,
            paths,
            LockOperation::Lock,
            dry_run,
            cli.format,
        ),
        Commands::Unlock { paths, dry_run } => commands::lock::run(
            &runtime,
            &manager,
            paths,
            LockOperation::Unlock,
            dry_run,
            cli.format,
        ),
        Commands::Whoami => commands::whoami::run(&manager, cli.format),
    }
}
