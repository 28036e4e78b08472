pub mod git_lfs;
pub mod runner;
