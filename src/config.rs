use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "catalogd",
    version,
    about = "School catalog reporting sidecar (JSON lines over stdio)"
)]
pub struct Cli {
    /// Workspace directory to open at start-up; otherwise send `workspace.select`.
    #[arg(long, env = "CATALOGD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// off, error, warn, info, debug or trace. Logs go to stderr.
    #[arg(long, env = "CATALOGD_LOG", default_value = "info")]
    pub log_level: log::LevelFilter,
}
