mod auth;
mod calc;
mod config;
mod db;
mod ipc;
mod logger;
mod model;
mod records;
mod timetable;

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};

fn open_state(cli: &config::Cli) -> anyhow::Result<ipc::AppState> {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = &cli.workspace {
        let conn = db::open_db(path)
            .with_context(|| format!("failed to open workspace {}", path.to_string_lossy()))?;
        log::info!("workspace opened at {}", path.to_string_lossy());
        state.workspace = Some(path.clone());
        state.db = Some(conn);
    }
    Ok(state)
}

fn main() -> anyhow::Result<()> {
    let cli = config::Cli::parse();
    logger::init(cli.log_level);
    let mut state = open_state(&cli)?;
    log::info!("catalogd {} ready", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("stdin closed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                log::warn!("bad request line: {}", e);
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}
