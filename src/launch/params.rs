// Launch parameters for the server executable

use crate::error::{SyncError, SyncResult};
use crate::games::GameConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchCommand {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub args: Vec<String>,
}

impl LaunchCommand {
    /// Single-line form of the argument list, for logs and display.
    /// Arguments with spaces or `;` are wrapped in double quotes.
    pub fn render_args(&self) -> String {
        self.args
            .iter()
            .map(|arg| quote_arg(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == ';' || c == '"') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Strip `@` and `,` from a mod display name and trim it
pub fn sanitize_mod_name(name: &str) -> String {
    name.replace(['@', ','], "").trim().to_string()
}

/// `-mod=a;b;` for the given display names, or `None` when nothing is left
/// after sanitizing.
pub fn mod_clause(names: &[String]) -> Option<String> {
    let joined: String = names
        .iter()
        .map(|name| sanitize_mod_name(name))
        .filter(|name| !name.is_empty())
        .map(|name| format!("{};", name))
        .collect();

    if joined.is_empty() {
        None
    } else {
        Some(format!("-mod={}", joined))
    }
}

/// Build the server argument list: caller parameters first, then the
/// optional `-ip=`, `-port=` and `-mod=` clauses.
pub fn build_launch_args(
    base_params: &str,
    ip: &str,
    port: &str,
    mod_names: &[String],
) -> SyncResult<Vec<String>> {
    let mut args = shell_words::split(base_params)
        .map_err(|e| SyncError::InvalidParameters(format!("{}: {}", base_params, e)))?;

    if !ip.trim().is_empty() {
        args.push(format!("-ip={}", ip.trim()));
    }
    if !port.trim().is_empty() {
        args.push(format!("-port={}", port.trim()));
    }
    if let Some(clause) = mod_clause(mod_names) {
        args.push(clause);
    }

    Ok(args)
}

/// Prefer the game's modded executable when it exists, else the standard one.
pub fn select_executable(server_files: &Path, game: &GameConfig) -> SyncResult<PathBuf> {
    if let Some(modded) = &game.modded_start_path {
        let modded_path = server_files.join(modded);
        if modded_path.is_file() {
            tracing::info!("Using {} to start the server", modded);
            return Ok(modded_path);
        }
    }

    let standard = server_files.join(&game.start_path);
    if standard.is_file() {
        Ok(standard)
    } else {
        Err(SyncError::ExecutableMissing {
            executable: game.start_path.clone(),
            path: standard,
        })
    }
}
