// Steam login read from SteamCMD's userData.txt

use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::path::Path;

const USER_KEY: &str = "steamUser";
const PASS_KEY: &str = "steamPass";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

// Keep the password out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

/// Load `steamUser` / `steamPass` from a `key=value` file.
///
/// Returns `Ok(None)` when the file does not exist or either value is
/// missing or blank. Lines starting with `//` are comments. A line that is
/// empty or has no `=` is reported as malformed.
pub fn load_credentials(path: &Path) -> SyncResult<Option<Credentials>> {
    if !path.exists() {
        tracing::warn!("No credentials file at {:?}", path);
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    parse_credentials(&content, path)
}

fn parse_credentials(content: &str, path: &Path) -> SyncResult<Option<Credentials>> {
    let mut user: Option<String> = None;
    let mut pass: Option<String> = None;

    for (index, line) in content.lines().enumerate() {
        if line.starts_with("//") {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(SyncError::MalformedCredentialLine {
                path: path.to_path_buf(),
                line_number: index + 1,
            });
        };

        let value = value.trim_matches('"');
        match key {
            USER_KEY => user = Some(value.to_string()),
            PASS_KEY => pass = Some(value.to_string()),
            _ => {}
        }
    }

    match (user, pass) {
        (Some(user), Some(pass)) if !user.trim().is_empty() && !pass.trim().is_empty() => {
            Ok(Some(Credentials { user, pass }))
        }
        (user, _) => {
            let missing = if user.map_or(true, |u| u.trim().is_empty()) {
                USER_KEY
            } else {
                PASS_KEY
            };
            tracing::warn!("Credentials file {:?} has no usable {}", path, missing);
            Ok(None)
        }
    }
}
