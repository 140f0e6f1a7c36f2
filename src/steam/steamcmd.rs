// SteamCMD invoker - one batched, blocking workshop download per sync

use crate::error::{SyncError, SyncResult};
use crate::steam::Credentials;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub enum Login {
    Account(Credentials),
    Anonymous,
}

impl Login {
    /// Pick the login for a download. Without credentials this fails unless
    /// anonymous login is allowed for the server.
    pub fn resolve(
        credentials: Option<Credentials>,
        allow_anonymous: bool,
        credentials_path: &Path,
    ) -> SyncResult<Self> {
        match credentials {
            Some(creds) => Ok(Login::Account(creds)),
            None if allow_anonymous => {
                tracing::warn!("No Steam login available, falling back to anonymous");
                Ok(Login::Anonymous)
            }
            None => Err(SyncError::MissingCredentials(credentials_path.to_path_buf())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub workshop_app_id: String,
    pub content_ids: Vec<String>,
    pub login: Login,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
}

impl DownloadOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Fetches workshop content and knows where it ends up on disk.
#[async_trait]
pub trait WorkshopDownloader: Send + Sync {
    async fn download(&self, request: &DownloadRequest) -> SyncResult<DownloadOutcome>;

    /// Directory a downloaded item is staged in
    fn content_dir(&self, workshop_app_id: &str, content_id: &str) -> PathBuf;
}

pub struct SteamCmd {
    executable: PathBuf,
    staging_dir: PathBuf,
    timeout: Option<Duration>,
}

impl SteamCmd {
    pub fn new(executable: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            staging_dir: staging_dir.into(),
            timeout: None,
        }
    }

    /// Kill SteamCMD if it has not exited after `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Argument list for a batched download: install dir, login,
    /// one `+workshop_download_item` per id, then `+quit`.
    pub fn build_args(&self, request: &DownloadRequest) -> Vec<String> {
        let mut args = vec![
            "+force_install_dir".to_string(),
            self.staging_dir.to_string_lossy().to_string(),
            "+login".to_string(),
        ];

        match &request.login {
            Login::Account(creds) => {
                args.push(creds.user.clone());
                args.push(creds.pass.clone());
            }
            Login::Anonymous => args.push("anonymous".to_string()),
        }

        for content_id in &request.content_ids {
            args.push("+workshop_download_item".to_string());
            args.push(request.workshop_app_id.clone());
            args.push(content_id.clone());
        }

        args.push("+quit".to_string());
        args
    }
}

#[async_trait]
impl WorkshopDownloader for SteamCmd {
    async fn download(&self, request: &DownloadRequest) -> SyncResult<DownloadOutcome> {
        if !self.executable.is_file() {
            tracing::error!("SteamCMD not available at {:?}", self.executable);
            return Err(SyncError::ToolUnavailable(self.executable.clone()));
        }

        std::fs::create_dir_all(&self.staging_dir)
            .map_err(|e| SyncError::io(&self.staging_dir, e))?;

        let args = self.build_args(request);
        tracing::info!(
            "Downloading {} workshop items for app {}",
            request.content_ids.len(),
            request.workshop_app_id
        );
        tracing::debug!("SteamCMD args: {:?}", redact_login(&args, &request.login));

        let working_dir = match self.executable.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut cmd = tokio::process::Command::new(&self.executable);
        cmd.args(&args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SyncError::ProcessStart(format!("steamcmd: {}", e)))?;

        // Dropping the wait future on timeout drops the child, which kills it
        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output()).await.ok(),
            None => Some(child.wait_with_output().await),
        };

        let output = match waited {
            Some(result) => result.map_err(|e| SyncError::io(&self.executable, e))?,
            None => {
                tracing::error!(
                    "SteamCMD did not finish within {:?}, killed",
                    self.timeout.unwrap_or_default()
                );
                return Ok(DownloadOutcome {
                    timed_out: true,
                    ..Default::default()
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!("[steamcmd] {}", line);
        }
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!("[steamcmd:err] {}", line);
        }

        let outcome = DownloadOutcome {
            exit_code: output.status.code(),
            timed_out: false,
            stdout_tail: tail(&stdout),
            stderr_tail: tail(&stderr),
        };

        if outcome.succeeded() {
            tracing::info!("SteamCMD finished");
        } else {
            // Not fatal: the installer checks each item on disk
            tracing::warn!("SteamCMD exited with {:?}", outcome.exit_code);
        }

        Ok(outcome)
    }

    fn content_dir(&self, workshop_app_id: &str, content_id: &str) -> PathBuf {
        workshop_content_dir(&self.staging_dir, workshop_app_id, content_id)
    }
}

/// SteamCMD's layout below a `+force_install_dir`
pub fn workshop_content_dir(staging_dir: &Path, workshop_app_id: &str, content_id: &str) -> PathBuf {
    staging_dir
        .join("steamapps")
        .join("workshop")
        .join("content")
        .join(workshop_app_id)
        .join(content_id)
}

fn redact_login(args: &[String], login: &Login) -> Vec<String> {
    match login {
        Login::Account(creds) => args
            .iter()
            .map(|a| if *a == creds.pass { "***".to_string() } else { a.clone() })
            .collect(),
        Login::Anonymous => args.to_vec(),
    }
}

fn tail(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Login {
        Login::Account(Credentials {
            user: "alice".to_string(),
            pass: "p4ss word".to_string(),
        })
    }

    fn request(ids: &[&str], login: Login) -> DownloadRequest {
        DownloadRequest {
            workshop_app_id: "221100".to_string(),
            content_ids: ids.iter().map(|s| s.to_string()).collect(),
            login,
        }
    }

    #[test]
    fn test_build_args_batches_every_item() {
        let steamcmd = SteamCmd::new("/opt/steamcmd/steamcmd.sh", "/srv/staging");
        let args = steamcmd.build_args(&request(&["110", "220"], account()));

        assert_eq!(
            args,
            vec![
                "+force_install_dir",
                "/srv/staging",
                "+login",
                "alice",
                "p4ss word",
                "+workshop_download_item",
                "221100",
                "110",
                "+workshop_download_item",
                "221100",
                "220",
                "+quit",
            ]
        );
    }

    #[test]
    fn test_anonymous_login_clause() {
        let steamcmd = SteamCmd::new("steamcmd", "staging");
        let args = steamcmd.build_args(&request(&[], Login::Anonymous));
        assert_eq!(args[2..], ["+login", "anonymous", "+quit"]);
    }

    #[test]
    fn test_login_fails_closed_without_credentials() {
        let path = Path::new("userData.txt");
        let err = Login::resolve(None, false, path).unwrap_err();
        assert!(matches!(err, SyncError::MissingCredentials(_)));
        assert!(matches!(Login::resolve(None, true, path).unwrap(), Login::Anonymous));
    }

    #[test]
    fn test_redact_hides_password() {
        let login = account();
        let steamcmd = SteamCmd::new("steamcmd", "staging");
        let args = steamcmd.build_args(&request(&["1"], login.clone()));
        let redacted = redact_login(&args, &login);
        assert!(!redacted.iter().any(|a| a == "p4ss word"));
        assert!(redacted.iter().any(|a| a == "alice"));
    }

    #[test]
    fn test_content_dir_layout() {
        let steamcmd = SteamCmd::new("steamcmd", "/srv/staging");
        assert_eq!(
            steamcmd.content_dir("221100", "110"),
            PathBuf::from("/srv/staging/steamapps/workshop/content/221100/110")
        );
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let kept = tail(&text);
        assert_eq!(kept.len(), OUTPUT_TAIL_LINES);
        assert_eq!(kept.last().unwrap(), "line 29");
    }

    #[tokio::test]
    async fn test_missing_tool_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let steamcmd = SteamCmd::new(dir.path().join("steamcmd.sh"), dir.path().join("staging"));

        let err = steamcmd.download(&request(&["1"], account())).await.unwrap_err();
        assert!(matches!(err, SyncError::ToolUnavailable(_)));
        assert!(!dir.path().join("staging").exists());
    }

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fake_steamcmd_receives_argv() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("steamcmd.sh");
        let record = dir.path().join("args.txt");
        write_script(
            &exe,
            &format!("for a in \"$@\"; do echo \"$a\" >> {:?}; done\necho done\nexit 7", record),
        );

        let steamcmd = SteamCmd::new(&exe, dir.path().join("staging"));
        let outcome = steamcmd.download(&request(&["110"], account())).await.unwrap();

        assert_eq!(outcome.exit_code, Some(7));
        assert!(!outcome.succeeded());
        assert_eq!(outcome.stdout_tail, vec!["done"]);
        let recorded = std::fs::read_to_string(&record).unwrap();
        // The password with a space arrives as one argument
        assert!(recorded.lines().any(|l| l == "p4ss word"));
        assert_eq!(recorded.lines().last(), Some("+quit"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_hung_download() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("steamcmd.sh");
        write_script(&exe, "exec sleep 30");

        let steamcmd = SteamCmd::new(&exe, dir.path().join("staging"))
            .with_timeout(Some(Duration::from_millis(300)));
        let started = std::time::Instant::now();
        let outcome = steamcmd.download(&request(&["1"], Login::Anonymous)).await.unwrap();

        assert!(outcome.timed_out);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
