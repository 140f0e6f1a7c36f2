// On-disk layout for servers, SteamCMD and saved configuration

use std::path::{Path, PathBuf};

const HOME_ENV: &str = "MODSYNC_HOME";
const APP_DIR: &str = "ModSyncAnywhere";

/// Folder below the server files that SteamCMD downloads into
pub const WORKSHOP_STAGING_DIR: &str = "Plugins";

#[cfg(target_os = "windows")]
const STEAMCMD_EXE: &str = "steamcmd.exe";
#[cfg(not(target_os = "windows"))]
const STEAMCMD_EXE: &str = "steamcmd.sh";

/// Root of everything modsync writes to disk.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$MODSYNC_HOME`, or `~/ModSyncAnywhere`.
    pub fn from_env() -> Self {
        if let Ok(home) = std::env::var(HOME_ENV) {
            if !home.trim().is_empty() {
                return Self::new(home);
            }
        }

        let root = directories::UserDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn servers_dir(&self) -> PathBuf {
        self.root.join("servers")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn server_config_path(&self, server_id: &str) -> PathBuf {
        self.config_dir().join(format!("{}.json", server_id))
    }

    pub fn custom_games_path(&self) -> PathBuf {
        self.root.join("games").join("custom_games.json")
    }

    pub fn steamcmd_dir(&self) -> PathBuf {
        self.root.join("bin").join("steamcmd")
    }

    pub fn steamcmd_exe(&self) -> PathBuf {
        self.steamcmd_dir().join(STEAMCMD_EXE)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.steamcmd_dir().join("userData.txt")
    }

    pub fn server(&self, server_id: &str) -> ServerPaths {
        ServerPaths::new(self.servers_dir().join(server_id))
    }
}

/// Directories belonging to a single server instance.
#[derive(Debug, Clone)]
pub struct ServerPaths {
    base: PathBuf,
}

impl ServerPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Working directory of the server: executables, keys and mod folders.
    pub fn server_files(&self) -> PathBuf {
        self.base.join("serverfiles")
    }

    pub fn server_file(&self, name: &str) -> PathBuf {
        self.server_files().join(name)
    }

    pub fn configs(&self) -> PathBuf {
        self.base.join("configs")
    }

    pub fn mod_list(&self) -> PathBuf {
        self.configs().join("Modlist.txt")
    }

    pub fn keys_dir(&self, keys_dir_name: &str) -> PathBuf {
        self.server_files().join(keys_dir_name)
    }

    /// Where SteamCMD is told to put workshop downloads.
    pub fn workshop_staging(&self) -> PathBuf {
        self.server_files().join(WORKSHOP_STAGING_DIR)
    }

    pub fn create_all(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.server_files())?;
        std::fs::create_dir_all(self.configs())
    }
}
