use crate::commands::games::GamesState;
use crate::error::{SyncError, SyncResult};
use crate::games::{server_variables, write_server_config, ConfigWrite, GameConfig, GameType};
use crate::launch::{
    build_launch_args, select_executable, ConsoleSink, LaunchCommand, ProcessSupervisor,
};
use crate::mods::{read_mod_list, ContentInstaller, InstalledMod, SkippedLine};
use crate::paths::{AppPaths, ServerPaths};
use crate::steam::{
    load_credentials, DownloadOutcome, DownloadRequest, Login, SteamCmd, WorkshopDownloader,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 3600;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub game_type: GameType,
    pub status: ServerStatus,
    /// Empty means no `-ip=` override
    #[serde(default)]
    pub ip: String,
    /// 0 means no `-port=` override
    pub port: u16,
    /// Extra launch parameters, split like a shell command line
    #[serde(default)]
    pub params: String,
    pub max_players: u32,
    pub data_path: PathBuf,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default = "default_true")]
    pub embed_console: bool,
    #[serde(default)]
    pub allow_anonymous_login: bool,
    /// SteamCMD deadline; 0 waits forever
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_download_timeout() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

impl Server {
    pub fn paths(&self) -> ServerPaths {
        ServerPaths::new(&self.data_path)
    }

    fn download_timeout(&self) -> Option<Duration> {
        match self.download_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Syncing,
    Starting,
    Running,
    Stopping,
    Error,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub game_type: GameType,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub params: Option<String>,
    pub max_players: Option<u32>,
    pub embed_console: Option<bool>,
    pub allow_anonymous_login: Option<bool>,
    pub download_timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ServerResponse {
    pub success: bool,
    pub server: Option<Server>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModFailureReport {
    pub content_id: String,
    pub name: String,
    pub message: String,
}

/// Result of one mod sync pass
#[derive(Debug, Default, Serialize)]
pub struct SyncOutcome {
    pub requested: usize,
    pub installed: Vec<InstalledMod>,
    pub failures: Vec<ModFailureReport>,
    pub skipped_lines: Vec<SkippedLine>,
    /// `None` when there was nothing to download
    pub download: Option<DownloadOutcome>,
}

impl SyncOutcome {
    pub fn installed_names(&self) -> Vec<String> {
        self.installed.iter().map(|m| m.name.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct LaunchOutcome {
    pub server_id: String,
    pub pid: u32,
    pub command: LaunchCommand,
    pub sync: SyncOutcome,
    /// Advisory messages for the operator (missing config, partial mod set)
    pub notices: Vec<String>,
}

pub struct ServerState {
    pub paths: AppPaths,
    supervisors: Mutex<HashMap<String, Arc<Mutex<ProcessSupervisor>>>>,
}

impl ServerState {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            paths,
            supervisors: Mutex::new(HashMap::new()),
        }
    }

    async fn supervisor(&self, server_id: &str) -> Arc<Mutex<ProcessSupervisor>> {
        let mut supervisors = self.supervisors.lock().await;
        supervisors
            .entry(server_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ProcessSupervisor::new(server_id))))
            .clone()
    }

    async fn live_status(&self, server_id: &str) -> Option<ServerStatus> {
        let supervisors = self.supervisors.lock().await;
        let supervisor = supervisors.get(server_id)?;
        // A busy supervisor is in the middle of a sync, start or stop
        let status = match supervisor.try_lock() {
            Ok(supervisor) if supervisor.is_running() => Some(supervisor.status()),
            _ => None,
        };
        status
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(AppPaths::from_env())
    }
}

pub async fn create_server(
    request: CreateServerRequest,
    state: &ServerState,
    games_state: &GamesState,
) -> Result<ServerResponse, String> {
    tracing::info!("Creating server: {:?}", request.name);

    let game_config = games_state
        .get_game(&request.game_type)
        .await
        .ok_or_else(|| format!("Game type '{}' not found", request.game_type))?;

    let server_id = Uuid::new_v4().to_string()[..8].to_string();
    let data_path = state.paths.servers_dir().join(&server_id);

    let server = Server {
        id: server_id,
        name: request.name,
        game_type: request.game_type,
        status: ServerStatus::Stopped,
        ip: request.ip.unwrap_or_default(),
        port: request.port.unwrap_or(game_config.default_port),
        params: request
            .params
            .unwrap_or_else(|| game_config.default_params.clone()),
        max_players: request.max_players.unwrap_or(game_config.default_max_players),
        data_path,
        created_at: chrono::Utc::now(),
        embed_console: request.embed_console.unwrap_or(game_config.console),
        allow_anonymous_login: request
            .allow_anonymous_login
            .unwrap_or(game_config.login_anonymous),
        download_timeout_secs: request
            .download_timeout_secs
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
    };

    let server_paths = server.paths();
    server_paths
        .create_all()
        .map_err(|e| format!("Failed to create {:?}: {}", server_paths.base(), e))?;

    let variables = server_variables(&game_config, &server.name, server.max_players);
    write_server_config(&server_paths.server_files(), &game_config, &variables, false)
        .map_err(|e| e.to_string())?;

    save_server_config(&state.paths, &server).map_err(|e| e.to_string())?;

    Ok(ServerResponse {
        success: true,
        server: Some(server),
        error: None,
    })
}

pub async fn list_servers(state: &ServerState) -> Result<Vec<Server>, String> {
    let config_dir = state.paths.config_dir();

    if !config_dir.exists() {
        return Ok(Vec::new());
    }

    let mut servers = Vec::new();

    for entry in std::fs::read_dir(config_dir).map_err(|e| e.to_string())? {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();

        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let content = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
            let mut server: Server = match serde_json::from_str(&content) {
                Ok(server) => server,
                Err(e) => {
                    tracing::warn!("Skipping unreadable server config {:?}: {}", path, e);
                    continue;
                }
            };

            if let Some(status) = state.live_status(&server.id).await {
                server.status = status;
            } else if server.status == ServerStatus::Running {
                // Saved as running by a previous session we no longer own
                server.status = ServerStatus::Stopped;
            }

            servers.push(server);
        }
    }

    servers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(servers)
}

pub async fn get_server_status(server_id: &str, state: &ServerState) -> Result<ServerStatus, String> {
    let server = load_server_config(&state.paths, server_id).map_err(|e| e.to_string())?;
    Ok(state.live_status(server_id).await.unwrap_or(match server.status {
        ServerStatus::Running => ServerStatus::Stopped,
        other => other,
    }))
}

/// Download and install the server's mod list without starting it
pub async fn sync_mods(
    server_id: &str,
    state: &ServerState,
    games_state: &GamesState,
) -> Result<SyncOutcome, String> {
    let server = load_server_config(&state.paths, server_id).map_err(|e| e.to_string())?;
    let game = games_state
        .get_game(&server.game_type)
        .await
        .ok_or_else(|| SyncError::GameNotFound(server.game_type.to_string()).to_string())?;

    let steamcmd = steamcmd_for(&state.paths, &server);
    sync_server(state, server_id, &game, &steamcmd)
        .await
        .map_err(|e| e.to_string())
}

/// Sync pass without a launch. Refused while the server process is live.
pub async fn sync_server(
    state: &ServerState,
    server_id: &str,
    game: &GameConfig,
    downloader: &dyn WorkshopDownloader,
) -> SyncResult<SyncOutcome> {
    let supervisor = state.supervisor(server_id).await;
    let supervisor = supervisor
        .try_lock()
        .map_err(|_| SyncError::SyncInProgress(server_id.to_string()))?;

    if supervisor.is_running() {
        return Err(SyncError::ServerRunning(server_id.to_string()));
    }

    let mut server = load_server_config(&state.paths, server_id)?;
    server.status = ServerStatus::Syncing;
    save_server_config(&state.paths, &server)?;

    let result = sync_server_mods(&server, game, &state.paths.credentials_path(), downloader).await;

    server.status = match &result {
        Ok(_) => ServerStatus::Stopped,
        Err(_) => ServerStatus::Error,
    };
    save_server_config(&state.paths, &server)?;

    if let Err(e) = &result {
        tracing::error!("Mod sync of {} aborted: {}", server_id, e);
    }
    result
}

#[tracing::instrument(skip_all, fields(server_id = %server_id))]
pub async fn start_server(
    server_id: &str,
    state: &ServerState,
    games_state: &GamesState,
    console: Option<Arc<dyn ConsoleSink>>,
) -> Result<LaunchOutcome, String> {
    tracing::info!("Starting server: {}", server_id);

    let server = load_server_config(&state.paths, server_id).map_err(|e| e.to_string())?;
    let game = games_state
        .get_game(&server.game_type)
        .await
        .ok_or_else(|| SyncError::GameNotFound(server.game_type.to_string()).to_string())?;

    let steamcmd = steamcmd_for(&state.paths, &server);
    launch_server(state, server_id, &game, &steamcmd, console)
        .await
        .map_err(|e| e.to_string())
}

/// Full pass for one server: sync mods, build the launch command, spawn.
/// Only one pass per server runs at a time.
pub async fn launch_server(
    state: &ServerState,
    server_id: &str,
    game: &GameConfig,
    downloader: &dyn WorkshopDownloader,
    console: Option<Arc<dyn ConsoleSink>>,
) -> SyncResult<LaunchOutcome> {
    let supervisor = state.supervisor(server_id).await;
    let mut supervisor = supervisor
        .try_lock()
        .map_err(|_| SyncError::SyncInProgress(server_id.to_string()))?;

    if supervisor.is_running() {
        return Err(SyncError::ServerRunning(server_id.to_string()));
    }

    let mut server = load_server_config(&state.paths, server_id)?;
    server.status = ServerStatus::Syncing;
    save_server_config(&state.paths, &server)?;

    let credentials_path = state.paths.credentials_path();
    let result = async {
        let server_files = server.paths().server_files();
        // Fail before a long download when there is nothing to launch
        select_executable(&server_files, game)?;

        let sync = sync_server_mods(&server, game, &credentials_path, downloader).await?;
        let (command, mut notices) = prepare_launch(&server, game, &sync.installed_names())?;

        if !sync.is_complete() {
            let failed: Vec<_> = sync.failures.iter().map(|f| f.name.as_str()).collect();
            notices.push(format!(
                "Started with {} of {} mods, missing: {}",
                sync.installed.len(),
                sync.requested,
                failed.join(", ")
            ));
        }

        let console = console.filter(|_| server.embed_console && game.console);
        let pid = supervisor.start(&command, console)?;

        Ok::<_, SyncError>(LaunchOutcome {
            server_id: server.id.clone(),
            pid,
            command,
            sync,
            notices,
        })
    }
    .await;

    server.status = match &result {
        Ok(_) => ServerStatus::Running,
        Err(_) => ServerStatus::Error,
    };
    save_server_config(&state.paths, &server)?;

    match &result {
        Ok(outcome) => {
            for notice in &outcome.notices {
                tracing::warn!("{}", notice);
            }
        }
        Err(e) => tracing::error!("Launch of {} aborted: {}", server_id, e),
    }
    result
}

pub async fn stop_server(server_id: &str, state: &ServerState) -> Result<ServerResponse, String> {
    tracing::info!("Stopping server: {}", server_id);

    let mut server = load_server_config(&state.paths, server_id).map_err(|e| e.to_string())?;
    let supervisor = state.supervisor(server_id).await;
    let mut supervisor = supervisor.lock().await;

    let stopped = supervisor.stop().await;
    server.status = supervisor.status();
    save_server_config(&state.paths, &server).map_err(|e| e.to_string())?;
    stopped.map_err(|e| e.to_string())?;

    Ok(ServerResponse {
        success: true,
        server: Some(server),
        error: None,
    })
}

/// Wait until the server process exits on its own. Returns its exit code,
/// or `None` when it was not running or was killed by a signal.
pub async fn wait_for_exit(server_id: &str, state: &ServerState) -> Result<Option<i32>, String> {
    let supervisor = state.supervisor(server_id).await;

    loop {
        if let Ok(mut guard) = supervisor.try_lock() {
            if !guard.is_running() {
                return Ok(None);
            }
            if let Some(code) = guard.try_exit().await {
                drop(guard);
                let mut server =
                    load_server_config(&state.paths, server_id).map_err(|e| e.to_string())?;
                server.status = ServerStatus::Stopped;
                save_server_config(&state.paths, &server).map_err(|e| e.to_string())?;
                return Ok(code);
            }
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

/// Render the server config file from the game's template
pub async fn create_server_config(
    server_id: &str,
    overwrite: bool,
    state: &ServerState,
    games_state: &GamesState,
) -> Result<ConfigWrite, String> {
    let server = load_server_config(&state.paths, server_id).map_err(|e| e.to_string())?;
    let game = games_state
        .get_game(&server.game_type)
        .await
        .ok_or_else(|| format!("Game type '{}' not found", server.game_type))?;

    let variables = server_variables(&game, &server.name, server.max_players);
    write_server_config(&server.paths().server_files(), &game, &variables, overwrite)
        .map_err(|e| e.to_string())
}

pub async fn delete_server(
    server_id: &str,
    delete_data: bool,
    state: &ServerState,
) -> Result<ServerResponse, String> {
    tracing::info!("Deleting server: {}", server_id);

    let server = load_server_config(&state.paths, server_id).map_err(|e| e.to_string())?;
    {
        let supervisor = state.supervisor(server_id).await;
        let mut supervisor = supervisor.lock().await;
        if supervisor.is_running() {
            supervisor.stop().await.map_err(|e| e.to_string())?;
        }
    }
    state.supervisors.lock().await.remove(server_id);

    std::fs::remove_file(state.paths.server_config_path(server_id)).ok();

    if delete_data && server.data_path.exists() {
        std::fs::remove_dir_all(&server.data_path).map_err(|e| e.to_string())?;
    }

    Ok(ServerResponse {
        success: true,
        server: None,
        error: None,
    })
}

/// Read the mod list, download everything in one SteamCMD batch, then
/// install what arrived. Missing items are reported per mod.
pub async fn sync_server_mods(
    server: &Server,
    game: &GameConfig,
    credentials_path: &Path,
    downloader: &dyn WorkshopDownloader,
) -> SyncResult<SyncOutcome> {
    let server_paths = server.paths();
    let parsed = read_mod_list(&server_paths.mod_list())?;

    if parsed.mods.is_empty() {
        tracing::info!("No mods configured for {}", server.id);
        return Ok(SyncOutcome {
            skipped_lines: parsed.skipped,
            ..Default::default()
        });
    }

    let credentials = load_credentials(credentials_path)?;
    let login = Login::resolve(
        credentials,
        server.allow_anonymous_login || game.login_anonymous,
        credentials_path,
    )?;

    let request = DownloadRequest {
        workshop_app_id: game.workshop_app_id.clone(),
        content_ids: parsed
            .mods
            .content_ids()
            .into_iter()
            .map(String::from)
            .collect(),
        login,
    };
    let download = downloader.download(&request).await?;

    let installer = ContentInstaller::new(
        server_paths.server_files(),
        server_paths.keys_dir(&game.keys_dir),
        &game.key_extension,
    );
    let report = installer.install_all(&parsed.mods, |content_id| {
        downloader.content_dir(&game.workshop_app_id, content_id)
    });

    Ok(SyncOutcome {
        requested: parsed.mods.len(),
        failures: report
            .failures
            .iter()
            .map(|f| ModFailureReport {
                content_id: f.content_id.clone(),
                name: f.name.clone(),
                message: f.error.to_string(),
            })
            .collect(),
        installed: report.installed,
        skipped_lines: parsed.skipped,
        download: Some(download),
    })
}

/// Pick the executable and build the argument list from the server's
/// network overrides and the installed mod names.
pub fn prepare_launch(
    server: &Server,
    game: &GameConfig,
    installed_names: &[String],
) -> SyncResult<(LaunchCommand, Vec<String>)> {
    let server_files = server.paths().server_files();
    let executable = select_executable(&server_files, game)?;

    let mut notices = Vec::new();
    if let Some(config_file) = &game.config_file {
        let config_path = server_files.join(&config_file.path);
        if !config_path.exists() {
            notices.push(format!("{} not found ({})", config_file.path, config_path.display()));
        }
    }

    let port = match server.port {
        0 => String::new(),
        port => port.to_string(),
    };
    let args = build_launch_args(&server.params, &server.ip, &port, installed_names)?;

    Ok((
        LaunchCommand {
            executable,
            working_dir: server_files,
            args,
        },
        notices,
    ))
}

fn steamcmd_for(paths: &AppPaths, server: &Server) -> SteamCmd {
    SteamCmd::new(paths.steamcmd_exe(), server.paths().workshop_staging())
        .with_timeout(server.download_timeout())
}

pub fn save_server_config(paths: &AppPaths, server: &Server) -> SyncResult<()> {
    let config_dir = paths.config_dir();
    std::fs::create_dir_all(&config_dir).map_err(|e| SyncError::io(&config_dir, e))?;
    let config_path = paths.server_config_path(&server.id);
    let content = serde_json::to_string_pretty(server)?;
    std::fs::write(&config_path, content).map_err(|e| SyncError::io(&config_path, e))
}

pub fn load_server_config(paths: &AppPaths, server_id: &str) -> SyncResult<Server> {
    let config_path = paths.server_config_path(server_id);
    if !config_path.exists() {
        return Err(SyncError::ServerNotFound(server_id.to_string()));
    }
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| SyncError::io(&config_path, e))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::DAYZ_GAME_TYPE;

    fn test_state(root: &Path) -> (ServerState, GamesState) {
        let paths = AppPaths::new(root);
        let games = GamesState::new(&paths);
        (ServerState::new(paths), games)
    }

    fn dayz_request(name: &str) -> CreateServerRequest {
        CreateServerRequest {
            name: name.to_string(),
            game_type: GameType::new(DAYZ_GAME_TYPE),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_server_uses_game_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (state, games) = test_state(dir.path());

        let response = create_server(dayz_request("Chernarus"), &state, &games).await.unwrap();
        let server = response.server.unwrap();

        assert_eq!(server.port, 2302);
        assert_eq!(server.max_players, 60);
        assert!(!server.allow_anonymous_login);
        assert_eq!(server.params, "-config=serverDZ.cfg -doLogs -adminLog -netLog");

        let cfg = server.paths().server_file("serverDZ.cfg");
        assert!(std::fs::read_to_string(cfg).unwrap().contains("hostname = \"Chernarus\";"));

        let listed = list_servers(&state).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, server.id);
    }

    #[tokio::test]
    async fn test_create_server_unknown_game() {
        let dir = tempfile::tempdir().unwrap();
        let (state, games) = test_state(dir.path());

        let mut request = dayz_request("x");
        request.game_type = GameType::new("tetris");
        assert!(create_server(request, &state, &games).await.is_err());
    }

    #[tokio::test]
    async fn test_prepare_launch_notices_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let (state, games) = test_state(dir.path());
        let server = create_server(dayz_request("x"), &state, &games).await.unwrap().server.unwrap();
        let game = games.get_game(&server.game_type).await.unwrap();

        let server_files = server.paths().server_files();
        std::fs::write(server_files.join("DayZServer_x64.exe"), "").unwrap();
        std::fs::remove_file(server_files.join("serverDZ.cfg")).unwrap();

        let (command, notices) = prepare_launch(&server, &game, &["@CF".to_string()]).unwrap();
        assert_eq!(command.working_dir, server_files);
        assert_eq!(command.args.last().unwrap(), "-mod=CF;");
        assert!(command.args.contains(&"-port=2302".to_string()));
        assert_eq!(notices.len(), 1);
        assert!(notices[0].starts_with("serverDZ.cfg not found"));
    }

    #[tokio::test]
    async fn test_missing_executable_aborts_before_sync() {
        let dir = tempfile::tempdir().unwrap();
        let (state, games) = test_state(dir.path());
        let server = create_server(dayz_request("x"), &state, &games).await.unwrap().server.unwrap();

        let err = start_server(&server.id, &state, &games, None).await.unwrap_err();
        assert!(err.contains("DayZServer_x64.exe not found"));
        assert_eq!(get_server_status(&server.id, &state).await.unwrap(), ServerStatus::Error);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let (state, games) = test_state(dir.path());
        let server = create_server(dayz_request("x"), &state, &games).await.unwrap().server.unwrap();

        let err = stop_server(&server.id, &state).await.unwrap_err();
        assert!(err.contains("not running"));
        assert_eq!(wait_for_exit(&server.id, &state).await.unwrap(), None);
    }

    #[test]
    fn test_server_record_defaults() {
        let json = r#"{
            "id": "abcd1234",
            "name": "old",
            "game_type": "dayz",
            "status": "running",
            "port": 2302,
            "max_players": 10,
            "data_path": "/srv/abcd1234",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let server: Server = serde_json::from_str(json).unwrap();
        assert!(server.embed_console);
        assert_eq!(server.ip, "");
        assert_eq!(server.download_timeout(), Some(Duration::from_secs(3600)));
    }
}
