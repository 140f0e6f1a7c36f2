use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct GameType(pub String);

impl GameType {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GameType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Everything modsync needs to know about a dedicated server product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub game_type: GameType,
    pub name: String,
    pub description: String,
    /// Steam app id the workshop items are published under
    pub workshop_app_id: String,
    pub start_path: String,
    /// Alternate executable preferred when present in the server files
    #[serde(default)]
    pub modded_start_path: Option<String>,
    pub default_port: u16,
    #[serde(default)]
    pub query_port: Option<u16>,
    pub default_max_players: u32,
    #[serde(default)]
    pub default_map: String,
    #[serde(default)]
    pub default_params: String,
    #[serde(default)]
    pub config_file: Option<ConfigFile>,
    #[serde(default = "default_key_extension")]
    pub key_extension: String,
    #[serde(default = "default_keys_dir")]
    pub keys_dir: String,
    #[serde(default)]
    pub login_anonymous: bool,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_console() -> bool {
    true
}

fn default_key_extension() -> String {
    "bikey".to_string()
}

fn default_keys_dir() -> String {
    "keys".to_string()
}

/// Server configuration file generated from a template before first launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// File path relative to the server files (e.g., "serverDZ.cfg")
    pub path: String,
    /// Template text with {{hostname}}, {{maxplayers}}, {{map}} and {{queryport}} placeholders.
    /// Falls back to the built-in template for the game when unset.
    #[serde(default)]
    pub template: Option<String>,
    /// Lines appended verbatim after the rendered template
    #[serde(default)]
    pub additional_directives: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game_type: GameType::new("custom"),
            name: "Custom Game".to_string(),
            description: "A custom game server".to_string(),
            workshop_app_id: String::new(),
            start_path: String::new(),
            modded_start_path: None,
            default_port: 27015,
            query_port: None,
            default_max_players: 32,
            default_map: String::new(),
            default_params: String::new(),
            config_file: None,
            key_extension: default_key_extension(),
            keys_dir: default_keys_dir(),
            login_anonymous: false,
            is_custom: true,
            console: true,
        }
    }
}

impl GameConfig {
    pub fn config_template(&self) -> Option<&str> {
        let config = self.config_file.as_ref()?;
        match &config.template {
            Some(template) => Some(template.as_str()),
            None if self.game_type.0 == DAYZ_GAME_TYPE => Some(DAYZ_CONFIG_TEMPLATE),
            None => None,
        }
    }
}

pub const DAYZ_GAME_TYPE: &str = "dayz";

const DAYZ_CONFIG_TEMPLATE: &str = r#"hostname = "{{hostname}}";
password = "";
passwordAdmin = "";
maxPlayers = {{maxplayers}};
verifySignatures = 2;
forceSameBuild = 1;
disableVoN = 0;
vonCodecQuality = 20;
disable3rdPerson = 0;
disableCrosshair = 0;
steamQueryPort = {{queryport}};
serverTime = "SystemTime";
serverTimeAcceleration = 12;
serverNightTimeAcceleration = 1;
serverTimePersistent = 0;
guaranteedUpdates = 1;
loginQueueConcurrentPlayers = 5;
loginQueueMaxPlayers = 500;
instanceId = 1;
storageAutoFix = 1;

class Missions
{
    class DayZ
    {
        template = "{{map}}";
    };
};
"#;

pub fn get_builtin_games() -> Vec<GameConfig> {
    vec![GameConfig {
        game_type: GameType::new(DAYZ_GAME_TYPE),
        name: "DayZ Dedicated Server".to_string(),
        description: "DayZ Dedicated Server with workshop mod auto-update".to_string(),
        workshop_app_id: "221100".to_string(),
        start_path: "DayZServer_x64.exe".to_string(),
        modded_start_path: Some("DZSALModServer.exe".to_string()),
        default_port: 2302,
        query_port: Some(27016),
        default_max_players: 60,
        default_map: "dayzOffline.chernarusplus".to_string(),
        default_params: "-config=serverDZ.cfg -doLogs -adminLog -netLog".to_string(),
        config_file: Some(ConfigFile {
            path: "serverDZ.cfg".to_string(),
            template: None,
            additional_directives: Vec::new(),
        }),
        key_extension: default_key_extension(),
        keys_dir: default_keys_dir(),
        login_anonymous: false,
        is_custom: false,
        console: true,
    }]
}
