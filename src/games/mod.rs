mod config;
mod config_processor;
mod manager;

pub use config::{get_builtin_games, ConfigFile, GameConfig, GameType, DAYZ_GAME_TYPE};
pub use config_processor::{
    append_directives, render_template, server_variables, write_server_config, ConfigWrite,
};
pub use manager::GamesManager;
