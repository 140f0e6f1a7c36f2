// Game profile commands

use crate::games::{GameConfig, GameType, GamesManager};
use crate::paths::AppPaths;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct GamesState {
    pub manager: Arc<Mutex<GamesManager>>,
}

impl GamesState {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            manager: Arc::new(Mutex::new(GamesManager::new(paths.custom_games_path()))),
        }
    }

    pub async fn get_game(&self, game_type: &GameType) -> Option<GameConfig> {
        self.manager.lock().await.get_game(game_type)
    }
}

impl Default for GamesState {
    fn default() -> Self {
        Self::new(&AppPaths::from_env())
    }
}

pub async fn list_available_games(state: &GamesState) -> Result<Vec<GameConfig>, String> {
    let manager = state.manager.lock().await;
    Ok(manager.get_all_games())
}

pub async fn get_game_config(game_type: &str, state: &GamesState) -> Result<Option<GameConfig>, String> {
    Ok(state.get_game(&GameType::new(game_type)).await)
}

/// Import a custom game profile from JSON
pub async fn import_game(json: &str, state: &GamesState) -> Result<GameConfig, String> {
    let mut manager = state.manager.lock().await;
    manager.import_game(json)
}

pub async fn delete_game(game_type: &str, state: &GamesState) -> Result<(), String> {
    let mut manager = state.manager.lock().await;
    manager.delete_game(&GameType::new(game_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::DAYZ_GAME_TYPE;

    #[tokio::test]
    async fn test_builtin_profile_available() {
        let dir = tempfile::tempdir().unwrap();
        let state = GamesState::new(&AppPaths::new(dir.path()));

        let game = get_game_config(DAYZ_GAME_TYPE, &state).await.unwrap().unwrap();
        assert_eq!(game.workshop_app_id, "221100");
        assert!(get_game_config("nothing", &state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_imported_profile_persists() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let json = r#"{
            "game_type": "arma3",
            "name": "Arma 3",
            "description": "Arma 3 dedicated server",
            "workshop_app_id": "107410",
            "start_path": "arma3server_x64.exe",
            "default_port": 2302,
            "default_max_players": 64
        }"#;

        let state = GamesState::new(&paths);
        let game = import_game(json, &state).await.unwrap();
        assert!(game.is_custom);

        let reloaded = GamesState::new(&paths);
        let games = list_available_games(&reloaded).await.unwrap();
        assert!(games.iter().any(|g| g.game_type.0 == "arma3"));

        delete_game("arma3", &reloaded).await.unwrap();
        assert!(reloaded.get_game(&GameType::new("arma3")).await.is_none());
    }
}
