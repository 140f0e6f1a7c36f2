// Game profile registry: built-in profiles plus custom ones stored as JSON

use crate::games::config::{get_builtin_games, GameConfig, GameType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Custom profiles shadow built-in ones with the same id.
pub struct GamesManager {
    builtin: Vec<GameConfig>,
    custom: BTreeMap<String, GameConfig>,
    store_path: PathBuf,
}

impl GamesManager {
    pub fn new(store_path: PathBuf) -> Self {
        let custom = read_custom_profiles(&store_path)
            .into_iter()
            .map(|game| (game.game_type.0.clone(), game))
            .collect();

        Self {
            builtin: get_builtin_games(),
            custom,
            store_path,
        }
    }

    fn builtin(&self, id: &str) -> Option<&GameConfig> {
        self.builtin.iter().find(|g| g.game_type.0 == id)
    }

    /// Built-in profiles that are not shadowed, then custom ones by name
    pub fn get_all_games(&self) -> Vec<GameConfig> {
        let mut custom: Vec<GameConfig> = self.custom.values().cloned().collect();
        custom.sort_by(|a, b| a.name.cmp(&b.name));

        self.builtin
            .iter()
            .filter(|g| !self.custom.contains_key(&g.game_type.0))
            .cloned()
            .chain(custom)
            .collect()
    }

    pub fn get_game(&self, game_type: &GameType) -> Option<GameConfig> {
        self.custom
            .get(&game_type.0)
            .or_else(|| self.builtin(&game_type.0))
            .cloned()
    }

    pub fn add_game(&mut self, mut game: GameConfig) -> Result<(), String> {
        validate_game(&game)?;

        game.is_custom = true;
        tracing::info!("Saving custom game profile: {}", game.game_type);
        self.custom.insert(game.game_type.0.clone(), game);
        self.persist()
    }

    pub fn import_game(&mut self, json: &str) -> Result<GameConfig, String> {
        let mut game: GameConfig =
            serde_json::from_str(json).map_err(|e| format!("Invalid JSON: {}", e))?;
        game.is_custom = true;
        self.add_game(game.clone())?;
        Ok(game)
    }

    pub fn delete_game(&mut self, game_type: &GameType) -> Result<(), String> {
        if self.custom.remove(&game_type.0).is_some() {
            return self.persist();
        }

        match self.builtin(&game_type.0) {
            Some(_) => Err(format!(
                "'{}' is built in and can only be overridden by a custom profile",
                game_type
            )),
            None => Err(format!("Game type '{}' not found", game_type)),
        }
    }

    fn persist(&self) -> Result<(), String> {
        let profiles: Vec<&GameConfig> = self.custom.values().collect();
        let content = serde_json::to_string_pretty(&profiles).map_err(|e| e.to_string())?;

        if let Some(dir) = self.store_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
        }
        std::fs::write(&self.store_path, content).map_err(|e| e.to_string())
    }
}

fn read_custom_profiles(path: &Path) -> Vec<GameConfig> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable custom games file {:?}: {}", path, e);
        Vec::new()
    })
}

fn validate_game(game: &GameConfig) -> Result<(), String> {
    let required = [
        ("game_type", game.game_type.0.as_str()),
        ("start_path", game.start_path.as_str()),
        ("workshop_app_id", game.workshop_app_id.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(format!("{} cannot be empty", field));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::config::DAYZ_GAME_TYPE;

    fn custom_game(id: &str) -> GameConfig {
        GameConfig {
            game_type: GameType::new(id),
            name: format!("{} server", id),
            start_path: "server.exe".to_string(),
            workshop_app_id: "107410".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_builtin_dayz_available() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GamesManager::new(dir.path().join("custom_games.json"));
        let game = manager.get_game(&GameType::new(DAYZ_GAME_TYPE)).unwrap();
        assert!(!game.is_custom);
        assert_eq!(game.start_path, "DayZServer_x64.exe");
    }

    #[test]
    fn test_custom_game_persists_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games").join("custom_games.json");

        let mut manager = GamesManager::new(path.clone());
        let mut override_game = custom_game(DAYZ_GAME_TYPE);
        override_game.start_path = "DayZServer".to_string();
        manager.add_game(override_game).unwrap();
        manager.add_game(custom_game("arma3")).unwrap();

        let reloaded = GamesManager::new(path);
        let dayz = reloaded.get_game(&GameType::new(DAYZ_GAME_TYPE)).unwrap();
        assert!(dayz.is_custom);
        assert_eq!(dayz.start_path, "DayZServer");
        assert_eq!(reloaded.get_all_games().len(), 2);
    }

    #[test]
    fn test_cannot_delete_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GamesManager::new(dir.path().join("custom_games.json"));
        assert!(manager.delete_game(&GameType::new(DAYZ_GAME_TYPE)).is_err());
        assert!(manager.delete_game(&GameType::new("nope")).is_err());
    }

    #[test]
    fn test_import_rejects_missing_start_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GamesManager::new(dir.path().join("custom_games.json"));
        let mut game = custom_game("broken");
        game.start_path.clear();
        let json = serde_json::to_string(&game).unwrap();
        assert!(manager.import_game(&json).is_err());
        assert!(manager.import_game("not json").is_err());
    }
}
