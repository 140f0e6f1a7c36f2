// Config file processor - renders server config templates with variable substitution

use crate::error::{SyncError, SyncResult};
use crate::games::GameConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const HOSTNAME_VAR: &str = "hostname";
pub const MAX_PLAYERS_VAR: &str = "maxplayers";
pub const MAP_VAR: &str = "map";
pub const QUERY_PORT_VAR: &str = "queryport";

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWrite {
    Written(PathBuf),
    /// File already existed and was left alone
    Kept(PathBuf),
    /// Game has no config file or no template to render
    NotApplicable,
}

/// Replace every {{VAR}} placeholder that has a value.
/// Unknown placeholders are left in place.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Append fixed directives, one per line, after the rendered template
pub fn append_directives(content: &str, directives: &[String]) -> String {
    if directives.is_empty() {
        return content.to_string();
    }

    let mut result = content.to_string();
    if !result.is_empty() && !result.ends_with('\n') {
        result.push('\n');
    }
    for directive in directives {
        result.push_str(directive);
        result.push('\n');
    }
    result
}

/// Template variables for one server. Map and query port come from the
/// game profile and are left out when the profile has none.
pub fn server_variables(game: &GameConfig, hostname: &str, max_players: u32) -> HashMap<String, String> {
    let mut variables = HashMap::new();
    variables.insert(HOSTNAME_VAR.to_string(), hostname.to_string());
    variables.insert(MAX_PLAYERS_VAR.to_string(), max_players.to_string());
    if !game.default_map.is_empty() {
        variables.insert(MAP_VAR.to_string(), game.default_map.clone());
    }
    if let Some(port) = game.query_port {
        variables.insert(QUERY_PORT_VAR.to_string(), port.to_string());
    }
    variables
}

/// Render the game's config template into `base_path`.
/// An existing file is only replaced when `overwrite` is set.
pub fn write_server_config(
    base_path: &Path,
    game: &GameConfig,
    variables: &HashMap<String, String>,
    overwrite: bool,
) -> SyncResult<ConfigWrite> {
    let Some(config_file) = &game.config_file else {
        return Ok(ConfigWrite::NotApplicable);
    };
    let Some(template) = game.config_template() else {
        tracing::debug!("No config template for game: {}", game.game_type);
        return Ok(ConfigWrite::NotApplicable);
    };

    let file_path = base_path.join(&config_file.path);
    if file_path.exists() && !overwrite {
        tracing::debug!("Config file already exists: {:?}", file_path);
        return Ok(ConfigWrite::Kept(file_path));
    }

    let rendered = render_template(template, variables);
    let content = append_directives(&rendered, &config_file.additional_directives);

    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }
    std::fs::write(&file_path, content).map_err(|e| SyncError::io(&file_path, e))?;
    tracing::info!("Wrote config file: {:?}", file_path);

    Ok(ConfigWrite::Written(file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::config::{get_builtin_games, ConfigFile};

    #[test]
    fn test_placeholder_replacement() {
        let template = "hostname = \"{{hostname}}\";\nmaxPlayers = {{maxplayers}};\n";
        let variables = server_variables(&GameConfig::default(), "My Server", 60);

        let result = render_template(template, &variables);
        assert_eq!(result, "hostname = \"My Server\";\nmaxPlayers = 60;\n");
    }

    #[test]
    fn test_unknown_placeholder_untouched() {
        let variables = server_variables(&GameConfig::default(), "x", 1);
        assert_eq!(render_template("{{password}}", &variables), "{{password}}");
    }

    #[test]
    fn test_append_directives_adds_newline() {
        let result = append_directives("a = 1;", &["b = 2;".to_string()]);
        assert_eq!(result, "a = 1;\nb = 2;\n");
        assert_eq!(append_directives("a = 1;", &[]), "a = 1;");
    }

    #[test]
    fn test_write_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let game = get_builtin_games().remove(0);
        let variables = server_variables(&game, "Chernarus", 40);

        let first = write_server_config(dir.path(), &game, &variables, false).unwrap();
        let path = dir.path().join("serverDZ.cfg");
        assert_eq!(first, ConfigWrite::Written(path.clone()));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("hostname = \"Chernarus\";"));
        assert!(content.contains("maxPlayers = 40;"));
        assert!(content.contains("steamQueryPort = 27016;"));
        assert!(content.contains("template = \"dayzOffline.chernarusplus\";"));
        assert!(!content.contains("{{"));

        std::fs::write(&path, "edited").unwrap();
        let second = write_server_config(dir.path(), &game, &variables, false).unwrap();
        assert_eq!(second, ConfigWrite::Kept(path.clone()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "edited");

        write_server_config(dir.path(), &game, &variables, true).unwrap();
        assert_ne!(std::fs::read_to_string(&path).unwrap(), "edited");
    }

    #[test]
    fn test_custom_template_with_directives() {
        let dir = tempfile::tempdir().unwrap();
        let game = GameConfig {
            config_file: Some(ConfigFile {
                path: "cfg/server.cfg".to_string(),
                template: Some("name={{hostname}}".to_string()),
                additional_directives: vec!["motd=hello".to_string()],
            }),
            ..Default::default()
        };

        write_server_config(dir.path(), &game, &server_variables(&game, "box", 8), false).unwrap();
        let content = std::fs::read_to_string(dir.path().join("cfg/server.cfg")).unwrap();
        assert_eq!(content, "name=box\nmotd=hello\n");
    }

    #[test]
    fn test_no_config_file_is_not_applicable() {
        let dir = tempfile::tempdir().unwrap();
        let game = GameConfig::default();
        let result = write_server_config(dir.path(), &game, &HashMap::new(), true).unwrap();
        assert_eq!(result, ConfigWrite::NotApplicable);
    }
}
