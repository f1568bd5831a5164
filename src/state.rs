use std::fs;
use std::path::{Path, PathBuf};

use crate::chat::ChatBridge;
use crate::error::IntegrationError;
use crate::hubspot::{AssociationStrategy, HubSpotClient};
use crate::types::Config;

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub hubspot: HubSpotClient,
    pub chat: ChatBridge,
}

impl AppState {
    /// Build the HubSpot adapter and chat bridge from configuration.
    ///
    /// Fails only on configuration that can never work (e.g. an unparsable
    /// endpoint URL). Missing credentials are not errors.
    pub fn new(config: Config) -> Result<Self, IntegrationError> {
        let hubspot = HubSpotClient::from_config(&config.hubspot)?;
        let chat = ChatBridge::from_config(&config.chat)?;
        Ok(Self::from_parts(config, hubspot, chat))
    }

    pub fn from_parts(config: Config, hubspot: HubSpotClient, chat: ChatBridge) -> Self {
        Self {
            config,
            hubspot,
            chat,
        }
    }
}

/// `$HUBNOTES_CONFIG`, else `~/.hubnotes/config.json`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("HUBNOTES_CONFIG").filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".hubnotes").join("config.json"))
}

/// Load configuration from the config file, then apply environment overrides.
pub fn load_config() -> Config {
    let mut config = match config_path() {
        Some(path) => read_config_file(&path),
        None => {
            log::warn!("Could not find home directory; using default configuration");
            Config::default()
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

/// A missing file gives defaults. A malformed one is reported and ignored.
pub fn read_config_file(path: &Path) -> Config {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No config file at {}; using defaults", path.display());
            return Config::default();
        }
        Err(e) => {
            log::warn!("Failed to read config {}: {}; using defaults", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&content) {
        Ok(config) => {
            log::info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            log::warn!("Failed to parse config {}: {}; using defaults", path.display(), e);
            Config::default()
        }
    }
}

/// Overlay environment variables onto `config`. Blank values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(endpoint) = var("HUBSPOT_API_ENDPOINT") {
        config.hubspot.api_endpoint = endpoint.trim().to_string();
    }
    if let Some(token) = var("HUBSPOT_ACCESS_TOKEN") {
        config.hubspot.access_token = Some(token);
    }
    if let Some(list) = var("HUBSPOT_ASSOCIATION_STRATEGIES") {
        match parse_strategies(&list) {
            Ok(strategies) => config.hubspot.association_strategies = strategies,
            Err(e) => log::warn!(
                "Ignoring HUBSPOT_ASSOCIATION_STRATEGIES={}: {}",
                list,
                e
            ),
        }
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        config.chat.api_key = Some(key);
    }
    if let Some(model) = var("OPENAI_MODEL") {
        config.chat.model = model.trim().to_string();
    }
    if let Some(bind) = var("HUBNOTES_BIND") {
        config.bind_address = bind.trim().to_string();
    }
}

/// Comma-separated strategy names, e.g. `batch,direct`.
fn parse_strategies(list: &str) -> Result<Vec<AssociationStrategy>, String> {
    let strategies = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<AssociationStrategy>, String>>()?;
    if strategies.is_empty() {
        return Err("no strategies listed".to_string());
    }
    Ok(strategies)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::hubspot::DEFAULT_API_ENDPOINT;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config_file(&dir.path().join("config.json"));
        assert_eq!(config.bind_address, "127.0.0.1:3000");
        assert_eq!(config.hubspot.api_endpoint, DEFAULT_API_ENDPOINT);
        assert!(config.hubspot.token().is_none());
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = read_config_file(&path);
        assert_eq!(config.chat.model, "gpt-3.5-turbo");
    }

    #[test]
    fn reads_nested_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "bindAddress": "0.0.0.0:8080",
                "hubspot": { "accessToken": "pat-na1-xyz", "associationStrategies": ["direct"] },
                "chat": { "maxTokens": 200 }
            }"#,
        )
        .unwrap();
        let config = read_config_file(&path);
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.hubspot.token(), Some("pat-na1-xyz"));
        assert_eq!(
            config.hubspot.association_strategies,
            vec![AssociationStrategy::Direct]
        );
        assert_eq!(config.chat.max_tokens, 200);
        assert_eq!(config.chat.temperature, 0.7);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.hubspot.access_token = Some("from-file".into());
        apply_env_overrides(
            &mut config,
            env(&[
                ("HUBSPOT_ACCESS_TOKEN", "from-env"),
                ("HUBSPOT_ASSOCIATION_STRATEGIES", "batch, direct"),
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_MODEL", "gpt-4o-mini"),
                ("HUBNOTES_BIND", "0.0.0.0:4000"),
            ]),
        );
        assert_eq!(config.hubspot.token(), Some("from-env"));
        assert_eq!(
            config.hubspot.association_strategies,
            vec![AssociationStrategy::Batch, AssociationStrategy::Direct]
        );
        assert_eq!(config.chat.api_key(), Some("sk-test"));
        assert_eq!(config.chat.model, "gpt-4o-mini");
        assert_eq!(config.bind_address, "0.0.0.0:4000");
    }

    #[test]
    fn blank_and_invalid_env_values_are_ignored() {
        let mut config = Config::default();
        config.hubspot.access_token = Some("from-file".into());
        apply_env_overrides(
            &mut config,
            env(&[
                ("HUBSPOT_ACCESS_TOKEN", "  "),
                ("HUBSPOT_ASSOCIATION_STRATEGIES", "batch,teleport"),
            ]),
        );
        assert_eq!(config.hubspot.token(), Some("from-file"));
        assert_eq!(config.hubspot.association_strategies.len(), 3);
    }

    #[test]
    fn missing_token_builds_mock_state() {
        let mut config = Config::default();
        config.bind_address = "0.0.0.0:4100".into();
        let state = AppState::new(config).unwrap();
        assert!(state.hubspot.is_mock());
        assert_eq!(state.config.bind_address, "0.0.0.0:4100");
    }

    #[test]
    fn configured_strategies_reach_the_client() {
        let mut config = Config::default();
        config.hubspot.access_token = Some("pat-na1-abcdefghijklmnop".into());
        config.hubspot.association_strategies =
            vec![AssociationStrategy::Direct, AssociationStrategy::Direct];
        let state = AppState::new(config).unwrap();
        assert!(!state.hubspot.is_mock());
        assert_eq!(state.hubspot.strategies(), &[AssociationStrategy::Direct]);
    }

    #[test]
    fn invalid_endpoint_is_a_startup_error() {
        let mut config = Config::default();
        config.hubspot.access_token = Some("pat-na1-abc".into());
        config.hubspot.api_endpoint = "not a url".into();
        let err = AppState::new(config).err().unwrap();
        assert!(matches!(err, IntegrationError::NotConfigured(_)));
    }
}
