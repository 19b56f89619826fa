//! Settings files.
//!
//! Settings are TOML documents deserialized into the core settings structs.
//! Missing fields keep their factory values; no file at all means factory
//! settings.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load settings from `path`, or the factory settings when there is none.
pub fn load<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, SettingsError> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text, path)
}

fn parse<T: DeserializeOwned>(text: &str, path: &Path) -> Result<T, SettingsError> {
    toml::from_str(text).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use handshake_core::{ClientSettings, GreetingPolicy, Identity, ServerSettings};

    #[test]
    fn no_file_means_factory_settings() {
        let client: ClientSettings = load(None).unwrap();
        assert_eq!(client, ClientSettings::default());
    }

    #[test]
    fn missing_file_is_reported() {
        let path = Path::new("/nonexistent/handshake.toml");
        let err = load::<ServerSettings>(Some(path)).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/handshake.toml"));
    }

    #[test]
    fn parses_server_settings() {
        let server: ServerSettings = parse(
            r#"
            local_identity = "Buster"
            greeting_policy = "single_shot"

            [address]
            host = "0.0.0.0"
            port = 32011
            "#,
            Path::new("server.toml"),
        )
        .unwrap();
        assert_eq!(server.local_identity, Identity::new("Buster"));
        assert_eq!(server.greeting_policy, GreetingPolicy::SingleShot);
    }

    #[test]
    fn bad_toml_names_the_file() {
        let err = parse::<ClientSettings>("handshake_timeout_ms = \"soon\"", Path::new("client.toml"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().starts_with("invalid settings in client.toml"));
    }

    #[test]
    fn shipped_config_files_match_factory_settings() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let client: ClientSettings = load(Some(&dir.join("client.toml"))).unwrap();
        let server: ServerSettings = load(Some(&dir.join("server.toml"))).unwrap();
        assert_eq!(client, ClientSettings::default());
        assert_eq!(server, ServerSettings::default());
    }
}
