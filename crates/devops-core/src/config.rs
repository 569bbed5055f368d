use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Hard per-request id limit of the `workitems` endpoint.
pub const MAX_BATCH_SIZE: usize = 200;

const ENV_ORGANIZATION: &str = "ADO_ORGANIZATION";
const ENV_PROJECT: &str = "ADO_PROJECT";
const ENV_PAT: &str = "ADO_PAT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// One or more connection fields are blank. No request is attempted.
    #[error("connection settings incomplete: missing {}", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },

    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no platform config directory available")]
    NoConfigDir,
}

/// Everything the engine needs, loaded and saved as one TOML document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub defaults: Defaults,
}

/// Organization, project and personal access token.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub pat: String,
}

impl ConnectionConfig {
    /// Fail fast unless organization, project and PAT are all set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Incomplete`] listing every blank field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&'static str> = [
            ("organization", &self.organization),
            ("project", &self.project),
            ("pat", &self.pat),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Incomplete { missing })
        }
    }
}

// The PAT never reaches logs or debug output.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("pat", &redact(&self.pat))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_waves")]
    pub max_waves: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FetchConfig {
    /// Batch size clamped to `1..=MAX_BATCH_SIZE`.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// Wave cap, never below 1.
    #[must_use]
    pub fn effective_max_waves(&self) -> usize {
        self.max_waves.max(1)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_waves: default_max_waves(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Fallbacks used when a command omits its area or state filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub area_path: Option<String>,
    #[serde(default)]
    pub states: Vec<String>,
}

const fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

const fn default_max_waves() -> usize {
    32
}

const fn default_timeout_secs() -> u64 {
    30
}

/// `<config dir>/devops-assistant/config.toml`.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] on platforms without one.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("devops-assistant").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] or [`ConfigError::Write`].
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }

    /// Apply `ADO_ORGANIZATION`, `ADO_PROJECT` and `ADO_PAT` from the process
    /// environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fields = [
            (ENV_ORGANIZATION, &mut self.connection.organization),
            (ENV_PROJECT, &mut self.connection.project),
            (ENV_PAT, &mut self.connection.pat),
        ];
        for (key, slot) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = value;
            }
        }
        self
    }

    /// A copy safe to print: the PAT is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.connection.pat = redact(&self.connection.pat);
        copy
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn complete() -> ConnectionConfig {
        ConnectionConfig {
            organization: "contoso".to_string(),
            project: "Fabrikam".to_string(),
            pat: "secret".to_string(),
        }
    }

    #[test]
    fn validate_accepts_complete_connection() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn validate_lists_every_blank_field() {
        let conn = ConnectionConfig {
            organization: " ".to_string(),
            ..ConnectionConfig::default()
        };
        match conn.validate() {
            Err(ConfigError::Incomplete { missing }) => {
                assert_eq!(missing, vec!["organization", "project", "pat"]);
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    #[test]
    fn debug_output_masks_pat() {
        let rendered = format!("{:?}", complete());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("********"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.fetch.batch_size, 200);
        assert_eq!(settings.fetch.max_waves, 32);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let settings = Settings {
            connection: complete(),
            fetch: FetchConfig {
                batch_size: 50,
                ..FetchConfig::default()
            },
            defaults: Defaults {
                area_path: Some("Fabrikam\\Web".to_string()),
                states: vec!["New".to_string(), "Active".to_string()],
            },
        };

        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection]\norganization = \"contoso\"\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.connection.organization, "contoso");
        assert!(settings.connection.pat.is_empty());
        assert_eq!(settings.fetch, FetchConfig::default());
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn overrides_replace_only_non_blank_values() {
        let env: HashMap<&str, &str> = [("ADO_PAT", "from-env"), ("ADO_PROJECT", "  ")]
            .into_iter()
            .collect();
        let settings = Settings {
            connection: complete(),
            ..Settings::default()
        }
        .with_overrides_from(|key| env.get(key).map(ToString::to_string));

        assert_eq!(settings.connection.pat, "from-env");
        assert_eq!(settings.connection.project, "Fabrikam");
    }

    #[test]
    fn batch_size_is_clamped() {
        let mut fetch = FetchConfig::default();
        fetch.batch_size = 0;
        assert_eq!(fetch.effective_batch_size(), 1);
        fetch.batch_size = 5000;
        assert_eq!(fetch.effective_batch_size(), MAX_BATCH_SIZE);
    }

    #[test]
    fn zero_wave_cap_still_allows_one_wave() {
        let mut fetch = FetchConfig::default();
        fetch.max_waves = 0;
        assert_eq!(fetch.effective_max_waves(), 1);
        fetch.max_waves = 5;
        assert_eq!(fetch.effective_max_waves(), 5);
    }

    #[test]
    fn redacted_copy_hides_pat() {
        let settings = Settings {
            connection: complete(),
            ..Settings::default()
        };
        assert_eq!(settings.redacted().connection.pat, "********");
        assert_eq!(settings.connection.pat, "secret");
    }
}
