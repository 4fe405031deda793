use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/server.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub model: ModelConfig,
    pub speech: SpeechConfig,
    pub synthesis: SynthesisConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub class_names_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub calibration_secs: f32,
    pub timeout_secs: f32,
    pub phrase_time_limit_secs: f32,
    pub pause_secs: f32,
    pub energy_multiplier: f32,
    pub min_energy: f32,
    pub transcription_url: Option<String>,
    pub api_key: Option<String>,
    pub transcription_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub program: String,
    pub rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 16 * 1024 * 1024,
            model: ModelConfig::default(),
            speech: SpeechConfig::default(),
            synthesis: SynthesisConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/pest_disease_model.onnx"),
            class_names_path: PathBuf::from("model/class_names.json"),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            calibration_secs: 1.0,
            timeout_secs: 5.0,
            phrase_time_limit_secs: 8.0,
            pause_secs: 0.8,
            energy_multiplier: 1.5,
            min_energy: 0.01,
            transcription_url: None,
            api_key: None,
            transcription_model: "whisper-1".to_string(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            program: "espeak".to_string(),
            rate: 150,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".to_string(),
        }
    }
}

impl SpeechConfig {
    pub fn calibration(&self) -> Duration {
        Duration::from_secs_f32(self.calibration_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f32(self.timeout_secs)
    }

    pub fn phrase_time_limit(&self) -> Duration {
        Duration::from_secs_f32(self.phrase_time_limit_secs)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs_f32(self.pause_secs)
    }

    /// Rejects timings the accessors above could not turn into a `Duration`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timings = [
            ("speech.calibration_secs", self.calibration_secs),
            ("speech.timeout_secs", self.timeout_secs),
            ("speech.phrase_time_limit_secs", self.phrase_time_limit_secs),
            ("speech.pause_secs", self.pause_secs),
        ];
        for (key, secs) in timings {
            if Duration::try_from_secs_f32(secs).is_err() {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: secs.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Defaults, then the YAML file (if any), then process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("LEAFCARE_CONFIG").ok();
        let path = explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

        let mut config = if explicit.is_some() || Path::new(path).exists() {
            log::info!("Loading configuration from {}", path);
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.speech.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ServerConfig = serde_yaml::from_str(&config_str)?;
        config.speech.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("BIND_ADDRESS") {
            self.bind_address = address;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_value("PORT", port)?;
        }
        if let Some(limit) = lookup("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_value("MAX_UPLOAD_BYTES", limit)?;
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.model_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("CLASS_NAMES_PATH") {
            self.model.class_names_path = PathBuf::from(path);
        }
        if let Some(program) = lookup("TTS_PROGRAM") {
            self.synthesis.program = program;
        }
        if let Some(rate) = lookup("TTS_RATE") {
            self.synthesis.rate = parse_value("TTS_RATE", rate)?;
        }
        if let Some(url) = lookup("STT_URL") {
            self.speech.transcription_url = Some(url);
        }
        if let Some(key) = lookup("STT_API_KEY") {
            self.speech.api_key = Some(key);
        }
        if let Some(model) = lookup("STT_MODEL") {
            self.speech.transcription_model = model;
        }
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.chat.gemini_api_key = Some(key);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.chat.gemini_model = model;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_listen_timings() {
        let config = ServerConfig::default();
        assert_eq!(config.synthesis.rate, 150);
        assert_eq!(config.speech.timeout(), Duration::from_secs(5));
        assert_eq!(config.speech.phrase_time_limit(), Duration::from_secs(8));
        assert_eq!(config.speech.calibration(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.yaml");
        fs::write(&path, "port: 8080\nsynthesis:\n  program: espeak-ng\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.synthesis.program, "espeak-ng");
        assert_eq!(config.synthesis.rate, 150);
        assert_eq!(config.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = ServerConfig::from_file(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "9000"),
            ("MODEL_PATH", "/models/leaf.pt"),
            ("GEMINI_API_KEY", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.model.model_path, PathBuf::from("/models/leaf.pt"));
        assert_eq!(config.chat.gemini_api_key.as_deref(), Some("secret"));
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_negative_timeout_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.yaml");
        fs::write(&path, "speech:\n  timeout_secs: -1\n").unwrap();

        let result = ServerConfig::from_file(&path);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "speech.timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_non_finite_pause_is_rejected() {
        let mut speech = SpeechConfig::default();
        speech.pause_secs = f32::NAN;
        assert!(matches!(
            speech.validate(),
            Err(ConfigError::InvalidValue {
                key: "speech.pause_secs",
                ..
            })
        ));
        assert!(SpeechConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut config = ServerConfig::default();
        let result = config.apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));
    }
}
