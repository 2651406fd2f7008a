use gateway::config::{Listener, ServeConfig};
use outbound::OutboundConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use translator::config::{MappingsConfig, PluginConfig};
use translator::is_valid_identifier;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

fn default_listener() -> Listener {
    Listener::new("0.0.0.0", 8000)
}

fn default_admin_listener() -> Listener {
    Listener::new("127.0.0.1", 8001)
}

fn default_api_key() -> String {
    "changeme".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_listener")]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// Shared secret expected in `x-api-key`. Overridden by `API_KEY`.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default)]
    pub mappings: MappingsConfig,
    /// Mapping-driven plugins registered next to the built-in ones.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    #[serde(default)]
    pub outbound: OutboundConfig,
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: default_listener(),
            admin_listener: default_admin_listener(),
            api_key: default_api_key(),
            mappings: MappingsConfig::default(),
            plugins: Vec::new(),
            outbound: OutboundConfig::default(),
            metrics: None,
            logging: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Reads the file if one is given, applies environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides secrets and the endpoint from the environment, looked up
    /// through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("API_KEY") {
            self.api_key = api_key;
        }
        if let Some(url) = lookup("RGBRIDGE_API_URL") {
            self.outbound.url = url::Url::parse(&url)
                .map_err(|e| ConfigError::InvalidEnv("RGBRIDGE_API_URL", e.to_string()))?;
        }
        if let Some(username) = lookup("RGBRIDGE_API_USER") {
            self.outbound.username = Some(username);
        }
        if let Some(password) = lookup("RGBRIDGE_API_PASS") {
            self.outbound.password = Some(password);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.api_key.is_empty() {
            return Err(ValidationError::EmptyApiKey);
        }

        let mut ids = HashSet::new();
        for plugin in &self.plugins {
            if !is_valid_identifier(&plugin.id) {
                return Err(ValidationError::InvalidPluginId(plugin.id.clone()));
            }
            if !ids.insert(&plugin.id) {
                return Err(ValidationError::DuplicatePlugin(plugin.id.clone()));
            }
            if plugin.json_schema.is_some() && plugin.xsd.is_some() {
                return Err(ValidationError::ConflictingSchemas(plugin.id.clone()));
            }
        }

        if self.outbound.retry.max_attempts == 0 {
            return Err(ValidationError::ZeroAttempts);
        }
        if self.outbound.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn serve_config(&self) -> ServeConfig {
        ServeConfig {
            listener: self.listener.clone(),
            admin_listener: self.admin_listener.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    Listener(#[from] gateway::config::ValidationError),
    #[error("api_key cannot be empty")]
    EmptyApiKey,
    #[error("Invalid plugin id: {0:?}")]
    InvalidPluginId(String),
    #[error("Duplicate plugin id: {0}")]
    DuplicatePlugin(String),
    #[error("Plugin {0} declares both json_schema and xsd")]
    ConflictingSchemas(String),
    #[error("outbound.retry.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("outbound.timeout_secs must be at least 1")]
    ZeroTimeout,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid value in {0}: {1}")]
    InvalidEnv(&'static str, String),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use translator::payload::PayloadFormat;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            listener:
                host: 0.0.0.0
                port: 9000
            admin_listener:
                host: 127.0.0.1
                port: 9001
            api_key: s3cret
            mappings:
                base_dir: /var/lib/pms-bridge
            plugins:
                - id: otherpms
                  format: xml
                  xsd: /etc/pms-bridge/otherpms.xsd
            outbound:
                url: https://rgbridge.internal/api
                username: user
                password: pass
                timeout_secs: 5
                retry:
                    max_attempts: 4
                    base_delay_ms: 100
                    multiplier: 3.0
                    max_delay_ms: 1000
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: https://key@sentry.example.com/1
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");
        config.validate().expect("valid config");

        assert_eq!(config.listener, Listener::new("0.0.0.0", 9000));
        assert_eq!(config.api_key, "s3cret");
        assert_eq!(
            config.mappings.base_dir,
            std::path::PathBuf::from("/var/lib/pms-bridge")
        );
        assert_eq!(config.plugins[0].format, PayloadFormat::Xml);
        assert_eq!(config.outbound.url.as_str(), "https://rgbridge.internal/api");
        assert_eq!(config.outbound.retry.max_attempts, 4);
        assert_eq!(config.metrics.expect("metrics").statsd_port, 8125);
        assert!(config.logging.is_some());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let tmp = write_tmp_file("{}");
        let config = Config::from_file(tmp.path()).expect("load config");
        assert_eq!(config, Config::default());
        assert_eq!(config.admin_listener.port, 8001);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("API_KEY", "from-env"),
            ("RGBRIDGE_API_URL", "http://10.0.0.1:8080/rgbridge"),
            ("RGBRIDGE_API_USER", "envuser"),
            ("RGBRIDGE_API_PASS", "envpass"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .expect("apply env");

        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.outbound.url.as_str(), "http://10.0.0.1:8080/rgbridge");
        assert_eq!(config.outbound.username.as_deref(), Some("envuser"));
        assert_eq!(config.outbound.password.as_deref(), Some("envpass"));

        let mut config = Config::default();
        let err = config
            .apply_env(|name| (name == "RGBRIDGE_API_URL").then(|| "::".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv("RGBRIDGE_API_URL", _)));
    }

    #[test]
    fn validation_errors() {
        let plugin = |id: &str| PluginConfig {
            id: id.to_string(),
            format: PayloadFormat::Json,
            json_schema: None,
            xsd: None,
        };

        let mut config = Config::default();
        config.listener.port = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::Listener(
                gateway::config::ValidationError::InvalidPort
            ))
        );

        let mut config = Config::default();
        config.api_key.clear();
        assert_eq!(config.validate(), Err(ValidationError::EmptyApiKey));

        let mut config = Config::default();
        config.plugins = vec![plugin("otherpms"), plugin("otherpms")];
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicatePlugin("otherpms".into()))
        );

        let mut config = Config::default();
        config.plugins = vec![plugin("../etc")];
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidPluginId("../etc".into()))
        );

        let mut config = Config::default();
        let mut both = plugin("otherpms");
        both.json_schema = Some("a.json".into());
        both.xsd = Some("a.xsd".into());
        config.plugins = vec![both];
        assert_eq!(
            config.validate(),
            Err(ValidationError::ConflictingSchemas("otherpms".into()))
        );

        let mut config = Config::default();
        config.outbound.retry.max_attempts = 0;
        assert_eq!(config.validate(), Err(ValidationError::ZeroAttempts));

        let mut config = Config::default();
        config.outbound.timeout_secs = 0;
        assert_eq!(config.validate(), Err(ValidationError::ZeroTimeout));
    }

    #[test]
    fn missing_file() {
        let err = Config::from_file(Path::new("/does/not/exist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
