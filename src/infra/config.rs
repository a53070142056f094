//! Runtime configuration: defaults, YAML file, environment, CLI flags.
//!
//! Later sources override earlier ones. The session token never leaves a
//! `SecretBox` except when the HTTP helper writes the auth header.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretBox;
use serde::Deserialize;

use super::constants::{
    CONFIG_FILE, DEFAULT_SERVER_URL, DEFAULT_VOLATILE_FIELDS, PIN_THRESHOLD_ROWS, POLL_INTERVAL_MS,
    RECONNECT_DELAY_MS, STORE_DIR,
};

#[derive(Debug)]
pub enum ConfigError {
    /// Config file exists but could not be read
    Read { path: PathBuf, message: String },
    /// Config file is not valid YAML for `FileConfig`
    Parse { path: PathBuf, message: String },
    /// A value was present but unusable
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, message } => write!(f, "Cannot read {}: {}", path.display(), message),
            ConfigError::Parse { path, message } => write!(f, "Cannot parse {}: {}", path.display(), message),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Shape of `.opsdeck/config.yaml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server_url: Option<String>,
    token: Option<String>,
    poll_interval_ms: Option<u64>,
    reconnect_delay_ms: Option<u64>,
    volatile_fields: Option<Vec<String>>,
    pin_threshold_rows: Option<f32>,
    log_level: Option<String>,
}

/// Command-line flags, parsed by hand.
#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub url: Option<String>,
    pub token: Option<String>,
    pub config_path: Option<PathBuf>,
    pub help: bool,
}

impl CliArgs {
    pub const USAGE: &'static str = "Usage: opsdeck [--url <server>] [--token <token>] [--config <file.yaml>]";

    /// Parse flags (without the program name).
    pub fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let mut cli = CliArgs::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || {
                i += 1;
                args.get(i).cloned().ok_or_else(|| ConfigError::Invalid(format!("{} needs a value", flag)))
            };
            match flag {
                "--url" => cli.url = Some(value()?),
                "--token" => cli.token = Some(value()?),
                "--config" => cli.config_path = Some(PathBuf::from(value()?)),
                "-h" | "--help" => cli.help = true,
                other => return Err(ConfigError::Invalid(format!("unknown argument: {}", other))),
            }
            i += 1;
        }
        Ok(cli)
    }
}

pub struct Config {
    pub server_url: String,
    pub token: Option<SecretBox<String>>,
    pub poll_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub volatile_fields: Vec<String>,
    pub pin_threshold_rows: f32,
    pub log_level: String,
    pub store_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            token: None,
            poll_interval_ms: POLL_INTERVAL_MS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            volatile_fields: DEFAULT_VOLATILE_FIELDS.iter().map(|s| s.to_string()).collect(),
            pin_threshold_rows: PIN_THRESHOLD_ROWS,
            log_level: "info".to_string(),
            store_dir: PathBuf::from(STORE_DIR),
        }
    }
}

impl Config {
    /// Assemble the configuration from every source.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();
        let path = cli.config_path.clone().unwrap_or_else(|| config.store_dir.join(CONFIG_FILE));
        // An explicit --config must exist; the default location is optional.
        if cli.config_path.is_some() || path.exists() {
            config.apply_file(&path)?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.to_path_buf(), message: e.to_string() })?;
        let file: FileConfig = serde_yaml::from_str(&raw)
            .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), message: e.to_string() })?;

        if let Some(url) = file.server_url {
            self.server_url = url;
        }
        if let Some(token) = file.token {
            self.token = Some(SecretBox::new(Box::new(token)));
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(ms) = file.reconnect_delay_ms {
            self.reconnect_delay_ms = ms;
        }
        if let Some(fields) = file.volatile_fields {
            self.volatile_fields = fields;
        }
        if let Some(rows) = file.pin_threshold_rows {
            self.pin_threshold_rows = rows;
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("OPSDECK_URL") {
            self.server_url = url;
        }
        if let Some(token) = lookup("OPSDECK_TOKEN") {
            self.token = Some(SecretBox::new(Box::new(token)));
        }
        if let Some(ms) = lookup("OPSDECK_POLL_MS") {
            self.poll_interval_ms =
                ms.parse().map_err(|_| ConfigError::Invalid(format!("OPSDECK_POLL_MS is not a number: {}", ms)))?;
        }
        if let Some(ms) = lookup("OPSDECK_RECONNECT_MS") {
            self.reconnect_delay_ms = ms
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("OPSDECK_RECONNECT_MS is not a number: {}", ms)))?;
        }
        if let Some(level) = lookup("OPSDECK_LOG") {
            self.log_level = level;
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(url) = &cli.url {
            self.server_url = url.clone();
        }
        if let Some(token) = &cli.token {
            self.token = Some(SecretBox::new(Box::new(token.clone())));
        }
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        let trimmed = self.server_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!("server url must be http(s): {}", self.server_url)));
        }
        self.server_url = trimmed.to_string();
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll interval must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cli_flags_parse() {
        let cli = CliArgs::parse(&args(&["--url", "http://ops:9000", "--config", "x.yaml"])).unwrap();
        assert_eq!(cli.url.as_deref(), Some("http://ops:9000"));
        assert_eq!(cli.config_path, Some(PathBuf::from("x.yaml")));
        assert!(!cli.help);

        assert!(CliArgs::parse(&args(&["--url"])).is_err());
        assert!(CliArgs::parse(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn file_then_env_then_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_url: http://from-file:1/\npoll_interval_ms: 500\nvolatile_fields: [now, tick]").unwrap();

        let mut config = Config::default();
        config.apply_file(file.path()).unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.volatile_fields, vec!["now".to_string(), "tick".to_string()]);

        let env: HashMap<&str, &str> = [("OPSDECK_POLL_MS", "750"), ("OPSDECK_TOKEN", "s3cret")].into();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.poll_interval_ms, 750);
        assert_eq!(config.token.as_ref().map(|t| t.expose_secret().clone()), Some("s3cret".to_string()));

        config.apply_cli(&CliArgs { url: Some("https://cli:2/".into()), ..Default::default() });
        config.validate().unwrap();
        assert_eq!(config.server_url, "https://cli:2");
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = Config::default();
        let err = config.apply_env(|k| (k == "OPSDECK_POLL_MS").then(|| "soon".to_string())).unwrap_err();
        assert!(err.to_string().contains("OPSDECK_POLL_MS"));

        config.server_url = "ftp://nope".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unreadable_yaml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms: [not, a, number]").unwrap();
        let err = Config::default().apply_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
