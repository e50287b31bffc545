use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["rfpdesk.toml", "config/rfpdesk.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub mail: MailConfig,
    pub server: ServerConfig,
    pub rfp: RfpConfig,
    pub scoring: ScoringConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub transport: MailTransport,
    pub gateway_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RfpConfig {
    /// Draft fields that must be met before a session can be submitted, in prompt order.
    pub required_fields: Vec<String>,
    pub default_top_n: usize,
}

/// Relative weights of the quality components. Only their ratios matter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoringConfig {
    pub verification_weight: u32,
    pub rating_weight: u32,
    pub delivery_weight: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Deterministic rule-based extraction, no model calls.
    Rules,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTransport {
    /// In-process mailbox; nothing leaves the host.
    Loopback,
    Gateway,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub mail_transport: Option<MailTransport>,
    pub mail_gateway_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://rfpdesk.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Rules,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            mail: MailConfig {
                transport: MailTransport::Loopback,
                gateway_url: None,
                api_token: None,
                timeout_secs: 20,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            rfp: RfpConfig {
                required_fields: vec!["item".to_string(), "budget".to_string(), "deadline".to_string()],
                default_top_n: 2,
            },
            scoring: ScoringConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { verification_weight: 20, rating_weight: 25, delivery_weight: 10 }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected rules|openai|ollama)"
            ))),
        }
    }
}

impl MailTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loopback => "loopback",
            Self::Gateway => "gateway",
        }
    }
}

impl std::str::FromStr for MailTransport {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "loopback" => Ok(Self::Loopback),
            "gateway" => Ok(Self::Gateway),
            other => Err(ConfigError::Validation(format!(
                "unsupported mail transport `{other}` (expected loopback|gateway)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(transport) = mail.transport {
                self.mail.transport = transport;
            }
            if let Some(gateway_url) = mail.gateway_url {
                self.mail.gateway_url = Some(gateway_url);
            }
            if let Some(api_token) = mail.api_token {
                self.mail.api_token = Some(secret_value(api_token));
            }
            if let Some(timeout_secs) = mail.timeout_secs {
                self.mail.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(rfp) = patch.rfp {
            if let Some(required_fields) = rfp.required_fields {
                self.rfp.required_fields = required_fields;
            }
            if let Some(default_top_n) = rfp.default_top_n {
                self.rfp.default_top_n = default_top_n;
            }
        }

        if let Some(scoring) = patch.scoring {
            if let Some(weight) = scoring.verification_weight {
                self.scoring.verification_weight = weight;
            }
            if let Some(weight) = scoring.rating_weight {
                self.scoring.rating_weight = weight;
            }
            if let Some(weight) = scoring.delivery_weight {
                self.scoring.delivery_weight = weight;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RFPDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("RFPDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("RFPDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RFPDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("RFPDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RFPDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("RFPDESK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("RFPDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("RFPDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("RFPDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("RFPDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RFPDESK_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("RFPDESK_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("RFPDESK_MAIL_TRANSPORT") {
            self.mail.transport = value.parse()?;
        }
        if let Some(value) = read_env("RFPDESK_MAIL_GATEWAY_URL") {
            self.mail.gateway_url = Some(value);
        }
        if let Some(value) = read_env("RFPDESK_MAIL_API_TOKEN") {
            self.mail.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("RFPDESK_MAIL_TIMEOUT_SECS") {
            self.mail.timeout_secs = parse_u64("RFPDESK_MAIL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RFPDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RFPDESK_SERVER_PORT") {
            self.server.port = parse_u16("RFPDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("RFPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("RFPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("RFPDESK_RFP_REQUIRED_FIELDS") {
            self.rfp.required_fields = parse_list(&value);
        }
        if let Some(value) = read_env("RFPDESK_RFP_DEFAULT_TOP_N") {
            self.rfp.default_top_n = parse_usize("RFPDESK_RFP_DEFAULT_TOP_N", &value)?;
        }

        if let Some(value) = read_env("RFPDESK_SCORING_VERIFICATION_WEIGHT") {
            self.scoring.verification_weight =
                parse_u32("RFPDESK_SCORING_VERIFICATION_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("RFPDESK_SCORING_RATING_WEIGHT") {
            self.scoring.rating_weight = parse_u32("RFPDESK_SCORING_RATING_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("RFPDESK_SCORING_DELIVERY_WEIGHT") {
            self.scoring.delivery_weight = parse_u32("RFPDESK_SCORING_DELIVERY_WEIGHT", &value)?;
        }

        let log_level = read_env("RFPDESK_LOGGING_LEVEL").or_else(|| read_env("RFPDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RFPDESK_LOGGING_FORMAT").or_else(|| read_env("RFPDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(mail_transport) = overrides.mail_transport {
            self.mail.transport = mail_transport;
        }
        if let Some(mail_gateway_url) = overrides.mail_gateway_url {
            self.mail.gateway_url = Some(mail_gateway_url);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_mail(&self.mail)?;
        validate_server(&self.server)?;
        validate_rfp(&self.rfp)?;
        validate_scoring(&self.scoring)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// First existing config file, honoring an explicit path when one is given.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Rules => {}
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider (e.g. http://localhost:11434)"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if mail.timeout_secs == 0 || mail.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "mail.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if mail.transport == MailTransport::Gateway {
        let Some(gateway_url) = mail.gateway_url.as_deref() else {
            return Err(ConfigError::Validation(
                "mail.gateway_url is required when mail.transport = \"gateway\"".to_string(),
            ));
        };
        if !is_http_url(gateway_url) {
            return Err(ConfigError::Validation(
                "mail.gateway_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_rfp(rfp: &RfpConfig) -> Result<(), ConfigError> {
    if rfp.required_fields.iter().any(|field| field.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "rfp.required_fields must not contain blank field names".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    if let Some(duplicate) = rfp.required_fields.iter().find(|field| !seen.insert(field.as_str())) {
        return Err(ConfigError::Validation(format!(
            "rfp.required_fields lists `{duplicate}` more than once"
        )));
    }

    if rfp.default_top_n == 0 {
        return Err(ConfigError::Validation(
            "rfp.default_top_n must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_scoring(scoring: &ScoringConfig) -> Result<(), ConfigError> {
    if scoring.verification_weight + scoring.rating_weight + scoring.delivery_weight == 0 {
        return Err(ConfigError::Validation(
            "scoring weights must not all be zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    mail: Option<MailPatch>,
    server: Option<ServerPatch>,
    rfp: Option<RfpPatch>,
    scoring: Option<ScoringPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    transport: Option<MailTransport>,
    gateway_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RfpPatch {
    required_fields: Option<Vec<String>>,
    default_top_n: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ScoringPatch {
    verification_weight: Option<u32>,
    rating_weight: Option<u32>,
    delivery_weight: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat,
        MailTransport,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Rules, "rules provider is the default")?;
        ensure(config.mail.transport == MailTransport::Loopback, "loopback mail is the default")?;
        ensure(
            config.rfp.required_fields == ["item", "budget", "deadline"],
            "default required fields",
        )?;
        ensure(config.rfp.default_top_n == 2, "dashboard shows two vendors by default")?;
        ensure(config.scoring.rating_weight == 25, "default rating weight")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RFPDESK_MAIL_TOKEN", "mail-token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rfpdesk.toml");
            fs::write(
                &path,
                r#"
[mail]
transport = "gateway"
gateway_url = "https://mail.internal.test"
api_token = "${TEST_RFPDESK_MAIL_TOKEN}"

[rfp]
required_fields = ["item", "quantity", "deadline"]
default_top_n = 3
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.mail.api_token.as_ref().map(|token| token.expose_secret().to_string())
                    == Some("mail-token-from-env".to_string()),
                "mail token should be interpolated from environment",
            )?;
            ensure(config.mail.transport == MailTransport::Gateway, "gateway transport from file")?;
            ensure(
                config.rfp.required_fields == ["item", "quantity", "deadline"],
                "required fields from file",
            )?;
            ensure(config.rfp.default_top_n == 3, "top n from file")
        })();

        clear_vars(&["TEST_RFPDESK_MAIL_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPDESK_LOG_LEVEL", "warn");
        env::set_var("RFPDESK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["RFPDESK_LOG_LEVEL", "RFPDESK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPDESK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("RFPDESK_RFP_REQUIRED_FIELDS", "item, budget");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rfpdesk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[rfp]
required_fields = ["item"]

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.rfp.required_fields == ["item", "budget"],
                "env required fields should win over file",
            )
        })();

        clear_vars(&["RFPDESK_DATABASE_URL", "RFPDESK_RFP_REQUIRED_FIELDS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPDESK_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["RFPDESK_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn gateway_transport_requires_url() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPDESK_MAIL_TRANSPORT", "gateway");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("gateway without url must not validate".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("mail.gateway_url")),
                "validation failure should mention mail.gateway_url",
            )
        })();

        clear_vars(&["RFPDESK_MAIL_TRANSPORT"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPDESK_RFP_DEFAULT_TOP_N", "many");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "RFPDESK_RFP_DEFAULT_TOP_N", "error should name the env key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("non-numeric top n must fail".to_string()),
        };

        clear_vars(&["RFPDESK_RFP_DEFAULT_TOP_N"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFPDESK_LLM_PROVIDER", "openai");
        env::set_var("RFPDESK_LLM_API_KEY", "sk-secret-value");
        env::set_var("RFPDESK_MAIL_API_TOKEN", "mail-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("mail-secret-value"),
                "debug output should not contain mail token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["RFPDESK_LLM_PROVIDER", "RFPDESK_LLM_API_KEY", "RFPDESK_MAIL_API_TOKEN"]);
        result
    }
}
