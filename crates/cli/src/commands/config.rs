use std::env;
use std::fs;
use std::path::Path;

use rfpdesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };
    CommandResult::success("config", render(&config))
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("llm.provider", config.llm.provider.as_str().to_string()),
        ("llm.model", config.llm.model.clone()),
        ("llm.base_url", config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        ("llm.api_key", redact_secret(config.llm.api_key.as_ref())),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string()),
        ("llm.max_retries", config.llm.max_retries.to_string()),
        ("mail.transport", config.mail.transport.as_str().to_string()),
        ("mail.gateway_url", config.mail.gateway_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        ("mail.api_token", redact_secret(config.mail.api_token.as_ref())),
        ("mail.timeout_secs", config.mail.timeout_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("rfp.required_fields", config.rfp.required_fields.join(",")),
        ("rfp.default_top_n", config.rfp.default_top_n.to_string()),
        ("scoring.verification_weight", config.scoring.verification_weight.to_string()),
        ("scoring.rating_weight", config.scoring.rating_weight.to_string()),
        ("scoring.delivery_weight", config.scoring.delivery_weight.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_lowercase()),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.into_iter().map(|(key, value)| {
        let source = field_source(
            key,
            &env_key(key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        render_line(key, &value, source)
    }));
    lines.join("\n")
}

/// `llm.api_key` reads from `RFPDESK_LLM_API_KEY`.
fn env_key(key_path: &str) -> String {
    format!("RFPDESK_{}", key_path.replace('.', "_").to_uppercase())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, env_key, redact_secret};

    #[test]
    fn secrets_keep_only_their_prefix() {
        let key = SecretString::from("sk-live-123456".to_string());
        assert_eq!(redact_secret(Some(&key)), "sk-***");
        let token = SecretString::from("opaque".to_string());
        assert_eq!(redact_secret(Some(&token)), "<redacted>");
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn env_keys_and_file_paths_follow_key_path() {
        assert_eq!(env_key("server.graceful_shutdown_secs"), "RFPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS");
        let doc = "[mail]\ngateway_url = \"https://mail.internal\"\n".parse::<toml::Value>().expect("toml");
        assert!(contains_path(&doc, "mail.gateway_url"));
        assert!(!contains_path(&doc, "mail.api_token"));
    }
}
