use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use registrar_core::config::{AppConfig, LoadOptions, LogFormat};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["REGISTRAR_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["REGISTRAR_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["REGISTRAR_DATABASE_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "workflow.default_leave_allowance",
        &config.workflow.default_leave_allowance.to_string(),
        source(
            "workflow.default_leave_allowance",
            &["REGISTRAR_WORKFLOW_DEFAULT_LEAVE_ALLOWANCE"],
        ),
    ));
    lines.push(render_line(
        "workflow.administrative_unit",
        &config.workflow.administrative_unit,
        source("workflow.administrative_unit", &["REGISTRAR_WORKFLOW_ADMINISTRATIVE_UNIT"]),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["REGISTRAR_LOGGING_LEVEL", "REGISTRAR_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        log_format_label(config.logging.format),
        source("logging.format", &["REGISTRAR_LOGGING_FORMAT", "REGISTRAR_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn log_format_label(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    }
}

fn detect_config_path() -> Option<PathBuf> {
    ["registrar.toml", "config/registrar.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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
