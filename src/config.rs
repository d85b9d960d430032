use std::collections::HashMap;

use crate::error::VpcApiError;

/// Where configuration values come from. The Lambda reads the process
/// environment; tests hand in a map.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub table_name: String,
    pub db_region: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, VpcApiError> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source<E: EnvSource>(env: &E) -> Result<Self, VpcApiError> {
        let table_name = required(env, "TABLE_NAME")?;
        let db_region = required(env, "DB_REGION")?;
        let log_level = optional(env, "LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_format = match optional(env, "LOG_FORMAT") {
            Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Ok(Config {
            table_name,
            db_region,
            log_level,
            log_format,
        })
    }
}

fn optional<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required<E: EnvSource>(env: &E, key: &'static str) -> Result<String, VpcApiError> {
    optional(env, key).ok_or(VpcApiError::MissingEnv(key))
}
