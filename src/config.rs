//! Environment-driven settings, read once at startup.

use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use crate::error::{AppErr, AppResult};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://whiteboard.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    /// Per-room broadcast buffer. Receivers falling further behind lose events.
    pub channel_capacity: usize,
    pub body_limit: usize,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't touch the process env.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let channel_capacity = parse_or(&lookup, "ROOM_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY)?;
        if channel_capacity == 0 {
            return Err(AppErr::Config("ROOM_CHANNEL_CAPACITY must be positive".into()));
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            bind_addr: parse_or(&lookup, "BIND_ADDR", parse_default(DEFAULT_BIND_ADDR)?)?,
            static_dir: lookup("STATIC_DIR").unwrap_or_else(|| "static".into()).into(),
            channel_capacity,
            body_limit: parse_or(&lookup, "BODY_LIMIT", DEFAULT_BODY_LIMIT)?,
        })
    }
}

fn parse_default<T: FromStr>(raw: &str) -> AppResult<T> {
    raw.parse()
        .map_err(|_| AppErr::Config(format!("invalid built-in default {raw:?}")))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppErr::Config(format!("{key}: cannot parse {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.bind_addr.port(), 5000);
        assert_eq!(cfg.static_dir, PathBuf::from("static"));
        assert_eq!(cfg.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(cfg.body_limit, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("ROOM_CHANNEL_CAPACITY", "16"),
        ]))
        .unwrap();
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.channel_capacity, 16);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = Config::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).unwrap_err();
        assert!(matches!(err, AppErr::Config(msg) if msg.contains("BIND_ADDR")));

        let err = Config::from_lookup(lookup(&[("ROOM_CHANNEL_CAPACITY", "0")])).unwrap_err();
        assert!(matches!(err, AppErr::Config(_)));
    }
}
