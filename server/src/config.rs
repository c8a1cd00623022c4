//! Runtime settings for a server instance.

use clap::ValueEnum;
use shared::DEFAULT_TICK_RATE;
use std::time::Duration;

/// Who gets a ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// The first connection auto-joins as a guest; later connections may
    /// only make account and ranking requests.
    Single,
    /// Every connection that logs in gets a ship on its first input.
    #[default]
    Multi,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind, `host:port`. Port 0 picks a free one.
    pub addr: String,
    pub mode: Mode,
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Upper bound on one outbound frame write before the session is dropped.
    pub write_timeout: Duration,
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>, mode: Mode) -> Self {
        Self {
            addr: addr.into(),
            mode,
            ..Self::default()
        }
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            mode: Mode::Multi,
            tick_rate: DEFAULT_TICK_RATE,
            max_clients: 16,
            write_timeout: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.mode, Mode::Multi);
        assert_eq!(config.tick_rate, 120);
        assert_eq!(config.max_clients, 16);
    }

    #[test]
    fn test_tick_duration() {
        let mut config = ServerConfig::new("127.0.0.1:0", Mode::Single);
        assert_eq!(config.tick_duration(), Duration::from_secs_f64(1.0 / 120.0));

        config.tick_rate = 0;
        assert_eq!(config.tick_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_mode_parses_from_cli_text() {
        assert_eq!(Mode::from_str("single", true).unwrap(), Mode::Single);
        assert_eq!(Mode::from_str("multi", true).unwrap(), Mode::Multi);
        assert!(Mode::from_str("co-op", true).is_err());
    }
}
