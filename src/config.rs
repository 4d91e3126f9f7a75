use std::env;
use std::time::Duration;

/// Runtime configuration for the server binary, read from environment
/// variables. Every knob has a sensible default so `taskmill` starts with no
/// configuration at all.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the admin API (`TASKMILL_ADDR`).
    pub bind_addr: String,
    /// SQLite database path (`TASKMILL_DB`).
    pub db_path: String,
    /// Worker pool size (`TASKMILL_WORKERS`).
    pub num_workers: usize,
    /// Queue poll interval (`TASKMILL_POLL_MS`, milliseconds).
    pub poll_interval: Duration,
    /// Schedule activator tick interval (`TASKMILL_TICK_SECS`, seconds).
    pub tick_interval: Duration,
    /// Whether to expose the debug stats route (`TASKMILL_DEBUG`).
    pub debug: bool,
}

impl Config {
    /// Reads the configuration from the environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("TASKMILL_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into()),
            db_path: env::var("TASKMILL_DB").unwrap_or_else(|_| "taskmill.db".into()),
            num_workers: parsed_var("TASKMILL_WORKERS", 8),
            poll_interval: Duration::from_millis(parsed_var("TASKMILL_POLL_MS", 250)),
            tick_interval: Duration::from_secs(parsed_var("TASKMILL_TICK_SECS", 10)),
            debug: env::var("TASKMILL_DEBUG").is_ok_and(|v| v != "0" && !v.is_empty()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            db_path: "taskmill.db".into(),
            num_workers: 8,
            poll_interval: Duration::from_millis(250),
            tick_interval: Duration::from_secs(10),
            debug: false,
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.tick_interval, Duration::from_secs(10));
        assert!(!config.debug);
    }
}
