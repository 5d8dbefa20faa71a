use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use sse::broker::{BrokerConfig, DEFAULT_BUFFER_SIZE};
use sse::history::DEFAULT_HISTORY_CAPACITY;
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Make event streams accessible from any origin (adds a wildcard CORS header)
    #[arg(long, env, default_value_t = false)]
    pub allow_cors: bool,

    /// Replay channel history to new subscribers even when they send no Last-Event-ID
    #[arg(long, env, default_value_t = false)]
    pub replay_all: bool,

    /// How many events a client may fall behind before it is disconnected
    #[arg(long, env, default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Compress event streams for clients that accept gzip
    #[arg(long, env, default_value_t = false)]
    pub gzip: bool,

    /// Seconds between heartbeat comments on idle streams (0 disables heartbeats)
    #[arg(long, env, default_value_t = 15)]
    pub heartbeat_interval_secs: u64,

    /// Number of published events retained per channel for replay
    #[arg(long, env, default_value_t = DEFAULT_HISTORY_CAPACITY)]
    pub history_capacity: usize,

    /// Upstream base URL to reverse proxy unmatched requests to. Responses carrying
    /// a Grip-Channel header are held open as event streams on that channel.
    #[arg(long, env)]
    proxy_target: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// The broker knobs carried by this configuration.
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            allow_cors: self.allow_cors,
            replay_all: self.replay_all,
            buffer_size: self.buffer_size,
            gzip: self.gzip,
        }
    }

    /// Interval between heartbeat comments, if heartbeats are enabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0).then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }

    pub fn proxy_target(&self) -> Option<&str> {
        self.proxy_target.as_deref()
    }

    pub fn listen_address(&self) -> String {
        format!(
            "{}:{}",
            self.interface.as_deref().unwrap_or("127.0.0.1"),
            self.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("sse_broker").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_the_broker_defaults() {
        let config = parse(&[]);
        let broker = config.broker_config();

        assert_eq!(broker.buffer_size, 128);
        assert!(!broker.allow_cors);
        assert!(!broker.replay_all);
        assert!(!broker.gzip);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(config.heartbeat_interval(), Some(Duration::from_secs(15)));
        assert_eq!(config.proxy_target(), None);
        assert_eq!(config.log_level_filter, LevelFilter::Info);
    }

    #[test]
    fn broker_flags_are_projected() {
        let config = parse(&[
            "--allow-cors",
            "--replay-all",
            "--gzip",
            "--buffer-size",
            "4",
            "--heartbeat-interval-secs",
            "0",
            "--proxy-target",
            "http://127.0.0.1:9000",
        ]);
        let broker = config.broker_config();

        assert!(broker.allow_cors);
        assert!(broker.replay_all);
        assert!(broker.gzip);
        assert_eq!(broker.buffer_size, 4);
        assert_eq!(config.heartbeat_interval(), None);
        assert_eq!(config.proxy_target(), Some("http://127.0.0.1:9000"));
    }

    #[test]
    fn listen_address_joins_interface_and_port() {
        let config = parse(&["--interface", "0.0.0.0", "--port", "8080"]);
        assert_eq!(config.listen_address(), "0.0.0.0:8080");
    }
}
