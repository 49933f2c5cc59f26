//! Configuration and CLI argument handling

use clap::Parser;

use crate::state::EngineSettings;

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "countdown-timers")]
#[command(about = "Countdown timers with pause, reset and suspend/resume, served over HTTP")]
#[command(version = "1.0.0")]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Tick resolution of running timers in milliseconds
    #[arg(long, default_value = "10")]
    pub tick_ms: u64,

    /// Starts are ignored for timers with this many milliseconds left or fewer
    #[arg(long, default_value = "10")]
    pub start_threshold_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.tick_ms > 0, "--tick-ms must be greater than 0");
        anyhow::ensure!(
            self.start_threshold_ms > 0,
            "--start-threshold-ms must be greater than 0"
        );
        Ok(())
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            tick_ms: self.tick_ms,
            start_threshold_ms: self.start_threshold_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = Config::try_parse_from(["countdown-timers"]).unwrap();
        assert_eq!(config.port, 20554);
        assert_eq!(config.tick_ms, 10);
        assert_eq!(config.start_threshold_ms, 10);
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.address(), "0.0.0.0:20554");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_tick_is_rejected() {
        let config = Config::try_parse_from(["countdown-timers", "--tick-ms", "0"]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn verbose_switches_to_debug() {
        let config = Config::try_parse_from(["countdown-timers", "-v", "-p", "8080"]).unwrap();
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.port, 8080);
    }
}
