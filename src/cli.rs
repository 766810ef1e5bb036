use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{default_settings_path, Settings, SettingsFile};
use crate::error::Result;
use crate::i18n::Locale;

#[derive(Parser, Debug)]
#[command(name = "ip-tracker")]
#[command(version = "0.1.0")]
#[command(about = "IPv4 geolocation lookup with a local history", long_about = None)]
pub struct Args {
    /// Settings file (defaults to ~/.ip_tracker/settings.toml)
    #[arg(short = 'c', long, env = "IPTRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// History database path
    #[arg(short = 'd', long, env = "IPTRACKER_DATABASE")]
    pub database: Option<PathBuf>,

    /// Geolocation provider base URL; the IP is appended as a path segment
    #[arg(long, env = "IPTRACKER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Per-lookup timeout in seconds
    #[arg(short = 't', long, env = "IPTRACKER_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Result poll interval in milliseconds
    #[arg(long, env = "IPTRACKER_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Status message language (en, fa, zh)
    #[arg(short = 'l', long, env = "IPTRACKER_LANGUAGE")]
    pub language: Option<Locale>,

    /// Log file path
    #[arg(long, env = "IPTRACKER_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Lookup runtime worker threads
    #[arg(long, env = "IPTRACKER_WORKER_THREADS")]
    pub worker_threads: Option<usize>,

    /// Verbose output
    #[arg(short = 'v', long, env = "IPTRACKER_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Look up one IPv4 address and record it on success
    Lookup { ip: String },

    /// Show stored lookups, newest first
    History {
        /// Only show the most recent N records
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Delete every stored lookup
    Clear,

    /// Write the history to a CSV file (defaults to ~/ip_history.csv)
    Export { path: Option<PathBuf> },

    /// Show settings, or change them with --set KEY=VALUE
    Settings {
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Read addresses and commands from stdin (the default)
    Interactive,
}

impl Args {
    pub fn settings_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_settings_path)
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Interactive)
    }

    pub fn load_settings_file(&self) -> Result<SettingsFile> {
        SettingsFile::load(&self.settings_path())
    }

    /// Effective settings: `file` values overridden by flags and environment
    /// variables. The result is for this run only and must not be saved.
    pub fn merge_with_config(&self, file: &Settings) -> Settings {
        let mut settings = file.clone();

        if let Some(database) = &self.database {
            settings.database = Some(database.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            settings.endpoint = endpoint.clone();
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
        if let Some(poll_interval) = self.poll_interval {
            settings.poll_interval_ms = poll_interval;
        }
        if let Some(language) = self.language {
            settings.language = language;
        }
        if let Some(log_file) = &self.log_file {
            settings.log_file = Some(log_file.clone());
        }
        if let Some(workers) = self.worker_threads {
            settings.worker_threads = Some(workers);
        }

        settings.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_default_command_is_interactive() {
        let args = Args::try_parse_from(["ip-tracker"]).unwrap();
        assert_eq!(args.command(), Command::Interactive);
        assert!(!args.verbose);
    }

    #[test]
    fn test_subcommands() {
        let args = Args::try_parse_from(["ip-tracker", "lookup", "8.8.8.8"]).unwrap();
        assert_eq!(args.command(), Command::Lookup { ip: "8.8.8.8".into() });

        let args = Args::try_parse_from(["ip-tracker", "history", "-n", "3"]).unwrap();
        assert_eq!(args.command(), Command::History { limit: Some(3) });

        let args = Args::try_parse_from([
            "ip-tracker", "settings", "--set", "language=fa", "--set", "auto_refresh=true",
        ])
        .unwrap();
        assert_eq!(
            args.command(),
            Command::Settings {
                set: vec!["language=fa".into(), "auto_refresh=true".into()]
            }
        );

        assert!(Args::try_parse_from(["ip-tracker", "--language", "xx"]).is_err());
    }

    #[test]
    fn test_flags_override_settings_file() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("settings.toml");
        std::fs::write(
            &config,
            "language = \"Chinese\"\ntimeout_secs = 9\nendpoint = \"http://file.example/json\"\n",
        )
        .unwrap();

        let config_arg = config.to_str().unwrap();
        let args = Args::try_parse_from([
            "ip-tracker", "--config", config_arg, "--timeout", "3", "-l", "fa", "export",
        ])
        .unwrap();
        let file = args.load_settings_file().unwrap();
        let settings = args.merge_with_config(file.settings());

        assert_eq!(file.settings().language, Locale::Chinese);
        assert_eq!(settings.language, Locale::Persian);
        assert_eq!(settings.request_timeout(), Duration::from_secs(3));
        assert_eq!(settings.endpoint, "http://file.example/json");
        assert_eq!(args.command(), Command::Export { path: None });
    }
}
