use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

use crate::api::ApiConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "clauselens", version, about = "Terminal client for AI contract analysis")]
pub struct Config {
    #[arg(
        long = "api-url",
        env = "CLAUSELENS_API_URL",
        value_name = "URL",
        default_value = "http://localhost:8080",
        help = "Base URL of the contract analysis API"
    )]
    pub api_url: String,

    #[arg(
        long = "session-cookie",
        env = "CLAUSELENS_SESSION",
        value_name = "COOKIE",
        hide_env_values = true,
        help = "Cookie header sent with every request, e.g. connect.sid=..."
    )]
    pub session_cookie: Option<String>,

    #[arg(
        long = "timeout-secs",
        env = "CLAUSELENS_TIMEOUT",
        value_name = "SECS",
        default_value_t = 120,
        help = "Give up on a backend request after SECS seconds"
    )]
    pub timeout_secs: u64,

    #[arg(
        long = "log-file",
        env = "CLAUSELENS_LOG_FILE",
        value_name = "FILE",
        help = "Append logs to FILE instead of stderr"
    )]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_url.clone(),
            session_cookie: self.session_cookie.clone(),
            timeout: self.request_timeout(),
        }
    }
}

/// Headless operations. Without one, the interactive dashboard starts.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Detect the contract type of a PDF, then analyze it.
    Analyze {
        #[arg(value_name = "FILE", required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Stop after type detection.
        #[arg(long)]
        detect_only: bool,
    },
    /// List analyzed contracts with aggregate metrics.
    List,
    /// Show the analysis for one contract.
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Delete an analyzed contract.
    Delete {
        #[arg(value_name = "ID")]
        id: String,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Show the signed-in user and premium status.
    Whoami,
    /// Start a premium checkout session.
    Upgrade,
    /// Print the browser URL that starts Google sign-in.
    LoginUrl,
    /// End the current session.
    Logout,
    /// Permanently delete the signed-in account.
    DeleteAccount {
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_interactive_mode() {
        let config = Config::try_parse_from(["clauselens"]).unwrap();
        assert!(config.command.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(config.timeout_secs.max(1)));
    }

    #[test]
    fn parses_analyze_with_multiple_files() {
        let config = Config::try_parse_from([
            "clauselens",
            "--timeout-secs",
            "0",
            "analyze",
            "a.pdf",
            "b.pdf",
        ])
        .unwrap();

        assert_eq!(config.request_timeout(), Duration::from_secs(1));
        match config.command {
            Some(Command::Analyze { files, detect_only }) => {
                assert_eq!(files.len(), 2);
                assert!(!detect_only);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn delete_requires_an_id() {
        assert!(Config::try_parse_from(["clauselens", "delete"]).is_err());
    }
}
