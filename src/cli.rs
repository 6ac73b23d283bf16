use std::path::PathBuf;

use clap::Parser;

use crate::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "conspire", version, about = "Conspire presence server")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Bind address (default: localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (default: 8080)
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to PID file to create
    #[arg(long = "pid", value_name = "PATH")]
    pub pid_file: Option<PathBuf>,

    /// Statistics endpoint path (default: admin/stats.json)
    #[arg(long = "url-stats", value_name = "PATH")]
    pub stats_path: Option<String>,

    /// Public base URL advertised in logs
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Command-line flags take precedence over the config file.
    pub fn apply(&self, cfg: &mut ServerConfig) {
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(pid_file) = &self.pid_file {
            cfg.pid_file = Some(pid_file.clone());
        }
        if let Some(stats_path) = &self.stats_path {
            cfg.stats_path = stats_path.clone();
        }
        if let Some(base_url) = &self.base_url {
            cfg.canonical_base_url = Some(base_url.clone());
        }
    }
}
