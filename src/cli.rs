use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser, Serialize)]
#[command(about = "Keeps a Redis mirror of the per-country fabtcg.com leaderboards")]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, default_value = "resources/config.yml")]
    #[serde(skip)]
    pub config: PathBuf,
    /// Overrides the configured trace level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_level: Option<String>,
}
