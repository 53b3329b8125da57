use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Feedline binary.
#[derive(Debug, Parser)]
#[command(name = "feedline", version, about = "Feedline social feed server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FEEDLINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Feedline HTTP API.
    Serve(Box<ServeArgs>),
    /// Page through a feed of a running server with the caching client.
    Feed(FeedArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL. Without one, data lives in memory.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the default feed page size.
    #[arg(long = "feed-page-size", value_name = "COUNT")]
    pub feed_page_size: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    /// Base URL of the Feedline server.
    #[arg(long, env = "FEEDLINE_SITE_URL", value_name = "URL")]
    pub site: String,

    /// Session token sent as a bearer token.
    #[arg(long, env = "FEEDLINE_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Feed identity: `global`, `liked-by:<uuid>` or `authored-by:<uuid>`.
    #[arg(long, default_value = "global", value_name = "FEED")]
    pub feed: String,

    /// Number of pages to load.
    #[arg(long, default_value_t = 1, value_name = "COUNT")]
    pub pages: u32,

    /// Override the client page size.
    #[arg(long = "page-size", value_name = "COUNT")]
    pub page_size: Option<u32>,
}
