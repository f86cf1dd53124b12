use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value_t = log::LevelFilter::Info)]
    pub logging_level: log::LevelFilter,

    #[arg(long)]
    pub config_file: std::path::PathBuf,

    /// Overrides `server.bind_address` from the config file.
    #[arg(long)]
    pub bind_address: Option<std::net::SocketAddr>,
}
