use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ows-gate",
    version,
    about = "Access-controlled gateway for OGC map services"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Listen address (overrides config file setting)
    #[arg(long)]
    pub listen: Option<String>,

    /// Renderer service URL (overrides config file setting)
    #[arg(long)]
    pub renderer: Option<String>,

    /// Directory holding `{owner}/{project}/access.yaml` (overrides config
    /// file setting)
    #[arg(long)]
    pub projects_root: Option<PathBuf>,
}
