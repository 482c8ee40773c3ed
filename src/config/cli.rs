use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "tourbook")]
#[command(about = "Query tours and reviews from a seed file and keep tour ratings consistent")]
pub struct CliConfig {
    #[arg(long, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "JSON seed file with `tours` and `reviews` arrays")]
    pub seed: Option<PathBuf>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a URL-style query string against a collection
    Query {
        /// `tours` or `reviews`
        collection: String,
        /// e.g. `duration[gte]=5&sort=-price&fields=name,price&page=2&limit=10`
        #[arg(default_value = "")]
        query: String,
    },
    /// Recompute and store the rating statistics of one tour
    Recalculate { tour_id: String },
}
