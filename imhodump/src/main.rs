mod verbose;

use std::path::Path;

use clap::{FromArgMatches as _, IntoApp as _, Parser};
use tracing_error::ErrorLayer;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};
use tracing_tree::HierarchicalLayer;
use twelf::Layer;

use imhodump_common::{models::Subject, Conf, Settings};

/// Dumps a user's imhonet ratings to json, html and csv
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    verbose: verbose::Verbosity,

    /// The imhonet user id
    user_id: String,

    /// The category to dump: films, books, games or serials
    subject: Subject,

    /// Only regenerate the html report from an existing json dump
    #[clap(long = "html_only")]
    html_only: bool,
}

fn config_layers(matches: clap::ArgMatches) -> Vec<Layer> {
    let mut layers = Vec::new();

    if Path::new("imhodump.json").exists() {
        layers.push(Layer::Json("imhodump.json".into()));
    }

    if Path::new("imhodump.toml").exists() {
        layers.push(Layer::Toml("imhodump.toml".into()));
    }

    layers.push(Layer::Env(Some("IMHODUMP_".to_string())));
    layers.push(Layer::Clap(matches));

    layers
}

fn main() -> Result<(), imhodump_common::Report> {
    imhodump_common::install()?;

    let matches = Cli::command().args(&Conf::clap_args()).get_matches();
    let cli = Cli::from_arg_matches(&matches)?;
    let conf = Conf::with_layers(&config_layers(matches))?;

    let subscriber = Registry::default()
        .with(ErrorLayer::default())
        .with(HierarchicalLayer::new(2).with_targets(true))
        .with(EnvFilter::from_default_env().add_directive(cli.verbose.log_level_filter().into()));

    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::from_conf(&conf)?;

    if !cli.html_only {
        imhodump_command_scrape::run(&settings, &cli.user_id, cli.subject)?;
    }

    imhodump_command_report::run(&settings, &cli.user_id, cli.subject)?;

    Ok(())
}
