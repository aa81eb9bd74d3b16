mod batch;
mod cli;
mod csv_export;
mod error;
mod extractor;
mod fmt;
mod job;
mod model_client;
mod models;
mod pipeline;
mod settings;
mod sink;
mod workbook;

use clap::Parser;

use cli::{Cli, Commands, ConfigCommands, RosterCommands};

fn main() {
    // Default to info; RUST_LOG overrides.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            inputs,
            out,
            template,
            open,
            api_key,
        } => cli::run::run(&inputs, &out, template, open, api_key.as_deref()),
        Commands::Batch {
            dir,
            workers,
            out,
            api_key,
        } => cli::batch::run(&dir, workers, out, api_key.as_deref()),
        Commands::Excel {
            text_dir,
            template,
            output,
        } => cli::excel::run(&text_dir, &template, &output),
        Commands::Roster { command } => match command {
            RosterCommands::List => cli::roster::list(),
            RosterCommands::Add { name } => cli::roster::add(&name),
            RosterCommands::Remove { name } => cli::roster::remove(&name),
            RosterCommands::Initials { code, name } => cli::roster::initials(&code, &name),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => cli::config::show(),
            ConfigCommands::SetKey { key } => cli::config::set_key(key.as_deref()),
            ConfigCommands::SetModel { model } => cli::config::set_model(&model),
            ConfigCommands::SetProvider { provider } => cli::config::set_provider(provider),
            ConfigCommands::SetTemplate { path } => cli::config::set_template(&path),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
