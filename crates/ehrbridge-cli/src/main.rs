mod app;
mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use ehrbridge_config::{ConfigError, load_config};

use app::App;
use cli::{Cli, Commands};
use output::print_error;

/// Exit status for configuration problems.
const EXIT_CONFIG: i32 = 2;

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        let code = if e.downcast_ref::<ConfigError>().is_some() {
            EXIT_CONFIG
        } else {
            1
        };
        std::process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    // Commands that need neither configuration nor a session.
    match &cli.command {
        Commands::Keygen => return commands::tools::keygen(),
        Commands::Redact(args) => return commands::tools::redact(&args.text),
        _ => {}
    }

    let config = load_config(cli.config.as_deref()).context("Invalid configuration")?;
    observability::init_tracing(&config.logging.level);

    let app = App::build(config, &cli.user).await?;

    match &cli.command {
        Commands::Authorize => commands::session::authorize(&app).await?,
        Commands::Login => commands::session::login(&app).await?,
        Commands::Exchange(args) => commands::session::exchange(&app, args).await?,
        Commands::Status => commands::session::status(&app, format)?,
        Commands::Logout => commands::session::logout(&app).await?,
        Commands::Beaker(args) => {
            commands::clinical::beaker(&app.gateway()?, &args.patient, format).await?;
        }
        Commands::Labs(args) => {
            commands::clinical::labs(&app.gateway()?, &args.patient, format).await?;
        }
        Commands::Genomics(args) => {
            commands::clinical::genomics(&app.gateway()?, &args.patient, format).await?;
        }
        Commands::Get(args) => commands::clinical::get(&app.gateway()?, args, format).await?,
        Commands::Keygen | Commands::Redact(_) => {}
    }

    Ok(())
}
