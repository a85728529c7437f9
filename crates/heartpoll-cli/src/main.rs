use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "heartpoll", version, about = "Heartpoll sentiment vote bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot and the rollover scheduler
    Run,
    /// Cast votes through the intake pipeline
    Vote {
        #[command(subcommand)]
        action: commands::vote::VoteAction,
    },
    /// Vote tallies
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Compute rollover announcements
    Rollover {
        #[command(subcommand)]
        action: commands::rollover::RolloverAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heartpoll=info,heartpoll_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run => commands::run::run(),
        Commands::Vote { action } => commands::vote::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Rollover { action } => commands::rollover::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
