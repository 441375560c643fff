// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "audio-policy")]
#[command(about = "Audio policy classification engine")]
#[command(version)]
struct Cli {
    /// Rule set file (default: ~/.config/audio-policy/rules.json)
    #[arg(short, long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the rule set and report rejected rules
    Check,

    /// Classify the sinks, sources, cards and streams of the running server
    Classify {
        /// Read a saved pw-dump file instead of running pw-dump
        #[arg(short, long)]
        dump: Option<PathBuf>,

        /// Classify cards as after a profile availability change
        #[arg(long)]
        reclassify: bool,

        /// Load the helper modules of the active sink and source types through pactl
        #[arg(long)]
        load_modules: bool,

        /// Print the pactl commands instead of running them
        #[arg(long, requires = "load_modules")]
        dry_run: bool,
    },

    /// Resolve the policy group of a described stream
    Group {
        /// Application id of the stream's client
        #[arg(long)]
        app_id: Option<String>,

        /// Client name; without it the stream is treated as client-less
        #[arg(long)]
        client: Option<String>,

        /// Client user id
        #[arg(long)]
        uid: Option<u32>,

        /// Client binary
        #[arg(long)]
        exe: Option<String>,

        /// Stream property as key=value (repeatable)
        #[arg(short, long = "prop", value_name = "KEY=VALUE")]
        props: Vec<String>,

        /// Sink the route currently points at
        #[arg(long)]
        route: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=audio_policy=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let rules = cli
        .rules
        .unwrap_or_else(audio_policy::config::default_rules_path);

    match cli.command {
        Commands::Check => cli::check(&rules),
        Commands::Classify {
            dump,
            reclassify,
            load_modules,
            dry_run,
        } => cli::classify(
            &rules,
            dump.as_deref(),
            cli::ClassifyOptions {
                reclassify,
                load_modules,
                dry_run,
            },
        ),
        Commands::Group {
            app_id,
            client,
            uid,
            exe,
            props,
            route,
        } => cli::group(
            &rules,
            cli::StreamDescription {
                app_id,
                client,
                uid,
                exe,
                props,
                route,
            },
        ),
    }
}
