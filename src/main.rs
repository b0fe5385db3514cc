//! Diffusion Studio CLI
//!
//! Command-line interface for the Diffusion Studio compositing core.

use anyhow::Context;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use diffusion_studio::cli::commands;
use diffusion_studio::cli::{Cli, Commands, ProfileAction};
use diffusion_studio::StudioConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Diffusion Studio v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Some(cmd) => handle_command(&config, cmd),
        None => {
            println!("Diffusion Studio v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(config: &StudioConfig, cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Render {
            scene,
            output,
            format,
        } => commands::render(config, &scene, &output, format.as_deref())
            .with_context(|| format!("rendering {}", scene.display())),
        Commands::Inspect { scene } => commands::inspect(config, &scene)
            .with_context(|| format!("inspecting {}", scene.display())),
        Commands::Profile { action } => match action {
            ProfileAction::Show => commands::show_profile(config).context("reading profile"),
            ProfileAction::Set {
                imagination,
                styles,
                avoid,
                auto_apply,
            } => commands::set_profile(config, imagination, styles, avoid, auto_apply)
                .context("saving profile"),
        },
        Commands::Generate {
            prompt,
            output,
            mock,
            aspect,
            negative,
        } => commands::generate(
            config,
            &prompt,
            &output,
            mock,
            aspect.as_deref(),
            negative.as_deref(),
        )
        .context("generating image"),
        Commands::Repair {
            input,
            output,
            two_pass,
            mock,
        } => commands::repair(config, &input, &output, two_pass, mock)
            .with_context(|| format!("repairing {}", input.display())),
    }
}
