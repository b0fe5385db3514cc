//! CLI Module
//!
//! Command-line interface for the Diffusion Studio compositing core.

pub mod commands;
pub mod scene;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Diffusion Studio - layered image compositing with AI layer actions
#[derive(Parser, Debug)]
#[command(name = "studio-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON config file (defaults plus STUDIO_* environment otherwise)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Composite a JSON scene and export it
    #[command(name = "render")]
    Render {
        /// Scene file
        scene: PathBuf,

        /// Output image
        #[arg(short, long)]
        output: PathBuf,

        /// png, jpeg, bmp, gif or raw (guessed from the output otherwise)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Print the layer table of a JSON scene
    #[command(name = "inspect")]
    Inspect {
        /// Scene file
        scene: PathBuf,
    },

    /// Show or edit the training profile
    #[command(name = "profile")]
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Generate an image from a prompt
    #[command(name = "generate")]
    Generate {
        /// Prompt text
        prompt: String,

        /// Output image
        #[arg(short, long)]
        output: PathBuf,

        /// Use the deterministic mock generator
        #[arg(long)]
        mock: bool,

        /// Aspect ratio (1:1, 16:9, 9:16, 4:3, 3:4)
        #[arg(short, long)]
        aspect: Option<String>,

        /// Negative prompt
        #[arg(short, long)]
        negative: Option<String>,
    },

    /// Run smart repair on an image
    #[command(name = "repair")]
    Repair {
        /// Input image
        input: PathBuf,

        /// Output image
        #[arg(short, long)]
        output: PathBuf,

        /// Analyze and repair a second time at lower strength
        #[arg(long)]
        two_pass: bool,

        /// Use the deterministic mock collaborators
        #[arg(long)]
        mock: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Print the saved profile
    Show,

    /// Update fields of the saved profile
    Set {
        /// Creative philosophy
        #[arg(long)]
        imagination: Option<String>,

        /// Preferred style keywords
        #[arg(long)]
        styles: Option<String>,

        /// Elements to avoid
        #[arg(long)]
        avoid: Option<String>,

        /// Inject the profile into every request
        #[arg(long)]
        auto_apply: Option<bool>,
    },
}
