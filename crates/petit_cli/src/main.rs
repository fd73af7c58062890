//! Petit CLI
//!
//! Play, check, and inspect Le Petit Prince stories without a renderer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use petit_story::{Layout, StoryConfig, StoryScreen};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "petit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Le Petit Prince story player", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the story on a simulated clock, printing captions as they appear
    Play {
        /// Story file (defaults to the built-in story)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Simulated frame length in milliseconds
        #[arg(long, default_value = "16")]
        frame_ms: f32,

        /// Stop after this many milliseconds instead of at the end of the story
        #[arg(long)]
        duration_ms: Option<f32>,

        /// Print the final frame as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a story file and build its timeline
    Check {
        /// Story file (defaults to the built-in story)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print computed layer sizes and positions
    Layout {
        /// Story file (defaults to the built-in story)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Play {
            config,
            frame_ms,
            duration_ms,
            json,
        } => cmd_play(config.as_deref(), frame_ms, duration_ms, json),

        Commands::Check { config } => cmd_check(config.as_deref()),

        Commands::Layout { config, json } => cmd_layout(config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<StoryConfig> {
    match path {
        Some(path) => StoryConfig::load(path)
            .with_context(|| format!("Failed to load story from {}", path.display())),
        None => StoryConfig::builtin().context("Built-in story is invalid"),
    }
}

fn cmd_play(
    config: Option<&Path>,
    frame_ms: f32,
    duration_ms: Option<f32>,
    json: bool,
) -> Result<()> {
    if !(frame_ms.is_finite() && frame_ms > 0.0) {
        anyhow::bail!("--frame-ms must be positive, got {}", frame_ms);
    }
    if let Some(ms) = duration_ms {
        if !(ms.is_finite() && ms >= 0.0) {
            anyhow::bail!("--duration-ms must be non-negative, got {}", ms);
        }
    }

    let config = load_config(config)?;
    let mut screen = StoryScreen::new(config)
        .context("Failed to build story")?
        .with_caption_sink(|index: usize, text: &str| {
            println!("[{:>2}] {}", index + 1, text.replace('\n', " "));
        });

    screen.tap_start().context("Failed to start story")?;

    // Without an explicit duration, run until the last stage has completed
    let limit = duration_ms.unwrap_or_else(|| screen.duration_ms() + frame_ms);
    let mut elapsed = 0.0;
    while elapsed < limit {
        let step = frame_ms.min(limit - elapsed);
        screen.tick_ms(step);
        elapsed += step;
        if duration_ms.is_none() && screen.is_finished() {
            break;
        }
    }

    let scheduler = screen.scheduler();
    info!(
        "Played {:.0}ms in {} frames ({} captions)",
        scheduler.elapsed_ms(),
        scheduler.frame_count(),
        screen.synchronizer().published_count()
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&screen.frame())?);
    } else if screen.is_finished() {
        println!();
        println!("The end. Tap restart to play again.");
    }

    Ok(())
}

fn cmd_check(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let screen = StoryScreen::new(config).context("Story does not build")?;
    let config = screen.config();

    println!("Story OK");
    println!("  Layers:   {}", config.assets.len());
    println!("  Captions: {}", config.messages.len());
    println!("  Length:   {:.1}s", screen.duration_ms() / 1000.0);
    for flicker in &config.timing.flicker {
        println!(
            "  Flicker:  {} every {:.0}ms down to {}, {} iterations",
            flicker.asset, flicker.period_ms, flicker.low, flicker.iterations
        );
    }

    Ok(())
}

fn cmd_layout(config: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config)?;
    let layout = Layout::new(&config).context("Failed to compute layout")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&layout)?);
        return Ok(());
    }

    println!(
        "Window {}x{}, field {:.1}x{:.1}, group offset ({:.1}, {:.1})",
        layout.window.width,
        layout.window.height,
        layout.field.width,
        layout.field.height,
        layout.group_offset.x,
        layout.group_offset.y
    );
    for asset in &layout.assets {
        let at = layout.to_window(asset.initial_position);
        print!(
            "  {:<20} {:>7.1} x {:<7.1} at ({:.1}, {:.1})",
            asset.name, asset.size.width, asset.size.height, at.x, at.y
        );
        if asset.travels() {
            let to = layout.to_window(asset.intended_position);
            print!(" -> ({:.1}, {:.1})", to.x, to.y);
        }
        println!();
    }

    Ok(())
}
