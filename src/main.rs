//! deskgrab - Full-desktop screenshots for X11 and Wayland sessions
//!
//! Detects the running session, picks a capture backend and writes the
//! result as a PNG.

use anyhow::{bail, Context, Result};
use clap::Parser;
use deskgrab_capture::ScreenGrabber;
use deskgrab_core::{CaptureConfig, DesktopSession, WindowManager};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// deskgrab - Capture the desktop to a PNG file
#[derive(Parser, Debug)]
#[command(name = "deskgrab")]
#[command(version, about, long_about = None)]
struct Args {
    /// Output file
    #[arg(short, long, default_value = "screenshot.png")]
    output: PathBuf,

    /// Capture only the screen with this index
    #[arg(short, long)]
    screen: Option<usize>,

    /// Print the physical and logical desktop geometry and exit
    #[arg(short, long)]
    geometry: bool,

    /// Override the detected window manager (gnome, kde, cosmic, qtile,
    /// wlroots, hyprland, other)
    #[arg(short, long)]
    desktop: Option<WindowManager>,

    /// Use the helper tool (grim) instead of the desktop portal where possible
    #[arg(long)]
    prefer_helper: bool,

    /// Do not warn about the helper tool / portal trade-off
    #[arg(long)]
    suppress_warnings: bool,

    /// Configuration file (default: ~/.config/deskgrab/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    debug!("deskgrab v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(CaptureConfig::default_path);
    let mut config = CaptureConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    if args.prefer_helper {
        config = config.with_prefer_helper_tool(true);
    }
    if args.suppress_warnings {
        config = config.with_suppress_helper_warnings(true);
    }

    let mut session = DesktopSession::detect();
    if let Some(window_manager) = args.desktop {
        session.window_manager = Some(window_manager);
    }

    let grabber = ScreenGrabber::connect(session, config)
        .await
        .context("Failed to connect to the display")?;

    if args.geometry {
        let (outputs, geometry) = grabber.geometry().snapshot().await;
        println!("physical: {}", geometry.physical);
        println!("logical:  {}", geometry.logical);
        for (index, output) in outputs.iter().enumerate() {
            println!(
                "screen {}: {} {} (scale {})",
                index, output.name, output.rect, output.scale
            );
        }
        return Ok(());
    }

    let result = match args.screen {
        Some(index) => grabber.capture_output(index).await,
        None => grabber.capture_desktop().await,
    };

    let Some(image) = result.into_image() else {
        bail!("Capture failed");
    };

    info!(
        "Captured {}x{} (scale {})",
        image.width(),
        image.height(),
        image.scale
    );
    image
        .into_pixels()
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Saved {}", args.output.display());

    Ok(())
}
