//! framekit demo viewer
//!
//! Renders a spinning cube through the frame loop. Resize or minimize the
//! window to exercise swapchain recreation.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p framekit-viewer -- [OPTIONS]
//! ```
//!
//! ## Controls
//!
//! - `W` / `S`: move forward / back
//! - `A` / `D`: move left / right
//! - `Q` / `E`: move down / up
//! - Arrow keys: look around
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod controller;

use framekit_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(parse_config(&args)?)
}

fn parse_config(args: &[String]) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::new("framekit viewer").with_size(WIDTH, HEIGHT);

    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-vsync" => config = config.with_vsync(false),
            "--validation" => config = config.with_validation(true),
            "--fps" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--fps needs a value"))?;
                config = config.with_target_fps(value.parse()?);
            }
            other => anyhow::bail!("Unknown argument: {other} (see --help)"),
        }
    }

    Ok(config)
}

fn print_help() {
    eprintln!(
        "framekit demo viewer

USAGE:
    cargo run -p framekit-viewer -- [OPTIONS]

OPTIONS:
    --no-vsync              Prefer MAILBOX / IMMEDIATE presentation
    --fps <N>               Limit the frame rate
    --validation            Enable Vulkan validation layers
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_options() {
        let config = parse_config(&args(&["--no-vsync", "--fps", "120"])).unwrap();
        assert!(!config.vsync);
        assert_eq!(config.target_fps, Some(120));
        assert_eq!((config.width, config.height), (WIDTH, HEIGHT));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_config(&args(&["--fps"])).is_err());
        assert!(parse_config(&args(&["--fps", "fast"])).is_err());
        assert!(parse_config(&args(&["--bogus"])).is_err());
    }
}
