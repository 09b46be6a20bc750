use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use backtracie::{classify, resolve_frames, RawFrame};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about = "Resolve raw frame dumps into qualified backtraces", long_about = None)]
struct Cli {
    /// Emit JSON instead of text
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, default_value_t = false, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a JSON array of raw frames into locations (leaf first)
    Resolve {
        /// Frames file, or "-" for stdin
        input: PathBuf,

        /// Print qualified method names instead of labels
        #[arg(long, default_value_t = false)]
        fancy: bool,
    },

    /// Print the naming context chosen for each frame
    Classify {
        /// Frames file, or "-" for stdin
        input: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct ClassifiedFrame {
    name: String,
    naming_context: &'static str,
    owner: Option<String>,
    divider: &'static str,
}

fn read_frames(input: &Path) -> Result<Vec<RawFrame>> {
    let contents = if input == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read frames from stdin")?;
        buffer
    } else {
        fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?
    };

    let frames: Vec<RawFrame> = serde_json::from_str(&contents)
        .with_context(|| format!("invalid frame dump in {}", input.display()))?;
    log::debug!("loaded {} frames from {}", frames.len(), input.display());
    Ok(frames)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn render_resolve(frames: &[RawFrame], fancy: bool, json: bool, pretty: bool) -> Result<String> {
    let backtrace = resolve_frames(frames);
    if json {
        return to_json(&backtrace, pretty);
    }

    let lines: Vec<String> = backtrace
        .iter()
        .map(|location| {
            if fancy {
                location.fancy_to_s()
            } else {
                location.to_s()
            }
        })
        .collect();
    Ok(lines.join("\n"))
}

fn classify_frames(frames: &[RawFrame]) -> Vec<ClassifiedFrame> {
    frames
        .iter()
        .map(|frame| {
            let context = classify(frame);
            ClassifiedFrame {
                name: frame.method_or_unit_name.clone(),
                naming_context: context.tag(),
                owner: context.owner_display(),
                divider: context.divider(),
            }
        })
        .collect()
}

fn render_classify(frames: &[RawFrame], json: bool, pretty: bool) -> Result<String> {
    let classified = classify_frames(frames);
    if json {
        return to_json(&classified, pretty);
    }

    let lines: Vec<String> = classified
        .iter()
        .map(|frame| match &frame.owner {
            Some(owner) => format!(
                "{}\t{}\t{}{}{}",
                frame.naming_context, owner, owner, frame.divider, frame.name
            ),
            None => format!("{}\t-\t{}", frame.naming_context, frame.name),
        })
        .collect();
    Ok(lines.join("\n"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp(None)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let output = match &cli.command {
        Commands::Resolve { input, fancy } => {
            let frames = read_frames(input)?;
            render_resolve(&frames, *fancy, cli.json, cli.pretty)?
        }
        Commands::Classify { input } => {
            let frames = read_frames(input)?;
            render_classify(&frames, cli.json, cli.pretty)?
        }
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
