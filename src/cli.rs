//! `auragrowth` command line host.
//!
//! - `auragrowth run <objective> <audience>` runs the agent swarm once
//! - `auragrowth presets list|save|delete` manages stored swarm presets
//! - `auragrowth models` prints the resolved model routing

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use crate::campaign::{AspectRatio, ReferenceAsset, VideoBrief, VideoDuration};
use crate::commands::{self, ExportOutcomeInput, RunCampaignInput};
use crate::db::presets::SavePresetInput;
use crate::error::AuraError;
use crate::runtime_config::SetRuntimeFlagsInput;
use crate::AppState;

/// AuraGrowth - multi-agent marketing campaign generator
#[derive(Debug, Parser)]
#[command(name = "auragrowth")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AURA_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Directory holding the local store and exports
    #[arg(long, global = true, env = "AURA_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent swarm for one campaign
    #[command(name = "run")]
    Run(RunArgs),

    /// Manage stored swarm presets
    #[command(name = "presets")]
    Presets {
        #[command(subcommand)]
        command: PresetCommand,
    },

    /// Show model routing
    #[command(name = "models")]
    Models,
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Campaign objective
    objective: String,

    /// Target audience
    audience: String,

    /// Use the low-latency outcome model
    #[arg(long)]
    fast: bool,

    /// Also compile a campaign video of this length (8, 15, 30 or 60)
    #[arg(long, value_name = "SECONDS")]
    video_seconds: Option<u32>,

    /// Aspect ratio for the campaign video (16:9 or 9:16)
    #[arg(long, default_value = "16:9")]
    aspect: String,

    /// Reference image to ground the visuals on
    #[arg(long, value_name = "FILE")]
    reference: Option<PathBuf>,

    /// Run with the roster stored in this preset
    #[arg(long, value_name = "ID")]
    preset: Option<String>,

    /// Export the outcome into this directory
    #[arg(long, value_name = "DIR")]
    export: Option<PathBuf>,

    /// Skip the narration pauses between stages
    #[arg(long)]
    no_narration: bool,
}

#[derive(Debug, Subcommand)]
enum PresetCommand {
    /// List stored presets, newest first
    List,
    /// Store the default roster under a name
    Save { name: String },
    /// Delete a preset
    Delete { id: String },
}

pub async fn run() -> ExitCode {
    if let Ok(cwd) = std::env::current_dir() {
        crate::load_env_files(&cwd);
    }
    let cli = Cli::parse();
    crate::init_tracing(&cli.log_level);

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!(error = %failure, "command failed");
            eprintln!("error: {failure}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), AuraError> {
    let state = Arc::new(crate::initialize_state(cli.data_dir).await?);

    match cli.command {
        Command::Run(args) => run_campaign(state, args).await,
        Command::Presets { command } => match command {
            PresetCommand::List => print_json(&commands::list_swarm_presets(&state).await?),
            PresetCommand::Save { name } => print_json(
                &commands::save_swarm_preset(
                    &state,
                    SavePresetInput {
                        name,
                        agents: state.session.roster(),
                    },
                )
                .await?,
            ),
            PresetCommand::Delete { id } => {
                commands::delete_swarm_preset(&state, &id).await?;
                info!(preset_id = id.as_str(), "swarm preset deleted");
                Ok(())
            }
        },
        Command::Models => print_json(&commands::get_model_registry(&state)),
    }
}

async fn run_campaign(state: Arc<AppState>, args: RunArgs) -> Result<(), AuraError> {
    if args.no_narration {
        commands::set_runtime_flags(
            &state,
            SetRuntimeFlagsInput {
                narration_enabled: Some(false),
                ..SetRuntimeFlagsInput::default()
            },
        );
    }
    if let Some(preset_id) = args.preset.as_deref() {
        commands::load_swarm_preset(&state, preset_id).await?;
    }

    let video = args
        .video_seconds
        .map(|seconds| -> Result<VideoBrief, AuraError> {
            Ok(VideoBrief {
                duration: VideoDuration::new(seconds)?,
                aspect_ratio: AspectRatio::parse(&args.aspect)?,
            })
        })
        .transpose()?;
    let reference_asset = match args.reference.as_deref() {
        Some(path) => Some(read_reference(path).await?),
        None => None,
    };

    let interrupt = {
        let state = state.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && commands::cancel_campaign(&state) {
                info!("cancellation requested");
            }
        })
    };

    let result = commands::run_campaign(
        &state,
        RunCampaignInput {
            objective: args.objective,
            target_audience: args.audience,
            agent_roster: None,
            reference_asset,
            fast_mode: args.fast.then_some(true),
            video,
        },
    )
    .await;
    interrupt.abort();
    let outcome = result?;

    if let Some(directory) = args.export {
        let report = commands::export_outcome(
            &state,
            ExportOutcomeInput {
                outcome_id: outcome.id.clone(),
                directory: Some(directory),
            },
        )
        .await?;
        print_json(&report)?;
    }
    print_json(&outcome)
}

async fn read_reference(path: &Path) -> Result<ReferenceAsset, AuraError> {
    let bytes = tokio::fs::read(path).await?;
    let asset = ReferenceAsset::from_bytes(mime_for(path)?, &bytes);
    asset.validate()?;
    Ok(asset)
}

fn mime_for(path: &Path) -> Result<&'static str, AuraError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "webp" => Ok("image/webp"),
        "gif" => Ok("image/gif"),
        _ => Err(AuraError::invalid(format!(
            "reference '{}' must be a png, jpeg, webp or gif image",
            path.display()
        ))),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AuraError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_arguments() {
        let cli = Cli::try_parse_from([
            "auragrowth",
            "run",
            "Launch a SaaS product",
            "tech founders",
            "--fast",
            "--video-seconds",
            "15",
            "--aspect",
            "9:16",
        ])
        .expect("arguments should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert!(args.fast);
        assert_eq!(args.video_seconds, Some(15));
        assert_eq!(args.aspect, "9:16");
        assert!(!args.no_narration);
    }

    #[test]
    fn reference_mime_follows_extension() {
        assert_eq!(mime_for(Path::new("hero.JPG")).expect("jpeg"), "image/jpeg");
        assert!(mime_for(Path::new("notes.txt")).is_err());
    }
}
