//! amp-nn CLI: train, inspect and list WaveNet amp/pedal models.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};

use amp_nn::{
    join_training, spawn_training, AlignedCapture, ModelConfig, ModelMetadata, ModelPreset, Result,
    TrainingConfig, TrainingProgressContext, WaveNetModel,
};

const POLL_INTERVAL: Duration = Duration::from_millis(125);

#[derive(Parser)]
#[command(name = "amp-nn", version, about = "Train WaveNet models of amps and pedals")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from an aligned capture and write a model file
    Train {
        /// Aligned capture JSON
        capture: String,
        /// Model file to write
        #[arg(short, long)]
        output: String,
        #[arg(long, default_value = "standard", conflicts_with = "model_config")]
        preset: ModelPreset,
        /// Model config JSON, used instead of a preset
        #[arg(long)]
        model_config: Option<String>,
        /// Training config JSON; defaults to a single standard stage
        #[arg(long)]
        config: Option<String>,
        /// Model name; defaults to "<make> -- <model>"
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Print a model file's architecture and metadata
    Inspect {
        model: String,
    },
    /// List the built-in architectures
    Presets,
    /// Write editable model and training config templates
    Init {
        #[arg(long, default_value = "standard")]
        preset: ModelPreset,
        #[arg(long, default_value = "model_config.json")]
        model_config: String,
        #[arg(long, default_value = "training_config.json")]
        training_config: String,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Train { capture, output, preset, model_config, config, name, comment } => {
            let model_config = match model_config {
                Some(path) => ModelConfig::load_json(&path),
                None => Ok(preset.config()),
            };
            model_config.and_then(|model_config| train(&capture, &output, model_config, config.as_deref(), name, comment))
        }
        Commands::Inspect { model } => inspect(&model),
        Commands::Presets => {
            presets();
            Ok(())
        }
        Commands::Init { preset, model_config, training_config } => init(preset, &model_config, &training_config),
    };

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn train(
    capture_path: &str,
    output: &str,
    model_config: ModelConfig,
    config_path: Option<&str>,
    name: Option<String>,
    comment: Option<String>,
) -> Result<()> {
    let capture = AlignedCapture::load_json(capture_path)?;
    let config = match config_path {
        Some(path) => TrainingConfig::load_json(path)?,
        None => TrainingConfig::default(),
    };
    let mut metadata: ModelMetadata = capture.metadata();
    if let Some(name) = name {
        metadata.name = name;
    }
    if let Some(comment) = comment {
        metadata.comment = comment;
    }
    info!(
        "capture: {} train samples at {} Hz, test pair {}",
        capture.signal_dry_train.len(),
        capture.sample_rate,
        if capture.test_pair().is_some() { "present" } else { "absent" }
    );

    let context = Arc::new(TrainingProgressContext::new(capture));
    let handle = spawn_training(Arc::clone(&context), model_config, metadata, config)?;

    let mut last_reported = 0;
    while !handle.is_finished() {
        thread::sleep(POLL_INTERVAL);
        let progress = context.snapshot();
        if progress.iters_done != last_reported {
            last_reported = progress.iters_done;
            info!(
                "{}/{} ({:.0}%) train loss {:.5} test loss {:.5}",
                progress.iters_done,
                progress.iters_total,
                progress.fraction() * 100.0,
                progress.loss_train,
                progress.loss_test
            );
        }
    }

    let model = join_training(handle, &context)?;
    model.save_json(output)?;
    info!("wrote {output}");
    Ok(())
}

fn inspect(path: &str) -> Result<()> {
    let model = WaveNetModel::load_json(path)?;
    let metadata = model.metadata();
    println!("architecture:     WaveNet, {} layer groups", model.config().layers.len());
    for (index, group) in model.config().layers.iter().enumerate() {
        println!(
            "  group {index}: {} channels, kernel {}, {} layers, head {}{}",
            group.channels,
            group.kernel_size,
            group.dilations.len(),
            group.head_size,
            if group.gated { ", gated" } else { "" }
        );
    }
    println!("receptive field:  {} samples", model.receptive_field());
    println!("parameters:       {}", model.num_params());
    println!("sample rate:      {} Hz", model.sample_rate());
    println!("name:             {}", metadata.name);
    println!("gear:             {} {}", metadata.gear_make, metadata.gear_model);
    if !metadata.comment.is_empty() {
        println!("comment:          {}", metadata.comment);
    }
    if let Some(date) = metadata.date {
        println!(
            "exported:         {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            date.year, date.month, date.day, date.hour, date.minute, date.second
        );
    }
    if let (Some(mse), Some(rmse), Some(esr)) =
        (metadata.loss_test_mse, metadata.loss_test_rmse, metadata.loss_test_esr)
    {
        println!("test loss:        mse {mse:.6}, rmse {rmse:.6}, esr {esr:.6}");
    }
    Ok(())
}

fn presets() {
    for preset in ModelPreset::ALL {
        let config = preset.config();
        match WaveNetModel::new(config, ModelMetadata::default(), 48_000, 0) {
            Ok(model) => println!(
                "{:<14} {:<30} receptive field {:>5}, {:>6} parameters",
                preset.name(),
                preset.label(),
                model.receptive_field(),
                model.num_params()
            ),
            Err(err) => warn!("{}: {err}", preset.name()),
        }
    }
}

fn init(preset: ModelPreset, model_config: &str, training_config: &str) -> Result<()> {
    preset.config().save_json(model_config)?;
    TrainingConfig::default().save_json(training_config)?;
    info!("wrote {model_config} ({}) and {training_config}", preset.label());
    Ok(())
}
