use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use retina_dr::{
    config::{Config, ConfigArgs},
    diagnosis::DiagnosisPipeline,
    image::ImagePreprocessor,
    models::ModelManager,
    web::serve,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retina-dr")]
#[command(about = "Diabetic retinopathy severity grading service")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    config: ConfigArgs,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Load the checkpoint and report whether it is usable
    CheckModel,
    /// Grade a single image and print the result as JSON
    Predict {
        /// Fundus photograph to grade
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let config = Config::new(args.config)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!("Starting diabetic retinopathy detection service...");
            tracing::info!("Bind address: {}", config.bind_addr);
            serve(config).await?;
        }
        Command::CheckModel => check_model(&config)?,
        Command::Predict { image } => predict(&config, image).await?,
    }

    Ok(())
}

fn check_model(config: &Config) -> Result<()> {
    println!("{}", "=".repeat(60));
    println!("MODEL LOADING CHECK");
    println!("{}", "=".repeat(60));
    println!("Checkpoint: {}", config.model_path.display());

    let manager = ModelManager::load(config);
    let stats = manager.get_stats();
    println!("Device:     {}", stats.device);

    match manager.load_error() {
        None => {
            println!("Model:      {}", stats.model_name.unwrap_or_default());
            println!("✓ Model ready for inference");
            Ok(())
        }
        Some(reason) => {
            println!("✗ {}", reason);
            bail!("model failed to load from {}", config.model_path.display())
        }
    }
}

async fn predict(config: &Config, image: PathBuf) -> Result<()> {
    let manager = ModelManager::load(config);
    let pipeline = DiagnosisPipeline::new(
        manager.model()?,
        Arc::new(ImagePreprocessor::new(config.preprocess.clone())),
        config.server_config.max_request_size,
    );

    let result = tokio::task::spawn_blocking(move || pipeline.predict_path(&image)).await??;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
