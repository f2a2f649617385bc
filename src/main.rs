//! Cat/Dog Fine-Tuning CLI
//!
//! Entry point for training, evaluating and running the ResNet-18 cat/dog
//! classifier with the Burn framework.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use catdog_finetune::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use catdog_finetune::config::RunConfig;
use catdog_finetune::dataset::{ImageFolder, Partition};
use catdog_finetune::inference::{PredictionSummary, Predictor};
use catdog_finetune::model::ModelArtifact;
use catdog_finetune::training::{evaluate, pipeline};
use catdog_finetune::utils::charts::write_training_charts;
use catdog_finetune::utils::logging::{init_logging, LogConfig};
use catdog_finetune::utils::scalars::MemorySink;
use catdog_finetune::utils::{format_duration, format_number};

/// Cat/Dog ResNet-18 fine-tuning
///
/// Trains a two-class image classifier on a class-per-directory image
/// collection and writes the weights for a serving component to load.
#[derive(Parser, Debug)]
#[command(name = "catdog")]
#[command(version)]
#[command(about = "Fine-tune a ResNet-18 cat/dog classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune the model, evaluate on the test set and save the artifact
    Train {
        /// TOML run configuration (missing keys take defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Training image root (one subdirectory per class)
        #[arg(long)]
        train_dir: Option<PathBuf>,

        /// Test image root (same class subdirectories)
        #[arg(long)]
        test_dir: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training and evaluation
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// SGD momentum
        #[arg(long)]
        momentum: Option<f64>,

        /// Fraction of the training images used for training (rest validates)
        #[arg(long)]
        train_fraction: Option<f64>,

        /// Shorter-side resize before cropping
        #[arg(long)]
        resize: Option<u32>,

        /// Square center-crop size fed to the network
        #[arg(long)]
        crop: Option<u32>,

        /// Class directory names in label order, comma separated
        #[arg(long, value_delimiter = ',')]
        classes: Option<Vec<String>>,

        /// Keep the partition order fixed between epochs
        #[arg(long, default_value = "false")]
        no_shuffle: bool,

        /// Output directory for the model, metrics and charts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Seed for the split and epoch shuffles
        #[arg(long)]
        seed: Option<u64>,

        /// Decode every image once up front
        #[arg(long, default_value = "false")]
        preload: bool,

        /// Pretrained backbone: torchvision resnet18 .pth/.safetensors or a Burn record
        #[arg(long)]
        pretrained: Option<PathBuf>,
    },

    /// Evaluate a saved model on a labeled image folder
    Evaluate {
        /// Directory holding model.mpk and model.json
        #[arg(short, long, default_value = "output/catdog")]
        model: PathBuf,

        /// Labeled image root (one subdirectory per class)
        #[arg(short, long, default_value = "data/test_set")]
        data_dir: PathBuf,

        /// Batch size for evaluation
        #[arg(short, long, default_value = "64")]
        batch_size: usize,
    },

    /// Run inference on a single image or a directory
    Predict {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Directory holding model.mpk and model.json
        #[arg(short, long, default_value = "output/catdog")]
        model: PathBuf,

        /// Print predictions as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show dataset statistics and the resulting split sizes
    Stats {
        /// Path to the image root
        #[arg(short, long, default_value = "data/training_set")]
        data_dir: PathBuf,

        /// Fraction of images used for training
        #[arg(long, default_value = "0.8")]
        train_fraction: f64,

        /// Split seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Render loss and accuracy charts from a metric log
    Plot {
        /// JSON-lines metric log written by `train`
        #[arg(short, long, default_value = "output/catdog/scalars.jsonl")]
        metrics: PathBuf,

        /// Directory to write the SVG charts to
        #[arg(short, long, default_value = "output/catdog")]
        output_dir: PathBuf,
    },

    /// Write the default run configuration as TOML
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "catdog.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    if let Err(e) = init_logging(&log_config) {
        eprintln!("{} {}", "Warning:".yellow(), e);
    }

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            train_dir,
            test_dir,
            epochs,
            batch_size,
            learning_rate,
            momentum,
            train_fraction,
            resize,
            crop,
            classes,
            no_shuffle,
            output_dir,
            seed,
            preload,
            pretrained,
        } => {
            let mut run_config = match config {
                Some(path) => RunConfig::load(&path)?,
                None => RunConfig::default(),
            };

            if let Some(dir) = train_dir {
                run_config.data.train_dir = dir;
            }
            if let Some(dir) = test_dir {
                run_config.data.test_dir = dir;
            }
            if let Some(epochs) = epochs {
                run_config.train.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                run_config.loader.batch_size = batch_size;
            }
            if let Some(lr) = learning_rate {
                run_config.optimizer.learning_rate = lr;
            }
            if let Some(momentum) = momentum {
                run_config.optimizer.momentum = momentum;
            }
            if let Some(fraction) = train_fraction {
                run_config.data.train_fraction = fraction;
            }
            if let Some(resize) = resize {
                run_config.data.resize = resize;
            }
            if let Some(crop) = crop {
                run_config.data.crop = crop;
            }
            if classes.is_some() {
                run_config.data.classes = classes;
            }
            if no_shuffle {
                run_config.loader.shuffle = false;
            }
            if let Some(dir) = output_dir {
                run_config.train.output_dir = dir;
            }
            if let Some(seed) = seed {
                run_config.loader.seed = seed;
            }
            if preload {
                run_config.loader.preload = true;
            }
            if pretrained.is_some() {
                run_config.train.pretrained = pretrained;
            }

            cmd_train(&run_config)?;
        }

        Commands::Evaluate {
            model,
            data_dir,
            batch_size,
        } => {
            cmd_evaluate(&model, &data_dir, batch_size)?;
        }

        Commands::Predict { input, model, json } => {
            cmd_predict(&input, &model, json)?;
        }

        Commands::Stats {
            data_dir,
            train_fraction,
            seed,
        } => {
            cmd_stats(&data_dir, train_fraction, seed)?;
        }

        Commands::Plot {
            metrics,
            output_dir,
        } => {
            cmd_plot(&metrics, &output_dir)?;
        }

        Commands::InitConfig { output } => {
            RunConfig::default().save(&output)?;
            println!("{} {:?}", "Wrote default configuration to".green(), output);
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ==================================================
   Cat/Dog Classifier
   ResNet-18 fine-tuning with Burn + Rust
 ==================================================
  "#
        .green()
    );
}

fn cmd_train(config: &RunConfig) -> Result<()> {
    config.validate()?;

    println!("{}", "Training configuration:".cyan().bold());
    println!("  Backend:       {}", backend_name());
    println!("  Train dir:     {:?}", config.data.train_dir);
    println!("  Test dir:      {:?}", config.data.test_dir);
    println!("  Epochs:        {}", config.train.epochs);
    println!("  Batch size:    {}", config.loader.batch_size);
    println!(
        "  SGD:           lr {} momentum {}",
        config.optimizer.learning_rate, config.optimizer.momentum
    );
    println!(
        "  Input:         resize {} / crop {}",
        config.data.resize, config.data.crop
    );
    println!("  Output dir:    {:?}", config.train.output_dir);
    println!();

    let device = default_device();
    let start = Instant::now();
    let summary = pipeline::run::<TrainingBackend>(config, &device)?;

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Duration:      {}", format_duration(start.elapsed().as_secs_f64()));
    if let Some(last) = summary.history.last() {
        println!(
            "  Final epoch:   train loss {:.4} | val loss {:.4} | val acc {:.2}%",
            last.train_loss, last.validation_loss, last.validation_accuracy
        );
    }
    println!(
        "  Test:          loss {:.4} | acc {:.2}% ({}/{})",
        summary.test.mean_loss,
        summary.test.accuracy,
        format_number(summary.test.correct),
        format_number(summary.test.samples)
    );
    println!();
    println!("{}", summary.test.confusion.display(Some(summary.classes.as_slice())));
    println!("  Model:         {:?}", summary.artifact_dir);
    for chart in &summary.charts {
        println!("  Chart:         {:?}", chart);
    }

    Ok(())
}

fn cmd_evaluate(model_dir: &Path, data_dir: &Path, batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        bail!("Batch size must be positive");
    }

    let device = default_device();
    let (artifact, model) = ModelArtifact::load::<DefaultBackend>(model_dir, &device)
        .with_context(|| format!("Failed to load model from {:?}", model_dir))?;

    let folder = ImageFolder::open(data_dir, Some(artifact.classes.as_slice()))?;
    let partition = Partition::lazy("evaluate", folder.into_samples(), artifact.preprocessor());

    info!("Evaluating {} images from {:?}", partition.len(), data_dir);
    let outcome = evaluate(&model, &partition, batch_size, &device)?;

    println!("{}", "Evaluation:".cyan().bold());
    println!("  Images:   {}", format_number(outcome.samples));
    println!("  Loss:     {:.4}", outcome.mean_loss);
    println!("  Accuracy: {:.2}%", outcome.accuracy);
    println!();
    println!("{}", outcome.confusion.display(Some(artifact.classes.as_slice())));

    Ok(())
}

fn cmd_predict(input: &Path, model_dir: &Path, json: bool) -> Result<()> {
    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::load(model_dir, &device)
        .with_context(|| format!("Failed to load model from {:?}", model_dir))?;

    let predictions = if input.is_dir() {
        predictor.predict_dir(input)?
    } else {
        vec![predictor.predict_file(input)?]
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&predictions)?);
        return Ok(());
    }

    for prediction in &predictions {
        println!("{}", prediction.display());
    }
    if predictions.len() > 1 {
        println!(
            "{}",
            PredictionSummary::from_predictions(&predictions, predictor.classes())
        );
    }

    Ok(())
}

fn cmd_stats(data_dir: &Path, train_fraction: f64, seed: u64) -> Result<()> {
    if !data_dir.is_dir() {
        bail!("Dataset directory not found: {:?}", data_dir);
    }

    let folder = ImageFolder::open(data_dir, None)?;
    folder.stats().print();

    let split = catdog_finetune::dataset::split_indices(folder.len(), train_fraction, seed)?;
    println!();
    println!("{}", "Split:".cyan());
    println!("  Train:      {}", format_number(split.train.len()));
    println!("  Validation: {}", format_number(split.validation.len()));

    Ok(())
}

fn cmd_plot(metrics: &Path, output_dir: &Path) -> Result<()> {
    let sink = MemorySink::from_jsonl(metrics)?;
    if sink.is_empty() {
        bail!("No metrics found in {:?}", metrics);
    }

    for path in write_training_charts(&sink, output_dir)? {
        println!("{} {:?}", "Wrote".green(), path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_fails_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no_such_set");

        let err = cmd_stats(&missing, 0.8, 42).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn stats_accepts_a_class_folder() {
        let dir = tempfile::tempdir().unwrap();
        for class in ["cats", "dogs"] {
            let class_dir = dir.path().join(class);
            std::fs::create_dir_all(&class_dir).unwrap();
            image::RgbImage::new(8, 8)
                .save(class_dir.join(format!("{class}.0.png")))
                .unwrap();
        }

        cmd_stats(dir.path(), 0.5, 42).unwrap();
    }

    #[test]
    fn cli_parses_stats_arguments() {
        let cli = Cli::try_parse_from(["catdog", "stats", "--train-fraction", "0.29"]).unwrap();
        assert!(matches!(cli.command, Commands::Stats { .. }));
    }
}
