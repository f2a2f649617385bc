//! Logging Module
//!
//! Structured logging with the `tracing` crate: subscriber setup for the
//! binary and an epoch-level progress logger for the training loop.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for this crate's own events
    pub level: Level,
    /// Level for dependencies (burn, image, ...)
    pub dependency_level: Level,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            dependency_level: Level::WARN,
            include_target: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug output from this crate, module paths shown
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            dependency_level: Level::INFO,
            include_target: true,
            ..Self::default()
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            dependency_level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Filter directives equivalent to this config, e.g. `warn,catdog_finetune=info`
    pub fn directives(&self) -> String {
        format!(
            "{},{}={}",
            self.dependency_level.as_str().to_lowercase(),
            env!("CARGO_CRATE_NAME"),
            self.level.as_str().to_lowercase()
        )
    }
}

/// Install the global fmt subscriber
///
/// `RUST_LOG`, when set, replaces the directives from `config`. Fails if a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .map_err(|e| format!("Invalid log filter: {}", e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Epoch-level progress logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    /// Create a new training logger
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Seconds remaining, estimated from the average epoch time so far
    pub fn eta_secs(&self) -> f64 {
        let done = (self.epoch + 1) as f64;
        let remaining = self.total_epochs.saturating_sub(self.epoch + 1) as f64;
        remaining * self.training_start.elapsed().as_secs_f64() / done
    }

    /// Log end of an epoch with metrics
    pub fn end_epoch(&self, train_loss: f64, val_loss: f64, val_accuracy: f64) {
        tracing::info!(
            "Epoch {}/{} completed in {:.1}s | Train loss: {:.4} | Val loss: {:.4} | Val acc: {:.2}% | ETA: {:.0}s",
            self.epoch + 1,
            self.total_epochs,
            self.epoch_start.elapsed().as_secs_f64(),
            train_loss,
            val_loss,
            val_accuracy,
            self.eta_secs()
        );
    }

    /// Log training completion
    pub fn log_complete(&self, best_accuracy: f64) {
        tracing::info!(
            "Training complete! {} epochs in {:.1}s | Best validation accuracy: {:.2}%",
            self.total_epochs,
            self.training_start.elapsed().as_secs_f64(),
            best_accuracy
        );
    }
}
