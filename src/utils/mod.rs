//! Utilities module for logging, metrics, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Per-pass loss/accuracy accumulators and a confusion matrix
//! - Scalar metric sinks (in-memory, JSON lines)
//! - SVG training curves
//! - Error handling types

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod scalars;

// Re-export main types for convenience
pub use error::{CatDogError, Result};
pub use logging::init_logging;
pub use metrics::{ConfusionMatrix, PassTotals};
pub use scalars::{JsonlSink, MemorySink, ScalarSink, Tee};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Format a count with thousands separators
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1600), "1,600");
        assert_eq!(format_number(25000), "25,000");
        assert_eq!(format_number(64), "64");
    }
}
