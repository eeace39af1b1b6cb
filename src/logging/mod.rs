//! Logging and observability
//!
//! Structured `tracing` events throughout the pipeline, plus a few macros for
//! the events every stage emits.

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a pipeline stage
///
/// ```no_run
/// corridor::log_stage_start!("normalize", sources = 10);
/// ```
#[macro_export]
macro_rules! log_stage_start {
    ($stage:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(stage = $stage $(, $key = $value)*, "Stage started");
    };
}

/// Log the completion of a pipeline stage with its duration
///
/// ```no_run
/// let started = std::time::Instant::now();
/// corridor::log_stage_complete!("transform", started.elapsed(), tables = 12);
/// ```
#[macro_export]
macro_rules! log_stage_complete {
    ($stage:expr, $duration:expr $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(
            stage = $stage,
            duration_ms = $duration.as_millis() as u64
            $(, $key = $value)*,
            "Stage completed"
        );
    };
}

/// Log the cast failures recorded for one source
#[macro_export]
macro_rules! log_cast_failures {
    ($stats:expr) => {
        for (column, summary) in &$stats.cast_failures {
            tracing::warn!(
                source_id = %$stats.source_id,
                column = %column,
                count = summary.count,
                samples = ?summary.samples,
                "Values could not be cast and were set to null"
            );
        }
    };
}

/// Log a retry attempt
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying operation"
        );
    };
}
