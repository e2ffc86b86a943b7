//! Off-thread parsing and composition
//!
//! Decoding archives and parsing large documents is CPU-bound, so these
//! helpers move the work onto tokio's blocking pool when the `tokio-runtime`
//! feature is enabled and run it inline otherwise.

use crate::compose::layer::{ComposedMap, LayerComposer, LayerSource};
use crate::data::formats::{DataFormat, FormatDetector, SourceInput};
use crate::data::parsers::{ParseOutcome, ParserRegistry};
use crate::{Error, Result};
use std::sync::Arc;

/// Common async execution helper to standardize tokio-runtime patterns
pub struct AsyncExecutor;

impl AsyncExecutor {
    /// Execute a CPU-intensive task using the appropriate runtime
    pub async fn execute_blocking<F, R>(task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        #[cfg(feature = "tokio-runtime")]
        {
            tokio::task::spawn_blocking(task).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Task execution failed: {}", e),
                ))
            })
        }

        #[cfg(not(feature = "tokio-runtime"))]
        {
            Ok(task())
        }
    }
}

/// Parses `input` off the calling task. Without an explicit `format` the
/// input is detected first. Never fails; a crashed worker is reported as a
/// malformed document.
pub async fn parse_in_background(
    registry: Arc<ParserRegistry>,
    input: SourceInput,
    format: Option<DataFormat>,
) -> ParseOutcome {
    let format = format.unwrap_or_else(|| FormatDetector::detect(&input));
    let name = input.file_name.clone();

    match AsyncExecutor::execute_blocking(move || registry.parse_as(format, &input)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::warn!(
                "Background parse of {} failed: {}",
                name.as_deref().unwrap_or("inline input"),
                e
            );
            ParseOutcome::from_result(format, Err(Error::malformed(format, e.to_string())))
        }
    }
}

/// Parses several inputs concurrently; outcomes keep the input order
pub async fn parse_all(
    registry: Arc<ParserRegistry>,
    inputs: Vec<(SourceInput, Option<DataFormat>)>,
) -> Vec<ParseOutcome> {
    let tasks = inputs
        .into_iter()
        .map(|(input, format)| parse_in_background(Arc::clone(&registry), input, format));
    futures::future::join_all(tasks).await
}

/// Composes the given layers off the calling task
pub async fn compose_in_background(
    composer: Arc<LayerComposer>,
    sources: Vec<LayerSource>,
) -> Result<ComposedMap> {
    AsyncExecutor::execute_blocking(move || composer.compose(&sources)).await
}
