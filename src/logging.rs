//! Tracing setup and console conventions.

use std::io::IsTerminal;

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Whether colored output should be used: stdout is a TTY and NO_COLOR is
/// not set.
#[must_use]
pub fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the tracing subscriber.
///
/// Verbose mode widens the filter to debug and keeps targets visible;
/// normal mode stays compact. `RUST_LOG` overrides both.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("claude_workflow=debug,info")
            } else {
                EnvFilter::try_new("claude_workflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()?;

    Ok(())
}

/// Span for one phase execution, carrying the fields every log line in the
/// phase should share.
#[must_use]
pub fn phase_span(workflow: &str, phase: &str) -> tracing::Span {
    tracing::span!(
        tracing::Level::INFO,
        "phase",
        workflow = %workflow,
        phase = %phase,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_enough_for_tests() {
        // A second init fails because a global subscriber exists; both
        // outcomes are fine here.
        let _ = init_tracing(false);
        let _ = init_tracing(true);
    }

    #[test]
    fn phase_span_has_expected_name() {
        let span = phase_span("demo", "PLANNING");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "phase");
        }
    }
}
