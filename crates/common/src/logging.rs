use crate::config::Environment;
use tracing_subscriber::{
    EnvFilter, Layer, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Filter from `RUST_LOG`, falling back to `info`.
pub(crate) fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// `debug` everywhere when verbose, otherwise the `RUST_LOG` filter.
fn cli_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        env_filter()
    }
}

/// Console layer: JSON lines in production, pretty ANSI output otherwise.
pub(crate) fn fmt_layer<S, W>(
    environment: Environment,
    writer: W,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match environment {
        Environment::Production => tracing_subscriber::fmt::layer()
            .json()
            .with_level(true)
            .with_writer(writer)
            .boxed(),
        Environment::Development => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(true)
            .with_writer(writer)
            .boxed(),
    }
}

/// Initialize the global subscriber without an OTLP exporter.
///
/// The OpenTelemetry layer is still installed so spans carry trace ids if a
/// global tracer provider shows up later.
pub fn setup_logging(environment: Environment) {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_opentelemetry::layer())
        .with(fmt_layer(environment, std::io::stdout))
        .init();
}

/// Subscriber for command line tools. Logs go to stderr so stdout stays
/// machine readable.
pub fn setup_cli_logging(environment: Environment, verbose: bool) {
    tracing_subscriber::registry()
        .with(cli_filter(verbose))
        .with(fmt_layer(environment, std::io::stderr))
        .init();
}
