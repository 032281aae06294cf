mod config;

pub use self::config::*;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{Layer, Registry};

fn build_filter(level: &LevelConfig, env: Option<&str>) -> EnvFilter {
    let mut filter_builder = EnvFilter::builder().with_default_directive(level.max_level.clone().into());
    if let Some(env) = env {
        filter_builder = filter_builder.with_env_var(env);
        if std::env::var_os(env).is_some() {
            return filter_builder.from_env_lossy();
        }
    }
    filter_builder.parse_lossy(&level.level_filter)
}

/// Install the global subscriber: a console layer and an optional file layer
/// under one global filter.
pub fn initialize_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    if !config.enable {
        return Ok(());
    }
    let filter = build_filter(&config.filter, config.level_filter_env.as_deref());
    let console = config.console.enable.then(|| {
        let debug = config.console.enable_debug_logging;
        tracing_subscriber::fmt::layer()
            .with_file(debug)
            .with_line_number(debug)
            .with_thread_ids(debug)
            .with_target(debug)
            .with_filter(build_filter(&config.console.filter, None))
    });
    let file = config.file.enable.then(|| {
        let config = &config.file;
        let debug = config.enable_debug_logging;
        let file_appender =
            RollingFileAppender::new(config.rolling_time.clone().into(), &config.path, &config.prefix);
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender)
            .with_file(debug)
            .with_line_number(debug)
            .with_thread_ids(debug)
            .with_target(debug)
            .with_filter(build_filter(&config.filter, None))
    });
    Registry::default()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}
