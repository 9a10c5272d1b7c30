use std::path::PathBuf;

use snafu::{ResultExt, Snafu};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::writer::{BoxMakeWriter, MakeWriterExt as _},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender in {directory:?}"))]
    InitRollingFileAppender {
        directory: PathBuf,
        source: tracing_appender::rolling::InitError,
    },

    #[snafu(display("failed to install the global tracing subscriber"))]
    InitSubscriber {
        source: tracing_subscriber::util::TryInitError,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Initializes `tracing` logging with options from the environment variable
/// given in the `env` parameter.
///
/// We encourage it to be the product name plus `_LOG`, e.g. `RANGER_OPERATOR_LOG`.
/// If the variable is not set, the maximum log level is INFO.
///
/// Log output can be copied to a file by setting `{env}_DIRECTORY` (e.g. `RANGER_OPERATOR_LOG_DIRECTORY`)
/// to a directory path. This file will be rotated regularly.
pub fn initialize_logging(env: &str, app_name: &str, format: LogFormat) -> Result<(), Error> {
    let filter = EnvFilter::try_from_env(env)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_appender = file_appender_directory
        .as_deref()
        .map(|log_dir| {
            RollingFileAppender::builder()
                .filename_suffix(format!("{app_name}.log"))
                .max_log_files(6)
                .build(log_dir)
                .context(InitRollingFileAppenderSnafu { directory: log_dir })
        })
        .transpose()?;

    let writer = match file_appender {
        Some(file_appender) => BoxMakeWriter::new(std::io::stdout.and(file_appender)),
        None => BoxMakeWriter::new(std::io::stdout),
    };
    let fmt = tracing_subscriber::fmt::layer().with_writer(writer);
    let registry = Registry::default().with(filter);

    match format {
        LogFormat::Plain => registry.with(fmt).try_init(),
        LogFormat::Json => registry.with(fmt.json()).try_init(),
    }
    .context(InitSubscriberSnafu)?;

    // need to delay logging until after tracing is initialized
    match file_appender_directory {
        Some(dir) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }
    Ok(())
}
