use {
    anyhow::Result,
    std::{
        fs::File,
        path::Path,
        sync::Arc,
    },
    tracing::Level,
    tracing_subscriber::{
        fmt::{
            layer,
            writer::MakeWriterExt,
        },
        layer::SubscriberExt,
        util::SubscriberInitExt,
    },
};

/// Install a global subscriber writing to `path` and to stdout.
///
/// Both writers default to [`Level::INFO`]. Buffer operations log at `TRACE`,
/// training steps at `DEBUG`, and rejected updates at `WARN`.
///
/// Fails if the log file cannot be created or a global subscriber is already set.
pub fn setup_logging(
    path: &dyn AsRef<Path>,
    min_level_file: Option<Level>,
    min_level_stdout: Option<Level>,
) -> Result<()> {
    let log_file = Arc::new(File::create(path)?);

    tracing_subscriber::registry()
        // File writer
        .with(
            layer()
                .with_writer(log_file.with_max_level(min_level_file.unwrap_or(Level::INFO)))
                .with_ansi(false),
        )
        // Stdout writer
        .with(
            layer()
                .with_writer(std::io::stdout.with_max_level(min_level_stdout.unwrap_or(Level::INFO)))
                .compact()
                .pretty()
                .with_line_number(true)
                .with_thread_ids(false)
                .with_target(false),
        )
        .try_init()?;

    Ok(())
}
