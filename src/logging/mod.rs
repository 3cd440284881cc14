use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, PlainDecorator, TermDecorator};

/// Configuration for setting up the logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub async_buffer_size: usize,
    pub use_color: bool,
    /// Write plain text to stderr instead of the terminal decorator
    pub plain: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
            plain: false,
        }
    }
}

impl LoggerConfig {
    /// Small, uncoloured buffer for tests and non-interactive runs.
    pub fn quiet() -> Self {
        Self {
            async_buffer_size: 128,
            use_color: false,
            plain: true,
        }
    }
}

/// Sets up the root slog logger used for component loggers.
pub fn setup_logger(config: LoggerConfig) -> Logger {
    let async_drain = if config.plain {
        let decorator = PlainDecorator::new(std::io::stderr());
        let drain = FullFormat::new(decorator).build().fuse();
        Async::new(drain).chan_size(config.async_buffer_size).build()
    } else {
        let decorator = {
            let builder = TermDecorator::new();
            let builder = if config.use_color {
                builder.force_color()
            } else {
                builder
            };
            builder.build()
        };
        let drain = FullFormat::new(decorator).build().fuse();
        Async::new(drain).chan_size(config.async_buffer_size).build()
    };

    Logger::root(
        async_drain.fuse(),
        o!("version" => env!("CARGO_PKG_VERSION")),
    )
}

/// Child logger tagged with the owning component.
pub fn component_logger(root: &Logger, component: &'static str) -> Logger {
    root.new(o!("component" => component))
}
