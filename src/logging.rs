//! Shared CLI helpers: tracing setup and clap styling.

use clap::builder::styling::{AnsiColor, Effects};
use clap::builder::Styles;

pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Install the global tracing subscriber. Logs go to stderr, or to
/// `log_file` when one is given.
pub fn logging_setup(max_level: &tracing::Level, log_file: Option<&std::fs::File>) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(*max_level)
        .with_target(false)
        .without_time();
    match log_file {
        Some(file) => match file.try_clone() {
            Ok(file) => builder
                .with_writer(std::sync::Arc::new(file))
                .with_ansi(false)
                .init(),
            Err(err) => {
                eprintln!("cannot clone log file handle ({err}), logging to stderr");
                builder.with_writer(std::io::stderr).init()
            }
        },
        None => builder.with_writer(std::io::stderr).init(),
    }
}
