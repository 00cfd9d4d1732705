use std::path::Path;

use anyhow::Context;
use owo_colors::{OwoColorize, Style};

use crate::error_context;

fn level_style(level: log::Level) -> Style {
    match level {
        log::Level::Trace => Style::new().purple(),
        log::Level::Debug => Style::new().blue(),
        log::Level::Warn => Style::new().yellow(),
        log::Level::Error => Style::new().red(),
        log::Level::Info => Style::new().bright_green(),
    }
}

/// Coloured lines on stdout, plus plain timestamped lines in `log_file` when given.
pub fn setup_logger(level: Option<log::LevelFilter>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{:<5} {} {} {}",
                record.level().style(level_style(record.level())),
                record.target(),
                "~".fg_rgb::<128, 128, 128>(),
                message
            ))
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new()
        .level(log::LevelFilter::Off)
        .level_for("proxy_pool", level.unwrap_or(log::LevelFilter::Info))
        .chain(console);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(error_context!())?;
        }
        let file = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} {} [line:{}] {}: {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.level(),
                    message
                ))
            })
            .chain(fern::log_file(path).context(error_context!())?);
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    Ok(())
}

pub fn parse_level(name: &str) -> log::LevelFilter {
    match name {
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Warn,
    }
}
