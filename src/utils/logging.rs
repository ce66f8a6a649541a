//! Logging utilities for production-ready colorful output

use colored::Colorize;

/// Log levels for the indexer
#[derive(Clone, Copy)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Logs a message with color and formatting
pub fn log(level: LogLevel, message: &str) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    match level {
        LogLevel::Info => {
            println!(
                "{} {} {}",
                format!("[{timestamp}]").bright_black(),
                "ℹ".bright_blue(),
                message
            );
        }
        LogLevel::Success => {
            println!(
                "{} {} {}",
                format!("[{timestamp}]").bright_black(),
                "✓".bright_green(),
                message.green()
            );
        }
        LogLevel::Warning => {
            println!(
                "{} {} {}",
                format!("[{timestamp}]").bright_black(),
                "⚠".bright_yellow(),
                message.yellow()
            );
        }
        LogLevel::Error => {
            eprintln!(
                "{} {} {}",
                format!("[{timestamp}]").bright_black(),
                "✗".bright_red(),
                message.red()
            );
        }
    }
}

/// Logs indexer startup information
pub fn log_startup(hub_address: &str, hub_v2_address: &str, rpc_url: &str, poll_interval: u64) {
    println!("\n{}", "═".repeat(80).bright_blue());
    println!("{}", "  Circles Indexer".bright_cyan().bold());
    println!("{}", "═".repeat(80).bright_blue());
    println!("  {} {}", "Hub (v1):  ".bright_white(), hub_address.cyan());
    println!("  {} {}", "Hub (v2):  ".bright_white(), hub_v2_address.cyan());
    println!("  {} {}", "RPC URL:   ".bright_white(), rpc_url.cyan());
    println!(
        "  {} {}s",
        "Head Poll: ".bright_white(),
        poll_interval.to_string().cyan()
    );
    println!("{}\n", "═".repeat(80).bright_blue());
}

/// Logs an import-run summary
pub fn log_import(from: u64, to: u64, events: usize, duration_ms: u64) {
    println!(
        "{} {} {} {} {} {} {}ms",
        "📦".bright_blue(),
        "Imported:".bright_white(),
        format!("blocks {from}..={to}").bright_cyan(),
        "│".bright_black(),
        format!("{events} events").bright_green(),
        "in".bright_black(),
        duration_ms.to_string().bright_yellow()
    );
}

/// Logs an error with context
pub fn log_error(context: &str, error: &str) {
    eprintln!(
        "{} {} {} {}",
        "✗".bright_red(),
        context.red().bold(),
        "│".bright_black(),
        error.bright_red()
    );
}
