use checkrun::Status;
use colored::{ColoredString, Colorize};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Colored symbol for a check status
pub fn status_symbol(status: Status) -> ColoredString {
    let symbol = status.symbol();
    match status {
        Status::Passed => symbol.green(),
        Status::Failed => symbol.red(),
        Status::Skipped => symbol.dimmed(),
        Status::Errored => symbol.yellow(),
    }
}

/// Colored pass/fail symbol for a host
pub fn host_symbol(success: bool) -> ColoredString {
    if success { "✓".green() } else { "✗".red() }
}

/// Format a duration in seconds for display
pub fn format_secs(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.1}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(Duration::from_millis(250)), "250ms");
        assert_eq!(format_secs(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_secs(Duration::from_secs(62)), "62.0s");
    }

    #[test]
    fn test_status_symbols() {
        colored::control::set_override(false);
        assert_eq!(status_symbol(Status::Passed).to_string(), "✓");
        assert_eq!(status_symbol(Status::Errored).to_string(), "!");
        assert_eq!(host_symbol(false).to_string(), "✗");
    }
}
