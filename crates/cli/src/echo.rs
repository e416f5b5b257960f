use owo_colors::OwoColorize;

use folio_core::{Report, Selection};

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!("\n{} {} {}", "Folio".bold().bright_blue(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", "Main content, chapter metadata and reading progress\n".dimmed());
}

/// Print a styled step message
pub fn print_step(step: usize, total: usize, message: &str) {
    eprintln!("{} {}", format!("[{}/{}]", step, total).dimmed(), message.bright_cyan());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print a labelled value under a step
pub fn print_field(label: &str, value: &str) {
    eprintln!("  {} {}", format!("{}:", label).dimmed(), value.bright_white());
}

/// Print timing information with color coding
pub fn print_timing(label: &str, duration: std::time::Duration) {
    let ms = duration.as_secs_f64() * 1000.0;
    let label = format!("{}:", label);
    if ms < 50.0 {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "fast".dimmed());
    } else if ms < 100.0 {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "moderate".bright_yellow());
    } else {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "slow".bright_red());
    }
}

/// Print the chosen content range and derived labels
pub fn print_analysis_details(selection: Option<&Selection>, report: &Report) {
    eprintln!("\n{}", "═".repeat(60).dimmed());
    eprintln!("{}", "Analysis Details".bold().cyan());
    eprintln!("{}", "═".repeat(60).dimmed());
    match selection {
        Some(selection) => {
            print_field("Type", selection.content_type.as_str());
            print_field("Range", &format!("#{} .. #{}", selection.start.index(), selection.end.index()));
            print_field("Seen-based", if selection.see_able { "yes" } else { "no" });
            print_field("Playback", if selection.duration_able.is_some() { "yes" } else { "no" });
        }
        None => print_field("Type", "none"),
    }
    if let Some(chapter) = &report.chapter {
        print_field("Chapter", chapter);
    }
    if let Some(novel) = &report.novel {
        print_field("Novel", novel);
    }
    eprintln!();
}

/// Format file size for display
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
