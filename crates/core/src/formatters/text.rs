use crate::report::Report;

const LABEL_WIDTH: usize = 10;

/// Configuration for plain text output
#[derive(Debug, Clone, Default)]
pub struct TextConfig {
    /// Print `-` for missing fields instead of leaving them out
    pub show_missing: bool,
}

/// Plain text formatter for reports
pub struct TextFormatter {
    config: TextConfig,
}

impl TextFormatter {
    pub fn new(config: TextConfig) -> Self {
        Self { config }
    }

    pub fn convert(&self, report: &Report) -> String {
        report_to_text(report, &self.config)
    }
}

/// Render a report as an aligned key/value listing
pub fn report_to_text(report: &Report, config: &TextConfig) -> String {
    let with_index = |label: &Option<String>, index: &Option<String>| match (label, index) {
        (Some(label), Some(index)) if label != index => Some(format!("{label} (#{index})")),
        (Some(label), _) => Some(label.clone()),
        (None, Some(index)) => Some(format!("#{index}")),
        (None, None) => None,
    };

    let rows = [
        ("Novel", report.novel.clone()),
        ("Volume", with_index(&report.volume, &report.vol_index)),
        ("Chapter", with_index(&report.chapter, &report.chap_index)),
        ("Type", Some(report.content_type.map(|t| t.to_string()).unwrap_or_else(|| "none".to_string()))),
        ("Progress", Some(format!("{:.1}%", report.progress * 100.0))),
    ];

    let mut output = String::new();
    for (label, value) in rows {
        let value = match value {
            Some(value) => value,
            None if config.show_missing => "-".to_string(),
            None => continue,
        };
        output.push_str(&format!("{:<width$}{}\n", format!("{label}:"), value, width = LABEL_WIDTH));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::ContentType;

    #[test]
    fn test_report_to_text() {
        let report = Report {
            novel: Some("MNA".to_string()),
            volume: None,
            chapter: Some("Chapter 12".to_string()),
            vol_index: None,
            chap_index: Some("12".to_string()),
            content_type: Some(ContentType::Text),
            progress: 0.3,
        };
        let text = report_to_text(&report, &TextConfig::default());
        assert_eq!(
            text,
            "Novel:    MNA\nChapter:  Chapter 12 (#12)\nType:     text\nProgress: 30.0%\n"
        );
    }

    #[test]
    fn test_show_missing_fields() {
        let text = TextFormatter::new(TextConfig { show_missing: true }).convert(&Report::empty());
        assert!(text.contains("Volume:   -\n"));
        assert!(text.contains("Type:     none\n"));
        assert!(text.contains("Progress: 0.0%\n"));
    }

    #[test]
    fn test_index_equal_to_label_not_repeated() {
        let report = Report { chapter: Some("14".to_string()), chap_index: Some("14".to_string()), ..Report::empty() };
        assert!(report_to_text(&report, &TextConfig::default()).contains("Chapter:  14\n"));
    }
}
