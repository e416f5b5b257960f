use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use folio_core::{
    AnalysisConfig, Document, FetchConfig, JsonConfig, Layout, Report, Session, StaticLayout, TextConfig, Viewport,
    fetch_file, fetch_stdin, fetch_url, report_to_json, report_to_text,
};
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

mod echo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Output format for the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            _ => Err(format!("Invalid format: {}. Valid options: json, text", s)),
        }
    }
}

/// Viewport size given as `WIDTHxHEIGHT`
#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewportSize {
    width: f64,
    height: f64,
}

impl FromStr for ViewportSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid viewport: {}. Expected WIDTHxHEIGHT, e.g. 1280x800", s);
        let (width, height) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: f64 = width.trim().parse().map_err(|_| invalid())?;
        let height: f64 = height.trim().parse().map_err(|_| invalid())?;
        if width <= 0.0 || height <= 0.0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// Detect the main content of a web page, derive novel and chapter labels,
/// and report reading progress
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author = "Folio Contributors")]
#[command(version)]
#[command(about = "Detect main content, chapter metadata and reading progress of web pages", long_about = None)]
struct Args {
    /// URL to fetch, local HTML file, or "-" for stdin
    #[arg(value_name = "INPUT")]
    input: String,

    /// Page URL for file or stdin input (its path feeds metadata extraction)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Override the document title
    #[arg(long, value_name = "TITLE")]
    title: Option<String>,

    /// Output format (json, text)
    #[arg(short, long, default_value = "json", value_name = "FORMAT")]
    format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Analysis config file (JSON); defaults to the user config when present
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scroll the viewport down to this offset before reporting progress
    #[arg(long, default_value = "0", value_name = "PX")]
    scroll: f64,

    /// Viewport size
    #[arg(long, default_value = "1280x800", value_name = "WxH")]
    viewport: ViewportSize,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    timeout: u64,

    /// Custom User-Agent for HTTP requests
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "folio=debug,folio_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AnalysisConfig> {
    if let Some(path) = path {
        return AnalysisConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()));
    }
    match AnalysisConfig::default_path() {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "using user config");
            AnalysisConfig::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))
        }
        _ => Ok(AnalysisConfig::default()),
    }
}

fn is_web_url(input: &str) -> bool {
    Url::parse(input).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Walk the viewport from the top down to `target`, one screen at a time,
/// so everything passed on the way counts as seen. The walk stops at the
/// bottom of the laid-out body.
fn scroll_down(session: &mut Session<StaticLayout>, target: f64) {
    let step = session.layout().viewport().height.max(1.0);
    let target = target.min(page_bottom(session));
    let mut y = 0.0;
    while y < target {
        y = (y + step).min(target);
        session.layout_mut().scroll_to(0.0, y);
        session.viewport_changed();
    }
}

fn page_bottom(session: &Session<StaticLayout>) -> f64 {
    let tree = session.document().tree();
    session
        .document()
        .body()
        .and_then(|body| session.layout().bounding_rect(tree, body))
        .map_or(0.0, |rect| rect.bottom())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.verbose {
        echo::print_banner();
        echo::print_info("Debug logging enabled");
        eprintln!();
    }

    let config = load_config(args.config.as_ref())?;

    let (html, page_url) = if args.input == "-" {
        if args.verbose {
            echo::print_step(1, 4, "Reading from stdin");
        }
        (fetch_stdin().context("Failed to read from stdin")?, args.url.clone())
    } else if is_web_url(&args.input) {
        if args.verbose {
            echo::print_step(1, 4, &format!("Fetching from {}", args.input.bright_white().underline()));
        }
        let mut fetch_config = FetchConfig { timeout: args.timeout, ..Default::default() };
        if let Some(user_agent) = &args.user_agent {
            fetch_config.user_agent = user_agent.clone();
        }
        let page = fetch_url(&args.input, &fetch_config).await.context("Failed to fetch URL")?;
        (page.html, Some(args.url.clone().unwrap_or(page.final_url)))
    } else {
        if args.verbose {
            echo::print_step(1, 4, &format!("Reading from file {}", args.input.bright_white()));
        }
        let html = fetch_file(&args.input).with_context(|| format!("Failed to read file: {}", args.input))?;
        (html, args.url.clone())
    };

    if args.verbose {
        echo::print_field("Size", &echo::format_size(html.len()));
        eprintln!();
        echo::print_step(2, 4, "Parsing HTML document");
    }

    let parse_start = Instant::now();
    let mut doc = match &page_url {
        Some(url) => Document::parse_with_url(&html, url),
        None => Document::parse(&html),
    }
    .context("Failed to parse HTML")?;
    if let Some(title) = &args.title {
        doc.set_title(title);
    }

    let mut layout = StaticLayout::with_viewport(Viewport {
        scroll_x: 0.0,
        scroll_y: 0.0,
        width: args.viewport.width,
        height: args.viewport.height,
    });
    layout.register_media(doc.tree());
    if let Some(body) = doc.body() {
        layout.flow(doc.tree(), body);
    }

    if args.verbose {
        if !doc.title().is_empty() {
            echo::print_field("Title", doc.title());
        }
        echo::print_timing("Parse", parse_start.elapsed());
        eprintln!();
        echo::print_step(3, 4, "Analysing page");
    }

    let analyze_start = Instant::now();
    let mut session = Session::with_config(doc, layout, config);
    let initial = session.analyze(Instant::now()).unwrap_or_default();
    let report: Report = if initial.has_content() && args.scroll > 0.0 {
        scroll_down(&mut session, args.scroll);
        debug!(scroll = args.scroll, "simulated scrolling");
        session.report(session.progress())
    } else {
        initial
    };

    if args.verbose {
        echo::print_timing("Analysis", analyze_start.elapsed());
        echo::print_analysis_details(session.selection(), &report);
        if !report.has_content() {
            echo::print_warning("No main content found");
        }
    }

    let output = match args.format {
        OutputFormat::Json => {
            let mut json = report_to_json(&report, &JsonConfig { pretty: args.pretty })
                .context("Failed to serialize report")?;
            json.push('\n');
            json
        }
        OutputFormat::Text => report_to_text(&report, &TextConfig::default()),
    };

    if args.verbose {
        echo::print_step(4, 4, "Writing output");
        echo::print_field("Format", &format!("{:?}", args.format));
        eprintln!();
    }

    match args.output {
        Some(path) => {
            fs::write(&path, output).with_context(|| format!("Failed to write to file: {}", path.display()))?;
            echo::print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => {
            print!("{}", output);
        }
    }

    session.dispose();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("txt".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_is_web_url() {
        assert!(is_web_url("https://example.com/book/1"));
        assert!(!is_web_url("chapter.html"));
        assert!(!is_web_url("file:///tmp/chapter.html"));
    }

    #[test]
    fn test_scroll_stops_at_page_bottom() {
        let paragraphs: String =
            (1..=6).map(|i| format!("<p>Line {i}, with a comma and a full stop.</p>")).collect();
        let html = format!("<html><body><div>{paragraphs}</div></body></html>");
        let mut session = Session::from_html(&html, None, AnalysisConfig::default()).unwrap();
        session.layout_mut().resize(1280.0, 20.0);
        let initial = session.analyze(Instant::now()).unwrap();
        assert!(initial.progress < 1.0);

        let bottom = page_bottom(&session);
        assert!(bottom > 0.0);
        scroll_down(&mut session, 1e12);
        assert_eq!(session.layout().viewport().scroll_y, bottom);
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn test_viewport_size_from_str() {
        assert_eq!("800x600".parse::<ViewportSize>(), Ok(ViewportSize { width: 800.0, height: 600.0 }));
        assert!("800".parse::<ViewportSize>().is_err());
        assert!("0x600".parse::<ViewportSize>().is_err());
    }
}
