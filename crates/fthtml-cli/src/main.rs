use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fthtml_fmt::{FormatStyle, FormattingOptions};
use fthtml_lexer::grammar;
use fthtml_parser::{document_symbols, ParseError, ProjectConfig};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

const EXTENSION: &str = "fthtml";

#[derive(Parser)]
#[command(name = "fthtml")]
#[command(about = "ftHTML checker, formatter and HTML converter")]
#[command(version)]
struct Cli {
    /// Log debug events
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project configuration (default: nearest fthtmlconfig.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse documents and report the first error of each
    Check {
        /// .fthtml files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Format a document
    Fmt {
        /// Input .fthtml file
        path: PathBuf,

        /// Write the result back to the file
        #[arg(long, conflicts_with = "check")]
        write: bool,

        /// Exit with an error if the file is not formatted
        #[arg(long)]
        check: bool,

        /// JSON file with formatter style settings
        #[arg(long)]
        style: Option<PathBuf>,

        /// Indent with tabs instead of spaces
        #[arg(long)]
        tabs: bool,

        /// Spaces per indentation level
        #[arg(long, default_value_t = 4)]
        tab_size: usize,
    },

    /// Convert an HTML fragment to ftHTML
    ConvertHtml {
        /// Input .html file
        path: PathBuf,

        /// Indentation level of the output
        #[arg(long, default_value_t = 0)]
        indent: usize,

        /// JSON file with formatter style settings
        #[arg(long)]
        style: Option<PathBuf>,
    },

    /// Print the document outline as JSON
    Symbols {
        /// Input .fthtml file
        path: PathBuf,

        /// Include tags that carry an id or class
        #[arg(long)]
        tags: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Check { paths } => cmd_check(&paths, config),
        Command::Fmt {
            path,
            write,
            check,
            style,
            tabs,
            tab_size,
        } => {
            let options = FormattingOptions {
                tab_size,
                insert_spaces: !tabs,
                insert_final_newline: true,
            };
            cmd_fmt(&path, write, check, style.as_deref(), options, config)
        }
        Command::ConvertHtml {
            path,
            indent,
            style,
        } => cmd_convert_html(&path, indent, style.as_deref(), config),
        Command::Symbols { path, tags } => cmd_symbols(&path, tags, config),
    }
}

// --- Commands ---

fn cmd_check(paths: &[PathBuf], config_path: Option<&Path>) -> Result<ExitCode> {
    let mut failures = 0;
    let mut checked = 0;

    for path in paths {
        let config = project_config(config_path, path)?;
        for file in collect_documents(path)? {
            if let Some(config) = &config {
                if config.is_excluded(&file)? {
                    debug!(file = %file.display(), "excluded");
                    continue;
                }
            }

            checked += 1;
            if let Err(e) = fthtml_parser::Parser::parse_file(&file, config.as_ref()) {
                failures += 1;
                eprint!("{}", render_error(&e, &file));
            }
        }
    }

    info!(checked, failures, "check finished");
    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_fmt(
    path: &Path,
    write: bool,
    check: bool,
    style_path: Option<&Path>,
    options: FormattingOptions,
    config_path: Option<&Path>,
) -> Result<ExitCode> {
    let config = project_config(config_path, path)?;
    let style = load_style(style_path, config.as_ref())?;
    let source = read_source(path)?;

    let elements = match fthtml_parser::Parser::new(&source, grammar::standard(), config.as_ref())
        .in_file(path)
        .parse()
    {
        Ok(elements) => elements,
        Err(e) => {
            eprint!("{}", render_error(&e, path));
            return Ok(ExitCode::FAILURE);
        }
    };
    let formatted = fthtml_fmt::format(&elements, &style, &options);

    if check {
        if formatted != source {
            eprintln!("Would reformat: {}", path.display());
            return Ok(ExitCode::FAILURE);
        }
        return Ok(ExitCode::SUCCESS);
    }

    if write {
        if formatted != source {
            std::fs::write(path, &formatted)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Formatted: {}", path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    print!("{formatted}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_convert_html(
    path: &Path,
    indent: usize,
    style_path: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<ExitCode> {
    let config = project_config(config_path, path)?;
    let style = load_style(style_path, config.as_ref())?;
    let html = read_source(path)?;

    let Some(fthtml) =
        fthtml_fmt::convert_html_fragment(&html, indent, &style, &FormattingOptions::default())
    else {
        bail!("{} does not contain an HTML fragment", path.display());
    };
    print!("{fthtml}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_symbols(path: &Path, tags: bool, config_path: Option<&Path>) -> Result<ExitCode> {
    let config = project_config(config_path, path)?;
    let elements = match fthtml_parser::Parser::parse_file(path, config.as_ref()) {
        Ok(elements) => elements,
        Err(e) => {
            eprint!("{}", render_error(&e, path));
            return Ok(ExitCode::FAILURE);
        }
    };

    let outline = document_symbols(&elements, tags);
    println!("{}", serde_json::to_string_pretty(&outline)?);
    Ok(ExitCode::SUCCESS)
}

// --- Helpers ---

fn read_source(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!("file not found: {}", path.display());
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// The explicit configuration, or the nearest one above `near`.
fn project_config(explicit: Option<&Path>, near: &Path) -> Result<Option<ProjectConfig>> {
    if let Some(path) = explicit {
        return Ok(Some(ProjectConfig::load(path)?));
    }
    let start = if near.is_dir() {
        near
    } else {
        near.parent().unwrap_or(Path::new("."))
    };
    let start = if start.as_os_str().is_empty() {
        Path::new(".")
    } else {
        start
    };
    Ok(ProjectConfig::discover(start)?)
}

/// Style from `--style`, else the configuration's `format` key, else the
/// defaults.
fn load_style(path: Option<&Path>, config: Option<&ProjectConfig>) -> Result<FormatStyle> {
    if let Some(path) = path {
        let text = read_source(path)?;
        return serde_json::from_str(&text)
            .with_context(|| format!("invalid style file {}", path.display()));
    }
    match config.and_then(|c| c.format.clone()) {
        Some(format) => {
            serde_json::from_value(format).context("invalid \"format\" settings in configuration")
        }
        None => Ok(FormatStyle::default()),
    }
}

/// Documents under `path`: the path itself when it is a file, otherwise
/// every `.fthtml` file below it, sorted.
fn collect_documents(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == EXTENSION) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// `file:line:col: message`, then one indented line per import site.
fn render_error(e: &ParseError, checked: &Path) -> String {
    let file = e.file.as_deref().unwrap_or(checked);
    let mut out = format!(
        "{}:{}:{}: {}\n",
        file.display(),
        e.position.line,
        e.position.column,
        e.message
    );
    for frame in &e.stack {
        let site = frame.file.as_deref().unwrap_or(checked);
        out.push_str(&format!(
            "    at {}:{}:{}: {}\n",
            site.display(),
            frame.position.line,
            frame.position.column,
            frame.message
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collect_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("partials")).unwrap();
        std::fs::write(dir.path().join("index.fthtml"), "div").unwrap();
        std::fs::write(dir.path().join("partials/nav.fthtml"), "nav").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = collect_documents(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("index.fthtml"), PathBuf::from("partials/nav.fthtml")]
        );
    }

    #[test]
    fn test_style_from_configuration() {
        let config = ProjectConfig::from_json(
            r#"{ "format": { "attributes": { "sorted": false } } }"#,
        )
        .unwrap();
        let style = load_style(None, Some(&config)).unwrap();
        assert!(!style.attributes.sorted);
        assert!(load_style(None, None).unwrap().attributes.sorted);
    }

    #[test]
    fn test_render_error_with_import_chain() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.fthtml"), "div {\n  import \"nav\"\n}").unwrap();
        std::fs::write(dir.path().join("nav.fthtml"), "ul {").unwrap();

        let index = dir.path().join("index.fthtml");
        let e = fthtml_parser::Parser::parse_file(&index, None).unwrap_err();
        let rendered = render_error(&e, &index);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("nav.fthtml:1:1: "), "{rendered}");
        assert!(lines[1].starts_with("    at "), "{rendered}");
        assert!(lines[1].contains("index.fthtml:2:"), "{rendered}");
    }
}
