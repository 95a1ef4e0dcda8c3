use clap::Parser;
use log::LevelFilter;
use score_import::diagnostics::DiagnosticSeverity;
use score_import::{import_document, ImportError, ImportOptions, MemoryDocument};
use std::path::PathBuf;
use std::process::ExitCode;
use std::{env, fs};

/// Import a JSON music document and report what was built.
///
/// Logging is controlled with RUST_LOG; if it is not set, the level defaults to Warn.
#[derive(Parser)]
#[command(version, about, long_about = None, verbatim_doc_comment)]
struct Cli {
    /// Source document (JSON)
    input: PathBuf,

    /// Import options (JSON); missing fields keep their defaults
    #[arg(long)]
    options: Option<PathBuf>,

    /// Print statistics and diagnostics as JSON
    #[arg(long)]
    json: bool,

    /// Write the imported score as JSON to this file
    #[arg(long, short)]
    output: Option<PathBuf>,
}

/// Number of error diagnostics on success
fn run(cli: &Cli) -> Result<usize, ImportError> {
    let options = match &cli.options {
        Some(path) => ImportOptions::from_json(&fs::read_to_string(path)?)?,
        None => ImportOptions::default(),
    };
    let doc = MemoryDocument::from_path(&cli.input)?;
    let outcome = import_document(&doc, &options)?;

    if let Some(path) = &cli.output {
        fs::write(path, serde_json::to_string_pretty(&outcome.score)?)?;
    }

    if cli.json {
        let report = serde_json::json!({
            "stats": outcome.stats,
            "diagnostics": outcome.diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let stats = &outcome.stats;
        println!(
            "{} parts, {} staves, {} measures",
            outcome.score.parts().len(),
            outcome.score.nstaves(),
            outcome.score.measure_keys().len()
        );
        println!(
            "entries: {} placed, {} skipped, {} failed, {} voices aborted",
            stats.entries.placed, stats.entries.skipped, stats.entries.failed, stats.entries.aborted_voices
        );
        println!(
            "spanners: {} created, {} dropped; {} beams, {} full-measure rests",
            stats.shapes.created, stats.shapes.dropped, stats.entries.beams, stats.entries.measure_rests
        );
        for diagnostic in &outcome.diagnostics.entries {
            println!("{:?}: {}", diagnostic.severity, diagnostic);
        }
    }
    Ok(outcome.diagnostics.count(DiagnosticSeverity::Error))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut log_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        log_builder.filter_level(LevelFilter::Warn);
    }
    log_builder.init();

    match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(errors) => {
            eprintln!("import finished with {} error(s)", errors);
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("{}: {}", cli.input.display(), err);
            ExitCode::FAILURE
        }
    }
}
