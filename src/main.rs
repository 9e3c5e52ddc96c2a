//! threadscope - collect Reddit threads for a research concept, analyze them
//! with an LLM, and write a market-validation report.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use threadscope::{init_tracing_once, Concept, Pipeline, Settings, Step};

#[derive(Parser)]
#[command(name = "threadscope")]
#[command(about = "Reddit thread collection, LLM analysis and report synthesis")]
#[command(version)]
struct Args {
    /// Concept file (JSON) describing subreddits, keywords and prompts
    #[arg(short, long)]
    config: PathBuf,

    /// Steps to run, comma separated (fetch,analyze,synthesize). Default: all
    #[arg(long, value_delimiter = ',')]
    steps: Vec<Step>,

    #[arg(long)]
    skip_fetch: bool,

    #[arg(long)]
    skip_analyze: bool,

    #[arg(long)]
    skip_synthesize: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing_once();

    let mut skip = Vec::new();
    if args.skip_fetch {
        skip.push(Step::Fetch);
    }
    if args.skip_analyze {
        skip.push(Step::Analyze);
    }
    if args.skip_synthesize {
        skip.push(Step::Synthesize);
    }
    let steps = Step::resolve(&args.steps, &skip);
    if steps.is_empty() {
        bail!("nothing to run: every step was skipped");
    }

    let settings = Settings::from_env().context("failed to read settings")?;
    let concept = Concept::load(&args.config)
        .with_context(|| format!("failed to load concept {}", args.config.display()))?;

    let pipeline = Pipeline::new(settings, concept).progress(!args.no_progress);
    let paths = pipeline.paths();
    let summary = pipeline.run(&steps)?;

    if let Some(n) = summary.threads_fetched {
        println!("Fetched {n} threads -> {}", paths.threads.display());
    }
    if let Some((relevant, rejected)) = summary.analyzed {
        println!("Analyzed {relevant} relevant threads ({rejected} filtered out) -> {}", paths.analysis.display());
    }
    if summary.report_written {
        println!("Report -> {}", paths.report.display());
    }
    Ok(())
}
