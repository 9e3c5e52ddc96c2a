//! Step sequencing: fetch -> analyze -> synthesize, each reading the previous
//! step's output file so steps can be re-run independently.

use crate::analysis::{AnalysisRecord, AnalyzeOptions, ThreadAnalyzer};
use crate::collect::Collector;
use crate::config::{Concept, Settings, Step};
use crate::llm::{LlmGateway, OpenRouterClient};
use crate::reddit::{RedditClient, RedditCredentials};
use crate::render::{from_records, to_records};
use crate::source::ForumSource;
use crate::synthesis::{aggregate, SynthesisOptions, Synthesizer, ThematicSummary};
use crate::util::{init_tracing_once, read_json, write_json_pretty, write_text};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Every file a concept run reads or writes, under one output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub threads: PathBuf,
    pub analysis: PathBuf,
    pub filtered_out: PathBuf,
    pub thematic: PathBuf,
    pub report: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        let p = |suffix: &str| dir.join(format!("{prefix}_{suffix}"));
        Self {
            threads: p("reddit_threads.json"),
            analysis: p("final_analysis_results.json"),
            filtered_out: p("filtered_out_threads.json"),
            thematic: p("thematic_summary.json"),
            report: p("market_validation_report.md"),
        }
    }
}

/// What a full run produced, for the caller's summary line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub threads_fetched: Option<usize>,
    pub analyzed: Option<(usize, usize)>,
    pub report_written: bool,
}

pub struct Pipeline {
    settings: Settings,
    concept: Concept,
    progress: bool,
}

impl Pipeline {
    pub fn new(settings: Settings, concept: Concept) -> Self {
        Self { settings, concept, progress: true }
    }

    pub fn progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    pub fn concept(&self) -> &Concept {
        &self.concept
    }

    pub fn paths(&self) -> OutputPaths {
        OutputPaths::new(&self.settings.output_dir, self.concept.output_prefix())
    }

    fn analyze_options(&self) -> AnalyzeOptions {
        AnalyzeOptions::default()
            .with_filter_model(self.settings.filter_model.clone())
            .with_analysis_model(self.settings.analysis_model.clone())
            .with_max_tokens_for_analysis(self.settings.max_tokens_for_analysis)
            .with_rate_limit_delay(self.settings.rate_limit_delay)
            .with_progress(self.progress)
    }

    fn synthesis_options(&self) -> SynthesisOptions {
        SynthesisOptions::default()
            .with_synthesis_model(self.settings.synthesis_model.clone())
            .with_rate_limit_delay(self.settings.rate_limit_delay)
            .with_progress(self.progress)
    }

    /// Collect threads and persist them. Returns the number written.
    pub fn fetch<S: ForumSource>(&self, source: &S) -> Result<usize> {
        let collector = Collector::new(
            self.settings.build_options(),
            self.settings.fetch_options().with_progress(self.progress),
        );
        let threads = collector.collect(source, &self.concept)?;
        let out = self.paths().threads;
        write_json_pretty(&out, &to_records(&threads)?)?;
        tracing::info!(threads = threads.len(), path = %out.display(), "saved threads");
        Ok(threads.len())
    }

    /// Filter then analyze the persisted threads. Returns `(relevant, filtered_out)`.
    pub fn analyze<G: LlmGateway>(&self, gateway: &G) -> Result<(usize, usize)> {
        let paths = self.paths();
        let records: Vec<Value> = read_json(&paths.threads)
            .with_context(|| format!("loading threads for concept {}", self.concept.concept_name))?;
        let threads = from_records(records)?;
        if threads.is_empty() {
            tracing::warn!(path = %paths.threads.display(), "no threads to analyze");
        }
        tracing::info!(threads = threads.len(), "loaded threads for analysis");

        let analyzer = ThreadAnalyzer::new(gateway, &self.concept, self.analyze_options());
        let (relevant, rejected) = analyzer.filter_threads(threads);
        write_json_pretty(&paths.filtered_out, &to_records(&rejected)?)?;

        let results = analyzer.analyze_relevant(&relevant);
        write_json_pretty(&paths.analysis, &results)?;
        tracing::info!(records = results.len(), path = %paths.analysis.display(), "saved analysis results");
        Ok((relevant.len(), rejected.len()))
    }

    /// Aggregate analysis records, cluster them, and write the report. With
    /// no records (every thread filtered out) the summary holds empty
    /// categories and no report is written.
    pub fn synthesize<G: LlmGateway>(&self, gateway: &G) -> Result<ThematicSummary> {
        self.synthesize_step(gateway).map(|(summary, _)| summary)
    }

    fn synthesize_step<G: LlmGateway>(&self, gateway: &G) -> Result<(ThematicSummary, bool)> {
        let paths = self.paths();
        let records: Vec<AnalysisRecord> = read_json(&paths.analysis)
            .with_context(|| format!("loading analysis for concept {}", self.concept.concept_name))?;

        let agg = aggregate(&records, &self.concept.analysis_categories);
        let synth = Synthesizer::new(gateway, &self.concept, self.synthesis_options());
        let summary = synth.summarize(&agg);
        write_json_pretty(&paths.thematic, &summary)?;
        tracing::info!(path = %paths.thematic.display(), "saved thematic summary");

        if records.is_empty() {
            tracing::warn!(path = %paths.analysis.display(), "no analysis records; skipping report");
            return Ok((summary, false));
        }
        let report = synth.report(&summary);
        write_text(&paths.report, &report)?;
        tracing::info!(path = %paths.report.display(), "saved report");
        Ok((summary, true))
    }

    /// Run `steps` in pipeline order against the live Reddit and OpenRouter
    /// clients. Credentials are checked for the requested steps only.
    pub fn run(&self, steps: &[Step]) -> Result<RunSummary> {
        init_tracing_once();
        self.settings.validate_for(steps)?;
        tracing::info!(
            concept = %self.concept.concept_name,
            steps = ?steps.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "starting run"
        );

        let mut summary = RunSummary::default();
        if steps.contains(&Step::Fetch) {
            let reddit = self.reddit_client()?;
            summary.threads_fetched = Some(self.fetch(&reddit)?);
        }
        if steps.contains(&Step::Analyze) || steps.contains(&Step::Synthesize) {
            let llm = self.llm_client()?;
            if steps.contains(&Step::Analyze) {
                summary.analyzed = Some(self.analyze(&llm)?);
            }
            if steps.contains(&Step::Synthesize) {
                let (_, written) = self.synthesize_step(&llm)?;
                summary.report_written = written;
            }
        }
        Ok(summary)
    }

    fn reddit_client(&self) -> Result<RedditClient> {
        let s = &self.settings;
        let missing = || anyhow!("Reddit credentials are not configured");
        let creds = RedditCredentials {
            client_id: s.reddit_client_id.clone().ok_or_else(missing)?,
            client_secret: s.reddit_client_secret.clone().ok_or_else(missing)?,
            user_agent: s.reddit_user_agent.clone().ok_or_else(missing)?,
        };
        RedditClient::new(creds, s.api_timeout)
    }

    fn llm_client(&self) -> Result<OpenRouterClient> {
        let key = self
            .settings
            .llm_api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY is not configured"))?;
        Ok(OpenRouterClient::new(self.settings.llm_api_url.clone(), key, self.settings.api_timeout)?)
    }
}
