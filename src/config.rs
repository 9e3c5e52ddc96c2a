//! Run configuration: process settings from the environment, the concept
//! bundle (subreddits, keywords, prompts) from a JSON file, and the option
//! structs handed to the builder and collector.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LLM_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {0}")]
    MissingSettings(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidSetting { key: &'static str, value: String },

    #[error("cannot read concept file {path}: {source}")]
    ConceptIo { path: PathBuf, source: std::io::Error },

    #[error("invalid concept file {path}: {source}")]
    ConceptFormat { path: PathBuf, source: serde_json::Error },

    #[error("prompt template `{template}` is missing placeholder {{{placeholder}}}")]
    MissingPlaceholder { template: &'static str, placeholder: &'static str },

    #[error("concept field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Pipeline stage a setting is needed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Fetch,
    Analyze,
    Synthesize,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Fetch, Step::Analyze, Step::Synthesize];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Analyze => "analyze",
            Step::Synthesize => "synthesize",
        }
    }

    /// Steps to run, in pipeline order: `requested` (all when empty) minus `skip`.
    pub fn resolve(requested: &[Step], skip: &[Step]) -> Vec<Step> {
        Step::ALL
            .into_iter()
            .filter(|s| requested.is_empty() || requested.contains(s))
            .filter(|s| !skip.contains(s))
            .collect()
    }
}

impl std::str::FromStr for Step {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fetch" => Ok(Step::Fetch),
            "analyze" => Ok(Step::Analyze),
            "synthesize" => Ok(Step::Synthesize),
            other => Err(format!("unknown step `{other}` (expected fetch, analyze or synthesize)")),
        }
    }
}

/// Process-wide settings read from environment variables (after `.env`).
#[derive(Clone, Debug)]
pub struct Settings {
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: Option<String>,

    pub llm_api_key: Option<String>,
    pub llm_api_url: String,

    pub filter_model: String,
    pub analysis_model: String,
    pub synthesis_model: String,

    pub post_limit_per_query: usize,
    pub comment_limit_per_post: usize,
    pub max_replies_per_comment: usize,
    pub reply_fetch_depth: u32,
    pub more_comments_limit: usize,
    pub fetch_workers: usize,

    pub max_tokens_for_analysis: usize,
    pub api_timeout: Duration,
    pub rate_limit_delay: Duration,
    pub reddit_request_delay: Duration,

    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reddit_client_id: None,
            reddit_client_secret: None,
            reddit_user_agent: None,
            llm_api_key: None,
            llm_api_url: DEFAULT_LLM_URL.to_string(),
            filter_model: "mistralai/mistral-nemo".to_string(),
            analysis_model: "gpt-4o-mini".to_string(),
            synthesis_model: "gpt-4o-mini".to_string(),
            post_limit_per_query: 150,
            comment_limit_per_post: 50,
            max_replies_per_comment: 10,
            reply_fetch_depth: 1,
            more_comments_limit: 10,
            fetch_workers: 4,
            max_tokens_for_analysis: 16_000,
            api_timeout: Duration::from_secs(180),
            rate_limit_delay: Duration::from_millis(500),
            reddit_request_delay: Duration::from_millis(250),
            output_dir: PathBuf::from("results"),
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidSetting { key, value: v }),
    }
}

fn parse_secs(key: &'static str, raw: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_num(key, raw, default.as_secs_f64())?;
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidSetting { key, value: secs.to_string() })
}

impl Settings {
    /// Load `.env` (if present), then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from an arbitrary key lookup (environment, map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Settings::default();
        let text = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let fetch_workers = parse_num("FETCH_WORKERS", lookup("FETCH_WORKERS"), d.fetch_workers)?;
        if fetch_workers == 0 {
            return Err(ConfigError::InvalidSetting { key: "FETCH_WORKERS", value: "0".into() });
        }

        Ok(Self {
            reddit_client_id: text("REDDIT_CLIENT_ID"),
            reddit_client_secret: text("REDDIT_CLIENT_SECRET"),
            reddit_user_agent: text("REDDIT_USER_AGENT"),
            llm_api_key: text("OPENROUTER_API_KEY"),
            llm_api_url: text("OPENROUTER_API_URL").unwrap_or(d.llm_api_url),
            filter_model: text("ANALYSIS_FILTER_MODEL").unwrap_or(d.filter_model),
            analysis_model: text("ANALYSIS_MODEL").unwrap_or(d.analysis_model),
            synthesis_model: text("SYNTHESIS_MODEL").unwrap_or(d.synthesis_model),
            post_limit_per_query: parse_num("POST_LIMIT_PER_QUERY", lookup("POST_LIMIT_PER_QUERY"), d.post_limit_per_query)?,
            comment_limit_per_post: parse_num("COMMENT_LIMIT_PER_POST", lookup("COMMENT_LIMIT_PER_POST"), d.comment_limit_per_post)?,
            max_replies_per_comment: parse_num("MAX_REPLIES_PER_COMMENT", lookup("MAX_REPLIES_PER_COMMENT"), d.max_replies_per_comment)?,
            reply_fetch_depth: parse_num("REPLY_FETCH_DEPTH", lookup("REPLY_FETCH_DEPTH"), d.reply_fetch_depth)?,
            more_comments_limit: parse_num("REDDIT_MORE_COMMENTS_LIMIT", lookup("REDDIT_MORE_COMMENTS_LIMIT"), d.more_comments_limit)?,
            fetch_workers,
            max_tokens_for_analysis: parse_num("MAX_TOKENS_FOR_ANALYSIS", lookup("MAX_TOKENS_FOR_ANALYSIS"), d.max_tokens_for_analysis)?,
            api_timeout: parse_secs("API_TIMEOUT", lookup("API_TIMEOUT"), d.api_timeout)?,
            rate_limit_delay: parse_secs("RATE_LIMIT_DELAY", lookup("RATE_LIMIT_DELAY"), d.rate_limit_delay)?,
            reddit_request_delay: parse_secs("REDDIT_REQUEST_DELAY", lookup("REDDIT_REQUEST_DELAY"), d.reddit_request_delay)?,
            output_dir: text("OUTPUT_DIR").map(PathBuf::from).unwrap_or(d.output_dir),
        })
    }

    /// Fail fast when a step would run without the credentials it needs.
    pub fn validate_for(&self, steps: &[Step]) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if steps.contains(&Step::Fetch) {
            if self.reddit_client_id.is_none() { missing.push("REDDIT_CLIENT_ID"); }
            if self.reddit_client_secret.is_none() { missing.push("REDDIT_CLIENT_SECRET"); }
            if self.reddit_user_agent.is_none() { missing.push("REDDIT_USER_AGENT"); }
        }
        if (steps.contains(&Step::Analyze) || steps.contains(&Step::Synthesize)) && self.llm_api_key.is_none() {
            missing.push("OPENROUTER_API_KEY");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingSettings(missing.join(", ")))
        }
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::default()
            .with_max_depth(self.reply_fetch_depth)
            .with_max_children_per_node(self.max_replies_per_comment)
            .with_top_level_limit(self.comment_limit_per_post)
            .with_expand_more_budget(self.more_comments_limit)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default()
            .with_post_limit_per_query(self.post_limit_per_query)
            .with_request_delay(self.reddit_request_delay)
            .with_workers(self.fetch_workers)
    }
}

/// Tree-shape limits applied while building threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildOptions {
    /// Deepest comment depth kept; nodes at this depth have no replies.
    pub max_depth: u32,
    /// Cap on replies kept under each comment.
    pub max_children_per_node: usize,
    /// Cap on top-level comments; `None` uses `max_children_per_node`.
    pub top_level_limit: Option<usize>,
    /// Upper bound on "load more" round trips per thread.
    pub expand_more_budget: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_depth: 1,
            max_children_per_node: 10,
            top_level_limit: None,
            expand_more_budget: 10,
        }
    }
}

impl BuildOptions {
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }
    pub fn with_max_children_per_node(mut self, n: usize) -> Self {
        self.max_children_per_node = n;
        self
    }
    pub fn with_top_level_limit(mut self, n: usize) -> Self {
        self.top_level_limit = Some(n);
        self
    }
    pub fn with_expand_more_budget(mut self, n: usize) -> Self {
        self.expand_more_budget = n;
        self
    }

    /// Sibling cap for comments at `depth`.
    pub fn limit_at(&self, depth: u32) -> usize {
        match (depth, self.top_level_limit) {
            (0, Some(n)) => n,
            _ => self.max_children_per_node,
        }
    }
}

/// Collection-loop knobs.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub post_limit_per_query: usize,
    /// Fixed pause after each thread fetched.
    pub request_delay: Duration,
    /// Pause after a listing request fails before moving on.
    pub error_pause: Duration,
    /// Subreddits fetched concurrently.
    pub workers: usize,
    pub progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            post_limit_per_query: 150,
            request_delay: Duration::from_millis(250),
            error_pause: Duration::from_secs(5),
            workers: 4,
            progress: true,
        }
    }
}

impl FetchOptions {
    pub fn with_post_limit_per_query(mut self, n: usize) -> Self {
        self.post_limit_per_query = n;
        self
    }
    pub fn with_request_delay(mut self, d: Duration) -> Self {
        self.request_delay = d;
        self
    }
    pub fn with_error_pause(mut self, d: Duration) -> Self {
        self.error_pause = d;
        self
    }
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
}

/// One thematic category the analysis prompt extracts and synthesis clusters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCategory {
    /// Key in the analysis JSON (e.g. `main_pain_points`).
    pub key: String,
    /// Human-readable name used in logs.
    pub name: String,
    /// What the items are, phrased for the clustering prompt.
    pub description: String,
}

fn default_time_windows() -> Vec<String> {
    vec!["all".to_string(), "year".to_string()]
}

/// The named bundle describing one research concept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Concept {
    pub concept_name: String,
    #[serde(default)]
    pub concept_description: String,
    pub target_subreddits: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_time_windows")]
    pub top_time_windows: Vec<String>,

    pub filter_system_prompt: String,
    pub filter_user_prompt_template: String,
    pub analysis_system_prompt: String,
    pub analysis_user_prompt_template: String,
    #[serde(default)]
    pub analysis_categories: Vec<AnalysisCategory>,
    pub report_system_prompt: String,
    pub report_user_prompt_template: String,

    #[serde(default)]
    pub output_file_prefix: Option<String>,
}

impl Concept {
    /// Read and validate a concept file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::ConceptIo { path: path.to_path_buf(), source })?;
        let concept: Concept = serde_json::from_str(&text)
            .map_err(|source| ConfigError::ConceptFormat { path: path.to_path_buf(), source })?;
        concept.validate()?;
        Ok(concept)
    }

    /// Templates must carry their placeholder and the bundle must name
    /// something to fetch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concept_name.trim().is_empty() {
            return Err(ConfigError::EmptyField("concept_name"));
        }
        if self.target_subreddits.is_empty() {
            return Err(ConfigError::EmptyField("target_subreddits"));
        }
        let checks: [(&'static str, &str, &'static str); 3] = [
            ("filter_user_prompt_template", &self.filter_user_prompt_template, "thread_content"),
            ("analysis_user_prompt_template", &self.analysis_user_prompt_template, "thread_context"),
            ("report_user_prompt_template", &self.report_user_prompt_template, "full_context"),
        ];
        for (template, text, placeholder) in checks {
            if !has_placeholder(text, placeholder) {
                return Err(ConfigError::MissingPlaceholder { template, placeholder });
            }
        }
        for w in &self.top_time_windows {
            w.parse::<crate::source::TimeWindow>()
                .map_err(|_| ConfigError::InvalidSetting { key: "top_time_windows", value: w.clone() })?;
        }
        Ok(())
    }

    /// Prefix for every output file of this concept.
    pub fn output_prefix(&self) -> &str {
        self.output_file_prefix
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.concept_name)
    }

    /// Subreddit names with any `r/` prefix removed.
    pub fn subreddits(&self) -> Vec<String> {
        self.target_subreddits
            .iter()
            .map(|s| {
                let s = s.trim();
                s.strip_prefix("r/").unwrap_or(s).to_string()
            })
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn has_placeholder(template: &str, name: &str) -> bool {
    let mut found = false;
    walk_template(template, |piece| {
        if let Piece::Field(f) = piece {
            found |= f == name;
        }
    });
    found
}

enum Piece<'a> {
    Text(&'a str),
    Field(&'a str),
}

/// Split a `{name}` template into literal text and fields; `{{` and `}}` are
/// escaped braces.
fn walk_template<'a>(template: &'a str, mut emit: impl FnMut(Piece<'a>)) {
    let mut rest = template;
    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        emit(Piece::Text(&rest[..pos]));
        let tail = &rest[pos..];
        if tail.starts_with("{{") {
            emit(Piece::Text("{"));
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            emit(Piece::Text("}"));
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            match tail[1..].find('}') {
                Some(end) if tail[1..1 + end].chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && end > 0 => {
                    emit(Piece::Field(&tail[1..1 + end]));
                    rest = &tail[end + 2..];
                }
                _ => {
                    emit(Piece::Text("{"));
                    rest = &tail[1..];
                }
            }
        } else {
            emit(Piece::Text("}"));
            rest = &tail[1..];
        }
    }
    emit(Piece::Text(rest));
}

/// Fill `{key}` fields of a prompt template. Unknown fields are left as
/// written; substituted values are never re-scanned.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    walk_template(template, |piece| match piece {
        Piece::Text(t) => out.push_str(t),
        Piece::Field(f) => match values.iter().find(|(k, _)| *k == f) {
            Some((_, v)) => out.push_str(v),
            None => {
                out.push('{');
                out.push_str(f);
                out.push('}');
            }
        },
    });
    out
}
