//! Filter and deep-analysis stages over collected threads.

use crate::config::{render_template, Concept};
use crate::llm::{is_affirmative, LlmGateway, StructuredReply};
use crate::progress::count_progress_if;
use crate::render::{to_filter_text, to_prompt_text};
use crate::text::estimate_tokens;
use crate::thread::Thread;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::thread::sleep;
use std::time::Duration;

/// Failure reason recorded when the gateway produced nothing at all.
pub const NO_RESPONSE: &str = "No response from LLM";

/// Per-thread analysis result as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub post_id: String,
    pub post_title: String,
    pub permalink: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Success {
        analysis: Map<String, Value>,
    },
    Failure {
        #[serde(rename = "analysis_error")]
        reason: String,
        raw_response: Option<String>,
    },
}

impl AnalysisRecord {
    fn for_thread(thread: &Thread, outcome: Outcome) -> Self {
        Self {
            post_id: thread.id.clone(),
            post_title: thread.title.clone(),
            permalink: thread.permalink.clone(),
            outcome,
        }
    }

    pub fn analysis(&self) -> Option<&Map<String, Value>> {
        match &self.outcome {
            Outcome::Success { analysis } => Some(analysis),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.analysis().is_some()
    }
}

#[derive(Clone, Debug)]
pub struct AnalyzeOptions {
    pub filter_model: String,
    pub analysis_model: String,
    pub max_tokens_for_analysis: usize,
    /// Pause after every model call.
    pub rate_limit_delay: Duration,
    pub progress: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            filter_model: "mistralai/mistral-nemo".to_string(),
            analysis_model: "gpt-4o-mini".to_string(),
            max_tokens_for_analysis: 16_000,
            rate_limit_delay: Duration::from_millis(500),
            progress: true,
        }
    }
}

impl AnalyzeOptions {
    pub fn with_filter_model(mut self, m: impl Into<String>) -> Self {
        self.filter_model = m.into();
        self
    }
    pub fn with_analysis_model(mut self, m: impl Into<String>) -> Self {
        self.analysis_model = m.into();
        self
    }
    pub fn with_max_tokens_for_analysis(mut self, n: usize) -> Self {
        self.max_tokens_for_analysis = n;
        self
    }
    pub fn with_rate_limit_delay(mut self, d: Duration) -> Self {
        self.rate_limit_delay = d;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
}

pub struct ThreadAnalyzer<'a, G: LlmGateway> {
    gateway: &'a G,
    concept: &'a Concept,
    opts: AnalyzeOptions,
}

impl<'a, G: LlmGateway> ThreadAnalyzer<'a, G> {
    pub fn new(gateway: &'a G, concept: &'a Concept, opts: AnalyzeOptions) -> Self {
        Self { gateway, concept, opts }
    }

    /// Cheap relevance pass on title and body. Returns `(relevant, filtered_out)`,
    /// each in input order. A failed call counts as not relevant.
    pub fn filter_threads(&self, threads: Vec<Thread>) -> (Vec<Thread>, Vec<Thread>) {
        let pb = count_progress_if(self.opts.progress, threads.len() as u64, "Filtering threads");
        let mut relevant = Vec::new();
        let mut rejected = Vec::new();
        for thread in threads {
            let user = render_template(
                &self.concept.filter_user_prompt_template,
                &[("thread_content", to_filter_text(&thread).as_str())],
            );
            let keep = match self.gateway.classify(&self.concept.filter_system_prompt, &user, &self.opts.filter_model) {
                Ok(reply) => is_affirmative(&reply),
                Err(e) => {
                    tracing::warn!(post_id = %thread.id, error = %e, "filter call failed");
                    false
                }
            };
            if keep {
                relevant.push(thread);
            } else {
                rejected.push(thread);
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            sleep(self.opts.rate_limit_delay);
        }
        if let Some(pb) = pb {
            pb.finish_with_message("Filtering complete");
        }
        tracing::info!(relevant = relevant.len(), filtered_out = rejected.len(), "filter stage done");
        (relevant, rejected)
    }

    /// Deep analysis of each thread. Threads whose prompt text is over the
    /// token budget are skipped and produce no record.
    pub fn analyze_relevant(&self, threads: &[Thread]) -> Vec<AnalysisRecord> {
        let pb = count_progress_if(self.opts.progress, threads.len() as u64, "Analyzing threads");
        let mut out = Vec::with_capacity(threads.len());
        for thread in threads {
            if let Some(rec) = self.analyze_one(thread) {
                out.push(rec);
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        if let Some(pb) = pb {
            pb.finish_with_message("Analysis complete");
        }
        let ok = out.iter().filter(|r| r.is_success()).count();
        tracing::info!(analyzed = out.len(), succeeded = ok, "analysis stage done");
        out
    }

    fn analyze_one(&self, thread: &Thread) -> Option<AnalysisRecord> {
        let context = to_prompt_text(thread);
        let tokens = estimate_tokens(&context);
        if tokens > self.opts.max_tokens_for_analysis {
            tracing::info!(
                post_id = %thread.id,
                tokens,
                limit = self.opts.max_tokens_for_analysis,
                "thread over token budget; skipping"
            );
            return None;
        }
        let user = render_template(&self.concept.analysis_user_prompt_template, &[("thread_context", context.as_str())]);
        let reply = self
            .gateway
            .analyze_structured(&self.concept.analysis_system_prompt, &user, &self.opts.analysis_model);
        sleep(self.opts.rate_limit_delay);

        let outcome = match reply {
            StructuredReply::Json(Value::Object(analysis)) if analysis.contains_key("error") => {
                let reason = match &analysis["error"] {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                tracing::warn!(post_id = %thread.id, reason = %reason, "model reported an analysis error");
                let given = analysis.get("raw_response").and_then(Value::as_str).map(str::to_string);
                let raw_response = given.unwrap_or_else(|| Value::Object(analysis).to_string());
                Outcome::Failure { reason, raw_response: Some(raw_response) }
            }
            StructuredReply::Json(Value::Object(analysis)) => Outcome::Success { analysis },
            StructuredReply::Json(other) => {
                tracing::warn!(post_id = %thread.id, "analysis reply is not a JSON object");
                Outcome::Failure {
                    reason: "Analysis response is not a JSON object".to_string(),
                    raw_response: Some(other.to_string()),
                }
            }
            StructuredReply::Unparsed { raw: Some(raw), reason } => {
                tracing::warn!(post_id = %thread.id, reason = %reason, "analysis reply unusable");
                Outcome::Failure { reason, raw_response: Some(raw) }
            }
            StructuredReply::Unparsed { raw: None, .. } => {
                Outcome::Failure { reason: NO_RESPONSE.to_string(), raw_response: None }
            }
        };
        Some(AnalysisRecord::for_thread(thread, outcome))
    }
}
