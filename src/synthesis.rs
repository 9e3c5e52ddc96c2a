//! Aggregation of analysis records, per-category thematic clustering, and the
//! final report.

use crate::analysis::AnalysisRecord;
use crate::config::{render_template, AnalysisCategory, Concept};
use crate::llm::{LlmGateway, StructuredReply};
use crate::progress::count_progress_if;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::thread::sleep;
use std::time::Duration;

/// Written instead of a report when the report call fails.
pub const REPORT_FAILED: &str = "# Report Generation Failed";

const CLUSTER_SYSTEM_PROMPT: &str = "You are a data analyst specializing in qualitative data. Your task is to \
perform thematic analysis on a list of user-provided items, group them into high-level categories, and count \
the occurrences for each category.";

const CLUSTER_USER_TEMPLATE: &str = r#"Analyze the following list of raw '{description}'. Group similar items into meaningful, high-level themes.

For each theme, provide:
1. A concise `theme_name`.
2. The `count` of how many raw items fall into that theme.
3. A list of `example_items` (up to 3) from the raw data that best represent the theme.

Return your analysis as JSON: a list of these themes, sorted by count in descending order.
Example format:
[
  {{"theme_name": "Example Theme 1", "count": 42, "example_items": ["Raw item A", "Raw item B"]}},
  {{"theme_name": "Example Theme 2", "count": 19, "example_items": ["Raw item C"]}}
]

Here is the list of raw items to analyze:
---
{items}
---
"#;

/// Category items pooled across all successful records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregated {
    /// Configured category key -> items, in record order. Keys keep the
    /// configured category order.
    pub categories: IndexMap<String, Vec<String>>,
    /// Permalinks of records flagged `is_high_value: true`.
    pub high_value_threads: Vec<String>,
}

/// Pool per-category items of successful records. Failed records are skipped.
pub fn aggregate(records: &[AnalysisRecord], categories: &[AnalysisCategory]) -> Aggregated {
    let mut agg = Aggregated::default();
    for c in categories {
        agg.categories.entry(c.key.clone()).or_default();
    }
    for rec in records {
        let Some(analysis) = rec.analysis() else { continue };
        for c in categories {
            let Some(items) = agg.categories.get_mut(&c.key) else { continue };
            match analysis.get(&c.key) {
                Some(Value::Array(values)) => items.extend(values.iter().filter_map(item_text)),
                Some(other) => items.extend(item_text(other)),
                None => {}
            }
        }
        if analysis.get("is_high_value").and_then(Value::as_bool) == Some(true) {
            agg.high_value_threads.push(rec.permalink.clone());
        }
    }
    for (key, items) in &agg.categories {
        tracing::info!(category = %key, items = items.len(), "aggregated");
    }
    agg
}

fn item_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default = "unnamed_theme")]
    pub theme_name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub example_items: Vec<String>,
}

fn unnamed_theme() -> String {
    "N/A".to_string()
}

impl Theme {
    /// Read one theme of a clustering reply. Counts may arrive as floats or
    /// numeric strings and example items as non-strings; anything that is
    /// not an object is dropped with a warning.
    fn from_reply_item(item: &Value) -> Option<Theme> {
        let Some(obj) = item.as_object() else {
            tracing::warn!(item = %item, "dropping theme entry that is not an object");
            return None;
        };
        let theme_name = obj
            .get("theme_name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map_or_else(unnamed_theme, str::to_string);
        let count = obj.get("count").map(lenient_count).unwrap_or(0);
        let example_items = match obj.get("example_items") {
            Some(Value::Array(values)) => values.iter().filter_map(item_text).collect(),
            Some(other) => item_text(other).into_iter().collect(),
            None => Vec::new(),
        };
        Some(Theme { theme_name, count, example_items })
    }
}

fn lenient_count(v: &Value) -> u64 {
    let n = match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0).round() as u64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.max(0.0).round() as u64),
        _ => None,
    };
    n.unwrap_or_else(|| {
        tracing::warn!(count = %v, "theme count is not a number; using 0");
        0
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategorySummary {
    Themes(Vec<Theme>),
    Error { error: String, raw_response: Option<String> },
}

impl CategorySummary {
    /// Read a clustering reply: a list of themes, or an object wrapping
    /// exactly one list (e.g. `{"themes": [...]}`).
    pub fn from_reply(reply: StructuredReply) -> Self {
        let value = match reply {
            StructuredReply::Json(v) => v,
            StructuredReply::Unparsed { reason, raw } => return CategorySummary::Error { error: reason, raw_response: raw },
        };
        let list = match &value {
            Value::Array(items) => Some(items),
            Value::Object(map) => {
                let mut lists = map.values().filter_map(Value::as_array);
                match (lists.next(), lists.next()) {
                    (Some(only), None) => Some(only),
                    _ => None,
                }
            }
            _ => None,
        };
        match list {
            Some(items) => CategorySummary::Themes(items.iter().filter_map(Theme::from_reply_item).collect()),
            None => CategorySummary::Error {
                error: "Reply is not a list of themes".to_string(),
                raw_response: Some(value.to_string()),
            },
        }
    }
}

/// Persisted thematic summary: one entry per category plus the high-value list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThematicSummary {
    /// Keyed by category, in configured order.
    #[serde(flatten)]
    pub categories: IndexMap<String, CategorySummary>,
    #[serde(default)]
    pub high_value_threads: Vec<String>,
}

/// Plain-text digest of the summary handed to the report prompt.
pub fn build_report_context(summary: &ThematicSummary) -> String {
    let mut out = String::new();
    for (key, cat) in &summary.categories {
        let _ = write!(out, "## Thematic Summary for: {key}\n\n");
        match cat {
            CategorySummary::Themes(themes) => {
                for t in themes {
                    let _ = writeln!(out, "- **Theme:** {} (Count: {})", t.theme_name, t.count);
                    let _ = writeln!(out, "  - Examples: {}", t.example_items.join("; "));
                }
            }
            CategorySummary::Error { error, .. } => {
                let _ = writeln!(out, "Error processing {key}: {error}");
            }
        }
        out.push_str("\n---\n");
    }
    out.push_str("## Thematic Summary for: high_value_threads\n\n");
    let _ = writeln!(out, "Found {} high-value discussion threads.", summary.high_value_threads.len());
    out.push_str("\n---\n");
    out
}

#[derive(Clone, Debug)]
pub struct SynthesisOptions {
    pub synthesis_model: String,
    pub rate_limit_delay: Duration,
    pub progress: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            synthesis_model: "gpt-4o-mini".to_string(),
            rate_limit_delay: Duration::from_millis(500),
            progress: true,
        }
    }
}

impl SynthesisOptions {
    pub fn with_synthesis_model(mut self, m: impl Into<String>) -> Self {
        self.synthesis_model = m.into();
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

pub struct Synthesizer<'a, G: LlmGateway> {
    gateway: &'a G,
    concept: &'a Concept,
    opts: SynthesisOptions,
}

impl<'a, G: LlmGateway> Synthesizer<'a, G> {
    pub fn new(gateway: &'a G, concept: &'a Concept, opts: SynthesisOptions) -> Self {
        Self { gateway, concept, opts }
    }

    /// Cluster every configured category. Empty categories get an empty
    /// theme list without a model call.
    pub fn summarize(&self, agg: &Aggregated) -> ThematicSummary {
        let cats = &self.concept.analysis_categories;
        let pb = count_progress_if(self.opts.progress, cats.len() as u64, "Clustering themes");
        let mut summary = ThematicSummary { high_value_threads: agg.high_value_threads.clone(), ..Default::default() };
        for c in cats {
            let items = agg.categories.get(&c.key).map(Vec::as_slice).unwrap_or(&[]);
            let result = self.cluster(c, items);
            summary.categories.insert(c.key.clone(), result);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        if let Some(pb) = pb {
            pb.finish_with_message("Clustering complete");
        }
        summary
    }

    fn cluster(&self, category: &AnalysisCategory, items: &[String]) -> CategorySummary {
        if items.is_empty() {
            tracing::info!(category = %category.name, "no items; skipping clustering");
            return CategorySummary::Themes(Vec::new());
        }
        tracing::info!(category = %category.name, items = items.len(), "clustering");
        let listing = items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n");
        let user = render_template(
            CLUSTER_USER_TEMPLATE,
            &[("description", category.description.as_str()), ("items", listing.as_str())],
        );
        let reply = self
            .gateway
            .analyze_structured(CLUSTER_SYSTEM_PROMPT, &user, &self.opts.synthesis_model);
        sleep(self.opts.rate_limit_delay);
        let out = CategorySummary::from_reply(reply);
        if let CategorySummary::Error { error, .. } = &out {
            tracing::warn!(category = %category.key, error = %error, "clustering failed");
        }
        out
    }

    /// Markdown report, or [`REPORT_FAILED`] when the call fails.
    pub fn report(&self, summary: &ThematicSummary) -> String {
        let context = build_report_context(summary);
        let user = render_template(&self.concept.report_user_prompt_template, &[("full_context", context.as_str())]);
        match self
            .gateway
            .classify(&self.concept.report_system_prompt, &user, &self.opts.synthesis_model)
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "report generation failed");
                REPORT_FAILED.to_string()
            }
        }
    }
}
