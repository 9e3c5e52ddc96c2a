#![allow(dead_code)]

use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use threadscope::{
    pending_more, splice_more, AnalyzeOptions, BuildOptions, ChatMessage, Concept, FetchOptions, ForumSource,
    LlmError, LlmGateway, MorePlaceholder, PostSkeleton, RawComment, RawNode, Settings, SynthesisOptions,
    TimeWindow,
};

/// A post skeleton with a predictable permalink and timestamp.
pub fn post(id: &str, score: i64) -> PostSkeleton {
    PostSkeleton {
        id: id.to_string(),
        title: format!("Title {id}"),
        selftext: format!("Body of {id}"),
        url: format!("https://reddit.com/r/test/comments/{id}/"),
        subreddit: "test".to_string(),
        score,
        num_comments: 0,
        created_utc: 1_700_000_000.0,
        permalink: format!("https://reddit.com/r/test/comments/{id}/"),
    }
}

/// A raw comment by `user_<id>` with body `comment <id>`.
pub fn comment(id: &str, score: i64, replies: Vec<RawNode>) -> RawNode {
    RawNode::Comment(RawComment {
        id: id.to_string(),
        author: Some(format!("user_{id}")),
        body: format!("comment {id}"),
        score,
        created_utc: 1_700_000_100.0,
        replies,
    })
}

pub fn comment_with(id: &str, author: Option<&str>, body: &str, score: i64, replies: Vec<RawNode>) -> RawNode {
    RawNode::Comment(RawComment {
        id: id.to_string(),
        author: author.map(str::to_string),
        body: body.to_string(),
        score,
        created_utc: 1_700_000_100.0,
        replies,
    })
}

/// A "load more" placeholder under `parent` (a fullname like `t1_c1`).
pub fn more(id: &str, parent: &str, children: &[&str]) -> RawNode {
    RawNode::More(MorePlaceholder {
        id: id.to_string(),
        parent_id: parent.to_string(),
        children: children.iter().map(|c| c.to_string()).collect(),
        count: children.len() as u64,
    })
}

/// In-memory forum. Each post has a served forest; placeholders can be
/// expanded from `hidden`. Failures are injected per post or per subreddit.
#[derive(Default)]
pub struct FixtureSource {
    pub posts: HashMap<String, PostSkeleton>,
    pub searches: HashMap<(String, String), Vec<PostSkeleton>>,
    pub tops: HashMap<(String, TimeWindow), Vec<PostSkeleton>>,
    pub forests: HashMap<String, Vec<RawNode>>,
    /// more id -> (parent fullname, node) batch returned on expansion.
    pub hidden: HashMap<String, Vec<(String, RawNode)>>,
    pub fail_forest: HashSet<String>,
    /// post id -> number of successful expansions before the next one fails.
    pub fail_expand_after: HashMap<String, usize>,
    pub fail_listing: HashSet<String>,
    pub forest_calls: AtomicUsize,
    pub expand_calls: AtomicUsize,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread(mut self, p: PostSkeleton, forest: Vec<RawNode>) -> Self {
        self.forests.insert(p.id.clone(), forest);
        self.posts.insert(p.id.clone(), p);
        self
    }

    pub fn with_hidden(mut self, more_id: &str, batch: Vec<(&str, RawNode)>) -> Self {
        self.hidden
            .insert(more_id.to_string(), batch.into_iter().map(|(p, n)| (p.to_string(), n)).collect());
        self
    }

    pub fn with_search(mut self, sub: &str, query: &str, ids: &[&str]) -> Self {
        let posts = ids.iter().map(|id| self.posts[*id].clone()).collect();
        self.searches.insert((sub.to_string(), query.to_string()), posts);
        self
    }

    pub fn with_top(mut self, sub: &str, window: TimeWindow, ids: &[&str]) -> Self {
        let posts = ids.iter().map(|id| self.posts[*id].clone()).collect();
        self.tops.insert((sub.to_string(), window), posts);
        self
    }

    pub fn forest_calls(&self) -> usize {
        self.forest_calls.load(Ordering::SeqCst)
    }

    pub fn expand_calls(&self) -> usize {
        self.expand_calls.load(Ordering::SeqCst)
    }
}

impl ForumSource for FixtureSource {
    fn fetch_post(&self, id: &str) -> Result<PostSkeleton> {
        self.posts.get(id).cloned().ok_or_else(|| anyhow!("no post {id}"))
    }

    fn search(&self, subreddit: &str, query: &str, limit: usize) -> Result<Vec<PostSkeleton>> {
        if self.fail_listing.contains(subreddit) {
            return Err(anyhow!("search unavailable for {subreddit}"));
        }
        let mut hits = self
            .searches
            .get(&(subreddit.to_string(), query.to_string()))
            .cloned()
            .unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }

    fn top(&self, subreddit: &str, window: TimeWindow, limit: usize) -> Result<Vec<PostSkeleton>> {
        if self.fail_listing.contains(subreddit) {
            return Err(anyhow!("listing unavailable for {subreddit}"));
        }
        let mut hits = self.tops.get(&(subreddit.to_string(), window)).cloned().unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }

    fn comment_forest(&self, post: &PostSkeleton) -> Result<Vec<RawNode>> {
        self.forest_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_forest.contains(&post.id) {
            return Err(anyhow!("comments unavailable for {}", post.id));
        }
        Ok(self.forests.get(&post.id).cloned().unwrap_or_default())
    }

    fn expand_more(&self, post: &PostSkeleton, forest: &mut Vec<RawNode>, budget: usize, max_depth: u32) -> Result<usize> {
        let mut calls = 0;
        while calls < budget {
            let Some(next) = pending_more(forest, max_depth).into_iter().next() else { break };
            if let Some(&ok) = self.fail_expand_after.get(&post.id) {
                if calls >= ok {
                    return Err(anyhow!("expand failed for {}", post.id));
                }
            }
            calls += 1;
            self.expand_calls.fetch_add(1, Ordering::SeqCst);
            let batch = self.hidden.get(&next.placeholder.id).cloned().unwrap_or_default();
            splice_more(forest, &next.placeholder.id, batch, None);
        }
        Ok(calls)
    }
}

type Responder = dyn Fn(&[ChatMessage], &str, bool) -> Result<String, LlmError> + Send + Sync;

/// One recorded gateway call.
#[derive(Clone, Debug)]
pub struct LlmCall {
    pub model: String,
    pub json_mode: bool,
    pub system: String,
    pub user: String,
}

/// LLM gateway answering from a closure and recording every call.
pub struct ScriptedLlm {
    respond: Box<Responder>,
    pub calls: Mutex<Vec<LlmCall>>,
}

impl ScriptedLlm {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[ChatMessage], &str, bool) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self { respond: Box::new(f), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl LlmGateway for ScriptedLlm {
    fn complete(&self, messages: &[ChatMessage], model: &str, json_mode: bool) -> Result<String, LlmError> {
        let text = |role: &str| {
            messages
                .iter()
                .find(|m| m.role == role)
                .map(|m| m.content.clone())
                .unwrap_or_default()
        };
        self.calls.lock().unwrap().push(LlmCall {
            model: model.to_string(),
            json_mode,
            system: text("system"),
            user: text("user"),
        });
        (self.respond)(messages, model, json_mode)
    }
}

/// Last user message of a call.
pub fn user_text(messages: &[ChatMessage]) -> &str {
    messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.as_str()).unwrap_or("")
}

/// A concept with two categories over r/test.
pub fn sample_concept() -> Concept {
    serde_json::from_value(json!({
        "concept_name": "sample",
        "concept_description": "Helping people learn technology",
        "target_subreddits": ["r/test"],
        "keywords": ["help"],
        "top_time_windows": ["all"],
        "filter_system_prompt": "You judge relevance.",
        "filter_user_prompt_template": "Is this relevant? Answer yes or no.\n{thread_content}",
        "analysis_system_prompt": "You analyze threads.",
        "analysis_user_prompt_template": "Analyze:\n{thread_context}",
        "analysis_categories": [
            {"key": "main_pain_points", "name": "Pain Points", "description": "user pain points"},
            {"key": "unmet_needs", "name": "Unmet Needs", "description": "wished-for features"}
        ],
        "report_system_prompt": "You write reports.",
        "report_user_prompt_template": "Write the report.\n{full_context}"
    }))
    .unwrap()
}

pub fn quick_build() -> BuildOptions {
    BuildOptions::default()
}

pub fn quick_fetch() -> FetchOptions {
    FetchOptions::default()
        .with_request_delay(Duration::ZERO)
        .with_error_pause(Duration::ZERO)
        .with_workers(2)
        .with_progress(false)
}

pub fn quick_analyze() -> AnalyzeOptions {
    AnalyzeOptions::default()
        .with_rate_limit_delay(Duration::ZERO)
        .with_progress(false)
}

pub fn quick_synthesis() -> SynthesisOptions {
    SynthesisOptions::default()
        .with_rate_limit_delay(Duration::ZERO)
        .with_progress(false)
}

/// Settings with zero pauses, writing under `out_dir`.
pub fn quick_settings(out_dir: &std::path::Path) -> Settings {
    Settings {
        rate_limit_delay: Duration::ZERO,
        reddit_request_delay: Duration::ZERO,
        output_dir: out_dir.to_path_buf(),
        ..Settings::default()
    }
}
