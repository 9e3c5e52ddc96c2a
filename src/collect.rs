//! Collection run: per-subreddit keyword searches and top listings, each
//! subreddit built by its own worker, merged and deduplicated after join.

use crate::builder::ThreadBuilder;
use crate::concurrency::map_limited;
use crate::config::{BuildOptions, Concept, FetchOptions};
use crate::progress::count_progress_if;
use crate::raw::PostSkeleton;
use crate::source::{ForumSource, TimeWindow};
use crate::thread::Thread;
use ahash::AHashSet;
use anyhow::Result;
use std::thread::sleep;

pub struct Collector {
    build: BuildOptions,
    fetch: FetchOptions,
}

/// One listing request a worker issues for its subreddit.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Query {
    Search(String),
    Top(TimeWindow),
}

impl Collector {
    pub fn new(build: BuildOptions, fetch: FetchOptions) -> Self {
        Self { build, fetch }
    }

    /// Fetch every configured subreddit and return the unique threads,
    /// highest score first.
    pub fn collect<S: ForumSource>(&self, source: &S, concept: &Concept) -> Result<Vec<Thread>> {
        let subreddits = concept.subreddits();
        let windows: Vec<TimeWindow> = concept
            .top_time_windows
            .iter()
            .map(|w| w.parse::<TimeWindow>().map_err(anyhow::Error::msg))
            .collect::<Result<_>>()?;
        let mut queries: Vec<Query> = concept.keywords.iter().map(|k| Query::Search(k.clone())).collect();
        queries.extend(windows.into_iter().map(Query::Top));

        tracing::info!(
            concept = %concept.concept_name,
            subreddits = subreddits.len(),
            keywords = concept.keywords.len(),
            workers = self.fetch.workers,
            "starting collection"
        );

        let pb = count_progress_if(self.fetch.progress, subreddits.len() as u64, "Fetching subreddits");
        let parts = map_limited(&subreddits, self.fetch.workers, |sub| {
            let threads = self.collect_subreddit(source, sub, &queries);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            threads
        });
        if let Some(pb) = pb {
            pb.finish_with_message("Fetch complete");
        }

        let merged = merge_threads(parts);
        tracing::info!(unique = merged.len(), "collection finished");
        Ok(merged)
    }

    /// Sequential work of one worker. Listing failures are logged and the
    /// worker pauses before moving on to the next query.
    fn collect_subreddit<S: ForumSource>(&self, source: &S, sub: &str, queries: &[Query]) -> Vec<Thread> {
        let mut builder = ThreadBuilder::new(self.build.clone());
        for q in queries {
            let listing = match q {
                Query::Search(kw) => {
                    tracing::info!(subreddit = sub, keyword = %kw, "searching");
                    source.search(sub, kw, self.fetch.post_limit_per_query)
                }
                Query::Top(w) => {
                    tracing::info!(subreddit = sub, window = w.as_str(), "fetching top posts");
                    source.top(sub, *w, self.fetch.post_limit_per_query)
                }
            };
            let posts = match listing {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(subreddit = sub, query = ?q, error = %e, "listing failed");
                    sleep(self.fetch.error_pause);
                    continue;
                }
            };
            for post in posts {
                if builder.contains(&post.id) {
                    continue;
                }
                let post = with_subreddit_fallback(post, sub);
                builder.build(source, post);
                sleep(self.fetch.request_delay);
            }
        }
        tracing::debug!(subreddit = sub, threads = builder.len(), "worker finished");
        builder.into_threads()
    }
}

fn with_subreddit_fallback(mut post: PostSkeleton, sub: &str) -> PostSkeleton {
    if post.subreddit.trim().is_empty() {
        post.subreddit = sub.to_string();
    }
    post
}

/// Merge per-worker results: the first occurrence of an id wins, later ones
/// are dropped. Output is ordered by score (descending), then id.
pub fn merge_threads(parts: Vec<Vec<Thread>>) -> Vec<Thread> {
    let mut seen = AHashSet::new();
    let mut out: Vec<Thread> = parts
        .into_iter()
        .flatten()
        .filter(|t| seen.insert(t.id.clone()))
        .collect();
    out.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    out
}
