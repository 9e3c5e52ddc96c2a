//! Thread construction: fetch the raw forest from the source, then assemble
//! the bounded, score-ordered tree without further I/O.

use crate::config::BuildOptions;
use crate::raw::{PostSkeleton, RawComment, RawNode};
use crate::source::ForumSource;
use crate::text::normalize;
use crate::thread::{datetime_from_epoch, Author, CommentNode, Thread};
use ahash::AHashMap;

/// Memoizing thread builder. One instance per collection worker; the cache
/// is keyed by submission id, so a post that surfaces from several queries
/// is fetched once.
pub struct ThreadBuilder {
    opts: BuildOptions,
    built: AHashMap<String, Thread>,
    order: Vec<String>,
}

impl ThreadBuilder {
    pub fn new(opts: BuildOptions) -> Self {
        Self { opts, built: AHashMap::new(), order: Vec::new() }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.opts
    }

    pub fn contains(&self, id: &str) -> bool {
        self.built.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Build (or return the cached) thread for `post`. A cached id makes no
    /// external calls.
    pub fn build<S: ForumSource + ?Sized>(&mut self, source: &S, post: PostSkeleton) -> &Thread {
        let Self { opts, built, order } = self;
        built.entry(post.id.clone()).or_insert_with_key(|id| {
            order.push(id.clone());
            let forest = fetch_forest(source, &post, opts);
            assemble_thread(post, &forest, opts)
        })
    }

    /// Fetch and assemble comments for a skeleton, bypassing the cache.
    pub fn attach_comments<S: ForumSource + ?Sized>(&self, source: &S, post: PostSkeleton) -> Thread {
        let forest = fetch_forest(source, &post, &self.opts);
        assemble_thread(post, &forest, &self.opts)
    }

    /// Built threads, in the order they were first built.
    pub fn into_threads(mut self) -> Vec<Thread> {
        self.order
            .iter()
            .filter_map(|id| self.built.remove(id))
            .collect()
    }
}

/// Fetch phase: the served forest, then bounded "load more" expansion.
/// Failures are logged and whatever was materialized is returned.
pub fn fetch_forest<S: ForumSource + ?Sized>(source: &S, post: &PostSkeleton, opts: &BuildOptions) -> Vec<RawNode> {
    let mut forest = match source.comment_forest(post) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(post_id = %post.id, error = %e, "fetching comments failed; keeping the post without comments");
            return Vec::new();
        }
    };
    if opts.expand_more_budget > 0 {
        match source.expand_more(post, &mut forest, opts.expand_more_budget, opts.max_depth) {
            Ok(calls) => tracing::debug!(post_id = %post.id, calls, "expanded hidden comments"),
            Err(e) => {
                tracing::warn!(post_id = %post.id, error = %e, "expanding hidden comments failed; keeping what was loaded")
            }
        }
    }
    forest
}

/// Assembly phase: a pure function of the skeleton and the raw forest.
pub fn assemble_thread(post: PostSkeleton, forest: &[RawNode], opts: &BuildOptions) -> Thread {
    Thread {
        title: normalize(&post.title),
        selftext: normalize(&post.selftext),
        created_utc: datetime_from_epoch(post.created_utc),
        comments: assemble_forest(forest, opts),
        id: post.id,
        url: post.url,
        subreddit: post.subreddit,
        score: post.score,
        num_comments: post.num_comments,
        permalink: post.permalink,
    }
}

/// Top-level comments of `forest`, placeholders dropped, ordered by score,
/// capped per level, and cut off below `opts.max_depth`.
pub fn assemble_forest(forest: &[RawNode], opts: &BuildOptions) -> Vec<CommentNode> {
    assemble_level(forest, 0, opts)
}

fn assemble_level(nodes: &[RawNode], depth: u32, opts: &BuildOptions) -> Vec<CommentNode> {
    let mut comments: Vec<&RawComment> = nodes
        .iter()
        .filter_map(|n| match n {
            RawNode::Comment(c) => Some(c),
            RawNode::More(_) => None,
        })
        .collect();
    // Stable: ties keep source order.
    comments.sort_by(|a, b| b.score.cmp(&a.score));
    comments.truncate(opts.limit_at(depth));

    comments
        .into_iter()
        .map(|c| CommentNode {
            id: c.id.clone(),
            body: normalize(&c.body),
            author: Author::from_raw(c.author.as_deref()),
            score: c.score,
            created_utc: datetime_from_epoch(c.created_utc),
            depth,
            replies: if depth < opts.max_depth {
                assemble_level(&c.replies, depth + 1, opts)
            } else {
                Vec::new()
            },
        })
        .collect()
}
