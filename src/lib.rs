mod config;
mod text;
mod thread;
mod raw;
mod source;
mod reddit;

mod builder;
mod render;
mod progress;
mod concurrency;
mod collect;
mod util;

mod llm;
mod analysis;
mod synthesis;
mod pipeline;

pub use crate::config::{
    render_template, AnalysisCategory, BuildOptions, Concept, ConfigError, FetchOptions, Settings, Step,
};
pub use crate::text::{estimate_tokens, normalize};
pub use crate::thread::{datetime_from_epoch, Author, CommentNode, CommentWalk, Thread, DELETED_AUTHOR};
pub use crate::raw::{
    absolute_permalink, collect_pages, listing_after, parse_comment_listing, parse_post, parse_post_listing,
    parse_thing, pending_more, splice_more, split_more_request, MorePlaceholder, PendingMore, PostSkeleton,
    RawComment, RawNode, PAGE_MAX,
};
pub use crate::source::{ForumSource, TimeWindow};
pub use crate::reddit::{RedditClient, RedditCredentials};

pub use crate::builder::{assemble_forest, assemble_thread, fetch_forest, ThreadBuilder};
pub use crate::render::{from_record, from_records, to_filter_text, to_prompt_text, to_record, to_records, INDENT_UNIT};
pub use crate::collect::{merge_threads, Collector};

pub use crate::progress::{count_progress_if, make_count_progress};
pub use crate::concurrency::map_limited;

pub use crate::util::{init_tracing_once, read_json, replace_file_atomic_backoff, write_json_pretty, write_text};

pub use crate::llm::{
    extract_content, is_affirmative, parse_json_reply, ChatMessage, LlmError, LlmGateway, OpenRouterClient,
    StructuredReply, RATE_LIMIT_PAUSE,
};
pub use crate::analysis::{AnalysisRecord, AnalyzeOptions, Outcome, ThreadAnalyzer, NO_RESPONSE};
pub use crate::synthesis::{
    aggregate, build_report_context, Aggregated, CategorySummary, SynthesisOptions, Synthesizer, ThematicSummary,
    Theme, REPORT_FAILED,
};
pub use crate::pipeline::{OutputPaths, Pipeline, RunSummary};
