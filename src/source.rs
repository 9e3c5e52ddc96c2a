//! The forum as an external collaborator. Everything that talks to the network
//! sits behind this trait so tree assembly stays pure.

use crate::raw::{PostSkeleton, RawNode};
use anyhow::Result;

/// Listing window for "top" queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }
}

impl std::str::FromStr for TimeWindow {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" => Ok(TimeWindow::Hour),
            "day" => Ok(TimeWindow::Day),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            "year" => Ok(TimeWindow::Year),
            "all" => Ok(TimeWindow::All),
            other => Err(format!("unknown time window: {other}")),
        }
    }
}

/// Read access to a forum. All calls block; timeouts and sessions belong to
/// the implementation. Implementations are shared across collection workers.
pub trait ForumSource: Sync {
    /// Look up a single submission by id (without comments).
    fn fetch_post(&self, id: &str) -> Result<PostSkeleton>;

    /// Keyword search restricted to one subreddit, in relevance order.
    fn search(&self, subreddit: &str, query: &str, limit: usize) -> Result<Vec<PostSkeleton>>;

    /// Top submissions of one subreddit for a time window.
    fn top(&self, subreddit: &str, window: TimeWindow, limit: usize) -> Result<Vec<PostSkeleton>>;

    /// The comment forest as first served, placeholders included.
    fn comment_forest(&self, post: &PostSkeleton) -> Result<Vec<RawNode>>;

    /// Materialize hidden comments behind "load more" placeholders in place,
    /// spending at most `budget` round trips and never fetching comments that
    /// would sit deeper than `max_depth`. Returns the number of round trips
    /// made. On error, `forest` keeps everything expanded so far.
    fn expand_more(
        &self,
        post: &PostSkeleton,
        forest: &mut Vec<RawNode>,
        budget: usize,
        max_depth: u32,
    ) -> Result<usize>;
}
