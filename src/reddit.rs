//! Blocking Reddit client speaking the OAuth JSON API with an app-only token.

use crate::raw::{
    collect_pages, listing_after, parse_comment_listing, parse_post_listing, parse_thing, pending_more,
    splice_more, split_more_request, MorePlaceholder, PostSkeleton, RawNode,
};
use crate::source::{ForumSource, TimeWindow};
use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
/// Refresh the token this long before Reddit says it expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_ttl")]
    expires_in: u64,
}

fn default_token_ttl() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct RedditClient {
    http: Client,
    creds: RedditCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(creds: RedditCredentials, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(creds.user_agent.clone())
            .timeout(timeout)
            .build()
            .context("building Reddit HTTP client")?;
        Ok(Self { http, creds, token: Mutex::new(None) })
    }

    /// Current bearer token, fetching a new one when missing or near expiry.
    fn bearer(&self) -> Result<String> {
        let mut slot = self.token.lock();
        if let Some(tok) = slot.as_ref() {
            if Instant::now() < tok.expires_at {
                return Ok(tok.value.clone());
            }
        }
        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .context("requesting Reddit access token")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            bail!("Reddit token request failed ({}): {}", status.as_u16(), body);
        }
        let tr: TokenResponse = resp.json().context("decoding Reddit token response")?;
        let ttl = Duration::from_secs(tr.expires_in).saturating_sub(TOKEN_SLACK);
        tracing::debug!(ttl_secs = ttl.as_secs(), "obtained Reddit access token");
        *slot = Some(CachedToken { value: tr.access_token.clone(), expires_at: Instant::now() + ttl });
        Ok(tr.access_token)
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{API_BASE}{path}");
        let token = self.bearer()?;
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("raw_json", "1")])
            .query(query)
            .send()
            .with_context(|| format!("GET {path}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            bail!("GET {path} failed ({}): {}", status.as_u16(), body);
        }
        resp.json().with_context(|| format!("decoding {path}"))
    }

    /// Walk `after` cursors until `limit` posts are collected or the listing ends.
    fn paged_listing(&self, path: &str, base: &[(&str, String)], limit: usize) -> Result<Vec<PostSkeleton>> {
        collect_pages(limit, |page, after| {
            let mut query: Vec<(&str, String)> = base.to_vec();
            query.push(("limit", page.to_string()));
            if let Some(cursor) = after {
                query.push(("after", cursor.to_string()));
            }
            let listing = self.get_json(path, &query)?;
            Ok((parse_post_listing(&listing), listing_after(&listing)))
        })
    }

    /// One more-children round trip for `placeholder`, spliced into `forest`.
    fn expand_one(&self, post: &PostSkeleton, forest: &mut Vec<RawNode>, placeholder: &MorePlaceholder) -> Result<()> {
        let (requested, remainder) = split_more_request(placeholder);
        let query = [
            ("api_type", "json".to_string()),
            ("link_id", format!("t3_{}", post.id)),
            ("children", requested.join(",")),
        ];
        let body = self.get_json("/api/morechildren", &query)?;
        let things: Vec<(String, RawNode)> = body
            .pointer("/json/data/things")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("more-children response for {} has no things", placeholder.id))?
            .iter()
            .filter_map(|thing| {
                let parent = thing.pointer("/data/parent_id").and_then(Value::as_str)?.to_string();
                parse_thing(thing).map(|node| (parent, node))
            })
            .collect();
        if !splice_more(forest, &placeholder.id, things, remainder) {
            tracing::debug!(post_id = %post.id, more_id = %placeholder.id, "placeholder vanished before splice");
        }
        Ok(())
    }
}

impl ForumSource for RedditClient {
    fn fetch_post(&self, id: &str) -> Result<PostSkeleton> {
        let listing = self.get_json(&format!("/by_id/t3_{id}"), &[])?;
        parse_post_listing(&listing)
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("post {id} not found"))
    }

    fn search(&self, subreddit: &str, query: &str, limit: usize) -> Result<Vec<PostSkeleton>> {
        let base = [
            ("q", query.to_string()),
            ("restrict_sr", "1".to_string()),
            ("sort", "relevance".to_string()),
        ];
        self.paged_listing(&format!("/r/{subreddit}/search"), &base, limit)
    }

    fn top(&self, subreddit: &str, window: TimeWindow, limit: usize) -> Result<Vec<PostSkeleton>> {
        let base = [("t", window.as_str().to_string())];
        self.paged_listing(&format!("/r/{subreddit}/top"), &base, limit)
    }

    fn comment_forest(&self, post: &PostSkeleton) -> Result<Vec<RawNode>> {
        let body = self.get_json(&format!("/comments/{}", post.id), &[("sort", "top".to_string())])?;
        // [post listing, comment listing]
        let comments = body
            .get(1)
            .ok_or_else(|| anyhow!("comment response for {} has no comment listing", post.id))?;
        Ok(parse_comment_listing(comments))
    }

    fn expand_more(
        &self,
        post: &PostSkeleton,
        forest: &mut Vec<RawNode>,
        budget: usize,
        max_depth: u32,
    ) -> Result<usize> {
        let mut calls = 0usize;
        while calls < budget {
            let Some(next) = pending_more(forest, max_depth).into_iter().next() else {
                break;
            };
            calls += 1;
            self.expand_one(post, forest, &next.placeholder)?;
        }
        tracing::debug!(post_id = %post.id, calls, "expanded load-more placeholders");
        Ok(calls)
    }
}
