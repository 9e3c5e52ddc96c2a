//! Raw shapes handed back by the forum source before tree assembly, plus
//! helpers that read them out of Reddit listing JSON and splice expanded
//! "load more" results back into a forest.

use serde_json::Value;

/// Submission fields known before any comment is fetched.
#[derive(Clone, Debug, PartialEq)]
pub struct PostSkeleton {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub url: String,
    pub subreddit: String,
    pub score: i64,
    pub num_comments: u64,
    pub created_utc: f64,
    /// Absolute permalink (`https://reddit.com/r/...`).
    pub permalink: String,
}

/// A comment exactly as the source returned it.
#[derive(Clone, Debug, PartialEq)]
pub struct RawComment {
    pub id: String,
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    pub created_utc: f64,
    pub replies: Vec<RawNode>,
}

/// Either a real comment or a "load more" placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum RawNode {
    Comment(RawComment),
    More(MorePlaceholder),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MorePlaceholder {
    pub id: String,
    /// Fullname of the parent (`t3_<post>` or `t1_<comment>`).
    pub parent_id: String,
    /// Ids of the hidden comments.
    pub children: Vec<String>,
    pub count: u64,
}

impl MorePlaceholder {
    /// "Continue this thread" stubs carry no child ids and cannot be expanded
    /// through the more-children endpoint.
    pub fn is_expandable(&self) -> bool {
        !self.children.is_empty()
    }
}

impl RawNode {
    pub fn id(&self) -> &str {
        match self {
            RawNode::Comment(c) => &c.id,
            RawNode::More(m) => &m.id,
        }
    }
}

const PERMALINK_HOST: &str = "https://reddit.com";

#[inline]
fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

#[inline]
fn i64_field(v: &Value, key: &str) -> i64 {
    v.get(key)
        .and_then(|x| x.as_i64().or_else(|| x.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

#[inline]
fn f64_field(v: &Value, key: &str) -> f64 {
    v.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Absolute permalink from the API's site-relative one.
pub fn absolute_permalink(relative: &str) -> String {
    if relative.starts_with("http://") || relative.starts_with("https://") {
        relative.to_string()
    } else {
        format!("{PERMALINK_HOST}{relative}")
    }
}

/// Parse the `data` object of a `t3` thing into a skeleton.
pub fn parse_post(data: &Value) -> Option<PostSkeleton> {
    let id = data.get("id")?.as_str()?.to_string();
    Some(PostSkeleton {
        id,
        title: str_field(data, "title"),
        selftext: str_field(data, "selftext"),
        url: str_field(data, "url"),
        subreddit: str_field(data, "subreddit"),
        score: i64_field(data, "score"),
        num_comments: data.get("num_comments").and_then(Value::as_u64).unwrap_or(0),
        created_utc: f64_field(data, "created_utc"),
        permalink: absolute_permalink(&str_field(data, "permalink")),
    })
}

/// Posts of a listing (`{"kind":"Listing","data":{"children":[...]}}`).
pub fn parse_post_listing(listing: &Value) -> Vec<PostSkeleton> {
    listing_children(listing)
        .iter()
        .filter(|thing| thing.get("kind").and_then(Value::as_str) == Some("t3"))
        .filter_map(|thing| thing.get("data").and_then(parse_post))
        .collect()
}

/// `after` cursor of a listing, if there is another page.
pub fn listing_after(listing: &Value) -> Option<String> {
    listing
        .pointer("/data/after")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Reddit serves at most this many items per listing page and accepts at most
/// this many ids per more-children call.
pub const PAGE_MAX: usize = 100;

/// Gather up to `limit` posts page by page. `fetch_page(size, after)` returns
/// one page and the cursor of the next; paging stops at the limit, on an
/// empty page, or when the cursor runs out or repeats.
pub fn collect_pages<F>(limit: usize, mut fetch_page: F) -> anyhow::Result<Vec<PostSkeleton>>
where
    F: FnMut(usize, Option<&str>) -> anyhow::Result<(Vec<PostSkeleton>, Option<String>)>,
{
    let mut out = Vec::new();
    let mut after: Option<String> = None;
    while out.len() < limit {
        let page = (limit - out.len()).min(PAGE_MAX);
        let (posts, next) = fetch_page(page, after.as_deref())?;
        if posts.is_empty() {
            break;
        }
        out.extend(posts);
        match next {
            Some(cursor) if after.as_deref() != Some(cursor.as_str()) => after = Some(cursor),
            _ => break,
        }
    }
    out.truncate(limit);
    Ok(out)
}

/// Ids to request in one more-children call for `placeholder`, plus the
/// trimmed placeholder that stands in for the ids left over.
pub fn split_more_request(placeholder: &MorePlaceholder) -> (Vec<String>, Option<MorePlaceholder>) {
    let take = placeholder.children.len().min(PAGE_MAX);
    let (requested, rest) = placeholder.children.split_at(take);
    let remainder = (!rest.is_empty()).then(|| MorePlaceholder {
        id: placeholder.id.clone(),
        parent_id: placeholder.parent_id.clone(),
        children: rest.to_vec(),
        count: placeholder.count.saturating_sub(take as u64),
    });
    (requested.to_vec(), remainder)
}

fn listing_children(listing: &Value) -> &[Value] {
    listing
        .pointer("/data/children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Parse one `t1` / `more` thing. Other kinds yield `None`.
pub fn parse_thing(thing: &Value) -> Option<RawNode> {
    let data = thing.get("data")?;
    match thing.get("kind").and_then(Value::as_str)? {
        "t1" => {
            let replies = match data.get("replies") {
                // An empty reply set is reported as "" rather than a listing.
                Some(listing @ Value::Object(_)) => parse_comment_listing(listing),
                _ => Vec::new(),
            };
            Some(RawNode::Comment(RawComment {
                id: data.get("id")?.as_str()?.to_string(),
                author: data.get("author").and_then(Value::as_str).map(str::to_string),
                body: str_field(data, "body"),
                score: i64_field(data, "score"),
                created_utc: f64_field(data, "created_utc"),
                replies,
            }))
        }
        "more" => Some(RawNode::More(MorePlaceholder {
            id: str_field(data, "id"),
            parent_id: str_field(data, "parent_id"),
            children: data
                .get("children")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            count: data.get("count").and_then(Value::as_u64).unwrap_or(0),
        })),
        _ => None,
    }
}

/// Comment forest of a listing, in source order.
pub fn parse_comment_listing(listing: &Value) -> Vec<RawNode> {
    listing_children(listing).iter().filter_map(parse_thing).collect()
}

/// A placeholder worth expanding, with the depth its hidden comments sit at.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingMore {
    pub placeholder: MorePlaceholder,
    pub depth: u32,
}

/// Expandable placeholders in breadth-first order (shallowest first),
/// skipping any whose hidden comments would sit deeper than `max_depth`.
pub fn pending_more(forest: &[RawNode], max_depth: u32) -> Vec<PendingMore> {
    let mut out = Vec::new();
    let mut level: Vec<&[RawNode]> = vec![forest];
    let mut depth = 0u32;
    while !level.is_empty() && depth <= max_depth {
        let mut next: Vec<&[RawNode]> = Vec::new();
        for nodes in level {
            for node in nodes {
                match node {
                    RawNode::More(m) if m.is_expandable() => {
                        out.push(PendingMore { placeholder: m.clone(), depth });
                    }
                    RawNode::More(_) => {}
                    RawNode::Comment(c) => {
                        if !c.replies.is_empty() {
                            next.push(&c.replies);
                        }
                    }
                }
            }
        }
        level = next;
        depth += 1;
    }
    out
}

/// Replace the placeholder `more_id` with `things`, a flat list of comments
/// (and further placeholders) as the more-children endpoint returns them.
/// Items are attached under their `parent_id`; items whose parent cannot be
/// found are attached where the placeholder stood. A non-empty `remainder`
/// keeps a trimmed placeholder in place for ids that were not requested.
/// Returns false when the placeholder is no longer in the forest.
pub fn splice_more(
    forest: &mut Vec<RawNode>,
    more_id: &str,
    things: Vec<(String, RawNode)>,
    remainder: Option<MorePlaceholder>,
) -> bool {
    let Some(slot) = find_more(forest, more_id) else {
        return false;
    };
    let at = slot.iter().position(|n| matches!(n, RawNode::More(m) if m.id == more_id));
    let Some(at) = at else { return false };

    // Items whose parent is another item of this batch nest under it; the
    // rest land at the placeholder's position, in returned order.
    let mut roots: Vec<RawNode> = Vec::new();
    for (parent_fullname, node) in things {
        let parent_id = parent_fullname.split_once('_').map(|(_, id)| id).unwrap_or(&parent_fullname);
        if let Err(node) = attach_under(&mut roots, parent_id, node) {
            roots.push(node);
        }
    }
    if let Some(rest) = remainder {
        roots.push(RawNode::More(rest));
    }
    let tail = slot.split_off(at + 1);
    slot.pop();
    slot.extend(roots);
    slot.extend(tail);
    true
}

/// Push `node` under the comment `parent_id`; hands the node back if no such
/// comment exists in `nodes`.
fn attach_under(nodes: &mut [RawNode], parent_id: &str, node: RawNode) -> Result<(), RawNode> {
    let mut node = node;
    for n in nodes.iter_mut() {
        if let RawNode::Comment(c) = n {
            if c.id == parent_id {
                c.replies.push(node);
                return Ok(());
            }
            node = match attach_under(&mut c.replies, parent_id, node) {
                Ok(()) => return Ok(()),
                Err(back) => back,
            };
        }
    }
    Err(node)
}

/// The sibling list that currently holds placeholder `more_id`.
fn find_more<'a>(nodes: &'a mut Vec<RawNode>, more_id: &str) -> Option<&'a mut Vec<RawNode>> {
    let here = nodes.iter().any(|n| matches!(n, RawNode::More(m) if m.id == more_id));
    if here {
        return Some(nodes);
    }
    for n in nodes.iter_mut() {
        if let RawNode::Comment(c) = n {
            if let Some(found) = find_more(&mut c.replies, more_id) {
                return Some(found);
            }
        }
    }
    None
}
