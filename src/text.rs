//! Markdown-to-plain-text normalization for titles, bodies, and comments,
//! plus the rough token estimate used to gate deep analysis.

use regex::Regex;
use std::sync::OnceLock;

struct Rules {
    quote: Regex,
    link: Regex,
    bold: Regex,
    italic: Regex,
    strike: Regex,
    inline_code: Regex,
    fence: Regex,
    indented_code: Regex,
    heading: Regex,
    rule: Regex,
    bullet: Regex,
    numbered: Regex,
    blank_runs: Regex,
    spaces: Regex,
}

static RULES: OnceLock<Rules> = OnceLock::new();

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("normalizer patterns are static and valid")
}

fn rules() -> &'static Rules {
    RULES.get_or_init(|| Rules {
        quote: re(r"(?m)^(?:&gt;|>).*$"),
        link: re(r"\[([^\]]+)\]\([^)]+\)"),
        bold: re(r"\*\*(.*?)\*\*"),
        italic: re(r"\*(.*?)\*"),
        strike: re(r"~~(.*?)~~"),
        inline_code: re(r"`([^`\n]+)`"),
        fence: re(r"```[\s\S]*?```"),
        indented_code: re(r"(?m)^(?: {4}|\t).*$"),
        heading: re(r"(?m)^#{1,6}[ \t]*"),
        rule: re(r"(?m)^[-*_]{3,}[ \t]*$"),
        bullet: re(r"(?m)^[ \t]*[*+-][ \t]+"),
        numbered: re(r"(?m)^[ \t]*\d+\.[ \t]+"),
        blank_runs: re(r"\n\s*\n"),
        spaces: re(r"[ \t]+"),
    })
}

#[inline]
fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// One pass of the rule set, in the order the rules depend on each other.
fn strip_once(text: &str) -> String {
    let r = rules();
    let s = r.quote.replace_all(text, "");
    let s = r.link.replace_all(&s, "$1");
    let s = r.bold.replace_all(&s, "$1");
    let s = r.italic.replace_all(&s, "$1");
    let s = r.strike.replace_all(&s, "$1");
    let s = r.inline_code.replace_all(&s, "$1");
    let s = r.fence.replace_all(&s, "");
    let s = r.indented_code.replace_all(&s, "");
    let s = r.heading.replace_all(&s, "");
    let s = r.rule.replace_all(&s, "");
    let s = r.bullet.replace_all(&s, "");
    let s = r.numbered.replace_all(&s, "");
    let s = r.blank_runs.replace_all(&s, "\n\n");
    let s = r.spaces.replace_all(&s, " ");
    s.trim().to_string()
}

/// Convert Reddit-flavored markdown to plain text.
///
/// Empty or whitespace-only input comes back unchanged. Everything else is
/// stripped of quotes, links, emphasis, code, headings, rules and list
/// markers, then whitespace is collapsed and trimmed.
///
/// Removing one marker can expose another (`- - item`, `**# title**`), so the
/// pass is repeated until the text stops changing. Every rule either shortens
/// the text or turns a tab into a space, so this terminates, and the result
/// is stable under a second call.
pub fn normalize(raw: &str) -> String {
    if is_blank(raw) {
        return raw.to_string();
    }
    let mut current = strip_once(raw);
    loop {
        if is_blank(&current) {
            return current;
        }
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Rough token count (about four characters per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}
