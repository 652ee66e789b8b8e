//! Lexical cleanup of model output before execution.

use regex::Regex;
use std::sync::OnceLock;

const FENCE: &str = "```";

/// Words that open a statement and so can never be a fence language tag.
const STATEMENT_KEYWORDS: [&str; 4] = ["SELECT", "WITH", "VALUES", "TABLE"];

fn language_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_+-]+)(?:[ \t]*\r?\n|[ \t]+)").expect("valid fence pattern")
    })
}

/// Strip code fences and one matching pair of outer quotes, then collapse
/// whitespace runs to single spaces.
///
/// Fences and quotes may nest in either order. Purely lexical: the result
/// may still be invalid SQL.
pub fn sanitize_sql(raw: &str) -> String {
    let mut text = raw.trim();
    let mut unquoted = false;

    loop {
        let before = text.len();
        text = strip_fences(text);
        if !unquoted {
            let inner = strip_quote_pair(text);
            unquoted = inner.len() != text.len();
            text = inner;
        }
        if text.len() == before {
            break;
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_fences(text: &str) -> &str {
    let text = match text.strip_prefix(FENCE) {
        Some(rest) => strip_language_tag(rest).trim(),
        None => text,
    };
    match text.strip_suffix(FENCE) {
        Some(rest) => rest.trim(),
        None => text,
    }
}

fn strip_language_tag(text: &str) -> &str {
    let Some(caps) = language_tag().captures(text) else {
        return text;
    };
    let tag = &caps[1];
    if STATEMENT_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(tag))
    {
        return text;
    }
    &text[caps[0].len()..]
}

fn strip_quote_pair(text: &str) -> &str {
    for quote in ['"', '\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return text[1..text.len() - 1].trim();
        }
    }
    text
}
