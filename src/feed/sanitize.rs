//! Cleanup of subreddit post bodies before they are sent to a chat.
//!
//! Reddit's Atom feed wraps every post in HTML and appends a footer of the form
//! `submitted by <a>/u/name</a> <a>[link]</a> <a>[comments]</a>`, with a few
//! entity fragments (`&#32;`, `&quot;`, `&#39;`) left over from double escaping.
//! [`sanitize_content`] strips the markup and those fragments and turns the
//! footer into a `submitted by:` label on its own paragraph.

use std::borrow::Cow;

/// Literal replacements applied to tag-stripped content, in priority order.
///
/// At a given position the first entry that matches wins, so `[link]` is
/// consumed whole before the bare `]` entry can see it.
pub const ARTIFACT_REPLACEMENTS: [(&str, &str); 8] = [
    ("&quot", ""),
    ("&#32", ""),
    (";", ""),
    ("[link]", ""),
    ("[comments", ""),
    ("submitted by", "\n\nsubmitted by: "),
    ("]", ""),
    ("&#39", ""),
];

/// The artifacts that are deleted outright. `submitted by` is relabelled
/// rather than removed, so it is not in this list.
pub const REMOVED_ARTIFACTS: [&str; 7] = [
    "&quot", "&#32", ";", "[link]", "[comments", "]", "&#39",
];

/// Strips markup and Reddit footer artifacts from a post body.
///
/// Never fails: empty or malformed input degrades to an empty or partial string.
pub fn sanitize_content(content: &str) -> String {
    let stripped = strip_tags(content);
    let mut cleaned = replace_once(&stripped, &ARTIFACT_REPLACEMENTS);

    // Deleting one artifact can splice its neighbours into another
    // (`&qu;ot` -> `&quot`). Each pass shrinks the string, so this terminates.
    while contains_removed_artifact(&cleaned) {
        cleaned = remove_artifacts(&cleaned);
    }

    cleaned
}

/// Removes `<...>` markup tags, keeping the text between them.
///
/// A `<` only opens a tag when followed by an ASCII letter, `/`, `!` or `?`;
/// otherwise it is kept as text (`1 < 2`). An unterminated tag swallows the
/// rest of the input.
pub fn strip_tags(input: &str) -> Cow<'_, str> {
    if !input.contains('<') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let opens_tag = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));

        if !opens_tag {
            out.push('<');
            rest = after;
            continue;
        }

        match after.find('>') {
            Some(close) => rest = &after[close + 1..],
            None => return Cow::Owned(out),
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}

/// Returns true if `s` still contains any artifact that sanitization deletes.
pub fn contains_removed_artifact(s: &str) -> bool {
    REMOVED_ARTIFACTS.iter().any(|artifact| s.contains(artifact))
}

fn remove_artifacts(s: &str) -> String {
    let removals: Vec<(&str, &str)> = REMOVED_ARTIFACTS.iter().map(|a| (*a, "")).collect();
    replace_once(s, &removals)
}

/// One left-to-right pass of literal, non-overlapping substitutions.
/// Replacement text is emitted as-is and never rescanned.
fn replace_once(input: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    'scan: while !rest.is_empty() {
        for &(from, to) in pairs {
            if let Some(tail) = rest.strip_prefix(from) {
                out.push_str(to);
                rest = tail;
                continue 'scan;
            }
        }

        // All patterns are ASCII, so advancing a whole char keeps us on a boundary.
        let Some(c) = rest.chars().next() else { break };
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}
