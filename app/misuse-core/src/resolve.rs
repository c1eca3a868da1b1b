//! Placeholder substitution.
//!
//! Templates may contain `%(token)s` markers and `%%` for a literal `%`.
//! Any other `%` is copied through unchanged, so regular expressions and
//! flag values need no escaping.

use crate::error::{HarnessError, Result};
use crate::fixture::FixtureSnapshot;
use crate::token::Placeholder;

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Placeholder),
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        literal.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('%') {
            literal.push('%');
            rest = stripped;
        } else if let Some(body) = after.strip_prefix('(') {
            let Some(end) = body.find(")s") else {
                return Err(HarnessError::MalformedTemplate(template.to_string()));
            };
            let token = body[..end].parse::<Placeholder>()?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Token(token));
            rest = &body[end + 2..];
        } else {
            literal.push('%');
            rest = after;
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Lists the tokens a template references, in order of appearance.
///
/// Fails with `UnknownToken` or `MalformedTemplate`; used to reject bad
/// case definitions before any fixture exists.
pub fn scan(template: &str) -> Result<Vec<Placeholder>> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Token(token) => Some(token),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Substitutes every marker in `template` with its snapshot value.
pub fn resolve(template: &str, snapshot: &FixtureSnapshot) -> Result<String> {
    substitute(template, snapshot, |value| value.to_string())
}

/// Like [`resolve`], but escapes substituted values for use inside a regex.
///
/// The surrounding pattern text is left untouched, so `No such image: %(absent-image-reference)s`
/// matches the literal reference even though it contains `.`, `/` and `:`.
pub fn resolve_pattern(template: &str, snapshot: &FixtureSnapshot) -> Result<String> {
    substitute(template, snapshot, regex::escape)
}

fn substitute(
    template: &str,
    snapshot: &FixtureSnapshot,
    render: impl Fn(&str) -> String,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Token(token) => {
                let value = snapshot
                    .get(token)
                    .ok_or(HarnessError::UnresolvedToken(token))?;
                out.push_str(&render(value));
            }
        }
    }
    Ok(out)
}
