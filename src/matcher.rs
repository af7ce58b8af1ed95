//! Matching of command lines against fake registration patterns.

use regex::Regex;

/// Decides whether a fake registered under `pattern` applies to `command_line`.
pub trait CommandMatcher: Send + Sync {
    fn matches(&self, pattern: &str, command_line: &str) -> bool;
}

impl<F> CommandMatcher for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn matches(&self, pattern: &str, command_line: &str) -> bool {
        self(pattern, command_line)
    }
}

/// `*` matches any run of characters (including none and including
/// newlines); every other character is literal.
#[derive(Debug, Clone, Copy, Default)]
pub struct WildcardMatcher;

impl WildcardMatcher {
    fn to_regex(pattern: &str) -> Option<Regex> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("(?s)^{body}$")).ok()
    }
}

impl CommandMatcher for WildcardMatcher {
    fn matches(&self, pattern: &str, command_line: &str) -> bool {
        if pattern == command_line {
            return true;
        }
        if !pattern.contains('*') {
            return false;
        }
        match Self::to_regex(pattern) {
            Some(regex) => regex.is_match(command_line),
            None => {
                tracing::warn!("Ignoring unusable fake pattern '{}'", pattern);
                false
            }
        }
    }
}

/// Return the first entry whose pattern matches, in declaration order.
pub(crate) fn first_match<'a, T>(
    matcher: &dyn CommandMatcher,
    entries: &'a [(String, T)],
    command_line: &str,
) -> Option<(&'a str, &'a T)> {
    entries
        .iter()
        .find(|(pattern, _)| matcher.matches(pattern, command_line))
        .map(|(pattern, value)| (pattern.as_str(), value))
}
