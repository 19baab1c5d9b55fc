//! Ordered `pattern -> replacement` rewrites for authored source entries.
//!
//! Each pattern may hold one `*`; the replacement may reuse it at most once. `${webRoot}`
//! in either side is substituted before the rule is compiled. Rules are tried in
//! declaration order and the first case-insensitive match wins.

use regex::{Regex, RegexBuilder};
use tracing::{trace, warn};

use crate::paths;

const WEB_ROOT_TOKEN: &str = "${webRoot}";

#[derive(Debug, Clone)]
struct OverrideRule {
    pattern: String,
    matcher: Regex,
    replacement: String,
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    rules: Vec<OverrideRule>,
}

impl PathOverrides {
    pub fn new(rules: &[(String, String)], web_root: Option<&str>) -> Self {
        let compiled = rules
            .iter()
            .filter_map(|(pattern, replacement)| compile(pattern, replacement, web_root))
            .collect();
        Self { rules: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Rewritten path for the first matching rule, or `None` when no rule applies.
    pub fn apply(&self, source: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            let captures = rule.matcher.captures(source)?;
            let captured = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let rewritten = rule.replacement.replacen('*', captured, 1);
            trace!(
                target: "source-maps",
                pattern = %rule.pattern,
                source,
                %rewritten,
                "path override applied"
            );
            Some(paths::normalize(&rewritten))
        })
    }
}

fn substitute_web_root(value: &str, web_root: Option<&str>) -> Option<String> {
    if !value.contains(WEB_ROOT_TOKEN) {
        return Some(value.to_string());
    }
    let web_root = web_root?;
    Some(value.replace(WEB_ROOT_TOKEN, web_root.trim_end_matches(['/', '\\'])))
}

fn compile(pattern: &str, replacement: &str, web_root: Option<&str>) -> Option<OverrideRule> {
    let pattern_wildcards = pattern.matches('*').count();
    let replacement_wildcards = replacement.matches('*').count();

    if pattern_wildcards > 1 {
        warn!(target: "source-maps", pattern, "override pattern has more than one '*', skipping");
        return None;
    }
    if replacement_wildcards > pattern_wildcards {
        warn!(
            target: "source-maps",
            pattern,
            replacement,
            "override replacement uses more '*' than its pattern, skipping"
        );
        return None;
    }

    let Some(expanded_pattern) = substitute_web_root(pattern, web_root) else {
        warn!(target: "source-maps", pattern, "override uses ${{webRoot}} but no webRoot is set, skipping");
        return None;
    };
    let Some(expanded_replacement) = substitute_web_root(replacement, web_root) else {
        warn!(target: "source-maps", replacement, "override uses ${{webRoot}} but no webRoot is set, skipping");
        return None;
    };
    if !paths::is_absolute(&expanded_replacement) {
        warn!(
            target: "source-maps",
            pattern,
            replacement = %expanded_replacement,
            "override replacement is not an absolute path, skipping"
        );
        return None;
    }

    let escaped = regex::escape(&expanded_pattern).replace(r"\*", "(.*)");
    let matcher = match RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
    {
        Ok(matcher) => matcher,
        Err(err) => {
            warn!(target: "source-maps", pattern, %err, "override pattern does not compile, skipping");
            return None;
        }
    };

    Some(OverrideRule {
        pattern: pattern.to_string(),
        matcher,
        replacement: expanded_replacement,
    })
}
