use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.NAME }}` and `{{ env.NAME | default("value") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Expand environment placeholders in raw TOML text
///
/// Comment lines are copied through untouched so a commented-out
/// secret never has to be present in the environment.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut expanded = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            expanded.push(line.to_owned());
        } else {
            expanded.push(expand_line(line)?);
        }
    }

    let mut output = expanded.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut output = String::with_capacity(line.len());
    let mut cursor = 0;

    for captures in placeholder().captures_iter(line) {
        let Some(whole) = captures.get(0) else {
            continue;
        };

        output.push_str(&line[cursor..whole.start()]);
        output.push_str(&resolve(&captures)?);
        cursor = whole.end();
    }

    output.push_str(&line[cursor..]);
    Ok(output)
}

fn resolve(captures: &Captures<'_>) -> Result<String, String> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let default = captures.get(2).map(|m| m.as_str());

    let Some(var) = key.strip_prefix("env.").filter(|name| !name.is_empty() && !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var}`")),
    }
}
