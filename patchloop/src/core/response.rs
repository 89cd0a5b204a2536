//! Response parsing: extract structured file edits from generated text.
//!
//! Generated responses arrive in one of several loosely-structured formats.
//! Format handlers are tried in fixed precedence order, each returning "no
//! match" or a structured result:
//!
//! 1. A fenced `json` block with `{explanation, changes: [...]}`. If present
//!    and valid it is used verbatim, even when `changes` is empty.
//! 2. Tagged sections: `### File: `path`` headings with an optional
//!    `### Action:` line and one fenced code block.
//! 3. Loose sections: the same shape without backticks around the path.
//! 4. Delete-only sections: `### File:` + `### Action: delete` with no code
//!    block, merged only for paths not already claimed.
//!
//! Parsing is total: malformed input degrades to an empty edit list, which the
//! orchestrator treats as a retryable failure. Parsing never validates
//! semantics, only shape.

use std::collections::HashSet;
use std::sync::LazyLock;

use jsonschema::Draft;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

use crate::core::path::normalize_edit_path;
use crate::core::types::{EditAction, FileEdit, ParseResult, default_action};

const RESPONSE_SCHEMA: &str = include_str!("../../schemas/response.schema.json");

static JSON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)\n```").unwrap());

static EXPLANATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)##+\s*explanation\s*\n(.*?)(?:\n##|\z)").unwrap());

static TAGGED_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)###?\s*File:\s*`([^`]+)`\s*\n(?:###?\s*Action:\s*(\w+)\s*\n)?```\w*\s*\n(.*?)```")
        .unwrap()
});

static LOOSE_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:###?\s*)?File:\s*([^\n`]+)\s*\n(?:Action:\s*(\w+)\s*\n)?```\w*\s*\n(.*?)```")
        .unwrap()
});

static DELETE_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)###?\s*File:\s*`?([^`\n]+?)`?\s*\n###?\s*Action:\s*delete").unwrap()
});

/// Parse one generated response into an explanation and an ordered edit list.
///
/// Never fails: unrecognized input yields a [`ParseResult`] with empty
/// `edits`. Paths are normalized; absolute paths and `..` escapes are
/// dropped. At most one edit per path survives, first occurrence wins.
pub fn parse_response(text: &str) -> ParseResult {
    if let Some(block) = parse_json_block(text) {
        return finalize(block.explanation, block.changes);
    }

    let explanation = extract_explanation(text);
    let mut edits = parse_tagged_sections(text);
    if edits.is_empty() {
        edits = parse_loose_sections(text);
    }
    // Delete-only headings are merged last so content-bearing entries for the
    // same path win during dedup.
    edits.extend(parse_delete_sections(text));

    finalize(explanation, edits)
}

/// Structured change proposal embedded in a fenced `json` block.
#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    explanation: String,
    changes: Vec<FileEdit>,
}

fn block_validator() -> &'static jsonschema::Validator {
    static VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
        let schema: Value = serde_json::from_str(RESPONSE_SCHEMA)
            .expect("embedded response schema should be valid json");
        jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .expect("embedded response schema should compile")
    });
    &VALIDATOR
}

fn parse_json_block(text: &str) -> Option<ResponseBlock> {
    let caps = JSON_BLOCK_RE.captures(text)?;
    let raw = caps.get(1)?.as_str();
    let value: Value = serde_json::from_str(raw).ok()?;
    if !block_validator().is_valid(&value) {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn extract_explanation(text: &str) -> String {
    EXPLANATION_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn parse_tagged_sections(text: &str) -> Vec<FileEdit> {
    TAGGED_FILE_RE
        .captures_iter(text)
        .map(|caps| edit_from_captures(&caps))
        .collect()
}

fn parse_loose_sections(text: &str) -> Vec<FileEdit> {
    LOOSE_FILE_RE
        .captures_iter(text)
        .map(|caps| edit_from_captures(&caps))
        .collect()
}

fn parse_delete_sections(text: &str) -> Vec<FileEdit> {
    DELETE_FILE_RE
        .captures_iter(text)
        .map(|caps| FileEdit {
            path: caps[1].trim().to_string(),
            action: EditAction::Delete,
            content: String::new(),
        })
        .collect()
}

/// Build an edit from a File/Action/code-block capture (groups 1..=3).
fn edit_from_captures(caps: &Captures<'_>) -> FileEdit {
    let path = caps[1].trim().to_string();
    let action = caps
        .get(2)
        .map(|m| EditAction::from(m.as_str().to_string()))
        .unwrap_or_else(default_action);
    let content = strip_one_trailing_newline(&caps[3]);
    FileEdit {
        path,
        action,
        content,
    }
}

/// Exact inverse of the write-time newline append: strip at most one `\n`.
fn strip_one_trailing_newline(content: &str) -> String {
    content.strip_suffix('\n').unwrap_or(content).to_string()
}

/// Normalize paths and dedup by path, first occurrence wins.
fn finalize(explanation: String, edits: Vec<FileEdit>) -> ParseResult {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(edits.len());
    for mut edit in edits {
        let Some(path) = normalize_edit_path(&edit.path) else {
            continue;
        };
        if !seen.insert(path.clone()) {
            continue;
        }
        edit.path = path;
        unique.push(edit);
    }
    ParseResult {
        explanation,
        edits: unique,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_block_takes_precedence_over_tagged_sections() {
        let text = r#"Some preamble.

```json
{
  "explanation": "from json",
  "changes": [
    {"path": "src/a.rs", "action": "create", "content": "fn a() {}"}
  ]
}
```

## Explanation

from markdown

### File: `src/b.rs`
### Action: create
```rust
fn b() {}
```
"#;
        let result = parse_response(text);
        assert_eq!(result.explanation, "from json");
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].path, "src/a.rs");
        assert_eq!(result.edits[0].action, EditAction::Create);
        assert_eq!(result.edits[0].content, "fn a() {}");
    }

    #[test]
    fn structured_block_with_empty_changes_still_wins() {
        let text = r#"```json
{"explanation": "nothing to do", "changes": []}
```

### File: `src/b.rs`
```rust
fn b() {}
```
"#;
        let result = parse_response(text);
        assert_eq!(result.explanation, "nothing to do");
        assert!(result.edits.is_empty());
    }

    #[test]
    fn invalid_json_block_falls_through_to_tagged_sections() {
        let text = "```json\n{not valid json\n```\n\n### File: `a.txt`\n```\nhi\n```\n";
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].path, "a.txt");
    }

    #[test]
    fn json_block_failing_schema_falls_through() {
        // `changes` must be an array of objects with a `path`.
        let text = "```json\n{\"changes\": 42}\n```\n\n### File: `a.txt`\n```\nhi\n```\n";
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].path, "a.txt");
    }

    #[test]
    fn tagged_sections_preserve_order_and_paths() {
        let text = r#"## Explanation

Adds three files.

## Changes

### File: `src/one.rs`
### Action: create
```rust
pub fn one() {}
```

### File: `src/two.rs`
### Action: modify
```rust
pub fn two() {}
```

### File: `docs/three.md`
```markdown
# three
```
"#;
        let result = parse_response(text);
        assert_eq!(result.explanation, "Adds three files.");
        let paths: Vec<&str> = result.edits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src/one.rs", "src/two.rs", "docs/three.md"]);
        assert_eq!(result.edits[0].action, EditAction::Create);
        assert_eq!(result.edits[1].action, EditAction::Modify);
        // No Action line defaults to modify.
        assert_eq!(result.edits[2].action, EditAction::Modify);
    }

    #[test]
    fn create_scenario_parses_single_edit() {
        let text = "### File: `a.txt`\n### Action: create\n```\nhello\n```\n";
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].path, "a.txt");
        assert_eq!(result.edits[0].action, EditAction::Create);
        assert_eq!(result.edits[0].content, "hello");
    }

    #[test]
    fn action_tokens_match_case_insensitively() {
        let text = "### File: `a.txt`\n### Action: CREATE\n```\nhello\n```\n";
        let result = parse_response(text);
        assert_eq!(result.edits[0].action, EditAction::Create);
    }

    #[test]
    fn unknown_action_token_is_preserved_verbatim() {
        let text = "### File: `a.txt`\n### Action: Rename\n```\nhello\n```\n";
        let result = parse_response(text);
        assert_eq!(
            result.edits[0].action,
            EditAction::Other("Rename".to_string())
        );
    }

    #[test]
    fn block_content_keeps_interior_trailing_newlines() {
        // Only the final fence newline is stripped; a deliberate blank last
        // line survives as a single trailing newline.
        let text = "### File: `a.txt`\n```\nline\n\n```\n";
        let result = parse_response(text);
        assert_eq!(result.edits[0].content, "line\n");
    }

    #[test]
    fn loose_sections_parse_when_tagged_absent() {
        let text = "File: src/util.py\nAction: create\n```python\ndef f():\n    pass\n```\n";
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].path, "src/util.py");
        assert_eq!(result.edits[0].action, EditAction::Create);
        assert_eq!(result.edits[0].content, "def f():\n    pass");
    }

    #[test]
    fn loose_sections_ignored_when_tagged_present() {
        let text = r#"### File: `a.txt`
```
tagged
```

File: b.txt
```
loose
```
"#;
        let result = parse_response(text);
        // The tagged pass yielded an edit, so the loose pass never runs; the
        // loose heading is not picked up as a second edit.
        let paths: Vec<&str> = result.edits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt"]);
    }

    #[test]
    fn delete_only_sections_merge_for_unseen_paths() {
        let text = r#"### File: `src/keep.rs`
### Action: modify
```rust
pub fn keep() {}
```

### File: `src/old.rs`
### Action: delete
"#;
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 2);
        assert_eq!(result.edits[0].path, "src/keep.rs");
        assert_eq!(result.edits[1].path, "src/old.rs");
        assert_eq!(result.edits[1].action, EditAction::Delete);
        assert_eq!(result.edits[1].content, "");
    }

    #[test]
    fn content_bearing_entry_beats_delete_only_heading() {
        let text = r#"### File: `a.txt`
### Action: delete

### File: `a.txt`
### Action: create
```
replacement
```
"#;
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].action, EditAction::Create);
        assert_eq!(result.edits[0].content, "replacement");
    }

    #[test]
    fn duplicate_paths_keep_first_occurrence() {
        let text = r#"### File: `a.txt`
```
first
```

### File: `a.txt`
```
second
```
"#;
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].content, "first");
    }

    #[test]
    fn escaping_and_absolute_paths_are_dropped() {
        let text = r#"### File: `../outside.txt`
```
nope
```

### File: `/etc/passwd`
```
nope
```

### File: `./inside.txt`
```
ok
```
"#;
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].path, "inside.txt");
    }

    #[test]
    fn unrecognizable_text_yields_empty_edits() {
        let result = parse_response("I could not determine what to change.");
        assert!(result.edits.is_empty());
        assert_eq!(result.explanation, "");
    }

    #[test]
    fn explanation_heading_is_extracted_and_trimmed() {
        let text = "## Explanation\n\nBecause reasons.\n\n## Changes\n\n### File: `a.txt`\n```\nhi\n```\n";
        let result = parse_response(text);
        assert_eq!(result.explanation, "Because reasons.");
    }

    #[test]
    fn json_block_dedups_and_sanitizes_paths() {
        let text = r#"```json
{
  "changes": [
    {"path": "a.txt", "action": "create", "content": "one"},
    {"path": "a.txt", "action": "modify", "content": "two"},
    {"path": "../escape.txt", "action": "create", "content": "bad"}
  ]
}
```
"#;
        let result = parse_response(text);
        assert_eq!(result.edits.len(), 1);
        assert_eq!(result.edits[0].content, "one");
    }
}
