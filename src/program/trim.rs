// src/program/trim.rs — Reduce a raw model reply to a function body
//
// Models answer with prose, fenced code, a repeated `def` line, extra helper
// functions after the target... Only the indented body of the first function
// survives.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

/// Trim a sample to an indented function body. `None` if nothing usable is left.
pub fn trim_sample(sample: &str) -> Option<String> {
    let code = extract_code(sample);
    let lines: Vec<&str> = code.lines().collect();

    let start = skip_def_header(&lines);
    let mut body: Vec<String> = lines[start..].iter().map(|l| l.to_string()).collect();

    while body.first().is_some_and(|l| l.trim().is_empty()) {
        body.remove(0);
    }
    let first = body.first()?;

    // A body returned without indentation gets indented as a block
    if first.len() == first.trim_start().len() {
        body = body
            .into_iter()
            .map(|l| {
                if l.trim().is_empty() {
                    l
                } else {
                    format!("    {l}")
                }
            })
            .collect();
    }

    // The body ends at the first top-level line
    let end = body
        .iter()
        .position(|l| !l.trim().is_empty() && l.len() == l.trim_start().len())
        .unwrap_or(body.len());
    body.truncate(end);
    while body.last().is_some_and(|l| l.trim().is_empty()) {
        body.pop();
    }
    if body.is_empty() {
        return None;
    }

    Some(
        body.iter()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Pull code out of markdown fences. Prefers the first block that contains a
/// `def`; falls back to the raw text when there are no code blocks.
fn extract_code(sample: &str) -> String {
    if !sample.contains("```") {
        return sample.to_string();
    }

    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    for event in Parser::new(sample) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) => {
                current = Some(String::new());
            }
            Event::Text(text) => {
                if let Some(ref mut block) = current {
                    block.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }
            _ => {}
        }
    }

    blocks
        .iter()
        .find(|b| b.lines().any(|l| l.trim_start().starts_with("def ")))
        .or_else(|| blocks.first())
        .cloned()
        .unwrap_or_else(|| sample.to_string())
}

/// Index of the first line after the first `def ...:` header, or 0 when the
/// sample has no header.
fn skip_def_header(lines: &[&str]) -> usize {
    // Only a header that comes before any indented line counts
    let mut def_line = None;
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if line.trim_start().starts_with("def ") {
            def_line = Some(i);
            break;
        }
        if line.len() != line.trim_start().len() {
            return 0;
        }
    }
    let Some(def_line) = def_line else {
        return 0;
    };

    let mut depth = 0i32;
    for (i, line) in lines.iter().enumerate().skip(def_line) {
        for ch in line.chars() {
            match ch {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            }
        }
        if depth <= 0 && line.trim_end().ends_with(':') {
            return i + 1;
        }
    }
    lines.len()
}
