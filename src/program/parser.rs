// src/program/parser.rs — Indentation-based parser for Python-style programs
//
// Recognizes top-level `def` blocks; everything before the first one is the
// preface. Top-level comments between functions are dropped. Any other
// top-level statement after the first function makes the text unparseable.

use super::{Function, Program};

/// Parse a full program. `None` when the text has no function, a function with
/// an empty body, unbalanced brackets/quotes, or stray top-level statements.
pub fn text_to_program(text: &str) -> Option<Program> {
    if !is_balanced(text) {
        return None;
    }

    let lines: Vec<&str> = text.lines().collect();
    let first_def = lines.iter().position(|l| is_top_level_def(l))?;

    let preface = lines[..first_def].join("\n").trim_end().to_string();

    let mut functions = Vec::new();
    let mut i = first_def;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() || (indent_of(line) == 0 && line.starts_with('#')) {
            i += 1;
            continue;
        }
        if !is_top_level_def(line) {
            return None;
        }
        let (function, next) = parse_function(&lines, i)?;
        functions.push(function);
        i = next;
    }

    Some(Program { preface, functions })
}

/// Parse a program and return its first function.
pub fn text_to_function(text: &str) -> Option<Function> {
    text_to_program(text)?.functions.into_iter().next()
}

/// Parse the function starting at `start`. Returns it and the index of the
/// first line after its body.
fn parse_function(lines: &[&str], start: usize) -> Option<(Function, usize)> {
    // The header may span several lines until the closing `:` at depth 0
    let mut header = String::new();
    let mut i = start;
    loop {
        let line = lines.get(i)?;
        if !header.is_empty() {
            header.push(' ');
        }
        header.push_str(line.trim());
        i += 1;
        if bracket_depth(&header) == 0 && header.trim_end().ends_with(':') {
            break;
        }
    }
    let (name, args, return_type) = parse_header(&header)?;

    // Body: every following line that is blank or indented
    let body_start = i;
    while i < lines.len() && (lines[i].trim().is_empty() || indent_of(lines[i]) > 0) {
        i += 1;
    }
    let mut body_lines: Vec<&str> = lines[body_start..i].to_vec();
    while body_lines.first().is_some_and(|l| l.trim().is_empty()) {
        body_lines.remove(0);
    }
    while body_lines.last().is_some_and(|l| l.trim().is_empty()) {
        body_lines.pop();
    }

    let (docstring, rest) = split_docstring(&body_lines);
    let body = rest
        .iter()
        .skip_while(|l| l.trim().is_empty())
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    if body.trim().is_empty() {
        return None;
    }

    Some((
        Function {
            name,
            args,
            return_type,
            docstring,
            body,
        },
        i,
    ))
}

/// `def name(args) -> ret:` → (name, args, ret)
fn parse_header(header: &str) -> Option<(String, String, Option<String>)> {
    let rest = header.strip_prefix("def ")?.trim_start();
    let open = rest.find('(')?;
    let name = rest[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let mut depth = 0i32;
    let mut close = None;
    for (offset, ch) in rest[open..].char_indices() {
        let idx = open + offset;
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;
    let args = rest[open + 1..close]
        .trim()
        .replace("( ", "(")
        .replace(" )", ")")
        .trim_end_matches(',')
        .trim()
        .to_string();

    let tail = rest[close + 1..].trim().strip_suffix(':')?.trim();
    let return_type = if tail.is_empty() {
        None
    } else {
        Some(tail.strip_prefix("->")?.trim().to_string())
    };

    Some((name.to_string(), args, return_type))
}

/// Split a leading docstring off the body lines.
fn split_docstring<'a>(body: &[&'a str]) -> (Option<String>, Vec<&'a str>) {
    let Some(first) = body.first() else {
        return (None, Vec::new());
    };
    let trimmed = first.trim_start();
    let quote = if trimmed.starts_with("\"\"\"") {
        "\"\"\""
    } else if trimmed.starts_with("'''") {
        "'''"
    } else {
        return (None, body.to_vec());
    };

    let after_open = &trimmed[3..];
    if let Some(end) = after_open.find(quote) {
        // Single-line docstring; anything after the closing quotes is not supported
        if !after_open[end + 3..].trim().is_empty() {
            return (None, body.to_vec());
        }
        return (Some(after_open[..end].to_string()), body[1..].to_vec());
    }

    let mut doc = String::from(after_open);
    for (offset, line) in body[1..].iter().enumerate() {
        doc.push('\n');
        if let Some(end) = line.find(quote) {
            doc.push_str(&line[..end]);
            return (Some(doc), body[offset + 2..].to_vec());
        }
        doc.push_str(line);
    }
    // Unterminated docstring: is_balanced would have rejected it already
    (None, body.to_vec())
}

fn is_top_level_def(line: &str) -> bool {
    line.starts_with("def ")
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Net bracket depth of a single header string, ignoring string literals.
fn bracket_depth(text: &str) -> i32 {
    let mut depth = 0;
    let mut in_str: Option<char> = None;
    for ch in text.chars() {
        match in_str {
            Some(q) if ch == q => in_str = None,
            Some(_) => {}
            None => match ch {
                '"' | '\'' => in_str = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            },
        }
    }
    depth
}

/// True when every bracket is closed in order and every string literal
/// (including triple-quoted ones) is terminated. Comments are skipped.
pub fn is_balanced(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut stack: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '"' | '\'' => {
                let triple = i + 2 < chars.len() && chars[i + 1] == ch && chars[i + 2] == ch;
                if triple {
                    i += 3;
                    loop {
                        if i + 2 >= chars.len() {
                            return false;
                        }
                        if chars[i] == '\\' {
                            i += 2;
                            continue;
                        }
                        if chars[i] == ch && chars[i + 1] == ch && chars[i + 2] == ch {
                            i += 3;
                            break;
                        }
                        i += 1;
                    }
                } else {
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None | Some('\n') => return false,
                            Some('\\') => i += 2,
                            Some(c) if *c == ch => {
                                i += 1;
                                break;
                            }
                            Some(_) => i += 1,
                        }
                    }
                }
                continue;
            }
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
        i += 1;
    }

    stack.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_preface_and_functions() {
        let text = "import math\nSCALE = 2\n\ndef helper(x):\n    return x * SCALE\n\n\ndef main(a, b) -> int:\n    return helper(a) + b\n";
        let program = text_to_program(text).unwrap();
        assert_eq!(program.preface, "import math\nSCALE = 2");
        assert_eq!(program.functions.len(), 2);
        assert_eq!(program.functions[0].name, "helper");
        assert_eq!(program.functions[0].return_type, None);
        assert_eq!(program.functions[1].name, "main");
        assert_eq!(program.functions[1].args, "a, b");
        assert_eq!(program.functions[1].return_type.as_deref(), Some("int"));
        assert_eq!(program.functions[1].body, "    return helper(a) + b");
    }

    #[test]
    fn test_multiline_header() {
        let text = "def f(\n    a: int,\n    b: int,\n) -> int:\n    return a + b\n";
        let f = text_to_function(text).unwrap();
        assert_eq!(f.name, "f");
        assert_eq!(f.args, "a: int, b: int");
        assert_eq!(f.return_type.as_deref(), Some("int"));
    }

    #[test]
    fn test_multiline_docstring_roundtrip() {
        let text = "def f(x):\n    \"\"\"First line.\n\n    More detail.\n    \"\"\"\n    return x\n";
        let f = text_to_function(text).unwrap();
        assert_eq!(
            f.docstring.as_deref(),
            Some("First line.\n\n    More detail.\n    ")
        );
        assert_eq!(f.body, "    return x");
        assert_eq!(f.to_string(), text);
    }

    #[test]
    fn test_single_quoted_docstring() {
        let text = "def f(x):\n    '''Doc.'''\n    return x\n";
        let f = text_to_function(text).unwrap();
        assert_eq!(f.docstring.as_deref(), Some("Doc."));
    }

    #[test]
    fn test_docstring_only_function_rejected() {
        assert!(text_to_function("def f(x):\n    \"\"\"Only docs.\"\"\"\n").is_none());
    }

    #[test]
    fn test_no_function() {
        assert!(text_to_program("x = 1\nprint(x)\n").is_none());
        assert!(text_to_function("").is_none());
    }

    #[test]
    fn test_stray_top_level_statement_rejected() {
        let text = "def f(x):\n    return x\n\nprint(f(1))\n";
        assert!(text_to_program(text).is_none());
    }

    #[test]
    fn test_top_level_comment_between_functions_dropped() {
        let text = "def f(x):\n    return x\n\n# helper below\ndef g(x):\n    return f(x)\n";
        let program = text_to_program(text).unwrap();
        assert_eq!(program.functions.len(), 2);
    }

    #[test]
    fn test_non_ascii_function_name() {
        let f = text_to_function("def café(x, y=(1)) -> int:\n    return x + y\n").unwrap();
        assert_eq!(f.name, "café");
        assert_eq!(f.args, "x, y=(1)");
        assert_eq!(f.return_type.as_deref(), Some("int"));
        assert_eq!(f.header(), "def café(x, y=(1)) -> int:");
    }

    #[test]
    fn test_invalid_header() {
        assert!(text_to_function("def (x):\n    return x\n").is_none());
        assert!(text_to_function("def f(x) junk:\n    return x\n").is_none());
    }

    #[test]
    fn test_is_balanced() {
        assert!(is_balanced("f(a[1], {'k': (2)})"));
        assert!(is_balanced("s = ')'  # comment with ("));
        assert!(is_balanced("d = \"\"\"multi\n(line\"\"\""));
        assert!(!is_balanced("f(a[1)]"));
        assert!(!is_balanced("f(a"));
        assert!(!is_balanced("s = 'open"));
        assert!(!is_balanced("d = \"\"\"never closed"));
    }

    #[test]
    fn test_blank_lines_inside_body_kept() {
        let text = "def f(x):\n    y = x\n\n    return y\n";
        let f = text_to_function(text).unwrap();
        assert_eq!(f.body, "    y = x\n\n    return y");
    }
}
