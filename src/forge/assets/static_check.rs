// SPDX-License-Identifier: MIT

//! Static rejection of generated code before it is executed

use super::sandbox::CodeLanguage;
use once_cell::sync::Lazy;
use regex::Regex;

static FORBIDDEN_PYTHON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mx)
        ^[\x20\t]*from[\x20\t]+(?:subprocess|socket|shutil|requests|urllib|ctypes|multiprocessing)\b
        | ^[\x20\t]*import[\x20\t]+[\w.,\x20\t]*\b(?:subprocess|socket|shutil|requests|urllib|ctypes|multiprocessing)\b
        | \b(?:subprocess|socket|shutil|requests|urllib|ctypes|multiprocessing)\s*\.
        | \bos\s*\.\s*(?:system|popen|remove|unlink|rmdir|removedirs|exec\w*|spawn\w*|fork|kill)\b
        | \b(?:eval|exec|compile|__import__)\s*\(
        ",
    )
    .expect("Failed to compile forbidden token regex")
});

/// Reject source that is structurally malformed or reaches outside the
/// plotting API. The message is fed back to the fix step.
pub fn check(language: CodeLanguage, source: &str) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err("empty program".to_string());
    }
    match language {
        CodeLanguage::Python => check_python(source),
        CodeLanguage::Mermaid => check_mermaid(source),
    }
}

fn check_python(source: &str) -> Result<(), String> {
    let code = scan_python(source)?;
    if let Some(m) = FORBIDDEN_PYTHON.find(&code) {
        return Err(format!("forbidden construct '{}'", m.as_str().trim()));
    }
    Ok(())
}

/// Bracket and string balance of Python source. Returns the source with
/// comments dropped and string literal bodies blanked, so that only code is
/// matched against the forbidden constructs.
fn scan_python(source: &str) -> Result<String, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut code = String::with_capacity(source.len());
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '\'' | '"' => {
                let start = line;
                let quotes = if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                    3
                } else {
                    1
                };
                let triple = quotes == 3;
                code.extend(std::iter::repeat(c).take(quotes));
                i += quotes;
                loop {
                    match chars.get(i) {
                        None => return Err(format!("unterminated string starting on line {}", start)),
                        Some('\\') => {
                            code.push_str("  ");
                            i += 1;
                        }
                        Some('\n') if !triple => {
                            return Err(format!("unterminated string on line {}", start))
                        }
                        Some('\n') => {
                            line += 1;
                            code.push('\n');
                        }
                        Some(&q) if q == c => {
                            if !triple {
                                code.push(c);
                                break;
                            }
                            if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                                code.extend(std::iter::repeat(c).take(3));
                                i += 2;
                                break;
                            }
                            code.push(' ');
                        }
                        _ => code.push(' '),
                    }
                    i += 1;
                }
            }
            '\n' => {
                line += 1;
                code.push(c);
            }
            '(' | '[' | '{' => {
                stack.push((c, line));
                code.push(c);
            }
            ')' | ']' | '}' => match stack.pop() {
                Some((open, _)) if closes(open, c) => code.push(c),
                _ => return Err(format!("unmatched '{}' on line {}", c, line)),
            },
            _ => code.push(c),
        }
        i += 1;
    }

    match stack.pop() {
        Some((open, at)) => Err(format!("unclosed '{}' opened on line {}", open, at)),
        None => Ok(code),
    }
}

fn closes(open: char, close: char) -> bool {
    matches!((open, close), ('(', ')') | ('[', ']') | ('{', '}'))
}

fn check_mermaid(source: &str) -> Result<(), String> {
    let header = source
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("%%"))
        .unwrap_or_default();

    if !(header.starts_with("graph") || header.starts_with("flowchart")) {
        return Err(format!(
            "diagram must start with a 'graph' or 'flowchart' header, found '{}'",
            header
        ));
    }

    let mut stack: Vec<char> = Vec::new();
    for (n, line) in source.lines().enumerate() {
        if line.trim_start().starts_with("%%") {
            continue;
        }
        let mut quoted = false;
        for c in line.chars() {
            match c {
                '"' => quoted = !quoted,
                _ if quoted => {}
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => match stack.pop() {
                    Some(open) if closes(open, c) => {}
                    _ => return Err(format!("unmatched '{}' on line {}", c, n + 1)),
                },
                _ => {}
            }
        }
        if quoted {
            return Err(format!("unterminated label on line {}", n + 1));
        }
    }

    match stack.last() {
        Some(open) => Err(format!("unclosed '{}'", open)),
        None => Ok(()),
    }
}
