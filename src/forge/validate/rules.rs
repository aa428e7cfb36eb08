// SPDX-License-Identifier: MIT

//! Structural rewrite rules for generated LaTeX
//!
//! Each rule is a pure `&str -> String` function and a fixed point on its own
//! output. Comments (`%` to end of line) are never rewritten.

use once_cell::sync::Lazy;
use regex::Regex;

static SOURCE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[cite(?:_start|_end)?(?::[^\]\n]*)?\]").expect("Failed to compile source marker regex")
});

static ENVIRONMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(begin|end)\{([A-Za-z*]+)\}").expect("Failed to compile environment regex")
});

static AMSMATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\usepackage(?:\[[^\]]*\])?\{[^}]*\bamsmath\b[^}]*\}")
        .expect("Failed to compile amsmath regex")
});

const DOCUMENT_CLASS: &str = "\\documentclass{article}";
const AMSMATH_PACKAGE: &str = "\\usepackage{amsmath}";
const BEGIN_DOCUMENT: &str = "\\begin{document}";
const END_DOCUMENT: &str = "\\end{document}";

/// Byte offset where the comment of `line` starts, or its length
fn code_end(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'%' => return i,
            _ => i += 1,
        }
    }
    line.len()
}

/// Remove markdown code fence lines wrapped around the source
pub fn strip_code_fences(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect();
    kept.join("\n").trim().to_string()
}

/// Remove `[cite: n]`, `[cite_start]` and `[cite_end]` tokens
pub fn strip_source_markers(text: &str) -> String {
    let mut current = text.to_string();
    // A removal can splice a new marker together
    while SOURCE_MARKER.is_match(&current) {
        current = SOURCE_MARKER.replace_all(&current, "").into_owned();
    }
    current
}

/// Bare `[` / `]` lines used as display math become `\[` / `\]`
pub fn fix_display_math(text: &str) -> String {
    text.lines()
        .map(|line| match line.trim() {
            "[" => line.replacen('[', "\\[", 1),
            "]" => line.replacen(']', "\\]", 1),
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop `\end{x}` that does not close the innermost open environment and
/// close every environment left open
pub fn balance_environments(text: &str) -> String {
    let mut stack: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();

    for line in text.lines() {
        let end = code_end(line);
        let (code, comment) = line.split_at(end);
        let mut rebuilt = String::with_capacity(line.len());
        let mut last = 0;

        for cap in ENVIRONMENT.captures_iter(code) {
            let whole = cap.get(0).map(|m| m.range()).unwrap_or(0..0);
            let name = &cap[2];
            if &cap[1] == "begin" {
                stack.push(name.to_string());
            } else if stack.last().map(String::as_str) == Some(name) {
                stack.pop();
            } else {
                log::debug!("Dropping unmatched \\end{{{}}}", name);
                rebuilt.push_str(&code[last..whole.start]);
                last = whole.end;
            }
        }
        rebuilt.push_str(&code[last..]);
        rebuilt.push_str(comment);
        out.push(rebuilt);
    }

    while let Some(name) = stack.pop() {
        out.push(format!("\\end{{{}}}", name));
    }

    out.join("\n")
}

/// Drop unmatched `}` and supply missing `}` before the closing of the
/// document. Escaped braces and comments are ignored.
pub fn balance_braces(text: &str) -> String {
    let mut depth = 0usize;
    let mut out: Vec<String> = Vec::new();

    for line in text.lines() {
        let end = code_end(line);
        let (code, comment) = line.split_at(end);
        let mut rebuilt = String::with_capacity(line.len());
        let mut chars = code.chars();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    rebuilt.push(c);
                    if let Some(next) = chars.next() {
                        rebuilt.push(next);
                    }
                }
                '{' => {
                    depth += 1;
                    rebuilt.push(c);
                }
                '}' if depth == 0 => {}
                '}' => {
                    depth -= 1;
                    rebuilt.push(c);
                }
                _ => rebuilt.push(c),
            }
        }
        rebuilt.push_str(comment);
        out.push(rebuilt);
    }

    if depth > 0 {
        let closing = "}".repeat(depth);
        match out.iter().rposition(|l| l.trim() == END_DOCUMENT) {
            Some(pos) => out.insert(pos, closing),
            None => out.push(closing),
        }
    }

    out.join("\n")
}

fn is_preamble_line(line: &str) -> bool {
    let t = line.trim_start();
    t.is_empty()
        || t.starts_with('%')
        || ["\\documentclass", "\\usepackage", "\\newcommand", "\\renewcommand"]
            .iter()
            .any(|p| t.starts_with(*p))
}

/// Guarantee `\documentclass`, amsmath, `\begin{document}` and
/// `\end{document}` in canonical order. Surrounding whitespace left by the
/// earlier rules is trimmed here.
pub fn enforce_preamble(text: &str) -> String {
    let mut lines: Vec<String> = text.trim().lines().map(str::to_string).collect();
    let has = |lines: &[String], needle: &str| {
        lines
            .iter()
            .any(|l| l[..code_end(l)].contains(needle))
    };

    if !has(&lines, "\\documentclass") {
        lines.insert(0, DOCUMENT_CLASS.to_string());
    }

    let class_line = lines
        .iter()
        .position(|l| l[..code_end(l)].contains("\\documentclass"))
        .unwrap_or(0);

    if !lines.iter().any(|l| AMSMATH.is_match(&l[..code_end(l)])) {
        lines.insert(class_line + 1, AMSMATH_PACKAGE.to_string());
    }

    if !has(&lines, BEGIN_DOCUMENT) {
        // Body starts after the leading block of declarations
        let body_start = lines
            .iter()
            .position(|l| !is_preamble_line(l))
            .unwrap_or(lines.len());
        lines.insert(body_start, BEGIN_DOCUMENT.to_string());
    }

    if !has(&lines, END_DOCUMENT) {
        lines.push(END_DOCUMENT.to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        let input = "```latex\n\\section{A}\n```";
        assert_eq!(strip_code_fences(input), "\\section{A}");
        assert_eq!(strip_code_fences("\\section{A}"), "\\section{A}");
    }

    #[test]
    fn test_strip_source_markers() {
        let input = "Plants [cite_start]use light [cite: 3].[cite_end]";
        assert_eq!(strip_source_markers(input), "Plants use light .");
    }

    #[test]
    fn test_strip_source_markers_spliced() {
        assert_eq!(strip_source_markers("a [ci[cite: 1]te: 2] b"), "a  b");
    }

    #[test]
    fn test_fix_display_math() {
        let input = "Energy:\n[\nE = mc^2\n]\ndone [1]";
        assert_eq!(
            fix_display_math(input),
            "Energy:\n\\[\nE = mc^2\n\\]\ndone [1]"
        );
    }

    #[test]
    fn test_balance_environments_closes_open() {
        let input = "\\begin{itemize}\n\\item a";
        assert_eq!(
            balance_environments(input),
            "\\begin{itemize}\n\\item a\n\\end{itemize}"
        );
    }

    #[test]
    fn test_balance_environments_drops_stray_end() {
        let input = "text \\end{equation} more";
        assert_eq!(balance_environments(input), "text  more");
    }

    #[test]
    fn test_balance_environments_reorders_interleaved() {
        let input = "\\begin{document}\n\\begin{itemize}\n\\item a\n\\end{document}";
        assert_eq!(
            balance_environments(input),
            "\\begin{document}\n\\begin{itemize}\n\\item a\n\n\\end{itemize}\n\\end{document}"
        );
    }

    #[test]
    fn test_balance_environments_ignores_comments() {
        let input = "a % \\end{itemize}";
        assert_eq!(balance_environments(input), input);
    }

    #[test]
    fn test_balance_braces() {
        assert_eq!(balance_braces("\\textbf{a}} b"), "\\textbf{a} b");
        assert_eq!(balance_braces("\\textbf{a"), "\\textbf{a\n}");
        assert_eq!(
            balance_braces("\\emph{x\n\\end{document}"),
            "\\emph{x\n}\n\\end{document}"
        );
    }

    #[test]
    fn test_balance_braces_ignores_escapes_and_comments() {
        let input = "\\{ 50\\% \\} % unmatched } here";
        assert_eq!(balance_braces(input), input);
        assert_eq!(balance_braces("\\\\{a}"), "\\\\{a}");
    }

    #[test]
    fn test_enforce_preamble_on_bare_body() {
        let out = enforce_preamble("\\section{Light}\nText");
        assert_eq!(
            out,
            "\\documentclass{article}\n\\usepackage{amsmath}\n\\begin{document}\n\\section{Light}\nText\n\\end{document}"
        );
    }

    #[test]
    fn test_enforce_preamble_keeps_existing_packages() {
        let input = "\\documentclass[12pt]{report}\n\\usepackage{amsmath,amssymb}\n\\begin{document}\nx\n\\end{document}";
        assert_eq!(enforce_preamble(input), input);
    }

    #[test]
    fn test_enforce_preamble_trims_leftover_whitespace() {
        let input = "\n\\documentclass{article}\n\\usepackage{amsmath}\n\\begin{document}\nx\n\\end{document} ";
        assert_eq!(enforce_preamble(input), input.trim());
    }

    #[test]
    fn test_enforce_preamble_inserts_begin_after_packages() {
        let input = "\\documentclass{article}\n\\usepackage{graphicx}\nBody\n\\end{document}";
        assert_eq!(
            enforce_preamble(input),
            "\\documentclass{article}\n\\usepackage{amsmath}\n\\usepackage{graphicx}\n\\begin{document}\nBody\n\\end{document}"
        );
    }
}
