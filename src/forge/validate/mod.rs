// SPDX-License-Identifier: MIT

//! Content validator
//!
//! Repairs generated LaTeX with a fixed sequence of named rules so that the
//! compiler accepts it. Applying the validator to its own output is a no-op.

pub mod rules;

/// A named rewrite rule
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

/// Rules in application order
pub static RULES: &[Rule] = &[
    Rule {
        name: "strip_code_fences",
        apply: rules::strip_code_fences,
    },
    Rule {
        name: "strip_source_markers",
        apply: rules::strip_source_markers,
    },
    Rule {
        name: "fix_display_math",
        apply: rules::fix_display_math,
    },
    Rule {
        name: "balance_environments",
        apply: rules::balance_environments,
    },
    Rule {
        name: "balance_braces",
        apply: rules::balance_braces,
    },
    Rule {
        name: "enforce_preamble",
        apply: rules::enforce_preamble,
    },
];

/// Passes over the rule table before giving up on a fixed point
const MAX_PASSES: usize = 4;

fn apply_rules(text: &str) -> String {
    RULES.iter().fold(text.to_string(), |acc, rule| {
        let next = (rule.apply)(&acc);
        if next != acc {
            log::debug!("Validator rule {} rewrote content", rule.name);
        }
        next
    })
}

/// Run the rules until the content stops changing
pub fn validate(text: &str) -> String {
    let mut current = apply_rules(text);
    for pass in 1..MAX_PASSES {
        let next = apply_rules(&current);
        if next == current {
            break;
        }
        log::debug!("Validator pass {} rewrote content again", pass + 1);
        current = next;
    }
    current
}
