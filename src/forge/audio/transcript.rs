// SPDX-License-Identifier: MIT

//! Transcript parsing
//!
//! Spoken text never contains `:`; the synthesizer reads it as a pause
//! marker, so every colon becomes a space.

use serde::Serialize;

const PRIMARY_PREFIX: &str = "PA:";
const SECONDARY_PREFIX: &str = "PB:";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Utterance {
    pub voice: Voice,
    pub text: String,
}

impl Utterance {
    fn spoken(voice: Voice, text: &str) -> Option<Self> {
        let text = text.trim().replace(':', " ");
        if text.trim().is_empty() {
            return None;
        }
        Some(Self { voice, text })
    }
}

/// Single-voice narration, one utterance per non-empty line
pub fn parse_tutor(reply: &str) -> Vec<Utterance> {
    reply
        .lines()
        .filter_map(|line| Utterance::spoken(Voice::Primary, line))
        .collect()
}

/// Two-voice dialogue. Lines without a speaker prefix are narrated by the
/// primary voice.
pub fn parse_story(reply: &str) -> Vec<Utterance> {
    reply
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix(PRIMARY_PREFIX) {
                Utterance::spoken(Voice::Primary, rest)
            } else if let Some(rest) = line.strip_prefix(SECONDARY_PREFIX) {
                Utterance::spoken(Voice::Secondary, rest)
            } else {
                Utterance::spoken(Voice::Primary, line)
            }
        })
        .collect()
}
