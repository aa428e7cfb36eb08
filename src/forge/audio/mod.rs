// SPDX-License-Identifier: MIT

//! Audio narration sub-workflow
//!
//! `route` picks exactly one transcript writer by mode, the transcript is
//! synthesized line by line and the clips are joined into one WAV file.

pub mod assemble;
pub mod transcript;

pub use transcript::{Utterance, Voice};

use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::ForgeError;
use crate::adk::model::Model;
use crate::forge::config::AudioSettings;
use crate::forge::workflow::graph::{CompiledGraph, GraphSpec, GraphState, Node, Transition, END};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

const TUTOR_INSTRUCTION: &str = "You are a friendly tutor recording an audio lesson. Turn the \
Markdown document into a spoken narration, one sentence per line. Do not read out headings \
markers, links, image references or formulas. Return only the lines to speak.";

const STORY_INSTRUCTION: &str = "You write an audio story with two speakers that teaches the \
content of the Markdown document. Every line starts with the speaker prefix PA: or PB:, the two \
speakers alternate, and one line holds one utterance. Return only the dialogue.";

const OPENAI_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NarrationMode {
    #[default]
    Tutor,
    Story,
}

impl FromStr for NarrationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tutor" => Ok(Self::Tutor),
            "story" => Ok(Self::Story),
            other => Err(format!("unknown narration mode '{}'", other)),
        }
    }
}

impl fmt::Display for NarrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tutor => write!(f, "tutor"),
            Self::Story => write!(f, "story"),
        }
    }
}

/// Mono 16-bit samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, voice: Voice, text: &str) -> Result<AudioClip, ForgeError>;
}

/// Result of a narration run
#[derive(Debug, Clone, Serialize)]
pub struct Narration {
    pub mode: NarrationMode,
    pub transcript: Vec<Utterance>,
    pub path: PathBuf,
}

#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(
        &self,
        mode: NarrationMode,
        document: &str,
        output: &Path,
    ) -> Result<Narration, ForgeError>;
}

/// OpenAI speech endpoint, raw PCM output
pub struct OpenAiSpeech {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    primary_voice: String,
    secondary_voice: String,
}

impl OpenAiSpeech {
    /// Requires `OPENAI_API_KEY`; honours `OPENAI_BASE_URL`
    pub fn new(settings: &AudioSettings) -> Result<Self, ForgeError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ForgeError::config("OPENAI_API_KEY not set"))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url,
            model: settings.speech_model.clone(),
            primary_voice: settings.primary_voice.clone(),
            secondary_voice: settings.secondary_voice.clone(),
        })
    }

    fn voice_name(&self, voice: Voice) -> &str {
        match voice {
            Voice::Primary => &self.primary_voice,
            Voice::Secondary => &self.secondary_voice,
        }
    }
}

/// Little-endian PCM16 bytes to samples; a trailing odd byte is dropped
pub fn decode_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, voice: Voice, text: &str) -> Result<AudioClip, ForgeError> {
        let url = format!("{}/audio/speech", self.base_url);
        let body = json!({
            "model": self.model,
            "voice": self.voice_name(voice),
            "input": text,
            "response_format": "pcm",
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(ForgeError::api("openai-speech", format!("{}: {}", status, text)));
        }

        let bytes = resp.bytes().await?;
        Ok(AudioClip {
            sample_rate: OPENAI_SAMPLE_RATE,
            samples: decode_pcm16(&bytes),
        })
    }
}

#[derive(Debug, Clone, Default)]
struct AudioState {
    mode: NarrationMode,
    document: String,
    transcript: Vec<Utterance>,
}

#[derive(Debug, Default)]
struct AudioUpdate {
    transcript: Option<Vec<Utterance>>,
}

impl GraphState for AudioState {
    type Update = AudioUpdate;

    fn apply(&mut self, update: AudioUpdate) {
        if let Some(t) = update.transcript {
            self.transcript = t;
        }
    }
}

struct ByMode;

impl Transition<AudioState> for ByMode {
    fn name(&self) -> &'static str {
        "route_by_mode"
    }

    fn route(&self, state: &AudioState) -> &'static str {
        match state.mode {
            NarrationMode::Tutor => "tutor",
            NarrationMode::Story => "story",
        }
    }
}

/// Pass-through; branching happens on its outgoing edge
struct RouteNode;

#[async_trait]
impl Node<AudioState> for RouteNode {
    async fn run(&self, _state: &AudioState) -> Result<AudioUpdate, ForgeError> {
        Ok(AudioUpdate::default())
    }
}

struct TranscriptNode {
    writer: Arc<dyn Agent>,
    parse: fn(&str) -> Vec<Utterance>,
}

#[async_trait]
impl Node<AudioState> for TranscriptNode {
    async fn run(&self, state: &AudioState) -> Result<AudioUpdate, ForgeError> {
        let reply = self.writer.run(state.document.clone()).await?;
        let transcript = (self.parse)(&reply);
        log::info!("{} transcript has {} lines", state.mode, transcript.len());
        Ok(AudioUpdate {
            transcript: Some(transcript),
        })
    }
}

/// Default `Narrator`
pub struct AudioWorkflow {
    graph: CompiledGraph<AudioState, ByMode>,
    speech: Arc<dyn SpeechSynthesizer>,
    min_gap_ms: u64,
    max_gap_ms: u64,
}

impl AudioWorkflow {
    pub fn new(
        tutor: Arc<dyn Agent>,
        story: Arc<dyn Agent>,
        speech: Arc<dyn SpeechSynthesizer>,
        settings: &AudioSettings,
    ) -> Result<Self, ForgeError> {
        let spec = GraphSpec::new("audio", "route")
            .node("route")
            .node("generate_tutor")
            .node("generate_story")
            .conditional(
                "route",
                ByMode,
                &[("tutor", "generate_tutor"), ("story", "generate_story")],
            )
            .edge("generate_tutor", END)
            .edge("generate_story", END);

        let route: Arc<dyn Node<AudioState>> = Arc::new(RouteNode);
        let tutor: Arc<dyn Node<AudioState>> = Arc::new(TranscriptNode {
            writer: tutor,
            parse: transcript::parse_tutor,
        });
        let story: Arc<dyn Node<AudioState>> = Arc::new(TranscriptNode {
            writer: story,
            parse: transcript::parse_story,
        });

        let graph = CompiledGraph::compile(
            spec,
            vec![("route", route), ("generate_tutor", tutor), ("generate_story", story)],
        )?;

        Ok(Self {
            graph,
            speech,
            min_gap_ms: settings.min_gap_ms,
            max_gap_ms: settings.max_gap_ms,
        })
    }

    pub fn from_model(
        model: Arc<dyn Model>,
        speech: Arc<dyn SpeechSynthesizer>,
        settings: &AudioSettings,
    ) -> Result<Self, ForgeError> {
        Self::new(
            Arc::new(LLMAgent::new("audio_tutor", TUTOR_INSTRUCTION, model.clone())),
            Arc::new(LLMAgent::new("audio_story", STORY_INSTRUCTION, model)),
            speech,
            settings,
        )
    }
}

#[async_trait]
impl Narrator for AudioWorkflow {
    async fn narrate(
        &self,
        mode: NarrationMode,
        document: &str,
        output: &Path,
    ) -> Result<Narration, ForgeError> {
        let state = AudioState {
            mode,
            document: document.to_string(),
            transcript: Vec::new(),
        };
        let transcript = self.graph.run(state).await?.state.transcript;
        if transcript.is_empty() {
            return Err(ForgeError::other("narration transcript is empty"));
        }

        let mut clips = Vec::with_capacity(transcript.len());
        for line in &transcript {
            clips.push(self.speech.synthesize(line.voice, &line.text).await?);
        }

        let gap = assemble::pick_gap(&mut rand::thread_rng(), self.min_gap_ms, self.max_gap_ms);
        let joined = assemble::concatenate(&clips, gap)?;
        assemble::write_wav(output, &joined).await?;

        Ok(Narration {
            mode,
            transcript,
            path: output.to_path_buf(),
        })
    }
}
