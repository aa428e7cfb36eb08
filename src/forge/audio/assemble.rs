// SPDX-License-Identifier: MIT

//! Clip concatenation and WAV encoding

use super::AudioClip;
use crate::adk::error::ForgeError;
use rand::Rng;
use std::path::Path;
use std::time::Duration;

/// One gap per batch, drawn from `[min_ms, max_ms]`
pub fn pick_gap<R: Rng>(rng: &mut R, min_ms: u64, max_ms: u64) -> Duration {
    Duration::from_millis(rng.gen_range(min_ms..=max_ms))
}

/// Join clips with the same silence between each pair, none after the last
pub fn concatenate(clips: &[AudioClip], gap: Duration) -> Result<AudioClip, ForgeError> {
    let first = clips
        .first()
        .ok_or_else(|| ForgeError::other("no audio clips to assemble"))?;
    let sample_rate = first.sample_rate;

    if let Some(odd) = clips.iter().find(|c| c.sample_rate != sample_rate) {
        return Err(ForgeError::other(format!(
            "sample rate mismatch: {} vs {}",
            sample_rate, odd.sample_rate
        )));
    }

    let silence_len = (gap.as_millis() as u64 * sample_rate as u64 / 1000) as usize;
    let total = clips.iter().map(|c| c.samples.len()).sum::<usize>()
        + silence_len * (clips.len() - 1);

    let mut samples = Vec::with_capacity(total);
    for (i, clip) in clips.iter().enumerate() {
        if i > 0 {
            samples.resize(samples.len() + silence_len, 0);
        }
        samples.extend_from_slice(&clip.samples);
    }

    Ok(AudioClip {
        sample_rate,
        samples,
    })
}

/// 16-bit mono PCM WAV
pub fn encode_wav(clip: &AudioClip) -> Vec<u8> {
    let data_len = (clip.samples.len() * 2) as u32;
    let byte_rate = clip.sample_rate * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&clip.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in &clip.samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

pub async fn write_wav(path: &Path, clip: &AudioClip) -> Result<(), ForgeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, encode_wav(clip)).await?;
    log::info!(
        "Wrote {:.1}s of audio to {}",
        clip.samples.len() as f64 / clip.sample_rate as f64,
        path.display()
    );
    Ok(())
}
