use std::io::Cursor;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Sample rate of the PCM the speech model returns and of the WAV files written.
pub const SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, thiserror::Error)]
#[error("speech response contained no decodable audio data")]
pub struct NoAudioData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narration {
    pub wav: Vec<u8>,
    pub filename: String,
}

pub fn speech_request(text: &str, voice: &str) -> Value {
    serde_json::json!({
        "contents": [ { "parts": [ { "text": text } ] } ],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice },
                },
            },
        },
    })
}

/// Wraps raw 16-bit little-endian mono PCM into a 24 kHz WAV.
///
/// Samples are normalized to `[-1, 1)` by dividing by 32768 and quantized back
/// asymmetrically (×32768 below zero, ×32767 above), so full-scale positive
/// samples lose one step. A trailing odd byte is dropped.
pub fn pcm16_to_wav(pcm: &[u8]) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("start WAV writer")?;
        for pair in pcm.chunks_exact(2) {
            let normalized = f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0;
            writer
                .write_sample(quantize(normalized))
                .context("write WAV sample")?;
        }
        writer.finalize().context("finalize WAV")?;
    }
    Ok(cursor.into_inner())
}

fn quantize(sample: f32) -> i16 {
    let sample = sample.clamp(-1.0, 1.0);
    if sample < 0.0 {
        (sample * 32768.0) as i16
    } else {
        (sample * 32767.0) as i16
    }
}

/// `audio_{unix_millis}_{8 hex chars}.wav`; the random suffix keeps names unique
/// when several clips are produced within the same millisecond.
pub fn audio_filename(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("audio_{}_{}.wav", now.timestamp_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn wav_header_matches_speech_output_format() {
        let wav = pcm16_to_wav(&pcm(&[0, 1, -1])).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 3);
    }

    #[test]
    fn samples_survive_normalization() {
        let wav = pcm16_to_wav(&pcm(&[0, -32768, -16384, 16384, 32767])).unwrap();
        let samples = hound::WavReader::new(Cursor::new(wav))
            .unwrap()
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(samples, vec![0, -32768, -16384, 16383, 32766]);
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let mut bytes = pcm(&[100, 200]);
        bytes.push(7);
        let wav = pcm16_to_wav(&bytes).unwrap();
        assert_eq!(hound::WavReader::new(Cursor::new(wav)).unwrap().len(), 2);
    }

    #[test]
    fn speech_request_asks_for_audio_with_preset_voice() {
        let body = speech_request("Hello.", "Kore");
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            body.pointer("/generationConfig/speechConfig/voiceConfig/prebuiltVoiceConfig/voiceName")
                .and_then(Value::as_str),
            Some("Kore")
        );
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello.");
    }

    #[test]
    fn audio_filenames_are_unique_within_a_millisecond() {
        let now = Utc::now();
        let a = audio_filename(now);
        let b = audio_filename(now);
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("audio_{}_", now.timestamp_millis())));
        assert!(a.ends_with(".wav"));
    }
}
