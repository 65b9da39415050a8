use serde::Serialize;

use crate::formats::Segment;

/// One segment ready for display: the Vietnamese block and the English block
/// carrying a playable audio reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedSegment {
    pub primary: String,
    pub secondary: String,
    pub audio_url: String,
}

pub fn render_segments(segments: &[Segment], audio_base_url: &str) -> Vec<RenderedSegment> {
    segments
        .iter()
        .map(|segment| render_segment(segment, audio_base_url))
        .collect()
}

pub fn render_segment(segment: &Segment, audio_base_url: &str) -> RenderedSegment {
    let audio_url = audio_url(audio_base_url, &segment.audio_filename);
    RenderedSegment {
        primary: format!("<div class='translated-vi'>{}</div>", segment.vi_text),
        secondary: format!(
            "<div class='translated-en'><button class=\"play-audio-btn\" data-audio=\"{}\">Listen</button>{}</div>",
            escape_attribute(&audio_url),
            segment.en_text
        ),
        audio_url,
    }
}

/// Inline block shown in place of chapter content.
pub fn error_block(message: &str) -> String {
    format!("<div class='error'>Error: {}</div>", escape_text(message))
}

pub fn audio_url(audio_base_url: &str, filename: &str) -> String {
    let base = audio_base_url.trim_end_matches('/');
    format!("{base}/{filename}")
}

fn escape_text(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(raw: &str) -> String {
    escape_text(raw).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> Segment {
        Segment {
            chapter_name: "Chương 1".to_owned(),
            vi_text: "<p>Trời mưa.</p>".to_owned(),
            en_text: "<p>It rains.</p>".to_owned(),
            audio_filename: "audio_1_abc.wav".to_owned(),
        }
    }

    #[test]
    fn renders_pair_with_audio_reference() {
        let rendered = render_segment(&segment(), "http://localhost:8080/audio/");
        assert_eq!(rendered.audio_url, "http://localhost:8080/audio/audio_1_abc.wav");
        assert_eq!(rendered.primary, "<div class='translated-vi'><p>Trời mưa.</p></div>");
        assert!(rendered.secondary.contains(r#"data-audio="http://localhost:8080/audio/audio_1_abc.wav""#));
        assert!(rendered.secondary.ends_with("<p>It rains.</p></div>"));
    }

    #[test]
    fn renders_segments_in_order() {
        let mut second = segment();
        second.vi_text = "<p>Hai</p>".to_owned();
        let rendered = render_segments(&[segment(), second], "/audio");
        assert_eq!(rendered.len(), 2);
        assert!(rendered[1].primary.contains("Hai"));
    }

    #[test]
    fn error_block_escapes_message() {
        assert_eq!(
            error_block("bad <data>"),
            "<div class='error'>Error: bad &lt;data&gt;</div>"
        );
    }
}
