//! Output rendering for decoded traffic

use clap::ValueEnum;
use serde::Serialize;

use crate::core::protocol::{format_raw_frame, hexify, DecoderStats, NavTimeUtc, NmeaSentence, UbxFrame};
use crate::core::session::SessionEvent;
use crate::core::transport::TransportStats;

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Render one decoded event
pub fn render_event(event: &SessionEvent, format: OutputFormat) -> String {
    match event {
        SessionEvent::Frame(frame) => render_frame(frame, format),
        SessionEvent::Sentence(sentence) => render_sentence(sentence, format),
    }
}

/// Render a binary frame; NAV-TIMEUTC frames include the decoded time
pub fn render_frame(frame: &UbxFrame, format: OutputFormat) -> String {
    let time = NavTimeUtc::from_frame(frame).ok();

    match format {
        OutputFormat::Text => {
            let mut line = format!("UBX {}", frame);
            if !frame.checksum_valid {
                line.push_str("  [bad checksum]");
            }
            if let Some(time) = time {
                match time.to_datetime() {
                    Some(dt) if time.is_fully_resolved() => line.push_str(&format!("  UTC {}", dt)),
                    Some(dt) => line.push_str(&format!("  UTC {} (unresolved)", dt)),
                    None => line.push_str("  UTC --"),
                }
            }
            line
        }
        OutputFormat::Json => {
            let mut value = serde_json::json!({
                "kind": "frame",
                "class_id": frame.class_id,
                "message_id": frame.message_id,
                "length": frame.declared_length,
                "payload": hexify(&frame.payload),
                "checksum_valid": frame.checksum_valid,
            });
            if let Some(time) = time {
                value["nav_timeutc"] = serde_json::json!({
                    "utc": time.to_datetime().map(|dt| dt.to_string()),
                    "fully_resolved": time.is_fully_resolved(),
                    "itow": time.itow,
                    "time_accuracy_ns": time.time_accuracy_ns,
                    "nano": time.nano,
                });
            }
            value.to_string()
        }
    }
}

/// Render a text sentence
pub fn render_sentence(sentence: &NmeaSentence, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text if sentence.checksum_valid => sentence.raw_text.clone(),
        OutputFormat::Text => format!("{}  [bad checksum]", sentence.raw_text),
        OutputFormat::Json => serde_json::json!({
            "kind": "sentence",
            "text": sentence.raw_text,
            "checksum_valid": sentence.checksum_valid,
        })
        .to_string(),
    }
}

/// Render an outbound frame
pub fn render_encoded(raw: &[u8], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_raw_frame(raw),
        OutputFormat::Json => serde_json::json!({
            "frame": format_raw_frame(raw),
            "hex": hex::encode(raw),
            "length": raw.len(),
        })
        .to_string(),
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    decoder: &'a DecoderStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    transport: Option<&'a TransportStats>,
}

/// Render end-of-run counters
pub fn render_summary(decoder: &DecoderStats, transport: Option<&TransportStats>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!(
                "frames: {} ({} bad), sentences: {} ({} bad), resyncs: {}, ignored bytes: {}",
                decoder.frames,
                decoder.frame_checksum_errors,
                decoder.sentences,
                decoder.sentence_checksum_errors,
                decoder.resyncs,
                decoder.ignored_bytes
            );
            if let Some(t) = transport {
                out.push_str(&format!(
                    "\nrx: {} bytes, tx: {} bytes, faults: {}, retries: {}",
                    t.bytes_received, t.bytes_sent, t.faults, t.retries
                ));
            }
            out
        }
        OutputFormat::Json => serde_json::to_string(&Summary { decoder, transport }).unwrap_or_default(),
    }
}
