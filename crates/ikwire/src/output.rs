use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ikwire_frame::Frame;
use ikwire_peer::StreamSummary;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    event: &'a str,
    payload_size: usize,
    payload: String,
    peer: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct StreamOutput<'a> {
    event: &'a str,
    chunks: usize,
    bytes: u64,
    peer: &'a str,
}

pub fn print_frame(frame: &Frame, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                event: &frame.event,
                payload_size: frame.payload.len(),
                payload: payload_preview(frame.payload.as_ref()),
                peer,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    frame.event.clone(),
                    frame.payload.len().to_string(),
                    peer.to_string(),
                    payload_preview(frame.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "event={} size={} peer={} payload={}",
                frame.event,
                frame.payload.len(),
                peer,
                payload_preview(frame.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.payload.as_ref());
        }
    }
}

/// Raw output prints nothing here; the per-chunk replies already went out.
pub fn print_stream_summary(event: &str, summary: &StreamSummary, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StreamOutput {
            event,
            chunks: summary.chunks,
            bytes: summary.bytes,
            peer,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "CHUNKS", "BYTES", "PEER"])
                .add_row(vec![
                    event.to_string(),
                    summary.chunks.to_string(),
                    summary.bytes.to_string(),
                    peer.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "event={} chunks={} bytes={} peer={}",
                event, summary.chunks, summary.bytes, peer
            );
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_marks_binary_payloads() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xff, 0xfe, 0x00]), "<binary 3 bytes>");
    }

    #[test]
    fn frame_json_shape() {
        let out = FrameOutput {
            event: "echo",
            payload_size: 2,
            payload: "hi".to_string(),
            peer: "127.0.0.1:48923",
            timestamp: "0".to_string(),
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["event"], "echo");
        assert_eq!(value["payload_size"], 2);
        assert_eq!(value["peer"], "127.0.0.1:48923");
    }
}
