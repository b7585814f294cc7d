use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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
struct DatagramOutput<'a> {
    pipe: &'a str,
    seq: usize,
    size: usize,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct PipeOutput<'a> {
    pipe: &'a str,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

/// Print one received datagram. `seq` counts from 1.
pub fn print_datagram(datagram: &[u8], pipe: &str, seq: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DatagramOutput {
                pipe,
                seq,
                size: datagram.len(),
                payload: payload_preview(datagram),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "SIZE", "PIPE", "PAYLOAD"])
                .add_row(vec![
                    seq.to_string(),
                    datagram.len().to_string(),
                    pipe.to_string(),
                    payload_preview(datagram),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "seq={} size={} pipe={} payload={}",
                seq,
                datagram.len(),
                pipe,
                payload_preview(datagram)
            );
        }
        OutputFormat::Raw => {
            let mut line = datagram.to_vec();
            line.push(b'\n');
            print_raw(&line);
        }
    }
}

/// Print the outcome of a pipe-level action (`created`, `removed`, `sent`).
pub fn print_action(pipe: &str, action: &str, count: Option<usize>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PipeOutput {
                pipe,
                action,
                count,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PIPE", "ACTION", "COUNT"])
                .add_row(vec![
                    pipe.to_string(),
                    action.to_string(),
                    count.map(|c| c.to_string()).unwrap_or_default(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match count {
            Some(count) => println!("{action} {count} message(s) on {pipe}"),
            None => println!("{action} {pipe}"),
        },
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
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
