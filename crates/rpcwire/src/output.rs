use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpcwire_frame::Message;
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

/// A decoded message plus how it was delivered.
pub struct Received<'a> {
    pub index: usize,
    pub message: &'a Message,
    /// Assembled across receives rather than borrowed from one.
    pub assembled: bool,
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    index: usize,
    remote: &'a str,
    routing: String,
    payload_size: u32,
    wire_size: usize,
    assembled: bool,
    payload: String,
}

impl<'a> From<&Received<'a>> for MessageOutput<'a> {
    fn from(received: &Received<'a>) -> Self {
        let envelope = &received.message.envelope;
        Self {
            index: received.index,
            remote: envelope.remote().as_str(),
            routing: preview(envelope.routing()),
            payload_size: envelope.payload_size(),
            wire_size: envelope.total_size(),
            assembled: received.assembled,
            payload: preview(&received.message.payload),
        }
    }
}

pub fn print_messages(messages: &[Received<'_>], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for received in messages {
                let out = MessageOutput::from(received);
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "ROUTING", "SIZE", "WIRE", "ASSEMBLED", "PAYLOAD"]);
            for received in messages {
                let out = MessageOutput::from(received);
                table.add_row(vec![
                    out.index.to_string(),
                    out.routing,
                    out.payload_size.to_string(),
                    out.wire_size.to_string(),
                    out.assembled.to_string(),
                    out.payload,
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for received in messages {
                let out = MessageOutput::from(received);
                println!(
                    "#{} remote={} routing={} size={} wire={} assembled={} payload={}",
                    out.index,
                    out.remote,
                    out.routing,
                    out.payload_size,
                    out.wire_size,
                    out.assembled,
                    out.payload
                );
            }
        }
        OutputFormat::Raw => {
            for received in messages {
                print_raw(&received.message.payload);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn preview(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", bytes.len()),
    }
}
