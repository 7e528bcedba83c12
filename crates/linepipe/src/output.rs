use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linepipe_transport::PipeEntry;
use serde::Serialize;
use serde_json::Value;

const MESSAGE_SCHEMA: &str =
    "https://schemas.3leaps.dev/linepipe/cli/v1/message-received.schema.json";
const PIPE_LIST_SCHEMA: &str = "https://schemas.3leaps.dev/linepipe/cli/v1/pipe-list.schema.json";
const PIPE_EXISTS_SCHEMA: &str =
    "https://schemas.3leaps.dev/linepipe/cli/v1/pipe-exists.schema.json";

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
struct MessageOutput<'a> {
    schema_id: &'a str,
    pipe: &'a str,
    value_type: &'a str,
    value: &'a Value,
    timestamp: String,
}

#[derive(Serialize)]
struct PipeOutput<'a> {
    name: &'a str,
    path: String,
}

#[derive(Serialize)]
struct PipeListOutput<'a> {
    schema_id: &'a str,
    count: usize,
    pipes: Vec<PipeOutput<'a>>,
}

#[derive(Serialize)]
struct PipeExistsOutput<'a> {
    schema_id: &'a str,
    name: &'a str,
    exists: bool,
}

pub fn print_message(value: &Value, pipe: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                schema_id: MESSAGE_SCHEMA,
                pipe,
                value_type: value_type(value),
                value,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PIPE", "TYPE", "VALUE"])
                .add_row(vec![
                    pipe.to_string(),
                    value_type(value).to_string(),
                    value_preview(value),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "pipe={} type={} value={}",
                pipe,
                value_type(value),
                value_preview(value)
            );
        }
        OutputFormat::Raw => print_raw(value_preview(value).as_bytes()),
    }
}

pub fn print_pipes(pipes: &[PipeEntry], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PipeListOutput {
                schema_id: PIPE_LIST_SCHEMA,
                count: pipes.len(),
                pipes: pipes
                    .iter()
                    .map(|pipe| PipeOutput {
                        name: &pipe.name,
                        path: pipe.path.display().to_string(),
                    })
                    .collect(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "PATH"]);
            for pipe in pipes {
                table.add_row(vec![pipe.name.clone(), pipe.path.display().to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for pipe in pipes {
                println!("{} ({})", pipe.name, pipe.path.display());
            }
        }
        OutputFormat::Raw => {
            for pipe in pipes {
                println!("{}", pipe.name);
            }
        }
    }
}

pub fn print_exists(name: &str, exists: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PipeExistsOutput {
            schema_id: PIPE_EXISTS_SCHEMA,
            name,
            exists,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            let state = if exists { "present" } else { "absent" };
            println!("{name}: {state}");
        }
        OutputFormat::Raw => println!("{exists}"),
    }
}

/// Write bytes plus a trailing newline straight to stdout.
pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strings print bare; everything else as compact JSON.
fn value_preview(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
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
    use serde_json::json;

    use super::*;

    #[test]
    fn value_types() {
        assert_eq!(value_type(&json!(null)), "null");
        assert_eq!(value_type(&json!({"a": 1})), "object");
        assert_eq!(value_type(&json!([1])), "array");
    }

    #[test]
    fn strings_preview_without_quotes() {
        assert_eq!(value_preview(&json!("hi")), "hi");
        assert_eq!(value_preview(&json!({"k": "v"})), r#"{"k":"v"}"#);
    }
}
