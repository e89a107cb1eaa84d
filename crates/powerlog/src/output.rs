use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use powerlog_driver::{reading, DeviceFamily, Identity};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

/// Values of one logged frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameValues {
    Numeric(Vec<f64>),
    Raw(Vec<String>),
}

impl FrameValues {
    pub fn len(&self) -> usize {
        match self {
            FrameValues::Numeric(values) => values.len(),
            FrameValues::Raw(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One log file line: the timestamp, then every value, space separated.
    pub fn log_line(&self, time: f64) -> String {
        let mut line = format!("{time:.6}");
        match self {
            FrameValues::Numeric(values) => {
                for value in values {
                    line.push(' ');
                    line.push_str(&format!("{value:?}"));
                }
            }
            FrameValues::Raw(fields) => {
                for field in fields {
                    line.push(' ');
                    line.push_str(field);
                }
            }
        }
        line
    }

    /// `name=value` pairs after the timestamp; "no data" codes print as `-`.
    fn pretty_line(&self, time: f64, names: &[String]) -> String {
        let mut line = format!("{time:.3}");
        for (i, name) in names.iter().enumerate() {
            let value = match self {
                FrameValues::Numeric(values) => values
                    .get(i)
                    .copied()
                    .and_then(reading)
                    .map_or_else(|| "-".to_string(), |value| value.to_string()),
                FrameValues::Raw(fields) => fields.get(i).cloned().unwrap_or_else(|| "-".to_string()),
            };
            line.push_str(&format!("  {name}={value}"));
        }
        line
    }

    /// JSON object keyed by quantity name. "No data" codes become `null`.
    fn to_json(&self, time: f64, names: &[String]) -> Value {
        let mut values = Map::new();
        for (i, name) in names.iter().enumerate() {
            let value = match self {
                FrameValues::Numeric(values) => values
                    .get(i)
                    .copied()
                    .and_then(reading)
                    .map_or(Value::Null, Value::from),
                FrameValues::Raw(fields) => fields
                    .get(i)
                    .map_or(Value::Null, |field| Value::from(field.as_str())),
            };
            values.insert(name.clone(), value);
        }
        let mut frame = Map::new();
        frame.insert("time".to_string(), Value::from(time));
        frame.insert("values".to_string(), Value::Object(values));
        Value::Object(frame)
    }
}

pub fn print_frame(frame: &FrameValues, time: f64, names: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", frame.to_json(time, names)),
        OutputFormat::Table => println!("{}", frame.log_line(time)),
        OutputFormat::Pretty => println!("{}", frame.pretty_line(time, names)),
    }
}

#[derive(Serialize)]
struct IdentityOutput<'a> {
    family: DeviceFamily,
    peer: &'a str,
    manufacturer: Option<&'a str>,
    model: Option<&'a str>,
    serial: Option<&'a str>,
    firmware: Option<&'a str>,
    fields: &'a [String],
}

pub fn print_identity(identity: &Identity, family: DeviceFamily, peer: &str, format: OutputFormat) {
    let out = IdentityOutput {
        family,
        peer,
        manufacturer: identity.manufacturer(),
        model: identity.model(),
        serial: identity.serial(),
        firmware: identity.firmware(),
        fields: &identity.fields,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in [
                ("family", Some(family.name())),
                ("peer", Some(peer)),
                ("manufacturer", out.manufacturer),
                ("model", out.model),
                ("serial", out.serial),
                ("firmware", out.firmware),
            ] {
                table.add_row(vec![field, value.unwrap_or("-")]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Instrument:");
            println!("  Family:       {family}");
            println!("  Peer:         {peer}");
            println!("  Manufacturer: {}", out.manufacturer.unwrap_or("-"));
            println!("  Model:        {}", out.model.unwrap_or("-"));
            println!("  Serial:       {}", out.serial.unwrap_or("-"));
            println!("  Firmware:     {}", out.firmware.unwrap_or("-"));
        }
    }
}

#[derive(Serialize)]
struct ErrorQueueOutput<'a> {
    family: DeviceFamily,
    peer: &'a str,
    errors: &'a str,
}

pub fn print_errors(errors: &str, family: DeviceFamily, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ErrorQueueOutput {
            family,
            peer,
            errors,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            if errors.is_empty() {
                println!("(no reply)");
            } else {
                println!("{errors}");
            }
        }
    }
}

/// Totals reported when logging ends.
#[derive(Debug, Default, Serialize)]
pub struct LogSummary {
    pub logfile: String,
    pub frames_written: u64,
    pub parse_failures: u64,
    pub empty_reads: u64,
    pub reconnects: u64,
    pub interrupted: bool,
}

pub fn print_summary(summary: &LogSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => println!("{}", summary_table(summary)),
        OutputFormat::Pretty => {
            println!(
                "done{}, {} measurements written to {} ({} parse failures, {} empty reads, {} reconnects)",
                if summary.interrupted { " (interrupted)" } else { "" },
                summary.frames_written,
                summary.logfile,
                summary.parse_failures,
                summary.empty_reads,
                summary.reconnects
            );
        }
    }
}

fn summary_table(summary: &LogSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "LOGFILE",
            "FRAMES",
            "PARSE FAILURES",
            "EMPTY",
            "RECONNECTS",
            "INTERRUPTED",
        ])
        .add_row(vec![
            summary.logfile.clone(),
            summary.frames_written.to_string(),
            summary.parse_failures.to_string(),
            summary.empty_reads.to_string(),
            summary.reconnects.to_string(),
            if summary.interrupted { "yes" } else { "no" }.to_string(),
        ]);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Seconds since the Unix epoch, with sub-second precision.
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
