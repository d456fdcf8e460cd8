use std::io::{self, Write};

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
    Csv,
    /// Only identifiers, one per line.
    Quiet,
}

pub struct OutputRenderer {
    format: OutputFormat,
}

impl OutputRenderer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render to stdout.
    pub fn render<T: Serialize>(&self, value: &T) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.render_to(value, &mut out)
    }

    /// Render into any writer. Values that cannot be shown as rows fall back
    /// to pretty JSON for the table, CSV and quiet formats.
    pub fn render_to<T: Serialize, W: Write>(&self, value: &T, out: &mut W) -> Result<()> {
        let value = serde_json::to_value(value)?;

        let rendered = match self.format {
            OutputFormat::Json => None,
            OutputFormat::Yaml => Some(serde_yaml::to_string(&value)?),
            OutputFormat::Table => Self::rows(&value).map(|(headers, rows)| {
                let mut builder = Builder::default();
                builder.push_record(headers);
                for row in rows {
                    builder.push_record(row);
                }
                builder.build().with(Style::rounded()).to_string()
            }),
            OutputFormat::Csv => Self::rows(&value)
                .map(|(headers, rows)| csv_text(&headers, &rows))
                .transpose()?,
            OutputFormat::Quiet => Self::ids(&value).map(|ids| ids.join("\n")),
        };

        let text = match rendered {
            Some(text) => text,
            None => serde_json::to_string_pretty(&value)?,
        };
        writeln!(out, "{}", text.trim_end())?;
        Ok(())
    }

    /// Column headers in first-seen order plus one row per object. A single
    /// object is treated as a one-row table.
    fn rows(value: &Value) -> Option<(Vec<String>, Vec<Vec<String>>)> {
        let objects: Vec<&serde_json::Map<String, Value>> = match value {
            Value::Array(items) if !items.is_empty() => {
                items.iter().filter_map(Value::as_object).collect()
            }
            Value::Object(obj) => vec![obj],
            _ => return None,
        };

        let mut headers: Vec<String> = Vec::new();
        for obj in &objects {
            for key in obj.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }

        if headers.is_empty() {
            return None;
        }

        let rows = objects
            .iter()
            .map(|obj| {
                headers
                    .iter()
                    .map(|header| obj.get(header).map(Self::cell).unwrap_or_default())
                    .collect::<Vec<String>>()
            })
            .collect();

        Some((headers, rows))
    }

    fn ids(value: &Value) -> Option<Vec<String>> {
        let id_of = |item: &Value| match item {
            Value::Object(obj) => obj.get("id").map(Self::cell),
            Value::Null => None,
            other => Some(Self::cell(other)),
        };

        let ids: Vec<String> = match value {
            Value::Array(items) => items.iter().filter_map(id_of).collect(),
            other => id_of(other).into_iter().collect(),
        };

        if ids.is_empty() {
            None
        } else {
            Some(ids)
        }
    }

    fn cell(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

fn csv_text(headers: &[String], rows: &[Vec<String>]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
