//! Output formatting: table, JSON, plain.
//!
//! Renders data in the format selected by `--output`. Detail views use a
//! `tabled` field/value table, structured formats use serde, plain emits
//! one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Highlight a label (usernames, titles).
pub fn accent(text: &str, color: bool) -> String {
    if color {
        text.cyan().bold().to_string()
    } else {
        text.to_owned()
    }
}

/// De-emphasize secondary text (timestamps, ids).
pub fn muted(text: &str, color: bool) -> String {
    if color {
        text.dimmed().to_string()
    } else {
        text.to_owned()
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn` to produce field/value rows.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> Vec<(&'static str, String)>,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => render_detail(&detail_fn(data)),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => id_fn(data),
    })
}

/// Render one streamed event: a preformatted line for humans, one JSON
/// document per line for structured formats.
pub fn render_event<T>(
    format: &OutputFormat,
    data: &T,
    line_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table | OutputFormat::Plain => line_fn(data),
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(data)?,
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn render_detail(fields: &[(&'static str, String)]) -> String {
    let rows: Vec<FieldRow> = fields
        .iter()
        .map(|(field, value)| FieldRow {
            field: *field,
            value: value.clone(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Item {
        id: u64,
        name: &'static str,
    }

    fn detail(item: &Item) -> Vec<(&'static str, String)> {
        vec![("ID", item.id.to_string()), ("Name", item.name.to_owned())]
    }

    #[test]
    fn table_lists_fields() {
        let item = Item { id: 7, name: "ada" };
        let out = render_single(&OutputFormat::Table, &item, detail, |i| i.id.to_string())
            .expect("renders");
        assert!(out.contains("Field"));
        assert!(out.contains("Name"));
        assert!(out.contains("ada"));
    }

    #[test]
    fn structured_formats_serialize() {
        let item = Item { id: 7, name: "ada" };
        let compact = render_single(&OutputFormat::JsonCompact, &item, detail, |_| String::new())
            .expect("renders");
        assert_eq!(compact, r#"{"id":7,"name":"ada"}"#);

        let plain = render_single(&OutputFormat::Plain, &item, detail, |i| i.id.to_string())
            .expect("renders");
        assert_eq!(plain, "7");
    }

    #[test]
    fn events_are_one_line_each() {
        let item = Item { id: 1, name: "x" };
        let line = render_event(&OutputFormat::Json, &item, |_| "human".into()).expect("renders");
        assert!(!line.contains('\n'));
        let line = render_event(&OutputFormat::Table, &item, |_| "human".into()).expect("renders");
        assert_eq!(line, "human");
    }

    #[test]
    fn color_can_be_disabled() {
        assert_eq!(accent("ada", false), "ada");
        assert_eq!(muted("12:00", false), "12:00");
        assert!(accent("ada", true).contains("ada"));
        assert!(!should_color(&ColorMode::Never));
    }
}
