use anyhow::Result;
use colored::Colorize;
use eventhub_client::{Community, Event, ManagedUser, Page};
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::cli::OutputFormat;

/// Longest string shown in a table cell. Inline images are kilobytes long.
const MAX_CELL_CHARS: usize = 60;

/// How a record renders as a table row.
pub trait TableRow {
    fn headers() -> &'static [&'static str];
    fn row(&self) -> Vec<String>;
}

impl TableRow for Event {
    fn headers() -> &'static [&'static str] {
        &["ID", "Title", "Starts", "Status", "Location"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.title.clone(),
            format_date(self.starts_at),
            dash(self.status.as_deref()),
            dash(self.location.as_deref()),
        ]
    }
}

impl TableRow for Community {
    fn headers() -> &'static [&'static str] {
        &["ID", "Name", "Members", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.member_count
                .map_or_else(|| "-".to_string(), |n| n.to_string()),
            truncate(self.description.as_deref().unwrap_or("-")),
        ]
    }
}

impl TableRow for ManagedUser {
    fn headers() -> &'static [&'static str] {
        &["ID", "Email", "Name", "Role", "Status", "Created"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.email.clone(),
            dash(self.name.as_deref()),
            self.role.to_string(),
            dash(self.status.as_deref()),
            format_date(self.created_at),
        ]
    }
}

pub fn print_page<T: TableRow + Serialize>(page: &Page<T>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(page)?),
        OutputFormat::Table => {
            if page.items.is_empty() {
                println!("No records found.");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(T::headers().iter().copied());
            for item in &page.items {
                builder.push_record(item.row());
            }
            println!("{}", builder.build().with(Style::rounded()));
            let p = &page.pagination;
            println!(
                "Page {} of {} ({} total)",
                p.page.to_string().cyan(),
                p.total_pages,
                p.total
            );
        }
    }
    Ok(())
}

/// Prints a single record as JSON or as a field/value table.
pub fn print_item<T: Serialize>(item: &T, format: OutputFormat) -> Result<()> {
    let value = serde_json::to_value(item)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
        OutputFormat::Table => match &value {
            Value::Object(map) => {
                let mut builder = Builder::default();
                builder.push_record(["Field", "Value"]);
                for (key, val) in map {
                    builder.push_record([key.clone(), cell(val)]);
                }
                println!("{}", builder.build().with(Style::rounded()));
            }
            other => println!("{}", serde_json::to_string_pretty(other)?),
        },
    }
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => truncate(s),
        other => truncate(&other.to_string()),
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_CELL_CHARS {
        s.to_string()
    } else {
        let head: String = s.chars().take(MAX_CELL_CHARS - 3).collect();
        format!("{head}...")
    }
}

fn dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

fn format_date(value: Option<OffsetDateTime>) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    value
        .and_then(|dt| dt.format(format).ok())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn long_cells_are_truncated() {
        let data_url = format!("data:image/png;base64,{}", "A".repeat(500));
        let shown = cell(&Value::String(data_url));
        assert_eq!(shown.chars().count(), MAX_CELL_CHARS);
        assert!(shown.ends_with("..."));
        assert_eq!(cell(&Value::Null), "-");
        assert_eq!(cell(&json!(3)), "3");
    }

    #[test]
    fn event_row() {
        let event: Event = serde_json::from_value(json!({
            "id": "e1",
            "title": "RustConf",
            "status": "published"
        }))
        .unwrap();
        assert_eq!(event.row(), vec!["e1", "RustConf", "-", "published", "-"]);
        assert_eq!(
            format_date(Some(datetime!(2026-09-01 09:30 UTC))),
            "2026-09-01 09:30"
        );
    }
}
