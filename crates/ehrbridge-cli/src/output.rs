use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

/// Prints a list of resources as a summary table, or as a JSON array.
pub fn print_resources(resources: &[Value], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&Value::Array(resources.to_vec())),
        OutputFormat::Table => print_resource_table(resources),
    }
}

fn print_resource_table(resources: &[Value]) {
    if resources.is_empty() {
        println!("No resources found.");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(["ID", "Type", "Status", "Code", "Date"]);
    for resource in resources {
        builder.push_record([
            str_field(resource, "/id"),
            str_field(resource, "/resourceType"),
            str_field(resource, "/status"),
            code_label(resource),
            resource_date(resource),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
    println!("Total: {}", resources.len());
}

fn str_field(resource: &Value, pointer: &str) -> String {
    resource
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string()
}

/// `code.text`, else the first coding's display, else its code.
fn code_label(resource: &Value) -> String {
    if let Some(text) = resource.pointer("/code/text").and_then(Value::as_str) {
        return text.to_string();
    }
    let first = resource.pointer("/code/coding/0");
    first
        .and_then(|c| c.get("display").or_else(|| c.get("code")))
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string()
}

fn resource_date(resource: &Value) -> String {
    ["/effectiveDateTime", "/issued", "/meta/lastUpdated"]
        .iter()
        .find_map(|p| resource.pointer(p).and_then(Value::as_str))
        .unwrap_or("-")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_label_fallbacks() {
        assert_eq!(code_label(&json!({"code": {"text": "CBC"}})), "CBC");
        assert_eq!(
            code_label(&json!({"code": {"coding": [{"code": "58410-2", "display": "CBC panel"}]}})),
            "CBC panel"
        );
        assert_eq!(
            code_label(&json!({"code": {"coding": [{"code": "58410-2"}]}})),
            "58410-2"
        );
        assert_eq!(code_label(&json!({})), "-");
    }

    #[test]
    fn test_resource_date_prefers_effective() {
        let report = json!({
            "effectiveDateTime": "2024-03-01T10:00:00Z",
            "issued": "2024-03-02T08:00:00Z"
        });
        assert_eq!(resource_date(&report), "2024-03-01T10:00:00Z");
        assert_eq!(resource_date(&json!({"issued": "2024-03-02"})), "2024-03-02");
    }
}
