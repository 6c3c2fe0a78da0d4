use std::fmt::Display;

use serde_json::Value;
use termion::color;

pub fn print_var<V: Display>(name: &str, value: V) {
    println!(
        "{}{} {}{}{}",
        color::Fg(color::LightMagenta),
        name,
        color::Fg(color::Green),
        value,
        color::Fg(color::Reset)
    );
}

pub fn print_error<V: Display>(message: V) {
    eprintln!(
        "{}✕ {}{}",
        color::Fg(color::Red),
        message,
        color::Fg(color::Reset)
    );
}

/// Whether an operation response reports success.
pub fn is_success(response: &Value) -> bool {
    response
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// One `(name, value)` line per top-level field, `success` first. Scalars are
/// printed bare, objects and arrays as indented JSON.
pub fn response_lines(response: &Value) -> Vec<(String, String)> {
    let Value::Object(fields) = response else {
        return vec![("response".to_string(), render(response))];
    };

    let mut lines: Vec<_> = fields
        .iter()
        .filter(|(name, _)| name.as_str() != "success")
        .map(|(name, value)| (name.clone(), render(value)))
        .collect();
    lines.insert(0, ("success".to_string(), is_success(response).to_string()));
    lines
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

pub fn print_response(response: &Value) {
    for (name, value) in response_lines(response) {
        if name == "error" {
            print_error(&value);
        } else {
            print_var(&name, value);
        }
    }
}
