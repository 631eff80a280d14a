//! JSON line I/O for the shell
//!
//! - Input: one JSON request per line; blank lines are skipped
//! - Output: one JSON response per line, flushed immediately
//! - UTF-8 only

use std::io::{BufRead, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Iterate over the non-blank lines of `reader`.
pub fn read_lines<R: BufRead>(reader: R) -> impl Iterator<Item = CliResult<String>> {
    reader
        .lines()
        .map(|line| line.map_err(CliError::from))
        .filter(|line| !matches!(line, Ok(text) if text.trim().is_empty()))
}

/// Write a success response
pub fn write_response<W: Write>(out: &mut W, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_line(out, &response)
}

/// Write an error response
pub fn write_error<W: Write>(out: &mut W, code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(out, &response)
}

fn write_line<W: Write>(out: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_lines_are_skipped() {
        let input = "{\"op\":\"find\"}\n\n   \n{\"op\":\"find\"}\n";
        let lines: Vec<String> = read_lines(input.as_bytes()).map(Result::unwrap).collect();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_responses_are_single_lines() {
        let mut out = Vec::new();
        write_response(&mut out, serde_json::json!({"pages": 3})).unwrap();
        write_error(&mut out, "BUSY", "open transaction").unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["data"]["pages"], 3);
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["code"], "BUSY");
    }
}
