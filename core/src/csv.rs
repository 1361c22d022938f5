//! Semicolon-delimited CSV, the solver's fixed wire format.
//!
//! Quoting is numeric-aware: text fields are quoted (inner quotes doubled),
//! numeric fields are written bare. On read the convention runs in reverse:
//! a bare field must parse as a number, a quoted field is text. Header rows
//! are always written with quoted column names and parsed as text.

use crate::error::{CalibError, CalibResult};
use crate::table::{Table, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const DELIMITER: char = ';';

/// Write a table as `<path>`: header row plus one line per row.
pub fn write_table(path: &Path, table: &Table) -> CalibResult<()> {
    let mut file = fs::File::create(path)?;
    let header = table
        .header
        .iter()
        .map(|name| quote(name))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string());
    writeln!(file, "{header}")?;
    for row in &table.rows {
        let line = row
            .iter()
            .map(format_field)
            .collect::<Vec<_>>()
            .join(&DELIMITER.to_string());
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Read a table from `<path>`. `name` is only used in error reports.
pub fn read_table(path: &Path, name: &str) -> CalibResult<Table> {
    let content = fs::read_to_string(path)?;
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header_line = lines.next().ok_or_else(|| CalibError::Schema {
        table: name.to_string(),
        detail: "file is empty, no header row".to_string(),
    })?;
    let header = split_line(header_line, name)?
        .into_iter()
        .map(|field| field.text)
        .collect::<Vec<_>>();

    let mut table = Table {
        header,
        rows: Vec::new(),
    };
    for (line_no, line) in lines.enumerate() {
        let fields = split_line(line, name)?;
        if fields.len() != table.header.len() {
            return Err(CalibError::Schema {
                table: name.to_string(),
                detail: format!(
                    "row {} has {} fields, header has {}",
                    line_no + 1,
                    fields.len(),
                    table.header.len()
                ),
            });
        }
        let row = fields
            .into_iter()
            .map(|field| field.into_value(name, line_no + 1))
            .collect::<CalibResult<Vec<_>>>()?;
        table.rows.push(row);
    }
    Ok(table)
}

fn format_field(value: &Value) -> String {
    match value {
        Value::Num(n) => n.to_string(),
        Value::Text(s) => quote(s),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

struct RawField {
    text: String,
    quoted: bool,
}

impl RawField {
    fn into_value(self, table: &str, line_no: usize) -> CalibResult<Value> {
        if self.quoted {
            return Ok(Value::Text(self.text));
        }
        self.text
            .trim()
            .parse::<f64>()
            .map(Value::Num)
            .map_err(|_| CalibError::Schema {
                table: table.to_string(),
                detail: format!("row {line_no}: bare field '{}' is not numeric", self.text),
            })
    }
}

/// Split one line on the delimiter, honouring quotes. Doubled quotes inside
/// a quoted field decode to a single quote.
fn split_line(line: &str, table: &str) -> CalibResult<Vec<RawField>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
            quoted = true;
        } else if c == DELIMITER {
            fields.push(RawField {
                text: std::mem::take(&mut current),
                quoted,
            });
            quoted = false;
        } else {
            current.push(c);
        }
    }
    if in_quotes {
        return Err(CalibError::Schema {
            table: table.to_string(),
            detail: "unterminated quoted field".to_string(),
        });
    }
    fields.push(RawField {
        text: current,
        quoted,
    });
    Ok(fields)
}
