//! Delimited-text codec with RFC 4180 quoting.
//!
//! Cells are quoted only when they contain the delimiter, a quote or a line break. Decoding is a
//! single pass over the whole document so that quoted line breaks survive a round trip.

use crate::models::{Cell, Table};
use std::mem;

const QUOTE: char = '"';
const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabularCodec {
    delimiter: char,
}

impl TabularCodec {
    /// Comma-delimited CSV.
    pub const CSV: Self = Self { delimiter: ',' };
    /// Semicolon-delimited export format used by marketplace seller cabinets.
    pub const SEMICOLON: Self = Self { delimiter: ';' };

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn encode_cell(&self, value: &str) -> String {
        let needs_quotes = value
            .chars()
            .any(|ch| ch == self.delimiter || ch == QUOTE || ch == '\n' || ch == '\r');
        if needs_quotes {
            format!("\"{}\"", value.replace(QUOTE, "\"\""))
        } else {
            value.to_string()
        }
    }

    pub fn encode_row(&self, cells: &[Cell]) -> String {
        let encoded: Vec<String> = cells
            .iter()
            .map(|cell| self.encode_cell(&cell.as_text()))
            .collect();
        // A lone blank cell would otherwise produce a blank line, which the decoder skips.
        if encoded.len() == 1 && encoded[0].trim().is_empty() {
            return format!("\"{}\"", encoded[0]);
        }
        encoded.join(&self.delimiter.to_string())
    }

    pub fn encode_header(&self, header: &[String]) -> String {
        let cells: Vec<Cell> = header.iter().map(|name| Cell::from(name.as_str())).collect();
        self.encode_row(&cells)
    }

    /// Header line followed by data lines, `\n`-terminated.
    pub fn encode_document(&self, header: &[String], rows: &[Vec<Cell>]) -> String {
        let mut out = self.encode_header(header);
        out.push('\n');
        for row in rows {
            out.push_str(&self.encode_row(row));
            out.push('\n');
        }
        out
    }

    /// Cells of the first record in `line`; empty text is one empty cell.
    pub fn decode_line(&self, line: &str) -> Vec<String> {
        self.decode_records(line)
            .into_iter()
            .next()
            .unwrap_or_else(|| vec![String::new()])
    }

    /// Data rows only; line 1 is the header and is skipped.
    pub fn decode_document(&self, text: &str) -> Vec<Vec<String>> {
        self.decode_records(text).into_iter().skip(1).collect()
    }

    pub fn decode_table(&self, text: &str) -> Table {
        let mut records = self.decode_records(text).into_iter();
        let Some(header) = records.next() else {
            return Table::default();
        };
        let header: Vec<String> = header.into_iter().map(|name| name.trim().to_string()).collect();
        let rows = records
            .map(|record| record.into_iter().map(Cell::Text).collect())
            .collect();
        Table::new(header, rows)
    }

    /// Splits a document into records. Blank, unquoted lines are skipped.
    pub fn decode_records(&self, text: &str) -> Vec<Vec<String>> {
        let text = text.strip_prefix(BOM).unwrap_or(text);
        let mut records = Vec::new();
        let mut record: Vec<String> = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        // Set once the record holds a delimiter, a quote or a non-whitespace char.
        let mut significant = false;
        let mut chars = text.chars().peekable();

        while let Some(ch) = chars.next() {
            if in_quotes {
                if ch == QUOTE {
                    if chars.peek() == Some(&QUOTE) {
                        field.push(QUOTE);
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    field.push(ch);
                }
                continue;
            }

            match ch {
                QUOTE => {
                    in_quotes = true;
                    significant = true;
                }
                '\r' if chars.peek() == Some(&'\n') => {}
                '\n' | '\r' => {
                    if significant {
                        record.push(mem::take(&mut field));
                        records.push(mem::take(&mut record));
                    } else {
                        field.clear();
                        record.clear();
                    }
                    significant = false;
                }
                ch if ch == self.delimiter => {
                    record.push(mem::take(&mut field));
                    significant = true;
                }
                ch => {
                    if !ch.is_whitespace() {
                        significant = true;
                    }
                    field.push(ch);
                }
            }
        }

        if significant {
            record.push(field);
            records.push(record);
        }
        records
    }
}

impl Default for TabularCodec {
    fn default() -> Self {
        Self::CSV
    }
}
