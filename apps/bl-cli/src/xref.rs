//! Legacy-command cross-reference lookup.
//!
//! The table is a plain markdown table whose first three columns are the
//! legacy command, the equivalent procedure and free-form notes.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XrefRow {
    pub legacy: String,
    pub procedure: String,
    pub notes: String,
}

fn cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|c| c.trim().trim_matches('`').to_string())
        .collect()
}

fn is_separator(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

/// Rows of every table in the document. Header and separator rows are dropped.
pub fn parse_table(markdown: &str) -> Vec<XrefRow> {
    let mut rows = Vec::new();
    let mut header_seen = false;
    for line in markdown.lines() {
        if !line.trim_start().starts_with('|') {
            header_seen = false;
            continue;
        }
        let cells = cells(line);
        if !header_seen {
            header_seen = true;
            continue;
        }
        if is_separator(&cells) || cells.len() < 2 || cells[0].is_empty() {
            continue;
        }
        let mut it = cells.into_iter();
        rows.push(XrefRow {
            legacy: it.next().unwrap_or_default(),
            procedure: it.next().unwrap_or_default(),
            notes: it.next().unwrap_or_default(),
        });
    }
    rows
}

pub fn load(path: &str) -> Result<Vec<XrefRow>> {
    let md = fs::read_to_string(path).with_context(|| format!("reading cross-reference: {path}"))?;
    Ok(parse_table(&md))
}

/// Case-insensitive match on the legacy command.
pub fn lookup<'a>(rows: &'a [XrefRow], command: &str) -> Option<&'a XrefRow> {
    let command = command.trim().trim_matches('`');
    rows.iter().find(|r| r.legacy.eq_ignore_ascii_case(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
# heading

| SPEC | Bluesky | notes |
| --- | :--- | --- |
| `ascan` | `bp.scan` | absolute |
| `tw` | `%tweak` | |
| mv | bps.mv |

text between tables

| a | b |
|---|---|
| `ct` | `bp.count` |
"#;

    #[test]
    fn test_parse_rows() {
        let rows = parse_table(TABLE);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            XrefRow {
                legacy: "ascan".into(),
                procedure: "bp.scan".into(),
                notes: "absolute".into(),
            }
        );
        assert_eq!(rows[1].notes, "");
        assert_eq!(rows[2].procedure, "bps.mv");
        assert_eq!(rows[3].legacy, "ct");
    }

    #[test]
    fn test_lookup_ignores_case_and_backticks() {
        let rows = parse_table(TABLE);
        assert_eq!(lookup(&rows, "ASCAN").unwrap().procedure, "bp.scan");
        assert_eq!(lookup(&rows, "`tw`").unwrap().procedure, "%tweak");
        assert!(lookup(&rows, "dscan").is_none());
    }

    #[test]
    fn test_shipped_table() {
        let rows = parse_table(include_str!("../../../docs/spec_xref.md"));
        assert!(rows.len() > 10);
        assert_eq!(lookup(&rows, "burst_init").unwrap().procedure, "burst_init(dg645_idc)");
    }
}
