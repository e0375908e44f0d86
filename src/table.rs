//! Input instruction-table parsing.
//!
//! The table is row-oriented CSV with a header line. One row describes
//! one instruction variant; the four `*_OP` columns carry the per-stage
//! micro-op strings (which may contain commas, hence quoting support).

use std::collections::HashMap;

use anyhow::{bail, Context, Result};

pub const REQUIRED_COLUMNS: [&str; 18] = [
    "Name", "Form", "Class", "Opcode", "XO", "Subdec", "spr", "BO", "Rc", "SO", "AA", "LK",
    "Priv", "Lock", "DE_OP", "EXE_OP", "MEM_OP", "WB_OP",
];

/// The `Subdec` column: blank rows decode normally, `0` marks a
/// software-only (skipped) row, `1` enables hardware subdecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdec {
    Blank,
    SoftwareOnly,
    Hardware,
}

#[derive(Debug, Clone)]
pub struct InstructionRow {
    pub name: String,
    pub form: String,
    pub class: String,
    pub opcode: Option<u32>,
    pub xo: Option<u32>,
    pub subdec: Subdec,
    pub spr: String,
    pub bo: String,
    pub has_rc: String,
    pub has_oe: String,
    pub has_aa: String,
    pub has_lk: String,
    pub privilege: String,
    pub genlock: bool,
    pub de_op: String,
    pub exe_op: String,
    pub mem_op: String,
    pub wb_op: String,
}

impl InstructionRow {
    /// Rows without a form or opcode are commentary/synthetic and are
    /// ignored entirely; `Subdec=0` rows belong to the software decoder.
    pub fn is_decoded(&self) -> bool {
        !self.form.is_empty() && self.opcode.is_some() && self.subdec != Subdec::SoftwareOnly
    }
}

/// Split one CSV line into fields, honoring double-quoted fields with
/// `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cur.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if cur.is_empty() => quoted = true,
            ',' if !quoted => {
                fields.push(std::mem::take(&mut cur));
            }
            _ => cur.push(ch),
        }
    }
    fields.push(cur);
    fields
}

fn parse_opt_u32(field: &str, column: &str, name: &str) -> Result<Option<u32>> {
    if field.is_empty() {
        return Ok(None);
    }
    let v = field
        .parse()
        .with_context(|| format!("bad {column} value '{field}' for {name}"))?;
    Ok(Some(v))
}

/// Parse the whole table. Blank lines are skipped; the first non-blank
/// line is the header.
pub fn parse(src: &str) -> Result<Vec<InstructionRow>> {
    let mut lines = src.lines().map(str::trim_end).filter(|l| !l.is_empty());

    let header = match lines.next() {
        Some(h) => split_csv_line(h),
        None => bail!("empty instruction table"),
    };
    let index: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    for col in REQUIRED_COLUMNS {
        if !index.contains_key(col) {
            bail!("instruction table is missing required column '{col}'");
        }
    }

    let mut rows = Vec::new();
    for line in lines {
        let fields = split_csv_line(line);
        let get = |col: &str| -> &str {
            fields
                .get(index[col])
                .map(|s| s.as_str())
                .unwrap_or_default()
        };

        let name = get("Name").to_string();
        let subdec = match get("Subdec") {
            "0" => Subdec::SoftwareOnly,
            "1" => Subdec::Hardware,
            _ => Subdec::Blank,
        };
        rows.push(InstructionRow {
            opcode: parse_opt_u32(get("Opcode"), "Opcode", &name)?,
            xo: parse_opt_u32(get("XO"), "XO", &name)?,
            form: get("Form").to_string(),
            class: get("Class").to_string(),
            subdec,
            spr: get("spr").to_string(),
            bo: get("BO").to_string(),
            has_rc: get("Rc").to_string(),
            has_oe: get("SO").to_string(),
            has_aa: get("AA").to_string(),
            has_lk: get("LK").to_string(),
            privilege: get("Priv").to_string(),
            genlock: get("Lock") == "1",
            de_op: get("DE_OP").to_string(),
            exe_op: get("EXE_OP").to_string(),
            mem_op: get("MEM_OP").to_string(),
            wb_op: get("WB_OP").to_string(),
            name,
        });
    }
    Ok(rows)
}
