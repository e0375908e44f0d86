//! Subdecode resolution for instructions that alias the same primary and
//! extended opcode, discriminated by the SPR-number or branch-options
//! field instead.

use anyhow::{bail, Result};
use regex::Regex;

use crate::tree::BitRange;

/// Instructions discriminated by the branch-options field.
const USES_BO: [&str; 3] = ["bc", "bclr", "bcctr"];
/// Instructions discriminated by the SPR-number field.
const USES_SPR: [&str; 3] = ["mfspr", "mtspr", "mftb"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdecodeField {
    /// 10-bit SPR number at instruction bits 20:11.
    Spr,
    /// 5-bit branch options at instruction bits 25:21.
    BranchOptions,
}

/// A resolved discriminating field match: value plus a wildcard mask
/// where a 1 bit means don't-care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subdecode {
    pub field: SubdecodeField,
    pub value: u32,
    pub mask: u32,
}

impl Subdecode {
    pub fn width(&self) -> u32 {
        match self.field {
            SubdecodeField::Spr => 10,
            SubdecodeField::BranchOptions => 5,
        }
    }

    pub fn bit_range(&self) -> BitRange {
        match self.field {
            SubdecodeField::Spr => BitRange { start: 11, len: 10 },
            SubdecodeField::BranchOptions => BitRange { start: 21, len: 5 },
        }
    }

    /// Render value/mask as a fixed-width `{0,1,?}` pattern, MSB first.
    pub fn pattern(&self) -> String {
        let width = self.width();
        let mut s = String::with_capacity(width as usize);
        for i in (0..width).rev() {
            if self.mask >> i & 1 == 1 {
                s.push('?');
            } else if self.value >> i & 1 == 1 {
                s.push('1');
            } else {
                s.push('0');
            }
        }
        s
    }
}

/// The instruction word encodes the architectural SPR number as two
/// swapped 5-bit groups; exchange bits 4:0 and 9:5. Involutive.
pub fn spr_swizzle(v: u32) -> u32 {
    ((v >> 5) & 0x1f) | ((v << 5) & 0x3e0)
}

fn parse_plain_int(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = s.strip_prefix("0b") {
        u32::from_str_radix(bin, 2).ok()
    } else {
        s.parse().ok()
    }
}

/// Parse a match specifier: a plain integer (exact match, empty mask) or
/// a binary literal with `x` marking don't-care bit positions.
fn parse_match_literal(s: &str) -> Result<(u32, u32)> {
    if let Some(val) = parse_plain_int(s) {
        return Ok((val, 0));
    }
    let re = Regex::new(r"^0b[01x]+$").unwrap();
    if !re.is_match(s) {
        bail!("bad subdecode match literal '{s}'");
    }
    let bits = &s[2..];
    let val = u32::from_str_radix(&bits.replace('x', "0"), 2)?;
    let mask = u32::from_str_radix(&bits.replace('1', "0").replace('x', "1"), 2)?;
    Ok((val, mask))
}

/// Resolve the discriminating field for a row flagged for subdecode.
/// `spr` and `bo` are the raw match-specifier columns.
pub fn resolve(name: &str, spr: &str, bo: &str) -> Result<Subdecode> {
    let (field, literal) = if USES_BO.contains(&name) {
        (SubdecodeField::BranchOptions, bo)
    } else if USES_SPR.contains(&name) {
        (SubdecodeField::Spr, spr)
    } else {
        bail!("unsupported subdecode case for instruction {name}");
    };

    let (mut value, mut mask) = parse_match_literal(literal)?;
    if field == SubdecodeField::Spr {
        value = spr_swizzle(value);
        mask = spr_swizzle(mask);
    }

    Ok(Subdecode { field, value, mask })
}
