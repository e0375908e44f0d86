//! Instruction records and the shared decode tree.
//!
//! Every instruction contributes an ordered list of (bit-range, pattern)
//! constraints, most-significant first. Folding them into one tree
//! enforces two global invariants: all instructions sharing a prefix
//! agree on which bits the next decode step inspects, and no two
//! instructions own the same dispatch leaf.

use std::collections::BTreeMap;

use anyhow::{bail, ensure, Result};
use tracing::warn;

use crate::stages::Effect;
use crate::subdecode::Subdecode;

/// A bit span of the instruction word: `len` bits starting at `start`
/// (LSB index), i.e. word bits `start+len-1 .. start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    pub start: u32,
    pub len: u32,
}

impl BitRange {
    pub fn msb(&self) -> u32 {
        self.start + self.len - 1
    }
}

pub const PRIMARY_OPCODE: BitRange = BitRange { start: 26, len: 6 };

/// One accepted instruction row, fully interpreted.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub name: String,
    pub form: String,
    /// 32-char `{0,1,?}` dispatch pattern over word bits 31..0.
    pub format: String,
    /// Human-readable decode summary for emitted comments.
    pub desc: String,
    pub de: Vec<Effect>,
    pub exe: Vec<Effect>,
    pub mem: Vec<Effect>,
    pub wb: Vec<Effect>,
    /// Ordered dispatch constraints, most-significant first.
    pub fields: Vec<(BitRange, String)>,
}

pub struct StageEffects {
    pub de: Vec<Effect>,
    pub exe: Vec<Effect>,
    pub mem: Vec<Effect>,
    pub wb: Vec<Effect>,
}

impl Instruction {
    /// Assemble the dispatch constraints and format string from opcode
    /// fields. Forms X/XL/XFX carry a 10-bit extended opcode at bits
    /// 10:1; form XO carries 9 bits at 9:1 with bit 10 wildcarded.
    pub fn new(
        name: &str,
        form: &str,
        opcode: u32,
        xo: Option<u32>,
        sub: Option<&Subdecode>,
        effects: StageEffects,
    ) -> Result<Instruction> {
        let mut fields: Vec<(BitRange, String)> = Vec::new();
        let mut desc = format!("{name}: {form}-form, Op {opcode} ");

        fields.push((PRIMARY_OPCODE, format!("{opcode:06b}")));

        match form {
            "X" | "XL" | "XFX" => {
                let xo = require_xo(name, form, xo)?;
                desc += &format!(" XOp {xo} ");
                fields.push((BitRange { start: 1, len: 10 }, format!("{xo:010b}")));
            }
            "XO" => {
                let xo = require_xo(name, form, xo)?;
                desc += &format!(" XOp {xo} ");
                fields.push((BitRange { start: 1, len: 10 }, format!("?{xo:09b}")));
            }
            _ => {}
        }

        if let Some(sub) = sub {
            let range = sub.bit_range();
            let pattern = sub.pattern();
            match sub.width() {
                5 => desc += &format!(" BO/mask {:05b}/{:05b} ", sub.value, sub.mask),
                10 => desc += &format!(" spr/mask {:010b}/{:010b} ", sub.value, sub.mask),
                w => {
                    // Kept from the original generator: a field the tree
                    // annotation step does not know is dropped with a
                    // warning, leaving the instruction to dispatch on
                    // opcode alone. See DESIGN.md.
                    warn!("unknown subdecode field width {w} for {name}, not decoded!");
                    return Self::finish(name, form, desc, fields, effects);
                }
            }
            fields.push((range, pattern));
        }

        Self::finish(name, form, desc, fields, effects)
    }

    fn finish(
        name: &str,
        form: &str,
        desc: String,
        fields: Vec<(BitRange, String)>,
        effects: StageEffects,
    ) -> Result<Instruction> {
        let mut format = vec![b'?'; 32];
        for (range, pattern) in &fields {
            ensure!(
                pattern.len() as u32 == range.len,
                "{name}: pattern '{pattern}' does not fill bits {}:{}",
                range.msb(),
                range.start
            );
            let pos = (31 - range.msb()) as usize;
            format[pos..pos + pattern.len()].copy_from_slice(pattern.as_bytes());
        }
        Ok(Instruction {
            name: name.to_string(),
            form: form.to_string(),
            format: String::from_utf8(format).unwrap(),
            desc,
            de: effects.de,
            exe: effects.exe,
            mem: effects.mem,
            wb: effects.wb,
            fields,
        })
    }
}

fn require_xo(name: &str, form: &str, xo: Option<u32>) -> Result<u32> {
    match xo {
        Some(xo) => Ok(xo),
        None => bail!("{name}: {form}-form requires an extended opcode"),
    }
}

/// A node of the decode tree: a dispatch leaf or a further bit-range to
/// inspect.
#[derive(Debug)]
pub enum DecodeNode {
    Leaf(Instruction),
    Branch {
        range: BitRange,
        children: BTreeMap<String, DecodeNode>,
    },
}

/// The shared decode tree, rooted on the primary opcode bits 31:26.
#[derive(Debug)]
pub struct DecodeTree {
    pub range: BitRange,
    pub children: BTreeMap<String, DecodeNode>,
}

impl Default for DecodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeTree {
    pub fn new() -> Self {
        DecodeTree {
            range: PRIMARY_OPCODE,
            children: BTreeMap::new(),
        }
    }

    /// Insert an instruction, walking its constraint list from the root.
    /// Each level must agree with the bit range already established for
    /// that level, and the final pattern must land in an empty slot.
    pub fn insert(&mut self, inst: Instruction) -> Result<()> {
        ensure!(!inst.fields.is_empty(), "{}: no decode fields", inst.name);

        let name = inst.name.clone();
        let mut level = &mut self.children;
        let mut level_range = self.range;
        let fields = inst.fields.clone();

        for (i, (range, pattern)) in fields.iter().enumerate() {
            ensure!(
                *range == level_range,
                "masks don't match for opcode {} ({}+{}), instr {}: expected {}+{}",
                pattern,
                range.start,
                range.len,
                name,
                level_range.start,
                level_range.len
            );

            let last = i + 1 == fields.len();
            if last {
                match level.get(pattern.as_str()) {
                    None => {
                        level.insert(pattern.clone(), DecodeNode::Leaf(inst));
                        return Ok(());
                    }
                    Some(DecodeNode::Leaf(other)) => bail!(
                        "opcode {} ({}+{}) already used for instr {}! (inserting {})",
                        pattern,
                        range.start,
                        range.len,
                        other.name,
                        name
                    ),
                    Some(DecodeNode::Branch { .. }) => bail!(
                        "opcode {} ({}+{}) subdecodes further, but {} has no sub-decode",
                        pattern,
                        range.start,
                        range.len,
                        name
                    ),
                }
            }

            let next_range = fields[i + 1].0;
            let node = level.entry(pattern.clone()).or_insert_with(|| {
                // first instruction to subdecode this opcode establishes
                // the next level's bit range
                DecodeNode::Branch {
                    range: next_range,
                    children: BTreeMap::new(),
                }
            });
            match node {
                DecodeNode::Branch { range, children } => {
                    level_range = *range;
                    level = children;
                }
                DecodeNode::Leaf(other) => bail!(
                    "opcode {} ({}+{}) is terminal for instr {}, but {} subdecodes it",
                    pattern,
                    range.start,
                    range.len,
                    other.name,
                    name
                ),
            }
        }
        unreachable!("constraint walk always ends at a leaf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subdecode;

    fn no_effects() -> StageEffects {
        StageEffects {
            de: vec![],
            exe: vec![],
            mem: vec![],
            wb: vec![],
        }
    }

    fn inst(name: &str, form: &str, opcode: u32, xo: Option<u32>) -> Instruction {
        Instruction::new(name, form, opcode, xo, None, no_effects()).unwrap()
    }

    #[test]
    fn format_covers_all_32_bits() {
        let i = inst("add", "XO", 31, Some(266));
        assert_eq!(i.format.len(), 32);
        assert_eq!(&i.format[0..6], "011111");
        assert_eq!(&i.format[22..31], format!("{:09b}", 266));
        // every field lands inside 31..0 exactly once
        let total: u32 = i.fields.iter().map(|(r, _)| r.len).sum();
        let msb = i.fields[0].0.msb();
        assert_eq!(msb, 31);
        assert_eq!(total, 6 + 10);
    }

    #[test]
    fn x_form_extended_opcode() {
        let i = inst("mfspr", "XFX", 31, Some(339));
        assert_eq!(i.fields[1].0, BitRange { start: 1, len: 10 });
        assert_eq!(i.fields[1].1, format!("{:010b}", 339));
    }

    #[test]
    fn xo_form_wildcards_oe_bit() {
        let i = inst("add", "XO", 31, Some(266));
        assert!(i.fields[1].1.starts_with('?'));
        assert_eq!(i.fields[1].1.len(), 10);
    }

    #[test]
    fn d_form_has_primary_only() {
        let i = inst("addi", "D", 14, None);
        assert_eq!(i.fields.len(), 1);
        assert_eq!(&i.format[6..], "??????????????????????????");
    }

    #[test]
    fn missing_xo_is_fatal() {
        assert!(Instruction::new("cmp", "X", 31, None, None, no_effects()).is_err());
    }

    #[test]
    fn duplicate_leaf_is_fatal() {
        let mut tree = DecodeTree::new();
        tree.insert(inst("a", "X", 31, Some(23))).unwrap();
        let err = tree.insert(inst("b", "X", 31, Some(23))).unwrap_err();
        assert!(err.to_string().contains("already used"));
    }

    #[test]
    fn disjoint_leaves_coexist() {
        let mut tree = DecodeTree::new();
        tree.insert(inst("a", "X", 31, Some(23))).unwrap();
        tree.insert(inst("b", "X", 31, Some(24))).unwrap();
        tree.insert(inst("c", "D", 14, None)).unwrap();
        let DecodeNode::Branch { children, .. } = &tree.children["011111"] else {
            panic!("opcode 31 should branch");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(tree.children["001110"], DecodeNode::Leaf(_)));
    }

    #[test]
    fn leaf_branch_collision_is_fatal() {
        let mut tree = DecodeTree::new();
        // opcode 31 terminal for one instruction, subdecoded by another
        tree.insert(inst("flat", "Z", 31, None)).unwrap();
        let err = tree.insert(inst("deep", "X", 31, Some(23))).unwrap_err();
        assert!(err.to_string().contains("terminal"));

        let mut tree = DecodeTree::new();
        tree.insert(inst("deep", "X", 31, Some(23))).unwrap();
        let err = tree.insert(inst("flat", "Z", 31, None)).unwrap_err();
        assert!(err.to_string().contains("subdecodes further"));
    }

    #[test]
    fn subdecoded_instructions_share_an_xo() {
        let mut tree = DecodeTree::new();
        let sd_ctr = subdecode::resolve("mtspr", "9", "").unwrap();
        let sd_lr = subdecode::resolve("mtspr", "8", "").unwrap();
        let a = Instruction::new("mtspr", "XFX", 31, Some(467), Some(&sd_ctr), no_effects())
            .unwrap();
        let b = Instruction::new("mtspr", "XFX", 31, Some(467), Some(&sd_lr), no_effects())
            .unwrap();
        tree.insert(a).unwrap();
        tree.insert(b).unwrap();
    }

    #[test]
    fn bo_subdecode_extends_format() {
        let sd = subdecode::resolve("bc", "", "0b001xx").unwrap();
        let i = Instruction::new("bc", "B", 16, None, Some(&sd), no_effects()).unwrap();
        assert_eq!(&i.format[6..11], "001??");
    }
}
