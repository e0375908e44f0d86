//! Rendering of the decode tree as Verilog dispatch code, and of the
//! signal registry as an auto-generated definitions header.
//!
//! The root level is a `casez` over the primary opcode (exact patterns
//! only); every nested level is an if/else-if chain, because wildcarded
//! patterns there need compound bit-equality conditions that a plain
//! case item cannot express. Every level ends in an unconditional fault
//! default, so all 2^32 word values decode to something.

use std::fmt::Write;

use tracing::trace;

use crate::signals::SignalRegistry;
use crate::stages::Effect;
use crate::tree::{BitRange, DecodeNode, DecodeTree, Instruction};

/// Name of the 32-bit input word the generated code dispatches on.
const WORD: &str = "instruction";

const FAULT_DEFAULT: &str = "de_gen_fault_type = `FC_PROG_ILL;";

fn condition_term(msb: u32, lsb: u32, bits: &str) -> String {
    if bits.len() == 1 {
        format!("{WORD}[{msb}] == 1'b{bits}")
    } else {
        format!("{WORD}[{msb}:{lsb}] == {}'b{bits}", bits.len())
    }
}

/// Build an if() condition matching `pattern` at `range`. Wildcards
/// split the span into contiguous fixed-bit runs, one equality term per
/// run, ANDed together.
pub fn condition(range: BitRange, pattern: &str) -> String {
    if !pattern.contains('?') {
        return format!(
            "{WORD}[{}:{}] == {}'b{pattern}",
            range.msb(),
            range.start,
            range.len
        );
    }

    trace!("scanning condition {} at {}:{}", pattern, range.msb(), range.start);
    let mut terms = Vec::new();
    let mut run = String::new();
    let mut msb = range.msb();
    for ch in pattern.chars() {
        if ch == '?' {
            if !run.is_empty() {
                terms.push(condition_term(msb, msb - run.len() as u32 + 1, &run));
            }
            msb = msb.wrapping_sub(run.len() as u32 + 1);
            run.clear();
        } else {
            run.push(ch);
        }
    }
    if !run.is_empty() {
        terms.push(condition_term(msb, msb - run.len() as u32 + 1, &run));
    }

    let joined = terms
        .iter()
        .map(|t| format!("({t})"))
        .collect::<Vec<_>>()
        .join(" && ");
    format!(
        "/* [{}:{}] = {pattern} */ {joined}",
        range.msb(),
        range.start
    )
}

/// Render one instruction leaf: traceability comment, name, and each
/// stage's signal assignments.
fn render_leaf(inst: &Instruction, indent: &str) -> String {
    fn stage_line(s: &mut String, indent: &str, label: &str, effects: &[Effect]) {
        write!(s, "{indent}/* {label} */  ").unwrap();
        for e in effects {
            write!(s, "  {};", e.render()).unwrap();
        }
        s.push('\n');
    }

    let mut s = format!("{indent}/* {} {} */\n", inst.format, inst.desc);
    writeln!(s, "{indent}name = \"{}\";", inst.name).unwrap();
    stage_line(&mut s, indent, "DE: ", &inst.de);
    stage_line(&mut s, indent, "EXE:", &inst.exe);
    stage_line(&mut s, indent, "MEM:", &inst.mem);
    stage_line(&mut s, indent, "WB: ", &inst.wb);
    s
}

/// Depth-first rendering of one tree level.
fn render_level(
    children: &std::collections::BTreeMap<String, DecodeNode>,
    range: BitRange,
    level: usize,
) -> String {
    let idt = "\t".repeat(level);
    let iidt = format!("{idt}\t");
    // casez at the top level only; nested levels may carry wildcards
    let make_case = level == 0;
    let mut s = String::new();
    let mut first = true;

    if make_case {
        writeln!(s, "{idt}casez({WORD}[{}:{}])", range.msb(), range.start).unwrap();
    }

    for (pattern, node) in children {
        if make_case {
            write!(s, "\n{idt}{}'b{pattern}: begin\n", range.len).unwrap();
        } else {
            let cond = condition(range, pattern);
            let lead = if first { idt.as_str() } else { "else " };
            write!(s, "{lead}if ({cond}) begin\n").unwrap();
        }

        match node {
            DecodeNode::Leaf(inst) => s += &render_leaf(inst, &iidt),
            DecodeNode::Branch { range, children } => {
                s += &render_level(children, *range, level + 1)
            }
        }

        write!(s, "\n{idt}end ").unwrap();
        if make_case {
            s.push('\n');
        }
        first = false;
    }

    if make_case {
        write!(s, "\n{idt}default:\n{iidt}{FAULT_DEFAULT}\n\n").unwrap();
        writeln!(s, "{idt}endcase").unwrap();
    } else {
        write!(s, "else begin\n{iidt}{FAULT_DEFAULT}\n{idt}end\n").unwrap();
    }

    s
}

/// Render the full decoder body: default-initialize every discovered
/// signal, then dispatch from the primary opcode.
pub fn render_decoder(tree: &DecodeTree, reg: &SignalRegistry) -> String {
    let mut s = String::new();
    for sig in reg.total() {
        match reg.default_value(&sig) {
            Some(val) => writeln!(s, "\t{sig} = {val};").unwrap(),
            None => {
                let width = reg.width(&sig);
                writeln!(s, "\t{sig} = {width}'b{};", "0".repeat(width as usize)).unwrap()
            }
        }
    }
    s.push('\n');
    s += &render_level(&tree.children, tree.range, 0);
    s
}

/// Render the signal-definitions header: declarations, total size, the
/// packed-bus bit layout and the bundle name list.
pub fn render_sigdefs(reg: &SignalRegistry) -> String {
    let sigs = reg.total();

    let mut s = String::from("`ifndef AUTOSIGDEFS_VH\n`define AUTOSIGDEFS_VH\n\n");
    s += "`define DEC_AUTO_SIGS_DECLARE \\\n";
    s += "/* verilator lint_off UNUSED */\\\n";
    let mut total_size = 0;
    for sig in &sigs {
        let width = reg.width(sig);
        let decl = if width == 1 {
            "\t".to_string()
        } else {
            format!("[{}:0] ", width - 1)
        };
        writeln!(s, "reg {decl}\t{sig};  \\").unwrap();
        total_size += width;
    }
    s += "/* verilator lint_on UNUSED */\\\n";
    // permits ; after statement
    s += "if (0)\n\n";
    writeln!(s, "`define DEC_AUTO_SIGS_SIZE {total_size}\n").unwrap();

    // Spans within the packed bundle: reverse-sorted names from bit 0 up,
    // so the bundle list below concatenates onto the bus directly.
    let mut bitpos = 0;
    for sig in sigs.iter().rev() {
        let width = reg.width(sig);
        if width == 1 {
            writeln!(s, "`define DEC_RANGE_{}  {bitpos}", sig.to_uppercase()).unwrap();
        } else {
            writeln!(
                s,
                "`define DEC_RANGE_{}  {}:{bitpos}",
                sig.to_uppercase(),
                bitpos + width - 1
            )
            .unwrap();
        }
        bitpos += width;
    }
    s.push('\n');

    let bundle = sigs.iter().cloned().collect::<Vec<_>>().join(", ");
    writeln!(s, "`define DEC_AUTO_SIGS_BUNDLE {bundle}").unwrap();
    s += "\n`endif\n";
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Stage;

    #[test]
    fn exact_condition_is_single_equality() {
        let c = condition(BitRange { start: 1, len: 10 }, "0000010111");
        assert_eq!(c, "instruction[10:1] == 10'b0000010111");
    }

    #[test]
    fn wildcard_condition_splits_fixed_runs() {
        // branch-options pattern 001?? at bits 25:21: one fixed run
        let c = condition(BitRange { start: 21, len: 5 }, "001??");
        assert_eq!(c, "/* [25:21] = 001?? */ (instruction[25:23] == 3'b001)");
    }

    #[test]
    fn wildcard_condition_multiple_runs() {
        let c = condition(BitRange { start: 11, len: 10 }, "01?0?1???1");
        assert_eq!(
            c,
            "/* [20:11] = 01?0?1???1 */ (instruction[20:19] == 2'b01) \
             && (instruction[17] == 1'b0) && (instruction[15] == 1'b1) \
             && (instruction[11] == 1'b1)"
        );
    }

    /// Evaluate a synthesized condition against a concrete word by
    /// parsing its equality terms back out.
    fn eval_condition(cond: &str, word: u32) -> bool {
        let re = regex::Regex::new(r"instruction\[(\d+)(?::(\d+))?\] == \d+'b([01]+)").unwrap();
        let mut any = false;
        let ok = re.captures_iter(cond).all(|c| {
            any = true;
            let msb: u32 = c[1].parse().unwrap();
            let lsb: u32 = c.get(2).map(|m| m.as_str().parse().unwrap()).unwrap_or(msb);
            let bits = u32::from_str_radix(&c[3], 2).unwrap();
            let width = msb - lsb + 1;
            (word >> lsb) & ((1u32 << width) - 1) == bits
        });
        any && ok
    }

    #[test]
    fn wildcard_condition_matches_any_filling() {
        let range = BitRange { start: 21, len: 5 };
        let c = condition(range, "001??");
        // all fillings of the don't-care bits must satisfy the condition
        for filler in [0b00100u32, 0b00101, 0b00110, 0b00111] {
            assert!(eval_condition(&c, filler << 21));
        }
        assert!(!eval_condition(&c, 0b01100 << 21));

        let c = condition(BitRange { start: 1, len: 10 }, "?000010111");
        assert!(eval_condition(&c, 0b0000010111 << 1));
        assert!(eval_condition(&c, 0b1000010111 << 1));
        assert!(!eval_condition(&c, 0b0000010110 << 1));
    }

    #[test]
    fn default_block_assigns_every_signal_once() {
        let mut reg = SignalRegistry::new();
        reg.register(Stage::Memory, "mem_pass_R1");
        reg.register(Stage::Memory, "mem_op");
        reg.register(Stage::Decode, "de_gen_fault_type");
        let tree = DecodeTree::new();
        let body = render_decoder(&tree, &reg);
        assert!(body.contains("\tmem_pass_R1 = 1'b1;\n"));
        assert!(body.contains("\tmem_op = 4'b0000;\n"));
        assert!(body.contains("\tde_gen_fault_type = 4'b0000;\n"));
        assert_eq!(body.matches("mem_op =").count(), 1);
    }

    #[test]
    fn sigdefs_layout_is_reverse_sorted_from_bit_zero() {
        let mut reg = SignalRegistry::new();
        reg.register(Stage::Memory, "mem_op"); // width 4
        reg.register(Stage::Memory, "mem_op_size"); // width 2
        let defs = render_sigdefs(&reg);
        assert!(defs.contains("`define DEC_AUTO_SIGS_SIZE 6"));
        // reverse-sorted: mem_op_size occupies the low bits
        assert!(defs.contains("`define DEC_RANGE_MEM_OP_SIZE  1:0"));
        assert!(defs.contains("`define DEC_RANGE_MEM_OP  5:2"));
        assert!(defs.contains("`define DEC_AUTO_SIGS_BUNDLE mem_op, mem_op_size"));
        assert!(defs.starts_with("`ifndef AUTOSIGDEFS_VH"));
        assert!(defs.ends_with("`endif\n"));
    }
}
