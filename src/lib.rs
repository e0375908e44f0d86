//! Decode generator for the MR CPU pipeline.
//!
//! Compiles a declarative instruction table into (a) a Verilog decode
//! body dispatching on the instruction word and driving per-stage
//! control signals, and (b) the matching auto-generated signal
//! definitions. One pass over the table interprets each row's four
//! stage behaviour strings, resolves any subdecode discrimination, and
//! folds the row into a shared decode tree; the tree and the signal
//! registry are rendered only after every row has been consumed.

pub mod emit;
pub mod logging;
pub mod signals;
pub mod stages;
pub mod subdecode;
pub mod table;
pub mod tree;

use anyhow::Result;
use tracing::{debug, trace};

pub use signals::{SignalRegistry, Stage};
pub use table::{InstructionRow, Subdec};
pub use tree::{DecodeTree, Instruction};

#[derive(Default)]
pub struct GenerateOption {
    /// Include string added to generated files. Reserved: accepted on
    /// the command line but not yet consumed by the writers.
    include: Option<String>,
}

impl GenerateOption {
    pub fn set_include(mut self, include: &str) -> Self {
        self.include = Some(include.to_string());
        self
    }
}

/// Everything one compiler run produces.
#[derive(Debug)]
pub struct Generated {
    /// Decoder body: signal defaults followed by the dispatch tree.
    pub decoder: String,
    /// Signal declarations, packed-bus layout and bundle list.
    pub sigdefs: String,
    /// Finalized registry, for reporting.
    pub registry: SignalRegistry,
}

/// Run the whole compilation over the instruction-table source.
pub fn generate(src: &str, option: GenerateOption) -> Result<Generated> {
    if let Some(include) = &option.include {
        trace!("include string '{include}' (currently unused)");
    }

    let rows = table::parse(src)?;
    let mut reg = SignalRegistry::new();
    let mut tree = DecodeTree::new();

    for (idx, row) in rows.iter().enumerate() {
        if !row.is_decoded() {
            continue;
        }
        let Some(opcode) = row.opcode else { continue };
        debug!(
            "{idx}: {} {opcode}:{} {:?}",
            row.name,
            row.xo.map_or(-1, |x| x as i64),
            row.subdec
        );

        // Writeback first: decode must observe what it will unlock.
        let wb = stages::writeback::interpret(&row.name, &row.wb_op, row.genlock, &mut reg)?;
        let mem = stages::memory::interpret(&row.name, &row.mem_op, &mut reg)?;
        let exe = stages::execute::interpret(&row.name, &row.exe_op, &mut reg)?;
        let de = stages::decode::interpret(&row.name, &row.de_op, row.genlock, &wb, &mut reg)?;

        for (label, effects) in [(" DE", &de), ("EXE", &exe), ("MEM", &mem), (" WB", &wb)] {
            for e in effects {
                trace!("{label}:\t{}", e.render());
            }
        }

        let sub = match row.subdec {
            Subdec::Hardware => Some(subdecode::resolve(&row.name, &row.spr, &row.bo)?),
            _ => None,
        };

        let inst = Instruction::new(
            &row.name,
            &row.form,
            opcode,
            row.xo,
            sub.as_ref(),
            tree::StageEffects { de, exe, mem, wb },
        )?;
        tree.insert(inst)?;
    }

    Ok(Generated {
        decoder: emit::render_decoder(&tree, &reg),
        sigdefs: emit::render_sigdefs(&reg),
        registry: reg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const SMALL_TABLE: &str = "\
Name,Form,Class,Opcode,XO,Subdec,spr,BO,Rc,SO,AA,LK,Priv,Lock,DE_OP,EXE_OP,MEM_OP,WB_OP
addi,D,Int,14,,,,,,,,,,0,A=RA0;B=SI,R0=alu_add,R0,RT=R0
add,XO,Int,31,266,,,,1,1,,,,0,A=RA;B=RB,R0=alu_add;RC=Rc_SO,R0,RT=R0;if (Rc) XERCR=RC
lwz,D,Ld,32,,,,,,,,,,0,A=RA0;B=D,R0=alu_add,L32,RT=R0
mtspr,XFX,Spr,31,467,1,9,,,,,,,0,C=RS,R0=C,R0,spr_CTR=R0
";

    #[test]
    fn smoke_generate() {
        let out = generate(SMALL_TABLE, GenerateOption::default()).unwrap();
        assert!(out.decoder.contains("casez(instruction[31:26])"));
        assert!(out.decoder.contains("6'b011111: begin"));
        assert!(out.decoder.contains("name = \"add\";"));
        assert!(out.sigdefs.contains("`define DEC_AUTO_SIGS_DECLARE"));
        assert!(out
            .registry
            .stage_names(Stage::Writeback)
            .contains("wb_write_gpr_port0"));
    }

    #[test]
    fn every_leaf_reachable_via_full_word_coverage() {
        let out = generate(SMALL_TABLE, GenerateOption::default()).unwrap();
        // primary-only leaves dispatch at the case level; nested ones
        // get an extended-opcode condition
        assert!(out.decoder.contains("6'b001110: begin"));
        // mtctr: exact extended opcode 467, then the swizzled SPR field
        assert!(out.decoder.contains("instruction[10:1] == 10'b0111010011"));
        assert!(out
            .decoder
            .contains("instruction[20:11] == 10'b0100100000"));
        // add: XO form wildcards the OE bit above its 9-bit opcode
        assert!(out
            .decoder
            .contains("/* [10:1] = ?100001010 */ (instruction[9:1] == 9'b100001010)"));
    }
}
