//! Decode-stage interpreter.
//!
//! Interpreted after writeback: every resource writeback unlocks is
//! mirrored here as a lock, so an in-flight instruction's pending write
//! is visible to later-issued instructions' hazard checks. Note the
//! hardware must cope with reading a register in DE that is written in
//! WB by the same instruction.

use anyhow::{bail, Result};
use regex::Regex;

use crate::signals::{SignalRegistry, Stage};
use crate::stages::{convert_condition, split_ops, Effect};

/// Immediate fields selectable by name on a read port.
const IMMEDIATE_FIELDS: [&str; 19] = [
    "SI", "SI_HI", "UI", "UI_HI", "BD", "BF", "BA", "BB", "BT", "D", "BFA", "FXM", "SH", "SR",
    "LI", "SH_MB_ME", "MB_ME", "TO", "0",
];

const GPR_SRC_NAMES: [&str; 4] = ["RA", "RA0", "RB", "RS"];

/// SPRs readable from each port.
const SPRS_PORT_A: [&str; 2] = ["spr_LR", "spr_SRR1"];
const SPRS_PORT_B: [&str; 0] = [];
const SPRS_PORT_C: [&str; 22] = [
    "spr_XER",
    "spr_LR",
    "spr_CTR",
    "spr_DSISR",
    "spr_DAR",
    "spr_DEC",
    "spr_SDR1",
    "spr_SRR0",
    "spr_SRR1",
    "spr_SPRG0",
    "spr_SPRG1",
    "spr_SPRG2",
    "spr_SPRG3",
    "spr_PVR",
    "spr_IBAT(bat_idx)",
    "spr_DBAT(bat_idx)",
    "spr_DABR",
    "spr_TBL",
    "spr_TBU",
    "spr_DEBUG",
    "spr_HID0",
    "spr_SR[SR]",
];

/// Segment-register sources, port C only.
const SRS_PORT_C: [&str; 2] = ["SReg(SR)", "SReg_indirect_gpr"];

/// Multi-cycle primitives triggered through the decode FSM.
const FSM_TRIGGERS: [&str; 4] = ["state_lmw", "state_stmw", "state_dcbz", "state_mfsrin"];

enum PortRead {
    Gpr(String),
    /// Zeroing-register variant: reads RA but checks for r0.
    GprZ(String),
    Imm(String),
    Spr(String),
    /// Recognized but not supported as a port source.
    Sr(String),
    Unknown(String),
}

/// Classify the right-hand side of an `A=`/`B=`/`C=` port read.
fn classify_port_read(op: &str, port: char, sprs: &[&str], srs: &[&str]) -> Option<PortRead> {
    let re = Regex::new(&format!("^{port}=(.*)")).unwrap();
    let caps = re.captures(op)?;
    let rval = &caps[1];
    if IMMEDIATE_FIELDS.contains(&rval) {
        return Some(PortRead::Imm(format!("`DE_IMM_{rval}")));
    }
    if GPR_SRC_NAMES.contains(&rval) {
        if rval == "RA0" {
            return Some(PortRead::GprZ("INST_RA".to_string()));
        }
        return Some(PortRead::Gpr(format!("INST_{rval}")));
    }
    if sprs.contains(&rval) {
        return Some(PortRead::Spr(format!("`DE_{rval}")));
    }
    if srs.contains(&rval) {
        return Some(PortRead::Sr(rval.to_string()));
    }
    Some(PortRead::Unknown(rval.to_string()))
}

/// Port D only ever sources XERCR and may be conditional.
fn portd_read(op: &str) -> Option<(Option<String>, String)> {
    let re = Regex::new(r"^(if\s*\((.*)\)){0,1}\s*D\s*=\s*(.*)").unwrap();
    let caps = re.captures(op)?;
    let cond = caps.get(2).map(|c| convert_condition(c.as_str()));
    Some((cond, caps[3].to_string()))
}

pub fn interpret(
    name: &str,
    behaviour: &str,
    genlock: bool,
    wb_effects: &[Effect],
    reg: &mut SignalRegistry,
) -> Result<Vec<Effect>> {
    let mut effects = Vec::new();

    // Lock whatever writeback will unlock.
    for e in wb_effects {
        if let Effect::Unlock(target) = e {
            effects.push(Effect::Lock(target.mirror()));
        }
    }

    if genlock {
        effects.push(reg.assign(Stage::Decode, "de_depends_generic", "1"));
    }

    'ops: for op in split_ops(behaviour) {
        let ports: [(char, &str, &[&str], &[&str]); 3] = [
            ('A', "a", &SPRS_PORT_A, &[]),
            ('B', "b", &SPRS_PORT_B, &[]),
            ('C', "c", &SPRS_PORT_C, &SRS_PORT_C),
        ];
        for (letter, p, sprs, srs) in ports {
            let Some(read) = classify_port_read(op, letter, sprs, srs) else {
                continue;
            };
            match read {
                PortRead::Gpr(gpr) => {
                    effects.push(reg.assign(Stage::Decode, format!("de_port{p}_type"), "`DE_GPR"));
                    effects.push(reg.assign(
                        Stage::Decode,
                        format!("de_port{p}_read_gpr_name"),
                        gpr,
                    ));
                }
                PortRead::GprZ(gpr) => {
                    effects.push(reg.assign(Stage::Decode, format!("de_port{p}_type"), "`DE_GPR"));
                    effects.push(reg.assign(
                        Stage::Decode,
                        format!("de_port{p}_read_gpr_name"),
                        &gpr,
                    ));
                    effects.push(reg.assign(
                        Stage::Decode,
                        format!("de_port{p}_checkz_gpr"),
                        format!("`CHECK_{gpr}"),
                    ));
                }
                PortRead::Imm(imm) => {
                    effects.push(reg.assign(Stage::Decode, format!("de_port{p}_type"), "`DE_IMM"));
                    effects.push(reg.assign(Stage::Decode, format!("de_port{p}_imm_name"), imm));
                }
                PortRead::Spr(spr) => {
                    effects.push(reg.assign(Stage::Decode, format!("de_port{p}_type"), "`DE_SPR"));
                    effects.push(reg.assign(
                        Stage::Decode,
                        format!("de_port{p}_read_spr_name"),
                        spr,
                    ));
                }
                PortRead::Sr(sr) => {
                    bail!("{name}: port {letter} segment-register read '{sr}' unhandled (op '{op}')")
                }
                PortRead::Unknown(rval) => {
                    bail!("{name}: port {letter} read '{rval}' unhandled (op '{op}')")
                }
            }
            continue 'ops;
        }

        if let Some((cond, value)) = portd_read(op) {
            if value != "XERCR" {
                bail!("{name}: port D read '{value}' unhandled (op '{op}')");
            }
            let cond = cond.unwrap_or_else(|| "1".to_string());
            effects.push(reg.assign(Stage::Decode, "de_portd_xercr_enable_cond", cond));
            continue;
        }

        if FSM_TRIGGERS.contains(&op) {
            effects.push(reg.assign(
                Stage::Decode,
                "de_fsm_op",
                format!("`DE_{}", op.to_uppercase()),
            ));
            continue;
        }

        if op.starts_with("FC_") {
            effects.push(reg.assign(Stage::Decode, "de_gen_fault_type", format!("`{op}")));
            continue;
        }

        bail!("DE: unhandled op '{op}' in instruction {name}");
    }

    Ok(effects)
}
