//! Execute-stage interpreter.
//!
//! Most operations bind a functional unit to one of the three result
//! registers R0..R2. Two rows describing conflicting wiring (the same
//! unit issued twice, or two units driving one result register) is an
//! input-table authoring error and fails the build.

use anyhow::{bail, ensure, Result};
use regex::Regex;
use std::collections::BTreeSet;

use crate::signals::{SignalRegistry, Stage};
use crate::stages::{split_ops, Effect};

/// Integer-class unit operations (ALU, shifter, mul/div, sign-extend,
/// count-leading-zeros, status moves).
fn int_op(op: &str) -> Option<(String, String)> {
    let re = Regex::new(
        r"^(R[012])\s*=\s*(misc_cntlzw_a|sxt_8_a|sxt_16_a|D_TO_CR|D_TO_XER|MSR|sh_.*|div_.*|mul_.*|alu_.*)$",
    )
    .unwrap();
    let caps = re.captures(op)?;
    Some((caps[1].to_string(), format!("`EXOP_{}", caps[2].to_uppercase())))
}

fn brdest_op(op: &str) -> Option<(String, String)> {
    let re = Regex::new(r"^(R[012])\s*=\s*(br_dest.*)$").unwrap();
    let caps = re.captures(op)?;
    Some((caps[1].to_string(), format!("`EXOP_{}", caps[2].to_uppercase())))
}

/// Branch condition evaluation, e.g. `br_annul(T, Z)`. The parenthesized
/// condition is a (condition-register class, zero/nonzero test) pair;
/// omitting it means "always".
fn brcond_op(op: &str) -> Option<String> {
    let re = Regex::new(r"^br_.*annul(\((T|C|1),\s*(Z|NZ|1)\))?$").unwrap();
    let caps = re.captures(op)?;
    let cond = if caps.get(1).is_some() {
        let crc = caps[2].replace('1', "ONE").replace('0', "ZERO");
        let cdc = caps[3].replace('1', "ONE").replace('0', "ZERO");
        format!("BRCOND_{crc}_{cdc}")
    } else {
        "BRCOND_AL".to_string()
    };
    Some(format!("`EXOP_{cond}"))
}

/// Condition-register update specifier, `RC=<opts>`.
///
/// A small closed set of combinations uses a macro that decodes
/// instruction fields into the minimal required operation; anything else
/// maps directly, with the "always record" form `RcA` folded to `Rc`.
fn cr_op(op: &str) -> Option<String> {
    let re = Regex::new(r"^RC\s*=\s*(.*)$").unwrap();
    let caps = re.captures(op)?;
    let opts = &caps[1];
    match opts {
        "Rc" | "Rc_CA" | "Rc_SO" | "Rc_SO_CA" => Some(format!("`EVAL_EXOP_{}", opts.to_uppercase())),
        _ => Some(format!("`EXOP_{}", opts.replace("RcA", "Rc").to_uppercase())),
    }
}

/// Straight pass-through of an operand port; downstream muxing treats it
/// as a unit like the ALU output.
fn pthru_op(op: &str) -> Option<(String, String)> {
    let re = Regex::new(r"^(R[012])\s*=\s*(B\[7:4\]|A|B|C)$").unwrap();
    let caps = re.captures(op)?;
    Some((caps[1].to_string(), format!("`EXUNIT_PORT_{}", &caps[2])))
}

fn special_op(op: &str) -> bool {
    let re = Regex::new(r"^R0\s*=\s*debug$").unwrap();
    re.is_match(op)
}

fn pcinc_op(op: &str) -> Option<String> {
    let re = Regex::new(r"^(R[12])\s*=\s*PC4$").unwrap();
    let caps = re.captures(op)?;
    Some(caps[1].to_string())
}

pub fn interpret(name: &str, behaviour: &str, reg: &mut SignalRegistry) -> Result<Vec<Effect>> {
    let mut effects = Vec::new();
    let mut issued_ops: BTreeSet<String> = BTreeSet::new();
    let mut result_regs: BTreeSet<String> = BTreeSet::new();
    let mut has_brcond = false;

    let claim_result = |result_regs: &mut BTreeSet<String>, dest: &str| -> Result<()> {
        ensure!(
            result_regs.insert(dest.to_string()),
            "{name}: result register {dest} bound twice in execute stage"
        );
        Ok(())
    };

    'ops: for op in split_ops(behaviour) {
        let units: [(fn(&str) -> Option<(String, String)>, &str, &str); 2] = [
            (int_op, "exe_int_op", "INT"),
            (brdest_op, "exe_brdest_op", "BRDEST"),
        ];
        for (recognize, sig, unit) in units {
            if let Some((dest, unit_op)) = recognize(op) {
                ensure!(
                    issued_ops.insert(unit_op.clone()),
                    "{name}: unit operation {unit_op} issued twice in execute stage"
                );
                claim_result(&mut result_regs, &dest)?;
                effects.push(reg.assign(Stage::Execute, sig, unit_op));
                effects.push(reg.assign(
                    Stage::Execute,
                    format!("exe_{dest}"),
                    format!("`EXUNIT_{unit}"),
                ));
                continue 'ops;
            }
        }

        if let Some(rc) = cr_op(op) {
            claim_result(&mut result_regs, "RC")?;
            effects.push(reg.assign(Stage::Execute, "exe_rc_op", rc));
            continue;
        }

        if let Some(brcond) = brcond_op(op) {
            ensure!(
                !has_brcond,
                "{name}: more than one branch condition in execute stage"
            );
            effects.push(reg.assign(Stage::Execute, "exe_brcond", brcond));
            has_brcond = true;
            continue;
        }

        if let Some((dest, src)) = pthru_op(op) {
            claim_result(&mut result_regs, &dest)?;
            effects.push(reg.assign(Stage::Execute, format!("exe_{dest}"), src));
            continue;
        }

        if special_op(op) {
            // hard-wired to R0
            effects.push(reg.assign(Stage::Execute, "exe_special", "`EXOP_DEBUG"));
            effects.push(reg.assign(Stage::Execute, "exe_R0", "`EXUNIT_SPECIAL"));
            continue;
        }

        if let Some(dest) = pcinc_op(op) {
            effects.push(reg.assign(Stage::Execute, format!("exe_{dest}"), "`EXUNIT_PCINC"));
            continue;
        }

        bail!("EXE: unhandled op '{op}' in instruction {name}");
    }

    Ok(effects)
}
