//! Writeback-stage interpreter.
//!
//! Runs before the decode interpreter: decode must observe which
//! resources writeback will unlock so it can lock them at issue.

use anyhow::{bail, ensure, Result};
use regex::Regex;

use crate::signals::{SignalRegistry, Stage};
use crate::stages::{convert_condition, split_ops, Effect, LockTarget};

const SPR_SPECIALS: [&str; 3] = ["spr_LR", "spr_SRR1", "spr_DSISR"];

fn spr_macro(name: &str) -> String {
    format!("`DE_{name}")
}

/// If the op writes XERCR, return its condition (or "1"). A write of
/// XERCR from anything but the RC port is unsupported.
fn xercr_cond(op: &str) -> Result<Option<String>> {
    if op.contains("XERCR=RC") {
        if op.contains("if") {
            let re = Regex::new(r"if *\((.*)\)").unwrap();
            let caps = match re.captures(op) {
                Some(c) => c,
                None => bail!("malformed condition in '{op}'"),
            };
            return Ok(Some(convert_condition(&caps[1])));
        }
        return Ok(Some("1".to_string()));
    }
    if op.contains("XERCR=") {
        bail!("assignment to XERCR from non-RC port not supported: '{op}'");
    }
    Ok(None)
}

/// LR, SRR1 and DSISR may be written in the same cycle as another
/// register and go through a dedicated port, optionally conditional.
fn spr_special(op: &str) -> Option<(String, String, String)> {
    let re = Regex::new(r"((if) *\((.*)\) *){0,1} *(spr_LR|spr_SRR1|spr_DSISR)=(.*)").unwrap();
    let caps = re.captures(op)?;
    let cond = match caps.get(3) {
        Some(c) => convert_condition(c.as_str()),
        None => "1".to_string(),
    };
    Some((
        caps[4].to_string(),
        caps[5].to_string(),
        cond,
    ))
}

/// Ordinary (non-special) SPR write. Never conditional.
fn spr_write(op: &str) -> Option<(String, String)> {
    let re = Regex::new(r"(spr_.*)=(.*)").unwrap();
    let caps = re.captures(op)?;
    let spr = caps[1].to_string();
    // the special SPRs are consumed by spr_special before this runs
    if SPR_SPECIALS.contains(&spr.as_str()) {
        return None;
    }
    Some((spr, caps[2].to_string()))
}

fn gpr_write(op: &str) -> Option<(String, String)> {
    let re = Regex::new(r"(RA|RT)=(.*)").unwrap();
    let caps = re.captures(op)?;
    Some((format!("INST_{}", &caps[1]), caps[2].to_string()))
}

/// Write of the segment register indexed by the value in R1.
fn sr_write(op: &str) -> Option<String> {
    let re = Regex::new(r"SReg_R1=(.*)").unwrap();
    let caps = re.captures(op)?;
    Some(caps[1].to_string())
}

pub fn interpret(
    name: &str,
    behaviour: &str,
    genlock: bool,
    reg: &mut SignalRegistry,
) -> Result<Vec<Effect>> {
    let ops = split_ops(behaviour);
    let mut effects = Vec::new();
    let mut cur_gpr_port: u8 = 0;

    for op in &ops {
        if let Some(cond) = xercr_cond(op)? {
            effects.push(reg.assign(Stage::Writeback, "wb_write_xercr", &cond));
            effects.push(Effect::Unlock(LockTarget::Xercr(cond)));
            continue;
        }

        if let Some((spr, port, cond)) = spr_special(op) {
            let sprname = spr_macro(&spr);
            let port = reg.wb_port(&port);
            effects.push(reg.assign(Stage::Writeback, "wb_write_spr_special", &cond));
            effects.push(reg.assign(Stage::Writeback, "wb_write_spr_special_num", &sprname));
            effects.push(reg.assign(Stage::Writeback, "wb_write_spr_special_from", port));
            if spr == "spr_LR" {
                effects.push(Effect::Unlock(LockTarget::Lr(cond)));
            } else {
                // SRR1/DSISR are covered by the generic lock instead
                ensure!(
                    genlock,
                    "{name}: special SPR write '{op}' requires the generic lock"
                );
                effects.push(Effect::Unlock(LockTarget::Generic));
            }
            continue;
        }

        if let Some((spr, port)) = spr_write(op) {
            let sprname = spr_macro(&spr);
            let port = reg.wb_port(&port);
            effects.push(reg.assign(Stage::Writeback, "wb_write_spr", "1"));
            effects.push(reg.assign(Stage::Writeback, "wb_write_spr_num", &sprname));
            effects.push(reg.assign(Stage::Writeback, "wb_write_spr_from", port));
            if genlock {
                // generic-lock destinations are SPRs, never GPRs, and a
                // generically locked instruction writes nothing else
                ensure!(
                    ops.len() == 1,
                    "{name}: generic-locked SPR write '{op}' must be the only WB op"
                );
                effects.push(Effect::Unlock(LockTarget::Generic));
            } else {
                effects.push(Effect::Unlock(LockTarget::Spr(sprname)));
            }
            continue;
        }

        if let Some((gpr, port)) = gpr_write(op) {
            ensure!(
                cur_gpr_port < 2,
                "{name}: more than two GPR writes in writeback ('{op}')"
            );
            let port = reg.wb_port(&port);
            effects.push(reg.assign(
                Stage::Writeback,
                format!("wb_write_gpr_port{cur_gpr_port}"),
                "1",
            ));
            effects.push(reg.assign(
                Stage::Writeback,
                format!("wb_write_gpr_port{cur_gpr_port}_reg"),
                &gpr,
            ));
            effects.push(reg.assign(
                Stage::Writeback,
                format!("wb_write_gpr_port{cur_gpr_port}_from"),
                port,
            ));
            effects.push(Effect::Unlock(LockTarget::GprPort(cur_gpr_port, gpr)));
            cur_gpr_port += 1;
            continue;
        }

        if let Some(port) = sr_write(op) {
            // implicit write of the SR indexed by R1, data from the port
            let port = reg.wb_port(&port);
            effects.push(reg.assign(Stage::Writeback, "wb_write_sr", "1"));
            effects.push(reg.assign(Stage::Writeback, "wb_write_sr_from", port));
            ensure!(
                genlock && ops.len() == 1,
                "{name}: SR write '{op}' must be the sole op under the generic lock"
            );
            effects.push(Effect::Unlock(LockTarget::Generic));
            continue;
        }

        bail!("WB: unhandled op '{op}' in instruction {name}");
    }

    Ok(effects)
}
