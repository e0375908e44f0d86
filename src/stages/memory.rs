//! Memory-stage interpreter.
//!
//! Cache-maintenance and TLB operations all collapse into the generic
//! `mem_op` code alongside loads and stores.

use anyhow::{bail, ensure, Result};
use regex::Regex;

use crate::signals::{SignalRegistry, Stage};
use crate::stages::{split_ops, Effect};

fn pass_thru(op: &str) -> Option<&str> {
    match op {
        "R0" => Some("R0"),
        "R1" => Some("R1"),
        _ => None,
    }
}

/// Load/store with width and optional modifier.
fn mem_op(op: &str) -> Option<(String, String, Option<String>)> {
    let re = Regex::new(r"^(L|S)(8|16|32)(_BS|_RSV)?$").unwrap();
    let caps = re.captures(op)?;
    let mtype = match &caps[1] {
        "L" => "`MEM_LOAD",
        _ => "`MEM_STORE",
    };
    Some((
        mtype.to_string(),
        format!("`MEM_OP_SIZE_{}", &caps[2]),
        caps.get(3).map(|m| m.as_str().to_string()),
    ))
}

fn cache_op(op: &str) -> Option<String> {
    let re = Regex::new(r"^(DC_INV.*|DC_CINV|DC_CLEAN|DC_BZ|IC_INV.*|TLBI.*)$").unwrap();
    let caps = re.captures(op)?;
    Some(format!("`MEM_{}", &caps[1]))
}

fn newpc_op(op: &str) -> Option<String> {
    let re = Regex::new(r"^newpc\s*=\s*(.*)$").unwrap();
    let caps = re.captures(op)?;
    Some(format!("`MEM_{}", &caps[1]))
}

fn newmsr_op(op: &str) -> Option<String> {
    let re = Regex::new(r"^newmsr\s*=\s*(.*)$").unwrap();
    let caps = re.captures(op)?;
    Some(format!("`MEM_{}", &caps[1]))
}

fn sr_op(op: &str) -> Option<String> {
    let re = Regex::new(r"^(SR_READ|SR_WRITE)$").unwrap();
    let caps = re.captures(op)?;
    Some(format!("`MEM_{}", &caps[1]))
}

pub fn interpret(name: &str, behaviour: &str, reg: &mut SignalRegistry) -> Result<Vec<Effect>> {
    let mut effects = Vec::new();

    for op in split_ops(behaviour) {
        if let Some(r) = pass_thru(op) {
            effects.push(reg.assign(Stage::Memory, format!("mem_pass_{r}"), "1"));
            continue;
        }

        if let Some((mtype, size, modifier)) = mem_op(op) {
            let is_store = mtype == "`MEM_STORE";
            effects.push(reg.assign(Stage::Memory, "mem_op", mtype));
            effects.push(reg.assign(Stage::Memory, "mem_op_size", size));
            match modifier.as_deref() {
                Some("_RSV") => {
                    ensure!(
                        is_store,
                        "{name}: reservation test is only valid on stores ('{op}')"
                    );
                    effects.push(reg.assign(Stage::Memory, "mem_op_addr_test_reservation", "1"));
                }
                Some("_BS") => {
                    effects.push(reg.assign(Stage::Memory, "mem_op_store_bswap", "1"));
                }
                Some(other) => bail!("{name}: memory option '{other}' unhandled in '{op}'"),
                None => {}
            }
            continue;
        }

        if let Some(cop) = cache_op(op) {
            effects.push(reg.assign(Stage::Memory, "mem_op", cop));
            continue;
        }

        if let Some(npc) = newpc_op(op) {
            effects.push(reg.assign(Stage::Memory, "mem_newpc", npc));
            effects.push(reg.assign(Stage::Memory, "mem_newpc_valid", "1"));
            continue;
        }

        if let Some(nmsr) = newmsr_op(op) {
            effects.push(reg.assign(Stage::Memory, "mem_newmsr", nmsr));
            effects.push(reg.assign(Stage::Memory, "mem_newmsr_valid", "1"));
            continue;
        }

        if op == "test_trap_R1_RC" {
            effects.push(reg.assign(Stage::Memory, "mem_test_trap_enable", "1"));
            continue;
        }

        if op == "nofault" {
            effects.push(reg.assign(Stage::Memory, "mem_op_fault_inhibit", "1"));
            continue;
        }

        if op == "RZV" {
            effects.push(reg.assign(Stage::Memory, "mem_op_addr_set_reservation", "1"));
            continue;
        }

        if let Some(sr) = sr_op(op) {
            effects.push(reg.assign(Stage::Memory, "mem_sr_op", sr));
            continue;
        }

        bail!("MEM: unhandled op '{op}' in instruction {name}");
    }

    Ok(effects)
}
