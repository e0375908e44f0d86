//! Registry of control signals discovered while interpreting stage behaviours.
//!
//! Signal names are collected per pipeline stage as a side effect of
//! building assignments. Widths and reset defaults are resolved against a
//! fixed, ordered rule table (first match wins), since many names are
//! programmatically suffixed (per-port, per-field variants).

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use tracing::warn;

use crate::stages::Effect;

/// Pipeline stage owning a signal assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Execute,
    Memory,
    Writeback,
}

/// Width rules, in priority order. Patterns are regex fragments matched
/// anywhere in the signal name.
const WIDTH_RULES: [(&str, u32); 35] = [
    ("enable", 1),
    ("gpr_name", 5),
    ("sr_name", 4),
    ("spr_name", 6),
    ("de_port._type", 3),
    ("de_depends_generic", 1),
    ("de_gen_fault_type", 4),
    ("de_port.*checkz", 1),
    ("de_port._imm_name", 4),
    ("de_fsm_op", 3),
    ("exe_int_op", 6),
    ("exe_special$", 6),
    ("exe_brcond", 4),
    ("exe_brdest_op", 2),
    ("exe_rc_op", 5),
    ("exe_R.$", 3),
    ("mem_op$", 4),
    ("mem_newpc", 1),
    ("mem_newmsr", 1),
    ("mem_pass_R.", 1),
    ("mem_op_fault_inhibit", 1),
    ("mem_op_addr_set_reservation", 1),
    ("mem_op_addr_test_reservation", 1),
    ("mem_op_size", 2),
    ("mem_op_store_bswap", 1),
    ("mem_sr_op", 2),
    ("wb_write_gpr_port.$", 1),
    ("wb_write_gpr_port._reg", 5),
    ("wb_write_gpr_port._from", 3),
    ("wb_write_spr(_special){0,1}$", 1),
    ("wb_write_spr_.*num", 6),
    ("wb_write_spr(_special){0,1}_from", 3),
    ("wb_write_sr$", 1),
    ("wb_write_sr_from", 3),
    ("wb_write_xercr", 1),
];

/// Reset defaults for signals whose "general case" is not all-zeroes.
/// In some cases this (currently) makes the signal a constant.
const DEFAULT_RULES: [(&str, &str); 11] = [
    ("de_porta_read_gpr_name", "INST_RA"),
    ("de_portb_read_gpr_name", "INST_RB"),
    ("de_portc_read_gpr_name", "INST_RS"),
    ("wb_write_gpr_port0_reg", "INST_RT"),
    ("wb_write_gpr_port1_reg", "INST_RA"),
    // mem_pass_R0 must only be 1 when there's valid bypass data
    ("mem_pass_R0", "1'b0"),
    // harmless to always pass R1
    ("mem_pass_R1", "1'b1"),
    ("wb_write_gpr_port0_from", "`WB_PORT_R0"),
    ("wb_write_gpr_port1_from", "`WB_PORT_R0"),
    ("wb_write_spr_from", "`WB_PORT_R0"),
    ("wb_write_spr_special_from", "`WB_PORT_R1"),
];

#[derive(Debug)]
pub struct SignalRegistry {
    de: BTreeSet<String>,
    exe: BTreeSet<String>,
    mem: BTreeSet<String>,
    wb: BTreeSet<String>,
    /// Writeback data sources seen on the right-hand side of writes,
    /// interned to their `WB_PORT_* macro names.
    wb_ports: BTreeMap<String, String>,
    width_rules: Vec<(Regex, u32)>,
    default_rules: Vec<(Regex, &'static str)>,
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalRegistry {
    pub fn new() -> Self {
        SignalRegistry {
            de: BTreeSet::new(),
            exe: BTreeSet::new(),
            mem: BTreeSet::new(),
            wb: BTreeSet::new(),
            wb_ports: BTreeMap::new(),
            width_rules: WIDTH_RULES
                .iter()
                .map(|(pat, w)| (Regex::new(pat).unwrap(), *w))
                .collect(),
            default_rules: DEFAULT_RULES
                .iter()
                .map(|(pat, v)| (Regex::new(pat).unwrap(), *v))
                .collect(),
        }
    }

    /// Record `name = value` for a stage, registering the name.
    pub fn assign(
        &mut self,
        stage: Stage,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Effect {
        let name = name.into();
        self.register(stage, &name);
        Effect::Assign {
            name,
            value: value.into(),
        }
    }

    pub fn register(&mut self, stage: Stage, name: &str) {
        let set = match stage {
            Stage::Decode => &mut self.de,
            Stage::Execute => &mut self.exe,
            Stage::Memory => &mut self.mem,
            Stage::Writeback => &mut self.wb,
        };
        if !set.contains(name) {
            set.insert(name.to_string());
        }
    }

    /// Intern a writeback data-source name, e.g. `R0` -> `` `WB_PORT_R0 ``.
    pub fn wb_port(&mut self, name: &str) -> String {
        self.wb_ports
            .entry(name.to_string())
            .or_insert_with(|| format!("`WB_PORT_{}", name.to_uppercase()))
            .clone()
    }

    pub fn wb_ports(&self) -> impl Iterator<Item = &str> {
        self.wb_ports.values().map(|s| s.as_str())
    }

    /// Resolve a signal's bit width against the rule table.
    pub fn width(&self, name: &str) -> u32 {
        for (re, width) in &self.width_rules {
            if re.is_match(name) {
                return *width;
            }
        }
        warn!("signal size for {} unknown, assuming 1!", name);
        1
    }

    /// Resolve a signal's reset default, if one is configured.
    pub fn default_value(&self, name: &str) -> Option<&'static str> {
        for (re, val) in &self.default_rules {
            if re.is_match(name) {
                return Some(val);
            }
        }
        None
    }

    pub fn stage_names(&self, stage: Stage) -> &BTreeSet<String> {
        match stage {
            Stage::Decode => &self.de,
            Stage::Execute => &self.exe,
            Stage::Memory => &self.mem,
            Stage::Writeback => &self.wb,
        }
    }

    /// The full deduplicated, lexically sorted signal set. Only meaningful
    /// once every row has been interpreted.
    pub fn total(&self) -> BTreeSet<String> {
        let mut all = self.de.clone();
        all.extend(self.exe.iter().cloned());
        all.extend(self.mem.iter().cloned());
        all.extend(self.wb.iter().cloned());
        all
    }
}
