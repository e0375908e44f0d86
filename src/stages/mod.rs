//! Per-stage interpreters for the micro-op mini-language.
//!
//! Each instruction row carries one semicolon-separated behaviour string
//! per pipeline stage. An interpreter tries a fixed priority order of
//! recognizers against each operation; the first match emits effects, and
//! an operation matching nothing is a hard error (silently dropping
//! behaviour text would build hardware that decodes but does not act).

pub mod decode;
pub mod execute;
pub mod memory;
pub mod writeback;

/// A resource whose pending write must be visible to hazard checks.
///
/// Writeback emits `Unlock` effects for everything it writes; decode
/// mirrors each of them as a `Lock` on the same resource, so an issued
/// instruction holds its destinations until writeback retires them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockTarget {
    /// GPR write through a numbered writeback port (unlock side).
    GprPort(u8, String),
    /// GPR dependency without a port (lock side mirror).
    Gpr(String),
    Spr(String),
    /// Link register, guarded by a condition expression.
    Lr(String),
    /// Condition/overflow summary register, guarded by a condition.
    Xercr(String),
    /// Coarse single-resource lock used for SPRs and segment registers.
    Generic,
}

impl LockTarget {
    /// The decode-side counterpart of a writeback unlock. GPR port
    /// unlocks collapse to a plain GPR dependency.
    pub fn mirror(&self) -> LockTarget {
        match self {
            LockTarget::GprPort(_, reg) => LockTarget::Gpr(reg.clone()),
            other => other.clone(),
        }
    }

    fn render(&self, action: &str) -> String {
        match self {
            LockTarget::GprPort(port, reg) => format!("`{action}_GPR_PORT{port}({reg})"),
            LockTarget::Gpr(reg) => format!("`{action}_GPR({reg})"),
            LockTarget::Spr(spr) => format!("`{action}_SPR({spr})"),
            LockTarget::Lr(cond) => format!("`{action}_LR_IF({cond})"),
            LockTarget::Xercr(cond) => format!("`{action}_XERCR_IF({cond})"),
            LockTarget::Generic => format!("`{action}_GENERIC"),
        }
    }
}

/// One interpreted effect of a stage behaviour string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Drive a control signal.
    Assign { name: String, value: String },
    /// Release a resource when this instruction retires (writeback).
    Unlock(LockTarget),
    /// Hold a resource while this instruction is in flight (decode).
    Lock(LockTarget),
}

impl Effect {
    pub fn render(&self) -> String {
        match self {
            Effect::Assign { name, value } => format!("{name} = {value}"),
            Effect::Unlock(t) => t.render("UNLOCK"),
            Effect::Lock(t) => t.render("LOCK"),
        }
    }
}

/// Split a stage behaviour string into trimmed, non-empty operations.
pub fn split_ops(behaviour: &str) -> Vec<&str> {
    behaviour
        .split(';')
        .map(str::trim)
        .filter(|op| !op.is_empty())
        .collect()
}

/// Expand condition shorthand (`Rc`, `LK`, `SO`) to instruction-field
/// accessors, e.g. for "write LR if branch link".
pub fn convert_condition(cond: &str) -> String {
    cond.replace("Rc", "INST_Rc")
        .replace("LK", "INST_LK")
        .replace("SO", "INST_SO")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_trims_and_drops_empties() {
        assert_eq!(split_ops("A=RA; B=RB ;"), vec!["A=RA", "B=RB"]);
        assert_eq!(split_ops(""), Vec::<&str>::new());
        assert_eq!(split_ops("  ;  "), Vec::<&str>::new());
    }

    #[test]
    fn condition_shorthand() {
        assert_eq!(convert_condition("LK"), "INST_LK");
        assert_eq!(convert_condition("Rc"), "INST_Rc");
    }

    #[test]
    fn lock_mirrors_unlock() {
        let u = LockTarget::GprPort(0, "INST_RT".into());
        assert_eq!(u.render("UNLOCK"), "`UNLOCK_GPR_PORT0(INST_RT)");
        assert_eq!(u.mirror().render("LOCK"), "`LOCK_GPR(INST_RT)");
        assert_eq!(
            LockTarget::Generic.mirror().render("LOCK"),
            "`LOCK_GENERIC"
        );
    }
}
