//! Surface-syntax classification of push/pop operands.
//!
//! A single operand token selects one of three instruction forms:
//!
//! ```text
//! push 1          immediate
//! push ax         register
//! push [ax+2]     memory (register base + unsigned offset)
//! ```
//!
//! Classification precedence is fixed: a leading `[` commits to the memory
//! form (a malformed bracket expression never falls through to the other
//! forms), then an exact register-name match, then an f64 parse. Anything
//! else is a format error.

use crate::isa;

/// A classified push/pop operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Immediate(f64),
    Register(u8),
    Memory { reg: u8, offset: u16 },
}

/// Classify one operand token. `None` means the token fits no form.
pub fn classify(token: &str) -> Option<Operand> {
    if token.starts_with('[') {
        return classify_memory(token);
    }
    if let Some(id) = isa::reg_id(token) {
        return Some(Operand::Register(id));
    }
    token.parse::<f64>().ok().map(Operand::Immediate)
}

fn classify_memory(token: &str) -> Option<Operand> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    let plus = inner.find('+')?;
    let reg = isa::reg_id(&inner[..plus])?;
    let offset = inner[plus + 1..].parse::<u16>().ok()?;
    Some(Operand::Memory { reg, offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_forms() {
        assert_eq!(classify("1"), Some(Operand::Immediate(1.0)));
        assert_eq!(classify("-2.5"), Some(Operand::Immediate(-2.5)));
        assert_eq!(classify("bx"), Some(Operand::Register(1)));
        assert_eq!(classify("[dx+40]"), Some(Operand::Memory { reg: 3, offset: 40 }));
    }

    #[test]
    fn bracket_form_never_falls_through() {
        // "[7]" contains a parseable number but a leading bracket commits
        // to the memory form, so it is a format error.
        assert_eq!(classify("[7]"), None);
        assert_eq!(classify("[ax]"), None);
        assert_eq!(classify("[ax+]"), None);
        assert_eq!(classify("[ax+1"), None);
        assert_eq!(classify("[ex+1]"), None);
        assert_eq!(classify("[ax+-1]"), None);
    }

    #[test]
    fn register_match_is_exact() {
        // "axx" is not a register and not a number.
        assert_eq!(classify("axx"), None);
        assert_eq!(classify(""), None);
    }
}
