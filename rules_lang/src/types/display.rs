//! Display for RuleType
//!
//! Types print in source syntax. Literal types print as the type a value of
//! theirs occupies at runtime (the shell reports `1 + 2` as `sint64`); the
//! carried value is the value printer's business, not the type printer's.

use std::fmt;

use super::RuleType;

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Bool => f.write_str("bool"),
            RuleType::Sint8 => f.write_str("sint8"),
            RuleType::Sint16 => f.write_str("sint16"),
            RuleType::Sint32 => f.write_str("sint32"),
            RuleType::Sint64 => f.write_str("sint64"),
            RuleType::Uint8 => f.write_str("uint8"),
            RuleType::Uint16 => f.write_str("uint16"),
            RuleType::Uint32 => f.write_str("uint32"),
            RuleType::Uint64 => f.write_str("uint64"),
            RuleType::Fp32 => f.write_str("fp32"),
            RuleType::Fp64 => f.write_str("fp64"),
            RuleType::BoolLit(_) => f.write_str("bool"),
            RuleType::SintLit(_) => f.write_str("sint64"),
            RuleType::UintLit(_) => f.write_str("uint64"),
            RuleType::FloatLit(_) => f.write_str("fp64"),
            RuleType::StrLit { encoding, value } => {
                write!(f, "{}[{}]", encoding.unit_atomic(), encoding.unit_len(value))
            }
            RuleType::NullLit => f.write_str("null"),
            RuleType::Array { component, size } => match size {
                Some(n) => write!(f, "{}[{}]", component, n),
                None => write!(f, "{}[]", component),
            },
            RuleType::Tuple(members) => {
                f.write_str("{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                f.write_str("}")
            }
            RuleType::Structure { members } => {
                f.write_str("{")?;
                for (i, (name, member)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, member)?;
                }
                f.write_str("}")
            }
            RuleType::Any => f.write_str("any"),
        }
    }
}
