//! The RulesLang type lattice
//!
//! Atomic numerics and `bool` live on the value stack; composites, strings,
//! and `any` are reference types backed by the heap. Literal types are
//! singletons carrying their value; they widen into atomics under the
//! conversion relation and are lifted to atomics by `var` declarations.
//!
//! The two operations everything else is built on are
//! [`RuleType::convertible_to`] (the `A <: B` relation of the conversion
//! lattice) and [`RuleType::join`] (least upper bound).

mod display;
pub mod identity;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

/// Code-unit encoding of a string literal type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrEncoding {
    Utf8,
    Utf16,
    Utf32,
}

impl StrEncoding {
    /// Size of one code unit in bytes
    pub fn unit_size(self) -> usize {
        match self {
            StrEncoding::Utf8 => 1,
            StrEncoding::Utf16 => 2,
            StrEncoding::Utf32 => 4,
        }
    }

    /// The atomic type of one code unit
    pub fn unit_atomic(self) -> RuleType {
        match self {
            StrEncoding::Utf8 => RuleType::Uint8,
            StrEncoding::Utf16 => RuleType::Uint16,
            StrEncoding::Utf32 => RuleType::Uint32,
        }
    }

    /// Number of code units `value` occupies in this encoding
    pub fn unit_len(self, value: &str) -> usize {
        match self {
            StrEncoding::Utf8 => value.len(),
            StrEncoding::Utf16 => value.encode_utf16().count(),
            StrEncoding::Utf32 => value.chars().count(),
        }
    }
}

/// A RulesLang type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleType {
    // Atomic types
    Bool,
    Sint8,
    Sint16,
    Sint32,
    Sint64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Fp32,
    Fp64,

    // Literal types (singletons carrying their value)
    BoolLit(bool),
    SintLit(i64),
    UintLit(u64),
    FloatLit(f64),
    StrLit {
        encoding: StrEncoding,
        value: String,
    },
    NullLit,

    // Composite (reference) types
    Array {
        component: Box<RuleType>,
        size: Option<u64>,
    },
    Tuple(Vec<RuleType>),
    Structure {
        members: Vec<(String, RuleType)>,
    },
    /// The empty-open structure; supertype of every reference type
    Any,
}

impl RuleType {
    /// Bit width of an atomic numeric type
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            RuleType::Sint8 | RuleType::Uint8 => Some(8),
            RuleType::Sint16 | RuleType::Uint16 => Some(16),
            RuleType::Sint32 | RuleType::Uint32 | RuleType::Fp32 => Some(32),
            RuleType::Sint64 | RuleType::Uint64 | RuleType::Fp64 => Some(64),
            _ => None,
        }
    }

    /// Check if this is an atomic signed integer type
    pub fn is_signed_int(&self) -> bool {
        matches!(
            self,
            RuleType::Sint8 | RuleType::Sint16 | RuleType::Sint32 | RuleType::Sint64
        )
    }

    /// Check if this is an atomic unsigned integer type
    pub fn is_unsigned_int(&self) -> bool {
        matches!(
            self,
            RuleType::Uint8 | RuleType::Uint16 | RuleType::Uint32 | RuleType::Uint64
        )
    }

    /// Check if this is an atomic integer type
    pub fn is_integer(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// Check if this is an atomic float type
    pub fn is_float(&self) -> bool {
        matches!(self, RuleType::Fp32 | RuleType::Fp64)
    }

    /// Check if this is an atomic numeric type
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Check if this is an integer literal type
    pub fn is_integer_literal(&self) -> bool {
        matches!(self, RuleType::SintLit(_) | RuleType::UintLit(_))
    }

    /// Check if values of this type live on the heap
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            RuleType::Array { .. }
                | RuleType::Tuple(_)
                | RuleType::Structure { .. }
                | RuleType::StrLit { .. }
                | RuleType::NullLit
                | RuleType::Any
        )
    }

    /// Lift a literal type to the atomic (or reference) type a `var`
    /// declaration gives it; non-literal types lift to themselves
    pub fn lift(&self) -> RuleType {
        match self {
            RuleType::BoolLit(_) => RuleType::Bool,
            RuleType::SintLit(_) => RuleType::Sint64,
            RuleType::UintLit(_) => RuleType::Uint64,
            RuleType::FloatLit(_) => RuleType::Fp64,
            RuleType::StrLit { encoding, .. } => RuleType::Array {
                component: Box::new(encoding.unit_atomic()),
                size: None,
            },
            RuleType::NullLit => RuleType::Any,
            other => other.clone(),
        }
    }

    /// The conversion relation `self <: target` (specific-to-general)
    pub fn convertible_to(&self, target: &RuleType) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            // Same-signedness widening; unsigned fits in strictly wider signed.
            (a, b) if a.is_signed_int() && b.is_signed_int() => {
                a.bit_width() <= b.bit_width()
            }
            (a, b) if a.is_unsigned_int() && b.is_unsigned_int() => {
                a.bit_width() <= b.bit_width()
            }
            (a, b) if a.is_unsigned_int() && b.is_signed_int() => {
                a.bit_width() < b.bit_width()
            }
            (RuleType::Fp32, RuleType::Fp64) => true,

            // Literal types into atomics, when the value fits.
            (RuleType::BoolLit(_), RuleType::Bool) => true,
            (RuleType::SintLit(v), b) => int_fits(I128::from(*v), b),
            (RuleType::UintLit(v), b) => int_fits(I128::from(*v), b),
            (RuleType::FloatLit(v), RuleType::Fp32) => (*v as f32).is_finite() || v.is_nan(),
            (RuleType::FloatLit(_), RuleType::Fp64) => true,

            // String literals re-encode freely and widen to code-unit arrays.
            (
                RuleType::StrLit { value, .. },
                RuleType::StrLit {
                    value: other_value, ..
                },
            ) => value == other_value,
            (RuleType::StrLit { value, .. }, RuleType::Array { component, size }) => {
                let Some(encoding) = encoding_of_component(component) else {
                    return false;
                };
                match size {
                    None => true,
                    Some(n) => *n == encoding.unit_len(value) as u64,
                }
            }

            // Null converts to every reference type.
            (RuleType::NullLit, b) => b.is_reference(),

            // Composites.
            (
                RuleType::Array { component, size },
                RuleType::Array {
                    component: target_component,
                    size: target_size,
                },
            ) => {
                component.convertible_to(target_component)
                    && match target_size {
                        None => true,
                        Some(m) => *size == Some(*m),
                    }
            }
            (RuleType::Tuple(members), RuleType::Tuple(target_members)) => {
                members.len() == target_members.len()
                    && members
                        .iter()
                        .zip(target_members)
                        .all(|(a, b)| a.convertible_to(b))
            }
            (RuleType::Structure { members }, RuleType::Structure { members: wanted }) => {
                wanted.iter().all(|(name, target_ty)| {
                    members
                        .iter()
                        .find(|(n, _)| n == name)
                        .is_some_and(|(_, ty)| ty.convertible_to(target_ty))
                })
            }
            (a, RuleType::Any) => a.is_reference(),

            _ => false,
        }
    }

    /// Least upper bound of two types; `None` when no common type exists
    pub fn join(&self, other: &RuleType) -> Option<RuleType> {
        if self.convertible_to(other) {
            return Some(other.clone());
        }
        if other.convertible_to(self) {
            return Some(self.clone());
        }

        // Numeric joins go through the atomic candidates, narrowest first.
        let numeric_like = |t: &RuleType| {
            t.is_numeric() || t.is_integer_literal() || matches!(t, RuleType::FloatLit(_))
        };
        if numeric_like(self) && numeric_like(other) {
            for candidate in ATOMIC_JOIN_ORDER {
                if self.convertible_to(candidate) && other.convertible_to(candidate) {
                    return Some(candidate.clone());
                }
            }
            return None;
        }

        // Reference joins: structures keep their common members, everything
        // else meets at `any`.
        match (self, other) {
            (RuleType::Structure { members: a }, RuleType::Structure { members: b }) => {
                let mut members = Vec::new();
                for (name, a_ty) in a {
                    if let Some((_, b_ty)) = b.iter().find(|(n, _)| n == name) {
                        match a_ty.join(b_ty) {
                            Some(joined) => members.push((name.clone(), joined)),
                            None => return Some(RuleType::Any),
                        }
                    }
                }
                Some(RuleType::Structure { members })
            }
            (
                RuleType::Array { component: a, size: n },
                RuleType::Array { component: b, size: m },
            ) => {
                let component = Box::new(a.join(b)?);
                let size = if n == m { *n } else { None };
                Some(RuleType::Array { component, size })
            }
            (a, b) if a.is_reference() && b.is_reference() => Some(RuleType::Any),
            _ => None,
        }
    }

    /// Narrow an integer literal against the other operand of a binary
    /// operator: to the other side's atomic type when the value fits, else
    /// to the narrowest atomic that fits
    pub fn narrow_against(&self, other: &RuleType) -> RuleType {
        if !self.is_integer_literal() || !other.is_numeric() {
            return self.clone();
        }
        if self.convertible_to(other) {
            return other.clone();
        }
        for candidate in ATOMIC_JOIN_ORDER {
            if self.convertible_to(candidate) {
                return candidate.clone();
            }
        }
        // A u64 literal above i64::MAX fits nothing smaller than uint64,
        // which is in the candidate list; unreachable in practice.
        self.lift()
    }
}

/// Atomic candidates for joins and narrowing, narrowest first; signed is
/// preferred at equal width
const ATOMIC_JOIN_ORDER: &[RuleType] = &[
    RuleType::Sint8,
    RuleType::Uint8,
    RuleType::Sint16,
    RuleType::Uint16,
    RuleType::Sint32,
    RuleType::Uint32,
    RuleType::Sint64,
    RuleType::Uint64,
    RuleType::Fp32,
    RuleType::Fp64,
];

/// Signed 128-bit view of a literal integer for fit checks
#[derive(Debug, Clone, Copy)]
struct I128(i128);

impl From<i64> for I128 {
    fn from(v: i64) -> Self {
        I128(v as i128)
    }
}

impl From<u64> for I128 {
    fn from(v: u64) -> Self {
        I128(v as i128)
    }
}

fn int_fits(value: I128, target: &RuleType) -> bool {
    let v = value.0;
    match target {
        RuleType::Sint8 => i8::try_from(v).is_ok(),
        RuleType::Sint16 => i16::try_from(v).is_ok(),
        RuleType::Sint32 => i32::try_from(v).is_ok(),
        RuleType::Sint64 => i64::try_from(v).is_ok(),
        RuleType::Uint8 => u8::try_from(v).is_ok(),
        RuleType::Uint16 => u16::try_from(v).is_ok(),
        RuleType::Uint32 => u32::try_from(v).is_ok(),
        RuleType::Uint64 => u64::try_from(v).is_ok(),
        // Integer literals convert to floats when exactly representable.
        RuleType::Fp32 => (v as f32) as i128 == v,
        RuleType::Fp64 => (v as f64) as i128 == v,
        _ => false,
    }
}

/// The string encoding whose code unit is the given atomic, if any
pub fn encoding_of_component(component: &RuleType) -> Option<StrEncoding> {
    match component {
        RuleType::Uint8 => Some(StrEncoding::Utf8),
        RuleType::Uint16 => Some(StrEncoding::Utf16),
        RuleType::Uint32 => Some(StrEncoding::Utf32),
        _ => None,
    }
}
