use pretty_assertions::assert_eq;

use super::identity::{self, value_size, IdentityKind};
use super::{RuleType, StrEncoding};

fn array(component: RuleType, size: Option<u64>) -> RuleType {
    RuleType::Array {
        component: Box::new(component),
        size,
    }
}

fn structure(members: &[(&str, RuleType)]) -> RuleType {
    RuleType::Structure {
        members: members
            .iter()
            .map(|(n, t)| (n.to_string(), t.clone()))
            .collect(),
    }
}

#[test]
fn test_integer_widening() {
    assert!(RuleType::Sint8.convertible_to(&RuleType::Sint64));
    assert!(RuleType::Sint32.convertible_to(&RuleType::Sint32));
    assert!(!RuleType::Sint64.convertible_to(&RuleType::Sint32));
    assert!(RuleType::Uint8.convertible_to(&RuleType::Uint16));
    assert!(!RuleType::Uint16.convertible_to(&RuleType::Uint8));
}

#[test]
fn test_unsigned_into_wider_signed() {
    assert!(RuleType::Uint8.convertible_to(&RuleType::Sint16));
    assert!(RuleType::Uint32.convertible_to(&RuleType::Sint64));
    assert!(!RuleType::Uint32.convertible_to(&RuleType::Sint32));
    assert!(!RuleType::Uint64.convertible_to(&RuleType::Sint64));
    assert!(!RuleType::Sint8.convertible_to(&RuleType::Uint16));
}

#[test]
fn test_float_widening() {
    assert!(RuleType::Fp32.convertible_to(&RuleType::Fp64));
    assert!(!RuleType::Fp64.convertible_to(&RuleType::Fp32));
    assert!(!RuleType::Sint32.convertible_to(&RuleType::Fp64));
}

#[test]
fn test_integer_literal_fitting() {
    assert!(RuleType::SintLit(100).convertible_to(&RuleType::Sint8));
    assert!(!RuleType::SintLit(200).convertible_to(&RuleType::Sint8));
    assert!(RuleType::SintLit(200).convertible_to(&RuleType::Uint8));
    assert!(!RuleType::SintLit(-1).convertible_to(&RuleType::Uint64));
    assert!(RuleType::UintLit(u64::MAX).convertible_to(&RuleType::Uint64));
    assert!(!RuleType::UintLit(u64::MAX).convertible_to(&RuleType::Sint64));
}

#[test]
fn test_float_literal_fitting() {
    assert!(RuleType::FloatLit(1.5).convertible_to(&RuleType::Fp32));
    assert!(RuleType::FloatLit(1.5).convertible_to(&RuleType::Fp64));
    // Too large for fp32, fine for fp64
    assert!(!RuleType::FloatLit(1e300).convertible_to(&RuleType::Fp32));
    assert!(RuleType::FloatLit(1e300).convertible_to(&RuleType::Fp64));
}

#[test]
fn test_string_literal_conversions() {
    let lit = RuleType::StrLit {
        encoding: StrEncoding::Utf8,
        value: "ab".to_string(),
    };
    // Re-encoding keeps the value
    assert!(lit.convertible_to(&RuleType::StrLit {
        encoding: StrEncoding::Utf32,
        value: "ab".to_string(),
    }));
    // Widens to a code-unit array of the matching length
    assert!(lit.convertible_to(&array(RuleType::Uint8, Some(2))));
    assert!(lit.convertible_to(&array(RuleType::Uint8, None)));
    assert!(!lit.convertible_to(&array(RuleType::Uint8, Some(3))));
    // A non-ASCII value has a different length per encoding
    let accented = RuleType::StrLit {
        encoding: StrEncoding::Utf8,
        value: "é".to_string(),
    };
    assert!(accented.convertible_to(&array(RuleType::Uint8, Some(2))));
    assert!(accented.convertible_to(&array(RuleType::Uint32, Some(1))));
}

#[test]
fn test_array_conversions() {
    assert!(array(RuleType::Sint8, Some(3)).convertible_to(&array(RuleType::Sint32, Some(3))));
    assert!(array(RuleType::Sint8, Some(3)).convertible_to(&array(RuleType::Sint8, None)));
    assert!(!array(RuleType::Sint8, Some(3)).convertible_to(&array(RuleType::Sint8, Some(4))));
    assert!(!array(RuleType::Sint8, None).convertible_to(&array(RuleType::Sint8, Some(3))));
}

#[test]
fn test_structure_widening_drops_members() {
    let source = structure(&[("a", RuleType::Sint8), ("b", RuleType::Bool)]);
    let target = structure(&[("a", RuleType::Sint32)]);
    assert!(source.convertible_to(&target));
    // Reordered names still match
    let reordered = structure(&[("b", RuleType::Bool), ("a", RuleType::Sint8)]);
    assert!(source.convertible_to(&reordered));
    // A missing member does not
    let wanting = structure(&[("c", RuleType::Bool)]);
    assert!(!source.convertible_to(&wanting));
}

#[test]
fn test_everything_reference_converts_to_any() {
    assert!(array(RuleType::Sint8, None).convertible_to(&RuleType::Any));
    assert!(structure(&[]).convertible_to(&RuleType::Any));
    assert!(RuleType::Tuple(vec![RuleType::Bool]).convertible_to(&RuleType::Any));
    assert!(RuleType::NullLit.convertible_to(&RuleType::Any));
    assert!(RuleType::NullLit.convertible_to(&array(RuleType::Sint8, None)));
    assert!(!RuleType::Sint8.convertible_to(&RuleType::Any));
}

#[test]
fn test_join_same_signedness() {
    assert_eq!(
        RuleType::Sint8.join(&RuleType::Sint32),
        Some(RuleType::Sint32)
    );
    assert_eq!(
        RuleType::Uint16.join(&RuleType::Uint8),
        Some(RuleType::Uint16)
    );
}

#[test]
fn test_join_mixed_signedness() {
    assert_eq!(
        RuleType::Sint8.join(&RuleType::Uint8),
        Some(RuleType::Sint16)
    );
    assert_eq!(
        RuleType::Sint32.join(&RuleType::Uint32),
        Some(RuleType::Sint64)
    );
    // No atomic holds all of sint64 and uint64
    assert_eq!(RuleType::Sint64.join(&RuleType::Uint64), None);
}

#[test]
fn test_join_literals() {
    assert_eq!(
        RuleType::SintLit(1).join(&RuleType::SintLit(2)),
        Some(RuleType::Sint8)
    );
    assert_eq!(
        RuleType::SintLit(1).join(&RuleType::FloatLit(0.5)),
        Some(RuleType::Fp32)
    );
    assert_eq!(
        RuleType::SintLit(300).join(&RuleType::Sint16),
        Some(RuleType::Sint16)
    );
}

#[test]
fn test_join_references() {
    assert_eq!(
        array(RuleType::Sint8, Some(2)).join(&array(RuleType::Sint16, Some(2))),
        Some(array(RuleType::Sint16, Some(2)))
    );
    assert_eq!(
        array(RuleType::Sint8, Some(2)).join(&array(RuleType::Sint8, Some(3))),
        Some(array(RuleType::Sint8, None))
    );
    let a = structure(&[("x", RuleType::Sint8), ("y", RuleType::Bool)]);
    let b = structure(&[("x", RuleType::Sint32), ("z", RuleType::Bool)]);
    assert_eq!(a.join(&b), Some(structure(&[("x", RuleType::Sint32)])));
    assert_eq!(
        array(RuleType::Bool, None).join(&RuleType::Tuple(vec![])),
        Some(RuleType::Any)
    );
}

#[test]
fn test_join_fails_across_kinds() {
    assert_eq!(RuleType::Bool.join(&RuleType::Sint8), None);
    assert_eq!(RuleType::Sint8.join(&array(RuleType::Sint8, None)), None);
}

#[test]
fn test_narrowing() {
    // Fits the other operand's type
    assert_eq!(
        RuleType::SintLit(1).narrow_against(&RuleType::Sint16),
        RuleType::Sint16
    );
    // Does not fit: smallest atomic that fits instead
    assert_eq!(
        RuleType::SintLit(300).narrow_against(&RuleType::Sint8),
        RuleType::Sint16
    );
    assert_eq!(
        RuleType::SintLit(200).narrow_against(&RuleType::Sint8),
        RuleType::Uint8
    );
    // Not a literal or no atomic counterpart: unchanged
    assert_eq!(
        RuleType::Sint32.narrow_against(&RuleType::Sint8),
        RuleType::Sint32
    );
    assert_eq!(
        RuleType::SintLit(1).narrow_against(&RuleType::SintLit(2)),
        RuleType::SintLit(1)
    );
}

#[test]
fn test_lift() {
    assert_eq!(RuleType::SintLit(1).lift(), RuleType::Sint64);
    assert_eq!(RuleType::UintLit(1).lift(), RuleType::Uint64);
    assert_eq!(RuleType::FloatLit(1.0).lift(), RuleType::Fp64);
    assert_eq!(RuleType::BoolLit(true).lift(), RuleType::Bool);
    assert_eq!(
        RuleType::StrLit {
            encoding: StrEncoding::Utf8,
            value: "abc".to_string(),
        }
        .lift(),
        array(RuleType::Uint8, None)
    );
}

#[test]
fn test_display() {
    assert_eq!(RuleType::Sint64.to_string(), "sint64");
    assert_eq!(array(RuleType::Sint32, Some(4)).to_string(), "sint32[4]");
    assert_eq!(array(RuleType::Fp64, None).to_string(), "fp64[]");
    assert_eq!(
        structure(&[("a", RuleType::Sint32)]).to_string(),
        "{a: sint32}"
    );
    assert_eq!(
        RuleType::Tuple(vec![RuleType::Bool, RuleType::Fp32]).to_string(),
        "{bool, fp32}"
    );
    assert_eq!(RuleType::SintLit(3).to_string(), "sint64");
}

#[test]
fn test_identity_interning_is_stable() {
    let a = structure(&[("x", RuleType::Sint32), ("y", RuleType::Sint32)]);
    let b = structure(&[("x", RuleType::Sint32), ("y", RuleType::Sint32)]);
    let id_a = identity::intern(&a);
    let id_b = identity::intern(&b);
    assert_eq!(id_a, id_b);
    assert!(identity::is_registered(id_a));

    let c = structure(&[("x", RuleType::Sint32)]);
    assert_ne!(identity::intern(&c), id_a);
}

#[test]
fn test_identity_layout() {
    // sint8 then sint32: the second member aligns to 4
    let tuple = RuleType::Tuple(vec![RuleType::Sint8, RuleType::Sint32]);
    let record = identity::lookup(identity::intern(&tuple));
    assert_eq!(record.kind, IdentityKind::Tuple);
    assert_eq!(record.member_offsets, vec![0, 4]);
    assert_eq!(record.member_sizes, vec![1, 4]);
    assert_eq!(record.data_size, 8);
}

#[test]
fn test_identity_by_name() {
    let s = structure(&[("a", RuleType::Sint16), ("b", RuleType::Bool)]);
    let record = identity::lookup(identity::intern(&s));
    assert_eq!(record.kind, IdentityKind::Struct);
    assert_eq!(record.offset_by_name("b"), Some((2, 1)));
    assert_eq!(record.offset_by_name("missing"), None);
}

#[test]
fn test_value_sizes() {
    assert_eq!(value_size(&RuleType::Bool), 1);
    assert_eq!(value_size(&RuleType::Sint16), 2);
    assert_eq!(value_size(&RuleType::Fp32), 4);
    assert_eq!(value_size(&RuleType::Uint64), 8);
    assert_eq!(value_size(&array(RuleType::Bool, None)), 8);
    assert_eq!(value_size(&RuleType::SintLit(1)), 8);
}
