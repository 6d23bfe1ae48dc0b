//! Value rendering for the shell
//!
//! Values print in composite-literal syntax: atomics bare, strings quoted,
//! arrays/tuples/structures in braces. Rendering is driven by the static
//! type; an `any`-typed reference falls back to its runtime identity and
//! prints members as raw unsigned units.

use crate::types::identity::{self, value_size, IdentityKind};
use crate::types::{RuleType, StrEncoding};

use super::strings;
use super::Vm;

/// Render a value for the shell
pub fn format_value(vm: &Vm, ty: &RuleType, bits: u64) -> String {
    match ty {
        RuleType::Bool | RuleType::BoolLit(_) => {
            if bits != 0 { "true" } else { "false" }.to_string()
        }
        t if t.is_signed_int() => (bits as i64).to_string(),
        RuleType::SintLit(_) => (bits as i64).to_string(),
        t if t.is_unsigned_int() => bits.to_string(),
        RuleType::UintLit(_) => bits.to_string(),
        RuleType::Fp32 => f32::from_bits(bits as u32).to_string(),
        RuleType::Fp64 | RuleType::FloatLit(_) => f64::from_bits(bits).to_string(),
        RuleType::NullLit => "null".to_string(),
        RuleType::StrLit { encoding, .. } => {
            if bits == 0 {
                return "null".to_string();
            }
            quote(&strings::read_string(&vm.heap, *encoding, bits))
        }
        RuleType::Array { component, .. } => {
            if bits == 0 {
                return "null".to_string();
            }
            let length = vm.heap.length_at(bits);
            let size = value_size(component);
            let data = vm.heap.data_addr(bits) + 8;
            let elements: Vec<String> = (0..length)
                .map(|i| {
                    let element = vm.heap_read_value(component, data + size as u64 * i);
                    format_value(vm, component, element)
                })
                .collect();
            format!("{{{}}}", elements.join(", "))
        }
        RuleType::Tuple(members) => {
            if bits == 0 {
                return "null".to_string();
            }
            let record = identity::lookup(identity::intern(ty));
            let data = vm.heap.data_addr(bits);
            let rendered: Vec<String> = members
                .iter()
                .enumerate()
                .map(|(i, member)| {
                    let element =
                        vm.heap_read_value(member, data + record.member_offsets[i] as u64);
                    format_value(vm, member, element)
                })
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        RuleType::Structure { members } => {
            if bits == 0 {
                return "null".to_string();
            }
            let record = identity::lookup(identity::intern(ty));
            let data = vm.heap.data_addr(bits);
            let rendered: Vec<String> = members
                .iter()
                .enumerate()
                .map(|(i, (name, member))| {
                    let element =
                        vm.heap_read_value(member, data + record.member_offsets[i] as u64);
                    format!("{}: {}", name, format_value(vm, member, element))
                })
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        RuleType::Any => format_by_identity(vm, bits),
        _ => unreachable!("covered by is_signed_int/is_unsigned_int guards above"),
    }
}

/// Render an `any`-typed reference from its runtime identity alone
fn format_by_identity(vm: &Vm, addr: u64) -> String {
    if addr == 0 {
        return "null".to_string();
    }
    let record = identity::lookup(vm.heap.identity_at(addr));
    let data = vm.heap.data_addr(addr);
    match record.kind {
        IdentityKind::String => {
            let encoding = match record.component_size {
                1 => StrEncoding::Utf8,
                2 => StrEncoding::Utf16,
                _ => StrEncoding::Utf32,
            };
            quote(&strings::read_string(&vm.heap, encoding, addr))
        }
        IdentityKind::Array => {
            let length = vm.heap.length_at(addr);
            let elements: Vec<String> = (0..length)
                .map(|i| {
                    vm.heap
                        .read_scalar(data + 8 + record.component_size as u64 * i, record.component_size)
                        .to_string()
                })
                .collect();
            format!("{{{}}}", elements.join(", "))
        }
        IdentityKind::Tuple | IdentityKind::Struct => {
            let rendered: Vec<String> = record
                .member_offsets
                .iter()
                .zip(&record.member_sizes)
                .enumerate()
                .map(|(i, (offset, size))| {
                    let raw = vm.heap.read_scalar(data + *offset as u64, *size);
                    match record.member_names.get(i) {
                        Some(name) => format!("{}: {}", name, raw),
                        None => raw.to_string(),
                    }
                })
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        IdentityKind::Any => "{}".to_string(),
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
