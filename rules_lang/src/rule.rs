//! The compiled-rule interface
//!
//! A [`Rule`] is a compiled program exposed as a function from a JSON input
//! to a JSON output. Its input type serializes to a descriptor string, and
//! [`Rule::run`] marshals the input onto the heap, evaluates the top level,
//! and marshals the returned value back out; a run that never returns a
//! value is "not applicable" and yields `None`.

use serde_json::{json, Map, Value};

use crate::error::{SourceError, SourceResult};
use crate::ir::core::Program;
use crate::pipeline;
use crate::types::identity::{self, value_size};
use crate::types::RuleType;
use crate::vm::flow::Flow;
use crate::vm::heap::Heap;
use crate::vm::{strings, Vm};
use rules_lang_parser::source::SourceText;
use rules_lang_parser::span::Span;

/// A compiled rule
#[derive(Debug)]
pub struct Rule {
    source: SourceText,
    program: Program,
}

impl Rule {
    /// Compile a rule from source text
    pub fn compile(text: &str) -> SourceResult<Rule> {
        let source = SourceText::new(text);
        let program = pipeline::compile(&source)?;
        Ok(Rule { source, program })
    }

    /// The normalized source the rule was compiled from
    pub fn source(&self) -> &SourceText {
        &self.source
    }

    /// The rule's input type
    pub fn input_type(&self) -> &RuleType {
        &self.program.input_type
    }

    /// The input type as a JSON descriptor string
    pub fn input_descriptor(&self) -> String {
        type_descriptor(&self.program.input_type).to_string()
    }

    /// Evaluate the rule against a JSON input. `Ok(None)` means the rule is
    /// not applicable to this input.
    pub fn run(&self, input: &Value) -> SourceResult<Option<Value>> {
        let mut vm = Vm::new();
        let context = marshal_input(&mut vm, &self.program.input_type, input)?;
        vm.set_context(context);
        let flow = vm.run_main(&self.program)?;
        if flow != Flow::Return {
            return Ok(None);
        }
        let Some(ty) = vm.returned_type().cloned() else {
            return Ok(None);
        };
        let bits = vm.stack.pop_scalar(&ty);
        Ok(Some(value_to_json(&vm.heap, &ty, bits)))
    }
}

/// Render a type as its JSON descriptor
fn type_descriptor(ty: &RuleType) -> Value {
    match ty {
        RuleType::Structure { members } => {
            let mut object = Map::new();
            for (name, member) in members {
                object.insert(name.clone(), type_descriptor(member));
            }
            Value::Object(object)
        }
        RuleType::Tuple(members) => Value::Array(members.iter().map(type_descriptor).collect()),
        other => Value::String(other.to_string()),
    }
}

fn input_error(message: String) -> SourceError {
    SourceError::runtime(message, Span::empty())
}

/// Marshal a JSON value into a runtime value of the wanted type; scalars
/// come back as normalized bits, references as heap addresses
fn marshal_input(vm: &mut Vm, ty: &RuleType, value: &Value) -> SourceResult<u64> {
    match ty {
        RuleType::Bool => value
            .as_bool()
            .map(|b| b as u64)
            .ok_or_else(|| input_error(format!("Expected a bool input, got {}", value))),
        t if t.is_signed_int() => {
            let v = value
                .as_i64()
                .ok_or_else(|| input_error(format!("Expected a {} input, got {}", t, value)))?;
            if !RuleType::SintLit(v).convertible_to(t) {
                return Err(input_error(format!("{} does not fit {}", v, t)));
            }
            Ok(v as u64)
        }
        t if t.is_unsigned_int() => {
            let v = value
                .as_u64()
                .ok_or_else(|| input_error(format!("Expected a {} input, got {}", t, value)))?;
            if !RuleType::UintLit(v).convertible_to(t) {
                return Err(input_error(format!("{} does not fit {}", v, t)));
            }
            Ok(v)
        }
        RuleType::Fp32 => {
            let v = value
                .as_f64()
                .ok_or_else(|| input_error(format!("Expected a fp32 input, got {}", value)))?;
            Ok((v as f32).to_bits() as u64)
        }
        RuleType::Fp64 => {
            let v = value
                .as_f64()
                .ok_or_else(|| input_error(format!("Expected a fp64 input, got {}", value)))?;
            Ok(v.to_bits())
        }
        RuleType::Array { component, size } => {
            if value.is_null() {
                return Ok(0);
            }
            let items = value
                .as_array()
                .ok_or_else(|| input_error(format!("Expected an array input, got {}", value)))?;
            if let Some(wanted) = size {
                if items.len() as u64 != *wanted {
                    return Err(input_error(format!(
                        "Expected {} array elements, got {}",
                        wanted,
                        items.len()
                    )));
                }
            }
            let component_size = value_size(component);
            let id = identity::intern(ty);
            let addr = vm.heap.alloc(id, 8 + component_size * items.len());
            let data = vm.heap.data_addr(addr);
            vm.heap.write_scalar(data, 8, items.len() as u64);
            for (i, item) in items.iter().enumerate() {
                let bits = marshal_input(vm, component, item)?;
                vm.heap
                    .write_scalar(data + 8 + (component_size * i) as u64, component_size, bits);
            }
            Ok(addr)
        }
        RuleType::Tuple(members) => {
            if value.is_null() {
                return Ok(0);
            }
            let items = value
                .as_array()
                .ok_or_else(|| input_error(format!("Expected a tuple input, got {}", value)))?;
            if items.len() != members.len() {
                return Err(input_error(format!(
                    "Expected {} tuple members, got {}",
                    members.len(),
                    items.len()
                )));
            }
            let id = identity::intern(ty);
            let record = identity::lookup(id);
            let addr = vm.heap.alloc(id, record.data_size);
            let data = vm.heap.data_addr(addr);
            for (i, (member, item)) in members.iter().zip(items).enumerate() {
                let bits = marshal_input(vm, member, item)?;
                vm.heap
                    .write_scalar(data + record.member_offsets[i] as u64, value_size(member), bits);
            }
            Ok(addr)
        }
        RuleType::Structure { members } => {
            if value.is_null() {
                return Ok(0);
            }
            let object = value
                .as_object()
                .ok_or_else(|| input_error(format!("Expected an object input, got {}", value)))?;
            let id = identity::intern(ty);
            let record = identity::lookup(id);
            let addr = vm.heap.alloc(id, record.data_size);
            let data = vm.heap.data_addr(addr);
            for (i, (name, member)) in members.iter().enumerate() {
                let item = object
                    .get(name)
                    .ok_or_else(|| input_error(format!("Missing input member '{}'", name)))?;
                let bits = marshal_input(vm, member, item)?;
                vm.heap
                    .write_scalar(data + record.member_offsets[i] as u64, value_size(member), bits);
            }
            Ok(addr)
        }
        RuleType::Any | RuleType::NullLit => {
            if value.is_null() {
                Ok(0)
            } else {
                Err(input_error(format!(
                    "Only null inputs fit {}, got {}",
                    ty, value
                )))
            }
        }
        other => Err(input_error(format!(
            "{} cannot be marshalled from JSON",
            other
        ))),
    }
}

/// Marshal a runtime value back into JSON
pub fn value_to_json(heap: &Heap, ty: &RuleType, bits: u64) -> Value {
    match ty {
        RuleType::Bool | RuleType::BoolLit(_) => Value::Bool(bits != 0),
        t if t.is_signed_int() => json!(bits as i64),
        RuleType::SintLit(_) => json!(bits as i64),
        t if t.is_unsigned_int() => json!(bits),
        RuleType::UintLit(_) => json!(bits),
        RuleType::Fp32 => json!(f32::from_bits(bits as u32) as f64),
        RuleType::Fp64 | RuleType::FloatLit(_) => json!(f64::from_bits(bits)),
        RuleType::NullLit => Value::Null,
        RuleType::StrLit { encoding, .. } => {
            if bits == 0 {
                return Value::Null;
            }
            Value::String(strings::read_string(heap, *encoding, bits))
        }
        RuleType::Array { component, .. } => {
            if bits == 0 {
                return Value::Null;
            }
            let length = heap.length_at(bits);
            let size = value_size(component);
            let data = heap.data_addr(bits) + 8;
            Value::Array(
                (0..length)
                    .map(|i| {
                        let raw = heap.read_scalar(data + size as u64 * i, size);
                        value_to_json(heap, component, extend_signed(component, raw, size))
                    })
                    .collect(),
            )
        }
        RuleType::Tuple(members) => {
            if bits == 0 {
                return Value::Null;
            }
            let record = identity::lookup(identity::intern(ty));
            let data = heap.data_addr(bits);
            Value::Array(
                members
                    .iter()
                    .enumerate()
                    .map(|(i, member)| {
                        let size = value_size(member);
                        let raw = heap.read_scalar(data + record.member_offsets[i] as u64, size);
                        value_to_json(heap, member, extend_signed(member, raw, size))
                    })
                    .collect(),
            )
        }
        RuleType::Structure { members } => {
            if bits == 0 {
                return Value::Null;
            }
            let record = identity::lookup(identity::intern(ty));
            let data = heap.data_addr(bits);
            let mut object = Map::new();
            for (i, (name, member)) in members.iter().enumerate() {
                let size = value_size(member);
                let raw = heap.read_scalar(data + record.member_offsets[i] as u64, size);
                object.insert(
                    name.clone(),
                    value_to_json(heap, member, extend_signed(member, raw, size)),
                );
            }
            Value::Object(object)
        }
        RuleType::Any => {
            if bits == 0 {
                Value::Null
            } else {
                // Without a static type the best JSON rendering of an
                // arbitrary object is its string form.
                Value::String(format!("object#{}", heap.identity_at(bits)))
            }
        }
        _ => unreachable!("covered by is_signed_int/is_unsigned_int guards above"),
    }
}

fn extend_signed(ty: &RuleType, raw: u64, size: usize) -> u64 {
    if ty.is_signed_int() || matches!(ty, RuleType::SintLit(_)) {
        match size {
            1 => raw as u8 as i8 as i64 as u64,
            2 => raw as u16 as i16 as i64 as u64,
            4 => raw as u32 as i32 as i64 as u64,
            _ => raw,
        }
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_struct_input_rule() {
        let rule = Rule::compile("def Input: {a: sint32, b: sint32}\nreturn .a + .b").unwrap();
        let output = rule.run(&json!({"a": 2, "b": 3})).unwrap();
        assert_eq!(output, Some(json!(5)));
    }

    #[test]
    fn test_not_applicable_without_return() {
        let rule = Rule::compile(
            "def Input: {a: sint32}\nif .a > 10:\n  return .a",
        )
        .unwrap();
        assert_eq!(rule.run(&json!({"a": 20})).unwrap(), Some(json!(20)));
        assert_eq!(rule.run(&json!({"a": 5})).unwrap(), None);
    }

    #[test]
    fn test_input_descriptor() {
        let rule = Rule::compile(
            "def Input: {a: sint32, xs: fp64}\nreturn .a",
        )
        .unwrap();
        assert_eq!(rule.input_descriptor(), r#"{"a":"sint32","xs":"fp64"}"#);
    }

    #[test]
    fn test_array_input_descriptor_and_run() {
        let rule = Rule::compile(
            "def Row: sint64[3]\ndef Input: {xs: Row}\nreturn .xs[0] + .xs[2]",
        )
        .unwrap();
        assert_eq!(rule.input_descriptor(), r#"{"xs":"sint64[3]"}"#);
        let output = rule.run(&json!({"xs": [10, 20, 30]})).unwrap();
        assert_eq!(output, Some(json!(40)));
    }

    #[test]
    fn test_composite_output() {
        let rule = Rule::compile(
            "def Input: {a: sint32}\ndef Out: {double: sint64, sign: bool}\n\
             return Out {double: .a * 2, sign: .a >= 0}",
        )
        .unwrap();
        let output = rule.run(&json!({"a": -4})).unwrap();
        assert_eq!(output, Some(json!({"double": -8, "sign": false})));
    }

    #[test]
    fn test_missing_member_is_an_error() {
        let rule = Rule::compile("def Input: {a: sint32}\nreturn .a").unwrap();
        let err = rule.run(&json!({})).unwrap_err();
        assert!(err.message.contains("Missing input member"), "{}", err.message);
    }

    #[test]
    fn test_range_checked_input() {
        let rule = Rule::compile("def Input: {a: sint8}\nreturn .a").unwrap();
        let err = rule.run(&json!({"a": 300})).unwrap_err();
        assert!(err.message.contains("does not fit"), "{}", err.message);
    }

    #[test]
    fn test_empty_input_type() {
        let rule = Rule::compile("return 42").unwrap();
        assert_eq!(rule.input_descriptor(), "{}");
        assert_eq!(rule.run(&json!({})).unwrap(), Some(json!(42)));
    }
}
