//! Process-wide type identity table
//!
//! Every heap object is prefixed by an identity header naming the interned
//! layout of its concrete type. The table is append-only, shared across all
//! compiles and evaluations in the process, and guarded by a mutex so
//! insertion stays safe if callers ever run concurrently; reads after the
//! initial warm-up contend only on the lock, never on the data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use super::RuleType;

/// Size in bytes of the identity header prefixed to every heap object
pub const HEADER_SIZE: usize = 8;

/// Layout kind of a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    Tuple,
    Struct,
    Array,
    String,
    Any,
}

/// An interned record of a concrete type's memory layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeIdentity {
    pub kind: IdentityKind,
    /// Byte offset of each member within the data segment (tuple/struct)
    pub member_offsets: Vec<usize>,
    /// Byte size of each member (tuple/struct)
    pub member_sizes: Vec<usize>,
    /// Member names in layout order (struct only)
    pub member_names: Vec<String>,
    /// Size of one component (array) or code unit (string)
    pub component_size: usize,
    /// Fixed data segment size (tuple/struct); arrays and strings size
    /// their data from their length at allocation time
    pub data_size: usize,
}

impl TypeIdentity {
    /// Offset of a struct member by name
    pub fn offset_by_name(&self, name: &str) -> Option<(usize, usize)> {
        let index = self.member_names.iter().position(|n| n == name)?;
        Some((self.member_offsets[index], self.member_sizes[index]))
    }
}

/// Stack/heap footprint of a value of this type in bytes: atomics at their
/// native size, references as an 8-byte address
pub fn value_size(ty: &RuleType) -> usize {
    match ty {
        RuleType::Bool | RuleType::Sint8 | RuleType::Uint8 => 1,
        RuleType::Sint16 | RuleType::Uint16 => 2,
        RuleType::Sint32 | RuleType::Uint32 | RuleType::Fp32 => 4,
        RuleType::Sint64 | RuleType::Uint64 | RuleType::Fp64 => 8,
        RuleType::BoolLit(_)
        | RuleType::SintLit(_)
        | RuleType::UintLit(_)
        | RuleType::FloatLit(_) => value_size(&ty.lift()),
        RuleType::StrLit { .. }
        | RuleType::NullLit
        | RuleType::Array { .. }
        | RuleType::Tuple(_)
        | RuleType::Structure { .. }
        | RuleType::Any => 8,
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Compute member offsets for a composite layout; each member is aligned to
/// its own size
fn member_layout(types: &[&RuleType]) -> (Vec<usize>, Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(types.len());
    let mut sizes = Vec::with_capacity(types.len());
    let mut cursor = 0;
    for ty in types {
        let size = value_size(ty);
        cursor = align_up(cursor, size);
        offsets.push(cursor);
        sizes.push(size);
        cursor += size;
    }
    (offsets, sizes, cursor)
}

/// Build the identity record of a concrete reference type.
///
/// Panics on non-reference types; callers only reach here for values that
/// live on the heap.
fn identity_record(ty: &RuleType) -> TypeIdentity {
    match ty {
        RuleType::Tuple(members) => {
            let (member_offsets, member_sizes, data_size) =
                member_layout(&members.iter().collect::<Vec<_>>());
            TypeIdentity {
                kind: IdentityKind::Tuple,
                member_offsets,
                member_sizes,
                member_names: Vec::new(),
                component_size: 0,
                data_size,
            }
        }
        RuleType::Structure { members } => {
            let (member_offsets, member_sizes, data_size) =
                member_layout(&members.iter().map(|(_, t)| t).collect::<Vec<_>>());
            TypeIdentity {
                kind: IdentityKind::Struct,
                member_offsets,
                member_sizes,
                member_names: members.iter().map(|(n, _)| n.clone()).collect(),
                component_size: 0,
                data_size,
            }
        }
        RuleType::Array { component, .. } => TypeIdentity {
            kind: IdentityKind::Array,
            member_offsets: Vec::new(),
            member_sizes: Vec::new(),
            member_names: Vec::new(),
            component_size: value_size(component),
            data_size: 0,
        },
        RuleType::StrLit { encoding, .. } => TypeIdentity {
            kind: IdentityKind::String,
            member_offsets: Vec::new(),
            member_sizes: Vec::new(),
            member_names: Vec::new(),
            component_size: encoding.unit_size(),
            data_size: 0,
        },
        RuleType::Any | RuleType::NullLit => TypeIdentity {
            kind: IdentityKind::Any,
            member_offsets: Vec::new(),
            member_sizes: Vec::new(),
            member_names: Vec::new(),
            component_size: 0,
            data_size: 0,
        },
        other => panic!("identity requested for non-reference type {:?}", other),
    }
}

#[derive(Default)]
struct IdentityTable {
    ids: HashMap<TypeIdentity, u32>,
    records: Vec<Arc<TypeIdentity>>,
}

static TABLE: Lazy<Mutex<IdentityTable>> = Lazy::new(|| Mutex::new(IdentityTable::default()));

/// Intern the layout of a concrete reference type, returning its stable
/// process-wide index
pub fn intern(ty: &RuleType) -> u32 {
    let record = identity_record(ty);
    let mut table = TABLE.lock().expect("identity table poisoned");
    if let Some(id) = table.ids.get(&record) {
        return *id;
    }
    let id = table.records.len() as u32;
    table.records.push(Arc::new(record.clone()));
    table.ids.insert(record, id);
    id
}

/// Look up an interned identity by index
pub fn lookup(id: u32) -> Arc<TypeIdentity> {
    let table = TABLE.lock().expect("identity table poisoned");
    table
        .records
        .get(id as usize)
        .cloned()
        .expect("unregistered type identity")
}

/// Check that an index names a registered identity (test support)
pub fn is_registered(id: u32) -> bool {
    let table = TABLE.lock().expect("identity table poisoned");
    (id as usize) < table.records.len()
}
