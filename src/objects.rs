//! The core object model: slot layouts and constructors for the
//! fixed-layout variants held in the object memory.

use crate::memory::{ObjectKind, ObjectStore, Value};

/// Slot layout of Class objects (Behavior + ClassDescription + Class).
pub mod class {
    pub const SUPER_CLASS: usize = 0;
    pub const METHOD_DICTIONARY: usize = 1;
    pub const INSTANCE_SPEC: usize = 2;
    pub const SUB_CLASSES: usize = 3;
    pub const INSTANCE_VARIABLES: usize = 4;
    pub const NAME: usize = 5;
    pub const COMMENT: usize = 6;
    pub const CATEGORY: usize = 7;
    pub const ENVIRONMENT: usize = 8;
    pub const CLASS_VARIABLES: usize = 9;
    pub const SHARED_POOLS: usize = 10;
    pub const PRAGMA_HANDLERS: usize = 11;
    pub const NUM_SLOTS: usize = 12;
}

/// Slot layout of Metaclass objects. The Behavior prefix matches
/// Class, so superclass walks treat both uniformly.
pub mod metaclass {
    pub const SUPER_CLASS: usize = 0;
    pub const METHOD_DICTIONARY: usize = 1;
    pub const INSTANCE_SPEC: usize = 2;
    pub const SUB_CLASSES: usize = 3;
    pub const INSTANCE_VARIABLES: usize = 4;
    pub const INSTANCE_CLASS: usize = 5;
    pub const NUM_SLOTS: usize = 6;
}

pub mod sym_link {
    pub const NEXT_LINK: usize = 0;
    pub const SYMBOL: usize = 1;
    pub const NUM_SLOTS: usize = 2;
}

/// Association and VariableBinding share the key slot at 0, so the
/// dictionary probe compares keys without caring which entry variant
/// a slot holds.
pub mod assoc {
    pub const KEY: usize = 0;
    pub const VALUE: usize = 1;
    pub const NUM_SLOTS: usize = 2;
}

pub mod binding {
    pub const KEY: usize = 0;
    pub const VALUE: usize = 1;
    pub const ENVIRONMENT: usize = 2;
    pub const NUM_SLOTS: usize = 3;
}

/// Fixed prefixes of the dictionary family. The slot area follows the
/// prefix; `tally` is always slot 0.
pub mod dict {
    pub const TALLY: usize = 0;
    pub const NUM_FIXED: usize = 1;
}

pub mod binding_dict {
    pub const TALLY: usize = 0;
    pub const ENVIRONMENT: usize = 1;
    pub const NUM_FIXED: usize = 2;
}

pub mod namespace {
    pub const TALLY: usize = 0;
    pub const ENVIRONMENT: usize = 1;
    pub const NAME: usize = 2;
    pub const SUBSPACES: usize = 3;
    pub const SHARED_POOLS: usize = 4;
    pub const NUM_FIXED: usize = 5;
}

/// MethodDictionary prefix. The mutex slot is reserved and carries no
/// semantics in this design; it stays nil.
pub mod method_dict {
    pub const TALLY: usize = 0;
    pub const MUTEX: usize = 1;
    pub const NUM_FIXED: usize = 2;
}

/// Context layout: seven fixed slots, then the argument/temporary
/// area, then the evaluation stack. `sp` indexes the last pushed slot.
pub mod context {
    pub const PARENT: usize = 0;
    pub const NATIVE_IP: usize = 1;
    pub const IP: usize = 2;
    pub const SP: usize = 3;
    pub const RECEIVER: usize = 4;
    pub const METHOD: usize = 5;
    pub const FLAGS: usize = 6;
    pub const OUTER_CONTEXT: usize = 6;
    pub const FIXED_SLOTS: usize = 7;
}

/// CompiledMethod/CompiledBlock share the CompiledCode prefix; slot 2
/// is the MethodInfo descriptor for a method, the enclosing method for
/// a block. The bytecode lives in the adjunct byte buffer.
pub mod compiled {
    pub const LITERALS: usize = 0;
    pub const HEADER: usize = 1;
    pub const DESCRIPTOR: usize = 2;
    pub const METHOD: usize = 2;
    pub const NUM_SLOTS: usize = 3;
}

pub mod method_info {
    pub const SOURCE_CODE: usize = 0;
    pub const CATEGORY: usize = 1;
    pub const CLASS: usize = 2;
    pub const SELECTOR: usize = 3;
    pub const DEBUG_INFO: usize = 4;
    pub const NUM_SLOTS: usize = 5;
}

pub mod closure {
    pub const OUTER_CONTEXT: usize = 0;
    pub const BLOCK: usize = 1;
    pub const RECEIVER: usize = 2;
    pub const NUM_SLOTS: usize = 3;
}

const SPEC_SHIFT: i64 = 13;
const SPEC_FIXED: i64 = 0x20;

/// Pack the instanceSpec word: instance variable count and the
/// fixed-size bit.
pub fn pack_instance_spec(num_inst: usize, is_fixed: bool) -> i64 {
    let mut spec = (num_inst as i64) << SPEC_SHIFT;
    if is_fixed {
        spec |= SPEC_FIXED;
    }
    spec
}

pub fn spec_num_inst(spec: i64) -> usize {
    (spec >> SPEC_SHIFT) as usize
}

pub fn spec_is_fixed(spec: i64) -> bool {
    spec & SPEC_FIXED != 0
}

pub fn new_array(store: &mut ObjectStore, size: usize) -> Value {
    store.alloc(ObjectKind::Array, size)
}

pub fn new_array_from(store: &mut ObjectStore, items: &[Value]) -> Value {
    let arr = store.alloc(ObjectKind::Array, items.len());
    for (n, &v) in items.iter().enumerate() {
        store.set_slot(arr, n, v);
    }
    arr
}

pub fn new_string(store: &mut ObjectStore, s: &str) -> Value {
    let obj = store.alloc(ObjectKind::String, 0);
    store.set_bytes(obj, s.as_bytes().to_vec());
    obj
}

pub fn new_symbol(store: &mut ObjectStore, s: &str) -> Value {
    let obj = store.alloc(ObjectKind::Symbol, 0);
    store.set_bytes(obj, s.as_bytes().to_vec());
    obj
}

/// Contents of a Symbol or String as a Rust string.
pub fn byte_str(store: &ObjectStore, obj: Value) -> String {
    String::from_utf8_lossy(store.bytes(obj)).into_owned()
}

pub fn new_sym_link(store: &mut ObjectStore, symbol: Value, next: Value) -> Value {
    let link = store.alloc(ObjectKind::SymLink, sym_link::NUM_SLOTS);
    store.set_slot(link, sym_link::NEXT_LINK, next);
    store.set_slot(link, sym_link::SYMBOL, symbol);
    link
}

pub fn new_association(store: &mut ObjectStore, key: Value, value: Value) -> Value {
    let a = store.alloc(ObjectKind::Association, assoc::NUM_SLOTS);
    store.set_slot(a, assoc::KEY, key);
    store.set_slot(a, assoc::VALUE, value);
    a
}

pub fn new_variable_binding(
    store: &mut ObjectStore,
    key: Value,
    value: Value,
    environment: Value,
) -> Value {
    let b = store.alloc(ObjectKind::VariableBinding, binding::NUM_SLOTS);
    store.set_slot(b, binding::KEY, key);
    store.set_slot(b, binding::VALUE, value);
    store.set_slot(b, binding::ENVIRONMENT, environment);
    b
}

/// An open-addressed Dictionary with `capacity` association slots.
/// `capacity` must be a power of two.
pub fn new_dictionary(store: &mut ObjectStore, capacity: usize) -> Value {
    debug_assert!(capacity.is_power_of_two());
    let d = store.alloc(ObjectKind::Dictionary, dict::NUM_FIXED + capacity);
    store.set_slot(d, dict::TALLY, Value::Int(0));
    d
}

pub fn new_binding_dictionary(store: &mut ObjectStore, capacity: usize) -> Value {
    debug_assert!(capacity.is_power_of_two());
    let d = store.alloc(ObjectKind::BindingDictionary, binding_dict::NUM_FIXED + capacity);
    store.set_slot(d, binding_dict::TALLY, Value::Int(0));
    d
}

pub fn new_namespace(store: &mut ObjectStore, capacity: usize) -> Value {
    debug_assert!(capacity.is_power_of_two());
    let d = store.alloc(ObjectKind::Namespace, namespace::NUM_FIXED + capacity);
    store.set_slot(d, namespace::TALLY, Value::Int(0));
    d
}

/// An identity-keyed MethodDictionary with room for `pairs` entries.
/// The slot area is a flat (key, value) pair sequence.
pub fn new_method_dictionary(store: &mut ObjectStore, pairs: usize) -> Value {
    debug_assert!(pairs.is_power_of_two());
    let d = store.alloc(ObjectKind::MethodDictionary, method_dict::NUM_FIXED + pairs * 2);
    store.set_slot(d, method_dict::TALLY, Value::Int(0));
    d
}

pub fn new_class(
    store: &mut ObjectStore,
    super_class: Value,
    num_inst_vars: usize,
    is_fixed: bool,
) -> Value {
    let k = store.alloc(ObjectKind::Class, class::NUM_SLOTS);
    store.set_slot(k, class::SUPER_CLASS, super_class);
    store.set_slot(
        k,
        class::INSTANCE_SPEC,
        Value::Int(pack_instance_spec(num_inst_vars, is_fixed)),
    );
    k
}

pub fn new_metaclass(store: &mut ObjectStore, instance_class: Value) -> Value {
    let m = store.alloc(ObjectKind::Metaclass, metaclass::NUM_SLOTS);
    store.set_slot(m, metaclass::INSTANCE_CLASS, instance_class);
    m
}

pub fn new_compiled_method(store: &mut ObjectStore) -> Value {
    let m = store.alloc(ObjectKind::CompiledMethod, compiled::NUM_SLOTS);
    store.set_slot(m, compiled::HEADER, Value::Int(0));
    m
}

pub fn new_compiled_block(store: &mut ObjectStore) -> Value {
    let b = store.alloc(ObjectKind::CompiledBlock, compiled::NUM_SLOTS);
    store.set_slot(b, compiled::HEADER, Value::Int(0));
    b
}

pub fn new_method_info(store: &mut ObjectStore, class: Value, selector: Value) -> Value {
    let i = store.alloc(ObjectKind::MethodInfo, method_info::NUM_SLOTS);
    store.set_slot(i, method_info::CLASS, class);
    store.set_slot(i, method_info::SELECTOR, selector);
    i
}

pub fn new_block_closure(
    store: &mut ObjectStore,
    outer_context: Value,
    block: Value,
    receiver: Value,
) -> Value {
    let c = store.alloc(ObjectKind::BlockClosure, closure::NUM_SLOTS);
    store.set_slot(c, closure::OUTER_CONTEXT, outer_context);
    store.set_slot(c, closure::BLOCK, block);
    store.set_slot(c, closure::RECEIVER, receiver);
    c
}
