//! The object memory: a uniform arena that owns every heap object and
//! hands out stable identities used as object references.

use std::collections::HashMap;

/// Identity of a heap object. Identities are unique for the lifetime
/// of the system and double as the hash seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

/// A polymorphic value: either an immediate small integer or a
/// reference into the object memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Ref(ObjectId),
}

/// Largest magnitude representable as an immediate small integer:
/// the machine word minus one tag bit.
pub const SMALL_INT_MAX: i64 = i64::MAX >> 1;

impl Value {
    /// The nil singleton. Identity 0 is reserved for it at bootstrap.
    pub const NIL: Value = Value::Ref(ObjectId(0));
    /// The false singleton, identity 1.
    pub const FALSE: Value = Value::Ref(ObjectId(1));
    /// The true singleton, identity 2.
    pub const TRUE: Value = Value::Ref(ObjectId(2));

    pub fn is_nil(self) -> bool {
        self == Value::NIL
    }

    pub fn is_int(self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            Value::Ref(_) => None,
        }
    }

    pub fn as_id(self) -> Option<ObjectId> {
        match self {
            Value::Int(_) => None,
            Value::Ref(id) => Some(id),
        }
    }

    /// Identity comparison, the `==` of the object model.
    pub fn is_same(self, other: Value) -> bool {
        self == other
    }
}

/// Discriminates the fixed-layout object variants. Mirrors the cover
/// classes the bootstrap associates with runtime Class objects, so an
/// object allocated before its class exists still knows its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Object,
    UndefinedObject,
    False,
    True,
    Array,
    String,
    Symbol,
    SymLink,
    Association,
    VariableBinding,
    Dictionary,
    BindingDictionary,
    Namespace,
    MethodDictionary,
    Class,
    Metaclass,
    BlockContext,
    MethodContext,
    BlockClosure,
    CompiledMethod,
    CompiledBlock,
    MethodInfo,
}

/// One heap object: class reference, flags word, ordered slot
/// references, and for byte-carrying variants an adjunct buffer
/// (string octets, bytecode).
#[derive(Debug, Clone)]
pub struct HeapObject {
    pub kind: ObjectKind,
    pub class: Value,
    pub flags: u32,
    pub slots: Vec<Value>,
    pub bytes: Option<Vec<u8>>,
}

const MIN_ID: u64 = 3;
const ID_STRIDE: u64 = 9;

/// Owns every heap object. All inter-object references are identities;
/// the reference graph may contain cycles, the ownership graph cannot.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: HashMap<ObjectId, HeapObject>,
    cur_id: u64,
}

impl ObjectStore {
    pub fn new() -> ObjectStore {
        ObjectStore {
            objects: HashMap::new(),
            cur_id: MIN_ID,
        }
    }

    /// Allocate a fresh identity: linear stride over 3..=MAX with
    /// wraparound, skipping identities still in use. 0, 1 and 2 are
    /// reserved for the nil/false/true singletons.
    fn new_id(&mut self) -> ObjectId {
        let mut id = self.cur_id;
        while self.objects.contains_key(&ObjectId(id)) {
            id = id.checked_add(ID_STRIDE).unwrap_or(MIN_ID);
            if id < MIN_ID {
                id = MIN_ID;
            }
        }
        self.cur_id = match id.checked_add(ID_STRIDE) {
            Some(n) => n,
            None => MIN_ID + (id % ID_STRIDE),
        };
        ObjectId(id)
    }

    /// Allocate an object with `slots` nil-initialized slot references.
    pub fn alloc(&mut self, kind: ObjectKind, slots: usize) -> Value {
        let id = self.new_id();
        self.objects.insert(
            id,
            HeapObject {
                kind,
                class: Value::NIL,
                flags: 0,
                slots: vec![Value::NIL; slots],
                bytes: None,
            },
        );
        Value::Ref(id)
    }

    /// Allocate one of the reserved singletons at a fixed identity.
    pub fn alloc_reserved(&mut self, id: u64, kind: ObjectKind, slots: usize) -> Value {
        debug_assert!(id < MIN_ID);
        self.objects.insert(
            ObjectId(id),
            HeapObject {
                kind,
                class: Value::NIL,
                flags: 0,
                slots: vec![Value::NIL; slots],
                bytes: None,
            },
        );
        Value::Ref(ObjectId(id))
    }

    /// Release an identity. Freeing an already-freed identity is a
    /// no-op.
    pub fn free(&mut self, v: Value) {
        if let Value::Ref(id) = v {
            self.objects.remove(&id);
        }
    }

    fn ref_id(v: Value) -> ObjectId {
        match v {
            Value::Ref(id) => id,
            Value::Int(n) => panic!("small integer {n} has no object slots"),
        }
    }

    pub fn obj(&self, v: Value) -> &HeapObject {
        &self.objects[&Self::ref_id(v)]
    }

    pub fn obj_mut(&mut self, v: Value) -> &mut HeapObject {
        self.objects
            .get_mut(&Self::ref_id(v))
            .unwrap_or_else(|| panic!("dangling object reference"))
    }

    pub fn contains(&self, v: Value) -> bool {
        match v {
            Value::Ref(id) => self.objects.contains_key(&id),
            Value::Int(_) => false,
        }
    }

    pub fn kind_of(&self, v: Value) -> Option<ObjectKind> {
        match v {
            Value::Ref(_) => Some(self.obj(v).kind),
            Value::Int(_) => None,
        }
    }

    pub fn slot(&self, obj: Value, idx: usize) -> Value {
        self.obj(obj).slots[idx]
    }

    pub fn set_slot(&mut self, obj: Value, idx: usize, v: Value) {
        self.obj_mut(obj).slots[idx] = v;
    }

    /// Number of slot references the object carries.
    pub fn slot_count(&self, obj: Value) -> usize {
        self.obj(obj).slots.len()
    }

    /// Resize the reference storage for an object. The old references
    /// are not preserved.
    pub fn resize(&mut self, obj: Value, slots: usize) {
        self.obj_mut(obj).slots = vec![Value::NIL; slots];
    }

    /// Extend the slot area to at least `slots`, keeping contents.
    pub fn ensure_slots(&mut self, obj: Value, slots: usize) {
        let o = self.obj_mut(obj);
        if o.slots.len() < slots {
            o.slots.resize(slots, Value::NIL);
        }
    }

    pub fn bytes(&self, obj: Value) -> &[u8] {
        self.obj(obj).bytes.as_deref().unwrap_or(&[])
    }

    pub fn set_bytes(&mut self, obj: Value, bytes: Vec<u8>) {
        self.obj_mut(obj).bytes = Some(bytes);
    }

    pub fn class_field(&self, obj: Value) -> Value {
        self.obj(obj).class
    }

    pub fn set_class(&mut self, obj: Value, class: Value) {
        self.obj_mut(obj).class = class;
    }
}

/// Identity-derived hash: the identity scrambled into 30 bits so it
/// stays a positive small integer.
pub fn scramble(id: u64) -> u32 {
    let mut h = id.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h ^= h >> 29;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 32;
    (h as u32) & 0x3fff_ffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique_and_start_past_reserved() {
        let mut store = ObjectStore::new();
        let a = store.alloc(ObjectKind::Object, 1);
        let b = store.alloc(ObjectKind::Object, 1);
        let c = store.alloc(ObjectKind::Object, 1);
        let ids: Vec<u64> = [a, b, c]
            .iter()
            .map(|v| v.as_id().unwrap().0)
            .collect();
        assert!(ids.iter().all(|&id| id >= 3));
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }

    #[test]
    fn free_is_idempotent() {
        let mut store = ObjectStore::new();
        let a = store.alloc(ObjectKind::Object, 0);
        store.free(a);
        store.free(a);
        assert!(!store.contains(a));
    }

    #[test]
    fn resize_discards_old_references() {
        let mut store = ObjectStore::new();
        let a = store.alloc(ObjectKind::Array, 2);
        store.set_slot(a, 0, Value::Int(5));
        store.resize(a, 4);
        assert_eq!(store.slot_count(a), 4);
        assert_eq!(store.slot(a, 0), Value::NIL);
    }

    #[test]
    fn reserved_identities_hold_the_singletons() {
        let mut store = ObjectStore::new();
        let nil = store.alloc_reserved(0, ObjectKind::UndefinedObject, 0);
        assert_eq!(nil, Value::NIL);
        assert!(Value::NIL.is_nil());
        assert!(!Value::FALSE.is_nil());
    }

    #[test]
    fn scramble_stays_in_small_int_range() {
        for id in [0u64, 1, 2, 3, 12, u64::MAX] {
            assert!((scramble(id) as i64) <= SMALL_INT_MAX);
        }
    }
}
