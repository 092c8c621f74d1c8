//! The environment: the object memory plus the global structures built
//! on top of it (class cache, cover map, symbol table, root namespace),
//! the hashed-collection algorithms and the three-pass class bootstrap.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use log::{debug, info};

use crate::bytecode::DisTable;
use crate::compiler::Compiler;
use crate::errors::{BootstrapError, BootstrapResult, ExecError, ExecResult};
use crate::init;
use crate::interp::Interp;
use crate::memory::{ObjectKind, ObjectStore, Value, scramble};
use crate::objects::{self, assoc, binding, binding_dict, class, metaclass, namespace, sym_link};
use crate::primitives;

/// Number of SymLink buckets in the global symbol table.
const SYMBOL_TABLE_SIZE: usize = 512;
/// Initial slot area of the root namespace.
const ROOT_NAMESPACE_SIZE: usize = 512;
/// Load factor above which a hashed collection grows.
const GROW_LOAD_FACTOR: f64 = 0.4;

/// Character-sequence hash used for symbol interning and string keys:
/// an accumulate/shift/xor mix over the character codes.
pub fn hsh_bytes(bytes: &[u8]) -> u32 {
    let mut h: u32 = 1_497_032_417;
    for &c in bytes {
        h = h.wrapping_add(c as u32);
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
    }
    h
}

/// The system state: every global structure the compiler and
/// interpreter share.
pub struct Environment {
    pub store: ObjectStore,
    /// Cached class objects, keyed by schedule cache name.
    classes: HashMap<&'static str, Value>,
    /// Runtime variant -> class, for objects allocated before their
    /// class field is stamped.
    covers: HashMap<ObjectKind, Value>,
    pub nil: Value,
    pub false_obj: Value,
    pub true_obj: Value,
    /// Array of SymLink chains.
    pub sym_table: Value,
    /// The root namespace, installed as the global `Smalltalk`.
    pub st_dict: Value,
    pub dis: DisTable,
}

impl Environment {
    pub fn new() -> Environment {
        Environment {
            store: ObjectStore::new(),
            classes: HashMap::new(),
            covers: HashMap::new(),
            nil: Value::NIL,
            false_obj: Value::FALSE,
            true_obj: Value::TRUE,
            sym_table: Value::NIL,
            st_dict: Value::NIL,
            dis: DisTable::new(),
        }
    }

    /// The class object cached under a schedule cache name.
    pub fn cached_class(&self, cache: &str) -> Option<Value> {
        self.classes.get(cache).copied()
    }

    fn cached_or_nil(&self, cache: &str) -> Value {
        self.classes.get(cache).copied().unwrap_or(Value::NIL)
    }

    fn require_class(&self, cache: &str) -> BootstrapResult<Value> {
        self.classes
            .get(cache)
            .copied()
            .ok_or_else(|| BootstrapError::MissingClassCache(cache.to_string()))
    }

    /// The class of any value. Small integers answer SmallInteger;
    /// heap objects answer their class field, falling back to the
    /// cover of their variant.
    pub fn class_of(&self, v: Value) -> Value {
        match v {
            Value::Int(_) => self.cached_or_nil("small_int"),
            Value::Ref(_) => {
                let cls = self.store.class_field(v);
                if !cls.is_nil() {
                    cls
                } else {
                    match self.store.kind_of(v) {
                        Some(kind) => self.covers.get(&kind).copied().unwrap_or(Value::NIL),
                        None => Value::NIL,
                    }
                }
            }
        }
    }

    /// Hash of a value: content hash for symbols and strings,
    /// scrambled identity otherwise.
    pub fn hash_of(&self, v: Value) -> u32 {
        match v {
            Value::Int(n) => scramble(n as u64),
            Value::Ref(id) => match self.store.obj(v).kind {
                ObjectKind::Symbol | ObjectKind::String => hsh_bytes(self.store.bytes(v)),
                _ => scramble(id.0),
            },
        }
    }

    /// A short printable form of a value, for logs and the debugger.
    pub fn display_value(&self, v: Value) -> String {
        match v {
            Value::Int(n) => n.to_string(),
            Value::Ref(id) => match self.store.kind_of(v) {
                None => format!("<dangling {}>", id.0),
                Some(ObjectKind::Symbol) => format!("#{}", objects::byte_str(&self.store, v)),
                Some(ObjectKind::String) => format!("'{}'", objects::byte_str(&self.store, v)),
                Some(ObjectKind::UndefinedObject) => "nil".to_string(),
                Some(ObjectKind::False) => "false".to_string(),
                Some(ObjectKind::True) => "true".to_string(),
                Some(ObjectKind::Class) => {
                    let name = self.store.slot(v, class::NAME);
                    if name.is_nil() {
                        "a Class".to_string()
                    } else {
                        objects::byte_str(&self.store, name)
                    }
                }
                Some(kind) => format!("a {:?}({})", kind, id.0),
            },
        }
    }

    // ----- symbol interning -------------------------------------------------

    /// Add a new Symbol to the global symbol table, prepending it to
    /// its bucket chain.
    pub fn symbol_add(&mut self, name: &str) -> Value {
        let sym = objects::new_symbol(&mut self.store, name);
        let table = self.sym_table;
        let mask = self.store.slot_count(table) - 1;
        let idx = (hsh_bytes(name.as_bytes()) as usize) & mask;
        let head = self.store.slot(table, idx);
        let link = objects::new_sym_link(&mut self.store, sym, head);
        self.store.set_slot(table, idx, link);
        sym
    }

    /// The interned Symbol for a name, or nil.
    pub fn symbol_find(&self, name: &str) -> Value {
        let table = self.sym_table;
        let mask = self.store.slot_count(table) - 1;
        let mut link = self
            .store
            .slot(table, (hsh_bytes(name.as_bytes()) as usize) & mask);
        while !link.is_nil() {
            let sym = self.store.slot(link, sym_link::SYMBOL);
            if self.store.bytes(sym) == name.as_bytes() {
                return sym;
            }
            link = self.store.slot(link, sym_link::NEXT_LINK);
        }
        Value::NIL
    }

    /// The canonical Symbol for a name, interning it if needed.
    pub fn symbol_find_or_add(&mut self, name: &str) -> Value {
        let found = self.symbol_find(name);
        if found.is_nil() {
            self.symbol_add(name)
        } else {
            found
        }
    }

    // ----- dictionary family ------------------------------------------------

    fn tally_of(&self, dict: Value) -> i64 {
        self.store.slot(dict, 0).as_int().unwrap_or(0)
    }

    /// Fixed prefix size of a dictionary-like object, from its class's
    /// instanceSpec.
    fn fixed_prefix_of(&self, dict: Value) -> usize {
        let klass = self.class_of(dict);
        if !klass.is_nil() {
            if let Some(spec) = self.store.slot(klass, class::INSTANCE_SPEC).as_int() {
                return objects::spec_num_inst(spec);
            }
        }
        match self.store.kind_of(dict) {
            Some(ObjectKind::BindingDictionary) => objects::binding_dict::NUM_FIXED,
            Some(ObjectKind::Namespace) => objects::namespace::NUM_FIXED,
            Some(ObjectKind::MethodDictionary) => objects::method_dict::NUM_FIXED,
            _ => objects::dict::NUM_FIXED,
        }
    }

    /// Probe for the slot holding `key`'s entry, or the free slot
    /// where it belongs. Drives both insertion and lookup.
    fn dict_index(&self, dict: Value, key: Value) -> ExecResult<usize> {
        let num_inst = self.fixed_prefix_of(dict);
        let arr_size = self.store.slot_count(dict) - num_inst;
        let mask = arr_size - 1;
        let mut idx = self.hash_of(key) as usize;
        let mut remaining = arr_size;
        while remaining > 0 {
            idx &= mask;
            let entry = self.store.slot(dict, idx + num_inst);
            if entry.is_nil() || key.is_same(self.store.slot(entry, assoc::KEY)) {
                return Ok(idx + num_inst);
            }
            idx += 1;
            remaining -= 1;
        }
        Err(ExecError::DictionaryFull)
    }

    fn dict_insert(&mut self, dict: Value, key: Value, entry: Value) -> ExecResult<()> {
        let tally = self.tally_of(dict);
        if tally as f64 / self.store.slot_count(dict) as f64 > GROW_LOAD_FACTOR {
            self.dict_grow(dict)?;
        }
        let idx = self.dict_index(dict, key)?;
        let existing = self.store.slot(dict, idx);
        self.store.set_slot(dict, idx, entry);
        if existing.is_nil() {
            self.store.set_slot(dict, 0, Value::Int(tally + 1));
        }
        Ok(())
    }

    /// Add a key/value pair to a Dictionary, wrapped in an
    /// Association.
    pub fn dict_at_put(&mut self, dict: Value, key: Value, value: Value) -> ExecResult<Value> {
        let entry = objects::new_association(&mut self.store, key, value);
        self.dict_insert(dict, key, entry)?;
        Ok(entry)
    }

    /// Add a key/value pair to a BindingDictionary or Namespace,
    /// wrapped in a VariableBinding homed in that dictionary.
    pub fn binding_at_put(&mut self, dict: Value, key: Value, value: Value) -> ExecResult<Value> {
        let entry = objects::new_variable_binding(&mut self.store, key, value, dict);
        self.dict_insert(dict, key, entry)?;
        Ok(entry)
    }

    /// The entry (Association or VariableBinding) for a key, or nil.
    pub fn dict_find(&self, dict: Value, key: Value) -> ExecResult<Value> {
        Ok(self.store.slot(dict, self.dict_index(dict, key)?))
    }

    /// Double the capacity of a dictionary and re-hash the entries.
    fn dict_grow(&mut self, dict: Value) -> ExecResult<()> {
        let num_inst = self.fixed_prefix_of(dict);
        let old = self.store.obj(dict).slots.clone();
        let old_arr = old.len() - num_inst;
        self.store.resize(dict, (old_arr << 1) + num_inst);
        for (n, &v) in old[..num_inst].iter().enumerate() {
            self.store.set_slot(dict, n, v);
        }
        for &entry in &old[num_inst..] {
            if !entry.is_nil() {
                let key = self.store.slot(entry, assoc::KEY);
                let idx = self.dict_index(dict, key)?;
                self.store.set_slot(dict, idx, entry);
            }
        }
        Ok(())
    }

    // ----- identity-keyed dictionaries (method dictionaries) ----------------

    /// Probe an identity-keyed pair-slot dictionary. Returns the index
    /// of the value slot; the key sits just below it.
    fn identdict_index(&self, dict: Value, key: Value) -> ExecResult<usize> {
        let num_inst = self.fixed_prefix_of(dict);
        let arr_size = self.store.slot_count(dict) - num_inst;
        let mask = arr_size - 1;
        let mut idx = (self.hash_of(key) as usize) << 1;
        let mut remaining = arr_size >> 1;
        while remaining > 0 {
            idx &= mask;
            let item = self.store.slot(dict, idx + num_inst);
            if item.is_nil() || item.is_same(key) {
                return Ok(idx + num_inst + 1);
            }
            idx += 2;
            remaining -= 1;
        }
        Err(ExecError::DictionaryFull)
    }

    pub fn identdict_at_put(&mut self, dict: Value, key: Value, value: Value) -> ExecResult<()> {
        let tally = self.tally_of(dict);
        if tally as f64 / (self.store.slot_count(dict) >> 1) as f64 > GROW_LOAD_FACTOR {
            self.identdict_grow(dict)?;
        }
        let idx = self.identdict_index(dict, key)?;
        let existing = self.store.slot(dict, idx - 1);
        self.store.set_slot(dict, idx - 1, key);
        self.store.set_slot(dict, idx, value);
        if existing.is_nil() {
            self.store.set_slot(dict, 0, Value::Int(tally + 1));
        }
        Ok(())
    }

    /// The value for an identity key, or nil.
    pub fn identdict_find(&self, dict: Value, key: Value) -> ExecResult<Value> {
        Ok(self.store.slot(dict, self.identdict_index(dict, key)?))
    }

    fn identdict_grow(&mut self, dict: Value) -> ExecResult<()> {
        let num_inst = self.fixed_prefix_of(dict);
        let old = self.store.obj(dict).slots.clone();
        let old_arr = old.len() - num_inst;
        self.store.resize(dict, (old_arr << 1) + num_inst);
        for (n, &v) in old[..num_inst].iter().enumerate() {
            self.store.set_slot(dict, n, v);
        }
        let mut n = num_inst;
        while n < old.len() {
            let key = old[n];
            if !key.is_nil() {
                let idx = self.identdict_index(dict, key)?;
                self.store.set_slot(dict, idx - 1, key);
                self.store.set_slot(dict, idx, old[n + 1]);
            }
            n += 2;
        }
        Ok(())
    }

    // ----- globals ----------------------------------------------------------

    /// Add an item to a namespace under a newly interned Symbol,
    /// homed in a VariableBinding. Answers the Symbol.
    pub fn name_add_sym(&mut self, dict: Value, name: &str, item: Value) -> ExecResult<Value> {
        let sym = self.symbol_add(name);
        self.binding_at_put(dict, sym, item)?;
        Ok(sym)
    }

    /// The VariableBinding of a global in the root namespace, or nil.
    pub fn find_global(&self, name: &str) -> ExecResult<Value> {
        let sym = self.symbol_find(name);
        if sym.is_nil() {
            return Ok(Value::NIL);
        }
        self.dict_find(self.st_dict, sym)
    }

    /// Same as `find_global` with an already interned selector Symbol.
    pub fn find_global_sym(&self, sym: Value) -> ExecResult<Value> {
        self.dict_find(self.st_dict, sym)
    }

    // ----- class bootstrap --------------------------------------------------

    /// Pass 1: walk the schedule and establish the class tree. Each
    /// class's subClasses slot holds a plain count for now.
    pub fn build_classes_1(&mut self) -> BootstrapResult<()> {
        for spec in init::INIT_CLASSES {
            let (super_obj, super_vars) = match spec.super_cache {
                Some(cache) => {
                    let s = self.require_class(cache)?;
                    let spec_word = self.store.slot(s, class::INSTANCE_SPEC).as_int().unwrap_or(0);
                    (s, objects::spec_num_inst(spec_word))
                }
                None => (Value::NIL, 0),
            };
            let klass = objects::new_class(
                &mut self.store,
                super_obj,
                spec.inst_vars.len() + super_vars,
                spec.is_fixed,
            );
            self.store.set_slot(klass, class::SUB_CLASSES, Value::Int(0));
            if !super_obj.is_nil() {
                let n = self.store.slot(super_obj, class::SUB_CLASSES).as_int().unwrap_or(0);
                self.store.set_slot(super_obj, class::SUB_CLASSES, Value::Int(n + 1));
            }
            self.classes.insert(spec.cache, klass);
        }
        Ok(())
    }

    /// Pass 2: associate runtime variants with their classes, then
    /// allocate the nil/false/true singletons at the reserved
    /// identities. Objects created after this point resolve the right
    /// class through the cover map.
    pub fn build_classes_2(&mut self) {
        for spec in init::INIT_CLASSES {
            if let Some(kind) = spec.cover {
                // Class objects get their metaclass as class in pass 3.
                if spec.cache != "class" {
                    let klass = self.cached_or_nil(spec.cache);
                    self.covers.insert(kind, klass);
                }
            }
        }
        let k_false = self.cached_or_nil("false");
        self.covers.insert(ObjectKind::False, k_false);
        let k_true = self.cached_or_nil("true");
        self.covers.insert(ObjectKind::True, k_true);

        self.nil = self.store.alloc_reserved(0, ObjectKind::UndefinedObject, 0);
        self.false_obj = self.store.alloc_reserved(1, ObjectKind::False, 1);
        self.true_obj = self.store.alloc_reserved(2, ObjectKind::True, 1);
    }

    /// Pass 3: create and wire the metaclasses, size and fill the
    /// subclass arrays, and populate the descriptive slots of every
    /// class.
    pub fn build_classes_3(&mut self) -> BootstrapResult<()> {
        // The Class metaclass closes the lattice; wire it first.
        let k_class = self.require_class("class")?;
        self.create_meta(k_class);
        let arr = objects::new_array(&mut self.store, 2);
        self.store.set_slot(arr, 0, Value::Int(1));
        self.store.set_slot(k_class, class::SUB_CLASSES, arr);

        for spec in init::INIT_CLASSES {
            let klass = self.require_class(spec.cache)?;
            let meta = {
                let m = self.store.class_field(klass);
                if m.is_nil() { self.create_meta(klass) } else { m }
            };
            let super_obj = self.store.slot(klass, class::SUPER_CLASS);
            let meta_super = if super_obj.is_nil() {
                k_class
            } else {
                self.class_of(super_obj)
            };
            self.store.set_slot(meta, metaclass::SUPER_CLASS, meta_super);
            self.subclass_add(meta_super, meta);
            let meta_vars = self.create_inst_vars(Value::NIL, init::INIT_META_VARS);
            self.store.set_slot(meta, metaclass::INSTANCE_VARIABLES, meta_vars);
            if !super_obj.is_nil() {
                self.subclass_add(super_obj, klass);
            }
            let st_dict = self.st_dict;
            self.store.set_slot(klass, class::ENVIRONMENT, st_dict);
            let ivars = self.create_inst_vars(super_obj, spec.inst_vars);
            self.store.set_slot(klass, class::INSTANCE_VARIABLES, ivars);
            let cvars = self.create_class_vars(klass, spec.class_vars)?;
            self.store.set_slot(klass, class::CLASS_VARIABLES, cvars);
            let pools = self.create_shared_pools(spec.shared_pools);
            self.store.set_slot(klass, class::SHARED_POOLS, pools);
            let name = self.name_add_sym(st_dict, spec.name, klass)?;
            self.store.set_slot(klass, class::NAME, name);
        }
        Ok(())
    }

    /// Create a Metaclass and link it with its instance class. The
    /// subclass arrays of both are sized from the pass-1 counter, with
    /// slot 0 serving as the fill countdown.
    fn create_meta(&mut self, inst: Value) -> Value {
        let meta = objects::new_metaclass(&mut self.store, inst);
        self.store.set_class(inst, meta);
        if let Some(n) = self.store.slot(inst, class::SUB_CLASSES).as_int() {
            if n > 0 {
                let meta_arr = objects::new_array(&mut self.store, n as usize);
                self.store.set_slot(meta_arr, 0, Value::Int(n));
                self.store.set_slot(meta, metaclass::SUB_CLASSES, meta_arr);
                let inst_arr = objects::new_array(&mut self.store, n as usize);
                self.store.set_slot(inst_arr, 0, Value::Int(n));
                self.store.set_slot(inst, class::SUB_CLASSES, inst_arr);
            }
        }
        meta
    }

    /// Record a subclass in a class's subclass array, filling from the
    /// countdown in slot 0.
    fn subclass_add(&mut self, super_obj: Value, sub: Value) {
        let arr = self.store.slot(super_obj, class::SUB_CLASSES);
        if let Some(n) = self.store.slot(arr, 0).as_int() {
            if n > 0 {
                let idx = (n - 1) as usize;
                self.store.set_slot(arr, 0, Value::Int(idx as i64));
                self.store.set_slot(arr, idx, sub);
            }
        }
    }

    /// The instanceVariables array for a class: the inherited names
    /// followed by the local ones, all interned.
    fn create_inst_vars(&mut self, super_obj: Value, names: &[&str]) -> Value {
        let super_arr = if super_obj.is_nil() {
            Value::NIL
        } else {
            self.store.slot(super_obj, class::INSTANCE_VARIABLES)
        };
        let num_super = if super_arr.is_nil() {
            0
        } else {
            self.store.slot_count(super_arr)
        };
        let total = num_super + names.len();
        if total == 0 {
            return Value::NIL;
        }
        let arr = objects::new_array(&mut self.store, total);
        for n in 0..num_super {
            let v = self.store.slot(super_arr, n);
            self.store.set_slot(arr, n, v);
        }
        for (n, name) in names.iter().enumerate() {
            let sym = self.symbol_find_or_add(name);
            self.store.set_slot(arr, num_super + n, sym);
        }
        arr
    }

    /// The BindingDictionary holding a class's class variables, each
    /// bound to nil.
    fn create_class_vars(&mut self, klass: Value, names: &[&str]) -> ExecResult<Value> {
        if names.is_empty() {
            return Ok(Value::NIL);
        }
        let d = objects::new_binding_dictionary(&mut self.store, 8);
        self.store.set_slot(d, binding_dict::ENVIRONMENT, klass);
        for name in names {
            let sym = self.symbol_find_or_add(name);
            self.binding_at_put(d, sym, Value::NIL)?;
        }
        Ok(d)
    }

    fn create_shared_pools(&mut self, names: &[&str]) -> Value {
        if names.is_empty() {
            Value::NIL
        } else {
            objects::new_array(&mut self.store, names.len())
        }
    }

    /// Log the contents of a namespace at debug level.
    pub fn log_namespace(&self, dict: Value) {
        let num_inst = self.fixed_prefix_of(dict);
        debug!(
            "tally {} ({})",
            self.tally_of(dict),
            self.store.slot_count(dict) - num_inst
        );
        for n in num_inst..self.store.slot_count(dict) {
            let entry = self.store.slot(dict, n);
            if !entry.is_nil() {
                let key = self.store.slot(entry, binding::KEY);
                let value = self.store.slot(entry, binding::VALUE);
                debug!(
                    "[{}] {} -> {}",
                    n - num_inst,
                    self.display_value(key),
                    self.display_value(value)
                );
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Environment {
        Environment::new()
    }
}

/// Build a fresh environment from scratch: run the three class
/// passes, seed the root namespace, register the primitives and
/// compile the kernel modules. Answers the environment and an
/// interpreter ready for sends.
pub fn rebuild(kernel_dir: &Path) -> Result<(Environment, Interp)> {
    let mut env = Environment::new();

    info!("building class tree");
    env.build_classes_1()?;
    env.build_classes_2();

    env.sym_table = objects::new_array(&mut env.store, SYMBOL_TABLE_SIZE);

    // The root namespace, reachable as the global `Smalltalk`.
    let st_dict = objects::new_namespace(&mut env.store, ROOT_NAMESPACE_SIZE);
    let k_sys = env
        .cached_class("sys_dictionary")
        .ok_or_else(|| BootstrapError::MissingClassCache("sys_dictionary".to_string()))?;
    env.store.set_class(st_dict, k_sys);
    env.st_dict = st_dict;
    let name = env.name_add_sym(st_dict, "Smalltalk", st_dict)?;
    env.store.set_slot(st_dict, namespace::NAME, name);

    let sym_table = env.sym_table;
    env.name_add_sym(st_dict, "SymbolTable", sym_table)?;
    let false_obj = env.false_obj;
    env.name_add_sym(st_dict, "KernelInitialized", false_obj)?;
    let version = objects::new_string(&mut env.store, "1.0");
    env.name_add_sym(st_dict, "Version", version)?;
    let features = objects::new_array(&mut env.store, 1);
    env.name_add_sym(st_dict, "Features", features)?;
    let undeclared = objects::new_namespace(&mut env.store, 32);
    env.name_add_sym(st_dict, "Undeclared", undeclared)?;
    env.name_add_sym(st_dict, "SystemExceptions", st_dict)?;

    info!("finalizing class metaobjects");
    env.build_classes_3()?;

    env.name_add_sym(st_dict, "Bigendian", false_obj)?;

    let mut interp = Interp::new();
    interp.reset();

    primitives::build_primitives(&mut env, &mut interp)?;

    info!("compiling kernel modules");
    let mut compiler = Compiler::new();
    for module in init::INIT_KERNEL_MODULES {
        let path = kernel_dir.join(module);
        info!("compiling {}", path.display());
        compiler.compile_file(&mut env, &path)?;
    }

    env.log_namespace(env.st_dict);
    Ok((env, interp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_hash_matches_reference_values() {
        // Same accumulator, same input, same value: interning and
        // dictionary probes must agree on this.
        assert_eq!(hsh_bytes(b"abc"), hsh_bytes(b"abc"));
        assert_ne!(hsh_bytes(b"abc"), hsh_bytes(b"abd"));
        assert_ne!(hsh_bytes(b""), 0);
    }
}
