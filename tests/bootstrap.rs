//! Invariants of the freshly rebuilt environment: the metaclass
//! lattice, symbol interning and the dictionary family.

use std::path::Path;

use rustalk::init::INIT_CLASSES;
use rustalk::interp::Interp;
use rustalk::memory::{ObjectKind, Value};
use rustalk::objects::{self, assoc, class, metaclass};
use rustalk::system::{self, Environment};

fn fresh() -> (Environment, Interp) {
    system::rebuild(Path::new("kernel")).expect("rebuild")
}

#[test]
fn every_class_has_exactly_one_metaclass_pointing_back() {
    let (env, _) = fresh();
    for spec in INIT_CLASSES {
        let klass = env.cached_class(spec.cache).expect(spec.cache);
        let meta = env.class_of(klass);
        assert_eq!(
            env.store.kind_of(meta),
            Some(ObjectKind::Metaclass),
            "{} must be classed by a metaclass",
            spec.name
        );
        assert_eq!(
            env.store.slot(meta, metaclass::INSTANCE_CLASS),
            klass,
            "metaclass of {} must point back at it",
            spec.name
        );
    }
}

#[test]
fn root_class_invariants_hold() {
    let (env, _) = fresh();
    let k_object = env.cached_class("object").expect("object");
    let k_class = env.cached_class("class").expect("class");
    assert!(env.store.slot(k_object, class::SUPER_CLASS).is_nil());
    let root_meta = env.class_of(k_object);
    assert_eq!(env.store.slot(root_meta, metaclass::SUPER_CLASS), k_class);
}

#[test]
fn metaclass_superclass_parallels_the_class_tree() {
    let (env, _) = fresh();
    for spec in INIT_CLASSES {
        let klass = env.cached_class(spec.cache).expect(spec.cache);
        let super_class = env.store.slot(klass, class::SUPER_CLASS);
        if super_class.is_nil() {
            continue;
        }
        let meta = env.class_of(klass);
        assert_eq!(
            env.store.slot(meta, metaclass::SUPER_CLASS),
            env.class_of(super_class),
            "metaclass chain of {} must mirror the class chain",
            spec.name
        );
    }
}

#[test]
fn every_class_is_homed_in_the_root_namespace() {
    let (env, _) = fresh();
    for spec in INIT_CLASSES {
        let klass = env.cached_class(spec.cache).expect(spec.cache);
        assert_eq!(env.store.slot(klass, class::ENVIRONMENT), env.st_dict);
        let name = env.store.slot(klass, class::NAME);
        assert_eq!(objects::byte_str(&env.store, name), spec.name);
        let global = env.find_global(spec.name).expect("lookup");
        assert!(!global.is_nil(), "{} must be a global", spec.name);
    }
}

#[test]
fn class_instance_variables_include_inherited_names() {
    let (env, _) = fresh();
    let k_class = env.cached_class("class").expect("class");
    let ivars = env.store.slot(k_class, class::INSTANCE_VARIABLES);
    assert_eq!(env.store.slot_count(ivars), 12);
    // Behavior contributes the first five, Class the last seven.
    let first = env.store.slot(ivars, 0);
    assert_eq!(objects::byte_str(&env.store, first), "superClass");
    let name = env.store.slot(ivars, 5);
    assert_eq!(objects::byte_str(&env.store, name), "name");
}

#[test]
fn interning_the_same_name_twice_yields_one_symbol() {
    let (mut env, _) = fresh();
    let a = env.symbol_find_or_add("abc");
    let b = env.symbol_find_or_add("abc");
    assert_eq!(a, b, "interned symbols must be identity-equal");
    let c = env.symbol_find_or_add("abd");
    assert_ne!(a, c);
}

#[test]
fn symbol_table_is_reachable_as_a_global() {
    let (env, _) = fresh();
    let binding = env.find_global("SymbolTable").expect("lookup");
    assert!(!binding.is_nil());
    let table = env.store.slot(binding, objects::binding::VALUE);
    assert_eq!(table, env.sym_table);
}

#[test]
fn dictionary_tracks_tally_and_grows_past_its_initial_capacity() {
    let (mut env, _) = fresh();
    let dict = objects::new_dictionary(&mut env.store, 8);
    let mut keys = Vec::new();
    for n in 0..9 {
        let key = env.symbol_find_or_add(&format!("growKey{n}"));
        keys.push(key);
        env.dict_at_put(dict, key, Value::Int(n as i64)).expect("insert");
    }
    assert_eq!(env.store.slot(dict, 0), Value::Int(9));
    assert!(
        env.store.slot_count(dict) > 9,
        "nine entries cannot stay within eight slots"
    );
    for (n, &key) in keys.iter().enumerate() {
        let entry = env.dict_find(dict, key).expect("lookup");
        assert!(!entry.is_nil(), "growKey{n} lost during growth");
        assert_eq!(env.store.slot(entry, assoc::VALUE), Value::Int(n as i64));
    }
    let missing = env.symbol_find_or_add("neverInserted");
    assert!(env.dict_find(dict, missing).expect("lookup").is_nil());
}

#[test]
fn method_dictionaries_are_identity_keyed() {
    let (mut env, _) = fresh();
    let md = objects::new_method_dictionary(&mut env.store, 8);
    let sel_a = env.symbol_find_or_add("alpha");
    let sel_b = env.symbol_find_or_add("beta");
    env.identdict_at_put(md, sel_a, Value::Int(1)).expect("insert");
    env.identdict_at_put(md, sel_b, Value::Int(2)).expect("insert");
    assert_eq!(env.identdict_find(md, sel_a).expect("find"), Value::Int(1));
    assert_eq!(env.identdict_find(md, sel_b).expect("find"), Value::Int(2));
    let other = env.symbol_find_or_add("gamma");
    assert!(env.identdict_find(md, other).expect("find").is_nil());
}

#[test]
fn method_dictionary_growth_preserves_entries() {
    let (mut env, _) = fresh();
    let md = objects::new_method_dictionary(&mut env.store, 4);
    let mut sels = Vec::new();
    for n in 0..6 {
        let sel = env.symbol_find_or_add(&format!("sel{n}"));
        sels.push(sel);
        env.identdict_at_put(md, sel, Value::Int(n as i64)).expect("insert");
    }
    for (n, &sel) in sels.iter().enumerate() {
        assert_eq!(env.identdict_find(md, sel).expect("find"), Value::Int(n as i64));
    }
}

#[test]
fn the_primitive_dictionary_is_published() {
    let (env, _) = fresh();
    let binding = env.find_global("VMPrimitives").expect("lookup");
    assert!(!binding.is_nil());
    let dict = env.store.slot(binding, objects::binding::VALUE);
    assert_eq!(env.store.kind_of(dict), Some(ObjectKind::BindingDictionary));
    let sym = env.symbol_find("VMpr_Object_class");
    assert!(!sym.is_nil());
    let entry = env.dict_find(dict, sym).expect("lookup");
    assert!(!entry.is_nil());
}

#[test]
fn singletons_sit_at_the_reserved_identities() {
    let (env, _) = fresh();
    assert_eq!(env.store.kind_of(Value::NIL), Some(ObjectKind::UndefinedObject));
    assert_eq!(env.store.kind_of(Value::FALSE), Some(ObjectKind::False));
    assert_eq!(env.store.kind_of(Value::TRUE), Some(ObjectKind::True));
    assert_eq!(env.class_of(Value::NIL), env.cached_class("undef_obj").expect("undef_obj"));
}
