//! Compile-and-send scenarios: methods compiled from source through
//! the statement parser, installed on live classes and exercised
//! through the interpreter.

use std::path::Path;

use rustalk::bytecode::{B_POP_STACK_TOP, B_PUSH_SELF, B_RETURN_METHOD_STACK_TOP, pack_header};
use rustalk::compiler::Compiler;
use rustalk::errors::ExecError;
use rustalk::interp::Interp;
use rustalk::memory::{ObjectKind, Value};
use rustalk::objects::{self, binding, class, closure, compiled};
use rustalk::system::{self, Environment};

fn fresh() -> (Environment, Interp) {
    system::rebuild(Path::new("kernel")).expect("rebuild")
}

/// Compile extra methods onto Object for the scenarios below.
fn with_test_methods() -> (Environment, Interp) {
    let (mut env, interp) = fresh();
    let src = r#"
"methods the execution scenarios exercise"
Object subclass: Object [
    foo [ ^42 ]
    id: x [ ^x ]
    at: a put: b [ ^b ]
    give [ ^self yourself ]
    nop [ ]
    swap: x [ | t | t := x. ^t ]
    home [ ^Smalltalk ]
    markDone [ KernelInitialized := true ]
    work [ ^[ 42 ] ]
    Object class >> species [ ^self ]
]
"#;
    Compiler::new()
        .compile_module(&mut env, src)
        .expect("compile test methods");
    (env, interp)
}

fn object_method(env: &Environment, selector: &str) -> Value {
    let k_object = env.cached_class("object").expect("object");
    let md = env.store.slot(k_object, class::METHOD_DICTIONARY);
    assert!(!md.is_nil(), "Object must have a method dictionary");
    let sym = env.symbol_find(selector);
    assert!(!sym.is_nil(), "selector {selector} must be interned");
    let method = env.identdict_find(md, sym).expect("lookup");
    assert!(!method.is_nil(), "Object must bind #{selector}");
    method
}

#[test]
fn a_constant_returning_method_answers_its_constant() {
    let (mut env, mut interp) = with_test_methods();
    let receiver = env.true_obj;
    let result = interp
        .send_message_extern(&mut env, receiver, "foo", &[])
        .expect("send foo");
    assert_eq!(result, Value::Int(42));
}

#[test]
fn yourself_on_nil_answers_nil_itself() {
    let (mut env, mut interp) = fresh();
    let result = interp
        .send_message_extern(&mut env, Value::NIL, "yourself", &[])
        .expect("send yourself");
    assert!(result.is_same(Value::NIL));
}

#[test]
fn an_argument_returning_method_echoes_the_argument() {
    let (mut env, mut interp) = with_test_methods();
    let false_obj = env.false_obj;
    let result = interp
        .send_message_extern(&mut env, false_obj, "id:", &[Value::Int(7)])
        .expect("send id:");
    assert_eq!(result, Value::Int(7));
}

#[test]
fn keyword_parts_combine_into_one_selector() {
    let (mut env, mut interp) = with_test_methods();
    let result = interp
        .send_message_extern(
            &mut env,
            Value::NIL,
            "at:put:",
            &[Value::Int(1), Value::Int(2)],
        )
        .expect("send at:put:");
    assert_eq!(result, Value::Int(2));
}

#[test]
fn class_of_a_small_integer_is_the_cached_class() {
    let (mut env, mut interp) = fresh();
    let result = interp
        .send_message_extern(&mut env, Value::Int(5), "class", &[])
        .expect("send class");
    assert_eq!(result, env.cached_class("small_int").expect("small_int"));
}

#[test]
fn identity_primitive_answers_the_boolean_singletons() {
    let (mut env, mut interp) = fresh();
    let same = interp
        .send_message_extern(&mut env, Value::NIL, "==", &[Value::NIL])
        .expect("send ==");
    assert_eq!(same, env.true_obj);
    let different = interp
        .send_message_extern(&mut env, Value::NIL, "==", &[Value::Int(3)])
        .expect("send ==");
    assert_eq!(different, env.false_obj);
}

#[test]
fn basic_size_counts_indexed_storage() {
    let (mut env, mut interp) = fresh();
    let table = env.sym_table;
    let result = interp
        .send_message_extern(&mut env, table, "size", &[])
        .expect("send size");
    assert_eq!(result, Value::Int(512));
    let on_int = interp
        .send_message_extern(&mut env, Value::Int(9), "basicSize", &[])
        .expect("send basicSize");
    assert_eq!(on_int, Value::Int(0));
}

#[test]
fn return_self_compiles_to_the_canonical_pair() {
    let (env, _) = with_test_methods();
    let method = object_method(&env, "yourself");
    assert_eq!(
        env.store.bytes(method),
        &[B_PUSH_SELF, 0, B_RETURN_METHOD_STACK_TOP, 0]
    );
}

#[test]
fn an_empty_body_compiles_to_the_same_trailer() {
    let (env, _) = with_test_methods();
    let method = object_method(&env, "nop");
    assert_eq!(
        env.store.bytes(method),
        &[B_PUSH_SELF, 0, B_RETURN_METHOD_STACK_TOP, 0]
    );
}

#[test]
fn unary_chains_send_through_the_method_dictionary() {
    let (mut env, mut interp) = with_test_methods();
    let receiver = env.true_obj;
    let result = interp
        .send_message_extern(&mut env, receiver, "give", &[])
        .expect("send give");
    assert_eq!(result, receiver);
}

#[test]
fn temporaries_store_without_popping() {
    let (mut env, mut interp) = with_test_methods();
    let result = interp
        .send_message_extern(&mut env, Value::NIL, "swap:", &[Value::Int(11)])
        .expect("send swap:");
    assert_eq!(result, Value::Int(11));
}

#[test]
fn globals_resolve_through_variable_bindings() {
    let (mut env, mut interp) = with_test_methods();
    let result = interp
        .send_message_extern(&mut env, Value::NIL, "home", &[])
        .expect("send home");
    assert_eq!(result, env.st_dict);
}

#[test]
fn storing_a_global_rewrites_its_binding() {
    let (mut env, mut interp) = with_test_methods();
    interp
        .send_message_extern(&mut env, Value::NIL, "markDone", &[])
        .expect("send markDone");
    let b = env.find_global("KernelInitialized").expect("lookup");
    assert_eq!(env.store.slot(b, binding::VALUE), env.true_obj);
}

#[test]
fn a_block_literal_evaluates_to_a_closure() {
    let (mut env, mut interp) = with_test_methods();
    let result = interp
        .send_message_extern(&mut env, Value::NIL, "work", &[])
        .expect("send work");
    assert_eq!(env.store.kind_of(result), Some(ObjectKind::BlockClosure));
    let block = env.store.slot(result, closure::BLOCK);
    assert_eq!(env.store.kind_of(block), Some(ObjectKind::CompiledBlock));
    // The block keeps its last value: one push, no trailer.
    assert_eq!(env.store.bytes(block).len(), 2);
    let method = object_method(&env, "work");
    assert_eq!(env.store.slot(block, compiled::METHOD), method);
}

#[test]
fn class_side_methods_install_on_the_metaclass() {
    let (mut env, mut interp) = with_test_methods();
    let k_object = env.cached_class("object").expect("object");
    let result = interp
        .send_message_extern(&mut env, k_object, "species", &[])
        .expect("send species");
    assert_eq!(result, k_object);
    // The instance side must not understand it.
    let err = interp
        .send_message_extern(&mut env, Value::NIL, "species", &[])
        .expect_err("instance send must fail");
    assert!(matches!(err, ExecError::DoesNotUnderstand { .. }));
}

#[test]
fn unknown_selectors_do_not_understand() {
    let (mut env, mut interp) = fresh();
    let err = interp
        .send_message_extern(&mut env, Value::Int(1), "fizzbuzz", &[])
        .expect_err("send must fail");
    assert!(matches!(err, ExecError::DoesNotUnderstand { .. }));
}

#[test]
fn sends_verify_the_header_arity() {
    let (mut env, mut interp) = with_test_methods();
    let err = interp
        .send_message_extern(&mut env, Value::NIL, "id:", &[])
        .expect_err("arity mismatch must fail");
    assert!(matches!(
        err,
        ExecError::ArityMismatch {
            expected: 1,
            found: 0,
            ..
        }
    ));
}

#[test]
fn unimplemented_opcodes_are_rejected() {
    let (mut env, mut interp) = fresh();
    // Hand-assemble a method using an in-range but unimplemented
    // opcode (a jump) and install it on Object.
    let k_object = env.cached_class("object").expect("object");
    let md = env.store.slot(k_object, class::METHOD_DICTIONARY);
    let sym = env.symbol_find_or_add("brokenOp");
    let method = objects::new_compiled_method(&mut env.store);
    env.store.set_bytes(method, vec![40, 0, B_RETURN_METHOD_STACK_TOP, 0]);
    env.store
        .set_slot(method, compiled::HEADER, Value::Int(pack_header(0, 0, 1, 0)));
    env.identdict_at_put(md, sym, method).expect("install");
    let err = interp
        .send_message_extern(&mut env, Value::NIL, "brokenOp", &[])
        .expect_err("unknown bytecode must fail");
    assert!(matches!(err, ExecError::UnknownBytecode(40)));
}

#[test]
fn popping_into_the_locals_area_underflows() {
    let (mut env, mut interp) = fresh();
    // A malformed method whose first instruction pops from an empty
    // evaluation stack. The temp slot below it must not be consumed.
    let k_object = env.cached_class("object").expect("object");
    let md = env.store.slot(k_object, class::METHOD_DICTIONARY);
    let sym = env.symbol_find_or_add("brokenPop");
    let method = objects::new_compiled_method(&mut env.store);
    env.store.set_bytes(
        method,
        vec![B_POP_STACK_TOP, 0, B_PUSH_SELF, 0, B_RETURN_METHOD_STACK_TOP, 0],
    );
    env.store
        .set_slot(method, compiled::HEADER, Value::Int(pack_header(0, 1, 1, 0)));
    env.identdict_at_put(md, sym, method).expect("install");
    let err = interp
        .send_message_extern(&mut env, Value::NIL, "brokenPop", &[])
        .expect_err("pop below the stack base must fail");
    assert!(matches!(err, ExecError::StackUnderflow));
}

#[test]
fn assignment_to_reserved_words_is_a_compile_error() {
    let (mut env, _) = fresh();
    let src = "Object subclass: Object [ bad [ self := 1 ] ]";
    let err = Compiler::new().compile_module(&mut env, src);
    assert!(err.is_err());
}

#[test]
fn methods_on_undefined_object_override_object() {
    let (mut env, mut interp) = fresh();
    let on_nil = interp
        .send_message_extern(&mut env, Value::NIL, "isNil", &[])
        .expect("send isNil");
    assert_eq!(on_nil, env.true_obj);
    let on_int = interp
        .send_message_extern(&mut env, Value::Int(3), "isNil", &[])
        .expect("send isNil");
    assert_eq!(on_int, env.false_obj);
}
