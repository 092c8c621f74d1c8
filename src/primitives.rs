//! The primitive registry: built-in operations invoked by compiled
//! methods through the header-encoded primitive id.

use log::debug;

use crate::errors::{BootstrapError, BootstrapResult};
use crate::init;
use crate::interp::Interp;
use crate::memory::Value;
use crate::objects;
use crate::system::Environment;

/// A primitive handler. Answers `Some(result)` on success; `None`
/// makes the send fall back to interpreting the method body.
pub type PrimitiveFn = fn(&mut Environment, Value, &[Value]) -> Option<Value>;

/// Resolve a primitive name to its handler.
pub fn lookup(name: &str) -> Option<PrimitiveFn> {
    match name {
        "Object_basicSize" => Some(prim_basic_size),
        "Object_identity" => Some(prim_identity),
        "Object_class" => Some(prim_class),
        _ => None,
    }
}

/// Indexable size of the receiver: byte count for byte objects, slot
/// count otherwise. Small integers have no indexed storage.
fn prim_basic_size(env: &mut Environment, receiver: Value, _args: &[Value]) -> Option<Value> {
    match receiver {
        Value::Int(_) => Some(Value::Int(0)),
        Value::Ref(_) => {
            let obj = env.store.obj(receiver);
            let size = match &obj.bytes {
                Some(bytes) => bytes.len(),
                None => obj.slots.len(),
            };
            Some(Value::Int(size as i64))
        }
    }
}

/// Identity comparison, `==`.
fn prim_identity(env: &mut Environment, receiver: Value, args: &[Value]) -> Option<Value> {
    let &[other] = args else { return None };
    Some(if receiver.is_same(other) {
        env.true_obj
    } else {
        env.false_obj
    })
}

/// The receiver's class, tagged-integer aware.
fn prim_class(env: &mut Environment, receiver: Value, _args: &[Value]) -> Option<Value> {
    let klass = env.class_of(receiver);
    if klass.is_nil() { None } else { Some(klass) }
}

/// Register every scheduled primitive with the interpreter and
/// publish the `VMPrimitives` dictionary mapping `VMpr_<name>`
/// symbols to primitive ids.
pub fn build_primitives(env: &mut Environment, interp: &mut Interp) -> BootstrapResult<()> {
    let prim_dict = objects::new_binding_dictionary(&mut env.store, 512);
    let st_dict = env.st_dict;
    env.store
        .set_slot(prim_dict, objects::binding_dict::ENVIRONMENT, st_dict);
    env.name_add_sym(st_dict, "VMPrimitives", prim_dict)?;
    for name in init::INIT_PRIMITIVES {
        let handler =
            lookup(name).ok_or_else(|| BootstrapError::MissingPrimitive(name.to_string()))?;
        let prim_id = interp.add_primitive(handler);
        let sym = env.symbol_add(&format!("VMpr_{name}"));
        env.binding_at_put(prim_dict, sym, Value::Int(prim_id as i64))?;
        debug!("primitive {} = {}", name, prim_id);
    }
    Ok(())
}
