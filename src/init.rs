//! Static configuration for rebuilding the environment: the class
//! schedule, the metaclass instance variable names, the kernel module
//! list and the primitive table.

use crate::memory::ObjectKind;

/// One entry of the class schedule. The bootstrap walks the schedule
/// in order, so a superclass always precedes its subclasses.
pub struct ClassSpec {
    pub name: &'static str,
    /// Runtime variant covered by this class, if any. Objects
    /// allocated with that kind report this class once pass 2 has run.
    pub cover: Option<ObjectKind>,
    pub cache: &'static str,
    pub super_cache: Option<&'static str>,
    pub is_fixed: bool,
    pub inst_vars: &'static [&'static str],
    pub class_vars: &'static [&'static str],
    pub shared_pools: &'static [&'static str],
}

const fn spec(
    name: &'static str,
    cover: Option<ObjectKind>,
    cache: &'static str,
    super_cache: Option<&'static str>,
    is_fixed: bool,
    inst_vars: &'static [&'static str],
    class_vars: &'static [&'static str],
    shared_pools: &'static [&'static str],
) -> ClassSpec {
    ClassSpec {
        name,
        cover,
        cache,
        super_cache,
        is_fixed,
        inst_vars,
        class_vars,
        shared_pools,
    }
}

pub const INIT_CLASSES: &[ClassSpec] = &[
    spec(
        "Object",
        Some(ObjectKind::Object),
        "object",
        None,
        false,
        &[],
        &["Dependencies", "FinalizableObjects", "FinalSemaphore"],
        &["VMPrimitives"],
    ),
    spec(
        "UndefinedObject",
        Some(ObjectKind::UndefinedObject),
        "undef_obj",
        Some("object"),
        true,
        &[],
        &[],
        &[],
    ),
    spec("Boolean", None, "boolean", Some("object"), true, &[], &[], &[]),
    spec("False", None, "false", Some("boolean"), true, &["truthValue"], &[], &[]),
    spec("True", None, "true", Some("boolean"), true, &["truthValue"], &[], &[]),
    spec(
        "Behavior",
        None,
        "behavior",
        Some("object"),
        true,
        &[
            "superClass",
            "methodDictionary",
            "instanceSpec",
            "subClasses",
            "instanceVariables",
        ],
        &[],
        &[],
    ),
    spec("ClassDescription", None, "class_desc", Some("behavior"), true, &[], &[], &[]),
    spec(
        "Class",
        Some(ObjectKind::Class),
        "class",
        Some("class_desc"),
        true,
        &[
            "name",
            "comment",
            "category",
            "environment",
            "classVariables",
            "sharedPools",
            "pragmaHandlers",
        ],
        &[],
        &[],
    ),
    spec(
        "Metaclass",
        Some(ObjectKind::Metaclass),
        "metaclass",
        Some("class_desc"),
        true,
        &["instanceClass"],
        &[],
        &[],
    ),
    spec("Iterable", None, "iterable", Some("object"), true, &[], &[], &[]),
    spec("Collection", None, "collection", Some("iterable"), true, &[], &[], &[]),
    spec(
        "SequencableCollection",
        None,
        "seq_collection",
        Some("collection"),
        true,
        &[],
        &[],
        &[],
    ),
    spec(
        "ArrayedCollection",
        None,
        "arr_collection",
        Some("seq_collection"),
        false,
        &[],
        &[],
        &[],
    ),
    spec(
        "Array",
        Some(ObjectKind::Array),
        "array",
        Some("arr_collection"),
        false,
        &[],
        &[],
        &[],
    ),
    spec("Link", None, "link", Some("object"), true, &["nextLink"], &[], &[]),
    spec(
        "SymLink",
        Some(ObjectKind::SymLink),
        "sym_link",
        Some("link"),
        true,
        &["symbol"],
        &[],
        &[],
    ),
    spec(
        "HashedCollection",
        None,
        "hash_collection",
        Some("collection"),
        false,
        &["tally"],
        &[],
        &[],
    ),
    spec(
        "Dictionary",
        Some(ObjectKind::Dictionary),
        "dictionary",
        Some("hash_collection"),
        false,
        &[],
        &[],
        &[],
    ),
    spec(
        "BindingDictionary",
        Some(ObjectKind::BindingDictionary),
        "bind_dictionary",
        Some("dictionary"),
        false,
        &["environment"],
        &[],
        &[],
    ),
    spec(
        "AbstractNamespace",
        None,
        "abs_namespace",
        Some("bind_dictionary"),
        false,
        &["name", "subspaces", "sharedPools"],
        &[],
        &[],
    ),
    spec(
        "Namespace",
        Some(ObjectKind::Namespace),
        "namespace",
        Some("abs_namespace"),
        false,
        &[],
        &[],
        &[],
    ),
    spec(
        "RootNamespace",
        None,
        "root_namespace",
        Some("abs_namespace"),
        false,
        &[],
        &[],
        &[],
    ),
    spec(
        "SystemDictionary",
        None,
        "sys_dictionary",
        Some("root_namespace"),
        false,
        &[],
        &[],
        &[],
    ),
    spec("Magnitude", None, "magnitude", Some("object"), true, &[], &[], &[]),
    spec("LookupKey", None, "lookup_key", Some("magnitude"), true, &["key"], &[], &[]),
    spec(
        "Association",
        Some(ObjectKind::Association),
        "assoc",
        Some("lookup_key"),
        true,
        &["value"],
        &[],
        &[],
    ),
    spec(
        "HomedAssociation",
        None,
        "homed_assoc",
        Some("assoc"),
        true,
        &["environment"],
        &[],
        &[],
    ),
    spec(
        "VariableBinding",
        Some(ObjectKind::VariableBinding),
        "variable_bind",
        Some("homed_assoc"),
        true,
        &[],
        &[],
        &[],
    ),
    spec(
        "CharacterArray",
        None,
        "char_array",
        Some("arr_collection"),
        false,
        &[],
        &[],
        &[],
    ),
    spec(
        "String",
        Some(ObjectKind::String),
        "string",
        Some("char_array"),
        false,
        &[],
        &[],
        &[],
    ),
    spec(
        "Symbol",
        Some(ObjectKind::Symbol),
        "symbol",
        Some("string"),
        false,
        &[],
        &[],
        &[],
    ),
    spec("Number", None, "number", Some("magnitude"), true, &[], &[], &[]),
    spec(
        "Integer",
        None,
        "integer",
        Some("number"),
        true,
        &[],
        &[],
        &["StSymbols"],
    ),
    spec("SmallInteger", None, "small_int", Some("integer"), true, &[], &[], &[]),
    spec(
        "ContextPart",
        None,
        "context_part",
        Some("object"),
        false,
        &["parent", "nativeIP", "ip", "sp", "receiver", "method"],
        &[],
        &[],
    ),
    spec(
        "BlockContext",
        Some(ObjectKind::BlockContext),
        "blk_context",
        Some("context_part"),
        false,
        &["outerContext"],
        &[],
        &[],
    ),
    spec(
        "MethodContext",
        Some(ObjectKind::MethodContext),
        "meth_context",
        Some("context_part"),
        false,
        &["flags"],
        &[],
        &[],
    ),
    spec(
        "BlockClosure",
        Some(ObjectKind::BlockClosure),
        "blk_closure",
        Some("object"),
        true,
        &["outerContext", "block", "receiver"],
        &[],
        &[],
    ),
    spec(
        "CompiledCode",
        None,
        "comp_code",
        Some("arr_collection"),
        false,
        &["literals", "header"],
        &[],
        &[],
    ),
    spec(
        "CompiledMethod",
        Some(ObjectKind::CompiledMethod),
        "comp_method",
        Some("comp_code"),
        false,
        &["descriptor"],
        &[],
        &[],
    ),
    spec(
        "CompiledBlock",
        Some(ObjectKind::CompiledBlock),
        "comp_block",
        Some("comp_code"),
        false,
        &["method"],
        &[],
        &[],
    ),
    spec(
        "MethodInfo",
        Some(ObjectKind::MethodInfo),
        "meth_info",
        Some("object"),
        false,
        &["sourceCode", "category", "class", "selector", "debugInfo"],
        &[],
        &[],
    ),
    spec(
        "LookupTable",
        None,
        "lookup_table",
        Some("dictionary"),
        false,
        &[],
        &[],
        &[],
    ),
    spec(
        "IdentityDictionary",
        None,
        "ident_dictionary",
        Some("lookup_table"),
        false,
        &[],
        &[],
        &[],
    ),
    spec(
        "MethodDictionary",
        Some(ObjectKind::MethodDictionary),
        "meth_dictionary",
        Some("ident_dictionary"),
        false,
        &["mutex"],
        &[],
        &[],
    ),
];

/// Instance variable names of Metaclass instances; these become the
/// instanceVariables array of every metaclass.
pub const INIT_META_VARS: &[&str] = &[
    "superClass",
    "methodDictionary",
    "instanceSpec",
    "subClasses",
    "instanceVariables",
    "name",
    "comment",
    "category",
    "environment",
    "classVariables",
    "sharedPools",
    "pragmaHandlers",
];

/// Kernel source modules compiled during rebuild, in order.
pub const INIT_KERNEL_MODULES: &[&str] = &["Object.st", "UndefinedObject.st", "Boolean.st"];

/// Primitive operations handled by the interpreter. The primitive id
/// is the position in this list plus one; 0 is reserved.
pub const INIT_PRIMITIVES: &[&str] = &["Object_basicSize", "Object_identity", "Object_class"];
