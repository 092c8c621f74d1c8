//! The bytecode interpreter: a chain of activation records in the
//! object memory, a two-byte fetch/dispatch loop, and the message
//! send protocol.

use log::trace;

use crate::bytecode::{
    B_POP_STACK_TOP, B_PUSH_LIT_CONSTANT, B_PUSH_LIT_VARIABLE, B_PUSH_SELF,
    B_PUSH_TEMPORARY_VARIABLE, B_RETURN_METHOD_STACK_TOP, B_SEND, B_STORE_LIT_VARIABLE,
    B_STORE_TEMPORARY_VARIABLE, INSTRUCTION_LEN, decode_header,
};
use crate::errors::{ExecError, ExecResult};
use crate::memory::{ObjectKind, Value};
use crate::objects::{self, binding, class, compiled, context, method_info, metaclass};
use crate::primitives::PrimitiveFn;
use crate::system::Environment;

/// Callback fired around each interpreted instruction. Receives the
/// environment and the current context.
pub type StepHook = Box<dyn FnMut(&Environment, Value)>;

/// The interpreter: one current context (head of an activation chain
/// whose root's parent is nil), the primitive table, and the optional
/// step hooks.
pub struct Interp {
    ctx: Value,
    prim_table: Vec<PrimitiveFn>,
    pre_step: Option<StepHook>,
    post_step: Option<StepHook>,
}

impl Interp {
    pub fn new() -> Interp {
        Interp {
            ctx: Value::NIL,
            prim_table: Vec::new(),
            pre_step: None,
            post_step: None,
        }
    }

    /// Drop any in-progress activation chain.
    pub fn reset(&mut self) {
        self.ctx = Value::NIL;
    }

    pub fn current_context(&self) -> Value {
        self.ctx
    }

    /// Install or clear the pre-/post-step debug hooks.
    pub fn set_debug(&mut self, pre: Option<StepHook>, post: Option<StepHook>) {
        self.pre_step = pre;
        self.post_step = post;
    }

    /// Register a primitive handler. Answers its primitive id.
    pub fn add_primitive(&mut self, handler: PrimitiveFn) -> usize {
        self.prim_table.push(handler);
        self.prim_table.len()
    }

    // ----- context stack ----------------------------------------------------

    fn sp(&self, env: &Environment, ctx: Value) -> usize {
        env.store.slot(ctx, context::SP).as_int().unwrap_or(0) as usize
    }

    /// First slot of the evaluation stack: past the fixed prefix and
    /// the argument/temporary area of the context's method. Anything
    /// below this is locals, not poppable stack.
    fn stack_base(&self, env: &Environment, ctx: Value) -> usize {
        let method = env.store.slot(ctx, context::METHOD);
        if method.is_nil() {
            return context::FIXED_SLOTS;
        }
        let header = decode_header(env.store.slot(method, compiled::HEADER).as_int().unwrap_or(0));
        context::FIXED_SLOTS + header.num_args + header.num_temps
    }

    fn push_on(&mut self, env: &mut Environment, ctx: Value, v: Value) {
        let sp = self.sp(env, ctx) + 1;
        env.store.ensure_slots(ctx, sp + 1);
        env.store.set_slot(ctx, sp, v);
        env.store.set_slot(ctx, context::SP, Value::Int(sp as i64));
    }

    fn push(&mut self, env: &mut Environment, v: Value) {
        let ctx = self.ctx;
        self.push_on(env, ctx, v);
    }

    fn pop(&mut self, env: &mut Environment) -> ExecResult<Value> {
        let ctx = self.ctx;
        let sp = self.sp(env, ctx);
        if sp < self.stack_base(env, ctx) {
            return Err(ExecError::StackUnderflow);
        }
        let v = env.store.slot(ctx, sp);
        env.store.set_slot(ctx, context::SP, Value::Int(sp as i64 - 1));
        Ok(v)
    }

    fn top(&self, env: &Environment) -> ExecResult<Value> {
        let sp = self.sp(env, self.ctx);
        if sp < self.stack_base(env, self.ctx) {
            return Err(ExecError::StackUnderflow);
        }
        Ok(env.store.slot(self.ctx, sp))
    }

    /// Allocate and wire a MethodContext for an activation.
    fn new_context(
        &mut self,
        env: &mut Environment,
        parent: Value,
        receiver: Value,
        method: Value,
        args: &[Value],
        num_temps: usize,
        depth: usize,
    ) -> Value {
        let size = context::FIXED_SLOTS + args.len() + num_temps + depth;
        let ctx = env.store.alloc(ObjectKind::MethodContext, size);
        env.store.set_slot(ctx, context::PARENT, parent);
        env.store.set_slot(ctx, context::IP, Value::Int(0));
        let sp = context::FIXED_SLOTS + args.len() + num_temps - 1;
        env.store.set_slot(ctx, context::SP, Value::Int(sp as i64));
        env.store.set_slot(ctx, context::RECEIVER, receiver);
        env.store.set_slot(ctx, context::METHOD, method);
        env.store.set_slot(ctx, context::FLAGS, Value::Int(0));
        for (n, &a) in args.iter().enumerate() {
            env.store.set_slot(ctx, context::FIXED_SLOTS + n, a);
        }
        ctx
    }

    // ----- execution --------------------------------------------------------

    /// Run until control returns to the root context (the one whose
    /// parent is nil).
    pub fn run(&mut self, env: &mut Environment) -> ExecResult<()> {
        while !env.store.slot(self.ctx, context::PARENT).is_nil() {
            self.step(env)?;
        }
        Ok(())
    }

    /// Execute one instruction of the current context.
    pub fn step(&mut self, env: &mut Environment) -> ExecResult<()> {
        if let Some(hook) = self.pre_step.as_mut() {
            hook(env, self.ctx);
        }
        let ctx = self.ctx;
        let method = env.store.slot(ctx, context::METHOD);
        let ip = env.store.slot(ctx, context::IP).as_int().unwrap_or(0) as usize;
        let code = env.store.bytes(method);
        let op = code[ip];
        let operand = code[ip + 1];
        // The ip moves past the whole instruction before dispatch, so
        // an activated send resumes here at the next instruction.
        env.store
            .set_slot(ctx, context::IP, Value::Int((ip + INSTRUCTION_LEN) as i64));

        match op {
            B_PUSH_SELF => {
                let receiver = env.store.slot(ctx, context::RECEIVER);
                self.push(env, receiver);
            }
            B_PUSH_LIT_CONSTANT => {
                let lit = self.literal(env, method, operand);
                self.push(env, lit);
            }
            B_PUSH_LIT_VARIABLE => {
                let sym = self.literal(env, method, operand);
                let b = self.global_binding(env, sym)?;
                let value = env.store.slot(b, binding::VALUE);
                self.push(env, value);
            }
            B_PUSH_TEMPORARY_VARIABLE => {
                let v = env.store.slot(ctx, context::FIXED_SLOTS + operand as usize);
                self.push(env, v);
            }
            B_STORE_TEMPORARY_VARIABLE => {
                let v = self.top(env)?;
                env.store
                    .set_slot(ctx, context::FIXED_SLOTS + operand as usize, v);
            }
            B_STORE_LIT_VARIABLE => {
                let sym = self.literal(env, method, operand);
                let b = self.global_binding(env, sym)?;
                let v = self.top(env)?;
                env.store.set_slot(b, binding::VALUE, v);
            }
            B_POP_STACK_TOP => {
                self.pop(env)?;
            }
            B_SEND => {
                self.do_send(env, operand as usize)?;
            }
            B_RETURN_METHOD_STACK_TOP => {
                self.do_return(env)?;
            }
            other => return Err(ExecError::UnknownBytecode(other)),
        }

        if let Some(hook) = self.post_step.as_mut() {
            hook(env, self.ctx);
        }
        Ok(())
    }

    fn literal(&self, env: &Environment, method: Value, n: u8) -> Value {
        let literals = env.store.slot(method, compiled::LITERALS);
        env.store.slot(literals, n as usize)
    }

    fn global_binding(&self, env: &Environment, sym: Value) -> ExecResult<Value> {
        let b = env.find_global_sym(sym)?;
        if b.is_nil() {
            return Err(ExecError::VariableNotFound(objects::byte_str(
                &env.store, sym,
            )));
        }
        Ok(b)
    }

    /// Perform a message send: pop the arguments, selector and
    /// receiver from the current context, look the method up along
    /// the receiver's class chain, and either run its primitive or
    /// activate a new context.
    pub fn do_send(&mut self, env: &mut Environment, num_args: usize) -> ExecResult<()> {
        let mut args = vec![Value::NIL; num_args];
        for n in (0..num_args).rev() {
            args[n] = self.pop(env)?;
        }
        let selector = self.pop(env)?;
        let receiver = self.pop(env)?;

        let method = self.lookup_method(env, receiver, selector)?;
        let header_word = env.store.slot(method, compiled::HEADER).as_int().unwrap_or(0);
        let header = decode_header(header_word);
        if header.num_args != num_args {
            return Err(ExecError::ArityMismatch {
                selector: objects::byte_str(&env.store, selector),
                expected: header.num_args,
                found: num_args,
            });
        }

        if header.prim_id > 0 {
            let handler = *self
                .prim_table
                .get(header.prim_id - 1)
                .ok_or(ExecError::UnknownPrimitive(header.prim_id))?;
            if let Some(result) = handler(env, receiver, &args) {
                self.push(env, result);
                return Ok(());
            }
        }

        trace!(
            "send #{} to {}",
            objects::byte_str(&env.store, selector),
            env.display_value(receiver)
        );
        let parent = self.ctx;
        let ctx = self.new_context(
            env,
            parent,
            receiver,
            method,
            &args,
            header.num_temps,
            header.depth,
        );
        self.ctx = ctx;
        Ok(())
    }

    /// Walk the receiver's class and its superclasses for the first
    /// method dictionary that binds the selector.
    fn lookup_method(
        &self,
        env: &Environment,
        receiver: Value,
        selector: Value,
    ) -> ExecResult<Value> {
        let start = env.class_of(receiver);
        let mut klass = start;
        while !klass.is_nil() {
            let md = env.store.slot(klass, class::METHOD_DICTIONARY);
            if !md.is_nil() {
                let method = env.identdict_find(md, selector)?;
                if !method.is_nil() {
                    return Ok(method);
                }
            }
            klass = env.store.slot(klass, class::SUPER_CLASS);
        }
        Err(ExecError::DoesNotUnderstand {
            class: class_display_name(env, start),
            selector: objects::byte_str(&env.store, selector),
        })
    }

    /// Return from the current context: copy the value to the caller,
    /// unlink, resume.
    fn do_return(&mut self, env: &mut Environment) -> ExecResult<()> {
        let value = self.pop(env)?;
        let ctx = self.ctx;
        let parent = env.store.slot(ctx, context::PARENT);
        if parent.is_nil() {
            return Err(ExecError::StackUnderflow);
        }
        env.store.set_slot(ctx, context::PARENT, Value::NIL);
        self.push_on(env, parent, value);
        self.ctx = parent;
        Ok(())
    }

    /// Seed a root context, perform a send from outside the
    /// interpreter, run to completion and answer the result.
    pub fn send_message_extern(
        &mut self,
        env: &mut Environment,
        receiver: Value,
        selector: &str,
        args: &[Value],
    ) -> ExecResult<Value> {
        let size = context::FIXED_SLOTS + args.len() + 3;
        let root = env.store.alloc(ObjectKind::MethodContext, size);
        env.store.set_slot(root, context::IP, Value::Int(0));
        env.store
            .set_slot(root, context::SP, Value::Int(context::FIXED_SLOTS as i64 - 1));
        self.ctx = root;

        self.push(env, receiver);
        let sym = env.symbol_find_or_add(selector);
        self.push(env, sym);
        for &a in args {
            self.push(env, a);
        }
        self.do_send(env, args.len())?;
        self.run(env)?;
        self.pop(env)
    }
}

impl Default for Interp {
    fn default() -> Interp {
        Interp::new()
    }
}

/// Printable name of a class or metaclass, for diagnostics.
pub fn class_display_name(env: &Environment, klass: Value) -> String {
    if klass.is_nil() {
        return "an unclassed object".to_string();
    }
    match env.store.kind_of(klass) {
        Some(ObjectKind::Metaclass) => {
            let inst = env.store.slot(klass, metaclass::INSTANCE_CLASS);
            format!("{} class", class_display_name(env, inst))
        }
        _ => {
            let name = env.store.slot(klass, class::NAME);
            if name.is_nil() {
                "an anonymous class".to_string()
            } else {
                objects::byte_str(&env.store, name)
            }
        }
    }
}

/// Display the next bytecode to be executed in a context. Used by the
/// single-step debugger's pre-step hook.
pub fn print_next_bytecode(env: &Environment, ctx: Value) {
    let method = env.store.slot(ctx, context::METHOD);
    if method.is_nil() {
        return;
    }
    let ip = env.store.slot(ctx, context::IP).as_int().unwrap_or(0) as usize;
    let code = env.store.bytes(method);
    if ip + 1 >= code.len() {
        return;
    }
    let descriptor = env.store.slot(method, compiled::DESCRIPTOR);
    let (class_name, sel_name) = if descriptor.is_nil() {
        ("?".to_string(), "?".to_string())
    } else {
        let klass = env.store.slot(descriptor, method_info::CLASS);
        let sel = env.store.slot(descriptor, method_info::SELECTOR);
        (
            class_display_name(env, klass),
            objects::byte_str(&env.store, sel),
        )
    };
    println!(
        "<{}> {}[{}]: {} {}",
        class_name,
        sel_name,
        ip,
        env.dis.dis_byte(code[ip]),
        code[ip + 1]
    );
}

/// Display the state of a context: method, receiver, temporaries and
/// evaluation stack.
pub fn print_context_state(env: &Environment, ctx: Value) {
    let method = env.store.slot(ctx, context::METHOD);
    let ip = env.store.slot(ctx, context::IP).as_int().unwrap_or(0);
    let num_local = if method.is_nil() {
        println!("Method: nil [{}]", ip);
        0
    } else {
        let descriptor = env.store.slot(method, compiled::DESCRIPTOR);
        let sel = if descriptor.is_nil() {
            "?".to_string()
        } else {
            let s = env.store.slot(descriptor, method_info::SELECTOR);
            objects::byte_str(&env.store, s)
        };
        println!("Method: {} [{}]", sel, ip);
        let header = decode_header(env.store.slot(method, compiled::HEADER).as_int().unwrap_or(0));
        header.num_args + header.num_temps
    };
    let receiver = env.store.slot(ctx, context::RECEIVER);
    println!("Recv: {}", env.display_value(receiver));
    if num_local > 0 {
        println!("Temps ({num_local}):");
        for n in 0..num_local {
            let v = env.store.slot(ctx, context::FIXED_SLOTS + n);
            println!("[{}] {}", n, env.display_value(v));
        }
    }
    let sp = env.store.slot(ctx, context::SP).as_int().unwrap_or(0) as usize;
    let stack_base = context::FIXED_SLOTS + num_local;
    println!("Stack ({}):", (sp + 1).saturating_sub(stack_base));
    for n in stack_base..=sp {
        if n >= context::FIXED_SLOTS {
            let v = env.store.slot(ctx, n);
            println!("[{}] {}", n - stack_base, env.display_value(v));
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{B_PUSH_SELF, B_RETURN_METHOD_STACK_TOP, pack_header};

    /// Hand-assemble a `^self` method with no descriptor.
    fn ret_self_method(env: &mut Environment) -> Value {
        let m = objects::new_compiled_method(&mut env.store);
        env.store
            .set_bytes(m, vec![B_PUSH_SELF, 0, B_RETURN_METHOD_STACK_TOP, 0]);
        env.store
            .set_slot(m, compiled::HEADER, Value::Int(pack_header(0, 0, 1, 0)));
        m
    }

    #[test]
    fn send_restores_caller_stack_depth() {
        // After a completed send the caller's depth is the depth
        // before the send minus numArgs and the selector/receiver
        // pair, plus the pushed result.
        let mut env = Environment::new();
        env.build_classes_1().unwrap();
        env.build_classes_2();
        env.sym_table = objects::new_array(&mut env.store, 64);

        let k_object = env.cached_class("object").unwrap();
        let md = objects::new_method_dictionary(&mut env.store, 8);
        env.store.set_slot(k_object, class::METHOD_DICTIONARY, md);
        let sel = env.symbol_find_or_add("yourself");
        let method = ret_self_method(&mut env);
        env.identdict_at_put(md, sel, method).unwrap();

        let mut interp = Interp::new();
        let root = env
            .store
            .alloc(ObjectKind::MethodContext, context::FIXED_SLOTS + 8);
        env.store.set_slot(root, context::IP, Value::Int(0));
        env.store.set_slot(
            root,
            context::SP,
            Value::Int(context::FIXED_SLOTS as i64 - 1),
        );
        interp.ctx = root;

        let receiver = Value::Int(9);
        interp.push(&mut env, receiver);
        interp.push(&mut env, sel);
        let depth_before = interp.sp(&env, root);
        interp.do_send(&mut env, 0).unwrap();
        interp.run(&mut env).unwrap();
        let depth_after = interp.sp(&env, root);
        // depth_before counted receiver+selector; both are consumed
        // and one result is pushed.
        assert_eq!(depth_after, depth_before - 1);
        assert_eq!(interp.pop(&mut env).unwrap(), receiver);
    }
}
