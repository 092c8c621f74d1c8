//! The bootstrap compiler: reads class and method definitions from
//! kernel source text, compiles method bodies to bytecode through the
//! statement parser, and installs the results in method dictionaries.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::bytecode::{
    B_POP_STACK_TOP, B_PUSH_LIT_CONSTANT, B_PUSH_LIT_VARIABLE, B_PUSH_SELF,
    B_PUSH_TEMPORARY_VARIABLE, B_RETURN_METHOD_STACK_TOP, B_SEND, B_STORE_LIT_VARIABLE,
    B_STORE_TEMPORARY_VARIABLE, pack_header,
};
use crate::errors::{CompileError, CompileResult};
use crate::lexer::{Lexer, Token};
use crate::memory::Value;
use crate::objects::{self, binding, class, compiled, method_info};
use crate::parser::{self, ast::{Expr, Stmt}};
use crate::system::Environment;

/// Reserved words that may never be assignment targets.
const RESERVED_NAMES: [&str; 4] = ["self", "nil", "true", "false"];

/// Initial pair capacity of a freshly created method dictionary.
const METHOD_DICT_SIZE: usize = 32;

const MAX_ARGS: usize = 31;
const MAX_TEMPS: usize = 63;
const MAX_DEPTH: usize = 63;

/// Per-method (or per-block) emission state. Nested blocks push a new
/// frame and restore the enclosing one on every exit path.
struct EmitFrame {
    locals: Vec<String>,
    literals: Vec<Value>,
    code: Vec<u8>,
    depth: i32,
    max_depth: i32,
}

impl EmitFrame {
    fn new(locals: Vec<String>) -> EmitFrame {
        EmitFrame {
            locals,
            literals: Vec::new(),
            code: Vec::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    fn emit(&mut self, op: u8, operand: u8) {
        self.code.push(op);
        self.code.push(operand);
        self.depth += stack_effect(op, operand);
        if self.depth > self.max_depth {
            self.max_depth = self.depth;
        }
    }

    /// Index of a literal, adding it on first use.
    fn add_literal(&mut self, v: Value) -> CompileResult<u8> {
        let idx = match self.literals.iter().position(|&l| l == v) {
            Some(i) => i,
            None => {
                self.literals.push(v);
                self.literals.len() - 1
            }
        };
        if idx > u8::MAX as usize {
            return Err(CompileError::TooManyLiterals);
        }
        Ok(idx as u8)
    }
}

fn stack_effect(op: u8, operand: u8) -> i32 {
    match op {
        B_PUSH_SELF | B_PUSH_LIT_CONSTANT | B_PUSH_LIT_VARIABLE | B_PUSH_TEMPORARY_VARIABLE => 1,
        B_POP_STACK_TOP | B_RETURN_METHOD_STACK_TOP => -1,
        B_SEND => -(operand as i32 + 1),
        _ => 0,
    }
}

pub struct Compiler {
    frames: Vec<EmitFrame>,
    cur_class: Value,
    cur_method: Value,
    prim_name: Option<String>,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler {
            frames: Vec::new(),
            cur_class: Value::NIL,
            cur_method: Value::NIL,
            prim_name: None,
        }
    }

    /// Compile a file of class definitions.
    pub fn compile_file(&mut self, env: &mut Environment, path: &Path) -> CompileResult<()> {
        let source = fs::read_to_string(path)?;
        self.compile_module(env, &source)
    }

    /// Compile a module: any number of `Super subclass: Name [ ... ]`
    /// definitions.
    pub fn compile_module(&mut self, env: &mut Environment, text: &str) -> CompileResult<()> {
        let mut lex = Lexer::new(text);
        loop {
            let Some(first) = lex.significant_token()? else {
                return Ok(());
            };
            let second = require(lex.significant_token()?)?;
            let third = require(lex.significant_token()?)?;
            match (&first, &second, &third) {
                (Token::Ident(_), Token::MessageArg(msg), Token::Ident(name))
                    if msg == "subclass" =>
                {
                    self.compile_class(env, &mut lex, name)?;
                }
                _ => {
                    return Err(CompileError::Syntax(format!(
                        "expected class definition, found {first:?}"
                    )));
                }
            }
        }
    }

    /// Compile one class definition body. The class itself must
    /// already exist in the root namespace.
    fn compile_class(&mut self, env: &mut Environment, lex: &mut Lexer, name: &str) -> CompileResult<()> {
        let global = env.find_global(name)?;
        if global.is_nil() {
            return Err(CompileError::UnknownClass(name.to_string()));
        }
        self.cur_class = env.store.slot(global, binding::VALUE);
        info!("compiling class {name}");

        match require(lex.significant_token()?)? {
            Token::LBrack => {}
            other => {
                return Err(CompileError::Expected {
                    expected: "[",
                    found: format!("{other:?}"),
                });
            }
        }

        // class attributes
        while matches!(lex.peek_significant()?, Some(Token::Operator(ref op)) if op == "<") {
            lex.significant_token()?;
            self.compile_class_attr(env, lex)?;
        }

        // class variable initializers
        loop {
            let mut probe = lex.clone();
            let t1 = probe.significant_token()?;
            let t2 = probe.significant_token()?;
            match (t1, t2) {
                (Some(Token::Ident(var)), Some(Token::Assign)) => {
                    lex.significant_token()?;
                    lex.significant_token()?;
                    self.compile_class_var(env, lex, &var)?;
                }
                _ => break,
            }
        }

        // methods, up to the closing bracket
        loop {
            let first = require(lex.significant_token()?)?;
            if first == Token::RBrack {
                return Ok(());
            }
            let second = require(lex.significant_token()?)?;
            match (first, second) {
                (Token::Ident(_), Token::Ident(marker)) if marker == "class" => {
                    match require(lex.significant_token()?)? {
                        Token::RShift => {}
                        other => {
                            return Err(CompileError::Expected {
                                expected: ">>",
                                found: format!("{other:?}"),
                            });
                        }
                    }
                    self.compile_method(env, lex, Vec::new(), Vec::new(), true, false, true)?;
                }
                (Token::Operator(op), Token::Ident(arg)) => {
                    self.compile_method(env, lex, vec![op], vec![arg], true, true, false)?;
                }
                (Token::MessageArg(kw), Token::Ident(arg)) => {
                    self.compile_method(env, lex, vec![kw], vec![arg], true, false, false)?;
                }
                (Token::Ident(sel), Token::LBrack) => {
                    self.compile_method(env, lex, vec![sel], Vec::new(), false, false, false)?;
                }
                (a, b) => {
                    return Err(CompileError::Syntax(format!(
                        "bad method syntax at {a:?} {b:?}"
                    )));
                }
            }
        }
    }

    /// `<comment: '...'>` or `<category: '...'>` on a class.
    fn compile_class_attr(&mut self, env: &mut Environment, lex: &mut Lexer) -> CompileResult<()> {
        let name_tok = require(lex.significant_token()?)?;
        let value_tok = require(lex.significant_token()?)?;
        expect_close_angle(lex)?;
        if let Token::MessageArg(attr) = name_tok {
            let text = token_text(&value_tok);
            match attr.as_str() {
                "comment" => {
                    let s = objects::new_string(&mut env.store, &text);
                    let cur_class = self.cur_class;
                    env.store.set_slot(cur_class, class::COMMENT, s);
                }
                "category" => {
                    let s = objects::new_string(&mut env.store, &text);
                    let cur_class = self.cur_class;
                    env.store.set_slot(cur_class, class::CATEGORY, s);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `Var := nil.` inside a class body resets a declared class
    /// variable binding.
    fn compile_class_var(&mut self, env: &mut Environment, lex: &mut Lexer, var: &str) -> CompileResult<()> {
        match require(lex.significant_token()?)? {
            Token::Ident(v) if v == "nil" => {}
            other => {
                return Err(CompileError::Expected {
                    expected: "nil",
                    found: format!("{other:?}"),
                });
            }
        }
        match require(lex.significant_token()?)? {
            Token::Period => {}
            other => {
                return Err(CompileError::Expected {
                    expected: ".",
                    found: format!("{other:?}"),
                });
            }
        }
        let sym = env.symbol_find(var);
        if sym.is_nil() {
            return Err(CompileError::ClassVarNotDefined(var.to_string()));
        }
        let var_dict = env.store.slot(self.cur_class, class::CLASS_VARIABLES);
        if var_dict.is_nil() {
            return Err(CompileError::ClassVarNotDefined(var.to_string()));
        }
        let entry = env.dict_find(var_dict, sym)?;
        if entry.is_nil() {
            return Err(CompileError::ClassVarNotDefined(var.to_string()));
        }
        env.store.set_slot(entry, binding::VALUE, Value::NIL);
        debug!("class variable {var} := nil");
        Ok(())
    }

    /// Compile one method: finish reading the message pattern, then
    /// attributes and temporaries, then the bracketed body.
    #[allow(clippy::too_many_arguments)]
    fn compile_method(
        &mut self,
        env: &mut Environment,
        lex: &mut Lexer,
        mut name_parts: Vec<String>,
        mut arg_names: Vec<String>,
        parse_brack: bool,
        is_operator: bool,
        class_side: bool,
    ) -> CompileResult<()> {
        if parse_brack {
            loop {
                match require(lex.significant_token()?)? {
                    Token::LBrack => break,
                    Token::Ident(s) => name_parts.push(s),
                    Token::MessageArg(s) => {
                        name_parts.push(s);
                        match require(lex.significant_token()?)? {
                            Token::Ident(arg) => arg_names.push(arg),
                            other => {
                                return Err(CompileError::Expected {
                                    expected: "argument name",
                                    found: format!("{other:?}"),
                                });
                            }
                        }
                    }
                    other => {
                        return Err(CompileError::Syntax(format!(
                            "bad message syntax at {other:?}"
                        )));
                    }
                }
            }
        }

        let num_args = arg_names.len();
        if num_args > MAX_ARGS {
            return Err(CompileError::Syntax("too many arguments".to_string()));
        }
        let mut selector = name_parts.join(":");
        if num_args > 0 && !is_operator {
            selector.push(':');
        }
        let sel_sym = env.symbol_find_or_add(&selector);
        debug!("method {selector} args {arg_names:?}");

        let owner = if class_side {
            env.class_of(self.cur_class)
        } else {
            self.cur_class
        };
        let method = objects::new_compiled_method(&mut env.store);
        let info = objects::new_method_info(&mut env.store, owner, sel_sym);
        env.store.set_slot(method, compiled::DESCRIPTOR, info);
        self.cur_method = method;
        self.prim_name = None;

        // attributes and temporaries precede the statements
        let mut temp_names: Vec<String> = Vec::new();
        loop {
            match lex.peek_significant()? {
                Some(Token::Operator(ref op)) if op == "<" => {
                    lex.significant_token()?;
                    self.compile_method_attr(env, lex, info)?;
                }
                Some(Token::Pipe) => {
                    lex.significant_token()?;
                    temp_names.extend(parse_method_temps(lex)?);
                }
                _ => break,
            }
        }
        if arg_names.len() + temp_names.len() > MAX_TEMPS {
            return Err(CompileError::TooManyTemporaries);
        }
        debug!("temps {temp_names:?}");

        let mut locals = arg_names;
        locals.extend(temp_names.iter().cloned());
        let num_temps = temp_names.len();
        self.frames.push(EmitFrame::new(locals));
        let body = extract_block_text(lex)?;
        let result = self.compile_method_body(env, body);
        let Some(frame) = self.frames.pop() else {
            return Err(CompileError::Syntax("emit frame underflow".to_string()));
        };
        result?;

        let prim_id = match self.prim_name.take() {
            Some(name) => self.resolve_primitive(env, &name)?,
            None => 0,
        };
        let depth = frame.max_depth.max(0) as usize;
        if depth > MAX_DEPTH {
            return Err(CompileError::Syntax("expression stack too deep".to_string()));
        }
        env.store.set_slot(
            method,
            compiled::HEADER,
            Value::Int(pack_header(num_args, num_temps, depth, prim_id)),
        );
        env.store.set_bytes(method, frame.code);
        if !frame.literals.is_empty() {
            let lits = objects::new_array_from(&mut env.store, &frame.literals);
            env.store.set_slot(method, compiled::LITERALS, lits);
        }

        self.install_method(env, owner, sel_sym, method)?;
        debug!(
            "bytecodes ({}):\n{}",
            env.store.bytes(method).len(),
            env.dis.dis_bytecode(env.store.bytes(method))
        );
        Ok(())
    }

    /// `<primitive: Name>` or `<category: '...'>` on a method.
    fn compile_method_attr(
        &mut self,
        env: &mut Environment,
        lex: &mut Lexer,
        info: Value,
    ) -> CompileResult<()> {
        let name_tok = require(lex.significant_token()?)?;
        let value_tok = require(lex.significant_token()?)?;
        expect_close_angle(lex)?;
        if let Token::MessageArg(attr) = name_tok {
            match attr.as_str() {
                "category" => {
                    let s = objects::new_string(&mut env.store, &token_text(&value_tok));
                    env.store.set_slot(info, method_info::CATEGORY, s);
                }
                "primitive" => {
                    self.prim_name = Some(token_text(&value_tok));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn compile_method_body(&mut self, env: &mut Environment, body: &str) -> CompileResult<()> {
        let stmts = if body.trim().is_empty() {
            Vec::new()
        } else {
            parser::parse_statements(body)?
        };
        self.compile_statement_list(env, &stmts, false)
    }

    /// Compile a statement list. In a method every pure expression
    /// statement is popped and a `^self` trailer is appended unless
    /// the body already returns; in a block the last value is kept.
    fn compile_statement_list(
        &mut self,
        env: &mut Environment,
        stmts: &[Stmt],
        in_block: bool,
    ) -> CompileResult<()> {
        if stmts.is_empty() {
            if in_block {
                let idx = self.add_literal(Value::NIL)?;
                self.emit(B_PUSH_LIT_CONSTANT, idx);
            } else {
                self.emit(B_PUSH_SELF, 0);
                self.emit(B_RETURN_METHOD_STACK_TOP, 0);
            }
            return Ok(());
        }
        let last = stmts.len() - 1;
        for (n, s) in stmts.iter().enumerate() {
            self.compile_statement(env, s)?;
            if matches!(s, Stmt::Exec(_)) && !(in_block && n == last) {
                self.emit(B_POP_STACK_TOP, 0);
            }
        }
        if !in_block && !matches!(stmts[last], Stmt::Return(_)) {
            self.emit(B_PUSH_SELF, 0);
            self.emit(B_RETURN_METHOD_STACK_TOP, 0);
        }
        Ok(())
    }

    fn compile_statement(&mut self, env: &mut Environment, s: &Stmt) -> CompileResult<()> {
        match s {
            Stmt::Exec(e) => self.compile_expression(env, e),
            Stmt::Return(e) => {
                self.compile_expression(env, e)?;
                self.emit(B_RETURN_METHOD_STACK_TOP, 0);
                Ok(())
            }
            Stmt::Assign { target, value } => {
                if RESERVED_NAMES.contains(&target.as_str()) {
                    return Err(CompileError::AssignToReserved(target.clone()));
                }
                self.compile_expression(env, value)?;
                match self.find_local(target) {
                    Some(idx) => self.emit(B_STORE_TEMPORARY_VARIABLE, idx as u8),
                    None => {
                        let sym = env.symbol_find_or_add(target);
                        let idx = self.add_literal(sym)?;
                        self.emit(B_STORE_LIT_VARIABLE, idx);
                    }
                }
                Ok(())
            }
        }
    }

    fn compile_expression(&mut self, env: &mut Environment, e: &Expr) -> CompileResult<()> {
        match e {
            Expr::Identifier(name) => self.compile_identifier(env, name),
            Expr::Integer(n) => {
                let idx = self.add_literal(Value::Int(*n))?;
                self.emit(B_PUSH_LIT_CONSTANT, idx);
                Ok(())
            }
            Expr::Str(s) => {
                let obj = objects::new_string(&mut env.store, s);
                let idx = self.add_literal(obj)?;
                self.emit(B_PUSH_LIT_CONSTANT, idx);
                Ok(())
            }
            Expr::Block(stmts) => self.compile_block(env, stmts),
            Expr::Unary { receiver, selector } => {
                self.compile_expression(env, receiver)?;
                self.push_selector(env, selector)?;
                self.emit(B_SEND, 0);
                Ok(())
            }
            Expr::Binary {
                receiver,
                selector,
                argument,
            } => {
                self.compile_expression(env, receiver)?;
                self.push_selector(env, selector)?;
                self.compile_expression(env, argument)?;
                self.emit(B_SEND, 1);
                Ok(())
            }
            Expr::Keyword { receiver, parts } => {
                if parts.len() > MAX_ARGS {
                    return Err(CompileError::Syntax("too many arguments".to_string()));
                }
                self.compile_expression(env, receiver)?;
                let mut selector = String::new();
                for part in parts {
                    selector.push_str(&part.name);
                    selector.push(':');
                }
                self.push_selector(env, &selector)?;
                for part in parts {
                    self.compile_expression(env, &part.value)?;
                }
                self.emit(B_SEND, parts.len() as u8);
                Ok(())
            }
        }
    }

    /// Load a selector Symbol through the literal table.
    fn push_selector(&mut self, env: &mut Environment, selector: &str) -> CompileResult<()> {
        let sym = env.symbol_find_or_add(selector);
        let idx = self.add_literal(sym)?;
        self.emit(B_PUSH_LIT_CONSTANT, idx);
        Ok(())
    }

    fn compile_identifier(&mut self, env: &mut Environment, name: &str) -> CompileResult<()> {
        match name {
            "self" => {
                self.emit(B_PUSH_SELF, 0);
                Ok(())
            }
            "nil" => self.push_literal_constant(Value::NIL),
            "true" => {
                let v = env.true_obj;
                self.push_literal_constant(v)
            }
            "false" => {
                let v = env.false_obj;
                self.push_literal_constant(v)
            }
            _ => match self.find_local(name) {
                Some(idx) => {
                    self.emit(B_PUSH_TEMPORARY_VARIABLE, idx as u8);
                    Ok(())
                }
                None => {
                    let sym = env.symbol_find_or_add(name);
                    let idx = self.add_literal(sym)?;
                    self.emit(B_PUSH_LIT_VARIABLE, idx);
                    Ok(())
                }
            },
        }
    }

    fn push_literal_constant(&mut self, v: Value) -> CompileResult<()> {
        let idx = self.add_literal(v)?;
        self.emit(B_PUSH_LIT_CONSTANT, idx);
        Ok(())
    }

    /// Compile a nested block into a CompiledBlock wrapped in a
    /// BlockClosure literal. The enclosing emit context is saved and
    /// restored around it.
    fn compile_block(&mut self, env: &mut Environment, stmts: &[Stmt]) -> CompileResult<()> {
        let enclosing_locals = self
            .frames
            .last()
            .map(|f| f.locals.clone())
            .unwrap_or_default();
        self.frames.push(EmitFrame::new(enclosing_locals));
        let result = self.compile_statement_list(env, stmts, true);
        let Some(frame) = self.frames.pop() else {
            return Err(CompileError::Syntax("emit frame underflow".to_string()));
        };
        result?;

        let depth = frame.max_depth.max(0) as usize;
        if depth > MAX_DEPTH {
            return Err(CompileError::Syntax("expression stack too deep".to_string()));
        }
        let block = objects::new_compiled_block(&mut env.store);
        env.store.set_bytes(block, frame.code);
        env.store.set_slot(
            block,
            compiled::HEADER,
            Value::Int(pack_header(0, 0, depth, 0)),
        );
        if !frame.literals.is_empty() {
            let lits = objects::new_array_from(&mut env.store, &frame.literals);
            env.store.set_slot(block, compiled::LITERALS, lits);
        }
        let cur_method = self.cur_method;
        env.store.set_slot(block, compiled::METHOD, cur_method);

        let closure = objects::new_block_closure(&mut env.store, Value::NIL, block, Value::NIL);
        let idx = self.add_literal(closure)?;
        self.emit(B_PUSH_LIT_CONSTANT, idx);
        Ok(())
    }

    /// Resolve a `<primitive: Name>` attribute through the global
    /// VMPrimitives binding dictionary.
    fn resolve_primitive(&mut self, env: &mut Environment, name: &str) -> CompileResult<usize> {
        let global = env.find_global("VMPrimitives")?;
        if global.is_nil() {
            return Err(CompileError::UnknownPrimitiveName(name.to_string()));
        }
        let prim_dict = env.store.slot(global, binding::VALUE);
        let sym = env.symbol_find(name);
        if sym.is_nil() {
            return Err(CompileError::UnknownPrimitiveName(name.to_string()));
        }
        let entry = env.dict_find(prim_dict, sym)?;
        if entry.is_nil() {
            return Err(CompileError::UnknownPrimitiveName(name.to_string()));
        }
        let id = env.store.slot(entry, binding::VALUE).as_int().unwrap_or(0);
        Ok(id as usize)
    }

    /// Install a compiled method in the owner's method dictionary,
    /// creating the dictionary on first use.
    fn install_method(
        &mut self,
        env: &mut Environment,
        owner: Value,
        selector: Value,
        method: Value,
    ) -> CompileResult<()> {
        let mut md = env.store.slot(owner, class::METHOD_DICTIONARY);
        if md.is_nil() {
            md = objects::new_method_dictionary(&mut env.store, METHOD_DICT_SIZE);
            env.store.set_slot(owner, class::METHOD_DICTIONARY, md);
        }
        env.identdict_at_put(md, selector, method)?;
        Ok(())
    }

    fn emit(&mut self, op: u8, operand: u8) {
        if let Some(frame) = self.frames.last_mut() {
            frame.emit(op, operand);
        }
    }

    fn add_literal(&mut self, v: Value) -> CompileResult<u8> {
        match self.frames.last_mut() {
            Some(frame) => frame.add_literal(v),
            None => Err(CompileError::Syntax("no active method".to_string())),
        }
    }

    fn find_local(&self, name: &str) -> Option<usize> {
        self.frames
            .last()
            .and_then(|f| f.locals.iter().position(|l| l == name))
    }
}

impl Default for Compiler {
    fn default() -> Compiler {
        Compiler::new()
    }
}

fn require(tok: Option<Token>) -> CompileResult<Token> {
    tok.ok_or_else(|| CompileError::Syntax("unexpected end of input".to_string()))
}

fn expect_close_angle(lex: &mut Lexer) -> CompileResult<()> {
    match require(lex.significant_token()?)? {
        Token::Operator(ref op) if op == ">" => Ok(()),
        other => Err(CompileError::Expected {
            expected: ">",
            found: format!("{other:?}"),
        }),
    }
}

/// Source text of a token, for attribute values.
fn token_text(tok: &Token) -> String {
    match tok {
        Token::Str(s) | Token::Ident(s) | Token::MessageArg(s) | Token::Operator(s) => s.clone(),
        Token::Comment(s) => s.clone(),
        Token::Number(n) => n.to_string(),
        Token::Float(f) => f.to_string(),
        other => format!("{other:?}"),
    }
}

/// `| a b |` temporary declarations; the opening pipe is consumed.
fn parse_method_temps(lex: &mut Lexer) -> CompileResult<Vec<String>> {
    let mut names = Vec::new();
    loop {
        match require(lex.significant_token()?)? {
            Token::Pipe => return Ok(names),
            Token::Ident(name) => names.push(name),
            other => {
                return Err(CompileError::Expected {
                    expected: "temporary name",
                    found: format!("{other:?}"),
                });
            }
        }
    }
}

/// Slice the raw text of a bracketed body out of the lexer's input,
/// balancing nested brackets and ignoring those inside comments and
/// string literals. The lexer resumes after the closing bracket.
fn extract_block_text<'a>(lex: &mut Lexer<'a>) -> CompileResult<&'a str> {
    let text = lex.remainder();
    let mut depth = 1usize;
    let mut in_comment = false;
    let mut in_string = false;
    for (pos, c) in text.char_indices() {
        match c {
            '"' if !in_string => in_comment = !in_comment,
            '\'' if !in_comment => in_string = !in_string,
            '[' if !in_comment && !in_string => depth += 1,
            ']' if !in_comment && !in_string => {
                depth -= 1;
                if depth == 0 {
                    lex.set_input(&text[pos + 1..]);
                    return Ok(&text[..pos]);
                }
            }
            _ => {}
        }
    }
    Err(CompileError::Syntax("unterminated method body".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{decode_header, B_PUSH_SELF, B_RETURN_METHOD_STACK_TOP};

    #[test]
    fn extracts_bracketed_bodies_with_nesting() {
        let mut lex = Lexer::new(" ^self \"a ] in comment\" . [ 1 ] ] tail");
        let body = extract_block_text(&mut lex).expect("body");
        assert!(body.contains("^self"));
        assert!(body.contains("[ 1 ]"));
        assert_eq!(lex.remainder(), " tail");
    }

    #[test]
    fn header_fields_come_from_the_emitter() {
        let hdr = decode_header(pack_header(2, 1, 3, 0));
        assert_eq!(hdr.num_args, 2);
        assert_eq!(hdr.num_temps, 1);
        assert_eq!(hdr.depth, 3);
    }

    #[test]
    fn empty_frame_gets_the_canonical_trailer() {
        let mut env = Environment::new();
        let mut c = Compiler::new();
        c.frames.push(EmitFrame::new(Vec::new()));
        c.compile_statement_list(&mut env, &[], false).expect("compile");
        let frame = c.frames.pop().expect("frame");
        assert_eq!(
            frame.code,
            vec![B_PUSH_SELF, 0, B_RETURN_METHOD_STACK_TOP, 0]
        );
    }

    #[test]
    fn stack_effect_of_send_consumes_selector_and_args() {
        assert_eq!(stack_effect(B_SEND, 2), -3);
        assert_eq!(stack_effect(B_PUSH_SELF, 0), 1);
    }
}
