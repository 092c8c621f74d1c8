use std::cell::Cell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use log::info;

use crate::interp::{print_context_state, print_next_bytecode};
use crate::memory::Value;
use crate::system::{self, Environment};

/// Execute the rebuild command: construct a fresh environment, then
/// prove it out with a send to the symbol table.
pub fn execute(kernel: PathBuf, debug: bool) -> Result<()> {
    let (mut env, mut interp) =
        system::rebuild(&kernel).map_err(|e| anyhow!("rebuild failed: {e}"))?;

    if debug {
        let stepping = Rc::new(Cell::new(true));
        let pre_flag = Rc::clone(&stepping);
        interp.set_debug(
            Some(Box::new(move |env, ctx| {
                if !pre_flag.get() {
                    return;
                }
                print_next_bytecode(env, ctx);
                debug_prompt(&pre_flag, env, ctx);
            })),
            Some(Box::new(move |env, ctx| {
                if stepping.get() {
                    print_context_state(env, ctx);
                }
            })),
        );
    }

    let sym_table = env.sym_table;
    let result = interp.send_message_extern(&mut env, sym_table, "size", &[])?;
    info!("SymbolTable size: {}", env.display_value(result));
    println!("{}", env.display_value(result));
    Ok(())
}

/// Read and act on one debugger command per step.
fn debug_prompt(stepping: &Cell<bool>, env: &Environment, ctx: Value) {
    let stdin = io::stdin();
    loop {
        print!(">>");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() {
            stepping.set(false);
            return;
        }
        match line.trim().chars().next() {
            Some('s') => return,
            Some('c') => {
                stepping.set(false);
                return;
            }
            Some('d') => print_next_bytecode(env, ctx),
            Some('0') => print_context_state(env, ctx),
            Some('h') => {
                println!("s = step");
                println!("c = continue");
                println!("d = disassemble current bytecode");
                println!("0 = show current context");
                println!("h = help");
                println!("q = quit immediately");
            }
            Some('q') => std::process::exit(0),
            _ => println!("???"),
        }
    }
}
