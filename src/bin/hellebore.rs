use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};

use hellebore::{compiler, parser, HelleboreError, Interpreter, Repl, Vm};

#[derive(Parser)]
#[command(author, version, about = "Hellebore language interpreter and VM")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Hellebore script file
    Run {
        script: PathBuf,
        /// Execute on the bytecode VM instead of the interpreter
        #[arg(long)]
        vm: bool,
    },
    /// Evaluate a snippet of Hellebore code and print its value
    Eval { source: String },
    /// Start an interactive REPL session
    Repl,
    /// Compile a script and print its bytecode listing
    Disasm { script: PathBuf },
}

fn main() {
    let args = Args::parse();
    if let Err(err) = dispatch(args.command.unwrap_or(Command::Repl)) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn dispatch(command: Command) -> Result<(), HelleboreError> {
    match command {
        Command::Run { script, vm } => run_script(script, vm),
        Command::Eval { source } => {
            let mut interpreter = Interpreter::new();
            let value = interpreter.eval_source(&source)?;
            if !matches!(value, hellebore::value::Value::Nil) {
                println!("{value}");
            }
            Ok(())
        }
        Command::Repl => {
            let mut repl = Repl::new();
            repl.run()
        }
        Command::Disasm { script } => {
            let source = fs::read_to_string(&script)?;
            let program = parser::parse_program(&source)?;
            let chunk = compiler::compile(&program)?;
            print!("{}", chunk.disassemble());
            Ok(())
        }
    }
}

fn run_script(path: PathBuf, use_vm: bool) -> Result<(), HelleboreError> {
    let source = fs::read_to_string(&path)?;
    if use_vm {
        let program = parser::parse_program(&source)?;
        let chunk = compiler::compile(&program)?;
        let mut vm = Vm::new();
        vm.run(&chunk)?;
    } else {
        let mut interpreter = Interpreter::new();
        interpreter.eval_source(&source)?;
    }
    Ok(())
}
