use std::path::PathBuf;

use argh::FromArgs;
use myshell::Interpreter;

#[derive(FromArgs)]
/// A small interactive command interpreter.
struct Args {
    #[argh(positional)]
    /// script to run line by line instead of starting the interactive prompt
    script: Option<PathBuf>,
}

fn main() {
    let args: Args = argh::from_env();
    let mut sh = Interpreter::default();
    match args.script {
        Some(script) => sh.run_script(&script),
        None => {
            if let Err(e) = sh.repl() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
