use std::env;
use std::fs;
use std::process;

use bramble_core::error::format_error;
use bramble_core::eval::Context;
use bramble_core::repl;
use bramble_core::runtime::ScriptRuntime;

fn print_usage() {
    eprintln!("usage: bramble [--eval EXPR] [FILE...]");
}

fn main() {
    let runtime = ScriptRuntime::with_defaults();
    let mut ctx = Context::new(runtime);

    let mut sources: Vec<(String, String)> = Vec::new();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--eval" | "-e" => {
                let Some(expr) = args.next() else {
                    eprintln!("missing expression for {}", arg);
                    print_usage();
                    process::exit(1);
                };
                sources.push(("<eval>".to_string(), expr));
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            path => match fs::read_to_string(path) {
                Ok(content) => sources.push((path.to_string(), content)),
                Err(err) => {
                    eprintln!("cannot read {}: {}", path, err);
                    process::exit(1);
                }
            },
        }
    }

    if sources.is_empty() {
        repl::run(&mut ctx);
        return;
    }

    for (name, source) in sources {
        match ctx.eval_source(&source) {
            Ok(value) => println!("{}", value),
            Err(err) => {
                eprintln!("{}:", name);
                for line in format_error(&err) {
                    eprintln!("{}", line);
                }
                process::exit(1);
            }
        }
    }
}
