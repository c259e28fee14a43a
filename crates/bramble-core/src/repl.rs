use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{format_error, ERROR_TAG};
use crate::eval::Context;

/// Interactive read loop: one line in, every top-level expression in it
/// parsed and executed, last result printed.
pub fn run(ctx: &mut Context) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("{} {}", ERROR_TAG, err);
            return;
        }
    };
    loop {
        match editor.readline("bramble> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                match ctx.eval_source(&line) {
                    Ok(value) => println!("{}", value),
                    Err(err) => {
                        for formatted in format_error(&err) {
                            eprintln!("{}", formatted);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{} {}", ERROR_TAG, err);
                break;
            }
        }
    }
}
