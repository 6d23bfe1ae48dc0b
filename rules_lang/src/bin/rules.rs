#![deny(clippy::expect_used)]
//! RulesLang command-line interface
//!
//! Usage:
//!   rules                              # Start the interactive shell
//!   rules -f rule.rl -i '{"a": 2}'     # Run a rule file against a JSON input

use std::env;
use std::fs;
use std::process::ExitCode;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use rules_lang::repl::Session;
use rules_lang::rule::Rule;
use rules_lang_parser::source::SourceText;

const USAGE: &str = "Usage:
  rules                          Start the interactive shell
  rules --file|-f <path> --input|-i <json>
                                 Compile <path> and run it on <json>";

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let mut file: Option<String> = None;
    let mut input: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--file" | "-f" => match args.next() {
                Some(path) => file = Some(path),
                None => return usage_error("missing path after --file"),
            },
            "--input" | "-i" => match args.next() {
                Some(json) => input = Some(json),
                None => return usage_error("missing JSON after --input"),
            },
            "--help" | "-h" => {
                println!("{}", USAGE);
                return ExitCode::SUCCESS;
            }
            other => return usage_error(&format!("unknown argument '{}'", other)),
        }
    }

    match file {
        Some(path) => run_file(&path, input),
        None => run_shell(),
    }
}

fn usage_error(message: &str) -> ExitCode {
    eprintln!("rules: {}\n{}", message, USAGE);
    ExitCode::from(2)
}

fn run_file(path: &str, input: Option<String>) -> ExitCode {
    let Some(input) = input else {
        return usage_error("--file requires --input");
    };
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("rules: cannot read {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };
    let input: serde_json::Value = match serde_json::from_str(&input) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("rules: invalid input JSON: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let rule = match Rule::compile(&text) {
        Ok(rule) => rule,
        Err(error) => {
            let source = SourceText::new(&text);
            eprintln!("{}", error.format_with_source(&source));
            return ExitCode::FAILURE;
        }
    };
    match rule.run(&input) {
        Ok(Some(output)) => println!("{}", output),
        Ok(None) => println!("null"),
        Err(error) => {
            eprintln!("{}", error.format_with_source(rule.source()));
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

fn run_shell() -> ExitCode {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("rules: cannot start the shell: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut session = Session::new();

    loop {
        let prompt = if session.expression_mode() {
            ">>> "
        } else {
            "> "
        };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("rules: {}", e);
                return ExitCode::FAILURE;
            }
        };

        // In statement mode a line ending with ':' opens a block; keep
        // reading until a blank continuation line.
        let mut submission = line;
        if !session.expression_mode() {
            while submission.trim_end().ends_with(':') || continuing(&submission) {
                match editor.readline("") {
                    Ok(next) if next.trim().is_empty() => break,
                    Ok(next) => {
                        submission.push('\n');
                        submission.push_str(&next);
                    }
                    Err(_) => break,
                }
            }
        }

        if submission.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(&submission);
        let report = session.submit(&submission);
        if !report.is_empty() {
            println!("{}", report);
        }
    }
}

/// A multi-line submission keeps reading until its blank terminator
fn continuing(submission: &str) -> bool {
    submission.contains('\n')
}
