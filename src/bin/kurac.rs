//! The front-end inspector: dumps the token stream or the AST of a source
//! file.
//!
//! Run with `--help` for more info.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use kura::front::lex::{display_token, Lexer};
use kura::front::parse::{ParseWhat, Parser as KuraParser};
use kura::front::token::TokenKind;
use kura::runtime::Context;
use kura::value::{exception, stream, string};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    file: PathBuf,
    /// the output format
    #[arg(value_enum, short, long, default_value_t = Output::Tokens)]
    out: Output,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Output {
    /// the list of tokens
    Tokens,
    /// the ast data structure
    Ast,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let source = match std::fs::read(&args.file) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("kurac: cannot read {}: {err}", args.file.display());
            std::process::exit(1);
        }
    };

    let mut z = Context::new();
    let input = stream::new_bytes(&mut z, source);

    match args.out {
        Output::Tokens => {
            let mut lexer = Lexer::new();
            lexer.start(&mut z, input);
            loop {
                match lexer.next(&mut z) {
                    Ok(tok) if tok.kind == TokenKind::Eof => break,
                    Ok(tok) => println!("{}", display_token(&z, &tok)),
                    Err(err) => {
                        lexer.finish(&mut z);
                        eprintln!("kurac: {err}");
                        std::process::exit(1);
                    }
                }
            }
            lexer.finish(&mut z);
        }
        Output::Ast => {
            let mut parser = KuraParser::new();
            match parser.parse(&mut z, input, ParseWhat::Module) {
                Ok(ast) => println!("{ast:#?}"),
                Err(_) => {
                    let exc = z.reg0();
                    let what = exception::what(&z, exc);
                    if string::is_string(&z, what) {
                        eprintln!("kurac: {}", string::to_utf8(&z, what));
                    } else {
                        eprintln!("kurac: parse failed");
                    }
                    std::process::exit(1);
                }
            }
        }
    }
}
