use std::fs::File;
use std::io::{self, BufReader, Write};

use anyhow::Context as _;
use clap::{App, Arg};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jlang::backend::ir::IrModule;
use jlang::codegen::Codegen;
use jlang::driver::{Driver, DriverOptions, ReaderChars, Report};
use jlang::lexer::Lexer;
use jlang::parser::Parser;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run<I, W>(chars: I, options: DriverOptions, use_llvm: bool, out: &mut W) -> anyhow::Result<Report>
where
    I: Iterator<Item = char>,
    W: Write,
{
    let parser = Parser::new(Lexer::new(chars));
    if use_llvm {
        return run_llvm(parser, options, out);
    }

    let mut driver = Driver::new(parser, Codegen::new(IrModule::default()), options);
    Ok(driver.run(out)?)
}

#[cfg(feature = "llvm")]
fn run_llvm<I, W>(parser: Parser<I>, options: DriverOptions, out: &mut W) -> anyhow::Result<Report>
where
    I: Iterator<Item = char>,
    W: Write,
{
    use inkwell::context::Context;
    use jlang::backend::llvm::LlvmBackend;

    let context = Context::create();
    let backend = LlvmBackend::new(&context, "jlang");
    let mut driver = Driver::new(parser, Codegen::new(backend), options);
    Ok(driver.run(out)?)
}

#[cfg(not(feature = "llvm"))]
fn run_llvm<I, W>(_parser: Parser<I>, _options: DriverOptions, _out: &mut W) -> anyhow::Result<Report>
where
    I: Iterator<Item = char>,
    W: Write,
{
    anyhow::bail!("--llvm needs a build with the `llvm` feature")
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let matches = App::new("jlang")
        .version(env!("CARGO_PKG_VERSION"))
        .about("compiles jlang definitions and expressions to IR")
        .arg(
            Arg::with_name("FILE")
                .help("source file to read, stdin when omitted")
                .index(1),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("do not print the ready> prompt"),
        )
        .arg(
            Arg::with_name("dump-ast")
                .long("dump-ast")
                .help("print each parsed form instead of generating code"),
        )
        .arg(
            Arg::with_name("llvm")
                .long("llvm")
                .help("generate LLVM IR through inkwell (needs the llvm feature)"),
        )
        .get_matches();

    let use_llvm = matches.is_present("llvm");
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let report = match matches.value_of("FILE") {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
            let options = DriverOptions {
                prompt: false,
                dump_ast: matches.is_present("dump-ast"),
            };
            run(ReaderChars::new(BufReader::new(file)), options, use_llvm, &mut out)?
        }
        None => {
            let options = DriverOptions {
                prompt: !matches.is_present("quiet"),
                dump_ast: matches.is_present("dump-ast"),
            };
            let stdin = io::stdin();
            let chars = ReaderChars::new(stdin.lock());
            run(chars, options, use_llvm, &mut out)?
        }
    };

    info!(generated = report.generated, failed = report.failed, "done");
    Ok(())
}
