mod store;

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use bumpalo::Bump;
use clap::Parser;
use dkv_script::{Engine, EngineOptions, render_error};
use dkv_script_core::parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use reedline::{
    DefaultCompleter, DefaultPrompt, DefaultPromptSegment, DescriptionMode, EditCommand, Emacs,
    ExampleHighlighter, IdeMenu, KeyCode, KeyModifiers, Keybindings, MenuBuilder, Reedline,
    ReedlineEvent, ReedlineMenu, Signal, default_emacs_keybindings,
};

use crate::store::MemoryStore;

const WORDS: &[&str] = &[
    "let", "if", "else", "while", "for", "fn", "return", "print", "dkv", "str", "len",
    "is_error", "true", "false", "nil", "number", "int", "float", "string", "bool",
];

/// DKV Script - run scripts against an in-memory key-value store
#[derive(Parser, Debug)]
#[command(name = "dkv")]
#[command(about = "Run DKV Script programs", long_about = None)]
struct Args {
    /// Print the parsed AST (for debugging)
    #[arg(long)]
    dump_ast: bool,

    /// Print the compiled bytecode (for debugging)
    #[arg(long)]
    dump_bytecode: bool,

    /// Do not register the in-memory store; any `dkv(...)` call fails
    #[arg(long)]
    no_store: bool,

    /// Script source to run
    #[arg(short = 'e', long = "eval", value_name = "SOURCE", conflicts_with = "file")]
    eval: Option<String>,

    /// Script file to run (if neither a file nor -e is given, reads from stdin)
    file: Option<PathBuf>,
}

struct Session {
    engine: Engine,
    store: Option<MemoryStore>,
    dump_ast: bool,
    dump_bytecode: bool,
}

impl Session {
    fn new(args: &Args) -> Self {
        Self {
            engine: Engine::new(EngineOptions::default()),
            store: (!args.no_store).then(MemoryStore::new),
            dump_ast: args.dump_ast,
            dump_bytecode: args.dump_bytecode,
        }
    }

    /// Compile and run one script. Errors are rendered to stderr.
    fn run(&mut self, source: &str) -> bool {
        if self.dump_ast {
            let arena = Bump::new();
            let max_depth = self.engine.options().compilation.max_nesting_depth;
            // Syntax errors are reported by the compile step below.
            if let Ok(parsed) = parser::parse_with_max_depth(&arena, source, max_depth) {
                println!("=== Parsed AST ===");
                println!("{:#?}", parsed.statements);
                println!();
            }
        }

        let program = match self.engine.compile(source) {
            Ok(program) => program,
            Err(e) => {
                render_error(&e);
                return false;
            }
        };

        if self.dump_bytecode {
            println!("=== Bytecode ===");
            println!("{}", program.code().disassemble());
        }

        let result = match &mut self.store {
            Some(store) => program.run_with_handler(|command: &str| store.execute(command)),
            None => program.run(),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                render_error(&e);
                false
            }
        }
    }
}

fn add_menu_keybindings(keybindings: &mut Keybindings) {
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("completion_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );
    keybindings.add_binding(
        KeyModifiers::ALT,
        KeyCode::Enter,
        ReedlineEvent::Edit(vec![EditCommand::InsertNewline]),
    );
}

fn setup_reedline() -> (Reedline, DefaultPrompt) {
    let words: Vec<String> = WORDS.iter().map(|w| w.to_string()).collect();

    let completer = Box::new({
        let mut completions = DefaultCompleter::with_inclusions(&['_']);
        completions.insert(words.clone());
        completions
    });

    let ide_menu = IdeMenu::default()
        .with_name("completion_menu")
        .with_min_completion_width(0)
        .with_max_completion_width(50)
        .with_max_completion_height(u16::MAX)
        .with_padding(0)
        .with_cursor_offset(0)
        .with_description_mode(DescriptionMode::PreferRight)
        .with_min_description_width(0)
        .with_max_description_width(50)
        .with_description_offset(1)
        .with_correct_cursor_pos(false);

    let mut keybindings = default_emacs_keybindings();
    add_menu_keybindings(&mut keybindings);

    let line_editor = Reedline::create()
        .with_highlighter(Box::new(ExampleHighlighter::new(words)))
        .with_completer(completer)
        .with_menu(ReedlineMenu::EngineCompleter(Box::new(ide_menu)))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Basic("dkv".to_string()),
        DefaultPromptSegment::Empty,
    );

    (line_editor, prompt)
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    // DKV_LOG takes precedence over RUST_LOG; default to WARN.
    let filter = EnvFilter::try_from_env("DKV_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging();

    let mut session = Session::new(&args);

    if let Some(source) = &args.eval {
        return Ok(exit_code(session.run(source)));
    }

    if let Some(path) = &args.file {
        let source = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        return Ok(exit_code(session.run(&source)));
    }

    if atty::is(atty::Stream::Stdin) {
        // Interactive REPL mode; the store persists across lines.
        let (mut line_editor, prompt) = setup_reedline();

        println!("DKV Script REPL - Type statements to run (Ctrl+D or Ctrl+C to exit)");

        loop {
            let sig = match line_editor.read_line(&prompt) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Reedline error: {e}");
                    return Ok(ExitCode::FAILURE);
                }
            };

            match sig {
                Signal::Success(buffer) => {
                    session.run(&buffer);
                }
                Signal::CtrlD | Signal::CtrlC => {
                    println!("\nGoodbye!");
                    return Ok(ExitCode::SUCCESS);
                }
            }
        }
    }

    // Pipe/stdin mode: every line is its own script.
    let stdin = std::io::stdin();
    let reader = BufReader::new(stdin.lock());
    let mut ok = true;

    for line in reader.lines() {
        let line = line.into_diagnostic().wrap_err("Error reading line from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        ok &= session.run(&line);
    }

    Ok(exit_code(ok))
}
