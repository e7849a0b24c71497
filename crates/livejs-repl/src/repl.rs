use colored::*;
use itertools::Itertools;
use livejs_lang::{Engine, RunOptions, TransformOptions};
use miette::IntoDiagnostic;
use rustyline::{
    At, Cmd, CompletionType, Config, Context, EditMode, Editor, Helper, KeyCode, KeyEvent,
    Modifiers, Movement, Word,
    completion::{Completer, Pair},
    error::ReadlineError,
    highlight::{CmdKind, Highlighter, MatchingBracketHighlighter},
    hint::Hinter,
    validate::{ValidationContext, ValidationResult, Validator},
};
use std::{borrow::Cow, cell::RefCell, fs, path::PathBuf, rc::Rc};

use crate::{
    command_context::{CommandContext, CommandOutput},
    render::render_result,
};

const PROMPT: &str = "> ";
const HISTORY_FILE: &str = "history.txt";

pub struct LiveLineHelper {
    command_context: Rc<RefCell<CommandContext>>,
    matching_bracket_highlighter: MatchingBracketHighlighter,
}

impl LiveLineHelper {
    pub fn new(command_context: Rc<RefCell<CommandContext>>) -> Self {
        Self {
            command_context,
            matching_bracket_highlighter: MatchingBracketHighlighter::default(),
        }
    }
}

impl Hinter for LiveLineHelper {
    type Hint = String;
}

impl Highlighter for LiveLineHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        _default: bool,
    ) -> Cow<'b, str> {
        prompt.cyan().to_string().into()
    }

    fn highlight_char(&self, line: &str, pos: usize, kind: CmdKind) -> bool {
        self.matching_bracket_highlighter
            .highlight_char(line, pos, kind)
    }
}

/// Input is complete once it parses, or once it fails for a reason other
/// than running out of source.
pub(crate) fn is_incomplete(input: &str) -> bool {
    matches!(livejs_lang::ast::parse(input), Err(err) if err.is_eof())
}

impl Validator for LiveLineHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> Result<ValidationResult, ReadlineError> {
        let input = ctx.input();
        if input.is_empty() || input.ends_with("\n\n") || input.starts_with(":") {
            return Ok(ValidationResult::Valid(None));
        }

        if is_incomplete(input) {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }

    fn validate_while_typing(&self) -> bool {
        false
    }
}

impl Completer for LiveLineHelper {
    type Candidate = Pair;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let completions = self
            .command_context
            .borrow()
            .completions(line, pos)
            .iter()
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: format!("{}{}", cmd, &line[pos..]),
            })
            .collect_vec();

        Ok((0, completions))
    }
}

impl Helper for LiveLineHelper {}

pub struct Repl {
    command_context: Rc<RefCell<CommandContext>>,
}

impl Repl {
    pub fn new(engine: Engine, transform_options: TransformOptions, run_options: RunOptions) -> Self {
        Self {
            command_context: Rc::new(RefCell::new(CommandContext::new(
                engine,
                transform_options,
                run_options,
            ))),
        }
    }

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("LIVEJS_CONFIG_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("livejs")))
    }

    pub fn run(&self) -> miette::Result<()> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .color_mode(rustyline::ColorMode::Enabled)
            .build();
        let mut editor = Editor::with_config(config).into_diagnostic()?;
        let helper = LiveLineHelper::new(Rc::clone(&self.command_context));

        editor.set_helper(Some(helper));
        editor.bind_sequence(
            KeyEvent(KeyCode::Left, Modifiers::CTRL),
            Cmd::Move(Movement::BackwardWord(1, Word::Big)),
        );
        editor.bind_sequence(
            KeyEvent(KeyCode::Right, Modifiers::CTRL),
            Cmd::Move(Movement::ForwardWord(1, At::AfterEnd, Word::Big)),
        );

        let history = Self::config_dir().map(|config_dir| {
            fs::create_dir_all(&config_dir).ok();
            config_dir.join(HISTORY_FILE)
        });

        if let Some(history) = &history
            && editor.load_history(history).is_err()
        {
            println!("No previous history.");
        }

        println!("Welcome to livejs. For help, type :help");

        loop {
            let prompt = format!("{}", PROMPT.cyan());
            let readline = editor.readline(&prompt);

            match readline {
                Ok(line) => match self.command_context.borrow_mut().execute(&line) {
                    Ok(CommandOutput::String(s)) => println!("{}", s.join("\n")),
                    Ok(CommandOutput::Results(results)) => {
                        if !results.is_empty() {
                            println!("{}", results.iter().map(render_result).join("\n"));
                        }

                        editor.add_history_entry(&line).into_diagnostic()?;
                    }
                    Ok(CommandOutput::Quit) => break,
                    Ok(CommandOutput::None) => (),
                    Err(e) => {
                        eprintln!("{:?}", e)
                    }
                },
                Err(ReadlineError::Interrupted) => {
                    self.command_context.borrow().engine.cancel();
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }

            if let Some(history) = &history
                && let Err(err) = editor.save_history(history)
            {
                eprintln!("Error: {:?}", err);
            }
        }

        self.command_context.borrow_mut().engine.dispose();

        Ok(())
    }
}
