use std::fmt;

use livejs_lang::{Engine, ExecutionResult, LogLevel, RunOptions, TransformOptions};
use miette::miette;
use strum::IntoEnumIterator;

#[derive(Debug, Clone)]
pub enum CommandOutput {
    Results(Vec<ExecutionResult>),
    String(Vec<String>),
    Quit,
    None,
}

#[derive(Debug, Clone, strum::EnumIter)]
pub enum Command {
    Clear,
    Help,
    Options(String, String),
    Quit,
    Show,
    Stats,
    Eval(String),
    NotFound(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Clear => write!(f, ":clear"),
            Command::Help => write!(f, ":help"),
            Command::Options(_, _) => write!(f, ":options"),
            Command::Quit => write!(f, ":quit"),
            Command::Show => write!(f, ":show"),
            Command::Stats => write!(f, ":stats"),
            Command::Eval(_) => write!(f, ":eval"),
            Command::NotFound(_) => write!(f, ":not_found"),
        }
    }
}

impl Command {
    pub fn help(&self) -> String {
        match self {
            Command::Clear => format!("{:<12}{}", ":clear", "Forget every snippet entered so far"),
            Command::Help => format!("{:<12}{}", ":help", "Print command help"),
            Command::Options(_, _) => format!(
                "{:<12}{}",
                ":options", "Show transform options, or set one (name value)"
            ),
            Command::Quit => format!("{:<12}{}", ":quit", "Quit and exit"),
            Command::Show => format!("{:<12}{}", ":show", "Print the accumulated script"),
            Command::Stats => format!("{:<12}{}", ":stats", "Print transpile cache statistics"),
            Command::Eval(_) => format!("{:<12}{}", ":eval", ""),
            Command::NotFound(_) => format!("{:<12}{}", ":not_found", ""),
        }
    }
}

impl From<String> for Command {
    fn from(s: String) -> Self {
        match s
            .as_str()
            .split_whitespace()
            .collect::<Vec<&str>>()
            .as_slice()
        {
            [":clear"] => Command::Clear,
            [":help"] => Command::Help,
            [":options"] => Command::Options(String::new(), String::new()),
            [":options", name, value] => Command::Options(name.to_string(), value.to_string()),
            [":quit"] => Command::Quit,
            [":show"] => Command::Show,
            [":stats"] => Command::Stats,
            _ if s.starts_with(":") => Command::NotFound(s),
            _ => Command::Eval(s),
        }
    }
}

/// The REPL session: every snippet entered is appended to a script that is
/// re-run as a whole.
pub struct CommandContext {
    pub(crate) engine: Engine,
    pub(crate) snippets: Vec<String>,
    pub(crate) transform_options: TransformOptions,
    pub(crate) run_options: RunOptions,
}

impl CommandContext {
    pub fn new(engine: Engine, transform_options: TransformOptions, run_options: RunOptions) -> Self {
        Self {
            engine,
            snippets: Vec::new(),
            transform_options,
            run_options,
        }
    }

    pub fn script(&self) -> String {
        self.snippets.join("\n")
    }

    pub fn completions(&self, line: &str, pos: usize) -> Vec<String> {
        let src = &line[..pos];

        Command::iter()
            .filter(|cmd| !matches!(cmd, Command::Eval(_) | Command::NotFound(_)))
            .map(|cmd| cmd.to_string())
            .filter(|name| !src.is_empty() && name.starts_with(src))
            .collect()
    }

    pub fn execute(&mut self, to_run: &str) -> miette::Result<CommandOutput> {
        match to_run.to_string().into() {
            Command::Clear => {
                self.snippets.clear();
                Ok(CommandOutput::None)
            }
            Command::Help => Ok(CommandOutput::String(
                Command::iter()
                    .filter(|c| !matches!(c, Command::Eval(_) | Command::NotFound(_)))
                    .map(|c| c.help())
                    .collect(),
            )),
            Command::Options(name, _) if name.is_empty() => Ok(CommandOutput::String(vec![
                format!("loopProtection      {}", self.transform_options.loop_protection),
                format!("magicComments       {}", self.transform_options.magic_comments),
                format!("showTopLevelResults {}", self.transform_options.show_top_level_results),
                format!("showUndefined       {}", self.run_options.show_undefined),
                format!("internalLogLevel    {}", self.transform_options.internal_log_level),
            ])),
            Command::Options(name, value) => {
                self.set_option(&name, &value)?;
                Ok(CommandOutput::None)
            }
            Command::Quit => Ok(CommandOutput::Quit),
            Command::Show => Ok(CommandOutput::String(
                self.snippets
                    .iter()
                    .flat_map(|snippet| snippet.lines())
                    .enumerate()
                    .map(|(index, line)| format!("{:>4} │ {}", index + 1, line))
                    .collect(),
            )),
            Command::Stats => {
                let stats = self.engine.cache_stats();
                Ok(CommandOutput::String(vec![
                    format!("size        {}", stats.size),
                    format!("hits        {}", stats.hits),
                    format!("misses      {}", stats.misses),
                    format!("hitRate     {:.2}", stats.hit_rate),
                    format!("memoryBytes {}", stats.memory_bytes),
                ]))
            }
            Command::NotFound(s) => Err(miette!(format!("Command not found: {}", s))),
            Command::Eval(code) => {
                if code.trim().is_empty() {
                    return Ok(CommandOutput::None);
                }
                self.eval(code)
            }
        }
    }

    /// Runs the script with `code` appended. Only results from the new
    /// snippet, and errors, are returned. A snippet that does not parse is
    /// not kept.
    fn eval(&mut self, code: String) -> miette::Result<CommandOutput> {
        let first_line = self
            .snippets
            .iter()
            .map(|snippet| snippet.lines().count().max(1))
            .sum::<usize>() as u32
            + 1;

        self.snippets.push(code);
        let script = self.script();

        let instrumented = match self.engine.transform(&script, &self.transform_options) {
            Ok(instrumented) => instrumented,
            Err(err) => {
                self.snippets.pop();
                return Err(miette::Report::new(err));
            }
        };

        let mut results = Vec::new();
        self.engine.run(&instrumented, self.run_options, |result| {
            if result.line_number.is_none_or(|line| line >= first_line) {
                results.push(result);
            }
        });

        Ok(CommandOutput::Results(results))
    }

    fn set_option(&mut self, name: &str, value: &str) -> miette::Result<()> {
        let flag = || {
            value
                .parse::<bool>()
                .map_err(|_| miette!("Expected true or false for {}, got {}", name, value))
        };

        match name {
            "loopProtection" => self.transform_options.loop_protection = flag()?,
            "magicComments" => self.transform_options.magic_comments = flag()?,
            "showTopLevelResults" => self.transform_options.show_top_level_results = flag()?,
            "showUndefined" => {
                let show = flag()?;
                self.transform_options.show_undefined = show;
                self.run_options.show_undefined = show;
            }
            "internalLogLevel" => {
                self.transform_options.internal_log_level = value
                    .parse::<LogLevel>()
                    .map_err(|err| miette!("{}", err))?
            }
            _ => return Err(miette!("Unknown option: {}", name)),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn ctx() -> CommandContext {
        CommandContext::new(Engine::isolated(), TransformOptions::default(), RunOptions::default())
    }

    fn texts(output: CommandOutput) -> Vec<(Option<u32>, String)> {
        match output {
            CommandOutput::Results(results) => results
                .iter()
                .map(|result| (result.line_number, result.element.plain_text()))
                .collect(),
            other => panic!("Expected results, got {:?}", other),
        }
    }

    #[test]
    fn test_command_from_string() {
        assert!(matches!(Command::from(":clear".to_string()), Command::Clear));
        assert!(matches!(Command::from(":help".to_string()), Command::Help));
        assert!(matches!(Command::from(":quit".to_string()), Command::Quit));
        assert!(matches!(Command::from(":show".to_string()), Command::Show));
        assert!(matches!(Command::from(":stats".to_string()), Command::Stats));
        assert!(matches!(Command::from(":nope".to_string()), Command::NotFound(_)));

        if let Command::Eval(code) = Command::from("1 + 2".to_string()) {
            assert_eq!(code, "1 + 2");
        } else {
            panic!("Expected Eval command");
        }

        if let Command::Options(name, value) = Command::from(":options loopProtection true".to_string()) {
            assert_eq!(name, "loopProtection");
            assert_eq!(value, "true");
        } else {
            panic!("Expected Options command");
        }
    }

    #[rstest]
    #[case::clear(Command::Clear, ":clear")]
    #[case::help(Command::Help, ":help")]
    #[case::options(Command::Options("a".to_string(), "b".to_string()), ":options")]
    #[case::quit(Command::Quit, ":quit")]
    #[case::eval(Command::Eval("1".to_string()), ":eval")]
    fn test_command_display(#[case] command: Command, #[case] expected: &str) {
        assert_eq!(command.to_string(), expected);
        assert!(command.help().starts_with(expected));
    }

    #[rstest]
    #[case::prefix(":s", vec![":show", ":stats"])]
    #[case::exact(":quit", vec![":quit"])]
    #[case::code("1 +", vec![])]
    #[case::empty("", vec![])]
    fn test_completions(ctx: CommandContext, #[case] line: &str, #[case] expected: Vec<&str>) {
        assert_eq!(ctx.completions(line, line.len()), expected);
    }

    #[rstest]
    fn test_eval_shows_only_new_snippet(mut ctx: CommandContext) {
        assert_eq!(texts(ctx.execute("let x = 2").unwrap()), vec![]);
        assert_eq!(texts(ctx.execute("x * 3").unwrap()), vec![(Some(2), "6".to_string())]);
        assert_eq!(ctx.script(), "let x = 2\nx * 3");
    }

    #[rstest]
    fn test_syntax_error_is_not_kept(mut ctx: CommandContext) {
        ctx.execute("let y = 1").unwrap();

        assert!(ctx.execute("y +").is_err());
        assert_eq!(ctx.snippets.len(), 1);
        assert_eq!(texts(ctx.execute("y").unwrap()), vec![(Some(2), "1".to_string())]);
    }

    #[rstest]
    fn test_runtime_error_is_reported(mut ctx: CommandContext) {
        let results = texts(ctx.execute("missing").unwrap());

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, None);
        assert!(results[0].1.contains("missing"));
    }

    #[rstest]
    fn test_show_and_clear(mut ctx: CommandContext) {
        ctx.execute("const a = 1").unwrap();
        ctx.execute("a").unwrap();

        let CommandOutput::String(lines) = ctx.execute(":show").unwrap() else {
            panic!("Expected string output");
        };
        assert_eq!(lines, vec!["   1 │ const a = 1", "   2 │ a"]);

        assert!(matches!(ctx.execute(":clear").unwrap(), CommandOutput::None));
        assert_eq!(ctx.script(), "");
    }

    #[rstest]
    fn test_options(mut ctx: CommandContext) {
        ctx.execute(":options loopProtection true").unwrap();
        ctx.execute(":options showUndefined true").unwrap();
        ctx.execute(":options internalLogLevel debug").unwrap();

        assert!(ctx.transform_options.loop_protection);
        assert!(ctx.run_options.show_undefined);
        assert_eq!(ctx.transform_options.internal_log_level, LogLevel::Debug);

        let CommandOutput::String(lines) = ctx.execute(":options").unwrap() else {
            panic!("Expected string output");
        };
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "loopProtection      true");

        assert!(ctx.execute(":options loopProtection maybe").is_err());
        assert!(ctx.execute(":options colour red").is_err());
    }

    #[rstest]
    fn test_loop_protection_option(mut ctx: CommandContext) {
        ctx.execute(":options loopProtection true").unwrap();
        let results = texts(ctx.execute("while (true) {}").unwrap());

        assert_eq!(results, vec![(None, "Loop limit exceeded".to_string())]);
    }

    #[rstest]
    fn test_stats(mut ctx: CommandContext) {
        ctx.execute("1").unwrap();

        let CommandOutput::String(lines) = ctx.execute(":stats").unwrap() else {
            panic!("Expected string output");
        };
        assert_eq!(lines[0], "size        1");
        assert_eq!(lines[2], "misses      1");
    }

    #[rstest]
    fn test_unknown_command(mut ctx: CommandContext) {
        assert!(ctx.execute(":nope").is_err());
        assert!(matches!(ctx.execute(":quit").unwrap(), CommandOutput::Quit));
    }
}
