//! Instrumentation passes and the pipeline that orders them.
//!
//! A transform parses the source once, runs the enabled passes over the same
//! tree in a fixed order and prints the result:
//!
//! 1. [`TopLevelThis`] (always)
//! 2. [`ConsoleBridge`] (always)
//! 3. [`MagicComment`] (`magicComments`)
//! 4. [`StrayExpression`] (`showTopLevelResults`)
//! 5. [`LoopGuard`] (`loopProtection`)
//!
//! Later passes recognise the debug sink calls produced by earlier ones and
//! leave them alone.
pub mod capture;
pub mod console_bridge;
pub mod loop_guard;
pub mod magic_comment;
pub mod names;
pub mod options;
pub mod stray_expression;
pub mod top_level_this;

pub use console_bridge::ConsoleBridge;
pub use loop_guard::LoopGuard;
pub use magic_comment::MagicComment;
pub use names::NameGenerator;
pub use options::{Instrumentation, LogLevel, OptionsKey, TransformOptions};
pub use stray_expression::StrayExpression;
pub use top_level_this::TopLevelThis;

use crate::{
    ast::{
        self, Program,
        node::{Stmt, StmtKind},
    },
    error::Error,
};

pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&mut self, program: &mut Program, ctx: &mut PassContext);
}

/// State shared by every pass of one transform.
#[derive(Debug)]
pub struct PassContext {
    pub options: TransformOptions,
    pub instrumentation: Instrumentation,
    pub names: NameGenerator,
}

impl PassContext {
    pub fn new(
        options: TransformOptions,
        instrumentation: Instrumentation,
        names: NameGenerator,
    ) -> Self {
        Self {
            options,
            instrumentation,
            names,
        }
    }

    /// Whether pass diagnostics at `level` were requested.
    pub fn log_enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::None && self.options.internal_log_level >= level
    }

    /// Whether any internal logging is active. Some captures only apply then.
    pub fn verbose(&self) -> bool {
        self.options.internal_log_level != LogLevel::None
    }
}

/// Runs the passes enabled by a [`TransformOptions`] in their fixed order.
pub struct Pipeline {
    options: TransformOptions,
    instrumentation: Instrumentation,
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    pub fn new(options: TransformOptions) -> Self {
        Self::with_instrumentation(options, Instrumentation::default())
    }

    pub fn with_instrumentation(options: TransformOptions, instrumentation: Instrumentation) -> Self {
        let mut passes: Vec<Box<dyn Pass>> = vec![Box::new(TopLevelThis), Box::new(ConsoleBridge)];

        if options.magic_comments {
            passes.push(Box::new(MagicComment));
        }
        if options.show_top_level_results {
            passes.push(Box::new(StrayExpression));
        }
        if options.loop_protection {
            passes.push(Box::new(LoopGuard));
        }

        Self {
            options,
            instrumentation,
            passes,
        }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn run(&mut self, program: &mut Program) {
        let names = NameGenerator::from_program(program);
        let mut ctx = PassContext::new(self.options.clone(), self.instrumentation.clone(), names);

        for pass in self.passes.iter_mut() {
            if ctx.log_enabled(LogLevel::Debug) {
                tracing::debug!(pass = pass.name(), "running transform pass");
            }
            pass.run(program, &mut ctx);
        }
    }
}

/// Wraps a single-statement body into a block so statements can be spliced
/// around it.
pub(crate) fn into_block(stmt: &mut Box<Stmt>) {
    if matches!(stmt.kind, StmtKind::Block(_)) {
        return;
    }

    let range = stmt.range;
    let inner = std::mem::replace(stmt.as_mut(), Stmt::new(StmtKind::Empty, range));
    **stmt = Stmt::block(vec![inner], range);
}

/// Parses `source`, runs the enabled passes and prints the instrumented program.
#[allow(clippy::result_large_err)]
pub fn transform(source: &str, options: &TransformOptions) -> Result<String, Error> {
    let mut program =
        ast::parse(source).map_err(|cause| Error::from_error(source, cause))?;

    Pipeline::new(options.clone()).run(&mut program);

    Ok(ast::print(&program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::defaults(TransformOptions::default(), vec!["TopLevelThis", "ConsoleBridge", "StrayExpression"])]
    #[case::all(
        TransformOptions {
            loop_protection: true,
            magic_comments: true,
            ..Default::default()
        },
        vec!["TopLevelThis", "ConsoleBridge", "MagicComment", "StrayExpression", "LoopGuard"]
    )]
    #[case::minimal(
        TransformOptions {
            show_top_level_results: false,
            ..Default::default()
        },
        vec!["TopLevelThis", "ConsoleBridge"]
    )]
    fn test_pipeline_order(#[case] options: TransformOptions, #[case] expected: Vec<&str>) {
        assert_eq!(Pipeline::new(options).pass_names(), expected);
    }

    #[test]
    fn test_transform_defaults() {
        let output = transform("5 + 3\nconsole.log(this)", &TransformOptions::default()).unwrap();
        assert_eq!(
            output,
            "__livejs_debug(1, 5 + 3);\n__livejs_debug(2, globalThis);\n"
        );
    }

    #[test]
    fn test_transform_all_passes() {
        let options = TransformOptions {
            loop_protection: true,
            magic_comments: true,
            show_top_level_results: false,
            ..Default::default()
        };
        let output = transform("let x = 1 //?\nwhile (x < 3) x++", &options).unwrap();
        assert_eq!(
            output,
            concat!(
                "let x = 1;\n",
                "__livejs_debug(1, x);\n",
                "let _loopCounter = 0;\n",
                "while (x < 3) {\n",
                "  if (++_loopCounter > 10000)\n",
                "    throw new Error(\"Loop limit exceeded\");\n",
                "  if (_loopCounter % 100 === 0 && __livejs_cancelled())\n",
                "    throw new Error(\"Execution cancelled\");\n",
                "  x++;\n",
                "}\n",
            )
        );
    }

    #[test]
    fn test_transform_reports_syntax_error() {
        let err = transform("let = 1", &TransformOptions::default()).unwrap_err();
        assert!(err.message().starts_with("SyntaxError:"));
    }
}
