//! The contract between instrumented code, an execution host and the
//! serializer.
//!
//! Every debug sink call becomes at most one [`ExecutionResult`]; an error
//! escaping the program becomes a single error result and ends the run.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    eval::{
        Awaiter, DebugSink, ExecutionHost,
        error::EvalError,
        runtime_value::{Object, ObjectKind, Value},
    },
    serializer::{self, Color, ColoredElement},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// Report debug values that are exactly `undefined`.
    pub show_undefined: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Execution,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    pub element: ColoredElement,
    pub kind: ResultKind,
}

impl ExecutionResult {
    pub fn execution(line_number: Option<u32>, element: ColoredElement) -> Self {
        Self {
            line_number,
            element,
            kind: ResultKind::Execution,
        }
    }

    /// An error result. These never carry a line number.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            line_number: None,
            element: ColoredElement::text(message, Some(Color::Error)),
            kind: ResultKind::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResultKind::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Idle,
    Transforming,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move a run from {from} to {to}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: RunState,
}

impl RunState {
    /// The state after `next`, if a run may move there from `self`.
    ///
    /// Already instrumented source may go straight from `Idle` to
    /// `Executing`, and a failed transform ends the run as `Failed`.
    pub fn transition(self, next: RunState) -> Result<RunState, InvalidTransition> {
        use RunState::*;

        match (self, next) {
            (Idle, Transforming)
            | (Idle | Transforming, Executing)
            | (Transforming, Failed)
            | (Executing, Completed | Failed | Cancelled) => Ok(next),
            (Completed | Failed | Cancelled, Idle) => Ok(next),
            _ => Err(InvalidTransition {
                from: self,
                to: next,
            }),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }
}

impl From<RunOutcome> for RunState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => RunState::Completed,
            RunOutcome::Failed => RunState::Failed,
            RunOutcome::Cancelled => RunState::Cancelled,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Transforming => "transforming",
            RunState::Executing => "executing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Turns debug sink calls into execution results.
pub struct ResultSink<'a> {
    options: RunOptions,
    on_result: &'a mut dyn FnMut(ExecutionResult),
    emitted: usize,
    dropped: usize,
}

impl<'a> ResultSink<'a> {
    pub fn new(options: RunOptions, on_result: &'a mut dyn FnMut(ExecutionResult)) -> Self {
        Self {
            options,
            on_result,
            emitted: 0,
            dropped: 0,
        }
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Values that could not be serialized.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl DebugSink for ResultSink<'_> {
    fn emit(&mut self, line: Option<u32>, values: Vec<Value>, awaiter: &mut dyn Awaiter) {
        let value = match <[Value; 1]>::try_from(values) {
            Ok([value]) => value,
            Err(values) if values.is_empty() => Value::Undefined,
            // Several values display together, like a multi-argument console call.
            Err(values) => Value::Object(Object::new(ObjectKind::Array(values), None).into_ref()),
        };

        if matches!(value, Value::Undefined) && !self.options.show_undefined {
            return;
        }

        match serializer::stringify(&value, awaiter) {
            Ok(element) => {
                self.emitted += 1;
                (self.on_result)(ExecutionResult::execution(line, element));
            }
            Err(err) => {
                self.dropped += 1;
                tracing::error!(error = %err, ?line, "dropping a value that could not be serialized");
            }
        }
    }
}

/// Runs instrumented `source` on `host`, streaming results to `on_result`.
pub fn execute(
    host: &mut dyn ExecutionHost,
    source: &str,
    options: RunOptions,
    cancel: &dyn Fn() -> bool,
    on_result: &mut dyn FnMut(ExecutionResult),
) -> RunOutcome {
    let mut sink = ResultSink::new(options, on_result);
    let result = host.execute(source, &mut sink, cancel);
    tracing::debug!(emitted = sink.emitted(), dropped = sink.dropped(), "run finished");

    match result {
        Ok(()) => RunOutcome::Completed,
        Err(err) => {
            let outcome = outcome_of(&err);
            on_result(ExecutionResult::error(err.content()));
            outcome
        }
    }
}

fn outcome_of(err: &EvalError) -> RunOutcome {
    if err.is_cancellation() {
        RunOutcome::Cancelled
    } else {
        RunOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Settled, error::Thrown};
    use rstest::rstest;

    /// Replays scripted sink calls, then fails or succeeds.
    struct ScriptedHost {
        calls: Vec<(Option<u32>, Vec<Value>)>,
        result: Result<(), EvalError>,
    }

    struct NeverSettles;

    impl Awaiter for NeverSettles {
        fn settle(&mut self, _: &Value) -> Settled {
            Settled::Pending
        }
    }

    impl ExecutionHost for ScriptedHost {
        fn execute(
            &mut self,
            _: &str,
            sink: &mut dyn DebugSink,
            _: &dyn Fn() -> bool,
        ) -> Result<(), EvalError> {
            for (line, values) in self.calls.drain(..) {
                sink.emit(line, values, &mut NeverSettles);
            }
            self.result.clone()
        }
    }

    fn run(
        calls: Vec<(Option<u32>, Vec<Value>)>,
        result: Result<(), EvalError>,
        options: RunOptions,
    ) -> (RunOutcome, Vec<ExecutionResult>) {
        let mut host = ScriptedHost { calls, result };
        let mut results = Vec::new();
        let outcome = execute(&mut host, "", options, &|| false, &mut |result| {
            results.push(result)
        });
        (outcome, results)
    }

    fn texts(results: &[ExecutionResult]) -> Vec<String> {
        results
            .iter()
            .map(|result| result.element.plain_text())
            .collect()
    }

    #[test]
    fn test_single_value() {
        let (outcome, results) = run(
            vec![(Some(1), vec![Value::Number(8.0)])],
            Ok(()),
            RunOptions::default(),
        );

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            results,
            vec![ExecutionResult::execution(
                Some(1),
                ColoredElement::text("8", Some(Color::Number))
            )]
        );
    }

    #[rstest]
    #[case::hidden(false, 0)]
    #[case::shown(true, 1)]
    fn test_undefined_suppression(#[case] show_undefined: bool, #[case] expected: usize) {
        let (_, results) = run(
            vec![(Some(2), vec![Value::Undefined])],
            Ok(()),
            RunOptions { show_undefined },
        );
        assert_eq!(results.len(), expected);
    }

    #[test]
    fn test_undefined_among_several_values_is_kept() {
        let (_, results) = run(
            vec![(Some(1), vec![Value::Undefined, Value::Undefined])],
            Ok(()),
            RunOptions::default(),
        );
        assert_eq!(texts(&results), vec!["[\n  null,\n  null\n]"]);
    }

    #[test]
    fn test_multiple_values_are_grouped() {
        let (_, results) = run(
            vec![(Some(3), vec![Value::string("a"), Value::string("b")])],
            Ok(()),
            RunOptions::default(),
        );

        assert_eq!(texts(&results), vec!["[\n  \"a\",\n  \"b\"\n]"]);
        assert_eq!(results[0].line_number, Some(3));
        assert_eq!(results[0].element.color, None);
    }

    #[test]
    fn test_serialization_failure_drops_only_that_value() {
        let bigints = Value::Object(
            Object::new(ObjectKind::Array(vec![Value::BigInt(1)]), None).into_ref(),
        );
        let (outcome, results) = run(
            vec![
                (Some(1), vec![bigints]),
                (Some(2), vec![Value::Bool(true)]),
            ],
            Ok(()),
            RunOptions::default(),
        );

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(texts(&results), vec!["true"]);
    }

    #[rstest]
    #[case::plain_error(Thrown::new(Some("Error"), "boom"), "boom", RunOutcome::Failed)]
    #[case::named_error(Thrown::new(Some("TypeError"), "x is not a function"), "TypeError: x is not a function", RunOutcome::Failed)]
    #[case::non_error(Thrown::new(None, "42"), "42", RunOutcome::Failed)]
    #[case::loop_limit(Thrown::new(Some("Error"), "Loop limit exceeded"), "Loop limit exceeded", RunOutcome::Failed)]
    #[case::cancelled(Thrown::new(Some("Error"), "Execution cancelled"), "Execution cancelled", RunOutcome::Cancelled)]
    fn test_uncaught_error(#[case] thrown: Thrown, #[case] content: &str, #[case] expected: RunOutcome) {
        let (outcome, results) = run(
            vec![(Some(1), vec![Value::Number(1.0)])],
            Err(EvalError::Uncaught(thrown)),
            RunOptions::default(),
        );

        assert_eq!(outcome, expected);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1], ExecutionResult::error(content));
        assert_eq!(results[1].line_number, None);
    }

    #[rstest]
    #[case::transform(RunState::Idle, RunState::Transforming, true)]
    #[case::direct_run(RunState::Idle, RunState::Executing, true)]
    #[case::after_transform(RunState::Transforming, RunState::Executing, true)]
    #[case::transform_failure(RunState::Transforming, RunState::Failed, true)]
    #[case::cancelled(RunState::Executing, RunState::Cancelled, true)]
    #[case::restart(RunState::Completed, RunState::Idle, true)]
    #[case::skip_to_end(RunState::Idle, RunState::Completed, false)]
    #[case::cancel_transform(RunState::Transforming, RunState::Cancelled, false)]
    #[case::rerun_without_reset(RunState::Failed, RunState::Executing, false)]
    fn test_run_state_transitions(#[case] from: RunState, #[case] to: RunState, #[case] allowed: bool) {
        assert_eq!(from.transition(to).is_ok(), allowed);
    }

    #[test]
    fn test_invalid_transition_message() {
        assert_eq!(
            RunState::Idle
                .transition(RunState::Completed)
                .unwrap_err()
                .to_string(),
            "cannot move a run from idle to completed"
        );
    }

    #[test]
    fn test_execution_result_json_shape() {
        assert_eq!(
            serde_json::to_value(ExecutionResult::error("boom")).unwrap(),
            serde_json::json!({
                "element": { "content": "boom", "color": "error" },
                "kind": "error"
            })
        );
    }
}
