//! Promises, the microtask queue and virtual-time timers.
use super::{
    Abrupt, Runtime,
    runtime_value::{Object, ObjectKind, ObjectRef, Value},
};
use crate::transform::loop_guard::CANCELLED_MESSAGE;

#[derive(Debug, Clone)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

pub struct PromiseRecord {
    pub state: PromiseState,
    reactions: Vec<Reaction>,
    /// Whether anything observes a rejection.
    pub handled: bool,
    /// Set once a resolving function has been used.
    locked: bool,
}

impl PromiseRecord {
    pub fn new() -> Self {
        Self {
            state: PromiseState::Pending,
            reactions: Vec::new(),
            handled: false,
            locked: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, PromiseState::Pending)
    }
}

impl Default for PromiseRecord {
    fn default() -> Self {
        Self::new()
    }
}

struct Reaction {
    on_fulfilled: Option<Value>,
    on_rejected: Option<Value>,
    derived: ObjectRef,
}

pub enum Job {
    Reaction {
        handler: Option<Value>,
        argument: Value,
        rejected: bool,
        derived: ObjectRef,
    },
    ResolveThenable {
        promise: ObjectRef,
        thenable: Value,
        then: Value,
    },
}

struct Timer {
    id: u32,
    due: u64,
    seq: u64,
    callback: Value,
    args: Vec<Value>,
    interval: Option<u64>,
    fired: u32,
}

/// Timers ordered by due time, then by creation. Time only advances when a
/// timer fires.
pub struct TimerQueue {
    now: u64,
    next_id: u32,
    seq: u64,
    max_repeats: u32,
    timers: Vec<Timer>,
}

impl TimerQueue {
    pub fn new(max_repeats: u32) -> Self {
        Self {
            now: 0,
            next_id: 1,
            seq: 0,
            max_repeats,
            timers: Vec::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn schedule(&mut self, callback: Value, args: Vec<Value>, delay: f64, repeat: bool) -> u32 {
        let delay = if delay.is_finite() && delay > 0.0 { delay as u64 } else { 0 };
        let id = self.next_id;
        self.next_id += 1;
        self.seq += 1;

        self.timers.push(Timer {
            id,
            due: self.now + delay,
            seq: self.seq,
            callback,
            args,
            interval: repeat.then_some(delay.max(1)),
            fired: 0,
        });
        id
    }

    pub fn clear(&mut self, id: u32) {
        self.timers.retain(|timer| timer.id != id);
    }

    /// Removes the next timer to fire and advances the clock to it. Interval
    /// timers are put back until they reach their repeat limit.
    fn pop(&mut self) -> Option<(Value, Vec<Value>)> {
        let (index, _) = self
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, timer)| (timer.due, timer.seq))?;
        let mut timer = self.timers.swap_remove(index);
        self.now = self.now.max(timer.due);
        let fired = (timer.callback.clone(), timer.args.clone());

        if let Some(interval) = timer.interval {
            timer.fired += 1;
            if timer.fired < self.max_repeats {
                self.seq += 1;
                timer.seq = self.seq;
                timer.due = self.now + interval;
                self.timers.push(timer);
            }
        }

        Some(fired)
    }
}

impl Runtime<'_> {
    pub(crate) fn new_promise(&self) -> ObjectRef {
        Object::new(
            ObjectKind::Promise(PromiseRecord::new()),
            Some(self.realm.promise_prototype.clone()),
        )
        .into_ref()
    }

    pub(crate) fn promise_of(value: &Value) -> Option<ObjectRef> {
        value
            .as_object()
            .filter(|object| matches!(object.borrow().kind, ObjectKind::Promise(_)))
            .cloned()
    }

    pub(crate) fn promise_state(promise: &ObjectRef) -> PromiseState {
        match &promise.borrow().kind {
            ObjectKind::Promise(record) => record.state.clone(),
            _ => PromiseState::Pending,
        }
    }

    fn with_record<T>(promise: &ObjectRef, f: impl FnOnce(&mut PromiseRecord) -> T) -> Option<T> {
        match &mut promise.borrow_mut().kind {
            ObjectKind::Promise(record) => Some(f(record)),
            _ => None,
        }
    }

    pub(crate) fn mark_handled(promise: &ObjectRef) {
        Self::with_record(promise, |record| record.handled = true);
    }

    /// `Promise.resolve(value)`: promises pass through, anything else is
    /// wrapped (and followed, when it is a thenable).
    pub(crate) fn promise_resolve(&mut self, value: Value) -> ObjectRef {
        if let Some(promise) = Self::promise_of(&value) {
            return promise;
        }
        let promise = self.new_promise();
        self.resolve_promise(&promise, value);
        promise
    }

    pub(crate) fn resolve_promise(&mut self, promise: &ObjectRef, value: Value) {
        if let Value::Object(object) = &value {
            if std::rc::Rc::ptr_eq(object, promise) {
                let error = self.make_error("TypeError", "Chaining cycle detected for promise");
                self.reject_promise(promise, error);
                return;
            }

            let then = value.get("then").filter(|then| then.is_callable());
            if let Some(then) = then {
                self.microtasks.push_back(Job::ResolveThenable {
                    promise: promise.clone(),
                    thenable: value,
                    then,
                });
                return;
            }
        }

        self.settle_promise(promise, PromiseState::Fulfilled(value));
    }

    pub(crate) fn reject_promise(&mut self, promise: &ObjectRef, reason: Value) {
        self.settle_promise(promise, PromiseState::Rejected(reason));
    }

    fn settle_promise(&mut self, promise: &ObjectRef, state: PromiseState) {
        let reactions = Self::with_record(promise, |record| {
            if !record.is_pending() {
                return Vec::new();
            }
            record.state = state.clone();
            std::mem::take(&mut record.reactions)
        })
        .unwrap_or_default();

        for reaction in reactions {
            self.microtasks.push_back(reaction_job(reaction, &state));
        }
    }

    /// Registers handlers and returns the derived promise.
    pub(crate) fn promise_then(
        &mut self,
        promise: &ObjectRef,
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
    ) -> ObjectRef {
        let derived = self.new_promise();
        let reaction = Reaction {
            on_fulfilled: on_fulfilled.filter(|f| f.is_callable()),
            on_rejected: on_rejected.filter(|f| f.is_callable()),
            derived: derived.clone(),
        };

        let settled = Self::with_record(promise, |record| {
            record.handled = true;
            match &record.state {
                PromiseState::Pending => {
                    record.reactions.push(reaction);
                    None
                }
                state => Some(reaction_job(reaction, state)),
            }
        })
        .flatten();

        if let Some(job) = settled {
            self.microtasks.push_back(job);
        }
        derived
    }

    /// The `resolve`/`reject` pair handed to executors and thenables.
    pub(crate) fn resolving_functions(&self, promise: &ObjectRef) -> (Value, Value) {
        let captures = vec![Value::Object(promise.clone())];
        (
            self.realm
                .native_with("resolve", resolve_function, captures.clone()),
            self.realm.native_with("reject", reject_function, captures),
        )
    }

    fn run_job(&mut self, job: Job) -> Result<(), Abrupt> {
        match job {
            Job::Reaction {
                handler: Some(handler),
                argument,
                derived,
                ..
            } => match self.call(&handler, Value::Undefined, vec![argument]) {
                Ok(value) => {
                    self.resolve_promise(&derived, value);
                    Ok(())
                }
                Err(Abrupt::Throw(reason)) => {
                    self.reject_promise(&derived, reason);
                    Ok(())
                }
                Err(Abrupt::Suspend) => Ok(()),
                Err(abrupt) => Err(abrupt),
            },
            Job::Reaction {
                handler: None,
                argument,
                rejected,
                derived,
            } => {
                if rejected {
                    self.reject_promise(&derived, argument);
                } else {
                    self.resolve_promise(&derived, argument);
                }
                Ok(())
            }
            Job::ResolveThenable {
                promise,
                thenable,
                then,
            } => {
                let (resolve, reject) = self.resolving_functions(&promise);
                match self.call(&then, thenable, vec![resolve, reject]) {
                    Ok(_) | Err(Abrupt::Suspend) => Ok(()),
                    Err(Abrupt::Throw(reason)) => {
                        let unlocked =
                            Self::with_record(&promise, |record| !record.locked).unwrap_or(false);
                        if unlocked {
                            self.reject_promise(&promise, reason);
                        }
                        Ok(())
                    }
                    Err(abrupt) => Err(abrupt),
                }
            }
        }
    }

    /// Runs one microtask, or failing that one timer. Returns `false` when
    /// there was nothing left to run. Pending work is abandoned once the
    /// run is cancelled.
    pub(crate) fn run_task(&mut self) -> Result<bool, Abrupt> {
        if self.microtasks.is_empty() && self.timers.is_empty() {
            return Ok(false);
        }
        if (self.cancel)() {
            return Err(Abrupt::Fatal(self.make_error("Error", CANCELLED_MESSAGE)));
        }

        if let Some(job) = self.microtasks.pop_front() {
            self.run_job(job)?;
            return Ok(true);
        }

        match self.timers.pop() {
            Some((callback, args)) => {
                match self.call(&callback, Value::Undefined, args) {
                    Ok(_) | Err(Abrupt::Suspend) => {}
                    Err(Abrupt::Throw(error)) => return Err(Abrupt::Fatal(error)),
                    Err(abrupt) => return Err(abrupt),
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn run_event_loop(&mut self) -> Result<(), Abrupt> {
        while self.run_task()? {}
        Ok(())
    }

    /// Runs tasks until `promise` settles or nothing is left to run.
    pub(crate) fn drive_until_settled(&mut self, promise: &ObjectRef) -> Result<(), Abrupt> {
        while matches!(Self::promise_state(promise), PromiseState::Pending) {
            if !self.run_task()? {
                break;
            }
        }
        Ok(())
    }

    /// `await value`. A promise that can never settle suspends the caller.
    pub(crate) fn await_value(&mut self, value: Value) -> Result<Value, Abrupt> {
        let is_thenable = value.as_object().is_some()
            && value.get("then").is_some_and(|then| then.is_callable());
        if !is_thenable {
            return Ok(value);
        }

        let promise = self.promise_resolve(value);
        Self::mark_handled(&promise);
        self.drive_until_settled(&promise)?;

        match Self::promise_state(&promise) {
            PromiseState::Fulfilled(value) => Ok(value),
            PromiseState::Rejected(reason) => Err(Abrupt::Throw(reason)),
            PromiseState::Pending => Err(Abrupt::Suspend),
        }
    }
}

fn reaction_job(reaction: Reaction, state: &PromiseState) -> Job {
    let (handler, argument, rejected) = match state {
        PromiseState::Fulfilled(value) => (reaction.on_fulfilled, value.clone(), false),
        PromiseState::Rejected(reason) => (reaction.on_rejected, reason.clone(), true),
        PromiseState::Pending => (None, Value::Undefined, false),
    };
    Job::Reaction {
        handler,
        argument,
        rejected,
        derived: reaction.derived,
    }
}

fn captured_promise(captures: &[Value]) -> Option<ObjectRef> {
    captures.first().and_then(Runtime::promise_of)
}

/// Marks the promise as resolved; `false` if it already was.
fn lock(promise: &ObjectRef) -> bool {
    Runtime::with_record(promise, |record| !std::mem::replace(&mut record.locked, true))
        .unwrap_or(false)
}

fn resolve_function(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value, Abrupt> {
    if let Some(promise) = captured_promise(captures)
        && lock(&promise)
    {
        runtime.resolve_promise(&promise, args.first().cloned().unwrap_or_default());
    }
    Ok(Value::Undefined)
}

fn reject_function(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value, Abrupt> {
    if let Some(promise) = captured_promise(captures)
        && lock(&promise)
    {
        runtime.reject_promise(&promise, args.first().cloned().unwrap_or_default());
    }
    Ok(Value::Undefined)
}

fn this_promise(runtime: &Runtime<'_>, this: &Value, method: &str) -> Result<ObjectRef, Abrupt> {
    Runtime::promise_of(this).ok_or_else(|| {
        runtime.type_error(format!(
            "Method Promise.prototype.{} called on incompatible receiver",
            method
        ))
    })
}

pub(crate) fn promise_constructor(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    let executor = match args.first() {
        Some(executor) if executor.is_callable() => executor.clone(),
        _ => return Err(runtime.type_error("Promise resolver is not a function")),
    };

    let promise = runtime.new_promise();
    let (resolve, reject) = runtime.resolving_functions(&promise);
    match runtime.call(&executor, Value::Undefined, vec![resolve, reject.clone()]) {
        Ok(_) | Err(Abrupt::Suspend) => {}
        Err(Abrupt::Throw(reason)) => {
            runtime.call(&reject, Value::Undefined, vec![reason])?;
        }
        Err(abrupt) => return Err(abrupt),
    }
    Ok(Value::Object(promise))
}

pub(crate) fn then(
    runtime: &mut Runtime<'_>,
    this: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    let promise = this_promise(runtime, this, "then")?;
    let derived = runtime.promise_then(&promise, args.first().cloned(), args.get(1).cloned());
    Ok(Value::Object(derived))
}

pub(crate) fn catch(
    runtime: &mut Runtime<'_>,
    this: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    let promise = this_promise(runtime, this, "catch")?;
    let derived = runtime.promise_then(&promise, None, args.first().cloned());
    Ok(Value::Object(derived))
}

pub(crate) fn finally(
    runtime: &mut Runtime<'_>,
    this: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    let promise = this_promise(runtime, this, "finally")?;
    let callback = args.first().cloned().unwrap_or_default();
    if !callback.is_callable() {
        return Ok(Value::Object(runtime.promise_then(&promise, None, None)));
    }

    let on_fulfilled = runtime
        .realm
        .native_with("", finally_fulfilled, vec![callback.clone()]);
    let on_rejected = runtime
        .realm
        .native_with("", finally_rejected, vec![callback]);
    let derived = runtime.promise_then(&promise, Some(on_fulfilled), Some(on_rejected));
    Ok(Value::Object(derived))
}

fn finally_fulfilled(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value, Abrupt> {
    if let Some(callback) = captures.first() {
        runtime.call(callback, Value::Undefined, Vec::new())?;
    }
    Ok(args.first().cloned().unwrap_or_default())
}

fn finally_rejected(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value, Abrupt> {
    if let Some(callback) = captures.first() {
        runtime.call(callback, Value::Undefined, Vec::new())?;
    }
    Err(Abrupt::Throw(args.first().cloned().unwrap_or_default()))
}

pub(crate) fn resolve(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    let value = args.first().cloned().unwrap_or_default();
    Ok(Value::Object(runtime.promise_resolve(value)))
}

pub(crate) fn reject(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    let promise = runtime.new_promise();
    runtime.reject_promise(&promise, args.first().cloned().unwrap_or_default());
    Ok(Value::Object(promise))
}

/// `Promise.all` over an array. Each element settles one slot of a shared
/// result array; `captures` is `[result, values, index, remaining]`.
pub(crate) fn all(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    let items = runtime.iterate(&args.first().cloned().unwrap_or_default())?;
    let result = runtime.new_promise();
    let values = runtime.new_array(vec![Value::Undefined; items.len()]);
    let remaining = runtime.new_array(vec![Value::Number(items.len() as f64)]);

    if items.is_empty() {
        runtime.resolve_promise(&result, values);
        return Ok(Value::Object(result));
    }

    for (index, item) in items.into_iter().enumerate() {
        let promise = runtime.promise_resolve(item);
        let captures = vec![
            Value::Object(result.clone()),
            values.clone(),
            Value::Number(index as f64),
            remaining.clone(),
        ];
        let on_fulfilled = runtime.realm.native_with("", all_element, captures);
        let (_, on_rejected) = runtime.resolving_functions(&result);
        runtime.promise_then(&promise, Some(on_fulfilled), Some(on_rejected));
    }

    Ok(Value::Object(result))
}

fn all_element(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value, Abrupt> {
    let [result, values, index, remaining] = captures else {
        return Ok(Value::Undefined);
    };
    let (Some(result), Some(values), Some(remaining)) = (
        result.as_object(),
        values.as_object(),
        remaining.as_object(),
    ) else {
        return Ok(Value::Undefined);
    };

    values.borrow_mut().set(
        index.to_number() as usize,
        args.first().cloned().unwrap_or_default(),
    );
    let left = remaining
        .borrow()
        .get_own(&0usize.into())
        .map(|n| n.to_number() - 1.0)
        .unwrap_or(0.0);
    remaining.borrow_mut().set(0usize, Value::Number(left));

    if left <= 0.0 {
        runtime.resolve_promise(result, Value::Object(values.clone()));
    }
    Ok(Value::Undefined)
}

fn schedule(runtime: &mut Runtime<'_>, args: &[Value], repeat: bool) -> Result<Value, Abrupt> {
    let callback = match args.first() {
        Some(callback) if callback.is_callable() => callback.clone(),
        _ => {
            return Err(runtime.type_error(
                "The \"callback\" argument must be of type function",
            ));
        }
    };
    let delay = args.get(1).map(|delay| delay.to_number()).unwrap_or(0.0);
    let extra = args.iter().skip(2).cloned().collect();

    let id = runtime.timers.schedule(callback, extra, delay, repeat);
    Ok(Value::Number(f64::from(id)))
}

pub(crate) fn set_timeout(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    schedule(runtime, args, false)
}

pub(crate) fn set_interval(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    schedule(runtime, args, true)
}

pub(crate) fn clear_timer(
    runtime: &mut Runtime<'_>,
    _: &Value,
    args: &[Value],
    _: &[Value],
) -> Result<Value, Abrupt> {
    if let Some(Value::Number(id)) = args.first() {
        runtime.timers.clear(*id as u32);
    }
    Ok(Value::Undefined)
}
