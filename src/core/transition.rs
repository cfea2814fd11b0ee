//! Status transition engine
//!
//! A [`StateMachine`] maps `(from, to)` pairs to [`Action`]s and target
//! statuses to hooks. Actions may call [`StateMachine::execute`] again on the
//! same context, e.g. to redirect `RUNNING -> SUCCESS` to `RUNNING -> FAILURE`.
//! The hook of the status a chain finally settles on fires exactly once, after
//! the outermost call unwinds.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// A named status; two statuses are equal when their names are
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Status(String);

impl Status {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Status {
    fn from(name: &str) -> Self {
        Status::new(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition {
    pub from: Status,
    pub to: Status,
}

impl Transition {
    pub fn new(from: impl Into<Status>, to: impl Into<Status>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[derive(Debug, Error)]
pub enum SmError {
    #[error("transition {0} is already registered")]
    TransitionExisted(Transition),
}

/// Mutable state threaded through one transition chain
#[derive(Debug)]
pub struct Context<T> {
    pub current: Option<Status>,
    pub to: Option<Status>,
    pub error: Option<anyhow::Error>,
    /// Suppresses the target hook of the chain in progress
    pub skip: bool,
    pub data: T,
    depth: usize,
    settled: Option<Status>,
}

impl<T> Context<T> {
    pub fn new(data: T) -> Self {
        Self {
            current: None,
            to: None,
            error: None,
            skip: false,
            data,
            depth: 0,
            settled: None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }
}

/// Body of one transition
pub trait Action<T>: Send + Sync {
    fn can_run(&self, _ctx: &Context<T>) -> bool {
        true
    }

    fn accept(&self, sm: &StateMachine<T>, ctx: &mut Context<T>) -> anyhow::Result<()>;

    fn on_exception(&self, _sm: &StateMachine<T>, err: anyhow::Error, ctx: &mut Context<T>) {
        warn!(
            "Transition {} -> {} failed: {:#}",
            status_name(&ctx.current),
            status_name(&ctx.to),
            err
        );
        ctx.error = Some(err);
    }

    fn on_finally(&self, _ctx: &mut Context<T>) {}
}

/// Adapts a closure into an [`Action`] with default callbacks
pub struct FnAction<F>(pub F);

impl<T, F> Action<T> for FnAction<F>
where
    F: Fn(&StateMachine<T>, &mut Context<T>) -> anyhow::Result<()> + Send + Sync,
{
    fn accept(&self, sm: &StateMachine<T>, ctx: &mut Context<T>) -> anyhow::Result<()> {
        (self.0)(sm, ctx)
    }
}

pub fn action_fn<T, F>(f: F) -> FnAction<F>
where
    F: Fn(&StateMachine<T>, &mut Context<T>) -> anyhow::Result<()> + Send + Sync,
{
    FnAction(f)
}

pub type Hook<T> = Arc<dyn Fn(&mut Context<T>) + Send + Sync>;

/// Transition table for one status domain.
///
/// Registration happens before the first `execute`; afterwards the machine is
/// read-only and can be shared. A [`Context`] belongs to one chain at a time.
pub struct StateMachine<T> {
    name: String,
    actions: HashMap<Status, HashMap<Status, Box<dyn Action<T>>>>,
    hooks: HashMap<Status, Hook<T>>,
}

impl<T> StateMachine<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: HashMap::new(),
            hooks: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add<A>(&mut self, transition: Transition, action: A) -> Result<(), SmError>
    where
        A: Action<T> + 'static,
    {
        let targets = self.actions.entry(transition.from.clone()).or_default();
        if targets.contains_key(&transition.to) {
            return Err(SmError::TransitionExisted(transition));
        }
        targets.insert(transition.to, Box::new(action));
        Ok(())
    }

    /// Register one hook for every status in `targets`
    pub fn add_hook(&mut self, hook: Hook<T>, targets: &[Status]) {
        for target in targets {
            if self.hooks.insert(target.clone(), hook.clone()).is_some() {
                debug!("[{}] Replaced hook for {}", self.name, target);
            }
        }
    }

    pub fn has_transition(&self, from: &Status, to: &Status) -> bool {
        self.actions.get(from).is_some_and(|t| t.contains_key(to))
    }

    /// Run the `current -> target` action.
    ///
    /// Unknown transitions are logged and ignored. Errors from `accept` go to
    /// the action's `on_exception`; `on_finally` always runs afterwards.
    pub fn execute(&self, current: &Status, target: &Status, ctx: &mut Context<T>) {
        if ctx.depth == 0 {
            ctx.skip = false;
            ctx.settled = None;
        }

        ctx.current = Some(current.clone());
        ctx.to = Some(target.clone());

        let Some(action) = self.actions.get(current).and_then(|t| t.get(target)) else {
            debug!("[{}] No transition {} -> {}, ignored", self.name, current, target);
            return;
        };

        if !action.can_run(ctx) {
            debug!("[{}] Transition {} -> {} cannot run", self.name, current, target);
            return;
        }

        ctx.settled = Some(target.clone());
        {
            let mut nested = Nested::enter(ctx);
            let ctx = &mut *nested.ctx;
            if let Err(err) = action.accept(self, ctx) {
                action.on_exception(self, err, ctx);
            }
            action.on_finally(ctx);
        }

        if ctx.depth > 0 {
            return;
        }

        let Some(settled) = ctx.settled.take() else {
            return;
        };
        if ctx.skip {
            debug!("[{}] Hook for {} skipped", self.name, settled);
            return;
        }
        if let Some(hook) = self.hooks.get(&settled) {
            ctx.to = Some(settled);
            hook(ctx);
        }
    }
}

/// Keeps `Context::depth` balanced even when an action panics
struct Nested<'a, T> {
    ctx: &'a mut Context<T>,
}

impl<'a, T> Nested<'a, T> {
    fn enter(ctx: &'a mut Context<T>) -> Self {
        ctx.depth += 1;
        Self { ctx }
    }
}

impl<T> Drop for Nested<'_, T> {
    fn drop(&mut self) {
        self.ctx.depth -= 1;
    }
}

fn status_name(status: &Option<Status>) -> &str {
    status.as_ref().map(Status::name).unwrap_or("?")
}
