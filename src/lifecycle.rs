//! Lifecycle Executor
//!
//! The four-phase pipeline (`Initial`, `Before`, `Action`, `After`) and the
//! two traversal primitives, `tunnel` and `bubble`, that drive it over a
//! command lineage (§4.3). Also hosts the shape-normalizing `ActionOf`/
//! `EvaluateOf` adapters (§9 "Action-of-many-shapes", "Evaluator-of-many-
//! shapes") and the pattern-filtered hook registry (§4.3 "Hooks").
//!
//! Actions are modeled as `async fn(&Context) -> Result<()>` rather than
//! plain closures: the teacher's command dispatch (`src/interpreter/
//! executor.rs`) is itself `async_trait`-based despite running almost
//! entirely synchronously, because a user Action may legitimately await I/O
//! or a cancellation signal (§5).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, Pattern, Timing};
use crate::error::{CliError, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single normalized lifecycle step. Wraps whichever of the accepted
/// "action shapes" (§9) the caller supplied.
#[derive(Clone)]
pub struct ActionOf {
    inner: Arc<dyn Fn(Context) -> BoxFuture<'static, Result<()>> + Send + Sync>,
}

impl fmt::Debug for ActionOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionOf(..)")
    }
}

impl ActionOf {
    /// A no-op step; the zero value of the pipeline.
    pub fn noop() -> Self {
        ActionOf { inner: Arc::new(|_ctx| Box::pin(async { Ok(()) })) }
    }

    /// Wraps a plain synchronous callable taking only the Context.
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<()> + Send + Sync + 'static,
    {
        ActionOf { inner: Arc::new(move |ctx| {
            let result = f(&ctx);
            Box::pin(async move { result })
        }) }
    }

    /// Wraps an async callable taking the Context by value (cheap: `Context`
    /// is an `Arc` handle).
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        ActionOf { inner: Arc::new(move |ctx| Box::pin(f(ctx))) }
    }

    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        (self.inner)(ctx.clone()).await
    }
}

impl Default for ActionOf {
    fn default() -> Self {
        ActionOf::noop()
    }
}

/// An expression-operator evaluator normalized to its canonical shape:
/// `(Context, raw tokens, yield) -> Result<()>`. Bool predicates and void
/// functions (§9) are adapted onto this with `from_predicate`/`from_void`.
#[derive(Clone)]
pub struct EvaluateOf {
    inner: Arc<
        dyn Fn(Context, Vec<String>, &mut dyn FnMut(&Context) -> Result<()>) -> Result<()>
            + Send
            + Sync,
    >,
}

impl fmt::Debug for EvaluateOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EvaluateOf(..)")
    }
}

impl EvaluateOf {
    /// The canonical shape: explicitly decides whether to yield.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Context, Vec<String>, &mut dyn FnMut(&Context) -> Result<()>) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        EvaluateOf { inner: Arc::new(f) }
    }

    /// Yields exactly when the predicate returns true.
    pub fn from_predicate<F>(f: F) -> Self
    where
        F: Fn(&Context, &[String]) -> Result<bool> + Send + Sync + 'static,
    {
        EvaluateOf::from_fn(move |ctx, raw, yield_fn| {
            if f(&ctx, &raw)? {
                yield_fn(&ctx)?;
            }
            Ok(())
        })
    }

    /// Always yields after running a side-effecting step (a "transform").
    pub fn from_void<F>(f: F) -> Self
    where
        F: Fn(&Context, &[String]) -> Result<()> + Send + Sync + 'static,
    {
        EvaluateOf::from_fn(move |ctx, raw, yield_fn| {
            f(&ctx, &raw)?;
            yield_fn(&ctx)
        })
    }

    pub fn evaluate(
        &self,
        ctx: &Context,
        raw: Vec<String>,
        yield_fn: &mut dyn FnMut(&Context) -> Result<()>,
    ) -> Result<()> {
        (self.inner)(ctx.clone(), raw, yield_fn)
    }
}

/// An ordered list of steps run for one timing on one target.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<ActionOf>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn push(&mut self, action: ActionOf) {
        self.steps.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(&self, ctx: &Context) -> Result<()> {
        for step in &self.steps {
            step.execute(ctx).await?;
        }
        Ok(())
    }
}

/// The four pipelines every target (Command/Flag/Arg/Expr) carries (§4.3).
#[derive(Clone, Default, Debug)]
pub struct Pipelines {
    pub initial: Pipeline,
    pub before: Pipeline,
    pub action: Pipeline,
    pub after: Pipeline,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline({} steps)", self.steps.len())
    }
}

impl Pipelines {
    pub fn pipeline(&self, timing: Timing) -> &Pipeline {
        match timing {
            Timing::Initial => &self.initial,
            Timing::Before => &self.before,
            Timing::Action => &self.action,
            Timing::After => &self.after,
        }
    }

    pub fn pipeline_mut(&mut self, timing: Timing) -> &mut Pipeline {
        match timing {
            Timing::Initial => &mut self.initial,
            Timing::Before => &mut self.before,
            Timing::Action => &mut self.action,
            Timing::After => &mut self.after,
        }
    }

    pub fn push(&mut self, timing: Timing, action: ActionOf) {
        self.pipeline_mut(timing).push(action);
    }
}

/// `Tunnel` (§4.3): root-to-leaf. Every node but the last runs `ancestor_fn`;
/// the last (the selected command/target) runs `leaf_fn`. Used for
/// `Initial` and `After`.
pub async fn tunnel<F1, F2, Fut>(lineage: &[Context], ancestor_fn: F1, leaf_fn: F2) -> Result<()>
where
    F1: Fn(&Context) -> Fut,
    F2: Fn(&Context) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let Some((leaf, ancestors)) = lineage.split_last() else {
        return Ok(());
    };
    for ctx in ancestors {
        ancestor_fn(ctx).await?;
    }
    leaf_fn(leaf).await
}

/// `Bubble` (§4.3): leaf-to-root. The starting node (the last element of
/// `lineage`) runs `self_fn`; each ancestor, nearest first, runs
/// `ancestor_fn`. Used for `Before`.
pub async fn bubble<F1, F2, Fut>(lineage: &[Context], self_fn: F1, ancestor_fn: F2) -> Result<()>
where
    F1: Fn(&Context) -> Fut,
    F2: Fn(&Context) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let Some((leaf, ancestors)) = lineage.split_last() else {
        return Ok(());
    };
    self_fn(leaf).await?;
    for ctx in ancestors.iter().rev() {
        ancestor_fn(ctx).await?;
    }
    Ok(())
}

/// A pattern-filtered hook registered via `HookBefore`/`HookAfter` (§4.3).
/// Order of registration is preserved within a timing.
#[derive(Clone, Default)]
pub struct HookRegistry {
    before: Vec<(Pattern, ActionOf)>,
    after: Vec<(Pattern, ActionOf)>,
}

impl HookRegistry {
    pub fn hook_before(&mut self, pattern: Pattern, action: ActionOf) {
        self.before.push((pattern, action));
    }

    pub fn hook_after(&mut self, pattern: Pattern, action: ActionOf) {
        self.after.push((pattern, action));
    }

    pub async fn run_before(&self, ctx: &Context) -> Result<()> {
        for (pattern, action) in &self.before {
            if ctx.matches(pattern) {
                action.execute(ctx).await?;
            }
        }
        Ok(())
    }

    pub async fn run_after(&self, ctx: &Context) -> Result<()> {
        for (pattern, action) in &self.after {
            if ctx.matches(pattern) {
                action.execute(ctx).await?;
            }
        }
        Ok(())
    }
}

/// Validates a `Context.At(timing, ...)` request (§4.3 "Timing-too-late").
/// Scheduling strictly in the past is rejected; equal or future timing is
/// the caller's to run inline or enqueue.
pub fn check_timing(current: Timing, requested: Timing) -> Result<()> {
    if requested < current {
        Err(CliError::TimingTooLate(requested))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    fn lineage(fs: StdArc<dyn crate::fs::FileSystem>, names: &[&str]) -> Vec<Context> {
        let root = Context::root(fs);
        let mut out = vec![root.clone()];
        let mut cur = root;
        for name in names {
            cur = cur.child_command(name, indexmap::IndexMap::new(), indexmap::IndexMap::new());
            out.push(cur.clone());
        }
        out
    }

    #[tokio::test]
    async fn tunnel_runs_root_to_leaf() {
        let fs: StdArc<dyn crate::fs::FileSystem> = StdArc::new(InMemoryFs::new());
        let chain = lineage(fs, &["a", "b"]);
        let log = StdArc::new(StdMutex::new(Vec::new()));
        let log_a = log.clone();
        let log_l = log.clone();
        tunnel(
            &chain,
            move |ctx| {
                let log = log_a.clone();
                let path = ctx.path().to_string();
                async move {
                    log.lock().unwrap().push(path);
                    Ok(())
                }
            },
            move |ctx| {
                let log = log_l.clone();
                let path = ctx.path().to_string();
                async move {
                    log.lock().unwrap().push(format!("leaf:{path}"));
                    Ok(())
                }
            },
        )
        .await
        .unwrap();
        let recorded = log.lock().unwrap().clone();
        assert_eq!(recorded, vec!["".to_string(), "a".to_string(), "leaf:a b".to_string()]);
    }

    #[tokio::test]
    async fn bubble_runs_leaf_to_root() {
        let fs: StdArc<dyn crate::fs::FileSystem> = StdArc::new(InMemoryFs::new());
        let chain = lineage(fs, &["a", "b"]);
        let log = StdArc::new(StdMutex::new(Vec::new()));
        let log_s = log.clone();
        let log_a = log.clone();
        bubble(
            &chain,
            move |ctx| {
                let log = log_s.clone();
                let path = ctx.path().to_string();
                async move {
                    log.lock().unwrap().push(format!("self:{path}"));
                    Ok(())
                }
            },
            move |ctx| {
                let log = log_a.clone();
                let path = ctx.path().to_string();
                async move {
                    log.lock().unwrap().push(path);
                    Ok(())
                }
            },
        )
        .await
        .unwrap();
        let recorded = log.lock().unwrap().clone();
        assert_eq!(recorded, vec!["self:a b".to_string(), "a".to_string(), "".to_string()]);
    }

    #[tokio::test]
    async fn pipeline_runs_steps_in_order() {
        let fs: StdArc<dyn crate::fs::FileSystem> = StdArc::new(InMemoryFs::new());
        let ctx = Context::root(fs);
        let log = StdArc::new(StdMutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        for i in 0..3 {
            let log = log.clone();
            pipeline.push(ActionOf::from_sync(move |_ctx| {
                log.lock().unwrap().push(i);
                Ok(())
            }));
        }
        pipeline.run(&ctx).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn hook_registry_filters_by_pattern() {
        let fs: StdArc<dyn crate::fs::FileSystem> = StdArc::new(InMemoryFs::new());
        let chain = lineage(fs, &["sub"]);
        let leaf = chain.last().unwrap();
        let log = StdArc::new(StdMutex::new(Vec::new()));
        let mut hooks = HookRegistry::default();
        let log1 = log.clone();
        hooks.hook_before(Pattern::parse("sub"), ActionOf::from_sync(move |_| {
            log1.lock().unwrap().push("matched");
            Ok(())
        }));
        let log2 = log.clone();
        hooks.hook_before(Pattern::parse("other"), ActionOf::from_sync(move |_| {
            log2.lock().unwrap().push("unmatched");
            Ok(())
        }));
        hooks.run_before(leaf).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["matched"]);
    }

    #[test]
    fn timing_too_late_rejects_past_requests() {
        assert!(check_timing(Timing::Action, Timing::Before).is_err());
        assert!(check_timing(Timing::Before, Timing::Before).is_ok());
        assert!(check_timing(Timing::Before, Timing::After).is_ok());
    }
}
