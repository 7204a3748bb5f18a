//! App façade
//!
//! The thin top-level entry point wrapping a root `Command`: wires up the
//! default `--help`/`--version` flags, drives the Initial → Before → Action
//! → After run sequence (§4.3 steps 1-8) over the lineage the parser
//! discovers, and translates the terminal error into a process exit code
//! (§7, §10.2 "one true boundary" for user-visible output).

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::binding::Occurrence;
use crate::command::Command;
use crate::context::{Context, Pattern, Timing};
use crate::error::{CliError, ExitError, Result};
use crate::flag::Flag;
use crate::fs::{FileSystem, OsFs};
use crate::lifecycle::{ActionOf, HookRegistry};
use crate::options::Options;
use crate::parser::{self, ParseOptions, ParseOutcome, ScopeOutcome};
use crate::value::BoolValue;

/// Process-wide "current app" handle, set for the duration of one `Run` and
/// cleared on return (§5, §9). Kept as a simple name/Option rather than a
/// richer handle: nothing in this crate's core needs more than "is a run in
/// flight, and whose".
static CURRENT_APP: Mutex<Option<String>> = Mutex::new(None);
static IN_RUN: AtomicBool = AtomicBool::new(false);

/// Returns the name of the `App` currently executing `run`, if any.
pub fn current_app_name() -> Option<String> {
    CURRENT_APP.lock().unwrap().clone()
}

/// RAII guard acquiring the "current app" singleton for one `Run` call;
/// released on every exit path, including early returns and panics.
struct RunGuard;

impl RunGuard {
    fn acquire(name: &str) -> Self {
        IN_RUN.store(true, Ordering::SeqCst);
        *CURRENT_APP.lock().unwrap() = Some(name.to_string());
        RunGuard
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *CURRENT_APP.lock().unwrap() = None;
        IN_RUN.store(false, Ordering::SeqCst);
    }
}

/// The declarative application entry point (§2 "App façade").
pub struct App {
    pub root: Command,
    pub version: String,
    hooks: HookRegistry,
}

impl App {
    pub fn new(root: Command) -> Self {
        App { root, version: String::new(), hooks: HookRegistry::default() }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Register a `HookBefore(pattern, handler)` (§4.3 "Hooks").
    pub fn hook_before(mut self, pattern: &str, action: ActionOf) -> Self {
        self.hooks.hook_before(Pattern::parse(pattern), action);
        self
    }

    /// Register a `HookAfter(pattern, handler)` (§4.3 "Hooks").
    pub fn hook_after(mut self, pattern: &str, action: ActionOf) -> Self {
        self.hooks.hook_after(Pattern::parse(pattern), action);
        self
    }

    /// Run against the real OS file system.
    pub async fn run(&self, argv: Vec<String>) -> i32 {
        self.run_with_fs(argv, Arc::new(OsFs)).await
    }

    /// Run against a caller-supplied file system (tests use `InMemoryFs`).
    pub async fn run_with_fs(&self, argv: Vec<String>, fs: Arc<dyn FileSystem>) -> i32 {
        let _guard = RunGuard::acquire(&self.root.name);
        let root = match apply_no_mirrors(self.root.clone()) {
            Ok(root) => root,
            Err(e) => return self.terminal(&e).await,
        };
        let root = inject_builtins(root, &self.version);
        let outcome = parser::parse(root, argv, fs, ParseOptions::default()).await;
        self.finish(outcome).await
    }

    async fn finish(&self, outcome: ParseOutcome) -> i32 {
        if let Some(err) = outcome.error {
            return self.terminal(&err).await;
        }
        let lineage = outcome.lineage;
        if lineage.is_empty() {
            return 0;
        }

        // Step 4: an `Exits` flag seen anywhere in the lineage runs its
        // Action immediately and skips the rest of the pipeline.
        for scope in lineage.iter().rev() {
            for flag in &scope.own_flags {
                if flag.options.contains(Options::EXITS) && scope.context.is_seen(&flag.name) {
                    let fctx = scope.context.child_option(
                        flag.path_segment(),
                        &flag.name,
                        flag.value.clone(),
                        flag.data.clone(),
                    );
                    return match flag.pipelines.action.run(&fctx).await {
                        Ok(()) => 0,
                        Err(e) => self.terminal(&e).await,
                    };
                }
            }
        }

        // Step 5: bubble Before, leaf to root. Every context in the lineage
        // (and anything created under it, since a child inherits its
        // parent's timing at creation) now reports `Timing::Before` to
        // `Context::at`.
        for scope in &lineage {
            scope.context.set_timing(Timing::Before);
        }
        for scope in lineage.iter().rev() {
            if let Err(e) = self.run_scope_before(scope).await {
                return self.finish_after(&lineage, Some(e)).await;
            }
        }

        // Step 6: Action on the selected (leaf) command, plus each seen
        // flag/arg at its own defining scope.
        for scope in &lineage {
            scope.context.set_timing(Timing::Action);
        }
        let leaf_err = self.run_action_phase(&lineage).await.err();

        self.finish_after(&lineage, leaf_err).await
    }

    /// Runs a scope's own flags then own args through `Before`, including
    /// the env/file fallback for unseen flags (§4.2).
    async fn run_scope_before(&self, scope: &ScopeOutcome) -> Result<()> {
        for flag in &scope.own_flags {
            resolve_fallback(&scope.context, flag);
            let fctx = scope.context.child_option(flag.path_segment(), &flag.name, flag.value.clone(), flag.data.clone());
            flag.pipelines.before.run(&fctx).await?;
            self.hooks.run_before(&fctx).await?;
        }
        for arg in &scope.args {
            let actx = scope.context.child_option(arg.path_segment(), &arg.name, arg.value.clone(), arg.data.clone());
            arg.pipelines.before.run(&actx).await?;
            self.hooks.run_before(&actx).await?;
        }
        self.hooks.run_before(&scope.context).await
    }

    async fn run_action_phase(&self, lineage: &[ScopeOutcome]) -> Result<()> {
        for scope in lineage {
            for flag in &scope.own_flags {
                self.run_target_action(&scope.context, flag.path_segment(), &flag.name, flag.options, &flag.value, &flag.pipelines.action).await?;
            }
            for arg in &scope.args {
                self.run_target_action(&scope.context, arg.path_segment(), &arg.name, arg.options, &arg.value, &arg.pipelines.action).await?;
            }
        }
        if let Some(leaf) = lineage.last() {
            leaf.pipelines.action.run(&leaf.context).await?;
        }
        Ok(())
    }

    /// Runs one Flag/Arg's Action, honoring `EachOccurrence` (one invocation
    /// per raw occurrence, each with a freshly cloned destination) and
    /// `ImpliedAction` (fire even when the value arrived implicitly) (§4.2).
    async fn run_target_action(
        &self,
        scope_ctx: &Context,
        segment: crate::context::PathSegment,
        name: &str,
        options: Options,
        value: &crate::value::ValueCell,
        action: &crate::lifecycle::Pipeline,
    ) -> Result<()> {
        let seen = scope_ctx.is_seen(name);
        let implicit = scope_ctx.is_implicitly_set(name);
        if !seen && !(implicit && options.contains(Options::IMPLIED_ACTION)) {
            return Ok(());
        }
        if action.is_empty() {
            return Ok(());
        }

        if options.contains(Options::EACH_OCCURRENCE) {
            let raw_occurrences = scope_ctx
                .binding_map()
                .map(|b| b.occurrences(name).to_vec())
                .unwrap_or_default();
            for occurrence in raw_occurrences {
                let cloned = Arc::new(Mutex::new(value.lock().unwrap().zero_clone()));
                crate::parser::bind_value(&cloned, occurrence.raw.clone(), options, true, scope_ctx.fs().as_ref())?;
                let occ_ctx = scope_ctx.child_value(Some(segment.clone()), cloned);
                action.run(&occ_ctx).await?;
            }
            Ok(())
        } else {
            let octx = scope_ctx.child_value(Some(segment), value.clone());
            action.run(&octx).await
        }
    }

    /// Step 7/8: tunnel After root-to-leaf, then translate the terminal
    /// error (the worse of the Action-phase error and any After error) to
    /// an exit code.
    async fn finish_after(&self, lineage: &[ScopeOutcome], pending: Option<CliError>) -> i32 {
        // Step 7: regardless of which phase produced `pending` (Before may
        // have failed before Action ever ran), After always reports
        // `Timing::After` to `Context::at` — scheduling anything at Before
        // or earlier from inside an After hook is, by definition, too late.
        for scope in lineage {
            scope.context.set_timing(Timing::After);
        }
        for scope in lineage {
            for flag in &scope.own_flags {
                let fctx = scope.context.child_option(flag.path_segment(), &flag.name, flag.value.clone(), flag.data.clone());
                let _ = flag.pipelines.after.run(&fctx).await;
                let _ = self.hooks.run_after(&fctx).await;
            }
            for arg in &scope.args {
                let actx = scope.context.child_option(arg.path_segment(), &arg.name, arg.value.clone(), arg.data.clone());
                let _ = arg.pipelines.after.run(&actx).await;
                let _ = self.hooks.run_after(&actx).await;
            }
            let _ = scope.pipelines.after.run(&scope.context).await;
            let _ = self.hooks.run_after(&scope.context).await;
        }

        match pending {
            Some(e) => self.terminal(&e).await,
            None => 0,
        }
    }

    /// §7 "User-visible failure": `Skip` is a silent success; everything
    /// else writes `error-message\n` to stderr and maps to its exit code.
    async fn terminal(&self, err: &CliError) -> i32 {
        if matches!(err, CliError::Skip) {
            return 0;
        }
        let _ = writeln!(std::io::stderr(), "{}", err.message());
        err.exit_code()
    }
}

/// Consults declared env vars, then file paths, for an unseen flag, binding
/// the first hit as an implicit occurrence (§4.2 "Environment/file fallback").
fn resolve_fallback(ctx: &Context, flag: &Flag) {
    let already_bound = ctx.binding_map().map(|b| b.occurrence_count(&flag.name) > 0).unwrap_or(true);
    if already_bound {
        return;
    }

    let mut raw = None;
    for name in &flag.env_vars {
        if let Ok(v) = std::env::var(name) {
            raw = Some(v);
            break;
        }
    }
    if raw.is_none() {
        for path in &flag.file_paths {
            if let Ok(content) = ctx.fs().read_to_string(path) {
                raw = Some(content.trim_end_matches('\n').to_string());
                break;
            }
        }
    }

    let Some(raw) = raw else { return };
    if crate::parser::bind_value(&flag.value, vec![raw.clone()], flag.options, true, ctx.fs().as_ref()).is_ok() {
        if let Some(mut binding) = ctx.binding_map() {
            binding.push(&flag.name, Occurrence::implicit(vec![raw]));
        }
    }
}

/// Recursively installs the built-in `--help`/`-h` and `--version`/`-V`
/// flags onto `command` and every subcommand, unless a flag of the same
/// name is already declared there (§4.3 step 2, §10.5).
/// Walks the tree applying the `No` option's setup action (§4.5): a boolean
/// flag declaring `No` gets a sibling `--no-<name>` mirror that clears the
/// shared destination back to `false`. Per the Open Question resolution in
/// DESIGN.md, `No` on a non-boolean value, or combined with `Merge`, is an
/// initialization-time invariant violation rather than a silent no-op.
fn apply_no_mirrors(mut command: Command) -> Result<Command> {
    // §4.3 step 2: `PreventSetup` on a scope skips that scope's own setup
    // actions (the `No`-mirror installation here, built-in help/version
    // injection in `inject_builtins`) without blocking descendants, which
    // get their own `PreventSetup` check on recursion.
    if !command.options.contains(Options::PREVENT_SETUP) {
        let mut mirrors = Vec::new();
        for flag in &command.flags {
            if !flag.options.contains(Options::NO) {
                continue;
            }
            if !flag.is_boolean() {
                return Err(CliError::from(crate::error::ValueError::RequiresBoolean { option: "No" }));
            }
            if flag.options.contains(Options::MERGE) {
                return Err(CliError::from(crate::error::InternalError::new(
                    flag.path_segment().to_string(),
                    crate::context::Timing::Initial,
                    "`No` cannot be combined with `Merge`",
                )));
            }
            mirrors.push(no_mirror_flag(flag));
        }
        command.flags.extend(mirrors);
    }

    let mut subcommands = Vec::with_capacity(command.subcommands.len());
    for sub in command.subcommands {
        subcommands.push(apply_no_mirrors(sub)?);
    }
    command.subcommands = subcommands;
    Ok(command)
}

/// Builds the `--no-<name>` mirror for a boolean flag with `No` set: an
/// independent, non-persistent boolean flag whose Action forces the
/// original flag's shared value cell back to `false` when seen.
fn no_mirror_flag(original: &Flag) -> Flag {
    let original_name = original.name.clone();
    Flag::new(format!("no-{}", original.name))
        .help(format!("set --{} to false", original.name))
        .options(Options::NON_PERSISTENT)
        .value(BoolValue::default())
        .action(ActionOf::from_sync(move |ctx| {
            if let Some(parent) = ctx.parent() {
                if let Some(cell) = parent.value_cell(&original_name) {
                    let mut guard = cell.lock().unwrap();
                    if let Some(b) = guard.as_any_mut().downcast_mut::<BoolValue>() {
                        b.0 = false;
                    }
                }
            }
            Ok(())
        }))
}

fn inject_builtins(mut command: Command, version: &str) -> Command {
    if !command.options.contains(Options::PREVENT_SETUP) {
        if command.find_flag("help").is_none() {
            command = command.flag(help_flag(&command));
        }
        if !version.is_empty() && command.find_flag("version").is_none() {
            command = command.flag(version_flag(&command, version));
        }
    }
    command.subcommands = command.subcommands.into_iter().map(|c| inject_builtins(c, version)).collect();
    command
}

fn help_flag(command: &Command) -> Flag {
    let rendered = render_help(command);
    Flag::new("help")
        .short('h')
        .help("show help")
        .options(Options::EXITS | Options::NON_PERSISTENT)
        .value(BoolValue::default())
        .action(ActionOf::from_sync(move |_ctx| Err(CliError::from(ExitError::new(0, rendered.clone())))))
}

fn version_flag(command: &Command, version: &str) -> Flag {
    let text = format!("{} version {}", command.name, version);
    Flag::new("version")
        .short('V')
        .help("print the version")
        .options(Options::EXITS | Options::NON_PERSISTENT)
        .value(BoolValue::default())
        .action(ActionOf::from_sync(move |_ctx| Err(CliError::from(ExitError::new(0, text.clone())))))
}

/// The minimal built-in renderer (§10.5): a usage line plus a flat options
/// list, walking only the metadata the core already tracks. No template
/// configurability; richer output is an external collaborator's job (§6).
/// Resolves the `Hidden`/`Visible`/`DisableAutoVisibility` triad (§4.5) for
/// one target: an explicit `Visible` always wins, an explicit `Hidden`
/// always loses, and otherwise a target with no help text is auto-hidden
/// unless `DisableAutoVisibility` is set on it.
fn is_visible(options: Options, help_text: &str) -> bool {
    if options.contains(Options::VISIBLE) {
        return true;
    }
    if options.contains(Options::HIDDEN) {
        return false;
    }
    !help_text.is_empty() || options.contains(Options::DISABLE_AUTO_VISIBILITY)
}

fn render_help(command: &Command) -> String {
    let visible_flags: Vec<&Flag> =
        command.flags.iter().filter(|f| is_visible(f.options, &f.help_text)).collect();
    let visible_subs: Vec<&Command> =
        command.subcommands.iter().filter(|c| is_visible(c.options, &c.help_text)).collect();

    let mut sorted_flags: Vec<&Flag> = visible_flags;
    if command.options.contains(Options::SORTED_FLAGS) {
        sorted_flags.sort_by(|a, b| a.name.cmp(&b.name));
    }
    let mut sorted_subs: Vec<&Command> = visible_subs;
    if command.options.contains(Options::SORTED_COMMANDS) {
        sorted_subs.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let mut out = String::new();
    out.push_str(&format!("usage: {}", command.name));
    if !sorted_flags.is_empty() {
        out.push_str(" [flags]");
    }
    for arg in &command.args {
        out.push_str(&format!(" <{}>", arg.name));
    }
    if !sorted_subs.is_empty() {
        out.push_str(" <command>");
    }
    out.push('\n');

    if !command.help_text.is_empty() {
        out.push('\n');
        out.push_str(&command.help_text);
        out.push('\n');
    }

    if !sorted_flags.is_empty() {
        out.push_str("\nflags:\n");
        for flag in sorted_flags {
            let short = flag.short_aliases.first().map(|c| format!("-{c}, ")).unwrap_or_default();
            out.push_str(&format!("  {short}--{:<20} {}\n", flag.name, flag.help_text));
        }
    }

    if !sorted_subs.is_empty() {
        out.push_str("\ncommands:\n");
        for sub in sorted_subs {
            out.push_str(&format!("  {:<22} {}\n", sub.name, sub.help_text));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg::Arg;
    use crate::fs::InMemoryFs;
    use crate::value::StringValue;

    fn fs() -> Arc<dyn FileSystem> {
        Arc::new(InMemoryFs::new())
    }

    #[tokio::test]
    async fn s1_subcommand_and_bool_flag_end_to_end() {
        let root = Command::new("app")
            .flag(Flag::new("global").value(BoolValue::default()))
            .subcommand(Command::new("sub").flag(Flag::new("flag1").value(BoolValue::default())));
        let app = App::new(root);
        let code = app.run_with_fs(vec!["sub".to_string(), "--flag1".to_string()], fs()).await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn s2_unexpected_positional_exits_with_code_2() {
        let root = Command::new("app").arg(Arg::new("only"));
        let app = App::new(root);
        let code = app.run_with_fs(vec!["a".to_string(), "b".to_string(), "c".to_string()], fs()).await;
        assert_eq!(code, 2);
    }

    #[tokio::test]
    async fn s5_help_flag_exits_zero() {
        let root = Command::new("app");
        let app = App::new(root);
        let code = app.run_with_fs(vec!["--help".to_string()], fs()).await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn s4_env_fallback_marks_implicitly_set() {
        std::env::set_var("ARGTREE_TEST_HOST", "h1");
        let seen = Arc::new(Mutex::new((false, false, String::new())));
        let seen_clone = seen.clone();
        let root = Command::new("app").flag(
            Flag::new("host")
                .value(StringValue::default())
                .env("ARGTREE_TEST_HOST")
                .action(ActionOf::from_sync(move |ctx| {
                    let mut s = seen_clone.lock().unwrap();
                    s.0 = ctx.is_seen("host");
                    s.1 = ctx.is_implicitly_set("host");
                    s.2 = ctx.value_display("").unwrap_or_default();
                    Ok(())
                }))
                .options(Options::IMPLIED_ACTION),
        );
        let app = App::new(root);
        let code = app.run_with_fs(Vec::new(), fs()).await;
        std::env::remove_var("ARGTREE_TEST_HOST");
        assert_eq!(code, 0);
        let (_, implicit, value) = seen.lock().unwrap().clone();
        assert!(implicit);
        assert_eq!(value, "h1");
    }

    #[tokio::test]
    async fn s6_each_occurrence_runs_action_per_occurrence_then_final_value() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let root = Command::new("app").flag(
            Flag::new("a")
                .value(StringValue::default())
                .options(Options::EACH_OCCURRENCE)
                .action(ActionOf::from_sync(move |ctx| {
                    log_clone.lock().unwrap().push(ctx.value_display("").unwrap_or_default());
                    Ok(())
                })),
        );
        let app = App::new(root);
        let code = app
            .run_with_fs(vec!["--a".to_string(), "first".to_string(), "--a".to_string(), "last".to_string()], fs())
            .await;
        assert_eq!(code, 0);
        assert_eq!(*log.lock().unwrap(), vec!["first".to_string(), "last".to_string()]);
    }

    #[test]
    fn inject_builtins_skips_existing_help_flag() {
        let root = Command::new("app").flag(Flag::new("help").value(BoolValue::default()));
        let injected = inject_builtins(root, "1.0.0");
        assert_eq!(injected.flags.iter().filter(|f| f.name == "help").count(), 1);
    }

    #[test]
    fn prevent_setup_skips_builtin_help_and_version_injection() {
        let root = Command::new("app").options(Options::PREVENT_SETUP);
        let injected = inject_builtins(root, "1.0.0");
        assert!(injected.flags.is_empty());
    }

    #[test]
    fn prevent_setup_does_not_block_a_subcommand_s_own_setup() {
        let root = Command::new("app")
            .options(Options::PREVENT_SETUP)
            .subcommand(Command::new("sub"));
        let injected = inject_builtins(root, "1.0.0");
        assert!(injected.flags.is_empty());
        let sub = injected.subcommands.iter().find(|c| c.name == "sub").unwrap();
        assert!(sub.find_flag("help").is_some());
    }

    #[test]
    fn prevent_setup_skips_no_mirror_installation() {
        let root = Command::new("app")
            .options(Options::PREVENT_SETUP)
            .flag(Flag::new("color").value(BoolValue::default()).options(Options::NO));
        let applied = apply_no_mirrors(root).unwrap();
        assert!(applied.flags.iter().all(|f| f.name != "no-color"));
    }

    #[tokio::test]
    async fn no_mirror_clears_a_set_boolean_flag() {
        let root = Command::new("app").flag(
            Flag::new("color").value(BoolValue::default()).options(Options::NO),
        );
        let app = App::new(root);
        let code = app
            .run_with_fs(vec!["--color".to_string(), "--no-color".to_string()], fs())
            .await;
        assert_eq!(code, 0);
    }

    #[test]
    fn no_on_a_non_boolean_flag_is_rejected() {
        let root = Command::new("app").flag(
            Flag::new("name").value(StringValue::default()).options(Options::NO),
        );
        assert!(apply_no_mirrors(root).is_err());
    }

    #[test]
    fn no_combined_with_merge_is_rejected() {
        let root = Command::new("app").flag(
            Flag::new("v").value(BoolValue::default()).options(Options::NO | Options::MERGE),
        );
        assert!(apply_no_mirrors(root).is_err());
    }

    #[test]
    fn render_help_hides_flags_with_no_help_text_by_default() {
        let root = Command::new("app")
            .flag(Flag::new("documented").help("explained"))
            .flag(Flag::new("undocumented"));
        let rendered = render_help(&root);
        assert!(rendered.contains("--documented"));
        assert!(!rendered.contains("--undocumented"));
    }

    #[test]
    fn render_help_respects_explicit_visible_override() {
        let root = Command::new("app").flag(Flag::new("undocumented").options(Options::VISIBLE));
        let rendered = render_help(&root);
        assert!(rendered.contains("--undocumented"));
    }

    #[test]
    fn render_help_sorts_flags_when_requested() {
        let root = Command::new("app")
            .flag(Flag::new("zeta").help("z"))
            .flag(Flag::new("alpha").help("a"))
            .options(Options::SORTED_FLAGS);
        let rendered = render_help(&root);
        assert!(rendered.find("--alpha").unwrap() < rendered.find("--zeta").unwrap());
    }
}
