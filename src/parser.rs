//! Parser
//!
//! The left-to-right argument scanner (§4.2): flag resolution (long name,
//! short name, boolean cluster), subcommand dispatch, positional binding
//! (with right-to-left reassignment when `RightToLeft` is set), and the
//! expression-operator sub-parse for `Expression`-typed Args.
//!
//! Interleaves parsing with the `Initial` tunnel (§4.3 run sequence steps
//! 2-3): the selected command lineage cannot be known before the matching
//! subcommand tokens are scanned, so each scope's `Initial` pipeline runs
//! the moment that scope is entered during the same recursive descent that
//! binds its tokens, rather than as a separate up-front pass (documented
//! as an explicit Open Question resolution in the design ledger).

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::arg::Arg;
use crate::binding::{BindingMap, Occurrence};
use crate::command::Command;
use crate::context::Context;
use crate::error::{CliError, ErrorCode, ParseError};
use crate::expr::{BoundExpr, Expr, Expression};
use crate::flag::Flag;
use crate::fs::FileSystem;
use crate::lifecycle::{BoxFuture, Pipelines};
use crate::options::Options;
use crate::token::{classify, Token};
use crate::value::ValueCell;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// §9 "Robust-parse mode": store the first error on the outcome instead
    /// of aborting, so completion/help tooling can inspect partial input.
    pub robust: bool,
}

/// One resolved scope in the selected command lineage: its live Context
/// (already carrying the resolved value table), its visible flags (own
/// plus inherited persistent ones, sharing the ancestor's value cell), its
/// own declared args, and the owning Command's own pipelines/options so the
/// App façade can drive Before/Action/After without re-walking the tree.
pub struct ScopeOutcome {
    pub context: Context,
    pub command_name: String,
    pub flags: Vec<Flag>,
    /// Just this scope's own declared flags, excluding flags inherited from
    /// a persistent ancestor — used to run a persistent flag's Before/Action
    /// exactly once, at its defining scope (§4.3 "persistent flags only at
    /// their defining scope").
    pub own_flags: Vec<Flag>,
    pub args: Vec<Arg>,
    pub pipelines: Pipelines,
    pub options: Options,
}

pub struct ParseOutcome {
    pub lineage: Vec<ScopeOutcome>,
    pub error: Option<CliError>,
}

/// Entry point: parse `argv` (program name already elided) against `root`.
pub async fn parse(root: Command, argv: Vec<String>, fs: Arc<dyn FileSystem>, opts: ParseOptions) -> ParseOutcome {
    let root_ctx = Context::root(fs.clone());
    descend(root, Vec::new(), argv, root_ctx, fs, opts).await
}

fn descend(
    command: Command,
    ancestors: Vec<Command>,
    tokens: Vec<String>,
    parent_ctx: Context,
    fs: Arc<dyn FileSystem>,
    opts: ParseOptions,
) -> BoxFuture<'static, ParseOutcome> {
    Box::pin(async move {
        let ancestor_refs: Vec<&Command> = ancestors.iter().collect();
        let visible_flags = command.visible_flags(&ancestor_refs);

        let mut values: IndexMap<String, ValueCell> = IndexMap::new();
        for flag in &visible_flags {
            values.insert(flag.name.clone(), flag.value.clone());
        }
        for arg in &command.args {
            values.insert(arg.name.clone(), arg.value.clone());
        }

        let ctx = parent_ctx.child_command(&command.name, values, command.data.clone());

        if let Err(e) = command.pipelines.initial.run(&ctx).await {
            return ParseOutcome { lineage: Vec::new(), error: Some(e) };
        }

        let mut scan = Scan {
            flags: visible_flags.clone(),
            binding: BindingMap::new(),
            positionals: Vec::new(),
            flags_locked: false,
            disallow_flags_after_args: command.options.contains(Options::DISALLOW_FLAGS_AFTER_ARGS),
            fs: fs.clone(),
        };

        // §4.2 "Expression pipeline parse": at most one of a command's Args
        // may be Expression-typed. Once every ordinary positional slot ahead
        // of it has its minimum satisfied, the remainder of the token stream
        // belongs to the expression sub-parser rather than to flag/positional
        // classification (operator tokens like `-multi` would otherwise be
        // misread as unknown flags).
        let expr_split = command.args.iter().position(|a| a.is_expression());
        let positionals_before_expr = match expr_split {
            Some(idx) => command.args[..idx].iter().map(|a| a.counter.min()).sum::<usize>(),
            None => usize::MAX,
        };

        let mut i = 0;
        // §4.2 step 1: `SkipFlagParsing` is equivalent to an injected `--`
        // ahead of the program name — every token in this scope is read as
        // positional from the start, never as a flag or subcommand name.
        let mut positional_mode = command.options.contains(Options::SKIP_FLAG_PARSING);
        let mut subcommand_dispatch: Option<(Command, Vec<String>)> = None;
        let mut expr_raw_tokens: Option<Vec<String>> = None;

        while i < tokens.len() {
            // Every ordinary positional ahead of the Expression arg is
            // satisfied: the rest of this scope's tokens are expression
            // operators, not further flags, subcommands, or positionals —
            // an operator name like `-multi` would otherwise be misread as
            // an unknown short flag cluster.
            if expr_split.is_some() && !positional_mode && scan.positionals.len() >= positionals_before_expr {
                expr_raw_tokens = Some(tokens[i..].to_vec());
                break;
            }

            let raw_tok = &tokens[i];

            if !positional_mode && raw_tok == "--" {
                positional_mode = true;
                i += 1;
                continue;
            }

            if !positional_mode && scan.flags_locked {
                // §4.5 `DisallowFlagsAfterArgs`: once a positional has been
                // taken, a token that still looks like a flag is a hard
                // error rather than a silently-accepted positional.
                if matches!(classify(raw_tok), Token::LongFlag { .. } | Token::ShortCluster { .. }) {
                    return finish_with_error(
                        ParseError::new(ErrorCode::FlagUsedAfterArgs)
                            .with_item(raw_tok.clone())
                            .with_remaining(tokens[i..].to_vec())
                            .into(),
                        opts,
                        Some(partial_scope(&ctx, &command, &scan)),
                    );
                }
            } else if !positional_mode {
                match classify(raw_tok) {
                    Token::EndOfFlags => {
                        positional_mode = true;
                        i += 1;
                        continue;
                    }
                    Token::LongFlag { name, inline_value } => {
                        i += 1;
                        if let Err(e) = scan.bind_long(&name, inline_value, &tokens, &mut i) {
                            return finish_with_error(e, opts, Some(partial_scope(&ctx, &command, &scan)));
                        }
                        continue;
                    }
                    Token::ShortCluster { chars, inline_value } => {
                        i += 1;
                        if let Err(e) = scan.bind_short_cluster(&chars, inline_value, &tokens, &mut i) {
                            return finish_with_error(e, opts, Some(partial_scope(&ctx, &command, &scan)));
                        }
                        continue;
                    }
                    Token::Bareword(_) => {}
                }
            }

            // Not a flag (or flags are locked/disallowed here): either a
            // subcommand name (only before any positional has been taken)
            // or a positional token.
            if !positional_mode && scan.positionals.is_empty() && !command.subcommands.is_empty() {
                if let Some(sub) = command.find_subcommand(raw_tok) {
                    subcommand_dispatch = Some((sub.clone(), tokens[i + 1..].to_vec()));
                    break;
                }
                if command.args.is_empty() {
                    return finish_with_error(
                        ParseError::new(ErrorCode::CommandNotFound)
                            .with_item(raw_tok.clone())
                            .with_remaining(tokens[i..].to_vec())
                            .into(),
                        opts,
                        Some(partial_scope(&ctx, &command, &scan)),
                    );
                }
            }

            if command.args.is_empty() {
                return finish_with_error(
                    ParseError::new(ErrorCode::UnexpectedArgument)
                        .with_value(raw_tok.clone())
                        .with_remaining(tokens[i + 1..].to_vec())
                        .into(),
                    opts,
                    Some(partial_scope(&ctx, &command, &scan)),
                );
            }

            scan.positionals.push(raw_tok.clone());
            i += 1;
            if scan.disallow_flags_after_args {
                scan.flags_locked = true;
            }
        }

        if subcommand_dispatch.is_none() {
            let bind_args: &[Arg] = match expr_split {
                Some(idx) if expr_raw_tokens.is_some() => &command.args[..idx],
                _ => &command.args[..],
            };
            if let Err(e) = scan.bind_positionals(bind_args, command.options.contains(Options::RIGHT_TO_LEFT)) {
                return finish_with_error(e, opts, Some(partial_scope(&ctx, &command, &scan)));
            }
            if let Err(e) = scan.check_required(bind_args) {
                return finish_with_error(e, opts, Some(partial_scope(&ctx, &command, &scan)));
            }
            if let (Some(idx), Some(raw)) = (expr_split, expr_raw_tokens) {
                let arg = &command.args[idx];
                match parse_expression_tokens(&arg.exprs, &raw, scan.fs.as_ref()) {
                    Ok(bound) => {
                        let mut guard = arg.value.lock().unwrap();
                        let expression = guard
                            .as_any_mut()
                            .downcast_mut::<Expression>()
                            .expect("Expression-typed Arg must hold an Expression value");
                        for b in bound {
                            expression.push(b);
                        }
                        drop(guard);
                        if !raw.is_empty() {
                            scan.binding.push(&arg.name, Occurrence::explicit(raw));
                        }
                    }
                    Err(e) => return finish_with_error(e, opts, Some(partial_scope(&ctx, &command, &scan))),
                }
            }
        }

        *ctx.binding_map().expect("command context always has a binding map") = scan.binding;

        let mut outcome = ParseOutcome {
            lineage: vec![ScopeOutcome {
                context: ctx.clone(),
                command_name: command.name.clone(),
                flags: scan.flags,
                own_flags: command.flags.clone(),
                args: command.args.clone(),
                pipelines: command.pipelines.clone(),
                options: command.options,
            }],
            error: None,
        };

        if let Some((sub, rest)) = subcommand_dispatch {
            let mut next_ancestors = ancestors;
            next_ancestors.push(command);
            let child_outcome = descend(sub, next_ancestors, rest, ctx, fs, opts).await;
            outcome.lineage.extend(child_outcome.lineage);
            outcome.error = child_outcome.error;
        }

        outcome
    })
}

/// §9 "Robust-parse mode": outside robust mode a parse failure is a hard
/// abort with no usable lineage. In robust mode, whatever scope/binding
/// state had already been produced (the current scope's partial scan, plus
/// any already-completed ancestor scopes already folded into `lineage` by
/// the caller) is preserved on the outcome instead of discarded, so
/// completion/help tooling can still inspect the partial input.
fn finish_with_error(error: CliError, opts: ParseOptions, partial: Option<ScopeOutcome>) -> ParseOutcome {
    let lineage = if opts.robust { partial.into_iter().collect() } else { Vec::new() };
    ParseOutcome { lineage, error: Some(error) }
}

/// Snapshots the current scope's in-progress scan into a `ScopeOutcome`,
/// writing whatever binding entries were collected so far onto the
/// Context's binding map the same way the happy path does.
fn partial_scope(ctx: &Context, command: &Command, scan: &Scan) -> ScopeOutcome {
    if let Some(mut binding) = ctx.binding_map() {
        *binding = scan.binding.clone();
    }
    ScopeOutcome {
        context: ctx.clone(),
        command_name: command.name.clone(),
        flags: scan.flags.clone(),
        own_flags: command.flags.clone(),
        args: command.args.clone(),
        pipelines: command.pipelines.clone(),
        options: command.options,
    }
}

/// Scratch state for one scope's left-to-right scan.
struct Scan {
    flags: Vec<Flag>,
    binding: BindingMap,
    positionals: Vec<String>,
    flags_locked: bool,
    disallow_flags_after_args: bool,
    fs: Arc<dyn FileSystem>,
}

impl Scan {
    fn find_long(&self, name: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.matches_long(name))
    }

    fn find_short(&self, c: char) -> Option<&Flag> {
        self.flags.iter().find(|f| f.matches_short(c))
    }

    fn bind_long(
        &mut self,
        name: &str,
        inline_value: Option<String>,
        tokens: &[String],
        i: &mut usize,
    ) -> Result<(), CliError> {
        let flag = self
            .find_long(name)
            .ok_or_else(|| CliError::from(ParseError::new(ErrorCode::UnknownOption).with_item(name.to_string())))?
            .clone();
        self.consume_occurrence(&flag, inline_value, tokens, i)
    }

    fn bind_short_cluster(
        &mut self,
        chars: &[char],
        inline_value: Option<String>,
        tokens: &[String],
        i: &mut usize,
    ) -> Result<(), CliError> {
        // A cluster of every-boolean short flags is `-x -y -z`; otherwise the
        // first char names the flag and the remainder (if any) is its
        // inline value (`-sValue`), per §4.1.
        let all_boolean = chars.iter().all(|c| self.find_short(*c).map(|f| f.is_boolean()).unwrap_or(false));
        if all_boolean && chars.len() > 1 {
            for c in chars {
                let flag = self.find_short(*c).unwrap().clone();
                self.consume_occurrence(&flag, None, tokens, i)?;
            }
            return Ok(());
        }

        let first = chars[0];
        let flag = self
            .find_short(first)
            .ok_or_else(|| {
                CliError::from(ParseError::new(ErrorCode::UnknownOption).with_item(first.to_string()))
            })?
            .clone();
        let remainder: String = chars[1..].iter().collect();
        let value = if !remainder.is_empty() {
            Some(remainder)
        } else {
            inline_value
        };
        self.consume_occurrence(&flag, value, tokens, i)
    }

    fn consume_occurrence(
        &mut self,
        flag: &Flag,
        inline_value: Option<String>,
        tokens: &[String],
        i: &mut usize,
    ) -> Result<(), CliError> {
        let counter = flag.counter();
        let mut raw = Vec::new();
        if let Some(v) = inline_value {
            raw.push(v);
        }

        while counter.wants_more(raw.len()) && *i < tokens.len() {
            let candidate = &tokens[*i];
            let looks_like_flag = matches!(classify(candidate), Token::LongFlag { .. } | Token::ShortCluster { .. })
                || candidate == "--";
            if looks_like_flag {
                break;
            }
            raw.push(candidate.clone());
            *i += 1;
        }

        if raw.is_empty() && flag.options.contains(Options::OPTIONAL) {
            let mut guard = flag.value.lock().unwrap();
            guard
                .set_default()
                .map_err(|e| CliError::from(ParseError::new(ErrorCode::InvalidArgument).with_item(flag.name.clone()).with_value(e.to_string())))?;
        } else {
            if counter.min() > raw.len() {
                return Err(ParseError::new(ErrorCode::ExpectedArgument).with_item(flag.name.clone()).into());
            }
            let first_occurrence = self.binding.occurrence_count(&flag.name) == 0;
            bind_value(&flag.value, raw.clone(), flag.options, first_occurrence, self.fs.as_ref())
                .map_err(|e| CliError::from(ParseError::new(ErrorCode::InvalidArgument).with_item(flag.name.clone()).with_value(e.to_string())))?;
        }

        self.binding.push(&flag.name, Occurrence::explicit(raw));
        Ok(())
    }

    /// §4.2 step 3: right-to-left is implemented by reversing both the
    /// declared Args and the collected positional tokens, running the same
    /// greedy left-to-right assignment, then reversing the result back —
    /// the greedy pass is identical either way, only the orientation of
    /// "leftmost" changes.
    fn bind_positionals(&mut self, args: &[Arg], rtl: bool) -> Result<(), CliError> {
        let ordered: Vec<&Arg> = if rtl { args.iter().rev().collect() } else { args.iter().collect() };
        let mut queue: VecDeque<String> = if rtl {
            self.positionals.iter().rev().cloned().collect()
        } else {
            self.positionals.iter().cloned().collect()
        };

        let mut assigned: Vec<(String, Options, ValueCell, Vec<String>)> = Vec::new();
        for arg in ordered {
            let take = arg.counter.max().unwrap_or(queue.len()).min(queue.len());
            let mut raw: Vec<String> = (0..take).filter_map(|_| queue.pop_front()).collect();
            if rtl {
                raw.reverse();
            }
            assigned.push((arg.name.clone(), arg.options, arg.value.clone(), raw));
        }
        if rtl {
            assigned.reverse();
        }

        if !queue.is_empty() {
            let remaining: Vec<String> = if rtl { queue.into_iter().rev().collect() } else { queue.into_iter().collect() };
            return Err(ParseError::new(ErrorCode::UnexpectedArgument)
                .with_value(remaining.first().cloned().unwrap_or_default())
                .with_remaining(remaining)
                .into());
        }

        for (name, options, cell, raw) in assigned {
            if raw.is_empty() {
                continue;
            }
            bind_value(&cell, raw.clone(), options, true, self.fs.as_ref())
                .map_err(|e| CliError::from(ParseError::new(ErrorCode::InvalidArgument).with_item(name.clone()).with_value(e.to_string())))?;
            self.binding.push(&name, Occurrence::explicit(raw));
        }
        Ok(())
    }

    fn check_required(&self, args: &[Arg]) -> Result<(), CliError> {
        for flag in &self.flags {
            if flag.options.contains(Options::REQUIRED) && !self.binding.is_seen(&flag.name) {
                return Err(ParseError::new(ErrorCode::ExpectedRequiredOption).with_item(flag.name.clone()).into());
            }
        }
        for arg in args {
            // A required positional that never appeared at all is distinct
            // from one that appeared but didn't get enough value tokens
            // (that case is caught earlier, in `bind_positionals`/
            // `consume_occurrence`, as `ExpectedArgument`).
            if arg.is_required() && self.binding.occurrence_count(&arg.name) == 0 {
                return Err(ParseError::new(ErrorCode::MissingArgument).with_item(arg.name.clone()).into());
            }
        }
        Ok(())
    }
}

/// Resolves a trailing `-operator tok tok -operator tok...` token stream
/// against the recognized `exprs` table (§4.2 "Expression pipeline parse").
/// Each occurrence gets a fresh, independent set of value cells (§3
/// "independent" invariant on `Expr` bindings) rather than reusing the
/// declaration's own cells, so repeated operators (`-multi a -multi b`)
/// don't clobber each other.
fn parse_expression_tokens(exprs: &[Expr], tokens: &[String], fs: &dyn FileSystem) -> Result<Vec<BoundExpr>, CliError> {
    let mut bound = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let tok = &tokens[i];
        let name = tok.strip_prefix('-').filter(|n| !n.is_empty()).ok_or_else(|| {
            CliError::from(
                ParseError::new(ErrorCode::ArgsMustPrecedeExprs)
                    .with_value(tok.clone())
                    .with_remaining(tokens[i..].to_vec()),
            )
        })?;

        let expr_def = exprs
            .iter()
            .find(|e| e.matches(name))
            .ok_or_else(|| CliError::from(ParseError::new(ErrorCode::UnknownExpr).with_item(name.to_string())))?;
        i += 1;

        let is_operator = |t: &str| t.strip_prefix('-').map(|n| exprs.iter().any(|e| e.matches(n))).unwrap_or(false);

        let max_take: usize = expr_def.args.iter().map(|a| a.counter.max().unwrap_or(usize::MAX)).sum();
        let mut own_tokens: Vec<String> = Vec::new();
        while own_tokens.len() < max_take && i < tokens.len() && !is_operator(&tokens[i]) {
            own_tokens.push(tokens[i].clone());
            i += 1;
        }

        let mut queue: VecDeque<String> = own_tokens.into_iter().collect();
        let mut op_binding = BindingMap::new();
        let mut values: IndexMap<String, ValueCell> = IndexMap::new();
        let mut raw_for_render: Vec<String> = Vec::new();
        for own_arg in &expr_def.args {
            let take = own_arg.counter.max().unwrap_or(queue.len()).min(queue.len());
            let raw: Vec<String> = (0..take).filter_map(|_| queue.pop_front()).collect();
            if own_arg.is_required() && raw.len() < own_arg.counter.min() {
                return Err(ParseError::new(ErrorCode::ExpectedArgument)
                    .with_item(format!("-{}'s {}", expr_def.name, own_arg.name))
                    .into());
            }
            let cell: ValueCell = Arc::new(std::sync::Mutex::new(own_arg.value.lock().unwrap().zero_clone()));
            if !raw.is_empty() {
                bind_value(&cell, raw.clone(), own_arg.options, true, fs).map_err(|e| {
                    CliError::from(
                        ParseError::new(ErrorCode::InvalidArgument).with_item(own_arg.name.clone()).with_value(e.to_string()),
                    )
                })?;
                raw_for_render.extend(raw.iter().cloned());
                op_binding.push(&own_arg.name, Occurrence::explicit(raw));
            }
            values.insert(own_arg.name.clone(), cell);
        }

        bound.push(BoundExpr { expr_name: expr_def.name.clone(), raw: raw_for_render, binding: op_binding, values });
    }

    Ok(bound)
}

/// Applies file-reference resolution, comma-splitting, and reset/merge
/// bookkeeping, then calls the destination's `Set` (§4.2 "Value binding per
/// occurrence"). `pub(crate)` so the App façade's env/file fallback (§4.2)
/// can reuse the same semantics for implicit occurrences.
pub(crate) fn bind_value(
    cell: &ValueCell,
    mut raw: Vec<String>,
    options: Options,
    first_occurrence: bool,
    fs: &dyn FileSystem,
) -> Result<(), crate::error::ValueError> {
    if options.contains(Options::FILE_REFERENCE) || options.contains(Options::ALLOW_FILE_REFERENCE) {
        raw = resolve_file_references(raw, options, fs)?;
    }

    if options.contains(Options::MUST_EXIST) {
        for path in &raw {
            if !fs.exists(path) {
                return Err(crate::error::ValueError::MustExist { path: path.clone() });
            }
        }
    }

    if options.contains(Options::WORKING_DIRECTORY) {
        for path in &raw {
            if !fs.exists(path) || fs.is_file(path) {
                return Err(crate::error::ValueError::NotADirectory { path: path.clone() });
            }
        }
    }

    let mut guard = cell.lock().unwrap();
    if !options.contains(Options::DISABLE_SPLITTING) && guard.is_collection() {
        raw = raw
            .into_iter()
            .flat_map(|tok| tok.split(',').map(|s| s.to_string()).collect::<Vec<_>>())
            .collect();
    }

    let reset_first = first_occurrence && !options.contains(Options::MERGE);
    guard.set(&raw, reset_first)
}

fn resolve_file_references(
    raw: Vec<String>,
    options: Options,
    fs: &dyn FileSystem,
) -> Result<Vec<String>, crate::error::ValueError> {
    let unconditional = options.contains(Options::FILE_REFERENCE);
    raw.into_iter()
        .map(|token| {
            let path = if unconditional {
                Some(token.as_str())
            } else {
                token.strip_prefix('@')
            };
            match path {
                Some(path) => fs.read_to_string(path).map_err(|e| crate::error::ValueError::FileReference {
                    path: path.to_string(),
                    message: e.to_string(),
                }),
                None => Ok(token),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argcounter::{Exactly, Remaining, ZeroOrOne};
    use crate::fs::InMemoryFs;
    use crate::value::{BoolValue, IntValue, ListValue, StringValue};

    fn fs() -> Arc<dyn FileSystem> {
        Arc::new(InMemoryFs::new())
    }

    #[tokio::test]
    async fn s1_subcommand_and_bool_flag_binding() {
        let root = Command::new("app")
            .flag(Flag::new("global").value(BoolValue::default()))
            .subcommand(Command::new("sub").flag(Flag::new("flag1").value(BoolValue::default())));

        let argv = vec!["sub".to_string(), "--flag1".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.lineage.len(), 2);
        assert_eq!(outcome.lineage[1].command_name, "sub");
        let flag1 = outcome.lineage[1].flags.iter().find(|f| f.name == "flag1").unwrap();
        assert!(flag1.value.lock().unwrap().as_any().downcast_ref::<BoolValue>().unwrap().0);
        let global = outcome.lineage[1].flags.iter().find(|f| f.name == "global").unwrap();
        assert!(!global.value.lock().unwrap().as_any().downcast_ref::<BoolValue>().unwrap().0);
    }

    #[tokio::test]
    async fn s2_unexpected_positional_reports_remaining() {
        let root = Command::new("app").arg(Arg::new("only"));
        let argv = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        match outcome.error {
            Some(CliError::Parse(e)) => {
                assert_eq!(e.code, ErrorCode::UnexpectedArgument);
                assert_eq!(e.value.as_deref(), Some("b"));
                assert_eq!(e.remaining, vec!["c".to_string()]);
            }
            other => panic!("expected ParseError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn s5_rtl_binding_fills_rightmost_first() {
        let root = Command::new("app")
            .arg(Arg::new("a").counter(ZeroOrOne))
            .arg(Arg::new("b").counter(ZeroOrOne))
            .arg(Arg::new("r").counter(Exactly(1)))
            .options(Options::RIGHT_TO_LEFT);
        let argv = vec!["X".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        assert!(outcome.error.is_none());
        let scope = &outcome.lineage[0];
        let r = scope.context.value::<StringValue>("r").unwrap();
        assert_eq!(r.0, "X");
        assert_eq!(scope.context.value::<StringValue>("a").unwrap().0, "");
    }

    #[tokio::test]
    async fn list_flag_splits_on_commas_unless_disabled() {
        let root = Command::new("app").flag(Flag::new("items").value(ListValue::default()));
        let argv = vec!["--items".to_string(), "a,b,c".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        assert!(outcome.error.is_none());
        let items = outcome.lineage[0].context.value::<ListValue>("items").unwrap();
        assert_eq!(items.0, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn optional_int_flag_uses_smart_default_when_bare() {
        let root = Command::new("app")
            .flag(Flag::new("count").value(IntValue::default()).options(Options::OPTIONAL));
        let argv = vec!["--count".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        assert!(outcome.error.is_none());
        let count = outcome.lineage[0].context.value::<IntValue>("count").unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn remaining_arg_counter_consumes_rest_of_positionals() {
        let root = Command::new("app").arg(Arg::new("files").value(ListValue::default()).counter(Remaining::new(1)));
        let argv = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        assert!(outcome.error.is_none());
        let files = outcome.lineage[0].context.value::<ListValue>("files").unwrap();
        assert_eq!(files.0, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn s3_expression_pipeline_binds_operators_in_order() {
        let root = Command::new("app").arg(
            Arg::new("query")
                .value(Expression::new())
                .expr(Expr::new("multi").arg(Arg::new("values").counter(Remaining::new(1))))
                .expr(Expr::new("offset").arg(Arg::new("n").value(IntValue::default()))),
        );
        let argv = vec![
            "-multi".to_string(),
            "a".to_string(),
            "b".to_string(),
            "-offset".to_string(),
            "2".to_string(),
        ];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
        let query = outcome.lineage[0].context.value::<Expression>("query").unwrap();
        assert_eq!(query.render(), "-multi a b -offset 2");
        assert_eq!(query.bound.len(), 2);
        assert_eq!(query.bound[0].expr_name, "multi");
        let offset_n = query.bound[1].values.get("n").unwrap();
        assert_eq!(offset_n.lock().unwrap().as_any().downcast_ref::<IntValue>().unwrap().0, 2);
    }

    #[tokio::test]
    async fn expression_rejects_unknown_operator_name() {
        let root = Command::new("app").arg(
            Arg::new("query").value(Expression::new()).expr(Expr::new("multi").arg(Arg::new("values").counter(Remaining::new(1)))),
        );
        let argv = vec!["-bogus".to_string(), "x".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        match outcome.error {
            Some(CliError::Parse(e)) => assert_eq!(e.code, ErrorCode::UnknownExpr),
            other => panic!("expected ParseError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn must_exist_rejects_missing_path() {
        let root = Command::new("app").flag(
            Flag::new("config").value(StringValue::default()).options(Options::MUST_EXIST),
        );
        let argv = vec!["--config".to_string(), "/nope".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        match outcome.error {
            Some(CliError::Parse(e)) => assert_eq!(e.code, ErrorCode::InvalidArgument),
            other => panic!("expected ParseError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn must_exist_accepts_known_path() {
        let known_fs: Arc<dyn FileSystem> = Arc::new(InMemoryFs::new().with_file("/etc/app.conf", "hi"));
        let root = Command::new("app").flag(
            Flag::new("config").value(StringValue::default()).options(Options::MUST_EXIST),
        );
        let argv = vec!["--config".to_string(), "/etc/app.conf".to_string()];
        let outcome = parse(root, argv, known_fs, ParseOptions::default()).await;
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn working_directory_rejects_a_plain_file() {
        let known_fs: Arc<dyn FileSystem> = Arc::new(InMemoryFs::new().with_file("/etc/app.conf", "hi"));
        let root = Command::new("app").flag(
            Flag::new("cwd").value(StringValue::default()).options(Options::WORKING_DIRECTORY),
        );
        let argv = vec!["--cwd".to_string(), "/etc/app.conf".to_string()];
        let outcome = parse(root, argv, known_fs, ParseOptions::default()).await;
        match outcome.error {
            Some(CliError::Parse(e)) => assert_eq!(e.code, ErrorCode::InvalidArgument),
            other => panic!("expected ParseError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_flag_parsing_reads_every_token_as_positional() {
        let root = Command::new("app")
            .options(Options::SKIP_FLAG_PARSING)
            .arg(Arg::new("rest").value(ListValue::default()).counter(Remaining::new(1)));
        let argv = vec!["--flag1".to_string(), "-x".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
        let rest = outcome.lineage[0].context.value::<ListValue>("rest").unwrap();
        assert_eq!(rest.0, vec!["--flag1".to_string(), "-x".to_string()]);
    }

    #[tokio::test]
    async fn flag_after_positional_is_rejected_when_disallowed() {
        let root = Command::new("app")
            .options(Options::DISALLOW_FLAGS_AFTER_ARGS)
            .arg(Arg::new("only"))
            .flag(Flag::new("verbose").value(BoolValue::default()));
        let argv = vec!["pos".to_string(), "--verbose".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        match outcome.error {
            Some(CliError::Parse(e)) => assert_eq!(e.code, ErrorCode::FlagUsedAfterArgs),
            other => panic!("expected ParseError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absent_required_positional_reports_missing_argument() {
        let root = Command::new("app").arg(Arg::new("required"));
        let outcome = parse(root, Vec::new(), fs(), ParseOptions::default()).await;
        match outcome.error {
            Some(CliError::Parse(e)) => assert_eq!(e.code, ErrorCode::MissingArgument),
            other => panic!("expected ParseError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn robust_mode_preserves_partial_lineage_on_error() {
        let root = Command::new("app").arg(Arg::new("only"));
        let argv = vec!["a".to_string(), "b".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions { robust: true }).await;
        assert!(outcome.error.is_some());
        assert_eq!(outcome.lineage.len(), 1);
        assert_eq!(outcome.lineage[0].command_name, "app");
    }

    #[tokio::test]
    async fn non_robust_mode_discards_lineage_on_error() {
        let root = Command::new("app").arg(Arg::new("only"));
        let argv = vec!["a".to_string(), "b".to_string()];
        let outcome = parse(root, argv, fs(), ParseOptions::default()).await;
        assert!(outcome.error.is_some());
        assert!(outcome.lineage.is_empty());
    }
}
