//! Command
//!
//! A node in the declarative application tree: name, aliases, subcommands,
//! flags, args, options, and its four lifecycle pipelines (§3 "Command").
//! Root commands are owned by the `App`; all others are owned by their
//! parent `Command`.

use indexmap::IndexMap;

use crate::arg::Arg;
use crate::context::PathSegment;
use crate::flag::Flag;
use crate::lifecycle::Pipelines;
use crate::options::Options;

#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub help_text: String,
    pub usage_text: String,
    pub manual_text: String,
    pub category: String,
    pub subcommands: Vec<Command>,
    pub flags: Vec<Flag>,
    pub args: Vec<Arg>,
    pub options: Options,
    pub data: IndexMap<String, serde_json::Value>,
    pub pipelines: Pipelines,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command {
            name: name.into(),
            aliases: Vec::new(),
            help_text: String::new(),
            usage_text: String::new(),
            manual_text: String::new(),
            category: String::new(),
            subcommands: Vec::new(),
            flags: Vec::new(),
            args: Vec::new(),
            options: Options::NONE,
            data: IndexMap::new(),
            pipelines: Pipelines::default(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    pub fn usage(mut self, text: impl Into<String>) -> Self {
        self.usage_text = text.into();
        self
    }

    pub fn subcommand(mut self, command: Command) -> Self {
        self.subcommands.push(command);
        self
    }

    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn action(mut self, action: crate::lifecycle::ActionOf) -> Self {
        self.pipelines.action.push(action);
        self
    }

    pub fn before(mut self, action: crate::lifecycle::ActionOf) -> Self {
        self.pipelines.before.push(action);
        self
    }

    pub fn after(mut self, action: crate::lifecycle::ActionOf) -> Self {
        self.pipelines.after.push(action);
        self
    }

    pub fn initial(mut self, action: crate::lifecycle::ActionOf) -> Self {
        self.pipelines.initial.push(action);
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }

    pub fn find_subcommand(&self, name: &str) -> Option<&Command> {
        self.subcommands.iter().find(|c| c.matches(name))
    }

    pub fn find_flag(&self, name: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.matches_long(name))
    }

    pub fn find_flag_short(&self, c: char) -> Option<&Flag> {
        self.flags.iter().find(|f| f.matches_short(c))
    }

    /// Flags visible from this command's scope after persistent flags from
    /// every ancestor in `lineage` (root-to-self, self excluded) are folded
    /// in. Used by the parser to resolve a flag name without re-walking the
    /// tree on every lookup (§4.2 "walking up to include persistent flags").
    pub fn visible_flags(&self, ancestors: &[&Command]) -> Vec<Flag> {
        let mut out: Vec<Flag> = self.flags.iter().cloned().collect();
        for ancestor in ancestors.iter().rev() {
            for flag in &ancestor.flags {
                if flag.persistent && !out.iter().any(|f| f.name == flag.name) {
                    out.push(flag.clone_persistent());
                }
            }
        }
        out
    }

    pub fn path_segment(&self) -> PathSegment {
        PathSegment::Command(self.name.clone())
    }

    pub fn has_unbounded_arg(&self) -> bool {
        self.args.iter().any(|a| a.counter.max().is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_name_and_alias() {
        let cmd = Command::new("remove").alias("rm");
        assert!(cmd.matches("remove"));
        assert!(cmd.matches("rm"));
        assert!(!cmd.matches("add"));
    }

    #[test]
    fn visible_flags_includes_persistent_ancestor_flags() {
        let root = Command::new("app").flag(Flag::new("verbose").options(Options::NONE));
        let sub = Command::new("sub");
        let visible = sub.visible_flags(&[&root]);
        assert!(visible.iter().any(|f| f.name == "verbose"));
    }

    #[test]
    fn non_persistent_ancestor_flags_are_excluded() {
        let root = Command::new("app").flag(Flag::new("local").options(Options::NON_PERSISTENT));
        let sub = Command::new("sub");
        let visible = sub.visible_flags(&[&root]);
        assert!(visible.is_empty());
    }
}
