//! Options
//!
//! `Options` is a bitmask; each set bit corresponds to a setup action that
//! mutates a target's internal-flag bits or installs a pipeline step during
//! Initialize (§4.5). Hand-rolled as a `u64` newtype rather than pulling in
//! a bitflags crate — the teacher repo's own small bitmasks (the `shopt`/
//! `set -o` option tracking in `src/interpreter/helpers/shellopts.rs`) are
//! hand-rolled the same way, and the built-in set plus user-registered bits
//! fit comfortably in 64 bits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options(u64);

macro_rules! option_bits {
    ($($name:ident = $bit:expr),+ $(,)?) => {
        impl Options {
            $(pub const $name: Options = Options(1u64 << $bit);)+
        }
    };
}

option_bits! {
    HIDDEN = 0,
    REQUIRED = 1,
    EXITS = 2,
    MUST_EXIST = 3,
    SKIP_FLAG_PARSING = 4,
    DISALLOW_FLAGS_AFTER_ARGS = 5,
    WORKING_DIRECTORY = 6,
    OPTIONAL = 7,
    NO = 8,
    NON_PERSISTENT = 9,
    DISABLE_SPLITTING = 10,
    MERGE = 11,
    RIGHT_TO_LEFT = 12,
    PREVENT_SETUP = 13,
    EACH_OCCURRENCE = 14,
    FILE_REFERENCE = 15,
    ALLOW_FILE_REFERENCE = 16,
    SORTED_FLAGS = 17,
    SORTED_COMMANDS = 18,
    SORTED_EXPRS = 19,
    IMPLIED_ACTION = 20,
    VISIBLE = 21,
    DISABLE_AUTO_VISIBILITY = 22,
}

/// Bit index at which user-registered options start; bits below this are
/// reserved for the built-ins enumerated above.
const FIRST_USER_BIT: u64 = 32;

static NEXT_USER_BIT: AtomicU64 = AtomicU64::new(FIRST_USER_BIT);
static USER_OPTION_NAMES: Mutex<Vec<(String, Options)>> = Mutex::new(Vec::new());

impl Options {
    pub const NONE: Options = Options(0);

    pub fn contains(&self, other: Options) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: Options) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Options) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Options) {
        self.0 &= !other.0;
    }

    pub fn union(self, other: Options) -> Options {
        Options(self.0 | other.0)
    }

    /// Register a new user-defined option bit under `name`, or return the
    /// existing bit if `name` was already registered. Supports "implementers
    /// must support registration of additional user options beyond the
    /// built-in bits" (§4.5).
    pub fn register(name: &str) -> Options {
        let mut registry = USER_OPTION_NAMES.lock().unwrap();
        if let Some((_, bit)) = registry.iter().find(|(n, _)| n == name) {
            return *bit;
        }
        let idx = NEXT_USER_BIT.fetch_add(1, Ordering::SeqCst);
        assert!(idx < 64, "exhausted the 64 available option bits");
        let bit = Options(1u64 << idx);
        registry.push((name.to_string(), bit));
        bit
    }

    pub fn lookup(name: &str) -> Option<Options> {
        USER_OPTION_NAMES.lock().unwrap().iter().find(|(n, _)| n == name).map(|(_, b)| *b)
    }
}

impl std::ops::BitOr for Options {
    type Output = Options;

    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Options {
    fn bitor_assign(&mut self, rhs: Options) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_contains_round_trip() {
        let o = Options::REQUIRED | Options::HIDDEN;
        assert!(o.contains(Options::REQUIRED));
        assert!(o.contains(Options::HIDDEN));
        assert!(!o.contains(Options::EXITS));
    }

    #[test]
    fn user_option_registration_is_stable_per_name() {
        let a = Options::register("argtree_test_custom_option_a");
        let b = Options::register("argtree_test_custom_option_a");
        assert_eq!(a, b);
        let c = Options::register("argtree_test_custom_option_b");
        assert_ne!(a, c);
    }
}
