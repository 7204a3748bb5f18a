//! Value Engine
//!
//! Typed destinations that a Flag or Arg binds onto: the core `Value` trait,
//! a macro that produces the mechanical scalar impls (bool, integer widths,
//! float widths), and the handful of non-scalar destinations (list, map,
//! duration, URL, IP, regexp, big integer/float, byte sequence, name/value
//! pair, and the `Expression` destination used by §4.2's expression pipeline).

mod collections;
mod exotic;
mod scalar;

pub use collections::{ListValue, MapValue};
pub use exotic::{
    BigFloatValue, BigIntValue, BytesValue, DurationValue, IpValue, NameValueValue, RegexpValue,
    UrlValue,
};
pub use scalar::{BoolValue, FloatValue, IntValue, UintValue};

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::ValueError;

/// A shared, lockable destination cell. Flags and Args hold one of these
/// each; persistent-flag propagation clones the surrounding metadata while
/// cloning the `Arc` (not the contents), which is how the "shared value
/// destination" invariant (§3) is satisfied.
pub type ValueCell = Arc<Mutex<Box<dyn Value>>>;

pub fn new_cell(value: impl Value + 'static) -> ValueCell {
    Arc::new(Mutex::new(Box::new(value)))
}

/// A tag identifying which concrete destination kind a `Value` is, used by
/// the parser to decide whether comma-splitting applies and by the App's
/// help renderer to print a type hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Uint,
    Float,
    String,
    List,
    Map,
    Duration,
    Url,
    Ip,
    Regexp,
    BigInt,
    BigFloat,
    Bytes,
    NameValue,
    Expression,
    User,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Uint => "uint",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Duration => "duration",
            ValueKind::Url => "url",
            ValueKind::Ip => "ip",
            ValueKind::Regexp => "regexp",
            ValueKind::BigInt => "bigint",
            ValueKind::BigFloat => "bigfloat",
            ValueKind::Bytes => "bytes",
            ValueKind::NameValue => "namevalue",
            ValueKind::Expression => "expression",
            ValueKind::User => "user",
        };
        f.write_str(s)
    }
}

/// A typed destination a Flag/Arg/Expr binds its occurrences onto.
///
/// Implementors are expected to be cheap to `zero_clone`: the `EachOccurrence`
/// option (§4.2) clones a fresh zero-valued destination per occurrence and
/// sets it from just that occurrence's raw tokens, without disturbing the
/// aggregated destination the rest of the binding machinery maintains.
pub trait Value: Any + Send + Sync + fmt::Debug {
    /// Consume one occurrence's raw tokens. `reset_first` is true when this
    /// is the first occurrence of the binding and `Merge` was not requested;
    /// collection types (`List`, `Map`) clear themselves to zero before
    /// accumulating in that case. Scalar types simply overwrite.
    fn set(&mut self, raw: &[String], reset_first: bool) -> Result<(), ValueError>;

    /// Write the type-specific smart default used when an `Optional` flag
    /// is present with no value (§4.2). Returns
    /// `ValueError::OptionalNotSupported` for types that forbid `Optional`.
    fn set_default(&mut self) -> Result<(), ValueError> {
        Err(ValueError::OptionalNotSupported { kind: "unknown" })
    }

    /// Reset to the type's zero value (empty string, empty slice, nil map, ...).
    fn reset(&mut self);

    /// A fresh destination of the same concrete type, zero-valued.
    fn zero_clone(&self) -> Box<dyn Value>;

    /// A human-readable rendering of the current value, used for help text
    /// defaults and for `Context::Raw`-adjacent debugging.
    fn display(&self) -> String;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn kind(&self) -> ValueKind;

    /// Whether `Optional` (zero-or-one, smart-default) is permitted.
    fn allows_optional(&self) -> bool {
        false
    }

    /// Whether this destination accumulates across occurrences (list/map)
    /// rather than being overwritten by the latest one (scalars).
    fn is_collection(&self) -> bool {
        false
    }
}

/// `String` is common enough to deserve its own (non-macro) impl: its
/// "parse" step is infallible and it participates in `AllowFileReference`
/// transforms elsewhere in the binding pipeline, not here.
#[derive(Debug, Clone, Default)]
pub struct StringValue(pub String);

impl Value for StringValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        self.0 = raw.last().cloned().unwrap_or_default();
        Ok(())
    }

    fn reset(&mut self) {
        self.0.clear();
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(StringValue::default())
    }

    fn display(&self) -> String {
        self.0.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::String
    }
}
