//! Scalar destinations: bool and the integer/float width family.
//!
//! §9 recommends a macro over hand duplicating set/clone/zero/smart-default
//! for each width; `scalar_value!` produces one `Value` impl per numeric
//! primitive from a single template.

use std::any::Any;

use super::{Value, ValueKind};
use crate::error::ValueError;

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolValue(pub bool);

impl Value for BoolValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or("true");
        self.0 = match raw {
            "true" | "1" | "yes" | "on" | "" => true,
            "false" | "0" | "no" | "off" => false,
            other => {
                return Err(ValueError::InvalidLiteral { kind: "bool", raw: other.to_string() })
            }
        };
        Ok(())
    }

    fn set_default(&mut self) -> Result<(), ValueError> {
        self.0 = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = false;
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(BoolValue::default())
    }

    fn display(&self) -> String {
        self.0.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Bool
    }

    fn allows_optional(&self) -> bool {
        true
    }
}

macro_rules! scalar_value {
    ($wrapper:ident, $inner:ty, $kind:expr, $label:literal, $smart_default:expr) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $wrapper(pub $inner);

        impl Value for $wrapper {
            fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
                let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
                self.0 = raw
                    .parse::<$inner>()
                    .map_err(|_| ValueError::InvalidLiteral { kind: $label, raw: raw.to_string() })?;
                Ok(())
            }

            fn set_default(&mut self) -> Result<(), ValueError> {
                self.0 = $smart_default;
                Ok(())
            }

            fn reset(&mut self) {
                self.0 = Default::default();
            }

            fn zero_clone(&self) -> Box<dyn Value> {
                Box::new(Self::default())
            }

            fn display(&self) -> String {
                self.0.to_string()
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }

            fn kind(&self) -> ValueKind {
                $kind
            }

            fn allows_optional(&self) -> bool {
                true
            }
        }
    };
}

scalar_value!(IntValue, i64, ValueKind::Int, "int", 1);
scalar_value!(UintValue, u64, ValueKind::Uint, "uint", 1);
scalar_value!(FloatValue, f64, ValueKind::Float, "float", 1.0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_value_parses_and_smart_defaults() {
        let mut v = IntValue::default();
        v.set(&["42".to_string()], true).unwrap();
        assert_eq!(v.0, 42);
        let mut d = IntValue::default();
        d.set_default().unwrap();
        assert_eq!(d.0, 1);
    }

    #[test]
    fn bool_value_accepts_common_spellings() {
        let mut v = BoolValue::default();
        v.set(&["yes".to_string()], true).unwrap();
        assert!(v.0);
        v.set(&["off".to_string()], false).unwrap();
        assert!(!v.0);
    }

    #[test]
    fn float_value_rejects_garbage() {
        let mut v = FloatValue::default();
        assert!(v.set(&["not-a-number".to_string()], true).is_err());
    }
}
