//! List and map destinations.
//!
//! Unlike scalars, these accumulate across occurrences by default and have
//! their own reset/merge semantics (§4.2, §8 property 3), so they are not
//! generated by the scalar macro.

use std::any::Any;

use indexmap::IndexMap;

use super::{Value, ValueKind};
use crate::error::ValueError;

#[derive(Debug, Clone, Default)]
pub struct ListValue(pub Vec<String>);

impl Value for ListValue {
    fn set(&mut self, raw: &[String], reset_first: bool) -> Result<(), ValueError> {
        if reset_first {
            self.0.clear();
        }
        self.0.extend(raw.iter().cloned());
        Ok(())
    }

    fn reset(&mut self) {
        self.0.clear();
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(ListValue::default())
    }

    fn display(&self) -> String {
        self.0.join(",")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::List
    }

    fn is_collection(&self) -> bool {
        true
    }
}

/// Ordered so iteration order matches insertion (first-seen key order),
/// mirroring the `BindingMap`'s own ordering guarantee.
#[derive(Debug, Clone, Default)]
pub struct MapValue(pub IndexMap<String, String>);

impl Value for MapValue {
    fn set(&mut self, raw: &[String], reset_first: bool) -> Result<(), ValueError> {
        if reset_first {
            self.0.clear();
        }
        for entry in raw {
            match entry.split_once('=') {
                Some((k, v)) => {
                    self.0.insert(k.to_string(), v.to_string());
                }
                None => {
                    return Err(ValueError::InvalidLiteral {
                        kind: "map entry (want key=value)",
                        raw: entry.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.0.clear();
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(MapValue::default())
    }

    fn display(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Map
    }

    fn is_collection(&self) -> bool {
        true
    }
}
