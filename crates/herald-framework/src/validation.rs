//! Constraint validators.
//!
//! A [`Validator`] is a predicate over an adapted value, keyed in the
//! [`ValidatorRegistry`] by constraint kind and target type. The constraint's
//! JSON configuration is handed to the validator at evaluation time, so one
//! `min` validator serves every `min` constraint on `i64` parameters.
//!
//! Built-in kinds: `min` and `max` for every built-in integer and float type,
//! configured as `{"value": <number>}` (a bare number is accepted too).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::context::ExecutionContext;
use crate::handler::TypeKey;

/// A predicate over an adapted value.
pub trait Validator: Send + Sync + 'static {
    /// Returns `true` if `value` satisfies the constraint configured by
    /// `config`.
    fn validate(&self, value: &(dyn Any + Send + Sync), config: &Value, ctx: &ExecutionContext)
    -> bool;
}

impl<F> Validator for F
where
    F: Fn(&(dyn Any + Send + Sync), &Value, &ExecutionContext) -> bool + Send + Sync + 'static,
{
    fn validate(
        &self,
        value: &(dyn Any + Send + Sync),
        config: &Value,
        ctx: &ExecutionContext,
    ) -> bool {
        self(value, config, ctx)
    }
}

/// Constraint validators keyed by `(kind, target type)`.
#[derive(Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<(String, TypeKey), Arc<dyn Validator>>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorRegistry {
    /// A registry with the built-in `min`/`max` validators.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin();
        registry
    }

    /// A registry with no validators.
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// Registers a typed validator for `kind` on `T`, replacing any previous
    /// one.
    pub fn register<T, F>(&mut self, kind: impl Into<String>, validator: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &Value, &ExecutionContext) -> bool + Send + Sync + 'static,
    {
        let erased = move |value: &(dyn Any + Send + Sync), config: &Value, ctx: &ExecutionContext| {
            match value.downcast_ref::<T>() {
                Some(value) => validator(value, config, ctx),
                None => false,
            }
        };
        self.register_validator(kind, TypeKey::of::<T>(), Arc::new(erased))
    }

    /// Registers a type-erased validator.
    pub fn register_validator(
        &mut self,
        kind: impl Into<String>,
        ty: TypeKey,
        validator: Arc<dyn Validator>,
    ) -> &mut Self {
        self.validators.insert((kind.into(), ty), validator);
        self
    }

    /// Returns the validator for `kind` on `ty`.
    pub fn get(&self, kind: &str, ty: TypeKey) -> Option<Arc<dyn Validator>> {
        self.validators.get(&(kind.to_string(), ty)).cloned()
    }

    pub fn contains(&self, kind: &str, ty: TypeKey) -> bool {
        self.validators.contains_key(&(kind.to_string(), ty))
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    fn register_builtin(&mut self) {
        macro_rules! bounds {
            ($($ty:ty => $to_bound:expr),* $(,)?) => {
                $(
                    self.register::<$ty, _>("min", |value, config, _| {
                        compare(($to_bound)(*value), config, "min").is_some_and(|ord| ord.is_ge())
                    });
                    self.register::<$ty, _>("max", |value, config, _| {
                        compare(($to_bound)(*value), config, "max").is_some_and(|ord| ord.is_le())
                    });
                )*
            };
        }

        bounds!(
            i8 => |v: i8| Bound::Int(v.into()),
            i16 => |v: i16| Bound::Int(v.into()),
            i32 => |v: i32| Bound::Int(v.into()),
            i64 => |v: i64| Bound::Int(v.into()),
            i128 => |v: i128| Bound::Int(v),
            isize => |v: isize| Bound::Int(v as i128),
            u8 => |v: u8| Bound::Int(v.into()),
            u16 => |v: u16| Bound::Int(v.into()),
            u32 => |v: u32| Bound::Int(v.into()),
            u64 => |v: u64| Bound::Int(v.into()),
            u128 => |v: u128| i128::try_from(v).map_or(Bound::Float(v as f64), Bound::Int),
            usize => |v: usize| Bound::Int(v as i128),
            f32 => |v: f32| Bound::Float(v.into()),
            f64 => |v: f64| Bound::Float(v),
        );
    }
}

// ============================================================================
// Numeric bounds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Int(i128),
    Float(f64),
}

impl Bound {
    fn from_config(config: &Value) -> Option<Self> {
        let value = config.get("value").unwrap_or(config);
        if let Some(v) = value.as_i64() {
            Some(Self::Int(v.into()))
        } else if let Some(v) = value.as_u64() {
            Some(Self::Int(v.into()))
        } else {
            value.as_f64().map(Self::Float)
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

/// Orders `value` against the configured bound. `None` for a malformed
/// configuration or a NaN comparison.
fn compare(value: Bound, config: &Value, kind: &str) -> Option<std::cmp::Ordering> {
    let Some(bound) = Bound::from_config(config) else {
        warn!(kind, %config, "Malformed bound constraint configuration");
        return None;
    };
    match (value, bound) {
        (Bound::Int(v), Bound::Int(b)) => Some(v.cmp(&b)),
        (v, b) => v.as_f64().partial_cmp(&b.as_f64()),
    }
}
