//! Type adapters: raw token → typed value.
//!
//! Each parameter type resolves to exactly one [`TypeAdapter`] in the
//! [`TypeAdapterRegistry`]. Adapters never fail loudly; a token that does not
//! parse yields `None`, which the dispatcher reports as an adaptation failure
//! naming the parameter.
//!
//! ```rust,ignore
//! let mut adapters = TypeAdapterRegistry::new();
//! adapters.register::<Duration, _>(|raw, _| humantime::parse_duration(raw).ok());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::handler::{ArgValue, TypeKey};

/// Converts a raw token into a type-erased value.
pub trait TypeAdapter: Send + Sync + 'static {
    /// Returns `None` if `raw` is not a valid value.
    fn parse(&self, raw: &str, ctx: &ExecutionContext) -> Option<ArgValue>;
}

impl<F> TypeAdapter for F
where
    F: Fn(&str, &ExecutionContext) -> Option<ArgValue> + Send + Sync + 'static,
{
    fn parse(&self, raw: &str, ctx: &ExecutionContext) -> Option<ArgValue> {
        self(raw, ctx)
    }
}

/// Adapters keyed by exact target type.
#[derive(Clone)]
pub struct TypeAdapterRegistry {
    adapters: HashMap<TypeKey, Arc<dyn TypeAdapter>>,
}

impl Default for TypeAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeAdapterRegistry {
    /// A registry with adapters for every built-in type.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin();
        registry
    }

    /// A registry with no adapters.
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registers a typed adapter for `T`, replacing any previous one.
    pub fn register<T, F>(&mut self, adapter: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&str, &ExecutionContext) -> Option<T> + Send + Sync + 'static,
    {
        let erased = move |raw: &str, ctx: &ExecutionContext| -> Option<ArgValue> {
            adapter(raw, ctx).map(|value| Box::new(value) as ArgValue)
        };
        self.register_adapter(TypeKey::of::<T>(), Arc::new(erased))
    }

    /// Registers a type-erased adapter.
    pub fn register_adapter(&mut self, ty: TypeKey, adapter: Arc<dyn TypeAdapter>) -> &mut Self {
        self.adapters.insert(ty, adapter);
        self
    }

    pub fn contains(&self, ty: TypeKey) -> bool {
        self.adapters.contains_key(&ty)
    }

    /// Converts `raw` with the adapter registered for `ty`.
    ///
    /// `None` when no adapter is registered or the token does not parse.
    pub fn adapt(&self, ty: TypeKey, raw: &str, ctx: &ExecutionContext) -> Option<ArgValue> {
        self.adapters.get(&ty)?.parse(raw, ctx)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    fn register_builtin(&mut self) {
        macro_rules! from_str {
            ($($ty:ty),* $(,)?) => {
                $(
                    self.register::<$ty, _>(|raw, _| raw.trim().parse::<$ty>().ok());
                )*
            };
        }

        from_str!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

        self.register::<bool, _>(|raw, _| {
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("true") {
                Some(true)
            } else if raw.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        });
        self.register::<char, _>(|raw, _| {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Some(ch),
                _ => None,
            }
        });
        self.register::<String, _>(|raw, _| Some(raw.to_string()));
    }
}
