//! Type-erased arguments.
//!
//! Adapters produce [`ArgValue`]s; handlers consume concrete types. The
//! [`FromArg`] trait is the bridge: it describes the shape a handler parameter
//! expects ([`ArgShape`]) and recovers the concrete value at call time.
//!
//! `FromArg` is implemented for every built-in adapter type `T` and for
//! `Option<T>`. Custom types opt in with [`impl_from_arg!`](crate::impl_from_arg):
//!
//! ```rust,ignore
//! #[derive(Debug, Clone)]
//! struct Color(u8, u8, u8);
//!
//! herald_framework::impl_from_arg!(Color);
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;

use crate::error::ArgumentError;

/// A type-erased adapted value.
pub type ArgValue = Box<dyn Any + Send + Sync>;

// ============================================================================
// TypeKey
// ============================================================================

/// A runtime key for a Rust type: its [`TypeId`] plus a readable name.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The fully-qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name with module paths stripped (`alloc::string::String` →
    /// `String`, `core::option::Option<i64>` → `Option<i64>`).
    pub fn short_name(&self) -> String {
        let mut out = String::with_capacity(self.name.len());
        let mut segment = String::new();
        for ch in self.name.chars() {
            match ch {
                ':' => segment.clear(),
                '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' => {
                    out.push_str(&segment);
                    segment.clear();
                    out.push(ch);
                }
                _ => segment.push(ch),
            }
        }
        out.push_str(&segment);
        out
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

// ============================================================================
// ArgShape
// ============================================================================

/// What a handler parameter expects: the adapter type and whether absence is
/// representable (`Option<T>`).
///
/// Two shapes are equal when type and nullability match.
#[derive(Clone, Copy)]
pub struct ArgShape {
    ty: TypeKey,
    nullable: bool,
    zero: Option<fn() -> ArgValue>,
}

impl ArgShape {
    /// A non-nullable `T`.
    pub fn required<T: Send + Sync + 'static>() -> Self {
        Self {
            ty: TypeKey::of::<T>(),
            nullable: false,
            zero: None,
        }
    }

    /// An `Option<T>`; its adapter is `T`'s.
    pub fn nullable<T: Send + Sync + 'static>() -> Self {
        Self {
            ty: TypeKey::of::<T>(),
            nullable: true,
            zero: None,
        }
    }

    /// Attaches the value used when an optional parameter of this shape has
    /// neither a token nor a default.
    pub fn with_zero(mut self, zero: fn() -> ArgValue) -> Self {
        self.zero = Some(zero);
        self
    }

    pub fn ty(&self) -> TypeKey {
        self.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Produces a fresh zero value, if the type has one.
    pub fn zero(&self) -> Option<ArgValue> {
        self.zero.map(|zero| zero())
    }

    pub fn has_zero(&self) -> bool {
        self.zero.is_some()
    }
}

impl PartialEq for ArgShape {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.nullable == other.nullable
    }
}

impl Eq for ArgShape {}

impl fmt::Debug for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "Option<{}>", self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}

// ============================================================================
// FromArg
// ============================================================================

/// Types that can be received as a handler argument.
pub trait FromArg: Sized + Send + 'static {
    /// The shape this type expects from the parameter definition.
    fn shape() -> ArgShape;

    /// Recovers the concrete value. `None` means the argument was left unset.
    fn from_arg(value: Option<ArgValue>) -> Result<Self, ArgumentError>;
}

/// Downcasts a set value to `T`.
pub fn downcast_arg<T: 'static>(value: ArgValue) -> Result<T, ArgumentError> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| ArgumentError::TypeMismatch {
            expected: type_name::<T>(),
        })
}

/// Downcasts a required argument to `T`.
pub fn required_arg<T: 'static>(value: Option<ArgValue>) -> Result<T, ArgumentError> {
    match value {
        Some(value) => downcast_arg(value),
        None => Err(ArgumentError::Missing {
            expected: type_name::<T>(),
        }),
    }
}

/// Implements [`FromArg`] for `T` and `Option<T>`.
///
/// The type still needs an adapter registered in the
/// [`TypeAdapterRegistry`](crate::TypeAdapterRegistry) before a definition
/// using it can be built.
#[macro_export]
macro_rules! impl_from_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::handler::FromArg for $ty {
                fn shape() -> $crate::handler::ArgShape {
                    $crate::handler::ArgShape::required::<$ty>()
                }

                fn from_arg(
                    value: ::std::option::Option<$crate::handler::ArgValue>,
                ) -> ::std::result::Result<Self, $crate::error::ArgumentError> {
                    $crate::handler::arg::required_arg::<$ty>(value)
                }
            }

            impl $crate::handler::FromArg for ::std::option::Option<$ty> {
                fn shape() -> $crate::handler::ArgShape {
                    $crate::handler::ArgShape::nullable::<$ty>()
                }

                fn from_arg(
                    value: ::std::option::Option<$crate::handler::ArgValue>,
                ) -> ::std::result::Result<Self, $crate::error::ArgumentError> {
                    value
                        .map($crate::handler::arg::downcast_arg::<$ty>)
                        .transpose()
                }
            }
        )*
    };
}

/// Built-in types: like `impl_from_arg!`, plus a zero value for the
/// non-nullable form.
macro_rules! impl_builtin_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromArg for $ty {
                fn shape() -> ArgShape {
                    ArgShape::required::<$ty>()
                        .with_zero(|| Box::new(<$ty>::default()) as ArgValue)
                }

                fn from_arg(value: Option<ArgValue>) -> Result<Self, ArgumentError> {
                    required_arg::<$ty>(value)
                }
            }

            impl FromArg for Option<$ty> {
                fn shape() -> ArgShape {
                    ArgShape::nullable::<$ty>()
                }

                fn from_arg(value: Option<ArgValue>) -> Result<Self, ArgumentError> {
                    value.map(downcast_arg::<$ty>).transpose()
                }
            }
        )*
    };
}

impl_builtin_arg!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, String,
);
