//! The [`Handler`] trait.
//!
//! Handlers are plain async functions. The first parameter is the controller
//! instance owned by the session's runtime, the second the [`CommandEvent`],
//! and the rest are the command's parameters in declaration order:
//!
//! ```rust,ignore
//! struct Greeter;
//!
//! async fn greet(_: Arc<Greeter>, _event: CommandEvent, name: String, times: Option<u8>) -> String {
//!     format!("Hello, {name}!").repeat(times.unwrap_or(1) as usize)
//! }
//! ```
//!
//! The trait is implemented for such functions with up to 16 parameters,
//! similar to Axum's handler system. [`Handler::signature`] exposes the
//! parameter shapes so a definition can check them against its declared
//! parameters before any dispatch happens.

use std::any::type_name;
use std::sync::Arc;

use futures::future::BoxFuture;
use herald_core::Reply;

use super::arg::{ArgShape, FromArg};
use super::service::{HandlerOutput, Invocation};
use crate::error::{ArgumentError, BoxError};
use crate::event::CommandEvent;

/// A typed command handler bound to controller type `C`.
pub trait Handler<C, T>: Clone + Send + Sync + 'static {
    /// Shapes of the command parameters, in order.
    fn signature() -> Vec<ArgShape>;

    /// Calls the handler.
    fn call(self, invocation: Invocation) -> BoxFuture<'static, Result<Option<Reply>, BoxError>>;
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, Res, C, $($ty,)*> Handler<C, ($($ty,)*)> for F
        where
            F: FnOnce(Arc<C>, CommandEvent, $($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: HandlerOutput,
            C: Send + Sync + 'static,
            $( $ty: FromArg, )*
        {
            fn signature() -> Vec<ArgShape> {
                vec![$($ty::shape(),)*]
            }

            fn call(self, invocation: Invocation) -> BoxFuture<'static, Result<Option<Reply>, BoxError>> {
                Box::pin(async move {
                    let (instance, event, arguments) = invocation.into_parts();
                    let instance = instance.downcast::<C>().map_err(|_| {
                        ArgumentError::InstanceMismatch {
                            expected: type_name::<C>(),
                        }
                    })?;
                    let mut arguments = arguments.into_iter();
                    $(
                        let $ty = $ty::from_arg(arguments.next().flatten())?;
                    )*

                    (self)(instance, event, $($ty,)*).await.into_output()
                })
            }
        }
    };
}

// Generate implementations for 0-16 parameters
impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15
);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15, T16
);
