//! Handler service for the Herald framework.
//!
//! [`HandlerService<H, C, T>`] wraps a single typed handler and implements
//! `tower::Service<Invocation>`. Definitions store it boxed as a
//! [`BoxedHandler`], so middleware is expressed as ordinary tower layers
//! stacked on top.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use herald_core::{Reply, RichContent};
use tower::Service;
use tower::util::BoxCloneSyncService;

use super::arg::ArgValue;
use super::traits::Handler;
use crate::error::BoxError;
use crate::event::CommandEvent;

/// A type-erased handler: the form stored in every definition.
pub type BoxedHandler = BoxCloneSyncService<Invocation, Option<Reply>, BoxError>;

// ============================================================================
// Invocation
// ============================================================================

/// Everything a handler call receives: the controller instance from the
/// session's runtime, the command event, and the adapted arguments in
/// declaration order.
pub struct Invocation {
    instance: Arc<dyn Any + Send + Sync>,
    event: CommandEvent,
    arguments: Vec<Option<ArgValue>>,
}

impl Invocation {
    pub fn new(
        instance: Arc<dyn Any + Send + Sync>,
        event: CommandEvent,
        arguments: Vec<Option<ArgValue>>,
    ) -> Self {
        Self {
            instance,
            event,
            arguments,
        }
    }

    pub fn event(&self) -> &CommandEvent {
        &self.event
    }

    pub fn arguments(&self) -> &[Option<ArgValue>] {
        &self.arguments
    }

    pub fn into_parts(
        self,
    ) -> (
        Arc<dyn Any + Send + Sync>,
        CommandEvent,
        Vec<Option<ArgValue>>,
    ) {
        (self.instance, self.event, self.arguments)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("label", &self.event.definition().label())
            .field("arguments", &self.arguments.len())
            .finish()
    }
}

// ============================================================================
// HandlerOutput
// ============================================================================

/// Types a handler may return.
///
/// A returned reply is sent through the event's reply context once the handler
/// finishes; an `Err` becomes a handler failure.
pub trait HandlerOutput: Send + 'static {
    fn into_output(self) -> Result<Option<Reply>, BoxError>;
}

impl HandlerOutput for () {
    fn into_output(self) -> Result<Option<Reply>, BoxError> {
        Ok(None)
    }
}

impl HandlerOutput for String {
    fn into_output(self) -> Result<Option<Reply>, BoxError> {
        Ok(Some(Reply::Text(self)))
    }
}

impl HandlerOutput for &'static str {
    fn into_output(self) -> Result<Option<Reply>, BoxError> {
        Ok(Some(Reply::text(self)))
    }
}

impl HandlerOutput for Reply {
    fn into_output(self) -> Result<Option<Reply>, BoxError> {
        Ok(Some(self))
    }
}

impl HandlerOutput for RichContent {
    fn into_output(self) -> Result<Option<Reply>, BoxError> {
        Ok(Some(Reply::Rich(self)))
    }
}

impl<T: HandlerOutput> HandlerOutput for Option<T> {
    fn into_output(self) -> Result<Option<Reply>, BoxError> {
        match self {
            Some(inner) => inner.into_output(),
            None => Ok(None),
        }
    }
}

impl<T, E> HandlerOutput for Result<T, E>
where
    T: HandlerOutput,
    E: Into<BoxError> + Send + 'static,
{
    fn into_output(self) -> Result<Option<Reply>, BoxError> {
        match self {
            Ok(inner) => inner.into_output(),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single typed handler.
///
/// `C` is the controller type and `T` the tuple of argument types; both only
/// select the [`Handler`] impl.
pub struct HandlerService<H, C, T> {
    handler: H,
    _marker: PhantomData<fn() -> (C, T)>,
}

impl<H, C, T> HandlerService<H, C, T> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<H: Clone, C, T> Clone for HandlerService<H, C, T> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<H, C, T> Service<Invocation> for HandlerService<H, C, T>
where
    H: Handler<C, T>,
{
    type Response = Option<Reply>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Option<Reply>, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        self.handler.clone().call(invocation)
    }
}

/// Boxes a handler into the form stored in definitions.
pub fn into_boxed_handler<H, C, T>(handler: H) -> BoxedHandler
where
    H: Handler<C, T>,
    C: 'static,
    T: 'static,
{
    BoxCloneSyncService::new(HandlerService::new(handler))
}
