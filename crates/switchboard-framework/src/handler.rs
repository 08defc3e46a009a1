//! Handler system for Switchboard.
//!
//! Handlers are plain async functions. Their parameters implement
//! [`Param`] and their output implements [`IntoReturnValue`]:
//!
//! ```rust,ignore
//! use switchboard_framework::{PathVars, SessionState, Text};
//!
//! // No parameters, no reply
//! async fn ping() {}
//!
//! // Reply with text
//! async fn echo(text: Text) -> String {
//!     text.0
//! }
//!
//! // Captured variables, session state and a fallible body
//! async fn pick(vars: PathVars, picks: SessionState<Picks>) -> Result<String, MyError> {
//!     let n: u8 = vars.parse("var").ok_or(MyError::NotANumber)?;
//!     picks.record(n);
//!     Ok(format!("picked {n}"))
//! }
//! ```
//!
//! [`Handler`] is implemented for such functions with up to 16 parameters.
//! [`into_handler`] erases the concrete type into a [`BoxedHandler`], which
//! exposes the parameter list and invokes the function with positionally
//! matched, already resolved [`Argument`]s.

use std::any::type_name;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::InvocationError;
use crate::param::{Param, ParamDescriptor};
use crate::value::{Argument, IntoReturnValue, ReturnValue};

/// Outcome of one handler invocation.
pub type InvocationResult = Result<ReturnValue, InvocationError>;

// ============================================================================
// Handler Trait
// ============================================================================

/// An async function usable as a route target.
///
/// # Blanket Implementation
///
/// Implemented for functions that:
/// - take 0-16 parameters implementing [`Param`]
/// - return a future whose output implements [`IntoReturnValue`]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Descriptors of the parameters, in declaration order.
    fn params() -> Vec<ParamDescriptor>;

    /// Invokes the function with resolved arguments.
    fn invoke(self, args: Vec<Argument>) -> BoxFuture<'static, InvocationResult>;
}

// ============================================================================
// ErasedHandler - Type-erased handler stored in the registry
// ============================================================================

/// A handler with its concrete type erased.
pub trait ErasedHandler: Send + Sync + 'static {
    fn params(&self) -> &[ParamDescriptor];

    /// Invokes the handler. Panics inside the handler are returned as
    /// [`InvocationError::Panicked`].
    fn invoke(&self, args: Vec<Argument>) -> BoxFuture<'static, InvocationResult>;

    /// The handler function's type name, for diagnostics.
    fn type_name(&self) -> &'static str;
}

/// A shared, type-erased handler.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Adapts a [`Handler`] into an [`ErasedHandler`].
pub struct HandlerFn<F, T> {
    f: F,
    params: Vec<ParamDescriptor>,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> HandlerFn<F, T>
where
    F: Handler<T>,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            params: F::params(),
            _marker: PhantomData,
        }
    }
}

impl<F, T> ErasedHandler for HandlerFn<F, T>
where
    F: Handler<T>,
    T: 'static,
{
    fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    fn invoke(&self, args: Vec<Argument>) -> BoxFuture<'static, InvocationResult> {
        let fut = self.f.clone().invoke(args);
        AssertUnwindSafe(fut)
            .catch_unwind()
            .map(|outcome| outcome.unwrap_or_else(|panic| Err(InvocationError::Panicked(panic_message(&*panic)))))
            .boxed()
    }

    fn type_name(&self) -> &'static str {
        type_name::<F>()
    }
}

/// Erases a handler function.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T>,
    T: 'static,
{
    Arc::new(HandlerFn::new(f))
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Handler implementations for functions
// ============================================================================

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: IntoReturnValue,
            $( $ty: Param, )*
        {
            fn params() -> Vec<ParamDescriptor> {
                vec![$($ty::descriptor(),)*]
            }

            fn invoke(self, args: Vec<Argument>) -> BoxFuture<'static, InvocationResult> {
                Box::pin(async move {
                    let names: &[&str] = &[$(stringify!($ty)),*];
                    if args.len() != names.len() {
                        return Err(InvocationError::Arity {
                            expected: names.len(),
                            found: args.len(),
                        });
                    }

                    let mut args = args.into_iter();
                    let mut position = 0usize;
                    $(
                        let $ty = match args.next() {
                            Some(arg) => arg.downcast::<$ty>().map_err(|arg| {
                                InvocationError::ArgumentType {
                                    index: position,
                                    expected: type_name::<$ty>(),
                                    found: arg.value_type().name(),
                                }
                            })?,
                            None => {
                                return Err(InvocationError::MissingArgument {
                                    index: position,
                                    expected: type_name::<$ty>(),
                                });
                            }
                        };
                        position += 1;
                    )*

                    let res = (self)($($ty,)*).await;
                    res.into_return_value().map_err(InvocationError::Handler)
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
