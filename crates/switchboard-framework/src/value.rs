//! Type-erased values flowing between resolvers, handlers and return-value
//! handlers.

use std::any::{Any, TypeId, type_name};
use std::fmt;

use tower::BoxError;

use switchboard_core::OutboundRequest;

/// Runtime identity of a Rust type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

trait AnyDebug: Any + Send + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send + fmt::Debug> AnyDebug for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Stand-in left behind when a value could not be taken out of its box.
#[derive(Debug)]
struct Moved;

/// An owned, type-erased value that can still be printed for diagnostics.
pub struct ErasedValue {
    ty: ValueType,
    value: Box<dyn AnyDebug>,
}

impl ErasedValue {
    pub fn new<T: Any + Send + fmt::Debug>(value: T) -> Self {
        Self {
            ty: ValueType::of::<T>(),
            value: Box::new(value),
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    pub fn is<T: Any>(&self) -> bool {
        self.ty.is::<T>()
    }

    /// Borrows the value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        // Deref first: the box itself also satisfies `AnyDebug`.
        (*self.value).as_any().downcast_ref::<T>()
    }

    /// Takes the value out as `T`, or gives `self` back on a type mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        if !self.is::<T>() {
            return Err(self);
        }
        let ty = self.ty;
        self.value
            .into_any()
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| Self {
                ty,
                value: Box::new(Moved),
            })
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.value, f)
    }
}

/// One resolved handler argument.
pub type Argument = ErasedValue;

/// Renders resolved arguments for error reports.
pub fn dump_arguments(arguments: &[Argument]) -> String {
    let parts: Vec<String> = arguments.iter().map(|a| format!("{a:?}")).collect();
    format!("[{}]", parts.join(", "))
}

// ============================================================================
// Return values
// ============================================================================

/// What a handler produced, after `Option` and `Result` are flattened.
#[derive(Debug)]
pub struct ReturnValue(ErasedValue);

impl ReturnValue {
    pub fn new<T: Any + Send + fmt::Debug>(value: T) -> Self {
        Self(ErasedValue::new(value))
    }

    /// The "nothing to send" value; also what `None` flattens to.
    pub fn unit() -> Self {
        Self::new(())
    }

    pub fn value_type(&self) -> ValueType {
        self.0.value_type()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn is_unit(&self) -> bool {
        self.is::<()>()
    }

    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        self.0.downcast().map_err(Self)
    }
}

/// Converts a handler's output into a [`ReturnValue`].
///
/// `Err` outputs become handler failures.
pub trait IntoReturnValue: Send + 'static {
    fn into_return_value(self) -> Result<ReturnValue, BoxError>;
}

macro_rules! impl_into_return_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReturnValue for $ty {
                fn into_return_value(self) -> Result<ReturnValue, BoxError> {
                    Ok(ReturnValue::new(self))
                }
            }
        )*
    };
}

impl_into_return_value!((), String, &'static str, OutboundRequest);

impl IntoReturnValue for ReturnValue {
    fn into_return_value(self) -> Result<ReturnValue, BoxError> {
        Ok(self)
    }
}

impl<T: IntoReturnValue> IntoReturnValue for Option<T> {
    fn into_return_value(self) -> Result<ReturnValue, BoxError> {
        match self {
            Some(value) => value.into_return_value(),
            None => Ok(ReturnValue::unit()),
        }
    }
}

impl<T, E> IntoReturnValue for Result<T, E>
where
    T: IntoReturnValue,
    E: Into<BoxError> + Send + 'static,
{
    fn into_return_value(self) -> Result<ReturnValue, BoxError> {
        self.map_err(Into::into)?.into_return_value()
    }
}
