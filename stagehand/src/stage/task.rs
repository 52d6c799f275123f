//! Stage callbacks and their type-erased task form.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use super::StageContext;
use crate::container::Component;
use crate::errors::BoxError;
use crate::registry::Value;

/// Future returned by a stage callback.
pub type StageFuture = BoxFuture<'static, Result<(), BoxError>>;

/// Callback run for a component of type `T` when its stage executes.
///
/// The callback receives a clone of the ready component value.
pub struct StageCallback<T> {
    callback: Arc<dyn Fn(StageContext, T) -> StageFuture + Send + Sync>,
}

impl<T: Component> StageCallback<T> {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(StageContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            callback: Arc::new(move |ctx, value| callback(ctx, value).boxed()),
        }
    }

    fn call(&self, ctx: StageContext, value: T) -> StageFuture {
        (self.callback)(ctx, value)
    }
}

impl<T> Clone for StageCallback<T> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Type-erased stage task stored in the binding table.
///
/// The executor only sees this trait; the concrete component type is
/// recovered inside [`TypedStage`].
#[async_trait]
pub(crate) trait StageTask: Send + Sync {
    async fn run(&self, ctx: StageContext, value: Value) -> Result<(), BoxError>;
}

pub(crate) struct TypedStage<T> {
    callback: StageCallback<T>,
    _component: PhantomData<fn() -> T>,
}

impl<T: Component> TypedStage<T> {
    pub(crate) fn new(callback: StageCallback<T>) -> Self {
        Self {
            callback,
            _component: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Component> StageTask for TypedStage<T> {
    async fn run(&self, ctx: StageContext, value: Value) -> Result<(), BoxError> {
        let Some(component) = value.downcast_ref::<T>().cloned() else {
            // Bindings are keyed by the same coordinate as the value.
            tracing::trace!(coordinate = %ctx.coordinate(), "Stage value type mismatch");
            return Ok(());
        };

        self.callback.call(ctx, component).await
    }
}
