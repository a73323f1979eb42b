//! Business-logic seam: the operation-specific step of the pipeline.

use super::context::RequestContext;
use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

#[async_trait]
pub trait BusinessLogic: Send + Sync {
    async fn call(&self, ctx: &RequestContext) -> Result<Value, AppError>;
}

/// Business logic from an async closure. The closure's output is serialized
/// with its `Serialize` impl.
pub struct LogicFn<F>(F);

pub fn logic_fn<F, Fut, T>(f: F) -> LogicFn<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, AppError>> + Send,
    T: Serialize + Send,
{
    LogicFn(f)
}

#[async_trait]
impl<F, Fut, T> BusinessLogic for LogicFn<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, AppError>> + Send,
    T: Serialize + Send,
{
    async fn call(&self, ctx: &RequestContext) -> Result<Value, AppError> {
        let out = (self.0)(ctx.clone()).await?;
        Ok(serde_json::to_value(out)?)
    }
}
