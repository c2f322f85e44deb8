//! 执行上下文处理（ExecutionContextProcessor）
//!
//! 按上下文种类分派到对应的调用方式，并把错误与 panic 都收敛为失败的
//! `ExecutionResult`，保证一个处理者失败不影响同一事件的其他处理者。
//!
use super::context::{ExecutionContext, ExecutionResult};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionContextProcessor;

impl ExecutionContextProcessor {
    pub fn new() -> Self {
        Self
    }

    pub async fn process(&self, context: &ExecutionContext) -> ExecutionResult {
        let target = context.target();

        let outcome = match context {
            ExecutionContext::Service(ctx) => {
                AssertUnwindSafe(ctx.method().invoker.invoke(&**ctx.handler(), ctx.event()))
                    .catch_unwind()
                    .await
            }
            ExecutionContext::Aggregate(ctx) => AssertUnwindSafe(ctx.method().invoker.invoke(
                &**ctx.repository(),
                ctx.target_id(),
                ctx.event(),
            ))
            .catch_unwind()
            .await,
        };

        let cause = match outcome {
            Ok(Ok(())) => return ExecutionResult::success(target),
            Ok(Err(err)) => err,
            Err(panic) => anyhow::anyhow!("listener panicked: {}", panic_message(panic.as_ref())),
        };

        warn!(
            event_type = context.event().event_type(),
            event_id = context.event().event_id(),
            handler = context.handler_type(),
            method = context.method_name(),
            error = %cause,
            "listener failed"
        );

        ExecutionResult::failure(target, cause)
    }

    /// 按探测顺序逐个执行，后一个处理者可观察到前一个处理者已完成的副作用
    pub async fn process_all(&self, contexts: &[ExecutionContext]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(contexts.len());
        for context in contexts {
            results.push(self.process(context).await);
        }
        results
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
