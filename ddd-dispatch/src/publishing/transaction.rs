//! 事务边界（TransactionBoundary）
//!
//! 发布侧只需要两件事：当前是否处于事务中，以及在提交后执行回调。
//! 回滚时已登记的回调被丢弃，永远不会执行。
//!
use crate::error::{DispatchError, DispatchResult};
use futures_util::future::BoxFuture;
use std::sync::Mutex;

/// 事务提交后执行的回调
pub type AfterCommit = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub trait TransactionBoundary: Send + Sync {
    /// 事务状态无法读取时返回错误，而不是当作无事务
    fn is_active(&self) -> DispatchResult<bool>;

    /// 登记提交后回调；无活动事务时返回错误
    fn register_after_commit(&self, callback: AfterCommit) -> DispatchResult<()>;
}

/// 基于内存的事务边界，适用于测试与单进程场景
#[derive(Default)]
pub struct InMemoryTransactionBoundary {
    current: Mutex<Option<Vec<AfterCommit>>>,
}

impl InMemoryTransactionBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> DispatchResult<()> {
        let mut current = self.lock()?;
        if current.is_some() {
            return Err(DispatchError::transaction("transaction already active"));
        }
        *current = Some(Vec::new());
        Ok(())
    }

    /// 提交事务并按登记顺序执行回调
    pub async fn commit(&self) -> DispatchResult<()> {
        let callbacks = self
            .lock()?
            .take()
            .ok_or_else(|| DispatchError::transaction("no active transaction to commit"))?;

        for callback in callbacks {
            callback().await;
        }
        Ok(())
    }

    pub fn rollback(&self) -> DispatchResult<()> {
        self.lock()?
            .take()
            .map(drop)
            .ok_or_else(|| DispatchError::transaction("no active transaction to roll back"))
    }

    fn lock(&self) -> DispatchResult<std::sync::MutexGuard<'_, Option<Vec<AfterCommit>>>> {
        self.current
            .lock()
            .map_err(|e| DispatchError::transaction(e.to_string()))
    }
}

impl TransactionBoundary for InMemoryTransactionBoundary {
    fn is_active(&self) -> DispatchResult<bool> {
        Ok(self.lock()?.is_some())
    }

    fn register_after_commit(&self, callback: AfterCommit) -> DispatchResult<()> {
        match self.lock()?.as_mut() {
            Some(callbacks) => {
                callbacks.push(callback);
                Ok(())
            }
            None => Err(DispatchError::transaction("no active transaction")),
        }
    }
}
