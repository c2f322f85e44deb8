//! Outbox 轮询器（OutboxPoller）
//!
//! 固定频率拉取到期条目并逐条投递：
//! `IDLE → FETCH_BATCH → (空 ⇒ IDLE) → 逐条 SEND → {OK, FAILED, FAILED_PARTIALLY} → IDLE`。
//!
//! - 非 OK 的条目单独标记失败，交由存储的退避/死信策略处理；
//! - 配置错误（`FATAL`）不可重试，条目直接进入死信；
//! - 整批全部 OK 才标记为已发送，否则其余条目保持待投递，下一轮重新取出（至少一次）；
//! - 单个后台任务驱动定时器，修改初始延迟、周期或批量大小会取消并重新调度，
//!   正在执行的轮次不会被打断。
//!
use super::store::{OutboxMessage, OutboxStore};
use crate::{
    config::{check_delay, duration_ms},
    error::{DispatchError, DispatchResult},
    execution::{EventConsumer, ExecutionResult},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 单条投递结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Ok,
    Failed { reason: String },
    FailedPartially { reason: String },
    /// 配置错误，重试也不会成功
    Fatal { reason: String },
}

impl SendOutcome {
    /// 汇总执行结果：全部成功为 OK，全部失败为 FAILED，其余为 FAILED_PARTIALLY
    pub fn classify(results: &[ExecutionResult]) -> Self {
        let failed: Vec<&ExecutionResult> = results.iter().filter(|r| !r.is_success()).collect();
        if failed.is_empty() {
            return SendOutcome::Ok;
        }

        let reason = failed
            .iter()
            .map(|r| match r.cause() {
                Some(cause) => format!("{}: {cause}", r.target()),
                None => r.target().to_string(),
            })
            .collect::<Vec<_>>()
            .join("; ");

        if failed.len() == results.len() {
            SendOutcome::Failed { reason }
        } else {
            SendOutcome::FailedPartially { reason }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SendOutcome::Ok)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SendOutcome::Ok => None,
            SendOutcome::Failed { reason }
            | SendOutcome::FailedPartially { reason }
            | SendOutcome::Fatal { reason } => Some(reason),
        }
    }
}

/// 轮询器的投递步骤
#[async_trait]
pub trait OutboxSender: Send + Sync {
    async fn send(&self, message: &OutboxMessage) -> SendOutcome;
}

/// 交给 `EventConsumer` 执行的默认投递
#[derive(Clone)]
pub struct ConsumerSender {
    consumer: Arc<dyn EventConsumer>,
}

impl ConsumerSender {
    pub fn new(consumer: Arc<dyn EventConsumer>) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl OutboxSender for ConsumerSender {
    async fn send(&self, message: &OutboxMessage) -> SendOutcome {
        let event = message.event();
        let results = match message.target() {
            Some(target) => self
                .consumer
                .consume_target(event, target)
                .await
                .map(|result| vec![result]),
            None => self.consumer.consume(event).await,
        };

        match results {
            Ok(results) => SendOutcome::classify(&results),
            Err(err) if err.is_configuration() => {
                error!(
                    event_type = event.event_type(),
                    event_id = event.event_id(),
                    error = %err,
                    "outbox delivery hit a configuration error"
                );
                SendOutcome::Fatal {
                    reason: err.to_string(),
                }
            }
            Err(err) => SendOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
    #[serde(with = "duration_ms")]
    pub period: Duration,
    pub max_batch_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            period: Duration::from_secs(1),
            max_batch_size: 100,
        }
    }
}

impl PollerConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.period.is_zero() {
            return Err(DispatchError::Config {
                reason: "poller period must be greater than zero".into(),
            });
        }
        if self.max_batch_size == 0 {
            return Err(DispatchError::Config {
                reason: "poller max_batch_size must be greater than zero".into(),
            });
        }
        check_delay("poller.initial_delay", self.initial_delay)?;
        check_delay("poller.period", self.period)
    }
}

/// 一轮轮询的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 整批是否已标记为发送成功
    pub batch_sent: bool,
}

#[derive(Clone)]
struct PollCycle {
    store: Arc<dyn OutboxStore>,
    sender: Arc<dyn OutboxSender>,
    // 同一时刻只执行一轮
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl PollCycle {
    async fn run(&self, max_batch_size: usize) -> DispatchResult<PollReport> {
        let _guard = self.gate.lock().await;

        let batch = self.store.fetch_batch(max_batch_size).await?;
        if batch.is_empty() {
            return Ok(PollReport::default());
        }

        let mut report = PollReport {
            fetched: batch.len(),
            ..PollReport::default()
        };

        for entry in batch.entries() {
            let outcome = self.sender.send(entry.message()).await;
            let Some(reason) = outcome.reason() else {
                report.succeeded += 1;
                continue;
            };

            report.failed += 1;
            warn!(
                entry_id = %entry.id(),
                event_type = entry.message().event().event_type(),
                partial = matches!(outcome, SendOutcome::FailedPartially { .. }),
                fatal = matches!(outcome, SendOutcome::Fatal { .. }),
                reason,
                "outbox entry delivery failed"
            );
            let marked = match outcome {
                SendOutcome::Fatal { .. } => self.store.mark_blocked(entry, reason).await,
                _ => self.store.mark_failed(entry, reason).await,
            };
            // 标记失败不影响同批其余条目；该条目保持原状态，下一轮重新取出
            if let Err(err) = marked {
                error!(
                    entry_id = %entry.id(),
                    error = %err,
                    "failed to record outbox entry failure"
                );
            }
        }

        if report.failed == 0 {
            self.store.mark_sent_successfully(&batch).await?;
            report.batch_sent = true;
        }

        debug!(
            fetched = report.fetched,
            succeeded = report.succeeded,
            failed = report.failed,
            batch_sent = report.batch_sent,
            "outbox poll cycle finished"
        );

        Ok(report)
    }
}

pub struct OutboxPoller {
    cycle: PollCycle,
    config: Mutex<PollerConfig>,
    running: Mutex<Option<CancellationToken>>,
}

impl OutboxPoller {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        sender: Arc<dyn OutboxSender>,
        config: PollerConfig,
    ) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            cycle: PollCycle {
                store,
                sender,
                gate: Arc::new(tokio::sync::Mutex::new(())),
            },
            config: Mutex::new(config),
            running: Mutex::new(None),
        })
    }

    /// 以 `ConsumerSender` 作为投递步骤
    pub fn with_consumer(
        store: Arc<dyn OutboxStore>,
        consumer: Arc<dyn EventConsumer>,
        config: PollerConfig,
    ) -> DispatchResult<Self> {
        Self::new(store, Arc::new(ConsumerSender::new(consumer)), config)
    }

    pub fn config(&self) -> DispatchResult<PollerConfig> {
        Ok(*lock(&self.config)?)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running)
            .map(|running| running.is_some())
            .unwrap_or(false)
    }

    /// 立即执行一轮
    pub async fn poll_once(&self) -> DispatchResult<PollReport> {
        let max_batch_size = self.config()?.max_batch_size;
        self.cycle.run(max_batch_size).await
    }

    /// 启动后台轮询；已在运行时先取消旧任务再重新调度
    pub fn start(&self) -> DispatchResult<()> {
        let config = self.config()?;
        let mut running = lock(&self.running)?;
        if let Some(token) = running.take() {
            token.cancel();
        }

        let token = CancellationToken::new();
        tokio::spawn(poll_loop(self.cycle.clone(), config, token.clone()));
        *running = Some(token);

        info!(
            initial_delay_ms = config.initial_delay.as_millis() as u64,
            period_ms = config.period.as_millis() as u64,
            max_batch_size = config.max_batch_size,
            "outbox poller started"
        );
        Ok(())
    }

    pub fn stop(&self) -> DispatchResult<()> {
        if let Some(token) = lock(&self.running)?.take() {
            token.cancel();
            info!("outbox poller stopped");
        }
        Ok(())
    }

    pub fn set_initial_delay(&self, initial_delay: Duration) -> DispatchResult<()> {
        self.reconfigure(|config| config.initial_delay = initial_delay)
    }

    pub fn set_period(&self, period: Duration) -> DispatchResult<()> {
        self.reconfigure(|config| config.period = period)
    }

    pub fn set_max_batch_size(&self, max_batch_size: usize) -> DispatchResult<()> {
        self.reconfigure(|config| config.max_batch_size = max_batch_size)
    }

    fn reconfigure(&self, update: impl FnOnce(&mut PollerConfig)) -> DispatchResult<()> {
        {
            let mut config = lock(&self.config)?;
            let mut next = *config;
            update(&mut next);
            next.validate()?;
            *config = next;
        }

        if self.is_running() {
            self.start()?;
        }
        Ok(())
    }
}

impl Drop for OutboxPoller {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(token) = running.take() {
                token.cancel();
            }
        }
    }
}

async fn poll_loop(cycle: PollCycle, config: PollerConfig, token: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + config.initial_delay, config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = cycle.run(config.max_batch_size).await {
                    error!(error = %err, "outbox poll cycle failed");
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> DispatchResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| DispatchError::outbox(e.to_string()))
}
