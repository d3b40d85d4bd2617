//! Command Queue (spec §3 `QueueItem`, §4.1, §5).
//!
//! A priority queue with preemption, grounded on the `BinaryHeap`-based
//! order-execution queue pattern seen across the retrieved corpus (a
//! five-level `Ord`-derived priority enum feeding a max-heap). The
//! difference from that pattern: here the heap only ever holds *pending*
//! work; the single "currently running" slot lives beside it, and a
//! `watch` channel tells the running executor it has been asked to step
//! aside.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bot::{BotState, BotStateValue};
use crate::error::OrchestratorResult;

/// Work-source priority (spec §4.1). Declared low-to-high so the derived
/// `Ord` makes `Critical` the greatest, exactly what a max-heap needs to
/// always surface the most urgent pending item first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Signal an executor polls at its suspension points to learn it has been
/// asked to step aside for a higher-priority arrival (spec §4.1, §5
/// "Cancellation semantics").
pub type PreemptSignal = watch::Receiver<bool>;

pub type ExecutorFuture = Pin<Box<dyn Future<Output = OrchestratorResult<()>> + Send>>;

/// The executor is `Fn` rather than `FnOnce` because a preempted item is
/// re-enqueued and must be runnable again from a clean start (spec §5:
/// "Re-enqueue happens before the preempting item begins").
pub type Executor<Ctx> = Arc<dyn Fn(Ctx, PreemptSignal) -> ExecutorFuture + Send + Sync>;

pub struct QueueItem<Ctx> {
    pub name: String,
    pub priority: Priority,
    pub interruptible: bool,
    pub executor: Executor<Ctx>,
    pub enqueued_at: Instant,
    seq: u64,
}

impl<Ctx> std::fmt::Debug for QueueItem<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueItem")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("interruptible", &self.interruptible)
            .field("seq", &self.seq)
            .finish()
    }
}

impl<Ctx> PartialEq for QueueItem<Ctx> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl<Ctx> Eq for QueueItem<Ctx> {}

impl<Ctx> PartialOrd for QueueItem<Ctx> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<Ctx> Ord for QueueItem<Ctx> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Higher priority first; within a priority, lower seq (earlier
        // enqueue) first. A `BinaryHeap` is a max-heap so the tie-break
        // must be reversed.
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Trait an orchestrator context must satisfy to be driven by the queue:
/// it must expose the single shared mutual-exclusion token.
pub trait HasBotState {
    fn bot_state(&self) -> &BotState;
}

/// Priority queue of pending work, with preemption of the running item
/// (spec §4.1).
pub struct CommandQueue<Ctx> {
    heap: Mutex<BinaryHeap<QueueItem<Ctx>>>,
    seq_counter: AtomicU64,
    running: Mutex<Option<RunningItem>>,
}

struct RunningItem {
    priority: Priority,
    interruptible: bool,
    preempt_tx: watch::Sender<bool>,
}

impl<Ctx: Clone + HasBotState + Send + 'static> CommandQueue<Ctx> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq_counter: AtomicU64::new(0),
            running: Mutex::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Insert in priority order, FIFO within a priority (spec §4.1). If the
    /// currently running item is interruptible and this arrival strictly
    /// outranks it, raise the preemption signal; the running executor must
    /// observe it at its next suspension point.
    pub fn enqueue(
        &self,
        name: impl Into<String>,
        priority: Priority,
        interruptible: bool,
        executor: Executor<Ctx>,
    ) {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);
        let item = QueueItem {
            name: name.into(),
            priority,
            interruptible,
            executor,
            enqueued_at: Instant::now(),
            seq,
        };

        if let Some(running) = self.running.lock().as_ref() {
            if running.interruptible && priority > running.priority {
                debug!(name = %item.name, ?priority, "raising preemption signal for running item");
                let _ = running.preempt_tx.send(true);
            }
        }

        debug!(name = %item.name, ?priority, interruptible, "enqueued");
        self.heap.lock().push(item);
    }

    fn pop_next(&self, bot_idle: bool) -> Option<QueueItem<Ctx>> {
        let mut heap = self.heap.lock();
        // Never dequeue while busy unless the head is Critical with an
        // explicit preemption mandate. Critical items are always allowed
        // to force their way in (spec §4.1).
        match heap.peek() {
            Some(top) if bot_idle || top.priority == Priority::Critical => heap.pop(),
            _ => None,
        }
    }

    /// Single-tasked cooperative loop (spec §4.1 `run_loop`). Pops the
    /// head, claims the BotState token, awaits completion-or-preemption,
    /// and on return resumes popping. Intended to be driven from one task;
    /// concurrency only arises from interleaved I/O producing new enqueues.
    pub async fn run_loop(&self, ctx: Ctx, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let bot_idle = ctx.bot_state().is_idle();
            let item = match self.pop_next(bot_idle) {
                Some(item) => item,
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_millis(5)) => {},
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
            };
            self.run_item(ctx.clone(), item).await;
        }
    }

    async fn run_item(&self, ctx: Ctx, item: QueueItem<Ctx>) {
        let (preempt_tx, preempt_rx) = watch::channel(false);
        *self.running.lock() = Some(RunningItem {
            priority: item.priority,
            interruptible: item.interruptible,
            preempt_tx,
        });

        let name = item.name.clone();
        let priority = item.priority;
        let interruptible = item.interruptible;
        let executor = item.executor.clone();

        info!(name = %name, ?priority, "executor starting");
        let result = (executor)(ctx.clone(), preempt_rx).await;
        *self.running.lock() = None;

        match result {
            Ok(()) => info!(name = %name, "executor completed"),
            Err(crate::error::OrchestratorError::Preempted) => {
                warn!(name = %name, "executor preempted, re-enqueuing");
                self.enqueue(name, priority, interruptible, executor);
                return;
            }
            Err(e) => warn!(name = %name, error = %e, "executor returned recoverable error"),
        }

        // Every exit path restores Idle (spec I2) unless a nested Critical
        // action already claimed the token on our way out.
        if !matches!(ctx.bot_state().get(), BotStateValue::GracePeriod | BotStateValue::Startup) {
            ctx.bot_state().set(BotStateValue::Idle);
        }
    }
}

impl<Ctx: Clone + HasBotState + Send + 'static> Default for CommandQueue<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    struct TestCtx {
        bot_state: Arc<BotState>,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl HasBotState for TestCtx {
        fn bot_state(&self) -> &BotState {
            &self.bot_state
        }
    }

    fn make_executor(label: &'static str) -> Executor<TestCtx> {
        Arc::new(move |ctx: TestCtx, _preempt: PreemptSignal| {
            Box::pin(async move {
                ctx.order.lock().push(label.to_string());
                Ok(())
            })
        })
    }

    #[test]
    fn priority_orders_critical_above_low() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[tokio::test]
    async fn equal_priority_items_run_in_enqueue_order() {
        let bot_state = Arc::new(BotState::new());
        bot_state.set(BotStateValue::Idle);
        let order = Arc::new(Mutex::new(Vec::new()));
        let ctx = TestCtx { bot_state: bot_state.clone(), order: order.clone() };
        let queue: CommandQueue<TestCtx> = CommandQueue::new();

        queue.enqueue("first", Priority::Normal, true, make_executor("first"));
        queue.enqueue("second", Priority::Normal, true, make_executor("second"));
        queue.enqueue("third", Priority::Normal, true, make_executor("third"));

        let (_tx, rx) = watch::channel(false);
        for _ in 0..3 {
            let item = queue.pop_next(true).expect("item");
            queue.run_item(ctx.clone(), item).await;
        }
        drop(rx);

        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn higher_priority_completes_before_earlier_lower_priority_item() {
        let bot_state = Arc::new(BotState::new());
        bot_state.set(BotStateValue::Idle);
        let order = Arc::new(Mutex::new(Vec::new()));
        let ctx = TestCtx { bot_state: bot_state.clone(), order: order.clone() };
        let queue: CommandQueue<TestCtx> = CommandQueue::new();

        queue.enqueue("low", Priority::Low, true, make_executor("low"));
        queue.enqueue("critical", Priority::Critical, true, make_executor("critical"));

        let item = queue.pop_next(true).expect("critical first");
        assert_eq!(item.name, "critical");
        queue.run_item(ctx.clone(), item).await;

        let item = queue.pop_next(true).expect("low second");
        assert_eq!(item.name, "low");
        queue.run_item(ctx, item).await;

        assert_eq!(*order.lock(), vec!["critical", "low"]);
    }

    #[tokio::test]
    async fn preempted_item_is_re_enqueued_before_preempting_item_runs() {
        let bot_state = Arc::new(BotState::new());
        bot_state.set(BotStateValue::Idle);
        let completed = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let ctx = TestCtx { bot_state: bot_state.clone(), order: order.clone() };
        let queue: Arc<CommandQueue<TestCtx>> = Arc::new(CommandQueue::new());

        let completed_clone = completed.clone();
        let interruptible_exec: Executor<TestCtx> = Arc::new(move |_ctx, mut preempt: PreemptSignal| {
            let completed = completed_clone.clone();
            Box::pin(async move {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    _ = preempt.changed() => Err(crate::error::OrchestratorError::Preempted),
                }
            })
        });

        queue.enqueue("interruptible", Priority::Normal, true, interruptible_exec);

        let q2 = queue.clone();
        let ctx2 = ctx.clone();
        let run_handle = tokio::spawn(async move {
            let item = q2.pop_next(true).expect("interruptible item");
            q2.run_item(ctx2, item).await;
        });

        // give the executor a moment to start awaiting the preempt signal
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.enqueue("critical", Priority::Critical, true, make_executor("critical"));
        run_handle.await.unwrap();

        // the preempted item must now be back on the heap
        assert_eq!(queue.len(), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}
