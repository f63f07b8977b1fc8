//! In-process queue.
//!
//! Jobs live in an unbounded channel drained by a single dispatcher task,
//! which spawns one task per job under a semaphore sized by
//! `queue.concurrency`. A submitted id is rejected as a duplicate while its
//! job is pending or running, and for `queue.retain_finished_ms` after the
//! job finishes. Expired ids are pruned by the dispatcher.

use crate::{Job, JobHandler, QueueError, QueueInterface};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use solver_config::{BackoffKind, QueueBackoff, QueueConfig};
use solver_types::JobName;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Known job ids: `None` while the job is pending or running, the finish
/// time afterwards.
type SeenIds = Arc<DashMap<String, Option<Instant>>>;

pub struct MemoryQueue {
	config: QueueConfig,
	seen: SeenIds,
	sender: mpsc::UnboundedSender<Job>,
	receiver: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
	closed: Arc<AtomicBool>,
	workers: Arc<Semaphore>,
	stop: Mutex<Option<oneshot::Sender<()>>>,
	dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryQueue {
	pub fn new(config: QueueConfig) -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		Self {
			workers: Arc::new(Semaphore::new(config.concurrency.max(1))),
			config,
			seen: Arc::new(DashMap::new()),
			sender,
			receiver: Mutex::new(Some(receiver)),
			closed: Arc::new(AtomicBool::new(false)),
			stop: Mutex::new(None),
			dispatcher: Mutex::new(None),
		}
	}

	fn retention(&self) -> Duration {
		Duration::from_millis(self.config.retain_finished_ms)
	}

	async fn dispatch(
		mut receiver: mpsc::UnboundedReceiver<Job>,
		mut stop: oneshot::Receiver<()>,
		ctx: Delivery,
	) {
		let mut prune = tokio::time::interval(ctx.retention.max(Duration::from_secs(1)));
		loop {
			tokio::select! {
				_ = prune.tick() => {
					prune_seen(&ctx.seen, ctx.retention);
				}
				job = receiver.recv() => {
					let Some(job) = job else {
						break;
					};
					let permit = match ctx.workers.clone().acquire_owned().await {
						Ok(permit) => permit,
						Err(e) => {
							error!("Failed to acquire worker permit: {}", e);
							break;
						}
					};
					tokio::spawn(ctx.clone().run(job, permit));
				}
				_ = &mut stop => {
					break;
				}
			}
		}
		debug!("Queue dispatcher stopped");
	}
}

/// Everything a running job needs to finish or reschedule itself.
#[derive(Clone)]
struct Delivery {
	handler: Arc<dyn JobHandler>,
	sender: mpsc::UnboundedSender<Job>,
	closed: Arc<AtomicBool>,
	workers: Arc<Semaphore>,
	seen: SeenIds,
	retention: Duration,
	attempts: u32,
	backoff: QueueBackoff,
}

impl Delivery {
	async fn run(self, mut job: Job, permit: OwnedSemaphorePermit) {
		let result = self.handler.handle(&job).await;
		drop(permit);

		let err = match result {
			Ok(()) => {
				debug!(job = %job.name, job_id = %job.id, "Job completed");
				self.finish(&job);
				return;
			}
			Err(err) => err,
		};

		let attempt = job.attempts_made + 1;
		if !err.retryable || attempt >= self.attempts {
			error!(
				job = %job.name,
				job_id = %job.id,
				attempt,
				retryable = err.retryable,
				"Job failed: {}",
				err
			);
			self.finish(&job);
			return;
		}

		let delay = backoff_delay(self.backoff, job.attempts_made);
		warn!(
			job = %job.name,
			job_id = %job.id,
			attempt,
			delay_ms = delay.as_millis() as u64,
			"Job failed, retrying: {}",
			err
		);
		job.attempts_made = attempt;

		tokio::time::sleep(delay).await;
		if self.closed.load(Ordering::SeqCst) {
			warn!(job_id = %job.id, "Queue closed, dropping retry");
			self.finish(&job);
			return;
		}
		if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
			warn!(job_id = %job.id, "Queue channel closed, dropping retry");
			self.finish(&job);
		}
	}

	/// Starts the retention window of the job's id.
	fn finish(&self, job: &Job) {
		self.seen.insert(job.id.clone(), Some(Instant::now()));
	}
}

fn is_retained(finished: Option<Instant>, retention: Duration) -> bool {
	finished.map_or(true, |at| at.elapsed() < retention)
}

/// Forgets ids whose job finished more than `retention` ago.
fn prune_seen(seen: &DashMap<String, Option<Instant>>, retention: Duration) {
	let before = seen.len();
	seen.retain(|_, finished| is_retained(*finished, retention));
	let pruned = before.saturating_sub(seen.len());
	if pruned > 0 {
		debug!(pruned, "Pruned finished job ids");
	}
}

/// Delay before redelivering a job that has already been delivered
/// `attempts_made + 1` times.
pub fn backoff_delay(backoff: QueueBackoff, attempts_made: u32) -> Duration {
	let ms = match backoff.kind {
		BackoffKind::Fixed => backoff.delay_ms,
		BackoffKind::Exponential => {
			backoff.delay_ms.saturating_mul(2u64.saturating_pow(attempts_made))
		}
	};
	Duration::from_millis(ms)
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	async fn add(
		&self,
		name: JobName,
		job_id: String,
		payload: serde_json::Value,
	) -> Result<bool, QueueError> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(QueueError::Closed);
		}
		match self.seen.entry(job_id.clone()) {
			Entry::Occupied(mut known) => {
				if is_retained(*known.get(), self.retention()) {
					debug!(job = %name, job_id = %job_id, "Duplicate job id ignored");
					return Ok(false);
				}
				known.insert(None);
			}
			Entry::Vacant(slot) => {
				slot.insert(None);
			}
		}

		self.sender
			.send(Job::new(name, job_id, payload))
			.map_err(|_| QueueError::Closed)?;
		Ok(true)
	}

	async fn start(&self, handler: Arc<dyn JobHandler>) -> Result<(), QueueError> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(QueueError::Closed);
		}
		let receiver = self
			.receiver
			.lock()
			.await
			.take()
			.ok_or(QueueError::AlreadyStarted)?;

		let (stop_tx, stop_rx) = oneshot::channel();
		let ctx = Delivery {
			handler,
			sender: self.sender.clone(),
			closed: self.closed.clone(),
			workers: self.workers.clone(),
			seen: self.seen.clone(),
			retention: self.retention(),
			attempts: self.config.attempts,
			backoff: self.config.backoff,
		};

		*self.stop.lock().await = Some(stop_tx);
		*self.dispatcher.lock().await = Some(tokio::spawn(Self::dispatch(receiver, stop_rx, ctx)));

		info!(
			concurrency = self.config.concurrency,
			attempts = self.config.attempts,
			"Job queue started"
		);
		Ok(())
	}

	async fn close(&self) -> Result<(), QueueError> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		if let Some(stop) = self.stop.lock().await.take() {
			let _ = stop.send(());
		}
		let Some(dispatcher) = self.dispatcher.lock().await.take() else {
			return Ok(());
		};
		if let Err(e) = dispatcher.await {
			error!("Queue dispatcher panicked: {}", e);
		}

		// Every permit back means no handler is running.
		let all = self.config.concurrency.max(1) as u32;
		if let Ok(permits) = self.workers.acquire_many(all).await {
			drop(permits);
		}
		info!("Job queue closed");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::JobError;
	use std::sync::atomic::AtomicUsize;

	struct RecordingHandler {
		delivered: mpsc::UnboundedSender<Job>,
		outcome: Result<(), JobError>,
		work: Duration,
		finished: AtomicUsize,
	}

	impl RecordingHandler {
		fn new(outcome: Result<(), JobError>) -> (Arc<Self>, mpsc::UnboundedReceiver<Job>) {
			let (tx, rx) = mpsc::unbounded_channel();
			let handler = Arc::new(Self {
				delivered: tx,
				outcome,
				work: Duration::ZERO,
				finished: AtomicUsize::new(0),
			});
			(handler, rx)
		}
	}

	#[async_trait]
	impl JobHandler for RecordingHandler {
		async fn handle(&self, job: &Job) -> Result<(), JobError> {
			let _ = self.delivered.send(job.clone());
			tokio::time::sleep(self.work).await;
			self.finished.fetch_add(1, Ordering::SeqCst);
			self.outcome.clone()
		}
	}

	fn config(kind: BackoffKind) -> QueueConfig {
		QueueConfig {
			attempts: 3,
			backoff: QueueBackoff { kind, delay_ms: 1 },
			concurrency: 2,
			retain_finished_ms: 60_000,
		}
	}

	async fn next(rx: &mut mpsc::UnboundedReceiver<Job>) -> Option<Job> {
		tokio::time::timeout(Duration::from_millis(500), rx.recv())
			.await
			.ok()
			.flatten()
	}

	#[tokio::test]
	async fn test_duplicate_ids_are_enqueued_once() {
		let queue = MemoryQueue::new(config(BackoffKind::Fixed));
		let (handler, mut rx) = RecordingHandler::new(Ok(()));

		assert!(queue
			.add(JobName::CreateIntent, "create-a-0".into(), serde_json::json!(1))
			.await
			.unwrap());
		assert!(!queue
			.add(JobName::CreateIntent, "create-a-0".into(), serde_json::json!(2))
			.await
			.unwrap());
		queue.start(handler).await.unwrap();

		let job = next(&mut rx).await.unwrap();
		assert_eq!(job.payload, serde_json::json!(1));
		assert_eq!(job.attempts_made, 0);
		assert!(next(&mut rx).await.is_none());
	}

	#[tokio::test]
	async fn test_retryable_errors_are_redelivered_until_attempts_run_out() {
		let queue = MemoryQueue::new(config(BackoffKind::Exponential));
		let (handler, mut rx) = RecordingHandler::new(Err(JobError::retryable("rpc down")));
		queue.start(handler).await.unwrap();
		queue
			.add(JobName::ValidateIntent, "validate-a-0".into(), serde_json::Value::Null)
			.await
			.unwrap();

		for expected in 0..3 {
			assert_eq!(next(&mut rx).await.unwrap().attempts_made, expected);
		}
		assert!(next(&mut rx).await.is_none());
	}

	#[tokio::test]
	async fn test_fatal_errors_are_not_redelivered() {
		let queue = MemoryQueue::new(config(BackoffKind::Fixed));
		let (handler, mut rx) = RecordingHandler::new(Err(JobError::fatal("bad record")));
		queue.start(handler).await.unwrap();
		queue
			.add(JobName::ValidateIntent, "validate-a-0".into(), serde_json::Value::Null)
			.await
			.unwrap();

		assert!(next(&mut rx).await.is_some());
		assert!(next(&mut rx).await.is_none());
	}

	#[tokio::test]
	async fn test_close_waits_for_running_handlers() {
		let queue = MemoryQueue::new(config(BackoffKind::Fixed));
		let (tx, mut rx) = mpsc::unbounded_channel();
		let handler = Arc::new(RecordingHandler {
			delivered: tx,
			outcome: Ok(()),
			work: Duration::from_millis(100),
			finished: AtomicUsize::new(0),
		});
		queue.start(handler.clone()).await.unwrap();
		queue
			.add(JobName::CreateIntent, "create-a-0".into(), serde_json::Value::Null)
			.await
			.unwrap();

		assert!(next(&mut rx).await.is_some());
		queue.close().await.unwrap();
		assert_eq!(handler.finished.load(Ordering::SeqCst), 1);

		assert!(matches!(
			queue
				.add(JobName::CreateIntent, "create-b-0".into(), serde_json::Value::Null)
				.await,
			Err(QueueError::Closed)
		));
	}

	/// Waits until the job with `id` has finished.
	async fn finished(queue: &MemoryQueue, id: &str) {
		for _ in 0..50 {
			if queue.seen.get(id).is_some_and(|f| f.is_some()) {
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("job {} never finished", id);
	}

	#[tokio::test]
	async fn test_finished_ids_are_rejected_within_retention() {
		let queue = MemoryQueue::new(config(BackoffKind::Fixed));
		let (handler, mut rx) = RecordingHandler::new(Ok(()));
		queue.start(handler).await.unwrap();

		assert!(queue
			.add(JobName::CreateIntent, "create-a-0".into(), serde_json::Value::Null)
			.await
			.unwrap());
		assert!(next(&mut rx).await.is_some());
		finished(&queue, "create-a-0").await;

		assert!(!queue
			.add(JobName::CreateIntent, "create-a-0".into(), serde_json::Value::Null)
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_finished_ids_expire_after_retention() {
		let queue = MemoryQueue::new(QueueConfig {
			retain_finished_ms: 0,
			..config(BackoffKind::Fixed)
		});
		let (handler, mut rx) = RecordingHandler::new(Err(JobError::fatal("bad record")));
		queue.start(handler).await.unwrap();

		queue
			.add(JobName::ValidateIntent, "validate-a-0".into(), serde_json::Value::Null)
			.await
			.unwrap();
		assert!(next(&mut rx).await.is_some());
		finished(&queue, "validate-a-0").await;

		assert!(queue
			.add(JobName::ValidateIntent, "validate-a-0".into(), serde_json::Value::Null)
			.await
			.unwrap());
		assert_eq!(next(&mut rx).await.unwrap().attempts_made, 0);
	}

	#[test]
	fn test_prune_keeps_pending_and_recent_ids() {
		let seen = DashMap::new();
		seen.insert("pending".to_string(), None);
		seen.insert("recent".to_string(), Some(Instant::now()));
		seen.insert(
			"old".to_string(),
			Instant::now().checked_sub(Duration::from_secs(120)),
		);

		prune_seen(&seen, Duration::from_secs(60));

		let mut left: Vec<String> = seen.iter().map(|e| e.key().clone()).collect();
		left.sort();
		assert_eq!(left, vec!["pending".to_string(), "recent".to_string()]);
	}

	#[tokio::test]
	async fn test_start_twice() {
		let queue = MemoryQueue::new(config(BackoffKind::Fixed));
		let (handler, _rx) = RecordingHandler::new(Ok(()));
		queue.start(handler.clone()).await.unwrap();
		assert!(matches!(
			queue.start(handler).await,
			Err(QueueError::AlreadyStarted)
		));
	}

	#[test]
	fn test_backoff_delays() {
		let fixed = QueueBackoff {
			kind: BackoffKind::Fixed,
			delay_ms: 2_000,
		};
		assert_eq!(backoff_delay(fixed, 3), Duration::from_millis(2_000));

		let exponential = QueueBackoff {
			kind: BackoffKind::Exponential,
			delay_ms: 2_000,
		};
		assert_eq!(backoff_delay(exponential, 0), Duration::from_millis(2_000));
		assert_eq!(backoff_delay(exponential, 2), Duration::from_millis(8_000));
		assert_eq!(backoff_delay(exponential, 200), Duration::from_millis(u64::MAX));
	}
}
