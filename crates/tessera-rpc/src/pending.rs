//! Pending-request bookkeeping.
//!
//! One coordinator task per endpoint owns the id -> waiter map and a deadline
//! index. The endpoint talks to it over an unbounded command channel:
//!
//! ```text
//! send_request ──Register──┐
//! inbound response ─Settle─┼──> coordinator ──> oneshot reply per request
//! post failure ───Forget───┤        │
//! destroy() ─────Destroy───┘        └─ sleep_until(earliest deadline) ─> Timeout
//! ```
//!
//! When the command channel closes (endpoint dropped without `destroy()`), the
//! coordinator rejects every waiter with [`RpcError::Destroyed`] and exits.

use crate::message::RpcErrorObject;
use crate::{Result, RpcError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

type Reply = oneshot::Sender<Result<Value>>;

const IDLE_WAKE: Duration = Duration::from_secs(3600);
/// Stand-in deadline for timeouts too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

enum Command {
    Register {
        id: String,
        method: String,
        timeout: Duration,
        deadline: Instant,
        reply: Reply,
    },
    Settle {
        id: String,
        outcome: std::result::Result<Value, RpcErrorObject>,
    },
    Forget {
        id: String,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    Destroy,
}

/// Handle to an endpoint's coordinator task.
#[derive(Debug)]
pub(crate) struct PendingRequests {
    commands: mpsc::UnboundedSender<Command>,
}

impl PendingRequests {
    /// Spawn the coordinator on `runtime`.
    pub(crate) fn spawn(channel: String, runtime: &tokio::runtime::Handle) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        runtime.spawn(Coordinator::new(channel, receiver).run());
        Self { commands }
    }

    /// Track a request and return the receiver its outcome arrives on.
    ///
    /// If the coordinator is gone, the reply sender is dropped and the
    /// receiver resolves to a `RecvError`, which callers map to `Destroyed`.
    pub(crate) fn register(
        &self,
        id: String,
        method: String,
        timeout: Duration,
    ) -> oneshot::Receiver<Result<Value>> {
        let (reply, receiver) = oneshot::channel();
        let _ = self.commands.send(Command::Register {
            id,
            method,
            timeout,
            deadline: deadline_after(timeout),
            reply,
        });
        receiver
    }

    pub(crate) fn settle(&self, id: String, outcome: std::result::Result<Value, RpcErrorObject>) {
        let _ = self.commands.send(Command::Settle { id, outcome });
    }

    /// Drop a waiter without notifying it.
    pub(crate) fn forget(&self, id: String) {
        let _ = self.commands.send(Command::Forget { id });
    }

    pub(crate) async fn len(&self) -> usize {
        let (reply, receiver) = oneshot::channel();
        if self.commands.send(Command::Count { reply }).is_err() {
            return 0;
        }
        receiver.await.unwrap_or(0)
    }

    pub(crate) fn destroy(&self) {
        let _ = self.commands.send(Command::Destroy);
    }
}

struct Entry {
    method: String,
    timeout: Duration,
    deadline: (Instant, u64),
    reply: Reply,
}

struct Coordinator {
    channel: String,
    commands: mpsc::UnboundedReceiver<Command>,
    entries: HashMap<String, Entry>,
    /// Deadline index; the sequence number keeps equal instants distinct.
    deadlines: BTreeMap<(Instant, u64), String>,
    seq: u64,
}

impl Coordinator {
    fn new(channel: String, commands: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            channel,
            commands,
            entries: HashMap::new(),
            deadlines: BTreeMap::new(),
            seq: 0,
        }
    }

    async fn run(mut self) {
        loop {
            let next_deadline = self.deadlines.keys().next().map(|(at, _)| *at);
            // The sleep future is built even when the branch is disabled.
            let wake_at = next_deadline.unwrap_or_else(|| deadline_after(IDLE_WAKE));

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Destroy) | None => break,
                    Some(command) => self.apply(command),
                },
                _ = sleep_until(wake_at), if next_deadline.is_some() => {
                    self.expire(Instant::now());
                }
            }
        }

        self.reject_all();
        debug!("Pending-request coordinator for channel '{}' stopped", self.channel);
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register {
                id,
                method,
                timeout,
                deadline,
                reply,
            } => {
                self.seq += 1;
                let key = (deadline, self.seq);
                self.deadlines.insert(key, id.clone());
                if let Some(previous) = self.entries.insert(
                    id.clone(),
                    Entry {
                        method,
                        timeout,
                        deadline: key,
                        reply,
                    },
                ) {
                    // Ids are unique per endpoint; a collision means the caller
                    // supplied one by hand.
                    self.deadlines.remove(&previous.deadline);
                    let _ = previous.reply.send(Err(RpcError::transport(format!(
                        "request id '{}' reused while pending",
                        id
                    ))));
                }
            }
            Command::Settle { id, outcome } => match self.take(&id) {
                Some(entry) => {
                    let result = outcome.map_err(|error| RpcError::Remote {
                        code: error.code,
                        message: error.message,
                    });
                    let _ = entry.reply.send(result);
                }
                None => {
                    debug!("Ignoring response for unknown request '{}'", id);
                }
            },
            Command::Forget { id } => {
                self.take(&id);
            }
            Command::Count { reply } => {
                let _ = reply.send(self.entries.len());
            }
            Command::Destroy => {}
        }
    }

    fn take(&mut self, id: &str) -> Option<Entry> {
        let entry = self.entries.remove(id)?;
        self.deadlines.remove(&entry.deadline);
        Some(entry)
    }

    fn expire(&mut self, now: Instant) {
        while let Some((&key, _)) = self.deadlines.first_key_value() {
            if key.0 > now {
                break;
            }
            let Some(id) = self.deadlines.remove(&key) else {
                break;
            };
            if let Some(entry) = self.entries.remove(&id) {
                debug!("Request '{}' ({}) timed out", id, entry.method);
                let _ = entry.reply.send(Err(RpcError::Timeout {
                    method: entry.method,
                    timeout: entry.timeout,
                }));
            }
        }
    }

    fn reject_all(&mut self) {
        self.deadlines.clear();
        for (_, entry) in self.entries.drain() {
            let _ = entry.reply.send(Err(RpcError::Destroyed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spawn() -> PendingRequests {
        PendingRequests::spawn("test".into(), &tokio::runtime::Handle::current())
    }

    #[tokio::test]
    async fn test_settle_success() {
        let pending = spawn();
        let rx = pending.register("1".into(), "m".into(), Duration::from_secs(5));
        pending.settle("1".into(), Ok(json!(7)));

        assert_eq!(rx.await.unwrap().unwrap(), json!(7));
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test]
    async fn test_settle_error() {
        let pending = spawn();
        let rx = pending.register("1".into(), "m".into(), Duration::from_secs(5));
        pending.settle(
            "1".into(),
            Err(RpcErrorObject {
                code: -32000,
                message: "boom".into(),
            }),
        );

        match rx.await.unwrap() {
            Err(RpcError::Remote { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "boom");
            }
            other => panic!("Expected remote error, got: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires_earliest_first() {
        let pending = spawn();
        let slow = pending.register("slow".into(), "slow".into(), Duration::from_millis(500));
        let fast = pending.register("fast".into(), "fast".into(), Duration::from_millis(50));

        let err = fast.await.unwrap().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Request timeout for method fast");
        assert_eq!(pending.len().await, 1);

        pending.settle("slow".into(), Ok(json!("done")));
        assert_eq!(slow.await.unwrap().unwrap(), json!("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_settle_is_ignored() {
        let pending = spawn();
        let rx = pending.register("1".into(), "m".into(), Duration::from_millis(10));
        assert!(rx.await.unwrap().unwrap_err().is_timeout());

        pending.settle("1".into(), Ok(json!(1)));
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_waits_for_settle() {
        let pending = spawn();
        let rx = pending.register("1".into(), "m".into(), Duration::MAX);
        assert_eq!(pending.len().await, 1);

        pending.settle("1".into(), Ok(json!("late but fine")));
        assert_eq!(rx.await.unwrap().unwrap(), json!("late but fine"));
    }

    #[test]
    fn test_deadline_after_saturates() {
        let before = Instant::now();
        assert!(deadline_after(Duration::MAX) >= before + FAR_FUTURE);
        assert!(deadline_after(Duration::from_secs(1)) <= Instant::now() + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_forget_drops_waiter() {
        let pending = spawn();
        let rx = pending.register("1".into(), "m".into(), Duration::from_secs(5));
        pending.forget("1".into());
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_destroy_rejects_all() {
        let pending = spawn();
        let a = pending.register("a".into(), "a".into(), Duration::from_secs(5));
        let b = pending.register("b".into(), "b".into(), Duration::from_secs(5));
        pending.destroy();

        assert!(matches!(a.await.unwrap(), Err(RpcError::Destroyed)));
        assert!(matches!(b.await.unwrap(), Err(RpcError::Destroyed)));

        // Coordinator is gone: new registrations resolve as closed.
        let c = pending.register("c".into(), "c".into(), Duration::from_secs(5));
        assert!(c.await.is_err());
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test]
    async fn test_dropping_handle_rejects_all() {
        let pending = spawn();
        let rx = pending.register("a".into(), "a".into(), Duration::from_secs(5));
        drop(pending);
        assert!(matches!(rx.await.unwrap(), Err(RpcError::Destroyed)));
    }
}
