//! Bounded query runtime.
//!
//! The graph store connection is a shared resource. `QueryRuntime` owns a
//! fixed set of sessions, one per worker thread, fed from a bounded queue.
//! Every call carries a deadline: a call that cannot be queued or answered
//! in time returns [`QueryError::Timeout`] instead of blocking.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::config::invalid;
use crate::error::{ConfigError, LabelMapResult, QueryError};
use crate::graph::{GraphQuery, GraphQueryExecutor, GraphSession, Row};

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRuntimeConfig {
    /// Number of workers, and therefore open sessions.
    pub workers: usize,
    /// Maximum queued calls.
    pub queue_capacity: usize,
    /// Deadline for a single call.
    #[serde(with = "millis")]
    pub call_timeout: Duration,
    /// How long shutdown waits for busy workers.
    #[serde(with = "millis")]
    pub shutdown_grace: Duration,
}

impl Default for QueryRuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            call_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl QueryRuntimeConfig {
    /// Checks that the configuration can start a runtime.
    ///
    /// # Errors
    /// `Invalid` for zero workers, zero queue capacity or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("workers", "must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be at least 1"));
        }
        if self.call_timeout.is_zero() {
            return Err(invalid("call_timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

struct Job {
    query: GraphQuery,
    reply: Sender<Result<Vec<Row>, QueryError>>,
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Pool of graph sessions behind a bounded queue with per-call timeouts.
pub struct QueryRuntime {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    done: Receiver<()>,
    config: QueryRuntimeConfig,
}

impl QueryRuntime {
    /// Starts a runtime, opening one session per worker with `open`.
    ///
    /// `open` receives the worker index.
    ///
    /// # Errors
    /// - `Config` if the configuration is invalid
    /// - `Query` if a session fails to open (already opened sessions are
    ///   closed) or a worker cannot be spawned
    pub fn start<F, S>(config: QueryRuntimeConfig, mut open: F) -> LabelMapResult<Self>
    where
        F: FnMut(usize) -> Result<S, QueryError>,
        S: GraphSession + 'static,
    {
        config.validate()?;

        let mut sessions = Vec::with_capacity(config.workers);
        for idx in 0..config.workers {
            sessions.push(open(idx)?);
        }

        let (tx, rx) = bounded::<Job>(config.queue_capacity);
        let (done_tx, done) = bounded::<()>(config.workers);
        let mut workers = Vec::with_capacity(config.workers);

        for (idx, mut session) in sessions.into_iter().enumerate() {
            let rx: Receiver<Job> = rx.clone();
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("labelmap-query-{idx}"))
                .spawn(move || {
                    while let Ok(Job { query, reply }) = rx.recv() {
                        let result = session.run(&query);
                        // The caller may have timed out and gone away.
                        let _ = reply.send(result);
                    }
                    let _ = done_tx.send(());
                })
                .map_err(|e| QueryError::transport(format!("failed to spawn query worker: {e}")))?;
            workers.push(handle);
        }

        log::debug!(
            "Query runtime started: {} workers, queue {}, timeout {}ms",
            config.workers,
            config.queue_capacity,
            duration_ms(config.call_timeout)
        );

        Ok(Self {
            tx: Some(tx),
            workers,
            done,
            config,
        })
    }

    /// Returns the runtime configuration.
    #[must_use]
    pub const fn config(&self) -> &QueryRuntimeConfig {
        &self.config
    }

    /// Runs a query with an explicit deadline covering queueing and execution.
    ///
    /// # Errors
    /// - `Timeout` if the deadline passes
    /// - `Disconnected` if the workers are gone
    /// - any error returned by the session
    pub fn execute_with_timeout(&self, query: &GraphQuery, timeout: Duration) -> Result<Vec<Row>, QueryError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(QueryError::Disconnected);
        };
        let started = Instant::now();
        let (reply, rx) = bounded(1);
        let job = Job {
            query: query.clone(),
            reply,
        };
        match tx.send_timeout(job, timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                return Err(QueryError::Timeout {
                    duration_ms: duration_ms(timeout),
                })
            }
            Err(SendTimeoutError::Disconnected(_)) => return Err(QueryError::Disconnected),
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        rx.recv_timeout(remaining).map_err(|err| match err {
            RecvTimeoutError::Timeout => QueryError::Timeout {
                duration_ms: duration_ms(timeout),
            },
            RecvTimeoutError::Disconnected => QueryError::Disconnected,
        })?
    }

    /// Runs a query without waiting for queue space.
    ///
    /// # Errors
    /// - `QueueFull` if every queue slot is taken
    /// - otherwise as [`Self::execute_with_timeout`] with the configured timeout
    pub fn try_execute(&self, query: &GraphQuery) -> Result<Vec<Row>, QueryError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(QueryError::Disconnected);
        };
        let (reply, rx) = bounded(1);
        let job = Job {
            query: query.clone(),
            reply,
        };
        match tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(QueryError::QueueFull {
                    capacity: self.config.queue_capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => return Err(QueryError::Disconnected),
        }
        let timeout = self.config.call_timeout;
        rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => QueryError::Timeout {
                duration_ms: duration_ms(timeout),
            },
            RecvTimeoutError::Disconnected => QueryError::Disconnected,
        })?
    }

    /// Stops accepting calls and joins workers that finish within the grace period.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the queue lets idle workers exit once it drains.
        if self.tx.take().is_none() {
            return;
        }
        let mut finished = 0;
        while finished < self.workers.len() {
            if self.done.recv_timeout(self.config.shutdown_grace).is_err() {
                break;
            }
            finished += 1;
        }
        if finished < self.workers.len() {
            log::warn!(
                "{} query workers still busy after {}ms; detaching",
                self.workers.len() - finished,
                duration_ms(self.config.shutdown_grace)
            );
            self.workers.clear();
            return;
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl GraphQueryExecutor for QueryRuntime {
    fn execute(&self, query: &GraphQuery) -> Result<Vec<Row>, QueryError> {
        self.execute_with_timeout(query, self.config.call_timeout)
    }
}

impl Drop for QueryRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}
