//! Newline-delimited TCP front end.
//!
//! One client is served at a time. Requests are `<id>:<query>` lines;
//! every request is queued and a single worker runs them strictly in
//! arrival order, answering `<id><|><json>` or `<id><|>Error: <message>`.

use crate::error::MiniError;
use crate::executor::{ExecOutput, Executor};
use crate::store::RowStore;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

pub const GREETING: &str = "Connected\n";
pub const BUSY_MESSAGE: &str = "Error: Another connection is already active.\n";
pub const RESPONSE_SEPARATOR: &str = "<|>";

/// A queued request and the channel its response line goes back on.
pub struct Job {
    pub id: String,
    pub sql: String,
    reply: mpsc::UnboundedSender<String>,
}

impl Job {
    pub fn new(id: impl Into<String>, sql: impl Into<String>, reply: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
            reply,
        }
    }
}

/// Owns the single-client flag and the FIFO queue shared by the
/// connection task and the worker.
#[derive(Default)]
pub struct ConnectionManager {
    active: AtomicBool,
    busy: AtomicBool,
    queue: Mutex<VecDeque<Job>>,
    notify: Notify,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the single client slot; false if it is already taken.
    pub fn try_acquire(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn enqueue(&self, job: Job) {
        self.queue.lock().push_back(job);
        self.notify.notify_one();
    }

    async fn next_job(&self) -> Job {
        loop {
            if let Some(job) = self.queue.lock().pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }
}

/// Splits a request line at its first `:`.
pub fn parse_request(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
}

pub fn format_response(id: &str, result: Result<ExecOutput, MiniError>) -> String {
    match result.and_then(|out| serde_json::to_string(&out).map_err(MiniError::from)) {
        Ok(json) => format!("{id}{RESPONSE_SEPARATOR}{json}"),
        Err(err) => format!("{id}{RESPONSE_SEPARATOR}Error: {err}"),
    }
}

/// Drains the queue forever, one query at a time.
pub async fn run_worker<S>(manager: Arc<ConnectionManager>, executor: Arc<Executor<S>>)
where
    S: RowStore + Send + Sync + 'static,
{
    loop {
        let job = manager.next_job().await;
        manager.busy.store(true, Ordering::Release);
        let started = Instant::now();
        debug!(id = %job.id, sql = %job.sql, "running query");

        let exec = Arc::clone(&executor);
        let sql = job.sql.clone();
        let result = match tokio::task::spawn_blocking(move || exec.execute(&sql)).await {
            Ok(result) => result,
            Err(err) => Err(MiniError::Execution(format!("query task failed: {err}"))),
        };
        if let Err(err) = &result {
            debug!(id = %job.id, error = %err, "query failed");
        }
        let response = format_response(&job.id, result);
        info!(
            id = %job.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query finished"
        );
        manager.busy.store(false, Ordering::Release);
        if job.reply.send(response).is_err() {
            debug!(id = %job.id, "client gone, response dropped");
        }
    }
}

async fn reject(mut stream: TcpStream, peer: SocketAddr) {
    warn!(%peer, "rejecting connection, another client is active");
    let _ = stream.write_all(BUSY_MESSAGE.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    manager: Arc<ConnectionManager>,
) -> Result<(), MiniError> {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Queued jobs keep their own senders, so the writer outlives the
    // reader until their responses are flushed or fail.
    tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    tx.send(GREETING.trim_end().to_string())
        .map_err(|_| MiniError::Execution("connection writer closed".into()))?;

    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_request(line) {
            Some((id, sql)) => {
                debug!(
                    %peer,
                    id,
                    queued = manager.queued(),
                    worker_busy = manager.is_busy(),
                    "query received"
                );
                manager.enqueue(Job::new(id, sql.trim(), tx.clone()));
            }
            None => {
                let _ = tx.send(format!("{RESPONSE_SEPARATOR}Error: Invalid request format"));
            }
        }
    }

    Ok(())
}

/// Accepts clients on `listener` until the task is dropped.
pub async fn serve<S>(listener: TcpListener, executor: Arc<Executor<S>>) -> Result<(), MiniError>
where
    S: RowStore + Send + Sync + 'static,
{
    let manager = Arc::new(ConnectionManager::new());
    tokio::spawn(run_worker(Arc::clone(&manager), executor));

    loop {
        let (stream, peer) = listener.accept().await?;
        if !manager.try_acquire() {
            tokio::spawn(reject(stream, peer));
            continue;
        }
        info!(%peer, "client connected");
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, peer, Arc::clone(&manager)).await {
                warn!(%peer, error = %err, "connection error");
            }
            manager.release();
            info!(%peer, "client disconnected");
        });
    }
}
