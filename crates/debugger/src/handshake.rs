//! The initialization handshake with the adapter.
//!
//! Once the socket is connectable the sequence is fixed:
//!
//! 1. `initialize`, retried with exponential backoff;
//! 2. `attach` with an event rendezvous: the attach response is fired off
//!    and only logged, because some debugpy versions never answer it; the
//!    attempt succeeds when the `initialized` event arrives;
//! 3. a `threads` probe proving the channel answers at all;
//! 4. `configurationDone`, retried;
//! 5. thread-context priming: first thread and, when the adapter already
//!    has frames for it, the top frame. No frames is normal here (the
//!    program has not stopped yet).

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{sleep, timeout, Instant};
use transport::{DapReader, DapWriter};

use crate::client::DapClient;
use crate::error::Error;
use crate::protocol::types::{StackFrameId, ThreadId};
use crate::Result;

const INITIALIZE_ATTEMPTS: u32 = 3;
const CONFIGURATION_DONE_ATTEMPTS: u32 = 2;
const ATTACH_ATTEMPTS: u32 = 3;

/// Deadline on the `initialized` rendezvous within one attach attempt.
const INITIALIZED_DEADLINE: Duration = Duration::from_secs(15);
/// Pause between attach attempts.
const ATTACH_RETRY_DELAY: Duration = Duration::from_secs(2);

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Budget for reaching the port of an adapter we spawned ourselves.
const SPAWNED_CONNECT_BUDGET: Duration = Duration::from_secs(10);
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Deadline for the single connect attempt in attach-only mode.
const ATTACH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Thread/frame context known at the end of the handshake.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PrimedContext {
    pub thread_id: Option<ThreadId>,
    pub frame_id: Option<StackFrameId>,
}

/// Delay before retry `n` (1-based): 1s, 2s, 4s, capped.
fn backoff_delay(retry: u32) -> Duration {
    BACKOFF_CAP.min(BACKOFF_BASE * 2u32.saturating_pow(retry - 1))
}

async fn with_retries<T, F, Fut>(what: &str, attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(what, attempt, error = %e, "handshake step failed");
                last = Some(e);
                if attempt < attempts {
                    sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }
    Err(last.expect("at least one attempt"))
}

pub(crate) async fn run(client: &DapClient, port: u16, cwd: &Path) -> Result<PrimedContext> {
    with_retries("initialize", INITIALIZE_ATTEMPTS, || client.initialize()).await?;

    attach_rendezvous(client, port, cwd).await?;

    // Validation probe: any answer at all proves the channel works, even a
    // refusal.
    match client.threads().await {
        Ok(_) | Err(Error::Adapter { .. }) => {}
        Err(e) => return Err(e),
    }

    with_retries("configurationDone", CONFIGURATION_DONE_ATTEMPTS, || {
        client.configuration_done()
    })
    .await?;

    Ok(prime(client).await)
}

/// Fire attach and wait for the adapter's `initialized` event. An attach
/// rejection is logged by the fire path but does not abort the wait; the
/// event may (and with some adapter versions, only ever does) arrive
/// regardless.
async fn attach_rendezvous(client: &DapClient, port: u16, cwd: &Path) -> Result<()> {
    for attempt in 1..=ATTACH_ATTEMPTS {
        let initialized = client.initialized();
        client.attach(port, cwd)?;

        match timeout(INITIALIZED_DEADLINE, initialized).await {
            Ok(Ok(())) => {
                tracing::debug!(attempt, "adapter initialized");
                return Ok(());
            }
            Ok(Err(_)) => return Err(Error::Disconnected),
            Err(_) => {
                tracing::warn!(attempt, "no initialized event within deadline");
                if attempt < ATTACH_ATTEMPTS {
                    sleep(ATTACH_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(Error::InitializedTimeout)
}

/// Best-effort context priming; a quiet adapter (no threads, no frames
/// yet) is not an error.
async fn prime(client: &DapClient) -> PrimedContext {
    let threads = match client.threads().await {
        Ok(threads) => threads,
        Err(e) => {
            tracing::debug!(error = %e, "could not list threads while priming");
            return PrimedContext::default();
        }
    };

    let Some(first) = threads.first() else {
        return PrimedContext::default();
    };

    let frame_id = match client.stack_trace(first.id).await {
        Ok(frames) => frames.first().map(|f| f.id),
        Err(e) => {
            tracing::debug!(error = %e, "no stack while priming; program not stopped");
            None
        }
    };

    PrimedContext {
        thread_id: Some(first.id),
        frame_id,
    }
}

pub(crate) type TcpHalves = (DapReader<OwnedReadHalf>, DapWriter<OwnedWriteHalf>);

/// Poll a freshly spawned adapter's port until it accepts, inside the
/// overall budget.
pub(crate) async fn connect_polling(port: u16) -> Result<TcpHalves> {
    let deadline = Instant::now() + SPAWNED_CONNECT_BUDGET;
    loop {
        match timeout(CONNECT_ATTEMPT_TIMEOUT, transport::connect(("127.0.0.1", port))).await {
            Ok(Ok(halves)) => return Ok(halves),
            Ok(Err(e)) => tracing::trace!(port, error = %e, "connect attempt refused"),
            Err(_) => tracing::trace!(port, "connect attempt timed out"),
        }

        if Instant::now() + CONNECT_POLL_INTERVAL > deadline {
            return Err(Error::ConnectTimeout {
                port,
                secs: SPAWNED_CONNECT_BUDGET.as_secs(),
            });
        }
        sleep(CONNECT_POLL_INTERVAL).await;
    }
}

/// Single connect attempt against a user-started adapter.
pub(crate) async fn connect_once(port: u16) -> Result<TcpHalves> {
    match timeout(ATTACH_CONNECT_TIMEOUT, transport::connect(("127.0.0.1", port))).await {
        Ok(Ok(halves)) => Ok(halves),
        Ok(Err(_)) | Err(_) => Err(Error::ConnectTimeout {
            port,
            secs: ATTACH_CONNECT_TIMEOUT.as_secs(),
        }),
    }
}
