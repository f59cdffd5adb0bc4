use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::{
    errors::HarnessError,
    rpc::{RpcClient, RpcError},
    types::ChainSnapshot,
};

/// Anything whose chain state can be observed during a convergence wait.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Name used in log events.
    fn label(&self) -> String;

    /// Current height and tip.
    async fn chain_snapshot(&self) -> Result<ChainSnapshot, RpcError>;
}

#[async_trait]
impl ChainSource for RpcClient {
    fn label(&self) -> String {
        self.endpoint()
    }

    async fn chain_snapshot(&self) -> Result<ChainSnapshot, RpcError> {
        RpcClient::chain_snapshot(self).await
    }
}

#[async_trait]
impl<T: ChainSource + ?Sized> ChainSource for Arc<T> {
    fn label(&self) -> String {
        (**self).label()
    }

    async fn chain_snapshot(&self) -> Result<ChainSnapshot, RpcError> {
        (**self).chain_snapshot().await
    }
}

/// Decides whether a polling round's snapshots count as converged.
///
/// Implemented for [`Convergence`] and for any `Fn(&[ChainSnapshot]) -> bool`.
pub trait ConvergencePredicate: Send + Sync {
    fn is_converged(&self, snapshots: &[ChainSnapshot]) -> bool;
}

impl<F> ConvergencePredicate for F
where
    F: Fn(&[ChainSnapshot]) -> bool + Send + Sync,
{
    fn is_converged(&self, snapshots: &[ChainSnapshot]) -> bool {
        self(snapshots)
    }
}

/// Built-in convergence criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Convergence {
    /// Every node reports the same best block hash.
    #[default]
    #[serde(rename = "best_block_hash", alias = "same_tip")]
    SameTip,
    /// Every node reports the same block count.
    #[serde(rename = "block_count", alias = "same_height")]
    SameHeight,
}

impl ConvergencePredicate for Convergence {
    fn is_converged(&self, snapshots: &[ChainSnapshot]) -> bool {
        match self {
            Self::SameTip => {
                snapshots.windows(2).all(|w| w[0].best_block_hash == w[1].best_block_hash)
            }
            Self::SameHeight => snapshots.windows(2).all(|w| w[0].blocks == w[1].blocks),
        }
    }
}

impl Convergence {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameTip => "best_block_hash",
            Self::SameHeight => "block_count",
        }
    }
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Convergence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best_block_hash" | "same_tip" | "tip" => Ok(Self::SameTip),
            "block_count" | "same_height" | "height" => Ok(Self::SameHeight),
            other => Err(format!(
                "unknown convergence criterion `{other}` (expected best_block_hash or block_count)"
            )),
        }
    }
}

/// Polling schedule for convergence and reachability waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceOptions {
    /// Delay after the first unconverged round.
    pub poll_interval: Duration,
    /// The delay doubles after each unconverged round up to this bound.
    pub max_poll_interval: Duration,
    /// `None` waits until the predicate holds, however long that takes.
    pub timeout: Option<Duration>,
}

impl Default for ConvergenceOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_poll_interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl ConvergenceOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fixed-interval polling.
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self { poll_interval: interval, max_poll_interval: interval, timeout: None }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_poll_interval.max(self.poll_interval))
    }
}

/// Tracks elapsed time, poll count and backoff for one wait.
struct PollSchedule<'a> {
    options: &'a ConvergenceOptions,
    started: Instant,
    interval: Duration,
    polls: u64,
    last_error: Option<String>,
}

impl<'a> PollSchedule<'a> {
    fn new(options: &'a ConvergenceOptions) -> Self {
        Self {
            options,
            started: Instant::now(),
            interval: options.poll_interval,
            polls: 0,
            last_error: None,
        }
    }

    /// Sleeps until the next round, or fails if the deadline has passed.
    async fn wait(&mut self) -> Result<(), HarnessError> {
        let waited = self.started.elapsed();
        let delay = match self.options.timeout {
            Some(timeout) if waited >= timeout => {
                return Err(HarnessError::ConvergenceTimeout {
                    waited,
                    polls: self.polls,
                    last_error: self.last_error.take(),
                });
            }
            Some(timeout) => self.interval.min(timeout - waited),
            None => self.interval,
        };
        tokio::time::sleep(delay).await;
        self.interval = self.options.next_interval(self.interval);
        Ok(())
    }
}

/// Polls every source once; on failure returns the failing source's label and error.
async fn poll_round<S: ChainSource>(
    sources: &[S],
) -> Result<Vec<ChainSnapshot>, (String, RpcError)> {
    let mut snapshots = Vec::with_capacity(sources.len());
    for source in sources {
        match source.chain_snapshot().await {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => return Err((source.label(), e)),
        }
    }
    Ok(snapshots)
}

/// Polls every source in order until `predicate` holds for the round's snapshots.
///
/// RPC errors during a round are logged at `debug` and the round counts as unconverged.
///
/// # Errors
///
/// Returns [`HarnessError::ConvergenceTimeout`] if `options.timeout` elapses first.
pub async fn wait_for_convergence<S, P>(
    sources: &[S],
    predicate: &P,
    options: &ConvergenceOptions,
) -> Result<Vec<ChainSnapshot>, HarnessError>
where
    S: ChainSource,
    P: ConvergencePredicate + ?Sized,
{
    let mut schedule = PollSchedule::new(options);

    loop {
        schedule.polls += 1;
        match poll_round(sources).await {
            Ok(snapshots) if predicate.is_converged(&snapshots) => {
                tracing::info!(
                    nodes = sources.len(),
                    polls = schedule.polls,
                    elapsed_ms = schedule.started.elapsed().as_millis(),
                    "nodes converged"
                );
                return Ok(snapshots);
            }
            Ok(snapshots) => {
                tracing::trace!(poll = schedule.polls, ?snapshots, "nodes not yet converged");
            }
            Err((label, e)) => {
                tracing::debug!(node = %label, poll = schedule.polls, error = %e, "poll failed");
                schedule.last_error = Some(format!("{label}: {e}"));
            }
        }
        schedule.wait().await?;
    }
}

/// Polls each source until it answers `getblockchaininfo`.
///
/// # Errors
///
/// Returns [`HarnessError::ConvergenceTimeout`] if `options.timeout` elapses first.
/// Authentication failures are returned immediately since waiting cannot fix them.
pub async fn wait_until_reachable<S: ChainSource>(
    sources: &[S],
    options: &ConvergenceOptions,
) -> Result<(), HarnessError> {
    let mut schedule = PollSchedule::new(options);

    for source in sources {
        loop {
            schedule.polls += 1;
            match source.chain_snapshot().await {
                Ok(snapshot) => {
                    tracing::debug!(
                        node = %source.label(),
                        blocks = snapshot.blocks,
                        "node reachable"
                    );
                    break;
                }
                Err(e) if !e.is_retryable() => return Err(e.into()),
                Err(e) => {
                    if e.is_node_starting() {
                        tracing::trace!(node = %source.label(), error = %e, "node starting");
                    } else {
                        tracing::debug!(node = %source.label(), error = %e, "node not reachable");
                    }
                    schedule.last_error = Some(format!("{}: {e}", source.label()));
                }
            }
            schedule.wait().await?;
        }
    }
    Ok(())
}
