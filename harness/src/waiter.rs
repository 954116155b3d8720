//! Eventual-consistency waiter.
//!
//! The vote API, the worker and the store talk to each other asynchronously
//! and never acknowledge a write back to the harness. The only black-box way
//! to assert that a submitted vote landed is to snapshot the stored value,
//! submit, and then poll the store until the value moves or a deadline passes.
//!
//! Running out of time is not an error. The waiter logs a warning and returns,
//! leaving the caller's own post-condition lookup to fail the run if the vote
//! really never arrived.

use std::{future::Future, time::Duration};

use futures::future::BoxFuture;
use shared::{VoteChoice, VoterId};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::Result;

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Read side of the vote store.
pub trait VoteReader {
    /// Current vote for `voter_id`, `None` when no record exists.
    ///
    /// Fails with `MultipleMatch` when the key is not unique in the store.
    fn fetch_vote<'a>(&'a self, voter_id: &'a VoterId) -> BoxFuture<'a, Result<Option<VoteChoice>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Total time spent polling after the work completes.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// How a pending change was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    Changed { polls: u32, value: Option<VoteChoice> },
    TimedOut { polls: u32 },
}

impl Convergence {
    pub fn is_changed(&self) -> bool {
        matches!(self, Convergence::Changed { .. })
    }

    pub fn polls(&self) -> u32 {
        match self {
            Convergence::Changed { polls, .. } | Convergence::TimedOut { polls } => *polls,
        }
    }
}

/// A submitted update that may not be visible in the store yet.
pub struct PendingChange<'r, R: VoteReader + ?Sized> {
    reader: &'r R,
    voter_id: VoterId,
    previous: Option<VoteChoice>,
}

impl<'r, R: VoteReader + ?Sized> PendingChange<'r, R> {
    /// Snapshots the current value. Must happen before the update is submitted.
    pub async fn observe(reader: &'r R, voter_id: &VoterId) -> Result<Self> {
        let previous = reader.fetch_vote(voter_id).await?;
        debug!(voter_id = %voter_id, previous = ?previous, "Observed vote before update");

        Ok(Self {
            reader,
            voter_id: voter_id.clone(),
            previous,
        })
    }

    pub fn previous(&self) -> Option<&VoteChoice> {
        self.previous.as_ref()
    }

    /// Polls until the stored value differs from the snapshot or the policy's
    /// timeout elapses. The last sleep is clamped to the deadline.
    pub async fn settle(self, policy: WaitPolicy) -> Result<Convergence> {
        let deadline = deadline_after(Instant::now(), policy.timeout);
        let mut polls = 0u32;

        loop {
            let current = self.reader.fetch_vote(&self.voter_id).await?;
            polls += 1;

            if current != self.previous {
                debug!(voter_id = %self.voter_id, polls, current = ?current, "Vote value updated");
                return Ok(Convergence::Changed { polls, value: current });
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            warn!(voter_id = %self.voter_id, polls, "Expected vote value not updated");
            let next = now.checked_add(policy.poll_interval).map_or(deadline, |t| t.min(deadline));
            sleep_until(next).await;
        }

        warn!(
            voter_id = %self.voter_id,
            polls,
            timeout_secs = policy.timeout.as_secs_f64(),
            "Gave up waiting for vote update"
        );
        Ok(Convergence::TimedOut { polls })
    }
}

/// `start + timeout`, saturating at a far-future instant instead of overflowing.
fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Runs `work` and then blocks until the vote for `voter_id` changes or the
/// policy's timeout elapses.
///
/// The old value is read before `work` is first polled. If `work` fails its
/// error is returned as-is and no polling takes place.
pub async fn expect_vote_updated<R, F, T>(
    reader: &R,
    voter_id: &VoterId,
    policy: WaitPolicy,
    work: F,
) -> Result<T>
where
    R: VoteReader + ?Sized,
    F: Future<Output = Result<T>>,
{
    let pending = PendingChange::observe(reader, voter_id).await?;
    let output = work.await?;
    pending.settle(policy).await?;
    Ok(output)
}
