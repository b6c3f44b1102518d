//! In-process chain.
//!
//! Blocks are only produced by calling [LocalChain::mine], so tests fully control time.

use super::{Chain, Error, Submission};
use crate::{
    group::MemberId,
    result::{signing::Signatures, DkgResult, RequestId},
};
use futures::channel::{mpsc, oneshot};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info};

struct State {
    height: u64,
    waiters: Vec<(u64, oneshot::Sender<u64>)>,
    submissions: BTreeMap<RequestId, Submission>,
    subscribers: Vec<mpsc::UnboundedSender<Submission>>,
}

/// Shared handle to an in-memory chain.
#[derive(Clone)]
pub struct LocalChain {
    min_signatures: usize,
    state: Arc<Mutex<State>>,
}

impl LocalChain {
    /// Create a chain at height 0 that rejects submissions with fewer than `min_signatures`.
    pub fn new(min_signatures: usize) -> Self {
        Self {
            min_signatures,
            state: Arc::new(Mutex::new(State {
                height: 0,
                waiters: Vec::new(),
                submissions: BTreeMap::new(),
                subscribers: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Height of the latest block.
    pub fn height(&self) -> u64 {
        self.state().height
    }

    /// Produce a block, waking every waiter whose target height is reached.
    pub fn mine(&self) -> u64 {
        let mut state = self.state();
        state.height += 1;
        let height = state.height;
        let waiters = std::mem::take(&mut state.waiters);
        for (target, waiter) in waiters {
            if target <= height {
                let _ = waiter.send(height);
            } else if !waiter.is_canceled() {
                state.waiters.push((target, waiter));
            }
        }
        debug!(height, "mined block");
        height
    }

    /// The submission accepted for `request`, if any.
    pub fn submission(&self, request: RequestId) -> Option<Submission> {
        self.state().submissions.get(&request).cloned()
    }

    /// Every accepted submission, ordered by request.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.values().cloned().collect()
    }
}

impl Chain for LocalChain {
    async fn current_block(&self) -> Result<u64, Error> {
        Ok(self.height())
    }

    async fn wait_for_block(&self, height: u64) -> Result<u64, Error> {
        let receiver = {
            let mut state = self.state();
            if state.height >= height {
                return Ok(state.height);
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push((height, sender));
            receiver
        };
        receiver.await.map_err(|_| Error::Closed)
    }

    async fn is_result_submitted(&self, request: RequestId) -> Result<bool, Error> {
        Ok(self.state().submissions.contains_key(&request))
    }

    async fn submit_result(
        &self,
        request: RequestId,
        submitter: MemberId,
        result: DkgResult,
        signatures: Signatures,
    ) -> Result<(), Error> {
        let mut state = self.state();
        if state.submissions.contains_key(&request) {
            return Err(Error::AlreadySubmitted(request));
        }
        if signatures.len() < self.min_signatures {
            return Err(Error::InsufficientSignatures {
                have: signatures.len(),
                need: self.min_signatures,
            });
        }
        let submission = Submission {
            request,
            submitter,
            result,
            signatures,
            block: state.height,
        };
        state
            .subscribers
            .retain(|subscriber| subscriber.unbounded_send(submission.clone()).is_ok());
        info!(%request, %submitter, block = submission.block, "accepted result");
        state.submissions.insert(request, submission);
        Ok(())
    }

    async fn subscribe_submissions(&self) -> Result<mpsc::UnboundedReceiver<Submission>, Error> {
        let (sender, receiver) = mpsc::unbounded();
        self.state().subscribers.push(sender);
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Point;
    use commonware_runtime::{deterministic, Runner};
    use futures::{FutureExt, StreamExt};

    fn result() -> DkgResult {
        DkgResult {
            group_public_key: Point::GENERATOR,
            disqualified: Default::default(),
            inactive: Default::default(),
        }
    }

    #[test]
    fn test_wait_for_block() {
        let chain = LocalChain::new(0);
        let mut waiter = Box::pin(chain.wait_for_block(2));
        assert!((&mut waiter).now_or_never().is_none());
        chain.mine();
        assert!((&mut waiter).now_or_never().is_none());
        chain.mine();
        assert_eq!(waiter.now_or_never().unwrap().unwrap(), 2);

        // Already reached
        assert_eq!(chain.wait_for_block(1).now_or_never().unwrap().unwrap(), 2);
    }

    #[test]
    fn test_single_submission_per_request() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let chain = LocalChain::new(0);
            let mut events = chain.subscribe_submissions().await.unwrap();
            let request = RequestId(7);
            assert!(!chain.is_result_submitted(request).await.unwrap());

            chain
                .submit_result(request, MemberId::new(1), result(), Signatures::new())
                .await
                .unwrap();
            assert!(chain.is_result_submitted(request).await.unwrap());
            let err = chain
                .submit_result(request, MemberId::new(2), result(), Signatures::new())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::AlreadySubmitted(RequestId(7))));

            let event = events.next().await.unwrap();
            assert_eq!(event.request, request);
            assert_eq!(event.submitter, MemberId::new(1));
            assert_eq!(chain.submissions().len(), 1);
        });
    }

    #[test]
    fn test_insufficient_signatures() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let chain = LocalChain::new(2);
            let err = chain
                .submit_result(RequestId(1), MemberId::new(1), result(), Signatures::new())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::InsufficientSignatures { have: 0, need: 2 }
            ));
            assert!(chain.submission(RequestId(1)).is_none());
        });
    }
}
