//! Staggered result submission.
//!
//! Members that computed a result do not all submit it at once. The member with index `i` only
//! becomes eligible at block `start + (i - 1) * block_step`, and gives up as soon as the chain
//! reports a result for the same request. In the common case, the member with the lowest index
//! submits and everybody else returns without sending a transaction.
//!
//! The first accepted submission is canonical: a member that observes a submission carrying a
//! different result logs a warning but does not contest it.

use super::{
    signing::{self, Operators, Signatures},
    DkgResult, Error, RequestId,
};
use crate::{chain::Chain, group::MemberId};
use futures::{pin_mut, select, FutureExt, StreamExt};
use tracing::{debug, info, warn};

/// How a submission attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// This member's submission was accepted.
    Submitted,
    /// A result for the request was already on chain (or landed while waiting).
    AlreadySubmitted,
}

/// Submits results on behalf of one member.
pub struct SubmittingMember {
    index: MemberId,
    block_step: u64,
    quorum: usize,
    operators: Operators,
}

impl SubmittingMember {
    pub fn new(
        index: MemberId,
        block_step: u64,
        quorum: usize,
        operators: Operators,
    ) -> Self {
        Self {
            index,
            block_step,
            quorum,
            operators,
        }
    }

    /// First block at which this member may submit, given the block the result phase began.
    pub fn eligible_block(&self, start: u64) -> u64 {
        let delay = u64::from(self.index.get().saturating_sub(1)).saturating_mul(self.block_step);
        start.saturating_add(delay)
    }

    /// Submit `result` for `request` once eligible, unless somebody else submits first.
    ///
    /// Requires at least `quorum` valid operator signatures over the result. If the chain
    /// rejects the transaction, the submitted state is re-checked once so that losing a race is
    /// not reported as an error.
    pub async fn submit<C: Chain>(
        &self,
        chain: &C,
        request: RequestId,
        result: &DkgResult,
        signatures: &Signatures,
        start: u64,
    ) -> Result<Outcome, Error> {
        signing::verify_signatures(&self.operators, &result.digest(), signatures, self.quorum)?;

        // Subscribe before checking so that no submission falls in between
        let mut submissions = chain.subscribe_submissions().await?;
        if chain.is_result_submitted(request).await? {
            info!(member = %self.index, %request, "result already submitted");
            return Ok(Outcome::AlreadySubmitted);
        }

        let eligible = self.eligible_block(start);
        debug!(member = %self.index, %request, eligible, "waiting for submission window");
        let window = chain.wait_for_block(eligible).fuse();
        pin_mut!(window);
        loop {
            select! {
                height = window => {
                    let height = height?;
                    debug!(member = %self.index, %request, height, "submission window open");
                    break;
                },
                submission = submissions.next() => {
                    let Some(submission) = submission else {
                        debug!(member = %self.index, %request, "submission events closed");
                        window.as_mut().await?;
                        break;
                    };
                    if submission.request != request {
                        continue;
                    }
                    if submission.result != *result {
                        warn!(
                            member = %self.index,
                            %request,
                            submitter = %submission.submitter,
                            "submitted result differs from local result"
                        );
                    }
                    info!(member = %self.index, %request, submitter = %submission.submitter, "result submitted by another member");
                    return Ok(Outcome::AlreadySubmitted);
                },
            }
        }

        if chain.is_result_submitted(request).await? {
            info!(member = %self.index, %request, "result already submitted");
            return Ok(Outcome::AlreadySubmitted);
        }
        match chain
            .submit_result(request, self.index, result.clone(), signatures.clone())
            .await
        {
            Ok(()) => {
                info!(member = %self.index, %request, "submitted result");
                Ok(Outcome::Submitted)
            }
            Err(err) => {
                if chain.is_result_submitted(request).await? {
                    info!(member = %self.index, %request, ?err, "lost submission race");
                    return Ok(Outcome::AlreadySubmitted);
                }
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::{self, local::LocalChain, Submission},
        primitives::{Point, Scalar},
    };
    use commonware_cryptography::{secp256r1::PrivateKey, PrivateKeyExt as _, Signer as _};
    use commonware_macros::{select, test_traced};
    use commonware_runtime::{deterministic, Clock, Metrics, Runner, Spawner};
    use futures::channel::mpsc;
    use std::{collections::BTreeMap, time::Duration};
    use test_case::test_case;

    const QUORUM: usize = 3;
    const BLOCK_STEP: u64 = 2;
    const REQUEST: RequestId = RequestId(1);

    struct Fixture {
        operators: Operators,
        result: DkgResult,
        signatures: Signatures,
    }

    fn fixture() -> Fixture {
        let signers = (1..=5)
            .map(|id| (MemberId::new(id), PrivateKey::from_seed(id as u64)))
            .collect::<BTreeMap<_, _>>();
        let operators = signers
            .iter()
            .map(|(id, key)| (*id, key.public_key()))
            .collect();
        let result = DkgResult {
            group_public_key: Point::GENERATOR * Scalar::from(3),
            disqualified: Default::default(),
            inactive: [MemberId::new(5)].into_iter().collect(),
        };
        let signatures = signers
            .iter()
            .take(QUORUM)
            .map(|(id, key)| (*id, signing::sign(key, &result.digest())))
            .collect();
        Fixture {
            operators,
            result,
            signatures,
        }
    }

    fn member(fixture: &Fixture, index: u32) -> SubmittingMember {
        SubmittingMember::new(
            MemberId::new(index),
            BLOCK_STEP,
            QUORUM,
            fixture.operators.clone(),
        )
    }

    /// Produce one block per second.
    fn spawn_miner(context: &deterministic::Context, chain: &LocalChain) {
        let chain = chain.clone();
        context.with_label("miner").spawn(move |context| async move {
            loop {
                context.sleep(Duration::from_secs(1)).await;
                chain.mine();
            }
        });
    }

    #[test_case(1, 0 ; "first member submits immediately")]
    #[test_case(2, 2 ; "second member waits one step")]
    #[test_case(4, 6 ; "fourth member waits three steps")]
    fn test_eligible_block(index: u32, expected: u64) {
        let fixture = fixture();
        assert_eq!(member(&fixture, index).eligible_block(0), expected);
        assert_eq!(member(&fixture, index).eligible_block(10), expected + 10);
    }

    #[test_case(1 ; "member 1")]
    #[test_case(2 ; "member 2")]
    #[test_case(4 ; "member 4")]
    fn test_submits_at_window(index: u32) {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let fixture = fixture();
            let chain = LocalChain::new(QUORUM);
            spawn_miner(&context, &chain);
            let member = member(&fixture, index);
            let start = chain.height();
            let outcome = member
                .submit(&chain, REQUEST, &fixture.result, &fixture.signatures, start)
                .await
                .unwrap();
            assert_eq!(outcome, Outcome::Submitted);

            let submission = chain.submission(REQUEST).unwrap();
            assert_eq!(submission.submitter, MemberId::new(index));
            assert_eq!(submission.block, member.eligible_block(start));
            assert_eq!(submission.result, fixture.result);
        });
    }

    #[test_traced]
    fn test_concurrent_same_request() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let fixture = fixture();
            let chain = LocalChain::new(QUORUM);
            spawn_miner(&context, &chain);
            let first = member(&fixture, 1);
            let fourth = member(&fixture, 4);
            let start = chain.height();

            // Poll the later member first so it is already waiting when the first one submits
            let (late, early) = futures::join!(
                fourth.submit(&chain, REQUEST, &fixture.result, &fixture.signatures, start),
                first.submit(&chain, REQUEST, &fixture.result, &fixture.signatures, start),
            );
            assert_eq!(early.unwrap(), Outcome::Submitted);
            assert_eq!(late.unwrap(), Outcome::AlreadySubmitted);
            assert_eq!(chain.height(), start);
            assert_eq!(chain.submissions().len(), 1);
            assert_eq!(
                chain.submission(REQUEST).unwrap().submitter,
                MemberId::new(1)
            );
        });
    }

    #[test_traced]
    fn test_already_submitted_different_result() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let fixture = fixture();
            let chain = LocalChain::new(QUORUM);
            let mut other = fixture.result.clone();
            other.inactive.clear();
            chain
                .submit_result(
                    REQUEST,
                    MemberId::new(2),
                    other.clone(),
                    fixture.signatures.clone(),
                )
                .await
                .unwrap();

            let outcome = member(&fixture, 1)
                .submit(&chain, REQUEST, &fixture.result, &fixture.signatures, 0)
                .await
                .unwrap();
            assert_eq!(outcome, Outcome::AlreadySubmitted);
            assert_eq!(chain.submission(REQUEST).unwrap().result, other);
        });
    }

    #[test_traced]
    fn test_concurrent_different_requests() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let fixture = fixture();
            let chain = LocalChain::new(QUORUM);
            spawn_miner(&context, &chain);
            let first = member(&fixture, 1);
            let fourth = member(&fixture, 4);
            let other = RequestId(2);
            let (late, early) = futures::join!(
                fourth.submit(&chain, other, &fixture.result, &fixture.signatures, 0),
                first.submit(&chain, REQUEST, &fixture.result, &fixture.signatures, 0),
            );
            assert_eq!(early.unwrap(), Outcome::Submitted);
            assert_eq!(late.unwrap(), Outcome::Submitted);
            assert_eq!(chain.submission(REQUEST).unwrap().block, 0);
            assert_eq!(chain.submission(other).unwrap().block, 6);
        });
    }

    #[test_traced]
    fn test_insufficient_signatures() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let fixture = fixture();
            let chain = LocalChain::new(QUORUM);
            let mut signatures = fixture.signatures.clone();
            signatures.pop_first();
            let err = member(&fixture, 1)
                .submit(&chain, REQUEST, &fixture.result, &signatures, 0)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::InsufficientSignatures { have: 2, need: 3 }
            ));
            assert!(!chain.is_result_submitted(REQUEST).await.unwrap());
        });
    }

    #[test_traced]
    fn test_signature_over_other_result() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let fixture = fixture();
            let chain = LocalChain::new(QUORUM);
            let mut result = fixture.result.clone();
            result.inactive.clear();
            let err = member(&fixture, 1)
                .submit(&chain, REQUEST, &result, &fixture.signatures, 0)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidSignature(_)));
        });
    }

    #[test_traced]
    fn test_signature_from_unknown_operator() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let fixture = fixture();
            let chain = LocalChain::new(QUORUM);
            let outsider = PrivateKey::from_seed(99);
            let mut signatures = fixture.signatures.clone();
            signatures.insert(
                MemberId::new(9),
                outsider.sign(Some(signing::NAMESPACE), fixture.result.digest().as_ref()),
            );
            let err = member(&fixture, 1)
                .submit(&chain, REQUEST, &fixture.result, &signatures, 0)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::UnknownSigner(id) if id == MemberId::new(9)));
        });
    }

    /// Chain whose transactions are rejected, optionally because another member won the race.
    #[derive(Clone)]
    struct RejectingChain {
        inner: LocalChain,
        race: bool,
    }

    impl Chain for RejectingChain {
        async fn current_block(&self) -> Result<u64, chain::Error> {
            self.inner.current_block().await
        }

        async fn wait_for_block(&self, height: u64) -> Result<u64, chain::Error> {
            self.inner.wait_for_block(height).await
        }

        async fn is_result_submitted(&self, request: RequestId) -> Result<bool, chain::Error> {
            self.inner.is_result_submitted(request).await
        }

        async fn submit_result(
            &self,
            request: RequestId,
            _: MemberId,
            result: DkgResult,
            signatures: Signatures,
        ) -> Result<(), chain::Error> {
            if self.race {
                self.inner
                    .submit_result(request, MemberId::new(5), result, signatures)
                    .await?;
            }
            Err(chain::Error::Rejected("nonce too low".into()))
        }

        async fn subscribe_submissions(
            &self,
        ) -> Result<mpsc::UnboundedReceiver<Submission>, chain::Error> {
            // No events: only the submitted state can be observed
            let (_, receiver) = mpsc::unbounded();
            Ok(receiver)
        }
    }

    #[test_traced]
    fn test_rejected_after_lost_race() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let fixture = fixture();
            let chain = RejectingChain {
                inner: LocalChain::new(QUORUM),
                race: true,
            };
            let outcome = member(&fixture, 1)
                .submit(&chain, REQUEST, &fixture.result, &fixture.signatures, 0)
                .await
                .unwrap();
            assert_eq!(outcome, Outcome::AlreadySubmitted);
            assert_eq!(
                chain.inner.submission(REQUEST).unwrap().submitter,
                MemberId::new(5)
            );
        });
    }

    #[test_traced]
    fn test_rejected() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let fixture = fixture();
            let chain = RejectingChain {
                inner: LocalChain::new(QUORUM),
                race: false,
            };
            let err = member(&fixture, 1)
                .submit(&chain, REQUEST, &fixture.result, &fixture.signatures, 0)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Chain(chain::Error::Rejected(_))));
        });
    }

    #[test_traced]
    fn test_cancelled_while_waiting() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let fixture = fixture();
            let chain = LocalChain::new(QUORUM);
            spawn_miner(&context, &chain);
            let fourth = member(&fixture, 4);
            select! {
                _ = context.sleep(Duration::from_millis(2_500)) => {},
                outcome = fourth.submit(&chain, REQUEST, &fixture.result, &fixture.signatures, 0) => {
                    panic!("submission finished before its window: {outcome:?}");
                },
            };
            assert_eq!(chain.height(), 2);

            // Nothing is submitted after the window would have opened
            context.sleep(Duration::from_secs(10)).await;
            assert!(chain.height() >= 6);
            assert!(chain.submission(REQUEST).is_none());
        });
    }
}
