//! The ledger DKG results are published to.
//!
//! The chain is the single source of truth for whether a result has been submitted for a
//! request, and serializes concurrent submissions: at most one is accepted per request.

use crate::{
    group::MemberId,
    result::{signing::Signatures, DkgResult, RequestId},
};
use futures::channel::mpsc;
use std::future::Future;
use thiserror::Error;

pub mod local;

/// Errors returned by a [Chain].
#[derive(Error, Debug)]
pub enum Error {
    #[error("result already submitted for request {0}")]
    AlreadySubmitted(RequestId),
    #[error("insufficient signatures: {have} < {need}")]
    InsufficientSignatures { have: usize, need: usize },
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("chain closed")]
    Closed,
}

/// A result accepted by the chain.
#[derive(Clone, Debug)]
pub struct Submission {
    pub request: RequestId,
    pub submitter: MemberId,
    pub result: DkgResult,
    pub signatures: Signatures,
    /// Height of the block that included the submission.
    pub block: u64,
}

/// Interface to the chain.
pub trait Chain: Clone + Send + Sync + 'static {
    /// Height of the latest block.
    fn current_block(&self) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Resolve with the current height once it is at least `height`.
    fn wait_for_block(&self, height: u64) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Whether a result has already been accepted for `request`.
    fn is_result_submitted(
        &self,
        request: RequestId,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Submit `result` for `request`. Fails with [Error::AlreadySubmitted] if another result
    /// was accepted first.
    fn submit_result(
        &self,
        request: RequestId,
        submitter: MemberId,
        result: DkgResult,
        signatures: Signatures,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Stream of every submission accepted after the call.
    fn subscribe_submissions(
        &self,
    ) -> impl Future<Output = Result<mpsc::UnboundedReceiver<Submission>, Error>> + Send;
}
