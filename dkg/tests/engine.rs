use beacon_dkg::{
    chain::local::LocalChain,
    engine,
    gjkr::{
        self,
        message::{Message, SharesAccusationsMessage},
    },
    net::{self, Network},
    primitives::{
        pedersen::Vss,
        poly::{Eval, Poly},
        Point,
    },
    result::{signing::Operators, submission::Outcome, RequestId},
    Config, Engine, Group, MemberId, Report,
};
use bytes::Bytes;
use commonware_codec::{Decode, Encode};
use commonware_cryptography::{
    secp256r1::{PrivateKey, PublicKey},
    PrivateKeyExt as _, Signer as _,
};
use commonware_macros::test_traced;
use commonware_p2p::{Receiver, Recipients, Sender};
use commonware_runtime::{deterministic, Clock, Handle, Metrics, Runner, Spawner};
use rand::{rngs::StdRng, SeedableRng};
use std::{collections::BTreeMap, time::Duration};

const REQUEST: RequestId = RequestId(42);
const PHASE_DURATION: u64 = 5;
const BLOCK_STEP: u64 = 2;

struct Simulation {
    context: deterministic::Context,
    group: Group,
    network: Network,
    chain: LocalChain,
    signers: BTreeMap<MemberId, PrivateKey>,
}

impl Simulation {
    fn new(context: deterministic::Context, threshold: u32, size: u32) -> Self {
        let group = Group::sequential(threshold, size).unwrap();
        let signers = group
            .members()
            .iter()
            .map(|id| (*id, PrivateKey::from_seed(u64::from(id.get()))))
            .collect();
        let chain = LocalChain::new(group.quorum());

        // Produce one block per second
        let miner = chain.clone();
        context.with_label("miner").spawn(move |context| async move {
            loop {
                context.sleep(Duration::from_secs(1)).await;
                miner.mine();
            }
        });

        Self {
            context,
            group,
            network: Network::new(1024 * 1024),
            chain,
            signers,
        }
    }

    fn key(&self, id: u32) -> PublicKey {
        self.signers[&MemberId::new(id)].public_key()
    }

    fn register(&self, id: u32) -> (net::Sender, net::Receiver) {
        self.network.register(self.key(id)).unwrap()
    }

    fn operators(&self) -> Operators {
        self.signers
            .iter()
            .map(|(id, key)| (*id, key.public_key()))
            .collect()
    }

    /// Start an engine for `id` over `channel`.
    fn spawn<S, R>(&self, id: u32, channel: (S, R)) -> Handle<Result<Report, engine::Error>>
    where
        S: Sender<PublicKey = PublicKey>,
        R: Receiver<PublicKey = PublicKey>,
    {
        let me = MemberId::new(id);
        let cfg = Config {
            me,
            group: self.group.clone(),
            vss: Vss::new(b"beacon-dkg-test").unwrap(),
            request: REQUEST,
            signer: self.signers[&me].clone(),
            operators: self.operators(),
            start_block: self.chain.height(),
            phase_duration: PHASE_DURATION,
            block_step: BLOCK_STEP,
        };
        let engine = Engine::new(
            cfg,
            self.chain.clone(),
            channel,
            StdRng::seed_from_u64(u64::from(id)),
        );
        self.context
            .with_label(&format!("member_{id}"))
            .spawn(move |_| engine.run())
    }

    /// Run an engine for each of `ids`, returning their results.
    async fn run(&self, ids: &[u32]) -> BTreeMap<MemberId, Result<Report, engine::Error>> {
        let handles = ids
            .iter()
            .map(|id| (MemberId::new(*id), self.spawn(*id, self.register(*id))))
            .collect::<Vec<_>>();
        join(handles).await
    }
}

async fn join(
    handles: Vec<(MemberId, Handle<Result<Report, engine::Error>>)>,
) -> BTreeMap<MemberId, Result<Report, engine::Error>> {
    let mut results = BTreeMap::new();
    for (me, handle) in handles {
        results.insert(me, handle.await.unwrap());
    }
    results
}

/// Drops every result signature one peer sends.
#[derive(Debug)]
struct DropResultSignatures {
    inner: net::Receiver,
    from: PublicKey,
    group_size: usize,
}

impl Receiver for DropResultSignatures {
    type Error = net::Error;
    type PublicKey = PublicKey;

    async fn recv(&mut self) -> Result<(PublicKey, Bytes), net::Error> {
        loop {
            let (sender, payload) = self.inner.recv().await?;
            let signature = matches!(
                Message::decode_cfg(payload.clone(), &self.group_size),
                Ok(Message::ResultSignature(_))
            );
            if sender == self.from && signature {
                continue;
            }
            return Ok((sender, payload));
        }
    }
}

/// Reports of every member, asserting they agree on the outcome of the run.
fn agreeing(results: BTreeMap<MemberId, Result<Report, engine::Error>>) -> Vec<Report> {
    let reports = results
        .into_values()
        .map(Result::unwrap)
        .collect::<Vec<_>>();
    for report in &reports {
        assert_eq!(report.output.result(), reports[0].output.result());
        assert_eq!(report.output.qualified, reports[0].output.qualified);
    }
    reports
}

fn assert_shares_recover_group_key(reports: &[Report], quorum: usize) {
    let evals = reports
        .iter()
        .map(|report| Eval {
            index: report.output.share.index,
            value: report.output.share.private,
        })
        .collect::<Vec<_>>();
    let secret = Poly::recover(quorum, &evals[..quorum]).unwrap();
    assert_eq!(
        Poly::recover(quorum, &evals[evals.len() - quorum..]).unwrap(),
        secret
    );
    assert_eq!(Point::GENERATOR * secret, reports[0].output.group_public_key);
}

#[test_traced]
fn test_all_honest() {
    let executor = deterministic::Runner::default();
    executor.start(|context| async move {
        let simulation = Simulation::new(context, 2, 5);
        let reports = agreeing(simulation.run(&[1, 2, 3, 4, 5]).await);
        assert_shares_recover_group_key(&reports, 3);
        for report in &reports {
            assert!(report.output.disqualified.is_empty());
            assert!(report.output.inactive.is_empty());
            assert_eq!(report.output.qualified.len(), 5);
        }

        // Only the first member submits
        assert_eq!(reports[0].outcome, Outcome::Submitted);
        for report in &reports[1..] {
            assert_eq!(report.outcome, Outcome::AlreadySubmitted);
        }
        let submissions = simulation.chain.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].request, REQUEST);
        assert_eq!(submissions[0].submitter, MemberId::new(1));
        assert_eq!(submissions[0].result, reports[0].output.result());
        assert_eq!(submissions[0].signatures.len(), 5);

        // Submitted at the start of the result phase
        assert_eq!(submissions[0].block, PHASE_DURATION * engine::WINDOWS);
    });
}

#[test_traced]
fn test_absent_member() {
    let executor = deterministic::Runner::default();
    executor.start(|context| async move {
        let simulation = Simulation::new(context, 2, 5);
        let _absent = simulation.register(3);
        let reports = agreeing(simulation.run(&[1, 2, 4, 5]).await);
        assert_shares_recover_group_key(&reports, 3);
        assert_eq!(
            reports[0].output.inactive,
            [MemberId::new(3)].into_iter().collect()
        );
        assert!(!reports[0].output.qualified.contains(&MemberId::new(3)));

        let submission = simulation.chain.submission(REQUEST).unwrap();
        assert_eq!(submission.submitter, MemberId::new(1));
        assert_eq!(submission.signatures.len(), 4);
    });
}

#[test_traced]
fn test_noisy_member() {
    let executor = deterministic::Runner::default();
    executor.start(|context| async move {
        let simulation = Simulation::new(context.clone(), 2, 5);
        let (mut noisy, _receiver) = simulation.register(5);
        let (mut stranger, _stranger) = simulation
            .network
            .register(PrivateKey::from_seed(99).public_key())
            .unwrap();

        // Garbage, a message claiming to come from member 1, a message from a later round and a
        // message from a key that is not an operator, sent once the other members are connected
        context.with_label("noisy").spawn(move |context| async move {
            context.sleep(Duration::from_millis(1)).await;
            noisy
                .send(Recipients::All, Bytes::from_static(&[0xff, 0x00, 0x01]), false)
                .await
                .unwrap();
            let spoofed = Message::SharesAccusations(SharesAccusationsMessage {
                sender: MemberId::new(1),
                accused: [MemberId::new(2)].into_iter().collect(),
            });
            noisy
                .send(Recipients::All, spoofed.encode().freeze(), false)
                .await
                .unwrap();
            let premature = Message::SharesAccusations(SharesAccusationsMessage {
                sender: MemberId::new(5),
                accused: [MemberId::new(2)].into_iter().collect(),
            });
            noisy
                .send(Recipients::All, premature.encode().freeze(), false)
                .await
                .unwrap();
            let unknown = Message::SharesAccusations(SharesAccusationsMessage {
                sender: MemberId::new(4),
                accused: [MemberId::new(3)].into_iter().collect(),
            });
            stranger
                .send(Recipients::All, unknown.encode().freeze(), false)
                .await
                .unwrap();
        });

        let reports = agreeing(simulation.run(&[1, 2, 3, 4]).await);
        assert_shares_recover_group_key(&reports, 3);
        assert!(reports[0].output.disqualified.is_empty());
        assert_eq!(
            reports[0].output.inactive,
            [MemberId::new(5)].into_iter().collect()
        );
        assert_eq!(simulation.chain.submissions().len(), 1);
    });
}

#[test_traced]
fn test_insufficient_honest_members() {
    let executor = deterministic::Runner::default();
    executor.start(|context| async move {
        let simulation = Simulation::new(context, 1, 3);
        let _absent = [simulation.register(2), simulation.register(3)];
        let mut results = simulation.run(&[1]).await;
        let result = results.remove(&MemberId::new(1)).unwrap();
        assert!(matches!(
            result,
            Err(engine::Error::Dkg(
                gjkr::Error::InsufficientHonestMembers {
                    qualified: 1,
                    required: 2
                }
            ))
        ));
        assert!(simulation.chain.submissions().is_empty());
    });
}

#[test_traced]
fn test_priority_independent_of_collection_time() {
    let executor = deterministic::Runner::default();
    executor.start(|context| async move {
        // Member 1 never sees member 3's result signature and waits out the whole signature
        // window, while members 2 and 3 finish collecting early
        let simulation = Simulation::new(context, 1, 3);
        let (sender, receiver) = simulation.register(1);
        let filtered = DropResultSignatures {
            inner: receiver,
            from: simulation.key(3),
            group_size: 3,
        };
        let handles = vec![
            (MemberId::new(1), simulation.spawn(1, (sender, filtered))),
            (MemberId::new(2), simulation.spawn(2, simulation.register(2))),
            (MemberId::new(3), simulation.spawn(3, simulation.register(3))),
        ];
        let reports = agreeing(join(handles).await);

        // The lowest index still submits first
        assert_eq!(reports[0].outcome, Outcome::Submitted);
        assert_eq!(reports[1].outcome, Outcome::AlreadySubmitted);
        assert_eq!(reports[2].outcome, Outcome::AlreadySubmitted);
        let submission = simulation.chain.submission(REQUEST).unwrap();
        assert_eq!(submission.submitter, MemberId::new(1));
        assert_eq!(submission.block, PHASE_DURATION * engine::WINDOWS);
        assert_eq!(submission.signatures.len(), 2);
        assert!(!submission.signatures.contains_key(&MemberId::new(3)));
    });
}
