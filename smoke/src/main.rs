//! Run a distributed key generation among an in-process group of members.
//!
//! Every member runs its own engine over a shared in-memory broadcast network and chain, while a
//! block producer mines at a fixed interval. Once all members return, the outcome is checked:
//! members agree on the group public key, exactly one result is on chain, and any
//! `threshold + 1` private key shares interpolate to the group private key.

use beacon_dkg::{
    chain::local::LocalChain,
    net::Network,
    primitives::{
        pedersen::Vss,
        poly::{Eval, Poly},
        Point,
    },
    result::RequestId,
    Config, Engine, Group, MemberId, Report,
};
use clap::Parser;
use commonware_cryptography::{secp256r1::PrivateKey, PrivateKeyExt as _, Signer as _};
use commonware_runtime::{tokio, Clock, Metrics, Runner, Spawner};
use rand::{rngs::StdRng, SeedableRng};
use std::{collections::BTreeMap, process, time::Duration};
use tracing::{error, info, Level};

/// Namespace the Pedersen generator `H` is derived from.
const NAMESPACE: &[u8] = b"_BEACON_SMOKE";

/// Maximum size of a broadcast message.
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// DKG smoke test.
#[derive(Parser)]
pub struct Args {
    /// The number of members in the group.
    #[arg(long, default_value_t = 10)]
    group_size: u32,

    /// The maximum number of dishonest members (any `threshold + 1` can sign).
    #[arg(long, default_value_t = 4)]
    threshold: u32,

    /// The number of members that never start (they are marked inactive).
    #[arg(long, default_value_t = 0)]
    absent: u32,

    /// Blocks each round waits for peer messages.
    #[arg(long, default_value_t = 5)]
    phase_duration: u64,

    /// Blocks between the submission windows of consecutive members.
    #[arg(long, default_value_t = 2)]
    block_step: u64,

    /// Milliseconds between blocks.
    #[arg(long, default_value_t = 100)]
    block_time: u64,

    /// Seed for all randomness.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// The log level for traces. opts: (error, debug, info, warn, trace)
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// The number of worker threads for the runtime to use
    #[arg(long, default_value_t = 3)]
    worker_threads: usize,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(args.log_level).init();

    let cfg = tokio::Config::new().with_worker_threads(args.worker_threads);
    let executor = tokio::Runner::new(cfg);
    let outcome = executor.start(|context| async move { run(context, args).await });
    if let Err(err) = outcome {
        error!(%err, "smoke test failed");
        process::exit(1);
    }
}

async fn run(context: tokio::Context, args: Args) -> Result<(), String> {
    let group =
        Group::sequential(args.threshold, args.group_size).map_err(|err| err.to_string())?;
    let vss = Vss::new(NAMESPACE).map_err(|err| err.to_string())?;
    let request = RequestId(args.seed);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let signers = group
        .members()
        .iter()
        .map(|id| (*id, PrivateKey::from_rng(&mut rng)))
        .collect::<BTreeMap<_, _>>();
    let operators = signers
        .iter()
        .map(|(id, key)| (*id, key.public_key()))
        .collect::<BTreeMap<_, _>>();

    // Start producing blocks
    let chain = LocalChain::new(group.quorum());
    let miner = chain.clone();
    let block_time = Duration::from_millis(args.block_time);
    context.with_label("miner").spawn(move |context| async move {
        loop {
            context.sleep(block_time).await;
            miner.mine();
        }
    });
    let start_block = chain.height();

    // Absent members are connected but never speak
    let network = Network::new(MAX_MESSAGE_SIZE);
    let running = group.size() - (args.absent as usize).min(group.size());
    let mut absent = Vec::new();
    let mut handles = Vec::new();
    for (position, me) in group.members().iter().copied().enumerate() {
        let channel = network
            .register(operators[&me].clone())
            .map_err(|err| err.to_string())?;
        if position >= running {
            absent.push(channel);
            continue;
        }
        let cfg = Config {
            me,
            group: group.clone(),
            vss,
            request,
            signer: signers[&me].clone(),
            operators: operators.clone(),
            start_block,
            phase_duration: args.phase_duration,
            block_step: args.block_step,
        };
        let engine = Engine::new(
            cfg,
            chain.clone(),
            channel,
            StdRng::seed_from_u64(args.seed ^ u64::from(me.get())),
        );
        let handle = context
            .with_label(&format!("member_{me}"))
            .spawn(move |_| engine.run());
        handles.push((me, handle));
    }
    info!(running, absent = absent.len(), "started members");

    let mut reports = BTreeMap::<MemberId, Report>::new();
    for (me, handle) in handles {
        let report = handle
            .await
            .map_err(|err| format!("member {me} panicked: {err}"))?
            .map_err(|err| format!("member {me} failed: {err}"))?;
        reports.insert(me, report);
    }
    check(&group, &chain, request, &reports)
}

fn check(
    group: &Group,
    chain: &LocalChain,
    request: RequestId,
    reports: &BTreeMap<MemberId, Report>,
) -> Result<(), String> {
    let Some(first) = reports.values().next() else {
        return Err("no member completed".into());
    };
    let expected = first.output.result();
    for (me, report) in reports {
        if report.output.result() != expected {
            return Err(format!("member {me} disagrees on the result"));
        }
    }

    let submissions = chain.submissions();
    if submissions.len() != 1 || submissions[0].request != request {
        return Err(format!("expected one submission, found {}", submissions.len()));
    }
    if submissions[0].result != expected {
        return Err("submitted result differs from computed result".into());
    }

    let quorum = group.quorum();
    let evals = reports
        .values()
        .map(|report| Eval {
            index: report.output.share.index,
            value: report.output.share.private,
        })
        .collect::<Vec<_>>();
    let secret = Poly::recover(quorum, &evals).map_err(|err| err.to_string())?;
    if Point::GENERATOR * secret != expected.group_public_key {
        return Err("shares do not interpolate to the group private key".into());
    }

    info!(
        members = reports.len(),
        submitter = %submissions[0].submitter,
        block = submissions[0].block,
        disqualified = ?expected.disqualified,
        inactive = ?expected.inactive,
        "dkg succeeded"
    );
    Ok(())
}
