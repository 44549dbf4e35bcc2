//! Dual producer: A prepends and B appends on their own schedules; one
//! push listener carries both directions and every update is
//! cross-applied to the replica opposite its sender.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::edits::WordGen;
use super::sender::{Outgoing, SendStats, send_one};
use super::{Findings, ScenarioContext};
use crate::collector::MetricsCollector;
use crate::config::DelayRange;
use crate::error::ScenarioError;
use crate::poller::{IdlePoller, IdlePolicy, PollReport, RoundOutcome};
use crate::replica::ReplicaDriver;
use crate::transport::{DecodedUpdate, ListenerHandle, TransportBridge};

/// A replica and the only lock that guards it.
type SharedReplica = Arc<Mutex<ReplicaDriver>>;

#[derive(Debug, Clone, Copy)]
enum Placement {
    Front,
    End,
}

struct Producer {
    account: String,
    replica: SharedReplica,
    delays: DelayRange,
    placement: Placement,
    words: WordGen,
}

struct Shared {
    bridge: Arc<TransportBridge>,
    collector: Arc<MetricsCollector>,
    next_id: Arc<AtomicU64>,
    count: usize,
    max_attempts: u32,
    retry: Duration,
}

async fn produce(mut p: Producer, shared: Shared) -> Result<SendStats, ScenarioError> {
    let mut stats = SendStats::default();
    for _ in 0..shared.count {
        tokio::time::sleep(p.words.delay(p.delays)).await;
        let word = p.words.word(1);
        let item = {
            let mut replica = p.replica.lock();
            let pos = match p.placement {
                Placement::Front => 0,
                Placement::End => replica.len(),
            };
            let edit = replica.insert(pos, &word)?;
            Outgoing {
                id: shared.next_id.fetch_add(1, Ordering::Relaxed),
                account: p.account.clone(),
                update: edit.update,
            }
        };
        send_one(
            &shared.bridge,
            &shared.collector,
            &item,
            shared.max_attempts,
            shared.retry,
            &mut stats,
        )
        .await;
    }
    debug!(account = %p.account, delivered = stats.delivered, "producer done");
    Ok(stats)
}

/// Apply `update` to the replica that did not send it.
fn cross_apply(
    ctx: &ScenarioContext,
    update: DecodedUpdate,
    a: &SharedReplica,
    b: &SharedReplica,
) -> Result<bool, ScenarioError> {
    let target = if update.sender == ctx.config.relay.sender_account {
        b
    } else {
        a
    };
    let mut replica = target.lock();
    ctx.deliver(update, &mut replica)
}

/// Deliver while the producers run, then wait for stragglers.
async fn collect(
    ctx: &ScenarioContext,
    listener: &mut ListenerHandle,
    producers: &mut JoinSet<Result<SendStats, ScenarioError>>,
    a: &SharedReplica,
    b: &SharedReplica,
) -> Result<PollReport, ScenarioError> {
    let bench = &ctx.config.bench;
    let target = 2 * bench.updates;
    let mut admitted = 0usize;
    let mut sent = SendStats::default();

    loop {
        tokio::select! {
            Some(update) = listener.recv() => {
                if cross_apply(ctx, update, a, b)? {
                    admitted += 1;
                }
            }
            joined = producers.join_next() => match joined {
                Some(result) => sent.merge(result??),
                None => break,
            },
        }
    }
    info!(
        admitted,
        delivered = sent.delivered,
        failed = sent.failed,
        "producers finished"
    );

    // Rounds wait on the channel themselves, so no extra idle sleep.
    let policy = IdlePolicy {
        idle_delay: Duration::ZERO,
        ..ctx.poll_policy()
    };
    let wait = Duration::from_millis(bench.idle.idle_delay_ms);
    let mut poller = IdlePoller::new(target.saturating_sub(admitted), policy);
    while !poller.is_done() {
        let outcome = match tokio::time::timeout(wait, listener.recv()).await {
            Ok(Some(update)) => RoundOutcome::Yielded(usize::from(cross_apply(ctx, update, a, b)?)),
            Ok(None) => {
                warn!(state = ?poller.state(), "listener stopped before all updates arrived");
                poller.give_up();
                break;
            }
            Err(_) => RoundOutcome::Empty,
        };
        poller.step(outcome).await;
    }

    let mut report = poller.report();
    report.target = target;
    report.collected += admitted;
    Ok(report)
}

pub async fn run(ctx: &ScenarioContext) -> Result<Findings, ScenarioError> {
    let bench = &ctx.config.bench;
    let relay = &ctx.config.relay;
    let factory = ctx.factory.as_ref();
    let mut words = ctx.words();

    let mut seed = ReplicaDriver::create(factory);
    seed.insert(0, &words.text(bench.seed_text_len))?;
    let snapshot = seed.snapshot()?;
    let a: SharedReplica = Arc::new(Mutex::new(ReplicaDriver::load(factory, &snapshot)?));
    let b: SharedReplica = Arc::new(Mutex::new(ReplicaDriver::load(factory, &snapshot)?));

    let mut listener = ctx.bridge.subscribe(None).await?;

    let next_id = Arc::new(AtomicU64::new(1));
    let mut producers = JoinSet::new();
    for (account, replica, delays, placement) in [
        (&relay.sender_account, &a, bench.concurrent.delay_a, Placement::Front),
        (&relay.receiver_account, &b, bench.concurrent.delay_b, Placement::End),
    ] {
        let producer = Producer {
            account: account.clone(),
            replica: Arc::clone(replica),
            delays,
            placement,
            words: words.fork(),
        };
        let shared = Shared {
            bridge: Arc::clone(&ctx.bridge),
            collector: Arc::clone(&ctx.collector),
            next_id: Arc::clone(&next_id),
            count: bench.updates,
            max_attempts: bench.max_send_attempts,
            retry: bench.send_retry(),
        };
        producers.spawn(produce(producer, shared));
    }

    let collected = collect(ctx, &mut listener, &mut producers, &a, &b).await;
    producers.abort_all();
    let exit = listener.shutdown(bench.listener_shutdown_timeout()).await;
    let poll = collected?;
    info!(state = ?poll.state, collected = poll.collected, ?exit, "receive finished");

    let mut findings = Findings {
        poll: Some(poll),
        listener: Some(exit),
        ..Findings::default()
    };
    let (text_a, text_b) = (a.lock().text(), b.lock().text());
    findings.check_converged(&text_a, &text_b);
    findings.measure_reload(factory, &a.lock())?;
    Ok(findings)
}
