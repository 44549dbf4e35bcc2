//! Single producer: A edits and bulk-sends, B polls, then applies in id
//! order.

use std::sync::Arc;

use tracing::{debug, info};

use super::sender::{Outgoing, SendPool};
use super::{Findings, ScenarioContext};
use crate::error::ScenarioError;
use crate::poller::{IdlePoller, RoundOutcome};
use crate::replica::ReplicaDriver;

pub async fn run(ctx: &ScenarioContext) -> Result<Findings, ScenarioError> {
    let bench = &ctx.config.bench;
    let sender = ctx.config.relay.sender_account.as_str();
    let receiver = ctx.config.relay.receiver_account.as_str();
    let factory = ctx.factory.as_ref();
    let mut words = ctx.words();

    let mut a = ReplicaDriver::create(factory);
    a.insert(0, &words.text(bench.seed_text_len))?;
    let mut b = ReplicaDriver::load(factory, &a.snapshot()?)?;

    let pool = SendPool::spawn(Arc::clone(&ctx.bridge), Arc::clone(&ctx.collector), bench);
    for id in 1..=bench.updates as u64 {
        let pos = words.index(a.len());
        let edit = a.insert(pos, &words.word_between(1, 10))?;
        pool.submit(Outgoing {
            id,
            account: sender.to_string(),
            update: edit.update,
        })
        .await?;
    }
    let sent = pool.finish().await?;
    info!(
        delivered = sent.delivered,
        failed = sent.failed,
        attempts = sent.attempts,
        "all updates handed to the relay"
    );

    let poll = IdlePoller::new(bench.updates, ctx.poll_policy())
        .run(move || async move {
            match ctx.bridge.receive_batch(receiver).await {
                Ok(batch) => RoundOutcome::Yielded(batch.iter().filter(|u| ctx.admit(u)).count()),
                Err(e) => RoundOutcome::Failed(e),
            }
        })
        .await;
    let missing: Vec<u64> = (1..=bench.updates as u64)
        .filter(|id| !ctx.registry.contains(*id))
        .collect();
    info!(
        state = ?poll.state,
        collected = poll.collected,
        distinct = ctx.registry.len(),
        rounds = poll.rounds,
        missing = missing.len(),
        "receive finished"
    );
    if !missing.is_empty() {
        debug!(?missing, "updates never received");
    }

    for (id, update) in ctx.registry.sorted() {
        ctx.apply(id, &update, &mut b)?;
    }

    let mut findings = Findings {
        poll: Some(poll),
        ..Findings::default()
    };
    findings.check_converged(&a.text(), &b.text());
    findings.measure_reload(factory, &a)?;
    Ok(findings)
}
