//! The worker's sampling loop and reporting handshake.
//!
//! Phases: sampling → requesting → waiting for the grant → reporting →
//! back to sampling. The whole worker runs on a single task selecting
//! over two timers and the signal event queue, so the accumulator and
//! the permission flag have exactly one owner; asynchronous signal
//! delivery reaches this loop only as queued events.
//!
//! The handshake is at-least-once: the report request is re-sent every
//! resend interval until the supervisor answers. A grant arrives as a
//! Resume (the wire cannot distinguish the two, see `protocol`); a
//! Suspend arriving instead means the operator paused us mid-request,
//! and the report is abandoned with permission cleared.

use crate::config::WorkerConfig;
use crate::protocol::{self, decode, Message, Role};
use crate::sampler::SampleAccumulator;
use crate::signals::SignalEvent;
use nix::unistd::{getpid, getppid, Pid};
use std::time::Duration;
use tokio::sync::mpsc;

/// How a wait-for-grant exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrantOutcome {
    Granted,
    Suspended,
}

/// Run the worker against the real parent process. Never returns; the
/// worker ends only by `SIGTERM`, which keeps its default disposition.
pub async fn run(config: &WorkerConfig, mut events: mpsc::UnboundedReceiver<SignalEvent>) {
    let parent = getppid();
    let own = getpid();
    tracing::info!(%parent, %own, "worker sampling started");

    let mut send = |message: Message| {
        // Fire-and-forget: a missing supervisor is a liveness risk the
        // retry loop tolerates, not an error we can act on.
        if let Err(e) = protocol::send(parent, message) {
            tracing::warn!(error = %e, "failed to signal supervisor");
        }
    };
    let mut emit = |report: String| println!("{report}");

    run_loop(config, &mut events, parent, own, &mut send, &mut emit).await;
}

async fn run_loop(
    config: &WorkerConfig,
    events: &mut mpsc::UnboundedReceiver<SignalEvent>,
    parent: Pid,
    own: Pid,
    send: &mut impl FnMut(Message),
    emit: &mut impl FnMut(String),
) {
    let tick = Duration::from_secs(config.tick_secs.max(1));
    let resend = Duration::from_secs(config.resend_secs.max(1));

    let mut acc = SampleAccumulator::new();
    let mut permitted = false;
    let mut iterations: u32 = 0;

    let start = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval_at(start + tick, tick);
    let mut alarm = tokio::time::interval_at(start + tick, tick);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                acc.advance();
                iterations += 1;
                if iterations >= config.report_after && permitted {
                    // The alarm is effectively disarmed for the duration
                    // of the handshake: it cannot fire while await_grant
                    // runs on this same task, and the resets below
                    // discard the backlog instead of bursting it into
                    // the counters.
                    match await_grant(events, resend, &mut permitted, send).await {
                        GrantOutcome::Granted => {
                            emit(acc.format_report(parent, own));
                            send(Message::ReportDone);
                        }
                        GrantOutcome::Suspended => {
                            tracing::debug!("suspended before grant, report abandoned");
                        }
                    }
                    iterations = 0;
                    alarm.reset();
                    ticker.reset();
                }
            }
            _ = alarm.tick() => {
                acc.record_tick();
            }
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::warn!("signal event channel closed, stopping");
                    return;
                };
                match decode(Role::Worker, event.signal) {
                    Some(Message::Suspend) => permitted = false,
                    Some(Message::Resume) => permitted = true,
                    _ => {}
                }
            }
        }
    }
}

/// Send the report request and block until the supervisor answers,
/// re-sending once per resend interval. Duplicate requests are fine:
/// the supervisor answers each with a grant and we consume one.
async fn await_grant(
    events: &mut mpsc::UnboundedReceiver<SignalEvent>,
    resend: Duration,
    permitted: &mut bool,
    send: &mut impl FnMut(Message),
) -> GrantOutcome {
    loop {
        send(Message::RequestReport);
        match tokio::time::timeout(resend, events.recv()).await {
            Ok(Some(event)) => match decode(Role::Worker, event.signal) {
                Some(Message::Resume) => {
                    *permitted = true;
                    return GrantOutcome::Granted;
                }
                Some(Message::Suspend) => {
                    // The operator paused us while we were asking; honor
                    // the stop instead of treating it as an answer.
                    *permitted = false;
                    return GrantOutcome::Suspended;
                }
                _ => {}
            },
            Ok(None) => {
                tracing::warn!("signal event channel closed while awaiting grant");
                return GrantOutcome::Suspended;
            }
            // No reply within a tick: re-send the request.
            Err(_) => {}
        }
    }
}
