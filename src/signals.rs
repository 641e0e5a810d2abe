//! Asynchronous signal delivery, turned into an event queue.
//!
//! Signal handlers are the one place where this system is genuinely
//! concurrent, so they are kept as dumb as possible: a dedicated listener
//! thread blocks on a `signal-hook` iterator and forwards every delivery
//! as a tagged [`SignalEvent`] on an unbounded channel. The per-process
//! event loop drains the channel deterministically; no other state is
//! ever touched from signal context.
//!
//! The siginfo origin gives us the sender's pid, which for queued
//! protocol signals matches the pid payload the peer put in `sigval`.

use nix::unistd::Pid;
use signal_hook::iterator::exfiltrator::WithOrigin;
use signal_hook::iterator::{Handle, SignalsInfo};
use tokio::sync::mpsc;

/// One delivered signal, as observed by the listener thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    /// Raw signal number.
    pub signal: i32,
    /// Sending process, when the kernel recorded one (`kill`/`sigqueue`
    /// senders and `SIGCHLD` both carry it).
    pub sender: Option<Pid>,
}

/// Keeps the listener thread registered; dropping it unregisters the
/// handlers and lets the thread exit.
pub struct SignalGuard {
    handle: Handle,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// Register for `signals` and start the forwarding thread.
///
/// Fatal at startup if registration fails: the protocol cannot run
/// without its signals. The returned receiver yields events in delivery
/// order for as long as the guard is alive.
pub fn install(
    signals: &[i32],
) -> std::io::Result<(SignalGuard, mpsc::UnboundedReceiver<SignalEvent>)> {
    let mut info = SignalsInfo::<WithOrigin>::new(signals)?;
    let handle = info.handle();
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("signal-listener".to_string())
        .spawn(move || {
            for origin in info.forever() {
                let event = SignalEvent {
                    signal: origin.signal,
                    sender: origin.process.map(|p| Pid::from_raw(p.pid)),
                };
                tracing::trace!(signal = event.signal, sender = ?event.sender, "signal received");
                if tx.send(event).is_err() {
                    // Receiver side went away; nothing left to notify.
                    break;
                }
            }
        })?;

    Ok((SignalGuard { handle }, rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{self, Message};
    use nix::unistd::getpid;
    use serial_test::serial;
    use signal_hook::consts::{SIGUSR1, SIGUSR2};
    use std::time::Duration;

    async fn next_matching(
        rx: &mut mpsc::UnboundedReceiver<SignalEvent>,
        signal: i32,
    ) -> SignalEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for signal delivery")
                .expect("listener channel closed");
            if event.signal == signal {
                return event;
            }
        }
    }

    #[tokio::test]
    #[serial]
    async fn queued_signal_arrives_with_sender_identity() {
        let (_guard, mut rx) = install(&[SIGUSR1]).unwrap();

        protocol::send(getpid(), Message::RequestReport).unwrap();

        let event = next_matching(&mut rx, SIGUSR1).await;
        assert_eq!(event.sender, Some(getpid()));
    }

    #[tokio::test]
    #[serial]
    async fn both_protocol_signals_are_delivered() {
        let (_guard, mut rx) = install(&[SIGUSR1, SIGUSR2]).unwrap();

        protocol::send(getpid(), Message::RequestReport).unwrap();
        let first = next_matching(&mut rx, SIGUSR1).await;
        assert_eq!(first.sender, Some(getpid()));

        protocol::send(getpid(), Message::ReportDone).unwrap();
        let second = next_matching(&mut rx, SIGUSR2).await;
        assert_eq!(second.sender, Some(getpid()));
    }
}
