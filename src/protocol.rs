//! Signal-level wire contract between supervisor and worker.
//!
//! Two signal channels are shared by both directions with different
//! meanings, inherited from the protocol this tool speaks:
//!
//! | wire      | worker → supervisor | supervisor → worker     |
//! |-----------|---------------------|-------------------------|
//! | `SIGUSR1` | RequestReport       | Suspend                 |
//! | `SIGUSR2` | ReportDone          | Resume (doubles as the  |
//! |           |                     | grant for a pending     |
//! |           |                     | report request)         |
//!
//! Rather than interpreting raw signal numbers all over the place, each
//! side decodes into a tagged [`Message`] according to its [`Role`]. The
//! overload is thereby confined to this module: a worker cannot tell an
//! operator-issued Resume from the grant answering its own request, and
//! its handshake phase decides which it was.
//!
//! Every message is sent with `sigqueue(2)` carrying the sender's pid as
//! the one-integer payload. Delivery is fire-and-forget.

use nix::unistd::Pid;
use signal_hook::consts::{SIGUSR1, SIGUSR2};

/// Tagged message kinds layered over the two wire signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Worker asks for a reporting window (re-sent until answered).
    RequestReport,
    /// Supervisor answers a report request. Same wire code as `Resume`.
    GrantReport,
    /// Worker finished printing its tally. Informational only.
    ReportDone,
    /// Operator pauses a worker's reporting.
    Suspend,
    /// Operator resumes a worker's reporting.
    Resume,
}

/// Which end of the protocol is decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Supervisor,
    Worker,
}

impl Message {
    /// The signal number this message travels as.
    pub fn wire_signal(self) -> i32 {
        match self {
            Message::RequestReport | Message::Suspend => SIGUSR1,
            Message::GrantReport | Message::ReportDone | Message::Resume => SIGUSR2,
        }
    }
}

/// Decode a received signal number for the given role.
///
/// Returns `None` for signals outside the protocol (the listener never
/// subscribes to any, but the decode stays total). A worker always
/// decodes `SIGUSR2` as `Resume`; whether that also answers a pending
/// request is the worker's handshake state, not the wire's.
pub fn decode(role: Role, signal: i32) -> Option<Message> {
    match (role, signal) {
        (Role::Supervisor, s) if s == SIGUSR1 => Some(Message::RequestReport),
        (Role::Supervisor, s) if s == SIGUSR2 => Some(Message::ReportDone),
        (Role::Worker, s) if s == SIGUSR1 => Some(Message::Suspend),
        (Role::Worker, s) if s == SIGUSR2 => Some(Message::Resume),
        _ => None,
    }
}

/// Failure to queue a signal to a peer process.
#[derive(Debug)]
pub struct SendError {
    pub to: Pid,
    pub source: std::io::Error,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to signal process {}: {}", self.to, self.source)
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Queue `message` to `to`, carrying our own pid as the payload.
///
/// The receiving side reads the sender identity from the siginfo origin,
/// which the kernel fills from the same value for queued signals.
pub fn send(to: Pid, message: Message) -> Result<(), SendError> {
    let payload = libc::sigval {
        sival_ptr: std::process::id() as usize as *mut libc::c_void,
    };
    // SAFETY: plain syscall wrapper; no pointers are dereferenced, the
    // payload is an integer smuggled through the sigval field.
    let rc = unsafe { libc::sigqueue(to.as_raw(), message.wire_signal(), payload) };
    if rc == -1 {
        Err(SendError {
            to,
            source: std::io::Error::last_os_error(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_suspend_share_a_wire_signal() {
        assert_eq!(
            Message::RequestReport.wire_signal(),
            Message::Suspend.wire_signal()
        );
    }

    #[test]
    fn grant_resume_and_done_share_a_wire_signal() {
        assert_eq!(
            Message::GrantReport.wire_signal(),
            Message::Resume.wire_signal()
        );
        assert_eq!(
            Message::ReportDone.wire_signal(),
            Message::Resume.wire_signal()
        );
    }

    #[test]
    fn supervisor_decodes_worker_messages() {
        assert_eq!(
            decode(Role::Supervisor, SIGUSR1),
            Some(Message::RequestReport)
        );
        assert_eq!(decode(Role::Supervisor, SIGUSR2), Some(Message::ReportDone));
    }

    #[test]
    fn worker_decodes_supervisor_messages() {
        assert_eq!(decode(Role::Worker, SIGUSR1), Some(Message::Suspend));
        assert_eq!(decode(Role::Worker, SIGUSR2), Some(Message::Resume));
    }

    #[test]
    fn decode_rejects_signals_outside_the_protocol() {
        assert_eq!(decode(Role::Supervisor, signal_hook::consts::SIGCHLD), None);
        assert_eq!(decode(Role::Worker, signal_hook::consts::SIGTERM), None);
    }

    #[test]
    fn the_same_wire_signal_means_different_things_per_direction() {
        // The documented overload: one channel, two meanings.
        let wire = Message::RequestReport.wire_signal();
        assert_eq!(decode(Role::Supervisor, wire), Some(Message::RequestReport));
        assert_eq!(decode(Role::Worker, wire), Some(Message::Suspend));
    }
}
