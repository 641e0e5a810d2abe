//! The supervisor: roster bookkeeping, operator commands, and the
//! controller side of the reporting handshake.
//!
//! Everything runs on one event loop selecting over operator input and
//! the signal event queue, so the roster is only ever touched from one
//! place; command handling and exit-driven pruning cannot interleave.

use crate::commands::{self, Command};
use crate::process::ProcessOps;
use crate::protocol::{decode, Message, Role};
use crate::roster::Roster;
use crate::signals::SignalEvent;
use nix::unistd::Pid;
use signal_hook::consts::SIGCHLD;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// What the event loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Quit,
}

pub fn menu() -> &'static str {
    "\nOptions:\n\
     +      - Create new worker\n\
     -      - Delete last worker\n\
     l      - List all workers\n\
     k      - Delete all workers\n\
     s<num> - Stop reporting for worker at index <num>\n\
     g<num> - Start reporting for worker at index <num>\n\
     q      - Quit\n\
     m      - Show this menu"
}

/// Owns the roster and the process seam. All output intended for the
/// operator is returned as text; the event loop prints it.
pub struct Supervisor<P> {
    roster: Roster,
    /// Pids the operator deleted that have not been reaped yet. Their
    /// roster records are already gone; shutdown still waits for them.
    departed: Vec<Pid>,
    procs: P,
    worker_command: PathBuf,
}

impl<P: ProcessOps> Supervisor<P> {
    pub fn new(procs: P, worker_command: PathBuf, label_prefix: &str) -> Self {
        Self {
            roster: Roster::new(label_prefix),
            departed: Vec::new(),
            procs,
            worker_command,
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Apply one operator command, returning the text to print.
    pub fn execute(&mut self, command: Command) -> (Step, String) {
        match command {
            Command::Menu => (Step::Continue, menu().to_string()),
            Command::Spawn => (Step::Continue, self.spawn_worker()),
            Command::DeleteLast => (Step::Continue, self.delete_last()),
            Command::List => (Step::Continue, self.list()),
            Command::DeleteAll => (Step::Continue, self.delete_all()),
            Command::Suspend(index) => (Step::Continue, self.set_permitted(index, false)),
            Command::Resume(index) => (Step::Continue, self.set_permitted(index, true)),
            Command::Quit => (Step::Quit, self.shutdown()),
        }
    }

    /// React to one asynchronous signal event, returning lines to print.
    pub fn handle_signal(&mut self, event: SignalEvent) -> Vec<String> {
        if event.signal == SIGCHLD {
            return self.reap_exited();
        }
        let Some(message) = decode(Role::Supervisor, event.signal) else {
            tracing::warn!(signal = event.signal, "unexpected signal, ignoring");
            return Vec::new();
        };
        let Some(sender) = event.sender else {
            tracing::warn!(signal = event.signal, "protocol signal without sender, ignoring");
            return Vec::new();
        };
        match message {
            Message::RequestReport => {
                // Unconditional, immediate grant. Duplicate requests from
                // a worker re-sending while it waits just get another
                // grant; the worker consumes one and ignores the rest.
                if let Err(e) = self.procs.notify(sender, Message::GrantReport) {
                    tracing::warn!(error = %e, "failed to grant report");
                }
                vec![format!(
                    "Supervisor: received report request from worker {sender}"
                )]
            }
            Message::ReportDone => {
                vec![format!("Supervisor: worker {sender} has finished reporting")]
            }
            _ => Vec::new(),
        }
    }

    fn spawn_worker(&mut self) -> String {
        match self.procs.spawn(&self.worker_command) {
            Ok(pid) => {
                let record = self.roster.push(pid);
                format!("Created worker {} with PID {}", record.label, pid)
            }
            Err(e) => format!("Failed to spawn worker: {e}"),
        }
    }

    /// Remove the last record immediately; the process may still be
    /// tearing down, so its pid is remembered until reaped.
    fn delete_last(&mut self) -> String {
        match self.roster.pop_last() {
            None => "No workers to delete".to_string(),
            Some(record) => {
                if let Err(e) = self.procs.terminate(record.pid) {
                    tracing::warn!(pid = %record.pid, error = %e, "failed to terminate worker");
                }
                self.departed.push(record.pid);
                format!("Deleted worker {} with PID {}", record.label, record.pid)
            }
        }
    }

    fn delete_all(&mut self) -> String {
        let mut lines = Vec::new();
        while !self.roster.is_empty() {
            lines.push(self.delete_last());
        }
        lines.push("All workers deleted".to_string());
        lines.join("\n")
    }

    fn list(&self) -> String {
        let mut lines = vec![format!("Supervisor PID: {}", std::process::id())];
        if self.roster.is_empty() {
            lines.push("No workers running.".to_string());
        } else {
            for record in self.roster.iter() {
                let status = if record.permitted { "running" } else { "stopped" };
                lines.push(format!(
                    "Worker {} with PID {} is {}",
                    record.label, record.pid, status
                ));
            }
        }
        lines.join("\n")
    }

    /// Grant or revoke at `index`. The local mirror is updated
    /// optimistically; the worker never acknowledges.
    fn set_permitted(&mut self, index: Option<usize>, permitted: bool) -> String {
        let Some(index) = index else {
            return "Invalid index".to_string();
        };
        match self.roster.set_permitted(index, permitted) {
            None => "Invalid index".to_string(),
            Some(record) => {
                let message = if permitted {
                    Message::Resume
                } else {
                    Message::Suspend
                };
                if let Err(e) = self.procs.notify(record.pid, message) {
                    tracing::warn!(pid = %record.pid, error = %e, "failed to signal worker");
                }
                let verb = if permitted { "Started" } else { "Stopped" };
                format!("{} worker {} with PID {}", verb, record.label, record.pid)
            }
        }
    }

    /// Drain every terminated child and prune matching roster entries.
    /// A pid with no record (deleted by the operator earlier, or pruned
    /// once already) is reaped silently.
    fn reap_exited(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for pid in self.procs.reap_any() {
            if let Some(record) = self.roster.remove_pid(pid) {
                lines.push(format!(
                    "Worker {} with PID {} has exited",
                    record.label, pid
                ));
            } else {
                self.departed.retain(|p| *p != pid);
                tracing::debug!(%pid, "departed worker reaped");
            }
        }
        lines
    }

    /// Clear the roster, then block until every previously-tracked pid
    /// has confirmed termination. No zombies outlive the supervisor.
    fn shutdown(&mut self) -> String {
        let cleared = self.delete_all();
        for pid in std::mem::take(&mut self.departed) {
            self.procs.await_exit(pid);
        }
        format!("{cleared}\nExiting...")
    }
}

fn prompt() {
    use std::io::Write;
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Interactive event loop: operator lines and signal events, one at a
/// time, until `q` (or end of input, treated the same).
pub async fn run<P: ProcessOps>(
    mut supervisor: Supervisor<P>,
    mut events: mpsc::UnboundedReceiver<SignalEvent>,
) -> std::io::Result<()> {
    use tokio::io::AsyncBufReadExt;

    println!("{}", menu());
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    let (_, out) = supervisor.execute(Command::Quit);
                    println!("{out}");
                    break;
                };
                match commands::parse(&line) {
                    Ok(command) => {
                        let (step, out) = supervisor.execute(command);
                        println!("{out}");
                        if step == Step::Quit {
                            break;
                        }
                    }
                    Err(message) => println!("{message}"),
                }
                prompt();
            }
            Some(event) = events.recv() => {
                for line in supervisor.handle_signal(event) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SpawnError;
    use crate::protocol::SendError;
    use nix::errno::Errno;
    use signal_hook::consts::{SIGUSR1, SIGUSR2};
    use std::collections::VecDeque;
    use std::path::Path;

    /// Records every process operation instead of touching the OS.
    #[derive(Default)]
    struct FakeProcesses {
        next_pid: i32,
        fail_spawn: bool,
        terminated: Vec<Pid>,
        notified: Vec<(Pid, Message)>,
        awaited: Vec<Pid>,
        pending_exits: VecDeque<Pid>,
    }

    impl FakeProcesses {
        fn new() -> Self {
            Self {
                next_pid: 9000,
                ..Default::default()
            }
        }
    }

    impl ProcessOps for FakeProcesses {
        fn spawn(&mut self, command: &Path) -> Result<Pid, SpawnError> {
            if self.fail_spawn {
                return Err(SpawnError {
                    command: command.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            let pid = Pid::from_raw(self.next_pid);
            self.next_pid += 1;
            Ok(pid)
        }

        fn terminate(&mut self, pid: Pid) -> Result<(), Errno> {
            self.terminated.push(pid);
            Ok(())
        }

        fn notify(&mut self, pid: Pid, message: Message) -> Result<(), SendError> {
            self.notified.push((pid, message));
            Ok(())
        }

        fn reap_any(&mut self) -> Vec<Pid> {
            self.pending_exits.drain(..).collect()
        }

        fn await_exit(&mut self, pid: Pid) {
            self.awaited.push(pid);
        }
    }

    fn supervisor() -> Supervisor<FakeProcesses> {
        Supervisor::new(FakeProcesses::new(), PathBuf::from("foreman-worker"), "C_")
    }

    fn sigchld() -> SignalEvent {
        SignalEvent {
            signal: SIGCHLD,
            sender: Some(Pid::from_raw(1)),
        }
    }

    #[test]
    fn spawn_two_then_list_shows_both_stopped() {
        let mut sup = supervisor();
        let (_, out) = sup.execute(Command::Spawn);
        assert_eq!(out, "Created worker C_00 with PID 9000");
        let (_, out) = sup.execute(Command::Spawn);
        assert_eq!(out, "Created worker C_01 with PID 9001");

        let (_, listing) = sup.execute(Command::List);
        assert!(listing.contains("Worker C_00 with PID 9000 is stopped"));
        assert!(listing.contains("Worker C_01 with PID 9001 is stopped"));
        assert_eq!(sup.roster().len(), 2);
    }

    #[test]
    fn list_on_empty_roster() {
        let mut sup = supervisor();
        let (_, listing) = sup.execute(Command::List);
        assert!(listing.contains("No workers running."));
    }

    #[test]
    fn spawn_failure_is_reported_and_roster_unchanged() {
        let mut sup = supervisor();
        sup.procs.fail_spawn = true;
        let (step, out) = sup.execute(Command::Spawn);
        assert_eq!(step, Step::Continue);
        assert!(out.starts_with("Failed to spawn worker"));
        assert_eq!(sup.roster().len(), 0);
    }

    #[test]
    fn suspend_on_empty_roster_is_invalid_index() {
        let mut sup = supervisor();
        let (_, out) = sup.execute(Command::Suspend(Some(0)));
        assert_eq!(out, "Invalid index");
        assert_eq!(sup.roster().len(), 0);
        assert!(sup.procs.notified.is_empty());
    }

    #[test]
    fn suspend_without_index_is_invalid_index() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        let (_, out) = sup.execute(Command::Suspend(None));
        assert_eq!(out, "Invalid index");
    }

    #[test]
    fn resume_signals_worker_and_updates_mirror() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        let (_, out) = sup.execute(Command::Resume(Some(0)));
        assert_eq!(out, "Started worker C_00 with PID 9000");
        assert_eq!(
            sup.procs.notified,
            vec![(Pid::from_raw(9000), Message::Resume)]
        );

        let (_, listing) = sup.execute(Command::List);
        assert!(listing.contains("Worker C_00 with PID 9000 is running"));
    }

    #[test]
    fn suspend_signals_worker_and_updates_mirror() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        sup.execute(Command::Resume(Some(0)));
        let (_, out) = sup.execute(Command::Suspend(Some(0)));
        assert_eq!(out, "Stopped worker C_00 with PID 9000");
        assert_eq!(sup.procs.notified.last().unwrap().1, Message::Suspend);

        let (_, listing) = sup.execute(Command::List);
        assert!(listing.contains("is stopped"));
    }

    #[test]
    fn delete_last_terminates_and_removes_immediately() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        sup.execute(Command::Spawn);
        let (_, out) = sup.execute(Command::DeleteLast);
        assert_eq!(out, "Deleted worker C_01 with PID 9001");
        assert_eq!(sup.procs.terminated, vec![Pid::from_raw(9001)]);
        assert_eq!(sup.roster().len(), 1);
    }

    #[test]
    fn delete_last_on_empty_roster() {
        let mut sup = supervisor();
        let (_, out) = sup.execute(Command::DeleteLast);
        assert_eq!(out, "No workers to delete");
    }

    #[test]
    fn spawn_then_delete_restores_roster_size() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        let before = sup.roster().len();
        for _ in 0..3 {
            sup.execute(Command::Spawn);
        }
        for _ in 0..3 {
            sup.execute(Command::DeleteLast);
        }
        assert_eq!(sup.roster().len(), before);
    }

    #[test]
    fn delete_all_clears_a_three_entry_roster() {
        let mut sup = supervisor();
        for _ in 0..3 {
            sup.execute(Command::Spawn);
        }
        let (_, out) = sup.execute(Command::DeleteAll);
        assert_eq!(sup.roster().len(), 0);
        assert_eq!(sup.procs.terminated.len(), 3);
        assert!(out.ends_with("All workers deleted"));
    }

    #[test]
    fn report_request_is_granted_immediately() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        let lines = sup.handle_signal(SignalEvent {
            signal: SIGUSR1,
            sender: Some(Pid::from_raw(9000)),
        });
        assert_eq!(
            lines,
            vec!["Supervisor: received report request from worker 9000".to_string()]
        );
        assert_eq!(
            sup.procs.notified,
            vec![(Pid::from_raw(9000), Message::GrantReport)]
        );
    }

    #[test]
    fn duplicate_report_requests_are_tolerated() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        let request = SignalEvent {
            signal: SIGUSR1,
            sender: Some(Pid::from_raw(9000)),
        };
        sup.handle_signal(request);
        sup.handle_signal(request);
        // One grant per request; the worker consumes one and the extra
        // just re-affirms its permission.
        assert_eq!(sup.procs.notified.len(), 2);
        assert!(sup
            .procs
            .notified
            .iter()
            .all(|(_, m)| *m == Message::GrantReport));
    }

    #[test]
    fn report_done_is_logged_only() {
        let mut sup = supervisor();
        let lines = sup.handle_signal(SignalEvent {
            signal: SIGUSR2,
            sender: Some(Pid::from_raw(9000)),
        });
        assert_eq!(
            lines,
            vec!["Supervisor: worker 9000 has finished reporting".to_string()]
        );
        assert!(sup.procs.notified.is_empty());
    }

    #[test]
    fn protocol_signal_without_sender_is_ignored() {
        let mut sup = supervisor();
        let lines = sup.handle_signal(SignalEvent {
            signal: SIGUSR1,
            sender: None,
        });
        assert!(lines.is_empty());
        assert!(sup.procs.notified.is_empty());
    }

    #[test]
    fn child_exit_prunes_roster_and_compacts() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        sup.execute(Command::Spawn);
        sup.procs.pending_exits.push_back(Pid::from_raw(9000));

        let lines = sup.handle_signal(sigchld());
        assert_eq!(lines, vec!["Worker C_00 with PID 9000 has exited".to_string()]);
        assert_eq!(sup.roster().len(), 1);
        assert_eq!(sup.roster().get(0).unwrap().label, "C_01");

        // Prune is idempotent: nothing left to reap.
        assert!(sup.handle_signal(sigchld()).is_empty());
    }

    #[test]
    fn permitted_worker_exit_leaves_no_stale_entry() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        sup.execute(Command::Resume(Some(0)));
        sup.procs.pending_exits.push_back(Pid::from_raw(9000));

        sup.handle_signal(sigchld());
        assert_eq!(sup.roster().len(), 0);
    }

    #[test]
    fn exit_of_operator_deleted_worker_is_a_silent_no_op() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        sup.execute(Command::DeleteLast);
        sup.procs.pending_exits.push_back(Pid::from_raw(9000));

        let lines = sup.handle_signal(sigchld());
        assert!(lines.is_empty());
        assert!(sup.departed.is_empty());
    }

    #[test]
    fn quit_clears_roster_and_waits_for_every_tracked_pid() {
        let mut sup = supervisor();
        sup.execute(Command::Spawn);
        sup.execute(Command::Spawn);
        sup.execute(Command::Spawn);
        sup.execute(Command::DeleteLast);

        let (step, out) = sup.execute(Command::Quit);
        assert_eq!(step, Step::Quit);
        assert!(out.contains("All workers deleted"));
        assert!(out.ends_with("Exiting..."));
        assert_eq!(sup.roster().len(), 0);

        let mut awaited: Vec<i32> = sup.procs.awaited.iter().map(|p| p.as_raw()).collect();
        awaited.sort();
        assert_eq!(awaited, vec![9000, 9001, 9002]);
    }
}
