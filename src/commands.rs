//! Operator command parsing: one character per line, optional trailing
//! single-digit index.

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `m` — print the menu.
    Menu,
    /// `+` — spawn one worker.
    Spawn,
    /// `-` — delete the most recently spawned worker.
    DeleteLast,
    /// `l` — list the roster with running/stopped status.
    List,
    /// `k` — delete the entire roster.
    DeleteAll,
    /// `s<N>` — revoke reporting permission for roster index N.
    Suspend(Option<usize>),
    /// `g<N>` — grant reporting permission for roster index N.
    Resume(Option<usize>),
    /// `q` — graceful shutdown.
    Quit,
}

/// Parse one input line. Unrecognized commands are reported and leave
/// all state unchanged; a missing index is carried as `None` so the
/// supervisor can answer with its invalid-index diagnostic.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim_end();
    let mut chars = line.chars();
    let option = chars.next();
    let index = chars
        .next()
        .filter(|c| c.is_ascii_digit())
        .map(|c| c as usize - '0' as usize);

    match option {
        Some('m') => Ok(Command::Menu),
        Some('+') => Ok(Command::Spawn),
        Some('-') => Ok(Command::DeleteLast),
        Some('l') => Ok(Command::List),
        Some('k') => Ok(Command::DeleteAll),
        Some('s') => Ok(Command::Suspend(index)),
        Some('g') => Ok(Command::Resume(index)),
        Some('q') => Ok(Command::Quit),
        _ => Err("Invalid option. Type 'm' for menu.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_commands() {
        assert_eq!(parse("m"), Ok(Command::Menu));
        assert_eq!(parse("+"), Ok(Command::Spawn));
        assert_eq!(parse("-"), Ok(Command::DeleteLast));
        assert_eq!(parse("l"), Ok(Command::List));
        assert_eq!(parse("k"), Ok(Command::DeleteAll));
        assert_eq!(parse("q"), Ok(Command::Quit));
    }

    #[test]
    fn parses_indexed_commands() {
        assert_eq!(parse("s0"), Ok(Command::Suspend(Some(0))));
        assert_eq!(parse("g3"), Ok(Command::Resume(Some(3))));
        assert_eq!(parse("s9"), Ok(Command::Suspend(Some(9))));
    }

    #[test]
    fn missing_index_is_carried_as_none() {
        assert_eq!(parse("s"), Ok(Command::Suspend(None)));
        assert_eq!(parse("g"), Ok(Command::Resume(None)));
        assert_eq!(parse("sx"), Ok(Command::Suspend(None)));
    }

    #[test]
    fn trailing_newline_is_ignored() {
        assert_eq!(parse("g2\n"), Ok(Command::Resume(Some(2))));
        assert_eq!(parse("l\n"), Ok(Command::List));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(parse("x").is_err());
        assert!(parse("").is_err());
        assert!(parse("\n").is_err());
        assert!(parse("7").is_err());
    }
}
