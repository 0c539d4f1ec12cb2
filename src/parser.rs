//! Turns one submitted line into a [`ParsedLine`].
//!
//! Words are split on whitespace only; there is no quoting. `$$` expands to
//! the shell's process id, `<`/`>` take the next word as a path, and a lone
//! trailing `&` requests background execution.

use crate::command::CommandLine;
use crate::error::ParsingError;
use std::path::PathBuf;

const PID_VARIABLE: &str = "$$";

/// What a single line of input amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Blank line.
    Empty,
    /// First word starts with `#`.
    Comment,
    Command(CommandLine),
}

pub fn parse_line(line: &str, shell_pid: u32) -> Result<ParsedLine, ParsingError> {
    let pid = shell_pid.to_string();
    let mut words: Vec<String> = line
        .split_whitespace()
        .map(|w| w.replace(PID_VARIABLE, &pid))
        .collect();

    match words.first() {
        None => return Ok(ParsedLine::Empty),
        Some(first) if first.starts_with('#') => return Ok(ParsedLine::Comment),
        Some(_) => {}
    }

    let background = words.last().is_some_and(|w| w == "&");
    if background {
        words.pop();
    }

    let mut stdin = None;
    let mut stdout = None;
    let mut argv = Vec::with_capacity(words.len());
    let mut iter = words.into_iter();
    while let Some(word) = iter.next() {
        match word.as_str() {
            "<" => {
                let target = iter.next().ok_or(ParsingError::MissingRedirectTarget("<"))?;
                stdin = Some(PathBuf::from(target));
            }
            ">" => {
                let target = iter.next().ok_or(ParsingError::MissingRedirectTarget(">"))?;
                stdout = Some(PathBuf::from(target));
            }
            _ => argv.push(word),
        }
    }

    if argv.is_empty() {
        return Err(ParsingError::MissingProgram);
    }
    let program = argv.remove(0);

    Ok(ParsedLine::Command(CommandLine {
        program,
        args: argv,
        stdin,
        stdout,
        background,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> CommandLine {
        match parse_line(line, 4242).unwrap() {
            ParsedLine::Command(cmd) => cmd,
            other => panic!("expected a command, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(parse_line("", 1).unwrap(), ParsedLine::Empty);
        assert_eq!(parse_line("   \t ", 1).unwrap(), ParsedLine::Empty);
        assert_eq!(parse_line("# sleep 5 &", 1).unwrap(), ParsedLine::Comment);
        assert_eq!(parse_line("#comment", 1).unwrap(), ParsedLine::Comment);
    }

    #[test]
    fn test_hash_inside_line_is_not_a_comment() {
        let cmd = command("echo #not-a-comment");
        assert_eq!(cmd.program, "echo");
        assert_eq!(cmd.args, vec!["#not-a-comment"]);
    }

    #[test]
    fn test_plain_command_with_args() {
        let cmd = command("ls -la /tmp");
        assert_eq!(cmd.program, "ls");
        assert_eq!(cmd.args, vec!["-la", "/tmp"]);
        assert!(!cmd.background);
        assert_eq!(cmd.argv().collect::<Vec<_>>(), vec!["ls", "-la", "/tmp"]);
    }

    #[test]
    fn test_trailing_ampersand_requests_background() {
        let cmd = command("sleep 5 &");
        assert!(cmd.background);
        assert_eq!(cmd.args, vec!["5"]);
    }

    #[test]
    fn test_ampersand_not_last_is_an_argument() {
        let cmd = command("echo & done");
        assert!(!cmd.background);
        assert_eq!(cmd.args, vec!["&", "done"]);
    }

    #[test]
    fn test_redirections_are_removed_from_args() {
        let cmd = command("sort < in.txt > out.txt -r &");
        assert_eq!(cmd.program, "sort");
        assert_eq!(cmd.args, vec!["-r"]);
        assert_eq!(cmd.stdin, Some(PathBuf::from("in.txt")));
        assert_eq!(cmd.stdout, Some(PathBuf::from("out.txt")));
        assert!(cmd.background);
    }

    #[test]
    fn test_last_redirection_wins() {
        let cmd = command("cat > a > b");
        assert_eq!(cmd.stdout, Some(PathBuf::from("b")));
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_pid_expansion() {
        let cmd = command("echo $$ pre$$post $$$$");
        assert_eq!(cmd.args, vec!["4242", "pre4242post", "42424242"]);
    }

    #[test]
    fn test_missing_redirect_target() {
        assert_eq!(
            parse_line("cat <", 1),
            Err(ParsingError::MissingRedirectTarget("<"))
        );
        assert_eq!(
            parse_line("ls > &", 1),
            Err(ParsingError::MissingRedirectTarget(">"))
        );
    }

    #[test]
    fn test_redirection_without_program() {
        assert_eq!(parse_line("< in.txt", 1), Err(ParsingError::MissingProgram));
    }
}
