//! Command confirmation gate
//!
//! Before any proposed command runs, the operator sees the literal command
//! line and answers yes or no. Only `y` / `yes` (any case, surrounding
//! whitespace ignored) approves; everything else, end of input included,
//! declines.

use std::io::{self, BufRead, Read, Write};
use std::os::fd::RawFd;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("failed to read confirmation: {0}")]
    Read(#[from] io::Error),
}

/// Blocks for an operator decision on one command
pub trait ConfirmationGate: Send {
    fn confirm(&mut self, command: &str) -> Result<bool, ConfirmationError>;
}

/// True iff the trimmed, lower-cased answer is `y` or `yes`
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Prompt on any writer, read the answer from any reader
pub struct PromptGate<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead + Send, W: Write + Send> PromptGate<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl<R: BufRead + Send, W: Write + Send> ConfirmationGate for PromptGate<R, W> {
    fn confirm(&mut self, command: &str) -> Result<bool, ConfirmationError> {
        prompt(&mut self.input, &mut self.output, command)
    }
}

/// Gate reading the answer from a descriptor (stdin by default) and prompting on stdout.
///
/// The answer is read one byte at a time: anything typed or piped after the
/// newline stays on the descriptor for the command that runs next.
#[derive(Debug)]
pub struct StdioGate {
    input_fd: RawFd,
}

impl StdioGate {
    pub fn with_input(input_fd: RawFd) -> Self {
        Self { input_fd }
    }
}

impl Default for StdioGate {
    fn default() -> Self {
        Self::with_input(libc::STDIN_FILENO)
    }
}

impl ConfirmationGate for StdioGate {
    fn confirm(&mut self, command: &str) -> Result<bool, ConfirmationError> {
        let mut input = io::BufReader::with_capacity(1, FdInput(self.input_fd));
        let stdout = io::stdout();
        prompt(&mut input, &mut stdout.lock(), command)
    }
}

/// Unbuffered reads from a borrowed descriptor
struct FdInput(RawFd);

impl Read for FdInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = unsafe { libc::read(self.0, buf.as_mut_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

fn prompt(input: &mut impl BufRead, output: &mut impl Write, command: &str) -> Result<bool, ConfirmationError> {
    tracing::info!(command = %command, "Approval requested");

    write!(
        output,
        "💬 Are you sure you want to run {}? [y/N]: ",
        crate::ui::command(command)
    )?;
    output.flush()?;

    let mut answer = String::new();
    let read = input.read_line(&mut answer)?;
    if read == 0 {
        // No answer ever arrives on a closed stream.
        writeln!(output)?;
    }
    let approved = is_affirmative(&answer);

    tracing::info!(command = %command, approved, "Approval decision recorded");
    Ok(approved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(answer: &str) -> (bool, String) {
        let mut gate = PromptGate::new(Cursor::new(answer.as_bytes().to_vec()), Vec::new());
        let approved = gate.confirm("rm -rf build").unwrap();
        let (_, output) = gate.into_parts();
        (approved, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_is_affirmative() {
        for yes in ["y", "Y", "yes", "YES", "  Yes \n", "y\r\n"] {
            assert!(is_affirmative(yes), "{yes:?}");
        }
        for no in ["", "n", "no", "yep", "ye", "y y", "sure", "\n"] {
            assert!(!is_affirmative(no), "{no:?}");
        }
    }

    #[test]
    fn test_prompt_echoes_literal_command() {
        let (approved, output) = ask("y\n");
        assert!(approved);
        assert!(output.contains("rm -rf build"));
        assert!(output.trim_end().ends_with("[y/N]:"));
    }

    #[test]
    fn test_decline_and_eof() {
        assert!(!ask("n\n").0);
        assert!(!ask("\n").0);
        assert!(!ask("").0);
    }

    #[test]
    fn test_unreadable_input_is_an_error() {
        struct Broken;
        impl io::Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("stdin closed"))
            }
        }

        let mut gate = PromptGate::new(io::BufReader::new(Broken), Vec::new());
        assert!(matches!(gate.confirm("ls"), Err(ConfirmationError::Read(_))));
    }

    fn pipe_with(data: &[u8]) -> (RawFd, RawFd) {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let written = unsafe { libc::write(fds[1], data.as_ptr().cast(), data.len()) };
        assert_eq!(written, data.len() as isize);
        (fds[0], fds[1])
    }

    #[test]
    fn test_stdio_gate_leaves_following_input_unread() {
        let (read_end, write_end) = pipe_with(b"y\nJohn\n");
        let mut gate = StdioGate::with_input(read_end);
        assert!(gate.confirm("read name").unwrap());

        let mut rest = [0u8; 16];
        let n = unsafe { libc::read(read_end, rest.as_mut_ptr().cast(), rest.len()) };
        assert_eq!(&rest[..n as usize], b"John\n");

        unsafe {
            libc::close(write_end);
        }
        assert!(!gate.confirm("read name").unwrap(), "end of input declines");
        unsafe {
            libc::close(read_end);
        }
    }

    #[test]
    fn test_one_answer_per_prompt() {
        let mut gate = PromptGate::new(Cursor::new(b"yes\nno\n".to_vec()), Vec::new());
        assert!(gate.confirm("first").unwrap());
        assert!(!gate.confirm("second").unwrap());
        assert!(!gate.confirm("third").unwrap());
    }
}
