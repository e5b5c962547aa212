//! Caller terminal mode: save, switch to raw, restore
//!
//! While a command runs, keystrokes must reach the child's own line
//! discipline on the pty untouched (Ctrl-C included), so the caller's
//! terminal is put in raw mode. [`RawModeGuard`] restores the exact saved
//! `termios` on [`RawModeGuard::restore`] or, failing that, on drop.

use super::SessionError;
use std::io;
use std::os::fd::RawFd;

pub fn is_terminal(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

pub(crate) fn get_termios(fd: RawFd) -> io::Result<libc::termios> {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(termios)
}

fn set_termios(fd: RawFd, termios: &libc::termios) -> io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Raw mode held on one descriptor for the lifetime of the guard
#[derive(Debug)]
pub struct RawModeGuard {
    fd: RawFd,
    original: libc::termios,
    restored: bool,
}

impl RawModeGuard {
    /// Save the current mode of `fd` and switch it to raw mode.
    pub fn enter(fd: RawFd) -> Result<Self, SessionError> {
        let original = get_termios(fd).map_err(SessionError::TerminalMode)?;
        let mut raw = original;
        unsafe {
            libc::cfmakeraw(&mut raw);
        }
        set_termios(fd, &raw).map_err(SessionError::TerminalMode)?;
        tracing::debug!(fd, "terminal switched to raw mode");
        Ok(Self {
            fd,
            original,
            restored: false,
        })
    }

    /// Put the saved mode back, reporting failure.
    pub fn restore(mut self) -> Result<(), SessionError> {
        self.restore_saved()
    }

    fn restore_saved(&mut self) -> Result<(), SessionError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        set_termios(self.fd, &self.original).map_err(SessionError::TerminalMode)?;
        tracing::debug!(fd = self.fd, "terminal mode restored");
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore_saved() {
            tracing::error!(fd = self.fd, error = %err, "failed to restore terminal mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pty {
        master: RawFd,
        slave: RawFd,
    }

    impl Drop for Pty {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.master);
                libc::close(self.slave);
            }
        }
    }

    fn open_pty() -> Pty {
        let mut master: libc::c_int = 0;
        let mut slave: libc::c_int = 0;
        let result = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, 0, "openpty failed");
        Pty { master, slave }
    }

    fn assert_same_mode(left: &libc::termios, right: &libc::termios) {
        assert_eq!(left.c_iflag, right.c_iflag, "c_iflag");
        assert_eq!(left.c_oflag, right.c_oflag, "c_oflag");
        assert_eq!(left.c_cflag, right.c_cflag, "c_cflag");
        assert_eq!(left.c_lflag, right.c_lflag, "c_lflag");
        assert_eq!(left.c_cc, right.c_cc, "c_cc");
        unsafe {
            assert_eq!(libc::cfgetispeed(left), libc::cfgetispeed(right), "input speed");
            assert_eq!(libc::cfgetospeed(left), libc::cfgetospeed(right), "output speed");
        }
    }

    #[test]
    fn test_raw_mode_is_applied_and_restored_exactly() {
        let pty = open_pty();
        let before = get_termios(pty.slave).unwrap();
        assert!(before.c_lflag & libc::ICANON != 0, "fresh pty should be canonical");

        let guard = RawModeGuard::enter(pty.slave).unwrap();
        let during = get_termios(pty.slave).unwrap();
        assert_eq!(during.c_lflag & (libc::ICANON | libc::ECHO | libc::ISIG), 0);

        guard.restore().unwrap();
        assert_same_mode(&before, &get_termios(pty.slave).unwrap());
    }

    #[test]
    fn test_drop_restores_mode_on_early_exit() {
        let pty = open_pty();
        let before = get_termios(pty.slave).unwrap();

        let failing_step = || -> Result<(), SessionError> {
            let _guard = RawModeGuard::enter(pty.slave)?;
            Err(SessionError::Wait(io::Error::other("simulated failure")))
        };
        assert!(failing_step().is_err());

        assert_same_mode(&before, &get_termios(pty.slave).unwrap());
    }

    #[test]
    fn test_repeated_sessions_leave_mode_unchanged() {
        let pty = open_pty();
        let before = get_termios(pty.slave).unwrap();
        for _ in 0..3 {
            RawModeGuard::enter(pty.slave).unwrap().restore().unwrap();
        }
        assert_same_mode(&before, &get_termios(pty.slave).unwrap());
    }

    #[test]
    fn test_enter_fails_on_non_terminal() {
        let err = RawModeGuard::enter(-1).unwrap_err();
        assert!(matches!(err, SessionError::TerminalMode(_)));
        assert!(!is_terminal(-1));
    }
}
