//! Interactive terminal prompts used while connecting.
//!
//! Host-key confirmation, key passphrases, and passwords are asked for on the
//! controlling terminal.  Reads happen on tokio's blocking pool so the runtime
//! thread is never parked on stdin.

use std::io::{self, BufRead, Write};

/// Asks `question` on stderr and returns the answer without its line ending.
///
/// # Errors
///
/// Returns an I/O error if stdin is closed or unreadable.
pub async fn prompt_line(question: &str) -> io::Result<String> {
    let question = question.to_string();
    run_blocking(move || {
        write_question(&question)?;
        read_answer()
    })
    .await
}

/// Like [`prompt_line`], but with terminal echo disabled while typing.
///
/// # Errors
///
/// Returns an I/O error if stdin is closed or unreadable.
pub async fn prompt_secret(question: &str) -> io::Result<String> {
    let question = question.to_string();
    run_blocking(move || {
        write_question(&question)?;
        let answer = {
            let _echo = EchoGuard::disable();
            read_answer()
        };
        // The user's Enter was not echoed.
        eprintln!();
        answer
    })
    .await
}

/// Returns `true` if `answer` is an explicit "yes".
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

async fn run_blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

fn write_question(question: &str) -> io::Result<()> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{question}")?;
    stderr.flush()
}

fn read_answer() -> io::Result<String> {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stdin closed before an answer was given",
        ));
    }
    let trimmed = line.strip_suffix('\n').unwrap_or(&line);
    Ok(trimmed.strip_suffix('\r').unwrap_or(trimmed).to_string())
}

/// Turns terminal echo off until dropped.  Does nothing if stdin is not a tty.
struct EchoGuard {
    #[cfg(target_os = "linux")]
    saved: Option<libc::termios>,
}

impl EchoGuard {
    #[cfg(target_os = "linux")]
    fn disable() -> Self {
        // SAFETY: `termios` is plain old data; tcgetattr fully initialises it
        // on success and we only use it in that case.
        unsafe {
            let mut current: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut current) != 0 {
                return Self { saved: None };
            }
            let saved = current;
            current.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &current) != 0 {
                return Self { saved: None };
            }
            Self { saved: Some(saved) }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn disable() -> Self {
        Self {}
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        if let Some(saved) = self.saved {
            // SAFETY: restores the attributes read in `disable`.
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
            }
        }
    }
}
