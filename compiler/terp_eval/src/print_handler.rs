//! Destinations for the `print`/`println` builtins.
//!
//! Embedders pick stdout (the default), an in-memory buffer (tests, hosts
//! that display output themselves) or silence. Enum dispatch keeps the
//! per-call cost to a match.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

/// Output sink for interpreted programs.
pub enum PrintHandler {
    Stdout,
    Buffer(Mutex<String>),
    Silent,
}

impl PrintHandler {
    /// Write `text` as-is; goroutines printing concurrently never interleave
    /// within one call.
    pub fn write(&self, text: &str) {
        match self {
            PrintHandler::Stdout => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                let _ = lock.write_all(text.as_bytes());
                let _ = lock.flush();
            }
            PrintHandler::Buffer(buf) => buf.lock().push_str(text),
            PrintHandler::Silent => {}
        }
    }

    /// Everything written so far; empty unless buffering.
    pub fn output(&self) -> String {
        match self {
            PrintHandler::Buffer(buf) => buf.lock().clone(),
            PrintHandler::Stdout | PrintHandler::Silent => String::new(),
        }
    }

    /// Return and clear the buffered output.
    pub fn take_output(&self) -> String {
        match self {
            PrintHandler::Buffer(buf) => std::mem::take(&mut *buf.lock()),
            PrintHandler::Stdout | PrintHandler::Silent => String::new(),
        }
    }
}

/// Print handler shared by every task of a run.
pub type SharedPrintHandler = Arc<PrintHandler>;

pub fn stdout_handler() -> SharedPrintHandler {
    Arc::new(PrintHandler::Stdout)
}

pub fn buffer_handler() -> SharedPrintHandler {
    Arc::new(PrintHandler::Buffer(Mutex::new(String::new())))
}

pub fn silent_handler() -> SharedPrintHandler {
    Arc::new(PrintHandler::Silent)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn buffer_captures_writes_in_order() {
        let handler = buffer_handler();
        handler.write("a ");
        handler.write("b\n");
        assert_eq!(handler.output(), "a b\n");
    }

    #[test]
    fn take_output_clears() {
        let handler = buffer_handler();
        handler.write("once\n");
        assert_eq!(handler.take_output(), "once\n");
        assert_eq!(handler.output(), "");
    }

    #[test]
    fn silent_and_stdout_capture_nothing() {
        let silent = silent_handler();
        silent.write("dropped");
        assert_eq!(silent.output(), "");
        assert_eq!(stdout_handler().take_output(), "");
    }

    #[test]
    fn buffer_is_shared_across_threads() {
        let handler = buffer_handler();
        let other = Arc::clone(&handler);
        let t = std::thread::spawn(move || {
            for _ in 0..100 {
                other.write("a\n");
            }
        });
        for _ in 0..100 {
            handler.write("b\n");
        }
        t.join().unwrap();
        assert_eq!(handler.output().lines().count(), 200);
    }
}
