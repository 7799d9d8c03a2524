// common.rs: console output, error reporting and process argument handling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::q_shared::{MAX_TOKEN_CHARS, PRINT_DEVELOPER};

pub const MAXPRINTMSG: usize = 4096;
pub const MAX_NUM_ARGVS: usize = 50;

// ============================================================
// Error codes
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Exit the entire game with a popup window.
    Fatal,
    /// Print to console and disconnect from game.
    Drop,
    /// Don't kill server.
    Disconnect,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ComError {
    pub code: ErrorCode,
    pub message: String,
}

impl ComError {
    pub fn is_fatal(&self) -> bool {
        self.code == ErrorCode::Fatal
    }
}

// ============================================================
// Redirect buffer for Com_Printf
// ============================================================

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

/// Begin redirecting printf output into a buffer.
pub fn com_begin_redirect() {
    *RD_BUFFER.lock() = Some(String::new());
}

/// End redirect and return the captured output.
pub fn com_end_redirect() -> Option<String> {
    RD_BUFFER.lock().take()
}

// ============================================================
// Com_Printf / Com_Error
// ============================================================

/// General-purpose print function. Prints to stdout unless a redirect
/// buffer is active.
pub fn com_printf(msg: &str) {
    {
        let mut buf = RD_BUFFER.lock();
        if let Some(ref mut s) = *buf {
            if s.len() + msg.len() < MAXPRINTMSG {
                s.push_str(msg);
            }
            return;
        }
    }
    print!("{}", msg);
}

/// Engine error handler. Logs the message and hands it back as a value;
/// callers decide whether to unwind the frame or shut down.
pub fn com_error(code: ErrorCode, msg: &str) -> ComError {
    match code {
        ErrorCode::Fatal => tracing::error!(target: "com", "{}", msg),
        ErrorCode::Drop | ErrorCode::Disconnect => {
            tracing::warn!(target: "com", "{}", msg);
            com_printf(&format!("********************\nERROR: {}\n********************\n", msg));
        }
    }
    ComError {
        code,
        message: msg.to_string(),
    }
}

// ============================================================
// Console: per-context print sink
// ============================================================

/// Where a subsystem's console text goes. The default sink forwards to
/// `com_printf`; a capturing console keeps the text for later inspection.
/// Clones share the same sink and developer flag.
#[derive(Clone, Default)]
pub struct Console {
    capture: Option<Arc<Mutex<String>>>,
    developer: Arc<AtomicBool>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// A console that collects everything printed to it.
    pub fn capturing() -> Self {
        Self {
            capture: Some(Arc::new(Mutex::new(String::new()))),
            developer: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_developer(&self, on: bool) {
        self.developer.store(on, Ordering::Relaxed);
    }

    pub fn developer(&self) -> bool {
        self.developer.load(Ordering::Relaxed)
    }

    pub fn printf(&self, msg: &str) {
        match self.capture {
            Some(ref buf) => buf.lock().push_str(msg),
            None => com_printf(msg),
        }
    }

    /// Developer-only print.
    pub fn dprintf(&self, msg: &str) {
        if self.developer() {
            self.printf(msg);
        }
    }

    /// Con_Printf with a print level, as handed to the renderer.
    pub fn con_printf(&self, level: i32, msg: &str) {
        if level == PRINT_DEVELOPER {
            self.dprintf(msg);
        } else {
            self.printf(msg);
        }
    }

    /// Drains captured text. Always empty for a forwarding console.
    pub fn take_output(&self) -> String {
        match self.capture {
            Some(ref buf) => std::mem::take(&mut *buf.lock()),
            None => String::new(),
        }
    }
}

// ============================================================
// COM argument handling
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct ComArgs {
    argv: Vec<String>,
}

impl ComArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// COM_InitArgv. Arguments too long to be a token are blanked.
    pub fn init(&mut self, args: &[String]) -> Result<(), ComError> {
        if args.len() > MAX_NUM_ARGVS {
            return Err(com_error(ErrorCode::Fatal, "argc > MAX_NUM_ARGVS"));
        }
        self.argv = args
            .iter()
            .map(|a| {
                if a.len() >= MAX_TOKEN_CHARS {
                    String::new()
                } else {
                    a.clone()
                }
            })
            .collect();
        Ok(())
    }

    pub fn argc(&self) -> usize {
        self.argv.len()
    }

    pub fn argv(&self, arg: usize) -> &str {
        self.argv.get(arg).map_or("", String::as_str)
    }

    pub fn clear_argv(&mut self, arg: usize) {
        if let Some(a) = self.argv.get_mut(arg) {
            a.clear();
        }
    }
}

// ============================================================
// Message reading
// ============================================================

/// A received message with a read cursor. Reads past the end return -1
/// and keep advancing, so a short message never aborts the parse.
#[derive(Debug, Clone, Default)]
pub struct SizeBuf {
    pub data: Vec<u8>,
    pub readcount: usize,
}

impl SizeBuf {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            readcount: 0,
        }
    }

    pub fn read_byte(&mut self) -> i32 {
        let rc = self.readcount;
        self.readcount += 1;
        self.data.get(rc).map_or(-1, |&b| b as i32)
    }

    pub fn read_short(&mut self) -> i32 {
        let rc = self.readcount;
        self.readcount += 2;
        match self.data.get(rc..rc + 2) {
            Some(b) => i16::from_le_bytes([b[0], b[1]]) as i32,
            None => -1,
        }
    }
}

// ============================================================
// Info_Print
// ============================================================

/// Prints a `\key\value` info string as a two-column listing.
pub fn info_print(con: &Console, s: &str) {
    let mut rest = s.strip_prefix('\\').unwrap_or(s);

    while !rest.is_empty() {
        let (key, after) = match rest.find('\\') {
            Some(i) => (&rest[..i], Some(&rest[i + 1..])),
            None => (rest, None),
        };
        con.printf(&format!("{:<20}", key));

        let Some(after) = after else {
            con.printf("MISSING VALUE\n");
            return;
        };

        let (value, next) = match after.find('\\') {
            Some(i) => (&after[..i], &after[i + 1..]),
            None => (after, ""),
        };
        con.printf(&format!("{}\n", value));
        rest = next;
    }
}

// ============================================================
// Tests
// ============================================================
