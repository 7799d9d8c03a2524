// cmd.rs: script command buffer, tokenizer, aliases and dispatch

use std::sync::Arc;

use thiserror::Error;

use crate::common::{ComArgs, Console};
use crate::cvar::CvarContext;
use crate::q_shared::{com_parse, MAX_STRING_CHARS, MAX_STRING_TOKENS};
use crate::wildcards::wildcardfit;

pub const MAX_ALIAS_NAME: usize = 32;
pub const ALIAS_LOOP_COUNT: i32 = 16;
pub const MACRO_LOOP_COUNT: i32 = 100;

/// Size of the pending command text buffer.
pub const CMD_TEXT_SIZE: usize = 8192;

/// When `execute_text` runs its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecWhen {
    /// Don't return until completed.
    Now,
    /// Insert at current position, but don't run yet.
    Insert,
    /// Add to the end of the command buffer.
    Append,
}

/// Why a line was discarded before tokenizing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CmdError {
    #[error("Line exceeded 1024 chars, discarded.")]
    LineTooLong,
    #[error("Expanded line exceeded 1024 chars, discarded.")]
    ExpandedTooLong,
    #[error("Macro expansion loop, discarded.")]
    MacroLoop,
    #[error("Line has unmatched quote, discarded.")]
    UnmatchedQuote,
}

type NoArgsFn = Arc<dyn Fn(&mut CmdContext) + Send + Sync>;
type ArgsFn = Arc<dyn Fn(&mut CmdContext, &[String]) + Send + Sync>;

/// How a registered command runs.
#[derive(Clone)]
pub enum CmdHandler {
    NoArgs(NoArgsFn),
    /// Receives the tokenized argv, command name included.
    Args(ArgsFn),
    /// No local handler: the line goes to the server as `cmd <line>`.
    Forward,
}

#[derive(Clone)]
pub struct CmdFunction {
    pub name: String,
    pub handler: CmdHandler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdAlias {
    pub name: String,
    /// Command text, newline terminated.
    pub value: String,
}

/// Pending command text.
pub struct CmdTextBuf {
    data: Vec<u8>,
    maxsize: usize,
}

impl CmdTextBuf {
    pub fn new(maxsize: usize) -> Self {
        Self {
            data: Vec::with_capacity(maxsize),
            maxsize,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

pub type FsLoadFileFn = Box<dyn Fn(&str) -> Option<Vec<u8>> + Send>;
pub type ForwardToServerFn = Box<dyn Fn(&str) + Send>;

/// The console interpreter: command buffer, registry, aliases and the
/// cvar store they resolve against.
pub struct CmdContext {
    pub cmd_text: CmdTextBuf,
    defer_text: Vec<u8>,
    pub cmd_wait: bool,

    /// Newest first.
    pub cmd_alias: Vec<CmdAlias>,
    pub alias_count: i32,

    cmd_argv: Vec<String>,
    cmd_args: String,

    /// Sorted by name.
    cmd_functions: Vec<CmdFunction>,

    pub cvars: CvarContext,
    pub console: Console,

    pub fs_load_file: Option<FsLoadFileFn>,
    pub forward_to_server: Option<ForwardToServerFn>,
}

impl CmdContext {
    pub fn new() -> Self {
        Self::with_console(Console::default())
    }

    pub fn with_console(console: Console) -> Self {
        Self {
            cmd_text: CmdTextBuf::new(CMD_TEXT_SIZE),
            defer_text: Vec::new(),
            cmd_wait: false,
            cmd_alias: Vec::new(),
            alias_count: 0,
            cmd_argv: Vec::new(),
            cmd_args: String::new(),
            cmd_functions: Vec::new(),
            cvars: CvarContext::with_console(console.clone()),
            console,
            fs_load_file: None,
            forward_to_server: None,
        }
    }

    // ========================================================
    // Command buffer
    // ========================================================

    /// Adds command text at the end of the buffer.
    pub fn add_text(&mut self, text: &str) {
        if self.cmd_text.len() + text.len() >= self.cmd_text.maxsize {
            tracing::warn!(target: "cmd", len = text.len(), "command buffer overflow");
            self.console.printf("Cbuf_AddText: overflow\n");
            return;
        }
        self.cmd_text.data.extend_from_slice(text.as_bytes());
    }

    /// Adds command text immediately after the current command.
    pub fn insert_text(&mut self, text: &str) {
        let remaining = std::mem::take(&mut self.cmd_text.data);
        self.add_text(text);
        self.cmd_text.data.extend_from_slice(&remaining);
    }

    /// Moves all pending text aside, e.g. while a demo loop takes over.
    pub fn copy_to_defer(&mut self) {
        self.defer_text = std::mem::take(&mut self.cmd_text.data);
    }

    pub fn insert_from_defer(&mut self) {
        let deferred = std::mem::take(&mut self.defer_text);
        if !deferred.is_empty() {
            self.insert_text(&String::from_utf8_lossy(&deferred));
        }
    }

    pub fn execute_text(&mut self, when: ExecWhen, text: &str) {
        match when {
            ExecWhen::Now => self.execute_string(text),
            ExecWhen::Insert => self.insert_text(text),
            ExecWhen::Append => self.add_text(text),
        }
    }

    /// Runs buffered lines until the buffer is empty or a line asks to wait.
    pub fn execute(&mut self) {
        self.alias_count = 0;

        while !self.cmd_text.is_empty() {
            let data = &self.cmd_text.data;

            // find a \n or ; line break
            let mut quotes = 0;
            let mut i = 0;
            while i < data.len() {
                match data[i] {
                    b'"' => quotes += 1,
                    b';' if quotes & 1 == 0 => break,
                    b'\n' => break,
                    _ => {}
                }
                i += 1;
            }

            let too_long = i >= MAX_STRING_CHARS;
            let line = if too_long {
                String::new()
            } else {
                String::from_utf8_lossy(&data[..i]).into_owned()
            };

            // drop the line and its terminator
            let consumed = (i + 1).min(data.len());
            self.cmd_text.data.drain(..consumed);

            if too_long {
                tracing::warn!(target: "cmd", len = i, "line discarded");
                self.console.printf(&format!("{}\n", CmdError::LineTooLong));
                continue;
            }

            self.execute_string(&line);

            if self.cmd_wait {
                // skip out while text still remains in the buffer
                self.cmd_wait = false;
                break;
            }
        }
    }

    /// Queues every `+set a b` triple from the process arguments.
    pub fn add_early_commands(&mut self, args: &mut ComArgs, clear: bool) {
        let mut i = 0;
        while i < args.argc() {
            if args.argv(i) != "+set" {
                i += 1;
                continue;
            }
            let text = format!("set {} {}\n", args.argv(i + 1), args.argv(i + 2));
            self.add_text(&text);
            if clear {
                for j in i..i + 3 {
                    args.clear_argv(j);
                }
            }
            i += 3;
        }
    }

    /// Queues each `+cmd ...` run of the process arguments as one line.
    /// Returns true if anything was queued.
    pub fn add_late_commands(&mut self, args: &ComArgs) -> bool {
        let text = (1..args.argc())
            .map(|i| args.argv(i))
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            return false;
        }

        let bytes = text.as_bytes();
        let mut build = String::new();
        let mut i = 0;
        while i + 1 < bytes.len() {
            if bytes[i] != b'+' {
                i += 1;
                continue;
            }
            i += 1;
            let end = bytes[i..]
                .iter()
                .position(|&b| b == b'+' || b == b'-')
                .map_or(bytes.len(), |p| p + i);
            build.push_str(&text[i..end]);
            build.push('\n');
            i = end;
        }

        if build.is_empty() {
            return false;
        }
        self.add_text(&build);
        true
    }

    // ========================================================
    // Tokenizing
    // ========================================================

    /// Substitutes `$name` outside quotes with the cvar's string value.
    pub fn macro_expand_string(&self, text: &str) -> Result<String, CmdError> {
        if text.len() >= MAX_STRING_CHARS {
            return Err(CmdError::LineTooLong);
        }

        let mut scan = text.to_string();
        let mut inquote = false;
        let mut count = 0;
        let mut i = 0;

        while i < scan.len() {
            let c = scan.as_bytes()[i];
            if c == b'"' {
                inquote = !inquote;
            }
            if inquote || c != b'$' {
                i += 1;
                continue;
            }

            let (token, rest) = com_parse(&scan[i + 1..]);
            let Some(rest) = rest else {
                i += 1;
                continue;
            };

            let value = self.cvars.variable_string(&token);
            let tail = scan.len() - rest.len();
            if i + value.len() + rest.len() >= MAX_STRING_CHARS {
                return Err(CmdError::ExpandedTooLong);
            }

            let mut expanded = String::with_capacity(i + value.len() + rest.len());
            expanded.push_str(&scan[..i]);
            expanded.push_str(value);
            expanded.push_str(&scan[tail..]);
            scan = expanded;

            count += 1;
            if count == MACRO_LOOP_COUNT {
                return Err(CmdError::MacroLoop);
            }
            // rescan from the substitution point
        }

        if inquote {
            return Err(CmdError::UnmatchedQuote);
        }
        Ok(scan)
    }

    /// Splits a line into argv. `$cvar` references are expanded when
    /// `macro_expand` is set, except inside quoted tokens.
    pub fn tokenize_string(&mut self, text: &str, macro_expand: bool) {
        self.cmd_argv.clear();
        self.cmd_args.clear();

        let expanded;
        let mut text = if macro_expand {
            match self.macro_expand_string(text) {
                Ok(s) => {
                    expanded = s;
                    expanded.as_str()
                }
                Err(e) => {
                    tracing::warn!(target: "cmd", error = %e, "line discarded");
                    self.console.printf(&format!("{}\n", e));
                    return;
                }
            }
        } else {
            text
        };

        loop {
            // skip whitespace up to a \n
            text = text.trim_start_matches(|c: char| c <= ' ' && c != '\n');
            if text.is_empty() || text.starts_with('\n') {
                return;
            }

            // everything after the command name
            if self.cmd_argv.len() == 1 {
                self.cmd_args = text.trim_end_matches(|c: char| c <= ' ').to_string();
            }

            let (token, rest) = com_parse(text);
            let Some(rest) = rest else {
                return;
            };
            if self.cmd_argv.len() < MAX_STRING_TOKENS {
                self.cmd_argv.push(token);
            }
            text = rest;
        }
    }

    pub fn argc(&self) -> usize {
        self.cmd_argv.len()
    }

    pub fn argv(&self, arg: usize) -> &str {
        self.cmd_argv.get(arg).map_or("", String::as_str)
    }

    /// The whole line after the command name.
    pub fn args(&self) -> &str {
        &self.cmd_args
    }

    // ========================================================
    // Registry
    // ========================================================

    pub fn add_command<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut CmdContext) + Send + Sync + 'static,
    {
        self.register(name, CmdHandler::NoArgs(Arc::new(f)));
    }

    pub fn add_args_command<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut CmdContext, &[String]) + Send + Sync + 'static,
    {
        self.register(name, CmdHandler::Args(Arc::new(f)));
    }

    /// Registers a name whose lines are passed through to the server.
    pub fn add_forward_command(&mut self, name: &str) {
        self.register(name, CmdHandler::Forward);
    }

    pub fn register(&mut self, name: &str, handler: CmdHandler) {
        // a set cvar gives way to the command
        if !self.cvars.variable_string(name).is_empty() {
            if let Some(idx) = self.find_command_exact(name) {
                self.cmd_functions.remove(idx);
            }
        }

        if self.find_command_exact(name).is_some() {
            self.console
                .printf(&format!("Cmd_AddCommand: {} already defined\n", name));
            return;
        }

        let pos = self
            .cmd_functions
            .partition_point(|c| c.name.as_str() < name);
        self.cmd_functions.insert(
            pos,
            CmdFunction {
                name: name.to_string(),
                handler,
            },
        );
        tracing::debug!(target: "cmd", name, "command registered");
    }

    pub fn remove_command(&mut self, name: &str) {
        match self.find_command_exact(name) {
            Some(idx) => {
                self.cmd_functions.remove(idx);
            }
            None => self
                .console
                .printf(&format!("Cmd_RemoveCommand: {} not added\n", name)),
        }
    }

    fn find_command_exact(&self, name: &str) -> Option<usize> {
        self.cmd_functions.iter().position(|c| c.name == name)
    }

    /// Dispatch lookup: an exact spelling wins, otherwise the first name
    /// that matches ignoring case.
    fn find_command(&self, name: &str) -> Option<usize> {
        self.find_command_exact(name).or_else(|| {
            self.cmd_functions
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name))
        })
    }

    fn find_alias_exact(&self, name: &str) -> Option<usize> {
        self.cmd_alias.iter().position(|a| a.name == name)
    }

    fn find_alias(&self, name: &str) -> Option<usize> {
        self.find_alias_exact(name).or_else(|| {
            self.cmd_alias
                .iter()
                .position(|a| a.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.find_command(name).is_some()
    }

    /// Registered command names in list order.
    pub fn command_names(&self) -> Vec<&str> {
        self.cmd_functions.iter().map(|c| c.name.as_str()).collect()
    }

    /// Exact command, alias or cvar name first. Otherwise the single
    /// prefix match, or the longest common prefix of several after
    /// printing them.
    pub fn complete_command(&self, partial: &str) -> Option<String> {
        if partial.is_empty() {
            return None;
        }

        let exact = self
            .cmd_functions
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.cmd_alias.iter().map(|a| a.name.as_str()))
            .find(|&n| n == partial)
            .or_else(|| self.cvars.find_var(partial).map(|v| v.name.as_str()));
        if let Some(name) = exact {
            return Some(name.to_string());
        }

        let mut matches: Vec<&str> = self
            .cmd_functions
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.cmd_alias.iter().map(|a| a.name.as_str()))
            .filter(|n| n.starts_with(partial))
            .chain(self.cvars.complete_all_variables(partial))
            .collect();

        match matches.len() {
            0 => None,
            1 => Some(matches[0].to_string()),
            _ => {
                matches.sort_unstable();
                matches.dedup();
                self.console.printf("\n\n");
                for m in &matches {
                    self.console.printf(&format!("  {}\n", m));
                }
                Some(longest_common_prefix(&matches).to_string())
            }
        }
    }

    // ========================================================
    // Dispatch
    // ========================================================

    /// Tokenizes and runs one line: command, then alias, then cvar, then
    /// the server.
    pub fn execute_string(&mut self, text: &str) {
        self.tokenize_string(text, true);

        let Some(name) = self.cmd_argv.first().cloned() else {
            return; // no tokens
        };

        if let Some(idx) = self.find_command(&name) {
            match self.cmd_functions[idx].handler.clone() {
                CmdHandler::NoArgs(f) => f(self),
                CmdHandler::Args(f) => {
                    let argv = self.cmd_argv.clone();
                    f(self, &argv);
                }
                CmdHandler::Forward => self.forward_line(&format!("cmd {}", text)),
            }
            return;
        }

        if let Some(idx) = self.find_alias(&name) {
            self.alias_count += 1;
            if self.alias_count == ALIAS_LOOP_COUNT {
                tracing::warn!(target: "cmd", alias = %name, "alias loop");
                self.console.printf("ALIAS_LOOP_COUNT\n");
                return;
            }
            let value = self.cmd_alias[idx].value.clone();
            self.insert_text(&value);
            return;
        }

        if self.cvars.command(&self.cmd_argv) {
            return;
        }

        self.forward_line(text);
    }

    fn forward_line(&self, line: &str) {
        match self.forward_to_server {
            Some(ref forward) => forward(line),
            None => self
                .console
                .printf(&format!("Unknown command \"{}\"\n", self.argv(0))),
        }
    }

    // ========================================================
    // Aliases
    // ========================================================

    /// Defines or replaces an alias. A trailing newline is added.
    pub fn alias_set(&mut self, name: &str, value: &str) {
        let value = format!("{}\n", value);
        match self.find_alias_exact(name) {
            Some(idx) => self.cmd_alias[idx].value = value,
            None => self.cmd_alias.insert(
                0,
                CmdAlias {
                    name: name.to_string(),
                    value,
                },
            ),
        }
    }

    /// Writes every alias as an `alias` line for a config file.
    pub fn write_aliases(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for alias in self.cmd_alias.iter().rev() {
            writeln!(
                writer,
                "alias {} \"{}\"",
                alias.name,
                alias.value.trim_end_matches('\n')
            )?;
        }
        Ok(())
    }

    // ========================================================
    // Built-in commands
    // ========================================================

    fn list_f(&self, argv: &[String]) {
        let pattern = argv.get(1).map_or("*", String::as_str);
        let mut count = 0;
        for cmd in self.cmd_functions.iter().filter(|c| wildcardfit(pattern, &c.name)) {
            self.console.printf(&format!("{}\n", cmd.name));
            count += 1;
        }
        self.console.printf(&format!("{} commands\n", count));
    }

    fn exec_f(&mut self, argv: &[String]) {
        if argv.len() != 2 {
            self.console
                .printf("exec <filename> : execute a script file\n");
            return;
        }
        let filename = &argv[1];

        let data = self.fs_load_file.as_ref().and_then(|load| load(filename));
        let Some(data) = data else {
            self.console.printf(&format!("couldn't exec {}\n", filename));
            return;
        };

        self.console.printf(&format!("execing {}\n", filename));
        self.insert_text(&String::from_utf8_lossy(&data));
    }

    fn echo_f(&self, argv: &[String]) {
        let mut line = String::new();
        for arg in argv.iter().skip(1) {
            line.push_str(arg);
            line.push(' ');
        }
        line.push('\n');
        self.console.printf(&line);
    }

    fn alias_f(&mut self, argv: &[String]) {
        if argv.len() == 1 {
            self.console.printf("Current alias commands:\n");
            for alias in &self.cmd_alias {
                self.console
                    .printf(&format!("{} : {}", alias.name, alias.value));
            }
            return;
        }

        let name = &argv[1];
        if name.len() >= MAX_ALIAS_NAME {
            self.console.printf("Alias name is too long\n");
            return;
        }

        let value = argv[2..].join(" ");
        self.alias_set(name, &value);
    }

    /// Registers the interpreter's own commands and the cvar commands.
    pub fn init(&mut self) {
        self.add_args_command("cmdlist", |ctx, argv| ctx.list_f(argv));
        self.add_args_command("exec", |ctx, argv| ctx.exec_f(argv));
        self.add_args_command("echo", |ctx, argv| ctx.echo_f(argv));
        self.add_args_command("alias", |ctx, argv| ctx.alias_f(argv));
        self.add_command("wait", |ctx| ctx.cmd_wait = true);
        self.cvars.get("developer", Some("0"), 0);
        self.add_args_command("set", |ctx, argv| ctx.cvars.set_f(argv));
        self.add_args_command("cvarlist", |ctx, argv| ctx.cvars.list_f(argv));
    }
}

impl Default for CmdContext {
    fn default() -> Self {
        Self::new()
    }
}

fn longest_common_prefix<'a>(names: &[&'a str]) -> &'a str {
    let Some(first) = names.first() else {
        return "";
    };
    let mut len = first.len();
    for name in &names[1..] {
        len = first
            .bytes()
            .zip(name.bytes())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    while !first.is_char_boundary(len) {
        len -= 1;
    }
    &first[..len]
}

// ============================================================
// Tests
// ============================================================
