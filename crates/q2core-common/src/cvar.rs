// cvar.rs: dynamic variable tracking

use crate::common::Console;
use crate::q_shared::{CVAR_ARCHIVE, CVAR_LATCH, CVAR_NOSET, CVAR_SERVERINFO, CVAR_USERINFO};
use crate::wildcards::wildcardfit;

use std::collections::HashMap;

/// A console variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: i32,
    pub modified: bool,
    pub value: f32,
}

impl Cvar {
    fn assign(&mut self, value: &str) {
        self.string = value.to_string();
        self.value = parse_value(value);
    }
}

/// atof-like: unparsable text reads as 0.
fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

/// The cvar store consulted by macro expansion and the renderer toggles.
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
    pub userinfo_modified: bool,
    /// Set while a game is running, so latched cvars wait for the next map.
    pub server_running: bool,
    pub console: Console,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::with_console(Console::default())
    }

    pub fn with_console(console: Console) -> Self {
        Self {
            cvar_vars: Vec::new(),
            cvar_index: HashMap::new(),
            userinfo_modified: false,
            server_running: false,
            console,
        }
    }

    /// Info strings can't carry the separators.
    pub fn info_validate(s: &str) -> bool {
        !s.contains('\\') && !s.contains('"') && !s.contains(';')
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    pub fn find_var_mut(&mut self, name: &str) -> Option<&mut Cvar> {
        let idx = *self.cvar_index.get(name)?;
        Some(&mut self.cvar_vars[idx])
    }

    /// Floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |v| v.value)
    }

    /// String value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |v| v.string.as_str())
    }

    /// Exact name, else the first cvar starting with `partial`.
    pub fn complete_variable(&self, partial: &str) -> Option<&str> {
        if partial.is_empty() {
            return None;
        }
        if let Some(var) = self.find_var(partial) {
            return Some(&var.name);
        }
        self.cvar_vars
            .iter()
            .find(|v| v.name.starts_with(partial))
            .map(|v| v.name.as_str())
    }

    /// Every cvar name starting with `partial`, in creation order.
    pub fn complete_all_variables(&self, partial: &str) -> Vec<&str> {
        self.cvar_vars
            .iter()
            .filter(|v| v.name.starts_with(partial))
            .map(|v| v.name.as_str())
            .collect()
    }

    /// Cvar_Get. If the cvar already exists the value is left alone but the
    /// flags are OR'd in. Returns None for an invalid info cvar or when the
    /// cvar doesn't exist and no default was given.
    pub fn get(&mut self, name: &str, value: Option<&str>, flags: i32) -> Option<&Cvar> {
        if flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0 && !Self::info_validate(name) {
            self.console.printf("invalid info cvar name\n");
            return None;
        }

        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return Some(&self.cvar_vars[idx]);
        }

        let value = value?;

        if flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0 && !Self::info_validate(value) {
            self.console.printf("invalid info cvar value\n");
            return None;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        tracing::trace!(target: "cvar", name, value, "cvar created");
        self.sync_console(name);

        Some(&self.cvar_vars[idx])
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) {
        let Some(&idx) = self.cvar_index.get(name) else {
            self.get(name, Some(value), 0);
            return;
        };
        let server_running = self.server_running;
        let var = &mut self.cvar_vars[idx];

        if var.flags & (CVAR_USERINFO | CVAR_SERVERINFO) != 0 && !Self::info_validate(value) {
            self.console.printf("invalid info cvar value\n");
            return;
        }

        if force {
            var.latched_string = None;
        } else {
            if var.flags & CVAR_NOSET != 0 {
                self.console.printf(&format!("{} is write protected.\n", name));
                return;
            }

            if var.flags & CVAR_LATCH != 0 {
                let current = var.latched_string.as_deref().unwrap_or(&var.string);
                if value == current {
                    return;
                }
                if server_running {
                    self.console
                        .printf(&format!("{} will be changed for next game.\n", name));
                    var.latched_string = Some(value.to_string());
                } else {
                    var.assign(value);
                }
                return;
            }
        }

        if value == var.string {
            return; // not changed
        }

        var.modified = true;
        if var.flags & CVAR_USERINFO != 0 {
            self.userinfo_modified = true;
        }
        var.assign(value);
    }

    /// Set a cvar value (respects NOSET and LATCH flags).
    pub fn set(&mut self, name: &str, value: &str) {
        self.set2(name, value, false);
        self.sync_console(name);
    }

    /// Force-set a cvar value (ignores NOSET and LATCH).
    pub fn force_set(&mut self, name: &str, value: &str) {
        self.set2(name, value, true);
        self.sync_console(name);
    }

    /// `developer` also switches the console's developer prints.
    fn sync_console(&self, name: &str) {
        if name == "developer" {
            self.console.set_developer(self.variable_value(name) != 0.0);
        }
    }

    /// Set a cvar and replace its flags.
    pub fn full_set(&mut self, name: &str, value: &str, flags: i32) {
        let Some(&idx) = self.cvar_index.get(name) else {
            self.get(name, Some(value), flags);
            return;
        };
        let var = &mut self.cvar_vars[idx];
        var.modified = true;
        if var.flags & CVAR_USERINFO != 0 {
            self.userinfo_modified = true;
        }
        var.assign(value);
        var.flags = flags;
        self.sync_console(name);
    }

    /// Set a cvar from a float value; whole numbers print without a fraction.
    pub fn set_value(&mut self, name: &str, value: f32) {
        let text = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &text);
    }

    /// Reads and clears the modified flag.
    pub fn take_modified(&mut self, name: &str) -> bool {
        match self.find_var_mut(name) {
            Some(var) => std::mem::take(&mut var.modified),
            None => false,
        }
    }

    /// Apply all latched variable changes.
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.cvar_vars {
            if let Some(latched) = var.latched_string.take() {
                var.assign(&latched);
            }
        }
        self.sync_console("developer");
    }

    /// Handles `<name>` (print) and `<name> <value>` (set) typed at the
    /// console. Returns true if argv[0] named a cvar.
    pub fn command(&mut self, argv: &[String]) -> bool {
        let Some(name) = argv.first() else {
            return false;
        };
        let Some(var) = self.find_var(name) else {
            return false;
        };

        if argv.len() == 1 {
            self.console
                .printf(&format!("\"{}\" is \"{}\"\n", var.name, var.string));
            return true;
        }

        let name = var.name.clone();
        self.set(&name, &argv[1]);
        true
    }

    /// Write all archived cvars to a writer.
    pub fn write_variables(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for var in self.cvar_vars.iter().filter(|v| v.flags & CVAR_ARCHIVE != 0) {
            writeln!(writer, "set {} \"{}\"", var.name, var.string)?;
        }
        Ok(())
    }

    /// `set <variable> <value> [u / s]`; `argv` includes the command name.
    pub fn set_f(&mut self, argv: &[String]) {
        match argv.len() {
            3 => self.set(&argv[1], &argv[2]),
            4 => {
                let flags = match argv[3].as_str() {
                    "u" => CVAR_USERINFO,
                    "s" => CVAR_SERVERINFO,
                    _ => {
                        self.console.printf("flags can only be 'u' or 's'\n");
                        return;
                    }
                };
                self.full_set(&argv[1], &argv[2], flags);
            }
            _ => self.console.printf("usage: set <variable> <value> [u / s]\n"),
        }
    }

    /// `cvarlist [wildcard]`
    pub fn list_f(&self, argv: &[String]) {
        match argv.len() {
            1 => {
                self.list(None);
            }
            2 => {
                self.list(Some(&argv[1]));
            }
            _ => self.console.printf("usage: cvarlist [wildcard]\n"),
        }
    }

    /// Lists cvars matching a pattern. Returns (total, matching).
    pub fn list(&self, pattern: Option<&str>) -> (usize, usize) {
        let wc = pattern.unwrap_or("*");
        let mut matching = 0;

        for var in &self.cvar_vars {
            if !wildcardfit(wc, &var.name) {
                continue;
            }
            matching += 1;
            let archive = if var.flags & CVAR_ARCHIVE != 0 { '*' } else { ' ' };
            let userinfo = if var.flags & CVAR_USERINFO != 0 { 'U' } else { ' ' };
            let serverinfo = if var.flags & CVAR_SERVERINFO != 0 { 'S' } else { ' ' };
            let noset = if var.flags & CVAR_NOSET != 0 {
                '-'
            } else if var.flags & CVAR_LATCH != 0 {
                'L'
            } else {
                ' '
            };
            self.console.printf(&format!(
                "{}{}{}{} {} \"{}\"\n",
                archive, userinfo, serverinfo, noset, var.name, var.string
            ));
        }

        let total = self.cvar_vars.len();
        self.console
            .printf(&format!("{} cvars, {} matching\n", total, matching));
        (total, matching)
    }
}

impl Default for CvarContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Tests
// ============================================================
