// keys.rs: key numbers, key names and the binding table

pub const K_TAB: i32 = 9;
pub const K_ENTER: i32 = 13;
pub const K_ESCAPE: i32 = 27;
pub const K_SPACE: i32 = 32;
pub const K_BACKSPACE: i32 = 127;
pub const K_UPARROW: i32 = 128;
pub const K_DOWNARROW: i32 = 129;
pub const K_LEFTARROW: i32 = 130;
pub const K_RIGHTARROW: i32 = 131;
pub const K_ALT: i32 = 132;
pub const K_CTRL: i32 = 133;
pub const K_SHIFT: i32 = 134;
pub const K_F1: i32 = 135;
pub const K_F12: i32 = 146;
pub const K_INS: i32 = 147;
pub const K_DEL: i32 = 148;
pub const K_PGDN: i32 = 149;
pub const K_PGUP: i32 = 150;
pub const K_HOME: i32 = 151;
pub const K_END: i32 = 152;
pub const K_KP_HOME: i32 = 160;
pub const K_KP_ENTER: i32 = 169;
pub const K_MOUSE1: i32 = 200;
pub const K_MOUSE2: i32 = 201;
pub const K_MOUSE3: i32 = 202;
pub const K_MWHEELDOWN: i32 = 239;
pub const K_MWHEELUP: i32 = 240;
pub const K_MOUSE4: i32 = 241;
pub const K_MOUSE5: i32 = 242;
pub const K_PAUSE: i32 = 255;

static KEYNAMES: &[(&str, i32)] = &[
    ("TAB", K_TAB),
    ("ENTER", K_ENTER),
    ("ESCAPE", K_ESCAPE),
    ("SPACE", K_SPACE),
    ("BACKSPACE", K_BACKSPACE),
    ("UPARROW", K_UPARROW),
    ("DOWNARROW", K_DOWNARROW),
    ("LEFTARROW", K_LEFTARROW),
    ("RIGHTARROW", K_RIGHTARROW),
    ("ALT", K_ALT),
    ("CTRL", K_CTRL),
    ("SHIFT", K_SHIFT),
    ("F1", K_F1),
    ("F2", K_F1 + 1),
    ("F3", K_F1 + 2),
    ("F4", K_F1 + 3),
    ("F5", K_F1 + 4),
    ("F6", K_F1 + 5),
    ("F7", K_F1 + 6),
    ("F8", K_F1 + 7),
    ("F9", K_F1 + 8),
    ("F10", K_F1 + 9),
    ("F11", K_F1 + 10),
    ("F12", K_F12),
    ("INS", K_INS),
    ("DEL", K_DEL),
    ("PGDN", K_PGDN),
    ("PGUP", K_PGUP),
    ("HOME", K_HOME),
    ("END", K_END),
    ("MOUSE1", K_MOUSE1),
    ("MOUSE2", K_MOUSE2),
    ("MOUSE3", K_MOUSE3),
    ("MOUSE4", K_MOUSE4),
    ("MOUSE5", K_MOUSE5),
    ("KP_HOME", K_KP_HOME),
    ("KP_UPARROW", K_KP_HOME + 1),
    ("KP_PGUP", K_KP_HOME + 2),
    ("KP_LEFTARROW", K_KP_HOME + 3),
    ("KP_5", K_KP_HOME + 4),
    ("KP_RIGHTARROW", K_KP_HOME + 5),
    ("KP_END", K_KP_HOME + 6),
    ("KP_DOWNARROW", K_KP_HOME + 7),
    ("KP_PGDN", K_KP_HOME + 8),
    ("KP_ENTER", K_KP_ENTER),
    ("KP_INS", K_KP_ENTER + 1),
    ("KP_DEL", K_KP_ENTER + 2),
    ("KP_SLASH", K_KP_ENTER + 3),
    ("KP_MINUS", K_KP_ENTER + 4),
    ("KP_PLUS", K_KP_ENTER + 5),
    ("MWHEELUP", K_MWHEELUP),
    ("MWHEELDOWN", K_MWHEELDOWN),
    ("PAUSE", K_PAUSE),
    ("SEMICOLON", b';' as i32),
];

/// Returns a key number from a key name. Single characters return
/// themselves.
pub fn string_to_keynum(name: &str) -> i32 {
    match name.as_bytes() {
        [] => -1,
        [c] => *c as i32,
        _ => KEYNAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map_or(-1, |&(_, k)| k),
    }
}

/// Printable name of a key number.
pub fn keynum_to_string(keynum: i32) -> String {
    if keynum == -1 {
        return "<KEY NOT FOUND>".to_string();
    }
    if keynum > 32 && keynum < 127 {
        return char::from(keynum as u8).to_string();
    }
    KEYNAMES
        .iter()
        .find(|&&(_, k)| k == keynum)
        .map_or_else(|| "<UNKNOWN KEYNUM>".to_string(), |(n, _)| n.to_string())
}

/// The command bound to each of the 256 key numbers.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    bindings: Vec<Option<String>>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyBindings {
    pub fn new() -> Self {
        Self {
            bindings: vec![None; 256],
        }
    }

    /// An empty binding clears the key. Out of range keys are ignored.
    pub fn set_binding(&mut self, keynum: i32, binding: &str) {
        let Some(slot) = usize::try_from(keynum).ok().and_then(|k| self.bindings.get_mut(k)) else {
            return;
        };
        *slot = (!binding.is_empty()).then(|| binding.to_string());
    }

    pub fn binding(&self, keynum: i32) -> Option<&str> {
        usize::try_from(keynum)
            .ok()
            .and_then(|k| self.bindings.get(k))
            .and_then(|b| b.as_deref())
    }

    /// Lowest key bound to `command`, compared case-insensitively.
    pub fn key_for(&self, command: &str) -> Option<i32> {
        self.bindings
            .iter()
            .position(|b| b.as_deref().is_some_and(|b| b.eq_ignore_ascii_case(command)))
            .map(|k| k as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keynum_names() {
        assert_eq!(keynum_to_string('a' as i32), "a");
        assert_eq!(keynum_to_string(K_SPACE), "SPACE");
        assert_eq!(keynum_to_string(K_F1 + 9), "F10");
        assert_eq!(keynum_to_string(b';' as i32), ";");
        assert_eq!(keynum_to_string(-1), "<KEY NOT FOUND>");
        assert_eq!(keynum_to_string(1), "<UNKNOWN KEYNUM>");

        assert_eq!(string_to_keynum("x"), 'x' as i32);
        assert_eq!(string_to_keynum("kp_enter"), K_KP_ENTER);
        assert_eq!(string_to_keynum(""), -1);
        assert_eq!(string_to_keynum("NOPE"), -1);
    }

    #[test]
    fn test_bindings() {
        let mut keys = KeyBindings::new();
        keys.set_binding('q' as i32, "use Quad Damage");
        keys.set_binding(K_F1, "use quad damage");
        keys.set_binding(300, "ignored");
        assert_eq!(keys.binding('q' as i32), Some("use Quad Damage"));
        assert_eq!(keys.key_for("USE QUAD DAMAGE"), Some('q' as i32));

        keys.set_binding('q' as i32, "");
        assert_eq!(keys.binding('q' as i32), None);
        assert_eq!(keys.key_for("use quad damage"), Some(K_F1));
        assert_eq!(keys.key_for("+attack"), None);
    }
}
