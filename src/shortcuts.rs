//! Keyboard chords and the commands they trigger.
//!
//! Dispatch is a pure mapping; the shell executes the returned command
//! itself, so actions never listen for keys on their own.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Esc,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Chord {
    /// Letters are stored lowercase; an uppercase letter implies shift.
    pub fn new(key: Key, ctrl: bool, shift: bool, alt: bool) -> Self {
        let (key, shift) = match key {
            Key::Char(c) if c.is_uppercase() => {
                (Key::Char(c.to_lowercase().next().unwrap_or(c)), true)
            }
            other => (other, shift),
        };
        Self {
            key,
            ctrl,
            shift,
            alt,
        }
    }

    pub const fn plain(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: false,
            shift: false,
            alt: false,
        }
    }

    pub const fn ctrl(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: true,
            shift: false,
            alt: false,
        }
    }

    pub const fn alt(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: false,
            shift: false,
            alt: true,
        }
    }

    pub const fn ctrl_shift(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: true,
            shift: true,
            alt: false,
        }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        match self.key {
            Key::Char(c) if self.ctrl || self.alt => write!(f, "{}", c.to_ascii_uppercase()),
            Key::Char(c) => write!(f, "{c}"),
            Key::Esc => write!(f, "Esc"),
            Key::Other => write!(f, "?"),
        }
    }
}

/// Export the current image.
pub const SAVE_CHORD: Chord = Chord::ctrl('s');
/// Copy the diagram source.
pub const COPY_CHORD: Chord = Chord::ctrl_shift('c');
/// Copy chord for terminals that cannot report Ctrl+Shift apart from Ctrl.
pub const COPY_FALLBACK_CHORD: Chord = Chord::alt('c');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    Export,
    CopySource,
    ZoomIn,
    ZoomOut,
    ZoomReset,
    ToggleTheme,
    NextStyle,
    Quit,
}

pub fn dispatch(chord: Chord) -> Option<ShellCommand> {
    if chord == SAVE_CHORD {
        return Some(ShellCommand::Export);
    }
    if chord == COPY_CHORD || chord == COPY_FALLBACK_CHORD {
        return Some(ShellCommand::CopySource);
    }
    let Key::Char(c) = chord.key else {
        return (chord.key == Key::Esc).then_some(ShellCommand::Quit);
    };
    if chord.alt {
        return None;
    }
    if chord.ctrl {
        return (c == 'q' && !chord.shift).then_some(ShellCommand::Quit);
    }
    // Symbols often arrive with shift already applied; ignore it for them.
    match c {
        '+' | '=' => Some(ShellCommand::ZoomIn),
        '-' | '_' => Some(ShellCommand::ZoomOut),
        '0' => Some(ShellCommand::ZoomReset),
        't' if !chord.shift => Some(ShellCommand::ToggleTheme),
        's' if !chord.shift => Some(ShellCommand::NextStyle),
        'q' if !chord.shift => Some(ShellCommand::Quit),
        _ => None,
    }
}

/// One-line key reference for the status area.
pub fn help_line() -> String {
    format!(
        "{SAVE_CHORD} export  {COPY_CHORD}/{COPY_FALLBACK_CHORD} copy source  s style  t theme  +/-/0 zoom  q quit"
    )
}
