use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use virtualgrid::NavKey;

/// A physical key, independent of any terminal or windowing library.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Space,
    Enter,
    Escape,
    Tab,
    Char(char),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
    };
    pub const SHIFT: Self = Self {
        shift: true,
        ..Self::NONE
    };
    pub const CTRL: Self = Self {
        ctrl: true,
        ..Self::NONE
    };
}

/// A key press as reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyInput {
    pub const fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    pub const fn with_modifiers(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    pub const fn shift(mut self) -> Self {
        self.modifiers.shift = true;
        self
    }

    pub const fn ctrl(mut self) -> Self {
        self.modifiers.ctrl = true;
        self
    }

    pub const fn alt(mut self) -> Self {
        self.modifiers.alt = true;
        self
    }

    /// Letters are matched case-insensitively; the shift modifier carries the case.
    fn normalized(self) -> Self {
        match self.key {
            Key::Char(c) if c.is_ascii_uppercase() => Self {
                key: Key::Char(c.to_ascii_lowercase()),
                modifiers: Modifiers {
                    shift: true,
                    ..self.modifiers
                },
            },
            _ => self,
        }
    }
}

/// Failure to parse a key binding such as `"ctrl+shift+home"`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseKeyError {
    #[error("empty key binding")]
    Empty,
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
    #[error("unknown key `{0}`")]
    UnknownKey(String),
}

impl FromStr for KeyInput {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let key = parts.pop().filter(|k| !k.is_empty()).ok_or(ParseKeyError::Empty)?;

        let mut modifiers = Modifiers::NONE;
        for part in parts {
            match part.to_ascii_lowercase().as_str() {
                "shift" => modifiers.shift = true,
                "ctrl" | "control" => modifiers.ctrl = true,
                "alt" => modifiers.alt = true,
                _ => return Err(ParseKeyError::UnknownModifier(part.to_owned())),
            }
        }

        let key = match key.to_ascii_lowercase().as_str() {
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdn" => Key::PageDown,
            "space" => Key::Space,
            "enter" | "return" => Key::Enter,
            "esc" | "escape" => Key::Escape,
            "tab" => Key::Tab,
            _ => {
                let mut chars = key.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => return Err(ParseKeyError::UnknownKey(key.to_owned())),
                }
            }
        };
        Ok(KeyInput::with_modifiers(key, modifiers).normalized())
    }
}

/// What a key press asks the grid to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridCommand {
    Navigate(NavKey),
    /// Toggle selection of the focused row.
    ToggleRowSelection,
    /// Extend the selection from the anchor to the focused row.
    ExtendSelection,
    /// Select every row on the current page.
    SelectPage,
    ClearSelection,
}

/// Key bindings for grid commands.
///
/// Starts from the default grid bindings; hosts can rebind or unbind individual keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMap {
    bindings: HashMap<KeyInput, GridCommand>,
}

impl Default for KeyMap {
    fn default() -> Self {
        use GridCommand::*;
        use Key::*;

        let mut map = Self::empty();
        map.bind(KeyInput::new(Up), Navigate(NavKey::Up));
        map.bind(KeyInput::new(Down), Navigate(NavKey::Down));
        map.bind(KeyInput::new(Left), Navigate(NavKey::Left));
        map.bind(KeyInput::new(Right), Navigate(NavKey::Right));
        map.bind(KeyInput::new(Home), Navigate(NavKey::Home));
        map.bind(KeyInput::new(End), Navigate(NavKey::End));
        map.bind(KeyInput::new(Home).ctrl(), Navigate(NavKey::GridStart));
        map.bind(KeyInput::new(End).ctrl(), Navigate(NavKey::GridEnd));
        map.bind(KeyInput::new(PageUp), Navigate(NavKey::PageUp));
        map.bind(KeyInput::new(PageDown), Navigate(NavKey::PageDown));

        map.bind(KeyInput::new(Space), ToggleRowSelection);
        map.bind(KeyInput::new(Space).shift(), ExtendSelection);
        map.bind(KeyInput::new(Char('a')).ctrl(), SelectPage);
        map.bind(KeyInput::new(Escape), ClearSelection);
        map
    }
}

impl KeyMap {
    /// A map with no bindings.
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Binds `input` to `command`, returning the command it replaces.
    pub fn bind(&mut self, input: KeyInput, command: GridCommand) -> Option<GridCommand> {
        self.bindings.insert(input.normalized(), command)
    }

    pub fn unbind(&mut self, input: KeyInput) -> Option<GridCommand> {
        self.bindings.remove(&input.normalized())
    }

    pub fn resolve(&self, input: KeyInput) -> Option<GridCommand> {
        let command = self.bindings.get(&input.normalized()).copied();
        if command.is_none() {
            atrace!(?input, "unbound key");
        }
        command
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

static DEFAULT_KEYMAP: LazyLock<KeyMap> = LazyLock::new(KeyMap::default);

/// Resolves `input` against the default bindings.
pub fn map_key(input: KeyInput) -> Option<GridCommand> {
    DEFAULT_KEYMAP.resolve(input)
}
