//! Input handling.
//!
//! A windowing layer fills in [`KeyState`] each frame; physics only ever sees
//! the resulting [`InputIntent`].

use spirit_shared::physics::InputIntent;

/// Keys held at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub a: bool,
    pub d: bool,
    pub w: bool,
    pub space: bool,
    pub s: bool,
    pub shift: bool,
}

impl KeyState {
    /// Records a key press or release by name. Unknown keys are ignored.
    pub fn set_key(&mut self, key: &str, down: bool) -> bool {
        let slot = match key.to_ascii_lowercase().as_str() {
            "a" => &mut self.a,
            "d" => &mut self.d,
            "w" => &mut self.w,
            " " | "space" => &mut self.space,
            "s" => &mut self.s,
            "shift" => &mut self.shift,
            _ => return false,
        };
        *slot = down;
        true
    }

    /// Maps held keys to movement intent.
    pub fn intent(self) -> InputIntent {
        let mut intent = InputIntent::empty();
        // Opposite directions cancel.
        if self.a != self.d {
            intent.set(InputIntent::LEFT, self.a);
            intent.set(InputIntent::RIGHT, self.d);
        }
        intent.set(InputIntent::UP, self.w || self.space);
        intent.set(InputIntent::DOWN, self.s);
        intent.set(InputIntent::TOGGLE_SPIRIT, self.shift);
        intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_intent() {
        let mut keys = KeyState::default();
        assert!(keys.intent().is_empty());

        keys.set_key("d", true);
        keys.set_key("Space", true);
        keys.set_key("Shift", true);
        assert_eq!(
            keys.intent(),
            InputIntent::RIGHT | InputIntent::UP | InputIntent::TOGGLE_SPIRIT
        );

        keys.set_key("space", false);
        keys.set_key("w", true);
        keys.set_key("s", true);
        assert!(keys.intent().contains(InputIntent::UP | InputIntent::DOWN));
    }

    #[test]
    fn left_and_right_cancel() {
        let keys = KeyState {
            a: true,
            d: true,
            ..Default::default()
        };
        let intent = keys.intent();
        assert!(!intent.intersects(InputIntent::LEFT | InputIntent::RIGHT));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut keys = KeyState::default();
        assert!(!keys.set_key("q", true));
        assert_eq!(keys, KeyState::default());
    }
}
