//! Per-tick client input.
//!
//! `ClientCommands` is the unit the server buffers per connection. It is a
//! plain value: once recorded into a ring buffer it is never mutated.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::math::{Angles, Vec3};

bitflags! {
    /// Pressed-action bitmask for one tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ActionFlags: u32 {
        const ATTACK = 1 << 0;
        const JUMP   = 1 << 1;
        const DUCK   = 1 << 2;
        const USE    = 1 << 3;
        const RELOAD = 1 << 4;
        const SPRINT = 1 << 5;
    }
}

// On the wire the bitmask is its raw u32; unknown bits are dropped on decode.
impl Serialize for ActionFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for ActionFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(ActionFlags::from_bits_truncate(bits))
    }
}

/// One tick of client intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientCommands {
    /// Client-side tick counter when the input was sampled.
    pub tick: u32,
    /// Client clock at sample time, seconds.
    pub timestamp: f64,
    /// Wish movement in local space.
    pub move_dir: Vec3,
    /// View angles at sample time.
    pub view: Angles,
    /// Pressed actions.
    pub actions: ActionFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_flags_wire_roundtrip() {
        let flags = ActionFlags::ATTACK | ActionFlags::JUMP;
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, "3");
        let back: ActionFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }

    #[test]
    fn unknown_action_bits_dropped() {
        let back: ActionFlags = serde_json::from_str("4294967295").unwrap();
        assert_eq!(back, ActionFlags::all());
    }
}
