use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype wrapper for player IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        PlayerId(s.to_string())
    }
}

/// A seat at the shared device.
///
/// Karma is signed on purpose: failed events may push it below zero and
/// nothing clamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub color: String,
    pub karma: i32,
    pub position: usize,
    pub actions: Vec<String>,
    pub is_host: bool,
    pub is_ready: bool,
}

impl Player {
    /// The player who created the game. Hosts are always ready.
    pub fn new_host(id: PlayerId, name: &str, avatar: &str, color: &str) -> Self {
        Self {
            is_host: true,
            ..Self::new_guest(id, name, avatar, color)
        }
    }

    /// Any other player joining the same device. Local guests are ready on join.
    pub fn new_guest(id: PlayerId, name: &str, avatar: &str, color: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            avatar: avatar.to_string(),
            color: color.to_string(),
            karma: 0,
            position: 0,
            actions: Vec::new(),
            is_host: false,
            is_ready: true,
        }
    }

    /// Append an entry to the action log.
    pub fn record_action(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
    }

    pub fn adjust_karma(&mut self, delta: i32) {
        self.karma = self.karma.saturating_add(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_ready_and_flagged() {
        let p = Player::new_host(PlayerId::from("p1"), "Ada", "🧙", "bg-red-500");
        assert!(p.is_host);
        assert!(p.is_ready);
        assert_eq!(p.karma, 0);
        assert_eq!(p.position, 0);
        assert!(p.actions.is_empty());
    }

    #[test]
    fn guest_is_not_host() {
        let p = Player::new_guest(PlayerId::from("p2"), "Bo", "🦊", "bg-blue-500");
        assert!(!p.is_host);
        assert!(p.is_ready);
    }

    #[test]
    fn karma_can_go_negative() {
        let mut p = Player::new_guest(PlayerId::from("p2"), "Bo", "🦊", "bg-blue-500");
        p.adjust_karma(-5);
        p.adjust_karma(-3);
        assert_eq!(p.karma, -8);
        p.adjust_karma(10);
        assert_eq!(p.karma, 2);
    }

    #[test]
    fn serializes_camel_case() {
        let p = Player::new_host(PlayerId::from("p1"), "Ada", "🧙", "bg-red-500");
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"isHost\":true"));
        assert!(json.contains("\"isReady\":true"));
    }
}
