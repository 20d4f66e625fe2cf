/// Player colors, avatars and id generation.

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::schema::game::GameId;
use crate::schema::player::PlayerId;

pub const PLAYER_COLORS: [&str; 8] = [
    "bg-red-500",
    "bg-blue-500",
    "bg-green-500",
    "bg-yellow-500",
    "bg-purple-500",
    "bg-pink-500",
    "bg-indigo-500",
    "bg-orange-500",
];

pub const PLAYER_AVATARS: [&str; 8] = ["🧙", "🦊", "🐉", "🤖", "👑", "🦄", "🏴‍☠️", "🧚"];

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A six-character uppercase room code, e.g. `K7QX2M`.
pub fn generate_game_id<R: Rng + ?Sized>(rng: &mut R) -> GameId {
    let code: String = (0..6)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect();
    GameId(code)
}

/// `player_` followed by nine lowercase alphanumerics.
pub fn generate_player_id<R: Rng + ?Sized>(rng: &mut R) -> PlayerId {
    let suffix: String = (0..9)
        .map(|_| (rng.sample(Alphanumeric) as char).to_ascii_lowercase())
        .collect();
    PlayerId(format!("player_{}", suffix))
}

pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    PLAYER_COLORS.choose(rng).copied().unwrap_or(PLAYER_COLORS[0])
}

pub fn random_avatar<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    PLAYER_AVATARS.choose(rng).copied().unwrap_or(PLAYER_AVATARS[0])
}

/// First entry of `palette` not in `used`, or a random one when all are taken.
pub fn first_unused<'a, R: Rng + ?Sized>(
    palette: &[&'a str],
    used: &[&str],
    rng: &mut R,
) -> &'a str {
    palette
        .iter()
        .find(|candidate| !used.contains(*candidate))
        .or_else(|| palette.choose(rng))
        .copied()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn game_id_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = generate_game_id(&mut rng);
        assert_eq!(id.0.len(), 6);
        assert!(id
            .0
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn player_id_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = generate_player_id(&mut rng);
        assert!(id.0.starts_with("player_"));
        assert_eq!(id.0.len(), "player_".len() + 9);
        assert!(!id.0.chars().any(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn first_unused_skips_taken() {
        let mut rng = StdRng::seed_from_u64(1);
        let picked = first_unused(&PLAYER_COLORS, &["bg-red-500", "bg-blue-500"], &mut rng);
        assert_eq!(picked, "bg-green-500");
    }

    #[test]
    fn first_unused_falls_back_to_random() {
        let mut rng = StdRng::seed_from_u64(1);
        let picked = first_unused(&PLAYER_AVATARS, &PLAYER_AVATARS, &mut rng);
        assert!(PLAYER_AVATARS.contains(&picked));
    }
}
