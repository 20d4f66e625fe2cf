/// Dice: two six-sided dice over a seedable RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::schema::game::DiceRoll;

pub const DIE_SIDES: u8 = 6;

#[derive(Debug, Clone)]
pub struct Dice {
    rng: StdRng,
}

impl Dice {
    /// Seeded dice give the same sequence every time; `None` draws from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn roll(&mut self) -> DiceRoll {
        DiceRoll {
            dice: [
                self.rng.gen_range(1..=DIE_SIDES),
                self.rng.gen_range(1..=DIE_SIDES),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_stay_in_range() {
        let mut dice = Dice::new(Some(7));
        for _ in 0..500 {
            let roll = dice.roll();
            assert!((1..=6).contains(&roll.dice[0]));
            assert!((1..=6).contains(&roll.dice[1]));
            assert!((2..=12).contains(&roll.total()));
        }
    }

    #[test]
    fn same_seed_same_rolls() {
        let mut a = Dice::new(Some(42));
        let mut b = Dice::new(Some(42));
        for _ in 0..20 {
            assert_eq!(a.roll(), b.roll());
        }
    }
}
