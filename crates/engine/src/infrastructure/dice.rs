//! Dice implementations backing the domain's `DiceRoller`
//!
//! A `scenario.seed` string hashes into a reproducible RNG so whole sessions
//! can be replayed bit-for-bit; without a seed the dice come from entropy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use aeonisk_domain::DiceRoller;

/// Session dice: seeded when the scenario carries a seed, entropy otherwise.
pub struct SessionDice {
    rng: StdRng,
}

impl SessionDice {
    pub fn from_seed(seed: Option<&str>) -> Self {
        let rng = match seed {
            Some(seed) => {
                let digest = Sha256::digest(seed.as_bytes());
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&digest);
                StdRng::from_seed(bytes)
            }
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl DiceRoller for SessionDice {
    fn roll_d20(&mut self) -> u8 {
        self.rng.gen_range(1..=20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_dice_reproduce() {
        let mut a = SessionDice::from_seed(Some("ashfall"));
        let mut b = SessionDice::from_seed(Some("ashfall"));
        let rolls_a: Vec<u8> = (0..20).map(|_| a.roll_d20()).collect();
        let rolls_b: Vec<u8> = (0..20).map(|_| b.roll_d20()).collect();
        assert_eq!(rolls_a, rolls_b);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = SessionDice::from_seed(Some("ashfall"));
        let mut b = SessionDice::from_seed(Some("emberfall"));
        let rolls_a: Vec<u8> = (0..20).map(|_| a.roll_d20()).collect();
        let rolls_b: Vec<u8> = (0..20).map(|_| b.roll_d20()).collect();
        assert_ne!(rolls_a, rolls_b);
    }

    #[test]
    fn test_rolls_in_range() {
        let mut dice = SessionDice::from_seed(None);
        for _ in 0..200 {
            let roll = dice.roll_d20();
            assert!((1..=20).contains(&roll));
        }
    }
}
