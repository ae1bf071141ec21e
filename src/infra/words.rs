use rand::{seq::SliceRandom, thread_rng};

use crate::domain::port::WordGenerator;

const ADJECTIVES: [&str; 16] = [
    "brave", "calm", "eager", "fancy", "gentle", "happy", "jolly", "kind", "lively", "nice",
    "proud", "silly", "swift", "tidy", "witty", "zealous",
];

const NOUNS: [&str; 16] = [
    "badger", "bear", "crane", "dolphin", "eagle", "fox", "gecko", "heron", "ibex", "koala",
    "lynx", "otter", "panda", "quokka", "wombat", "yak",
];

/// `adjective-noun` pairs for random route hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomWords;

impl WordGenerator for RandomWords {
    fn babble(&self) -> String {
        let mut rng = thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("random");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("route");
        format!("{}-{}", adjective, noun)
    }
}
