use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Said when a persona carries no fallback lines at all.
pub const SILENT_FALLBACK: &str = "...";

/// Chooses canned responses for degraded turns.
///
/// With a seed the sequence of picks is reproducible, which is what makes
/// offline experiment logs deterministic.
#[derive(Debug, Clone)]
pub struct FallbackPicker {
    rng: StdRng,
}

impl FallbackPicker {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self {
                rng: StdRng::from_entropy(),
            },
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn pick(&mut self, lines: &[String]) -> String {
        lines
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| SILENT_FALLBACK.to_string())
    }
}

impl Default for FallbackPicker {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<String> {
        ["one", "two", "three", "four"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = FallbackPicker::seeded(7);
        let mut b = FallbackPicker::seeded(7);
        let lines = lines();

        let first: Vec<String> = (0..10).map(|_| a.pick(&lines)).collect();
        let second: Vec<String> = (0..10).map(|_| b.pick(&lines)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_picks_from_list() {
        let mut picker = FallbackPicker::default();
        let lines = lines();
        for _ in 0..20 {
            assert!(lines.contains(&picker.pick(&lines)));
        }
    }

    #[test]
    fn test_empty_list() {
        let mut picker = FallbackPicker::seeded(1);
        assert_eq!(picker.pick(&[]), SILENT_FALLBACK);
    }
}
