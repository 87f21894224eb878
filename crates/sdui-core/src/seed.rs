use rand::Rng;

/// Turns user seed text into a concrete seed.
///
/// Text that parses as a `u32` (surrounding whitespace ignored) is used verbatim,
/// anything else yields a uniformly random seed.
pub fn resolve_seed(input: &str) -> u32 {
    resolve_seed_with(input, &mut rand::thread_rng())
}

pub fn resolve_seed_with<R: Rng>(input: &str, rng: &mut R) -> u32 {
    match input.trim().parse::<u32>() {
        Ok(seed) => seed,
        Err(_) => rng.r#gen(),
    }
}
