//! Random, non-repeating subsets for the homepage feed.

use rand::seq::SliceRandom;
use rand::Rng;

/// Up to `count` distinct elements of `items`, in random order.
pub fn random_sample<T: Clone>(items: &[T], count: usize) -> Vec<T> {
    random_sample_with(&mut rand::rng(), items, count)
}

/// [`random_sample`] with a caller-provided generator, for reproducible feeds.
pub fn random_sample_with<T, R>(rng: &mut R, items: &[T], count: usize) -> Vec<T>
where
    T: Clone,
    R: Rng + ?Sized,
{
    if items.is_empty() || count == 0 {
        return Vec::new();
    }

    let mut pool = items.to_vec();
    let amount = count.min(pool.len());
    let (picked, _) = pool.partial_shuffle(rng, amount);
    picked.to_vec()
}
