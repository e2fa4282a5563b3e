use std::cmp::Ordering;

/// Length of every ranked list in the report.
pub const TOP_N: usize = 5;

/// Return the `n` items with the largest key, largest first. The sort is
/// stable, so items with equal keys keep their input order.
pub fn top_n<T, K, F>(items: &[T], n: usize, key: F) -> Vec<&T>
where
    K: PartialOrd,
    F: Fn(&T) -> K,
{
    let mut ranked: Vec<&T> = items.iter().collect();
    ranked.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    ranked.truncate(n);
    ranked
}
