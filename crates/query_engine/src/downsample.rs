/// Source indices kept when reducing `len` points to at most `max_points`.
///
/// Index `i` of the output maps to `i * len / max_points` rounded half up and
/// clamped to the last element. The division is exact integer arithmetic, so
/// products landing on a half are never nudged by float error. Indices never
/// decrease; duplicates are possible when rounding collides.
pub fn downsample_indices(len: usize, max_points: Option<usize>) -> Vec<usize> {
    match max_points {
        Some(max) if max > 0 && len > max => (0..max)
            .map(|i| {
                let num = i * len;
                let index = num / max + usize::from(2 * (num % max) >= max);
                index.min(len - 1)
            })
            .collect(),
        _ => (0..len).collect(),
    }
}

/// Uniform index decimation of an ordered sequence
pub fn downsample<T: Clone>(items: &[T], max_points: Option<usize>) -> Vec<T> {
    downsample_indices(items.len(), max_points)
        .into_iter()
        .map(|index| items[index].clone())
        .collect()
}
