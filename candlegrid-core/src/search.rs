//! Binary search over a key projection.
//!
//! Both helpers assume `items` is sorted by the projected key and never
//! allocate.

/// Index of the first item whose key is `>= key` (`items.len()` if none).
pub fn lower_bound_by_key<T, K, F>(items: &[T], key: &K, project: F) -> usize
where
    K: Ord,
    F: Fn(&T) -> K,
{
    items.partition_point(|item| project(item) < *key)
}

/// Index of the first item whose key is `> key` (`items.len()` if none).
pub fn upper_bound_by_key<T, K, F>(items: &[T], key: &K, project: F) -> usize
where
    K: Ord,
    F: Fn(&T) -> K,
{
    items.partition_point(|item| project(item) <= *key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_on_duplicates() {
        let xs = [1, 3, 3, 3, 7];
        assert_eq!(lower_bound_by_key(&xs, &3, |x| *x), 1);
        assert_eq!(upper_bound_by_key(&xs, &3, |x| *x), 4);
        assert_eq!(lower_bound_by_key(&xs, &0, |x| *x), 0);
        assert_eq!(upper_bound_by_key(&xs, &9, |x| *x), 5);
    }

    #[test]
    fn bounds_with_projection() {
        let pairs = [(10, 'a'), (20, 'b'), (30, 'c')];
        assert_eq!(lower_bound_by_key(&pairs, &20, |p| p.0), 1);
        assert_eq!(upper_bound_by_key(&pairs, &20, |p| p.0), 2);
        assert_eq!(lower_bound_by_key(&[] as &[(i32, char)], &1, |p| p.0), 0);
    }
}
