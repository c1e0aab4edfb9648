//! Keyed-group parallel transforms
//!
//! The panel is processed one individual at a time. Individuals never
//! depend on each other, so groups are mapped on the rayon pool and the
//! results concatenated.

use rayon::prelude::*;

/// Split key-sorted items into runs of equal key
pub fn group_contiguous<T, K, F>(items: Vec<T>, key: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> K,
    K: PartialEq,
{
    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut current_key: Option<K> = None;
    for item in items {
        let k = key(&item);
        match (&current_key, groups.last_mut()) {
            (Some(prev), Some(group)) if *prev == k => group.push(item),
            _ => {
                groups.push(vec![item]);
                current_key = Some(k);
            }
        }
    }
    groups
}

/// Partition key-sorted items by key, map each partition in parallel, concatenate
///
/// Only the order within a partition is meaningful to callers; partitions
/// themselves may come back in any order.
pub fn par_map_groups<T, K, F, M>(items: Vec<T>, key: F, map: M) -> Vec<T>
where
    T: Send,
    F: Fn(&T) -> K,
    K: PartialEq,
    M: Fn(Vec<T>) -> Vec<T> + Sync + Send,
{
    group_contiguous(items, key)
        .into_par_iter()
        .flat_map_iter(map)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_contiguous() {
        let groups = group_contiguous(vec![1, 1, 2, 3, 3, 3], |x| *x);
        assert_eq!(groups, vec![vec![1, 1], vec![2], vec![3, 3, 3]]);
        assert!(group_contiguous(Vec::<i32>::new(), |x| *x).is_empty());
    }

    #[test]
    fn test_par_map_groups_preserves_within_group_order() {
        let items: Vec<(u32, u32)> = (0..1000).map(|i| (i / 7, i)).collect();
        let mapped = par_map_groups(items, |(k, _)| *k, |mut g| {
            // Tag each element with its position inside the group
            for (pos, item) in g.iter_mut().enumerate() {
                item.1 = pos as u32;
            }
            g
        });

        assert_eq!(mapped.len(), 1000);
        let mut regrouped = group_contiguous(mapped, |(k, _)| *k);
        regrouped.sort_by_key(|g| g[0].0);
        for group in regrouped {
            let positions: Vec<u32> = group.iter().map(|(_, p)| *p).collect();
            assert_eq!(positions, (0..group.len() as u32).collect::<Vec<_>>());
        }
    }
}
