//! Immutable point-to-bucket membership.

use crate::types::PointIndex;
use std::collections::BTreeMap;

/// Members of every non-empty bucket, keyed by bucket (or compound bucket).
///
/// Built once from per-point assignments and never mutated during search.
/// Iteration is in ascending key order; members are in ascending point order.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketTable<K: Ord + Copy> {
    groups: BTreeMap<K, Vec<PointIndex>>,
    num_points: usize,
}

impl<K: Ord + Copy> BucketTable<K> {
    /// Group points by their assigned key; point `i` gets `assignments[i]`.
    pub fn from_assignments<I>(assignments: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        let mut groups: BTreeMap<K, Vec<PointIndex>> = BTreeMap::new();
        let mut num_points = 0usize;
        for (i, key) in assignments.into_iter().enumerate() {
            groups.entry(key).or_default().push(i as PointIndex);
            num_points += 1;
        }
        Self { groups, num_points }
    }

    /// Members of `key`, or an empty slice.
    pub fn members(&self, key: &K) -> &[PointIndex] {
        self.groups.get(key).map(|m| m.as_slice()).unwrap_or(&[])
    }

    /// Non-empty buckets in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Vec<PointIndex>)> {
        self.groups.iter()
    }

    /// Number of non-empty buckets.
    pub fn num_buckets(&self) -> usize {
        self.groups.len()
    }

    /// Number of points the table was built from.
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Size of every non-empty bucket.
    pub fn sizes(&self) -> Vec<(K, usize)> {
        self.groups.iter().map(|(k, m)| (*k, m.len())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_partitions_points() {
        let table = BucketTable::from_assignments(vec![2u32, 0, 2, 1, 0]);
        assert_eq!(table.num_points(), 5);
        assert_eq!(table.num_buckets(), 3);
        assert_eq!(table.members(&0), &[1, 4]);
        assert_eq!(table.members(&2), &[0, 2]);
        assert!(table.members(&7).is_empty());

        let keys: Vec<u32> = table.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 1, 2]);
    }

    #[test]
    fn test_compound_keys() {
        let table = BucketTable::from_assignments(vec![(1u32, 0u32), (0, 1), (1, 0)]);
        assert_eq!(table.members(&(1, 0)), &[0, 2]);
        assert_eq!(table.sizes(), vec![((0, 1), 1), ((1, 0), 2)]);
    }
}
