//! Round-robin interleaving of grouped results.

use std::collections::VecDeque;

/// Take one item from each group in turn, in group order, dropping groups as they run
/// dry, until `limit` items are taken or every group is exhausted.
///
/// ```rust
/// use mapsearch_sources::interleave::round_robin;
///
/// let groups = vec![vec!["a1", "a2"], vec!["b1"]];
/// assert_eq!(round_robin(groups, 3), vec!["a1", "b1", "a2"]);
/// ```
pub fn round_robin<T>(groups: Vec<Vec<T>>, limit: usize) -> Vec<T> {
    let mut queues: VecDeque<std::vec::IntoIter<T>> = groups
        .into_iter()
        .filter(|group| !group.is_empty())
        .map(IntoIterator::into_iter)
        .collect();
    let mut out = Vec::with_capacity(limit.min(queues.iter().map(ExactSizeIterator::len).sum()));

    while out.len() < limit {
        let Some(mut queue) = queues.pop_front() else {
            break;
        };
        if let Some(item) = queue.next() {
            out.push(item);
        }
        if !queue.as_slice().is_empty() {
            queues.push_back(queue);
        }
    }
    out
}

/// Group items by key, keeping groups in first-seen order and items in arrival order.
pub fn group_in_order<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<(K, Vec<T>)>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();
    for item in items {
        let k = key(&item);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(item),
            None => groups.push((k, vec![item])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_respects_limit() {
        let groups = vec![vec![1, 2, 3], vec![10, 20], vec![100]];
        assert_eq!(round_robin(groups.clone(), 4), vec![1, 10, 100, 2]);
        assert_eq!(round_robin(groups, 100), vec![1, 10, 100, 2, 20, 3]);
    }

    #[test]
    fn test_round_robin_empty_inputs() {
        assert!(round_robin::<u8>(vec![], 5).is_empty());
        assert!(round_robin(vec![vec![1]], 0).is_empty());
        assert_eq!(round_robin(vec![vec![], vec![7]], 5), vec![7]);
    }

    #[test]
    fn test_group_in_order() {
        let grouped = group_in_order(["b1", "a1", "b2"], |s| s.chars().next());
        assert_eq!(
            grouped,
            vec![(Some('b'), vec!["b1", "b2"]), (Some('a'), vec!["a1"])]
        );
    }
}
