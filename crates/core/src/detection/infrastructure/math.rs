//! Union-find helpers for clustering detector candidates.

/// Find root of element `i`, halving the path on the way up.
pub fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge the sets containing `a` and `b`.
pub fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[rb] = ra;
    }
}

/// Dense class label per element, numbered in order of first appearance,
/// plus the number of classes.
pub fn dense_labels(parent: &mut [usize]) -> (Vec<usize>, usize) {
    let n = parent.len();
    let mut class_of_root = vec![usize::MAX; n];
    let mut labels = vec![0usize; n];
    let mut classes = 0;
    for (i, label) in labels.iter_mut().enumerate() {
        let root = find(parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = classes;
            classes += 1;
        }
        *label = class_of_root[root];
    }
    (labels, classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_on_fresh_sets_is_identity() {
        let mut parent: Vec<usize> = (0..4).collect();
        for i in 0..4 {
            assert_eq!(find(&mut parent, i), i);
        }
    }

    #[test]
    fn test_union_is_transitive() {
        let mut parent: Vec<usize> = (0..5).collect();
        union(&mut parent, 0, 1);
        union(&mut parent, 1, 3);
        assert_eq!(find(&mut parent, 0), find(&mut parent, 3));
        assert_ne!(find(&mut parent, 0), find(&mut parent, 2));
    }

    #[test]
    fn test_dense_labels_follow_first_appearance() {
        let mut parent: Vec<usize> = (0..5).collect();
        union(&mut parent, 4, 1);
        union(&mut parent, 2, 0);
        let (labels, classes) = dense_labels(&mut parent);
        assert_eq!(classes, 3);
        assert_eq!(labels, vec![0, 1, 0, 2, 1]);
    }
}
