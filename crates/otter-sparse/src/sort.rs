use crate::rng::XorShift64Star;

/// Sorts `ordering` so that `place[ordering[i]]` is non-decreasing.
///
/// Quicksort with a random pivot and a three-way split, so keys equal to the pivot are settled
/// in one pass. A side that is already sorted is skipped, and only the smaller side recurses;
/// the recursion depth stays logarithmic whatever the keys.
pub fn quicksort_place(place: &[f64], ordering: &mut [usize], rng: &mut XorShift64Star) {
    let mut rest = ordering;
    while rest.len() >= 2 && !sorted_place(place, rest) {
        let (lt, gt) = split_by_place(place, rest, rng);
        let (left, tail) = std::mem::take(&mut rest).split_at_mut(lt);
        let right = &mut tail[gt - lt..];
        if left.len() <= right.len() {
            quicksort_place(place, left, rng);
            rest = right;
        } else {
            quicksort_place(place, right, rng);
            rest = left;
        }
    }
}

pub fn sorted_place(place: &[f64], ordering: &[usize]) -> bool {
    ordering.windows(2).all(|w| place[w[0]] <= place[w[1]])
}

/// Partitions `nodes` around a random pivot into `[..lt)` below, `[lt..gt)` equal and
/// `[gt..)` above it.
fn split_by_place(
    place: &[f64],
    nodes: &mut [usize],
    rng: &mut XorShift64Star,
) -> (usize, usize) {
    let pivot = place[nodes[rng.next_usize(nodes.len())]];
    let mut lt = 0;
    let mut i = 0;
    let mut gt = nodes.len();
    while i < gt {
        let key = place[nodes[i]];
        if key < pivot {
            nodes.swap(lt, i);
            lt += 1;
            i += 1;
        } else if key > pivot {
            gt -= 1;
            nodes.swap(i, gt);
        } else {
            i += 1;
        }
    }
    (lt, gt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_with_many_repeated_keys() {
        let place: Vec<f64> = (0..200).map(|i| ((i * 7) % 5) as f64).collect();
        let mut ordering: Vec<usize> = (0..200).collect();
        let mut rng = XorShift64Star::new(3);
        quicksort_place(&place, &mut ordering, &mut rng);
        assert!(sorted_place(&place, &ordering));
        let mut seen = ordering.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn two_elements() {
        let place = [2.0, 1.0];
        let mut ordering = vec![0, 1];
        quicksort_place(&place, &mut ordering, &mut XorShift64Star::new(1));
        assert_eq!(ordering, vec![1, 0]);
    }

    #[test]
    fn equal_keys_do_not_deepen_the_recursion() {
        let n = 200_000;
        let place = vec![1.0; n];
        let mut ordering: Vec<usize> = (0..n).collect();
        quicksort_place(&place, &mut ordering, &mut XorShift64Star::new(7));
        assert_eq!(ordering, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn one_outlier_among_repeated_keys() {
        let n = 150_000;
        let mut place = vec![1.0; n];
        place[n / 2] = 0.0;
        place[n / 3] = 2.0;
        let mut ordering: Vec<usize> = (0..n).rev().collect();
        quicksort_place(&place, &mut ordering, &mut XorShift64Star::new(11));
        assert!(sorted_place(&place, &ordering));
        assert_eq!(ordering[0], n / 2);
        assert_eq!(ordering[n - 1], n / 3);
    }

    #[test]
    fn sorted_and_reversed_inputs() {
        let n = 100_000;
        let place: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut rng = XorShift64Star::new(5);

        let mut ordering: Vec<usize> = (0..n).collect();
        quicksort_place(&place, &mut ordering, &mut rng);
        assert_eq!(ordering, (0..n).collect::<Vec<_>>());

        let mut ordering: Vec<usize> = (0..n).rev().collect();
        quicksort_place(&place, &mut ordering, &mut rng);
        assert_eq!(ordering, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn few_distinct_keys_in_bulk() {
        let n = 120_000;
        let place: Vec<f64> = (0..n).map(|i| ((i * 7919) % 3) as f64).collect();
        let mut ordering: Vec<usize> = (0..n).collect();
        quicksort_place(&place, &mut ordering, &mut XorShift64Star::new(9));
        assert!(sorted_place(&place, &ordering));
        let mut seen = ordering.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }
}
