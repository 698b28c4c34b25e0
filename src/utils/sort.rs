use std::cmp::Ordering;

use num::Float;

/// LSD radix sort of `(id, count)` pairs by id.
/// - Sorts by id ascending
/// - Stable, so equal ids keep their input order
///
/// Complexity: 4 passes, each O(n + 256)
pub fn radix_sort_by_id(pairs: &mut Vec<(u32, u32)>) {
    let n = pairs.len();
    if n <= 1 {
        return;
    }

    // 小さい配列は挿入ソートの方が速い
    if n <= 32 {
        insertion_sort_by_id(pairs);
        return;
    }

    let mut scratch: Vec<(u32, u32)> = vec![(0, 0); n];
    for shift in [0u32, 8, 16, 24] {
        let mut count = [0usize; 256];
        for &(id, _) in pairs.iter() {
            count[((id >> shift) & 0xFF) as usize] += 1;
        }
        // every id shares this byte, nothing moves
        if count.iter().any(|&c| c == n) {
            continue;
        }

        let mut sum = 0usize;
        for c in count.iter_mut() {
            let tmp = *c;
            *c = sum;
            sum += tmp;
        }

        for &pair in pairs.iter() {
            let b = ((pair.0 >> shift) & 0xFF) as usize;
            scratch[count[b]] = pair;
            count[b] += 1;
        }
        std::mem::swap(pairs, &mut scratch);
    }
}

#[inline]
fn insertion_sort_by_id(pairs: &mut [(u32, u32)]) {
    for i in 1..pairs.len() {
        let mut j = i;
        while j > 0 && pairs[j].0 < pairs[j - 1].0 {
            pairs.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Indices of the `k` largest values, largest first.
/// Ties go to the lower index so the result is deterministic.
pub fn top_k_desc<N: Float>(values: &[N], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });
    order.truncate(k);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_stable_sort(pairs: &[(u32, u32)]) -> Vec<(u32, u32)> {
        let mut out = pairs.to_vec();
        out.sort_by_key(|p| p.0);
        out
    }

    /// tiny deterministic PRNG (xorshift32)
    struct Rng(u32);
    impl Rng {
        fn next_u32(&mut self) -> u32 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            self.0 = x;
            x
        }
    }

    #[test]
    fn radix_sort_handles_empty_and_single() {
        let mut pairs: Vec<(u32, u32)> = vec![];
        radix_sort_by_id(&mut pairs);
        assert!(pairs.is_empty());

        let mut pairs = vec![(42u32, 7u32)];
        radix_sort_by_id(&mut pairs);
        assert_eq!(pairs, vec![(42, 7)]);
    }

    #[test]
    fn radix_sort_matches_baseline_many_sizes() {
        let mut rng = Rng(0x1234_5678);
        for &n in &[2usize, 3, 31, 32, 33, 64, 129, 1024] {
            let mut pairs: Vec<(u32, u32)> = (0..n as u32)
                .map(|i| (rng.next_u32() & 0x00FF_FFFF, i))
                .collect();
            let expected = baseline_stable_sort(&pairs);
            radix_sort_by_id(&mut pairs);
            assert_eq!(pairs, expected, "mismatch at n={n}");
        }
    }

    #[test]
    fn radix_sort_extremes() {
        let mut pairs: Vec<(u32, u32)> = [0u32, u32::MAX, 1, u32::MAX - 1, 0, 2, u32::MAX]
            .iter()
            .cycle()
            .take(70)
            .enumerate()
            .map(|(i, &id)| (id, i as u32))
            .collect();
        let expected = baseline_stable_sort(&pairs);
        radix_sort_by_id(&mut pairs);
        assert_eq!(pairs, expected);
    }

    #[test]
    fn top_k_breaks_ties_by_lower_index() {
        let values = [0.5f64, 0.9, 0.5, 0.1, 0.9];
        assert_eq!(top_k_desc(&values, 3), vec![1, 4, 0]);
        assert_eq!(top_k_desc(&values, 10).len(), 5);
        assert!(top_k_desc::<f32>(&[], 3).is_empty());
    }
}
