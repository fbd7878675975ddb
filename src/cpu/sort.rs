// bitonic sorting network, the CPU stand-in for the GPU sort dispatches
use rayon::prelude::*;

/// Sorts ascending in place. `data.len()` must be a power of two,
/// pad with values that sort last.
pub fn bitonic_sort<T: Ord + Send>(data: &mut [T]) {
    let n = data.len();
    debug_assert!(n == 0 || n.is_power_of_two(), "bitonic sort needs a power of two length");
    if n < 2 {
        return;
    }

    let mut k = 2;
    while k <= n {
        let mut j = k / 2;
        while j > 0 {
            compare_exchange_stage(data, k, j);
            j /= 2;
        }
        k *= 2;
    }
}

// one dispatch: every element i in the lower half of a 2j block is paired with i + j,
// blocks are disjoint so they can run concurrently
fn compare_exchange_stage<T: Ord + Send>(data: &mut [T], k: usize, j: usize) {
    data.par_chunks_mut(2 * j).enumerate().for_each(|(block, chunk)| {
        let ascending = (block * 2 * j) & k == 0;
        let (lo, hi) = chunk.split_at_mut(j);
        for (a, b) in lo.iter_mut().zip(hi.iter_mut()) {
            let out_of_order = if ascending { *a > *b } else { *a < *b };
            if out_of_order {
                std::mem::swap(a, b);
            }
        }
    });
}
