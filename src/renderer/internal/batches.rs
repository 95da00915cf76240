//! Sorted-run primitives used by the batch builder.

/// Removes every element of `removals` from `items` in one merge pass.
/// Both slices must be sorted under the same order. Returns how many
/// elements were actually removed; removals not present in `items` are
/// skipped.
pub(crate) fn remove_sorted<T: Ord + Copy>(items: &mut Vec<T>, removals: &[T]) -> usize {
    if removals.is_empty() {
        return 0;
    }

    let mut write = 0;
    let mut r = 0;
    let mut removed = 0;
    for read in 0..items.len() {
        let item = items[read];
        while r < removals.len() && removals[r] < item {
            r += 1;
        }
        if r < removals.len() && removals[r] == item {
            r += 1;
            removed += 1;
            continue;
        }
        items[write] = item;
        write += 1;
    }
    items.truncate(write);
    removed
}

/// Merges the sorted run `inserts` into the sorted `items` in place,
/// filling from the back. Equal elements keep existing items first.
pub(crate) fn merge_sorted<T: Ord + Copy>(items: &mut Vec<T>, inserts: &[T]) {
    if inserts.is_empty() {
        return;
    }

    let mut i = items.len();
    let mut j = inserts.len();
    items.extend_from_slice(inserts);
    let mut k = items.len();

    while j > 0 {
        if i > 0 && items[i - 1] > inserts[j - 1] {
            items[k - 1] = items[i - 1];
            i -= 1;
        } else {
            items[k - 1] = inserts[j - 1];
            j -= 1;
        }
        k -= 1;
    }
}
