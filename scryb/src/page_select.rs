/// Most options a select menu can hold.
pub const MAX_OPTIONS: usize = 25;

const EDGE: i64 = 5;
const BAND_RADIUS: i64 = 7;

/// Zero-based sub-pages offered by the page select. Everything fits up to
/// 25 pages; past that the menu keeps the first five, the last five, and a
/// band of fifteen around `current` that slides to stay clear of both ends.
pub fn page_options(current: usize, sub_page_count: usize) -> Vec<usize> {
    if sub_page_count <= MAX_OPTIONS {
        return (0..sub_page_count).collect();
    }

    let count = sub_page_count as i64;
    let current = (current as i64).min(count - 1);
    let right_bound = count - EDGE - 1;
    let left_most = current - BAND_RADIUS;
    let right_most = current + BAND_RADIUS;
    let offset = if right_most > right_bound {
        right_most - right_bound
    } else if left_most < EDGE {
        left_most - EDGE
    } else {
        0
    };

    (0..MAX_OPTIONS as i64)
        .map(|i| {
            if i < EDGE {
                i
            } else if i >= MAX_OPTIONS as i64 - EDGE {
                count - (MAX_OPTIONS as i64 - i)
            } else {
                current - (BAND_RADIUS + offset) + (i - EDGE)
            }
        })
        .map(|x| x as usize)
        .collect()
}
