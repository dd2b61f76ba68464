use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One training or inference example: rows `index_start..=index_end` of the
/// tensor store, spanning `sequence_length` real time steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowIndexEntry {
    pub group_id: usize,
    pub index_start: usize,
    pub index_end: usize,
    /// Time index of the first row of the window.
    pub time: i64,
    /// Last time index of the series the window belongs to.
    pub time_last: i64,
    pub sequence_length: usize,
}

impl WindowIndexEntry {
    pub fn last_time(&self) -> i64 {
        self.time + self.sequence_length as i64 - 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexParams {
    pub min_encoder_length: usize,
    pub max_encoder_length: usize,
    pub min_prediction_length: usize,
    pub max_prediction_length: usize,
    pub min_prediction_idx: i64,
    pub predict_mode: bool,
    pub add_shortened_windows: bool,
}

impl IndexParams {
    pub fn min_sequence_length(&self) -> usize {
        self.min_prediction_length + self.min_encoder_length
    }

    pub fn max_sequence_length(&self) -> usize {
        self.max_prediction_length + self.max_encoder_length
    }

    fn keep(&self, entry: &WindowIndexEntry) -> bool {
        let long_enough = entry.sequence_length >= self.min_sequence_length();
        let reaches_prediction = entry.last_time()
            >= self.min_prediction_idx - 1 + self.min_prediction_length as i64;
        let fits_prediction = !self.predict_mode
            || entry.time_last - entry.time + 1 <= self.max_sequence_length() as i64;
        long_enough && reaches_prediction && fits_prediction
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowIndex {
    pub entries: Vec<WindowIndexEntry>,
    /// Groups spanning fewer time steps than the minimum sequence length.
    pub short_groups: Vec<usize>,
    /// Groups without any window after filtering.
    pub excluded_groups: Vec<usize>,
}

/// Resolves, for every start position, the last position whose time span from
/// the start does not exceed `max_lengths[start]`.
///
/// `diffs[i]` is the time difference from position `i` to `i + 1`. Also returns
/// `[start, end]` pairs of windows of at least `min_length` steps that end at a
/// position where no full-length window ends.
pub fn find_end_indices(
    diffs: &[i64],
    max_lengths: &[i64],
    min_length: i64,
) -> (Vec<usize>, Vec<[usize; 2]>) {
    let mut end_indices = Vec::with_capacity(diffs.len());
    let mut missing_start_ends = Vec::new();
    if diffs.is_empty() {
        return (end_indices, missing_start_ends);
    }

    let max_idx = diffs.len() - 1;
    let mut length: i64 = 1;
    let mut start_idx = 0;
    let mut max_length = max_lengths[start_idx];

    for (idx, diff) in diffs.iter().enumerate() {
        if length >= max_length {
            while length >= max_length && end_indices.len() < diffs.len() {
                if length == max_length {
                    end_indices.push(idx);
                } else {
                    end_indices.push(idx - 1);
                }
                length -= diffs[start_idx];
                if start_idx < max_idx {
                    start_idx += 1;
                }
                max_length = max_lengths[start_idx];
            }
        } else if length >= min_length {
            missing_start_ends.push([start_idx, idx]);
        }
        length += diff;
    }

    // max lengths that do not shrink to the end of the series leave starts open
    end_indices.resize(diffs.len(), max_idx);
    (end_indices, missing_start_ends)
}

/// Splits sorted per-row group ids into contiguous row ranges.
pub fn group_ranges(group_ids: &[usize]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for row in 1..=group_ids.len() {
        if row == group_ids.len() || group_ids[row] != group_ids[start] {
            ranges.push(start..row);
            start = row;
        }
    }
    ranges
}

/// Enumerates the windows of every group. Rows must be sorted by group and
/// time, `groups` are the row ranges of each group in order.
pub fn construct_index(time: &[i64], groups: &[Range<usize>], params: &IndexParams) -> WindowIndex {
    let mut index = WindowIndex::default();
    let min_sequence_length = params.min_sequence_length() as i64;
    let max_sequence_length = params.max_sequence_length() as i64;

    for (group_id, rows) in groups.iter().enumerate() {
        if rows.is_empty() {
            continue;
        }
        let times = &time[rows.clone()];
        let time_first = times[0];
        let time_last = times[times.len() - 1];
        if time_last - time_first + 1 < min_sequence_length {
            index.short_groups.push(group_id);
        }

        let diffs: Vec<i64> = (0..times.len())
            .map(|i| times.get(i + 1).map(|next| next - times[i]).unwrap_or(1))
            .collect();
        let max_lengths: Vec<i64> = times
            .iter()
            .map(|t| (t + max_sequence_length - 1).min(time_last) - t + 1)
            .collect();

        let has_gaps = diffs.iter().any(|d| *d != 1);
        let (ends, missing) = if has_gaps || params.add_shortened_windows {
            find_end_indices(&diffs, &max_lengths, min_sequence_length)
        } else {
            let ends = max_lengths
                .iter()
                .enumerate()
                .map(|(i, len)| i + *len as usize - 1)
                .collect();
            (ends, Vec::new())
        };

        let entry = |start: usize, end: usize| WindowIndexEntry {
            group_id,
            index_start: rows.start + start,
            index_end: rows.start + end,
            time: times[start],
            time_last,
            sequence_length: (times[end] - times[start] + 1) as usize,
        };

        let mut candidates: Vec<WindowIndexEntry> = ends
            .iter()
            .enumerate()
            .map(|(start, end)| entry(start, *end))
            .collect();
        if params.add_shortened_windows && !params.predict_mode {
            candidates.extend(missing.iter().map(|[start, end]| entry(*start, *end)));
        }

        let kept = candidates.into_iter().filter(|e| params.keep(e));
        let before = index.entries.len();
        if params.predict_mode {
            // longest window, first occurrence wins ties
            let longest = kept.fold(None, |best: Option<WindowIndexEntry>, e| match best {
                Some(b) if b.sequence_length >= e.sequence_length => Some(b),
                _ => Some(e),
            });
            index.entries.extend(longest);
        } else {
            index.entries.extend(kept);
        }
        if index.entries.len() == before {
            index.excluded_groups.push(group_id);
        }
    }

    debug!(
        windows = index.entries.len(),
        groups = groups.len(),
        excluded = index.excluded_groups.len(),
        "constructed window index"
    );
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> IndexParams {
        IndexParams {
            min_encoder_length: 1,
            max_encoder_length: 3,
            min_prediction_length: 1,
            max_prediction_length: 2,
            min_prediction_idx: 0,
            predict_mode: false,
            add_shortened_windows: false,
        }
    }

    #[test]
    fn test_find_end_indices() {
        let diffs = [1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1];
        let max_lengths = [4, 4, 4, 4, 4, 4, 4, 4, 3, 2, 1, 4, 4, 4, 4, 4, 4, 4, 4, 3, 2, 1];

        let (ends, missings) = find_end_indices(&diffs, &max_lengths, 3);
        assert_eq!(
            ends,
            vec![3, 4, 4, 5, 6, 8, 9, 10, 10, 10, 10, 14, 15, 15, 16, 17, 19, 20, 21, 21, 21, 21]
        );
        assert_eq!(missings, vec![[0, 2], [5, 7], [11, 13], [16, 18]]);
    }

    #[test]
    fn test_scan_matches_arithmetic_without_gaps() {
        let time: Vec<i64> = (0..10).collect();
        let groups = vec![0..10];
        let direct = construct_index(&time, &groups, &params());
        let scanned = construct_index(
            &time,
            &groups,
            &IndexParams {
                add_shortened_windows: true,
                min_encoder_length: 3,
                ..params()
            },
        );
        let direct_long: Vec<_> = direct
            .entries
            .iter()
            .filter(|e| e.sequence_length >= 4)
            .collect();
        let scanned_full: Vec<_> = scanned
            .entries
            .iter()
            .filter(|e| e.sequence_length >= 4)
            .take(direct_long.len())
            .collect();
        assert_eq!(direct_long, scanned_full);
        assert_eq!(direct.entries[0].index_end, 4);
    }

    #[test]
    fn test_gaps_use_real_time_span() {
        // 0 1 2 _ 4 5 6
        let time = vec![0, 1, 2, 4, 5, 6];
        let index = construct_index(&time, &[0..6], &params());
        let first = index.entries[0];
        assert_eq!(first.index_end, 3);
        assert_eq!(first.sequence_length, 5);
        assert!(index
            .entries
            .iter()
            .all(|e| e.sequence_length <= 5 && e.sequence_length >= 2));
    }

    #[test]
    fn test_predict_mode_keeps_longest_window_per_group() {
        let time: Vec<i64> = (0..8).chain(0..3).collect();
        let groups = vec![0..8, 8..11];
        let index = construct_index(
            &time,
            &groups,
            &IndexParams {
                predict_mode: true,
                ..params()
            },
        );
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[0].time, 3);
        assert_eq!(index.entries[0].sequence_length, 5);
        assert_eq!(index.entries[1].time, 0);
        assert_eq!(index.entries[1].sequence_length, 3);
    }

    #[test]
    fn test_short_and_excluded_groups() {
        let time: Vec<i64> = (0..6).chain(0..1).collect();
        let groups = vec![0..6, 6..7];
        let index = construct_index(&time, &groups, &params());
        assert_eq!(index.short_groups, vec![1]);
        assert_eq!(index.excluded_groups, vec![1]);
        assert!(index.entries.iter().all(|e| e.group_id == 0));
    }

    #[test]
    fn test_min_prediction_idx_filter() {
        let time: Vec<i64> = (0..10).collect();
        let index = construct_index(
            &time,
            &[0..10],
            &IndexParams {
                min_prediction_idx: 8,
                ..params()
            },
        );
        assert!(!index.entries.is_empty());
        assert!(index.entries.iter().all(|e| e.last_time() >= 8));
    }

    #[test]
    fn test_group_ranges() {
        assert_eq!(group_ranges(&[0, 0, 1, 2, 2, 2]), vec![0..2, 2..3, 3..6]);
        assert!(group_ranges(&[]).is_empty());
    }
}
