//! Region computation for a three-way merge.

use super::diff::{Hunk, diff_lines};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Current,
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Region<'a> {
    Resolved(Vec<&'a str>),
    Conflict {
        /// 0-based index of the first base line covered.
        base_start: usize,
        base: Vec<&'a str>,
        current: Vec<&'a str>,
        incoming: Vec<&'a str>,
    },
}

/// Split the merge into resolved runs and conflicting regions.
///
/// Hunks from both sides are walked in base order. Hunks that overlap in the
/// base, or two insertions at the same point, form one region; a region
/// touched by one side takes that side, a region both sides changed
/// identically takes either, and anything else conflicts. Changes to
/// adjacent but distinct lines do not conflict.
pub(crate) fn merge_regions<'a>(
    base: &[&'a str],
    current: &[&'a str],
    incoming: &[&'a str],
) -> Vec<Region<'a>> {
    let mut hunks: Vec<(Hunk, Side)> = diff_lines(base, current)
        .into_iter()
        .map(|hunk| (hunk, Side::Current))
        .chain(
            diff_lines(base, incoming)
                .into_iter()
                .map(|hunk| (hunk, Side::Incoming)),
        )
        .collect();
    hunks.sort_by_key(|(hunk, side)| (hunk.base_start, hunk.base_len, *side));

    let mut regions = Vec::new();
    let mut stable_from = 0;
    let mut i = 0;

    while i < hunks.len() {
        let region_start = hunks[i].0.base_start;
        let mut region_end = hunks[i].0.base_end();
        let mut j = i + 1;
        while j < hunks.len() {
            let next = hunks[j].0;
            let overlaps = next.base_start < region_end;
            let same_insertion_point = next.base_len == 0
                && region_start == region_end
                && next.base_start == region_start;
            if !overlaps && !same_insertion_point {
                break;
            }
            region_end = region_end.max(next.base_end());
            j += 1;
        }

        if region_start > stable_from {
            regions.push(Region::Resolved(base[stable_from..region_start].to_vec()));
        }

        let group = &hunks[i..j];
        let ours = side_content(group, Side::Current, current, region_start, region_end);
        let theirs = side_content(group, Side::Incoming, incoming, region_start, region_end);

        match (ours, theirs) {
            (Some(ours), None) => regions.push(Region::Resolved(ours)),
            (None, Some(theirs)) => regions.push(Region::Resolved(theirs)),
            (Some(ours), Some(theirs)) if ours == theirs => {
                regions.push(Region::Resolved(ours));
            }
            (Some(ours), Some(theirs)) => regions.push(Region::Conflict {
                base_start: region_start,
                base: base[region_start..region_end].to_vec(),
                current: ours,
                incoming: theirs,
            }),
            (None, None) => {}
        }

        stable_from = region_end;
        i = j;
    }

    if stable_from < base.len() {
        regions.push(Region::Resolved(base[stable_from..].to_vec()));
    }

    coalesce(regions)
}

/// What `side` holds over base lines `[start, end)`, or `None` when that
/// side left the region untouched.
fn side_content<'a>(
    group: &[(Hunk, Side)],
    side: Side,
    lines: &[&'a str],
    start: usize,
    end: usize,
) -> Option<Vec<&'a str>> {
    let mut own = group.iter().filter(|(_, s)| *s == side).map(|(hunk, _)| hunk);
    let first = own.next()?;
    let last = own.last().unwrap_or(first);

    let side_start = first.side_start - (first.base_start - start);
    let side_end = last.side_end() + (end - last.base_end());
    Some(lines[side_start..side_end].to_vec())
}

fn coalesce(regions: Vec<Region<'_>>) -> Vec<Region<'_>> {
    let mut out: Vec<Region<'_>> = Vec::with_capacity(regions.len());
    for region in regions {
        match (out.last_mut(), region) {
            (Some(Region::Resolved(prev)), Region::Resolved(next)) => prev.extend(next),
            (_, region) => out.push(region),
        }
    }
    out
}
