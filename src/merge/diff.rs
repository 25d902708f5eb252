//! Myers line diff.

/// A run of base lines replaced by a run of side lines.
///
/// `base_len == 0` is a pure insertion before `base_start`;
/// `side_len == 0` is a pure deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Hunk {
    pub base_start: usize,
    pub base_len: usize,
    pub side_start: usize,
    pub side_len: usize,
}

impl Hunk {
    pub const fn base_end(&self) -> usize {
        self.base_start + self.base_len
    }

    pub const fn side_end(&self) -> usize {
        self.side_start + self.side_len
    }
}

/// Minimal edit script from `base` to `side`, as ordered hunks.
pub fn diff_lines(base: &[&str], side: &[&str]) -> Vec<Hunk> {
    let prefix = base
        .iter()
        .zip(side)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = base[prefix..]
        .iter()
        .rev()
        .zip(side[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &base[prefix..base.len() - suffix];
    let b = &side[prefix..side.len() - suffix];

    let mut hunks = Vec::new();
    let (mut i, mut j) = (0, 0);
    let matches = shortest_edit(a, b);
    for (mi, mj) in matches.into_iter().chain(std::iter::once((a.len(), b.len()))) {
        if mi > i || mj > j {
            hunks.push(Hunk {
                base_start: prefix + i,
                base_len: mi - i,
                side_start: prefix + j,
                side_len: mj - j,
            });
        }
        i = mi + 1;
        j = mj + 1;
    }
    hunks
}

/// Matched index pairs along one shortest edit path, in order.
fn shortest_edit(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let max = n + m;
    let offset = max + 1;
    let mut v = vec![0isize; (2 * max + 3) as usize];
    // trace[d] holds v[-d-1..=d+1] as it stood before round d.
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=max {
        trace.push(v[(offset - d - 1) as usize..=(offset + d + 1) as usize].to_vec());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    let mut matches = Vec::new();
    let (mut x, mut y) = (n, m);
    for (d, window) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let at = |k: isize| window[(k + d + 1) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            matches.push((x as usize, y as usize));
        }
        if d > 0 {
            x = prev_x;
            y = prev_y;
        }
    }
    matches.reverse();
    matches
}
