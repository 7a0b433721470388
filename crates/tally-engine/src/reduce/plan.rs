use crate::buffers::ELEMENT_SIZE;
use crate::config::round_up;

/// One pass of the reduction, fixed before any work is submitted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PassPlan {
    /// 0-based pass number.
    pub index: usize,
    /// Live elements read by this pass.
    pub elements: usize,
    /// Workgroups dispatched; also the element count left after the pass.
    pub workgroups: u32,
    /// Bytes copied out of Output after the dispatch.
    ///
    /// Covers the next pass's padded read range, so every element it reads past
    /// the live partial sums comes from the freshly cleared Output.
    pub live_bytes: u64,
    pub is_last: bool,
}

/// Plans every pass for `padded_len` elements.
///
/// Terminates because `ceil(n / w) < n` for `n > 1` and `w >= 2`. Callers
/// validate `workgroup_size >= 2`; smaller values yield an empty plan.
pub fn plan_passes(padded_len: usize, workgroup_size: u32) -> Vec<PassPlan> {
    let w = workgroup_size as usize;
    let mut plan = Vec::new();
    if w < 2 {
        return plan;
    }

    let mut elements = padded_len;
    while elements > 1 {
        let workgroups = elements.div_ceil(w);
        plan.push(PassPlan {
            index: plan.len(),
            elements,
            workgroups: workgroups as u32,
            live_bytes: round_up(workgroups, w) as u64 * ELEMENT_SIZE,
            is_last: workgroups == 1,
        });
        elements = workgroups;
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest `p` with `w^p >= x`.
    fn ceil_log(w: usize, x: usize) -> i64 {
        let (mut acc, mut p) = (1usize, 0i64);
        while acc < x {
            acc *= w;
            p += 1;
        }
        p
    }

    #[test]
    fn one_full_workgroup_is_one_pass() {
        let plan = plan_passes(4, 4);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].workgroups, 1);
        assert!(plan[0].is_last);
        assert_eq!(plan[0].live_bytes, 16);
    }

    #[test]
    fn five_elements_padded_to_eight() {
        let plan = plan_passes(8, 4);
        let shape: Vec<(usize, u32)> = plan.iter().map(|p| (p.elements, p.workgroups)).collect();
        assert_eq!(shape, vec![(8, 2), (2, 1)]);
        // Pass 0 hands a full workgroup of 4 elements to pass 1.
        assert_eq!(plan[0].live_bytes, 16);
        assert!(!plan[0].is_last && plan[1].is_last);
    }

    #[test]
    fn single_element_still_takes_one_pass() {
        // A dataset of one element is padded to one workgroup.
        assert_eq!(plan_passes(64, 64).len(), 1);
    }

    #[test]
    fn degenerate_workgroup_size_yields_no_plan() {
        assert!(plan_passes(16, 1).is_empty());
        assert!(plan_passes(16, 0).is_empty());
    }

    #[test]
    fn pass_count_is_logarithmic() {
        for w in 2..=9usize {
            for len in 1..=300usize {
                let padded = round_up(len, w);
                let passes = plan_passes(padded, w as u32).len() as i64;
                let expected = ceil_log(w, len.div_ceil(w));
                assert!(
                    (passes - expected).abs() <= 1,
                    "len {len}, w {w}: {passes} passes, expected about {expected}"
                );
            }
        }
    }

    #[test]
    fn elements_strictly_decrease_and_end_at_one() {
        for w in 2..=8u32 {
            let plan = plan_passes(round_up(1000, w as usize), w);
            for pair in plan.windows(2) {
                assert!(pair[1].elements < pair[0].elements);
                assert_eq!(pair[1].elements, pair[0].workgroups as usize);
            }
            assert_eq!(plan.last().map(|p| p.workgroups), Some(1));
            assert_eq!(plan.iter().filter(|p| p.is_last).count(), 1);
        }
    }

    #[test]
    fn live_range_never_exceeds_buffer() {
        for w in 2..=8u32 {
            let padded = round_up(777, w as usize);
            for p in plan_passes(padded, w) {
                assert!(p.live_bytes <= padded as u64 * ELEMENT_SIZE);
                assert_eq!(p.live_bytes % (w as u64 * ELEMENT_SIZE), 0);
            }
        }
    }
}
