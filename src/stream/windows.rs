//! Window Operators (C8)
//!
//! Pure functions computing window assignments from event-time timestamps
//! (epoch seconds). Generalizes the single source of truth for window
//! boundary computation used elsewhere in this codebase's backtesting engine
//! (fixed 15-minute windows there) to the three assigners Flow B needs:
//! tumbling, sliding, and session.

/// A half-open time window `[start, end)`, in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowBounds {
    pub start: i64,
    pub end: i64,
}

impl WindowBounds {
    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end
    }
}

/// A single tumbling window: `[floor(t/w)*w, floor(t/w)*w + w)`.
pub fn tumbling(window_secs: i64, t: i64) -> WindowBounds {
    debug_assert!(window_secs > 0);
    let index = t.div_euclid(window_secs);
    let start = index * window_secs;
    WindowBounds { start, end: start + window_secs }
}

/// All sliding windows of size `window_secs`, advancing by `slide_secs`,
/// whose half-open range contains `t`. Returned in start-ascending order.
pub fn sliding(window_secs: i64, slide_secs: i64, t: i64) -> Vec<WindowBounds> {
    debug_assert!(window_secs > 0 && slide_secs > 0);
    let mut windows = Vec::new();
    // The latest slide index whose window could still contain t is floor(t/slide).
    // The earliest is bounded by how many slides fit inside one window.
    let last_k = t.div_euclid(slide_secs);
    let span = (window_secs + slide_secs - 1) / slide_secs; // windows overlapping a given slide
    let first_k = last_k - span;
    for k in first_k..=last_k {
        let start = k * slide_secs;
        let end = start + window_secs;
        if t >= start && t < end {
            windows.push(WindowBounds { start, end });
        }
    }
    windows.sort_by_key(|w| w.start);
    windows
}

/// Session-window assignment: extends a previous `(start, end)` pair if `t`
/// falls within `gap_secs` of its end, otherwise starts a fresh `(t, t)`
/// session. Returns the resulting (possibly extended) session.
pub fn session(previous: Option<WindowBounds>, gap_secs: i64, t: i64) -> WindowBounds {
    match previous {
        Some(prev) if t <= prev.end + gap_secs => {
            WindowBounds { start: prev.start, end: prev.end.max(t) }
        }
        _ => WindowBounds { start: t, end: t },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tumbling_window_contains_its_own_start_and_half_open_end() {
        let w = tumbling(60, 125);
        assert_eq!(w.start + 60, w.end);
        assert!(w.contains(125));
        assert!(w.contains(w.start));
        assert!(!w.contains(w.end));
    }

    #[test]
    fn sliding_windows_all_contain_t_and_are_ascending() {
        let windows = sliding(300, 60, 725);
        assert!(!windows.is_empty());
        for w in &windows {
            assert!(w.contains(725));
            assert_eq!(w.end - w.start, 300);
        }
        let starts: Vec<i64> = windows.iter().map(|w| w.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn session_extends_within_gap_and_starts_fresh_beyond_it() {
        let first = session(None, 120, 1000);
        assert_eq!(first, WindowBounds { start: 1000, end: 1000 });

        let extended = session(Some(first), 120, 1050);
        assert_eq!(extended, WindowBounds { start: 1000, end: 1050 });

        let fresh = session(Some(extended), 120, 1300);
        assert_eq!(fresh, WindowBounds { start: 1300, end: 1300 });
    }
}
