//! Admission control: which visible tabs should be hot.
//!
//! - Normal zoom: every visible shape is wanted hot.
//! - Overview zoom: elevated shapes are always wanted; the rest only if the user
//!   ever interacted with them, most recent first, up to `hot_cap_overview`.
//! - While panning: at most one promotion per tick, the biggest non-hot shape, and
//!   only when it is elevated or strongly visible.

use crate::activity::TabFlags;
use crate::clock::Millis;
use crate::ids::{ShapeId, TabId};
use std::cmp::Ordering;

/// A visible, browser-backed shape considered this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub shape_id: ShapeId,
    pub tab_id: TabId,
    pub visible_px: f64,
    pub flags: TabFlags,
    pub last_interaction: Option<Millis>,
}

impl Candidate {
    pub fn is_elevated(&self) -> bool {
        self.flags.is_elevated()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomRegime {
    Overview,
    Normal,
}

/// Larger visible area first, shape id breaks ties.
fn by_visibility(a: &Candidate, b: &Candidate) -> Ordering {
    b.visible_px
        .total_cmp(&a.visible_px)
        .then_with(|| a.shape_id.cmp(&b.shape_id))
}

/// The desired-hot set for a fully idle tick, in promotion order.
pub fn desired_hot(candidates: &[Candidate], regime: ZoomRegime, hot_cap_overview: usize) -> Vec<&Candidate> {
    match regime {
        ZoomRegime::Normal => {
            let mut all: Vec<&Candidate> = candidates.iter().collect();
            all.sort_by(|a, b| by_visibility(a, b));
            all
        }
        ZoomRegime::Overview => {
            let mut elevated: Vec<&Candidate> = candidates.iter().filter(|c| c.is_elevated()).collect();
            elevated.sort_by(|a, b| by_visibility(a, b));

            let mut recent: Vec<(&Candidate, Millis)> = candidates
                .iter()
                .filter(|c| !c.is_elevated())
                .filter_map(|c| c.last_interaction.filter(|ts| *ts > 0).map(|ts| (c, ts)))
                .collect();
            recent.sort_by(|(a, ta), (b, tb)| tb.cmp(ta).then_with(|| a.shape_id.cmp(&b.shape_id)));

            elevated.extend(recent.into_iter().take(hot_cap_overview).map(|(c, _)| c));
            elevated
        }
    }
}

/// The single promotion allowed on a pan-active tick, if any.
pub fn pan_candidate<'a>(
    candidates: &'a [Candidate],
    is_hot: impl Fn(&TabId) -> bool,
    strong_px: f64,
) -> Option<&'a Candidate> {
    let best = candidates
        .iter()
        .filter(|c| !is_hot(&c.tab_id))
        .min_by(|a, b| by_visibility(a, b))?;

    if best.is_elevated() || best.visible_px > strong_px {
        Some(best)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: &str, px: f64, last: Option<Millis>) -> Candidate {
        Candidate {
            shape_id: ShapeId::from(format!("shape-{n}")),
            tab_id: TabId::from(format!("tab-{n}")),
            visible_px: px,
            flags: TabFlags::empty(),
            last_interaction: last,
        }
    }

    fn shape_names(list: &[&Candidate]) -> Vec<String> {
        list.iter().map(|c| c.shape_id.to_string()).collect()
    }

    #[test]
    fn normal_mode_wants_everything_biggest_first() {
        let cands = vec![candidate("a", 10_000.0, None), candidate("b", 50_000.0, None)];
        let wanted = desired_hot(&cands, ZoomRegime::Normal, 0);
        assert_eq!(shape_names(&wanted), vec!["shape-b", "shape-a"]);
    }

    #[test]
    fn overview_caps_by_most_recent_interaction() {
        let mut cands: Vec<Candidate> = (1..=8)
            .map(|i| candidate(&i.to_string(), 20_000.0, Some(i * 100)))
            .collect();
        cands.push(candidate("never", 90_000.0, None));
        cands.push(candidate("zero", 90_000.0, Some(0)));

        let wanted = desired_hot(&cands, ZoomRegime::Overview, 6);
        assert_eq!(
            shape_names(&wanted),
            vec!["shape-8", "shape-7", "shape-6", "shape-5", "shape-4", "shape-3"]
        );
    }

    #[test]
    fn overview_keeps_elevated_outside_the_cap() {
        let mut pinned = candidate("pinned", 5_000.0, None);
        pinned.flags = TabFlags::PINNED;
        let cands = vec![pinned, candidate("a", 20_000.0, Some(10)), candidate("b", 20_000.0, Some(20))];

        let wanted = desired_hot(&cands, ZoomRegime::Overview, 1);
        assert_eq!(shape_names(&wanted), vec!["shape-pinned", "shape-b"]);
    }

    #[test]
    fn overview_with_zero_cap_only_wants_elevated() {
        let cands = vec![candidate("a", 20_000.0, Some(10))];
        assert!(desired_hot(&cands, ZoomRegime::Overview, 0).is_empty());
    }

    #[test]
    fn pan_promotes_largest_strong_candidate() {
        let cands = vec![
            candidate("a", 50_000.0, None),
            candidate("b", 90_000.0, None),
            candidate("c", 200_000.0, None),
        ];
        let picked = pan_candidate(&cands, |_| false, 8_000.0).unwrap();
        assert_eq!(picked.shape_id, ShapeId::from("shape-c"));
    }

    #[test]
    fn pan_skips_hot_tabs() {
        let cands = vec![candidate("a", 50_000.0, None), candidate("c", 200_000.0, None)];
        let picked = pan_candidate(&cands, |t| t == &TabId::from("tab-c"), 8_000.0).unwrap();
        assert_eq!(picked.shape_id, ShapeId::from("shape-a"));
    }

    #[test]
    fn pan_rejects_weak_largest_candidate() {
        let cands = vec![candidate("a", 5_000.0, None), candidate("b", 3_000.0, None)];
        assert!(pan_candidate(&cands, |_| false, 8_000.0).is_none());
    }

    #[test]
    fn pan_accepts_weak_elevated_candidate() {
        let mut audible = candidate("a", 2_000.0, None);
        audible.flags = TabFlags::AUDIBLE;
        let cands = vec![audible];
        assert!(pan_candidate(&cands, |_| false, 8_000.0).is_some());
    }
}
