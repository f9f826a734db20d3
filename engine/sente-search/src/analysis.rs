//! Analysis output for the host's info stream.
//!
//! Entries are rendered in the `info move … visits … winrate … prior …
//! order … pv …` form consumed by GTP analysis clients, with rates scaled
//! to integer ten-thousandths.

use std::cmp::Ordering;

use sente_core::{Move, Position};

use crate::node::UctNode;

/// One root child's statistics, ready for the analysis stream.
#[derive(Debug, Clone)]
pub struct AnalysisEntry {
    pub mov: Move,
    pub visits: u32,
    pub winrate: f32,
    pub prior: f32,
    pub pv: String,
}

impl AnalysisEntry {
    /// Render for the info stream. `order` is this entry's rank among the
    /// displayed moves.
    pub fn info_string(&self, order: Option<usize>) -> String {
        let mut out = format!(
            "info move {} visits {} winrate {} prior {}",
            self.mov,
            self.visits,
            (self.winrate * 10000.0) as i32,
            (self.prior * 10000.0) as i32,
        );
        if let Some(order) = order {
            out.push_str(&format!(" order {order}"));
        }
        out.push_str(&format!(" pv {}", self.pv));
        out
    }

    /// Descending by visits, then by winrate.
    pub fn compare(&self, other: &Self) -> Ordering {
        other
            .visits
            .cmp(&self.visits)
            .then_with(|| other.winrate.partial_cmp(&self.winrate).unwrap_or(Ordering::Equal))
    }
}

/// Render a full analysis line: entries separated by single spaces.
pub fn info_line(entries: &[AnalysisEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(order, e)| e.info_string(Some(order)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append the principal variation from `node` to `out`, playing the moves
/// on `state` as it descends. Refuses to read through a node that is still
/// expandable, since its child list may be racing an in-flight expansion.
pub(crate) fn principal_variation<P: Position>(state: &mut P, node: &UctNode, out: &mut String) {
    if node.expandable() {
        return;
    }
    node.with_children(|children| {
        let best = children
            .iter()
            .filter(|c| c.valid() && c.visits() > 0)
            .max_by_key(|c| c.visits());
        let best = match best {
            Some(best) => best,
            None => return,
        };
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&best.mov().to_string());
        if state.play(best.mov()).is_ok() {
            if let Some(child) = best.get() {
                principal_variation(state, child, out);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::Vertex;

    fn entry(mov: Move, visits: u32, winrate: f32) -> AnalysisEntry {
        AnalysisEntry {
            mov,
            visits,
            winrate,
            prior: 0.125,
            pv: mov.to_string(),
        }
    }

    #[test]
    fn info_string_scales_rates() {
        let e = entry(Move::Play(Vertex::new(3, 3)), 42, 0.5731);
        assert_eq!(
            e.info_string(Some(0)),
            "info move D4 visits 42 winrate 5731 prior 1250 order 0 pv D4"
        );
    }

    #[test]
    fn info_string_without_order() {
        let e = entry(Move::Pass, 1, 0.5);
        assert_eq!(
            e.info_string(None),
            "info move pass visits 1 winrate 5000 prior 1250 pv pass"
        );
    }

    #[test]
    fn ordering_is_visits_then_winrate() {
        let a = entry(Move::Pass, 10, 0.4);
        let b = entry(Move::Pass, 10, 0.6);
        let c = entry(Move::Pass, 5, 0.9);
        let mut entries = vec![a.clone(), c.clone(), b.clone()];
        entries.sort_by(|x, y| x.compare(y));
        assert_eq!(entries[0].winrate, 0.6);
        assert_eq!(entries[2].visits, 5);
    }

    #[test]
    fn info_line_joins_with_spaces() {
        let line = info_line(&[entry(Move::Pass, 2, 0.5), entry(Move::Pass, 1, 0.5)]);
        assert!(line.starts_with("info move pass"));
        assert!(line.contains(" order 1 "));
    }
}
