use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SectorReturn;

/// Leaders kept per kind.
pub const TOP_N: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapperKind {
    Gainer,
    Loser,
}

impl GapperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapperKind::Gainer => "gainer",
            GapperKind::Loser => "loser",
        }
    }
}

impl fmt::Display for GapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GapperKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gainer" => Ok(GapperKind::Gainer),
            "loser" => Ok(GapperKind::Loser),
            other => Err(format!("unknown gapper kind {other:?}")),
        }
    }
}

/// One ranked mover inside a sector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Leader {
    pub kind: GapperKind,
    /// 1-based, dense within `kind`.
    pub rank: u8,
    pub instrument_id: String,
    pub percent_change: f64,
    pub volume: u64,
    pub price: f64,
}

/// Top gainers (largest first) followed by top losers (most negative first).
/// Flat instruments are in neither list; ties go to the lower instrument id.
pub fn extract_leaders(returns: &[SectorReturn]) -> Vec<Leader> {
    let mut gainers: Vec<&SectorReturn> =
        returns.iter().filter(|r| r.percent_change > 0.0).collect();
    let mut losers: Vec<&SectorReturn> =
        returns.iter().filter(|r| r.percent_change < 0.0).collect();

    gainers.sort_by(|a, b| {
        b.percent_change
            .total_cmp(&a.percent_change)
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });
    losers.sort_by(|a, b| {
        a.percent_change
            .total_cmp(&b.percent_change)
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });

    let mut out = ranked(GapperKind::Gainer, &gainers);
    out.extend(ranked(GapperKind::Loser, &losers));
    out
}

fn ranked(kind: GapperKind, sorted: &[&SectorReturn]) -> Vec<Leader> {
    sorted
        .iter()
        .take(TOP_N)
        .enumerate()
        .map(|(i, r)| Leader {
            kind,
            rank: (i + 1) as u8,
            instrument_id: r.instrument_id.clone(),
            percent_change: r.percent_change,
            volume: r.volume,
            price: r.price,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn returns(changes: &[(&str, f64)]) -> Vec<SectorReturn> {
        changes
            .iter()
            .map(|(id, c)| SectorReturn {
                instrument_id: id.to_string(),
                percent_change: *c,
                price: 10.0,
                volume: 100,
            })
            .collect()
    }

    fn of_kind(leaders: &[Leader], kind: GapperKind) -> Vec<(String, f64, u8)> {
        leaders
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| (l.instrument_id.clone(), l.percent_change, l.rank))
            .collect()
    }

    #[test]
    fn splits_and_ranks_by_sign() {
        let rs = returns(&[("A", 12.0), ("B", -8.0), ("C", 5.0), ("D", -15.0), ("E", 3.0)]);
        let leaders = extract_leaders(&rs);

        let gainers = of_kind(&leaders, GapperKind::Gainer);
        let losers = of_kind(&leaders, GapperKind::Loser);

        assert_eq!(gainers[0], ("A".into(), 12.0, 1));
        assert_eq!(losers[0], ("D".into(), -15.0, 1));
        assert_eq!(
            gainers.iter().map(|g| g.1).collect::<Vec<_>>(),
            vec![12.0, 5.0, 3.0]
        );
        assert_eq!(losers.iter().map(|l| l.1).collect::<Vec<_>>(), vec![-15.0, -8.0]);
        assert!(gainers.iter().all(|g| g.1 > 0.0));
        assert!(losers.iter().all(|l| l.1 < 0.0));
    }

    #[test]
    fn keeps_top_three_and_drops_flat() {
        let rs = returns(&[
            ("A", 1.0),
            ("B", 2.0),
            ("C", 3.0),
            ("D", 4.0),
            ("F", 0.0),
        ]);
        let leaders = extract_leaders(&rs);

        assert_eq!(leaders.len(), 3);
        assert!(leaders.iter().all(|l| l.instrument_id != "F"));
        assert_eq!(
            leaders.iter().map(|l| l.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn ties_break_on_instrument_id() {
        let rs = returns(&[("Z", 5.0), ("A", 5.0)]);
        let leaders = extract_leaders(&rs);
        assert_eq!(leaders[0].instrument_id, "A");
        assert_eq!(leaders[1].instrument_id, "Z");
    }

    #[test]
    fn empty_sector_has_no_leaders() {
        assert!(extract_leaders(&[]).is_empty());
    }
}
