use serde::{Deserialize, Serialize};

/// Gap added past the farthest reached distance when an unreachable node must be given a
/// finite coordinate-space distance.
pub const UNREACHABLE_PENALTY: f64 = 10.0;

/// Shortest-path distance with disconnection made explicit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Distance {
    Finite(f64),
    Unreachable,
}

impl Distance {
    pub fn is_reachable(self) -> bool {
        matches!(self, Distance::Finite(_))
    }

    pub fn finite(self) -> Option<f64> {
        match self {
            Distance::Finite(d) => Some(d),
            Distance::Unreachable => None,
        }
    }

    pub fn unwrap_or(self, fallback: f64) -> f64 {
        self.finite().unwrap_or(fallback)
    }
}

/// Replaces every unreachable entry by the largest finite distance plus
/// [`UNREACHABLE_PENALTY`], keeping downstream arithmetic finite.
pub fn resolve_unreachable(dist: &[Distance]) -> Vec<f64> {
    let farthest = dist
        .iter()
        .filter_map(|d| d.finite())
        .fold(0.0_f64, f64::max);
    dist.iter()
        .map(|d| d.unwrap_or(farthest + UNREACHABLE_PENALTY))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_entries_sit_past_the_farthest_node() {
        let d = [
            Distance::Finite(0.0),
            Distance::Finite(2.5),
            Distance::Unreachable,
        ];
        assert_eq!(resolve_unreachable(&d), vec![0.0, 2.5, 12.5]);
    }
}
