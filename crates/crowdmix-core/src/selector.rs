//! BPM compatibility selection
//!
//! Filters catalog records down to those close enough to the performance
//! tempo, and picks a vocal among them with a bias toward the closest BPM.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use thiserror::Error;

use crate::catalog::StemRecord;
use crate::types::StemRole;

/// Errors raised when the catalog has nothing compatible
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("No compatible vocal within {tolerance_pct:.1}% of {target_bpm:.1} BPM")]
    NoCompatibleVocal { target_bpm: f64, tolerance_pct: f64 },

    #[error("No compatible {role} stem within {tolerance_pct:.1}% of {target_bpm:.1} BPM")]
    NoCompatibleStem {
        role: StemRole,
        target_bpm: f64,
        tolerance_pct: f64,
    },
}

/// Slack on the window edges so float rounding never excludes an exact bound
const BOUND_EPSILON: f64 = 1e-9;

/// Whether `bpm` lies within `[target*(1-tol), target*(1+tol)]` (inclusive)
pub fn is_within_tolerance(bpm: f64, target_bpm: f64, tolerance_pct: f64) -> bool {
    let tol = tolerance_pct.max(0.0) / 100.0;
    let low = target_bpm * (1.0 - tol);
    let high = target_bpm * (1.0 + tol);
    bpm >= low - BOUND_EPSILON && bpm <= high + BOUND_EPSILON
}

/// Records of `role` admissible at `target_bpm`, closest first
///
/// Ties on BPM distance are ordered by song id so the result is
/// deterministic. An empty result is not an error; callers decide.
pub fn select_candidates<'a, I>(
    records: I,
    role: StemRole,
    target_bpm: f64,
    tolerance_pct: f64,
) -> Vec<&'a StemRecord>
where
    I: IntoIterator<Item = &'a StemRecord>,
{
    let mut candidates: Vec<&StemRecord> = records
        .into_iter()
        .filter(|r| r.role == role && is_within_tolerance(r.native_bpm, target_bpm, tolerance_pct))
        .collect();

    candidates.sort_by(|a, b| {
        let da = (a.native_bpm - target_bpm).abs();
        let db = (b.native_bpm - target_bpm).abs();
        da.total_cmp(&db).then_with(|| a.song_id.cmp(&b.song_id))
    });
    candidates
}

/// Vocal candidates other than `exclude`, widening the tolerance once when
/// nothing fits
///
/// The currently playing vocal is excluded before the emptiness check, so a
/// pool holding only that vocal still widens. Widening multiplies the
/// tolerance: a tolerance of 0 stays an exact-match search and never widens.
/// Returns the candidates and the tolerance that produced them.
pub fn select_vocal_candidates<'a, I>(
    records: I,
    target_bpm: f64,
    tolerance_pct: f64,
    widen_factor: f64,
    exclude: Option<&str>,
) -> Result<(Vec<&'a StemRecord>, f64), SelectionError>
where
    I: IntoIterator<Item = &'a StemRecord> + Clone,
{
    let search = |tolerance: f64| {
        let mut candidates =
            select_candidates(records.clone(), StemRole::Vocals, target_bpm, tolerance);
        candidates.retain(|r| exclude != Some(r.song_id.as_str()));
        candidates
    };

    let candidates = search(tolerance_pct);
    if !candidates.is_empty() {
        return Ok((candidates, tolerance_pct));
    }

    let widened = tolerance_pct.max(0.0) * widen_factor.max(1.0);
    if widened > tolerance_pct {
        log::info!(
            "Selector: no vocal within {:.1}%, widening to {:.1}%",
            tolerance_pct,
            widened
        );
        let candidates = search(widened);
        if !candidates.is_empty() {
            return Ok((candidates, widened));
        }
    }

    Err(SelectionError::NoCompatibleVocal {
        target_bpm,
        tolerance_pct: widened.max(tolerance_pct),
    })
}

/// Weighted random pick, excluding `exclude` (by song id)
///
/// Weight is `1 / (1 + |bpm - target|)`. Returns None when the exclusion
/// leaves no candidate.
pub fn pick_random_weighted<'a, R: Rng + ?Sized>(
    candidates: &[&'a StemRecord],
    target_bpm: f64,
    exclude: Option<&str>,
    rng: &mut R,
) -> Option<&'a StemRecord> {
    let pool: Vec<&StemRecord> = candidates
        .iter()
        .copied()
        .filter(|r| exclude != Some(r.song_id.as_str()))
        .collect();

    match pool.len() {
        0 => None,
        1 => Some(pool[0]),
        _ => {
            let weights = pool
                .iter()
                .map(|r| 1.0 / (1.0 + (r.native_bpm - target_bpm).abs()));
            let dist = WeightedIndex::new(weights).ok()?;
            Some(pool[dist.sample(rng)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;
    use std::time::Duration;

    fn record(song: &str, role: StemRole, bpm: f64) -> StemRecord {
        StemRecord {
            song_id: song.to_owned(),
            role,
            native_bpm: bpm,
            sample_path: PathBuf::from(format!("{}/{}.wav", song, role)),
            duration: Duration::from_secs(180),
        }
    }

    fn ids(records: &[&StemRecord]) -> Vec<String> {
        records.iter().map(|r| r.song_id.clone()).collect()
    }

    #[test]
    fn test_tolerance_window_and_ordering() {
        // 135 is 12.5% off, 125 is 4.2%, 130 is 8.3%
        let pool = vec![
            record("far", StemRole::Vocals, 135.0),
            record("mid", StemRole::Vocals, 130.0),
            record("near", StemRole::Vocals, 125.0),
        ];
        let picked = select_candidates(&pool, StemRole::Vocals, 120.0, 10.0);
        assert_eq!(ids(&picked), vec!["near", "mid"]);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let pool = vec![
            record("low", StemRole::Bass, 108.0),
            record("high", StemRole::Bass, 132.0),
        ];
        let picked = select_candidates(&pool, StemRole::Bass, 120.0, 10.0);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_zero_tolerance_keeps_exact_match() {
        let pool = vec![record("self", StemRole::Drums, 120.0)];
        assert_eq!(select_candidates(&pool, StemRole::Drums, 120.0, 0.0).len(), 1);
        // Negative tolerance is clamped to zero
        assert_eq!(select_candidates(&pool, StemRole::Drums, 120.0, -5.0).len(), 1);
    }

    #[test]
    fn test_ties_broken_by_song_id() {
        let pool = vec![
            record("zeta", StemRole::Other, 118.0),
            record("alpha", StemRole::Other, 122.0),
            record("mu", StemRole::Other, 118.0),
        ];
        let picked = select_candidates(&pool, StemRole::Other, 120.0, 15.0);
        assert_eq!(ids(&picked), vec!["alpha", "mu", "zeta"]);
    }

    #[test]
    fn test_filters_by_role() {
        let pool = vec![
            record("a", StemRole::Bass, 120.0),
            record("a", StemRole::Vocals, 120.0),
        ];
        let picked = select_candidates(&pool, StemRole::Vocals, 120.0, 15.0);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].role, StemRole::Vocals);
    }

    #[test]
    fn test_output_sorted_and_bounded() {
        let pool: Vec<StemRecord> = (0..40)
            .map(|i| record(&format!("s{:02}", i), StemRole::Vocals, 80.0 + i as f64 * 2.5))
            .collect();
        let target = 121.0;
        let picked = select_candidates(&pool, StemRole::Vocals, target, 12.0);
        assert!(!picked.is_empty());
        for pair in picked.windows(2) {
            assert!((pair[0].native_bpm - target).abs() <= (pair[1].native_bpm - target).abs());
        }
        for r in &picked {
            assert!(r.native_bpm >= target * 0.88 && r.native_bpm <= target * 1.12);
        }
    }

    #[test]
    fn test_vocal_widening_single_retry() {
        let pool = vec![record("v", StemRole::Vocals, 145.0)];

        // 20.8% off: outside 15%, inside 30%
        let (found, tol) = select_vocal_candidates(&pool, 120.0, 15.0, 2.0, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(tol, 30.0);

        // Outside even the widened window
        let result = select_vocal_candidates(&pool, 100.0, 15.0, 2.0, None);
        assert!(matches!(result, Err(SelectionError::NoCompatibleVocal { .. })));
    }

    #[test]
    fn test_widens_when_only_current_vocal_fits() {
        let pool = vec![
            record("alpha", StemRole::Vocals, 120.0),
            record("beta", StemRole::Vocals, 145.0),
        ];

        let (found, tol) = select_vocal_candidates(&pool, 120.0, 15.0, 2.0, Some("alpha")).unwrap();
        assert_eq!(ids(&found), vec!["beta"]);
        assert_eq!(tol, 30.0);

        let (found, tol) = select_vocal_candidates(&pool, 120.0, 15.0, 2.0, None).unwrap();
        assert_eq!(ids(&found), vec!["alpha"]);
        assert_eq!(tol, 15.0);
    }

    #[test]
    fn test_zero_tolerance_never_widens() {
        let pool = vec![
            record("alpha", StemRole::Vocals, 120.0),
            record("beta", StemRole::Vocals, 121.0),
        ];
        let result = select_vocal_candidates(&pool, 120.0, 0.0, 2.0, Some("alpha"));
        assert_eq!(
            result,
            Err(SelectionError::NoCompatibleVocal {
                target_bpm: 120.0,
                tolerance_pct: 0.0,
            })
        );
    }

    #[test]
    fn test_pick_excludes_previous() {
        let pool = vec![
            record("a", StemRole::Vocals, 120.0),
            record("b", StemRole::Vocals, 121.0),
        ];
        let candidates: Vec<&StemRecord> = pool.iter().collect();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let pick = pick_random_weighted(&candidates, 120.0, Some("a"), &mut rng).unwrap();
            assert_eq!(pick.song_id, "b");
        }
    }

    #[test]
    fn test_pick_none_when_only_previous_left() {
        let pool = vec![record("a", StemRole::Vocals, 120.0)];
        let candidates: Vec<&StemRecord> = pool.iter().collect();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_random_weighted(&candidates, 120.0, Some("a"), &mut rng).is_none());
        assert!(pick_random_weighted(&candidates, 120.0, None, &mut rng).is_some());
        assert!(pick_random_weighted(&[], 120.0, None, &mut rng).is_none());
    }

    #[test]
    fn test_pick_favours_closer_bpm() {
        let pool = vec![
            record("close", StemRole::Vocals, 120.0),
            record("far", StemRole::Vocals, 137.0),
        ];
        let candidates: Vec<&StemRecord> = pool.iter().collect();
        let mut rng = StdRng::seed_from_u64(42);
        let close = (0..2000)
            .filter(|_| {
                pick_random_weighted(&candidates, 120.0, None, &mut rng).unwrap().song_id == "close"
            })
            .count();
        // Weights 1.0 vs 1/18: expect about 95% close
        assert!(close > 1700, "close picked {} times", close);
    }
}
