use crate::align_common::*;
use crate::config::MatchMode;

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub source: usize,
    pub target: usize,
    /// matching probability, in [0, 1]
    pub confidence: f32,
}

/// Discrete correspondences plus explicit bookkeeping of entities left
/// without a partner; a size mismatch is never silently truncated.
#[derive(Debug, Clone)]
pub struct MatchSet {
    pub matches: Vec<Match>,
    pub unmatched_source: Vec<usize>,
    pub unmatched_target: Vec<usize>,
}

pub struct MatcherArgs {
    pub temperature: f32,
    pub mode: MatchMode,
}

/// Per-source matching probabilities between two embedding matrices.
///
/// Similarity is the negative squared Euclidean distance scaled by the
/// temperature; a numerically stable softmax turns each source row into a
/// distribution over all targets (rows sum to 1).
pub fn match_probabilities(
    z_1: &Mat,
    z_2: &Mat,
    temperature: f32,
) -> anyhow::Result<Mat> {
    if temperature <= 0.0 {
        anyhow::bail!("temperature must be positive, got {}", temperature);
    }

    let mut prob = row_sq_distances(z_1, z_2)?;

    for mut row in prob.row_iter_mut() {
        let mut max_logit = f32::NEG_INFINITY;
        for x in row.iter_mut() {
            *x = -*x / temperature;
            max_logit = max_logit.max(*x);
        }
        let mut denom = 0.0;
        for x in row.iter_mut() {
            *x = (*x - max_logit).exp();
            denom += *x;
        }
        row /= denom;
    }
    Ok(prob)
}

/// Derive discrete matches from a probability matrix. Deterministic given
/// identical inputs: all ties resolve by the lower index.
pub fn derive_matches(prob: &Mat, mode: MatchMode) -> MatchSet {
    match mode {
        MatchMode::BestPerSource => best_per_source(prob),
        MatchMode::OneToOne => one_to_one(prob),
    }
}

fn best_per_source(prob: &Mat) -> MatchSet {
    let mut matches = Vec::with_capacity(prob.nrows());
    let mut target_used = vec![false; prob.ncols()];

    for i in 0..prob.nrows() {
        let mut best = (0usize, f32::NEG_INFINITY);
        for j in 0..prob.ncols() {
            if prob[(i, j)] > best.1 {
                best = (j, prob[(i, j)]);
            }
        }
        target_used[best.0] = true;
        matches.push(Match {
            source: i,
            target: best.0,
            confidence: best.1,
        });
    }

    let unmatched_target = (0..prob.ncols()).filter(|&j| !target_used[j]).collect();

    MatchSet {
        matches,
        unmatched_source: vec![],
        unmatched_target,
    }
}

fn one_to_one(prob: &Mat) -> MatchSet {
    let (n_1, n_2) = (prob.nrows(), prob.ncols());

    let mut candidates: Vec<(usize, usize)> = (0..n_1)
        .flat_map(|i| (0..n_2).map(move |j| (i, j)))
        .collect();

    // highest probability first; ties by (source, target) index
    candidates.sort_unstable_by(|&(i1, j1), &(i2, j2)| {
        prob[(i2, j2)]
            .partial_cmp(&prob[(i1, j1)])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then((i1, j1).cmp(&(i2, j2)))
    });

    let mut source_used = vec![false; n_1];
    let mut target_used = vec![false; n_2];
    let mut matches = vec![];

    for (i, j) in candidates {
        if source_used[i] || target_used[j] {
            continue;
        }
        source_used[i] = true;
        target_used[j] = true;
        matches.push(Match {
            source: i,
            target: j,
            confidence: prob[(i, j)],
        });
        if matches.len() == n_1.min(n_2) {
            break;
        }
    }

    matches.sort_by_key(|m| m.source);

    MatchSet {
        matches,
        unmatched_source: (0..n_1).filter(|&i| !source_used[i]).collect(),
        unmatched_target: (0..n_2).filter(|&j| !target_used[j]).collect(),
    }
}

/// Probabilities + discrete matches in one call.
pub fn align_embeddings(
    z_1: &Mat,
    z_2: &Mat,
    args: &MatcherArgs,
) -> anyhow::Result<(Mat, MatchSet)> {
    let prob = match_probabilities(z_1, z_2, args.temperature)?;
    let matches = derive_matches(&prob, args.mode);

    info!(
        "{} matches, {} unmatched sources, {} unmatched targets",
        matches.matches.len(),
        matches.unmatched_source.len(),
        matches.unmatched_target.len()
    );
    Ok((prob, matches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn embeddings() -> (Mat, Mat) {
        let z_1 = Mat::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let z_2 = Mat::from_row_slice(3, 2, &[0.1, 0.0, 1.1, 0.0, 0.0, 1.1]);
        (z_1, z_2)
    }

    #[test]
    fn test_rows_sum_to_one() -> anyhow::Result<()> {
        let (z_1, z_2) = embeddings();
        let prob = match_probabilities(&z_1, &z_2, 0.5)?;

        for i in 0..prob.nrows() {
            let total: f32 = (0..prob.ncols()).map(|j| prob[(i, j)]).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_best_match_is_nearest_neighbor() -> anyhow::Result<()> {
        let (z_1, z_2) = embeddings();
        let prob = match_probabilities(&z_1, &z_2, 0.1)?;
        let matched = derive_matches(&prob, MatchMode::BestPerSource);

        for m in &matched.matches {
            // nearest target row in embedding space
            let mut nearest = (0usize, f32::INFINITY);
            for j in 0..z_2.nrows() {
                let d2 = (z_1.row(m.source) - z_2.row(j)).norm_squared();
                if d2 < nearest.1 {
                    nearest = (j, d2);
                }
            }
            assert_eq!(m.target, nearest.0);
            assert!(m.confidence >= 0.0 && m.confidence <= 1.0);
        }
        Ok(())
    }

    #[test]
    fn test_one_to_one_unequal_sizes_explicit() -> anyhow::Result<()> {
        let z_1 = Mat::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 0.0]);
        let z_2 = Mat::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 5.0, 5.0, 6.0, 6.0]);

        let prob = match_probabilities(&z_1, &z_2, 0.1)?;
        let matched = derive_matches(&prob, MatchMode::OneToOne);

        assert_eq!(matched.matches.len(), 2);
        assert!(matched.unmatched_source.is_empty());
        assert_eq!(matched.unmatched_target, vec![2, 3]);

        // no target repeats
        let mut targets: Vec<usize> = matched.matches.iter().map(|m| m.target).collect();
        targets.sort_unstable();
        targets.dedup();
        assert_eq!(targets.len(), matched.matches.len());
        Ok(())
    }

    #[test]
    fn test_deterministic() -> anyhow::Result<()> {
        let (z_1, z_2) = embeddings();
        let a = align_embeddings(
            &z_1,
            &z_2,
            &MatcherArgs {
                temperature: 0.2,
                mode: MatchMode::OneToOne,
            },
        )?;
        let b = align_embeddings(
            &z_1,
            &z_2,
            &MatcherArgs {
                temperature: 0.2,
                mode: MatchMode::OneToOne,
            },
        )?;
        assert_eq!(a.0, b.0);
        assert_eq!(a.1.matches, b.1.matches);
        Ok(())
    }

    #[test]
    fn test_identical_embeddings_give_identity() -> anyhow::Result<()> {
        let z = Mat::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let prob = match_probabilities(&z, &z, 0.05)?;
        let matched = derive_matches(&prob, MatchMode::BestPerSource);

        for m in &matched.matches {
            assert_eq!(m.source, m.target);
        }
        Ok(())
    }
}
