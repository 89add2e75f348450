use serde::Serialize;

use crate::align_common::*;
use crate::matcher::Match;

/// Final metrics of one alignment run. Sub-scores are omitted (not zeroed)
/// when the corresponding label kind was unavailable, and placeholder
/// metrics stay absent instead of carrying a sentinel value.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub celltype_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_score: Option<f32>,
    /// wall-clock seconds for the whole pipeline run
    pub run_time: f64,
    /// prematch rotation angle (radians), when the registrar ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_delta: Option<f32>,
    /// prematch mean squared registration error, when the registrar ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub euclidean_error: Option<f32>,
}

/// Label columns entering one scoring call. Each entry pairs sample-1 and
/// sample-2 columns of the same kind.
pub struct ScoreInputs<'a> {
    pub biology: Option<(&'a [Box<str>], &'a [Box<str>])>,
    pub topology: Option<(&'a [Box<str>], &'a [Box<str>])>,
}

pub struct Scores {
    pub global_score: f32,
    pub celltype_score: Option<f32>,
    pub region_score: Option<f32>,
}

/// Agreement scoring over matched pairs; unmatched entities never enter a
/// denominator.
///
/// The global score averages a quadratic per-match credit,
/// `((agreeing kinds) / 2)^2` when both kinds are present: a pair that is
/// simultaneously biologically and topologically consistent earns 1, a
/// pair satisfying one criterion earns 1/4, so joint consistency is
/// rewarded beyond what averaging the two sub-scores would give. With a
/// single label kind the credit degenerates to the plain agreement
/// indicator.
pub fn alignment_scores(matches: &[Match], inputs: &ScoreInputs) -> anyhow::Result<Scores> {
    if inputs.biology.is_none() && inputs.topology.is_none() {
        anyhow::bail!("no label columns supplied; nothing to score");
    }
    if matches.is_empty() {
        anyhow::bail!("empty match set; agreement is undefined");
    }

    let agree = |labels: Option<(&[Box<str>], &[Box<str>])>,
                 m: &Match|
     -> anyhow::Result<Option<bool>> {
        match labels {
            None => Ok(None),
            Some((l_1, l_2)) => {
                let a = l_1.get(m.source).ok_or_else(|| {
                    anyhow::anyhow!("match source {} out of label range", m.source)
                })?;
                let b = l_2.get(m.target).ok_or_else(|| {
                    anyhow::anyhow!("match target {} out of label range", m.target)
                })?;
                Ok(Some(a == b))
            }
        }
    };

    let mut bio_hits = 0usize;
    let mut topo_hits = 0usize;
    let mut credit = 0f64;

    for m in matches {
        let bio = agree(inputs.biology, m)?;
        let topo = agree(inputs.topology, m)?;

        if bio == Some(true) {
            bio_hits += 1;
        }
        if topo == Some(true) {
            topo_hits += 1;
        }

        credit += match (bio, topo) {
            (Some(a), Some(b)) => {
                let hits = (a as u8 + b as u8) as f64;
                (hits / 2.0).powi(2)
            }
            (Some(a), None) | (None, Some(a)) => a as u8 as f64,
            (None, None) => unreachable!("guarded above"),
        };
    }

    let nn = matches.len() as f64;
    let rate = |hits: usize| hits as f32 / matches.len() as f32;

    Ok(Scores {
        global_score: (credit / nn) as f32,
        celltype_score: inputs.biology.map(|_| rate(bio_hits)),
        region_score: inputs.topology.map(|_| rate(topo_hits)),
    })
}
