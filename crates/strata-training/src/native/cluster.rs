use super::{SavedModel, squared_distance};
use crate::artifacts::write_json;
use crate::error::{TrainingError, TrainingResult};
use crate::job::ClusterAlgorithm;
use crate::layout::ArtifactLayout;
use crate::trainer::{ClusterFit, ClusterRequest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

const KMEANS_RESTARTS: u64 = 3;
const KMEANS_MAX_ITER: usize = 100;
const NOISE: i64 = -1;

/// Saved clustering model: centers in the standardized feature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClusterModel {
    algorithm: ClusterAlgorithm,
    centers: Vec<Vec<f64>>,
}

pub(crate) fn fit(request: ClusterRequest, workdir: &Path) -> TrainingResult<ClusterFit> {
    let n = request.rows.len();
    if n == 0 {
        return Err(TrainingError::Trainer("no rows to cluster".to_string()));
    }

    let (model, labels, centers) = match &request.algorithm {
        ClusterAlgorithm::KMeans => {
            if request.n_clusters < 2 || request.n_clusters > n {
                return Err(TrainingError::Trainer(format!(
                    "cannot form {} clusters from {n} rows",
                    request.n_clusters
                )));
            }
            let (labels, centers) = kmeans(&request.rows, request.n_clusters, request.seed);
            ("KMeans", labels, centers)
        }
        ClusterAlgorithm::Dbscan { eps, min_samples } => {
            if *eps <= 0.0 || *min_samples == 0 {
                return Err(TrainingError::Trainer(
                    "dbscan needs a positive eps and min_samples".to_string(),
                ));
            }
            let labels = dbscan(&request.rows, *eps, *min_samples);
            let centers = centers_of(&request.rows, &labels);
            ("DBSCAN", labels, centers)
        }
    };

    let model_path = ArtifactLayout::model_path(workdir);
    write_json(
        &model_path,
        &SavedModel::Clusters(ClusterModel { algorithm: request.algorithm.clone(), centers: centers.clone() }),
    )?;

    Ok(ClusterFit { model: model.to_string(), labels, centers, model_path })
}

/// Lloyd's algorithm with k-means++ seeding; the lowest-inertia restart wins.
fn kmeans(rows: &[Vec<f64>], k: usize, seed: u64) -> (Vec<i64>, Vec<Vec<f64>>) {
    let mut best: Option<(f64, Vec<usize>, Vec<Vec<f64>>)> = None;
    for restart in 0..KMEANS_RESTARTS {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(restart));
        let mut centers = kmeans_plus_plus(rows, k, &mut rng);
        let mut assignment = vec![0usize; rows.len()];

        for _ in 0..KMEANS_MAX_ITER {
            let mut changed = false;
            for (row, slot) in rows.iter().zip(assignment.iter_mut()) {
                let nearest = closest(row, &centers).0;
                if *slot != nearest {
                    *slot = nearest;
                    changed = true;
                }
            }
            for (c, center) in centers.iter_mut().enumerate() {
                let members: Vec<&Vec<f64>> =
                    rows.iter().zip(&assignment).filter(|(_, a)| **a == c).map(|(r, _)| r).collect();
                if members.is_empty() {
                    continue;
                }
                for (j, value) in center.iter_mut().enumerate() {
                    *value = members.iter().map(|m| m[j]).sum::<f64>() / members.len() as f64;
                }
            }
            if !changed {
                break;
            }
        }

        let inertia: f64 = rows.iter().zip(&assignment).map(|(r, &a)| squared_distance(r, &centers[a])).sum();
        if best.as_ref().is_none_or(|(b, _, _)| inertia < *b) {
            best = Some((inertia, assignment, centers));
        }
    }

    best.map_or_else(
        || (vec![0; rows.len()], Vec::new()),
        |(_, assignment, centers)| (assignment.into_iter().map(|a| a as i64).collect(), centers),
    )
}

fn kmeans_plus_plus(rows: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers = vec![rows[rng.gen_range(0..rows.len())].clone()];
    while centers.len() < k {
        let weights: Vec<f64> = rows.iter().map(|r| closest(r, &centers).1).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // Fewer distinct points than clusters; duplicate an existing center.
            centers.push(rows[rng.gen_range(0..rows.len())].clone());
            continue;
        }
        let mut target = rng.gen_range(0.0..total);
        let mut chosen = rows.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if target < *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centers.push(rows[chosen].clone());
    }
    centers
}

/// Index of and squared distance to the closest center.
fn closest(row: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(row, c)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, 0.0))
}

/// Density-based clustering. Unreachable points are labelled `-1`.
fn dbscan(rows: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<i64> {
    let eps2 = eps * eps;
    let neighbours = |i: usize| -> Vec<usize> {
        (0..rows.len()).filter(|&j| squared_distance(&rows[i], &rows[j]) <= eps2).collect()
    };

    let mut labels: Vec<Option<i64>> = vec![None; rows.len()];
    let mut cluster = 0i64;
    for i in 0..rows.len() {
        if labels[i].is_some() {
            continue;
        }
        let seeds = neighbours(i);
        if seeds.len() < min_samples {
            labels[i] = Some(NOISE);
            continue;
        }
        labels[i] = Some(cluster);
        let mut queue: VecDeque<usize> = seeds.into_iter().collect();
        while let Some(j) = queue.pop_front() {
            match labels[j] {
                Some(NOISE) => labels[j] = Some(cluster),
                Some(_) => continue,
                None => {
                    labels[j] = Some(cluster);
                    let reach = neighbours(j);
                    if reach.len() >= min_samples {
                        queue.extend(reach);
                    }
                }
            }
        }
        cluster += 1;
    }
    labels.into_iter().map(|l| l.unwrap_or(NOISE)).collect()
}

/// Mean of the members of each non-noise cluster, indexed by cluster id.
fn centers_of(rows: &[Vec<f64>], labels: &[i64]) -> Vec<Vec<f64>> {
    let n_clusters = labels.iter().copied().max().map_or(0, |m| usize::try_from(m + 1).unwrap_or(0));
    let width = rows.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; width]; n_clusters];
    let mut counts = vec![0usize; n_clusters];
    for (row, &label) in rows.iter().zip(labels) {
        let Ok(c) = usize::try_from(label) else { continue };
        counts[c] += 1;
        for (s, v) in sums[c].iter_mut().zip(row) {
            *s += v;
        }
    }
    for (sum, count) in sums.iter_mut().zip(counts) {
        if count > 0 {
            sum.iter_mut().for_each(|s| *s /= count as f64);
        }
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f64>> {
        let mut rows = Vec::new();
        for i in 0..20 {
            let jitter = f64::from(i % 5) * 0.05;
            rows.push(vec![-5.0 + jitter, -5.0 - jitter]);
            rows.push(vec![5.0 - jitter, 5.0 + jitter]);
        }
        rows
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let rows = blobs();
        let fit = fit(
            ClusterRequest { rows: rows.clone(), n_clusters: 2, algorithm: ClusterAlgorithm::KMeans, seed: 42 },
            dir.path(),
        )
        .unwrap();

        assert_eq!(fit.centers.len(), 2);
        // Alternating rows come from alternating blobs.
        assert!(fit.labels.chunks(2).all(|pair| pair[0] != pair[1]));
        assert!(fit.labels.iter().step_by(2).all(|l| *l == fit.labels[0]));
        assert!(fit.model_path.exists());
    }

    #[test]
    fn test_kmeans_rejects_too_many_clusters() {
        let dir = tempfile::tempdir().unwrap();
        let request = ClusterRequest {
            rows: vec![vec![0.0], vec![1.0]],
            n_clusters: 3,
            algorithm: ClusterAlgorithm::KMeans,
            seed: 1,
        };
        assert!(fit(request, dir.path()).is_err());
    }

    #[test]
    fn test_dbscan_marks_isolated_point_as_noise() {
        let mut rows = blobs();
        rows.push(vec![0.0, 0.0]);
        let labels = dbscan(&rows, 1.0, 3);
        assert_eq!(labels.last(), Some(&NOISE));
        assert_eq!(labels.iter().filter(|l| **l >= 0).map(|l| *l).max(), Some(1));
        let centers = centers_of(&rows, &labels);
        assert_eq!(centers.len(), 2);
    }
}
