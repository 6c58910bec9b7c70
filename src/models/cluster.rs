//! Clustering: k-means, DBSCAN and agglomerative linkage.
//!
//! Label conventions follow the usual ones: k-means and agglomerative assign
//! 0..k-1, DBSCAN assigns -1 to noise points.

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iter: usize,
    pub random_state: u64,
    pub centroids: Option<Array2<f64>>,
    labels: Vec<i64>,
    pub is_fitted: bool,
}

impl KMeans {
    pub fn new(n_clusters: usize, random_state: u64) -> Self {
        Self {
            n_clusters: n_clusters.max(1),
            max_iter: 300,
            random_state,
            centroids: None,
            labels: Vec::new(),
            is_fitted: false,
        }
    }

    /// k-means++ seeding: each next center is drawn proportionally to the
    /// squared distance from the nearest chosen center.
    fn init_centroids(rows: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
        let n = rows.len();
        let mut centroids = Vec::with_capacity(k);
        centroids.push(rows[rng.gen_range(0..n)].clone());

        while centroids.len() < k {
            let dists: Vec<f64> = rows
                .iter()
                .map(|row| {
                    centroids
                        .iter()
                        .map(|c| sq_dist(row, c))
                        .fold(f64::MAX, f64::min)
                })
                .collect();
            let total: f64 = dists.iter().sum();
            if total <= 0.0 {
                centroids.push(rows[rng.gen_range(0..n)].clone());
                continue;
            }
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = n - 1;
            for (i, &d) in dists.iter().enumerate() {
                target -= d;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            centroids.push(rows[chosen].clone());
        }
        centroids
    }

    pub fn fit_predict(&mut self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let n = x.nrows();
        if n == 0 {
            return Err(StudioError::TrainingError(
                "Cannot cluster an empty matrix".to_string(),
            ));
        }
        let k = self.n_clusters.min(n);
        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);

        let mut centroids = Self::init_centroids(&rows, k, &mut rng);
        let mut labels = vec![0i64; n];

        for _ in 0..self.max_iter {
            let mut moved = false;
            for (i, row) in rows.iter().enumerate() {
                let mut best = 0;
                let mut best_d = f64::MAX;
                for (c, centroid) in centroids.iter().enumerate() {
                    let d = sq_dist(row, centroid);
                    if d < best_d {
                        best_d = d;
                        best = c;
                    }
                }
                if labels[i] != best as i64 {
                    labels[i] = best as i64;
                    moved = true;
                }
            }
            if !moved {
                break;
            }
            for (c, centroid) in centroids.iter_mut().enumerate() {
                let members: Vec<&Vec<f64>> = rows
                    .iter()
                    .zip(labels.iter())
                    .filter(|(_, &l)| l == c as i64)
                    .map(|(r, _)| r)
                    .collect();
                if members.is_empty() {
                    continue;
                }
                for (j, v) in centroid.iter_mut().enumerate() {
                    *v = members.iter().map(|m| m[j]).sum::<f64>() / members.len() as f64;
                }
            }
        }

        let mut centroid_arr = Array2::zeros((k, x.ncols()));
        for (c, centroid) in centroids.iter().enumerate() {
            for (j, &v) in centroid.iter().enumerate() {
                centroid_arr[[c, j]] = v;
            }
        }
        self.centroids = Some(centroid_arr);
        self.labels = labels.clone();
        self.is_fitted = true;
        Ok(Array1::from_vec(labels))
    }

    /// Nearest-centroid assignment for new points.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let centroids = self.centroids.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let labels = x
            .rows()
            .into_iter()
            .map(|row| {
                let slice = row.to_vec();
                let mut best = 0i64;
                let mut best_d = f64::MAX;
                for (c, centroid) in centroids.rows().into_iter().enumerate() {
                    let d = sq_dist(&slice, &centroid.to_vec());
                    if d < best_d {
                        best_d = d;
                        best = c as i64;
                    }
                }
                best
            })
            .collect();
        Ok(Array1::from_vec(labels))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dbscan {
    pub eps: f64,
    pub min_samples: usize,
    labels: Vec<i64>,
    pub is_fitted: bool,
}

impl Dbscan {
    pub fn new(eps: f64) -> Self {
        Self {
            eps,
            min_samples: 5,
            labels: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit_predict(&mut self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let n = x.nrows();
        if n == 0 {
            return Err(StudioError::TrainingError(
                "Cannot cluster an empty matrix".to_string(),
            ));
        }
        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        let eps_sq = self.eps * self.eps;

        let neighbors = |i: usize| -> Vec<usize> {
            rows.iter()
                .enumerate()
                .filter(|(j, row)| *j != i && sq_dist(&rows[i], row) <= eps_sq)
                .map(|(j, _)| j)
                .collect()
        };

        const UNVISITED: i64 = -2;
        const NOISE: i64 = -1;
        let mut labels = vec![UNVISITED; n];
        let mut cluster = 0i64;

        for i in 0..n {
            if labels[i] != UNVISITED {
                continue;
            }
            let nbrs = neighbors(i);
            // The point itself counts toward min_samples
            if nbrs.len() + 1 < self.min_samples {
                labels[i] = NOISE;
                continue;
            }
            labels[i] = cluster;
            let mut queue: Vec<usize> = nbrs;
            let mut qi = 0;
            while qi < queue.len() {
                let j = queue[qi];
                qi += 1;
                if labels[j] == NOISE {
                    labels[j] = cluster;
                }
                if labels[j] != UNVISITED {
                    continue;
                }
                labels[j] = cluster;
                let j_nbrs = neighbors(j);
                if j_nbrs.len() + 1 >= self.min_samples {
                    queue.extend(j_nbrs);
                }
            }
            cluster += 1;
        }

        self.labels = labels.clone();
        self.is_fitted = true;
        Ok(Array1::from_vec(labels))
    }
}

/// Bottom-up single-linkage clustering merged down to `n_clusters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agglomerative {
    pub n_clusters: usize,
    labels: Vec<i64>,
    pub is_fitted: bool,
}

impl Agglomerative {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters: n_clusters.max(1),
            labels: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit_predict(&mut self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let n = x.nrows();
        if n == 0 {
            return Err(StudioError::TrainingError(
                "Cannot cluster an empty matrix".to_string(),
            ));
        }
        let target = self.n_clusters.min(n);
        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();

        // Each point starts as its own cluster
        let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

        while members.len() > target {
            let mut best = (0, 1);
            let mut best_d = f64::MAX;
            for a in 0..members.len() {
                for b in (a + 1)..members.len() {
                    let mut d = f64::MAX;
                    for &i in &members[a] {
                        for &j in &members[b] {
                            let dd = sq_dist(&rows[i], &rows[j]);
                            if dd < d {
                                d = dd;
                            }
                        }
                    }
                    if d < best_d {
                        best_d = d;
                        best = (a, b);
                    }
                }
            }
            let merged = members.remove(best.1);
            members[best.0].extend(merged);
        }

        let mut labels = vec![0i64; n];
        for (c, cluster) in members.iter().enumerate() {
            for &i in cluster {
                labels[i] = c as i64;
            }
        }
        self.labels = labels.clone();
        self.is_fitted = true;
        Ok(Array1::from_vec(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0], [0.2, 0.1], [0.1, 0.2], [0.3, 0.3],
            [8.0, 8.0], [8.2, 8.1], [8.1, 8.2], [8.3, 8.3]
        ]
    }

    #[test]
    fn test_kmeans_two_blobs() {
        let x = two_blobs();
        let mut km = KMeans::new(2, 42);
        let labels = km.fit_predict(&x).unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn test_kmeans_deterministic() {
        let x = two_blobs();
        let mut a = KMeans::new(2, 42);
        let mut b = KMeans::new(2, 42);
        assert_eq!(a.fit_predict(&x).unwrap(), b.fit_predict(&x).unwrap());
    }

    #[test]
    fn test_kmeans_k_capped_at_samples() {
        let x = array![[1.0], [2.0]];
        let mut km = KMeans::new(10, 42);
        let labels = km.fit_predict(&x).unwrap();
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_dbscan_labels_noise() {
        let mut x_rows: Vec<[f64; 2]> = Vec::new();
        for i in 0..6 {
            x_rows.push([i as f64 * 0.1, 0.0]);
        }
        x_rows.push([50.0, 50.0]); // isolated point
        let x = Array2::from_shape_fn((7, 2), |(i, j)| x_rows[i][j]);
        let mut db = Dbscan::new(0.3);
        let labels = db.fit_predict(&x).unwrap();
        assert_eq!(labels[6], -1);
        assert_eq!(labels[0], 0);
    }

    #[test]
    fn test_dbscan_all_noise_when_sparse() {
        let x = array![[0.0], [10.0], [20.0], [30.0]];
        let mut db = Dbscan::new(0.5);
        let labels = db.fit_predict(&x).unwrap();
        assert!(labels.iter().all(|&l| l == -1));
    }

    #[test]
    fn test_agglomerative_merges_to_k() {
        let x = two_blobs();
        let mut agg = Agglomerative::new(2);
        let labels = agg.fit_predict(&x).unwrap();
        let distinct: std::collections::HashSet<i64> = labels.iter().cloned().collect();
        assert_eq!(distinct.len(), 2);
        assert_eq!(labels[0], labels[3]);
        assert_eq!(labels[4], labels[7]);
    }
}
