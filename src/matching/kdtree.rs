//! Randomized kd-forest for approximate nearest-neighbour search.
//!
//! Each tree splits on a dimension drawn at random from the few with the
//! highest variance, at the mean of that dimension. A query descends every
//! tree once and then explores the remaining branches of all trees from one
//! shared priority queue, closest cut first, until `checks` leaf points have
//! been compared.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Points used to estimate per-dimension mean and variance at a split.
const SAMPLE_MEAN: usize = 100;
/// Split dimension is drawn from this many highest-variance dimensions.
const RAND_DIM: usize = 5;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        indices: Vec<usize>,
    },
    Split {
        dim: usize,
        value: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct KdTree {
    nodes: Vec<Node>,
    root: usize,
}

/// Branch waiting in the priority queue, ordered by ascending `dist`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Branch {
    dist: f32,
    tree: usize,
    node: usize,
}

impl Eq for Branch {}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed to turn the max-heap into a min-heap.
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `k` best candidates seen so far, sorted by squared distance.
struct KnnResults {
    k: usize,
    items: Vec<(f32, usize)>,
}

impl KnnResults {
    fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k + 1),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    fn worst(&self) -> f32 {
        if self.is_full() {
            self.items.last().map_or(f32::INFINITY, |item| item.0)
        } else {
            f32::INFINITY
        }
    }

    fn insert(&mut self, dist: f32, idx: usize) {
        if dist >= self.worst() {
            return;
        }
        let pos = self.items.partition_point(|item| item.0 <= dist);
        self.items.insert(pos, (dist, idx));
        self.items.truncate(self.k);
    }
}

struct SearchState<'q> {
    query: ArrayView1<'q, f32>,
    heap: BinaryHeap<Branch>,
    checked: Vec<bool>,
    checks: usize,
    max_checks: usize,
    results: KnnResults,
}

/// Approximate nearest-neighbour index over the rows of a descriptor matrix.
pub struct KdForest<'a> {
    data: ArrayView2<'a, f32>,
    trees: Vec<KdTree>,
}

impl<'a> KdForest<'a> {
    pub fn build(data: ArrayView2<'a, f32>, trees: usize, leaf_size: usize, seed: u64) -> Self {
        let leaf_size = leaf_size.max(1);
        let built = (0..trees.max(1))
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let mut indices: Vec<usize> = (0..data.nrows()).collect();
                indices.shuffle(&mut rng);

                let mut tree = KdTree {
                    nodes: Vec::new(),
                    root: 0,
                };
                tree.root = build_node(&mut tree.nodes, data, &mut indices, leaf_size, &mut rng);
                tree
            })
            .collect();

        Self { data, trees: built }
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Up to `k` approximate nearest rows as `(index, squared distance)`,
    /// closest first.
    pub fn knn(&self, query: ArrayView1<f32>, k: usize, max_checks: usize) -> Vec<(usize, f32)> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut state = SearchState {
            query,
            heap: BinaryHeap::new(),
            checked: vec![false; self.data.nrows()],
            checks: 0,
            max_checks: max_checks.max(k),
            results: KnnResults::new(k),
        };

        for (t, tree) in self.trees.iter().enumerate() {
            self.search_level(&mut state, t, tree.root, 0.0);
        }

        while let Some(branch) = state.heap.pop() {
            if state.checks >= state.max_checks && state.results.is_full() {
                break;
            }
            self.search_level(&mut state, branch.tree, branch.node, branch.dist);
        }

        state
            .results
            .items
            .into_iter()
            .map(|(dist, idx)| (idx, dist))
            .collect()
    }

    fn search_level(&self, state: &mut SearchState, tree: usize, mut node: usize, mindist: f32) {
        if mindist > state.results.worst() {
            return;
        }
        let nodes = &self.trees[tree].nodes;

        loop {
            match &nodes[node] {
                Node::Leaf { indices } => {
                    if state.checks >= state.max_checks && state.results.is_full() {
                        return;
                    }
                    for &idx in indices {
                        if state.checked[idx] {
                            continue;
                        }
                        state.checked[idx] = true;
                        state.checks += 1;
                        let dist = squared_distance(state.query, self.data.row(idx));
                        state.results.insert(dist, idx);
                    }
                    return;
                }
                Node::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let diff = state.query[*dim] - value;
                    let (best, other) = if diff < 0.0 {
                        (*left, *right)
                    } else {
                        (*right, *left)
                    };
                    let cut_dist = mindist + diff * diff;
                    if cut_dist < state.results.worst() {
                        state.heap.push(Branch {
                            dist: cut_dist,
                            tree,
                            node: other,
                        });
                    }
                    node = best;
                }
            }
        }
    }
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Build the subtree over `indices` and return its node id.
fn build_node(
    nodes: &mut Vec<Node>,
    data: ArrayView2<f32>,
    indices: &mut [usize],
    leaf_size: usize,
    rng: &mut StdRng,
) -> usize {
    if indices.len() <= leaf_size {
        return push_leaf(nodes, indices);
    }

    let (dim, value) = choose_split(data, indices, rng);
    let mid = partition(data, indices, dim, value);
    if mid == 0 || mid == indices.len() {
        // All points equal along every high-variance dimension.
        return push_leaf(nodes, indices);
    }

    let (lo, hi) = indices.split_at_mut(mid);
    let left = build_node(nodes, data, lo, leaf_size, rng);
    let right = build_node(nodes, data, hi, leaf_size, rng);
    nodes.push(Node::Split {
        dim,
        value,
        left,
        right,
    });
    nodes.len() - 1
}

fn push_leaf(nodes: &mut Vec<Node>, indices: &[usize]) -> usize {
    nodes.push(Node::Leaf {
        indices: indices.to_vec(),
    });
    nodes.len() - 1
}

fn choose_split(data: ArrayView2<f32>, indices: &[usize], rng: &mut StdRng) -> (usize, f32) {
    let dims = data.ncols();
    let sample = &indices[..indices.len().min(SAMPLE_MEAN)];
    let count = sample.len() as f32;

    let mut mean = vec![0.0f32; dims];
    for &i in sample {
        for (m, v) in mean.iter_mut().zip(data.row(i).iter()) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= count);

    let mut var = vec![0.0f32; dims];
    for &i in sample {
        for ((s, v), m) in var.iter_mut().zip(data.row(i).iter()).zip(&mean) {
            *s += (v - m) * (v - m);
        }
    }

    let mut order: Vec<usize> = (0..dims).collect();
    order.sort_by(|&a, &b| var[b].partial_cmp(&var[a]).unwrap_or(Ordering::Equal));
    let top = RAND_DIM.min(dims);
    let dim = order[rng.gen_range(0..top)];
    (dim, mean[dim])
}

/// Move points with `data[dim] < value` to the front; returns their count.
fn partition(data: ArrayView2<f32>, indices: &mut [usize], dim: usize, value: f32) -> usize {
    let mut mid = 0;
    for i in 0..indices.len() {
        if data[[indices[i], dim]] < value {
            indices.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::Rng;

    fn random_data(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.gen::<f32>())
    }

    fn brute_force(data: &Array2<f32>, query: ArrayView1<f32>) -> Vec<(usize, f32)> {
        let mut all: Vec<(usize, f32)> = (0..data.nrows())
            .map(|i| (i, squared_distance(query, data.row(i))))
            .collect();
        all.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        all
    }

    #[test]
    fn test_generous_checks_recover_true_neighbours() {
        let data = random_data(200, 16, 1);
        let forest = KdForest::build(data.view(), 4, 1, 7);
        let queries = random_data(20, 16, 2);

        let mut hits = 0;
        for q in queries.rows() {
            let approx = forest.knn(q, 2, data.nrows());
            let exact = brute_force(&data, q);
            assert_eq!(approx.len(), 2);
            assert!(approx[0].1 <= approx[1].1);
            assert!(approx[0].1 >= exact[0].1);
            if approx[0].0 == exact[0].0 {
                hits += 1;
            }
        }
        assert!(hits >= 18, "only {hits}/20 exact nearest neighbours");
    }

    #[test]
    fn test_query_on_indexed_point_finds_itself() {
        let data = random_data(300, 128, 3);
        let forest = KdForest::build(data.view(), 5, 1, 11);
        for i in (0..300).step_by(17) {
            let result = forest.knn(data.row(i), 2, 50);
            assert_eq!(result[0], (i, 0.0));
            assert!(result[1].1 > 0.0);
        }
    }

    #[test]
    fn test_small_and_degenerate_sets() {
        let empty = Array2::<f32>::zeros((0, 8));
        let query = ndarray::Array1::<f32>::zeros(8);
        let forest = KdForest::build(empty.view(), 5, 1, 0);
        assert!(forest.is_empty());
        assert!(forest.knn(query.view(), 2, 50).is_empty());
    }

    #[test]
    fn test_duplicates_form_a_leaf() {
        let data = Array2::from_elem((6, 4), 0.5f32);
        let forest = KdForest::build(data.view(), 2, 1, 0);
        assert_eq!(forest.len(), 6);
        let result = forest.knn(data.row(0), 2, 50);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].1, 0.0);
        assert_eq!(result[1].1, 0.0);

        let single = Array2::from_elem((1, 4), 0.25f32);
        let forest = KdForest::build(single.view(), 2, 1, 0);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest.knn(data.row(0), 2, 50), vec![(0, 0.25)]);
    }

    #[test]
    fn test_same_seed_same_answers() {
        let data = random_data(150, 32, 5);
        let queries = random_data(10, 32, 6);
        let a = KdForest::build(data.view(), 5, 1, 42);
        let b = KdForest::build(data.view(), 5, 1, 42);
        for q in queries.rows() {
            assert_eq!(a.knn(q, 2, 30), b.knn(q, 2, 30));
        }
    }
}
