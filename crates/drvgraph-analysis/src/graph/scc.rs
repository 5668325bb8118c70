//! Strongly connected components via an iterative Tarjan.
//!
//! Derivation graphs are expected to be acyclic but nothing guarantees it, and
//! dependency chains run thousands of hops deep. The DFS keeps its own stack
//! of frames (node plus a live neighbor iterator) on the heap so depth is
//! bounded by memory, not by the thread stack.
//!
//! Components are emitted in reverse topological order: a component is
//! finished only after everything it reaches. For every edge `u → v` between
//! different components, `component_of(v) < component_of(u)`.

use fixedbitset::FixedBitSet;
use petgraph::graph::{DiGraph, Neighbors, NodeIndex};

const UNVISITED: usize = usize::MAX;

/// A full SCC partition of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SccPartition {
    /// Components, sinks first. Members of each component are ascending.
    pub components: Vec<Vec<NodeIndex>>,
    /// Component id of every node, indexed by `NodeIndex::index()`.
    pub component_of: Vec<usize>,
}

impl SccPartition {
    /// Partition `graph` into strongly connected components in O(V + E).
    #[must_use]
    pub fn compute<N, E>(graph: &DiGraph<N, E>) -> Self {
        let n = graph.node_count();
        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0_usize; n];
        let mut on_stack = FixedBitSet::with_capacity(n);
        let mut stack: Vec<NodeIndex> = Vec::new();
        let mut frames: Vec<(NodeIndex, Neighbors<'_, E>)> = Vec::new();
        let mut next_index = 0_usize;

        let mut components: Vec<Vec<NodeIndex>> = Vec::new();
        let mut component_of = vec![0_usize; n];

        for start in graph.node_indices() {
            if index[start.index()] != UNVISITED {
                continue;
            }

            index[start.index()] = next_index;
            lowlink[start.index()] = next_index;
            next_index += 1;
            stack.push(start);
            on_stack.insert(start.index());
            frames.push((start, graph.neighbors(start)));

            loop {
                let Some(frame) = frames.last_mut() else {
                    break;
                };
                let node = frame.0;

                if let Some(next) = frame.1.next() {
                    let ni = next.index();
                    if index[ni] == UNVISITED {
                        index[ni] = next_index;
                        lowlink[ni] = next_index;
                        next_index += 1;
                        stack.push(next);
                        on_stack.insert(ni);
                        frames.push((next, graph.neighbors(next)));
                    } else if on_stack.contains(ni) {
                        lowlink[node.index()] = lowlink[node.index()].min(index[ni]);
                    }
                    continue;
                }

                // All neighbors of `node` explored.
                frames.pop();
                if let Some(parent) = frames.last().map(|frame| frame.0) {
                    lowlink[parent.index()] = lowlink[parent.index()].min(lowlink[node.index()]);
                }

                if lowlink[node.index()] == index[node.index()] {
                    let id = components.len();
                    let mut component = Vec::new();
                    while let Some(member) = stack.pop() {
                        on_stack.set(member.index(), false);
                        component_of[member.index()] = id;
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    component.sort_unstable();
                    components.push(component);
                }
            }
        }

        Self {
            components,
            component_of,
        }
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component id of `idx`.
    #[must_use]
    pub fn component_of(&self, idx: NodeIndex) -> usize {
        self.component_of[idx.index()]
    }

    /// Whether component `id` is a true cycle. Snapshots carry no
    /// self-loops, so only components with more than one member qualify.
    #[must_use]
    pub fn is_cyclic(&self, id: usize) -> bool {
        self.components[id].len() > 1
    }

    /// Ids of the cyclic components.
    pub fn cyclic_components(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.components.len()).filter(|&id| self.is_cyclic(id))
    }

    /// Size of the largest component (1 for an acyclic non-empty graph).
    #[must_use]
    pub fn largest(&self) -> usize {
        self.components.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Condensed DAG: for each component, the distinct components it has
    /// edges into, ascending. Every listed child id is smaller than its
    /// parent's.
    #[must_use]
    pub fn condensation<N, E>(&self, graph: &DiGraph<N, E>) -> Vec<Vec<usize>> {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.components.len()];
        for edge in graph.raw_edges() {
            let from = self.component_of[edge.source().index()];
            let to = self.component_of[edge.target().index()];
            if from != to {
                children[from].push(to);
            }
        }
        for list in &mut children {
            list.sort_unstable();
            list.dedup();
        }
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(n: usize, edges: &[(u32, u32)]) -> DiGraph<(), ()> {
        let mut graph = DiGraph::new();
        for _ in 0..n {
            graph.add_node(());
        }
        graph.extend_with_edges(edges.iter().copied());
        graph
    }

    fn member_sets(partition: &SccPartition) -> Vec<Vec<usize>> {
        let mut sets: Vec<Vec<usize>> = partition
            .components
            .iter()
            .map(|c| c.iter().map(|idx| idx.index()).collect())
            .collect();
        sets.sort();
        sets
    }

    #[test]
    fn empty_graph_has_no_components() {
        let partition = SccPartition::compute(&graph(0, &[]));
        assert!(partition.is_empty());
        assert_eq!(partition.largest(), 0);
    }

    #[test]
    fn acyclic_graph_has_singleton_components() {
        let partition = SccPartition::compute(&graph(4, &[(0, 1), (1, 2), (0, 3)]));
        assert_eq!(partition.len(), 4);
        assert_eq!(partition.cyclic_components().count(), 0);
        assert_eq!(partition.largest(), 1);
    }

    #[test]
    fn three_cycle_plus_isolated_node() {
        let partition = SccPartition::compute(&graph(4, &[(0, 1), (1, 2), (2, 0)]));
        assert_eq!(member_sets(&partition), vec![vec![0, 1, 2], vec![3]]);
        let cyclic: Vec<usize> = partition.cyclic_components().collect();
        assert_eq!(cyclic.len(), 1);
        assert_eq!(partition.components[cyclic[0]].len(), 3);
    }

    #[test]
    fn components_come_out_sinks_first() {
        // 0 → {1 ↔ 2} → 3
        let g = graph(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let partition = SccPartition::compute(&g);
        for edge in g.raw_edges() {
            let from = partition.component_of(edge.source());
            let to = partition.component_of(edge.target());
            assert!(from == to || to < from, "edge crosses components upward");
        }

        let condensed = partition.condensation(&g);
        let top = partition.component_of(NodeIndex::new(0));
        let cycle = partition.component_of(NodeIndex::new(1));
        let sink = partition.component_of(NodeIndex::new(3));
        assert_eq!(condensed[top], vec![cycle]);
        assert_eq!(condensed[cycle], vec![sink]);
        assert!(condensed[sink].is_empty());
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let n = 200_000_u32;
        let edges: Vec<(u32, u32)> = (0..n - 1).map(|i| (i, i + 1)).collect();
        let mut with_back = edges.clone();
        with_back.push((n - 1, 0));

        let chain = SccPartition::compute(&graph(n as usize, &edges));
        assert_eq!(chain.len(), n as usize);

        let ring = SccPartition::compute(&graph(n as usize, &with_back));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.largest(), n as usize);
    }

    #[test]
    fn partition_is_stable_across_runs() {
        let g = graph(6, &[(0, 1), (1, 0), (2, 3), (3, 4), (4, 2), (5, 0)]);
        let first = SccPartition::compute(&g);
        let second = SccPartition::compute(&g);
        assert_eq!(first, second);
    }
}
