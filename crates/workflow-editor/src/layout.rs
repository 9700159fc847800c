//! Deterministic layered layout for steps without a stored position
//!
//! Steps are ranked by longest path from a source over live transitions.
//! Within a rank, steps are ordered by first appearance in a breadth-first
//! walk that starts at the start steps. Steps with no live transition at all
//! are stacked in one extra column after the last rank.
//!
//! Positions that already exist are never touched: manually placed and
//! loaded positions are authoritative.

use std::collections::{HashMap, VecDeque};

use crate::config::LayoutConfig;
use crate::error::Result;
use crate::model::GraphModel;
use crate::types::{Position, StepChanges, StepId, TransitionId, WorkflowGraph};

/// Edge of the ranking graph, by step index
#[derive(Debug, Clone, Copy)]
struct RankEdge {
    id: TransitionId,
    from: usize,
    to: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Open,
    Done,
}

/// Computes canvas positions for workflow steps
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out every step, in step insertion order
    ///
    /// The same graph (same steps, transitions and insertion order) always
    /// yields the same positions.
    pub fn compute(&self, graph: &WorkflowGraph) -> Vec<(StepId, Position)> {
        let node_count = graph.steps.len();
        let index: HashMap<StepId, usize> = graph
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.id, i))
            .collect();

        let edges: Vec<RankEdge> = graph
            .live_transitions()
            .filter_map(|t| {
                let from = *index.get(&t.from_step_id)?;
                let to = *index.get(&t.to_step_id)?;
                (graph.steps[from].is_live() && graph.steps[to].is_live()).then_some(RankEdge {
                    id: t.id,
                    from,
                    to,
                })
            })
            .collect();

        let mut connected = vec![false; node_count];
        for edge in &edges {
            connected[edge.from] = true;
            connected[edge.to] = true;
        }

        let mut active = vec![true; edges.len()];
        while let Some(cycle) = find_cycle(node_count, &edges, &active) {
            if let Some(&ignored) = cycle.iter().max_by_key(|&&e| edges[e].id) {
                log::debug!(
                    "Ignoring transition '{}' for ranking to break a cycle",
                    edges[ignored].id
                );
                active[ignored] = false;
            }
        }

        let adjacency = adjacency(node_count, &edges, &active);
        let ranks = longest_path_ranks(node_count, &edges, &active, &adjacency);

        // Breadth-first order: start steps, then other sources, then anything
        // left (nodes only reachable through ignored cycle edges).
        let mut in_degree = vec![0usize; node_count];
        for &edge in adjacency.iter().flatten() {
            in_degree[edges[edge].to] += 1;
        }
        let starts = (0..node_count).filter(|&i| {
            let step = &graph.steps[i];
            connected[i] && step.is_start && step.is_live()
        });
        let sources = (0..node_count).filter(|&i| connected[i] && in_degree[i] == 0);
        let rest = (0..node_count).filter(|&i| connected[i]);

        let mut seen = vec![false; node_count];
        let mut visit_order = Vec::with_capacity(node_count);
        let mut queue = VecDeque::new();
        for seed in starts.chain(sources).chain(rest) {
            if seen[seed] {
                continue;
            }
            seen[seed] = true;
            queue.push_back(seed);
            while let Some(node) = queue.pop_front() {
                visit_order.push(node);
                for &edge in &adjacency[node] {
                    let next = edges[edge].to;
                    if !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }

        let mut positions: Vec<Position> = vec![Position::default(); node_count];
        let mut rank_fill: Vec<usize> = Vec::new();
        for &node in &visit_order {
            let rank = ranks[node];
            if rank_fill.len() <= rank {
                rank_fill.resize(rank + 1, 0);
            }
            positions[node] = self.place(rank, rank_fill[rank]);
            rank_fill[rank] += 1;
        }

        let loose_rank = rank_fill.len();
        let mut loose_fill = 0;
        for node in (0..node_count).filter(|&i| !connected[i]) {
            positions[node] = self.place(loose_rank, loose_fill);
            loose_fill += 1;
        }

        graph
            .steps
            .iter()
            .zip(positions)
            .map(|(step, position)| (step.id, position))
            .collect()
    }

    /// Positions for the steps that do not have one yet
    pub fn fill_missing(&self, graph: &WorkflowGraph) -> Vec<(StepId, Position)> {
        if graph.steps.iter().all(|s| s.position.is_some()) {
            return Vec::new();
        }

        self.compute(graph)
            .into_iter()
            .zip(&graph.steps)
            .filter(|(_, step)| step.position.is_none())
            .map(|(placed, _)| placed)
            .collect()
    }

    /// Write positions into the model for every unpositioned step
    ///
    /// Returns the number of steps placed.
    pub fn apply(&self, model: &mut GraphModel) -> Result<usize> {
        let placed = self.fill_missing(model.graph());
        for (id, position) in &placed {
            model.update_step(id, StepChanges::position(*position))?;
        }
        if !placed.is_empty() {
            log::debug!("Laid out {} unpositioned steps", placed.len());
        }
        Ok(placed.len())
    }

    fn place(&self, rank: usize, order: usize) -> Position {
        Position::new(
            rank as f64 * self.config.rank_spacing,
            order as f64 * self.config.node_spacing,
        )
    }
}

fn adjacency(node_count: usize, edges: &[RankEdge], active: &[bool]) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); node_count];
    for (i, edge) in edges.iter().enumerate() {
        if active[i] {
            adjacency[edge.from].push(i);
        }
    }
    adjacency
}

/// Find one cycle among the active edges, as a list of edge indices
///
/// Depth-first in node insertion order, so the cycle found is deterministic.
fn find_cycle(node_count: usize, edges: &[RankEdge], active: &[bool]) -> Option<Vec<usize>> {
    let adjacency = adjacency(node_count, edges, active);
    let mut state = vec![Visit::New; node_count];
    let mut entered_by: Vec<Option<usize>> = vec![None; node_count];

    for root in 0..node_count {
        if state[root] != Visit::New {
            continue;
        }
        state[root] = Visit::Open;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let Some(&edge) = adjacency[node].get(frame.1) else {
                state[node] = Visit::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;

            let next = edges[edge].to;
            match state[next] {
                Visit::New => {
                    state[next] = Visit::Open;
                    entered_by[next] = Some(edge);
                    stack.push((next, 0));
                }
                Visit::Open => {
                    let mut cycle = vec![edge];
                    let mut cursor = node;
                    while cursor != next {
                        let back = entered_by[cursor]?;
                        cycle.push(back);
                        cursor = edges[back].from;
                    }
                    return Some(cycle);
                }
                Visit::Done => {}
            }
        }
    }
    None
}

/// Longest-path ranks over an acyclic set of active edges (Kahn's algorithm)
fn longest_path_ranks(
    node_count: usize,
    edges: &[RankEdge],
    active: &[bool],
    adjacency: &[Vec<usize>],
) -> Vec<usize> {
    let mut in_degree = vec![0usize; node_count];
    for (i, edge) in edges.iter().enumerate() {
        if active[i] {
            in_degree[edge.to] += 1;
        }
    }

    let mut ranks = vec![0usize; node_count];
    let mut queue: VecDeque<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
    while let Some(node) = queue.pop_front() {
        for &edge in &adjacency[node] {
            let next = edges[edge].to;
            ranks[next] = ranks[next].max(ranks[node] + 1);
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::types::{EntityId, StepDraft};

    fn engine() -> LayoutEngine {
        LayoutEngine::new(LayoutConfig {
            rank_spacing: 100.0,
            node_spacing: 10.0,
        })
    }

    fn position_of(layout: &[(StepId, Position)], id: u64) -> Position {
        layout
            .iter()
            .find(|(step, _)| *step == EntityId::Permanent(id))
            .map(|(_, p)| *p)
            .unwrap()
    }

    #[test]
    fn test_linear_chain_ranks() {
        let graph = GraphBuilder::new()
            .start_step(1, "A")
            .step(2, "B")
            .step(3, "C")
            .transition(10, 1, 2)
            .transition(11, 2, 3)
            .build();

        let layout = engine().compute(&graph);
        assert_eq!(position_of(&layout, 1), Position::new(0.0, 0.0));
        assert_eq!(position_of(&layout, 2), Position::new(100.0, 0.0));
        assert_eq!(position_of(&layout, 3), Position::new(200.0, 0.0));
    }

    #[test]
    fn test_longest_path_wins() {
        // 1 -> 2 -> 3 and 1 -> 3: step 3 sits at rank 2, not 1
        let graph = GraphBuilder::new()
            .start_step(1, "A")
            .step(2, "B")
            .step(3, "C")
            .transition(10, 1, 3)
            .transition(11, 1, 2)
            .transition(12, 2, 3)
            .build();

        let layout = engine().compute(&graph);
        assert_eq!(position_of(&layout, 3).x, 200.0);
    }

    #[test]
    fn test_rank_order_follows_breadth_first_discovery() {
        // Start fans out to 3 then 2 (transition order), so 3 is above 2
        let graph = GraphBuilder::new()
            .start_step(1, "Start")
            .step(2, "Left")
            .step(3, "Right")
            .transition(10, 1, 3)
            .transition(11, 1, 2)
            .build();

        let layout = engine().compute(&graph);
        assert_eq!(position_of(&layout, 3), Position::new(100.0, 0.0));
        assert_eq!(position_of(&layout, 2), Position::new(100.0, 10.0));
    }

    #[test]
    fn test_disconnected_steps_stack_after_last_rank() {
        let graph = GraphBuilder::new()
            .step(5, "Loose 1")
            .start_step(1, "A")
            .step(2, "B")
            .step(6, "Loose 2")
            .transition(10, 1, 2)
            .build();

        let layout = engine().compute(&graph);
        assert_eq!(position_of(&layout, 5), Position::new(200.0, 0.0));
        assert_eq!(position_of(&layout, 6), Position::new(200.0, 10.0));
    }

    #[test]
    fn test_empty_graph() {
        assert!(engine().compute(&WorkflowGraph::new()).is_empty());
    }

    #[test]
    fn test_cycle_does_not_crash_and_ignores_highest_edge() {
        // 1 -> 2 -> 3 -> 1; edge 12 (3 -> 1) is ignored for ranking
        let graph = GraphBuilder::new()
            .start_step(1, "A")
            .step(2, "B")
            .step(3, "C")
            .transition(10, 1, 2)
            .transition(11, 2, 3)
            .transition(12, 3, 1)
            .build();

        let layout = engine().compute(&graph);
        assert_eq!(position_of(&layout, 1).x, 0.0);
        assert_eq!(position_of(&layout, 2).x, 100.0);
        assert_eq!(position_of(&layout, 3).x, 200.0);
        assert_eq!(graph.transitions.len(), 3);
    }

    #[test]
    fn test_self_loop_is_ignored() {
        let graph = GraphBuilder::new()
            .start_step(1, "A")
            .step(2, "B")
            .transition(10, 1, 2)
            .transition(11, 2, 2)
            .build();

        let layout = engine().compute(&graph);
        assert_eq!(position_of(&layout, 2).x, 100.0);
    }

    #[test]
    fn test_deleted_transitions_are_ignored() {
        let mut graph = GraphBuilder::new()
            .start_step(1, "A")
            .step(2, "B")
            .transition(10, 1, 2)
            .build();
        graph.transitions[0].marked_for_deletion = true;

        let layout = engine().compute(&graph);
        // Both steps are now disconnected: one column, insertion order
        assert_eq!(position_of(&layout, 1), Position::new(0.0, 0.0));
        assert_eq!(position_of(&layout, 2), Position::new(0.0, 10.0));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let graph = GraphBuilder::new()
            .start_step(1, "A")
            .step(2, "B")
            .step(3, "C")
            .step(4, "D")
            .step(7, "E")
            .transition(10, 1, 2)
            .transition(11, 1, 3)
            .transition(12, 3, 4)
            .transition(13, 4, 3)
            .transition(14, 2, 4)
            .build();

        let engine = engine();
        assert_eq!(engine.compute(&graph), engine.compute(&graph));
    }

    #[test]
    fn test_fill_missing_keeps_existing_positions() {
        let graph = GraphBuilder::new()
            .start_step(1, "A")
            .at(42.0, 17.0)
            .step(2, "B")
            .transition(10, 1, 2)
            .build();

        let placed = engine().fill_missing(&graph);
        assert_eq!(placed, vec![(EntityId::Permanent(2), Position::new(100.0, 0.0))]);
    }

    #[test]
    fn test_apply_writes_into_model() {
        let mut model = GraphModel::new();
        let placed_id = model.add_step(StepDraft::named("Start").start());
        model.add_step(StepDraft::named("Manual").at(1.0, 2.0));

        let count = engine().apply(&mut model).unwrap();
        assert_eq!(count, 1);
        assert!(model.graph().steps.iter().all(|s| s.position.is_some()));
        assert_eq!(
            model.graph().find_step(&placed_id).unwrap().position,
            Some(Position::new(0.0, 0.0))
        );
        assert_eq!(model.graph().steps[1].position, Some(Position::new(1.0, 2.0)));
    }

    mod proptests {
        use super::*;
        use crate::strategies::graph_strategy;
        use proptest::prelude::*;
        use std::collections::HashSet;

        fn x_of(layout: &[(StepId, Position)], id: &StepId) -> f64 {
            layout
                .iter()
                .find(|(step, _)| step == id)
                .map(|(_, p)| p.x)
                .unwrap()
        }

        proptest! {
            #[test]
            fn compute_is_deterministic_and_places_every_step(graph in graph_strategy()) {
                let engine = engine();
                let first = engine.compute(&graph);
                prop_assert_eq!(&first, &engine.compute(&graph));

                let ids: Vec<StepId> = first.iter().map(|(id, _)| *id).collect();
                let expected: Vec<StepId> = graph.steps.iter().map(|s| s.id).collect();
                prop_assert_eq!(ids, expected);

                let distinct: HashSet<(u64, u64)> = first
                    .iter()
                    .map(|(_, p)| (p.x.to_bits(), p.y.to_bits()))
                    .collect();
                prop_assert_eq!(distinct.len(), graph.steps.len());
            }

            #[test]
            fn forward_edges_point_right(mut graph in graph_strategy()) {
                graph
                    .transitions
                    .retain(|t| t.from_step_id.as_permanent() < t.to_step_id.as_permanent());

                let layout = engine().compute(&graph);
                for transition in &graph.transitions {
                    prop_assert!(
                        x_of(&layout, &transition.from_step_id)
                            < x_of(&layout, &transition.to_step_id)
                    );
                }
            }
        }
    }
}
