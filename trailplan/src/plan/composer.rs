// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Join and juxtaposition composition of a whole MATCH graph
//!
//! Connected components are planned one at a time. Each component starts
//! from its cheapest seed and grows greedily along connections with a bound
//! endpoint. After every step the pending predicates whose dependencies are
//! bound are placed as one Filter, in textual order. Components are finally
//! combined with Cartesian products, cheapest first.

use log::{debug, trace};
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::Dfs;
use std::collections::{BTreeMap, BTreeSet};

use crate::ir::expression::Expression;
use crate::ir::match_graph::{Connection, MatchGraph};
use crate::ir::pattern::{PatternLength, PatternRelationship};
use crate::plan::attributes::PlanArena;
use crate::plan::context::PlanningContext;
use crate::plan::cost::Estimate;
use crate::plan::error::{PlanningError, PlanningResult};
use crate::plan::physical::{ExpansionMode, Operator, PlanNode};
use crate::plan::selector::{OperatorSelector, PlannedQpp, QppRequest};
use crate::plan::trace::{PlanTracer, PlanningPhase, TraceMetadata};
use crate::plan::uniqueness::{UniquenessAnalyzer, UniquenessObligation};

/// Pattern nodes and connections that share no variable with the rest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Node names, textual order
    pub nodes: Vec<String>,
    /// Connection indices, textual order
    pub connections: Vec<usize>,
}

/// Connected components of `graph` in textual order of their first node
pub fn connected_components_of(graph: &MatchGraph) -> Vec<Component> {
    let mut topology: UnGraph<usize, usize> = UnGraph::new_undirected();
    let mut indices: BTreeMap<&str, NodeIndex> = BTreeMap::new();
    for (position, node) in graph.nodes.iter().enumerate() {
        indices.insert(node.name.as_str(), topology.add_node(position));
    }
    for (position, connection) in graph.connections.iter().enumerate() {
        let (left, right) = connection.endpoints();
        if let (Some(&l), Some(&r)) = (indices.get(left), indices.get(right)) {
            topology.add_edge(l, r, position);
        }
    }
    debug!(
        "match graph has {} connected components",
        connected_components(&topology)
    );

    let mut component_of: Vec<Option<usize>> = vec![None; graph.nodes.len()];
    let mut components: Vec<Component> = Vec::new();
    for start in topology.node_indices() {
        if component_of[start.index()].is_some() {
            continue;
        }
        let id = components.len();
        let mut members = Vec::new();
        let mut dfs = Dfs::new(&topology, start);
        while let Some(visited) = dfs.next(&topology) {
            component_of[visited.index()] = Some(id);
            members.push(visited.index());
        }
        members.sort_unstable();
        components.push(Component {
            nodes: members
                .into_iter()
                .map(|i| graph.nodes[i].name.clone())
                .collect(),
            connections: Vec::new(),
        });
    }

    for (position, connection) in graph.connections.iter().enumerate() {
        let (left, _) = connection.endpoints();
        let owner = graph
            .nodes
            .iter()
            .position(|n| n.name == left)
            .and_then(|i| component_of[i]);
        if let Some(owner) = owner {
            components[owner].connections.push(position);
        }
    }
    components
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    predicate: Expression,
    dependencies: BTreeSet<String>,
    obligation: Option<usize>,
    solved: bool,
}

/// Pending predicates of one MATCH: label atoms, WHERE atoms, then
/// uniqueness obligations
#[derive(Debug, Clone)]
struct PredicateLedger {
    entries: Vec<LedgerEntry>,
    obligations: Vec<UniquenessObligation>,
}

impl PredicateLedger {
    fn new(graph: &MatchGraph, obligations: Vec<UniquenessObligation>) -> Self {
        let atoms = graph
            .predicates_in_textual_order()
            .into_iter()
            .map(|p| (p, None));
        let checks = obligations
            .iter()
            .enumerate()
            .map(|(i, o)| (o.predicate.clone(), Some(i)));
        let entries = atoms
            .chain(checks)
            .map(|(predicate, obligation)| LedgerEntry {
                dependencies: predicate.dependencies(),
                predicate,
                obligation,
                solved: false,
            })
            .collect();
        Self {
            entries,
            obligations,
        }
    }

    fn is_open(&self, index: usize, taken: &BTreeSet<usize>) -> bool {
        !self.entries[index].solved && !taken.contains(&index)
    }

    /// Open entries whose dependencies are all bound, textual order
    fn ready(&self, bound: &BTreeSet<String>, taken: &BTreeSet<usize>) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|&i| self.is_open(i, taken))
            .filter(|&i| self.entries[i].dependencies.iter().all(|d| bound.contains(d)))
            .collect()
    }

    fn locate(&self, predicate: &Expression, taken: &BTreeSet<usize>) -> Option<usize> {
        (0..self.entries.len())
            .find(|&i| self.is_open(i, taken) && self.entries[i].predicate == *predicate)
    }

    /// Open WHERE and label atoms reading only `variable`
    fn local_to(&self, variable: &str, taken: &BTreeSet<usize>) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|&i| self.is_open(i, taken) && self.entries[i].obligation.is_none())
            .filter(|&i| {
                let deps = &self.entries[i].dependencies;
                deps.len() == 1 && deps.contains(variable)
            })
            .collect()
    }

    fn mark(&mut self, indices: &BTreeSet<usize>) {
        for &i in indices {
            self.entries[i].solved = true;
        }
    }

    fn first_open(&self) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| !e.solved)
    }
}

/// A partial plan and the ledger entries it solves
#[derive(Debug, Clone)]
struct Candidate {
    plan: PlanNode,
    estimate: Estimate,
    solved: BTreeSet<usize>,
    /// Connection planned by the last step
    connection: Option<usize>,
    description: String,
}

/// Plans whole match graphs
pub struct Composer<'c, 'a> {
    ctx: &'c PlanningContext<'a>,
    selector: OperatorSelector<'c, 'a>,
}

impl<'c, 'a> Composer<'c, 'a> {
    pub fn new(ctx: &'c PlanningContext<'a>) -> Self {
        Self {
            ctx,
            selector: OperatorSelector::new(ctx),
        }
    }

    /// Plan `graph` into a single operator tree
    pub fn compose(
        &self,
        arena: &mut PlanArena,
        graph: &MatchGraph,
        tracer: &mut PlanTracer,
    ) -> PlanningResult<PlanNode> {
        let obligations = UniquenessAnalyzer::new().analyze(graph);
        let mut ledger = PredicateLedger::new(graph, obligations);

        tracer.start_step();
        let components = connected_components_of(graph);
        tracer.end_step(
            PlanningPhase::ComponentDiscovery,
            format!("{} components", components.len()),
            TraceMetadata::empty(),
        );

        let mut steps = 0usize;
        let mut planned = Vec::new();
        for component in &components {
            self.ctx.cancellation.check()?;
            let plan =
                self.plan_component(arena, graph, component, &mut ledger, &mut steps, tracer)?;
            planned.push(plan);
        }

        let root = self.combine(arena, graph, planned, &mut ledger, tracer)?;

        if let Some(entry) = ledger.first_open() {
            let bound = root.available_variables();
            return Err(PlanningError::UnsolvablePredicate {
                predicate: entry.predicate.to_string(),
                missing: entry
                    .dependencies
                    .iter()
                    .filter(|d| !bound.contains(*d))
                    .cloned()
                    .collect(),
            });
        }
        Ok(root)
    }

    fn plan_component(
        &self,
        arena: &mut PlanArena,
        graph: &MatchGraph,
        component: &Component,
        ledger: &mut PredicateLedger,
        steps: &mut usize,
        tracer: &mut PlanTracer,
    ) -> PlanningResult<Candidate> {
        tracer.start_step();
        let start = self.choose_start(arena, graph, component, ledger)?;
        debug!("component {:?} starts with {}", component.nodes, start.description);
        tracer.end_step(
            PlanningPhase::StartSelection,
            start.description.clone(),
            TraceMetadata::with_operator(start.plan.kind())
                .with_estimates(start.estimate.rows, start.estimate.cost)
                .with_scope(&start.plan.available_variables()),
        );
        ledger.mark(&start.solved);

        let mut remaining: Vec<usize> = component
            .connections
            .iter()
            .copied()
            .filter(|c| Some(*c) != start.connection)
            .collect();
        let mut current = start;

        while !remaining.is_empty() {
            *steps += 1;
            if *steps % self.ctx.config.cancellation_check_interval == 0 {
                self.ctx.cancellation.check()?;
            }

            tracer.start_step();
            let bound = current.plan.available_variables();
            let mut best: Option<(usize, Candidate)> = None;
            let mut rejected: Option<PlanningError> = None;
            for &index in &remaining {
                let connection = &graph.connections[index];
                let (left, right) = connection.endpoints();
                if !bound.contains(left) && !bound.contains(right) {
                    continue;
                }
                let candidates = self.growth_candidates(
                    arena,
                    graph,
                    index,
                    &current.plan,
                    ledger,
                    &mut rejected,
                )?;
                for candidate in candidates {
                    debug!(
                        "{}: cost={:.4} rows={:.1}",
                        candidate.description, candidate.estimate.cost, candidate.estimate.rows
                    );
                    let better = best
                        .as_ref()
                        .map_or(true, |(_, b)| candidate.estimate.cost < b.estimate.cost);
                    if better {
                        best = Some((index, candidate));
                    }
                }
            }

            let Some((index, chosen)) = best else {
                if let Some(err) = rejected {
                    return Err(err);
                }
                return Err(PlanningError::Internal(format!(
                    "no connection of component {:?} touches the bound variables",
                    component.nodes
                )));
            };
            let phase = match graph.connections[index] {
                Connection::Quantified(_) => PlanningPhase::QppSelection,
                Connection::Relationship(_) => PlanningPhase::Expansion,
            };
            tracer.end_step(
                phase,
                chosen.description.clone(),
                TraceMetadata::with_operator(chosen.plan.kind())
                    .with_estimates(chosen.estimate.rows, chosen.estimate.cost)
                    .with_scope(&chosen.plan.available_variables()),
            );
            ledger.mark(&chosen.solved);
            remaining.retain(|c| *c != index);
            current = chosen;
        }
        Ok(current)
    }

    fn choose_start(
        &self,
        arena: &mut PlanArena,
        graph: &MatchGraph,
        component: &Component,
        ledger: &PredicateLedger,
    ) -> PlanningResult<Candidate> {
        if component
            .nodes
            .iter()
            .any(|n| graph.argument_ids.contains(n))
        {
            return self.argument_start(arena, graph, ledger);
        }

        if component.connections.is_empty() {
            let variable = component.nodes.first().ok_or_else(|| {
                PlanningError::Internal("empty connected component".to_string())
            })?;
            return self.best_leaf(arena, variable, ledger, &BTreeSet::new());
        }

        let mut best: Option<Candidate> = None;
        for &index in &component.connections {
            let connection = &graph.connections[index];
            let (left, right) = connection.endpoints();

            let mut single_sided: Option<Candidate> = None;
            for endpoint in [left, right] {
                let leaf = self.best_leaf(arena, endpoint, ledger, &BTreeSet::new())?;
                let candidate = match self.expand(arena, graph, index, leaf, ledger) {
                    Ok(candidate) => candidate,
                    Err(err) if err.is_candidate_local() => {
                        debug!("start at {} via {} rejected: {}", endpoint, connection, err);
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                trace!(
                    "start candidate {}: cost={:.4}",
                    candidate.description,
                    candidate.estimate.cost
                );
                if single_sided
                    .as_ref()
                    .map_or(true, |s| candidate.estimate.cost < s.estimate.cost)
                {
                    single_sided = Some(candidate);
                }
            }

            let mut choice = single_sided;
            // A self-loop has one boundary variable, nothing to cross
            if connection.as_quantified().is_some() && left != right {
                match self.cartesian_start(arena, graph, index, ledger) {
                    Ok(cartesian) => {
                        let prefer = match &choice {
                            Some(single) => self
                                .selector
                                .prefer_cartesian(&single.estimate, &cartesian.estimate),
                            None => true,
                        };
                        if prefer {
                            debug!("{} seeded by a Cartesian product", connection);
                            choice = Some(cartesian);
                        }
                    }
                    Err(err) if err.is_candidate_local() => {
                        debug!("Cartesian seed for {} rejected: {}", connection, err);
                    }
                    Err(err) => return Err(err),
                }
            }

            if let Some(candidate) = choice {
                if best
                    .as_ref()
                    .map_or(true, |b| candidate.estimate.cost < b.estimate.cost)
                {
                    best = Some(candidate);
                }
            }
        }

        match best {
            Some(best) => Ok(best),
            None => {
                // Every seed failed; replan the first one to surface its error
                let index = component.connections[0];
                let (left, _) = graph.connections[index].endpoints();
                let leaf = self.best_leaf(arena, left, ledger, &BTreeSet::new())?;
                self.expand(arena, graph, index, leaf, ledger)
            }
        }
    }

    fn argument_start(
        &self,
        arena: &mut PlanArena,
        graph: &MatchGraph,
        ledger: &PredicateLedger,
    ) -> PlanningResult<Candidate> {
        let argument = self.ctx.finish(
            arena,
            Operator::Argument {
                variables: graph.argument_ids.iter().cloned().collect(),
            },
            Vec::new(),
        )?;
        let mut solved = BTreeSet::new();
        let plan = self.place_ready(arena, argument, ledger, &mut solved)?;
        self.candidate(plan, solved, "Argument".to_string())
    }

    /// Cheapest leaf plan for `variable` with its local predicates applied
    fn best_leaf(
        &self,
        arena: &mut PlanArena,
        variable: &str,
        ledger: &PredicateLedger,
        taken: &BTreeSet<usize>,
    ) -> PlanningResult<Candidate> {
        let local = ledger.local_to(variable, taken);
        let predicates: Vec<Expression> = local
            .iter()
            .map(|&i| ledger.entries[i].predicate.clone())
            .collect();
        let leaves = self
            .ctx
            .leaf_planner
            .leaf_plans(variable, &predicates, self.ctx.statistics)?;

        let mut best: Option<Candidate> = None;
        for leaf in leaves {
            let mut solved = taken.clone();
            for predicate in &leaf.solved {
                if let Some(index) = ledger.locate(predicate, &solved) {
                    solved.insert(index);
                }
            }
            let description = leaf.operator.describe();
            let plan = self.ctx.finish(arena, leaf.operator, leaf.solved)?;
            let plan = self.place_ready(arena, plan, ledger, &mut solved)?;
            let candidate = self.candidate(plan, solved, description)?;
            if best
                .as_ref()
                .map_or(true, |b| candidate.estimate.cost < b.estimate.cost)
            {
                best = Some(candidate);
            }
        }
        best.ok_or_else(|| {
            PlanningError::LeafPlanning(format!("no leaf plan offered for {}", variable))
        })
    }

    fn cartesian_start(
        &self,
        arena: &mut PlanArena,
        graph: &MatchGraph,
        index: usize,
        ledger: &PredicateLedger,
    ) -> PlanningResult<Candidate> {
        let (left, right) = graph.connections[index].endpoints();
        let left_leaf = self.best_leaf(arena, left, ledger, &BTreeSet::new())?;
        let right_leaf = self.best_leaf(arena, right, ledger, &left_leaf.solved)?;
        let product = self.ctx.finish(
            arena,
            Operator::CartesianProduct {
                left: Box::new(left_leaf.plan),
                right: Box::new(right_leaf.plan),
            },
            Vec::new(),
        )?;
        let seeded = Candidate {
            estimate: self.ctx.estimate(&product)?,
            plan: product,
            solved: right_leaf.solved,
            connection: None,
            description: format!("{} x {}", left, right),
        };
        self.expand(arena, graph, index, seeded, ledger)
    }

    /// Growth alternatives for one connection from `plan`
    fn growth_candidates(
        &self,
        arena: &mut PlanArena,
        graph: &MatchGraph,
        index: usize,
        plan: &PlanNode,
        ledger: &PredicateLedger,
        rejected: &mut Option<PlanningError>,
    ) -> PlanningResult<Vec<Candidate>> {
        let seed = self.candidate(plan.clone(), BTreeSet::new(), String::new())?;
        let mut candidates = Vec::new();
        match self.expand(arena, graph, index, seed, ledger) {
            Ok(candidate) => candidates.push(candidate),
            Err(err) if err.is_candidate_local() => {
                debug!("expansion of {} rejected: {}", graph.connections[index], err);
                rejected.get_or_insert(err);
            }
            Err(err) => return Err(err),
        }

        if let Connection::Relationship(rel) = &graph.connections[index] {
            if let Some(mut join) = self.hash_join_candidate(arena, rel, plan, ledger)? {
                join.connection = Some(index);
                candidates.push(join);
            }
        }
        Ok(candidates)
    }

    /// Expand connection `index` from `seed`, then place ready predicates
    fn expand(
        &self,
        arena: &mut PlanArena,
        graph: &MatchGraph,
        index: usize,
        seed: Candidate,
        ledger: &PredicateLedger,
    ) -> PlanningResult<Candidate> {
        let mut solved = seed.solved;
        let connection = &graph.connections[index];
        let (plan, description) = match connection {
            Connection::Relationship(rel) => {
                let plan = self.expand_relationship(arena, rel, seed.plan)?;
                let description = plan.operator.describe();
                (plan, description)
            }
            Connection::Quantified(qpp) => {
                let bound = seed.plan.available_variables();
                let mut request = QppRequest::new(qpp);
                request.distinct_endpoints_only = graph.distinct_endpoints_only;

                let groups: BTreeSet<String> =
                    connection.exposed_variables().into_iter().collect();
                let mut outer = BTreeSet::new();
                for (i, entry) in ledger.entries.iter().enumerate() {
                    if !ledger.is_open(i, &solved) || entry.obligation.is_some() {
                        continue;
                    }
                    if entry.dependencies.iter().any(|d| groups.contains(d)) {
                        request.outer_predicates.push(entry.predicate.clone());
                        outer.insert(i);
                    }
                }

                request.downstream = graph.required_variables.clone();
                for (i, entry) in ledger.entries.iter().enumerate() {
                    let open = ledger.is_open(i, &solved) && entry.obligation.is_none();
                    if open && !outer.contains(&i) {
                        request.downstream.extend(entry.dependencies.iter().cloned());
                    }
                }

                let mut dischargeable = BTreeSet::new();
                for (i, entry) in ledger.entries.iter().enumerate() {
                    let Some(o) = entry.obligation else {
                        continue;
                    };
                    if !ledger.is_open(i, &solved) {
                        continue;
                    }
                    let obligation = &ledger.obligations[o];
                    let (Some(counterpart), Some(own)) =
                        (obligation.counterpart(index), obligation.own(index))
                    else {
                        continue;
                    };
                    if bound.contains(&counterpart.variable) {
                        request.siblings.push(counterpart.clone());
                        dischargeable.insert(i);
                    } else {
                        request.retained_groups.insert(own.variable.clone());
                    }
                }

                let planned = self.selector.plan_qpp(arena, &seed.plan, &request)?;
                self.absorb(&planned, ledger, &dischargeable, &mut solved);
                let description =
                    format!("{:?} {:?} for {}", planned.operator, planned.direction, qpp);
                (planned.plan, description)
            }
        };

        let plan = self.place_ready(arena, plan, ledger, &mut solved)?;
        let mut candidate = self.candidate(plan, solved, description)?;
        candidate.connection = Some(index);
        Ok(candidate)
    }

    fn absorb(
        &self,
        planned: &PlannedQpp,
        ledger: &PredicateLedger,
        dischargeable: &BTreeSet<usize>,
        solved: &mut BTreeSet<usize>,
    ) {
        for predicate in &planned.solved_outer {
            if let Some(i) = ledger.locate(predicate, solved) {
                solved.insert(i);
            }
        }
        if planned.discharged_siblings {
            trace!("{} uniqueness checks discharged by Trail", dischargeable.len());
            solved.extend(dischargeable.iter().copied());
        }
    }

    fn expand_relationship(
        &self,
        arena: &mut PlanArena,
        rel: &PatternRelationship,
        input: PlanNode,
    ) -> PlanningResult<PlanNode> {
        let bound = input.available_variables();
        let (near, far) = if bound.contains(rel.left()) {
            (rel.left(), rel.right())
        } else {
            (rel.right(), rel.left())
        };
        let mode = if bound.contains(far) {
            ExpansionMode::Into
        } else {
            ExpansionMode::All
        };
        let operator = match rel.length {
            PatternLength::Simple => Operator::Expand {
                input: Box::new(input),
                from: near.to_string(),
                relationship: rel.variable.clone(),
                to: far.to_string(),
                direction: rel.direction_from(near),
                types: rel.types.clone(),
                mode,
            },
            PatternLength::Var { min, max } => Operator::VarLengthExpand {
                input: Box::new(input),
                from: near.to_string(),
                relationship: rel.variable.clone(),
                to: far.to_string(),
                direction: rel.direction_from(near),
                types: rel.types.clone(),
                min,
                max,
                node_predicates: Vec::new(),
                relationship_predicates: Vec::new(),
                mode,
            },
        };
        self.ctx.finish(arena, operator, Vec::new())
    }

    /// Join `plan` with an independently planned leg that starts at the far
    /// endpoint, when that endpoint has a selective leaf
    fn hash_join_candidate(
        &self,
        arena: &mut PlanArena,
        rel: &PatternRelationship,
        plan: &PlanNode,
        ledger: &PredicateLedger,
    ) -> PlanningResult<Option<Candidate>> {
        if !self.ctx.config.enable_node_hash_join || rel.is_var_length() {
            return Ok(None);
        }
        let bound = plan.available_variables();
        let (near, far) = if bound.contains(rel.left()) {
            (rel.left(), rel.right())
        } else {
            (rel.right(), rel.left())
        };
        if bound.contains(far) || !bound.contains(near) {
            return Ok(None);
        }

        let leaf = self.best_leaf(arena, far, ledger, &BTreeSet::new())?;
        if leaf.solved.is_empty() {
            return Ok(None);
        }
        let right = self.ctx.finish(
            arena,
            Operator::Expand {
                input: Box::new(leaf.plan),
                from: far.to_string(),
                relationship: rel.variable.clone(),
                to: near.to_string(),
                direction: rel.direction_from(far),
                types: rel.types.clone(),
                mode: ExpansionMode::All,
            },
            Vec::new(),
        )?;
        let join = self.ctx.finish(
            arena,
            Operator::NodeHashJoin {
                left: Box::new(plan.clone()),
                right: Box::new(right),
                nodes: vec![near.to_string()],
            },
            Vec::new(),
        )?;
        let mut solved = leaf.solved;
        let join = self.place_ready(arena, join, ledger, &mut solved)?;
        let description = format!("NodeHashJoin on {} via {}", near, rel);
        self.candidate(join, solved, description).map(Some)
    }

    fn combine(
        &self,
        arena: &mut PlanArena,
        graph: &MatchGraph,
        mut planned: Vec<Candidate>,
        ledger: &mut PredicateLedger,
        tracer: &mut PlanTracer,
    ) -> PlanningResult<PlanNode> {
        if planned.is_empty() {
            if graph.argument_ids.is_empty() {
                return Err(PlanningError::MalformedPattern(
                    "match graph has no nodes".to_string(),
                ));
            }
            let start = self.argument_start(arena, graph, ledger)?;
            ledger.mark(&start.solved);
            return Ok(start.plan);
        }

        // Stable sort keeps textual order between equally expensive legs
        planned.sort_by(|a, b| a.estimate.cost.total_cmp(&b.estimate.cost));
        let mut legs = planned.into_iter();
        let mut root = match legs.next() {
            Some(first) => first.plan,
            None => return Err(PlanningError::Internal("no component plans".to_string())),
        };

        let missing_arguments = graph
            .argument_ids
            .iter()
            .any(|a| !root.available_variables().contains(a));
        if missing_arguments {
            // Arguments not touched by any pattern node still feed predicates
            let argument = self.ctx.finish(
                arena,
                Operator::Argument {
                    variables: graph.argument_ids.iter().cloned().collect(),
                },
                Vec::new(),
            )?;
            root = self.product(arena, argument, root, ledger)?;
        }

        for leg in legs {
            self.ctx.cancellation.check()?;
            root = self.product(arena, root, leg.plan, ledger)?;
            tracer.record(
                PlanningPhase::Composition,
                "Cartesian product of components",
                TraceMetadata::with_operator(root.kind()),
            );
        }
        Ok(root)
    }

    fn product(
        &self,
        arena: &mut PlanArena,
        left: PlanNode,
        right: PlanNode,
        ledger: &mut PredicateLedger,
    ) -> PlanningResult<PlanNode> {
        let product = self.ctx.finish(
            arena,
            Operator::CartesianProduct {
                left: Box::new(left),
                right: Box::new(right),
            },
            Vec::new(),
        )?;
        let mut solved = BTreeSet::new();
        let plan = self.place_ready(arena, product, ledger, &mut solved)?;
        ledger.mark(&solved);
        Ok(plan)
    }

    /// Place every ready open predicate above `plan` as one Filter
    fn place_ready(
        &self,
        arena: &mut PlanArena,
        plan: PlanNode,
        ledger: &PredicateLedger,
        solved: &mut BTreeSet<usize>,
    ) -> PlanningResult<PlanNode> {
        let ready = ledger.ready(&plan.available_variables(), solved);
        if !ready.is_empty() {
            trace!("placing {} predicates above {}", ready.len(), plan.id);
        }
        let predicates = ready
            .iter()
            .map(|&i| ledger.entries[i].predicate.clone())
            .collect();
        solved.extend(ready);
        self.ctx.filter(arena, plan, predicates)
    }

    fn candidate(
        &self,
        plan: PlanNode,
        solved: BTreeSet<usize>,
        description: String,
    ) -> PlanningResult<Candidate> {
        Ok(Candidate {
            estimate: self.ctx.estimate(&plan)?,
            plan,
            solved,
            connection: None,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pattern::{
        NodeBinding, QuantifiedPathPattern, SemanticDirection, UpperBound,
    };
    use crate::plan::context::fixture::ContextFixture;
    use crate::plan::cost::Statistics;
    use crate::plan::physical::OperatorKind;

    fn compose(fixture: &ContextFixture, graph: &MatchGraph) -> PlanningResult<PlanNode> {
        let ctx = fixture.context();
        let mut arena = PlanArena::new();
        let mut tracer = PlanTracer::new();
        Composer::new(&ctx).compose(&mut arena, graph, &mut tracer)
    }

    fn qpp(left: &str, right: &str, rel: &str, types: &[&str]) -> QuantifiedPathPattern {
        QuantifiedPathPattern::builder(
            NodeBinding::new(left, format!("{}_in", left)),
            NodeBinding::new(right, format!("{}_out", left)),
        )
        .relationship(
            PatternRelationship::new(
                rel,
                format!("{}_in", left),
                format!("{}_out", left),
                SemanticDirection::Outgoing,
            )
            .with_types(types),
        )
        .relationship_grouping(rel, rel)
        .build()
        .unwrap()
    }

    #[test]
    fn test_components_in_textual_order() {
        let graph = MatchGraph::new()
            .node("a", &[])
            .node("b", &[])
            .node("c", &[])
            .node("d", &[])
            .relationship(PatternRelationship::new("r", "c", "d", SemanticDirection::Outgoing))
            .relationship(PatternRelationship::new("s", "b", "a", SemanticDirection::Outgoing));

        let components = connected_components_of(&graph);
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].nodes, vec!["a", "b"]);
        assert_eq!(components[0].connections, vec![1]);
        assert_eq!(components[1].nodes, vec!["c", "d"]);
    }

    #[test]
    fn test_chain_with_plain_relationship_filters_uniqueness() {
        let fixture = ContextFixture::new(Statistics::new(1000, 5000).with_label("A", 5));
        let graph = MatchGraph::new()
            .node("a", &["A"])
            .node("b", &[])
            .node("c", &[])
            .quantified(qpp("a", "b", "r", &[]))
            .relationship(PatternRelationship::new("s", "b", "c", SemanticDirection::Outgoing));

        let plan = compose(&fixture, &graph).unwrap();
        let predicates: Vec<String> = plan
            .filter_predicates()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert!(predicates.contains(&"NOT s IN r".to_string()));
        assert!(plan.contains(OperatorKind::VarLengthExpand));
    }

    #[test]
    fn test_trail_discharges_uniqueness_against_bound_sibling() {
        let fixture = ContextFixture::new(Statistics::new(1000, 5000).with_label("A", 5));
        let graph = MatchGraph::new()
            .node("a", &["A"])
            .node("b", &[])
            .node("c", &[])
            .relationship(PatternRelationship::new("s", "a", "b", SemanticDirection::Outgoing))
            .quantified(
                QuantifiedPathPattern::builder(
                    NodeBinding::new("b", "n"),
                    NodeBinding::new("c", "m"),
                )
                .relationship(PatternRelationship::new(
                    "r",
                    "n",
                    "m",
                    SemanticDirection::Outgoing,
                ))
                .selection(Expression::boolean(true))
                .group_by_name()
                .build()
                .unwrap(),
            );

        let plan = compose(&fixture, &graph).unwrap();
        let mut previously_bound = Vec::new();
        plan.visit(&mut |node| {
            if let Operator::Trail { parameters, .. } = &node.operator {
                previously_bound = parameters.previously_bound_relationships.clone();
            }
        });
        assert_eq!(previously_bound, vec!["s"]);
        assert!(!plan
            .filter_predicates()
            .iter()
            .any(|p| p.to_string() == "NOT s IN r"));
    }

    #[test]
    fn test_disconnected_components_are_combined() {
        let fixture = ContextFixture::new(Statistics::new(100, 100).with_label("Small", 2));
        let graph = MatchGraph::new()
            .node("a", &[])
            .node("b", &["Small"])
            .selection(Expression::equals(
                Expression::property("a", "x"),
                Expression::property("b", "x"),
            ));

        let plan = compose(&fixture, &graph).unwrap();
        assert_eq!(plan.kind(), OperatorKind::Filter);
        let Operator::Filter { input, .. } = &plan.operator else {
            unreachable!();
        };
        let Operator::CartesianProduct { left, .. } = &input.operator else {
            panic!("expected a Cartesian product, got {:?}", input.kind());
        };
        // Cheaper component first
        assert_eq!(left.kind(), OperatorKind::NodeByLabelScan);
    }

    #[test]
    fn test_argument_seeds_component() {
        let fixture = ContextFixture::new(Statistics::new(100, 100));
        let graph = MatchGraph::new()
            .node("a", &[])
            .node("b", &[])
            .argument("a")
            .relationship(
                PatternRelationship::new("r", "a", "b", SemanticDirection::Outgoing).with_length(
                    PatternLength::Var {
                        min: 1,
                        max: UpperBound::Limited(3),
                    },
                ),
            );

        let plan = compose(&fixture, &graph).unwrap();
        assert_eq!(
            plan.operators(),
            vec![OperatorKind::VarLengthExpand, OperatorKind::Argument]
        );
    }

    #[test]
    fn test_unbound_predicate_is_unsolvable() {
        let fixture = ContextFixture::new(Statistics::new(100, 100));
        let graph = MatchGraph::new()
            .node("a", &[])
            .selection(Expression::equals(
                Expression::property("a", "x"),
                Expression::property("z", "x"),
            ));

        let err = compose(&fixture, &graph).unwrap_err();
        assert_eq!(
            err,
            PlanningError::UnsolvablePredicate {
                predicate: "a.x = z.x".to_string(),
                missing: vec!["z".to_string()],
            }
        );
    }

    fn selective_chain() -> (Statistics, MatchGraph) {
        let statistics = Statistics::new(1_000_000, 20_000_000)
            .with_label("Small", 10)
            .with_label("Tag", 20)
            .with_relationship_type("R", 10_000_000)
            .with_relationship_type("T", 10_000_000);
        let graph = MatchGraph::new()
            .node("a", &["Small"])
            .node("b", &[])
            .node("c", &["Tag"])
            .relationship(
                PatternRelationship::new("r", "a", "b", SemanticDirection::Outgoing)
                    .with_types(&["R"]),
            )
            .relationship(
                PatternRelationship::new("t", "b", "c", SemanticDirection::Outgoing)
                    .with_types(&["T"]),
            );
        (statistics, graph)
    }

    #[test]
    fn test_selective_far_leaf_is_hash_joined() {
        let (statistics, graph) = selective_chain();
        let fixture = ContextFixture::new(statistics);

        let plan = compose(&fixture, &graph).unwrap();
        let Operator::NodeHashJoin { left, right, nodes } = &plan.operator else {
            panic!("expected NodeHashJoin, got {}", plan.operator.describe());
        };
        assert_eq!(nodes, &vec!["b".to_string()]);
        assert_eq!(left.operator.describe(), "Expand(All) (a)-[r:R]->(b)");
        assert_eq!(right.operator.describe(), "Expand(All) (c)<-[t:T]-(b)");
        assert!(matches!(
            &right.operator.children()[0].operator,
            Operator::NodeByLabelScan { variable, label } if variable == "c" && label == "Tag"
        ));
        // Label scans solve both labels, nothing is filtered twice
        assert!(plan.filter_predicates().is_empty());
        assert_eq!(
            plan.operators()
                .iter()
                .filter(|k| **k == OperatorKind::NodeByLabelScan)
                .count(),
            2
        );
    }

    #[test]
    fn test_hash_join_can_be_disabled() {
        let (statistics, graph) = selective_chain();
        let mut fixture = ContextFixture::new(statistics);
        fixture.config.enable_node_hash_join = false;

        let plan = compose(&fixture, &graph).unwrap();
        assert!(!plan.contains(OperatorKind::NodeHashJoin));
        assert_eq!(
            plan.operators(),
            vec![
                OperatorKind::Filter,
                OperatorKind::Expand,
                OperatorKind::Expand,
                OperatorKind::NodeByLabelScan
            ]
        );
        assert_eq!(
            plan.filter_predicates(),
            vec![Expression::has_labels("c", &["Tag"])]
        );
    }

    #[test]
    fn test_cancelled_before_planning() {
        let fixture = ContextFixture::new(Statistics::new(100, 100));
        fixture.cancellation.cancel();
        let graph = MatchGraph::new().node("a", &[]);
        assert_eq!(compose(&fixture, &graph).unwrap_err(), PlanningError::Cancelled);
    }
}
