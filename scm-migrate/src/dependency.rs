//! Dependency Resolver: "A references B" edges, cycle detection, and ordering.
//!
//! Edges come only from the [`ReferenceRules`] table applied to entity fields.
//! A reference from an entity in container C resolves first in C, then in C's
//! ancestor folders nearest first, then to the single graph-wide match. Names
//! that do not resolve to exactly one entity are kept as
//! [`UnresolvedDependency`] records and never take part in ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};

use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef, Reversed};
use petgraph::Direction;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::model::{Container, ContainerKind, ContainerRef, Entity, EntityKey, EntityType};
use crate::references::{Reference, ReferenceRules};

/// `from` references `to` through `field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyEdge {
    pub from: EntityKey,
    pub to: EntityKey,
    pub relation: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No entity of a target type carries the name.
    Missing,
    /// Several entities carry the name and none is closer than the others.
    Ambiguous { candidates: Vec<EntityKey> },
}

/// A reference whose target is not in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedDependency {
    pub from: EntityKey,
    pub name: String,
    pub field: String,
    pub targets: Vec<EntityType>,
    #[serde(flatten)]
    pub reason: UnresolvedReason,
}

impl Display for UnresolvedDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.reason {
            UnresolvedReason::Missing => write!(
                f,
                "{} references missing '{}' via {}",
                self.from, self.name, self.field
            ),
            UnresolvedReason::Ambiguous { candidates } => write!(
                f,
                "{} references ambiguous '{}' via {} ({} candidates)",
                self.from,
                self.name,
                self.field,
                candidates.len()
            ),
        }
    }
}

/// Relation and field carried by each graph edge.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    relation: String,
    field: String,
}

/// Directed reference graph over a set of entities; an edge points from the
/// referencing entity to the entity it names.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<EntityKey, Link>,
    index: BTreeMap<EntityKey, NodeIndex>,
    unresolved: Vec<UnresolvedDependency>,
}

/// Dependency cycle; ordering is refused rather than guessing a break point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle: {}", render_cycle(.members))]
pub struct CycleError {
    /// Entities on the cycle, in reference order.
    pub members: Vec<EntityKey>,
}

fn render_cycle(members: &[EntityKey]) -> String {
    let mut parts: Vec<String> = members.iter().map(ToString::to_string).collect();
    if let Some(first) = members.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

/// Deterministic push order for a subset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Order {
    /// Subset keys, prerequisites first.
    pub order: Vec<EntityKey>,
    /// For each ordered key, the nearest ordered keys it depends on, directly
    /// or through entities outside the subset.
    pub prerequisites: BTreeMap<EntityKey, Vec<EntityKey>>,
    /// Dependencies reachable from the subset that are not part of it.
    pub implicit_prerequisites: Vec<EntityKey>,
}

impl Order {
    pub fn position(&self, key: &EntityKey) -> Option<usize> {
        self.order.iter().position(|k| k == key)
    }

    pub fn prerequisites_of(&self, key: &EntityKey) -> &[EntityKey] {
        self.prerequisites.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Name lookup scoped by container.
struct Resolver<'a> {
    by_name: HashMap<&'a str, Vec<&'a EntityKey>>,
    containers: HashMap<ContainerRef, &'a Container>,
}

impl<'a> Resolver<'a> {
    fn resolve(
        &self,
        from: &EntityKey,
        reference: &Reference<'_>,
    ) -> Result<EntityKey, UnresolvedReason> {
        let candidates: Vec<&EntityKey> = self
            .by_name
            .get(reference.name)
            .map(|keys| {
                keys.iter()
                    .copied()
                    .filter(|k| reference.rule.targets.contains(&k.entity_type))
                    .collect()
            })
            .unwrap_or_default();

        let mut scopes = vec![from.container.clone()];
        if let Some(container) = self.containers.get(&from.container) {
            scopes.extend(
                container
                    .ancestors()
                    .into_iter()
                    .map(|name| ContainerRef::new(ContainerKind::Folder, name)),
            );
        }

        for scope in &scopes {
            let here: Vec<&EntityKey> = candidates
                .iter()
                .copied()
                .filter(|k| k.container == *scope)
                .collect();
            if !here.is_empty() {
                return pick_one(&here);
            }
        }
        pick_one(&candidates)
    }
}

fn pick_one(keys: &[&EntityKey]) -> Result<EntityKey, UnresolvedReason> {
    match keys {
        [] => Err(UnresolvedReason::Missing),
        [only] => Ok((*only).clone()),
        many => {
            let mut candidates: Vec<EntityKey> = many.iter().map(|k| (*k).clone()).collect();
            candidates.sort();
            Err(UnresolvedReason::Ambiguous { candidates })
        }
    }
}

/// Build the reference graph of `entities`.
///
/// `containers` supplies folder paths for ancestor lookup; entities whose
/// container is not listed resolve only locally and graph-wide.
pub fn build_graph<'a, I>(entities: I, containers: &[Container], rules: &ReferenceRules) -> DependencyGraph
where
    I: IntoIterator<Item = &'a Entity>,
{
    let entities: Vec<&Entity> = entities.into_iter().collect();
    let keys: Vec<EntityKey> = entities.iter().map(|e| e.key()).collect();

    let mut by_name: HashMap<&str, Vec<&EntityKey>> = HashMap::new();
    for key in &keys {
        by_name.entry(key.name.as_str()).or_default().push(key);
    }
    let resolver = Resolver {
        by_name,
        containers: containers.iter().map(|c| (c.reference(), c)).collect(),
    };

    let mut graph = DependencyGraph::default();
    for key in &keys {
        graph.add_node(key);
    }
    let mut seen: BTreeSet<(EntityKey, EntityKey, String)> = BTreeSet::new();

    for (entity, from) in entities.iter().zip(&keys) {
        for reference in rules.extract(entity) {
            match resolver.resolve(from, &reference) {
                Ok(to) => {
                    let field = reference.rule.field.clone();
                    if !seen.insert((from.clone(), to.clone(), field.clone())) {
                        continue;
                    }
                    graph.add_edge(
                        from,
                        &to,
                        Link {
                            relation: reference.rule.relation.clone(),
                            field,
                        },
                    );
                }
                Err(reason) => graph.unresolved.push(UnresolvedDependency {
                    from: from.clone(),
                    name: reference.name.to_string(),
                    field: reference.rule.field.clone(),
                    targets: reference.rule.targets.clone(),
                    reason,
                }),
            }
        }
    }

    debug!(
        nodes = graph.graph.node_count(),
        edges = graph.graph.edge_count(),
        unresolved = graph.unresolved.len(),
        "dependency graph built"
    );
    graph
}

impl DependencyGraph {
    fn add_node(&mut self, key: &EntityKey) -> NodeIndex {
        if let Some(ix) = self.index.get(key) {
            return *ix;
        }
        let ix = self.graph.add_node(key.clone());
        self.index.insert(key.clone(), ix);
        ix
    }

    fn add_edge(&mut self, from: &EntityKey, to: &EntityKey, link: Link) {
        let a = self.add_node(from);
        let b = self.add_node(to);
        self.graph.add_edge(a, b, link);
    }

    fn edge(&self, edge: EdgeReference<'_, Link>) -> DependencyEdge {
        DependencyEdge {
            from: self.graph[edge.source()].clone(),
            to: self.graph[edge.target()].clone(),
            relation: edge.weight().relation.clone(),
            field: edge.weight().field.clone(),
        }
    }

    /// Edges touching `key` in `direction`, in insertion order.
    fn edges_directed(&self, key: &EntityKey, direction: Direction) -> Vec<DependencyEdge> {
        let Some(&ix) = self.index.get(key) else {
            return Vec::new();
        };
        let mut found: Vec<EdgeReference<'_, Link>> = self.graph.edges_directed(ix, direction).collect();
        found.sort_by_key(|e| e.id());
        found.into_iter().map(|e| self.edge(e)).collect()
    }

    /// Distinct neighbours of `key` in `direction`, in key order.
    fn neighbours(&self, key: &EntityKey, direction: Direction) -> BTreeSet<&EntityKey> {
        self.index
            .get(key)
            .map(|&ix| {
                self.graph
                    .neighbors_directed(ix, direction)
                    .map(|n| &self.graph[n])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &EntityKey> {
        self.index.keys()
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.index.contains_key(key)
    }

    /// Every edge, in the order references were found.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.graph.edge_references().map(|e| self.edge(e)).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn unresolved(&self) -> &[UnresolvedDependency] {
        &self.unresolved
    }

    pub fn edges_from(&self, key: &EntityKey) -> Vec<DependencyEdge> {
        self.edges_directed(key, Direction::Outgoing)
    }

    pub fn edges_to(&self, key: &EntityKey) -> Vec<DependencyEdge> {
        self.edges_directed(key, Direction::Incoming)
    }

    pub fn unresolved_for<'a>(
        &'a self,
        key: &'a EntityKey,
    ) -> impl Iterator<Item = &'a UnresolvedDependency> {
        self.unresolved.iter().filter(move |u| u.from == *key)
    }

    /// Direct prerequisites of `key`.
    pub fn dependencies_of(&self, key: &EntityKey) -> Vec<&EntityKey> {
        self.neighbours(key, Direction::Outgoing).into_iter().collect()
    }

    /// Everything that depends on `key`, directly or transitively.
    pub fn dependents_of(&self, key: &EntityKey) -> Vec<&EntityKey> {
        let Some(&start) = self.index.get(key) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut seen: BTreeSet<&EntityKey> = BTreeSet::new();
        while let Some(ix) = dfs.next(reversed) {
            if ix != start {
                seen.insert(&self.graph[ix]);
            }
        }
        seen.into_iter().collect()
    }

    /// `keys` plus everything they transitively depend on.
    fn closure<'a>(&'a self, keys: &[&'a EntityKey]) -> BTreeSet<&'a EntityKey> {
        let mut seen: BTreeSet<&EntityKey> = BTreeSet::new();
        let mut dfs = Dfs::empty(&self.graph);
        for key in keys {
            let Some(&ix) = self.index.get(*key) else {
                continue;
            };
            dfs.move_to(ix);
            while let Some(found) = dfs.next(&self.graph) {
                seen.insert(&self.graph[found]);
            }
        }
        seen
    }

    /// First cycle found by a three-colour DFS over `nodes`, visiting in key
    /// order so the reported cycle is stable.
    fn find_cycle(&self, nodes: &BTreeSet<&EntityKey>) -> Option<Vec<EntityKey>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        let mut marks: HashMap<&EntityKey, Mark> = HashMap::new();
        for &root in nodes {
            if marks.contains_key(root) {
                continue;
            }
            // Explicit stack of (sorted successors, next successor index).
            let mut path: Vec<&EntityKey> = vec![root];
            let mut stack: Vec<(Vec<&EntityKey>, usize)> = vec![(self.successors(root, nodes), 0)];
            marks.insert(root, Mark::InProgress);

            while let Some((succ, next)) = stack.last_mut() {
                let Some(&child) = succ.get(*next) else {
                    if let Some(done) = path.pop() {
                        marks.insert(done, Mark::Done);
                    }
                    stack.pop();
                    continue;
                };
                *next += 1;
                match marks.get(child) {
                    Some(Mark::InProgress) => {
                        let start = path.iter().position(|k| *k == child).unwrap_or(0);
                        return Some(path[start..].iter().map(|k| (*k).clone()).collect());
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::InProgress);
                        path.push(child);
                        stack.push((self.successors(child, nodes), 0));
                    }
                }
            }
        }
        None
    }

    fn successors<'a>(&'a self, key: &EntityKey, within: &BTreeSet<&EntityKey>) -> Vec<&'a EntityKey> {
        self.neighbours(key, Direction::Outgoing)
            .into_iter()
            .filter(|to| within.contains(*to))
            .collect()
    }

    /// Whole-graph cycle check.
    pub fn check_acyclic(&self) -> Result<(), CycleError> {
        let nodes: BTreeSet<&EntityKey> = self.index.keys().collect();
        match self.find_cycle(&nodes) {
            Some(members) => Err(CycleError { members }),
            None => Ok(()),
        }
    }
}

/// Order `subset` so every prerequisite precedes its dependents.
///
/// Edges through entities outside the subset still constrain the order; those
/// entities are reported in [`Order::implicit_prerequisites`]. Keys unknown to
/// the graph are left out of the order.
pub fn topological_order(graph: &DependencyGraph, subset: &[EntityKey]) -> Result<Order, CycleError> {
    let selected: BTreeSet<&EntityKey> = subset.iter().filter(|k| graph.contains(k)).collect();
    let roots: Vec<&EntityKey> = selected.iter().copied().collect();
    let closure = graph.closure(&roots);

    if let Some(members) = graph.find_cycle(&closure) {
        return Err(CycleError { members });
    }

    // Kahn over the closure with a key-ordered ready set; a node is ready once
    // all its prerequisites are out.
    let mut remaining: HashMap<&EntityKey, usize> = closure
        .iter()
        .map(|k| (*k, graph.successors(k, &closure).len()))
        .collect();
    let mut ready: BTreeSet<&EntityKey> = remaining
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut full: Vec<&EntityKey> = Vec::with_capacity(closure.len());

    while let Some(next) = ready.pop_first() {
        full.push(next);
        for dependent in graph.neighbours(next, Direction::Incoming) {
            if !closure.contains(dependent) {
                continue;
            }
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    let order: Vec<EntityKey> = full
        .iter()
        .filter(|k| selected.contains(*k))
        .map(|k| (*k).clone())
        .collect();

    let mut prerequisites = BTreeMap::new();
    for key in &order {
        prerequisites.insert(key.clone(), nearest_selected(graph, key, &selected));
    }

    let implicit_prerequisites = closure
        .iter()
        .filter(|k| !selected.contains(*k))
        .map(|k| (*k).clone())
        .collect();

    Ok(Order {
        order,
        prerequisites,
        implicit_prerequisites,
    })
}

/// Selected keys reachable from `key` without passing through another
/// selected key.
fn nearest_selected(
    graph: &DependencyGraph,
    key: &EntityKey,
    selected: &BTreeSet<&EntityKey>,
) -> Vec<EntityKey> {
    let mut found: BTreeSet<EntityKey> = BTreeSet::new();
    let mut visited: BTreeSet<&EntityKey> = BTreeSet::new();
    let mut stack: Vec<&EntityKey> = graph.dependencies_of(key);
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        if selected.contains(current) {
            found.insert(current.clone());
        } else {
            stack.extend(graph.dependencies_of(current));
        }
    }
    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use entity_fields::parse;
    use pretty_assertions::assert_eq;

    use super::{build_graph, topological_order, UnresolvedReason};
    use crate::model::{Container, ContainerKind, Entity, EntityKey, EntityType};
    use crate::references::ReferenceRules;

    fn entity(entity_type: EntityType, json: &str) -> Entity {
        Entity::from_record(entity_type, parse(json.as_bytes()).expect("parse")).expect("entity")
    }

    fn key(raw: &str) -> EntityKey {
        raw.parse().expect("key")
    }

    fn shared() -> Vec<Container> {
        vec![Container::new(ContainerKind::Folder, "Shared").with_path("All/Shared")]
    }

    #[test]
    fn group_members_order_before_the_group() {
        let entities = vec![
            entity(EntityType::AddressGroup, r#"{"name": "G", "folder": "Shared", "static": ["A"]}"#),
            entity(EntityType::Address, r#"{"name": "A", "folder": "Shared", "ip_netmask": "10.0.0.1/32"}"#),
        ];
        let graph = build_graph(&entities, &shared(), &ReferenceRules::embedded());
        let order = topological_order(
            &graph,
            &[key("address-group:G@Shared"), key("address:A@Shared")],
        )
        .expect("acyclic");

        assert_eq!(order.order, vec![key("address:A@Shared"), key("address-group:G@Shared")]);
        assert_eq!(
            order.prerequisites_of(&key("address-group:G@Shared")),
            &[key("address:A@Shared")]
        );
        assert!(order.implicit_prerequisites.is_empty());
    }

    #[test]
    fn every_edge_points_backwards_in_the_order() {
        let entities = vec![
            entity(EntityType::IkeCryptoProfile, r#"{"name": "ike", "folder": "Remote"}"#),
            entity(EntityType::IpsecCryptoProfile, r#"{"name": "esp", "folder": "Remote"}"#),
            entity(
                EntityType::IkeGateway,
                r#"{"name": "gw", "folder": "Remote",
                    "protocol": {"ikev2": {"ike_crypto_profile": "ike"}}}"#,
            ),
            entity(
                EntityType::IpsecTunnel,
                r#"{"name": "tun", "folder": "Remote",
                    "auto_key": {"ike_gateway": [{"name": "gw"}], "ipsec_crypto_profile": "esp"}}"#,
            ),
        ];
        let graph = build_graph(&entities, &[], &ReferenceRules::embedded());
        assert_eq!(graph.edges().len(), 3);
        let all: Vec<EntityKey> = entities.iter().map(Entity::key).collect();
        let order = topological_order(&graph, &all).expect("acyclic");
        for edge in graph.edges() {
            let from = order.position(&edge.from).expect("from ordered");
            let to = order.position(&edge.to).expect("to ordered");
            assert!(to < from, "{} must precede {}", edge.to, edge.from);
        }
    }

    #[test]
    fn mutual_references_yield_cycle_error_naming_both() {
        let entities = vec![
            entity(EntityType::AddressGroup, r#"{"name": "X", "folder": "Shared", "static": ["Y"]}"#),
            entity(EntityType::AddressGroup, r#"{"name": "Y", "folder": "Shared", "static": ["X"]}"#),
        ];
        let graph = build_graph(&entities, &shared(), &ReferenceRules::embedded());
        let err = topological_order(
            &graph,
            &[key("address-group:X@Shared"), key("address-group:Y@Shared")],
        )
        .expect_err("cycle");
        assert_eq!(
            err.members,
            vec![key("address-group:X@Shared"), key("address-group:Y@Shared")]
        );
        assert!(err.to_string().contains("address-group:X@folder:Shared -> address-group:Y@folder:Shared"));
        assert!(graph.check_acyclic().is_err());
    }

    #[test]
    fn subset_ordering_reports_implicit_prerequisites() {
        let entities = vec![
            entity(EntityType::Address, r#"{"name": "A", "folder": "Shared"}"#),
            entity(EntityType::AddressGroup, r#"{"name": "Inner", "folder": "Shared", "static": ["A"]}"#),
            entity(EntityType::AddressGroup, r#"{"name": "Outer", "folder": "Shared", "static": ["Inner"]}"#),
        ];
        let graph = build_graph(&entities, &shared(), &ReferenceRules::embedded());
        let order = topological_order(
            &graph,
            &[key("address-group:Outer@Shared"), key("address:A@Shared")],
        )
        .expect("acyclic");

        assert_eq!(order.order, vec![key("address:A@Shared"), key("address-group:Outer@Shared")]);
        assert_eq!(order.implicit_prerequisites, vec![key("address-group:Inner@Shared")]);
        assert_eq!(
            order.prerequisites_of(&key("address-group:Outer@Shared")),
            &[key("address:A@Shared")]
        );
    }

    #[test]
    fn references_resolve_nearest_container_first() {
        let containers = vec![
            Container::new(ContainerKind::Folder, "All").with_path("All"),
            Container::new(ContainerKind::Folder, "Shared").with_path("All/Shared"),
            Container::new(ContainerKind::Folder, "Texas").with_path("All/Shared/Texas"),
        ];
        let entities = vec![
            entity(EntityType::Address, r#"{"name": "dns", "folder": "All"}"#),
            entity(EntityType::Address, r#"{"name": "dns", "folder": "Shared"}"#),
            entity(EntityType::AddressGroup, r#"{"name": "G", "folder": "Texas", "static": ["dns"]}"#),
        ];
        let graph = build_graph(&entities, &containers, &ReferenceRules::embedded());
        assert_eq!(
            graph.dependencies_of(&key("address-group:G@Texas")),
            vec![&key("address:dns@Shared")]
        );
    }

    #[test]
    fn unknown_and_ambiguous_names_are_unresolved() {
        let entities = vec![
            entity(EntityType::Address, r#"{"name": "web", "folder": "East"}"#),
            entity(EntityType::Address, r#"{"name": "web", "folder": "West"}"#),
            entity(
                EntityType::AddressGroup,
                r#"{"name": "G", "snippet": "base", "static": ["web", "ghost"]}"#,
            ),
        ];
        let graph = build_graph(&entities, &[], &ReferenceRules::embedded());
        assert!(graph.edges().is_empty());
        let reasons: Vec<(&str, &UnresolvedReason)> = graph
            .unresolved()
            .iter()
            .map(|u| (u.name.as_str(), &u.reason))
            .collect();
        assert_eq!(reasons.len(), 2);
        assert!(matches!(reasons[0], ("web", UnresolvedReason::Ambiguous { candidates }) if candidates.len() == 2));
        assert_eq!(reasons[1], ("ghost", &UnresolvedReason::Missing));
    }

    #[test]
    fn dependents_are_transitive() {
        let entities = vec![
            entity(EntityType::Address, r#"{"name": "A", "folder": "Shared"}"#),
            entity(EntityType::AddressGroup, r#"{"name": "G1", "folder": "Shared", "static": ["A"]}"#),
            entity(EntityType::AddressGroup, r#"{"name": "G2", "folder": "Shared", "static": ["G1"]}"#),
            entity(
                EntityType::SecurityRule,
                r#"{"name": "allow", "folder": "Shared", "destination": ["G2"], "source": ["any"]}"#,
            ),
        ];
        let graph = build_graph(&entities, &shared(), &ReferenceRules::embedded());
        let impacted: Vec<String> = graph
            .dependents_of(&key("address:A@Shared"))
            .into_iter()
            .map(|k| k.name.clone())
            .collect();
        assert_eq!(impacted, vec!["G1", "G2", "allow"]);
    }

    #[test]
    fn one_target_named_by_two_fields_keeps_both_edges() {
        let entities = vec![
            entity(EntityType::Address, r#"{"name": "web", "folder": "Shared"}"#),
            entity(
                EntityType::SecurityRule,
                r#"{"name": "hairpin", "folder": "Shared", "source": ["web"], "destination": ["web"]}"#,
            ),
        ];
        let graph = build_graph(&entities, &shared(), &ReferenceRules::embedded());
        let rule = key("security-rule:hairpin@Shared");
        let fields: Vec<String> = graph.edges_from(&rule).into_iter().map(|e| e.field).collect();
        assert_eq!(fields.len(), 2);
        assert!(fields.iter().any(|f| f == "source"));
        assert!(fields.iter().any(|f| f == "destination"));
        assert_eq!(graph.dependencies_of(&rule), vec![&key("address:web@Shared")]);
        assert_eq!(graph.edges_to(&key("address:web@Shared")).len(), 2);
        assert_eq!(graph.dependents_of(&key("address:web@Shared")), vec![&rule]);
        assert!(graph.dependents_of(&key("address:ghost@Shared")).is_empty());

        let order = topological_order(&graph, &[rule.clone()]).expect("acyclic");
        assert_eq!(order.order, vec![rule]);
        assert_eq!(order.implicit_prerequisites, vec![key("address:web@Shared")]);
    }
}
