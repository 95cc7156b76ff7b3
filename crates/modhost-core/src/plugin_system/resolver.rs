//! Validation and ordering of a discovered plugin set.
//!
//! [`DependencyResolver::resolve`] runs four passes over the candidates in
//! discovery order: names, existence, versions, then a cycle-safe
//! depth-first ordering. Each pass reports every violation of its kind.
//! Lookups go through hash maps but output is always driven by the input
//! order, so identical input produces identical output and error text.
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::plugin_system::dependency::{DependencyError, EdgeKind};
use crate::plugin_system::manifest::{same_name, PluginCandidate};

/// Settings for one resolution
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// Identifier the host itself uses; no plugin may take it
    pub reserved_name: String,
    /// Building requires weak references to exist too
    pub building: bool,
    /// Keep running later passes after a pass reports errors
    pub exhaustive: bool,
}

impl ResolveContext {
    pub fn new(reserved_name: &str) -> Self {
        Self {
            reserved_name: reserved_name.to_string(),
            building: false,
            exhaustive: false,
        }
    }
}

/// Everything wrong with a candidate set.
#[derive(Debug, Clone)]
pub struct ResolutionFailure {
    /// Every violation, grouped by pass
    pub errors: Vec<DependencyError>,
    /// Candidates that caused a violation, in discovery order
    pub errored: Vec<PluginCandidate>,
    /// Order of the uninvolved candidates, empty if ordering never ran
    pub partial_order: Vec<PluginCandidate>,
    /// Candidates left out of `partial_order` only because a hard dependency
    /// was errored. They are not at fault and are not reported as errors.
    pub blocked: Vec<PluginCandidate>,
}

impl ResolutionFailure {
    pub fn errored_names(&self) -> Vec<&str> {
        self.errored.iter().map(|c| c.name()).collect()
    }

    pub fn blocked_names(&self) -> Vec<&str> {
        self.blocked.iter().map(|c| c.name()).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionFailure {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Placed,
}

struct Frame {
    node: usize,
    cursor: usize,
}

/// Validates a candidate set and produces its load order
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    context: ResolveContext,
}

impl DependencyResolver {
    pub fn new(context: ResolveContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ResolveContext {
        &self.context
    }

    /// Validate and order `candidates`, given in discovery order.
    pub fn resolve(&self, candidates: &[PluginCandidate]) -> Result<Vec<PluginCandidate>, ResolutionFailure> {
        let mut errored = vec![false; candidates.len()];
        let mut errors = Vec::new();

        self.check_names(candidates, &mut errored, &mut errors);
        if !self.proceed(&errors) {
            return Err(failure(candidates, errors, &errored, Vec::new(), &[]));
        }

        // Lowercase name -> index, only for candidates that survived naming
        let by_name = index_names(candidates, &errored);

        self.check_existence(candidates, &by_name, &mut errored, &mut errors);
        if !self.proceed(&errors) {
            return Err(failure(candidates, errors, &errored, Vec::new(), &[]));
        }

        self.check_versions(candidates, &by_name, &mut errored, &mut errors);
        if !self.proceed(&errors) {
            return Err(failure(candidates, errors, &errored, Vec::new(), &[]));
        }

        let (order, blocked) = self.sort(candidates, &by_name, &mut errored, &mut errors);
        let ordered: Vec<PluginCandidate> = order.into_iter().map(|i| candidates[i].clone()).collect();

        if errors.is_empty() {
            Ok(ordered)
        } else {
            Err(failure(candidates, errors, &errored, ordered, &blocked))
        }
    }

    fn proceed(&self, errors: &[DependencyError]) -> bool {
        errors.is_empty() || self.context.exhaustive
    }

    fn check_names(&self, candidates: &[PluginCandidate], errored: &mut [bool], errors: &mut Vec<DependencyError>) {
        // Groups keyed by lowercase name, kept in first-seen order
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        let mut group_of: HashMap<String, usize> = HashMap::new();

        for (i, candidate) in candidates.iter().enumerate() {
            let name = candidate.name();
            if name.is_empty() {
                errors.push(DependencyError::EmptyName {
                    identity: candidate.identity.to_string(),
                });
                errored[i] = true;
                continue;
            }
            if same_name(name, &self.context.reserved_name) {
                errors.push(DependencyError::ReservedName { name: name.to_string() });
                errored[i] = true;
                continue;
            }
            let key = name.to_lowercase();
            match group_of.get(&key) {
                Some(&g) => groups[g].1.push(i),
                None => {
                    group_of.insert(key, groups.len());
                    groups.push((name.to_string(), vec![i]));
                }
            }
        }

        for (name, members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
            for &i in &members {
                errored[i] = true;
            }
            errors.push(DependencyError::DuplicateName {
                name,
                identities: members.iter().map(|&i| candidates[i].identity.to_string()).collect(),
            });
        }
    }

    fn check_existence(
        &self,
        candidates: &[PluginCandidate],
        by_name: &HashMap<String, usize>,
        errored: &mut [bool],
        errors: &mut Vec<DependencyError>,
    ) {
        // Existence is judged against the set as it stood before this pass
        let eligible: Vec<bool> = errored.iter().map(|e| !e).collect();
        for (i, candidate) in candidates.iter().enumerate() {
            if !eligible[i] {
                continue;
            }
            for edge in candidate.manifest.required_edges(self.context.building) {
                let present = by_name
                    .get(&edge.to.to_lowercase())
                    .is_some_and(|&target| eligible[target]);
                if !present {
                    errors.push(DependencyError::MissingDependency {
                        plugin: candidate.name().to_string(),
                        dependency: edge.to.clone(),
                    });
                    errored[i] = true;
                }
            }
        }
    }

    fn check_versions(
        &self,
        candidates: &[PluginCandidate],
        by_name: &HashMap<String, usize>,
        errored: &mut [bool],
        errors: &mut Vec<DependencyError>,
    ) {
        let eligible: Vec<bool> = errored.iter().map(|e| !e).collect();
        for (i, candidate) in candidates.iter().enumerate() {
            if !eligible[i] {
                continue;
            }
            for dep in &candidate.manifest.dependencies {
                let Some(&target) = by_name.get(&dep.plugin_name.to_lowercase()) else {
                    continue;
                };
                let found = candidates[target].manifest.version;
                if let Some(required) = dep.min_version {
                    if !dep.is_satisfied_by(&found) {
                        errors.push(DependencyError::VersionMismatch {
                            plugin: candidate.name().to_string(),
                            dependency: candidates[target].name().to_string(),
                            required,
                            found,
                        });
                        errored[i] = true;
                    }
                }
            }
        }
    }

    /// For each candidate, the indices that must load before it:
    /// hard dependencies first, then hints. Unknown or errored targets are dropped.
    fn before_lists(
        &self,
        candidates: &[PluginCandidate],
        by_name: &HashMap<String, usize>,
        errored: &[bool],
    ) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
        let mut before: Vec<Vec<usize>> = vec![Vec::new(); candidates.len()];
        let mut hard: Vec<Vec<usize>> = vec![Vec::new(); candidates.len()];
        let mut seen: Vec<HashSet<usize>> = vec![HashSet::new(); candidates.len()];

        let lookup = |name: &str| {
            by_name
                .get(&name.to_lowercase())
                .copied()
                .filter(|&i| !errored[i])
        };

        let mut push = |from: usize, to: usize, kind: EdgeKind| {
            if from == to {
                return;
            }
            if kind == EdgeKind::Hard {
                hard[from].push(to);
            }
            if seen[from].insert(to) {
                before[from].push(to);
            }
        };

        for (i, candidate) in candidates.iter().enumerate() {
            if errored[i] {
                continue;
            }
            for edge in candidate.manifest.required_edges(false) {
                if let Some(to) = lookup(&edge.to) {
                    push(i, to, EdgeKind::Hard);
                }
            }
        }

        // Hints may originate from a manifest other than the one they constrain
        for (i, candidate) in candidates.iter().enumerate() {
            if errored[i] {
                continue;
            }
            for edge in candidate.manifest.order_edges() {
                if let (Some(from), Some(to)) = (lookup(&edge.from), lookup(&edge.to)) {
                    push(from, to, EdgeKind::OrderOnly);
                }
            }
        }

        (before, hard)
    }

    fn sort(
        &self,
        candidates: &[PluginCandidate],
        by_name: &HashMap<String, usize>,
        errored: &mut [bool],
        errors: &mut Vec<DependencyError>,
    ) -> (Vec<usize>, Vec<bool>) {
        let (before, hard) = self.before_lists(candidates, by_name, errored);
        let mut marks = vec![Mark::Unvisited; candidates.len()];
        // Not at fault, but a hard dependency was excluded
        let mut blocked = vec![false; candidates.len()];
        let mut order = Vec::with_capacity(candidates.len());
        let mut stack: Vec<Frame> = Vec::new();

        for root in 0..candidates.len() {
            if errored[root] || marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::Visiting;
            stack.push(Frame { node: root, cursor: 0 });

            while let Some(frame) = stack.last_mut() {
                let node = frame.node;
                if frame.cursor < before[node].len() {
                    let target = before[node][frame.cursor];
                    frame.cursor += 1;
                    // A node already in one cycle can close another
                    match marks[target] {
                        Mark::Placed => {}
                        Mark::Unvisited if errored[target] => {}
                        Mark::Unvisited => {
                            marks[target] = Mark::Visiting;
                            stack.push(Frame { node: target, cursor: 0 });
                        }
                        Mark::Visiting => {
                            let start = stack.iter().position(|f| f.node == target).unwrap_or(0);
                            let mut path: Vec<String> = stack[start..]
                                .iter()
                                .map(|f| candidates[f.node].name().to_string())
                                .collect();
                            path.push(candidates[target].name().to_string());
                            for f in &stack[start..] {
                                errored[f.node] = true;
                            }
                            errors.push(DependencyError::DependencyCycle(path));
                        }
                    }
                } else {
                    stack.pop();
                    marks[node] = Mark::Placed;
                    if errored[node] {
                        continue;
                    }
                    if hard[node].iter().any(|&d| errored[d] || blocked[d]) {
                        blocked[node] = true;
                        continue;
                    }
                    order.push(node);
                }
            }
        }

        (order, blocked)
    }
}

fn index_names(candidates: &[PluginCandidate], errored: &[bool]) -> HashMap<String, usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(i, _)| !errored[*i])
        .map(|(i, c)| (c.name().to_lowercase(), i))
        .collect()
}

fn failure(
    candidates: &[PluginCandidate],
    errors: Vec<DependencyError>,
    errored: &[bool],
    partial_order: Vec<PluginCandidate>,
    blocked: &[bool],
) -> ResolutionFailure {
    ResolutionFailure {
        errors,
        errored: candidates
            .iter()
            .zip(errored.iter())
            .filter(|(_, e)| **e)
            .map(|(c, _)| c.clone())
            .collect(),
        partial_order,
        blocked: candidates
            .iter()
            .zip(blocked.iter())
            .filter(|(_, b)| **b)
            .map(|(c, _)| c.clone())
            .collect(),
    }
}
