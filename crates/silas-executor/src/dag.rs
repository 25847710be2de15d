//! Dependency closure resolution and deterministic topological ordering.

use crate::error::{ExecutorError, ExecutorResult};
use silas_core::ports::WorkItemStore;
use silas_core::WorkItem;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Walk `root`'s `depends_on` (and, for the root, its `tasks`) breadth-first,
/// fetching each unseen id from `store`. Fails if any referenced id has no
/// matching record.
pub async fn resolve_closure(
    store: &dyn WorkItemStore,
    root: &WorkItem,
) -> ExecutorResult<(HashMap<String, WorkItem>, HashMap<String, BTreeSet<String>>)> {
    let mut items_by_id: HashMap<String, WorkItem> = HashMap::new();
    items_by_id.insert(root.id.clone(), root.clone());
    let mut prerequisites: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut pending: VecDeque<String> = VecDeque::from([root.id.clone()]);

    while let Some(current_id) = pending.pop_front() {
        let current = items_by_id.get(&current_id).expect("enqueued id is always present").clone();

        let mut deps: BTreeSet<String> = current.depends_on.iter().cloned().collect();
        if current.id == root.id {
            deps.extend(current.tasks.iter().cloned());
        }
        prerequisites.insert(current_id.clone(), deps.clone());

        for dep_id in deps {
            if items_by_id.contains_key(&dep_id) {
                continue;
            }
            let dependency = store
                .get(&dep_id)
                .await
                .map_err(|e| ExecutorError::MissingDependency(format!("{dep_id}' ({e})")))?
                .ok_or_else(|| ExecutorError::MissingDependency(dep_id.clone()))?;
            items_by_id.insert(dep_id.clone(), dependency);
            pending.push_back(dep_id);
        }
    }

    Ok((items_by_id, prerequisites))
}

/// Kahn's algorithm with a lexicographic tie-break among ready ids, so the
/// order is deterministic across runs for the same dependency graph.
pub fn topological_sort(prerequisites: &HashMap<String, BTreeSet<String>>) -> ExecutorResult<Vec<String>> {
    let mut remaining: HashMap<String, BTreeSet<String>> = prerequisites.clone();
    let mut dependents: HashMap<String, BTreeSet<String>> =
        remaining.keys().map(|id| (id.clone(), BTreeSet::new())).collect();

    for (item_id, deps) in &remaining {
        for dep_id in deps {
            dependents
                .get_mut(dep_id)
                .ok_or_else(|| ExecutorError::MissingDependency(dep_id.clone()))?
                .insert(item_id.clone());
        }
    }

    let mut ready: BTreeSet<String> = remaining.iter().filter(|(_, deps)| deps.is_empty()).map(|(id, _)| id.clone()).collect();
    let mut order: Vec<String> = Vec::new();
    let mut ordered: HashSet<String> = HashSet::new();

    while let Some(current) = ready.iter().next().cloned() {
        ready.remove(&current);
        order.push(current.clone());
        ordered.insert(current.clone());

        if let Some(deps_of) = dependents.get(&current) {
            for dependent in deps_of.clone() {
                if let Some(deps) = remaining.get_mut(&dependent) {
                    deps.remove(&current);
                    if deps.is_empty() && !ordered.contains(&dependent) {
                        ready.insert(dependent);
                    }
                }
            }
        }
    }

    if order.len() != remaining.len() {
        let mut unresolved: Vec<String> = remaining.keys().filter(|id| !ordered.contains(*id)).cloned().collect();
        unresolved.sort();
        return Err(ExecutorError::CircularDependency(unresolved.join(" -> ")));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(pairs: &[(&str, &[&str])]) -> HashMap<String, BTreeSet<String>> {
        pairs.iter().map(|(id, d)| ((*id).to_string(), d.iter().map(|s| (*s).to_string()).collect())).collect()
    }

    #[test]
    fn sorts_with_lexicographic_tie_break() {
        let prereqs = deps(&[("c", &["a", "b"]), ("a", &[]), ("b", &[])]);
        assert_eq!(topological_sort(&prereqs).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_a_cycle() {
        let prereqs = deps(&[("a", &["b"]), ("b", &["a"])]);
        assert!(matches!(topological_sort(&prereqs), Err(ExecutorError::CircularDependency(_))));
    }

    #[test]
    fn independent_chains_stay_lexicographic_among_ready() {
        let prereqs = deps(&[("z", &[]), ("y", &["z"]), ("x", &[])]);
        assert_eq!(topological_sort(&prereqs).unwrap(), vec!["x", "z", "y"]);
    }
}
