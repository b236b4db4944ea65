// toposort.rs — Stable topological order of a pipeline's calls
//
// A call must print after every call whose outputs its bindings reference.
// Among calls with no ordering constraint, source order wins: Kahn's
// algorithm driven by a min-heap on the source index gives the minimal
// reordering.
//
// Preconditions: call ids are unique within the slice.
// Postconditions: returns a permutation of `0..calls.len()`.
// Failure modes: a dependency cycle is a malformed AST; it is logged and the
//   calls caught in it keep source order after everything that could sort.
// Side effects: logs a warning on cycles.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::ast::{CallStm, RefTarget};
use crate::intern::Sym;

/// Indices of `calls` in print order.
pub fn topo_order(calls: &[CallStm]) -> Vec<usize> {
    let index: HashMap<_, _> = calls.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

    // dependents[j] lists calls that must come after call j.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); calls.len()];
    let mut indegree = vec![0usize; calls.len()];
    for (i, call) in calls.iter().enumerate() {
        let mut deps = dependencies(call, &index);
        deps.retain(|&j| j != i);
        deps.sort_unstable();
        deps.dedup();
        indegree[i] = deps.len();
        for j in deps {
            dependents[j].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(calls.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &k in &dependents[i] {
            indegree[k] -= 1;
            if indegree[k] == 0 {
                ready.push(Reverse(k));
            }
        }
    }

    if order.len() < calls.len() {
        log::warn!(
            "call dependency cycle among {} calls; keeping their source order",
            calls.len() - order.len()
        );
        let mut placed = vec![false; calls.len()];
        for &i in &order {
            placed[i] = true;
        }
        order.extend((0..calls.len()).filter(|&i| !placed[i]));
    }
    order
}

/// Indices of the calls `call` references, through every binding
/// (modifier bindings included) and nested array/map value.
fn dependencies(call: &CallStm, index: &HashMap<Sym, usize>) -> Vec<usize> {
    let mut deps = Vec::new();
    let mut visit = |target: &RefTarget| {
        if let RefTarget::Call { id, .. } = target {
            if let Some(&j) = index.get(id) {
                deps.push(j);
            }
        }
    };
    let modifier_bindings = call.modifiers.bindings.iter().flat_map(|b| b.list.iter());
    for binding in call.bindings.list.iter().chain(modifier_bindings) {
        binding.exp.for_each_ref(&mut |r| visit(&r.target));
    }
    deps
}
