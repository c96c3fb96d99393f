//! Depth-first traversal over nested models, and the upward searches along
//! the parent chain.

use std::collections::HashSet;
use std::ops::ControlFlow;

use super::Model;
use crate::schema::ModelSchema;
use crate::value::Value;
use crate::walker::Walker;

impl Model {
    /// Models directly reachable from this model's fields: model values,
    /// models inside plain arrays and the models of collections.
    fn children(&self) -> Vec<Model> {
        let mut out = Vec::new();
        for value in self.row().values() {
            match value {
                Value::Model(model) => out.push(model.clone()),
                Value::Array(items) => {
                    out.extend(items.iter().filter_map(Value::as_model).cloned());
                }
                Value::Collection(collection) => out.extend(collection.models()),
                _ => {}
            }
        }
        out
    }

    /// Pre-order walk over every model reachable from this one. The root
    /// itself is not passed to `f`.
    ///
    /// Each model is visited at most once per walk. Calling
    /// [`Walker::exit`] stops the walk; [`Walker::skip`] keeps the walk from
    /// descending into the model just visited.
    pub fn walk(&self, mut f: impl FnMut(&Model, &mut Walker)) {
        let mut visited = HashSet::new();
        let _ = self.walk_with(&mut f, &mut visited);
    }

    /// [`Model::walk`] with a caller-owned visited set, so several walks can
    /// share one frontier. Returns `Break` once the walk was exited.
    pub fn walk_with<F>(&self, f: &mut F, visited: &mut HashSet<usize>) -> ControlFlow<()>
    where
        F: FnMut(&Model, &mut Walker),
    {
        for child in self.children() {
            if !visited.insert(child.identity()) {
                continue;
            }

            let mut walker = Walker::new();
            f(&child, &mut walker);
            if walker.is_exited() {
                return ControlFlow::Break(());
            }
            if walker.is_skipped() {
                continue;
            }
            if child.walk_with(f, visited).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// First nested model matching `predicate`, in walk order.
    pub fn find_child(&self, mut predicate: impl FnMut(&Model) -> bool) -> Option<Model> {
        let mut found = None;
        self.walk(|model, walker| {
            if predicate(model) {
                found = Some(model.clone());
                walker.exit();
            }
        });
        found
    }

    /// Every nested model matching `predicate`, in walk order.
    pub fn filter_children(&self, mut predicate: impl FnMut(&Model) -> bool) -> Vec<Model> {
        let mut out = Vec::new();
        self.walk(|model, _| {
            if predicate(model) {
                out.push(model.clone());
            }
        });
        out
    }

    pub fn filter_children_by_instance<M: ModelSchema>(&self) -> Vec<Model> {
        self.filter_children(Model::is::<M>)
    }

    /// Ancestors from the nearest parent upwards. A parent chain that loops
    /// back on itself ends at the first repeat.
    fn ancestors(&self) -> Vec<Model> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        let mut next = self.parent();
        while let Some(parent) = next {
            if !visited.insert(parent.identity()) {
                break;
            }
            next = parent.parent();
            out.push(parent);
        }
        out
    }

    pub fn find_parent(&self, mut predicate: impl FnMut(&Model) -> bool) -> Option<Model> {
        self.ancestors().into_iter().find(|model| predicate(model))
    }

    pub fn filter_parents(&self, mut predicate: impl FnMut(&Model) -> bool) -> Vec<Model> {
        self.ancestors()
            .into_iter()
            .filter(|model| predicate(model))
            .collect()
    }

    pub fn find_parent_instance<M: ModelSchema>(&self) -> Option<Model> {
        self.find_parent(Model::is::<M>)
    }
}
