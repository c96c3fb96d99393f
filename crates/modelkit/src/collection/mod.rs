//! Ordered, observable sequences of models of one declared kind.
//!
//! Mutators resolve every input row through [`Collection::prepare_row`],
//! commit the new sequence and only then notify `add` / `remove` listeners,
//! so a handler always observes the final state.

use std::any::TypeId;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use log::trace;
use modelkit_util::{unique_id, EventTrigger, ListenerId};

use crate::error::EntityError;
use crate::guard::{CycleGuard, JsonStack};
use crate::model::{Model, WeakModel};
use crate::schema::{CollectionKind, CollectionSchema, ModelKind};
use crate::value::{compare_values, number_to_string, render_value, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionEventKind {
    Add,
    Remove,
}

impl CollectionEventKind {
    pub fn channel(self) -> &'static str {
        match self {
            CollectionEventKind::Add => "add",
            CollectionEventKind::Remove => "remove",
        }
    }
}

/// Payload of the `add` and `remove` notifications.
#[derive(Debug, Clone)]
pub struct CollectionEvent {
    pub kind: CollectionEventKind,
    pub model: Model,
    pub collection: Collection,
}

struct CollectionInner {
    kind: Rc<CollectionKind>,
    models: RefCell<Vec<Model>>,
    cid: String,
    parent: RefCell<WeakModel>,
    events: EventTrigger<CollectionEvent>,
}

/// Shared handle to one collection instance.
///
/// Members are held strongly. A member model whose fields lead back to this
/// collection forms a reference cycle that is never freed; clear a field or
/// [`reset`](Collection::reset) to break it.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("kind", &self.kind_name())
            .field("cid", &self.cid())
            .field("models", &*self.inner.models.borrow())
            .finish()
    }
}

/// Clamp a possibly negative index into `0..=len`, counting negative
/// indices from the end.
fn normalize_index(index: i64, len: usize) -> usize {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    index.clamp(0, len) as usize
}

impl Collection {
    /// Construct a collection of kind `C` from an array of rows or models.
    /// `Value::Null` constructs an empty collection.
    ///
    /// # Errors
    ///
    /// Schema compilation failures and any row rejected by
    /// [`Collection::prepare_row`].
    pub fn new<C: CollectionSchema>(rows: impl Into<Value>) -> Result<Self, EntityError> {
        Self::from_kind(CollectionKind::of::<C>()?, rows.into())
    }

    pub fn from_kind(kind: Rc<CollectionKind>, rows: Value) -> Result<Self, EntityError> {
        let collection = Self::blank(kind);
        let rows: Vec<Value> = match rows {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().cloned().collect(),
            Value::Collection(other) => other.models().into_iter().map(Value::Model).collect(),
            other => {
                return Err(EntityError::InvalidModelRow {
                    model: collection.model_kind().name().to_string(),
                    invalid_value: render_value(&other),
                })
            }
        };
        let models = rows
            .into_iter()
            .map(|row| collection.prepare_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        *collection.inner.models.borrow_mut() = models;

        if let Some(initialize) = collection.inner.kind.hooks().initialize {
            initialize(&collection);
        }
        Ok(collection)
    }

    fn blank(kind: Rc<CollectionKind>) -> Self {
        Self {
            inner: Rc::new(CollectionInner {
                kind,
                models: RefCell::new(Vec::new()),
                cid: unique_id("coll"),
                parent: RefCell::new(WeakModel::default()),
                events: EventTrigger::new(),
            }),
        }
    }

    fn with_models(&self, models: Vec<Model>) -> Self {
        let copy = Self::blank(Rc::clone(&self.inner.kind));
        *copy.inner.models.borrow_mut() = models;
        copy
    }

    // ── Identity ───────────────────────────────────────────────────────────

    pub fn kind_name(&self) -> &'static str {
        self.inner.kind.name()
    }

    pub fn kind_id(&self) -> TypeId {
        self.inner.kind.type_id()
    }

    /// Kind of the models this collection holds.
    pub fn model_kind(&self) -> &Rc<ModelKind> {
        self.inner.kind.model()
    }

    pub fn cid(&self) -> &str {
        &self.inner.cid
    }

    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn parent(&self) -> Option<Model> {
        self.inner.parent.borrow().upgrade()
    }

    pub fn set_parent(&self, parent: Option<&Model>) {
        *self.inner.parent.borrow_mut() = parent.map(Model::downgrade).unwrap_or_default();
    }

    // ── Notifications ──────────────────────────────────────────────────────

    pub fn events(&self) -> &EventTrigger<CollectionEvent> {
        &self.inner.events
    }

    /// Subscribe to `add` or `remove`.
    pub fn on(&self, channel: &str, handler: impl Fn(&CollectionEvent) + 'static) -> ListenerId {
        self.inner.events.on(channel, handler)
    }

    pub fn once(&self, channel: &str, handler: impl Fn(&CollectionEvent) + 'static) -> ListenerId {
        self.inner.events.once(channel, handler)
    }

    pub fn on_all(&self, handler: impl Fn(&str, &CollectionEvent) + 'static) -> ListenerId {
        self.inner.events.on_all(handler)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    fn emit(&self, kind: CollectionEventKind, models: &[Model]) {
        if models.is_empty() {
            return;
        }
        trace!(
            "{} {} emits {} x{}",
            self.kind_name(),
            self.cid(),
            kind.channel(),
            models.len()
        );
        for model in models {
            let event = CollectionEvent {
                kind,
                model: model.clone(),
                collection: self.clone(),
            };
            self.inner.events.trigger(kind.channel(), &event);
        }
    }

    // ── Rows ───────────────────────────────────────────────────────────────

    /// Resolve `row` into a model of the declared kind: a model of that kind
    /// is taken as is and a plain object constructs a new one.
    ///
    /// # Errors
    ///
    /// [`EntityError::WrongModelKind`] for a model of another kind,
    /// [`EntityError::InvalidModelRow`] for anything that is not an object,
    /// or the construction error of the new model.
    pub fn prepare_row(&self, row: impl Into<Value>) -> Result<Model, EntityError> {
        let kind = self.model_kind();
        match row.into() {
            Value::Model(model) if model.kind_id() == kind.type_id() => Ok(model),
            Value::Model(model) => Err(EntityError::WrongModelKind {
                expected: kind.name().to_string(),
                actual: model.kind_name().to_string(),
                collection: Some(self.kind_name().to_string()),
            }),
            row @ Value::Object(_) => Model::from_kind(Rc::clone(kind), row),
            other => Err(EntityError::InvalidModelRow {
                model: kind.name().to_string(),
                invalid_value: render_value(&other),
            }),
        }
    }

    fn prepare_rows<I, V>(&self, rows: I) -> Result<Vec<Model>, EntityError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        rows.into_iter().map(|row| self.prepare_row(row)).collect()
    }

    // ── Mutators ───────────────────────────────────────────────────────────

    pub fn at(&self, index: usize) -> Option<Model> {
        self.inner.models.borrow().get(index).cloned()
    }

    /// Put `row` at `index`. An occupied slot emits `remove` for the
    /// displaced model before `add`; `index == len` appends.
    ///
    /// # Errors
    ///
    /// [`EntityError::IndexOutOfBounds`] past the end, or a rejected row.
    pub fn set_at(&self, index: usize, row: impl Into<Value>) -> Result<(), EntityError> {
        let length = self.len();
        if index > length {
            return Err(EntityError::IndexOutOfBounds { index, length });
        }
        let model = self.prepare_row(row)?;

        let removed = {
            let mut models = self.inner.models.borrow_mut();
            if index == models.len() {
                models.push(model.clone());
                None
            } else {
                Some(std::mem::replace(&mut models[index], model.clone()))
            }
        };

        if let Some(removed) = removed {
            self.emit(CollectionEventKind::Remove, &[removed]);
        }
        self.emit(CollectionEventKind::Add, &[model]);
        Ok(())
    }

    /// Append rows. Nothing is added when any row is rejected.
    pub fn push<I, V>(&self, rows: I) -> Result<(), EntityError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let added = self.prepare_rows(rows)?;
        self.inner.models.borrow_mut().extend(added.iter().cloned());
        self.emit(CollectionEventKind::Add, &added);
        Ok(())
    }

    /// Like [`Collection::push`], but array arguments are flattened one
    /// level.
    pub fn add<I, V>(&self, rows: I) -> Result<(), EntityError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut flat = Vec::new();
        for row in rows {
            match row.into() {
                Value::Array(items) => flat.extend(items.iter().cloned()),
                row => flat.push(row),
            }
        }
        self.push(flat)
    }

    /// Prepend rows, keeping their relative order.
    pub fn unshift<I, V>(&self, rows: I) -> Result<(), EntityError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let added = self.prepare_rows(rows)?;
        {
            let mut models = self.inner.models.borrow_mut();
            let tail = std::mem::replace(&mut *models, added.clone());
            models.extend(tail);
        }
        self.emit(CollectionEventKind::Add, &added);
        Ok(())
    }

    pub fn pop(&self) -> Option<Model> {
        let removed = self.inner.models.borrow_mut().pop()?;
        self.emit(CollectionEventKind::Remove, std::slice::from_ref(&removed));
        Some(removed)
    }

    pub fn shift(&self) -> Option<Model> {
        let removed = {
            let mut models = self.inner.models.borrow_mut();
            if models.is_empty() {
                return None;
            }
            models.remove(0)
        };
        self.emit(CollectionEventKind::Remove, std::slice::from_ref(&removed));
        Some(removed)
    }

    /// Overwrite the slots `start..end` with new models built from `row`,
    /// one per slot. Indices normalize like array `fill`: negatives count
    /// from the end and `end` defaults to the length.
    pub fn fill(&self, row: impl Into<Value>, start: i64, end: Option<i64>) -> Result<(), EntityError> {
        let row = row.into();
        let length = self.len();
        let from = normalize_index(start, length);
        let to = end.map_or(length, |end| normalize_index(end, length));
        if from >= to {
            return Ok(());
        }

        let added = (from..to)
            .map(|_| self.prepare_row(row.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let removed: Vec<Model> = self
            .inner
            .models
            .borrow_mut()
            .splice(from..to, added.iter().cloned())
            .collect();

        self.emit(CollectionEventKind::Remove, &removed);
        self.emit(CollectionEventKind::Add, &added);
        Ok(())
    }

    /// Remove `delete_count` models from `start` and insert `rows` in their
    /// place. Returns the removed models.
    pub fn splice<I, V>(&self, start: i64, delete_count: usize, rows: I) -> Result<Vec<Model>, EntityError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let added = self.prepare_rows(rows)?;
        let length = self.len();
        let from = normalize_index(start, length);
        let to = from + delete_count.min(length - from);

        let removed: Vec<Model> = self
            .inner
            .models
            .borrow_mut()
            .splice(from..to, added.iter().cloned())
            .collect();

        self.emit(CollectionEventKind::Remove, &removed);
        self.emit(CollectionEventKind::Add, &added);
        Ok(removed)
    }

    /// Remove every model, emitting one `remove` per model in order.
    pub fn reset(&self) {
        let removed = std::mem::take(&mut *self.inner.models.borrow_mut());
        self.emit(CollectionEventKind::Remove, &removed);
    }

    /// Build one model from `row`, append it and return it.
    pub fn create(&self, row: impl Into<Value>) -> Result<Model, EntityError> {
        let model = self.prepare_row(row)?;
        self.inner.models.borrow_mut().push(model.clone());
        self.emit(CollectionEventKind::Add, std::slice::from_ref(&model));
        Ok(model)
    }

    /// Remove the first model that is `target` (a model) or whose primary
    /// value is `target` (an id).
    pub fn remove(&self, target: impl Into<Value>) -> Option<Model> {
        let target = target.into();
        let index = match &target {
            Value::Model(model) => self.index_of(model),
            id => self.find_index(|model| model.primary_value().same(id)),
        }?;
        let removed = self.inner.models.borrow_mut().remove(index);
        self.emit(CollectionEventKind::Remove, std::slice::from_ref(&removed));
        Some(removed)
    }

    /// Model whose primary value is `id`.
    pub fn get(&self, id: impl Into<Value>) -> Option<Model> {
        let id = id.into();
        self.find(|model| model.primary_value().same(&id))
    }

    /// Sort in place with `compare`. No notifications.
    ///
    /// `compare` sees the collection unsorted. Changes it makes to the
    /// collection are overwritten by the sorted snapshot.
    pub fn sort_by(&self, mut compare: impl FnMut(&Model, &Model) -> Ordering) {
        let mut models = self.models();
        models.sort_by(|a, b| compare(a, b));
        *self.inner.models.borrow_mut() = models;
    }

    /// Sort ascending by `keys`, later keys breaking ties of earlier ones.
    ///
    /// # Errors
    ///
    /// [`EntityError::InvalidSortParams`] when `keys` is empty.
    pub fn sort_by_keys(&self, keys: &[&str]) -> Result<(), EntityError> {
        if keys.is_empty() {
            return Err(EntityError::InvalidSortParams);
        }
        self.sort_by(|a, b| {
            keys.iter()
                .map(|key| compare_values(&a.get(key), &b.get(key)))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(())
    }

    pub fn reverse(&self) {
        self.inner.models.borrow_mut().reverse();
    }

    /// New collection of the same kind holding this collection's models
    /// followed by those of `others` (collections or arrays of rows).
    pub fn concat<I, V>(&self, others: I) -> Result<Collection, EntityError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut models = self.models();
        for other in others {
            match other.into() {
                Value::Collection(collection) => {
                    models.extend(self.prepare_rows(collection.models())?);
                }
                Value::Array(rows) => models.extend(self.prepare_rows(rows.iter().cloned())?),
                row => models.push(self.prepare_row(row)?),
            }
        }
        Ok(self.with_models(models))
    }

    // ── Read-only projections ──────────────────────────────────────────────

    /// Snapshot of the current sequence.
    pub fn models(&self) -> Vec<Model> {
        self.inner.models.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.models.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.models.borrow().is_empty()
    }

    pub fn first(&self) -> Option<Model> {
        self.inner.models.borrow().first().cloned()
    }

    pub fn last(&self) -> Option<Model> {
        self.inner.models.borrow().last().cloned()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Model, usize)) {
        for (index, model) in self.models().iter().enumerate() {
            f(model, index);
        }
    }

    pub fn find(&self, mut predicate: impl FnMut(&Model) -> bool) -> Option<Model> {
        self.models().into_iter().find(|model| predicate(model))
    }

    pub fn find_index(&self, mut predicate: impl FnMut(&Model) -> bool) -> Option<usize> {
        self.models().iter().position(|model| predicate(model))
    }

    pub fn filter(&self, mut predicate: impl FnMut(&Model) -> bool) -> Vec<Model> {
        self.models()
            .into_iter()
            .filter(|model| predicate(model))
            .collect()
    }

    pub fn map<T>(&self, f: impl FnMut(&Model) -> T) -> Vec<T> {
        self.models().iter().map(f).collect()
    }

    /// Map then flatten one level.
    pub fn flat_map<T, I>(&self, f: impl FnMut(&Model) -> I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        self.models().iter().flat_map(f).collect()
    }

    pub fn reduce<T>(&self, init: T, f: impl FnMut(T, &Model) -> T) -> T {
        self.models().iter().fold(init, f)
    }

    pub fn reduce_right<T>(&self, init: T, f: impl FnMut(T, &Model) -> T) -> T {
        self.models().iter().rev().fold(init, f)
    }

    pub fn every(&self, mut predicate: impl FnMut(&Model) -> bool) -> bool {
        self.models().iter().all(|model| predicate(model))
    }

    pub fn some(&self, mut predicate: impl FnMut(&Model) -> bool) -> bool {
        self.models().iter().any(|model| predicate(model))
    }

    /// Models in `start..end`, with array `slice` index normalization.
    pub fn slice(&self, start: i64, end: Option<i64>) -> Vec<Model> {
        let models = self.inner.models.borrow();
        let from = normalize_index(start, models.len());
        let to = end.map_or(models.len(), |end| normalize_index(end, models.len()));
        if from >= to {
            return Vec::new();
        }
        models[from..to].to_vec()
    }

    pub fn index_of(&self, model: &Model) -> Option<usize> {
        self.inner.models.borrow().iter().position(|m| m.ptr_eq(model))
    }

    pub fn last_index_of(&self, model: &Model) -> Option<usize> {
        self.inner.models.borrow().iter().rposition(|m| m.ptr_eq(model))
    }

    pub fn includes(&self, model: &Model) -> bool {
        self.index_of(model).is_some()
    }

    /// Models rendered by primary value (or cid without one), joined by
    /// `separator`.
    pub fn join(&self, separator: &str) -> String {
        self.map(|model| match model.primary_value() {
            Value::Null => model.cid().to_string(),
            Value::String(s) => s,
            Value::Number(n) => number_to_string(n),
            other => render_value(&other),
        })
        .join(separator)
    }

    // ── Graph algorithms ───────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<serde_json::Value, EntityError> {
        self.to_json_with(&mut JsonStack::new())
    }

    pub fn to_json_with(&self, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
        stack.within(self.identity(), |stack| {
            self.models()
                .iter()
                .map(|model| model.to_json_with(stack))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array)
        })
    }

    /// Deep copy of the collection and its models. The copy has no
    /// listeners and no parent.
    pub fn deep_clone(&self) -> Collection {
        self.deep_clone_with(&mut CycleGuard::new())
    }

    pub fn deep_clone_with(&self, guard: &mut CycleGuard) -> Collection {
        if let Some(Value::Collection(done)) = guard.get(self.identity()) {
            return done.clone();
        }
        let copy = self.with_models(Vec::new());
        guard.add(self.identity(), Value::Collection(copy.clone()));

        let models = self
            .models()
            .iter()
            .map(|model| model.deep_clone_with(guard))
            .collect();
        *copy.inner.models.borrow_mut() = models;
        copy
    }

    /// Element-wise equality with another collection or an array of models
    /// or plain rows.
    pub fn equal(&self, other: impl Into<Value>) -> bool {
        self.equal_with(&other.into(), &mut CycleGuard::new())
    }

    pub fn equal_with(&self, other: &Value, guard: &mut CycleGuard) -> bool {
        let id = self.identity();
        if let Some(seen) = guard.get(id) {
            return seen.same(other);
        }
        guard.add(id, other.clone());

        let others: Vec<Value> = match other {
            Value::Collection(collection) => {
                collection.models().into_iter().map(Value::Model).collect()
            }
            Value::Array(items) => items.iter().cloned().collect(),
            _ => return false,
        };
        let models = self.models();
        models.len() == others.len()
            && models
                .iter()
                .zip(others.iter())
                .all(|(model, other)| model.equal_with(other, guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use crate::type_def::{Structure, TypeParams};
    use serde_json::json;

    struct Item;

    impl ModelSchema for Item {
        fn structure() -> Structure {
            Structure::new()
                .field("id", TypeParams::new("number").primary())
                .field("name", "string")
        }
    }

    struct Items;

    impl CollectionSchema for Items {
        type Model = Item;
    }

    fn items(ids: &[i32]) -> Collection {
        let rows: Vec<serde_json::Value> = ids.iter().map(|id| json!({"id": id})).collect();
        Collection::new::<Items>(json!(rows)).unwrap()
    }

    fn ids(collection: &Collection) -> Vec<f64> {
        collection.map(|model| model.primary_value().as_f64().unwrap_or(f64::NAN))
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(-1, 3), 2);
        assert_eq!(normalize_index(-10, 3), 0);
        assert_eq!(normalize_index(10, 3), 3);
        assert_eq!(normalize_index(1, 3), 1);
    }

    #[test]
    fn test_set_at_bounds() {
        let coll = items(&[1, 2]);
        assert_eq!(
            coll.set_at(3, json!({"id": 9})),
            Err(EntityError::IndexOutOfBounds {
                index: 3,
                length: 2
            })
        );
        coll.set_at(2, json!({"id": 3})).unwrap();
        coll.set_at(0, json!({"id": 7})).unwrap();
        assert_eq!(ids(&coll), vec![7.0, 2.0, 3.0]);
    }

    #[test]
    fn test_splice_negative_start() {
        let coll = items(&[1, 2, 3, 4]);
        let removed = coll.splice(-2, 5, [json!({"id": 9})]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(ids(&coll), vec![1.0, 2.0, 9.0]);
    }

    #[test]
    fn test_slice_and_join() {
        let coll = items(&[1, 2, 3]);
        let tail: Vec<Value> = coll.slice(-2, None).iter().map(Model::primary_value).collect();
        assert_eq!(tail.len(), 2);
        assert!(coll.slice(2, Some(1)).is_empty());
        assert_eq!(coll.join(","), "1,2,3");
    }

    #[test]
    fn test_remove_by_id_and_model() {
        let coll = items(&[1, 2, 3]);
        assert!(coll.remove(2).is_some());
        assert!(coll.remove(2).is_none());
        let first = coll.first().unwrap();
        assert!(coll.remove(&first).unwrap().ptr_eq(&first));
        assert_eq!(ids(&coll), vec![3.0]);
    }
}
