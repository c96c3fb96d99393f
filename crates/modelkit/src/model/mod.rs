//! Schema-validated entities.
//!
//! A [`Model`] holds one frozen snapshot of its fields (the row). Every
//! successful `set` replaces the row wholesale and notifies listeners with
//! the previous and the new values.

mod walk;

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use log::trace;
use modelkit_util::{unique_id, EventTrigger, ListenerId};

use crate::error::EntityError;
use crate::guard::{CycleGuard, JsonStack};
use crate::schema::{ModelKind, ModelSchema};
use crate::type_def::classes::any;
use crate::type_def::Type;
use crate::value::{render_value, Fields, Row, Value};

/// Options of [`Model::set_with`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    /// Run the whole pipeline, including the row `validate` hook, without
    /// committing or notifying.
    pub only_validate: bool,
}

/// Payload of model notifications.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// Emitted on `change:<key>` for every changed field.
    ChangeKey { key: String, prev: Value, change: Value },
    /// Emitted on `change` once per committed `set`, after the field events.
    Change { prev: Row, changes: Fields },
}

pub(crate) struct ModelInner {
    kind: Rc<ModelKind>,
    row: RefCell<Row>,
    primary_value: RefCell<Value>,
    initializing: Cell<bool>,
    cid: String,
    parent: RefCell<WeakModel>,
    events: EventTrigger<ModelEvent>,
}

/// Non-owning reference to a model, used for `parent` links.
#[derive(Clone, Default)]
pub(crate) struct WeakModel(Weak<ModelInner>);

impl WeakModel {
    pub(crate) fn upgrade(&self) -> Option<Model> {
        self.0.upgrade().map(|inner| Model { inner })
    }
}

/// Shared handle to one model instance. Cloning the handle does not copy the
/// model; use [`Model::deep_clone`] for that.
///
/// Field values are held strongly and `parent` weakly. A model reachable from
/// its own fields keeps itself alive until one of those fields is cleared.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("kind", &self.kind_name())
            .field("cid", &self.cid())
            .field("row", &self.row())
            .finish()
    }
}

impl Model {
    /// Construct a model of kind `M` from a plain object (or another model,
    /// whose row is copied). `Value::Null` constructs from defaults alone.
    ///
    /// # Errors
    ///
    /// Schema compilation failures on first use of `M`, and any failure of
    /// the initial `set`.
    pub fn new<M: ModelSchema>(input: impl Into<Value>) -> Result<Self, EntityError> {
        Self::from_kind(ModelKind::of::<M>()?, input.into())
    }

    /// Construct a model of an already compiled kind.
    pub fn from_kind(kind: Rc<ModelKind>, input: Value) -> Result<Self, EntityError> {
        let model = Self::blank(kind);

        let kind = Rc::clone(&model.inner.kind);
        let mut defaults = Fields::with_capacity(kind.fields().len());
        for (key, ty) in kind.fields() {
            let value = ty.prepare(ty.default_value(), key, &model)?;
            defaults.insert(key.clone(), value);
        }
        for (key, ty) in kind.fields() {
            if let Some(value) = defaults.get(key) {
                ty.adopt(value, &model);
            }
        }
        *model.inner.row.borrow_mut() = Rc::new(defaults);
        model.refresh_primary_value();

        let input = match input {
            Value::Null => Value::object(Fields::new()),
            other => other,
        };
        model.inner.initializing.set(true);
        let initial = model.set(input);
        model.inner.initializing.set(false);
        initial?;

        if let Some(initialize) = kind.hooks().initialize {
            initialize(&model);
        }
        Ok(model)
    }

    /// A model with no declared fields, usable as the owner when preparing
    /// values outside of any entity.
    pub fn detached() -> Self {
        Self::blank(Rc::new(ModelKind::detached()))
    }

    fn blank(kind: Rc<ModelKind>) -> Self {
        Self {
            inner: Rc::new(ModelInner {
                kind,
                row: RefCell::new(Rc::new(Fields::new())),
                primary_value: RefCell::new(Value::Null),
                initializing: Cell::new(false),
                cid: unique_id("mod"),
                parent: RefCell::new(WeakModel::default()),
                events: EventTrigger::new(),
            }),
        }
    }

    // ── Identity ───────────────────────────────────────────────────────────

    pub fn kind(&self) -> &Rc<ModelKind> {
        &self.inner.kind
    }

    pub fn kind_name(&self) -> &'static str {
        self.inner.kind.name()
    }

    pub fn kind_id(&self) -> TypeId {
        self.inner.kind.type_id()
    }

    /// Whether this model is of kind `M`.
    pub fn is<M: ModelSchema>(&self) -> bool {
        self.kind_id() == TypeId::of::<M>()
    }

    /// Opaque per-instance id, e.g. `mod12`.
    pub fn cid(&self) -> &str {
        &self.inner.cid
    }

    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Row access ─────────────────────────────────────────────────────────

    /// The current snapshot.
    pub fn row(&self) -> Row {
        Rc::clone(&self.inner.row.borrow())
    }

    pub fn get(&self, key: &str) -> Value {
        self.inner
            .row
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.inner.row.borrow().contains_key(key)
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.inner
            .row
            .borrow()
            .get(key)
            .is_some_and(|value| !value.is_null())
    }

    /// Type governing `key`: its declaration or the catch-all.
    pub fn description(&self, key: &str) -> Option<&Rc<Type>> {
        self.inner.kind.description(key)
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.inner.kind.primary_key()
    }

    /// Mirror of the primary key's value; `Value::Null` without one.
    pub fn primary_value(&self) -> Value {
        self.inner.primary_value.borrow().clone()
    }

    fn refresh_primary_value(&self) {
        if let Some(key) = self.inner.kind.primary_key() {
            let value = self.get(key);
            *self.inner.primary_value.borrow_mut() = value;
        }
    }

    // ── Parent ─────────────────────────────────────────────────────────────

    pub fn parent(&self) -> Option<Model> {
        self.inner.parent.borrow().upgrade()
    }

    /// Non-owning back-reference used by the upward searches only.
    pub fn set_parent(&self, parent: Option<&Model>) {
        *self.inner.parent.borrow_mut() = parent.map(Model::downgrade).unwrap_or_default();
    }

    pub(crate) fn downgrade(&self) -> WeakModel {
        WeakModel(Rc::downgrade(&self.inner))
    }

    // ── Notifications ──────────────────────────────────────────────────────

    pub fn events(&self) -> &EventTrigger<ModelEvent> {
        &self.inner.events
    }

    /// Subscribe to `change` or `change:<key>`.
    pub fn on(&self, channel: &str, handler: impl Fn(&ModelEvent) + 'static) -> ListenerId {
        self.inner.events.on(channel, handler)
    }

    pub fn once(&self, channel: &str, handler: impl Fn(&ModelEvent) + 'static) -> ListenerId {
        self.inner.events.once(channel, handler)
    }

    /// Subscribe to every channel; the handler receives the channel name.
    pub fn on_all(&self, handler: impl Fn(&str, &ModelEvent) + 'static) -> ListenerId {
        self.inner.events.on_all(handler)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    // ── Set pipeline ───────────────────────────────────────────────────────

    /// Merge `input` (a plain object or another model) into the row.
    ///
    /// # Errors
    ///
    /// [`EntityError::DataShouldBeObject`] for other input, the key and value
    /// errors of the field types, [`EntityError::ConstValue`] and
    /// [`EntityError::Required`], or the error returned by the row
    /// `validate` hook. On error the row is left untouched.
    pub fn set(&self, input: impl Into<Value>) -> Result<(), EntityError> {
        self.set_with(input, SetOptions::default())
    }

    pub fn set_with(&self, input: impl Into<Value>, options: SetOptions) -> Result<(), EntityError> {
        let fields = match input.into() {
            Value::Object(fields) => fields,
            Value::Model(model) => model.row(),
            _ => return Err(EntityError::DataShouldBeObject),
        };
        self.apply(&fields, options)
    }

    /// Whether `input` would be accepted by `set`.
    ///
    /// # Errors
    ///
    /// [`EntityError::DataShouldBeObject`] when `input` is not an object.
    pub fn is_valid(&self, input: impl Into<Value>) -> Result<bool, EntityError> {
        let input = input.into();
        if !matches!(input, Value::Object(_)) {
            return Err(EntityError::DataShouldBeObject);
        }
        Ok(self
            .set_with(
                input,
                SetOptions {
                    only_validate: true,
                },
            )
            .is_ok())
    }

    fn field_type<'k>(kind: &'k ModelKind, key: &str) -> Result<&'k Rc<Type>, EntityError> {
        if let Some(ty) = kind.field(key) {
            return Ok(ty);
        }
        match kind.any_key() {
            Some(ty) if ty.validate_key(key) => Ok(ty),
            Some(_) => Err(EntityError::InvalidKey {
                key: key.to_string(),
            }),
            None => Err(EntityError::UnknownProperty {
                key: key.to_string(),
            }),
        }
    }

    fn apply(&self, input: &Fields, options: SetOptions) -> Result<(), EntityError> {
        let kind = Rc::clone(&self.inner.kind);
        let old = self.row();
        let mut staged: Fields = (*old).clone();

        for (key, raw) in input {
            let ty = Self::field_type(&kind, key)?;
            let value = ty.prepare(raw.clone(), key, self)?;
            if !ty.validate(&value, key) {
                return Err(EntityError::InvalidValue {
                    key: key.clone(),
                    value: render_value(&value),
                });
            }
            staged.insert(key.clone(), value);
        }

        let prepare_hook = kind.hooks().prepare;
        if let Some(prepare) = prepare_hook {
            prepare(&mut staged);
        }

        let initializing = self.inner.initializing.get();
        let mut changes = Fields::new();
        for (key, value) in staged.iter_mut() {
            let ty = Self::field_type(&kind, key)?;
            if prepare_hook.is_some() {
                *value = ty.prepare(std::mem::take(value), key, self)?;
            }

            let changed = old.get(key).map_or(true, |prev| !prev.same(value));
            if changed && ty.is_const() && !initializing {
                return Err(EntityError::ConstValue { key: key.clone() });
            }
            if ty.is_required() && value.is_null() {
                return Err(EntityError::Required { key: key.clone() });
            }
            if changed {
                changes.insert(key.clone(), value.clone());
            }
        }

        if changes.is_empty() {
            return Ok(());
        }

        let row: Row = Rc::new(staged);
        if let Some(validate) = kind.hooks().validate {
            validate(&row)?;
        }
        if options.only_validate {
            return Ok(());
        }

        *self.inner.row.borrow_mut() = Rc::clone(&row);
        self.refresh_primary_value();
        for (key, change) in &changes {
            if let Ok(ty) = Self::field_type(&kind, key) {
                ty.adopt(change, self);
            }
        }
        trace!(
            "{} {} committed {} change(s)",
            kind.name(),
            self.cid(),
            changes.len()
        );

        for (key, change) in &changes {
            let event = ModelEvent::ChangeKey {
                key: key.clone(),
                prev: old.get(key).cloned().unwrap_or_default(),
                change: change.clone(),
            };
            self.inner.events.trigger(&format!("change:{key}"), &event);
        }
        self.inner
            .events
            .trigger("change", &ModelEvent::Change { prev: old, changes });
        Ok(())
    }

    // ── Graph algorithms ───────────────────────────────────────────────────

    /// Plain JSON of the row. Dates become ISO-8601 strings and nested
    /// entities serialize recursively.
    ///
    /// # Errors
    ///
    /// [`EntityError::CircularStructureToJson`] when the model is reachable
    /// from its own fields.
    pub fn to_json(&self) -> Result<serde_json::Value, EntityError> {
        self.to_json_with(&mut JsonStack::new())
    }

    pub fn to_json_with(&self, stack: &mut JsonStack) -> Result<serde_json::Value, EntityError> {
        stack.within(self.identity(), |stack| {
            let row = self.row();
            let mut json = serde_json::Map::with_capacity(row.len());
            for (key, value) in row.iter() {
                let out = match self.description(key) {
                    _ if value.is_null() => serde_json::Value::Null,
                    Some(ty) => ty.to_json(value, stack)?,
                    None => any::value_to_json(value, stack)?,
                };
                json.insert(key.clone(), out);
            }
            if let Some(prepare_json) = self.inner.kind.hooks().prepare_json {
                prepare_json(&mut json);
            }
            Ok(serde_json::Value::Object(json))
        })
    }

    /// Deep copy without re-running the set pipeline. The copy gets a new
    /// cid and no parent.
    pub fn deep_clone(&self) -> Model {
        self.deep_clone_with(&mut CycleGuard::new())
    }

    pub fn deep_clone_with(&self, guard: &mut CycleGuard) -> Model {
        if let Some(Value::Model(done)) = guard.get(self.identity()) {
            return done.clone();
        }

        let copy = Model::blank(Rc::clone(&self.inner.kind));
        // registered before descending so back-references resolve to `copy`
        guard.add(self.identity(), Value::Model(copy.clone()));

        let row = self.row();
        let mut fields = Fields::with_capacity(row.len());
        for (key, value) in row.iter() {
            let cloned = match self.description(key) {
                _ if value.is_null() => Value::Null,
                Some(ty) => ty.clone_value(value, guard, Some(&copy)),
                None => any::clone_value(value, guard),
            };
            fields.insert(key.clone(), cloned);
        }
        *copy.inner.row.borrow_mut() = Rc::new(fields);
        copy.refresh_primary_value();
        copy
    }

    /// Field-wise structural equality with another model or a plain object.
    pub fn equal(&self, other: impl Into<Value>) -> bool {
        self.equal_with(&other.into(), &mut CycleGuard::new())
    }

    pub fn equal_with(&self, other: &Value, guard: &mut CycleGuard) -> bool {
        guard.add(self.identity(), other.clone());

        let other_row = match other {
            Value::Model(model) => model.row(),
            Value::Object(fields) => Rc::clone(fields),
            _ => return false,
        };
        let row = self.row();

        for (key, value) in row.iter() {
            let Some(other_value) = other_row.get(key) else {
                return false;
            };
            let equal = match self.description(key) {
                Some(ty) => ty.equal(value, other_value, guard),
                None => any::equal_values(value, other_value, guard),
            };
            if !equal {
                return false;
            }
        }
        other_row.keys().all(|key| row.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_def::{Structure, TypeParams};
    use serde_json::json;
    use std::cell::RefCell;

    struct Note;

    impl ModelSchema for Note {
        fn structure() -> Structure {
            Structure::new()
                .field("id", TypeParams::new("number").primary())
                .field("title", TypeParams::new("string").required())
                .field("body", "string")
        }
    }

    #[test]
    fn test_defaults_are_materialized() {
        let note = Model::new::<Note>(json!({"id": 1, "title": "a"})).unwrap();
        assert!(note.has_property("body"));
        assert!(!note.has_value("body"));
        assert_eq!(note.primary_value().as_f64(), Some(1.0));
        assert_eq!(note.primary_key(), Some("id"));
        assert!(note.is::<Note>());
        assert!(note.cid().starts_with("mod"));
    }

    #[test]
    fn test_failed_set_leaves_row() {
        let note = Model::new::<Note>(json!({"id": 1, "title": "a"})).unwrap();
        let before = note.row();
        assert!(note.set(json!({"title": "b", "body": true})).is_err());
        assert!(Rc::ptr_eq(&before, &note.row()));
    }

    #[test]
    fn test_change_events_order() {
        let note = Model::new::<Note>(json!({"id": 1, "title": "a"})).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        note.on_all(move |channel, _| log.borrow_mut().push(channel.to_string()));

        note.set(json!({"body": "x", "title": "b"})).unwrap();
        assert_eq!(*seen.borrow(), vec!["change:title", "change:body", "change"]);
    }

    #[test]
    fn test_only_validate_does_not_commit() {
        let note = Model::new::<Note>(json!({"id": 1, "title": "a"})).unwrap();
        note.set_with(json!({"title": "b"}), SetOptions { only_validate: true })
            .unwrap();
        assert_eq!(note.get("title").as_str(), Some("a"));
        assert_eq!(note.is_valid(json!({"title": null})), Ok(false));
        assert_eq!(note.is_valid(json!({"title": "c"})), Ok(true));
        assert_eq!(note.is_valid(json!(5)), Err(EntityError::DataShouldBeObject));
    }

    #[test]
    fn test_detached_owner_has_no_fields() {
        let owner = Model::detached();
        assert!(owner.row().is_empty());
        assert_eq!(
            owner.set(json!({"x": 1})),
            Err(EntityError::UnknownProperty { key: "x".into() })
        );
    }

    struct Folder;

    impl ModelSchema for Folder {
        fn structure() -> Structure {
            Structure::new().field("items", crate::types::collection::<Folders>())
        }
    }

    struct Folders;

    impl crate::schema::CollectionSchema for Folders {
        type Model = Folder;
    }

    fn self_containing_folder() -> Model {
        let folder = Model::new::<Folder>(json!({"items": []})).unwrap();
        let items = folder.get("items");
        items
            .as_collection()
            .unwrap()
            .push([Value::from(&folder)])
            .unwrap();
        folder
    }

    #[test]
    fn test_self_reference_is_freed_once_the_field_is_cleared() {
        let kept = self_containing_folder();
        let kept_weak = kept.downgrade();
        drop(kept);
        assert!(kept_weak.upgrade().is_some());

        let cleared = self_containing_folder();
        let cleared_weak = cleared.downgrade();
        cleared.set(json!({"items": null})).unwrap();
        drop(cleared);
        assert!(cleared_weak.upgrade().is_none());
    }
}
