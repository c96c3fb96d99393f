//! Entity kinds and their compiled schemas.
//!
//! A model kind is any type implementing [`ModelSchema`]; its structure is
//! resolved into [`Type`]s the first time the kind is used and cached per
//! kind for the rest of the thread's lifetime.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use crate::collection::Collection;
use crate::error::EntityError;
use crate::model::Model;
use crate::type_def::params::short_type_name;
use crate::type_def::{create_type, Structure, Type};
use crate::value::Fields;

/// Declares a model kind.
///
/// ```ignore
/// struct User;
///
/// impl ModelSchema for User {
///     fn structure() -> Structure {
///         Structure::new()
///             .field("id", TypeParams::new("number").primary())
///             .field("name", "string")
///     }
/// }
///
/// let user = Model::new::<User>(json!({"id": 1, "name": "Ann"}))?;
/// ```
pub trait ModelSchema: 'static {
    /// Field declarations. Called once per kind.
    fn structure() -> Structure;

    fn name() -> &'static str {
        short_type_name::<Self>()
    }

    fn hooks() -> ModelHooks {
        ModelHooks::default()
    }
}

/// Declares a collection kind holding models of kind `Model`.
pub trait CollectionSchema: 'static {
    type Model: ModelSchema;

    fn name() -> &'static str {
        short_type_name::<Self>()
    }

    fn hooks() -> CollectionHooks {
        CollectionHooks::default()
    }
}

/// Per-kind model hooks.
#[derive(Clone, Copy, Default)]
pub struct ModelHooks {
    /// Adjusts the staged row of a `set` before it is diffed. When present,
    /// every field is prepared again afterwards.
    pub prepare: Option<fn(&mut Fields)>,
    /// Whole-row invariant; an error vetoes the `set`.
    pub validate: Option<fn(&Fields) -> Result<(), EntityError>>,
    /// Runs once at the end of construction.
    pub initialize: Option<fn(&Model)>,
    /// Adjusts the serialized object produced by `to_json`.
    pub prepare_json: Option<fn(&mut serde_json::Map<String, serde_json::Value>)>,
}

impl fmt::Debug for ModelHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHooks")
            .field("prepare", &self.prepare.is_some())
            .field("validate", &self.validate.is_some())
            .field("initialize", &self.initialize.is_some())
            .field("prepare_json", &self.prepare_json.is_some())
            .finish()
    }
}

#[derive(Clone, Copy, Default)]
pub struct CollectionHooks {
    pub initialize: Option<fn(&Collection)>,
}

impl fmt::Debug for CollectionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHooks")
            .field("initialize", &self.initialize.is_some())
            .finish()
    }
}

// ── Reserved names ─────────────────────────────────────────────────────────

const RESERVED_MEMBERS: &[&str] = &[
    "row",
    "primaryKey",
    "primaryValue",
    "primary_key",
    "primary_value",
    "cid",
    "parent",
    "set_parent",
    "get",
    "set",
    "set_with",
    "is_valid",
    "isValid",
    "has_property",
    "hasProperty",
    "has_value",
    "hasValue",
    "description",
    "kind_name",
    "structure",
    "prepare",
    "validate",
    "initialize",
    "prepare_json",
    "prepareJSON",
    "to_json",
    "to_json_with",
    "toJSON",
    "clone",
    "deep_clone",
    "deep_clone_with",
    "equal",
    "equal_with",
    "walk",
    "walk_with",
    "find_child",
    "findChild",
    "filter_children",
    "filterChildren",
    "filter_children_by_instance",
    "filterChildrenByInstance",
    "find_parent",
    "findParent",
    "filter_parents",
    "filterParents",
    "find_parent_instance",
    "findParentInstance",
    "on",
    "on_all",
    "once",
    "off",
    "trigger",
];

/// Names a primary key may not take: the row accessors and every model
/// member.
pub fn is_reserved_member(key: &str) -> bool {
    RESERVED_MEMBERS.contains(&key)
}

// ── Model kinds ────────────────────────────────────────────────────────────

thread_local! {
    static MODEL_KINDS: RefCell<HashMap<TypeId, Rc<ModelKind>>> = RefCell::new(HashMap::new());
    static COLLECTION_KINDS: RefCell<HashMap<TypeId, Rc<CollectionKind>>> = RefCell::new(HashMap::new());
}

/// Compiled schema of one model kind.
pub struct ModelKind {
    type_id: TypeId,
    name: &'static str,
    fields: IndexMap<String, Rc<Type>>,
    any_key: Option<Rc<Type>>,
    primary_key: Option<String>,
    hooks: ModelHooks,
}

impl fmt::Debug for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelKind")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("any_key", &self.any_key.is_some())
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

impl ModelKind {
    /// Compiled schema of `M`, compiling it on first use.
    pub fn of<M: ModelSchema>() -> Result<Rc<ModelKind>, EntityError> {
        let type_id = TypeId::of::<M>();
        if let Some(kind) = MODEL_KINDS.with(|kinds| kinds.borrow().get(&type_id).cloned()) {
            return Ok(kind);
        }

        // Not under the cache borrow: field types never compile other kinds
        // eagerly, but user structure() bodies may.
        let kind = Rc::new(Self::compile(type_id, M::name(), M::structure(), M::hooks())?);
        Ok(MODEL_KINDS.with(|kinds| {
            Rc::clone(kinds.borrow_mut().entry(type_id).or_insert(kind))
        }))
    }

    /// Resolve every declaration of `structure`.
    pub fn compile(
        type_id: TypeId,
        name: &'static str,
        structure: Structure,
        hooks: ModelHooks,
    ) -> Result<Self, EntityError> {
        let mut fields = IndexMap::with_capacity(structure.len());
        let mut any_key = None;
        let mut primary_key = None;

        for (key, decl) in structure {
            let ty = create_type(decl, &key)?;
            if key == "*" {
                any_key = Some(ty);
                continue;
            }
            if ty.is_primary() {
                primary_key = Some(key.clone());
            }
            fields.insert(key, ty);
        }

        debug!(
            "compiled model schema {name}: {} fields, primary key {primary_key:?}",
            fields.len()
        );
        Ok(Self {
            type_id,
            name,
            fields,
            any_key,
            primary_key,
            hooks,
        })
    }

    pub(crate) fn detached() -> Self {
        struct Detached;
        Self {
            type_id: TypeId::of::<Detached>(),
            name: "Model",
            fields: IndexMap::new(),
            any_key: None,
            primary_key: None,
            hooks: ModelHooks::default(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared fields, in declaration order, without the catch-all.
    pub fn fields(&self) -> &IndexMap<String, Rc<Type>> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Rc<Type>> {
        self.fields.get(key)
    }

    /// The `"*"` declaration, if any.
    pub fn any_key(&self) -> Option<&Rc<Type>> {
        self.any_key.as_ref()
    }

    /// Type governing `key`: its own declaration or the catch-all.
    pub fn description(&self, key: &str) -> Option<&Rc<Type>> {
        self.fields.get(key).or(self.any_key.as_ref())
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn hooks(&self) -> &ModelHooks {
        &self.hooks
    }
}

/// Lazy reference to a model kind, used in declarations.
#[derive(Clone, Copy)]
pub struct ModelRef {
    type_id: TypeId,
    name: fn() -> &'static str,
    kind: fn() -> Result<Rc<ModelKind>, EntityError>,
}

impl ModelRef {
    pub fn of<M: ModelSchema>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            name: M::name,
            kind: ModelKind::of::<M>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    pub fn kind(&self) -> Result<Rc<ModelKind>, EntityError> {
        (self.kind)()
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelRef({})", self.name())
    }
}

// ── Collection kinds ───────────────────────────────────────────────────────

/// Compiled collection kind: its name, hooks and the model kind it holds.
pub struct CollectionKind {
    type_id: TypeId,
    name: &'static str,
    model: Rc<ModelKind>,
    hooks: CollectionHooks,
}

impl fmt::Debug for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionKind")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .finish()
    }
}

impl CollectionKind {
    /// Kind of `C`; compiles the model kind it holds on first use.
    pub fn of<C: CollectionSchema>() -> Result<Rc<CollectionKind>, EntityError> {
        let type_id = TypeId::of::<C>();
        if let Some(kind) = COLLECTION_KINDS.with(|kinds| kinds.borrow().get(&type_id).cloned()) {
            return Ok(kind);
        }

        let model = ModelKind::of::<C::Model>()?;
        let kind = Rc::new(Self {
            type_id,
            name: C::name(),
            model,
            hooks: C::hooks(),
        });
        debug!("compiled collection {} of {}", kind.name, kind.model.name());
        Ok(COLLECTION_KINDS.with(|kinds| {
            Rc::clone(kinds.borrow_mut().entry(type_id).or_insert(kind))
        }))
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn model(&self) -> &Rc<ModelKind> {
        &self.model
    }

    pub fn hooks(&self) -> &CollectionHooks {
        &self.hooks
    }
}

/// Lazy reference to a collection kind, used in declarations.
#[derive(Clone, Copy)]
pub struct CollectionRef {
    type_id: TypeId,
    name: fn() -> &'static str,
    kind: fn() -> Result<Rc<CollectionKind>, EntityError>,
}

impl CollectionRef {
    pub fn of<C: CollectionSchema>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: C::name,
            kind: CollectionKind::of::<C>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    pub fn kind(&self) -> Result<Rc<CollectionKind>, EntityError> {
        (self.kind)()
    }
}

impl fmt::Debug for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionRef({})", self.name())
    }
}
