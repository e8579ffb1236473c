//! Entity tree
//!
//! The semantic model produced by a parse. Entities live in an arena owned by
//! [`EntityTree`] and refer to each other through [`EntityId`]s; children are
//! kept in declaration order and every scope-owning entity has a name map
//! split into a definition and a declaration namespace.

pub mod comments;
pub mod hash;
mod process;
pub mod type_decl;
pub mod value;

use std::fmt;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::const_variant::ConstVariant;
use crate::error::{CompileError, Result};
use crate::lexer::Token;
use crate::source::{SourceId, SourceInfo};

pub use comments::CommentFlags;
pub use type_decl::{DeclType, TypeDeclaration};
pub use value::ValueNode;

/// Index of an entity in its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a name scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

/// Entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Root,
    Module,
    Struct,
    Union,
    Enum,
    Exception,
    Interface,
    Typedef,
    Const,
    Variable,
    Attribute,
    Operation,
    Parameter,
    EnumEntry,
    CaseEntry,
    Meta,
}

impl Kind {
    pub fn is_definition(self) -> bool {
        matches!(
            self,
            Kind::Module | Kind::Struct | Kind::Union | Kind::Enum | Kind::Exception | Kind::Interface
        )
    }

    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            Kind::Typedef
                | Kind::Const
                | Kind::Variable
                | Kind::Attribute
                | Kind::Operation
                | Kind::Parameter
                | Kind::EnumEntry
                | Kind::CaseEntry
        )
    }

    /// Modules may be reopened
    pub fn is_extendable(self) -> bool {
        self == Kind::Module
    }

    pub fn supports_children(self) -> bool {
        self == Kind::Root || self == Kind::Operation || self.is_definition()
    }

    pub fn supports_inheritance(self) -> bool {
        matches!(self, Kind::Interface | Kind::Struct | Kind::Exception)
    }

    pub fn supports_assignment(self) -> bool {
        matches!(self, Kind::Const | Kind::Variable | Kind::EnumEntry)
    }

    /// Name of the kind as written in IDL
    pub fn keyword(self) -> &'static str {
        match self {
            Kind::Root => "root",
            Kind::Module => "module",
            Kind::Struct => "struct",
            Kind::Union => "union",
            Kind::Enum => "enum",
            Kind::Exception => "exception",
            Kind::Interface => "interface",
            Kind::Typedef => "typedef",
            Kind::Const => "const",
            Kind::Variable => "variable",
            Kind::Attribute => "attribute",
            Kind::Operation => "operation",
            Kind::Parameter => "parameter",
            Kind::EnumEntry => "enum entry",
            Kind::CaseEntry => "case entry",
            Kind::Meta => "meta",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Captured preprocessor directive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    IncludeLocal,
    IncludeGlobal,
    Define,
    Undef,
    Verbatim,
    VerbatimBlock,
}

/// Parameter direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// Source span of an entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub begin_line: u32,
    pub begin_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Position {
    pub fn at(line: u32, col: u32) -> Self {
        Self {
            begin_line: line,
            begin_col: col,
            end_line: line,
            end_col: col,
        }
    }
}

/// Definition specific data
#[derive(Debug, Clone, Default)]
pub struct Definition {
    pub bases: Vec<EntityId>,
    /// Switch type of a union
    pub switch_type: Option<TypeDeclaration>,
    /// `local interface`
    pub local: bool,
}

/// Lazy post-processing state of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Pending,
    Processing,
    Done,
}

/// Declaration specific data
#[derive(Debug, Clone)]
pub struct Declaration {
    pub decl_type: TypeDeclaration,
    /// Array dimension expressions, one token list per dimension
    pub dimensions: Vec<Vec<Token>>,
    /// Evaluated dimensions; `None` for unbound or runtime sized dimensions
    pub array_sizes: Vec<Option<u64>>,
    pub assignment: Vec<Token>,
    pub value: ValueNode,
    pub readonly: bool,
    pub direction: Option<Direction>,
    /// `const` operation
    pub const_operation: bool,
    /// Parameters of an operation; not part of the child list
    pub parameters: Vec<EntityId>,
    pub raises: Vec<EntityId>,
    pub get_raises: Vec<EntityId>,
    pub set_raises: Vec<EntityId>,
    pub case_labels: Vec<Vec<Token>>,
    pub case_values: Vec<ConstVariant>,
    pub default_case: bool,
    pub state: ProcessState,
}

impl Declaration {
    pub fn new(decl_type: TypeDeclaration) -> Self {
        Self {
            decl_type,
            dimensions: Vec::new(),
            array_sizes: Vec::new(),
            assignment: Vec::new(),
            value: ValueNode::Unassigned,
            readonly: false,
            direction: None,
            const_operation: false,
            parameters: Vec::new(),
            raises: Vec::new(),
            get_raises: Vec::new(),
            set_raises: Vec::new(),
            case_labels: Vec::new(),
            case_values: Vec::new(),
            default_case: false,
            state: ProcessState::Pending,
        }
    }

    pub fn is_array(&self) -> bool {
        !self.dimensions.is_empty()
    }

    /// Assignment as written, tokens joined by spaces
    pub fn assignment_text(&self) -> String {
        join_tokens(&self.assignment)
    }
}

pub(crate) fn join_tokens(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ")
}

/// Kind specific entity data
#[derive(Debug, Clone)]
pub enum EntityData {
    Root { metas: Vec<EntityId> },
    Definition(Definition),
    Declaration(Box<Declaration>),
    Meta { kind: MetaKind, content: String },
}

/// A node of the entity tree
#[derive(Debug, Clone)]
pub struct Entity {
    pub kind: Kind,
    pub name: String,
    pub parent: Option<EntityId>,
    children: Vec<EntityId>,
    scope: Option<ScopeId>,
    /// Introduced by name only
    pub forward: bool,
    /// Name was generated
    pub anonymous: bool,
    pub source: SourceId,
    pub position: Position,
    pub comments: String,
    pub comment_flags: CommentFlags,
    pub data: EntityData,
}

impl Entity {
    pub fn definition(&self) -> Option<&Definition> {
        match &self.data {
            EntityData::Definition(def) => Some(def),
            _ => None,
        }
    }

    pub fn declaration(&self) -> Option<&Declaration> {
        match &self.data {
            EntityData::Declaration(decl) => Some(decl),
            _ => None,
        }
    }

    pub(crate) fn declaration_mut(&mut self) -> Option<&mut Declaration> {
        match &mut self.data {
            EntityData::Declaration(decl) => Some(decl),
            _ => None,
        }
    }

    pub(crate) fn definition_mut(&mut self) -> Option<&mut Definition> {
        match &mut self.data {
            EntityData::Definition(def) => Some(def),
            _ => None,
        }
    }

    /// Directive kind and content of a meta entity
    pub fn meta(&self) -> Option<(MetaKind, &str)> {
        match &self.data {
            EntityData::Meta { kind, content } => Some((*kind, content)),
            _ => None,
        }
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    defs: FxHashMap<String, EntityId>,
    decls: FxHashMap<String, EntityId>,
}

/// Arena holding every entity of one parse
#[derive(Debug, Clone)]
pub struct EntityTree {
    entities: Vec<Entity>,
    scopes: Vec<Scope>,
    sources: Vec<SourceInfo>,
    case_sensitive: bool,
}

impl EntityTree {
    pub(crate) fn new(case_sensitive: bool) -> Self {
        let root = Entity {
            kind: Kind::Root,
            name: String::new(),
            parent: None,
            children: Vec::new(),
            scope: Some(ScopeId(0)),
            forward: false,
            anonymous: false,
            source: SourceId(0),
            position: Position::default(),
            comments: String::new(),
            comment_flags: CommentFlags::default(),
            data: EntityData::Root { metas: Vec::new() },
        };
        Self {
            entities: vec![root],
            scopes: vec![Scope::default()],
            sources: Vec::new(),
            case_sensitive,
        }
    }

    pub fn root(&self) -> EntityId {
        EntityId(0)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities[0].children.is_empty() && self.metas().is_empty()
    }

    pub fn get(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.index()]
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        &self.get(id).children
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.get(id).parent
    }

    /// Parameters of an operation in declaration order
    pub fn parameters(&self, id: EntityId) -> &[EntityId] {
        self.get(id)
            .declaration()
            .map(|decl| decl.parameters.as_slice())
            .unwrap_or(&[])
    }

    /// Captured preprocessor directives in source order
    pub fn metas(&self) -> &[EntityId] {
        match &self.entities[0].data {
            EntityData::Root { metas } => metas,
            _ => &[],
        }
    }

    /// Path of the source an entity was declared in; `None` for in-memory code
    pub fn source_path(&self, id: EntityId) -> Option<&Path> {
        let source = self.get(id).source;
        self.sources.get(source.0 as usize).and_then(|s| s.path.as_deref())
    }

    pub fn sources(&self) -> &[SourceInfo] {
        &self.sources
    }

    pub(crate) fn set_sources(&mut self, sources: Vec<SourceInfo>) {
        self.sources = sources;
    }

    fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    /// Create an unnamed entity below `parent`. It becomes a child once
    /// [`set_name`](Self::set_name) registers it.
    pub(crate) fn add(
        &mut self,
        parent: EntityId,
        kind: Kind,
        source: SourceId,
        position: Position,
        data: EntityData,
    ) -> Result<EntityId> {
        if !self.get(parent).kind.supports_children() {
            return Err(CompileError::internal(format!(
                "the {} '{}' cannot hold children",
                self.get(parent).kind,
                self.get(parent).name
            )));
        }

        let scope = if kind.supports_children() {
            self.scopes.push(Scope::default());
            Some(ScopeId(self.scopes.len() as u32 - 1))
        } else {
            None
        };

        let id = EntityId(self.entities.len() as u32);
        self.entities.push(Entity {
            kind,
            name: String::new(),
            parent: Some(parent),
            children: Vec::new(),
            scope,
            forward: false,
            anonymous: false,
            source,
            position,
            comments: String::new(),
            comment_flags: CommentFlags::default(),
            data,
        });
        Ok(id)
    }

    /// Append a meta entity to the root's meta list
    pub(crate) fn add_meta(&mut self, kind: MetaKind, content: String, source: SourceId, position: Position) -> EntityId {
        let id = EntityId(self.entities.len() as u32);
        let name = match kind {
            MetaKind::IncludeLocal | MetaKind::IncludeGlobal => "include",
            MetaKind::Define => "define",
            MetaKind::Undef => "undef",
            MetaKind::Verbatim | MetaKind::VerbatimBlock => "verbatim",
        };
        self.entities.push(Entity {
            kind: Kind::Meta,
            name: name.to_string(),
            parent: Some(EntityId(0)),
            children: Vec::new(),
            scope: None,
            forward: false,
            anonymous: false,
            source,
            position,
            comments: String::new(),
            comment_flags: CommentFlags::default(),
            data: EntityData::Meta { kind, content },
        });
        if let EntityData::Root { metas } = &mut self.entities[0].data {
            metas.push(id);
        }
        id
    }

    /// Register the name of an entity in its parent's scope.
    ///
    /// Returns the authoritative entity for the name: a forward declaration
    /// of an existing name yields the existing entity.
    pub(crate) fn set_name(&mut self, id: EntityId, name: &str, forward: bool, skip_insertion: bool) -> Result<EntityId> {
        let entity = self.get(id);
        let kind = entity.kind;
        let parent = entity
            .parent
            .ok_or_else(|| CompileError::internal("cannot name an entity without a parent"))?;
        let scope = self
            .get(parent)
            .scope
            .ok_or_else(|| CompileError::internal("the parent entity has no scope"))?;

        let key = self.key(name);
        let in_decls = kind.is_declaration() && kind != Kind::Typedef;

        if self.lookup_in_bases(parent, &key).is_some() {
            return Err(CompileError::duplicate(format!(
                "The name '{}' is already used by an inherited entity.",
                name
            )));
        }

        self.get_mut(id).name = name.to_string();

        let map = if in_decls {
            &self.scopes[scope.0 as usize].decls
        } else {
            &self.scopes[scope.0 as usize].defs
        };
        let existing = map.get(&key).copied();

        if let Some(existing_id) = existing {
            let existing = self.get(existing_id);
            if existing.kind != kind {
                return Err(CompileError::duplicate(format!(
                    "An identifier with the same name exists already as {} (case insensitive name checking).",
                    existing.kind
                )));
            }
            if forward {
                self.get_mut(id).forward = true;
                debug!(name = %name, "forward declaration of existing entity ignored");
                return Ok(existing_id);
            }
            if existing.kind.is_extendable() {
                let shared = existing.scope;
                self.get_mut(id).scope = shared;
                debug!(name = %name, "reopening {}", kind);
            } else if existing.forward {
                self.insert_name(scope, in_decls, key, id);
                debug!(name = %name, "forward declaration resolved");
            } else {
                return Err(CompileError::duplicate(
                    "An identifier with the same name exists already (case insensitive name checking).",
                ));
            }
        } else {
            self.insert_name(scope, in_decls, key, id);
            self.get_mut(id).forward = forward;
        }

        if !skip_insertion {
            self.get_mut(parent).children.push(id);
        }
        debug!(name = %name, kind = %kind, forward, "entity named");
        Ok(id)
    }

    fn insert_name(&mut self, scope: ScopeId, in_decls: bool, key: String, id: EntityId) {
        let scope = &mut self.scopes[scope.0 as usize];
        if in_decls {
            scope.decls.insert(key, id);
        } else {
            scope.defs.insert(key, id);
        }
    }

    /// Fully scoped name, e.g. `A::B::C`
    pub fn scoped_name(&self, id: EntityId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let entity = self.get(cur);
            if entity.kind == Kind::Root {
                break;
            }
            parts.push(entity.name.as_str());
            current = entity.parent;
        }
        parts.reverse();
        parts.join("::")
    }

    /// Look up a direct member of a scope-owning entity, declarations first,
    /// then definitions, then inherited members.
    pub fn lookup_member(&self, owner: EntityId, name: &str) -> Option<EntityId> {
        let key = self.key(name);
        self.lookup_key(owner, &key, false, 0)
    }

    fn lookup_key(&self, owner: EntityId, key: &str, defs_first: bool, depth: usize) -> Option<EntityId> {
        if depth > self.entities.len() {
            return None;
        }
        let scope = &self.scopes[self.get(owner).scope?.0 as usize];
        let found = if defs_first {
            scope.defs.get(key).or_else(|| scope.decls.get(key))
        } else {
            scope.decls.get(key).or_else(|| scope.defs.get(key))
        };
        if let Some(id) = found {
            return Some(*id);
        }
        let def = self.get(owner).definition()?;
        def.bases
            .iter()
            .find_map(|base| self.lookup_key(*base, key, defs_first, depth + 1))
    }

    fn lookup_in_bases(&self, owner: EntityId, key: &str) -> Option<EntityId> {
        let def = self.get(owner).definition()?;
        def.bases.iter().find_map(|base| self.lookup_key(*base, key, false, 0))
    }

    /// Resolve a scoped name (`A::B`, `::A::B`, `a.member`).
    ///
    /// Relative names are looked up at `from` and, when `check_parent` is
    /// set, at each of its ancestors in turn.
    pub fn find(&self, from: EntityId, name: &str, check_parent: bool) -> Option<EntityId> {
        self.find_impl(from, name, check_parent, false)
    }

    /// Resolve a type name; definitions win over declarations of the same
    /// name and ancestors are searched
    pub fn find_type(&self, from: EntityId, name: &str) -> Option<EntityId> {
        self.find_impl(from, name, true, true)
    }

    fn find_impl(&self, from: EntityId, name: &str, check_parent: bool, defs_first: bool) -> Option<EntityId> {
        let (start, name, check_parent) = match name.strip_prefix("::") {
            Some(rest) => (self.root(), rest, false),
            None => (from, name, check_parent),
        };
        if name.is_empty() {
            return None;
        }

        let (first, rest) = split_segment(name);
        let mut current = Some(start);
        while let Some(owner) = current {
            if let Some(found) = self.lookup_key(owner, &self.key(first), defs_first, 0) {
                let resolved = match rest {
                    None => Some(found),
                    Some((true, tail)) => self.find_impl(self.resolved_entity(found), tail, false, defs_first),
                    Some((false, tail)) => self.find_member(found, tail),
                };
                if resolved.is_some() {
                    return resolved;
                }
            }
            if !check_parent {
                break;
            }
            current = self.get(owner).parent;
        }
        None
    }

    /// Resolve `member.sub` relative to a declaration of compound type
    fn find_member(&self, decl: EntityId, path: &str) -> Option<EntityId> {
        let definition = self.get(decl).declaration()?.decl_type.definition?;
        let owner = self.resolved_entity(definition);
        let (first, rest) = split_segment(path);
        let found = self.lookup_member(owner, first)?;
        match rest {
            None => Some(found),
            Some((_, tail)) => self.find_member(found, tail),
        }
    }

    /// Follow typedefs and forward declarations to the final definition
    pub fn resolved_entity(&self, id: EntityId) -> EntityId {
        let mut current = id;
        for _ in 0..self.entities.len() {
            let entity = self.get(current);
            if entity.kind == Kind::Typedef {
                match entity.declaration().and_then(|d| d.decl_type.definition) {
                    Some(next) if next != current => {
                        current = next;
                        continue;
                    }
                    _ => return current,
                }
            }
            if entity.forward {
                let full = entity
                    .parent
                    .and_then(|parent| self.lookup_key(parent, &self.key(&entity.name), true, 0))
                    .filter(|full| *full != current && !self.get(*full).forward);
                if let Some(full) = full {
                    current = full;
                    continue;
                }
            }
            return current;
        }
        current
    }

    /// All entities in arena order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter().enumerate().map(|(i, e)| (EntityId(i as u32), e))
    }
}

/// Split the first name segment off a path. The flag of the remainder is
/// true for `::` and false for `.`.
fn split_segment(name: &str) -> (&str, Option<(bool, &str)>) {
    let scope = name.find("::");
    let member = name.find('.');
    match (scope, member) {
        (Some(s), Some(m)) if m < s => (&name[..m], Some((false, &name[m + 1..]))),
        (Some(s), _) => (&name[..s], Some((true, &name[s + 2..]))),
        (None, Some(m)) => (&name[..m], Some((false, &name[m + 1..]))),
        (None, None) => (name, None),
    }
}
