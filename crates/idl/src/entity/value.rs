//! Declaration values
//!
//! Assignments are kept as tokens while parsing and evaluated lazily, either
//! when the enclosing definition is finished or when an expression refers to
//! the declaration. Re-entering a declaration that is being evaluated means
//! the values reference each other.

use std::fmt;

use tracing::debug;

use super::{Declaration, EntityId, EntityTree, Kind, ProcessState, TypeDeclaration};
use crate::const_variant::{ConstVariant, ValueKind};
use crate::error::{CompileError, Result};
use crate::expression::{evaluate, evaluate_at, Evaluated, OperandResolver, TokenCursor, LOWEST_PRECEDENCE};
use crate::lexer::{Token, TokenKind};
use crate::parser::Parser;

/// Computed value of a declaration
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ValueNode {
    #[default]
    Unassigned,
    Simple {
        value: ConstVariant,
        /// Only known at runtime
        dynamic: bool,
    },
    Array(Vec<ValueNode>),
    /// Members of a compound value in declaration order
    Compound(Vec<(String, ValueNode)>),
}

impl ValueNode {
    /// The scalar value, if this is a constant
    pub fn constant(&self) -> Option<&ConstVariant> {
        match self {
            ValueNode::Simple { value, dynamic: false } => Some(value),
            _ => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ValueNode::Simple { dynamic: true, .. })
    }

    pub fn element(&self, index: usize) -> Option<&ValueNode> {
        match self {
            ValueNode::Array(elements) => elements.get(index),
            _ => None,
        }
    }

    pub fn member(&self, name: &str) -> Option<&ValueNode> {
        self.member_with(name, false)
    }

    fn member_with(&self, name: &str, case_sensitive: bool) -> Option<&ValueNode> {
        match self {
            ValueNode::Compound(members) => members
                .iter()
                .find(|(member, _)| {
                    if case_sensitive {
                        member == name
                    } else {
                        member.eq_ignore_ascii_case(name)
                    }
                })
                .map(|(_, value)| value),
            _ => None,
        }
    }

    fn navigate(&self, accessors: &[Accessor], case_sensitive: bool) -> Option<&ValueNode> {
        let mut node = self;
        for accessor in accessors {
            node = match accessor {
                Accessor::Member(name) => node.member_with(name, case_sensitive)?,
                Accessor::Index(index) => node.element(*index)?,
            };
        }
        Some(node)
    }
}

impl fmt::Display for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueNode::Unassigned => Ok(()),
            ValueNode::Simple { dynamic: true, .. } => f.write_str("<dynamic>"),
            ValueNode::Simple { value, .. } => write!(f, "{}", value),
            ValueNode::Array(elements) => {
                f.write_str("{")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                f.write_str("}")
            }
            ValueNode::Compound(members) => {
                f.write_str("{")?;
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Step of a `.member[index]` chain
#[derive(Debug, Clone, PartialEq)]
enum Accessor {
    Member(String),
    Index(usize),
}

/// Split `A::B.member[2].x` into the scoped name and its accessor chain
fn parse_value_path(path: &str) -> Option<(&str, Vec<Accessor>)> {
    let end = path.find(['.', '[']).unwrap_or(path.len());
    let (name, mut rest) = path.split_at(end);
    let mut accessors = Vec::new();
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('.') {
            let end = tail.find(['.', '[']).unwrap_or(tail.len());
            if end == 0 {
                return None;
            }
            accessors.push(Accessor::Member(tail[..end].to_string()));
            rest = &tail[end..];
        } else if let Some(tail) = rest.strip_prefix('[') {
            let end = tail.find(']')?;
            accessors.push(Accessor::Index(tail[..end].trim().parse().ok()?));
            rest = &tail[end + 1..];
        } else {
            return None;
        }
    }
    Some((name, accessors))
}

impl EntityTree {
    /// Resolve a value path such as `A::B.member[2].x`
    pub fn find_value(&self, from: EntityId, path: &str) -> Option<&ValueNode> {
        let (name, accessors) = parse_value_path(path)?;
        let id = self.find(from, name, true)?;
        let decl = self.get(id).declaration()?;
        decl.value.navigate(&accessors, self.case_sensitive)
    }

    /// The constant at a value path; a `false` boolean when the path does not
    /// lead to a constant
    pub fn find_value_variant(&self, from: EntityId, path: &str) -> ConstVariant {
        self.find_value(from, path)
            .and_then(ValueNode::constant)
            .cloned()
            .unwrap_or_default()
    }
}

/// Resolves names in expressions against the entity tree
pub(crate) struct EntityResolver<'p> {
    parser: &'p mut Parser,
    scope: EntityId,
}

impl<'p> EntityResolver<'p> {
    pub(crate) fn new(parser: &'p mut Parser, scope: EntityId) -> Self {
        Self { parser, scope }
    }
}

impl OperandResolver for EntityResolver<'_> {
    fn resolve(&mut self, cursor: &mut TokenCursor<'_>) -> Result<Evaluated> {
        let (line, col) = cursor.location();
        let Some(first) = cursor.next() else {
            return Err(CompileError::syntax("Missing operand.").at(line, col));
        };

        let mut name = first.text.clone();
        loop {
            if !name.ends_with(':') {
                if !cursor.eat("::") {
                    break;
                }
                name.push_str("::");
            }
            match cursor.next() {
                Some(tok) if tok.is_identifier() => name.push_str(&tok.text),
                Some(tok) => return Err(CompileError::syntax("Expecting an identifier.").at(tok.line, tok.col)),
                None => return Err(CompileError::syntax("Expecting an identifier.").at(line, col)),
            }
        }

        let mut accessors = Vec::new();
        let mut dynamic = false;
        loop {
            if cursor.peek().is_some_and(|t| t.kind == TokenKind::Operator && t.text == ".") {
                cursor.next();
                match cursor.next() {
                    Some(tok) if tok.is_identifier() || tok.is_keyword() => accessors.push(Accessor::Member(tok.text.clone())),
                    _ => return Err(CompileError::syntax("Expecting a member name.").at(line, col)),
                }
            } else if cursor.eat("[") {
                let index = evaluate_at(cursor, self, LOWEST_PRECEDENCE)?;
                cursor.expect("]")?;
                if index.dynamic {
                    dynamic = true;
                } else {
                    let index = index.value.to_u64().map_err(|e| e.or_location(line, col))?;
                    accessors.push(Accessor::Index(index as usize));
                }
            } else {
                break;
            }
        }

        let tree = &self.parser.tree;
        let Some(id) = tree.find(self.scope, &name, true) else {
            return Err(CompileError::resolve(format!("Could not find the definition of '{}'.", name)).at(line, col));
        };

        match tree.get(id).kind {
            Kind::Const | Kind::EnumEntry => {}
            Kind::Variable | Kind::Attribute | Kind::Parameter | Kind::CaseEntry => return Ok(Evaluated::dynamic()),
            _ => {
                return Err(CompileError::syntax(format!("Expecting a value; '{}' is not a declaration.", name)).at(line, col))
            }
        }
        if dynamic {
            return Ok(Evaluated::dynamic());
        }

        self.parser.post_process(id).map_err(|e| e.or_location(line, col))?;

        let tree = &self.parser.tree;
        let value = tree
            .get(id)
            .declaration()
            .and_then(|decl| decl.value.navigate(&accessors, tree.case_sensitive));
        match value {
            Some(ValueNode::Simple { value, dynamic }) => Ok(Evaluated {
                value: value.clone(),
                dynamic: *dynamic,
            }),
            Some(_) => Err(CompileError::constant(format!("The value of '{}' cannot be used in an expression.", name))
                .at(line, col)),
            None => Err(CompileError::resolve(format!("Could not find the definition of '{}'.", name)).at(line, col)),
        }
    }
}

impl Parser {
    /// Evaluate array sizes, assignments and case labels of a declaration.
    /// Runs once; later calls return immediately.
    pub(crate) fn post_process(&mut self, id: EntityId) -> Result<()> {
        let entity = self.tree.get(id);
        let kind = entity.kind;
        let decl = match entity.declaration() {
            Some(decl) => match decl.state {
                ProcessState::Done => return Ok(()),
                ProcessState::Processing => return Err(CompileError::constant("Circular referencing entity.")),
                ProcessState::Pending => decl.clone(),
            },
            None => return Ok(()),
        };
        self.set_state(id, ProcessState::Processing);

        let scope = self.tree.parent(id).unwrap_or(self.tree.root());
        let array_sizes = self.array_sizes(&decl, scope)?;

        let mut case_values = Vec::new();
        let value = match kind {
            Kind::EnumEntry => self.enum_entry_value(id, &decl, scope)?,
            Kind::CaseEntry => {
                case_values = self.case_values(&decl, scope)?;
                ValueNode::Unassigned
            }
            Kind::Const | Kind::Variable if !decl.assignment.is_empty() => {
                self.build_value(scope, &decl.decl_type, &array_sizes, &decl.assignment, kind == Kind::Const)?
            }
            _ => ValueNode::Unassigned,
        };

        debug!(name = %self.tree.get(id).name, kind = %kind, value = %value, "declaration processed");
        if let Some(target) = self.tree.get_mut(id).declaration_mut() {
            target.array_sizes = array_sizes;
            target.value = value;
            target.case_values = case_values;
            target.state = ProcessState::Done;
        }
        Ok(())
    }

    fn set_state(&mut self, id: EntityId, state: ProcessState) {
        if let Some(decl) = self.tree.get_mut(id).declaration_mut() {
            decl.state = state;
        }
    }

    fn array_sizes(&mut self, decl: &Declaration, scope: EntityId) -> Result<Vec<Option<u64>>> {
        let mut sizes = Vec::with_capacity(decl.dimensions.len());
        for dimension in &decl.dimensions {
            let Some(first) = dimension.first() else {
                sizes.push(None);
                continue;
            };
            let result = evaluate(dimension, &mut EntityResolver::new(self, scope))?;
            if result.dynamic {
                sizes.push(None);
                continue;
            }
            let size = result.value.to_u64().map_err(|e| e.or_location(first.line, first.col))?;
            if size == 0 {
                return Err(CompileError::constant("The array size must be larger than zero.").at(first.line, first.col));
            }
            sizes.push(Some(size));
        }
        Ok(sizes)
    }

    fn enum_entry_value(&mut self, id: EntityId, decl: &Declaration, scope: EntityId) -> Result<ValueNode> {
        let value = if let Some(first) = decl.assignment.first() {
            let result = evaluate(&decl.assignment, &mut EntityResolver::new(self, scope))?;
            if result.dynamic {
                return Err(CompileError::constant("An enum entry requires a constant value.").at(first.line, first.col));
            }
            result.value.cast(ValueKind::Int32).map_err(|e| e.or_location(first.line, first.col))?
        } else {
            let previous = self
                .tree
                .children(scope)
                .iter()
                .take_while(|child| **child != id)
                .filter(|child| self.tree.get(**child).kind == Kind::EnumEntry)
                .last()
                .copied();
            match previous {
                None => ConstVariant::Int32(0),
                Some(previous) => {
                    self.post_process(previous)?;
                    let previous = self
                        .tree
                        .get(previous)
                        .declaration()
                        .and_then(|d| d.value.constant())
                        .cloned()
                        .unwrap_or_default();
                    let next = ConstVariant::binary(
                        crate::const_variant::BinaryOp::Add,
                        &previous,
                        &ConstVariant::Int32(1),
                    )?;
                    next.cast(ValueKind::Int32)?
                }
            }
        };
        Ok(ValueNode::Simple { value, dynamic: false })
    }

    fn case_values(&mut self, decl: &Declaration, union: EntityId) -> Result<Vec<ConstVariant>> {
        let switch_kind = self
            .tree
            .get(union)
            .definition()
            .and_then(|def| def.switch_type.as_ref())
            .and_then(TypeDeclaration::value_kind);

        let mut values = Vec::with_capacity(decl.case_labels.len());
        for label in &decl.case_labels {
            let Some(first) = label.first() else {
                continue;
            };
            let result = evaluate(label, &mut EntityResolver::new(self, union))?;
            if result.dynamic {
                return Err(CompileError::constant("A case label requires a constant value.").at(first.line, first.col));
            }
            let value = match switch_kind {
                Some(kind) => result.value.cast(kind).map_err(|e| e.or_location(first.line, first.col))?,
                None => result.value,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Build the value of an assignment for a declaration of type `ty` with
    /// the (remaining) array dimensions `sizes`
    fn build_value(
        &mut self,
        scope: EntityId,
        ty: &TypeDeclaration,
        sizes: &[Option<u64>],
        tokens: &[Token],
        constant: bool,
    ) -> Result<ValueNode> {
        let Some(first) = tokens.first() else {
            return Ok(ValueNode::Unassigned);
        };

        if let Some((size, inner)) = sizes.split_first() {
            if inner.is_empty() && ty.base.is_character() && tokens.len() == 1 && tokens[0].is_string_literal() {
                return string_array(ty, *size, first);
            }
            let elements = split_initializer(tokens)?;
            if size.is_some_and(|size| elements.len() as u64 > size) {
                return Err(CompileError::constant("Too many values for the array.").at(first.line, first.col));
            }
            let mut values = Vec::with_capacity(elements.len());
            for element in &elements {
                values.push(self.build_value(scope, ty, inner, element, constant)?);
            }
            return Ok(ValueNode::Array(values));
        }

        if let Some(definition) = ty.definition {
            let resolved = self.tree.resolved_entity(definition);
            if matches!(self.tree.get(resolved).kind, Kind::Struct | Kind::Exception) {
                return self.compound_value(scope, resolved, tokens, constant);
            }
        }

        let result = evaluate(tokens, &mut EntityResolver::new(self, scope))?;
        if result.dynamic {
            if constant {
                return Err(
                    CompileError::constant("A const declaration requires a constant expression.").at(first.line, first.col)
                );
            }
            return Ok(ValueNode::Simple {
                value: ConstVariant::default(),
                dynamic: true,
            });
        }

        let Some(kind) = ty.value_kind() else {
            return Err(CompileError::syntax(format!("The type '{}' cannot be assigned a value.", ty.text))
                .at(first.line, first.col));
        };
        let value = result.value.cast(kind).map_err(|e| e.or_location(first.line, first.col))?;
        Ok(ValueNode::Simple { value, dynamic: false })
    }

    fn compound_value(&mut self, scope: EntityId, definition: EntityId, tokens: &[Token], constant: bool) -> Result<ValueNode> {
        let first = &tokens[0];
        let elements = split_initializer(tokens)?;
        let members: Vec<EntityId> = self
            .tree
            .children(definition)
            .iter()
            .copied()
            .filter(|child| self.tree.get(*child).kind == Kind::Variable)
            .collect();
        if elements.len() > members.len() {
            return Err(CompileError::constant("Too many values for the compound type.").at(first.line, first.col));
        }

        let mut values = Vec::with_capacity(members.len());
        for (index, member) in members.into_iter().enumerate() {
            self.post_process(member)?;
            let entity = self.tree.get(member);
            let name = entity.name.clone();
            let Some((ty, sizes, default)) = entity
                .declaration()
                .map(|decl| (decl.decl_type.clone(), decl.array_sizes.clone(), decl.value.clone()))
            else {
                continue;
            };
            let value = match elements.get(index) {
                Some(element) => self.build_value(scope, &ty, &sizes, element, constant)?,
                None => default,
            };
            values.push((name, value));
        }
        Ok(ValueNode::Compound(values))
    }
}

fn string_array(ty: &TypeDeclaration, size: Option<u64>, token: &Token) -> Result<ValueNode> {
    let text = ConstVariant::from_literal(token)?;
    let text = text.as_str().unwrap_or_default();
    let kind = ty.value_kind().unwrap_or(ValueKind::Int8);
    if size.is_some_and(|size| text.chars().count() as u64 > size) {
        return Err(CompileError::constant("Too many values for the array.").at(token.line, token.col));
    }
    let mut values = Vec::new();
    for ch in text.chars() {
        let value = ConstVariant::UInt32(ch as u32)
            .cast(kind)
            .map_err(|e| e.or_location(token.line, token.col))?;
        values.push(ValueNode::Simple { value, dynamic: false });
    }
    Ok(ValueNode::Array(values))
}

/// Split `{ a, { b, c }, d }` into its top level elements
fn split_initializer(tokens: &[Token]) -> Result<Vec<Vec<Token>>> {
    let (Some(open), Some(close)) = (tokens.first(), tokens.last()) else {
        return Ok(Vec::new());
    };
    if !open.is("{") || !close.is("}") || tokens.len() < 2 {
        return Err(CompileError::syntax("Expecting an initializer list '{'.").at(open.line, open.col));
    }

    let mut elements = vec![Vec::new()];
    let mut depth = 0usize;
    for tok in &tokens[1..tokens.len() - 1] {
        if tok.is(",") && depth == 0 {
            if elements.last().is_some_and(Vec::is_empty) {
                return Err(CompileError::syntax("Missing value in the initializer list.").at(tok.line, tok.col));
            }
            elements.push(Vec::new());
            continue;
        }
        if tok.is("{") || tok.is("(") || tok.is("[") {
            depth += 1;
        } else if tok.is("}") || tok.is(")") || tok.is("]") {
            depth = depth.saturating_sub(1);
        }
        if let Some(element) = elements.last_mut() {
            element.push(tok.clone());
        }
    }
    // Trailing comma or empty list
    if elements.last().is_some_and(Vec::is_empty) {
        elements.pop();
    }
    Ok(elements)
}
