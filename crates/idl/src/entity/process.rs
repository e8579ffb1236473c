//! Definition and declaration processing
//!
//! Recursive descent over the content of the root, modules, structs,
//! unions, enums, exceptions and interfaces. Declarations store their array
//! dimension and assignment tokens; those are evaluated when the owning
//! definition has been read completely (or earlier, when referenced).

use tracing::{debug, trace};

use super::type_decl::syntax_at;
use super::{Declaration, Definition, DeclType, Direction, EntityData, EntityId, Kind, Position, TypeDeclaration};
use crate::const_variant::ValueKind;
use crate::error::{CompileError, Result};
use crate::lexer::{Token, TokenKind};
use crate::parser::Parser;

/// Member categories a definition may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    Definition(Kind),
    Const,
    Typedef,
    Attribute,
    Operation,
    Variable,
    Case,
}

fn supports(owner: Kind, member: Member) -> bool {
    use Member::*;
    match owner {
        Kind::Root | Kind::Module => matches!(member, Definition(_) | Const | Typedef),
        Kind::Struct | Kind::Exception => matches!(
            member,
            Definition(Kind::Struct | Kind::Union | Kind::Enum) | Const | Typedef | Variable
        ),
        Kind::Union => member == Case,
        Kind::Interface => matches!(
            member,
            Definition(Kind::Struct | Kind::Union | Kind::Enum | Kind::Exception) | Const | Typedef | Attribute | Operation
        ),
        _ => false,
    }
}

fn definition_kind(token: &Token) -> Option<Kind> {
    if !token.is_keyword() {
        return None;
    }
    match token.text.as_str() {
        "module" => Some(Kind::Module),
        "struct" => Some(Kind::Struct),
        "union" => Some(Kind::Union),
        "enum" => Some(Kind::Enum),
        "exception" => Some(Kind::Exception),
        "interface" => Some(Kind::Interface),
        _ => None,
    }
}

fn anonymous_prefix(kind: Kind) -> &'static str {
    match kind {
        Kind::Enum => "enum",
        Kind::Struct => "struct",
        Kind::Union => "union",
        Kind::Module => "namespace",
        Kind::Interface => "interface",
        Kind::Exception => "except",
        _ => "anonymous",
    }
}

fn supports_arrays(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Variable | Kind::Const | Kind::Typedef | Kind::Parameter | Kind::CaseEntry
    )
}

fn supports_multiple(kind: Kind) -> bool {
    matches!(kind, Kind::Variable | Kind::Const | Kind::Attribute)
}

/// Statement prefixes
#[derive(Debug, Default, Clone, Copy)]
struct Prefix {
    constant: bool,
    readonly: bool,
    typedef: bool,
    local: bool,
}

impl Prefix {
    fn any(self) -> bool {
        self.constant || self.readonly || self.typedef
    }
}

impl Parser {
    /// Process the whole input as content of the root entity
    pub(crate) fn process_root(&mut self) -> Result<()> {
        let root = self.tree.root();
        self.process_content(root)
    }

    /// Process the members of a definition up to its closing bracket (or
    /// the end of input for the root)
    fn process_content(&mut self, owner: EntityId) -> Result<()> {
        let owner_kind = self.tree.get(owner).kind;
        loop {
            let token = self.peek_token(0)?;
            if token.is_eof() {
                break;
            }
            if token.is("}") {
                if owner_kind == Kind::Root {
                    return Err(syntax_at("Unexpected curly bracket '}'.", &token));
                }
                break;
            }

            let mut pre_comments = self.pre_comment_tokens()?;
            let mut token = self.get_token()?;
            let begin = (token.line, token.col);

            let mut prefix = Prefix::default();
            if token.is("const") {
                if !supports(owner_kind, Member::Const) {
                    return Err(syntax_at("Unexpected keyword 'const'.", &token));
                }
                prefix.constant = true;
                token = self.get_token()?;
            } else if token.is("readonly") {
                if !supports(owner_kind, Member::Attribute) {
                    return Err(syntax_at("Unexpected keyword 'readonly'.", &token));
                }
                prefix.readonly = true;
                token = self.get_token()?;
            } else if token.is("typedef") {
                if !supports(owner_kind, Member::Typedef) {
                    return Err(syntax_at("Unexpected keyword 'typedef'.", &token));
                }
                prefix.typedef = true;
                token = self.get_token()?;
            } else if token.is("local") {
                if !supports(owner_kind, Member::Definition(Kind::Interface)) {
                    return Err(syntax_at("Unexpected keyword 'local'.", &token));
                }
                prefix.local = true;
                token = self.get_token()?;
                if !token.is("interface") {
                    return Err(syntax_at("Unexpected token. Only interfaces can be local.", &token));
                }
            }

            let mut definition = None;
            if let Some(kind) = definition_kind(&token) {
                if self.is_definition_start()? {
                    if !supports(owner_kind, Member::Definition(kind)) {
                        return Err(syntax_at(format!("Unexpected keyword '{}'.", token.text), &token));
                    }
                    let comments = if prefix.any() { Vec::new() } else { std::mem::take(&mut pre_comments) };
                    debug!(kind = %kind, "definition detected");
                    let id = self.process_definition(owner, kind, &token, prefix.local, &comments)?;
                    token = self.get_token()?;
                    self.process_post_comments(id, token.line)?;
                    definition = Some(id);
                }
            }

            let mut anonymous_declaration = false;
            if let Some(id) = definition {
                if token.is(";") {
                    if prefix.any() {
                        return Err(syntax_at("Unexpected token ';'.", &token));
                    }
                    self.set_end(id, &token);
                    if !self.tree.get(id).anonymous {
                        continue;
                    }
                    if !supports(owner_kind, Member::Variable) {
                        return Err(syntax_at(
                            "The definition requires a declaration following the definition content - unexpected token ';'.",
                            &token,
                        ));
                    }
                    self.prepend_token(token.clone());
                    let mut name = token.clone();
                    name.kind = TokenKind::Identifier;
                    name.text = self.generate_anonymous_name("var");
                    token = name;
                    anonymous_declaration = true;
                } else if token.is_eof() && !prefix.any() {
                    return Err(syntax_at("Missing ';' following the token.", &token));
                } else {
                    self.prepend_token(token.clone());
                }
            } else if token.is(";") {
                return Err(syntax_at("Unexpected token ';'.", &token));
            }

            if prefix.readonly && !token.is("attribute") {
                return Err(syntax_at("Expecting 'attribute' keyword following 'readonly'.", &token));
            }

            if token.is("case") || token.is("default") {
                if prefix.any() || definition.is_some() || !supports(owner_kind, Member::Case) {
                    return Err(syntax_at(format!("Unexpected keyword '{}'.", token.text), &token));
                }
                self.process_case(owner, token, pre_comments)?;
                continue;
            }

            let (kind, ty, name) = if token.is("attribute") {
                if prefix.constant || prefix.typedef || definition.is_some() || !supports(owner_kind, Member::Attribute) {
                    return Err(syntax_at("Unexpected keyword 'attribute'.", &token));
                }
                let ty = self.process_type(owner)?;
                let name = self.declaration_name()?;
                (Kind::Attribute, ty, name)
            } else {
                let ty = match definition {
                    Some(id) => {
                        let ty = self.definition_type(id, &token)?;
                        if anonymous_declaration {
                            self.prepend_token(token);
                        }
                        ty
                    }
                    None => {
                        self.prepend_token(token);
                        self.process_type(owner)?
                    }
                };
                let name = self.declaration_name()?;
                let next = self.peek_token(0)?;
                let kind = if next.is("(") {
                    if definition.is_some() || prefix.constant || prefix.typedef || !supports(owner_kind, Member::Operation) {
                        return Err(syntax_at("Unexpected left bracket '('.", &next));
                    }
                    Kind::Operation
                } else if prefix.typedef {
                    Kind::Typedef
                } else if prefix.constant {
                    Kind::Const
                } else {
                    if !supports(owner_kind, Member::Variable) {
                        return Err(syntax_at("Variable declaration is not supported.", &name));
                    }
                    Kind::Variable
                };
                (kind, ty, name)
            };

            debug!(kind = %kind, name = %name.text, "declaration detected");
            let readonly = prefix.constant || prefix.readonly;
            let mut name = name;
            let mut comments = Some(pre_comments);
            let mut begin = begin;
            loop {
                let (id, terminator) = self.process_declarator(owner, kind, &ty, &name, readonly, begin, comments.take())?;
                if anonymous_declaration {
                    self.tree.get_mut(id).anonymous = true;
                }
                if terminator.is(",") {
                    if !supports_multiple(kind) {
                        return Err(syntax_at(
                            "Multiple declarations on a single line of code is not supported for this type.",
                            &terminator,
                        ));
                    }
                    name = self.declaration_name()?;
                    begin = (name.line, name.col);
                    continue;
                }
                if !terminator.is(";") {
                    return Err(syntax_at("Missing semicolon ';' following the declaration.", &terminator));
                }
                break;
            }
        }

        self.post_process_members(owner)
    }

    /// A keyword followed by two identifiers starts a declaration
    fn is_definition_start(&mut self) -> Result<bool> {
        let first = self.peek_token(0)?;
        let second = self.peek_token(1)?;
        Ok(!(first.is_identifier() && second.is_identifier()))
    }

    fn set_end(&mut self, id: EntityId, token: &Token) {
        let position = &mut self.tree.get_mut(id).position;
        position.end_line = token.line;
        position.end_col = token.col;
    }

    fn declaration_name(&mut self) -> Result<Token> {
        let token = self.get_token()?;
        if token.is_keyword() {
            if !self.env.context_dependent_names {
                return Err(syntax_at("The identifier cannot be a reserved keyword.", &token));
            }
            return Ok(token);
        }
        if !token.is_identifier() {
            return Err(syntax_at("Expecting an identifier.", &token));
        }
        Ok(token)
    }

    /// Type of a declaration following a definition, e.g. `struct S {...} s;`
    fn definition_type(&self, id: EntityId, at: &Token) -> Result<TypeDeclaration> {
        let entity = self.tree.get(id);
        let base = match entity.kind {
            Kind::Struct => DeclType::Struct,
            Kind::Union => DeclType::Union,
            Kind::Enum => DeclType::Enum,
            Kind::Exception => DeclType::Exception,
            Kind::Interface => DeclType::Interface,
            _ => return Err(syntax_at("Missing ';' following the token.", at)),
        };
        let mut ty = TypeDeclaration::new(base, entity.name.clone());
        ty.definition = Some(id);
        Ok(ty)
    }

    /// Process a definition starting after its keyword
    fn process_definition(
        &mut self,
        owner: EntityId,
        kind: Kind,
        keyword: &Token,
        local: bool,
        comments: &[Token],
    ) -> Result<EntityId> {
        let data = EntityData::Definition(Definition {
            local,
            ..Definition::default()
        });
        let id = self
            .tree
            .add(owner, kind, keyword.source, Position::at(keyword.line, keyword.col), data)?;

        let token = self.get_token()?;
        let (name, anonymous) = if token.is_identifier() {
            (token.text.clone(), false)
        } else if matches!(kind, Kind::Struct | Kind::Union | Kind::Enum) {
            if self.tree.get(owner).kind == Kind::Root {
                return Err(syntax_at("Unnamed definitions are not supported at root level.", &token));
            }
            let name = self.generate_anonymous_name(anonymous_prefix(kind));
            debug!(name = %name, "unnamed definition named automatically");
            self.prepend_token(token);
            (name, true)
        } else {
            return Err(syntax_at("Unnamed definition is not supported.", &token));
        };

        let requires_content = self.process_definition_addendum(id, kind)? || anonymous;

        let token = self.get_token()?;
        if requires_content && !token.is("{") {
            return Err(syntax_at("Expecting curly bracket '{'.", &token));
        }
        let forward = !token.is("{");
        let id = self.tree.set_name(id, &name, forward, false)?;
        if forward {
            trace!(name = %name, "forward declaration");
            self.prepend_token(token);
            return Ok(id);
        }
        self.tree.get_mut(id).anonymous = anonymous;
        self.set_comment_tokens(id, comments, true)?;

        if kind == Kind::Enum {
            self.process_enum_content(id)?;
        } else {
            self.process_content(id)?;
        }

        let token = self.get_token()?;
        if !token.is("}") {
            return Err(syntax_at("Expecting curly bracket '}'.", &token));
        }
        self.set_end(id, &token);
        trace!(name = %name, "definition finished");
        Ok(id)
    }

    /// Inheritance list or union switch; returns whether content is required
    fn process_definition_addendum(&mut self, id: EntityId, kind: Kind) -> Result<bool> {
        if kind == Kind::Union {
            return self.process_union_switch(id);
        }

        let token = self.get_token()?;
        if !token.is(":") {
            self.prepend_token(token);
            return Ok(false);
        }
        if !kind.supports_inheritance() {
            return Err(syntax_at("Inheritance is not supported.", &token));
        }

        let owner = self.tree.parent(id).unwrap_or(self.tree.root());
        let mut bases = Vec::new();
        loop {
            let first = self.get_token()?;
            let (name, last) = self.read_scoped_name(first)?;
            let Some(base) = self.tree.find_type(owner, &name) else {
                return Err(syntax_at("Base not found.", &last));
            };
            let resolved = self.tree.resolved_entity(base);
            if self.tree.get(resolved).kind != kind {
                return Err(syntax_at("Cannot inherit from different types.", &last));
            }
            if self.tree.get(resolved).forward {
                return Err(syntax_at("Base type found, but only declared; definition is missing.", &last));
            }
            debug!(base = %name, "inherits from");
            bases.push(resolved);

            let token = self.get_token()?;
            if !token.is(",") {
                self.prepend_token(token);
                break;
            }
        }
        if let Some(definition) = self.tree.get_mut(id).definition_mut() {
            definition.bases = bases;
        }
        Ok(true)
    }

    fn process_union_switch(&mut self, id: EntityId) -> Result<bool> {
        if self.peek_token(0)?.is(";") {
            return Ok(false);
        }
        let token = self.get_token()?;
        if !token.is("switch") {
            return Err(syntax_at("Expecting a switch statement following the union identifier.", &token));
        }
        let token = self.get_token()?;
        if !token.is("(") {
            return Err(syntax_at("Expecting a left bracket '('.", &token));
        }
        let type_token = self.peek_token(0)?;
        let owner = self.tree.parent(id).unwrap_or(self.tree.root());
        let switch_type = self.process_type(owner)?;
        let integral = switch_type
            .value_kind()
            .is_some_and(|kind| kind.is_integral() || kind == ValueKind::Bool);
        if !integral {
            return Err(syntax_at("Expecting an integral or enum identifier type or variable.", &type_token));
        }
        let token = self.get_token()?;
        if !token.is(")") {
            return Err(syntax_at("Expecting a right bracket ')'.", &token));
        }
        if let Some(definition) = self.tree.get_mut(id).definition_mut() {
            definition.switch_type = Some(switch_type);
        }
        Ok(true)
    }

    /// Process one declarator: name, arrays, parameters, raises lists and
    /// assignment. Returns the entity and the token terminating it.
    #[allow(clippy::too_many_arguments)]
    fn process_declarator(
        &mut self,
        owner: EntityId,
        kind: Kind,
        ty: &TypeDeclaration,
        name: &Token,
        readonly: bool,
        begin: (u32, u32),
        comments: Option<Vec<Token>>,
    ) -> Result<(EntityId, Token)> {
        if ty.base == DeclType::Void && kind != Kind::Operation {
            return Err(syntax_at("The use of 'void' as type is not supported.", name));
        }
        if ty.base == DeclType::Interface && kind == Kind::Const {
            return Err(syntax_at("The declaration of interfaces is not supported.", name));
        }

        let mut decl = Declaration::new(ty.clone());
        decl.readonly = readonly;
        let id = self.tree.add(
            owner,
            kind,
            name.source,
            Position::at(begin.0, begin.1),
            EntityData::Declaration(Box::new(decl)),
        )?;
        let id = self.tree.set_name(id, &name.text, false, false)?;
        if let Some(comments) = comments {
            self.set_comment_tokens(id, &comments, true)?;
        }

        let dimensions = if kind == Kind::Operation {
            Vec::new()
        } else {
            self.array_dimensions(kind)?
        };

        let mut token = self.get_token()?;
        let mut parameters = Vec::new();
        let mut const_operation = false;
        if kind == Kind::Operation {
            if !token.is("(") {
                return Err(syntax_at("Expected left bracket '('.", &token));
            }
            parameters = self.process_parameters(id)?;
            token = self.get_token()?;
            if token.is("const") {
                const_operation = true;
                token = self.get_token()?;
            }
        }

        let mut raises = Vec::new();
        let mut get_raises = Vec::new();
        let mut set_raises = Vec::new();
        if matches!(kind, Kind::Operation | Kind::Attribute) {
            loop {
                let separate = kind == Kind::Attribute;
                let list = if token.is("raises") {
                    if separate {
                        if readonly {
                            &mut get_raises
                        } else {
                            return Err(syntax_at(
                                "Cannot set a separate 'raises' exception list; use the 'getraises' or 'setraises' keyword instead.",
                                &token,
                            ));
                        }
                    } else {
                        &mut raises
                    }
                } else if token.is("getraises") || token.is("setraises") {
                    if !separate {
                        return Err(syntax_at(
                            format!(
                                "Cannot set a separate '{}' exception list; use the 'raises' keyword instead.",
                                token.text
                            ),
                            &token,
                        ));
                    }
                    if token.is("setraises") {
                        if readonly {
                            return Err(syntax_at("Cannot set a set-raises exception list for a readonly type.", &token));
                        }
                        &mut set_raises
                    } else {
                        &mut get_raises
                    }
                } else {
                    break;
                };
                if !list.is_empty() {
                    return Err(syntax_at(
                        format!("Multiple definitions of '{}' exceptions are not allowed.", token.text),
                        &token,
                    ));
                }
                *list = self.raises_list(owner)?;
                token = self.get_token()?;
            }
        }

        let mut assignment = Vec::new();
        if token.is("=") {
            if !kind.supports_assignment() {
                return Err(syntax_at(
                    "Assignment operator detected, but type doesn't support assignments.",
                    &token,
                ));
            }
            let (tokens, terminator) = self.assignment_tokens()?;
            assignment = tokens;
            token = terminator;
        } else if kind == Kind::Const {
            return Err(syntax_at("Expecting an assignment operator.", &token));
        }

        if let Some(decl) = self.tree.get_mut(id).declaration_mut() {
            decl.dimensions = dimensions;
            decl.parameters = parameters;
            decl.const_operation = const_operation;
            decl.raises = raises;
            decl.get_raises = get_raises;
            decl.set_raises = set_raises;
            decl.assignment = assignment;
        }
        self.process_post_comments(id, token.line)?;
        self.set_end(id, &token);
        Ok((id, token))
    }

    fn array_dimensions(&mut self, kind: Kind) -> Result<Vec<Vec<Token>>> {
        let mut dimensions = Vec::new();
        while self.peek_token(0)?.is("[") {
            let open = self.get_token()?;
            if !supports_arrays(kind) {
                return Err(syntax_at("Unexpected token '['.", &open));
            }
            if !dimensions.is_empty() && !self.env.multi_dim_array {
                return Err(syntax_at(
                    "Multi-dimensional arrays are not allowed. Unexpected token '['.",
                    &open,
                ));
            }

            let mut size = Vec::new();
            let mut depth = 1usize;
            loop {
                let token = self.get_token()?;
                if token.is_eof() {
                    return Err(syntax_at("Unexpected end of file found; missing ']'.", &token));
                }
                if token.is(";") {
                    return Err(syntax_at("Unexpected end of declaration; missing ']'.", &token));
                }
                if token.is("[") {
                    depth += 1;
                }
                if token.is("]") {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                size.push(token);
            }
            trace!(dimension = %super::join_tokens(&size), "array dimension");
            dimensions.push(size);
        }
        Ok(dimensions)
    }

    /// Tokens up to `;` or a top level `,`/`}`
    fn assignment_tokens(&mut self) -> Result<(Vec<Token>, Token)> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = self.get_token()?;
            if token.is_eof() {
                return Err(syntax_at("Unexpected end of file found; missing ';'.", &token));
            }
            if token.is(";") || ((token.is(",") || token.is("}")) && depth == 0) {
                return Ok((tokens, token));
            }
            if token.is("{") {
                depth += 1;
            }
            if token.is("}") {
                depth -= 1;
            }
            tokens.push(token);
        }
    }

    /// Parameters of an operation; the opening bracket has been read
    fn process_parameters(&mut self, operation: EntityId) -> Result<Vec<EntityId>> {
        let mut parameters = Vec::new();
        if self.peek_token(0)?.is(")") {
            self.get_token()?;
            return Ok(parameters);
        }

        loop {
            let token = self.get_token()?;
            let direction = match token.text.as_str() {
                "in" if token.is_keyword() => Direction::In,
                "out" if token.is_keyword() => Direction::Out,
                "inout" if token.is_keyword() => Direction::InOut,
                _ => {
                    return Err(syntax_at(
                        "Expecting a parameter direction 'in', 'out' or 'inout'.",
                        &token,
                    ))
                }
            };
            let ty = self.process_type(operation)?;
            let name = self.declaration_name()?;
            if ty.base == DeclType::Void {
                return Err(syntax_at("The use of 'void' as type is not supported.", &name));
            }

            let mut decl = Declaration::new(ty);
            decl.direction = Some(direction);
            let id = self.tree.add(
                operation,
                Kind::Parameter,
                name.source,
                Position::at(token.line, token.col),
                EntityData::Declaration(Box::new(decl)),
            )?;
            let id = self.tree.set_name(id, &name.text, false, true)?;
            let dimensions = self.array_dimensions(Kind::Parameter)?;
            if let Some(decl) = self.tree.get_mut(id).declaration_mut() {
                decl.dimensions = dimensions;
            }
            trace!(name = %name.text, direction = ?direction, "parameter");
            parameters.push(id);

            let token = self.get_token()?;
            if token.is(")") {
                break;
            }
            if !token.is(",") {
                return Err(syntax_at("Expected right bracket ')'.", &token));
            }
        }
        Ok(parameters)
    }

    /// `( A, B::C )` following a raises keyword
    fn raises_list(&mut self, owner: EntityId) -> Result<Vec<EntityId>> {
        let token = self.get_token()?;
        if !token.is("(") {
            return Err(syntax_at("Expected left bracket '('.", &token));
        }
        if self.peek_token(0)?.is(")") {
            return Err(syntax_at("Missing exception types.", &token));
        }

        let mut exceptions = Vec::new();
        loop {
            let first = self.get_token()?;
            let (name, last) = self.read_scoped_name(first)?;
            let Some(found) = self.tree.find_type(owner, &name) else {
                return Err(CompileError::resolve(format!("Could not find the definition of '{}'.", name))
                    .at(last.line, last.col));
            };
            let resolved = self.tree.resolved_entity(found);
            if self.tree.get(resolved).kind != Kind::Exception {
                return Err(syntax_at(format!("The type '{}' is not an exception.", name), &last));
            }
            exceptions.push(resolved);

            let token = self.get_token()?;
            if token.is(")") {
                break;
            }
            if !token.is(",") {
                return Err(syntax_at("Expected right bracket ')'.", &token));
            }
        }
        Ok(exceptions)
    }

    /// `case <label>: <declaration>;` or `default: <declaration>;`. A label
    /// directly followed by another label or the closing bracket has no
    /// declaration of its own.
    fn process_case(&mut self, owner: EntityId, label: Token, comments: Vec<Token>) -> Result<()> {
        let default = label.is("default");
        let mut tokens = Vec::new();
        loop {
            let token = self.get_token()?;
            if token.is(":") {
                break;
            }
            if token.is_eof() || token.is(";") {
                return Err(syntax_at("Expecting a colon ':' following the case label.", &token));
            }
            if default {
                return Err(syntax_at("Default case label cannot have a value.", &token));
            }
            tokens.push(token);
        }
        if !default && tokens.is_empty() {
            return Err(syntax_at("Missing case label value.", &label));
        }
        trace!(label = %super::join_tokens(&tokens), default, "case label");

        let next = self.peek_token(0)?;
        let nested_struct = next.is("struct") && (self.peek_token(1)?.is("{") || self.peek_token(2)?.is("{"));
        let nested_union = next.is("union") && (self.peek_token(1)?.is("switch") || self.peek_token(2)?.is("switch"));
        if nested_struct || nested_union {
            return Err(syntax_at("Cannot make a definition inside an union.", &next));
        }

        let id = if next.is("case") || next.is("default") || next.is("}") {
            let decl = Declaration::new(TypeDeclaration::new(DeclType::Void, "void"));
            let id = self.tree.add(
                owner,
                Kind::CaseEntry,
                label.source,
                Position::at(label.line, label.col),
                EntityData::Declaration(Box::new(decl)),
            )?;
            let name = self.generate_anonymous_name("case");
            let id = self.tree.set_name(id, &name, false, false)?;
            self.set_comment_tokens(id, &comments, true)?;
            self.process_post_comments(id, label.line)?;
            id
        } else {
            let ty = self.process_type(owner)?;
            let name = self.declaration_name()?;
            let (id, terminator) =
                self.process_declarator(owner, Kind::CaseEntry, &ty, &name, false, (label.line, label.col), Some(comments))?;
            if !terminator.is(";") {
                return Err(syntax_at("Missing semicolon ';' following the declaration.", &terminator));
            }
            id
        };

        if let Some(decl) = self.tree.get_mut(id).declaration_mut() {
            decl.default_case = default;
            if !default {
                decl.case_labels = vec![tokens];
            }
        }
        Ok(())
    }

    /// `name [= value], ...` up to the closing bracket
    fn process_enum_content(&mut self, owner: EntityId) -> Result<()> {
        let mut ty = TypeDeclaration::new(DeclType::Enum, self.tree.get(owner).name.clone());
        ty.definition = Some(owner);

        loop {
            let token = self.peek_token(0)?;
            if token.is("}") || token.is_eof() {
                break;
            }
            let comments = self.pre_comment_tokens()?;
            let name = self.declaration_name()?;
            let id = self.tree.add(
                owner,
                Kind::EnumEntry,
                name.source,
                Position::at(name.line, name.col),
                EntityData::Declaration(Box::new(Declaration::new(ty.clone()))),
            )?;
            let id = self.tree.set_name(id, &name.text, false, false)?;
            self.set_comment_tokens(id, &comments, true)?;

            let mut token = self.get_token()?;
            if token.is("=") {
                let (tokens, terminator) = self.assignment_tokens()?;
                if let Some(decl) = self.tree.get_mut(id).declaration_mut() {
                    decl.assignment = tokens;
                }
                token = terminator;
            }
            self.process_post_comments(id, token.line)?;
            self.set_end(id, &token);
            trace!(name = %name.text, "enum entry");

            if token.is("}") {
                self.prepend_token(token);
                break;
            }
            if !token.is(",") {
                return Err(syntax_at("Expecting a comma ',' or a closing curly bracket '}'.", &token));
            }
        }

        let entries = self.tree.children(owner).to_vec();
        let mut seen = Vec::with_capacity(entries.len());
        for entry in entries {
            self.post_process(entry)?;
            let entity = self.tree.get(entry);
            let Some(value) = entity.declaration().and_then(|decl| decl.value.constant()).cloned() else {
                return Err(CompileError::constant(format!(
                    "The value for '{}' must be a system type value.",
                    entity.name
                )));
            };
            if seen.contains(&value) {
                let position = entity.position;
                return Err(CompileError::constant(format!(
                    "The value for '{}' is already defined for another entry.",
                    entity.name
                ))
                .at(position.begin_line, position.begin_col));
            }
            seen.push(value);
        }
        Ok(())
    }

    /// Evaluate the declarations of a definition: types and unions first,
    /// then consts, attributes and operations, and variables last
    fn post_process_members(&mut self, owner: EntityId) -> Result<()> {
        let children = self.tree.children(owner).to_vec();
        let of_kind = |tree: &super::EntityTree, kinds: &[Kind]| -> Vec<EntityId> {
            children
                .iter()
                .copied()
                .filter(|child| kinds.contains(&tree.get(*child).kind))
                .collect()
        };

        for id in of_kind(&self.tree, &[Kind::Typedef, Kind::Union]) {
            if self.tree.get(id).kind == Kind::Union {
                self.check_union(id)?;
            } else {
                trace!(name = %self.tree.get(id).name, "post-processing typedef");
                self.post_process(id)?;
            }
        }
        for id in of_kind(&self.tree, &[Kind::Const]) {
            trace!(name = %self.tree.get(id).name, "post-processing const");
            self.post_process(id)?;
        }
        for id in of_kind(&self.tree, &[Kind::Attribute, Kind::Operation]) {
            trace!(name = %self.tree.get(id).name, "post-processing attribute/operation");
            self.post_process(id)?;
            for parameter in self.tree.parameters(id).to_vec() {
                self.post_process(parameter)?;
            }
        }
        for id in of_kind(&self.tree, &[Kind::Variable, Kind::CaseEntry]) {
            trace!(name = %self.tree.get(id).name, "post-processing variable");
            self.post_process(id)?;
        }
        Ok(())
    }

    /// Case labels of a union must be unique; at most one default
    fn check_union(&mut self, union: EntityId) -> Result<()> {
        if self.tree.get(union).forward {
            return Ok(());
        }
        let mut default_seen = false;
        let mut labels = Vec::new();
        for entry in self.tree.children(union).to_vec() {
            if self.tree.get(entry).kind != Kind::CaseEntry {
                continue;
            }
            self.post_process(entry)?;
            let entity = self.tree.get(entry);
            let position = entity.position;
            let Some(decl) = entity.declaration() else {
                continue;
            };
            if decl.default_case {
                if default_seen {
                    return Err(CompileError::syntax("Duplicate default switch found.")
                        .at(position.begin_line, position.begin_col));
                }
                default_seen = true;
            }
            for value in &decl.case_values {
                if labels.contains(value) {
                    return Err(CompileError::syntax("Duplicate switch case label found.")
                        .at(position.begin_line, position.begin_col));
                }
                labels.push(value.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_members() {
        assert!(supports(Kind::Module, Member::Definition(Kind::Interface)));
        assert!(!supports(Kind::Module, Member::Variable));
        assert!(supports(Kind::Struct, Member::Variable));
        assert!(!supports(Kind::Struct, Member::Operation));
        assert!(supports(Kind::Interface, Member::Operation));
        assert!(!supports(Kind::Interface, Member::Variable));
        assert!(supports(Kind::Union, Member::Case));
        assert!(!supports(Kind::Enum, Member::Const));
    }

    #[test]
    fn test_anonymous_prefixes() {
        assert_eq!(anonymous_prefix(Kind::Exception), "except");
        assert_eq!(anonymous_prefix(Kind::Module), "namespace");
    }
}
