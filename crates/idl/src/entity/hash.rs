//! Structural hashing of entity subtrees

use std::hash::Hasher;

use rustc_hash::{FxHashSet, FxHasher};

use super::{join_tokens, EntityData, EntityId, EntityTree, TypeDeclaration};

/// Entity hashing state; guards against self-referencing types
struct HashWalk<'t> {
    tree: &'t EntityTree,
    hasher: FxHasher,
    visiting: FxHashSet<EntityId>,
}

impl HashWalk<'_> {
    fn write(&mut self, s: &str) {
        self.hasher.write(s.as_bytes());
        self.hasher.write_u8(0xff);
    }

    fn entity(&mut self, id: EntityId) {
        let tree = self.tree;
        let entity = tree.get(id);
        self.write(&tree.scoped_name(id));
        if !self.visiting.insert(id) {
            return;
        }
        self.write(entity.kind.keyword());

        match &entity.data {
            EntityData::Root { .. } => {}
            EntityData::Meta { content, .. } => self.write(content),
            EntityData::Definition(def) => {
                for base in &def.bases {
                    self.write(&tree.scoped_name(*base));
                }
                if let Some(switch_type) = &def.switch_type {
                    self.type_decl(switch_type);
                }
                if def.local {
                    self.write("local");
                }
            }
            EntityData::Declaration(decl) => {
                self.type_decl(&decl.decl_type);
                for dimension in &decl.dimensions {
                    self.write(&join_tokens(dimension));
                }
                self.write(&decl.assignment_text());
                self.write(&decl.value.to_string());
                if decl.readonly {
                    self.write("readonly");
                }
                if let Some(direction) = decl.direction {
                    self.write(&format!("{:?}", direction));
                }
                for label in &decl.case_labels {
                    self.write(&join_tokens(label));
                }
                if decl.default_case {
                    self.write("default");
                }
                for list in [&decl.raises, &decl.get_raises, &decl.set_raises] {
                    for exception in list {
                        self.write(&tree.scoped_name(*exception));
                    }
                    self.hasher.write_u8(0xfe);
                }
            }
        }

        for child in entity.children() {
            self.entity(*child);
        }
        // Parameters are not part of the child list
        for parameter in tree.parameters(id) {
            self.entity(*parameter);
        }
        self.visiting.remove(&id);
    }

    fn type_decl(&mut self, ty: &TypeDeclaration) {
        self.write(&ty.text);
        self.hasher.write_u32(ty.fixed_len);
        self.hasher.write_u32(ty.decimals);
        if let Some(definition) = ty.definition {
            self.entity(definition);
        }
        if let Some(key) = &ty.key_type {
            self.type_decl(key);
        }
        if let Some(value) = &ty.value_type {
            self.type_decl(value);
        }
    }
}

impl EntityTree {
    /// Deterministic hash of an entity and everything it depends on
    pub fn calc_hash(&self, id: EntityId) -> u64 {
        let mut walk = HashWalk {
            tree: self,
            hasher: FxHasher::default(),
            visiting: FxHashSet::default(),
        };
        walk.entity(id);
        walk.hasher.finish()
    }

    /// Identity hash derived from the scoped name and kind
    pub fn id_hash(&self, id: EntityId) -> u64 {
        let mut hasher = FxHasher::default();
        hasher.write(self.scoped_name(id).as_bytes());
        hasher.write(self.get(id).kind.keyword().as_bytes());
        hasher.finish()
    }
}
