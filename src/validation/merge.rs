//! Deterministic union of per-source schema fragments.
//!
//! Rules:
//! - Sources are merged in key order; definitions keep first-appearance order.
//! - Root operation types (`Query`, `Mutation`, `Subscription`, and any type a
//!   `schema` definition names) are unioned field by field. A field defined by
//!   two sources must be identical.
//! - Every other named type, and every directive definition, must be
//!   structurally identical across the sources that define it. Descriptions
//!   are not part of the structure; the first one wins.
//! - `extend` definitions fold into the extended type once all definitions are
//!   known. Extending an unknown type (other than a root operation type) or a
//!   type of a different kind fails.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::print::print_document;
use super::sdl::{
    parse_document, Definition, DirectiveDefinition, Document, EnumValue, FieldDefinition, InputValue,
    SchemaDefinition, TypeDefinition, TypeKind,
};
use crate::error::SchemaError;

const DEFAULT_ROOT_TYPES: [&str; 3] = ["Query", "Mutation", "Subscription"];

/// Parse, merge and print `fragments` (source name → SDL) in one step.
pub fn merge_and_print(fragments: &BTreeMap<String, String>) -> Result<String, SchemaError> {
    merge_fragments(fragments).map(|document| print_document(&document))
}

pub fn merge_fragments(fragments: &BTreeMap<String, String>) -> Result<Document, SchemaError> {
    let mut parsed = Vec::with_capacity(fragments.len());
    for (source_name, sdl) in fragments {
        let document = parse_document(sdl).map_err(|diagnostic| SchemaError::Parse {
            source_name: source_name.clone(),
            diagnostic,
        })?;
        parsed.push((source_name.as_str(), document));
    }

    let mut merger = Merger::new(&parsed);
    let mut extensions = Vec::new();
    for (source, document) in parsed {
        for definition in document.definitions {
            match definition {
                Definition::Schema(schema) => merger.add_schema(schema, source)?,
                Definition::Type(def) => merger.add_type(def, source)?,
                Definition::Directive(def) => merger.add_directive(def, source)?,
                Definition::Extension(def) => extensions.push((def, source)),
            }
        }
    }
    for (def, source) in extensions {
        merger.extend_type(def, source)?;
    }

    Ok(merger.finish())
}

enum Slot {
    Schema,
    Type(String),
    Directive(String),
}

struct TypeEntry {
    def: TypeDefinition,
    source: String,
    /// Member (field, input field or enum value) name → defining source.
    member_sources: HashMap<String, String>,
}

impl TypeEntry {
    fn new(def: TypeDefinition, source: &str) -> Self {
        let member_sources = def
            .fields
            .iter()
            .map(|f| f.name.clone())
            .chain(def.input_fields.iter().map(|f| f.name.clone()))
            .chain(def.enum_values.iter().map(|v| v.name.clone()))
            .map(|name| (name, source.to_string()))
            .collect();
        Self {
            def,
            source: source.to_string(),
            member_sources,
        }
    }

    /// Fold `other` into this type: union of members, identical duplicates allowed.
    fn absorb(&mut self, other: TypeDefinition, source: &str) -> Result<(), SchemaError> {
        let type_name = self.def.name.clone();
        union_members(&type_name, &mut self.def.fields, other.fields, &mut self.member_sources, source)?;
        union_members(&type_name, &mut self.def.input_fields, other.input_fields, &mut self.member_sources, source)?;
        union_members(&type_name, &mut self.def.enum_values, other.enum_values, &mut self.member_sources, source)?;
        union_distinct(&mut self.def.interfaces, other.interfaces);
        union_distinct(&mut self.def.members, other.members);
        union_distinct(&mut self.def.directives, other.directives);
        if self.def.description.is_none() {
            self.def.description = other.description;
        }
        Ok(())
    }
}

trait Member: Clone + PartialEq {
    fn member_name(&self) -> &str;

    fn without_description(&self) -> Self;
}

impl Member for FieldDefinition {
    fn member_name(&self) -> &str {
        &self.name
    }

    fn without_description(&self) -> Self {
        self.without_descriptions()
    }
}

impl Member for InputValue {
    fn member_name(&self) -> &str {
        &self.name
    }

    fn without_description(&self) -> Self {
        InputValue {
            description: None,
            ..self.clone()
        }
    }
}

impl Member for EnumValue {
    fn member_name(&self) -> &str {
        &self.name
    }

    fn without_description(&self) -> Self {
        EnumValue {
            description: None,
            ..self.clone()
        }
    }
}

fn union_members<T: Member>(
    type_name: &str,
    existing: &mut Vec<T>,
    incoming: Vec<T>,
    sources: &mut HashMap<String, String>,
    source: &str,
) -> Result<(), SchemaError> {
    for member in incoming {
        let position = existing.iter().position(|m| m.member_name() == member.member_name());
        match position {
            Some(i) if existing[i].without_description() == member.without_description() => {}
            Some(_) => {
                return Err(SchemaError::Conflict {
                    definition: format!("{}.{}", type_name, member.member_name()),
                    first_source: sources.get(member.member_name()).cloned().unwrap_or_default(),
                    second_source: source.to_string(),
                });
            }
            None => {
                sources.insert(member.member_name().to_string(), source.to_string());
                existing.push(member);
            }
        }
    }
    Ok(())
}

fn union_distinct<T: PartialEq>(existing: &mut Vec<T>, incoming: Vec<T>) {
    for item in incoming {
        if !existing.contains(&item) {
            existing.push(item);
        }
    }
}

struct Merger {
    root_types: HashSet<String>,
    order: Vec<Slot>,
    schema: Option<(SchemaDefinition, String)>,
    types: HashMap<String, TypeEntry>,
    directives: HashMap<String, (DirectiveDefinition, String)>,
}

impl Merger {
    fn new(parsed: &[(&str, Document)]) -> Self {
        let mut root_types: HashSet<String> = DEFAULT_ROOT_TYPES.iter().map(|s| s.to_string()).collect();
        for (_, document) in parsed {
            for definition in &document.definitions {
                if let Definition::Schema(schema) = definition {
                    root_types.extend(schema.operations.iter().map(|(_, type_name)| type_name.clone()));
                }
            }
        }

        Self {
            root_types,
            order: Vec::new(),
            schema: None,
            types: HashMap::new(),
            directives: HashMap::new(),
        }
    }

    fn is_root(&self, def: &TypeDefinition) -> bool {
        def.kind == TypeKind::Object && self.root_types.contains(&def.name)
    }

    fn add_schema(&mut self, schema: SchemaDefinition, source: &str) -> Result<(), SchemaError> {
        if let Some((current, first_source)) = &mut self.schema {
            for (operation, type_name) in schema.operations {
                match current.operations.iter().find(|(op, _)| *op == operation) {
                    Some((_, existing)) if *existing == type_name => {}
                    Some(_) => {
                        return Err(SchemaError::Conflict {
                            definition: format!("schema.{}", operation),
                            first_source: first_source.clone(),
                            second_source: source.to_string(),
                        });
                    }
                    None => current.operations.push((operation, type_name)),
                }
            }
            union_distinct(&mut current.directives, schema.directives);
            if current.description.is_none() {
                current.description = schema.description;
            }
            return Ok(());
        }

        self.order.push(Slot::Schema);
        self.schema = Some((schema, source.to_string()));
        Ok(())
    }

    fn add_type(&mut self, def: TypeDefinition, source: &str) -> Result<(), SchemaError> {
        let is_root = self.is_root(&def);
        if let Some(entry) = self.types.get_mut(&def.name) {
            if is_root && entry.def.kind == TypeKind::Object {
                return entry.absorb(def, source);
            }
            if !entry.def.same_structure(&def) {
                return Err(SchemaError::Conflict {
                    definition: def.name,
                    first_source: entry.source.clone(),
                    second_source: source.to_string(),
                });
            }
            return Ok(());
        }

        self.order.push(Slot::Type(def.name.clone()));
        self.types.insert(def.name.clone(), TypeEntry::new(def, source));
        Ok(())
    }

    fn extend_type(&mut self, def: TypeDefinition, source: &str) -> Result<(), SchemaError> {
        let is_root = self.is_root(&def);
        match self.types.get_mut(&def.name) {
            Some(entry) if entry.def.kind == def.kind => entry.absorb(def, source),
            None if is_root => {
                self.order.push(Slot::Type(def.name.clone()));
                self.types.insert(def.name.clone(), TypeEntry::new(def, source));
                Ok(())
            }
            _ => Err(SchemaError::InvalidExtension {
                source_name: source.to_string(),
                type_name: def.name,
            }),
        }
    }

    fn add_directive(&mut self, def: DirectiveDefinition, source: &str) -> Result<(), SchemaError> {
        match self.directives.get(&def.name) {
            None => {
                self.order.push(Slot::Directive(def.name.clone()));
                self.directives.insert(def.name.clone(), (def, source.to_string()));
                Ok(())
            }
            Some((existing, first_source)) => {
                let strip = |d: &DirectiveDefinition| DirectiveDefinition {
                    description: None,
                    arguments: d
                        .arguments
                        .iter()
                        .map(|a| InputValue {
                            description: None,
                            ..a.clone()
                        })
                        .collect(),
                    ..d.clone()
                };
                if strip(existing) == strip(&def) {
                    Ok(())
                } else {
                    Err(SchemaError::Conflict {
                        definition: format!("@{}", def.name),
                        first_source: first_source.clone(),
                        second_source: source.to_string(),
                    })
                }
            }
        }
    }

    fn finish(mut self) -> Document {
        let mut definitions = Vec::with_capacity(self.order.len());
        for slot in self.order {
            let definition = match slot {
                Slot::Schema => self.schema.take().map(|(schema, _)| Definition::Schema(schema)),
                Slot::Type(name) => self.types.remove(&name).map(|entry| Definition::Type(entry.def)),
                Slot::Directive(name) => self.directives.remove(&name).map(|(def, _)| Definition::Directive(def)),
            };
            definitions.extend(definition);
        }
        Document { definitions }
    }
}
