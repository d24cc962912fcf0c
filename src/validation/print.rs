//! Canonical SDL printer.
//!
//! Two documents with the same definitions print to byte-identical text,
//! which is what the sync pipeline deduplicates on. Layout: two-space
//! indentation, one member per line, definitions separated by a blank line,
//! descriptions as block strings.

use std::fmt::Write;

use super::sdl::{
    Definition, Directive, DirectiveDefinition, Document, EnumValue, FieldDefinition, InputValue,
    SchemaDefinition, TypeDefinition, TypeKind, TypeRef, Value,
};

pub fn print_document(document: &Document) -> String {
    document
        .definitions
        .iter()
        .map(print_definition)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn print_definition(definition: &Definition) -> String {
    match definition {
        Definition::Schema(schema) => print_schema(schema),
        Definition::Type(def) => print_type(def, false),
        Definition::Extension(def) => print_type(def, true),
        Definition::Directive(def) => print_directive_definition(def),
    }
}

fn print_description(out: &mut String, description: &Option<String>, indent: &str) {
    let Some(text) = description else {
        return;
    };
    if text.contains('\n') || text.contains('"') {
        let escaped = text.replace("\"\"\"", "\\\"\"\"");
        let _ = writeln!(out, "{indent}\"\"\"");
        for line in escaped.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "{indent}{line}");
            }
        }
        let _ = writeln!(out, "{indent}\"\"\"");
    } else {
        let _ = writeln!(out, "{indent}\"\"\"{text}\"\"\"");
    }
}

fn print_schema(schema: &SchemaDefinition) -> String {
    let mut out = String::new();
    print_description(&mut out, &schema.description, "");
    out.push_str("schema");
    out.push_str(&print_directives(&schema.directives));
    out.push_str(" {\n");
    for (operation, type_name) in &schema.operations {
        let _ = writeln!(out, "  {operation}: {type_name}");
    }
    out.push('}');
    out
}

fn print_type(def: &TypeDefinition, extension: bool) -> String {
    let mut out = String::new();
    if !extension {
        print_description(&mut out, &def.description, "");
    } else {
        out.push_str("extend ");
    }
    let _ = write!(out, "{} {}", def.kind.keyword(), def.name);

    if !def.interfaces.is_empty() {
        let _ = write!(out, " implements {}", def.interfaces.join(" & "));
    }
    out.push_str(&print_directives(&def.directives));

    match def.kind {
        TypeKind::Scalar => {}
        TypeKind::Union => {
            if !def.members.is_empty() {
                let _ = write!(out, " = {}", def.members.join(" | "));
            }
        }
        TypeKind::Object | TypeKind::Interface => {
            print_block(&mut out, def.fields.iter().map(print_field));
        }
        TypeKind::InputObject => {
            print_block(&mut out, def.input_fields.iter().map(|v| print_input_value(v, "  ")));
        }
        TypeKind::Enum => {
            print_block(&mut out, def.enum_values.iter().map(print_enum_value));
        }
    }
    out
}

fn print_block(out: &mut String, members: impl Iterator<Item = String>) {
    let members: Vec<String> = members.collect();
    if members.is_empty() {
        return;
    }
    out.push_str(" {\n");
    for member in members {
        out.push_str(&member);
        out.push('\n');
    }
    out.push('}');
}

fn print_field(field: &FieldDefinition) -> String {
    let mut out = String::new();
    print_description(&mut out, &field.description, "  ");
    let _ = write!(
        out,
        "  {}{}: {}{}",
        field.name,
        print_arguments(&field.arguments),
        print_type_ref(&field.ty),
        print_directives(&field.directives)
    );
    out
}

fn print_arguments(arguments: &[InputValue]) -> String {
    if arguments.is_empty() {
        return String::new();
    }
    if arguments.iter().all(|a| a.description.is_none()) {
        let inline: Vec<String> = arguments.iter().map(|a| print_input_value(a, "")).collect();
        return format!("({})", inline.join(", "));
    }
    let lines: Vec<String> = arguments.iter().map(|a| print_input_value(a, "    ")).collect();
    format!("(\n{}\n  )", lines.join("\n"))
}

fn print_input_value(value: &InputValue, indent: &str) -> String {
    let mut out = String::new();
    print_description(&mut out, &value.description, indent);
    let _ = write!(out, "{indent}{}: {}", value.name, print_type_ref(&value.ty));
    if let Some(default) = &value.default_value {
        let _ = write!(out, " = {}", print_value(default));
    }
    out.push_str(&print_directives(&value.directives));
    out
}

fn print_enum_value(value: &EnumValue) -> String {
    let mut out = String::new();
    print_description(&mut out, &value.description, "  ");
    let _ = write!(out, "  {}{}", value.name, print_directives(&value.directives));
    out
}

fn print_directive_definition(def: &DirectiveDefinition) -> String {
    let mut out = String::new();
    print_description(&mut out, &def.description, "");
    let _ = write!(out, "directive @{}{}", def.name, print_arguments(&def.arguments));
    if def.repeatable {
        out.push_str(" repeatable");
    }
    let _ = write!(out, " on {}", def.locations.join(" | "));
    out
}

fn print_directives(directives: &[Directive]) -> String {
    directives
        .iter()
        .map(|d| {
            if d.arguments.is_empty() {
                format!(" @{}", d.name)
            } else {
                let args: Vec<String> = d
                    .arguments
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, print_value(value)))
                    .collect();
                format!(" @{}({})", d.name, args.join(", "))
            }
        })
        .collect()
}

pub fn print_type_ref(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Named(name) => name.clone(),
        TypeRef::List(inner) => format!("[{}]", print_type_ref(inner)),
        TypeRef::NonNull(inner) => format!("{}!", print_type_ref(inner)),
    }
}

fn print_value(value: &Value) -> String {
    match value {
        Value::Variable(name) => format!("${name}"),
        Value::Int(text) | Value::Float(text) => text.clone(),
        Value::String(text) => quote(text),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Enum(name) => name.clone(),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(print_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(name, value)| format!("{}: {}", name, print_value(value)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::sdl::parse_document;

    fn reprint(sdl: &str) -> String {
        print_document(&parse_document(sdl).unwrap())
    }

    #[test]
    fn test_canonical_layout() {
        let printed = reprint(
            r#"type Query{user(id:ID!,verbose:Boolean=false):User @rest(url:"http://x", tags:["a","b"]) ,
               users:[User!]!}
               "A user" type User implements Node { id: ID! }"#,
        );
        assert_eq!(
            printed,
            "type Query {\n  user(id: ID!, verbose: Boolean = false): User @rest(url: \"http://x\", tags: [\"a\", \"b\"])\n  users: [User!]!\n}\n\n\"\"\"A user\"\"\"\ntype User implements Node {\n  id: ID!\n}"
        );
    }

    #[test]
    fn test_printing_is_a_fixed_point() {
        let sdl = r#"
            schema { query: Query }
            """
            Multi-line
            description
            """
            enum Color { RED "the green one" GREEN @deprecated(reason: "use RED") }
            union U = A | B
            scalar JSON @specifiedBy(url: "https://example.com")
            input Filter { name: String = "x\ny", nested: [Int] = [1, 2] }
            directive @auth(role: String = "admin") repeatable on FIELD_DEFINITION | OBJECT
            extend type Query { extra(
                "which one" which: Int
            ): Int }
        "#;
        let once = reprint(sdl);
        assert_eq!(reprint(&once), once);
        assert!(once.contains("extend type Query {"));
        assert!(once.contains("name: String = \"x\\ny\""));
    }
}
