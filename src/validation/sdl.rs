//! Schema definition language: AST and parser.
//!
//! Covers the type-system subset of GraphQL SDL that schema sources contribute:
//! schema definitions, object/interface/input/enum/union/scalar types,
//! `extend` forms of those, and directive definitions. Executable documents
//! (queries, fragments) are rejected.
//!
//! ## Pipeline
//!
//! ```text
//! source text → parse_document() → Document → merge → print → canonical SDL
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, one_of},
    combinator::{all_consuming, map, opt, recognize, value, verify},
    error::{context, ContextError, ErrorKind, ParseError, VerboseError},
    multi::{many0, many0_count, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, tuple},
    IResult,
};

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Schema(SchemaDefinition),
    Type(TypeDefinition),
    Extension(TypeDefinition),
    Directive(DirectiveDefinition),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDefinition {
    pub description: Option<String>,
    pub directives: Vec<Directive>,
    /// `(operation, type name)`, e.g. `("query", "Query")`.
    pub operations: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

impl TypeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            TypeKind::Scalar => "scalar",
            TypeKind::Object => "type",
            TypeKind::Interface => "interface",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
            TypeKind::InputObject => "input",
        }
    }
}

/// A named type. Only the members relevant to `kind` are populated.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub description: Option<String>,
    pub kind: TypeKind,
    pub name: String,
    pub interfaces: Vec<String>,
    pub directives: Vec<Directive>,
    pub fields: Vec<FieldDefinition>,
    pub input_fields: Vec<InputValue>,
    pub enum_values: Vec<EnumValue>,
    pub members: Vec<String>,
}

impl TypeDefinition {
    fn new(kind: TypeKind, name: &str) -> Self {
        Self {
            description: None,
            kind,
            name: name.to_string(),
            interfaces: Vec::new(),
            directives: Vec::new(),
            fields: Vec::new(),
            input_fields: Vec::new(),
            enum_values: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Structural equality: everything except descriptions.
    pub fn same_structure(&self, other: &TypeDefinition) -> bool {
        self.without_descriptions() == other.without_descriptions()
    }

    pub fn without_descriptions(&self) -> TypeDefinition {
        let mut stripped = self.clone();
        stripped.description = None;
        for field in &mut stripped.fields {
            *field = field.without_descriptions();
        }
        for input in &mut stripped.input_fields {
            input.description = None;
        }
        for enum_value in &mut stripped.enum_values {
            enum_value.description = None;
        }
        stripped
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub description: Option<String>,
    pub name: String,
    pub arguments: Vec<InputValue>,
    pub ty: TypeRef,
    pub directives: Vec<Directive>,
}

impl FieldDefinition {
    pub fn without_descriptions(&self) -> FieldDefinition {
        let mut stripped = self.clone();
        stripped.description = None;
        for arg in &mut stripped.arguments {
            arg.description = None;
        }
        stripped
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputValue {
    pub description: Option<String>,
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub description: Option<String>,
    pub name: String,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveDefinition {
    pub description: Option<String>,
    pub name: String,
    pub arguments: Vec<InputValue>,
    pub repeatable: bool,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(String),
    Int(String),
    Float(String),
    String(String),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<Value>),
    Object(Vec<(String, Value)>),
}

// ============================================================================
// Public API
// ============================================================================

/// Parse one schema source. Errors carry a line/column diagnostic.
pub fn parse_document(input: &str) -> Result<Document, String> {
    match all_consuming(document)(input) {
        Ok((_, doc)) if doc.definitions.is_empty() => {
            Err("document contains no type system definitions".to_string())
        }
        Ok((_, doc)) => Ok(doc),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(nom::error::convert_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err("Incomplete input".to_string()),
    }
}

// ============================================================================
// Lexical helpers
// ============================================================================

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Whitespace, commas, comments and byte order marks.
fn ignored(input: &str) -> Res<'_, ()> {
    value(
        (),
        many0_count(alt((
            value((), multispace1),
            value((), char(',')),
            value((), char('\u{feff}')),
            value((), pair(char('#'), take_while(|c: char| c != '\n' && c != '\r'))),
        ))),
    )(input)
}

fn token<'a, O, F>(parser: F) -> impl FnMut(&'a str) -> Res<'a, O>
where
    F: FnMut(&'a str) -> Res<'a, O>,
{
    preceded(ignored, parser)
}

fn punct<'a>(c: char) -> impl FnMut(&'a str) -> Res<'a, char> {
    token(char(c))
}

fn raw_name(input: &str) -> Res<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn name(input: &str) -> Res<'_, String> {
    map(token(raw_name), str::to_string)(input)
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    token(verify(raw_name, move |n: &str| n == kw))
}

fn fail<T>(input: &str, kind: ErrorKind) -> Res<'_, T> {
    Err(nom::Err::Error(VerboseError::from_error_kind(input, kind)))
}

// ============================================================================
// Strings
// ============================================================================

fn string_value(input: &str) -> Res<'_, String> {
    if let Some(rest) = input.strip_prefix("\"\"\"") {
        block_string(input, rest)
    } else if let Some(rest) = input.strip_prefix('"') {
        quoted_string(input, rest)
    } else {
        fail(input, ErrorKind::Char)
    }
}

fn quoted_string<'a>(start: &'a str, body: &'a str) -> Res<'a, String> {
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&body[i + 1..], out)),
            '\n' | '\r' => return fail(start, ErrorKind::Char),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    return fail(start, ErrorKind::Escaped);
                };
                match escaped {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'b' => out.push('\u{0008}'),
                    'f' => out.push('\u{000C}'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'u' => {
                        let mut code = String::with_capacity(4);
                        for _ in 0..4 {
                            match chars.next() {
                                Some((_, h)) if h.is_ascii_hexdigit() => code.push(h),
                                _ => return fail(start, ErrorKind::HexDigit),
                            }
                        }
                        let Some(ch) = u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) else {
                            return fail(start, ErrorKind::HexDigit);
                        };
                        out.push(ch);
                    }
                    _ => return fail(start, ErrorKind::Escaped),
                }
            }
            other => out.push(other),
        }
    }
    fail(start, ErrorKind::Char)
}

fn block_string<'a>(start: &'a str, body: &'a str) -> Res<'a, String> {
    let mut raw = String::new();
    let mut rest = body;
    loop {
        if let Some(after) = rest.strip_prefix("\\\"\"\"") {
            raw.push_str("\"\"\"");
            rest = after;
        } else if let Some(after) = rest.strip_prefix("\"\"\"") {
            return Ok((after, dedent_block(&raw)));
        } else if let Some(c) = rest.chars().next() {
            raw.push(c);
            rest = &rest[c.len_utf8()..];
        } else {
            return fail(start, ErrorKind::Char);
        }
    }
}

/// Block string value: common indentation removed, blank edge lines trimmed.
fn dedent_block(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let common_indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = lines
        .into_iter()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 {
                return l;
            }
            // Indentation chars are single-byte, so the count is a byte offset.
            let strip = l
                .chars()
                .take(common_indent)
                .take_while(|c| matches!(c, ' ' | '\t'))
                .count();
            &l[strip..]
        })
        .collect();

    while out.first().is_some_and(|l| l.trim().is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    out.join("\n")
}

fn description(input: &str) -> Res<'_, Option<String>> {
    opt(token(string_value))(input)
}

// ============================================================================
// Values, types, directives
// ============================================================================

fn number(input: &str) -> Res<'_, Value> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let is_float = text.contains(['.', 'e', 'E']);
    let text = text.to_string();
    Ok((rest, if is_float { Value::Float(text) } else { Value::Int(text) }))
}

/// Deepest list or object nesting accepted in types and values.
pub const MAX_NESTING: usize = 64;

fn too_deep<T>(input: &str) -> Res<'_, T> {
    Err(nom::Err::Failure(VerboseError::add_context(
        input,
        "nesting exceeds 64 levels",
        VerboseError::from_error_kind(input, ErrorKind::TooLarge),
    )))
}

fn value_literal(input: &str) -> Res<'_, Value> {
    nested_value(input, 0)
}

fn nested_value<'a>(input: &'a str, depth: usize) -> Res<'a, Value> {
    if depth > MAX_NESTING {
        return too_deep(input);
    }
    let inner = move |i: &'a str| nested_value(i, depth + 1);
    token(alt((
        map(preceded(char('$'), raw_name), |n| Value::Variable(n.to_string())),
        number,
        map(string_value, Value::String),
        map(raw_name, |n| match n {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            "null" => Value::Null,
            other => Value::Enum(other.to_string()),
        }),
        map(delimited(char('['), many0(inner), punct(']')), Value::List),
        map(
            delimited(
                char('{'),
                many0(separated_pair(name, punct(':'), inner)),
                punct('}'),
            ),
            Value::Object,
        ),
    )))(input)
}

/// `[[Name!]!]!`: opening brackets, the named type, then one `]` per level.
fn type_ref(input: &str) -> Res<'_, TypeRef> {
    let (input, depth) = many0_count(punct('['))(input)?;
    if depth > MAX_NESTING {
        return too_deep(input);
    }

    let (mut input, type_name) = name(input)?;
    let (rest, bang) = opt(punct('!'))(input)?;
    input = rest;
    let mut ty = non_null_if(TypeRef::Named(type_name), bang.is_some());

    for _ in 0..depth {
        let (rest, _) = punct(']')(input)?;
        let (rest, bang) = opt(punct('!'))(rest)?;
        input = rest;
        ty = non_null_if(TypeRef::List(Box::new(ty)), bang.is_some());
    }
    Ok((input, ty))
}

fn non_null_if(ty: TypeRef, non_null: bool) -> TypeRef {
    if non_null {
        TypeRef::NonNull(Box::new(ty))
    } else {
        ty
    }
}

fn directive(input: &str) -> Res<'_, Directive> {
    let (input, _) = punct('@')(input)?;
    let (input, directive_name) = name(input)?;
    let (input, arguments) = opt(delimited(
        punct('('),
        many0(separated_pair(name, punct(':'), value_literal)),
        punct(')'),
    ))(input)?;
    Ok((
        input,
        Directive {
            name: directive_name,
            arguments: arguments.unwrap_or_default(),
        },
    ))
}

fn directives(input: &str) -> Res<'_, Vec<Directive>> {
    many0(directive)(input)
}

fn input_value(input: &str) -> Res<'_, InputValue> {
    let (input, description) = description(input)?;
    let (input, value_name) = name(input)?;
    let (input, _) = context("argument type", punct(':'))(input)?;
    let (input, ty) = type_ref(input)?;
    let (input, default_value) = opt(preceded(punct('='), value_literal))(input)?;
    let (input, directives) = directives(input)?;
    Ok((
        input,
        InputValue {
            description,
            name: value_name,
            ty,
            default_value,
            directives,
        },
    ))
}

fn argument_definitions(input: &str) -> Res<'_, Vec<InputValue>> {
    map(opt(delimited(punct('('), many0(input_value), punct(')'))), Option::unwrap_or_default)(input)
}

fn field_definition(input: &str) -> Res<'_, FieldDefinition> {
    let (input, description) = description(input)?;
    let (input, field_name) = name(input)?;
    let (input, arguments) = argument_definitions(input)?;
    let (input, _) = context("field type", punct(':'))(input)?;
    let (input, ty) = type_ref(input)?;
    let (input, directives) = directives(input)?;
    Ok((
        input,
        FieldDefinition {
            description,
            name: field_name,
            arguments,
            ty,
            directives,
        },
    ))
}

fn enum_value(input: &str) -> Res<'_, EnumValue> {
    let (input, description) = description(input)?;
    let (input, value_name) = name(input)?;
    let (input, directives) = directives(input)?;
    Ok((
        input,
        EnumValue {
            description,
            name: value_name,
            directives,
        },
    ))
}

fn braced<'a, O, F>(item: F) -> impl FnMut(&'a str) -> Res<'a, Vec<O>>
where
    F: FnMut(&'a str) -> Res<'a, O>,
{
    map(opt(delimited(punct('{'), many0(item), context("closing brace", punct('}')))), Option::unwrap_or_default)
}

// ============================================================================
// Type definitions
// ============================================================================

fn implements(input: &str) -> Res<'_, Vec<String>> {
    map(
        opt(preceded(
            pair(keyword("implements"), opt(punct('&'))),
            separated_list1(punct('&'), name),
        )),
        Option::unwrap_or_default,
    )(input)
}

fn object_like<'a>(kind: TypeKind) -> impl FnMut(&'a str) -> Res<'a, TypeDefinition> {
    move |input: &'a str| {
        let (input, _) = keyword(kind.keyword())(input)?;
        let (input, type_name) = name(input)?;
        let (input, interfaces) = implements(input)?;
        let (input, directives) = directives(input)?;
        let (input, fields) = braced(field_definition)(input)?;
        let mut def = TypeDefinition::new(kind, &type_name);
        def.interfaces = interfaces;
        def.directives = directives;
        def.fields = fields;
        Ok((input, def))
    }
}

fn input_object(input: &str) -> Res<'_, TypeDefinition> {
    let (input, _) = keyword("input")(input)?;
    let (input, type_name) = name(input)?;
    let (input, directives) = directives(input)?;
    let (input, input_fields) = braced(input_value)(input)?;
    let mut def = TypeDefinition::new(TypeKind::InputObject, &type_name);
    def.directives = directives;
    def.input_fields = input_fields;
    Ok((input, def))
}

fn enum_type(input: &str) -> Res<'_, TypeDefinition> {
    let (input, _) = keyword("enum")(input)?;
    let (input, type_name) = name(input)?;
    let (input, directives) = directives(input)?;
    let (input, enum_values) = braced(enum_value)(input)?;
    let mut def = TypeDefinition::new(TypeKind::Enum, &type_name);
    def.directives = directives;
    def.enum_values = enum_values;
    Ok((input, def))
}

fn union_type(input: &str) -> Res<'_, TypeDefinition> {
    let (input, _) = keyword("union")(input)?;
    let (input, type_name) = name(input)?;
    let (input, directives) = directives(input)?;
    let (input, members) = opt(preceded(
        pair(punct('='), opt(punct('|'))),
        separated_list1(punct('|'), name),
    ))(input)?;
    let mut def = TypeDefinition::new(TypeKind::Union, &type_name);
    def.directives = directives;
    def.members = members.unwrap_or_default();
    Ok((input, def))
}

fn scalar_type(input: &str) -> Res<'_, TypeDefinition> {
    let (input, _) = keyword("scalar")(input)?;
    let (input, type_name) = name(input)?;
    let (input, directives) = directives(input)?;
    let mut def = TypeDefinition::new(TypeKind::Scalar, &type_name);
    def.directives = directives;
    Ok((input, def))
}

fn type_body(input: &str) -> Res<'_, TypeDefinition> {
    alt((
        object_like(TypeKind::Object),
        object_like(TypeKind::Interface),
        input_object,
        enum_type,
        union_type,
        scalar_type,
    ))(input)
}

fn schema_definition(input: &str) -> Res<'_, SchemaDefinition> {
    let (input, description) = description(input)?;
    let (input, _) = keyword("schema")(input)?;
    let (input, directives) = directives(input)?;
    let (input, operations) = delimited(
        punct('{'),
        many0(separated_pair(name, punct(':'), name)),
        context("closing brace", punct('}')),
    )(input)?;
    Ok((
        input,
        SchemaDefinition {
            description,
            directives,
            operations,
        },
    ))
}

fn directive_definition(input: &str) -> Res<'_, DirectiveDefinition> {
    let (input, description) = description(input)?;
    let (input, _) = keyword("directive")(input)?;
    let (input, _) = punct('@')(input)?;
    let (input, directive_name) = name(input)?;
    let (input, arguments) = argument_definitions(input)?;
    let (input, repeatable) = opt(keyword("repeatable"))(input)?;
    let (input, _) = context("directive locations", keyword("on"))(input)?;
    let (input, _) = opt(punct('|'))(input)?;
    let (input, locations) = separated_list1(punct('|'), name)(input)?;
    Ok((
        input,
        DirectiveDefinition {
            description,
            name: directive_name,
            arguments,
            repeatable: repeatable.is_some(),
            locations,
        },
    ))
}

fn type_definition(input: &str) -> Res<'_, TypeDefinition> {
    let (input, description) = description(input)?;
    let (input, mut def) = type_body(input)?;
    def.description = description;
    Ok((input, def))
}

fn definition(input: &str) -> Res<'_, Definition> {
    alt((
        map(preceded(keyword("extend"), type_body), Definition::Extension),
        map(schema_definition, Definition::Schema),
        map(directive_definition, Definition::Directive),
        map(type_definition, Definition::Type),
    ))(input)
}

fn document(input: &str) -> Res<'_, Document> {
    let (input, definitions) = many0(definition)(input)?;
    let (input, _) = ignored(input)?;
    Ok((input, Document { definitions }))
}
