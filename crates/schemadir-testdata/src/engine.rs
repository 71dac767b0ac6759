//! A small executor for selection-set queries.
//!
//! Supports a single operation per document: an anonymous `{ ... }` block or a
//! named `query Name($var: Type!) { ... }`, with aliases, arguments, variables,
//! nested selections and `__typename`. Fragments and directives are not
//! understood and report as syntax errors.

use anyhow::bail;
use schemadir_core::{EngineError, ErrorType, ExecutionResult, SourceLocation};
use serde_json::{Map, Value};

/// Field every object type answers with its concrete type name.
pub const TYPENAME_FIELD: &str = "__typename";

/// Whether a field yields a leaf value or an object with its own selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Leaf,
    /// An object, or a list of objects, of the named type.
    Object(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub arguments: &'static [ArgSpec],
}

/// Types and resolvers of a schema, as seen by [`execute`].
///
/// Objects are plain JSON values; resolvers read from the parent value.
pub trait SchemaModel {
    fn query_type(&self) -> &'static str;

    /// Field definition, or `None` if the type has no such field.
    fn field(&self, type_name: &str, field: &str) -> Option<FieldSpec>;

    fn resolve(
        &self,
        type_name: &str,
        source: &Value,
        field: &str,
        arguments: &Map<String, Value>,
    ) -> Value;

    /// Concrete type of `value` when it is reached through `type_name`.
    fn concrete_type(&self, type_name: &str, _value: &Value) -> String {
        type_name.to_string()
    }
}

/// Parse, validate and run `query` against `model`.
///
/// Syntax and validation problems come back as result errors. A non-null
/// variable with no value is an engine failure.
pub fn execute(
    model: &dyn SchemaModel,
    query: &str,
    variables: Option<&Value>,
) -> anyhow::Result<ExecutionResult> {
    let operation = match Parser::new(query).and_then(|mut parser| parser.document()) {
        Ok(operation) => operation,
        Err(e) => return Ok(ExecutionResult::with_errors(vec![e.into_engine_error()])),
    };

    if operation.kind == OperationKind::Mutation {
        return Ok(ExecutionResult::with_errors(vec![EngineError::new(
            ErrorType::ValidationError,
            "Schema is not configured for mutations.",
            vec![operation.location],
        )]));
    }

    let mut errors = Vec::new();
    validate(
        model,
        model.query_type(),
        &operation.selections,
        &operation.variables,
        &mut errors,
    );
    if !errors.is_empty() {
        return Ok(ExecutionResult::with_errors(errors));
    }

    let variables = coerce_variables(&operation.variables, variables)?;
    let data = execute_selections(
        model,
        model.query_type(),
        &Value::Null,
        &operation.selections,
        &variables,
    );
    Ok(ExecutionResult::with_data(data))
}

// ---------------------------------------------------------------------------
// Lexing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Name(String),
    Str(String),
    Int(i64),
    Punct(char),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    location: SourceLocation,
}

impl Token {
    fn text(&self) -> String {
        match &self.kind {
            TokenKind::Name(name) => name.clone(),
            TokenKind::Str(value) => format!("\"{}\"", value),
            TokenKind::Int(value) => value.to_string(),
            TokenKind::Punct(c) => c.to_string(),
            TokenKind::Eof => "<EOF>".to_string(),
        }
    }
}

#[derive(Debug)]
struct SyntaxError {
    location: SourceLocation,
    message: String,
}

impl SyntaxError {
    fn offending(text: &str, location: SourceLocation) -> Self {
        Self {
            location,
            message: format!(
                "Invalid Syntax : offending token '{}' at line {} column {}",
                text, location.line, location.column
            ),
        }
    }

    fn at(token: &Token) -> Self {
        Self::offending(&token.text(), token.location)
    }

    fn into_engine_error(self) -> EngineError {
        EngineError::new(ErrorType::InvalidSyntax, self.message, vec![self.location])
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1u32;
    let mut column = 1u32;

    while let Some(&c) = chars.peek() {
        let location = SourceLocation::new(line, column);
        match c {
            '\n' => {
                chars.next();
                line += 1;
                column = 1;
            }
            c if c.is_whitespace() || c == ',' => {
                chars.next();
                column += 1;
            }
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                    column += 1;
                }
            }
            '{' | '}' | '(' | ')' | ':' | '!' | '$' | '[' | ']' | '=' => {
                chars.next();
                column += 1;
                tokens.push(Token {
                    kind: TokenKind::Punct(c),
                    location,
                });
            }
            '"' => {
                chars.next();
                column += 1;
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => {
                            column += 1;
                            break;
                        }
                        Some('\\') => {
                            column += 1;
                            match chars.next() {
                                Some('n') => value.push('\n'),
                                Some('t') => value.push('\t'),
                                Some(escaped) if escaped != '\n' => value.push(escaped),
                                _ => return Err(SyntaxError::offending("\"", location)),
                            }
                            column += 1;
                        }
                        Some('\n') | None => return Err(SyntaxError::offending("\"", location)),
                        Some(other) => {
                            value.push(other);
                            column += 1;
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(value),
                    location,
                });
            }
            c if c == '-' || c.is_ascii_digit() => {
                let mut text = String::from(c);
                chars.next();
                column += 1;
                while let Some(&digit) = chars.peek() {
                    if !digit.is_ascii_digit() {
                        break;
                    }
                    text.push(digit);
                    chars.next();
                    column += 1;
                }
                let value = text
                    .parse::<i64>()
                    .map_err(|_| SyntaxError::offending(&text, location))?;
                tokens.push(Token {
                    kind: TokenKind::Int(value),
                    location,
                });
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next != '_' && !next.is_ascii_alphanumeric() {
                        break;
                    }
                    name.push(next);
                    chars.next();
                    column += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Name(name),
                    location,
                });
            }
            other => return Err(SyntaxError::offending(&other.to_string(), location)),
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        location: SourceLocation::new(line, column),
    });
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Query,
    Mutation,
}

#[derive(Debug)]
struct Operation {
    kind: OperationKind,
    location: SourceLocation,
    variables: Vec<VariableDefinition>,
    selections: Vec<Field>,
}

#[derive(Debug)]
struct VariableDefinition {
    name: String,
    type_name: String,
    non_null: bool,
    default: Option<InputValue>,
}

#[derive(Debug)]
struct Field {
    alias: Option<String>,
    name: String,
    arguments: Vec<(String, InputValue)>,
    selections: Option<Vec<Field>>,
    location: SourceLocation,
}

impl Field {
    fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug)]
enum InputValue {
    Variable(String),
    Literal(Value),
    List(Vec<InputValue>),
}

impl InputValue {
    fn resolve(&self, variables: &Map<String, Value>) -> Value {
        match self {
            InputValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
            InputValue::Literal(value) => value.clone(),
            InputValue::List(items) => {
                Value::Array(items.iter().map(|item| item.resolve(variables)).collect())
            }
        }
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            InputValue::Variable(name) => names.push(name),
            InputValue::Literal(_) => {}
            InputValue::List(items) => {
                for item in items {
                    item.collect_variables(names);
                }
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    eof: Token,
}

impl Parser {
    fn new(source: &str) -> Result<Self, SyntaxError> {
        let tokens = tokenize(source)?;
        let eof = tokens.last().cloned().unwrap_or(Token {
            kind: TokenKind::Eof,
            location: SourceLocation::new(1, 1),
        });
        Ok(Self {
            tokens,
            position: 0,
            eof,
        })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn is_punct(&self, punct: char) -> bool {
        self.peek().kind == TokenKind::Punct(punct)
    }

    fn expect_punct(&mut self, punct: char) -> Result<Token, SyntaxError> {
        let token = self.advance();
        if token.kind == TokenKind::Punct(punct) {
            Ok(token)
        } else {
            Err(SyntaxError::at(&token))
        }
    }

    fn expect_name(&mut self) -> Result<(String, SourceLocation), SyntaxError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Name(name) => Ok((name.clone(), token.location)),
            _ => Err(SyntaxError::at(&token)),
        }
    }

    fn document(&mut self) -> Result<Operation, SyntaxError> {
        let operation = self.operation()?;
        let trailing = self.advance();
        if trailing.kind != TokenKind::Eof {
            return Err(SyntaxError::at(&trailing));
        }
        Ok(operation)
    }

    fn operation(&mut self) -> Result<Operation, SyntaxError> {
        let location = self.peek().location;
        if self.is_punct('{') {
            return Ok(Operation {
                kind: OperationKind::Query,
                location,
                variables: Vec::new(),
                selections: self.selection_set()?,
            });
        }

        let token = self.advance();
        let kind = match &token.kind {
            TokenKind::Name(keyword) if keyword == "query" => OperationKind::Query,
            TokenKind::Name(keyword) if keyword == "mutation" => OperationKind::Mutation,
            _ => return Err(SyntaxError::at(&token)),
        };
        if matches!(self.peek().kind, TokenKind::Name(_)) {
            self.advance();
        }
        let variables = if self.is_punct('(') {
            self.variable_definitions()?
        } else {
            Vec::new()
        };
        Ok(Operation {
            kind,
            location,
            variables,
            selections: self.selection_set()?,
        })
    }

    fn variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, SyntaxError> {
        self.expect_punct('(')?;
        let mut definitions = Vec::new();
        loop {
            self.expect_punct('$')?;
            let (name, _) = self.expect_name()?;
            self.expect_punct(':')?;
            let (type_name, non_null) = self.type_reference()?;
            let default = if self.is_punct('=') {
                self.advance();
                Some(self.value(true)?)
            } else {
                None
            };
            definitions.push(VariableDefinition {
                name,
                type_name,
                non_null,
                default,
            });
            if self.is_punct(')') {
                self.advance();
                return Ok(definitions);
            }
        }
    }

    fn type_reference(&mut self) -> Result<(String, bool), SyntaxError> {
        let mut rendered = if self.is_punct('[') {
            self.advance();
            let (inner, _) = self.type_reference()?;
            self.expect_punct(']')?;
            format!("[{}]", inner)
        } else {
            self.expect_name()?.0
        };
        let non_null = self.is_punct('!');
        if non_null {
            self.advance();
            rendered.push('!');
        }
        Ok((rendered, non_null))
    }

    fn selection_set(&mut self) -> Result<Vec<Field>, SyntaxError> {
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        loop {
            fields.push(self.field()?);
            if self.is_punct('}') {
                self.advance();
                return Ok(fields);
            }
        }
    }

    fn field(&mut self) -> Result<Field, SyntaxError> {
        let (first, location) = self.expect_name()?;
        let (alias, name) = if self.is_punct(':') {
            self.advance();
            (Some(first), self.expect_name()?.0)
        } else {
            (None, first)
        };
        let arguments = if self.is_punct('(') {
            self.arguments()?
        } else {
            Vec::new()
        };
        let selections = if self.is_punct('{') {
            Some(self.selection_set()?)
        } else {
            None
        };
        Ok(Field {
            alias,
            name,
            arguments,
            selections,
            location,
        })
    }

    fn arguments(&mut self) -> Result<Vec<(String, InputValue)>, SyntaxError> {
        self.expect_punct('(')?;
        let mut arguments = Vec::new();
        loop {
            let (name, _) = self.expect_name()?;
            self.expect_punct(':')?;
            arguments.push((name, self.value(false)?));
            if self.is_punct(')') {
                self.advance();
                return Ok(arguments);
            }
        }
    }

    fn value(&mut self, constant: bool) -> Result<InputValue, SyntaxError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Punct('$') if !constant => {
                let (name, _) = self.expect_name()?;
                Ok(InputValue::Variable(name))
            }
            TokenKind::Punct('[') => {
                let mut items = Vec::new();
                while !self.is_punct(']') {
                    items.push(self.value(constant)?);
                }
                self.advance();
                Ok(InputValue::List(items))
            }
            TokenKind::Str(value) => Ok(InputValue::Literal(Value::String(value.clone()))),
            TokenKind::Int(value) => Ok(InputValue::Literal(Value::from(*value))),
            TokenKind::Name(name) => Ok(InputValue::Literal(match name.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => Value::String(name.clone()),
            })),
            _ => Err(SyntaxError::at(&token)),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation and execution
// ---------------------------------------------------------------------------

fn validation_error(message: String, location: SourceLocation) -> EngineError {
    EngineError::new(ErrorType::ValidationError, message, vec![location])
}

fn validate(
    model: &dyn SchemaModel,
    type_name: &str,
    fields: &[Field],
    defined: &[VariableDefinition],
    errors: &mut Vec<EngineError>,
) {
    for field in fields {
        if field.name == TYPENAME_FIELD {
            if field.selections.is_some() {
                errors.push(validation_error(
                    format!(
                        "Validation error of type SubSelectionNotAllowed: Sub selection not allowed on leaf type of field {}",
                        field.name
                    ),
                    field.location,
                ));
            }
            continue;
        }

        let Some(spec) = model.field(type_name, &field.name) else {
            errors.push(validation_error(
                format!(
                    "Validation error of type FieldUndefined: Field '{}' in type '{}' is undefined",
                    field.name, type_name
                ),
                field.location,
            ));
            continue;
        };

        for (name, value) in &field.arguments {
            if !spec.arguments.iter().any(|argument| argument.name == name) {
                errors.push(validation_error(
                    format!(
                        "Validation error of type UnknownArgument: Unknown field argument {}",
                        name
                    ),
                    field.location,
                ));
            }
            let mut referenced = Vec::new();
            value.collect_variables(&mut referenced);
            for variable in referenced {
                if !defined.iter().any(|definition| definition.name == variable) {
                    errors.push(validation_error(
                        format!(
                            "Validation error of type UndefinedVariable: Undefined variable {}",
                            variable
                        ),
                        field.location,
                    ));
                }
            }
        }

        for argument in spec.arguments.iter().filter(|argument| argument.required) {
            if !field.arguments.iter().any(|(name, _)| name == argument.name) {
                errors.push(validation_error(
                    format!(
                        "Validation error of type MissingFieldArgument: Missing field argument {}",
                        argument.name
                    ),
                    field.location,
                ));
            }
        }

        match (spec.kind, &field.selections) {
            (FieldKind::Object(child), Some(selections)) => {
                validate(model, child, selections, defined, errors)
            }
            (FieldKind::Object(child), None) => errors.push(validation_error(
                format!(
                    "Validation error of type SubSelectionRequired: Sub selection required for type {} of field {}",
                    child, field.name
                ),
                field.location,
            )),
            (FieldKind::Leaf, Some(_)) => errors.push(validation_error(
                format!(
                    "Validation error of type SubSelectionNotAllowed: Sub selection not allowed on leaf type of field {}",
                    field.name
                ),
                field.location,
            )),
            (FieldKind::Leaf, None) => {}
        }
    }
}

fn coerce_variables(
    definitions: &[VariableDefinition],
    provided: Option<&Value>,
) -> anyhow::Result<Map<String, Value>> {
    let provided = provided.and_then(Value::as_object);
    let mut values = Map::new();
    for definition in definitions {
        let value = provided
            .and_then(|provided| provided.get(&definition.name))
            .filter(|value| !value.is_null())
            .cloned()
            .or_else(|| {
                definition
                    .default
                    .as_ref()
                    .map(|default| default.resolve(&Map::new()))
            });
        match value {
            Some(value) => {
                values.insert(definition.name.clone(), value);
            }
            None if definition.non_null => bail!(
                "Variable '{}' has coerced Null value for NonNull type '{}'",
                definition.name,
                definition.type_name
            ),
            None => {}
        }
    }
    Ok(values)
}

fn execute_selections(
    model: &dyn SchemaModel,
    type_name: &str,
    source: &Value,
    fields: &[Field],
    variables: &Map<String, Value>,
) -> Map<String, Value> {
    let mut data = Map::new();
    for field in fields {
        let value = if field.name == TYPENAME_FIELD {
            Value::String(model.concrete_type(type_name, source))
        } else {
            let arguments: Map<String, Value> = field
                .arguments
                .iter()
                .map(|(name, value)| (name.clone(), value.resolve(variables)))
                .collect();
            let resolved = model.resolve(type_name, source, &field.name, &arguments);
            match (
                model.field(type_name, &field.name).map(|spec| spec.kind),
                &field.selections,
            ) {
                (Some(FieldKind::Object(child)), Some(selections)) => {
                    complete(model, child, &resolved, selections, variables)
                }
                _ => resolved,
            }
        };
        data.insert(field.response_key().to_string(), value);
    }
    data
}

fn complete(
    model: &dyn SchemaModel,
    type_name: &str,
    value: &Value,
    selections: &[Field],
    variables: &Map<String, Value>,
) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| complete(model, type_name, item, selections, variables))
                .collect(),
        ),
        object => Value::Object(execute_selections(
            model, type_name, object, selections, variables,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Greetings;

    const NAME_ARGUMENT: &[ArgSpec] = &[ArgSpec {
        name: "name",
        required: true,
    }];

    impl SchemaModel for Greetings {
        fn query_type(&self) -> &'static str {
            "GreetingQueries"
        }

        fn field(&self, type_name: &str, field: &str) -> Option<FieldSpec> {
            match (type_name, field) {
                ("GreetingQueries", "hello") => Some(FieldSpec {
                    kind: FieldKind::Leaf,
                    arguments: NAME_ARGUMENT,
                }),
                _ => None,
            }
        }

        fn resolve(
            &self,
            _type_name: &str,
            _source: &Value,
            _field: &str,
            arguments: &Map<String, Value>,
        ) -> Value {
            let name = arguments.get("name").and_then(Value::as_str).unwrap_or("?");
            Value::String(format!("Hello, {}", name))
        }
    }

    #[test]
    fn test_tokenize_tracks_lines_and_columns() {
        let tokens = tokenize("{\n  hello\n}").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Name("hello".into()));
        assert_eq!(tokens[1].location, SourceLocation::new(2, 3));
        assert_eq!(tokens[2].location, SourceLocation::new(3, 1));
    }

    #[test]
    fn test_literal_arguments_and_aliases() {
        let query = r#"{ a: hello(name: "Ann") b: hello(name: "Bo") }"#;
        let result = execute(&Greetings, query, None).unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(
            Value::Object(result.data.unwrap()),
            json!({"a": "Hello, Ann", "b": "Hello, Bo"})
        );
    }

    #[test]
    fn test_variables() {
        let result = execute(
            &Greetings,
            "query Greet($who: String!) { hello(name: $who) }",
            Some(&json!({"who": "Cy"})),
        )
        .unwrap();
        assert_eq!(
            Value::Object(result.data.unwrap()),
            json!({"hello": "Hello, Cy"})
        );
    }

    #[test]
    fn test_default_variable_value() {
        let result = execute(
            &Greetings,
            "query Greet($who: String! = \"Di\") { hello(name: $who) }",
            None,
        )
        .unwrap();
        assert_eq!(
            Value::Object(result.data.unwrap()),
            json!({"hello": "Hello, Di"})
        );
    }

    #[test]
    fn test_missing_required_variable_fails() {
        let err = execute(
            &Greetings,
            "query Greet($who: String!) { hello(name: $who) }",
            Some(&json!({"some": "other variable"})),
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Variable 'who' has coerced Null value for NonNull type 'String!'"));
    }

    #[test]
    fn test_syntax_error_location() {
        let result = execute(&Greetings, "{ hello(name: \"x\") ", None).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error_type, ErrorType::InvalidSyntax);
        assert_eq!(result.errors[0].locations, vec![SourceLocation::new(1, 20)]);
    }

    #[test]
    fn test_unknown_keyword_is_syntax_error() {
        let result = execute(&Greetings, "ery Greet { hello(name: \"x\") }", None).unwrap();
        assert_eq!(result.errors[0].error_type, ErrorType::InvalidSyntax);
        assert_eq!(
            result.errors[0].message,
            "Invalid Syntax : offending token 'ery' at line 1 column 1"
        );
    }

    #[test]
    fn test_validation_errors() {
        let result = execute(&Greetings, "{ hello goodbye }", None).unwrap();
        let messages: Vec<&str> = result.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Validation error of type MissingFieldArgument: Missing field argument name",
                "Validation error of type FieldUndefined: Field 'goodbye' in type 'GreetingQueries' is undefined",
            ]
        );
        assert!(result
            .errors
            .iter()
            .all(|e| e.error_type == ErrorType::ValidationError));
    }

    #[test]
    fn test_undefined_variable() {
        let result = execute(&Greetings, "{ hello(name: $who) }", None).unwrap();
        assert_eq!(
            result.errors[0].message,
            "Validation error of type UndefinedVariable: Undefined variable who"
        );
    }

    #[test]
    fn test_mutations_are_rejected() {
        let result = execute(&Greetings, "mutation { hello(name: \"x\") }", None).unwrap();
        assert_eq!(result.errors[0].error_type, ErrorType::ValidationError);
        assert_eq!(result.errors[0].message, "Schema is not configured for mutations.");
    }

    #[test]
    fn test_typename_on_root() {
        let result = execute(&Greetings, "{ __typename }", None).unwrap();
        assert_eq!(
            Value::Object(result.data.unwrap()),
            json!({"__typename": "GreetingQueries"})
        );
    }
}
