use crate::error::CacheError;
use crate::graph::{
    FieldArguments, NodeId, MUTATION_ROOT_ID, QUERY_ROOT_ID, SUBSCRIPTION_ROOT_ID,
};
use crate::JsonObject;
use apollo_compiler::ast;
use apollo_compiler::ast::{Name, OperationType};
use apollo_compiler::executable::{Field, Fragment, Operation, Selection};
use apollo_compiler::{ExecutableDocument, Node};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde_json_bytes::{ByteString, Value as JsonValue};
use std::ops::Deref;

// Selection trees are stored in maps keyed by response key so that repeated
// selections of the same field merge as they are collected.

/// A selection tree with fragments expanded and all field arguments bound.
///
/// This is the only query shape the write path understands: parsing and
/// validation happen upstream, and [`ResolvedOperation::from_document`] is
/// the supported way to lower an executable document into this form.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOperation {
    /// The node the operation's root selection set applies to.
    pub root_id: NodeId,
    pub selection_set: ResolvedSelectionSet,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedSelectionSet {
    /// Selections keyed by response key (alias if present, else field name).
    pub selections: IndexMap<String, ResolvedField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedField {
    /// Schema field name. Payload objects are keyed by response key instead.
    pub name: String,
    /// Bound arguments, or `None` for a static field. A field that carries
    /// arguments is materialized as its own parameterized value node.
    pub arguments: Option<FieldArguments>,
    /// Empty for leaf fields.
    pub selection_set: ResolvedSelectionSet,
}

impl ResolvedSelectionSet {
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Whether any selection in this set selects the schema field `name`.
    pub fn selects_field(&self, name: &str) -> bool {
        self.selections.values().any(|field| field.name == name)
    }

    fn insert(&mut self, response_key: String, field: ResolvedField) -> Result<(), CacheError> {
        match self.selections.entry(response_key) {
            Entry::Occupied(mut entry) => {
                if entry.get().name != field.name || entry.get().arguments != field.arguments {
                    return Err(CacheError::InvalidSelection {
                        message: format!(
                            "response key \"{}\" is selected twice with conflicting fields",
                            entry.key()
                        ),
                    });
                }
                entry
                    .get_mut()
                    .selection_set
                    .merge_from(field.selection_set)?;
            }
            Entry::Vacant(entry) => {
                entry.insert(field);
            }
        }
        Ok(())
    }

    fn merge_from(&mut self, other: ResolvedSelectionSet) -> Result<(), CacheError> {
        for (response_key, field) in other.selections {
            self.insert(response_key, field)?;
        }
        Ok(())
    }
}

impl ResolvedOperation {
    /// Lowers one operation of `document` into the resolved form: named and
    /// inline fragments are expanded, duplicate selections merged, and every
    /// argument bound against `variables` and the declared defaults.
    pub fn from_document(
        document: &ExecutableDocument,
        operation_name: Option<&str>,
        variables: &JsonObject,
    ) -> Result<Self, CacheError> {
        let operation = document.get_operation(operation_name).map_err(|_| {
            CacheError::InvalidSelection {
                message: match operation_name {
                    Some(name) => format!("document has no operation named \"{name}\""),
                    None => "document has no single anonymous operation".to_owned(),
                },
            }
        })?;
        let environment = variable_environment(operation, variables)?;
        let mut selection_set = ResolvedSelectionSet::default();
        collect_selections(
            &operation.selection_set.selections,
            &document.fragments,
            &environment,
            &mut selection_set,
        )?;
        Ok(ResolvedOperation {
            root_id: root_id_for(operation.operation_type),
            selection_set,
        })
    }
}

fn root_id_for(operation_type: OperationType) -> NodeId {
    match operation_type {
        OperationType::Query => QUERY_ROOT_ID.clone(),
        OperationType::Mutation => MUTATION_ROOT_ID.clone(),
        OperationType::Subscription => SUBSCRIPTION_ROOT_ID.clone(),
    }
}

/// Effective variable values for one operation: provided values win, then
/// declared defaults. A variable with neither is only an error if an
/// argument actually references it.
fn variable_environment(
    operation: &Operation,
    variables: &JsonObject,
) -> Result<IndexMap<String, JsonValue>, CacheError> {
    let empty = IndexMap::new();
    let mut environment = IndexMap::new();
    for variable in &operation.variables {
        let name = variable.name.as_str();
        if let Some(value) = variables.get(name) {
            environment.insert(name.to_owned(), value.clone());
        } else if let Some(default) = &variable.default_value {
            // Defaults are const values and cannot reference other variables.
            environment.insert(name.to_owned(), json_from_ast_value(default, &empty)?);
        }
    }
    Ok(environment)
}

fn collect_selections(
    selections: &[Selection],
    fragments: &IndexMap<Name, Node<Fragment>>,
    environment: &IndexMap<String, JsonValue>,
    out: &mut ResolvedSelectionSet,
) -> Result<(), CacheError> {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                let response_key = field
                    .alias
                    .as_ref()
                    .unwrap_or(&field.name)
                    .as_str()
                    .to_owned();
                let mut child = ResolvedSelectionSet::default();
                collect_selections(
                    &field.selection_set.selections,
                    fragments,
                    environment,
                    &mut child,
                )?;
                out.insert(
                    response_key,
                    ResolvedField {
                        name: field.name.as_str().to_owned(),
                        arguments: resolve_field_arguments(field, environment)?,
                        selection_set: child,
                    },
                )?;
            }
            Selection::FragmentSpread(spread) => {
                let Some(fragment) = fragments.get(&spread.fragment_name) else {
                    return Err(CacheError::InvalidSelection {
                        message: format!(
                            "operation references undefined fragment \"{}\"",
                            spread.fragment_name
                        ),
                    });
                };
                collect_selections(
                    &fragment.selection_set.selections,
                    fragments,
                    environment,
                    out,
                )?;
            }
            Selection::InlineFragment(inline) => {
                collect_selections(
                    &inline.selection_set.selections,
                    fragments,
                    environment,
                    out,
                )?;
            }
        }
    }
    Ok(())
}

/// Binds a field's arguments. Every argument the field definition declares
/// appears in the result: the supplied value when the operation passes one,
/// else the declared default, else an explicit `null`. Arguments the
/// definition does not know about (schema-less documents) are kept as
/// supplied.
fn resolve_field_arguments(
    field: &Node<Field>,
    environment: &IndexMap<String, JsonValue>,
) -> Result<Option<FieldArguments>, CacheError> {
    if field.arguments.is_empty() {
        return Ok(None);
    }
    let mut arguments = FieldArguments::new();
    for declaration in &field.definition.arguments {
        let supplied = field
            .arguments
            .iter()
            .find(|argument| argument.name == declaration.name);
        let value = match supplied {
            Some(argument) => json_from_ast_value(argument.value.deref(), environment)?,
            None => match &declaration.default_value {
                Some(default) => json_from_ast_value(default, environment)?,
                None => JsonValue::Null,
            },
        };
        arguments.insert(declaration.name.as_str().to_owned(), value);
    }
    for argument in &field.arguments {
        if !arguments.contains_key(argument.name.as_str()) {
            arguments.insert(
                argument.name.as_str().to_owned(),
                json_from_ast_value(argument.value.deref(), environment)?,
            );
        }
    }
    Ok(Some(arguments))
}

fn json_from_ast_value(
    value: &ast::Value,
    environment: &IndexMap<String, JsonValue>,
) -> Result<JsonValue, CacheError> {
    Ok(match value {
        ast::Value::Null => JsonValue::Null,
        ast::Value::Boolean(b) => JsonValue::Bool(*b),
        ast::Value::Enum(name) => JsonValue::String(ByteString::from(name.as_str())),
        ast::Value::String(s) => JsonValue::String(ByteString::from(s.as_str())),
        ast::Value::Int(i) => {
            let parsed: i64 = i.as_str().parse().map_err(|_| CacheError::InvalidSelection {
                message: format!("int argument \"{}\" does not fit an i64", i.as_str()),
            })?;
            JsonValue::Number(parsed.into())
        }
        ast::Value::Float(f) => {
            let parsed: f64 = f.as_str().parse().map_err(|_| CacheError::InvalidSelection {
                message: format!("float argument \"{}\" is not a valid f64", f.as_str()),
            })?;
            JsonValue::Number(serde_json::Number::from_f64(parsed).ok_or_else(|| {
                CacheError::InvalidSelection {
                    message: format!("float argument \"{}\" is not finite", f.as_str()),
                }
            })?)
        }
        ast::Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| json_from_ast_value(item.deref(), environment))
                .collect::<Result<_, _>>()?,
        ),
        ast::Value::Object(fields) => {
            let mut object = JsonObject::new();
            for (name, item) in fields {
                object.insert(
                    ByteString::from(name.as_str()),
                    json_from_ast_value(item.deref(), environment)?,
                );
            }
            JsonValue::Object(object)
        }
        ast::Value::Variable(name) => match environment.get(name.as_str()) {
            Some(value) => value.clone(),
            None => {
                return Err(CacheError::UnresolvedVariable {
                    name: name.as_str().to_owned(),
                })
            }
        },
    })
}
