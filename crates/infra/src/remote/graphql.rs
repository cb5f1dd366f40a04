//! GraphQL document construction and response demultiplexing.
//!
//! Every sub-operation is aliased with its positional alias so one response
//! carries one entry per record.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use stagesync_domain::constants::ITEM_NAME_FIELD;
use stagesync_domain::{
    format_number, AliasedOperation, FieldValue, MutationError, MutationRequest, MutationResult,
    Operation, Payload,
};

use super::classify::classify_graphql;

/// A serialized request body.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlRequest {
    pub query: String,
    pub variables: Map<String, Value>,
}

impl GraphqlRequest {
    pub fn to_body(&self) -> Value {
        json!({ "query": self.query, "variables": self.variables })
    }
}

/// Build one mutation document covering every operation of `request`.
/// `board_id` is the board addressed by `UPDATE_ITEM` operations.
pub fn build_request(request: &MutationRequest, board_id: &str) -> GraphqlRequest {
    let mut declarations = Vec::new();
    let mut selections = Vec::new();
    let mut variables = Map::new();

    for op in &request.operations {
        let alias = &op.alias;
        let target = format!("{alias}_target");
        let name = format!("{alias}_name");
        let values = format!("{alias}_values");

        declarations.push(format!("${target}: ID!"));
        declarations.push(format!("${values}: JSON"));
        variables.insert(target.clone(), Value::String(op.target_id.clone()));
        variables.insert(values.clone(), Value::String(column_values(op)));

        let selection = match op.operation {
            Operation::CreateItem => {
                declarations.push(format!("${name}: String"));
                variables.insert(name.clone(), item_name(&op.payload));
                format!(
                    "{alias}: create_item(board_id: ${target}, item_name: ${name}, column_values: ${values}) {{ id }}"
                )
            }
            Operation::CreateSubitem => {
                declarations.push(format!("${name}: String"));
                variables.insert(name.clone(), item_name(&op.payload));
                format!(
                    "{alias}: create_subitem(parent_item_id: ${target}, item_name: ${name}, column_values: ${values}) {{ id }}"
                )
            }
            Operation::UpdateItem => {
                let board = format!("{alias}_board");
                declarations.push(format!("${board}: ID!"));
                variables.insert(board.clone(), Value::String(board_id.to_string()));
                format!(
                    "{alias}: change_multiple_column_values(board_id: ${board}, item_id: ${target}, column_values: ${values}) {{ id }}"
                )
            }
        };
        selections.push(selection);
    }

    let query = format!(
        "mutation StageSync({}) {{\n  {}\n}}",
        declarations.join(", "),
        selections.join("\n  ")
    );
    GraphqlRequest { query, variables }
}

fn item_name(payload: &Payload) -> Value {
    payload
        .get(ITEM_NAME_FIELD)
        .map_or(Value::Null, |value| Value::String(value.as_text()))
}

/// The `column_values` JSON text. Creates carry the name separately.
pub fn column_values(op: &AliasedOperation) -> String {
    let skip_name = op.operation != Operation::UpdateItem;
    let mut columns = Map::new();
    for (field, value) in op.payload.iter() {
        if skip_name && field == ITEM_NAME_FIELD {
            continue;
        }
        columns.insert(field.to_string(), encode_value(value));
    }
    Value::Object(columns).to_string()
}

fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(text) => Value::String(text.clone()),
        FieldValue::Number(number) => Value::String(format_number(*number)),
        FieldValue::Date(date) => json!({ "date": date.format("%Y-%m-%d").to_string() }),
        FieldValue::Label(label) => json!({ "label": label }),
    }
}

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub path: Vec<Value>,
    #[serde(default)]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphqlError {
    fn alias(&self) -> Option<&str> {
        self.path.first().and_then(Value::as_str)
    }

    fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }

    fn classify(&self) -> MutationError {
        classify_graphql(self.code(), &self.message)
    }
}

/// Split a parsed response into per-alias outcomes.
///
/// Errors without a path and no data fail the whole request. An alias with
/// neither data nor an error is left out; the caller treats it as a transient
/// failure.
pub fn demultiplex(
    request: &MutationRequest,
    response: GraphqlResponse,
) -> Result<MutationResult, MutationError> {
    let data = response.data.unwrap_or_default();
    let has_data = data.values().any(|value| !value.is_null());
    let general = response.errors.iter().find(|err| err.alias().is_none());

    if let Some(err) = general {
        if !has_data {
            return Err(err.classify());
        }
    }

    let mut result = MutationResult::new();
    for op in &request.operations {
        let alias = op.alias.as_str();
        if let Some(err) = response.errors.iter().find(|err| err.alias() == Some(alias)) {
            result.fail(alias, err.classify());
        } else if let Some(id) = data.get(alias).and_then(|entry| entry.get("id")).and_then(id_text) {
            result.succeed(alias, id);
        } else if let Some(err) = general {
            result.fail(alias, err.classify());
        }
    }
    Ok(result)
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
