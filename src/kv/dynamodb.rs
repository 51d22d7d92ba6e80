//! DynamoDB implementation of the [`KvStore`] adapter.
//!
//! Renders the typed operation vocabulary into DynamoDB expression strings
//! with generated `#n`/`:v` placeholders and maps the SDK's failure modes
//! back into the typed signals: `ConditionalCheckFailedException` becomes
//! [`KvError::ConditionFailed`], `TransactionCanceledException` becomes
//! [`KvError::TransactionCancelled`] with reasons in submission order.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{self as ddb, AttributeValue, ReturnValuesOnConditionCheckFailure};
use aws_sdk_dynamodb::Client;

use super::{
    Assignment, CancellationCode, CancellationReason, Condition, ConditionCheck, Item, Key,
    KvError, KvStore, Put, TransactItem, Update, Value, MAX_TRANSACT_ITEMS,
};

/// DynamoDB-backed store. Cheap to clone; the inner client is shared.
#[derive(Debug, Clone)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    /// Wraps a pre-built client. The target tables must already exist with a
    /// string `PK` partition key and, where used, a string `SK` sort key.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the standard AWS config chain (environment,
    /// profiles, IMDS).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl KvStore for DynamoStore {
    async fn get(
        &self,
        table: &str,
        key: &Key,
        consistent_read: bool,
    ) -> Result<Option<Item>, KvError> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(encode_key(key)))
            .consistent_read(consistent_read)
            .send()
            .await
            .map_err(|err| KvError::Backend(Box::new(err.into_service_error())))?;

        output.item.map(decode_item).transpose()
    }

    async fn put(&self, table: &str, put: Put) -> Result<(), KvError> {
        let mut expressions = Expressions::default();
        let condition = put.condition.as_ref().map(|c| expressions.condition(c));

        let result = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(encode_put_item(&put)))
            .set_condition_expression(condition)
            .set_expression_attribute_names(expressions.names())
            .set_expression_attribute_values(expressions.values())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Err(KvError::ConditionFailed)
                } else {
                    Err(KvError::Backend(Box::new(service_err)))
                }
            }
        }
    }

    async fn update(&self, table: &str, update: Update) -> Result<(), KvError> {
        let mut expressions = Expressions::default();
        let update_expression = expressions.update(&update.assignments);
        let condition = update.condition.as_ref().map(|c| expressions.condition(c));

        let result = self
            .client
            .update_item()
            .table_name(table)
            .set_key(Some(encode_key(&update.key)))
            .update_expression(update_expression)
            .set_condition_expression(condition)
            .set_expression_attribute_names(expressions.names())
            .set_expression_attribute_values(expressions.values())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Err(KvError::ConditionFailed)
                } else {
                    Err(KvError::Backend(Box::new(service_err)))
                }
            }
        }
    }

    async fn transact_write(&self, table: &str, items: Vec<TransactItem>) -> Result<(), KvError> {
        if items.len() > MAX_TRANSACT_ITEMS {
            return Err(KvError::TransactionTooLarge(items.len()));
        }

        let transact_items = items
            .iter()
            .map(|item| encode_transact_item(table, item))
            .collect::<Result<Vec<_>, _>>()?;

        let result = self
            .client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => Err(decode_transact_error(err)),
        }
    }
}

fn encode_transact_item(table: &str, item: &TransactItem) -> Result<ddb::TransactWriteItem, KvError> {
    let builder = ddb::TransactWriteItem::builder();
    let item = match item {
        TransactItem::Put(put) => {
            let mut expressions = Expressions::default();
            let condition = put.condition.as_ref().map(|c| expressions.condition(c));
            let put = ddb::Put::builder()
                .table_name(table)
                .set_item(Some(encode_put_item(put)))
                .set_condition_expression(condition)
                .set_expression_attribute_names(expressions.names())
                .set_expression_attribute_values(expressions.values())
                .return_values_on_condition_check_failure(
                    ReturnValuesOnConditionCheckFailure::AllOld,
                )
                .build()
                .map_err(|err| KvError::Backend(Box::new(err)))?;
            builder.put(put).build()
        }
        TransactItem::Update(update) => {
            let mut expressions = Expressions::default();
            let update_expression = expressions.update(&update.assignments);
            let condition = update.condition.as_ref().map(|c| expressions.condition(c));
            let update = ddb::Update::builder()
                .table_name(table)
                .set_key(Some(encode_key(&update.key)))
                .update_expression(update_expression)
                .set_condition_expression(condition)
                .set_expression_attribute_names(expressions.names())
                .set_expression_attribute_values(expressions.values())
                .return_values_on_condition_check_failure(
                    ReturnValuesOnConditionCheckFailure::AllOld,
                )
                .build()
                .map_err(|err| KvError::Backend(Box::new(err)))?;
            builder.update(update).build()
        }
        TransactItem::ConditionCheck(ConditionCheck { key, condition }) => {
            let mut expressions = Expressions::default();
            let condition = expressions.condition(condition);
            let check = ddb::ConditionCheck::builder()
                .table_name(table)
                .set_key(Some(encode_key(key)))
                .condition_expression(condition)
                .set_expression_attribute_names(expressions.names())
                .set_expression_attribute_values(expressions.values())
                .return_values_on_condition_check_failure(
                    ReturnValuesOnConditionCheckFailure::AllOld,
                )
                .build()
                .map_err(|err| KvError::Backend(Box::new(err)))?;
            builder.condition_check(check).build()
        }
    };
    Ok(item)
}

fn decode_transact_error(err: SdkError<TransactWriteItemsError>) -> KvError {
    match err.into_service_error() {
        TransactWriteItemsError::TransactionCanceledException(cancelled) => {
            let reasons = cancelled
                .cancellation_reasons()
                .iter()
                .map(decode_cancellation_reason)
                .collect::<Result<Vec<_>, _>>();
            match reasons {
                Ok(reasons) => KvError::TransactionCancelled(reasons),
                Err(err) => err,
            }
        }
        other => KvError::Backend(Box::new(other)),
    }
}

fn decode_cancellation_reason(
    reason: &ddb::CancellationReason,
) -> Result<CancellationReason, KvError> {
    let code = match reason.code() {
        None | Some("None") => CancellationCode::None,
        Some("ConditionalCheckFailed") => CancellationCode::ConditionFailed,
        Some(other) => CancellationCode::Other(other.to_owned()),
    };
    let item = reason
        .item()
        .map(|item| decode_item(item.clone()))
        .transpose()?;
    Ok(CancellationReason { code, item })
}

fn encode_key(key: &Key) -> HashMap<String, AttributeValue> {
    key.components()
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

fn encode_put_item(put: &Put) -> HashMap<String, AttributeValue> {
    let mut item = encode_key(&put.key);
    item.extend(put.item.iter().map(|(k, v)| (k.clone(), encode_value(v))));
    item
}

fn encode_value(value: &Value) -> AttributeValue {
    match value {
        Value::S(s) => AttributeValue::S(s.clone()),
        Value::N(n) => AttributeValue::N(n.to_string()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Null => AttributeValue::Null(true),
    }
}

fn decode_item(item: HashMap<String, AttributeValue>) -> Result<Item, KvError> {
    item.into_iter()
        .map(|(name, value)| Ok((name, decode_value(value)?)))
        .collect()
}

fn decode_value(value: AttributeValue) -> Result<Value, KvError> {
    match value {
        AttributeValue::S(s) => Ok(Value::S(s)),
        AttributeValue::N(n) => n
            .parse::<i64>()
            .map(Value::N)
            .map_err(|err| KvError::Backend(Box::new(err))),
        AttributeValue::Bool(b) => Ok(Value::Bool(b)),
        AttributeValue::Null(_) => Ok(Value::Null),
        other => Err(KvError::Backend(
            format!("unsupported attribute type: {other:?}").into(),
        )),
    }
}

/// Accumulates `#n`/`:v` placeholders while rendering conditions and update
/// expressions. Attribute names are deduplicated; values always get a fresh
/// placeholder.
#[derive(Default)]
struct Expressions {
    names: HashMap<String, String>,
    values: Vec<(String, AttributeValue)>,
}

impl Expressions {
    fn name(&mut self, attribute: &str) -> String {
        let next = format!("#n{}", self.names.len());
        self.names
            .entry(attribute.to_owned())
            .or_insert(next)
            .clone()
    }

    fn value(&mut self, value: &Value) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.push((placeholder.clone(), encode_value(value)));
        placeholder
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::AttributeExists(attr) => {
                format!("attribute_exists({})", self.name(attr))
            }
            Condition::AttributeNotExists(attr) => {
                format!("attribute_not_exists({})", self.name(attr))
            }
            Condition::Equals(attr, value) => {
                format!("{} = {}", self.name(attr), self.value(value))
            }
            Condition::LessThan(attr, value) => {
                format!("{} < {}", self.name(attr), self.value(value))
            }
            Condition::And(a, b) => {
                format!("({} AND {})", self.condition(a), self.condition(b))
            }
            Condition::Or(a, b) => {
                format!("({} OR {})", self.condition(a), self.condition(b))
            }
        }
    }

    fn update(&mut self, assignments: &[Assignment]) -> String {
        let mut sets: Vec<String> = vec![];
        let mut removes: Vec<String> = vec![];
        for assignment in assignments {
            match assignment {
                Assignment::Set(attr, value) => {
                    let clause = format!("{} = {}", self.name(attr), self.value(value));
                    sets.push(clause);
                }
                Assignment::Remove(attr) => removes.push(self.name(attr)),
            }
        }

        let mut expression = String::new();
        if !sets.is_empty() {
            expression.push_str("SET ");
            expression.push_str(&sets.join(", "));
        }
        if !removes.is_empty() {
            if !expression.is_empty() {
                expression.push(' ');
            }
            expression.push_str("REMOVE ");
            expression.push_str(&removes.join(", "));
        }
        expression
    }

    fn names(&self) -> Option<HashMap<String, String>> {
        if self.names.is_empty() {
            return None;
        }
        Some(
            self.names
                .iter()
                .map(|(attribute, placeholder)| (placeholder.clone(), attribute.clone()))
                .collect(),
        )
    }

    fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().cloned().collect())
    }
}
