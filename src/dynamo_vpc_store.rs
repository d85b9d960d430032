use async_trait::async_trait;
use rusoto_core::RusotoError;
use rusoto_dynamodb::{
    AttributeValue, DeleteItemInput, DynamoDb, DynamoDbClient, GetItemInput, PutItemInput,
    ScanInput, UpdateItemError, UpdateItemInput,
};
use std::collections::HashMap;

use crate::error::VpcApiError;
use crate::model::{RouteTables, Tag, VpcRecord};

type Item = HashMap<String, AttributeValue>;

const VPC_ID: &str = "VpcId";
const REGION: &str = "Region";
const SUBNET_IDS: &str = "SubnetIds";
const TAGS: &str = "Tags";
const IGW: &str = "igw";
const ROUTE_TABLES: &str = "RouteTables";
const CREATED_AT: &str = "CreatedAt";

/// Persistence for the VPCs this API has created.
#[async_trait]
pub trait VpcStore: Send + Sync {
    async fn put(&self, record: &VpcRecord) -> Result<(), VpcApiError>;
    async fn get(&self, vpc_id: &str) -> Result<Option<VpcRecord>, VpcApiError>;
    async fn list(&self) -> Result<Vec<VpcRecord>, VpcApiError>;
    /// Replaces the stored tags. Fails with `NotFound` rather than creating an item.
    async fn update_tags(&self, vpc_id: &str, tags: &[Tag]) -> Result<(), VpcApiError>;
    async fn delete(&self, vpc_id: &str) -> Result<(), VpcApiError>;
}

pub struct DynamoVpcStore {
    client: DynamoDbClient,
    table_name: String,
    region: String,
}

impl DynamoVpcStore {
    pub fn new_with_client(client: DynamoDbClient, table_name: &str, region: &str) -> Self {
        DynamoVpcStore {
            client,
            table_name: table_name.to_string(),
            region: region.to_string(),
        }
    }

    fn key(vpc_id: &str) -> Item {
        let mut key = HashMap::new();
        key.insert(VPC_ID.to_string(), string_value(vpc_id));
        key
    }
}

#[async_trait]
impl VpcStore for DynamoVpcStore {
    async fn put(&self, record: &VpcRecord) -> Result<(), VpcApiError> {
        self.client
            .put_item(PutItemInput {
                table_name: self.table_name.clone(),
                item: to_item(record),
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|error| VpcApiError::aws("PutItem", error))
    }

    async fn get(&self, vpc_id: &str) -> Result<Option<VpcRecord>, VpcApiError> {
        let output = self
            .client
            .get_item(GetItemInput {
                table_name: self.table_name.clone(),
                key: Self::key(vpc_id),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("GetItem", error))?;
        output
            .item
            .map(|item| from_item(item, &self.region))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<VpcRecord>, VpcApiError> {
        let mut records = Vec::new();
        let mut exclusive_start_key = None;
        loop {
            let output = self
                .client
                .scan(ScanInput {
                    table_name: self.table_name.clone(),
                    exclusive_start_key,
                    ..Default::default()
                })
                .await
                .map_err(|error| VpcApiError::aws("Scan", error))?;
            for item in output.items.unwrap_or_default() {
                records.push(from_item(item, &self.region)?);
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
                _ => break,
            }
        }
        Ok(records)
    }

    async fn update_tags(&self, vpc_id: &str, tags: &[Tag]) -> Result<(), VpcApiError> {
        let mut names = HashMap::new();
        names.insert("#tg".to_string(), TAGS.to_string());
        let mut values = HashMap::new();
        values.insert(":val".to_string(), tags_value(tags));

        let result = self
            .client
            .update_item(UpdateItemInput {
                table_name: self.table_name.clone(),
                key: Self::key(vpc_id),
                update_expression: Some("SET #tg = :val".to_string()),
                condition_expression: Some(format!("attribute_exists({})", VPC_ID)),
                expression_attribute_names: Some(names),
                expression_attribute_values: Some(values),
                ..Default::default()
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(RusotoError::Service(UpdateItemError::ConditionalCheckFailed(_))) => {
                Err(VpcApiError::NotFound(vpc_id.to_string()))
            }
            Err(error) => Err(VpcApiError::aws("UpdateItem", error)),
        }
    }

    async fn delete(&self, vpc_id: &str) -> Result<(), VpcApiError> {
        self.client
            .delete_item(DeleteItemInput {
                table_name: self.table_name.clone(),
                key: Self::key(vpc_id),
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|error| VpcApiError::aws("DeleteItem", error))
    }
}

fn string_value(value: &str) -> AttributeValue {
    AttributeValue {
        s: Some(value.to_string()),
        ..Default::default()
    }
}

fn tags_value(tags: &[Tag]) -> AttributeValue {
    let tags = tags
        .iter()
        .map(|tag| {
            let mut map = HashMap::new();
            map.insert("Key".to_string(), string_value(&tag.key));
            map.insert("Value".to_string(), string_value(&tag.value));
            AttributeValue {
                m: Some(map),
                ..Default::default()
            }
        })
        .collect();
    AttributeValue {
        l: Some(tags),
        ..Default::default()
    }
}

pub(crate) fn to_item(record: &VpcRecord) -> Item {
    let mut item = HashMap::new();
    item.insert(VPC_ID.to_string(), string_value(&record.vpc_id));
    item.insert(REGION.to_string(), string_value(&record.region));
    item.insert(
        SUBNET_IDS.to_string(),
        AttributeValue {
            l: Some(record.subnet_ids.iter().map(|id| string_value(id)).collect()),
            ..Default::default()
        },
    );
    item.insert(TAGS.to_string(), tags_value(&record.tags));
    if let Some(igw) = &record.internet_gateway_id {
        item.insert(IGW.to_string(), string_value(igw));
    }
    if let Some(route_tables) = &record.route_tables {
        let mut map = HashMap::new();
        map.insert("Public".to_string(), string_value(&route_tables.public));
        map.insert("Private".to_string(), string_value(&route_tables.private));
        item.insert(
            ROUTE_TABLES.to_string(),
            AttributeValue {
                m: Some(map),
                ..Default::default()
            },
        );
    }
    if let Some(created_at) = &record.created_at {
        item.insert(CREATED_AT.to_string(), string_value(created_at));
    }
    item
}

fn get_string(item: &Item, name: &str) -> Option<String> {
    item.get(name).and_then(|value| value.s.clone())
}

fn require_string(item: &Item, name: &str) -> Result<String, VpcApiError> {
    get_string(item, name)
        .ok_or_else(|| VpcApiError::MalformedRecord(format!("{} is missing or not a string", name)))
}

/// Reads a stored item. `Region` falls back to the table's region for older items.
pub(crate) fn from_item(item: Item, fallback_region: &str) -> Result<VpcRecord, VpcApiError> {
    let vpc_id = require_string(&item, VPC_ID)?;

    let subnet_ids = match item.get(SUBNET_IDS).and_then(|value| value.l.as_ref()) {
        Some(values) => values
            .iter()
            .map(|value| {
                value.s.clone().ok_or_else(|| {
                    VpcApiError::MalformedRecord(format!("{} contains a non-string", SUBNET_IDS))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![],
    };

    let tags = match item.get(TAGS).and_then(|value| value.l.as_ref()) {
        Some(values) => values
            .iter()
            .map(|value| -> Result<Tag, VpcApiError> {
                let map = value.m.as_ref().ok_or_else(|| {
                    VpcApiError::MalformedRecord(format!("{} entry is not a map", TAGS))
                })?;
                Ok(Tag::new(
                    require_string(map, "Key")?,
                    require_string(map, "Value")?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![],
    };

    let route_tables = match item.get(ROUTE_TABLES).and_then(|value| value.m.as_ref()) {
        Some(map) => Some(RouteTables {
            public: require_string(map, "Public")?,
            private: require_string(map, "Private")?,
        }),
        None => None,
    };

    Ok(VpcRecord {
        vpc_id,
        region: get_string(&item, REGION).unwrap_or_else(|| fallback_region.to_string()),
        subnet_ids,
        tags,
        internet_gateway_id: get_string(&item, IGW),
        route_tables,
        created_at: get_string(&item, CREATED_AT),
    })
}
