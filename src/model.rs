use serde::{Deserialize, Serialize};

/// An AWS resource tag, in the casing EC2 uses on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Tag {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn name(value: impl Into<String>) -> Self {
        Tag::new("Name", value)
    }
}

/// Overlays `updates` onto `existing`: a matching key takes the new value,
/// unknown keys are appended in order.
pub fn merge_tags(existing: &[Tag], updates: &[Tag]) -> Vec<Tag> {
    let mut merged = existing.to_vec();
    for update in updates {
        match merged.iter_mut().find(|tag| tag.key == update.key) {
            Some(tag) => tag.value = update.value.clone(),
            None => merged.push(update.clone()),
        }
    }
    merged
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateVpcRequest {
    pub vpc_cidr: String,
    pub subnet_count: u32,
    #[serde(default)]
    pub public_subnet_count: Option<u32>,
    #[serde(default)]
    pub vpc_tags: Option<Vec<Tag>>,
    #[serde(default)]
    pub subnet_tags: Option<Vec<Tag>>,
    pub region: String,
}

impl CreateVpcRequest {
    /// Subnets with an index below this count are routed through the IGW.
    pub fn public_count(&self) -> u32 {
        self.public_subnet_count
            .unwrap_or(self.subnet_count / 2)
            .min(self.subnet_count)
    }

    pub fn subnet_tag(&self, index: usize) -> Tag {
        self.subnet_tags
            .as_ref()
            .and_then(|tags| tags.get(index))
            .cloned()
            .unwrap_or_else(|| Tag::name(format!("Subnet-{}", index + 1)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateVpcTagsRequest {
    #[serde(default)]
    pub vpc_tags: Option<Vec<Tag>>,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTables {
    #[serde(rename = "Public")]
    pub public: String,
    #[serde(rename = "Private")]
    pub private: String,
}

/// What the store keeps about a VPC created through the API.
#[derive(Debug, Clone, PartialEq)]
pub struct VpcRecord {
    pub vpc_id: String,
    pub region: String,
    pub subnet_ids: Vec<String>,
    pub tags: Vec<Tag>,
    pub internet_gateway_id: Option<String>,
    pub route_tables: Option<RouteTables>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcResponse {
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub region: String,
    #[serde(default, alias = "igw")]
    pub internet_gateway_id: Option<String>,
    #[serde(default)]
    pub route_tables: Option<RouteTables>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<VpcRecord> for VpcResponse {
    fn from(record: VpcRecord) -> Self {
        VpcResponse {
            vpc_id: record.vpc_id,
            subnet_ids: record.subnet_ids,
            tags: record.tags,
            region: record.region,
            internet_gateway_id: record.internet_gateway_id,
            route_tables: record.route_tables,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateVpcResponse {
    pub vpc_id: String,
    pub updated_tags: Option<Vec<Tag>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteVpcResponse {
    pub message: String,
}
