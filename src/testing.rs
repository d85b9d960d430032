//! In-memory stand-ins for EC2 and the metadata table.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cidr::Ipv4Cidr;
use crate::dynamo_vpc_store::VpcStore;
use crate::ec2_network_client::{
    NetworkConnector, NetworkProvisioner, RouteTableAssociationSummary, RouteTableSummary,
};
use crate::error::VpcApiError;
use crate::model::{Tag, VpcRecord};

#[derive(Debug, Clone)]
struct FakeRouteTable {
    vpc_id: String,
    // (association id, subnet id); the main association has no subnet
    associations: Vec<(String, Option<String>)>,
}

#[derive(Debug, Default)]
pub struct FakeEc2State {
    next_id: u32,
    pub calls: Vec<String>,
    pub fail_on: BTreeSet<&'static str>,
    pub vpcs: BTreeSet<String>,
    pub subnets: BTreeMap<String, String>,
    pub igws: BTreeMap<String, Option<String>>,
    route_tables: BTreeMap<String, FakeRouteTable>,
    pub tags: BTreeMap<String, Vec<Tag>>,
    pub default_routes: BTreeSet<String>,
}

impl FakeEc2State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08x}", prefix, self.next_id)
    }

    fn call(&mut self, operation: &'static str) -> Result<(), VpcApiError> {
        self.calls.push(operation.to_string());
        if self.fail_on.contains(operation) {
            return Err(VpcApiError::aws(operation, "injected failure"));
        }
        Ok(())
    }

    fn not_found(operation: &'static str, id: &str) -> VpcApiError {
        VpcApiError::aws(operation, format!("{} does not exist", id))
    }

    pub fn associated_route_table(&self, subnet_id: &str) -> Option<String> {
        self.route_tables
            .iter()
            .find(|(_, table)| {
                table
                    .associations
                    .iter()
                    .any(|(_, subnet)| subnet.as_deref() == Some(subnet_id))
            })
            .map(|(id, _)| id.clone())
    }

    pub fn routes_to_igw(&self, route_table_id: &str) -> bool {
        self.default_routes.contains(route_table_id)
    }

    pub fn is_empty(&self) -> bool {
        self.vpcs.is_empty()
            && self.subnets.is_empty()
            && self.igws.is_empty()
            && self.route_tables.is_empty()
    }
}

/// Behaves like EC2 closely enough to exercise dependency ordering:
/// a VPC cannot be deleted while subnets, attached gateways or custom
/// route tables remain.
#[derive(Debug, Clone, Default)]
pub struct FakeEc2 {
    state: Arc<Mutex<FakeEc2State>>,
}

impl FakeEc2 {
    pub fn failing_on(operations: &[&'static str]) -> Self {
        let fake = FakeEc2::default();
        fake.state().fail_on.extend(operations.iter().copied());
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeEc2State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl NetworkProvisioner for FakeEc2 {
    async fn create_vpc(&self, _cidr: &Ipv4Cidr) -> Result<String, VpcApiError> {
        let mut state = self.state();
        state.call("CreateVpc")?;
        let vpc_id = state.id("vpc");
        let main_rt = state.id("rtb");
        let main_assoc = state.id("rtbassoc");
        state.vpcs.insert(vpc_id.clone());
        state.route_tables.insert(
            main_rt,
            FakeRouteTable {
                vpc_id: vpc_id.clone(),
                associations: vec![(main_assoc, None)],
            },
        );
        Ok(vpc_id)
    }

    async fn enable_dns_support(&self, vpc_id: &str) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("ModifyVpcAttribute")?;
        if !state.vpcs.contains(vpc_id) {
            return Err(FakeEc2State::not_found("ModifyVpcAttribute", vpc_id));
        }
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("CreateTags")?;
        let exists = state.vpcs.contains(resource_id)
            || state.subnets.contains_key(resource_id)
            || state.route_tables.contains_key(resource_id);
        if !exists {
            return Err(FakeEc2State::not_found("CreateTags", resource_id));
        }
        state
            .tags
            .entry(resource_id.to_string())
            .or_default()
            .extend(tags.iter().cloned());
        Ok(())
    }

    async fn create_internet_gateway(&self) -> Result<String, VpcApiError> {
        let mut state = self.state();
        state.call("CreateInternetGateway")?;
        let igw_id = state.id("igw");
        state.igws.insert(igw_id.clone(), None);
        Ok(igw_id)
    }

    async fn attach_internet_gateway(
        &self,
        igw_id: &str,
        vpc_id: &str,
    ) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("AttachInternetGateway")?;
        match state.igws.get_mut(igw_id) {
            Some(attachment) => {
                *attachment = Some(vpc_id.to_string());
                Ok(())
            }
            None => Err(FakeEc2State::not_found("AttachInternetGateway", igw_id)),
        }
    }

    async fn detach_internet_gateway(
        &self,
        igw_id: &str,
        vpc_id: &str,
    ) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("DetachInternetGateway")?;
        match state.igws.get_mut(igw_id) {
            Some(attachment) if attachment.as_deref() == Some(vpc_id) => {
                *attachment = None;
                Ok(())
            }
            _ => Err(FakeEc2State::not_found("DetachInternetGateway", igw_id)),
        }
    }

    async fn delete_internet_gateway(&self, igw_id: &str) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("DeleteInternetGateway")?;
        let attached = match state.igws.get(igw_id) {
            Some(attachment) => attachment.is_some(),
            None => return Err(FakeEc2State::not_found("DeleteInternetGateway", igw_id)),
        };
        if attached {
            return Err(VpcApiError::aws("DeleteInternetGateway", "DependencyViolation"));
        }
        state.igws.remove(igw_id);
        Ok(())
    }

    async fn create_route_table(&self, vpc_id: &str) -> Result<String, VpcApiError> {
        let mut state = self.state();
        state.call("CreateRouteTable")?;
        let route_table_id = state.id("rtb");
        state.route_tables.insert(
            route_table_id.clone(),
            FakeRouteTable {
                vpc_id: vpc_id.to_string(),
                associations: vec![],
            },
        );
        Ok(route_table_id)
    }

    async fn create_default_route(
        &self,
        route_table_id: &str,
        _igw_id: &str,
    ) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("CreateRoute")?;
        state.default_routes.insert(route_table_id.to_string());
        Ok(())
    }

    async fn create_subnet(&self, vpc_id: &str, _cidr: &Ipv4Cidr) -> Result<String, VpcApiError> {
        let mut state = self.state();
        state.call("CreateSubnet")?;
        let subnet_id = state.id("subnet");
        state.subnets.insert(subnet_id.clone(), vpc_id.to_string());
        Ok(subnet_id)
    }

    async fn associate_route_table(
        &self,
        subnet_id: &str,
        route_table_id: &str,
    ) -> Result<String, VpcApiError> {
        let mut state = self.state();
        state.call("AssociateRouteTable")?;
        let association_id = state.id("rtbassoc");
        match state.route_tables.get_mut(route_table_id) {
            Some(table) => {
                table
                    .associations
                    .push((association_id.clone(), Some(subnet_id.to_string())));
                Ok(association_id)
            }
            None => Err(FakeEc2State::not_found("AssociateRouteTable", route_table_id)),
        }
    }

    async fn disassociate_route_table(&self, association_id: &str) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("DisassociateRouteTable")?;
        for table in state.route_tables.values_mut() {
            table.associations.retain(|(id, _)| id != association_id);
        }
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("DeleteSubnet")?;
        if state.subnets.remove(subnet_id).is_none() {
            return Err(FakeEc2State::not_found("DeleteSubnet", subnet_id));
        }
        for table in state.route_tables.values_mut() {
            table
                .associations
                .retain(|(_, subnet)| subnet.as_deref() != Some(subnet_id));
        }
        Ok(())
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("DeleteRouteTable")?;
        let in_use = match state.route_tables.get(route_table_id) {
            Some(table) => !table.associations.is_empty(),
            None => return Err(FakeEc2State::not_found("DeleteRouteTable", route_table_id)),
        };
        if in_use {
            return Err(VpcApiError::aws("DeleteRouteTable", "DependencyViolation"));
        }
        state.route_tables.remove(route_table_id);
        Ok(())
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), VpcApiError> {
        let mut state = self.state();
        state.call("DeleteVpc")?;
        if !state.vpcs.contains(vpc_id) {
            return Err(FakeEc2State::not_found("DeleteVpc", vpc_id));
        }
        let has_subnets = state.subnets.values().any(|owner| owner == vpc_id);
        let has_igw = state
            .igws
            .values()
            .any(|attachment| attachment.as_deref() == Some(vpc_id));
        let has_custom_tables = state.route_tables.values().any(|table| {
            table.vpc_id == vpc_id && !table.associations.iter().any(|(_, subnet)| subnet.is_none())
        });
        if has_subnets || has_igw || has_custom_tables {
            return Err(VpcApiError::aws("DeleteVpc", "DependencyViolation"));
        }
        state.vpcs.remove(vpc_id);
        state.route_tables.retain(|_, table| table.vpc_id != vpc_id);
        Ok(())
    }

    async fn describe_route_tables(
        &self,
        vpc_id: &str,
    ) -> Result<Vec<RouteTableSummary>, VpcApiError> {
        let mut state = self.state();
        state.call("DescribeRouteTables")?;
        Ok(state
            .route_tables
            .iter()
            .filter(|(_, table)| table.vpc_id == vpc_id)
            .map(|(id, table)| RouteTableSummary {
                route_table_id: id.clone(),
                associations: table
                    .associations
                    .iter()
                    .map(|(association_id, subnet)| RouteTableAssociationSummary {
                        association_id: association_id.clone(),
                        main: subnet.is_none(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn describe_internet_gateways(&self, vpc_id: &str) -> Result<Vec<String>, VpcApiError> {
        let mut state = self.state();
        state.call("DescribeInternetGateways")?;
        Ok(state
            .igws
            .iter()
            .filter(|(_, attachment)| attachment.as_deref() == Some(vpc_id))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

/// Connects every region to the same fake, refusing `invalid-region`.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub ec2: FakeEc2,
    pub regions: Arc<Mutex<Vec<String>>>,
}

impl NetworkConnector for FakeConnector {
    type Network = FakeEc2;

    fn connect(&self, region: &str) -> Result<Self::Network, VpcApiError> {
        if region == "invalid-region" {
            return Err(VpcApiError::Validation(format!(
                "Unknown AWS region {}",
                region
            )));
        }
        self.regions.lock().unwrap().push(region.to_string());
        Ok(self.ec2.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub records: Mutex<BTreeMap<String, VpcRecord>>,
    pub fail_put: bool,
    pub fail_delete: bool,
}

impl MemoryStore {
    pub fn failing_put() -> Self {
        MemoryStore {
            fail_put: true,
            ..Default::default()
        }
    }

    pub fn failing_delete() -> Self {
        MemoryStore {
            fail_delete: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, record: VpcRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.vpc_id.clone(), record);
    }
}

#[async_trait]
impl VpcStore for MemoryStore {
    async fn put(&self, record: &VpcRecord) -> Result<(), VpcApiError> {
        if self.fail_put {
            return Err(VpcApiError::aws("PutItem", "injected failure"));
        }
        self.insert(record.clone());
        Ok(())
    }

    async fn get(&self, vpc_id: &str) -> Result<Option<VpcRecord>, VpcApiError> {
        Ok(self.records.lock().unwrap().get(vpc_id).cloned())
    }

    async fn list(&self) -> Result<Vec<VpcRecord>, VpcApiError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn update_tags(&self, vpc_id: &str, tags: &[Tag]) -> Result<(), VpcApiError> {
        match self.records.lock().unwrap().get_mut(vpc_id) {
            Some(record) => {
                record.tags = tags.to_vec();
                Ok(())
            }
            None => Err(VpcApiError::NotFound(vpc_id.to_string())),
        }
    }

    async fn delete(&self, vpc_id: &str) -> Result<(), VpcApiError> {
        if self.fail_delete {
            return Err(VpcApiError::aws("DeleteItem", "injected failure"));
        }
        self.records.lock().unwrap().remove(vpc_id);
        Ok(())
    }
}
