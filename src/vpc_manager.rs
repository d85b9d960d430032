use chrono::{SecondsFormat, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cidr::{calculate_subnets, Ipv4Cidr};
use crate::dynamo_vpc_store::VpcStore;
use crate::ec2_network_client::NetworkProvisioner;
use crate::error::VpcApiError;
use crate::model::{
    merge_tags, CreateVpcRequest, DeleteVpcResponse, RouteTables, Tag, UpdateVpcResponse,
    VpcRecord, VpcResponse,
};

/// EC2's default subnets-per-VPC quota. Larger layouts are rejected before
/// anything is created.
pub const MAX_SUBNETS_PER_VPC: u32 = 200;

/// Resources created so far by one `create` call, in creation order.
#[derive(Debug, Default)]
struct Provisioned {
    vpc_id: Option<String>,
    igw_id: Option<String>,
    route_table_ids: Vec<String>,
    subnet_ids: Vec<String>,
}

/// Creates, reads, updates and deletes VPCs in one region, keeping the
/// metadata store in step.
pub struct VpcManager<N, S> {
    region: String,
    network: N,
    store: Arc<S>,
}

impl<N, S> VpcManager<N, S>
where
    N: NetworkProvisioner,
    S: VpcStore,
{
    pub fn new(region: &str, network: N, store: Arc<S>) -> Self {
        info!("Initializing VpcManager in region: {}", region);
        VpcManager {
            region: region.to_string(),
            network,
            store,
        }
    }

    /// Builds a VPC with an IGW, a public and a private route table and
    /// `subnet_count` subnets. Any failure after the VPC exists rolls back
    /// whatever was created.
    pub async fn create_vpc(&self, request: &CreateVpcRequest) -> Result<VpcResponse, VpcApiError> {
        let network = Ipv4Cidr::from_str(&request.vpc_cidr)?;
        if request.subnet_count > MAX_SUBNETS_PER_VPC {
            return Err(VpcApiError::Validation(format!(
                "subnet_count {} exceeds the limit of {} subnets per VPC",
                request.subnet_count, MAX_SUBNETS_PER_VPC
            )));
        }
        let subnet_cidrs = calculate_subnets(&network, request.subnet_count)?;

        let mut provisioned = Provisioned::default();
        match self
            .provision(request, &network, &subnet_cidrs, &mut provisioned)
            .await
        {
            Ok(record) => Ok(record.into()),
            Err(error) => {
                error!("Error during VPC creation: {}. Rolling back...", error);
                self.rollback(&provisioned).await;
                Err(error)
            }
        }
    }

    async fn provision(
        &self,
        request: &CreateVpcRequest,
        network: &Ipv4Cidr,
        subnet_cidrs: &[Ipv4Cidr],
        provisioned: &mut Provisioned,
    ) -> Result<VpcRecord, VpcApiError> {
        info!("Creating VPC with CIDR {}", network);
        let vpc_id = self.network.create_vpc(network).await?;
        provisioned.vpc_id = Some(vpc_id.clone());
        self.network.enable_dns_support(&vpc_id).await?;

        let vpc_tags = request.vpc_tags.clone().unwrap_or_default();
        if !vpc_tags.is_empty() {
            self.network.create_tags(&vpc_id, &vpc_tags).await?;
        }

        let igw_id = self.network.create_internet_gateway().await?;
        provisioned.igw_id = Some(igw_id.clone());
        self.network.attach_internet_gateway(&igw_id, &vpc_id).await?;
        info!("Created & attached IGW {}", igw_id);

        let public_rt = self.network.create_route_table(&vpc_id).await?;
        provisioned.route_table_ids.push(public_rt.clone());
        self.network
            .create_tags(&public_rt, &[Tag::name("Public-RT")])
            .await?;
        self.network.create_default_route(&public_rt, &igw_id).await?;

        let private_rt = self.network.create_route_table(&vpc_id).await?;
        provisioned.route_table_ids.push(private_rt.clone());
        self.network
            .create_tags(&private_rt, &[Tag::name("Private-RT")])
            .await?;

        let public_count = request.public_count() as usize;
        for (index, cidr) in subnet_cidrs.iter().enumerate() {
            let subnet_id = self.network.create_subnet(&vpc_id, cidr).await?;
            provisioned.subnet_ids.push(subnet_id.clone());
            self.network
                .create_tags(&subnet_id, &[request.subnet_tag(index)])
                .await?;

            let is_public = index < public_count;
            let route_table_id = if is_public { &public_rt } else { &private_rt };
            self.network
                .associate_route_table(&subnet_id, route_table_id)
                .await?;
            info!(
                "Subnet {} associated with {} RT",
                subnet_id,
                if is_public { "Public" } else { "Private" }
            );
        }

        let record = VpcRecord {
            vpc_id: vpc_id.clone(),
            region: self.region.clone(),
            subnet_ids: provisioned.subnet_ids.clone(),
            tags: vpc_tags,
            internet_gateway_id: Some(igw_id),
            route_tables: Some(RouteTables {
                public: public_rt,
                private: private_rt,
            }),
            created_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        };
        self.store.put(&record).await?;
        info!("VPC {} successfully created & persisted", vpc_id);
        Ok(record)
    }

    /// Best effort: every step is attempted even if an earlier one failed.
    async fn rollback(&self, provisioned: &Provisioned) {
        for subnet_id in &provisioned.subnet_ids {
            match self.network.delete_subnet(subnet_id).await {
                Ok(()) => info!("Rollback: Deleted subnet {}", subnet_id),
                Err(e) => warn!("Rollback: Failed to delete subnet {}: {}", subnet_id, e),
            }
        }

        for route_table_id in &provisioned.route_table_ids {
            match self.network.delete_route_table(route_table_id).await {
                Ok(()) => info!("Rollback: Deleted route table {}", route_table_id),
                Err(e) => warn!(
                    "Rollback: Failed to delete route table {}: {}",
                    route_table_id, e
                ),
            }
        }

        if let (Some(igw_id), Some(vpc_id)) = (&provisioned.igw_id, &provisioned.vpc_id) {
            if let Err(e) = self.network.detach_internet_gateway(igw_id, vpc_id).await {
                warn!("Rollback: Failed to detach IGW {}: {}", igw_id, e);
            }
            match self.network.delete_internet_gateway(igw_id).await {
                Ok(()) => info!("Rollback: Detached and deleted IGW {}", igw_id),
                Err(e) => warn!("Rollback: Failed to remove IGW {}: {}", igw_id, e),
            }
        }

        if let Some(vpc_id) = &provisioned.vpc_id {
            match self.network.delete_vpc(vpc_id).await {
                Ok(()) => info!("Rollback: Deleted VPC {}", vpc_id),
                Err(e) => warn!("Rollback: Failed to delete VPC {}: {}", vpc_id, e),
            }
        }
    }

    pub async fn get_vpc(&self, vpc_id: &str) -> Result<Option<VpcResponse>, VpcApiError> {
        get_vpc(self.store.as_ref(), vpc_id).await
    }

    pub async fn list_vpcs(&self) -> Result<Vec<VpcResponse>, VpcApiError> {
        list_vpcs(self.store.as_ref()).await
    }

    /// Applies `tags` to the VPC and merges them into the stored tags.
    /// An empty or absent tag list changes nothing.
    pub async fn update_vpc(
        &self,
        vpc_id: &str,
        tags: Option<Vec<Tag>>,
    ) -> Result<UpdateVpcResponse, VpcApiError> {
        info!("Updating VPC {} with new tags", vpc_id);
        if let Some(tags) = tags.as_deref().filter(|tags| !tags.is_empty()) {
            self.network.create_tags(vpc_id, tags).await?;

            let record = self
                .store
                .get(vpc_id)
                .await?
                .ok_or_else(|| VpcApiError::NotFound(vpc_id.to_string()))?;
            let merged = merge_tags(&record.tags, tags);
            self.store.update_tags(vpc_id, &merged).await?;
        }

        Ok(UpdateVpcResponse {
            vpc_id: vpc_id.to_string(),
            updated_tags: tags,
        })
    }

    /// Tears down the subnets, route tables, IGWs and the VPC itself. Only
    /// the final VPC deletion is allowed to fail the call; the record is
    /// kept in that case so the delete can be retried.
    pub async fn delete_vpc(&self, vpc_id: &str) -> Result<DeleteVpcResponse, VpcApiError> {
        info!("Attempting to delete VPC {}", vpc_id);
        let record = match self.store.get(vpc_id).await? {
            Some(record) => record,
            None => {
                warn!("VPC {} not found in store", vpc_id);
                return Err(VpcApiError::NotFound(vpc_id.to_string()));
            }
        };

        for subnet_id in &record.subnet_ids {
            match self.network.delete_subnet(subnet_id).await {
                Ok(()) => info!("Deleted Subnet {}", subnet_id),
                Err(e) => warn!("Subnet {} deletion failed: {}", subnet_id, e),
            }
        }

        self.delete_route_tables(vpc_id).await;
        self.delete_internet_gateways(vpc_id).await;

        if let Err(e) = self.network.delete_vpc(vpc_id).await {
            error!("Could not delete VPC {}: {}", vpc_id, e);
            return Err(e);
        }
        info!("Deleted VPC {}", vpc_id);

        match self.store.delete(vpc_id).await {
            Ok(()) => info!("Removed VPC {} from store", vpc_id),
            Err(e) => warn!("Failed to delete VPC record {}: {}", vpc_id, e),
        }

        Ok(DeleteVpcResponse {
            message: format!("VPC {} deleted successfully", vpc_id),
        })
    }

    async fn delete_route_tables(&self, vpc_id: &str) {
        let route_tables = match self.network.describe_route_tables(vpc_id).await {
            Ok(route_tables) => route_tables,
            Err(e) => {
                warn!("Failed to describe route tables for {}: {}", vpc_id, e);
                return;
            }
        };

        for route_table in route_tables {
            let route_table_id = &route_table.route_table_id;
            for association in route_table.associations.iter().filter(|a| !a.main) {
                match self
                    .network
                    .disassociate_route_table(&association.association_id)
                    .await
                {
                    Ok(()) => info!("Disassociated Route Table {}", route_table_id),
                    Err(e) => warn!("Could not disassociate RT {}: {}", route_table_id, e),
                }
            }
            // the main table goes away with the VPC
            if !route_table.is_main() {
                match self.network.delete_route_table(route_table_id).await {
                    Ok(()) => info!("Deleted Route Table {}", route_table_id),
                    Err(e) => warn!("Could not delete RT {}: {}", route_table_id, e),
                }
            }
        }
    }

    async fn delete_internet_gateways(&self, vpc_id: &str) {
        let igw_ids = match self.network.describe_internet_gateways(vpc_id).await {
            Ok(igw_ids) => igw_ids,
            Err(e) => {
                warn!("Failed to describe IGW for {}: {}", vpc_id, e);
                return;
            }
        };

        for igw_id in igw_ids {
            match self.network.detach_internet_gateway(&igw_id, vpc_id).await {
                Ok(()) => info!("Detached IGW {}", igw_id),
                Err(e) => warn!("Could not detach IGW {}: {}", igw_id, e),
            }
            match self.network.delete_internet_gateway(&igw_id).await {
                Ok(()) => info!("Deleted IGW {}", igw_id),
                Err(e) => warn!("Could not delete IGW {}: {}", igw_id, e),
            }
        }
    }
}

/// Reads a VPC from the store alone; no EC2 client is needed.
pub async fn get_vpc<S: VpcStore>(
    store: &S,
    vpc_id: &str,
) -> Result<Option<VpcResponse>, VpcApiError> {
    info!("Fetching VPC {} from store", vpc_id);
    Ok(store.get(vpc_id).await?.map(VpcResponse::from))
}

pub async fn list_vpcs<S: VpcStore>(store: &S) -> Result<Vec<VpcResponse>, VpcApiError> {
    info!("Listing all VPCs from store");
    let records = store.list().await?;
    Ok(records.into_iter().map(VpcResponse::from).collect())
}
