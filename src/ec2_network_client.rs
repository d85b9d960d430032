use async_trait::async_trait;
use rusoto_core::Region;
use rusoto_ec2::{
    AssociateRouteTableRequest, AttachInternetGatewayRequest, AttributeBooleanValue,
    CreateInternetGatewayRequest, CreateRouteRequest, CreateRouteTableRequest, CreateSubnetRequest,
    CreateTagsRequest, CreateVpcRequest, DeleteInternetGatewayRequest, DeleteRouteTableRequest,
    DeleteSubnetRequest, DeleteVpcRequest, DescribeInternetGatewaysRequest,
    DescribeRouteTablesRequest, DetachInternetGatewayRequest, DisassociateRouteTableRequest, Ec2,
    Ec2Client, Filter, ModifyVpcAttributeRequest,
};
use std::str::FromStr;

use crate::cidr::Ipv4Cidr;
use crate::error::VpcApiError;
use crate::model::Tag;

pub const DEFAULT_ROUTE_CIDR: &str = "0.0.0.0/0";

#[derive(Debug, Clone, PartialEq)]
pub struct RouteTableSummary {
    pub route_table_id: String,
    pub associations: Vec<RouteTableAssociationSummary>,
}

impl RouteTableSummary {
    pub fn is_main(&self) -> bool {
        self.associations.iter().any(|association| association.main)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteTableAssociationSummary {
    pub association_id: String,
    pub main: bool,
}

/// The EC2 calls needed to build and tear down a VPC.
#[async_trait]
pub trait NetworkProvisioner: Send + Sync {
    async fn create_vpc(&self, cidr: &Ipv4Cidr) -> Result<String, VpcApiError>;
    async fn enable_dns_support(&self, vpc_id: &str) -> Result<(), VpcApiError>;
    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), VpcApiError>;
    async fn create_internet_gateway(&self) -> Result<String, VpcApiError>;
    async fn attach_internet_gateway(&self, igw_id: &str, vpc_id: &str)
        -> Result<(), VpcApiError>;
    async fn detach_internet_gateway(&self, igw_id: &str, vpc_id: &str)
        -> Result<(), VpcApiError>;
    async fn delete_internet_gateway(&self, igw_id: &str) -> Result<(), VpcApiError>;
    async fn create_route_table(&self, vpc_id: &str) -> Result<String, VpcApiError>;
    async fn create_default_route(&self, route_table_id: &str, igw_id: &str)
        -> Result<(), VpcApiError>;
    async fn create_subnet(&self, vpc_id: &str, cidr: &Ipv4Cidr) -> Result<String, VpcApiError>;
    async fn associate_route_table(
        &self,
        subnet_id: &str,
        route_table_id: &str,
    ) -> Result<String, VpcApiError>;
    async fn disassociate_route_table(&self, association_id: &str) -> Result<(), VpcApiError>;
    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), VpcApiError>;
    async fn delete_route_table(&self, route_table_id: &str) -> Result<(), VpcApiError>;
    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), VpcApiError>;
    async fn describe_route_tables(&self, vpc_id: &str)
        -> Result<Vec<RouteTableSummary>, VpcApiError>;
    async fn describe_internet_gateways(&self, vpc_id: &str) -> Result<Vec<String>, VpcApiError>;
}

/// Hands out a provisioner bound to one region.
pub trait NetworkConnector: Send + Sync {
    type Network: NetworkProvisioner;

    fn connect(&self, region: &str) -> Result<Self::Network, VpcApiError>;
}

pub struct Ec2NetworkClient {
    client: Ec2Client,
}

impl Ec2NetworkClient {
    pub fn new_with_client(client: Ec2Client) -> Self {
        Ec2NetworkClient { client }
    }

    fn filter(name: &str, value: &str) -> Option<Vec<Filter>> {
        Some(vec![Filter {
            name: Some(name.to_string()),
            values: Some(vec![value.to_string()]),
        }])
    }
}

#[async_trait]
impl NetworkProvisioner for Ec2NetworkClient {
    async fn create_vpc(&self, cidr: &Ipv4Cidr) -> Result<String, VpcApiError> {
        let result = self
            .client
            .create_vpc(CreateVpcRequest {
                cidr_block: cidr.to_string().into(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("CreateVpc", error))?;
        result
            .vpc
            .and_then(|vpc| vpc.vpc_id)
            .ok_or_else(|| VpcApiError::none_value("CreateVpc", "VpcId"))
    }

    async fn enable_dns_support(&self, vpc_id: &str) -> Result<(), VpcApiError> {
        self.client
            .modify_vpc_attribute(ModifyVpcAttributeRequest {
                vpc_id: vpc_id.to_string(),
                enable_dns_support: Some(AttributeBooleanValue { value: Some(true) }),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("ModifyVpcAttribute", error))
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> Result<(), VpcApiError> {
        let tags = tags
            .iter()
            .map(|tag| rusoto_ec2::Tag {
                key: Some(tag.key.clone()),
                value: Some(tag.value.clone()),
            })
            .collect();
        self.client
            .create_tags(CreateTagsRequest {
                resources: vec![resource_id.to_string()],
                tags,
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("CreateTags", error))
    }

    async fn create_internet_gateway(&self) -> Result<String, VpcApiError> {
        let result = self
            .client
            .create_internet_gateway(CreateInternetGatewayRequest::default())
            .await
            .map_err(|error| VpcApiError::aws("CreateInternetGateway", error))?;
        result
            .internet_gateway
            .and_then(|igw| igw.internet_gateway_id)
            .ok_or_else(|| VpcApiError::none_value("CreateInternetGateway", "InternetGatewayId"))
    }

    async fn attach_internet_gateway(
        &self,
        igw_id: &str,
        vpc_id: &str,
    ) -> Result<(), VpcApiError> {
        self.client
            .attach_internet_gateway(AttachInternetGatewayRequest {
                internet_gateway_id: igw_id.to_string(),
                vpc_id: vpc_id.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("AttachInternetGateway", error))
    }

    async fn detach_internet_gateway(
        &self,
        igw_id: &str,
        vpc_id: &str,
    ) -> Result<(), VpcApiError> {
        self.client
            .detach_internet_gateway(DetachInternetGatewayRequest {
                internet_gateway_id: igw_id.to_string(),
                vpc_id: vpc_id.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("DetachInternetGateway", error))
    }

    async fn delete_internet_gateway(&self, igw_id: &str) -> Result<(), VpcApiError> {
        self.client
            .delete_internet_gateway(DeleteInternetGatewayRequest {
                internet_gateway_id: igw_id.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("DeleteInternetGateway", error))
    }

    async fn create_route_table(&self, vpc_id: &str) -> Result<String, VpcApiError> {
        let result = self
            .client
            .create_route_table(CreateRouteTableRequest {
                vpc_id: vpc_id.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("CreateRouteTable", error))?;
        result
            .route_table
            .and_then(|route_table| route_table.route_table_id)
            .ok_or_else(|| VpcApiError::none_value("CreateRouteTable", "RouteTableId"))
    }

    async fn create_default_route(
        &self,
        route_table_id: &str,
        igw_id: &str,
    ) -> Result<(), VpcApiError> {
        self.client
            .create_route(CreateRouteRequest {
                route_table_id: route_table_id.to_string(),
                destination_cidr_block: Some(DEFAULT_ROUTE_CIDR.to_string()),
                gateway_id: Some(igw_id.to_string()),
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|error| VpcApiError::aws("CreateRoute", error))
    }

    async fn create_subnet(&self, vpc_id: &str, cidr: &Ipv4Cidr) -> Result<String, VpcApiError> {
        let result = self
            .client
            .create_subnet(CreateSubnetRequest {
                vpc_id: vpc_id.to_string(),
                cidr_block: cidr.to_string().into(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("CreateSubnet", error))?;
        result
            .subnet
            .and_then(|subnet| subnet.subnet_id)
            .ok_or_else(|| VpcApiError::none_value("CreateSubnet", "SubnetId"))
    }

    async fn associate_route_table(
        &self,
        subnet_id: &str,
        route_table_id: &str,
    ) -> Result<String, VpcApiError> {
        let result = self
            .client
            .associate_route_table(AssociateRouteTableRequest {
                route_table_id: route_table_id.to_string(),
                subnet_id: Some(subnet_id.to_string()),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("AssociateRouteTable", error))?;
        result
            .association_id
            .ok_or_else(|| VpcApiError::none_value("AssociateRouteTable", "AssociationId"))
    }

    async fn disassociate_route_table(&self, association_id: &str) -> Result<(), VpcApiError> {
        self.client
            .disassociate_route_table(DisassociateRouteTableRequest {
                association_id: association_id.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("DisassociateRouteTable", error))
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), VpcApiError> {
        self.client
            .delete_subnet(DeleteSubnetRequest {
                subnet_id: subnet_id.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("DeleteSubnet", error))
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<(), VpcApiError> {
        self.client
            .delete_route_table(DeleteRouteTableRequest {
                route_table_id: route_table_id.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("DeleteRouteTable", error))
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), VpcApiError> {
        self.client
            .delete_vpc(DeleteVpcRequest {
                vpc_id: vpc_id.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("DeleteVpc", error))
    }

    async fn describe_route_tables(
        &self,
        vpc_id: &str,
    ) -> Result<Vec<RouteTableSummary>, VpcApiError> {
        let result = self
            .client
            .describe_route_tables(DescribeRouteTablesRequest {
                filters: Self::filter("vpc-id", vpc_id),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("DescribeRouteTables", error))?;

        let mut summaries = Vec::new();
        for route_table in result.route_tables.unwrap_or_default() {
            let route_table_id = route_table
                .route_table_id
                .ok_or_else(|| VpcApiError::none_value("DescribeRouteTables", "RouteTableId"))?;
            let associations = route_table
                .associations
                .unwrap_or_default()
                .into_iter()
                .filter_map(|association| {
                    association
                        .route_table_association_id
                        .map(|association_id| RouteTableAssociationSummary {
                            association_id,
                            main: association.main.unwrap_or(false),
                        })
                })
                .collect();
            summaries.push(RouteTableSummary {
                route_table_id,
                associations,
            });
        }
        Ok(summaries)
    }

    async fn describe_internet_gateways(&self, vpc_id: &str) -> Result<Vec<String>, VpcApiError> {
        let result = self
            .client
            .describe_internet_gateways(DescribeInternetGatewaysRequest {
                filters: Self::filter("attachment.vpc-id", vpc_id),
                ..Default::default()
            })
            .await
            .map_err(|error| VpcApiError::aws("DescribeInternetGateways", error))?;
        Ok(result
            .internet_gateways
            .unwrap_or_default()
            .into_iter()
            .filter_map(|igw| igw.internet_gateway_id)
            .collect())
    }
}

pub struct Ec2Connector;

impl NetworkConnector for Ec2Connector {
    type Network = Ec2NetworkClient;

    fn connect(&self, region: &str) -> Result<Self::Network, VpcApiError> {
        let region = Region::from_str(region)
            .map_err(|_| VpcApiError::Validation(format!("Unknown AWS region {}", region)))?;
        Ok(Ec2NetworkClient::new_with_client(Ec2Client::new(region)))
    }
}
