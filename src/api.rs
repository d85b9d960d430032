use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::dynamo_vpc_store::VpcStore;
use crate::ec2_network_client::NetworkConnector;
use crate::error::VpcApiError;
use crate::model::{CreateVpcRequest, UpdateVpcTagsRequest};
use crate::vpc_manager::{self, VpcManager};

/// The parts of an HTTP request the routes look at.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => ApiResponse { status: 200, body },
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                Self::detail(500, "Internal server error")
            }
        }
    }

    fn detail(status: u16, detail: impl Into<String>) -> Self {
        ApiResponse {
            status,
            body: json!({ "detail": detail.into() }),
        }
    }
}

#[derive(Debug, PartialEq)]
enum Route<'a> {
    CreateVpc,
    GetVpc(&'a str),
    ListVpcs,
    UpdateVpc(&'a str),
    DeleteVpc(&'a str),
}

impl<'a> Route<'a> {
    /// Matches on the trailing segments so a stage prefix such as `/prod` is ignored.
    fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            // id routes before bare names: `/list-vpc/create-vpc` is a lookup
            [.., "list-vpc", id] => Some(Route::GetVpc(*id)),
            [.., "update-vpc", id] => Some(Route::UpdateVpc(*id)),
            [.., "delete-vpc", id] => Some(Route::DeleteVpc(*id)),
            [.., "create-vpc"] => Some(Route::CreateVpc),
            [.., "list-all-vpcs"] => Some(Route::ListVpcs),
            _ => None,
        }
    }

    fn method(&self) -> &'static str {
        match self {
            Route::CreateVpc => "POST",
            Route::GetVpc(_) | Route::ListVpcs => "GET",
            Route::UpdateVpc(_) => "PUT",
            Route::DeleteVpc(_) => "DELETE",
        }
    }
}

pub struct VpcApi<C, S> {
    connector: C,
    store: Arc<S>,
}

impl<C, S> VpcApi<C, S>
where
    C: NetworkConnector,
    S: VpcStore,
{
    pub fn new(connector: C, store: Arc<S>) -> Self {
        VpcApi {
            connector,
            store,
        }
    }

    pub async fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let route = match Route::parse(&request.path) {
            Some(route) => route,
            None => return ApiResponse::detail(404, "Not Found"),
        };
        if !request.method.eq_ignore_ascii_case(route.method()) {
            return ApiResponse::detail(405, "Method Not Allowed");
        }

        match route {
            Route::CreateVpc => self.create_vpc(request).await,
            Route::GetVpc(vpc_id) => self.get_vpc(vpc_id).await,
            Route::ListVpcs => self.list_vpcs().await,
            Route::UpdateVpc(vpc_id) => self.update_vpc(vpc_id, request).await,
            Route::DeleteVpc(vpc_id) => self.delete_vpc(vpc_id, request).await,
        }
    }

    fn manager(&self, region: &str) -> Result<VpcManager<C::Network, S>, VpcApiError> {
        let network = self.connector.connect(region)?;
        Ok(VpcManager::new(region, network, Arc::clone(&self.store)))
    }

    async fn create_vpc(&self, request: &ApiRequest) -> ApiResponse {
        let payload: CreateVpcRequest = match parse_body(&request.body) {
            Ok(payload) => payload,
            Err(response) => return response,
        };
        info!(
            "API: Create VPC | CIDR={}, subnets={}",
            payload.vpc_cidr, payload.subnet_count
        );

        let result = match self.manager(&payload.region) {
            Ok(manager) => manager.create_vpc(&payload).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(vpc) => ApiResponse::ok(&vpc),
            Err(VpcApiError::Validation(detail)) => ApiResponse::detail(422, detail),
            Err(e) => {
                error!("Error creating VPC: {}", e);
                ApiResponse::detail(500, "VPC creation failed; created resources were rolled back")
            }
        }
    }

    async fn get_vpc(&self, vpc_id: &str) -> ApiResponse {
        info!("API: Get VPC | {}", vpc_id);
        match vpc_manager::get_vpc(self.store.as_ref(), vpc_id).await {
            Ok(Some(vpc)) => ApiResponse::ok(&vpc),
            Ok(None) => ApiResponse::detail(404, "VPC not found"),
            Err(e) => {
                error!("Error fetching VPC {}: {}", vpc_id, e);
                ApiResponse::detail(500, "Internal server error while fetching VPC")
            }
        }
    }

    async fn list_vpcs(&self) -> ApiResponse {
        info!("API: List VPCs");
        match vpc_manager::list_vpcs(self.store.as_ref()).await {
            Ok(vpcs) => ApiResponse::ok(&vpcs),
            Err(e) => {
                error!("Error listing VPCs: {}", e);
                ApiResponse::detail(500, "Internal server error while listing VPCs")
            }
        }
    }

    async fn update_vpc(&self, vpc_id: &str, request: &ApiRequest) -> ApiResponse {
        let payload: UpdateVpcTagsRequest = match parse_body(&request.body) {
            Ok(payload) => payload,
            Err(response) => return response,
        };
        info!("API: Update VPC | {}", vpc_id);

        let result = match self.manager(&payload.region) {
            Ok(manager) => manager.update_vpc(vpc_id, payload.vpc_tags).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(updated) => ApiResponse::ok(&updated),
            Err(VpcApiError::Validation(detail)) => ApiResponse::detail(422, detail),
            Err(VpcApiError::NotFound(_)) => ApiResponse::detail(404, "VPC not found"),
            Err(e) => {
                error!("Error updating VPC {}: {}", vpc_id, e);
                ApiResponse::detail(500, "Internal server error while updating VPC")
            }
        }
    }

    async fn delete_vpc(&self, vpc_id: &str, request: &ApiRequest) -> ApiResponse {
        let region = match request.query.get("region").filter(|r| !r.is_empty()) {
            Some(region) => region,
            None => return ApiResponse::detail(422, "Missing query parameter: region"),
        };
        info!("API: Delete VPC | {}", vpc_id);

        let result = match self.manager(region) {
            Ok(manager) => manager.delete_vpc(vpc_id).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(deleted) => ApiResponse::ok(&deleted),
            Err(VpcApiError::Validation(detail)) => ApiResponse::detail(422, detail),
            Err(VpcApiError::NotFound(_)) => {
                ApiResponse::detail(404, "No VPC Found or Failed to delete VPC")
            }
            Err(e) => {
                error!("Error deleting VPC {}: {}", vpc_id, e);
                ApiResponse::detail(500, format!("Failed to delete VPC {}", vpc_id))
            }
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiResponse> {
    serde_json::from_slice(body)
        .map_err(|e| ApiResponse::detail(422, format!("Invalid request body: {}", e)))
}
