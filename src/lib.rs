pub mod api;
pub mod cidr;
pub mod config;
pub mod dynamo_vpc_store;
pub mod ec2_network_client;
pub mod error;
pub mod logging;
pub mod model;
pub mod secret_hash;
pub mod vpc_manager;

#[cfg(test)]
mod testing;
