use lamedh_http::{
    handler,
    lambda::{self, Context, Error},
    Handler, Request, RequestExt, Response,
};
use aws_lambda_events::encodings::Body;
use rusoto_core::Region;
use rusoto_dynamodb::DynamoDbClient;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use vpc_crud_api::api::{ApiRequest, VpcApi};
use vpc_crud_api::config::Config;
use vpc_crud_api::dynamo_vpc_store::DynamoVpcStore;
use vpc_crud_api::ec2_network_client::Ec2Connector;
use vpc_crud_api::logging::init_tracing;

type Api = VpcApi<Ec2Connector, DynamoVpcStore>;

struct VpcHttpHandler {
    api: Arc<Api>,
}

impl Handler for VpcHttpHandler {
    type Response = Response<Body>;
    type Error = Error;
    type Fut = Pin<Box<dyn Future<Output = Result<Self::Response, Error>> + Send + 'static>>;

    fn call(&mut self, request: Request, _: Context) -> Self::Fut {
        let api = Arc::clone(&self.api);
        Box::pin(handle_request(request, api))
    }
}

async fn handle_request(request: Request, api: Arc<Api>) -> Result<Response<Body>, Error> {
    let query: HashMap<String, String> = request
        .query_string_parameters()
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let api_request = ApiRequest {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        query,
        body: request.body().as_ref().to_vec(),
    };

    let response = api.handle(&api_request).await;
    let body = serde_json::to_string(&response.body)?;
    Ok(Response::builder()
        .status(response.status)
        .header("content-type", "application/json")
        .body(Body::from(body))?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let region = Region::from_str(&config.db_region)?;
    let store = DynamoVpcStore::new_with_client(
        DynamoDbClient::new(region),
        &config.table_name,
        &config.db_region,
    );
    let api = VpcApi::new(Ec2Connector, Arc::new(store));

    lambda::run(handler(VpcHttpHandler { api: Arc::new(api) })).await
}
