use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rusoto_cognito_idp::{CognitoIdentityProvider, CognitoIdentityProviderClient, InitiateAuthRequest};
use rusoto_core::Region;
use std::collections::HashMap;
use std::str::FromStr;

use vpc_crud_api::secret_hash::secret_hash;

/// Fetches Cognito tokens for calling the VPC API.
#[derive(Parser, Debug)]
#[command(name = "get-token")]
struct Args {
    /// Cognito app client ID
    #[arg(long, env = "CLIENT_ID")]
    client_id: String,

    /// Cognito app client secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    #[arg(long, env = "USER_NAME")]
    username: String,

    #[arg(long, env = "USER_PASSWD", hide_env_values = true)]
    password: String,

    #[arg(long, default_value = "us-east-1")]
    region: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let region = Region::from_str(&args.region)
        .with_context(|| format!("unknown region {}", args.region))?;
    let client = CognitoIdentityProviderClient::new(region);

    let mut auth_parameters = HashMap::new();
    auth_parameters.insert("USERNAME".to_string(), args.username.clone());
    auth_parameters.insert("PASSWORD".to_string(), args.password.clone());
    auth_parameters.insert(
        "SECRET_HASH".to_string(),
        secret_hash(&args.username, &args.client_id, &args.client_secret),
    );

    let response = client
        .initiate_auth(InitiateAuthRequest {
            auth_flow: "USER_PASSWORD_AUTH".to_string(),
            client_id: args.client_id.clone(),
            auth_parameters: Some(auth_parameters),
            ..Default::default()
        })
        .await
        .context("InitiateAuth failed")?;

    let result = response
        .authentication_result
        .ok_or_else(|| anyhow!("Cognito returned a challenge instead of tokens"))?;
    println!("Access Token: {}", result.access_token.unwrap_or_default());
    println!("ID Token: {}", result.id_token.unwrap_or_default());
    println!("Refresh Token: {}", result.refresh_token.unwrap_or_default());
    Ok(())
}
