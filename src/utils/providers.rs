use alloy::network::Ethereum;
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use eyre::{Error, Result};

/// Creates a WebSocket provider for block subscriptions, contract reads and
/// receipt polling.
///
/// Only the root provider is kept: every transaction we send is signed
/// locally and goes to the relay, never through the provider's fillers.
///
/// # Errors
/// * If the WebSocket connection cannot be established
pub async fn create_ws_provider(ws_url: &str) -> Result<RootProvider<Ethereum>, Error> {
    let ws = WsConnect::new(ws_url);
    let provider = ProviderBuilder::new().on_ws(ws).await?;
    Ok((*provider.root()).clone())
}
