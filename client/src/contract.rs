//! ABI-driven access to a deployed bridge contract.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use auto_impl::auto_impl;
use ethers::{
    abi::{Abi, Function, Token},
    prelude::NonceManagerMiddleware,
    providers::{Middleware, MiddlewareError},
    types::{transaction::eip2718::TypedTransaction, Address, TransactionReceipt, TransactionRequest, U64},
};

use crate::{metrics::CLIENT_METRICS, Error, Result};

/// Calls and transactions against a single contract, addressed by method name.
#[async_trait]
#[auto_impl(&, Arc, Box)]
pub trait ContractClient: Send + Sync {
    /// Address of the contract.
    fn address(&self) -> Address;

    /// Performs a read-only call and returns the decoded outputs.
    async fn call(&self, method: &str, args: Vec<Token>) -> Result<Vec<Token>>;

    /// Sends a transaction and waits for it to be mined successfully.
    async fn transact(&self, method: &str, args: Vec<Token>) -> Result<TransactionReceipt>;
}

/// A [`ContractClient`] encoding calls with a runtime [`Abi`] and submitting
/// transactions through a nonce-managed signing middleware.
#[derive(Debug)]
pub struct AbiContract<M: Middleware> {
    address: Address,
    abi: Abi,
    client: Arc<NonceManagerMiddleware<M>>,
    retry_timeout: Duration,
    retries: usize,
}

impl<M: Middleware> AbiContract<M> {
    /// Create a new `AbiContract`.
    ///
    /// # Arguments
    ///
    /// * `address`: Address of the deployed contract
    /// * `abi`: ABI to encode calls and decode results with
    /// * `client`: Middleware sending transactions, its nonce has to be initialized
    /// * `retry_timeout`: How long to wait for a transaction before resubmitting it
    /// * `retries`: How many times a transaction is submitted
    pub fn new(
        address: Address,
        abi: Abi,
        client: Arc<NonceManagerMiddleware<M>>,
        retry_timeout: Duration,
        retries: usize,
    ) -> Self {
        Self {
            address,
            abi,
            client,
            retry_timeout,
            retries,
        }
    }

    fn request(&self, function: &Function, args: &[Token]) -> Result<TypedTransaction> {
        let data = function.encode_input(args)?;

        Ok(TransactionRequest::new()
            .to(self.address)
            .data(data)
            .into())
    }
}

fn middleware_error<E: MiddlewareError>(method: &str, e: E) -> Error {
    match e.as_error_response() {
        Some(rpc) if rpc.message.contains("revert") => {
            CLIENT_METRICS.reverted.inc();
            Error::Reverted {
                method: method.to_string(),
                reason: rpc.message.clone(),
            }
        }
        _ => Error::Middleware(e.to_string()),
    }
}

#[async_trait]
impl<M> ContractClient for AbiContract<M>
where
    M: Middleware + 'static,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, method: &str, args: Vec<Token>) -> Result<Vec<Token>> {
        let latency = CLIENT_METRICS.call[&"contract_call"].start();

        let function = self.abi.function(method)?;
        let tx = self.request(function, &args)?;

        let output = self
            .client
            .call(&tx, None)
            .await
            .map_err(|e| middleware_error(method, e))?;

        latency.observe();

        Ok(function.decode_output(&output)?)
    }

    async fn transact(&self, method: &str, args: Vec<Token>) -> Result<TransactionReceipt> {
        let latency = CLIENT_METRICS.call[&"contract_transact"].start();

        let function = self.abi.function(method)?;
        let tx = self.request(function, &args)?;

        // Surface reverts with their reason before paying for them.
        self.client
            .call(&tx, None)
            .await
            .map_err(|e| middleware_error(method, e))?;

        let receipt = tx_sender::send_tx_adjust_gas(
            self.client.clone(),
            tx,
            self.retry_timeout,
            self.retries,
        )
        .await
        .map_err(|e| match e {
            tx_sender::Error::Timedout => Error::Timedout(method.to_string()),
            tx_sender::Error::ProviderError(e) => Error::ProviderError(e),
            tx_sender::Error::Middleware { e } => middleware_error(method, e),
        })?
        .ok_or_else(|| Error::MissingReceipt(method.to_string()))?;

        latency.observe();

        if receipt.status == Some(U64::zero()) {
            CLIENT_METRICS.reverted.inc();
            return Err(Error::TxFailed(receipt.transaction_hash));
        }

        tracing::debug!(
            "{method} mined in tx {:?} at block {:?}",
            receipt.transaction_hash,
            receipt.block_number
        );

        Ok(receipt)
    }
}
