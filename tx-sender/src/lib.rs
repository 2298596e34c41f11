#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! Relay transaction submission that bumps fees on every retry.

use std::{sync::Arc, time::Duration};

use ethers::{
    prelude::NonceManagerMiddleware,
    providers::Middleware,
    types::{
        transaction::eip2718::TypedTransaction, Eip2930TransactionRequest, TransactionReceipt, U256,
    },
};

mod error;
mod metrics;

pub use error::{Error, Result};

use metrics::TX_SENDER_METRICS;

const RETRY_BUMP_FEES_PERCENT: u8 = 15;

fn bump_predicted_fees(tx: &mut TypedTransaction, percent: u8) {
    match tx {
        TypedTransaction::Legacy(ref mut tx)
        | TypedTransaction::Eip2930(Eip2930TransactionRequest { ref mut tx, .. }) => {
            if let Some(gas_price) = tx.gas_price.as_mut() {
                *gas_price = *gas_price + inc_u256_percent(*gas_price, percent);
            }
        }
        TypedTransaction::Eip1559(ref mut tx) => {
            let mut bump = U256::zero();
            if let Some(priority_fee) = tx.max_priority_fee_per_gas.as_mut() {
                bump = inc_u256_percent(*priority_fee, percent);
                *priority_fee = *priority_fee + bump;
            }

            if let Some(max_fee) = tx.max_fee_per_gas.as_mut() {
                *max_fee += bump;
            }
        }
    }
}

fn inc_u256_percent(num: U256, percent: u8) -> U256 {
    num.saturating_mul(percent.into()) / 100
}

/// Send a transaction, resubmitting it with the same nonce and higher fees
/// until it is mined.
///
/// # Arguments
///
/// * `m`: [`Middleware`] to perform request with
/// * `tx`: Transaction to be sent
/// * `retry_timeout`: A period after which to retry transaction.
/// * `retries`: Amount of submissions to perform.
pub async fn send_tx_adjust_gas<M, T>(
    m: Arc<NonceManagerMiddleware<M>>,
    tx: T,
    retry_timeout: Duration,
    retries: usize,
) -> Result<Option<TransactionReceipt>, M>
where
    M: Middleware,
    T: Into<TypedTransaction> + Send + Sync + Clone,
{
    let nonce = m.next();

    for retry_num in 0..retries {
        let mut submit_tx = tx.clone().into();

        if let Err(e) = m.fill_transaction(&mut submit_tx, None).await {
            // Nothing with this nonce reached the mempool yet, hand it back.
            if retry_num == 0 {
                m.initialize_nonce(None).await?;
            }
            return Err(e.into());
        }

        submit_tx.set_nonce(nonce);

        if retry_num > 0 {
            bump_predicted_fees(
                &mut submit_tx,
                (retry_num as u8).saturating_mul(RETRY_BUMP_FEES_PERCENT),
            );
        }

        let sent_tx = m.send_transaction(submit_tx, None).await?;
        TX_SENDER_METRICS.sent_transactions.inc();

        let tx_hash = sent_tx.tx_hash();

        match tokio::time::timeout(retry_timeout, sent_tx).await {
            Ok(res) => {
                return Ok(res?);
            }
            Err(_e) => {
                TX_SENDER_METRICS.timedout_transactions.inc();
                tracing::info!("waiting for mined transaction {tx_hash:?} timed out");
            }
        }
    }

    TX_SENDER_METRICS.abandoned_transactions.inc();
    Err(Error::Timedout)
}
