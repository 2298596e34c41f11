#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! A bridge relayer: follows both chains, checks the ingested events and
//! relays them to the other side.

use std::{net::SocketAddr, str::FromStr, sync::Arc};

use clap::Parser;
use envconfig::Envconfig;
use ethers::{
    abi::Abi,
    prelude::{NonceManagerMiddleware, SignerMiddleware},
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::Address,
};
use eyre::Result;
use sqlx::{postgres::PgConnectOptions, ConnectOptions, PgPool};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vise_exporter::MetricsExporter;

use checker::{Checker, CheckerConfig, CHECKER_METRICS};
use cli::{Args, Command};
use client::AbiContract;
use config::Config;
use relayer::{Relayer, RelayerConfig, RELAYER_METRICS};
use scheduler::{Scheduler, SCHEDULER_METRICS};
use storage::{metrics::STORAGE_METRICS, Chain, PgStore, RawEventStore};
use watcher::{ChainWatcher, EventFetcher, WatcherConfig, WATCHER_METRICS};

mod cli;
mod config;
mod error;

type Source = Arc<Provider<Http>>;
type Bridge = AbiContract<SignerMiddleware<Source, LocalWallet>>;

fn run_metrics_exporter(port: u16, cancel: CancellationToken) -> JoinHandle<()> {
    let exporter = MetricsExporter::default().with_graceful_shutdown(async move {
        cancel.cancelled().await;
    });
    let bind_address = SocketAddr::from(([0, 0, 0, 0], port));

    tokio::spawn(async move {
        if let Err(e) = exporter.start(bind_address).await {
            vlog::error!("metrics exporter failed: {e}");
        }
    })
}

/// A contract client on `source`'s chain sending transactions signed by `wallet`.
async fn bridge_contract(
    source: Source,
    address: Address,
    abi: Abi,
    wallet: LocalWallet,
    config: &Config,
) -> Result<Bridge> {
    let chain_id = source.get_chainid().await?.as_u64();
    let wallet = wallet.with_chain_id(chain_id);
    let sender = wallet.address();

    let client = NonceManagerMiddleware::new(SignerMiddleware::new(source, wallet), sender);
    client.initialize_nonce(None).await?;

    vlog::info!("sending transactions to bridge {address:?} on chain {chain_id} from {sender:?}");

    Ok(AbiContract::new(
        address,
        abi,
        Arc::new(client),
        config.tx_mining_timeout(),
        config.tx_retries,
    ))
}

fn watcher_config(config: &Config, chain: Chain) -> WatcherConfig {
    let (bridge_address, start_height, confirmations) = match chain {
        Chain::L1 => (
            config.l1_bridge_address,
            config.l1_start_height,
            config.l1_confirmations,
        ),
        Chain::L2 => (
            config.l2_bridge_address,
            config.l2_start_height,
            config.l2_confirmations,
        ),
    };

    WatcherConfig {
        chain,
        bridge_address,
        start_height,
        confirmations,
        reorg_safe_depth: config.reorg_safe_depth,
        batch_size: config.watcher_batch_size,
        poll_interval: config.watcher_poll_interval(),
    }
}

fn checker_config(config: &Config, chain: Chain) -> CheckerConfig {
    CheckerConfig {
        chain,
        start_height: match chain {
            Chain::L1 => config.l1_start_height,
            Chain::L2 => config.l2_start_height,
        },
        batch_size: config.checker_batch_size,
        poll_interval: config.checker_poll_interval(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let config = match args.config_path {
        Some(path) => Config::from_file(path)?,
        None => {
            dotenvy::dotenv().ok();
            Config::init_from_env()?
        }
    };

    let sentry_guard = vlog::init(&vlog::Networks {
        l1: config.l1_network.clone(),
        l2: config.l2_network.clone(),
    })?;

    if sentry_guard.is_some() {
        vlog::info!(
            "Starting Sentry, l1_network: {}, l2_network {}",
            config.l1_network,
            config.l2_network
        );
    } else {
        vlog::info!("No sentry url configured");
    }

    let options =
        PgConnectOptions::from_str(config.database_url.as_str())?.disable_statement_logging();
    let pgpool = PgPool::connect_with(options).await?;

    let store = Arc::new(PgStore::new(pgpool, &STORAGE_METRICS));
    store.migrate().await?;

    if let Some(Command::ResetFailed { chain, id }) = args.command {
        if store.reset_process_status(chain, id).await? {
            vlog::info!("{chain} event {id} is eligible for relaying again");
        } else {
            vlog::warn!("{chain} event {id} is not a failed event");
        }
        return Ok(());
    }

    let abi = match &config.bridge_abi_path {
        Some(path) => client::bridge_abi::load(path)?,
        None => client::bridge_abi::default_abi()?,
    };

    let l1_source: Source = Arc::new(Provider::<Http>::try_from(config.l1_rpc_url.as_str())?);
    let l2_source: Source = Arc::new(Provider::<Http>::try_from(config.l2_rpc_url.as_str())?);

    // Configuration errors are fatal before anything is started.
    let upward_signers = config.upward_signers()?;

    let l1_bridge = bridge_contract(
        l1_source.clone(),
        config.l1_bridge_address,
        abi.clone(),
        config.upward_relayer_wallet()?,
        &config,
    )
    .await?;
    let l2_bridge = bridge_contract(
        l2_source.clone(),
        config.l2_bridge_address,
        abi,
        config.downward_relayer_wallet()?,
        &config,
    )
    .await?;

    let mut watchers = vec![];
    let mut checkers = vec![];

    for (chain, source) in [(Chain::L1, &l1_source), (Chain::L2, &l2_source)] {
        let watcher_config = watcher_config(&config, chain);

        let fetcher = EventFetcher::new(
            source.clone(),
            chain,
            watcher_config.bridge_address,
            watcher_config.batch_size,
        )
        .await?;
        watchers.push(Arc::new(
            ChainWatcher::new(fetcher, store.clone(), watcher_config.clone(), &WATCHER_METRICS)
                .await?,
        ));

        let fetcher = EventFetcher::new(
            source.clone(),
            chain,
            watcher_config.bridge_address,
            watcher_config.batch_size,
        )
        .await?;
        checkers.push(Checker::new(
            fetcher,
            store.clone(),
            checker_config(&config, chain),
            &CHECKER_METRICS,
        ));
    }

    let relayer_config = RelayerConfig {
        batch_size: config.relayer_batch_size,
        max_process_attempts: config.relayer_max_process_attempts,
        poll_interval: config.relayer_poll_interval(),
    };
    let downward = Relayer::downward(
        l2_bridge,
        store.clone(),
        relayer_config.clone(),
        &RELAYER_METRICS,
    );
    let upward = Relayer::upward(
        l1_bridge,
        upward_signers,
        store.clone(),
        relayer_config,
        &RELAYER_METRICS,
    )?;

    let cancel = CancellationToken::new();
    let metrics_handle = run_metrics_exporter(config.metrics_port, cancel.clone());

    let scheduler = Scheduler::new(cancel.clone(), &SCHEDULER_METRICS);
    let mut handles = vec![];

    for watcher in &watchers {
        handles.push(scheduler.spawn(watcher.clone()));
    }
    for checker in checkers {
        handles.push(scheduler.spawn(checker));
    }
    handles.push(scheduler.spawn(downward));
    handles.push(scheduler.spawn(upward));

    tokio::signal::ctrl_c().await?;
    vlog::info!("Stopping, waiting for in-flight runs to finish");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            vlog::error!("task ended abnormally: {e}");
        }
    }

    for watcher in watchers {
        match Arc::try_unwrap(watcher) {
            Ok(watcher) => watcher.close(),
            Err(_) => vlog::warn!("watcher still in use on shutdown"),
        }
    }

    if let Err(e) = metrics_handle.await {
        vlog::error!("metrics exporter ended abnormally: {e}");
    }

    Ok(())
}
