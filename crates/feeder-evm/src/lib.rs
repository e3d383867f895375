//! EVM-backed registries for the relay.
//!
//! - [`EvmSource`]: `latestRoundData()` on the source chain's feed contracts.
//! - [`EvmTarget`]: `getRoundData(uint80)` on the target chain's aggregators.
//! - [`EvmWriter`]: `transmit(uint80,int192,uint64)` signed with the relay key.
//!
//! Pairs are resolved to contract addresses through the shared [`FeedTable`].
//! Deadlines are owned by the reconciliation engine, not by these adapters.

use std::sync::Arc;

use alloy::{
    contract::Error as ContractError,
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, ReceiptResponse},
    primitives::{aliases::U80, Address},
    providers::{
        fillers::{
            ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, SimpleNonceManager,
            WalletFiller,
        },
        DynProvider, Identity, PendingTransactionBuilder, Provider, ProviderBuilder,
        RootProvider,
    },
    signers::local::PrivateKeySigner,
    sol,
    transports::TransportError,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use feeder_config::{FeedTable, NetworkConfig};
use feeder_registry::{
    Confirmation, PreparedWrite, RegistryError, SourceRegistry, TargetRegistry, TargetWriter,
};
use feeder_schemas::{Observation, Pair, Submission, TxHandle};
use tracing::{debug, info, warn};

mod convert;

use convert::{observation_from_round_data, transmit_args, RoundData};

sol! {
    /// Subset of the Chainlink-style aggregator interface used by the relay.
    #[sol(rpc)]
    interface IPriceAggregator {
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
        function getRoundData(uint80 _roundId) external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
        function transmit(uint80 _roundId, int192 _answer, uint64 _timestamp) external;
    }
}

/// Transport failures become `Transport`; a contract revert or an undecodable
/// answer becomes `Decode`.
fn read_error(pair: &Pair, err: ContractError) -> RegistryError {
    match err {
        ContractError::TransportError(e) => RegistryError::Transport(format!("{pair}: {e}")),
        other => RegistryError::Decode(format!("{pair}: {other}")),
    }
}

/// The node answered with an execution revert. Some nodes omit the revert
/// data, so only the message is checked.
fn is_revert(err: &TransportError) -> bool {
    err.as_error_resp()
        .is_some_and(|p| p.message.contains("revert"))
}

fn parse_rpc_url(net: &NetworkConfig) -> Result<alloy::transports::http::reqwest::Url> {
    net.rpc_url
        .parse()
        .with_context(|| format!("invalid rpc_url for network '{}'", net.name))
}

/// Fail if the endpoint reports a chain id other than the configured one.
///
/// An unreachable endpoint is only logged here; the per-pair calls report it.
async fn verify_chain_id<P: Provider>(provider: &P, net: &NetworkConfig) -> Result<()> {
    let Some(expected) = net.chain_id else {
        return Ok(());
    };
    let got = match provider.get_chain_id().await {
        Ok(id) => id,
        Err(e) => {
            warn!(network = %net.name, error = %e, "eth_chainId failed; chain id not verified");
            return Ok(());
        }
    };
    if got != expected {
        bail!(
            "CHAIN_ID_MISMATCH network={} expected={} got={}",
            net.name,
            expected,
            got
        );
    }
    Ok(())
}

fn read_provider(network: &NetworkConfig) -> Result<DynProvider> {
    Ok(ProviderBuilder::new()
        .connect_http(parse_rpc_url(network)?)
        .erased())
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct EvmSource {
    network: NetworkConfig,
    provider: DynProvider,
    feeds: Arc<FeedTable>,
}

impl EvmSource {
    pub fn connect(network: &NetworkConfig, feeds: Arc<FeedTable>) -> Result<Self> {
        Ok(Self::with_provider(network, read_provider(network)?, feeds))
    }

    fn with_provider(network: &NetworkConfig, provider: DynProvider, feeds: Arc<FeedTable>) -> Self {
        Self {
            network: network.clone(),
            provider,
            feeds,
        }
    }

    pub async fn verify_chain_id(&self) -> Result<()> {
        verify_chain_id(&self.provider, &self.network).await
    }
}

#[async_trait]
impl SourceRegistry for EvmSource {
    async fn latest(&self, pair: &Pair) -> Result<Observation, RegistryError> {
        let address = self
            .feeds
            .source_address(pair)
            .ok_or_else(|| RegistryError::UnknownPair(pair.clone()))?;
        let feed = IPriceAggregator::new(address, self.provider.clone());
        let r = feed
            .latestRoundData()
            .call()
            .await
            .map_err(|e| read_error(pair, e))?;
        debug!(%pair, %address, round_id = %r.roundId, answer = %r.answer, "source latestRoundData");
        observation_from_round_data(RoundData {
            round_id: r.roundId,
            answer: r.answer,
            started_at: r.startedAt,
            updated_at: r.updatedAt,
            answered_in_round: r.answeredInRound,
        })
    }
}

// ---------------------------------------------------------------------------
// Target reader
// ---------------------------------------------------------------------------

pub struct EvmTarget {
    network: NetworkConfig,
    provider: DynProvider,
    feeds: Arc<FeedTable>,
}

impl EvmTarget {
    pub fn connect(network: &NetworkConfig, feeds: Arc<FeedTable>) -> Result<Self> {
        Ok(Self::with_provider(network, read_provider(network)?, feeds))
    }

    fn with_provider(network: &NetworkConfig, provider: DynProvider, feeds: Arc<FeedTable>) -> Self {
        Self {
            network: network.clone(),
            provider,
            feeds,
        }
    }

    pub async fn verify_chain_id(&self) -> Result<()> {
        verify_chain_id(&self.provider, &self.network).await
    }
}

#[async_trait]
impl TargetRegistry for EvmTarget {
    async fn at_round(
        &self,
        pair: &Pair,
        round_id: u64,
    ) -> Result<Option<Observation>, RegistryError> {
        let address = self
            .feeds
            .target_address(pair)
            .ok_or_else(|| RegistryError::UnknownPair(pair.clone()))?;
        let aggregator = IPriceAggregator::new(address, self.provider.clone());

        match aggregator.getRoundData(U80::from(round_id)).call().await {
            Ok(r) => observation_from_round_data(RoundData {
                round_id: r.roundId,
                answer: r.answer,
                started_at: r.startedAt,
                updated_at: r.updatedAt,
                answered_in_round: r.answeredInRound,
            })
            .map(Some),
            // The aggregator reverts for rounds it never recorded.
            Err(ContractError::TransportError(ref e)) if is_revert(e) => {
                debug!(%pair, round_id, "getRoundData reverted: round not recorded");
                Ok(None)
            }
            Err(e) => Err(read_error(pair, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

type WalletFillers = JoinFill<
    JoinFill<
        JoinFill<JoinFill<Identity, GasFiller>, NonceFiller<SimpleNonceManager>>,
        ChainIdFiller,
    >,
    WalletFiller<EthereumWallet>,
>;

type WalletProvider = FillProvider<WalletFillers, RootProvider>;

/// Gas, nonce and chain id are filled from the node, then the wallet signs.
///
/// The nonce is read from the pending pool for every write, so a write that
/// was signed but never broadcast leaves no gap.
fn wallet_builder(
    network: &NetworkConfig,
    signer: PrivateKeySigner,
) -> ProviderBuilder<Identity, WalletFillers> {
    let builder = ProviderBuilder::new()
        .disable_recommended_fillers()
        .with_gas_estimation()
        .with_simple_nonce_management();
    let builder = match network.chain_id {
        Some(id) => builder.with_chain_id(id),
        None => builder.fetch_chain_id(),
    };
    builder.wallet(EthereumWallet::from(signer))
}

fn parse_signer(signer_key: &str) -> Result<PrivateKeySigner> {
    signer_key
        .trim()
        .parse()
        .context("SIGNER_INVALID: signer key is not a valid hex private key")
}

/// Authenticated writer session. One instance is reused for every pair in a
/// run; writes from it are expected to go out one at a time.
pub struct EvmWriter {
    network: NetworkConfig,
    provider: WalletProvider,
    feeds: Arc<FeedTable>,
    sender: Address,
    confirmations: u64,
}

impl EvmWriter {
    /// `signer_key` is the hex private key; it is consumed here and not kept
    /// anywhere except inside the wallet.
    pub fn connect(
        network: &NetworkConfig,
        feeds: Arc<FeedTable>,
        signer_key: &str,
        confirmations: u64,
    ) -> Result<Self> {
        let signer = parse_signer(signer_key)?;
        let sender = signer.address();
        let provider = wallet_builder(network, signer).connect_http(parse_rpc_url(network)?);
        info!(network = %network.name, %sender, "writer session ready");
        Ok(Self {
            network: network.clone(),
            provider,
            feeds,
            sender,
            confirmations: confirmations.max(1),
        })
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub async fn verify_chain_id(&self) -> Result<()> {
        verify_chain_id(&self.provider, &self.network).await
    }
}

#[async_trait]
impl TargetWriter for EvmWriter {
    async fn prepare(
        &self,
        pair: &Pair,
        submission: &Submission,
    ) -> Result<PreparedWrite, RegistryError> {
        let address = self
            .feeds
            .target_address(pair)
            .ok_or_else(|| RegistryError::UnknownPair(pair.clone()))?;
        let (round_id, answer, timestamp) = transmit_args(submission)?;
        let request = IPriceAggregator::new(address, &self.provider)
            .transmit(round_id, answer, timestamp)
            .into_transaction_request();

        // Estimation executes the call, so a reverting transmit is refused here.
        let filled = self.provider.fill(request).await.map_err(|e| {
            if e.as_error_resp().is_some() {
                RegistryError::Rejected(format!("{pair}: {e}"))
            } else {
                RegistryError::Transport(format!("{pair}: {e}"))
            }
        })?;
        let envelope = filled
            .try_into_envelope()
            .map_err(|_| RegistryError::Decode(format!("{pair}: filled transmit is unsigned")))?;
        Ok(PreparedWrite {
            handle: TxHandle(*envelope.tx_hash()),
            raw: envelope.encoded_2718(),
        })
    }

    async fn broadcast(&self, write: &PreparedWrite) -> Result<(), RegistryError> {
        match self.provider.send_raw_transaction(&write.raw).await {
            Ok(_) => Ok(()),
            Err(e) => match e.as_error_resp() {
                Some(p) if p.message.contains("already known") => {
                    debug!(tx = %write.handle, "transaction already in the pool");
                    Ok(())
                }
                Some(_) => Err(RegistryError::Rejected(format!("tx {}: {e}", write.handle))),
                None => Err(RegistryError::Transport(format!("tx {}: {e}", write.handle))),
            },
        }
    }

    async fn confirm(&self, handle: &TxHandle) -> Result<Confirmation, RegistryError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), handle.0)
            .with_required_confirmations(self.confirmations)
            .get_receipt()
            .await
            .map_err(|e| RegistryError::Transport(format!("tx {handle}: {e}")))?;

        let block_number = ReceiptResponse::block_number(&receipt);
        if ReceiptResponse::status(&receipt) {
            Ok(Confirmation::Included { block_number })
        } else {
            Ok(Confirmation::Reverted { block_number })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        primitives::{Bytes, B256, I256, U256},
        providers::mock::Asserter,
        rpc::json_rpc::ErrorPayload,
        sol_types::SolCall,
        transports::TransportErrorKind,
    };
    use feeder_config::FeedRoute;

    // Well-known development key (anvil account 0).
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    // Error(string) selector; enough for the node to report revert data.
    const REVERT_DATA: &str = "0x08c379a0";

    fn net(url: &str) -> NetworkConfig {
        NetworkConfig {
            name: "local".to_string(),
            chain_id: Some(31337),
            rpc_url: url.to_string(),
        }
    }

    fn source_only() -> Arc<FeedTable> {
        Arc::new(
            FeedTable::new(vec![FeedRoute::new(
                "ETH-USD",
                Some(Address::repeat_byte(0x5f)),
                None,
            )])
            .unwrap(),
        )
    }

    fn routed() -> Arc<FeedTable> {
        Arc::new(
            FeedTable::new(vec![FeedRoute::new(
                "ETH-USD",
                Some(Address::repeat_byte(0x5f)),
                Some(Address::repeat_byte(0x73)),
            )])
            .unwrap(),
        )
    }

    fn mocked_target(asserter: &Asserter) -> EvmTarget {
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        EvmTarget::with_provider(&net("http://mock"), provider, routed())
    }

    fn mocked_writer(asserter: &Asserter) -> EvmWriter {
        let signer = parse_signer(DEV_KEY).unwrap();
        let sender = signer.address();
        EvmWriter {
            network: net("http://mock"),
            provider: wallet_builder(&net("http://mock"), signer)
                .connect_mocked_client(asserter.clone()),
            feeds: routed(),
            sender,
            confirmations: 1,
        }
    }

    fn rpc_error(code: i64, message: &'static str, data: Option<&str>) -> ErrorPayload {
        ErrorPayload {
            code,
            message: message.into(),
            data: data.map(|d| serde_json::value::to_raw_value(d).unwrap()),
        }
    }

    fn eth() -> Pair {
        Pair::from("ETH-USD")
    }

    fn submission() -> Submission {
        Submission {
            round_id: 42,
            value: I256::try_from(300_000_000_000i64).unwrap(),
            started_at: 1_000,
        }
    }

    #[test]
    fn transport_failures_stay_transport() {
        let e = ContractError::TransportError(TransportErrorKind::custom_str("connection refused"));
        let mapped = read_error(&eth(), e);
        assert!(mapped.is_transport(), "{mapped}");
        assert!(mapped.to_string().contains("ETH-USD"));
    }

    #[tokio::test]
    async fn recorded_round_is_decoded() {
        let asserter = Asserter::new();
        let ret = IPriceAggregator::getRoundDataReturn {
            roundId: U80::from(42u64),
            answer: I256::try_from(300_000_000_000i64).unwrap(),
            startedAt: U256::from(1_000u64),
            updatedAt: U256::from(1_012u64),
            answeredInRound: U80::from(42u64),
        };
        asserter.push_success(&Bytes::from(
            IPriceAggregator::getRoundDataCall::abi_encode_returns(&ret),
        ));

        let got = mocked_target(&asserter)
            .at_round(&eth(), 42)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.round_id, 42);
        assert_eq!(got.value, submission().value);
        assert_eq!(got.started_at, 1_000);
    }

    #[tokio::test]
    async fn revert_with_data_means_round_absent() {
        let asserter = Asserter::new();
        asserter.push_failure(rpc_error(
            3,
            "execution reverted: No data present",
            Some(REVERT_DATA),
        ));
        assert_eq!(mocked_target(&asserter).at_round(&eth(), 7).await, Ok(None));
    }

    #[tokio::test]
    async fn revert_without_data_means_round_absent() {
        let asserter = Asserter::new();
        asserter.push_failure(rpc_error(-32603, "execution reverted", None));
        assert_eq!(mocked_target(&asserter).at_round(&eth(), 7).await, Ok(None));
    }

    #[tokio::test]
    async fn other_node_errors_are_transport() {
        let asserter = Asserter::new();
        asserter.push_failure(rpc_error(-32005, "limit exceeded", None));
        let err = mocked_target(&asserter).at_round(&eth(), 7).await.unwrap_err();
        assert!(err.is_transport(), "{err}");

        // Nothing queued: the mock fails the request itself.
        let err = mocked_target(&Asserter::new())
            .at_round(&eth(), 7)
            .await
            .unwrap_err();
        assert!(err.is_transport(), "{err}");
    }

    #[tokio::test]
    async fn empty_return_data_is_a_decode_error() {
        let asserter = Asserter::new();
        asserter.push_success(&Bytes::new());
        let err = mocked_target(&asserter).at_round(&eth(), 7).await.unwrap_err();
        assert!(
            matches!(err, RegistryError::Decode(ref m) if m.contains("ETH-USD")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn reverting_transmit_is_rejected_before_broadcast() {
        let asserter = Asserter::new();
        // Whichever fill request goes out first sees the revert.
        for _ in 0..8 {
            asserter.push_failure(rpc_error(
                3,
                "execution reverted: not authorized",
                Some(REVERT_DATA),
            ));
        }
        let err = mocked_writer(&asserter)
            .prepare(&eth(), &submission())
            .await
            .unwrap_err();
        assert!(
            matches!(err, RegistryError::Rejected(ref m) if m.contains("ETH-USD")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn unreachable_node_during_prepare_is_transport() {
        let err = mocked_writer(&Asserter::new())
            .prepare(&eth(), &submission())
            .await
            .unwrap_err();
        assert!(err.is_transport(), "{err}");
    }

    #[tokio::test]
    async fn prepare_needs_a_target_address() {
        let mut writer = mocked_writer(&Asserter::new());
        writer.feeds = source_only();
        let err = writer.prepare(&eth(), &submission()).await.unwrap_err();
        assert_eq!(err, RegistryError::UnknownPair(eth()));
    }

    #[tokio::test]
    async fn broadcast_outcomes() {
        let write = PreparedWrite {
            handle: TxHandle(B256::repeat_byte(0xab)),
            raw: vec![0x02, 0xf8],
        };

        let asserter = Asserter::new();
        asserter.push_success(&write.handle.0);
        asserter.push_failure(rpc_error(-32000, "already known", None));
        asserter.push_failure(rpc_error(-32000, "nonce too low", None));
        let writer = mocked_writer(&asserter);

        assert_eq!(writer.broadcast(&write).await, Ok(()));
        assert_eq!(writer.broadcast(&write).await, Ok(()));
        assert!(matches!(
            writer.broadcast(&write).await,
            Err(RegistryError::Rejected(ref m)) if m.contains("nonce too low")
        ));
        // Queue exhausted: the write's fate is unknown.
        assert!(writer.broadcast(&write).await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn writer_derives_sender_from_key() {
        let w =
            EvmWriter::connect(&net("http://127.0.0.1:8545"), source_only(), DEV_KEY, 0).unwrap();
        assert_eq!(
            w.sender(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(w.confirmations, 1, "depth is at least one block");
    }

    #[tokio::test]
    async fn malformed_key_is_refused_without_echoing_it() {
        let err = EvmWriter::connect(
            &net("http://127.0.0.1:8545"),
            source_only(),
            "0xnot-a-key",
            1,
        )
        .err()
        .unwrap();
        let msg = format!("{err:#}");
        assert!(msg.contains("SIGNER_INVALID"), "{msg}");
        assert!(!msg.contains("not-a-key"), "{msg}");
    }

    #[tokio::test]
    async fn malformed_rpc_url_is_a_config_error() {
        let err = EvmSource::connect(&net("not a url"), source_only())
            .err()
            .unwrap();
        assert!(err.to_string().contains("rpc_url"), "{err}");
    }

    #[tokio::test]
    async fn pairs_without_addresses_are_unknown_before_any_request() {
        // An empty mock queue would turn any request into a transport error.
        let provider = ProviderBuilder::new()
            .connect_mocked_client(Asserter::new())
            .erased();
        let target = EvmTarget::with_provider(&net("http://mock"), provider.clone(), source_only());
        let err = target.at_round(&eth(), 1).await.unwrap_err();
        assert_eq!(err, RegistryError::UnknownPair(eth()));

        let source = EvmSource::with_provider(&net("http://mock"), provider, source_only());
        let err = source.latest(&Pair::from("BTC-USD")).await.unwrap_err();
        assert_eq!(err, RegistryError::UnknownPair(Pair::from("BTC-USD")));
    }
}
