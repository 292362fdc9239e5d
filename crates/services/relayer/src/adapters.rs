//! The chain ports over the JSON-RPC client

use crate::ports::{
    BroadcastError,
    SourceChain,
    TargetChain,
};
use async_trait::async_trait;
use lightbridge_client::{
    RobustClient,
    RpcError,
    Transport,
};
use lightbridge_types::{
    BlockHeight,
    Bytes32,
    EpochId,
    blockchain::{
        header::BlockHeader,
        validators::ValidatorSet,
    },
    entities::{
        SignedTransaction,
        TransactionReceipt,
    },
};

#[async_trait]
impl<T> SourceChain for RobustClient<T>
where
    T: Transport,
{
    async fn latest_height(&self) -> Result<BlockHeight, RpcError> {
        RobustClient::latest_height(self).await
    }

    async fn header(&self, height: BlockHeight) -> Result<BlockHeader, RpcError> {
        RobustClient::header(self, height).await
    }

    async fn validator_set(&self, epoch: EpochId) -> Result<ValidatorSet, RpcError> {
        RobustClient::validator_set(self, epoch).await
    }
}

#[async_trait]
impl<T> TargetChain for RobustClient<T>
where
    T: Transport,
{
    async fn sequence(&self, identity: &str) -> Result<u64, RpcError> {
        RobustClient::sequence(self, identity).await
    }

    async fn estimate_fee(&self, payload_len: u64) -> Result<u128, RpcError> {
        RobustClient::estimate_fee(self, payload_len).await
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<Bytes32, BroadcastError> {
        self.broadcast_transaction(&tx.raw)
            .await
            .map_err(classify_broadcast_error)
    }

    async fn receipt(
        &self,
        tx_hash: &Bytes32,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        RobustClient::receipt(self, tx_hash).await
    }

    async fn light_client_head(&self) -> Result<Option<BlockHeight>, RpcError> {
        RobustClient::light_client_head(self).await
    }

    async fn is_known_header(&self, hash: &Bytes32) -> Result<bool, RpcError> {
        RobustClient::is_known_header(self, hash).await
    }
}

/// Sorts the rejections of a broadcast into sequence conflicts and the rest.
fn classify_broadcast_error(err: RpcError) -> BroadcastError {
    const SEQUENCE_MARKERS: [&str; 5] = [
        "nonce",
        "sequence",
        "already known",
        "already imported",
        "known transaction",
    ];

    match err {
        RpcError::Rejected { message, .. } => {
            let lowercase = message.to_lowercase();
            if SEQUENCE_MARKERS
                .iter()
                .any(|marker| lowercase.contains(marker))
            {
                BroadcastError::SequenceConflict(message)
            } else {
                BroadcastError::Rejected(message)
            }
        }
        RpcError::InvalidRequest(message) => BroadcastError::Rejected(message),
        err => BroadcastError::Rpc(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightbridge_client::{
        MockTransport,
        RpcConfig,
    };
    use serde_json::json;
    use test_case::test_case;

    fn rejected(message: &str) -> RpcError {
        RpcError::Rejected {
            code: -32000,
            message: message.to_string(),
        }
    }

    #[test_case(rejected("Invalid nonce: expected 5") => BroadcastError::SequenceConflict("Invalid nonce: expected 5".into()))]
    #[test_case(rejected("account sequence mismatch") => BroadcastError::SequenceConflict("account sequence mismatch".into()))]
    #[test_case(rejected("transaction already imported") => BroadcastError::SequenceConflict("transaction already imported".into()))]
    #[test_case(rejected("insufficient fee") => BroadcastError::Rejected("insufficient fee".into()))]
    #[test_case(RpcError::InvalidRequest("bad params".into()) => BroadcastError::Rejected("bad params".into()))]
    #[test_case(RpcError::RateLimited => BroadcastError::Rpc(RpcError::RateLimited))]
    fn broadcast_errors(err: RpcError) -> BroadcastError {
        classify_broadcast_error(err)
    }

    #[tokio::test]
    async fn broadcast_sends_the_raw_transaction_as_hex() {
        let tx = SignedTransaction {
            hash: Bytes32::new([9; 32]),
            raw: vec![0xde, 0xad],
        };
        let mut transport = MockTransport::default();
        transport
            .expect_request()
            .withf(|_, method, params| {
                method == "tx_broadcast" && params == &json!(["0xdead"])
            })
            .times(1)
            .returning(|_, _, _| Ok(json!(Bytes32::new([9; 32]))));
        let config = RpcConfig::with_urls(vec!["http://target.local".parse().unwrap()]);
        let client = RobustClient::with_transport(config, transport).unwrap();

        assert_eq!(TargetChain::broadcast(&client, &tx).await, Ok(tx.hash));
    }
}
