//! Integration tests for the HTTP state client
//!
//! This test validates:
//! - Typed decoding of records, balances, proofs and block references
//! - Record paging, frozen record filtering and the page cap
//! - Confirmation polling: confirmed, failed, expired and timed out
//! - HTTP 429 backoff and exhaustion
//! - Mapping of HTTP and JSON-RPC failures to client errors

use compressed_token_builder::addresses::{DEFAULT_NULLIFIER_QUEUE, DEFAULT_STATE_TREE};
use compressed_token_builder::metrics::metrics;
use compressed_token_builder::selection::select_for_amount;
use compressed_token_builder::state_client::{
    CompressedStateClient, PhotonClient, PhotonClientConfig, RetryPolicy, StateClientError,
};
use compressed_token_builder::types::{BlockReference, RecordHash};
use mockito::{Matcher, Server};
use serde_json::json;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature};
use std::time::Duration;

fn client_for(server: &Server, retry: RetryPolicy) -> PhotonClient {
    let mut config = PhotonClientConfig::new(server.url());
    config.rate_limit_rps = 1_000;
    config.retry = retry;
    PhotonClient::new(config).unwrap()
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter_factor: 0.0,
        multiplier: 1.0,
    }
}

fn method(name: &str) -> Matcher {
    Matcher::PartialJson(json!({ "method": name }))
}

fn rpc_result(value: serde_json::Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": value }).to_string()
}

fn token_item(hash: u8, owner: &Pubkey, mint: &Pubkey, amount: u64, state: &str) -> serde_json::Value {
    json!({
        "account": {
            "hash": RecordHash([hash; 32]).to_base58(),
            "lamports": 0,
            "leafIndex": u32::from(hash),
            "owner": "cTokenmWW8bLPjZEBAUgYy3zKxQZW6VKi7bqNFEVv3m",
            "tree": DEFAULT_STATE_TREE.to_string(),
        },
        "tokenData": {
            "mint": mint.to_string(),
            "owner": owner.to_string(),
            "amount": amount,
            "state": state,
        }
    })
}

fn records_page(items: Vec<serde_json::Value>, cursor: Option<&str>) -> String {
    rpc_result(json!({
        "context": { "slot": 5 },
        "value": { "items": items, "cursor": cursor }
    }))
}

fn records_for_cursor(cursor: &str) -> Matcher {
    Matcher::PartialJson(json!({
        "method": "getCompressedTokenAccountsByOwner",
        "params": { "cursor": cursor }
    }))
}

fn confirm_client(server: &Server, timeout: Duration) -> PhotonClient {
    let mut config = PhotonClientConfig::new(server.url());
    config.rate_limit_rps = 1_000;
    config.retry = RetryPolicy::none();
    config.confirm_timeout = timeout;
    config.confirm_poll_interval = Duration::from_millis(5);
    PhotonClient::new(config).unwrap()
}

fn block_reference() -> BlockReference {
    BlockReference {
        slot: 10,
        blockhash: Hash::new_from_array([7u8; 32]),
        last_valid_block_height: 200,
    }
}

fn statuses(value: serde_json::Value) -> String {
    rpc_result(json!({ "context": { "slot": 12 }, "value": [value] }))
}

#[tokio::test]
async fn test_records_are_decoded_with_known_queue() {
    let mut server = Server::new_async().await;
    let owner = Pubkey::new_unique();
    let mint = Pubkey::new_unique();
    let hash = RecordHash([9u8; 32]);

    let mock = server
        .mock("POST", "/")
        .match_body(method("getCompressedTokenAccountsByOwner"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "context": { "slot": 42 },
            "value": {
                "items": [{
                    "account": {
                        "hash": hash.to_base58(),
                        "lamports": 0,
                        "leafIndex": 17,
                        "owner": "cTokenmWW8bLPjZEBAUgYy3zKxQZW6VKi7bqNFEVv3m",
                        "tree": DEFAULT_STATE_TREE.to_string(),
                    },
                    "tokenData": {
                        "mint": mint.to_string(),
                        "owner": owner.to_string(),
                        "amount": "1500",
                        "state": "initialized",
                    }
                }],
                "cursor": null
            }
        })))
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let records = client.get_records_by_owner(&owner, &mint).await.unwrap();

    mock.assert_async().await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.hash, hash);
    assert_eq!(record.amount, 1500);
    assert_eq!(record.leaf_index, 17);
    assert_eq!(record.merkle_tree, DEFAULT_STATE_TREE);
    assert_eq!(record.nullifier_queue, DEFAULT_NULLIFIER_QUEUE);
    assert!(record.delegate.is_none());
}

#[tokio::test]
async fn test_unknown_tree_without_queue_is_decode_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "context": { "slot": 1 },
            "value": {
                "items": [{
                    "account": {
                        "hash": RecordHash([1u8; 32]).to_base58(),
                        "lamports": 0,
                        "leafIndex": 0,
                        "owner": Pubkey::new_unique().to_string(),
                        "tree": Pubkey::new_unique().to_string(),
                    },
                    "tokenData": {
                        "mint": Pubkey::new_unique().to_string(),
                        "owner": Pubkey::new_unique().to_string(),
                        "amount": 1,
                    }
                }]
            }
        })))
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let err = client
        .get_records_by_owner(&Pubkey::new_unique(), &Pubkey::new_unique())
        .await
        .unwrap_err();
    assert!(matches!(err, StateClientError::Decode { .. }));
}

#[tokio::test]
async fn test_balances_are_sorted_descending() {
    let mut server = Server::new_async().await;
    let small = Pubkey::new_unique();
    let large = Pubkey::new_unique();
    let _mock = server
        .mock("POST", "/")
        .match_body(method("getCompressedTokenBalancesByOwner"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "context": { "slot": 1 },
            "value": {
                "token_balances": [
                    { "mint": small.to_string(), "balance": 5 },
                    { "mint": large.to_string(), "balance": "900" }
                ]
            }
        })))
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let balances = client
        .get_compressed_token_balances_by_owner(&Pubkey::new_unique(), None)
        .await
        .unwrap();

    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].mint, large);
    assert_eq!(balances[0].balance, 900);
    assert_eq!(balances[1].mint, small);
}

#[tokio::test]
async fn test_block_reference_carries_context_slot() {
    let mut server = Server::new_async().await;
    let blockhash = solana_sdk::hash::Hash::new_from_array([3u8; 32]);
    let _mock = server
        .mock("POST", "/")
        .match_body(method("getLatestBlockhash"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "context": { "slot": 321 },
            "value": {
                "blockhash": blockhash.to_string(),
                "lastValidBlockHeight": 471
            }
        })))
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let block = client.get_latest_block_reference().await.unwrap();

    assert_eq!(block.slot, 321);
    assert_eq!(block.blockhash, blockhash);
    assert_eq!(block.last_valid_block_height, 471);
}

#[tokio::test]
async fn test_proof_root_indices_must_match_request() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .match_body(method("getValidityProof"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "context": { "slot": 1 },
            "value": { "rootIndices": [3] }
        })))
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let err = client
        .get_validity_proof(&[RecordHash([1u8; 32]), RecordHash([2u8; 32])])
        .await
        .unwrap_err();
    assert_eq!(err.category(), "decode");
}

#[tokio::test]
async fn test_empty_proof_request_makes_no_call() {
    let mut server = Server::new_async().await;
    let mock = server.mock("POST", "/").expect(0).create_async().await;

    let client = client_for(&server, RetryPolicy::none());
    let proof = client.get_validity_proof(&[]).await.unwrap();

    assert!(proof.compressed_proof.is_none());
    assert!(proof.root_indices.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_proof_rpc_error_is_proof_unavailable() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "Record not found" }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let err = client
        .get_validity_proof(&[RecordHash([1u8; 32])])
        .await
        .unwrap_err();
    match err {
        StateClientError::ProofUnavailable(message) => assert_eq!(message, "Record not found"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_other_rpc_errors_keep_code() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32602, "message": "Invalid params" }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let err = client
        .get_minimum_balance_for_rent_exemption(82)
        .await
        .unwrap_err();
    assert!(matches!(err, StateClientError::Rpc { code: -32602, .. }));
}

#[tokio::test]
async fn test_rate_limit_retries_then_succeeds() {
    let mut server = Server::new_async().await;
    // Mocks with outstanding expected hits are served first.
    let limited = server
        .mock("POST", "/")
        .with_status(429)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!(1_461_600)))
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server, fast_retry(3));
    let rent = client.get_minimum_balance_for_rent_exemption(82).await.unwrap();

    assert_eq!(rent, 1_461_600);
    limited.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_exhaustion_is_reported() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(429)
        .expect(3)
        .create_async()
        .await;

    let client = client_for(&server, fast_retry(2));
    let err = client
        .get_minimum_balance_for_rent_exemption(82)
        .await
        .unwrap_err();

    assert!(matches!(err, StateClientError::RateLimited { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .create_async()
        .await;

    let client = client_for(&server, fast_retry(3));
    let err = client.get_latest_block_reference().await.unwrap_err();
    assert!(matches!(err, StateClientError::Transport { status: 503, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_missing_account_is_none() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .match_body(method("getAccountInfo"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({ "context": { "slot": 1 }, "value": null })))
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let account = client.get_account(&Pubkey::new_unique()).await.unwrap();
    assert!(account.is_none());
}

#[tokio::test]
async fn test_frozen_records_are_not_returned() {
    let mut server = Server::new_async().await;
    let owner = Pubkey::new_unique();
    let mint = Pubkey::new_unique();
    let _mock = server
        .mock("POST", "/")
        .match_body(method("getCompressedTokenAccountsByOwner"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(records_page(
            vec![
                token_item(1, &owner, &mint, 1000, "frozen"),
                token_item(2, &owner, &mint, 300, "initialized"),
            ],
            None,
        ))
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let records = client.get_records_by_owner(&owner, &mint).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].amount, 300);
    assert_eq!(records[0].hash, RecordHash([2u8; 32]));
    assert!(select_for_amount(&records, 500).is_err());
}

#[tokio::test]
async fn test_records_follow_cursor_across_pages() {
    let mut server = Server::new_async().await;
    let owner = Pubkey::new_unique();
    let mint = Pubkey::new_unique();

    let second = server
        .mock("POST", "/")
        .match_body(records_for_cursor("page-2"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(records_page(
            vec![token_item(2, &owner, &mint, 40, "initialized")],
            None,
        ))
        .expect(1)
        .create_async()
        .await;
    let first = server
        .mock("POST", "/")
        .match_body(method("getCompressedTokenAccountsByOwner"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(records_page(
            vec![token_item(1, &owner, &mint, 60, "initialized")],
            Some("page-2"),
        ))
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let records = client.get_records_by_owner(&owner, &mint).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    let amounts: Vec<u64> = records.iter().map(|r| r.amount).collect();
    assert_eq!(amounts, vec![60, 40]);
}

#[tokio::test]
async fn test_record_listing_past_page_cap_is_error() {
    let mut server = Server::new_async().await;
    let owner = Pubkey::new_unique();
    let mint = Pubkey::new_unique();

    let _second = server
        .mock("POST", "/")
        .match_body(records_for_cursor("a"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(records_page(
            vec![token_item(2, &owner, &mint, 5, "initialized")],
            Some("b"),
        ))
        .expect(1)
        .create_async()
        .await;
    let _first = server
        .mock("POST", "/")
        .match_body(method("getCompressedTokenAccountsByOwner"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(records_page(
            vec![token_item(1, &owner, &mint, 5, "initialized")],
            Some("a"),
        ))
        .expect(1)
        .create_async()
        .await;

    let mut config = PhotonClientConfig::new(server.url());
    config.rate_limit_rps = 1_000;
    config.retry = RetryPolicy::none();
    config.max_record_pages = 2;
    let client = PhotonClient::new(config).unwrap();

    let err = client.get_records_by_owner(&owner, &mint).await.unwrap_err();
    assert!(matches!(err, StateClientError::Decode { .. }));
    assert!(err.to_string().contains("more than 2 pages"));
}

#[tokio::test]
async fn test_repeated_cursor_is_error() {
    let mut server = Server::new_async().await;
    let owner = Pubkey::new_unique();
    let mint = Pubkey::new_unique();
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(records_page(
            vec![token_item(1, &owner, &mint, 5, "initialized")],
            Some("same"),
        ))
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());
    let err = client.get_records_by_owner(&owner, &mint).await.unwrap_err();
    assert_eq!(err.category(), "decode");
}

#[tokio::test]
async fn test_confirm_returns_status_slot() {
    let mut server = Server::new_async().await;
    let _statuses = server
        .mock("POST", "/")
        .match_body(method("getSignatureStatuses"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(statuses(json!({
            "slot": 12,
            "confirmations": 3,
            "status": { "Ok": null },
            "err": null,
            "confirmationStatus": "confirmed"
        })))
        .create_async()
        .await;
    let height = server
        .mock("POST", "/")
        .match_body(method("getBlockHeight"))
        .expect(0)
        .create_async()
        .await;

    let client = confirm_client(&server, Duration::from_secs(5));
    let signature = Signature::new_unique();
    let outcome = client.confirm(&signature, &block_reference()).await.unwrap();

    assert_eq!(outcome.signature, signature);
    assert_eq!(outcome.slot, 12);
    assert_eq!(outcome.confirmations, Some(3));
    height.assert_async().await;
}

#[tokio::test]
async fn test_confirm_reports_failed_transaction() {
    let mut server = Server::new_async().await;
    let _statuses = server
        .mock("POST", "/")
        .match_body(method("getSignatureStatuses"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(statuses(json!({
            "slot": 12,
            "confirmations": 1,
            "status": { "Err": "InsufficientFundsForFee" },
            "err": "InsufficientFundsForFee",
            "confirmationStatus": "processed"
        })))
        .create_async()
        .await;

    let client = confirm_client(&server, Duration::from_secs(5));
    let signature = Signature::new_unique();
    let err = client
        .confirm(&signature, &block_reference())
        .await
        .unwrap_err();

    match err {
        StateClientError::TransactionFailed { signature: failed, .. } => {
            assert_eq!(failed, signature.to_string())
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_confirm_expires_past_last_valid_height() {
    let mut server = Server::new_async().await;
    let _statuses = server
        .mock("POST", "/")
        .match_body(method("getSignatureStatuses"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(statuses(json!(null)))
        .create_async()
        .await;
    let _height = server
        .mock("POST", "/")
        .match_body(method("getBlockHeight"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!(201)))
        .create_async()
        .await;

    let client = confirm_client(&server, Duration::from_secs(5));
    let err = client
        .confirm(&Signature::new_unique(), &block_reference())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StateClientError::Expired {
            last_valid_block_height: 200
        }
    ));
}

#[tokio::test]
async fn test_confirm_times_out_while_pending() {
    let mut server = Server::new_async().await;
    let _statuses = server
        .mock("POST", "/")
        .match_body(method("getSignatureStatuses"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(statuses(json!(null)))
        .create_async()
        .await;
    let _height = server
        .mock("POST", "/")
        .match_body(method("getBlockHeight"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!(150)))
        .create_async()
        .await;

    let client = confirm_client(&server, Duration::from_millis(60));
    let err = client
        .confirm(&Signature::new_unique(), &block_reference())
        .await
        .unwrap_err();

    match err {
        StateClientError::Timeout {
            operation,
            timeout_ms,
        } => {
            assert_eq!(operation, "confirmTransaction");
            assert_eq!(timeout_ms, 60);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_latency_is_observed_for_failed_responses() {
    let mut server = Server::new_async().await;
    let _limited = server
        .mock("POST", "/")
        .match_body(method("getMinimumBalanceForRentExemption"))
        .with_status(429)
        .create_async()
        .await;
    let _unavailable = server
        .mock("POST", "/")
        .match_body(method("getLatestBlockhash"))
        .with_status(503)
        .create_async()
        .await;

    let client = client_for(&server, RetryPolicy::none());

    let before = metrics().rpc_latency.get_sample_count();
    let err = client
        .get_minimum_balance_for_rent_exemption(82)
        .await
        .unwrap_err();
    assert!(matches!(err, StateClientError::RateLimited { .. }));
    let after_limited = metrics().rpc_latency.get_sample_count();
    assert!(after_limited > before);

    let err = client.get_latest_block_reference().await.unwrap_err();
    assert!(matches!(err, StateClientError::Transport { status: 503, .. }));
    assert!(metrics().rpc_latency.get_sample_count() > after_limited);
}
