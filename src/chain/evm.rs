//! [`ChainClient`] over Ethereum JSON-RPC.
//!
//! Reads go through `eth_call`. Writes go through `eth_sendTransaction`, so
//! the node (or the wallet bridge in front of it) must manage the sending
//! account and do the signing.

use std::time::Duration;

use alloy_primitives::{Address, TxHash, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::abi::{IAmiPay, IStablecoin};
use super::rpc::RpcClient;
use super::{ChainClient, Contracts, TxReceipt};
use crate::address::lower_hex;
use crate::error::ChainError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

pub struct EvmChainClient {
    rpc: RpcClient,
    contracts: Contracts,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl EvmChainClient {
    pub fn new(rpc: RpcClient, contracts: Contracts) -> Self {
        Self {
            rpc,
            contracts,
            poll_interval: DEFAULT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, receipt_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.receipt_timeout = receipt_timeout;
        self
    }

    pub fn contracts(&self) -> &Contracts {
        &self.contracts
    }

    async fn eth_call<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, ChainError> {
        let data = format!("0x{}", hex::encode(call.abi_encode()));
        let result = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": lower_hex(&to), "data": data }, "latest"]),
            )
            .await?;

        let bytes = decode_hex_bytes(&result)?;
        C::abi_decode_returns(&bytes, true).map_err(|e| ChainError::Decode(e.to_string()))
    }

    /// Submit once. A failed or timed-out submission is reported, never
    /// repeated.
    async fn send<C: SolCall>(&self, from: Address, to: Address, call: C) -> Result<TxHash, ChainError> {
        let data = format!("0x{}", hex::encode(call.abi_encode()));
        let result = self
            .rpc
            .call_once(
                "eth_sendTransaction",
                json!([{ "from": lower_hex(&from), "to": lower_hex(&to), "data": data }]),
            )
            .await?;

        let hash: TxHash =
            serde_json::from_value(result).map_err(|e| ChainError::Decode(e.to_string()))?;
        tracing::info!(from = %from, to = %to, tx = %hash, "transaction submitted");
        Ok(hash)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.rpc.call("eth_blockNumber", json!([])).await?;
        decode_quantity(&result)
    }

    async fn poll_receipt(&self, hash: TxHash, confirmations: u64) -> Result<TxReceipt, ChainError> {
        let receipt = loop {
            let result = self
                .rpc
                .call("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if !result.is_null() {
                break parse_receipt(hash, &result)?;
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        if !receipt.success {
            return Err(ChainError::Reverted { hash });
        }

        while confirmations > 1 {
            let head = self.block_number().await?;
            if head + 1 >= receipt.block_number + confirmations {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        Ok(receipt)
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn token_decimals(&self) -> Result<u8, ChainError> {
        let ret = self
            .eth_call(self.contracts.stablecoin, IStablecoin::decimalsCall {})
            .await?;
        Ok(ret._0)
    }

    async fn token_balance(&self, owner: Address) -> Result<U256, ChainError> {
        let ret = self
            .eth_call(
                self.contracts.stablecoin,
                IStablecoin::balanceOfCall { account: owner },
            )
            .await?;
        Ok(ret._0)
    }

    async fn sponsor_allowance(
        &self,
        beneficiary: Address,
        sponsor: Address,
    ) -> Result<U256, ChainError> {
        let ret = self
            .eth_call(
                self.contracts.settlement,
                IAmiPay::allowancesCall {
                    beneficiary,
                    sponsor,
                },
            )
            .await?;
        Ok(ret._0)
    }

    async fn sponsors_of(&self, beneficiary: Address) -> Result<Vec<Address>, ChainError> {
        let filter = json!({
            "address": lower_hex(&self.contracts.settlement),
            "topics": [
                IAmiPay::AllowanceDeposited::SIGNATURE_HASH,
                Value::Null,
                B256::left_padding_from(beneficiary.as_slice()),
            ],
            "fromBlock": "0x0",
            "toBlock": "latest",
        });
        let result = self.rpc.call("eth_getLogs", json!([filter])).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| ChainError::Decode("eth_getLogs did not return an array".into()))?;

        let mut sponsors = Vec::new();
        for log in logs {
            let topic = log
                .get("topics")
                .and_then(|t| t.get(1))
                .cloned()
                .ok_or_else(|| ChainError::Decode("AllowanceDeposited log without sponsor".into()))?;
            let word: B256 =
                serde_json::from_value(topic).map_err(|e| ChainError::Decode(e.to_string()))?;
            let sponsor = Address::from_word(word);
            if !sponsors.contains(&sponsor) {
                sponsors.push(sponsor);
            }
        }
        Ok(sponsors)
    }

    async fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<TxHash, ChainError> {
        self.send(
            from,
            self.contracts.stablecoin,
            IStablecoin::transferCall { to, amount },
        )
        .await
    }

    async fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.send(
            owner,
            self.contracts.stablecoin,
            IStablecoin::approveCall { spender, amount },
        )
        .await
    }

    async fn deposit_allowance(
        &self,
        sponsor: Address,
        beneficiary: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.send(
            sponsor,
            self.contracts.settlement,
            IAmiPay::depositAllowanceCall {
                beneficiary,
                amount,
            },
        )
        .await
    }

    async fn spend_from(
        &self,
        beneficiary: Address,
        sponsor: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.send(
            beneficiary,
            self.contracts.settlement,
            IAmiPay::spendFromCall {
                sponsor,
                recipient,
                amount,
            },
        )
        .await
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        confirmations: u64,
    ) -> Result<TxReceipt, ChainError> {
        match tokio::time::timeout(self.receipt_timeout, self.poll_receipt(hash, confirmations))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(format!(
                "no receipt for {} after {}s",
                hash,
                self.receipt_timeout.as_secs()
            ))),
        }
    }
}

fn decode_hex_bytes(value: &Value) -> Result<Vec<u8>, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex string, got {}", value)))?;
    hex::decode(s.trim_start_matches("0x")).map_err(|e| ChainError::Decode(e.to_string()))
}

fn decode_quantity(value: &Value) -> Result<u64, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected quantity, got {}", value)))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity '{}': {}", s, e)))
}

fn parse_receipt(hash: TxHash, value: &Value) -> Result<TxReceipt, ChainError> {
    let block_number = value
        .get("blockNumber")
        .map(decode_quantity)
        .transpose()?
        .unwrap_or(0);
    // Pre-Byzantium receipts have no status; treat them as successful
    let success = match value.get("status") {
        Some(status) if !status.is_null() => decode_quantity(status)? == 1,
        _ => true,
    };
    Ok(TxReceipt {
        hash,
        block_number,
        success,
    })
}
