//! Esplora-style REST adapter for [`ChainClient`]
//!
//! Speaks the mempool.space REST dialect:
//! `GET /address/{addr}/utxo`, `GET /v1/fees/recommended`,
//! `GET /tx/{txid}`, `GET /tx/{txid}/hex`, `POST /tx`.
//!
//! Single-attempt requests only. Deadlines are the caller's concern;
//! construct the inner [`reqwest::Client`] with a timeout if one is
//! wanted.

use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::{Address, Txid};
use reqwest::Client;
use serde::Deserialize;

use super::{ChainClient, SpendableOutput, TransactionInfo, TxInputSummary, TxOutputSummary};
use crate::errors::ChainError;

/// Recommended base URL for Bitcoin testnet4
pub const TESTNET4_API: &str = "https://mempool.space/testnet4/api";

/// HTTP adapter over an esplora-style chain API
#[derive(Clone, Debug)]
pub struct EsploraClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct UtxoDto {
    txid: String,
    vout: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct FeeEstimatesDto {
    #[serde(rename = "fastestFee")]
    fastest_fee: u64,
}

#[derive(Debug, Deserialize)]
struct TxStatusDto {
    confirmed: bool,
    block_height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PrevoutDto {
    value: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TxInputDto {
    txid: String,
    vout: u32,
    prevout: Option<PrevoutDto>,
}

#[derive(Debug, Deserialize)]
struct TxOutputDto {
    scriptpubkey: String,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct TxDto {
    status: TxStatusDto,
    vin: Vec<TxInputDto>,
    vout: Vec<TxOutputDto>,
}

impl EsploraClient {
    /// Creates a client for the given API base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), client: Client::new() }
    }

    /// Creates a client with a caller-configured HTTP client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), client }
    }

    /// Returns the configured base URL
    pub fn base_url(&self) -> &str { &self.base_url }

    async fn get_text(&self, path: &str) -> Result<String, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ChainError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ChainError::UnexpectedStatus { status: status.as_u16(), body });
        }
        Ok(body)
    }

    fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ChainError> {
        serde_json::from_str(body).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    fn parse_txid(s: &str) -> Result<Txid, ChainError> {
        Txid::from_str(s.trim())
            .map_err(|_| ChainError::InvalidResponse(format!("not a txid: {s}")))
    }
}

#[async_trait]
impl ChainClient for EsploraClient {
    async fn list_utxos(&self, address: &Address) -> Result<Vec<SpendableOutput>, ChainError> {
        let body = self.get_text(&format!("/address/{address}/utxo")).await?;
        let utxos: Vec<UtxoDto> = Self::parse_json(&body)?;
        utxos
            .into_iter()
            .map(|u| {
                Ok(SpendableOutput {
                    txid: Self::parse_txid(&u.txid)?,
                    vout: u.vout,
                    value: u.value,
                })
            })
            .collect()
    }

    async fn fee_estimate(&self) -> Result<u64, ChainError> {
        let body = self.get_text("/v1/fees/recommended").await?;
        let fees: FeeEstimatesDto = Self::parse_json(&body)?;
        Ok(fees.fastest_fee)
    }

    async fn raw_transaction(&self, txid: Txid) -> Result<Vec<u8>, ChainError> {
        let body = self.get_text(&format!("/tx/{txid}/hex")).await?;
        hex::decode(body.trim()).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    async fn transaction(&self, txid: Txid) -> Result<TransactionInfo, ChainError> {
        let body = self.get_text(&format!("/tx/{txid}")).await?;
        let tx: TxDto = Self::parse_json(&body)?;
        let inputs = tx
            .vin
            .into_iter()
            .map(|i| {
                Ok(TxInputSummary {
                    txid: Self::parse_txid(&i.txid)?,
                    vout: i.vout,
                    value: i.prevout.and_then(|p| p.value),
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;
        let outputs = tx
            .vout
            .into_iter()
            .map(|o| {
                Ok(TxOutputSummary {
                    script_pubkey: hex::decode(&o.scriptpubkey)
                        .map_err(|e| ChainError::InvalidResponse(e.to_string()))?,
                    value: o.value,
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;
        Ok(TransactionInfo {
            confirmed: tx.status.confirmed,
            block_height: tx.status.block_height,
            inputs,
            outputs,
        })
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid, ChainError> {
        let url = format!("{}/tx", self.base_url);
        let resp = self
            .client
            .post(&url)
            .body(hex::encode(raw_tx))
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ChainError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ChainError::BroadcastFailed(format!("status {}: {body}", status.as_u16())));
        }
        Self::parse_txid(&body)
    }
}
