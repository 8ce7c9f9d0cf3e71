//! Wallet Signer Module - Transaction Signing
//!
//! This module handles:
//! - Loading the operator private key securely
//! - Signing approve / wrap / liquidity transactions (EIP-1559)
//! - Local nonce management, refreshed from the network per operation
//!
//! ⚠️  SECURITY WARNING:
//! - Never log or expose private keys
//! - Use environment variables, not hardcoded keys

use alloy_consensus::{SignableTransaction, TxEip1559};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use eyre::{eyre, Result};
use std::str::FromStr;
use tracing::{debug, info};

/// Wallet manager for signing operations
pub struct WalletManager {
    /// Operator wallet - owns the tokens and LP positions
    operator: Option<PrivateKeySigner>,

    /// Chain ID for transaction signing
    chain_id: u64,

    /// Current nonce for the operator wallet
    current_nonce: u64,
}

impl WalletManager {
    /// Create a new wallet manager from environment variables
    pub fn from_env(chain_id: u64) -> Result<Self> {
        let operator = match std::env::var("OPERATOR_PRIVATE_KEY") {
            Ok(key) => {
                let key = key.trim_start_matches("0x");
                let signer = PrivateKeySigner::from_str(key)
                    .map_err(|e| eyre!("Failed to parse OPERATOR_PRIVATE_KEY: {}", e))?;
                info!("✓ Operator wallet loaded: {:?}", signer.address());
                Some(signer)
            }
            Err(_) => {
                debug!("OPERATOR_PRIVATE_KEY not set (fine for dry-run and read-only commands)");
                None
            }
        };

        Ok(Self {
            operator,
            chain_id,
            current_nonce: 0,
        })
    }

    /// Create with an explicit key (for testing)
    pub fn new(operator_key: Option<&str>, chain_id: u64) -> Result<Self> {
        let operator = operator_key
            .map(|k| k.trim_start_matches("0x"))
            .map(PrivateKeySigner::from_str)
            .transpose()?;

        Ok(Self {
            operator,
            chain_id,
            current_nonce: 0,
        })
    }

    /// Check if an operator key is configured
    pub fn has_operator(&self) -> bool {
        self.operator.is_some()
    }

    /// Get the operator wallet address
    pub fn operator_address(&self) -> Option<Address> {
        self.operator.as_ref().map(|s| s.address())
    }

    /// Operator address or a descriptive error
    pub fn require_operator(&self) -> Result<Address> {
        self.operator_address()
            .ok_or_else(|| eyre!("No operator wallet configured - set OPERATOR_PRIVATE_KEY"))
    }

    /// Update nonce from the network
    pub async fn update_nonce(&mut self, rpc_url: &str) -> Result<()> {
        use alloy_provider::{Provider, ProviderBuilder};

        let wallet = self.operator.as_ref()
            .ok_or_else(|| eyre!("No operator wallet configured"))?;

        let provider = ProviderBuilder::new()
            .connect_http(rpc_url.parse()?);

        self.current_nonce = provider.get_transaction_count(wallet.address()).await?;
        debug!("Updated nonce to: {}", self.current_nonce);

        Ok(())
    }

    /// Get and increment nonce
    pub fn get_nonce(&mut self) -> u64 {
        let nonce = self.current_nonce;
        self.current_nonce += 1;
        nonce
    }

    /// Sign a transaction and return the raw signed bytes
    pub async fn sign_transaction(
        &mut self,
        to: Address,
        calldata: Bytes,
        value: U256,
        gas_limit: u64,
        gas_price: u128,
        priority_fee: u128,
    ) -> Result<Bytes> {
        // Check wallet exists first
        if self.operator.is_none() {
            return Err(eyre!("No operator wallet configured"));
        }

        // Get nonce before borrowing signer (to satisfy borrow checker)
        let nonce = self.get_nonce();

        // Now get the signer reference
        let signer = self.operator.as_ref().unwrap();

        // Build EIP-1559 transaction
        let tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: gas_price,
            max_priority_fee_per_gas: priority_fee,
            to: alloy_primitives::TxKind::Call(to),
            value,
            input: calldata,
            access_list: Default::default(),
        };

        // Get the signing hash
        let sig_hash = tx.signature_hash();

        // Sign the hash
        let signature = signer.sign_hash(&sig_hash).await
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?;

        // Create signed transaction envelope
        let signed = alloy_consensus::TxEnvelope::Eip1559(
            alloy_consensus::Signed::new_unchecked(
                tx,
                signature,
                B256::from(signer.address().into_word())
            )
        );

        // Raw typed-transaction bytes (0x02 || rlp), what
        // eth_sendRawTransaction expects
        use alloy_eips::eip2718::Encodable2718;
        let encoded = signed.encoded_2718();

        debug!(
            "Signed EIP-1559 transaction: to={:?}, nonce={}, gas_limit={}, gas_price={}",
            to, nonce, gas_limit, gas_price
        );

        Ok(Bytes::from(encoded))
    }
}
