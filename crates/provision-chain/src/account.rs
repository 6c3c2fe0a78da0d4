use std::fmt;

use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, U256},
};
use provision_config::{Error as ConfigError, Secret};

use crate::{client::ChainClient, error::ChainError};

/// The single key every deployment transaction is signed with.
#[derive(Clone)]
pub struct DeployerAccount {
    wallet: LocalWallet,
}

impl DeployerAccount {
    /// Refuses to build an account without an explicitly configured key.
    pub fn from_secret(secret: Option<&Secret>, env: &str) -> Result<Self, ConfigError> {
        let secret = secret.ok_or_else(|| {
            ConfigError::MissingSigningKey {
                env: env.to_string(),
            }
        })?;
        let wallet = secret.expose().trim().parse::<LocalWallet>().map_err(|_| {
            ConfigError::InvalidSigningKey(format!(
                "{env} is not a hex encoded secp256k1 private key"
            ))
        })?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// A signer bound to `chain_id`, for EIP-155 signatures.
    pub fn signer(&self, chain_id: u64) -> LocalWallet {
        self.wallet.clone().with_chain_id(chain_id)
    }

    pub async fn balance(&self, client: &dyn ChainClient) -> Result<U256, ChainError> {
        client.balance(self.address()).await
    }

    pub async fn next_nonce(&self, client: &dyn ChainClient) -> Result<U256, ChainError> {
        client.pending_nonce(self.address()).await
    }
}

impl fmt::Debug for DeployerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployerAccount")
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::testing::DEV_KEY;

    #[test]
    fn derives_address_without_network() {
        let account =
            DeployerAccount::from_secret(Some(&Secret::new(DEV_KEY)), "DEPLOYER_PRIVATE_KEY")
                .unwrap();
        assert_eq!(
            account.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(account.signer(1).chain_id(), 1);
        assert!(!format!("{account:?}").contains("ac0974bec"));
    }

    #[test]
    fn accepts_keys_without_prefix() {
        let wallet = LocalWallet::new(&mut StdRng::seed_from_u64(7));
        let hex = const_hex::encode(wallet.signer().to_bytes());
        let account = DeployerAccount::from_secret(Some(&Secret::new(hex)), "KEY").unwrap();
        assert_eq!(account.address(), wallet.address());
    }

    #[test]
    fn fails_closed_without_key() {
        let err = DeployerAccount::from_secret(None, "DEPLOYER_PRIVATE_KEY").unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingSigningKey { env } if env == "DEPLOYER_PRIVATE_KEY")
        );
    }

    #[test]
    fn rejects_garbage_without_echoing_it() {
        let err = DeployerAccount::from_secret(Some(&Secret::new("hunter2")), "KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSigningKey(_)));
        assert!(!err.to_string().contains("hunter2"));
    }
}
