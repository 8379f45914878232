use async_trait::async_trait;
use ballot_primitives::{
    transaction::{SignedTransaction, UnsignedTransaction},
    AccountId,
};
use ballot_rpc_interface::{RpcError, RpcResult, Signer};

/// Signs everything with a fake signature, or rejects everything.
#[derive(Clone, Debug)]
pub struct MockSigner {
    account: AccountId,
    rejecting: bool,
}

impl MockSigner {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            rejecting: false,
        }
    }

    pub fn rejecting(mut self) -> Self {
        self.rejecting = true;
        self
    }
}

#[async_trait]
impl Signer for MockSigner {
    fn account(&self) -> &AccountId {
        &self.account
    }

    async fn sign(&self, transaction: UnsignedTransaction) -> RpcResult<SignedTransaction> {
        if self.rejecting {
            return Err(RpcError::SigningRejected("cancelled by user".to_owned()));
        }
        Ok(SignedTransaction {
            transaction,
            signer: self.account.clone(),
            signature: self.account.as_str().as_bytes().to_vec(),
        })
    }
}
