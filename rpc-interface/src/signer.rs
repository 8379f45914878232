use async_trait::async_trait;
use ballot_primitives::{
    transaction::{SignedTransaction, UnsignedTransaction},
    AccountId,
};

use crate::error::RpcResult;

/// Signs transactions on behalf of an account, usually through a wallet extension.
#[async_trait]
pub trait Signer: Send + Sync {
    fn account(&self) -> &AccountId;

    async fn sign(&self, transaction: UnsignedTransaction) -> RpcResult<SignedTransaction>;
}
