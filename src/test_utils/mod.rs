//! Deterministic test doubles and fixtures.
//!
//! Everything here runs without a live node: [`MockRpc`] is a programmable
//! [`RpcClient`](crate::rpc::RpcClient) and the fixtures build ERC-20-shaped
//! ABIs and logs.

mod fixtures;
mod macros;
mod mock_rpc;

pub use fixtures::{
    APPROVAL_SIGNATURE, TRANSFER_SIGNATURE, erc20_abi, mock_log, transfer_log, transfer_topic0,
};
pub use mock_rpc::MockRpc;
