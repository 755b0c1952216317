//! ERC-20-shaped fixtures: a two-event ABI and log builders.

use alloy::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes, LogData, U256, keccak256},
    rpc::types::Log,
};

pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
pub const APPROVAL_SIGNATURE: &str = "Approval(address,address,uint256)";

const ERC20_ABI_JSON: &str = r#"[
  {
    "type": "event",
    "name": "Transfer",
    "anonymous": false,
    "inputs": [
      { "name": "from", "type": "address", "indexed": true, "internalType": "address" },
      { "name": "to", "type": "address", "indexed": true, "internalType": "address" },
      { "name": "value", "type": "uint256", "indexed": false, "internalType": "uint256" }
    ]
  },
  {
    "type": "event",
    "name": "Approval",
    "anonymous": false,
    "inputs": [
      { "name": "owner", "type": "address", "indexed": true, "internalType": "address" },
      { "name": "spender", "type": "address", "indexed": true, "internalType": "address" },
      { "name": "value", "type": "uint256", "indexed": false, "internalType": "uint256" }
    ]
  },
  {
    "type": "function",
    "name": "balanceOf",
    "stateMutability": "view",
    "inputs": [
      { "name": "owner", "type": "address", "internalType": "address" }
    ],
    "outputs": [
      { "name": "", "type": "uint256", "internalType": "uint256" }
    ]
  }
]"#;

/// A minimal ERC-20 ABI: `Transfer`, `Approval`, `balanceOf`.
#[must_use]
pub fn erc20_abi() -> JsonAbi {
    serde_json::from_str(ERC20_ABI_JSON).expect("static ABI parses")
}

#[must_use]
pub fn transfer_topic0() -> B256 {
    keccak256(TRANSFER_SIGNATURE.as_bytes())
}

/// A decodable `Transfer(from, to, value)` log at the given chain position.
#[must_use]
pub fn transfer_log(
    address: Address,
    block_number: u64,
    log_index: u64,
    from: Address,
    to: Address,
    value: U256,
) -> Log {
    let topics = vec![
        transfer_topic0(),
        B256::left_padding_from(from.as_slice()),
        B256::left_padding_from(to.as_slice()),
    ];
    let data = Bytes::from(value.to_be_bytes::<32>());

    Log {
        inner: alloy::primitives::Log {
            address,
            data: LogData::new_unchecked(topics, data),
        },
        block_hash: Some(keccak256(block_number.to_be_bytes())),
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(keccak256(
            [block_number.to_be_bytes(), log_index.to_be_bytes()].concat(),
        )),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

/// A placeholder log where only the chain position matters.
#[must_use]
pub fn mock_log(address: Address, block_number: u64, log_index: u64) -> Log {
    transfer_log(address, block_number, log_index, Address::ZERO, Address::ZERO, U256::ZERO)
}
