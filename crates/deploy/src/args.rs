//! Typed ABI arguments for constructors and setup calls.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U256, keccak256},
};
use serde::{Deserialize, Serialize};

/// A single ABI value passed to a constructor or a setup call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    Bytes32(B256),
    Array(Vec<ArgValue>),
}

impl ArgValue {
    /// Placeholder for an address that will be filled in by a dependency.
    pub const PLACEHOLDER: Self = Self::Address(Address::ZERO);

    pub fn is_address(&self) -> bool {
        matches!(self, Self::Address(_))
    }

    /// Convert to the dynamic ABI representation.
    pub fn to_sol(&self) -> DynSolValue {
        match self {
            Self::Address(address) => DynSolValue::Address(*address),
            Self::Uint(value) => DynSolValue::Uint(*value, 256),
            Self::Bool(value) => DynSolValue::Bool(*value),
            Self::String(value) => DynSolValue::String(value.clone()),
            Self::Bytes(value) => DynSolValue::Bytes(value.to_vec()),
            Self::Bytes32(value) => DynSolValue::FixedBytes(*value, 32),
            Self::Array(values) => DynSolValue::Array(values.iter().map(Self::to_sol).collect()),
        }
    }
}

impl From<Address> for ArgValue {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<U256> for ArgValue {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// ABI-encode a list of arguments as function (or constructor) parameters.
pub fn encode_params(args: &[ArgValue]) -> Bytes {
    DynSolValue::Tuple(args.iter().map(ArgValue::to_sol).collect())
        .abi_encode_params()
        .into()
}

/// The 4-byte selector of a function signature such as `transfer(address,uint256)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let normalized: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
    let hash = keccak256(normalized.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Build calldata for `signature` called with `args`.
pub fn encode_call(signature: &str, args: &[ArgValue]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode_params(args));
    data.into()
}
