//! Deferred-parameter payloads for EVM chain calls.
//!
//! A [`Payload`] describes a chain call whose arguments may refer to
//! symbolic parameters ([`EvmParam`]) that are only known once a transfer is
//! underway, such as the gateway address, the amount or the network's
//! signature. A [`ParamContext`] supplies those values for one attempt, and
//! the [`PayloadResolver`] turns the two into a payload hash or a
//! submittable transaction.

mod address;
mod approval;
mod contract;
mod error;
mod params;
mod resolver;
mod types;

pub use error::PayloadError;
pub use params::{EvmParam, ParamContext, ParamResolver, TransactionType};
pub use resolver::{PayloadResolver, ResolvedPayload};
pub use types::{
	AddressParams, ApprovalParams, ArgValue, ContractArg, ContractParams, Overrides, Payload,
	PayloadKind, TxConfig,
};
